//! Oversize cookie splitting.
//!
//! Browsers cap a single cookie around 4096 bytes. Values that would push a
//! `Set-Cookie` line past that are split across numbered cookies
//! (`name_0`, `name_1`, ...) and reassembled from the `Cookie` request
//! header in index order. Deletion covers the base name and every numbered
//! part the client presented.
use std::collections::HashMap;

/// Practical per-cookie budget, name and attributes included.
pub const MAX_COOKIE_SIZE: usize = 4093;

/// Cookie attributes appended verbatim to every emitted `Set-Cookie` value,
/// e.g. `Path=/; HttpOnly`.
#[derive(Debug, Clone, Default)]
pub struct CookieAttributes(pub String);

impl CookieAttributes {
    fn suffix(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("; {}", self.0)
        }
    }
}

/// Produce the `Set-Cookie` values for `name=value`, splitting when the
/// single-cookie form would exceed [`MAX_COOKIE_SIZE`].
pub fn split_set_cookie(name: &str, value: &str, attrs: &CookieAttributes) -> Vec<String> {
    let suffix = attrs.suffix();
    let single = format!("{name}={value}{suffix}");
    if single.len() <= MAX_COOKIE_SIZE {
        return vec![single];
    }

    // Reserve room for the widest index suffix we could need.
    let digits = {
        let mut n = value.len() / 16 + 1;
        let mut d = 1;
        while n >= 10 {
            n /= 10;
            d += 1;
        }
        d
    };
    let overhead = name.len() + 1 + digits + 1 + suffix.len();
    let chunk_size = MAX_COOKIE_SIZE.saturating_sub(overhead).max(4);

    // Chunk on char boundaries so multi-byte values survive reassembly.
    let mut out = Vec::new();
    let mut start = 0;
    for index in 0.. {
        if start >= value.len() {
            break;
        }
        let mut end = (start + chunk_size).min(value.len());
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        out.push(format!("{name}_{index}={}{suffix}", &value[start..end]));
        start = end;
    }
    out
}

/// Parse a `Cookie` request header into name/value pairs.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Recover the value of `name` from parsed request cookies. A direct match
/// wins; otherwise numbered parts are concatenated in index order until the
/// first gap.
pub fn reassemble(name: &str, cookies: &HashMap<String, String>) -> Option<String> {
    if let Some(value) = cookies.get(name) {
        return Some(value.clone());
    }
    let mut value = String::new();
    for index in 0.. {
        match cookies.get(&format!("{name}_{index}")) {
            Some(part) => value.push_str(part),
            None if index == 0 => return None,
            None => break,
        }
    }
    Some(value)
}

/// `Set-Cookie` values expiring `name` and every numbered part present in
/// the request cookies.
pub fn delete_set_cookies(name: &str, cookies: &HashMap<String, String>) -> Vec<String> {
    let mut out = vec![format!("{name}=; Max-Age=0")];
    for index in 0.. {
        let part = format!("{name}_{index}");
        if !cookies.contains_key(&part) {
            break;
        }
        out.push(format!("{part}=; Max-Age=0"));
    }
    out
}
