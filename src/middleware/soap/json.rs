//! XML tree to JSON map translation and back.
//!
//! Mapping rules, shared by both directions:
//!
//! * an element maps to a JSON key of `prefix<sep>local`;
//! * `xsi:nil="true"` maps to JSON `null`;
//! * attributes live under `attr_key`, namespace declarations under
//!   `ns_key`, mixed character data under `#text`;
//! * repeated children of one name become an array, single ones a scalar;
//! * text-only elements become their scalar value, optionally parsed into
//!   bool/int/float when the extraction flags are set.
use serde_json::{Map, Value, json};

use super::xml::XmlNode;

pub const XSI_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const TEXT_KEY: &str = "#text";

/// Knobs for the translation, immutable after build.
#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub attr_key: String,
    pub ns_key: String,
    /// Separator used in JSON keys between namespace prefix and local name.
    pub sep: String,
    pub extract_boolean: bool,
    pub extract_integer: bool,
    pub extract_float: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            attr_key: "attrKey".to_string(),
            ns_key: "nsKey".to_string(),
            sep: ":".to_string(),
            extract_boolean: false,
            extract_integer: false,
            extract_float: false,
        }
    }
}

impl TranslateOptions {
    fn json_key(&self, qname: &str) -> String {
        if self.sep == ":" {
            qname.to_string()
        } else {
            qname.replacen(':', &self.sep, 1)
        }
    }

    fn qname(&self, key: &str) -> String {
        if self.sep == ":" {
            key.to_string()
        } else {
            key.replacen(&self.sep, ":", 1)
        }
    }
}

/// Translate a document rooted at `root` into a single-key JSON object.
pub fn node_to_json(root: &XmlNode, opts: &TranslateOptions) -> Value {
    let mut map = Map::new();
    map.insert(opts.json_key(&root.name), node_value(root, opts));
    Value::Object(map)
}

fn node_value(node: &XmlNode, opts: &TranslateOptions) -> Value {
    if node
        .attrs
        .iter()
        .any(|(k, v)| local_name(k) == "nil" && v == "true")
    {
        return Value::Null;
    }
    if node.is_text_only() {
        return scalar(&node.text, opts);
    }

    let mut map = Map::new();
    if !node.attrs.is_empty() {
        let attrs: Map<String, Value> = node
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert(opts.attr_key.clone(), Value::Object(attrs));
    }
    if !node.namespaces.is_empty() {
        let namespaces: Map<String, Value> = node
            .namespaces
            .iter()
            .map(|(p, u)| (p.clone(), Value::String(u.clone())))
            .collect();
        map.insert(opts.ns_key.clone(), Value::Object(namespaces));
    }
    if !node.text.is_empty() {
        map.insert(TEXT_KEY.to_string(), scalar(&node.text, opts));
    }

    for child in &node.children {
        let key = opts.json_key(&child.name);
        let value = node_value(child, opts);
        match map.get_mut(&key) {
            None => {
                map.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(map)
}

fn scalar(text: &str, opts: &TranslateOptions) -> Value {
    if opts.extract_boolean {
        if let Ok(b) = text.parse::<bool>() {
            return Value::Bool(b);
        }
    }
    if opts.extract_integer {
        if let Ok(i) = text.parse::<i64>() {
            return Value::Number(i.into());
        }
    }
    if opts.extract_float {
        if let Ok(f) = text.parse::<f64>() {
            if let Some(n) = serde_json::Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(text.to_string())
}

fn local_name(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}

/// Rebuild an XML tree from a single-key JSON object. The root element
/// gathers every namespace declared anywhere in the value, plus `xsi` when
/// any `null` is present.
pub fn json_to_node(value: &Value, opts: &TranslateOptions) -> Option<XmlNode> {
    let object = value.as_object()?;
    let (key, body) = object.iter().next()?;
    let mut root = value_to_node(&opts.qname(key), body, opts);

    let mut namespaces = Vec::new();
    collect_namespaces(body, opts, &mut namespaces);
    if contains_null(body) && !namespaces.iter().any(|(p, _)| p == "xsi") {
        namespaces.push(("xsi".to_string(), XSI_URI.to_string()));
    }
    for (prefix, uri) in namespaces {
        if !root.namespaces.iter().any(|(p, _)| *p == prefix) {
            root.namespaces.push((prefix, uri));
        }
    }
    Some(root)
}

fn value_to_node(qname: &str, value: &Value, opts: &TranslateOptions) -> XmlNode {
    let mut node = XmlNode::new(qname);
    match value {
        Value::Null => {
            node.attrs.push(("xsi:nil".to_string(), "true".to_string()));
        }
        Value::Object(map) => {
            for (key, child) in map {
                if *key == opts.attr_key {
                    if let Value::Object(attrs) = child {
                        for (name, v) in attrs {
                            node.attrs.push((name.clone(), scalar_text(v)));
                        }
                    }
                } else if *key == opts.ns_key || key == TEXT_KEY {
                    if key == TEXT_KEY {
                        node.text = scalar_text(child);
                    }
                    // Namespace maps are hoisted to the root element.
                } else {
                    let child_name = opts.qname(key);
                    match child {
                        Value::Array(items) => {
                            for item in items {
                                node.children.push(value_to_node(&child_name, item, opts));
                            }
                        }
                        other => node.children.push(value_to_node(&child_name, other, opts)),
                    }
                }
            }
        }
        other => node.text = scalar_text(other),
    }
    node
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn collect_namespaces(value: &Value, opts: &TranslateOptions, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if *key == opts.ns_key {
                    if let Value::Object(namespaces) = child {
                        for (prefix, uri) in namespaces {
                            if !out.iter().any(|(p, _)| p == prefix) {
                                out.push((prefix.clone(), scalar_text(uri)));
                            }
                        }
                    }
                } else {
                    collect_namespaces(child, opts, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_namespaces(item, opts, out);
            }
        }
        _ => {}
    }
}

fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.values().any(contains_null),
        Value::Array(items) => items.iter().any(contains_null),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{super::xml, *};

    #[test]
    fn test_envelope_to_json() {
        let doc = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><ns:Echo xmlns:ns="u:e"><v>7</v></ns:Echo></soap:Body></soap:Envelope>"#;
        let root = xml::parse(doc).unwrap();
        let opts = TranslateOptions::default();
        let value = node_to_json(&root, &opts);
        assert_eq!(
            value["soap:Envelope"]["soap:Body"]["ns:Echo"]["v"],
            json!("7")
        );
        assert_eq!(
            value["soap:Envelope"]["nsKey"]["soap"],
            json!("http://schemas.xmlsoap.org/soap/envelope/")
        );
    }

    #[test]
    fn test_integer_extraction() {
        let doc = b"<a><v>7</v><w>x</w></a>";
        let root = xml::parse(doc).unwrap();
        let opts = TranslateOptions {
            extract_integer: true,
            ..TranslateOptions::default()
        };
        let value = node_to_json(&root, &opts);
        assert_eq!(value["a"]["v"], json!(7));
        assert_eq!(value["a"]["w"], json!("x"));
    }

    #[test]
    fn test_nil_maps_to_null() {
        let doc = br#"<a><b xsi:nil="true"/></a>"#;
        let root = xml::parse(doc).unwrap();
        let value = node_to_json(&root, &TranslateOptions::default());
        assert_eq!(value["a"]["b"], Value::Null);
    }

    #[test]
    fn test_repeated_children_group_into_array() {
        let doc = b"<a><v>1</v><v>2</v><v>3</v></a>";
        let root = xml::parse(doc).unwrap();
        let value = node_to_json(&root, &TranslateOptions::default());
        assert_eq!(value["a"]["v"], json!(["1", "2", "3"]));
    }

    #[test]
    fn test_json_to_envelope() {
        let opts = TranslateOptions::default();
        let value = json!({
            "soap:Envelope": {
                "nsKey": {"soap": "http://schemas.xmlsoap.org/soap/envelope/"},
                "soap:Body": {"ns:EchoResponse": {"v": "7"}}
            }
        });
        let root = json_to_node(&value, &opts).unwrap();
        assert_eq!(root.name, "soap:Envelope");
        assert!(root.namespaces.iter().any(|(p, u)| {
            p == "soap" && u == "http://schemas.xmlsoap.org/soap/envelope/"
        }));
        let body = root.children.iter().find(|c| c.name == "soap:Body").unwrap();
        let echo = &body.children[0];
        assert_eq!(echo.name, "ns:EchoResponse");
        assert_eq!(echo.children[0].text, "7");
    }

    #[test]
    fn test_sibling_order_survives_round_trip() {
        // SOAP 1.1 requires Header before Body; resynthesis must keep the
        // document's sibling order, not sort keys.
        let doc = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Header><t>1</t></soap:Header><soap:Body><r>2</r></soap:Body></soap:Envelope>"#;
        let opts = TranslateOptions::default();
        let root = xml::parse(doc).unwrap();
        let value = node_to_json(&root, &opts);
        let rebuilt = json_to_node(&value, &opts).unwrap();
        let names: Vec<_> = rebuilt.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["soap:Header", "soap:Body"]);
        let written = xml::write_document(&rebuilt);
        assert!(written.find("<soap:Header>").unwrap() < written.find("<soap:Body>").unwrap());
    }

    #[test]
    fn test_null_adds_xsi_namespace() {
        let opts = TranslateOptions::default();
        let value = json!({"a": {"b": null}});
        let root = json_to_node(&value, &opts).unwrap();
        assert!(root.namespaces.iter().any(|(p, u)| p == "xsi" && u == XSI_URI));
        assert_eq!(root.children[0].attr("xsi:nil"), Some("true"));
    }
}
