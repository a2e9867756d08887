//! Minimal XML document tree for SOAP envelope translation.
//!
//! The tree keeps qualified names exactly as written (`prefix:local`),
//! records namespace declarations separately from ordinary attributes, and
//! strips the control characters XML 1.0 forbids from text content.
use quick_xml::{
    Reader,
    escape::escape,
    events::Event,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Parse(String),
    #[error("document has no root element")]
    NoRoot,
}

/// One element of the document tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    /// Qualified name as written, e.g. `soap:Envelope`.
    pub name: String,
    /// Ordinary attributes, in document order.
    pub attrs: Vec<(String, String)>,
    /// Namespace declarations on this element, prefix to URI. The default
    /// namespace uses an empty prefix.
    pub namespaces: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Accumulated character data.
    pub text: String,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// True when the element carries only character data.
    pub fn is_text_only(&self) -> bool {
        self.children.is_empty() && self.attrs.is_empty() && self.namespaces.is_empty()
    }
}

/// Parse a document into its root element.
pub fn parse(input: &[u8]) -> Result<XmlNode, XmlError> {
    let text = String::from_utf8_lossy(input);
    let mut reader = Reader::from_str(&text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Err(e) => return Err(XmlError::Parse(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let node = element_from(&start).map_err(XmlError::Parse)?;
                stack.push(node);
            }
            Ok(Event::Empty(start)) => {
                let node = element_from(&start).map_err(XmlError::Parse)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or_else(|| {
                    XmlError::Parse("unbalanced end tag".to_string())
                })?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(parent) = stack.last_mut() {
                    let unescaped =
                        t.unescape().map_err(|e| XmlError::Parse(e.to_string()))?;
                    parent.text.push_str(&strip_control(&unescaped));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(parent) = stack.last_mut() {
                    let raw = String::from_utf8_lossy(&c).into_owned();
                    parent.text.push_str(&strip_control(&raw));
                }
            }
            Ok(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Parse("unclosed element".to_string()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(XmlError::Parse("multiple root elements".to_string())),
    }
    Ok(())
}

fn element_from(start: &quick_xml::events::BytesStart<'_>) -> Result<XmlNode, String> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut node = XmlNode::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| e.to_string())?
            .into_owned();
        if key == "xmlns" {
            node.namespaces.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            node.namespaces.push((prefix.to_string(), value));
        } else {
            node.attrs.push((key, value));
        }
    }
    Ok(node)
}

/// Remove backspace and form-feed, raw and as the two-character escape
/// sequences some producers emit, which XML 1.0 cannot represent.
pub fn strip_control(input: &str) -> String {
    let mut out = input.replace("\\b", "").replace("\\f", "");
    out.retain(|c| c != '\u{8}' && c != '\u{c}');
    out
}

/// Serialize the tree with an XML declaration.
pub fn write_document(root: &XmlNode) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    write_node(root, &mut out);
    out
}

fn write_node(node: &XmlNode, out: &mut String) {
    out.push('<');
    out.push_str(&node.name);
    for (prefix, uri) in &node.namespaces {
        if prefix.is_empty() {
            out.push_str(&format!(" xmlns=\"{}\"", escape(uri.as_str())));
        } else {
            out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape(uri.as_str())));
        }
    }
    for (key, value) in &node.attrs {
        out.push_str(&format!(" {}=\"{}\"", key, escape(value.as_str())));
    }
    if node.children.is_empty() && node.text.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    if !node.text.is_empty() {
        out.push_str(&escape(strip_control(&node.text).as_str()));
    }
    for child in &node.children {
        write_node(child, out);
    }
    out.push_str(&format!("</{}>", node.name));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_with_namespaces() {
        let doc = br#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><ns:Echo xmlns:ns="u:e"><v>7</v></ns:Echo></soap:Body></soap:Envelope>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.name, "soap:Envelope");
        assert_eq!(
            root.namespaces,
            vec![(
                "soap".to_string(),
                "http://schemas.xmlsoap.org/soap/envelope/".to_string()
            )]
        );
        let body = &root.children[0];
        assert_eq!(body.name, "soap:Body");
        let echo = &body.children[0];
        assert_eq!(echo.name, "ns:Echo");
        assert_eq!(echo.namespaces[0].0, "ns");
        assert_eq!(echo.children[0].text, "7");
    }

    #[test]
    fn test_parse_attributes_and_nil() {
        let doc = br#"<a x="1"><b xsi:nil="true"/></a>"#;
        let root = parse(doc).unwrap();
        assert_eq!(root.attr("x"), Some("1"));
        assert_eq!(root.children[0].attr("xsi:nil"), Some("true"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse(b"not xml at all <<<").is_err());
        assert!(parse(b"").is_err());
    }

    #[test]
    fn test_strip_control_characters() {
        assert_eq!(strip_control("a\u{8}b\u{c}c"), "abc");
        assert_eq!(strip_control(r"a\bb\fc"), "abc");
    }

    #[test]
    fn test_write_round_trip() {
        let doc = br#"<a x="1" xmlns:n="u:n"><n:b>hi</n:b><c/></a>"#;
        let root = parse(doc).unwrap();
        let written = write_document(&root);
        assert!(written.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        let reparsed = parse(written.as_bytes()).unwrap();
        assert_eq!(root, reparsed);
    }
}
