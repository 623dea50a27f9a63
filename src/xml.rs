//! XML request rendering and response parsing.
//!
//! Storage and Service Bus speak XML.  Responses are parsed into a small
//! element tree ([`XmlNode`]) keyed by local names, so namespace prefixes
//! (`d2p1:ActiveMessageCount`) and interleaved lists (`<PageRange>` mixed
//! with `<ClearRange>`) need no special casing.  Request bodies are produced
//! with [`XmlWriter`] on top of `quick-xml`.

use std::io::Cursor;
use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::errors::{Error, Result};

// ── Parsing ─────────────────────────────────────────────────────────

/// One XML element with its attributes, text content and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local name (namespace prefix stripped).
    pub name: String,
    /// Attributes as `(local_name, value)` pairs.
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// First child element named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Descend through a chain of child names.
    pub fn path(&self, names: &[&str]) -> Option<&XmlNode> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Text of the first child named `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Parse the text of the first child named `name`.
    pub fn parse_child<T: FromStr>(&self, name: &str) -> Option<T> {
        self.child_text(name).and_then(|t| t.trim().parse().ok())
    }

    /// Boolean child (`true`/`false`, case-insensitive).
    pub fn bool_child(&self, name: &str) -> Option<bool> {
        self.child_text(name)
            .map(|t| t.trim().eq_ignore_ascii_case("true"))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn local(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::Xml(e.to_string())
}

fn start_node(start: &BytesStart<'_>) -> Result<XmlNode> {
    let mut node = XmlNode {
        name: local(start.local_name().as_ref()),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let value = attr.unescape_value().map_err(xml_err)?;
        node.attributes
            .push((local(attr.key.local_name().as_ref()), value.into_owned()));
    }
    Ok(node)
}

/// Parse an XML document and return its root element.
pub fn parse_document(input: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => stack.push(start_node(&e)?),
            Event::Empty(e) => {
                let node = start_node(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::Xml("unbalanced end tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            Event::Text(t) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Event::CData(c) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::Xml("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::Xml("document has no root element".to_string()))
}

/// Parse an XML response body.
pub fn parse_body(body: &[u8]) -> Result<XmlNode> {
    let text = std::str::from_utf8(body).map_err(xml_err)?;
    // Some services prefix the document with a UTF-8 BOM.
    parse_document(text.trim_start_matches('\u{feff}'))
}

// ── Rendering ───────────────────────────────────────────────────────

/// Incremental XML document builder.
///
/// Methods chain; the first write error is kept and reported by
/// [`XmlWriter::finish`].
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
    error: Option<Error>,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    /// Start a document with an `<?xml version="1.0" encoding="utf-8"?>` declaration.
    pub fn new() -> Self {
        let mut w = Self {
            writer: Writer::new(Cursor::new(Vec::new())),
            error: None,
        };
        w.event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)));
        w
    }

    fn event(&mut self, event: Event<'_>) -> &mut Self {
        if self.error.is_none() {
            if let Err(e) = self.writer.write_event(event) {
                self.error = Some(xml_err(e));
            }
        }
        self
    }

    /// Open `<tag attr="value" ...>`.
    pub fn start(&mut self, tag: &str, attributes: &[(&str, &str)]) -> &mut Self {
        let start = BytesStart::new(tag).with_attributes(attributes.iter().copied());
        self.event(Event::Start(start))
    }

    /// Close `</tag>`.
    pub fn end(&mut self, tag: &str) -> &mut Self {
        self.event(Event::End(BytesEnd::new(tag)))
    }

    /// Write `<tag>text</tag>`.
    pub fn text_element(&mut self, tag: &str, text: &str) -> &mut Self {
        self.event(Event::Start(BytesStart::new(tag)));
        self.event(Event::Text(BytesText::new(text)));
        self.event(Event::End(BytesEnd::new(tag)))
    }

    /// Write `<tag>text</tag>` only when `text` is present.
    pub fn opt_element<T: ToString>(&mut self, tag: &str, value: Option<T>) -> &mut Self {
        match value {
            Some(v) => self.text_element(tag, &v.to_string()),
            None => self,
        }
    }

    /// Finish the document and return it as a string.
    pub fn finish(self) -> Result<String> {
        if let Some(e) = self.error {
            return Err(e);
        }
        String::from_utf8(self.writer.into_inner().into_inner()).map_err(xml_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_with_interleaved_lists() {
        let doc = r#"<?xml version="1.0" encoding="utf-8"?>
<PageList>
  <PageRange><Start>0</Start><End>511</End></PageRange>
  <ClearRange><Start>512</Start><End>1023</End></ClearRange>
  <PageRange><Start>1024</Start><End>1535</End></PageRange>
  <NextMarker />
</PageList>"#;
        let root = parse_document(doc).unwrap();
        assert_eq!(root.name, "PageList");
        assert_eq!(root.children_named("PageRange").count(), 2);
        assert_eq!(root.children_named("ClearRange").count(), 1);
        let last: u64 = root
            .children_named("PageRange")
            .last()
            .unwrap()
            .parse_child("End")
            .unwrap();
        assert_eq!(last, 1535);
        assert_eq!(root.child_text("NextMarker"), Some(""));
    }

    #[test]
    fn test_parse_strips_namespace_prefixes() {
        let doc = r#"<entry xmlns="http://www.w3.org/2005/Atom"><content type="application/xml"><QueueDescription xmlns:d2p1="http://schemas.microsoft.com/netservices/2011/06/servicebus"><CountDetails><d2p1:ActiveMessageCount>7</d2p1:ActiveMessageCount></CountDetails></QueueDescription></content></entry>"#;
        let root = parse_document(doc).unwrap();
        let content = root.child("content").unwrap();
        assert_eq!(content.attr("type"), Some("application/xml"));
        let count: u64 = root
            .path(&["content", "QueueDescription", "CountDetails"])
            .unwrap()
            .parse_child("ActiveMessageCount")
            .unwrap();
        assert_eq!(count, 7);
    }

    #[test]
    fn test_parse_unescapes_text() {
        let root = parse_document("<Name>a &amp; b</Name>").unwrap();
        assert_eq!(root.text, "a & b");
    }

    #[test]
    fn test_parse_rejects_truncated_document() {
        assert!(parse_document("<Ranges><Range>").is_err());
    }

    #[test]
    fn test_parse_body_with_bom() {
        let body = "\u{feff}<Error><Code>X</Code></Error>".as_bytes();
        let root = parse_body(body).unwrap();
        assert_eq!(root.child_text("Code"), Some("X"));
    }

    #[test]
    fn test_writer_round_trip() {
        let mut w = XmlWriter::new();
        w.start("SignedIdentifiers", &[])
            .start("SignedIdentifier", &[])
            .text_element("Id", "policy<1>")
            .opt_element::<&str>("Missing", None)
            .end("SignedIdentifier")
            .end("SignedIdentifiers");
        let out = w.finish().unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(out.contains("<Id>policy&lt;1&gt;</Id>"));
        assert!(!out.contains("Missing"));

        let root = parse_document(&out).unwrap();
        assert_eq!(
            root.path(&["SignedIdentifier", "Id"]).unwrap().text,
            "policy<1>"
        );
    }
}
