//! Incremental tree construction with nested closures.
//!
//! ```
//! use errbit_xml::{NO_ATTRIBUTES, XmlDocument};
//!
//! let mut doc = XmlDocument::new();
//! doc.builder().tag_with("product", "", NO_ATTRIBUTES, |product| {
//!     product.tag("name", "Plush Puppy Toy");
//!     product.tag("price", "$8").attribute("currency", "USD");
//!     product.tag_with("discount", "", NO_ATTRIBUTES, |discount| {
//!         discount.tag("percent", 20);
//!         discount.tag("name", "20% off promotion");
//!     });
//! });
//! assert!(doc.to_xml().contains("<price currency=\"USD\">$8</price>"));
//! ```

use crate::sanitize_xml_text;
use crate::value::XmlValue;

/// Pass as `attributes` when a tag has none.
pub const NO_ATTRIBUTES: [(&str, &str); 0] = [];

/// Name of the hidden wrapper element that holds top-level tags.
const ROOT_NAME: &str = "__ErrbitXmlBuilder__";

#[derive(Debug, Clone, Default, PartialEq)]
struct Element {
    name: String,
    text: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn new(name: &str, value: XmlValue) -> Self {
        Self {
            name: name.to_string(),
            text: value.to_string(),
            ..Self::default()
        }
    }

    fn set_attribute(&mut self, name: &str, value: String) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape(value));
            out.push('"');
        }

        if self.text.is_empty() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        out.push('>');
        out.push_str(&escape(&self.text));
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn escape(raw: &str) -> String {
    quick_xml::escape::escape(sanitize_xml_text(raw).as_ref()).into_owned()
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An XML document under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    root: Element,
}

impl XmlDocument {
    pub fn new() -> Self {
        Self {
            root: Element::new(ROOT_NAME, XmlValue::Null),
        }
    }

    /// Builder positioned at the document level.
    pub fn builder(&mut self) -> XmlBuilder<'_> {
        XmlBuilder {
            node: &mut self.root,
        }
    }

    /// Serialize with an XML declaration followed by every top-level element.
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        for child in &self.root.children {
            child.write(&mut out);
        }
        out
    }
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// A builder scoped to one element of an [`XmlDocument`].
#[derive(Debug)]
pub struct XmlBuilder<'a> {
    node: &'a mut Element,
}

impl XmlBuilder<'_> {
    /// Append a child element and return a builder for it.
    ///
    /// Repeated calls with the same name create distinct siblings, in order.
    pub fn tag(&mut self, name: &str, value: impl Into<XmlValue>) -> XmlBuilder<'_> {
        self.node.children.push(Element::new(name, value.into()));
        let idx = self.node.children.len() - 1;
        XmlBuilder {
            node: &mut self.node.children[idx],
        }
    }

    /// Append a child element with attributes, then call `build` with a
    /// builder scoped to the new child.
    pub fn tag_with<K, V>(
        &mut self,
        name: &str,
        value: impl Into<XmlValue>,
        attributes: impl IntoIterator<Item = (K, V)>,
        build: impl FnOnce(&mut XmlBuilder<'_>),
    ) -> XmlBuilder<'_>
    where
        K: AsRef<str>,
        V: Into<XmlValue>,
    {
        let mut child = self.tag(name, value);
        for (attr, v) in attributes {
            child.attribute(attr.as_ref(), v);
        }
        build(&mut child);
        child
    }

    /// Set an attribute on the current element. Empty names are ignored.
    pub fn attribute(&mut self, name: &str, value: impl Into<XmlValue>) -> &mut Self {
        if !name.is_empty() {
            self.node.set_attribute(name, value.into().to_string());
        }
        self
    }

    /// Serialize the current element and its subtree (no declaration).
    pub fn as_xml(&self) -> String {
        let mut out = String::new();
        self.node.write(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    use super::*;

    /// Parse `xml` and return all text content, panicking on malformed input.
    fn parse_text(xml: &str) -> String {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;
        let mut text = String::new();
        loop {
            match reader.read_event() {
                Ok(Event::Text(e)) => {
                    let chunk = e.unescape().expect("valid text");
                    if !chunk.trim().is_empty() {
                        text.push_str(&chunk);
                    }
                }
                Ok(Event::Start(e) | Event::Empty(e)) => {
                    for attr in e.attributes() {
                        attr.expect("valid attribute")
                            .unescape_value()
                            .expect("valid attribute value");
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed xml: {e}\n{xml}"),
            }
        }
        text
    }

    #[test]
    fn nested_closures_build_a_tree() {
        let mut doc = XmlDocument::new();
        let xml = doc
            .builder()
            .tag_with("product", "", NO_ATTRIBUTES, |product| {
                product.tag("name", "Plush Puppy Toy");
                product.tag_with("discount", "", [("kind", "seasonal")], |discount| {
                    discount.tag("percent", 20);
                });
            })
            .as_xml();

        assert_eq!(
            xml,
            "<product><name>Plush Puppy Toy</name>\
             <discount kind=\"seasonal\"><percent>20</percent></discount></product>"
        );
    }

    #[test]
    fn repeated_siblings_are_distinct_and_ordered() {
        let mut doc = XmlDocument::new();
        let xml = doc
            .builder()
            .tag_with("backtrace", "", NO_ATTRIBUTES, |bt| {
                for n in 1..=3 {
                    bt.tag("line", "").attribute("number", n);
                }
            })
            .as_xml();

        assert_eq!(
            xml,
            "<backtrace><line number=\"1\"/><line number=\"2\"/><line number=\"3\"/></backtrace>"
        );
    }

    #[test]
    fn attribute_chaining_and_replacement() {
        let mut doc = XmlDocument::new();
        let mut builder = doc.builder();
        let mut var = builder.tag("var", "v");
        var.attribute("key", "a").attribute("key", "b").attribute("", "ignored");
        assert_eq!(var.as_xml(), "<var key=\"b\">v</var>");
    }

    #[test]
    fn values_are_coerced() {
        let mut doc = XmlDocument::new();
        let mut b = doc.builder();
        b.tag("flag", true);
        b.tag("none", XmlValue::Null);
        b.tag("list", XmlValue::Array);
        b.tag("obj", XmlValue::Object("app::Session".into()));
        let xml = doc.to_xml();
        assert!(xml.contains("<flag>true</flag>"));
        assert!(xml.contains("<none/>"));
        assert!(xml.contains("<list>[array]</list>"));
        assert!(xml.contains("<obj>[app::Session]</obj>"));
    }

    #[test]
    fn escapes_markup_and_cdata_terminators() {
        let mut doc = XmlDocument::new();
        let nasty = "a < b && c > d ]]> \"q\" 'x'";
        doc.builder()
            .tag_with("root", "", NO_ATTRIBUTES, |root| {
                root.tag("message", nasty).attribute("title", nasty);
            });
        let xml = doc.to_xml();
        assert!(!xml.contains("]]>"));
        assert!(xml.contains("&lt;"));
        assert_eq!(parse_text(&xml), nasty);
    }

    #[test]
    fn control_characters_are_replaced_with_a_space() {
        let mut doc = XmlDocument::new();
        doc.builder().tag("message", "bad\u{0}\u{1}\u{8}char\u{FFFF}s\ttab");
        let xml = doc.to_xml();
        assert!(xml.contains("<message>bad char s\ttab</message>"));
        parse_text(&xml);
    }

    #[test]
    fn unicode_survives() {
        let mut doc = XmlDocument::new();
        doc.builder().tag("message", "héllo wörld ✓ 日本");
        assert_eq!(parse_text(&doc.to_xml()), "héllo wörld ✓ 日本");
    }

    #[test]
    fn declaration_and_top_level_siblings() {
        let mut doc = XmlDocument::new();
        doc.builder().tag("a", "1");
        doc.builder().tag("a", "2");
        assert_eq!(
            doc.to_xml(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>1</a><a>2</a>"
        );
    }
}
