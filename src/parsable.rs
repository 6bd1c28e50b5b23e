//! The parsing/rendering contract shared by entries, feeds and the values embedded in them
//!
//! Parsing an XML document goes through three phases:
//! * [`Parsable::pre_parse_xml`] reads the attributes of the root element,
//! * [`Parsable::parse_xml`] is called once per child element, and returns whether it consumed it.
//!   Children nobody consumes end up in [`Parsable::unknown_xml`],
//! * [`Parsable::post_parse_xml`] checks required fields and finalizes lists.
//!
//! JSON documents follow the same shape, one member at a time. Rendering mirrors parsing:
//! [`Parsable::pre_render_xml`] writes root attributes, [`Parsable::render_xml`] writes the children,
//! and [`Parsable::namespaces`] fills the prefix table that is declared on the outermost element.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use minidom::Element;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::parser::{self, JsonMember, XmlNode, ATOM_NS};

/// The two body formats the services speak
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    AtomXml,
    Json,
}

impl ContentType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentType::AtomXml => "application/atom+xml",
            ContentType::Json => "application/json",
        }
    }

    /// Picks the format from a response `Content-Type`. Anything that is not JSON is taken as XML.
    pub fn from_header(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.split(';').next().map(|m| m.trim().eq_ignore_ascii_case("application/json")) == Some(true) => ContentType::Json,
            _ => ContentType::AtomXml,
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// Namespace prefix → URI, declared on the outermost rendered element
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceTable {
    prefixes: BTreeMap<String, String>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prefix: &str, uri: &str) {
        self.prefixes.insert(prefix.to_string(), uri.to_string());
    }

    pub fn get(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

/// Elements and members that were not understood, kept so that they survive a round trip
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extensions {
    xml: Vec<String>,
    json: Map<String, Value>,
}

impl Extensions {
    pub fn push_xml(&mut self, element: &Element) {
        let mut buffer = Vec::new();
        match element.write_to(&mut buffer) {
            Ok(()) => self.xml.push(String::from_utf8_lossy(&buffer).into_owned()),
            Err(err) => log::warn!("Dropping unknown <{}> element: {}", element.name(), err),
        }
    }

    pub fn push_json(&mut self, name: &str, value: &Value) {
        self.json.insert(name.to_string(), value.clone());
    }

    /// Raw XML of the unknown elements, in document order
    pub fn xml(&self) -> &[String] {
        &self.xml
    }

    pub fn json(&self) -> &Map<String, Value> {
        &self.json
    }

    pub fn is_empty(&self) -> bool {
        self.xml.is_empty() && self.json.is_empty()
    }

    pub fn render_xml(&self, xml: &mut String) {
        for fragment in &self.xml {
            xml.push_str(fragment);
        }
    }

    /// Writes back the unknown members that were not rendered by anyone else
    pub fn render_json(&self, map: &mut Map<String, Value>) {
        for (name, value) in &self.json {
            if map.contains_key(name) == false {
                map.insert(name.clone(), value.clone());
            }
        }
    }
}


/// Skips the byte order mark and the `<?xml ...?>` declaration, if any
pub(crate) fn strip_declaration(text: &str) -> &str {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    if text.starts_with("<?xml") {
        if let Some(end) = text.find("?>") {
            return text[end + 2..].trim_start();
        }
    }
    text
}


/// Something that can be built from, and rendered to, Atom XML or JSON
pub trait Parsable: Sized + Default {
    /// Qualified name of the XML element, e.g. `entry` or `gd:who`
    fn element_name(&self) -> &'static str;

    /// Namespace of the XML element
    fn element_namespace(&self) -> &'static str {
        ATOM_NS
    }

    fn content_type(&self) -> ContentType {
        ContentType::AtomXml
    }

    fn pre_parse_xml(&mut self, _root: &XmlNode) -> Result<(), ParseError> {
        Ok(())
    }

    /// Consumes one child element. Returns `Ok(false)` (without touching `self`) for unrecognized nodes.
    fn parse_xml(&mut self, _node: &XmlNode) -> Result<bool, ParseError> {
        Ok(false)
    }

    fn post_parse_xml(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    /// Receives the child elements that [`Self::parse_xml`] did not consume
    fn unknown_xml(&mut self, node: &XmlNode) {
        log::trace!("Ignoring unknown element {}", node.describe());
    }

    /// Consumes one member. Returns `Ok(false)` (without touching `self`) for unrecognized members.
    fn parse_json(&mut self, _member: &JsonMember) -> Result<bool, ParseError> {
        Ok(false)
    }

    fn post_parse_json(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    fn unknown_json(&mut self, member: &JsonMember) {
        log::trace!("Ignoring unknown member {}", member.name);
    }

    /// Writes the attributes of the root element, each preceded by a space
    fn pre_render_xml(&self, _xml: &mut String) {}

    /// Writes the children, in a fixed order
    fn render_xml(&self, _xml: &mut String) {}

    fn namespaces(&self, _namespaces: &mut NamespaceTable) {}

    fn render_json(&self, _map: &mut Map<String, Value>) {}


    /// Parses a complete XML document
    fn from_xml(document: &[u8]) -> Result<Self, ParseError> {
        let text = std::str::from_utf8(document).map_err(|err| ParseError::Xml(err.to_string()))?;
        let root: Element = strip_declaration(text).parse()?;

        let expected = Self::default().element_name();
        let expected_local = expected.rsplit(':').next().unwrap_or(expected);
        if root.name() != expected_local {
            return Err(ParseError::UnexpectedRoot { expected: expected_local.to_string(), found: root.name().to_string() });
        }
        Self::from_xml_node(&XmlNode::new(&root, ""))
    }

    /// Runs the three parsing phases on an element
    fn from_xml_node(node: &XmlNode) -> Result<Self, ParseError> {
        let mut parsable = Self::default();
        parsable.pre_parse_xml(node)?;
        for child in node.children() {
            if parsable.parse_xml(&child)? == false {
                parsable.unknown_xml(&child);
            }
        }
        parsable.post_parse_xml()?;
        Ok(parsable)
    }

    /// Parses a complete JSON document
    fn from_json(document: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(document)?;
        Self::from_json_value(&value)
    }

    fn from_json_value(value: &Value) -> Result<Self, ParseError> {
        let object = match value {
            Value::Object(o) => o,
            other => return Err(ParseError::Json(format!("expected an object, got {}", other))),
        };

        let mut parsable = Self::default();
        for (name, value) in object {
            let member = JsonMember::new(name, value);
            if parsable.parse_json(&member)? == false {
                parsable.unknown_json(&member);
            }
        }
        parsable.post_parse_json()?;
        Ok(parsable)
    }

    /// Parses a document in whichever format `content_type` says
    fn from_document(content_type: ContentType, document: &[u8]) -> Result<Self, ParseError> {
        match content_type {
            ContentType::AtomXml => Self::from_xml(document),
            ContentType::Json => Self::from_json(document),
        }
    }

    /// Renders this as a complete XML document, namespaces declared on the root element
    fn to_xml(&self) -> String {
        let mut namespaces = NamespaceTable::new();
        self.namespaces(&mut namespaces);

        let mut xml = String::new();
        xml.push('<');
        xml.push_str(self.element_name());
        parser::append_escaped(&mut xml, " xmlns='", self.element_namespace(), "'");
        for (prefix, uri) in namespaces.iter() {
            xml.push_str(" xmlns:");
            xml.push_str(prefix);
            parser::append_escaped(&mut xml, "='", uri, "'");
        }
        self.render_element_body(&mut xml);
        xml
    }

    /// Renders this as an element nested in a document whose root already declared the namespaces
    fn append_xml(&self, xml: &mut String) {
        xml.push('<');
        xml.push_str(self.element_name());
        self.render_element_body(xml);
    }

    #[doc(hidden)]
    fn render_element_body(&self, xml: &mut String) {
        self.pre_render_xml(xml);

        let mut content = String::new();
        self.render_xml(&mut content);
        if content.is_empty() {
            xml.push_str("/>");
        } else {
            xml.push('>');
            xml.push_str(&content);
            xml.push_str("</");
            xml.push_str(self.element_name());
            xml.push('>');
        }
    }

    fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        self.render_json(&mut map);
        Value::Object(map)
    }

    fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Renders in whichever format [`Self::content_type`] says
    fn to_document(&self) -> String {
        match self.content_type() {
            ContentType::AtomXml => self.to_xml(),
            ContentType::Json => self.to_json(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParserOptions;

    #[derive(Default, Debug)]
    struct Note {
        text: Option<String>,
        extensions: Extensions,
    }

    impl Parsable for Note {
        fn element_name(&self) -> &'static str {
            "note"
        }

        fn parse_xml(&mut self, node: &XmlNode) -> Result<bool, ParseError> {
            if node.is_namespace(ATOM_NS) {
                return parser::string_from_element(node, "text", ParserOptions::NO_DUPES, &mut self.text);
            }
            Ok(false)
        }

        fn unknown_xml(&mut self, node: &XmlNode) {
            self.extensions.push_xml(node.element);
        }

        fn render_xml(&self, xml: &mut String) {
            if let Some(text) = &self.text {
                parser::append_escaped(xml, "<text>", text, "</text>");
            }
            self.extensions.render_xml(xml);
        }
    }

    #[test]
    fn unknown_children_survive() {
        let doc = "<note xmlns='http://www.w3.org/2005/Atom'><text>a &amp; b</text><color xmlns='urn:test' value='red'/></note>";
        let note = Note::from_xml(doc.as_bytes()).unwrap();
        assert_eq!(note.text.as_deref(), Some("a & b"));
        assert_eq!(note.extensions.xml().len(), 1);

        let again = Note::from_xml(note.to_xml().as_bytes()).unwrap();
        assert_eq!(again.text.as_deref(), Some("a & b"));
        assert_eq!(again.extensions.xml().len(), 1);
        assert!(again.extensions.xml()[0].contains("urn:test"));
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = Note::from_xml(b"<entry xmlns='http://www.w3.org/2005/Atom'/>").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedRoot { .. }));
        assert!(Note::from_xml(b"<note").is_err());
    }

    #[test]
    fn content_type_dispatch() {
        assert_eq!(ContentType::from_header(Some("application/json; charset=UTF-8")), ContentType::Json);
        assert_eq!(ContentType::from_header(Some("application/atom+xml")), ContentType::AtomXml);
        assert_eq!(ContentType::from_header(None), ContentType::AtomXml);
    }
}
