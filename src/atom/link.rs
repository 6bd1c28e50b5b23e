//! `<atom:link>`

use crate::error::ParseError;
use crate::parsable::Parsable;
use crate::parser::{self, ParserOptions, XmlNode};

const IANA_PREFIX: &str = "http://www.iana.org/assignments/relation/";

pub const LINK_ALTERNATE: &str = "http://www.iana.org/assignments/relation/alternate";
pub const LINK_RELATED: &str = "http://www.iana.org/assignments/relation/related";
pub const LINK_SELF: &str = "http://www.iana.org/assignments/relation/self";
pub const LINK_ENCLOSURE: &str = "http://www.iana.org/assignments/relation/enclosure";
pub const LINK_VIA: &str = "http://www.iana.org/assignments/relation/via";
pub const LINK_EDIT: &str = "http://www.iana.org/assignments/relation/edit";
pub const LINK_EDIT_MEDIA: &str = "http://www.iana.org/assignments/relation/edit-media";
pub const LINK_NEXT: &str = "http://www.iana.org/assignments/relation/next";
pub const LINK_PREVIOUS: &str = "http://www.iana.org/assignments/relation/previous";

/// Expands the short IANA relation names (`self`, `next`...) to their full IRI
pub fn normalize_relation(relation: &str) -> String {
    if relation.is_empty() {
        LINK_ALTERNATE.to_string()
    } else if relation.contains(':') {
        relation.to_string()
    } else {
        format!("{}{}", IANA_PREFIX, relation)
    }
}

/// A typed link from an entry or a feed to another resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    uri: String,
    relation_type: String,
    content_type: Option<String>,
    language: Option<String>,
    title: Option<String>,
    length: Option<i64>,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            uri: String::new(),
            relation_type: LINK_ALTERNATE.to_string(),
            content_type: None,
            language: None,
            title: None,
            length: None,
        }
    }
}

impl Link {
    /// A new link. A `None` relation means `alternate`.
    pub fn new(uri: &str, relation_type: Option<&str>) -> Self {
        Self {
            uri: uri.to_string(),
            relation_type: normalize_relation(relation_type.unwrap_or("")),
            ..Self::default()
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn relation_type(&self) -> &str {
        &self.relation_type
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn length(&self) -> Option<i64> {
        self.length
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }

    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language;
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    pub fn set_length(&mut self, length: Option<i64>) {
        self.length = length;
    }

    /// Whether this link has the given relation (short names are accepted)
    pub fn has_relation(&self, relation: &str) -> bool {
        self.relation_type == normalize_relation(relation)
    }
}

impl Parsable for Link {
    fn element_name(&self) -> &'static str {
        "link"
    }

    fn pre_parse_xml(&mut self, root: &XmlNode) -> Result<(), ParseError> {
        self.uri = parser::required_attribute(root, "href", ParserOptions::empty())?;
        self.relation_type = normalize_relation(root.attr("rel").unwrap_or(""));
        self.content_type = root.attr("type").map(String::from);
        self.language = root.attr("hreflang").map(String::from);
        self.title = root.attr("title").map(String::from);
        self.length = match root.attr("length") {
            None => None,
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| ParseError::WrongType {
                element: format!("{}@length", root.describe()),
                content: raw.to_string(),
            })?),
        };
        Ok(())
    }

    fn pre_render_xml(&self, xml: &mut String) {
        parser::append_escaped(xml, " href='", &self.uri, "'");
        parser::append_escaped(xml, " rel='", &self.relation_type, "'");
        if let Some(content_type) = &self.content_type {
            parser::append_escaped(xml, " type='", content_type, "'");
        }
        if let Some(language) = &self.language {
            parser::append_escaped(xml, " hreflang='", language, "'");
        }
        if let Some(title) = &self.title {
            parser::append_escaped(xml, " title='", title, "'");
        }
        if let Some(length) = self.length {
            xml.push_str(&format!(" length='{}'", length));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relations_are_normalized() {
        assert_eq!(normalize_relation("next"), LINK_NEXT);
        assert_eq!(normalize_relation(""), LINK_ALTERNATE);
        assert_eq!(normalize_relation("http://schemas.google.com/g/2005#feed"), "http://schemas.google.com/g/2005#feed");
        assert!(Link::new("https://example.com/", Some("self")).has_relation(LINK_SELF));
    }

    #[test]
    fn href_is_required() {
        let root: minidom::Element = "<link xmlns='http://www.w3.org/2005/Atom' rel='next'/>".parse().unwrap();
        let err = Link::from_xml_node(&XmlNode::new(&root, "feed")).unwrap_err();
        assert_eq!(err.to_string(), "A required property of a <feed/link> element (@href) was not present.");
    }

    #[test]
    fn attributes_round_trip() {
        let mut link = Link::new("https://example.com/a?b=1&c=2", Some(LINK_EDIT));
        link.set_content_type(Some("application/atom+xml".into()));
        link.set_length(Some(42));

        let reparsed = Link::from_xml(link.to_xml().as_bytes()).unwrap();
        assert_eq!(reparsed, link);
    }
}
