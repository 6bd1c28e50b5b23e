//! `<atom:category>`

use crate::error::ParseError;
use crate::parsable::Parsable;
use crate::parser::{self, ParserOptions, XmlNode};

/// Scheme of the category that carries an entry's kind term
pub const KIND_SCHEME: &str = "http://schemas.google.com/g/2005#kind";

/// A (scheme, term, label) triple classifying an entry or a feed
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Category {
    term: String,
    scheme: Option<String>,
    label: Option<String>,
}

impl Category {
    pub fn new(term: &str, scheme: Option<&str>, label: Option<&str>) -> Self {
        Self {
            term: term.to_string(),
            scheme: scheme.map(String::from),
            label: label.map(String::from),
        }
    }

    /// The category a JSON `kind` member stands for
    pub fn kind(term: &str) -> Self {
        Self::new(term, Some(KIND_SCHEME), None)
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_kind(&self) -> bool {
        self.scheme.as_deref() == Some(KIND_SCHEME)
    }
}

impl Parsable for Category {
    fn element_name(&self) -> &'static str {
        "category"
    }

    fn pre_parse_xml(&mut self, root: &XmlNode) -> Result<(), ParseError> {
        self.term = parser::required_attribute(root, "term", ParserOptions::NON_EMPTY)?;
        self.scheme = match root.attr("scheme") {
            Some("") => return Err(ParseError::RequiredPropertyMissing { element: root.describe(), property: "scheme".into() }),
            other => other.map(String::from),
        };
        self.label = root.attr("label").map(String::from);
        Ok(())
    }

    fn pre_render_xml(&self, xml: &mut String) {
        parser::append_escaped(xml, " term='", &self.term, "'");
        if let Some(scheme) = &self.scheme {
            parser::append_escaped(xml, " scheme='", scheme, "'");
        }
        if let Some(label) = &self.label {
            parser::append_escaped(xml, " label='", label, "'");
        }
    }
}
