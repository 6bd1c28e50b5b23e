//! `<atom:generator>`

use crate::error::ParseError;
use crate::parsable::Parsable;
use crate::parser::{self, XmlNode};

/// The software that produced a feed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Generator {
    name: Option<String>,
    uri: Option<String>,
    version: Option<String>,
}

impl Generator {
    pub fn new(name: Option<&str>, uri: Option<&str>, version: Option<&str>) -> Self {
        Self {
            name: name.map(String::from),
            uri: uri.map(String::from),
            version: version.map(String::from),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

impl Parsable for Generator {
    fn element_name(&self) -> &'static str {
        "generator"
    }

    fn pre_parse_xml(&mut self, root: &XmlNode) -> Result<(), ParseError> {
        let name = root.text();
        self.name = if name.is_empty() { None } else { Some(name) };
        self.uri = root.attr("uri").map(String::from);
        self.version = root.attr("version").map(String::from);
        Ok(())
    }

    fn pre_render_xml(&self, xml: &mut String) {
        if let Some(uri) = &self.uri {
            parser::append_escaped(xml, " uri='", uri, "'");
        }
        if let Some(version) = &self.version {
            parser::append_escaped(xml, " version='", version, "'");
        }
    }

    fn render_xml(&self, xml: &mut String) {
        if let Some(name) = &self.name {
            xml.push_str(&parser::escape_xml(name));
        }
    }
}
