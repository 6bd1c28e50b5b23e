//! `<atom:author>`

use crate::error::ParseError;
use crate::parsable::Parsable;
use crate::parser::{self, ParserOptions, XmlNode, ATOM_NS};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Author {
    name: String,
    uri: Option<String>,
    email_address: Option<String>,
}

impl Author {
    pub fn new(name: &str, uri: Option<&str>, email_address: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            uri: uri.map(String::from),
            email_address: email_address.map(String::from),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn email_address(&self) -> Option<&str> {
        self.email_address.as_deref()
    }
}

impl Parsable for Author {
    fn element_name(&self) -> &'static str {
        "author"
    }

    fn parse_xml(&mut self, node: &XmlNode) -> Result<bool, ParseError> {
        if node.is_namespace(ATOM_NS) == false {
            return Ok(false);
        }

        let options = ParserOptions::NO_DUPES | ParserOptions::REQUIRED | ParserOptions::NON_EMPTY;
        let mut name = if self.name.is_empty() { None } else { Some(self.name.clone()) };
        if parser::string_from_element(node, "name", options, &mut name)? {
            self.name = name.unwrap_or_default();
            return Ok(true);
        }
        Ok(parser::string_from_element(node, "uri", options, &mut self.uri)? ||
           parser::string_from_element(node, "email", options, &mut self.email_address)?)
    }

    fn post_parse_xml(&mut self) -> Result<(), ParseError> {
        if self.name.is_empty() {
            return Err(ParseError::required_element_missing("name", "author"));
        }
        Ok(())
    }

    fn render_xml(&self, xml: &mut String) {
        parser::append_escaped(xml, "<name>", &self.name, "</name>");
        if let Some(uri) = &self.uri {
            parser::append_escaped(xml, "<uri>", uri, "</uri>");
        }
        if let Some(email) = &self.email_address {
            parser::append_escaped(xml, "<email>", email, "</email>");
        }
    }
}
