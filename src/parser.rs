//! Helpers to parse individual XML elements and JSON members
//!
//! Every `*_from_element` / `*_from_json_member` helper returns `Ok(false)` when the node is not
//! the one it looks for (leaving the output untouched), `Ok(true)` when it consumed it, and an
//! error when the node matched but broke one of the [`ParserOptions`]. This lets callers chain them:
//!
//! ```ignore
//! if parser::string_from_element(node, "title", ParserOptions::NO_DUPES, &mut self.title)? ||
//!    parser::time_from_element(node, "updated", ParserOptions::REQUIRED, &mut self.updated)? {
//!     return Ok(true);
//! }
//! ```

use std::borrow::Cow;

use bitflags::bitflags;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use minidom::Element;
use serde_json::Value;

use crate::error::ParseError;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const GD_NS: &str = "http://schemas.google.com/g/2005";
pub const BATCH_NS: &str = "http://schemas.google.com/gdata/batch";
pub const OPENSEARCH_NS: &str = "http://a9.com/-/spec/opensearch/1.1/";
pub const APP_NS: &str = "http://www.w3.org/2007/app";

/// A colour, as found in JSON members such as `backgroundColor`
pub type Colour = csscolorparser::Color;

bitflags! {
    /// Checks applied by the parsing helpers
    pub struct ParserOptions: u8 {
        /// The element must have content
        const REQUIRED = 0b0001;
        /// The content must not be empty
        const NON_EMPTY = 0b0010;
        /// The element may only appear once
        const NO_DUPES = 0b0100;
        /// Missing content gives an empty string instead of nothing
        const DEFAULT = 0b1000;
    }
}

/// An XML element being parsed, along with the name of its parent (used in error messages)
#[derive(Clone, Copy, Debug)]
pub struct XmlNode<'a> {
    pub element: &'a Element,
    pub parent: &'a str,
}

impl<'a> XmlNode<'a> {
    pub fn new(element: &'a Element, parent: &'a str) -> Self {
        Self { element, parent }
    }

    pub fn name(&self) -> &str {
        self.element.name()
    }

    pub fn is_namespace(&self, namespace: &str) -> bool {
        self.element.has_ns(namespace)
    }

    /// Whether this is `<name>` in the given namespace
    pub fn is(&self, name: &str, namespace: &str) -> bool {
        self.element.is(name, namespace)
    }

    pub fn text(&self) -> String {
        self.element.text()
    }

    /// Looks an attribute up by local name, whatever its prefix
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        if let Some(value) = self.element.attr(name) {
            return Some(value);
        }
        self.element.attrs()
            .find(|(key, _)| key.rsplit(':').next() == Some(name) && key.starts_with("xmlns") == false)
            .map(|(_, value)| value)
    }

    /// The children of this element, with this element as their parent
    pub fn children(&self) -> impl Iterator<Item = XmlNode<'a>> + 'a {
        let parent = self.element.name();
        self.element.children().map(move |child| XmlNode::new(child, parent))
    }

    /// `<parent/name>`, as used in error messages
    pub fn describe(&self) -> String {
        format!("<{}/{}>", self.parent, self.name())
    }
}

/// A JSON member being parsed
#[derive(Clone, Copy, Debug)]
pub struct JsonMember<'a> {
    pub name: &'a str,
    pub value: &'a Value,
}

impl<'a> JsonMember<'a> {
    pub fn new(name: &'a str, value: &'a Value) -> Self {
        Self { name, value }
    }
}


fn checked_text(node: &XmlNode, options: ParserOptions) -> Result<Option<String>, ParseError> {
    let text = node.text();
    if text.is_empty() {
        if options.intersects(ParserOptions::REQUIRED | ParserOptions::NON_EMPTY) {
            return Err(ParseError::missing_content(node.describe()));
        }
        if options.contains(ParserOptions::DEFAULT) {
            return Ok(Some(String::new()));
        }
        return Ok(None);
    }
    Ok(Some(text))
}

pub fn string_from_element(node: &XmlNode, element_name: &str, options: ParserOptions, output: &mut Option<String>) -> Result<bool, ParseError> {
    if node.name() != element_name {
        return Ok(false);
    }
    if options.contains(ParserOptions::NO_DUPES) && output.is_some() {
        return Err(ParseError::duplicate(node.describe()));
    }

    *output = checked_text(node, options)?;
    Ok(true)
}

pub fn time_from_element(node: &XmlNode, element_name: &str, options: ParserOptions, output: &mut Option<DateTime<Utc>>) -> Result<bool, ParseError> {
    if node.name() != element_name {
        return Ok(false);
    }
    if options.contains(ParserOptions::NO_DUPES) && output.is_some() {
        return Err(ParseError::duplicate(node.describe()));
    }

    match checked_text(node, options)? {
        None => Ok(true),
        Some(text) => {
            let time = parse_iso8601(&text).ok_or_else(|| ParseError::NotIso8601 {
                element: node.describe(),
                content: text.clone(),
            })?;
            *output = Some(time);
            Ok(true)
        },
    }
}

pub fn int_from_element(node: &XmlNode, element_name: &str, options: ParserOptions, output: &mut Option<i64>) -> Result<bool, ParseError> {
    if node.name() != element_name {
        return Ok(false);
    }
    if options.contains(ParserOptions::NO_DUPES) && output.is_some() {
        return Err(ParseError::duplicate(node.describe()));
    }

    if let Some(text) = checked_text(node, options)? {
        let value = text.trim().parse::<i64>().map_err(|_| ParseError::WrongType {
            element: node.describe(),
            content: text.clone(),
        })?;
        *output = Some(value);
    }
    Ok(true)
}

/// Reads an attribute that must be present (and, with `NON_EMPTY`, not empty)
pub fn required_attribute(node: &XmlNode, property: &str, options: ParserOptions) -> Result<String, ParseError> {
    match node.attr(property) {
        None => Err(ParseError::RequiredPropertyMissing { element: node.describe(), property: property.to_string() }),
        Some("") if options.contains(ParserOptions::NON_EMPTY) => {
            Err(ParseError::RequiredPropertyMissing { element: node.describe(), property: property.to_string() })
        },
        Some(value) => Ok(value.to_string()),
    }
}

/// Reads a `true`/`false` attribute, falling back to `default` when absent
pub fn boolean_from_property(node: &XmlNode, property: &str, default: bool) -> Result<bool, ParseError> {
    match node.attr(property) {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ParseError::WrongType { element: format!("{}@{}", node.describe(), property), content: other.to_string() }),
    }
}


fn json_string<'a>(member: &JsonMember<'a>) -> Result<Option<&'a str>, ParseError> {
    match member.value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.as_str())),
        other => Err(ParseError::WrongType { element: member.name.to_string(), content: other.to_string() }),
    }
}

pub fn string_from_json_member(member: &JsonMember, member_name: &str, options: ParserOptions, output: &mut Option<String>) -> Result<bool, ParseError> {
    if member.name != member_name {
        return Ok(false);
    }

    let text = json_string(member)?;
    match text {
        None if options.contains(ParserOptions::REQUIRED) => Err(ParseError::missing_content(member.name)),
        Some("") if options.contains(ParserOptions::NON_EMPTY) => Err(ParseError::missing_content(member.name)),
        None | Some("") if options.contains(ParserOptions::DEFAULT) => {
            *output = Some(String::new());
            Ok(true)
        },
        None => {
            *output = None;
            Ok(true)
        },
        Some(text) => {
            *output = Some(text.to_string());
            Ok(true)
        },
    }
}

pub fn int_from_json_member(member: &JsonMember, member_name: &str, options: ParserOptions, output: &mut Option<i64>) -> Result<bool, ParseError> {
    if member.name != member_name {
        return Ok(false);
    }

    match member.value {
        Value::Null if options.contains(ParserOptions::REQUIRED) => Err(ParseError::missing_content(member.name)),
        Value::Null => Ok(true),
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                *output = Some(i);
                Ok(true)
            },
            None => Err(ParseError::WrongType { element: member.name.to_string(), content: n.to_string() }),
        },
        // Some services send 64-bit integers as strings
        Value::String(s) => match s.parse::<i64>() {
            Ok(i) => {
                *output = Some(i);
                Ok(true)
            },
            Err(_) => Err(ParseError::WrongType { element: member.name.to_string(), content: s.clone() }),
        },
        other => Err(ParseError::WrongType { element: member.name.to_string(), content: other.to_string() }),
    }
}

pub fn time_from_json_member(member: &JsonMember, member_name: &str, options: ParserOptions, output: &mut Option<DateTime<Utc>>) -> Result<bool, ParseError> {
    if member.name != member_name {
        return Ok(false);
    }

    match json_string(member)? {
        None | Some("") if options.intersects(ParserOptions::REQUIRED | ParserOptions::NON_EMPTY) => {
            Err(ParseError::missing_content(member.name))
        },
        None | Some("") => Ok(true),
        Some(text) => match parse_iso8601(text) {
            Some(time) => {
                *output = Some(time);
                Ok(true)
            },
            None => Err(ParseError::NotIso8601 { element: member.name.to_string(), content: text.to_string() }),
        },
    }
}

pub fn boolean_from_json_member(member: &JsonMember, member_name: &str, options: ParserOptions, output: &mut Option<bool>) -> Result<bool, ParseError> {
    if member.name != member_name {
        return Ok(false);
    }

    match member.value {
        Value::Bool(b) => {
            *output = Some(*b);
            Ok(true)
        },
        Value::Null if options.contains(ParserOptions::REQUIRED) => Err(ParseError::missing_content(member.name)),
        Value::Null => Ok(true),
        other => Err(ParseError::WrongType { element: member.name.to_string(), content: other.to_string() }),
    }
}

/// An array of strings
pub fn strv_from_json_member(member: &JsonMember, member_name: &str, options: ParserOptions, output: &mut Vec<String>) -> Result<bool, ParseError> {
    if member.name != member_name {
        return Ok(false);
    }

    match member.value {
        Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => values.push(s.clone()),
                    other => return Err(ParseError::WrongType { element: member.name.to_string(), content: other.to_string() }),
                }
            }
            *output = values;
            Ok(true)
        },
        Value::Null if options.contains(ParserOptions::REQUIRED) => Err(ParseError::missing_content(member.name)),
        Value::Null => Ok(true),
        other => Err(ParseError::WrongType { element: member.name.to_string(), content: other.to_string() }),
    }
}

/// A `#RRGGBB` (or `RRGGBB`) colour
pub fn colour_from_json_member(member: &JsonMember, member_name: &str, options: ParserOptions, output: &mut Option<Colour>) -> Result<bool, ParseError> {
    if member.name != member_name {
        return Ok(false);
    }

    let text = match json_string(member)? {
        None | Some("") if options.contains(ParserOptions::REQUIRED) => return Err(ParseError::missing_content(member.name)),
        None | Some("") => return Ok(true),
        Some(text) => text,
    };

    match parse_hex_colour(text) {
        Some(colour) => {
            *output = Some(colour);
            Ok(true)
        },
        None => Err(ParseError::NotHexColour { element: member.name.to_string(), content: text.to_string() }),
    }
}

pub fn parse_hex_colour(text: &str) -> Option<Colour> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || hex.chars().all(|c| c.is_ascii_hexdigit()) == false {
        return None;
    }
    csscolorparser::parse(&format!("#{}", hex)).ok()
}

/// `#rrggbb`
pub fn colour_to_hex(colour: &Colour) -> String {
    colour.to_hex_string()
}


/// Parses an ISO 8601 date-time. Missing time zones are taken as UTC.
pub fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y%m%dT%H%M%SZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Formats a time the way the services expect it, e.g. `2025-01-01T00:00:00Z`.
///
/// Fractions of a second are kept, in milliseconds, microseconds or nanoseconds as needed.
pub fn to_iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Escapes text so that it can be used both as XML content and inside a quoted attribute
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if text.contains(|c| matches!(c, '&' | '<' | '>' | '\'' | '"')) == false {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 10);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Appends `pre`, the escaped `content`, then `post`
pub fn append_escaped(xml: &mut String, pre: &str, content: &str, post: &str) {
    xml.push_str(pre);
    xml.push_str(&escape_xml(content));
    xml.push_str(post);
}
