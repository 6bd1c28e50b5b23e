//! Structured search filters, as sent in the `filter=` query parameter

use std::fmt::{Display, Formatter};

/// How the children of a container combine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterType {
    All,
    Any,
    Not,
}

impl FilterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::All => "all",
            FilterType::Any => "any",
            FilterType::Not => "not",
        }
    }
}

/// A node of a search filter expression
#[derive(Clone, Debug, PartialEq)]
pub enum SearchFilter {
    Container {
        filter_type: FilterType,
        children: Vec<SearchFilter>,
    },
    /// `property` must equal `value`
    Value {
        property: String,
        value: String,
    },
    /// Results within `radius` metres of a point
    Location {
        radius: u64,
        lat: f64,
        lon: f64,
    },
}

impl SearchFilter {
    pub fn all(children: Vec<SearchFilter>) -> Self {
        SearchFilter::Container { filter_type: FilterType::All, children }
    }

    pub fn any(children: Vec<SearchFilter>) -> Self {
        SearchFilter::Container { filter_type: FilterType::Any, children }
    }

    pub fn not(children: Vec<SearchFilter>) -> Self {
        SearchFilter::Container { filter_type: FilterType::Not, children }
    }

    pub fn value(property: &str, value: &str) -> Self {
        SearchFilter::Value { property: property.to_string(), value: value.to_string() }
    }

    pub fn location(radius: u64, lat: f64, lon: f64) -> Self {
        SearchFilter::Location { radius, lat, lon }
    }

    /// Appends a child to a container. Returns `false` (and drops `child`) for leaf nodes.
    pub fn push(&mut self, child: SearchFilter) -> bool {
        match self {
            SearchFilter::Container { children, .. } => {
                children.push(child);
                true
            },
            _ => false,
        }
    }

    fn write_expression(&self, out: &mut String) {
        match self {
            SearchFilter::Container { filter_type, children } => {
                out.push('(');
                out.push_str(filter_type.as_str());
                for child in children {
                    child.write_expression(out);
                }
                out.push(')');
            },
            SearchFilter::Value { property, value } => {
                out.push(' ');
                out.push_str(property);
                out.push_str(":\"");
                out.push_str(&escape_value(value));
                out.push('"');
            },
            SearchFilter::Location { radius, lat, lon } => {
                out.push_str(&format!("(within radius:{}m lon:{:.4} lat:{:.4})", radius, lon, lat));
            },
        }
    }
}

impl Display for SearchFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut expression = String::new();
        self.write_expression(&mut expression);
        write!(f, "{}", expression)
    }
}

/// C-style escaping of quotes, backslashes and control characters
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{8}' => escaped.push_str("\\b"),
            '\u{c}' => escaped.push_str("\\f"),
            '\u{b}' => escaped.push_str("\\v"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => escaped.push_str(&format!("\\{:03o}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}
