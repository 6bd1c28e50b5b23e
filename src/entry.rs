//! Entries: snapshots of server-side resources
//!
//! An [`Entry`] is made of the fields every service shares, plus a service-specific part, its
//! [`EntryKind`]. The kind is offered every XML element and JSON member first; what it does not
//! recognize is parsed as a common field, and what nobody recognizes is kept in the entry's
//! [`Extensions`] so that it is rendered back untouched.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::atom::{Author, Category, Link, KIND_SCHEME};
use crate::atom::link::LINK_SELF;
use crate::batch::BatchOperationType;
use crate::error::ParseError;
use crate::parsable::{ContentType, Extensions, NamespaceTable, Parsable};
use crate::parser::{self, JsonMember, ParserOptions, XmlNode, ATOM_NS, BATCH_NS, GD_NS};

/// The service-specific part of an entry
pub trait EntryKind: Clone + Debug + Default + PartialEq + Send + Sync + 'static {
    /// The term identifying this kind in server responses (e.g. `tasks#task`)
    fn kind_term() -> Option<&'static str> {
        None
    }

    /// The body format the service uses for this kind
    fn content_type() -> ContentType {
        ContentType::AtomXml
    }

    /// The URI to fetch a single entry from, given its ID
    fn get_entry_uri(id: &str) -> String {
        id.to_string()
    }

    /// Consumes one XML element of an entry. Must not change `self` when returning `Ok(false)`.
    fn parse_xml(&mut self, _node: &XmlNode) -> Result<bool, ParseError> {
        Ok(false)
    }

    /// Consumes one JSON member of an entry. Must not change `self` when returning `Ok(false)`.
    fn parse_json(&mut self, _member: &JsonMember) -> Result<bool, ParseError> {
        Ok(false)
    }

    fn post_parse(&mut self) -> Result<(), ParseError> {
        Ok(())
    }

    /// Writes the kind's XML elements, after the common ones
    fn render_xml(&self, _xml: &mut String) {}

    fn render_json(&self, _map: &mut Map<String, Value>) {}

    fn namespaces(&self, _namespaces: &mut NamespaceTable) {}
}

/// An entry with no service-specific fields, exchanged as Atom XML
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plain;

impl EntryKind for Plain {}


/// The free-form payload of an entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// The content lives elsewhere
    Uri(String),
}

impl Content {
    pub fn as_str(&self) -> &str {
        match self {
            Content::Text(s) | Content::Uri(s) => s,
        }
    }
}

/// Which sub-operation of a batch an entry is part of
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BatchData {
    pub id: u32,
    pub operation: BatchOperationType,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entry<K: EntryKind = Plain> {
    title: Option<String>,
    summary: Option<String>,
    id: Option<String>,
    etag: Option<String>,
    updated: Option<DateTime<Utc>>,
    published: Option<DateTime<Utc>>,
    content: Option<Content>,
    rights: Option<String>,
    categories: Vec<Category>,
    links: Vec<Link>,
    authors: Vec<Author>,
    batch: Option<BatchData>,
    extensions: Extensions,
    kind: K,
}

impl<K: EntryKind> Entry<K> {
    /// A new entry. Pass `None` for entries that are yet to be inserted.
    pub fn new(id: Option<&str>) -> Self {
        let mut entry = Self {
            id: id.map(String::from),
            ..Self::default()
        };
        if let Some(term) = K::kind_term() {
            entry.add_category(Category::kind(term));
        }
        entry
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: Option<&str>) {
        self.title = title.map(String::from);
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn set_summary(&mut self, summary: Option<&str>) {
        self.summary = summary.map(String::from);
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn set_content(&mut self, content: Option<Content>) {
        self.content = content;
    }

    pub fn rights(&self) -> Option<&str> {
        self.rights.as_deref()
    }

    pub fn set_rights(&mut self, rights: Option<&str>) {
        self.rights = rights.map(String::from);
    }

    /// The permanent identifier, set at creation or by the server
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The version tag sent by the server
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published
    }

    /// Adds a category, unless an equal one is already there
    pub fn add_category(&mut self, category: Category) {
        if self.categories.contains(&category) == false {
            self.categories.push(category);
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Adds a link, unless an equal one is already there
    pub fn add_link(&mut self, link: Link) {
        if self.links.contains(&link) == false {
            self.links.push(link);
        }
    }

    /// Returns whether the link was there
    pub fn remove_link(&mut self, link: &Link) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l != link);
        before != self.links.len()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// The first link with this relation. Short names (`self`, `edit`...) are accepted.
    pub fn look_up_link(&self, relation: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.has_relation(relation))
    }

    /// Every link with this relation, in order
    pub fn look_up_links(&self, relation: &str) -> Vec<&Link> {
        self.links.iter().filter(|l| l.has_relation(relation)).collect()
    }

    /// Adds an author, unless an equal one is already there
    pub fn add_author(&mut self, author: Author) {
        if self.authors.contains(&author) == false {
            self.authors.push(author);
        }
    }

    pub fn authors(&self) -> &[Author] {
        &self.authors
    }

    /// Whether this entry exists on the server
    pub fn is_inserted(&self) -> bool {
        self.id.is_some() || self.updated.is_some()
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut K {
        &mut self.kind
    }

    /// What the entry carried that nobody understood
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub(crate) fn set_batch_data(&mut self, id: u32, operation: BatchOperationType) {
        self.batch = Some(BatchData { id, operation });
    }

    pub(crate) fn set_updated(&mut self, updated: DateTime<Utc>) {
        self.updated = Some(updated);
    }

    fn kind_category_term(&self) -> Option<&str> {
        self.categories.iter()
            .find(|c| c.is_kind())
            .map(|c| c.term())
    }
}

impl<K: EntryKind> Parsable for Entry<K> {
    fn element_name(&self) -> &'static str {
        "entry"
    }

    fn content_type(&self) -> ContentType {
        K::content_type()
    }

    fn pre_parse_xml(&mut self, root: &XmlNode) -> Result<(), ParseError> {
        self.etag = root.attr("etag").map(String::from);
        Ok(())
    }

    fn parse_xml(&mut self, node: &XmlNode) -> Result<bool, ParseError> {
        if self.kind.parse_xml(node)? {
            return Ok(true);
        }

        if node.is_namespace(BATCH_NS) {
            // Handled by the batch operation
            return Ok(true);
        }
        if node.is_namespace(ATOM_NS) == false {
            return Ok(false);
        }

        if parser::string_from_element(node, "title", ParserOptions::DEFAULT | ParserOptions::NO_DUPES, &mut self.title)? ||
           parser::string_from_element(node, "id", ParserOptions::REQUIRED | ParserOptions::NON_EMPTY | ParserOptions::NO_DUPES, &mut self.id)? ||
           parser::string_from_element(node, "summary", ParserOptions::NO_DUPES, &mut self.summary)? ||
           parser::string_from_element(node, "rights", ParserOptions::NO_DUPES, &mut self.rights)? ||
           parser::time_from_element(node, "updated", ParserOptions::REQUIRED | ParserOptions::NO_DUPES, &mut self.updated)? ||
           parser::time_from_element(node, "published", ParserOptions::REQUIRED | ParserOptions::NO_DUPES, &mut self.published)? {
            return Ok(true);
        }

        match node.name() {
            "category" => {
                let category = Category::from_xml_node(node)?;
                self.add_category(category);
                Ok(true)
            },
            "link" => {
                let link = Link::from_xml_node(node)?;
                self.add_link(link);
                Ok(true)
            },
            "author" => {
                let author = Author::from_xml_node(node)?;
                self.add_author(author);
                Ok(true)
            },
            "content" => {
                self.content = match node.attr("src") {
                    Some(src) => Some(Content::Uri(src.to_string())),
                    None => Some(Content::Text(node.text())),
                };
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    fn post_parse_xml(&mut self) -> Result<(), ParseError> {
        // Missing title, ID or timestamps are tolerated on entries: an entry without an ID is
        // simply not inserted. Feeds are stricter.
        self.kind.post_parse()
    }

    fn unknown_xml(&mut self, node: &XmlNode) {
        log::trace!("Keeping unknown element {} as an extension", node.describe());
        self.extensions.push_xml(node.element);
    }

    fn parse_json(&mut self, member: &JsonMember) -> Result<bool, ParseError> {
        if self.kind.parse_json(member)? {
            return Ok(true);
        }

        if parser::string_from_json_member(member, "title", ParserOptions::DEFAULT | ParserOptions::NO_DUPES, &mut self.title)? ||
           parser::string_from_json_member(member, "id", ParserOptions::NON_EMPTY | ParserOptions::NO_DUPES, &mut self.id)? ||
           parser::string_from_json_member(member, "description", ParserOptions::empty(), &mut self.summary)? ||
           parser::time_from_json_member(member, "updated", ParserOptions::REQUIRED | ParserOptions::NO_DUPES, &mut self.updated)? ||
           parser::string_from_json_member(member, "etag", ParserOptions::NON_EMPTY | ParserOptions::NO_DUPES, &mut self.etag)? {
            return Ok(true);
        }

        match member.name {
            "selfLink" | "kind" => {
                let mut value = None;
                parser::string_from_json_member(member, member.name, ParserOptions::REQUIRED | ParserOptions::NON_EMPTY, &mut value)?;
                let value = value.ok_or_else(|| ParseError::missing_content(member.name))?;
                if member.name == "selfLink" {
                    self.add_link(Link::new(&value, Some(LINK_SELF)));
                } else {
                    self.add_category(Category::kind(&value));
                }
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    fn post_parse_json(&mut self) -> Result<(), ParseError> {
        self.kind.post_parse()
    }

    fn unknown_json(&mut self, member: &JsonMember) {
        self.extensions.push_json(member.name, member.value);
    }

    fn pre_render_xml(&self, xml: &mut String) {
        if let Some(etag) = &self.etag {
            parser::append_escaped(xml, " gd:etag='", etag, "'");
        }
    }

    fn render_xml(&self, xml: &mut String) {
        if let Some(title) = &self.title {
            parser::append_escaped(xml, "<title type='text'>", title, "</title>");
        }
        if let Some(id) = &self.id {
            parser::append_escaped(xml, "<id>", id, "</id>");
        }
        if let Some(updated) = &self.updated {
            xml.push_str(&format!("<updated>{}</updated>", parser::to_iso8601(updated)));
        }
        if let Some(published) = &self.published {
            xml.push_str(&format!("<published>{}</published>", parser::to_iso8601(published)));
        }
        if let Some(summary) = &self.summary {
            parser::append_escaped(xml, "<summary type='text'>", summary, "</summary>");
        }
        if let Some(rights) = &self.rights {
            parser::append_escaped(xml, "<rights>", rights, "</rights>");
        }
        match &self.content {
            Some(Content::Uri(uri)) => parser::append_escaped(xml, "<content type='text/plain' src='", uri, "'/>"),
            Some(Content::Text(text)) => parser::append_escaped(xml, "<content type='text'>", text, "</content>"),
            None => {},
        }

        for category in &self.categories {
            category.append_xml(xml);
        }
        for link in &self.links {
            link.append_xml(xml);
        }
        for author in &self.authors {
            author.append_xml(xml);
        }

        if let Some(batch) = &self.batch {
            xml.push_str(&format!("<batch:id>{}</batch:id><batch:operation type='{}'/>", batch.id, batch.operation.as_str()));
        }

        self.kind.render_xml(xml);
        self.extensions.render_xml(xml);
    }

    fn namespaces(&self, namespaces: &mut NamespaceTable) {
        namespaces.insert("gd", GD_NS);
        if self.batch.is_some() {
            namespaces.insert("batch", BATCH_NS);
        }
        self.kind.namespaces(namespaces);
    }

    fn render_json(&self, map: &mut Map<String, Value>) {
        if let Some(title) = &self.title {
            map.insert("title".into(), Value::String(title.clone()));
        }
        if let Some(id) = &self.id {
            map.insert("id".into(), Value::String(id.clone()));
        }
        if let Some(summary) = &self.summary {
            map.insert("description".into(), Value::String(summary.clone()));
        }
        if let Some(updated) = &self.updated {
            map.insert("updated".into(), Value::String(parser::to_iso8601(updated)));
        }
        if let Some(term) = self.kind_category_term().or_else(|| K::kind_term()) {
            map.insert("kind".into(), Value::String(term.to_string()));
        }
        if let Some(etag) = &self.etag {
            map.insert("etag".into(), Value::String(etag.clone()));
        }
        if let Some(link) = self.look_up_link(LINK_SELF) {
            map.insert("selfLink".into(), Value::String(link.uri().to_string()));
        }

        self.kind.render_json(map);
        self.extensions.render_json(map);
    }
}

/// Whether a category belongs to the kind scheme. Exposed for kinds that route on it.
pub fn is_kind_category(category: &Category, term: &str) -> bool {
    category.scheme() == Some(KIND_SCHEME) && category.term() == term
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::link::LINK_EDIT;

    const ENTRY: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<entry xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005" xmlns:gCal="http://schemas.google.com/gCal/2005" gd:etag="&quot;v1&quot;">
    <id>http://example.com/entries/abc</id>
    <published>2025-01-01T00:00:00Z</published>
    <updated>2025-01-02T10:30:00Z</updated>
    <title type="text">Meeting</title>
    <summary>Weekly sync</summary>
    <content src="http://example.com/media/abc"/>
    <category scheme="http://schemas.google.com/g/2005#kind" term="http://schemas.google.com/g/2005#event"/>
    <link rel="edit" href="http://example.com/entries/abc/edit"/>
    <link rel="alternate" type="text/html" href="http://example.com/abc.html"/>
    <author><name>Joe Bloggs</name><email>joe@example.com</email></author>
    <color xmlns="http://schemas.google.com/gCal/2005" value="#2952A3"/>
</entry>"##;

    #[test]
    fn parse_atom_entry() {
        let entry: Entry = Entry::from_xml(ENTRY.as_bytes()).unwrap();

        assert_eq!(entry.id(), Some("http://example.com/entries/abc"));
        assert_eq!(entry.etag(), Some("\"v1\""));
        assert_eq!(entry.title(), Some("Meeting"));
        assert_eq!(entry.summary(), Some("Weekly sync"));
        assert_eq!(entry.content(), Some(&Content::Uri("http://example.com/media/abc".into())));
        assert_eq!(entry.updated().map(|t| parser::to_iso8601(&t)), Some("2025-01-02T10:30:00Z".into()));
        assert_eq!(entry.look_up_link(LINK_EDIT).map(|l| l.uri()), Some("http://example.com/entries/abc/edit"));
        assert_eq!(entry.look_up_links("alternate").len(), 1);
        assert_eq!(entry.authors()[0].email_address(), Some("joe@example.com"));
        assert_eq!(entry.extensions().xml().len(), 1);
        assert!(entry.is_inserted());
    }

    #[test]
    fn rendered_entry_parses_back() {
        let entry: Entry = Entry::from_xml(ENTRY.as_bytes()).unwrap();
        let xml = entry.to_xml();
        assert!(xml.starts_with("<entry xmlns='http://www.w3.org/2005/Atom' xmlns:gd='http://schemas.google.com/g/2005' gd:etag='&quot;v1&quot;'>"));

        let again: Entry = Entry::from_xml(xml.as_bytes()).unwrap();
        assert_eq!(again.id(), entry.id());
        assert_eq!(again.etag(), entry.etag());
        assert_eq!(again.title(), entry.title());
        assert_eq!(again.content(), entry.content());
        assert_eq!(again.updated(), entry.updated());
        assert_eq!(again.published(), entry.published());
        assert_eq!(again.links(), entry.links());
        assert_eq!(again.categories(), entry.categories());
        assert_eq!(again.authors(), entry.authors());
    }

    #[test]
    fn every_field_survives_rendering() {
        let doc = r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005" gd:etag="W/&quot;CUMBRHo_fip7ImA9WxRbGU0.&quot;">
    <id>http://example.com/entries/full</id>
    <published>2024-12-31T23:59:59.250Z</published>
    <updated>2025-01-02T10:30:00.123456Z</updated>
    <title type="text">Fish &amp; chips</title>
    <summary type="text">Friday's &lt;lunch&gt;</summary>
    <rights>Copyright Joe Bloggs</rights>
    <content type="text">Cod, "mushy" peas</content>
    <category scheme="http://example.com/categories" term="food" label="Food &amp; drink"/>
    <link rel="alternate" type="text/html" hreflang="en-GB" title="Menu" length="1024" href="http://example.com/menu?day=fri&amp;lang=en"/>
    <link rel="enclosure" type="image/jpeg" href="http://example.com/cod.jpg"/>
    <author><name>Joe Bloggs</name><uri>http://example.com/~joe</uri><email>joe@example.com</email></author>
    <author><name>Jane Doe</name></author>
</entry>"#;
        let entry: Entry = Entry::from_xml(doc.as_bytes()).unwrap();
        assert_eq!(entry.rights(), Some("Copyright Joe Bloggs"));
        assert_eq!(entry.categories()[0].label(), Some("Food & drink"));
        let alternate = entry.look_up_link("alternate").unwrap();
        assert_eq!(alternate.title(), Some("Menu"));
        assert_eq!(alternate.content_type(), Some("text/html"));
        assert_eq!(alternate.language(), Some("en-GB"));
        assert_eq!(alternate.length(), Some(1024));
        assert_eq!(entry.authors()[0].uri(), Some("http://example.com/~joe"));
        assert_eq!(entry.updated().map(|t| parser::to_iso8601(&t)), Some("2025-01-02T10:30:00.123456Z".into()));

        let again: Entry = Entry::from_xml(entry.to_xml().as_bytes()).unwrap();
        assert_eq!(again, entry);
    }

    #[test]
    fn missing_title_is_not_rendered() {
        let entry: Entry = Entry::new(Some("http://example.com/entries/untitled"));
        let xml = entry.to_xml();
        assert!(xml.contains("<title") == false);
        let again: Entry = Entry::from_xml(xml.as_bytes()).unwrap();
        assert_eq!(again.title(), None);
        assert_eq!(again, entry);

        assert!(entry.to_json_value().get("title").is_none());
    }

    #[test]
    fn duplicated_id_is_an_error() {
        let doc = "<entry xmlns='http://www.w3.org/2005/Atom'><id>a</id><id>b</id></entry>";
        let err = Entry::<Plain>::from_xml(doc.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "A singleton element (<entry/id>) was duplicated.");
    }

    #[test]
    fn json_entry() {
        let doc = r#"{"kind": "tasks#task", "id": "abc", "etag": "\"v1\"", "title": "Buy milk",
                      "updated": "2025-01-01T00:00:00.000Z", "selfLink": "https://example.com/tasks/abc",
                      "position": "00001"}"#;
        let entry: Entry = Entry::from_json(doc.as_bytes()).unwrap();
        assert_eq!(entry.id(), Some("abc"));
        assert_eq!(entry.look_up_link("self").map(|l| l.uri()), Some("https://example.com/tasks/abc"));
        assert!(entry.categories().iter().any(|c| is_kind_category(c, "tasks#task")));

        let rendered = entry.to_json_value();
        assert_eq!(rendered["kind"], "tasks#task");
        assert_eq!(rendered["selfLink"], "https://example.com/tasks/abc");
        assert_eq!(rendered["position"], "00001");
        assert_eq!(rendered["updated"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn duplicates_are_not_added() {
        let mut entry: Entry = Entry::new(None);
        entry.add_category(Category::new("a", None, None));
        entry.add_category(Category::new("a", None, None));
        entry.add_link(Link::new("https://example.com/", Some("self")));
        entry.add_link(Link::new("https://example.com/", Some(LINK_SELF)));
        assert_eq!(entry.categories().len(), 1);
        assert_eq!(entry.links().len(), 1);
        assert!(entry.is_inserted() == false);
    }
}
