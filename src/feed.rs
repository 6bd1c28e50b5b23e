//! Feeds: pages of entries, with navigation links

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::atom::{Author, Category, Generator, Link};
use crate::atom::link::{LINK_NEXT, LINK_PREVIOUS, LINK_SELF};
use crate::entry::{Entry, EntryKind, Plain};
use crate::error::ParseError;
use crate::parsable::{self, ContentType, Extensions, NamespaceTable, Parsable};
use crate::parser::{self, JsonMember, ParserOptions, XmlNode, ATOM_NS, GD_NS, OPENSEARCH_NS};

/// Called once per parsed entry, with its index in the feed and the number of entries expected (if known)
pub type ProgressCallback<'a, K> = dyn FnMut(&Entry<K>, usize, Option<u32>) + Send + 'a;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Feed<K: EntryKind = Plain> {
    title: Option<String>,
    subtitle: Option<String>,
    id: Option<String>,
    etag: Option<String>,
    updated: Option<DateTime<Utc>>,
    rights: Option<String>,
    logo: Option<String>,
    icon: Option<String>,
    generator: Option<Generator>,
    categories: Vec<Category>,
    links: Vec<Link>,
    authors: Vec<Author>,
    total_results: Option<u32>,
    start_index: Option<u32>,
    items_per_page: Option<u32>,
    next_page_token: Option<String>,
    entries: Vec<Entry<K>>,
    extensions: Extensions,
}

impl<K: EntryKind> Feed<K> {
    /// A feed built locally, e.g. to return when there is nothing more to fetch
    pub fn new(title: &str, id: &str, updated: DateTime<Utc>) -> Self {
        Self {
            title: Some(title.to_string()),
            id: Some(id.to_string()),
            updated: Some(updated),
            ..Self::default()
        }
    }

    /// The feed returned when a query is already past its last page
    pub fn empty() -> Self {
        Self::new("Empty feed", "feed1", Utc::now())
    }

    /// Parses a response body, calling `progress` once per entry, in feed order
    pub fn from_document_with_progress(content_type: ContentType, document: &[u8], progress: Option<&mut ProgressCallback<'_, K>>) -> Result<Self, ParseError> {
        match content_type {
            ContentType::AtomXml => {
                let text = std::str::from_utf8(document).map_err(|err| ParseError::Xml(err.to_string()))?;
                let root: minidom::Element = parsable::strip_declaration(text).parse()?;
                if root.name() != "feed" {
                    return Err(ParseError::UnexpectedRoot { expected: "feed".into(), found: root.name().to_string() });
                }
                Self::from_xml_node_with_progress(&XmlNode::new(&root, ""), progress)
            },
            ContentType::Json => {
                let value: Value = serde_json::from_slice(document)?;
                Self::from_json_value_with_progress(&value, progress)
            },
        }
    }

    fn from_xml_node_with_progress(node: &XmlNode, mut progress: Option<&mut ProgressCallback<'_, K>>) -> Result<Self, ParseError> {
        let mut feed = Self::default();
        feed.pre_parse_xml(node)?;
        for child in node.children() {
            if child.is("entry", ATOM_NS) {
                let entry = Entry::<K>::from_xml_node(&child)?;
                feed.push_entry(entry, &mut progress);
            } else if feed.parse_xml(&child)? == false {
                feed.unknown_xml(&child);
            }
        }
        feed.post_parse_xml()?;
        Ok(feed)
    }

    fn from_json_value_with_progress(value: &Value, mut progress: Option<&mut ProgressCallback<'_, K>>) -> Result<Self, ParseError> {
        let object = match value {
            Value::Object(o) => o,
            other => return Err(ParseError::Json(format!("expected an object, got {}", other))),
        };

        let mut feed = Self::default();
        for (name, value) in object {
            if name == "items" {
                let items = match value {
                    Value::Array(items) => items,
                    Value::Null => continue,
                    other => return Err(ParseError::WrongType { element: name.clone(), content: other.to_string() }),
                };
                for item in items {
                    let entry = Entry::<K>::from_json_value(item)?;
                    feed.push_entry(entry, &mut progress);
                }
                continue;
            }

            let member = JsonMember::new(name, value);
            if feed.parse_json(&member)? == false {
                feed.unknown_json(&member);
            }
        }
        feed.post_parse_json()?;
        Ok(feed)
    }

    fn push_entry(&mut self, entry: Entry<K>, progress: &mut Option<&mut ProgressCallback<'_, K>>) {
        if let Some(callback) = progress.as_mut() {
            let expected = match (self.items_per_page, self.total_results) {
                (Some(per_page), Some(total)) => Some(per_page.min(total)),
                (per_page, total) => per_page.or(total),
            };
            callback(&entry, self.entries.len(), expected);
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[Entry<K>] {
        &self.entries
    }

    /// Detaches the entries from the feed
    pub fn into_entries(self) -> Vec<Entry<K>> {
        self.entries
    }

    pub(crate) fn add_entry(&mut self, entry: Entry<K>) {
        self.entries.push(entry);
    }

    /// The entry with this ID, if the feed has it
    pub fn look_up_entry(&self, id: &str) -> Option<&Entry<K>> {
        self.entries.iter().find(|e| e.id() == Some(id))
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated
    }

    pub fn rights(&self) -> Option<&str> {
        self.rights.as_deref()
    }

    pub fn logo(&self) -> Option<&str> {
        self.logo.as_deref()
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn generator(&self) -> Option<&Generator> {
        self.generator.as_ref()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn authors(&self) -> &[Author] {
        &self.authors
    }

    pub fn look_up_link(&self, relation: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.has_relation(relation))
    }

    pub fn next_uri(&self) -> Option<&str> {
        self.look_up_link(LINK_NEXT).map(|l| l.uri())
    }

    pub fn previous_uri(&self) -> Option<&str> {
        self.look_up_link(LINK_PREVIOUS).map(|l| l.uri())
    }

    pub fn self_uri(&self) -> Option<&str> {
        self.look_up_link(LINK_SELF).map(|l| l.uri())
    }

    /// Opaque cursor to the next page, for JSON services
    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }

    pub fn total_results(&self) -> Option<u32> {
        self.total_results
    }

    pub fn start_index(&self) -> Option<u32> {
        self.start_index
    }

    pub fn items_per_page(&self) -> Option<u32> {
        self.items_per_page
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    fn add_link(&mut self, link: Link) {
        if self.links.contains(&link) == false {
            self.links.push(link);
        }
    }

    fn opensearch_numbers(&self) -> [(&'static str, Option<u32>); 3] {
        [
            ("totalResults", self.total_results),
            ("startIndex", self.start_index),
            ("itemsPerPage", self.items_per_page),
        ]
    }
}

fn opensearch_number(node: &XmlNode, output: &mut Option<u32>) -> Result<(), ParseError> {
    if output.is_some() {
        return Err(ParseError::duplicate(node.describe()));
    }
    let text = node.text();
    if text.trim().is_empty() {
        return Err(ParseError::missing_content(node.describe()));
    }
    let value = text.trim().parse::<u32>().map_err(|_| ParseError::WrongType {
        element: node.describe(),
        content: text.clone(),
    })?;
    *output = Some(value);
    Ok(())
}

impl<K: EntryKind> Parsable for Feed<K> {
    fn element_name(&self) -> &'static str {
        "feed"
    }

    fn content_type(&self) -> ContentType {
        K::content_type()
    }

    fn pre_parse_xml(&mut self, root: &XmlNode) -> Result<(), ParseError> {
        self.etag = root.attr("etag").map(String::from);
        Ok(())
    }

    fn parse_xml(&mut self, node: &XmlNode) -> Result<bool, ParseError> {
        if node.is_namespace(OPENSEARCH_NS) {
            match node.name() {
                "totalResults" => opensearch_number(node, &mut self.total_results)?,
                "startIndex" => opensearch_number(node, &mut self.start_index)?,
                "itemsPerPage" => opensearch_number(node, &mut self.items_per_page)?,
                _ => return Ok(false),
            }
            return Ok(true);
        }
        if node.is_namespace(ATOM_NS) == false {
            return Ok(false);
        }

        if parser::string_from_element(node, "title", ParserOptions::DEFAULT | ParserOptions::NO_DUPES, &mut self.title)? ||
           parser::string_from_element(node, "subtitle", ParserOptions::NO_DUPES, &mut self.subtitle)? ||
           parser::string_from_element(node, "id", ParserOptions::REQUIRED | ParserOptions::NON_EMPTY | ParserOptions::NO_DUPES, &mut self.id)? ||
           parser::string_from_element(node, "logo", ParserOptions::NO_DUPES, &mut self.logo)? ||
           parser::string_from_element(node, "icon", ParserOptions::NO_DUPES, &mut self.icon)? ||
           parser::time_from_element(node, "updated", ParserOptions::REQUIRED | ParserOptions::NO_DUPES, &mut self.updated)? ||
           parser::string_from_element(node, "rights", ParserOptions::empty(), &mut self.rights)? {
            return Ok(true);
        }

        match node.name() {
            "entry" => {
                let entry = Entry::<K>::from_xml_node(node)?;
                self.entries.push(entry);
            },
            "category" => {
                let category = Category::from_xml_node(node)?;
                if self.categories.contains(&category) == false {
                    self.categories.push(category);
                }
            },
            "link" => {
                let link = Link::from_xml_node(node)?;
                self.add_link(link);
            },
            "author" => {
                let author = Author::from_xml_node(node)?;
                if self.authors.contains(&author) == false {
                    self.authors.push(author);
                }
            },
            "generator" => {
                if self.generator.is_some() {
                    return Err(ParseError::duplicate(node.describe()));
                }
                self.generator = Some(Generator::from_xml_node(node)?);
            },
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn post_parse_xml(&mut self) -> Result<(), ParseError> {
        if self.id.is_none() {
            return Err(ParseError::required_element_missing("id", "feed"));
        }
        if self.updated.is_none() {
            return Err(ParseError::required_element_missing("updated", "feed"));
        }
        Ok(())
    }

    fn unknown_xml(&mut self, node: &XmlNode) {
        self.extensions.push_xml(node.element);
    }

    fn parse_json(&mut self, member: &JsonMember) -> Result<bool, ParseError> {
        match member.name {
            "items" => {
                if let Value::Array(items) = member.value {
                    for item in items {
                        self.entries.push(Entry::<K>::from_json_value(item)?);
                    }
                }
                Ok(true)
            },
            "selfLink" => {
                let mut uri = None;
                parser::string_from_json_member(member, "selfLink", ParserOptions::REQUIRED | ParserOptions::NON_EMPTY, &mut uri)?;
                if let Some(uri) = uri {
                    self.add_link(Link::new(&uri, Some(LINK_SELF)));
                }
                Ok(true)
            },
            "kind" => Ok(true),
            _ => Ok(
                parser::string_from_json_member(member, "etag", ParserOptions::NON_EMPTY | ParserOptions::NO_DUPES, &mut self.etag)? ||
                parser::string_from_json_member(member, "nextPageToken", ParserOptions::NON_EMPTY | ParserOptions::NO_DUPES, &mut self.next_page_token)? ||
                parser::string_from_json_member(member, "title", ParserOptions::NO_DUPES, &mut self.title)? ||
                parser::time_from_json_member(member, "updated", ParserOptions::NO_DUPES, &mut self.updated)?
            ),
        }
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
        if let Some(subtitle) = &self.subtitle {
            parser::append_escaped(xml, "<subtitle type='text'>", subtitle, "</subtitle>");
        }
        if let Some(rights) = &self.rights {
            parser::append_escaped(xml, "<rights>", rights, "</rights>");
        }
        if let Some(logo) = &self.logo {
            parser::append_escaped(xml, "<logo>", logo, "</logo>");
        }
        if let Some(icon) = &self.icon {
            parser::append_escaped(xml, "<icon>", icon, "</icon>");
        }
        if let Some(generator) = &self.generator {
            generator.append_xml(xml);
        }
        for (name, value) in self.opensearch_numbers() {
            if let Some(value) = value {
                xml.push_str(&format!("<openSearch:{0}>{1}</openSearch:{0}>", name, value));
            }
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
        for entry in &self.entries {
            entry.append_xml(xml);
        }
        self.extensions.render_xml(xml);
    }

    fn namespaces(&self, namespaces: &mut NamespaceTable) {
        namespaces.insert("gd", GD_NS);
        if self.opensearch_numbers().iter().any(|(_, value)| value.is_some()) {
            namespaces.insert("openSearch", OPENSEARCH_NS);
        }
        for entry in &self.entries {
            entry.namespaces(namespaces);
        }
    }

    fn render_json(&self, map: &mut Map<String, Value>) {
        if let Some(etag) = &self.etag {
            map.insert("etag".into(), Value::String(etag.clone()));
        }
        if let Some(uri) = self.self_uri() {
            map.insert("selfLink".into(), Value::String(uri.to_string()));
        }
        if let Some(token) = &self.next_page_token {
            map.insert("nextPageToken".into(), Value::String(token.clone()));
        }
        map.insert("items".into(), Value::Array(self.entries.iter().map(|e| e.to_json_value()).collect()));
        self.extensions.render_json(map);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<feed xmlns='http://www.w3.org/2005/Atom' xmlns:openSearch='http://a9.com/-/spec/opensearch/1.1/' xmlns:gd='http://schemas.google.com/g/2005' gd:etag='W/"feed-etag"'>
    <id>http://example.com/feeds/default</id>
    <updated>2025-01-02T00:00:00Z</updated>
    <title>Calendars</title>
    <link rel='next' href='http://example.com/feeds/default?start-index=3'/>
    <link rel='self' href='http://example.com/feeds/default'/>
    <generator version='1.0' uri='http://example.com'>Example</generator>
    <openSearch:totalResults>5</openSearch:totalResults>
    <openSearch:startIndex>1</openSearch:startIndex>
    <openSearch:itemsPerPage>2</openSearch:itemsPerPage>
    <entry><id>http://example.com/1</id><title>One</title><updated>2025-01-01T00:00:00Z</updated></entry>
    <entry><id>http://example.com/2</id><title>Two</title><updated>2025-01-01T00:00:00Z</updated></entry>
</feed>"#;

    #[test]
    fn parse_xml_feed_with_progress() {
        let mut seen = Vec::new();
        let mut progress = |entry: &Entry, index: usize, total: Option<u32>| {
            seen.push((entry.title().unwrap_or("").to_string(), index, total));
        };
        let feed: Feed = Feed::from_document_with_progress(ContentType::AtomXml, FEED.as_bytes(), Some(&mut progress)).unwrap();

        assert_eq!(feed.entries().len(), 2);
        assert_eq!(feed.etag(), Some("W/\"feed-etag\""));
        assert_eq!(feed.next_uri(), Some("http://example.com/feeds/default?start-index=3"));
        assert_eq!(feed.previous_uri(), None);
        assert_eq!(feed.total_results(), Some(5));
        assert_eq!(feed.generator().and_then(|g| g.name()), Some("Example"));
        assert_eq!(seen, vec![("One".to_string(), 0, Some(2)), ("Two".to_string(), 1, Some(2))]);
    }

    #[test]
    fn every_field_survives_rendering() {
        let doc = r#"<feed xmlns='http://www.w3.org/2005/Atom' xmlns:openSearch='http://a9.com/-/spec/opensearch/1.1/' xmlns:gd='http://schemas.google.com/g/2005' gd:etag='W/"feed-etag"'>
    <id>http://example.com/feeds/full</id>
    <updated>2025-01-02T00:00:00.500Z</updated>
    <title>Lunch &amp; dinner</title>
    <subtitle>Every meal of the week</subtitle>
    <rights>Copyright Joe Bloggs</rights>
    <logo>http://example.com/logo.png</logo>
    <icon>http://example.com/favicon.ico</icon>
    <generator version='2.1' uri='http://example.com/generator'>Example &lt;Feeds&gt;</generator>
    <category scheme='http://example.com/categories' term='food' label='Food'/>
    <link rel='self' type='application/atom+xml' title='This feed' href='http://example.com/feeds/full'/>
    <author><name>Joe Bloggs</name><uri>http://example.com/~joe</uri><email>joe@example.com</email></author>
    <openSearch:totalResults>12</openSearch:totalResults>
    <openSearch:startIndex>11</openSearch:startIndex>
    <openSearch:itemsPerPage>10</openSearch:itemsPerPage>
    <entry><id>http://example.com/11</id><title>Eleven</title><updated>2025-01-01T00:00:00.001Z</updated><rights>Public</rights></entry>
    <entry><id>http://example.com/12</id><updated>2025-01-01T00:00:00Z</updated></entry>
</feed>"#;
        let feed: Feed = Feed::from_xml(doc.as_bytes()).unwrap();
        assert_eq!(feed.rights(), Some("Copyright Joe Bloggs"));
        assert_eq!(feed.logo(), Some("http://example.com/logo.png"));
        assert_eq!(feed.icon(), Some("http://example.com/favicon.ico"));
        assert_eq!(feed.generator(), Some(&Generator::new(Some("Example <Feeds>"), Some("http://example.com/generator"), Some("2.1"))));
        assert_eq!(feed.start_index(), Some(11));

        let xml = feed.to_xml();
        assert!(xml.contains("<generator uri='http://example.com/generator' version='2.1'>Example &lt;Feeds&gt;</generator>"));
        let again: Feed = Feed::from_xml(xml.as_bytes()).unwrap();
        assert_eq!(again, feed);
        assert_eq!(again.entries()[1].title(), None);
    }

    #[test]
    fn feed_id_is_required() {
        let doc = "<feed xmlns='http://www.w3.org/2005/Atom'><updated>2025-01-02T00:00:00Z</updated></feed>";
        let err = Feed::<Plain>::from_xml(doc.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "A required element (<feed/id>) was not present.");
    }

    #[test]
    fn duplicated_opensearch_element() {
        let doc = "<feed xmlns='http://www.w3.org/2005/Atom'><totalResults xmlns='http://a9.com/-/spec/opensearch/1.1/'>1</totalResults>\
                   <totalResults xmlns='http://a9.com/-/spec/opensearch/1.1/'>2</totalResults></feed>";
        assert!(matches!(Feed::<Plain>::from_xml(doc.as_bytes()), Err(ParseError::DuplicateElement { .. })));
    }

    #[test]
    fn parse_json_feed() {
        let doc = r#"{"kind": "tasks#taskLists", "etag": "\"e1\"", "nextPageToken": "p2",
                      "items": [{"kind": "tasks#taskList", "id": "l1", "title": "Groceries"}]}"#;
        let feed: Feed = Feed::from_document_with_progress(ContentType::Json, doc.as_bytes(), None).unwrap();
        assert_eq!(feed.next_page_token(), Some("p2"));
        assert_eq!(feed.etag(), Some("\"e1\""));
        assert_eq!(feed.entries()[0].title(), Some("Groceries"));
        assert!(feed.look_up_entry("l1").is_some());
    }
}
