//! Query parameters, and the pagination state of a query
//!
//! A [`Query`] turns a feed URI into a request URI. The service runtime writes the navigation
//! cursors it finds in each response back into the query, so that [`Query::next_page`] can move
//! to the following page before the query is run again.

use chrono::{DateTime, Utc};

use crate::parser;

mod filter;
pub use filter::{FilterType, SearchFilter};

/// How a query moves from one page to the next
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaginationType {
    /// `start-index` is advanced by `max-results`
    Indexed,
    /// The `next` and `previous` links of the last feed are requested as they are
    Uris,
    /// The `nextPageToken` of the last feed is sent as `pageToken`. There is no way back.
    Tokens,
}

impl Default for PaginationType {
    fn default() -> Self {
        PaginationType::Indexed
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    q: Option<String>,
    /// Clauses added by the service itself, joined to `q` with `and`
    q_internal: Option<String>,
    categories: Option<String>,
    author: Option<String>,
    updated_min: Option<DateTime<Utc>>,
    updated_max: Option<DateTime<Utc>>,
    published_min: Option<DateTime<Utc>>,
    published_max: Option<DateTime<Utc>>,
    /// One-based, `0` for unset
    start_index: u32,
    is_strict: bool,
    /// `0` for unset
    max_results: u32,
    etag: Option<String>,
    filter: Option<SearchFilter>,
    parameters: Vec<(String, String)>,

    pagination_type: PaginationType,
    next_uri: Option<String>,
    previous_uri: Option<String>,
    next_page_token: Option<String>,
    use_next_page: bool,
    use_previous_page: bool,
    /// The last response had no way forward
    last_page_reached: bool,
}

impl Query {
    pub fn new(q: Option<&str>) -> Self {
        Self {
            q: q.map(String::from),
            ..Self::default()
        }
    }

    /// A query that starts at `start_index` (one-based, `0` for unset) and returns at most `max_results` entries (`0` for unset)
    pub fn with_limits(q: Option<&str>, start_index: u32, max_results: u32) -> Self {
        Self {
            q: q.map(String::from),
            start_index,
            max_results,
            ..Self::default()
        }
    }

    /// A query that follows the pagination style of a given service
    pub fn with_pagination(pagination_type: PaginationType) -> Self {
        Self {
            pagination_type,
            ..Self::default()
        }
    }

    pub fn q(&self) -> Option<&str> {
        self.q.as_deref()
    }

    pub fn set_q(&mut self, q: Option<&str>) {
        self.q = q.map(String::from);
        self.clear_pagination();
    }

    /// Adds a clause to the service-side part of `q`
    pub fn add_q_internal(&mut self, clause: &str) {
        if clause.is_empty() {
            return;
        }
        self.q_internal = Some(match self.q_internal.take() {
            Some(existing) if existing.is_empty() == false => format!("{} and {}", existing, clause),
            _ => clause.to_string(),
        });
    }

    pub fn clear_q_internal(&mut self) {
        self.q_internal = None;
    }

    /// Category path, e.g. `Fritz|Laurie/-Comedy`
    pub fn categories(&self) -> Option<&str> {
        self.categories.as_deref()
    }

    pub fn set_categories(&mut self, categories: Option<&str>) {
        self.categories = categories.map(String::from);
        self.clear_pagination();
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn set_author(&mut self, author: Option<&str>) {
        self.author = author.map(String::from);
        self.clear_pagination();
    }

    pub fn updated_min(&self) -> Option<DateTime<Utc>> {
        self.updated_min
    }

    pub fn set_updated_min(&mut self, updated_min: Option<DateTime<Utc>>) {
        self.updated_min = updated_min;
        self.clear_pagination();
    }

    pub fn updated_max(&self) -> Option<DateTime<Utc>> {
        self.updated_max
    }

    pub fn set_updated_max(&mut self, updated_max: Option<DateTime<Utc>>) {
        self.updated_max = updated_max;
        self.clear_pagination();
    }

    pub fn published_min(&self) -> Option<DateTime<Utc>> {
        self.published_min
    }

    pub fn set_published_min(&mut self, published_min: Option<DateTime<Utc>>) {
        self.published_min = published_min;
        self.clear_pagination();
    }

    pub fn published_max(&self) -> Option<DateTime<Utc>> {
        self.published_max
    }

    pub fn set_published_max(&mut self, published_max: Option<DateTime<Utc>>) {
        self.published_max = published_max;
        self.clear_pagination();
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    pub fn set_start_index(&mut self, start_index: u32) {
        self.start_index = start_index;
        self.clear_pagination();
    }

    pub fn is_strict(&self) -> bool {
        self.is_strict
    }

    /// Asks the server to reject unknown parameters instead of ignoring them
    pub fn set_is_strict(&mut self, is_strict: bool) {
        self.is_strict = is_strict;
        self.clear_pagination();
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    pub fn set_max_results(&mut self, max_results: u32) {
        self.max_results = max_results;
        self.clear_pagination();
    }

    /// The etag of the last feed this query returned. Sent as `If-None-Match`.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn set_etag(&mut self, etag: Option<&str>) {
        self.etag = etag.map(String::from);
    }

    pub fn filter(&self) -> Option<&SearchFilter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Option<SearchFilter>) {
        self.filter = filter;
        self.clear_pagination();
    }

    /// Appends a service-specific parameter. Parameters are sent after the common ones, in the order they were set.
    pub fn set_parameter(&mut self, name: &str, value: Option<&str>) {
        self.parameters.retain(|(n, _)| n != name);
        if let Some(value) = value {
            self.parameters.push((name.to_string(), value.to_string()));
        }
        self.clear_pagination();
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    pub fn pagination_type(&self) -> PaginationType {
        self.pagination_type
    }

    pub fn set_pagination_type(&mut self, pagination_type: PaginationType) {
        self.clear_pagination();
        self.pagination_type = pagination_type;
    }

    /// The request URI for the feed at `feed_uri`, with this query's parameters
    pub fn get_query_uri(&self, feed_uri: &str) -> String {
        if self.pagination_type == PaginationType::Uris {
            if self.use_next_page {
                if let Some(next) = &self.next_uri {
                    return next.clone();
                }
            }
            if self.use_previous_page {
                if let Some(previous) = &self.previous_uri {
                    return previous.clone();
                }
            }
        }

        let mut uri = String::from(feed_uri);
        let mut params_started = feed_uri.contains('?');
        let mut append = |uri: &mut String, param: &str| {
            uri.push(if params_started { '&' } else { '?' });
            params_started = true;
            uri.push_str(param);
        };

        if let Some(categories) = &self.categories {
            // Must come before the query string
            uri.push_str("/-/");
            uri.push_str(&escape_component(categories).replace("%2F", "/"));
        }

        if self.q.is_some() || self.q_internal.is_some() {
            let mut q = String::from("q=");
            if let Some(user) = &self.q {
                q.push_str(&escape_component(user));
                if self.q_internal.is_some() {
                    q.push_str("%20and%20");
                }
            }
            if let Some(internal) = &self.q_internal {
                q.push_str(&escape_component(internal));
            }
            append(&mut uri, &q);
        }

        if let Some(author) = &self.author {
            append(&mut uri, &format!("author={}", escape_component(author)));
        }

        let times = [
            ("updated-min", &self.updated_min),
            ("updated-max", &self.updated_max),
            ("published-min", &self.published_min),
            ("published-max", &self.published_max),
        ];
        for (name, time) in &times {
            if let Some(time) = time {
                append(&mut uri, &format!("{}={}", name, parser::to_iso8601(time)));
            }
        }

        if self.start_index > 0 {
            append(&mut uri, &format!("start-index={}", self.start_index));
        }
        if self.is_strict {
            append(&mut uri, "strict=true");
        }
        if self.max_results > 0 {
            append(&mut uri, &format!("max-results={}", self.max_results));
        }

        if self.pagination_type == PaginationType::Tokens && self.use_next_page {
            if let Some(token) = self.next_page_token.as_deref().filter(|t| t.is_empty() == false) {
                append(&mut uri, &format!("pageToken={}", escape_component(token)));
            }
        }

        if let Some(filter) = &self.filter {
            append(&mut uri, &format!("filter={}", escape_component(&filter.to_string())));
        }

        for (name, value) in &self.parameters {
            append(&mut uri, &format!("{}={}", escape_component(name), escape_component(value)));
        }

        uri
    }

    /// Moves to the following page. The next run of the query fetches it.
    pub fn next_page(&mut self) {
        match self.pagination_type {
            PaginationType::Indexed => {
                if self.start_index == 0 {
                    self.start_index = 1;
                }
                self.start_index = self.start_index.saturating_add(self.max_results);
                if self.start_index == u32::MAX {
                    log::debug!("The start index cannot move any further");
                    self.last_page_reached = true;
                }
            },
            PaginationType::Uris | PaginationType::Tokens => {
                self.use_next_page = true;
                self.use_previous_page = false;
            },
        }
        self.etag = None;
    }

    /// Moves to the previous page. Returns `false` (and changes nothing) when there is none.
    pub fn previous_page(&mut self) -> bool {
        let moved = match self.pagination_type {
            PaginationType::Indexed => {
                if self.start_index <= self.max_results {
                    false
                } else {
                    self.start_index -= self.max_results;
                    if self.start_index == 1 {
                        self.start_index = 0;
                    }
                    true
                }
            },
            PaginationType::Uris => {
                if self.previous_uri.is_some() {
                    self.use_next_page = false;
                    self.use_previous_page = true;
                    true
                } else {
                    false
                }
            },
            PaginationType::Tokens => false,
        };

        if moved {
            self.etag = None;
            self.last_page_reached = false;
        }
        moved
    }

    /// Whether the last page has been returned already. Running a finished query returns an empty feed without any request.
    pub fn is_finished(&self) -> bool {
        if self.last_page_reached == false {
            return false;
        }
        match self.pagination_type {
            PaginationType::Indexed => true,
            PaginationType::Uris => self.next_uri.is_none(),
            PaginationType::Tokens => self.next_page_token.is_none(),
        }
    }

    /// Goes back to the first page
    pub fn rewind(&mut self) {
        self.clear_pagination();
        if self.pagination_type == PaginationType::Indexed {
            self.start_index = 0;
        }
        self.etag = None;
    }

    pub fn next_uri(&self) -> Option<&str> {
        self.next_uri.as_deref()
    }

    pub fn previous_uri(&self) -> Option<&str> {
        self.previous_uri.as_deref()
    }

    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }

    pub(crate) fn clear_pagination(&mut self) {
        self.next_uri = None;
        self.previous_uri = None;
        self.next_page_token = None;
        self.use_next_page = false;
        self.use_previous_page = false;
        self.last_page_reached = false;
    }

    /// Records the navigation cursors of the feed that was just received
    pub(crate) fn set_cursors(&mut self, next_uri: Option<&str>, previous_uri: Option<&str>, next_page_token: Option<&str>) {
        self.clear_pagination();
        self.next_uri = next_uri.map(String::from);
        self.previous_uri = previous_uri.map(String::from);
        self.next_page_token = next_page_token.filter(|t| t.is_empty() == false).map(String::from);
        self.last_page_reached = self.next_uri.is_none() && self.next_page_token.is_none();
    }
}

/// Percent-encodes everything but unreserved characters
pub(crate) fn escape_component(text: &str) -> String {
    // `byte_serialize` writes spaces as `+`, and encodes literal `+` signs, so this is lossless
    url::form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
