//! Entry-level operations: query, query a single entry, insert, update, delete

use std::sync::Arc;

use crate::atom::link::{LINK_EDIT, LINK_SELF};
use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, ErrorKind, Result};
use crate::feed::{Feed, ProgressCallback};
use crate::parsable::{ContentType, Parsable};
use crate::query::Query;
use crate::transport::{Method, Request, Response};

use super::{OperationType, Service};

impl Service {
    /// Fetches a feed.
    ///
    /// The navigation cursors and the etag of the feed are written back into `query`, so that
    /// [`Query::next_page`] can be used before running it again. A query that already returned its
    /// last page gives an empty feed without any request.
    ///
    /// Returns `Ok(None)` when the server says the feed has not changed since `query`'s etag.
    pub async fn query<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        feed_uri: &str,
        mut query: Option<&mut Query>,
        cancellable: Option<&Cancellable>,
        progress: Option<&mut ProgressCallback<'_, K>>,
    ) -> Result<Option<Feed<K>>> {
        if let Some(q) = query.as_deref() {
            if q.is_finished() {
                log::debug!("Query on {} is already past its last page", feed_uri);
                return Ok(Some(Feed::empty()));
            }
        }

        let uri = match query.as_deref() {
            Some(q) => q.get_query_uri(feed_uri),
            None => feed_uri.to_string(),
        };
        let etag = query.as_deref().and_then(|q| q.etag()).map(String::from);

        let mut request = self.build_message(domain, Method::GET, &uri, etag.as_deref(), false)?;
        let response = self.send_message(&mut request, cancellable).await?;
        if response.status == 304 {
            log::debug!("{} was not modified", uri);
            return Ok(None);
        }
        if response.status != 200 {
            return Err(self.parse_error_response(OperationType::Query, &response));
        }

        let content_type = ContentType::from_header(response.content_type());
        let feed = Feed::<K>::from_document_with_progress(content_type, &response.body, progress)?;

        if let Some(q) = query.as_deref_mut() {
            q.set_etag(feed.etag().or_else(|| response.etag()));
            q.set_cursors(feed.next_uri(), feed.previous_uri(), feed.next_page_token());
        }
        Ok(Some(feed))
    }

    /// Fetches one entry, from the URI its kind derives from `entry_id`.
    ///
    /// Returns `Ok(None)` when the server says the entry has not changed since `query`'s etag.
    pub async fn query_single_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        entry_id: &str,
        query: Option<&Query>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Option<Entry<K>>> {
        let entry_uri = K::get_entry_uri(entry_id);
        let uri = match query {
            Some(q) => q.get_query_uri(&entry_uri),
            None => entry_uri,
        };
        let etag = query.and_then(|q| q.etag());

        let mut request = self.build_message(domain, Method::GET, &uri, etag, false)?;
        let response = self.send_message(&mut request, cancellable).await?;
        if response.status == 304 {
            log::debug!("{} was not modified", uri);
            return Ok(None);
        }
        if response.status != 200 {
            return Err(self.parse_error_response(OperationType::Query, &response));
        }

        Ok(Some(parse_entry(&response)?))
    }

    /// Creates `entry` on the server, and returns the server's version of it
    pub async fn insert_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        upload_uri: &str,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<K>> {
        if entry.is_inserted() {
            return Err(Error::new(ErrorKind::EntryAlreadyInserted, "The entry has already been inserted."));
        }

        let mut request = self.build_message(domain, Method::POST, upload_uri, None, false)?;
        set_entry_body(&mut request, entry);

        let response = self.send_message(&mut request, cancellable).await?;
        if matches!(response.status, 200 | 201) == false {
            return Err(self.parse_error_response(OperationType::Insertion, &response));
        }
        parse_entry(&response)
    }

    /// Replaces the server's copy of `entry`, unless it was modified since `entry` was fetched.
    ///
    /// Returns the server's version of the entry.
    pub async fn update_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<K>> {
        let uri = edit_uri(entry)?;
        let mut request = self.build_message(domain, Method::PUT, &uri, entry.etag(), true)?;
        set_entry_body(&mut request, entry);

        let response = self.send_message(&mut request, cancellable).await?;
        if response.status != 200 {
            return Err(self.parse_error_response(OperationType::Update, &response));
        }
        parse_entry(&response)
    }

    /// Deletes the server's copy of `entry`, unless it was modified since `entry` was fetched
    pub async fn delete_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
    ) -> Result<bool> {
        let uri = edit_uri(entry)?;
        let mut request = self.build_message(domain, Method::DELETE, &uri, entry.etag(), true)?;

        let response = self.send_message(&mut request, cancellable).await?;
        if matches!(response.status, 200 | 204) == false {
            return Err(self.parse_error_response(OperationType::Deletion, &response));
        }
        Ok(true)
    }
}

/// JSON services identify entries by their `self` link, XML services by their `edit` link
fn edit_uri<K: EntryKind>(entry: &Entry<K>) -> Result<String> {
    let relation = match K::content_type() {
        ContentType::Json => LINK_SELF,
        ContentType::AtomXml => LINK_EDIT,
    };
    entry.look_up_link(relation)
        .map(|link| link.uri().to_string())
        .ok_or_else(|| Error::new(ErrorKind::Protocol, format!("The entry has no ‘{}’ link.", relation)))
}

fn set_entry_body<K: EntryKind>(request: &mut Request, entry: &Entry<K>) {
    request.set_body(entry.content_type().mime_type(), entry.to_document().into_bytes());
}

fn parse_entry<K: EntryKind>(response: &Response) -> Result<Entry<K>> {
    let content_type = ContentType::from_header(response.content_type());
    Ok(Entry::<K>::from_document(content_type, &response.body)?)
}
