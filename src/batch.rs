//! Batch operations: several queries, insertions, updates and deletions in one request
//!
//! Sub-operations are numbered in the order they are added. The batch feed is sent once; each
//! sub-operation then has its own outcome, which [`BatchOperation::result`] returns.

use std::sync::Arc;

use chrono::Utc;
use minidom::Element;

use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind, Plain};
use crate::error::{Error, ErrorKind, Result};
use crate::feed::Feed;
use crate::parsable::{self, ContentType, Parsable};
use crate::parser::{XmlNode, ATOM_NS, BATCH_NS};
use crate::service::{OperationType, Service};
use crate::transport::Method;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchOperationType {
    Query,
    Insertion,
    Update,
    Deletion,
}

impl BatchOperationType {
    /// The value of the `type` attribute of `<batch:operation>`
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperationType::Query => "query",
            BatchOperationType::Insertion => "insert",
            BatchOperationType::Update => "update",
            BatchOperationType::Deletion => "delete",
        }
    }

    fn operation_type(&self) -> OperationType {
        match self {
            BatchOperationType::Query => OperationType::Query,
            BatchOperationType::Insertion => OperationType::Insertion,
            BatchOperationType::Update => OperationType::Update,
            BatchOperationType::Deletion => OperationType::Deletion,
        }
    }
}

/// The outcome of one sub-operation. Deletions have no entry.
pub type BatchResult<K> = std::result::Result<Option<Entry<K>>, Error>;

#[derive(Debug)]
struct SubOperation<K: EntryKind> {
    id: u32,
    operation_type: BatchOperationType,
    entry: Entry<K>,
    result: Option<BatchResult<K>>,
}

#[derive(Debug)]
pub struct BatchOperation<K: EntryKind = Plain> {
    service: Service,
    domain: Option<Arc<AuthorizationDomain>>,
    feed_uri: String,
    operations: Vec<SubOperation<K>>,
    next_id: u32,
    has_run: bool,
}

impl Service {
    /// Starts a batch operation against the batch feed at `feed_uri`
    pub fn create_batch_operation<K: EntryKind>(&self, domain: Option<&Arc<AuthorizationDomain>>, feed_uri: &str) -> Result<BatchOperation<K>> {
        if self.supports_batch() == false {
            return Err(Error::new(ErrorKind::Protocol, "Batch operations are unsupported by this service."));
        }
        Ok(BatchOperation {
            service: self.clone(),
            domain: domain.cloned(),
            feed_uri: feed_uri.to_string(),
            operations: Vec::new(),
            next_id: 1,
            has_run: false,
        })
    }
}

impl<K: EntryKind> BatchOperation<K> {
    pub fn feed_uri(&self) -> &str {
        &self.feed_uri
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Queues a fetch of the entry with this ID. Returns the ID of the sub-operation.
    pub fn add_query(&mut self, id: &str) -> u32 {
        let mut entry = Entry::<K>::new(Some(id));
        entry.set_title(Some("Batch operation query"));
        entry.set_updated(Utc::now());
        self.push(BatchOperationType::Query, entry)
    }

    pub fn add_insertion(&mut self, entry: &Entry<K>) -> u32 {
        self.push(BatchOperationType::Insertion, entry.clone())
    }

    pub fn add_update(&mut self, entry: &Entry<K>) -> u32 {
        self.push(BatchOperationType::Update, entry.clone())
    }

    pub fn add_deletion(&mut self, entry: &Entry<K>) -> u32 {
        self.push(BatchOperationType::Deletion, entry.clone())
    }

    fn push(&mut self, operation_type: BatchOperationType, mut entry: Entry<K>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        entry.set_batch_data(id, operation_type);
        self.operations.push(SubOperation { id, operation_type, entry, result: None });
        id
    }

    /// The outcome of a sub-operation, once the batch has run
    pub fn result(&self, id: u32) -> Option<&BatchResult<K>> {
        self.operations.iter()
            .find(|op| op.id == id)
            .and_then(|op| op.result.as_ref())
    }

    /// The batch feed that [`Self::run`] sends
    pub fn to_xml(&self) -> String {
        let mut feed = Feed::<K>::new("Batch operation feed", "batch1", Utc::now());
        for op in &self.operations {
            feed.add_entry(op.entry.clone());
        }
        feed.to_xml()
    }

    /// Sends the batch. This can only be done once.
    ///
    /// When the whole batch fails, every sub-operation is marked as failed and the error is returned.
    /// Otherwise, each sub-operation gets its own outcome and `Ok(())` is returned.
    pub async fn run(&mut self, cancellable: Option<&Cancellable>) -> Result<()> {
        if self.has_run {
            return Err(Error::new(ErrorKind::Protocol, "This batch operation has already been run."));
        }
        self.has_run = true;

        let outcome = self.send(cancellable).await;
        match outcome {
            Ok(body) => {
                self.dispatch(&body);
                Ok(())
            },
            Err(err) => {
                log::warn!("Batch operation on {} failed: {}", self.feed_uri, err);
                for op in &mut self.operations {
                    let kind = if err.is_cancelled() { ErrorKind::Cancelled } else { ErrorKind::BatchFailed };
                    op.result = Some(Err(Error::new(kind, err.message())));
                }
                Err(err)
            },
        }
    }

    async fn send(&self, cancellable: Option<&Cancellable>) -> Result<Vec<u8>> {
        let mut request = self.service.build_message(self.domain.as_ref(), Method::POST, &self.feed_uri, None, false)?;
        request.set_body(ContentType::AtomXml.mime_type(), self.to_xml().into_bytes());

        let response = self.service.send_message(&mut request, cancellable).await?;
        if response.status != 200 {
            return Err(self.service.parse_error_response(OperationType::Batch, &response));
        }
        Ok(response.body)
    }

    fn dispatch(&mut self, body: &[u8]) {
        let root = match parse_root(body) {
            Ok(root) => root,
            Err(err) => {
                for op in &mut self.operations {
                    op.result = Some(Err(Error::new(ErrorKind::BatchFailed, err.message())));
                }
                return;
            },
        };

        let service = &self.service;
        for child in root.children().filter(|c| c.is("entry", ATOM_NS)) {
            let id = match child.get_child("id", BATCH_NS).and_then(|e| e.text().trim().parse::<u32>().ok()) {
                Some(id) => id,
                None => {
                    log::warn!("Ignoring a batch response entry without a valid <batch:id>");
                    continue;
                },
            };
            let op = match self.operations.iter_mut().find(|op| op.id == id) {
                Some(op) => op,
                None => {
                    log::warn!("Ignoring a batch response entry for unknown operation {}", id);
                    continue;
                },
            };
            op.result = Some(outcome::<K>(service, op.operation_type, child));
        }

        for op in &mut self.operations {
            if op.result.is_none() {
                op.result = Some(Err(Error::new(ErrorKind::Protocol, format!("The batch response did not mention operation {}.", op.id))));
            }
        }
    }
}

fn parse_root(body: &[u8]) -> Result<Element> {
    let text = std::str::from_utf8(body)
        .map_err(|err| Error::new(ErrorKind::Protocol, format!("Error parsing XML: {}", err)))?;
    let root: Element = parsable::strip_declaration(text).parse()
        .map_err(|err: minidom::Error| Error::new(ErrorKind::Protocol, format!("Error parsing XML: {}", err)))?;
    Ok(root)
}

fn outcome<K: EntryKind>(service: &Service, operation_type: BatchOperationType, element: &Element) -> BatchResult<K> {
    let (code, reason, details) = match element.get_child("status", BATCH_NS) {
        Some(status) => (
            status.attr("code").and_then(|c| c.parse::<u16>().ok()).unwrap_or(0),
            status.attr("reason").unwrap_or("").to_string(),
            status.text(),
        ),
        None => (0, String::new(), String::new()),
    };

    if (200..300).contains(&code) == false {
        return Err(service.parse_error_status(operation_type.operation_type(), code, &reason, &details));
    }
    if operation_type == BatchOperationType::Deletion {
        return Ok(None);
    }

    let entry = Entry::<K>::from_xml_node(&XmlNode::new(element, "feed"))?;
    Ok(Some(entry))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::mock_transport::{MockReply, MockTransport};
    use crate::service::ServiceClass;

    struct Batchable;
    impl ServiceClass for Batchable {
        fn supports_batch(&self) -> bool {
            true
        }
    }

    const RESPONSE: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:batch="http://schemas.google.com/gdata/batch">
        <id>https://example.com/batch/response</id>
        <updated>2025-01-01T00:00:00Z</updated>
        <title>Batch response</title>
        <entry>
            <batch:id>1</batch:id>
            <batch:status code="200" reason="Success"/>
            <batch:operation type="query"/>
            <id>https://example.com/entries/a</id>
            <updated>2025-01-01T00:00:00Z</updated>
            <title>Entry A</title>
        </entry>
        <entry>
            <batch:id>2</batch:id>
            <batch:status code="409" reason="Conflict">Version mismatch</batch:status>
            <batch:operation type="update"/>
            <id>https://example.com/entries/b</id>
            <title>Error</title>
        </entry>
        <entry>
            <batch:id>3</batch:id>
            <batch:status code="200" reason="Success"/>
            <batch:operation type="delete"/>
            <id>https://example.com/entries/c</id>
            <title>Deleted</title>
        </entry>
    </feed>"#;

    #[tokio::test]
    async fn sub_operations_get_their_own_outcome() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::status(200).with_header("Content-Type", "application/atom+xml").with_body(RESPONSE));
        let service = Service::with_transport(Batchable, None, ServiceConfig::default(), transport.clone());

        let mut update: Entry = Entry::new(Some("https://example.com/entries/b"));
        update.set_title(Some("B"));
        let deletion: Entry = Entry::new(Some("https://example.com/entries/c"));

        let mut batch = service.create_batch_operation::<Plain>(None, "https://example.com/batch").unwrap();
        assert_eq!(batch.add_query("https://example.com/entries/a"), 1);
        assert_eq!(batch.add_update(&update), 2);
        assert_eq!(batch.add_deletion(&deletion), 3);
        let insertion = batch.add_insertion(&Entry::new(None));
        batch.run(None).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let body = String::from_utf8(requests[0].body.clone().unwrap()).unwrap();
        assert!(body.contains("<batch:id>2</batch:id><batch:operation type='update'/>"));
        assert!(body.contains("Batch operation query"));

        let queried = batch.result(1).unwrap().as_ref().unwrap().as_ref().unwrap();
        assert_eq!(queried.title(), Some("Entry A"));
        let conflict = batch.result(2).unwrap().as_ref().unwrap_err();
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(batch.result(3).unwrap().as_ref().unwrap().is_none());
        assert_eq!(batch.result(insertion).unwrap().as_ref().unwrap_err().kind(), ErrorKind::Protocol);

        let again = batch.run(None).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Protocol);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn whole_batch_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::status(500).with_body("Server on fire"));
        let service = Service::with_transport(Batchable, None, ServiceConfig::default(), transport);

        let mut batch = service.create_batch_operation::<Plain>(None, "https://example.com/batch").unwrap();
        let id = batch.add_query("https://example.com/entries/a");
        assert!(batch.run(None).await.is_err());
        assert_eq!(batch.result(id).unwrap().as_ref().unwrap_err().kind(), ErrorKind::BatchFailed);
    }

    #[test]
    fn unsupported() {
        let service = Service::with_transport(crate::service::GenericService, None, ServiceConfig::default(), Arc::new(MockTransport::new()));
        let err = service.create_batch_operation::<Plain>(None, "https://example.com/batch").unwrap_err();
        assert_eq!(err.message(), "Batch operations are unsupported by this service.");
    }
}
