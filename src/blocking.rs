//! A synchronous wrapper around [`Service`]
//!
//! Each method blocks the calling thread until the operation completes. It must not be used from
//! within an async context.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::authorization::AuthorizationDomain;
use crate::batch::BatchOperation;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, ErrorKind, Result};
use crate::feed::{Feed, ProgressCallback};
use crate::query::Query;
use crate::service::Service;
use crate::streams::{DownloadStream, UploadStream};

#[derive(Debug)]
pub struct BlockingService {
    service: Service,
    runtime: Runtime,
}

impl BlockingService {
    pub fn new(service: Service) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::new(ErrorKind::Network, format!("Unable to start the async runtime: {}", err)))?;
        Ok(Self { service, runtime })
    }

    /// The wrapped service, e.g. to change its settings
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn query<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        feed_uri: &str,
        query: Option<&mut Query>,
        cancellable: Option<&Cancellable>,
        progress: Option<&mut ProgressCallback<'_, K>>,
    ) -> Result<Option<Feed<K>>> {
        self.runtime.block_on(self.service.query(domain, feed_uri, query, cancellable, progress))
    }

    pub fn query_single_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        entry_id: &str,
        query: Option<&Query>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Option<Entry<K>>> {
        self.runtime.block_on(self.service.query_single_entry(domain, entry_id, query, cancellable))
    }

    pub fn insert_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        upload_uri: &str,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<K>> {
        self.runtime.block_on(self.service.insert_entry(domain, upload_uri, entry, cancellable))
    }

    pub fn update_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<K>> {
        self.runtime.block_on(self.service.update_entry(domain, entry, cancellable))
    }

    pub fn delete_entry<K: EntryKind>(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
    ) -> Result<bool> {
        self.runtime.block_on(self.service.delete_entry(domain, entry, cancellable))
    }

    /// Sends every sub-operation of `batch`. Their outcomes are then available from the batch itself.
    pub fn run_batch<K: EntryKind>(&self, batch: &mut BatchOperation<K>, cancellable: Option<&Cancellable>) -> Result<()> {
        self.runtime.block_on(batch.run(cancellable))
    }

    pub fn download(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        uri: &str,
        cancellable: Option<&Cancellable>,
    ) -> Result<DownloadStream> {
        self.runtime.block_on(self.service.download(domain, uri, cancellable))
    }

    /// Sends an upload, resumable or not, once all its data has been written
    pub fn finish_upload<K: EntryKind>(&self, upload: UploadStream<K>, cancellable: Option<&Cancellable>) -> Result<Entry<K>> {
        self.runtime.block_on(upload.finish(cancellable))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::entry::Plain;
    use crate::mock_transport::{MockReply, MockTransport};
    use crate::service::{GenericService, ServiceClass};
    use crate::transport::Method;
    use std::io::{Read, Write};

    struct Batchable;
    impl ServiceClass for Batchable {
        fn supports_batch(&self) -> bool {
            true
        }
    }

    #[test]
    fn blocks_until_done() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::atom("<entry xmlns='http://www.w3.org/2005/Atom'><id>urn:one</id><title>One</title></entry>"));
        transport.push(MockReply::status(304));
        let service = Service::with_transport(GenericService, None, ServiceConfig::default(), transport.clone());
        let blocking = BlockingService::new(service).unwrap();

        let entry = blocking.query_single_entry::<Plain>(None, "https://example.com/things/1", None, None).unwrap().unwrap();
        assert_eq!(entry.title(), Some("One"));

        let mut query = Query::new(None);
        query.set_etag(Some("W/\"v1\""));
        let unchanged = blocking.query_single_entry::<Plain>(None, "https://example.com/things/1", Some(&query), None).unwrap();
        assert!(unchanged.is_none());

        let requests = transport.requests();
        assert_eq!(requests[1].headers.get("If-None-Match"), Some("W/\"v1\""));
    }

    #[test]
    fn batches_and_media() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::atom(r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:batch="http://schemas.google.com/gdata/batch">
            <id>https://example.com/batch/response</id>
            <updated>2025-01-01T00:00:00Z</updated>
            <entry>
                <batch:id>1</batch:id>
                <batch:status code="200" reason="Success"/>
                <batch:operation type="query"/>
                <id>https://example.com/things/1</id>
                <title>One</title>
            </entry>
        </feed>"#));
        transport.push(MockReply::status(200).with_header("Content-Type", "text/plain").with_body("Hello"));
        transport.push(MockReply::status(200).with_header("Location", "https://example.com/upload?upload_id=7"));
        transport.push(MockReply::atom("<entry xmlns='http://www.w3.org/2005/Atom'><id>urn:note</id><title>Note</title></entry>"));
        let service = Service::with_transport(Batchable, None, ServiceConfig::default(), transport.clone());
        let blocking = BlockingService::new(service.clone()).unwrap();

        let mut batch = service.create_batch_operation::<Plain>(None, "https://example.com/batch").unwrap();
        let id = batch.add_query("https://example.com/things/1");
        blocking.run_batch(&mut batch, None).unwrap();
        let queried = batch.result(id).unwrap().as_ref().unwrap().as_ref().unwrap();
        assert_eq!(queried.title(), Some("One"));

        let mut download = blocking.download(None, "https://example.com/things/1/media", None).unwrap();
        assert_eq!(download.content_type(), Some("text/plain"));
        let mut text = String::new();
        download.read_to_string(&mut text).unwrap();
        assert_eq!(text, "Hello");

        let mut upload = UploadStream::<Plain>::new_resumable(&service, None, Method::POST, "https://example.com/upload", None, Some("note.txt"), "text/plain", 5);
        upload.write_all(b"Hello").unwrap();
        let created = blocking.finish_upload(upload, None).unwrap();
        assert_eq!(created.id(), Some("urn:note"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[4].method, Method::PUT);
        assert_eq!(requests[4].headers.get("Content-Range"), Some("bytes 0-4/5"));
    }
}
