use std::io::Write;
use std::sync::Arc;

use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind, Plain};
use crate::error::{Error, ErrorKind, Result};
use crate::parsable::{ContentType, Parsable};
use crate::service::{OperationType, Service};
use crate::transport::{Method, Request, Response};

/// Separates the parts of a multipart upload
pub const BOUNDARY: &str = "0003Z5W789deadbeefRTE456KlemsnoZV";
/// The largest chunk sent in one request of a resumable upload
pub const MAX_RESUMABLE_CHUNK_SIZE: usize = 512 * 1024;

/// A blob being uploaded, optionally along with the entry that describes it.
///
/// Data is written through [`Write`], then sent by [`UploadStream::finish`].
#[derive(Debug)]
pub struct UploadStream<K: EntryKind = Plain> {
    service: Service,
    domain: Option<Arc<AuthorizationDomain>>,
    method: Method,
    upload_uri: String,
    entry: Option<Entry<K>>,
    slug: Option<String>,
    content_type: String,
    /// Only set for resumable uploads
    content_length: Option<u64>,
    data: Vec<u8>,
}

impl<K: EntryKind> UploadStream<K> {
    /// An upload sent in a single request.
    ///
    /// With an entry, the body is a `multipart/related` document: the entry, then the blob.
    pub fn new(
        service: &Service,
        domain: Option<Arc<AuthorizationDomain>>,
        method: Method,
        upload_uri: &str,
        entry: Option<Entry<K>>,
        slug: Option<&str>,
        content_type: &str,
    ) -> Self {
        Self {
            service: service.clone(),
            domain,
            method,
            upload_uri: upload_uri.to_string(),
            entry,
            slug: slug.map(String::from),
            content_type: content_type.to_string(),
            content_length: None,
            data: Vec::new(),
        }
    }

    /// An upload sent in chunks, after an initial request that announces it.
    ///
    /// Exactly `content_length` bytes must be written. A zero length uploads the entry alone.
    pub fn new_resumable(
        service: &Service,
        domain: Option<Arc<AuthorizationDomain>>,
        method: Method,
        upload_uri: &str,
        entry: Option<Entry<K>>,
        slug: Option<&str>,
        content_type: &str,
        content_length: u64,
    ) -> Self {
        let mut stream = Self::new(service, domain, method, upload_uri, entry, slug, content_type);
        stream.content_length = Some(content_length);
        stream
    }

    pub fn upload_uri(&self) -> &str {
        &self.upload_uri
    }

    pub fn entry(&self) -> Option<&Entry<K>> {
        self.entry.as_ref()
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    /// The MIME type of the blob
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn is_resumable(&self) -> bool {
        self.content_length.is_some()
    }

    /// How many bytes of the blob have been written so far
    pub fn bytes_written(&self) -> usize {
        self.data.len()
    }

    /// Sends the upload, and returns the entry the server made of it
    pub async fn finish(self, cancellable: Option<&Cancellable>) -> Result<Entry<K>> {
        let response = match self.content_length {
            None => self.send_whole(cancellable).await?,
            Some(length) => self.send_resumable(length, cancellable).await?,
        };
        let content_type = ContentType::from_header(response.content_type());
        Ok(Entry::<K>::from_document(content_type, &response.body)?)
    }

    async fn send_whole(&self, cancellable: Option<&Cancellable>) -> Result<Response> {
        let mut request = self.build_request(self.method.clone(), &self.upload_uri)?;

        match &self.entry {
            Some(entry) => {
                let mut body = format!("--{}\nContent-Type: {}; charset=UTF-8\n\n", BOUNDARY, K::content_type().mime_type()).into_bytes();
                body.extend_from_slice(entry.to_document().as_bytes());
                body.extend_from_slice(format!("\n--{}\nContent-Type: {}\nContent-Transfer-Encoding: binary\n\n", BOUNDARY, self.content_type).as_bytes());
                body.extend_from_slice(&self.data);
                body.extend_from_slice(format!("\n--{}--", BOUNDARY).as_bytes());
                request.set_body(format!("multipart/related; boundary={}", BOUNDARY), body);
            },
            None => request.set_body(self.content_type.as_str(), self.data.clone()),
        }

        let response = self.service.send_message(&mut request, cancellable).await?;
        if response.is_success() == false {
            return Err(self.service.parse_error_response(OperationType::Upload, &response));
        }
        Ok(response)
    }

    async fn send_resumable(&self, content_length: u64, cancellable: Option<&Cancellable>) -> Result<Response> {
        if self.data.len() as u64 != content_length {
            return Err(Error::new(ErrorKind::Protocol,
                format!("{} bytes were written to an upload of {} bytes.", self.data.len(), content_length)));
        }

        let mut request = self.build_request(self.method.clone(), &self.upload_uri)?;
        request.headers.set("X-Upload-Content-Type", self.content_type.as_str());
        request.headers.set("X-Upload-Content-Length", content_length.to_string());
        match &self.entry {
            Some(entry) => request.set_body(format!("{}; charset=UTF-8", K::content_type().mime_type()), entry.to_document().into_bytes()),
            None => request.body = Some(Vec::new()),
        }

        let mut response = self.service.send_message(&mut request, cancellable).await?;
        if response.is_success() == false {
            return Err(self.service.parse_error_response(OperationType::Upload, &response));
        }
        if content_length == 0 && response.status == 201 {
            log::debug!("Metadata-only upload to {} is complete", self.upload_uri);
            return Ok(response);
        }

        let mut offset = 0usize;
        loop {
            let end = (offset + MAX_RESUMABLE_CHUNK_SIZE).min(self.data.len());
            let chunk_uri = response.headers.get("Location")
                .map(String::from)
                .unwrap_or_else(|| response.uri.to_string());

            let mut chunk = self.build_request(Method::PUT, &chunk_uri)?;
            chunk.set_body(self.content_type.as_str(), self.data[offset..end].to_vec());
            chunk.headers.set("Content-Range", content_range(offset, end, content_length));
            log::debug!("Uploading bytes {}-{} of {} to {}", offset, end, content_length, chunk_uri);

            response = self.service.send_once(&chunk, cancellable).await?;
            offset = end;

            if response.status == 308 {
                if offset >= self.data.len() {
                    return Err(Error::new(ErrorKind::Protocol, "The server asked for more data than the upload holds."));
                }
                continue;
            }
            if response.is_success() {
                return Ok(response);
            }
            return Err(self.service.parse_error_response(OperationType::Upload, &response));
        }
    }

    fn build_request(&self, method: Method, uri: &str) -> Result<Request> {
        let mut request = self.service.build_message(self.domain.as_ref(), method, uri, None, false)?;
        if let Some(slug) = &self.slug {
            request.headers.set("Slug", slug.as_str());
        }
        if let Some(etag) = self.entry.as_ref().and_then(|e| e.etag()) {
            request.headers.set("If-Match", etag);
        }
        Ok(request)
    }
}

impl<K: EntryKind> Write for UploadStream<K> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(length) = self.content_length {
            if (self.data.len() + buf.len()) as u64 > length {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "more data than the announced content length"));
            }
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// `bytes first-last/total`, for the half-open range `start..end`
fn content_range(start: usize, end: usize, total: u64) -> String {
    if end == start {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", start, end - 1, total)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::mock_transport::{MockReply, MockTransport};
    use crate::service::GenericService;

    const CREATED: &str = "<entry xmlns='http://www.w3.org/2005/Atom'><id>urn:photo</id><title>Photo</title></entry>";

    fn service(transport: Arc<MockTransport>) -> Service {
        Service::with_transport(GenericService, None, ServiceConfig::default(), transport)
    }

    #[tokio::test]
    async fn multipart_upload() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::atom(CREATED));
        let service = service(transport.clone());

        let mut entry = Entry::<Plain>::new(None);
        entry.set_title(Some("Photo"));
        let mut stream = UploadStream::new(&service, None, Method::POST, "https://example.com/upload", Some(entry.clone()), Some("photo.png"), "image/png");
        stream.write_all(b"PIXELS").unwrap();

        let created = stream.finish(None).await.unwrap();
        assert_eq!(created.id(), Some("urn:photo"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.headers.get("Slug"), Some("photo.png"));
        assert_eq!(request.headers.get("Content-Type"), Some("multipart/related; boundary=0003Z5W789deadbeefRTE456KlemsnoZV"));
        assert!(request.headers.get("If-Match").is_none());

        let expected = format!("--0003Z5W789deadbeefRTE456KlemsnoZV\nContent-Type: application/atom+xml; charset=UTF-8\n\n{}\n--0003Z5W789deadbeefRTE456KlemsnoZV\nContent-Type: image/png\nContent-Transfer-Encoding: binary\n\nPIXELS\n--0003Z5W789deadbeefRTE456KlemsnoZV--",
            entry.to_document());
        assert_eq!(request.body.as_deref(), Some(expected.as_bytes()));
    }

    #[tokio::test]
    async fn resumable_upload_in_chunks() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::status(200).with_header("Location", "https://example.com/upload?upload_id=42"));
        transport.push(MockReply::status(308).with_header("Range", "bytes=0-524287"));
        transport.push(MockReply::atom(CREATED).with_header("ETag", "\"v1\""));
        let service = service(transport.clone());

        let size = MAX_RESUMABLE_CHUNK_SIZE + 10;
        let mut stream = UploadStream::<Plain>::new_resumable(&service, None, Method::POST, "https://example.com/upload", None, Some("big.bin"), "application/octet-stream", size as u64);
        stream.write_all(&vec![7u8; size]).unwrap();
        assert!(stream.write_all(b"extra").is_err());

        stream.finish(None).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].headers.get("X-Upload-Content-Type"), Some("application/octet-stream"));
        assert_eq!(requests[0].headers.get("X-Upload-Content-Length"), Some("524298"));
        assert_eq!(requests[0].body_len(), 0);

        assert_eq!(requests[1].method, Method::PUT);
        assert_eq!(requests[1].uri.as_str(), "https://example.com/upload?upload_id=42");
        assert_eq!(requests[1].headers.get("Content-Range"), Some("bytes 0-524287/524298"));
        assert_eq!(requests[1].body_len(), MAX_RESUMABLE_CHUNK_SIZE);
        assert_eq!(requests[2].headers.get("Content-Range"), Some("bytes 524288-524297/524298"));
        assert_eq!(requests[2].body_len(), 10);
    }

    #[tokio::test]
    async fn short_resumable_upload_is_refused() {
        let transport = Arc::new(MockTransport::new());
        let service = service(transport.clone());

        let mut stream = UploadStream::<Plain>::new_resumable(&service, None, Method::POST, "https://example.com/upload", None, None, "text/plain", 10);
        stream.write_all(b"short").unwrap();
        let err = stream.finish(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(transport.sent_count(), 0);
    }
}
