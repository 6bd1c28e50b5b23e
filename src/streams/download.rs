use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::error::Result;
use crate::service::{OperationType, Service};
use crate::transport::Method;

/// A downloaded blob
#[derive(Clone, Debug)]
pub struct DownloadStream {
    content_type: Option<String>,
    content_length: u64,
    body: Cursor<Vec<u8>>,
}

impl DownloadStream {
    /// The MIME type announced by the server
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The size of the blob, in bytes
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// The part of the blob that has not been read yet
    pub fn into_bytes(self) -> Vec<u8> {
        let position = self.body.position() as usize;
        let mut bytes = self.body.into_inner();
        bytes.drain(..position.min(bytes.len()));
        bytes
    }
}

impl Read for DownloadStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.body.read(buf)
    }
}

impl Service {
    /// Downloads the blob at `uri`, with the credentials for `domain`
    pub async fn download(
        &self,
        domain: Option<&Arc<AuthorizationDomain>>,
        uri: &str,
        cancellable: Option<&Cancellable>,
    ) -> Result<DownloadStream> {
        let mut request = self.build_message(domain, Method::GET, uri, None, false)?;
        let response = self.send_message(&mut request, cancellable).await?;
        if response.is_success() == false {
            return Err(self.parse_error_response(OperationType::Download, &response));
        }

        let content_length = response.headers.get("Content-Length")
            .and_then(|length| length.parse().ok())
            .unwrap_or(response.body.len() as u64);
        log::debug!("Downloaded {} bytes from {}", response.body.len(), uri);

        Ok(DownloadStream {
            content_type: response.content_type().map(String::from),
            content_length,
            body: Cursor::new(response.body),
        })
    }
}
