//! The HTTP layer, behind the narrow [`Transport`] trait
//!
//! The production implementation is [`ReqwestTransport`]. It never follows redirects: the service
//! runtime handles them itself.

use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::redirect::Policy;
pub use reqwest::Method;
use url::Url;

use crate::authorization::AuthorizationDomain;
use crate::config::ServiceConfig;
use crate::error::{Error, ErrorKind};

/// An ordered list of headers, with case-insensitive names
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing every previous value it had
    pub fn set<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// Adds a header, keeping previous values
    pub fn append<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n.eq_ignore_ascii_case(name) == false);
    }

    /// The first value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An HTTP request, as built by the service runtime
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Url,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
    /// The authorization domain the credentials were attached for. Re-applied after a refresh.
    pub domain: Option<Arc<AuthorizationDomain>>,
}

impl Request {
    pub fn new(method: Method, uri: Url) -> Self {
        Self { method, uri, headers: Headers::new(), body: None, domain: None }
    }

    /// Sets the body along with its `Content-Type`
    pub fn set_body<S: Into<String>>(&mut self, content_type: S, body: Vec<u8>) {
        self.headers.set("Content-Type", content_type);
        self.body = Some(body);
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    pub fn first_line(&self) -> String {
        format!("{} {} HTTP/1.1", self.method, self.uri)
    }
}

/// What came back from the server
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// The URI that was actually requested
    pub uri: Url,
}

impl Response {
    pub fn new(status: u16, uri: Url) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("")
            .to_string();
        Self { status, reason, headers: Headers::new(), body: Vec::new(), uri }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.status) && self.status != 304
    }

    /// The MIME type of the body, without its parameters
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
            .map(|ct| ct.split(';').next().unwrap_or("").trim())
    }

    pub fn etag(&self) -> Option<&str> {
        self.headers.get("ETag")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {} {}", self.status, self.reason)
    }
}

/// Failures that happen before any HTTP status is available
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    CantResolve(String),
    CantConnect(String),
    SslFailed(String),
    Io(String),
    CantConnectProxy(String),
    Timeout,
    Cancelled,
    InvalidRequest(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::CantResolve(s) => write!(f, "cannot resolve host: {}", s),
            TransportError::CantConnect(s) => write!(f, "cannot connect: {}", s),
            TransportError::SslFailed(s) => write!(f, "TLS failure: {}", s),
            TransportError::Io(s) => write!(f, "I/O error: {}", s),
            TransportError::CantConnectProxy(s) => write!(f, "cannot connect to proxy: {}", s),
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::Cancelled => write!(f, "cancelled"),
            TransportError::InvalidRequest(s) => write!(f, "invalid request: {}", s),
        }
    }
}

impl StdError for TransportError {}

impl TransportError {
    /// Errors that a racing cancellation may surface as, instead of a clean cancel
    pub fn may_hide_cancellation(&self) -> bool {
        matches!(self,
            TransportError::Io(_) | TransportError::SslFailed(_) |
            TransportError::CantConnect(_) | TransportError::CantResolve(_))
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::CantResolve(_) | TransportError::CantConnect(_) |
            TransportError::SslFailed(_) | TransportError::Io(_) | TransportError::Timeout => {
                log::debug!("Network failure: {}", err);
                Error::new(ErrorKind::Network, "Cannot connect to the service’s server.")
            },
            TransportError::CantConnectProxy(_) => Error::new(ErrorKind::Proxy, "Cannot connect to the proxy server."),
            TransportError::Cancelled => Error::cancelled(),
            TransportError::InvalidRequest(s) => Error::new(ErrorKind::Protocol, format!("Invalid request: {}", s)),
        }
    }
}

/// Sends one request and returns one response, whatever its status
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}


/// A [`Transport`] backed by a `reqwest` client
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    uses_proxy: bool,
}

impl ReqwestTransport {
    pub fn new(config: &ServiceConfig) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.lax_ssl_certificates);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|err| Error::new(ErrorKind::Proxy, format!("Invalid proxy URI: {}", err)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()
            .map_err(|err| Error::new(ErrorKind::Network, format!("Unable to set up the HTTP client: {}", err)))?;
        Ok(Self { client, uses_proxy: config.proxy.is_some() })
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            return TransportError::Timeout;
        }
        let details = error_chain(&err);
        let lower = details.to_lowercase();
        if err.is_connect() {
            if self.uses_proxy && lower.contains("proxy") {
                TransportError::CantConnectProxy(details)
            } else if lower.contains("dns") || lower.contains("resolve") {
                TransportError::CantResolve(details)
            } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
                TransportError::SslFailed(details)
            } else {
                TransportError::CantConnect(details)
            }
        } else if err.is_builder() {
            TransportError::InvalidRequest(details)
        } else {
            TransportError::Io(details)
        }
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let mut builder = self.client.request(request.method.clone(), request.uri.clone());
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let res = builder.send().await.map_err(|err| self.classify(err))?;

        let mut response = Response::new(res.status().as_u16(), res.url().clone());
        if let Some(reason) = res.status().canonical_reason() {
            response.reason = reason.to_string();
        }
        for (name, value) in res.headers() {
            match value.to_str() {
                Ok(v) => response.headers.append(name.as_str(), v),
                Err(_) => log::warn!("Ignoring non-ASCII value of header {}", name),
            }
        }
        response.body = res.bytes().await.map_err(|err| self.classify(err))?.to_vec();
        Ok(response)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_replaced_case_insensitively() {
        let mut headers = Headers::new();
        headers.set("Authorization", "Bearer T1");
        headers.set("authorization", "Bearer T2");
        headers.append("Accept", "a");
        headers.append("Accept", "b");

        assert_eq!(headers.get("AUTHORIZATION"), Some("Bearer T2"));
        assert_eq!(headers.get_all("authorization").count(), 1);
        assert_eq!(headers.get_all("accept").collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn content_type_drops_parameters() {
        let mut response = Response::new(200, Url::parse("https://example.com/").unwrap());
        response.headers.set("Content-Type", "application/json; charset=UTF-8");
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.reason, "OK");
        assert!(Response::new(304, response.uri.clone()).is_redirection() == false);
        assert!(Response::new(302, response.uri.clone()).is_redirection());
    }
}
