//! The service runtime: building, sending and retrying requests
//!
//! A [`Service`] pairs a [`ServiceClass`] (what is specific to one online service: its
//! authorization domains, how it reports errors...) with the shared machinery: the HTTP
//! transport, the configuration and the authorizer. The entry-level operations (query, insert,
//! update, delete) are in the `operations` submodule.

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use url::Url;

use crate::authorization::{AuthorizationDomain, Authorizer};
use crate::cancel::Cancellable;
use crate::config::ServiceConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::transport::{Method, ReqwestTransport, Request, Response, Transport, TransportError};
use crate::wire_log::{self, Direction};

pub mod errors;
pub use errors::OperationType;
mod operations;

/// What differs from one online service to another
pub trait ServiceClass: Send + Sync + 'static {
    /// Sent as `GData-Version`, if any
    fn api_version(&self) -> Option<&'static str> {
        Some("2")
    }

    /// Every domain the service may need credentials for
    fn authorization_domains(&self) -> Vec<Arc<AuthorizationDomain>> {
        Vec::new()
    }

    /// Adds service-specific headers to every request. Runs after the common headers are set.
    fn append_query_headers(&self, _domain: Option<&Arc<AuthorizationDomain>>, _request: &mut Request) {}

    /// Classifies a response whose status is not one the operation expected
    fn parse_error_response(&self, operation: OperationType, status: u16, reason_phrase: &str, body: &str) -> Error {
        errors::status_error(operation, status, reason_phrase, body)
    }

    /// Whether the service accepts batch feeds
    fn supports_batch(&self) -> bool {
        false
    }
}

/// A service with no specific behaviour, talking Atom XML
#[derive(Clone, Copy, Debug, Default)]
pub struct GenericService;

impl ServiceClass for GenericService {}


struct ServiceInner {
    class: Box<dyn ServiceClass>,
    transport: Arc<dyn Transport>,
    config: RwLock<ServiceConfig>,
    authorizer: RwLock<Option<Arc<dyn Authorizer>>>,
}

/// A connection to an online service.
///
/// Cloning gives another handle to the same service, so that it can be shared between tasks.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

impl Debug for Service {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("transport", &self.inner.transport)
            .field("config", &*read(&self.inner.config))
            .field("authorized", &self.authorizer().is_some())
            .finish()
    }
}

impl Service {
    /// A service that talks HTTPS, configured from the environment
    pub fn new<C: ServiceClass>(class: C, authorizer: Option<Arc<dyn Authorizer>>) -> Result<Self> {
        let config = ServiceConfig::from_env();
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(class, authorizer, config, Arc::new(transport)))
    }

    /// A service that sends its requests through `transport`
    pub fn with_transport<C: ServiceClass>(class: C, authorizer: Option<Arc<dyn Authorizer>>, config: ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                class: Box::new(class),
                transport,
                config: RwLock::new(config),
                authorizer: RwLock::new(authorizer),
            }),
        }
    }

    pub fn authorizer(&self) -> Option<Arc<dyn Authorizer>> {
        read(&self.inner.authorizer).clone()
    }

    /// Replaces the authorizer. Operations already running keep using the previous one.
    pub fn set_authorizer(&self, authorizer: Option<Arc<dyn Authorizer>>) {
        *write(&self.inner.authorizer) = authorizer;
    }

    /// Whether the authorizer has credentials for every domain of this service
    pub fn is_authorized(&self) -> bool {
        let authorizer = match self.authorizer() {
            None => return false,
            Some(a) => a,
        };
        self.inner.class.authorization_domains()
            .iter()
            .all(|domain| authorizer.is_authorized_for_domain(domain))
    }

    pub fn authorization_domains(&self) -> Vec<Arc<AuthorizationDomain>> {
        self.inner.class.authorization_domains()
    }

    pub fn supports_batch(&self) -> bool {
        self.inner.class.supports_batch()
    }

    /// A snapshot of the current configuration
    pub fn config(&self) -> ServiceConfig {
        read(&self.inner.config).clone()
    }

    pub fn locale(&self) -> Option<String> {
        read(&self.inner.config).locale.clone()
    }

    /// Sets the locale sent as `Accept-Language`. Takes effect on the next request.
    pub fn set_locale(&self, locale: Option<&str>) {
        write(&self.inner.config).locale = locale.map(String::from);
    }

    pub fn timeout(&self) -> Option<Duration> {
        read(&self.inner.config).timeout
    }

    /// Sets the timeout of each HTTP exchange. `None` waits forever.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        write(&self.inner.config).timeout = timeout;
    }

    /// Builds a request to `uri`, with the common headers and the credentials for `domain`.
    ///
    /// When an etag is given, it is sent as `If-Match` if `etag_if_match` is set, as `If-None-Match` otherwise.
    pub fn build_message(&self, domain: Option<&Arc<AuthorizationDomain>>, method: Method, uri: &str, etag: Option<&str>, etag_if_match: bool) -> Result<Request> {
        let mut uri = Url::parse(uri)
            .map_err(|err| Error::new(ErrorKind::Protocol, format!("Invalid request URI ‘{}’: {}", uri, err)))?;
        let config = self.config();
        if uri.scheme() == "http" && uri.set_scheme("https").is_err() {
            log::warn!("Unable to switch {} to HTTPS", uri);
        }
        override_port(&mut uri, config.https_port);

        let mut request = Request::new(method, uri);
        request.domain = domain.cloned();
        self.append_query_headers(domain, &mut request, &config);

        if let Some(etag) = etag {
            let header = if etag_if_match { "If-Match" } else { "If-None-Match" };
            request.headers.set(header, etag);
        }
        Ok(request)
    }

    fn append_query_headers(&self, domain: Option<&Arc<AuthorizationDomain>>, request: &mut Request, config: &ServiceConfig) {
        if let Some(authorizer) = self.authorizer() {
            authorizer.process_request(domain, request);
        }
        if let Some(version) = self.inner.class.api_version() {
            request.headers.set("GData-Version", version);
        }
        if let Some(locale) = &config.locale {
            request.headers.set("Accept-Language", locale.as_str());
        }
        self.inner.class.append_query_headers(domain, request);
    }

    /// Sends a request, following one redirect and retrying once after refreshing the credentials.
    ///
    /// Any response is returned, whatever its status. Errors are transport failures and cancellation.
    pub async fn send_message(&self, request: &mut Request, cancellable: Option<&Cancellable>) -> Result<Response> {
        let mut response = self.send_once(request, cancellable).await?;

        if response.is_redirection() {
            let location = response.headers.get("Location").map(String::from);
            let new_uri = match location.as_deref().map(|l| request.uri.join(l)) {
                Some(Ok(uri)) => uri,
                Some(Err(err)) => {
                    return Err(Error::new(ErrorKind::Protocol, format!("Invalid redirect URI: {}", err)));
                },
                None => {
                    return Err(Error::new(ErrorKind::Protocol, "Invalid redirect URI: no Location was given"));
                },
            };
            let mut new_uri = new_uri;
            override_port(&mut new_uri, self.config().https_port);
            log::debug!("Following redirection from {} to {}", request.uri, new_uri);

            request.uri = new_uri;
            response = self.send_once(request, cancellable).await?;
        }

        if matches!(response.status, 401 | 403 | 404) {
            if let Some(authorizer) = self.authorizer() {
                if authorizer.refresh_authorization(cancellable).await {
                    log::debug!("Authorization refreshed, sending {} again", request.uri);
                    let domain = request.domain.clone();
                    authorizer.process_request(domain.as_ref(), request);
                    response = self.send_once(request, cancellable).await?;
                }
            }
        }

        Ok(response)
    }

    /// Sends a request as is: no redirect is followed and the credentials are not refreshed
    pub(crate) async fn send_once(&self, request: &Request, cancellable: Option<&Cancellable>) -> Result<Response> {
        if let Some(cancellable) = cancellable {
            let _guard = cancellable.enqueue_guard();
            if cancellable.is_cancelled() {
                log::debug!("Not sending {}: cancelled", request.uri);
                return Err(Error::cancelled());
            }
        }

        let config = self.config();
        wire_log::log_message(config.debug_level, Direction::Outgoing, &request.first_line(), request.headers.iter(), request.body.as_deref());

        let exchange = exchange(self.inner.transport.as_ref(), request, config.timeout);
        let result = match cancellable {
            None => exchange.await,
            Some(cancellable) => {
                tokio::select! {
                    biased;
                    _ = cancellable.cancelled() => {
                        log::debug!("Request to {} was cancelled in flight", request.uri);
                        return Err(Error::cancelled());
                    },
                    result = exchange => result,
                }
            },
        };

        match result {
            Ok(response) => {
                wire_log::log_message(config.debug_level, Direction::Incoming, &response.status_line(), response.headers.iter(), Some(&response.body));
                Ok(response)
            },
            Err(err) => {
                if err.may_hide_cancellation() && cancellable.map(|c| c.is_cancelled()) == Some(true) {
                    log::debug!("Treating \"{}\" as a cancellation", err);
                    return Err(Error::cancelled());
                }
                Err(err.into())
            },
        }
    }

    /// Asks the service class to classify an unexpected response
    pub fn parse_error_response(&self, operation: OperationType, response: &Response) -> Error {
        self.parse_error_status(operation, response.status, &response.reason, &response.body_text())
    }

    pub(crate) fn parse_error_status(&self, operation: OperationType, status: u16, reason_phrase: &str, body: &str) -> Error {
        self.inner.class.parse_error_response(operation, status, reason_phrase, body)
    }
}

async fn exchange(transport: &dyn Transport, request: &Request, timeout: Option<Duration>) -> std::result::Result<Response, TransportError> {
    match timeout {
        None => transport.send(request).await,
        Some(timeout) => tokio::time::timeout(timeout, transport.send(request))
            .await
            .unwrap_or(Err(TransportError::Timeout)),
    }
}

fn override_port(uri: &mut Url, https_port: Option<u16>) {
    if let Some(port) = https_port {
        if uri.set_port(Some(port)).is_err() {
            log::warn!("Unable to set the port of {}", uri);
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::TokenAuthorizer;
    use crate::mock_transport::MockTransport;

    fn service(config: ServiceConfig) -> (Service, Arc<AuthorizationDomain>) {
        let domain = AuthorizationDomain::get("test", "https://example.com/auth/test");
        let authorizer = TokenAuthorizer::new(vec![domain.clone()], Some("T1".into()));
        let service = Service::with_transport(GenericService, Some(Arc::new(authorizer)), config, Arc::new(MockTransport::new()));
        (service, domain)
    }

    #[test]
    fn message_headers() {
        let config = ServiceConfig { https_port: Some(8443), ..ServiceConfig::default() }.with_locale("fr_FR");
        let (service, domain) = service(config);

        let request = service.build_message(Some(&domain), Method::GET, "http://example.com/feeds", Some("\"e1\""), false).unwrap();
        assert_eq!(request.uri.as_str(), "https://example.com:8443/feeds");
        assert_eq!(request.headers.get("GData-Version"), Some("2"));
        assert_eq!(request.headers.get("Accept-Language"), Some("fr_FR"));
        assert_eq!(request.headers.get("Authorization"), Some("Bearer T1"));
        assert_eq!(request.headers.get("If-None-Match"), Some("\"e1\""));
        assert!(request.headers.get("If-Match").is_none());
        assert!(Arc::ptr_eq(request.domain.as_ref().unwrap(), &domain));

        let request = service.build_message(None, Method::PUT, "https://example.com/feeds/1", Some("\"e1\""), true).unwrap();
        assert_eq!(request.headers.get("If-Match"), Some("\"e1\""));
        assert!(request.headers.get("Authorization").is_none());
    }

    #[test]
    fn authorization_state() {
        let (service, _) = service(ServiceConfig::default());
        assert!(service.is_authorized());
        service.set_authorizer(None);
        assert!(service.is_authorized() == false);

        assert!(service.build_message(None, Method::GET, "not a uri", None, false).is_err());
    }
}
