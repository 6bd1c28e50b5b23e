//! Authorization domains and the [`Authorizer`] interface
//!
//! This crate does not implement any authorization protocol (e.g. OAuth flows). An authorizer only
//! decorates requests with a credential, and knows how to refresh it.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::cancel::Cancellable;
use crate::transport::Request;

/// A (service name, scope URI) pair, naming a unit of access control.
///
/// Domains are interned: [`AuthorizationDomain::get`] always returns the same `Arc` for the same
/// pair, so `Arc::ptr_eq` is a valid comparison.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct AuthorizationDomain {
    service_name: String,
    scope: String,
}

static DOMAINS: Lazy<Mutex<HashMap<(String, String), Arc<AuthorizationDomain>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

impl AuthorizationDomain {
    /// Returns the interned domain for this pair, creating it on first use
    pub fn get(service_name: &str, scope: &str) -> Arc<AuthorizationDomain> {
        let mut domains = match DOMAINS.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        domains
            .entry((service_name.to_string(), scope.to_string()))
            .or_insert_with(|| Arc::new(AuthorizationDomain {
                service_name: service_name.to_string(),
                scope: scope.to_string(),
            }))
            .clone()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Display for AuthorizationDomain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.service_name, self.scope)
    }
}

/// Something that can attach credentials to requests
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Attaches the current credential for `domain` to `request`.
    ///
    /// Implementations must replace existing authorization headers rather than append to them:
    /// this is called again on the same request after a refresh.
    fn process_request(&self, domain: Option<&Arc<AuthorizationDomain>>, request: &mut Request);

    /// Whether a credential is available for this domain. This must not do any network activity.
    fn is_authorized_for_domain(&self, domain: &Arc<AuthorizationDomain>) -> bool;

    /// Tries to obtain fresh credentials. Returns whether it succeeded.
    async fn refresh_authorization(&self, cancellable: Option<&Cancellable>) -> bool;
}


/// Where a [`TokenAuthorizer`] gets new tokens from
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a fresh access token, or `None` when the refresh failed
    async fn fetch_token(&self) -> Option<String>;
}

/// An authorizer that sends `Authorization: Bearer <token>` for a fixed set of domains
pub struct TokenAuthorizer {
    domains: Vec<Arc<AuthorizationDomain>>,
    token: Mutex<Option<String>>,
    source: Option<Box<dyn TokenSource>>,
}

impl TokenAuthorizer {
    /// An authorizer with an initial token, that cannot be refreshed
    pub fn new(domains: Vec<Arc<AuthorizationDomain>>, token: Option<String>) -> Self {
        Self { domains, token: Mutex::new(token), source: None }
    }

    /// An authorizer that asks `source` for a new token whenever a refresh is needed
    pub fn with_source(domains: Vec<Arc<AuthorizationDomain>>, token: Option<String>, source: Box<dyn TokenSource>) -> Self {
        Self { domains, token: Mutex::new(token), source: Some(source) }
    }

    pub fn token(&self) -> Option<String> {
        self.lock_token().clone()
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.token.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn handles(&self, domain: &Arc<AuthorizationDomain>) -> bool {
        self.domains.iter().any(|d| Arc::ptr_eq(d, domain))
    }
}

#[async_trait]
impl Authorizer for TokenAuthorizer {
    fn process_request(&self, domain: Option<&Arc<AuthorizationDomain>>, request: &mut Request) {
        let domain = match domain {
            Some(d) if self.handles(d) => d,
            _ => return,
        };
        if let Some(token) = self.lock_token().as_ref() {
            log::trace!("Authorizing request to {} for {}", request.uri, domain);
            request.headers.set("Authorization", format!("Bearer {}", token));
        }
    }

    fn is_authorized_for_domain(&self, domain: &Arc<AuthorizationDomain>) -> bool {
        self.handles(domain) && self.lock_token().is_some()
    }

    async fn refresh_authorization(&self, cancellable: Option<&Cancellable>) -> bool {
        let source = match &self.source {
            None => return false,
            Some(s) => s,
        };
        if cancellable.map(|c| c.is_cancelled()).unwrap_or(false) {
            return false;
        }

        match source.fetch_token().await {
            Some(token) => {
                *self.lock_token() = Some(token);
                true
            },
            None => {
                log::warn!("Unable to refresh authorization");
                false
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    struct Fixed(&'static str);

    #[async_trait]
    impl TokenSource for Fixed {
        async fn fetch_token(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    #[test]
    fn domains_are_interned() {
        let a = AuthorizationDomain::get("tasks", "https://www.googleapis.com/auth/tasks");
        let b = AuthorizationDomain::get("tasks", "https://www.googleapis.com/auth/tasks");
        let c = AuthorizationDomain::get("calendar", "https://www.googleapis.com/auth/calendar");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c) == false);
        assert_eq!(a.service_name(), "tasks");
    }

    #[tokio::test]
    async fn refresh_replaces_the_credential() {
        let domain = AuthorizationDomain::get("test-auth", "https://example.com/auth");
        let other = AuthorizationDomain::get("test-other", "https://example.com/other");
        let authorizer = TokenAuthorizer::with_source(vec![domain.clone()], Some("T1".into()), Box::new(Fixed("T2")));

        let mut request = Request::new(reqwest::Method::GET, Url::parse("https://example.com/feed").unwrap());
        authorizer.process_request(Some(&domain), &mut request);
        assert_eq!(request.headers.get("Authorization"), Some("Bearer T1"));

        assert!(authorizer.refresh_authorization(None).await);
        authorizer.process_request(Some(&domain), &mut request);
        assert_eq!(request.headers.get_all("Authorization").collect::<Vec<_>>(), vec!["Bearer T2"]);

        let mut foreign = Request::new(reqwest::Method::GET, Url::parse("https://example.com/feed").unwrap());
        authorizer.process_request(Some(&other), &mut foreign);
        assert!(foreign.headers.get("Authorization").is_none());
        assert!(authorizer.is_authorized_for_domain(&other) == false);
    }
}
