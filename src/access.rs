//! Access control lists: who may do what with an entry
//!
//! An entry that can be shared links to its ACL feed. Each entry of that feed is an
//! [`AccessRule`], which grants a role to a scope (one user, a whole domain, or everybody).
//! Kinds that can be shared implement [`AccessHandler`], and the rules are then managed through
//! the [`Service`] methods of this module.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::async_ops::PendingQuery;
use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, ErrorKind, ParseError, Result};
use crate::feed::{Feed, ProgressCallback};
use crate::parsable::NamespaceTable;
use crate::parser::{self, ParserOptions, XmlNode, APP_NS};
use crate::service::Service;

pub const ACL_NS: &str = "http://schemas.google.com/acl/2007";
/// The relation of the link from a shared entry to its ACL feed
pub const LINK_ACCESS_CONTROL_LIST: &str = "http://schemas.google.com/acl/2007#accessControlList";

/// The role that grants nothing. Services define the other ones.
pub const ROLE_NONE: &str = "none";

pub const SCOPE_USER: &str = "user";
pub const SCOPE_DOMAIN: &str = "domain";
pub const SCOPE_DEFAULT: &str = "default";

/// Whom a rule applies to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccessScope {
    /// Everybody
    Default,
    /// One user, by e-mail address
    User(String),
    /// Every user of a domain, by domain name
    Domain(String),
    /// A scope type this crate does not know about
    Other { scope_type: String, value: Option<String> },
}

impl AccessScope {
    pub fn new(scope_type: &str, value: Option<&str>) -> Self {
        match (scope_type, value) {
            (SCOPE_DEFAULT, None) => AccessScope::Default,
            (SCOPE_USER, Some(user)) => AccessScope::User(user.to_string()),
            (SCOPE_DOMAIN, Some(domain)) => AccessScope::Domain(domain.to_string()),
            (scope_type, value) => AccessScope::Other {
                scope_type: scope_type.to_string(),
                value: value.map(String::from),
            },
        }
    }

    pub fn scope_type(&self) -> &str {
        match self {
            AccessScope::Default => SCOPE_DEFAULT,
            AccessScope::User(_) => SCOPE_USER,
            AccessScope::Domain(_) => SCOPE_DOMAIN,
            AccessScope::Other { scope_type, .. } => scope_type,
        }
    }

    /// The e-mail address or domain name the scope is about, if any
    pub fn value(&self) -> Option<&str> {
        match self {
            AccessScope::Default => None,
            AccessScope::User(value) | AccessScope::Domain(value) => Some(value),
            AccessScope::Other { value, .. } => value.as_deref(),
        }
    }
}

impl Default for AccessScope {
    fn default() -> Self {
        AccessScope::Default
    }
}


/// One entry of an ACL feed
#[derive(Clone, Debug, PartialEq)]
pub struct AccessRule {
    role: String,
    scope: AccessScope,
    edited: Option<DateTime<Utc>>,
}

impl Default for AccessRule {
    fn default() -> Self {
        Self {
            role: ROLE_NONE.to_string(),
            scope: AccessScope::Default,
            edited: None,
        }
    }
}

impl AccessRule {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn scope(&self) -> &AccessScope {
        &self.scope
    }

    /// When the rule was last changed. Set by the server.
    pub fn edited(&self) -> Option<DateTime<Utc>> {
        self.edited
    }
}

impl EntryKind for AccessRule {
    fn kind_term() -> Option<&'static str> {
        Some("http://schemas.google.com/acl/2007#accessRule")
    }

    fn parse_xml(&mut self, node: &XmlNode) -> std::result::Result<bool, ParseError> {
        if node.is_namespace(APP_NS) {
            return parser::time_from_element(node, "edited", ParserOptions::REQUIRED | ParserOptions::NO_DUPES, &mut self.edited);
        }
        if node.is_namespace(ACL_NS) == false {
            return Ok(false);
        }

        match node.name() {
            "role" => {
                self.role = parser::required_attribute(node, "value", ParserOptions::empty())?;
                Ok(true)
            },
            "scope" => {
                let scope_type = parser::required_attribute(node, "type", ParserOptions::NON_EMPTY)?;
                let value = node.attr("value");
                if value.is_none() && scope_type != SCOPE_DEFAULT {
                    return Err(ParseError::RequiredPropertyMissing { element: node.describe(), property: "value".to_string() });
                }
                self.scope = AccessScope::new(&scope_type, value);
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    fn render_xml(&self, xml: &mut String) {
        parser::append_escaped(xml, "<gAcl:role value='", &self.role, "'/>");
        parser::append_escaped(xml, "<gAcl:scope type='", self.scope.scope_type(), "'");
        if let Some(value) = self.scope.value() {
            parser::append_escaped(xml, " value='", value, "'");
        }
        xml.push_str("/>");
    }

    fn namespaces(&self, namespaces: &mut NamespaceTable) {
        namespaces.insert("gAcl", ACL_NS);
    }
}

impl Entry<AccessRule> {
    /// A rule yet to be inserted, granting `role` to `scope`
    pub fn with_role(role: &str, scope: AccessScope) -> Self {
        let mut rule = Self::new(None);
        rule.set_role(role);
        rule.set_scope(scope);
        rule
    }

    pub fn role(&self) -> &str {
        self.kind().role()
    }

    /// Changes the role. The title follows it, as services display rules by their role.
    pub fn set_role(&mut self, role: &str) {
        self.kind_mut().role = role.to_string();
        self.set_title(Some(role));
    }

    pub fn scope(&self) -> &AccessScope {
        self.kind().scope()
    }

    pub fn set_scope(&mut self, scope: AccessScope) {
        self.kind_mut().scope = scope;
    }

    pub fn edited(&self) -> Option<DateTime<Utc>> {
        self.kind().edited()
    }
}


/// A kind of entry that can be shared through an ACL
pub trait AccessHandler: EntryKind {
    /// The domain whose credentials are used to manage the rules
    fn authorization_domain() -> Option<Arc<AuthorizationDomain>> {
        None
    }

    /// Whether `rule` makes someone the owner of the entry
    fn is_owner_rule(_rule: &Entry<AccessRule>) -> bool {
        false
    }
}

fn acl_uri<K: AccessHandler>(entry: &Entry<K>) -> Result<String> {
    entry.look_up_link(LINK_ACCESS_CONTROL_LIST)
        .map(|link| link.uri().to_string())
        .ok_or_else(|| Error::new(ErrorKind::Protocol, "The entry has no access control list link."))
}

impl Service {
    /// Fetches the rules of the ACL of `entry`
    pub async fn get_access_rules<K: AccessHandler>(
        &self,
        entry: &Entry<K>,
        cancellable: Option<&Cancellable>,
        progress: Option<&mut ProgressCallback<'_, AccessRule>>,
    ) -> Result<Feed<AccessRule>> {
        let uri = acl_uri(entry)?;
        let domain = K::authorization_domain();
        let feed = self.query(domain.as_ref(), &uri, None, cancellable, progress).await?;
        feed.ok_or_else(|| Error::new(ErrorKind::Protocol, "The server did not return the access control list."))
    }

    /// Starts [`Service::get_access_rules`] in the background.
    ///
    /// Fails at once if the entry has no ACL.
    pub fn get_access_rules_async<K: AccessHandler>(
        &self,
        entry: &Entry<K>,
        cancellable: Option<Cancellable>,
    ) -> Result<PendingQuery<AccessRule>> {
        let uri = acl_uri(entry)?;
        Ok(self.query_async(K::authorization_domain(), &uri, None, cancellable))
    }

    /// Adds `rule` to the ACL of `entry`, and returns the server's version of it
    pub async fn insert_access_rule<K: AccessHandler>(
        &self,
        entry: &Entry<K>,
        rule: &Entry<AccessRule>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<AccessRule>> {
        let uri = acl_uri(entry)?;
        log::debug!("Adding a {} rule to {}", rule.role(), uri);
        self.insert_entry(K::authorization_domain().as_ref(), &uri, rule, cancellable).await
    }

    /// Changes a rule of an ACL of a `K` entry
    pub async fn update_access_rule<K: AccessHandler>(
        &self,
        rule: &Entry<AccessRule>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<AccessRule>> {
        self.update_entry(K::authorization_domain().as_ref(), rule, cancellable).await
    }

    /// Removes a rule from an ACL of a `K` entry
    pub async fn delete_access_rule<K: AccessHandler>(
        &self,
        rule: &Entry<AccessRule>,
        cancellable: Option<&Cancellable>,
    ) -> Result<bool> {
        if K::is_owner_rule(rule) {
            log::warn!("Deleting an owner rule of an access control list");
        }
        self.delete_entry(K::authorization_domain().as_ref(), rule, cancellable).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Link;
    use crate::atom::link::LINK_EDIT;
    use crate::config::ServiceConfig;
    use crate::mock_transport::{MockReply, MockTransport};
    use crate::parsable::Parsable;
    use crate::service::GenericService;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Shared;

    impl EntryKind for Shared {}

    impl AccessHandler for Shared {
        fn authorization_domain() -> Option<Arc<AuthorizationDomain>> {
            Some(AuthorizationDomain::get("shared", "https://example.com/auth/shared"))
        }

        fn is_owner_rule(rule: &Entry<AccessRule>) -> bool {
            rule.role() == "owner"
        }
    }

    const RULES: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:gAcl="http://schemas.google.com/acl/2007" xmlns:app="http://www.w3.org/2007/app">
    <id>https://example.com/acl/doc1</id>
    <updated>2025-01-01T00:00:00Z</updated>
    <entry>
        <id>https://example.com/acl/doc1/user:joe@example.com</id>
        <updated>2025-01-01T00:00:00Z</updated>
        <app:edited>2025-01-01T09:30:00Z</app:edited>
        <title>owner</title>
        <category scheme="http://schemas.google.com/g/2005#kind" term="http://schemas.google.com/acl/2007#accessRule"/>
        <link rel="edit" href="https://example.com/acl/doc1/user:joe@example.com"/>
        <gAcl:role value="owner"/>
        <gAcl:scope type="user" value="joe@example.com"/>
    </entry>
    <entry>
        <id>https://example.com/acl/doc1/default</id>
        <updated>2025-01-01T00:00:00Z</updated>
        <title>reader</title>
        <gAcl:role value="reader"/>
        <gAcl:scope type="default"/>
    </entry>
</feed>"#;

    fn shared_entry() -> Entry<Shared> {
        let mut entry = Entry::new(Some("https://example.com/docs/doc1"));
        entry.add_link(Link::new("https://example.com/acl/doc1", Some(LINK_ACCESS_CONTROL_LIST)));
        entry
    }

    #[test]
    fn scopes() {
        assert_eq!(AccessScope::new("user", Some("joe@example.com")), AccessScope::User("joe@example.com".into()));
        assert_eq!(AccessScope::new("default", None), AccessScope::Default);
        let group = AccessScope::new("group", Some("team@example.com"));
        assert_eq!(group.scope_type(), "group");
        assert_eq!(group.value(), Some("team@example.com"));
    }

    #[test]
    fn render_rule() {
        let rule = Entry::<AccessRule>::with_role("writer", AccessScope::Domain("example.com".into()));
        assert_eq!(rule.title(), Some("writer"));

        let xml = rule.to_xml();
        assert!(xml.contains("xmlns:gAcl='http://schemas.google.com/acl/2007'"));
        assert!(xml.contains("<gAcl:role value='writer'/><gAcl:scope type='domain' value='example.com'/>"));

        let everybody = Entry::<AccessRule>::with_role(ROLE_NONE, AccessScope::Default);
        assert!(everybody.to_xml().contains("<gAcl:scope type='default'/>"));

        let again = Entry::<AccessRule>::from_xml(xml.as_bytes()).unwrap();
        assert_eq!(again.role(), "writer");
        assert_eq!(again.scope(), &AccessScope::Domain("example.com".into()));
    }

    #[test]
    fn scope_value_is_required_for_users() {
        let doc = "<entry xmlns='http://www.w3.org/2005/Atom' xmlns:gAcl='http://schemas.google.com/acl/2007'>\
                   <gAcl:scope type='user'/></entry>";
        let err = Entry::<AccessRule>::from_xml(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::RequiredPropertyMissing { ref property, .. } if property == "value"));
    }

    #[tokio::test]
    async fn list_rules() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::atom(RULES));
        let service = Service::with_transport(GenericService, None, ServiceConfig::default(), transport.clone());

        let rules = service.get_access_rules(&shared_entry(), None, None).await.unwrap();
        assert_eq!(rules.entries().len(), 2);

        let owner = &rules.entries()[0];
        assert_eq!(owner.role(), "owner");
        assert_eq!(owner.scope(), &AccessScope::User("joe@example.com".into()));
        assert_eq!(owner.edited(), parser::parse_iso8601("2025-01-01T09:30:00Z"));
        assert!(Shared::is_owner_rule(owner));
        assert_eq!(rules.entries()[1].scope(), &AccessScope::Default);
        assert!(Shared::is_owner_rule(&rules.entries()[1]) == false);

        let requests = transport.requests();
        assert_eq!(requests[0].uri.as_str(), "https://example.com/acl/doc1");
    }

    #[tokio::test]
    async fn entry_without_acl() {
        let transport = Arc::new(MockTransport::new());
        let service = Service::with_transport(GenericService, None, ServiceConfig::default(), transport.clone());

        let entry: Entry<Shared> = Entry::new(Some("https://example.com/docs/private"));
        let err = service.get_access_rules(&entry, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(service.get_access_rules_async(&entry, None).is_err());
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn insert_and_update_rules() {
        let _ = env_logger::builder().is_test(true).try_init();
        let created = r#"<entry xmlns="http://www.w3.org/2005/Atom" xmlns:gAcl="http://schemas.google.com/acl/2007" xmlns:gd="http://schemas.google.com/g/2005" gd:etag="&quot;r1&quot;">
            <id>https://example.com/acl/doc1/user:jane@example.com</id>
            <title>reader</title>
            <link rel="edit" href="https://example.com/acl/doc1/user:jane@example.com"/>
            <gAcl:role value="reader"/>
            <gAcl:scope type="user" value="jane@example.com"/>
        </entry>"#;
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::atom(created));
        transport.push(MockReply::atom(created.replace("reader", "writer")));
        transport.push(MockReply::status(204));
        let service = Service::with_transport(GenericService, None, ServiceConfig::default(), transport.clone());

        let rule = Entry::<AccessRule>::with_role("reader", AccessScope::User("jane@example.com".into()));
        let mut inserted = service.insert_access_rule(&shared_entry(), &rule, None).await.unwrap();
        assert_eq!(inserted.scope().value(), Some("jane@example.com"));

        inserted.set_role("writer");
        let updated = service.update_access_rule::<Shared>(&inserted, None).await.unwrap();
        assert_eq!(updated.role(), "writer");
        assert!(service.delete_access_rule::<Shared>(&updated, None).await.unwrap());

        let requests = transport.requests();
        assert_eq!(requests[0].uri.as_str(), "https://example.com/acl/doc1");
        let body = String::from_utf8(requests[0].body.clone().unwrap()).unwrap();
        assert!(body.contains("<gAcl:role value='reader'/><gAcl:scope type='user' value='jane@example.com'/>"));
        assert_eq!(requests[1].uri.as_str(), updated.look_up_link(LINK_EDIT).unwrap().uri());
        assert_eq!(requests[1].headers.get("If-Match"), Some("\"r1\""));
        assert_eq!(requests[2].headers.get("If-Match"), Some("\"r1\""));
    }
}
