//! This crate provides a client for GData-style web services: online services that expose their
//! data as feeds of entries, in Atom XML or JSON, over HTTPS.
//!
//! A [`Service`] sends the requests. It is given a [`ServiceClass`](service::ServiceClass) that
//! holds what is specific to one online service, and an optional [`Authorizer`](authorization::Authorizer)
//! that attaches credentials to requests. \
//! Data is modelled as [`Entry`] values (generic over an [`EntryKind`](entry::EntryKind) that
//! holds the service-specific fields), grouped in [`Feed`]s that are fetched page by page with a
//! [`Query`].
//!
//! Every operation is an `async fn`. Background variants are in the [`async_ops`] module, and a
//! synchronous wrapper is in the [`blocking`] module. \
//! Entries that can be shared or commented on get the operations of the [`access`] and
//! [`comments`] modules. The [`tasks`] module implements the Google Tasks API on top of this.

pub mod error;
pub use error::{Error, ErrorKind, ParseError};
pub mod config;
pub use config::ServiceConfig;
pub mod wire_log;
pub mod cancel;
pub use cancel::Cancellable;

pub mod transport;
pub mod authorization;
pub use authorization::{AuthorizationDomain, Authorizer, TokenAuthorizer};

pub mod parser;
pub mod parsable;
pub use parsable::{ContentType, Parsable};
pub mod atom;
pub mod entry;
pub use entry::Entry;
pub mod feed;
pub use feed::Feed;
pub mod query;
pub use query::Query;

pub mod service;
pub use service::Service;
pub mod batch;
pub mod async_ops;
pub mod blocking;
pub mod streams;
pub mod access;
pub mod comments;

pub mod tasks;

pub mod mock_transport;
