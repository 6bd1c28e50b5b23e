//! Error types returned by this crate

use std::fmt::{Display, Formatter};

/// The category of an [`Error`].
///
/// This is what callers should match on. The raw HTTP status is not part of the public contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The host cannot be reached (DNS failure, refused connection, TLS failure, socket error, timeout)
    Network,
    /// The proxy cannot be reached
    Proxy,
    /// The client or the server strayed from the protocol (including unparseable bodies)
    Protocol,
    /// The request needs (valid) credentials
    AuthenticationRequired,
    /// The requested feed or entry does not exist
    NotFound,
    /// The server-side copy was modified since it was downloaded
    Conflict,
    /// `insert` was called on an entry that already has a server identity
    EntryAlreadyInserted,
    /// A service quota rule was hit
    QuotaExceeded,
    /// The whole batch operation failed
    BatchFailed,
    /// The service is down or disabled
    Unavailable,
    /// The action is forbidden for reasons other than missing credentials
    Forbidden,
    /// A query parameter was rejected by the service
    BadQueryParameter,
    /// The cancel token was triggered while the operation could still be cancelled
    Cancelled,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Network => "network error",
            ErrorKind::Proxy => "proxy error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::AuthenticationRequired => "authentication required",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::EntryAlreadyInserted => "entry already inserted",
            ErrorKind::QuotaExceeded => "quota exceeded",
            ErrorKind::BatchFailed => "batch operation failed",
            ErrorKind::Unavailable => "service unavailable",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::BadQueryParameter => "bad query parameter",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// The error type of every service operation
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    /// `reason` member of a JSON error envelope, if any
    reason: Option<String>,
    /// `message` member of a JSON error envelope, if any
    server_message: Option<String>,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self { kind, message: message.into(), reason: None, server_message: None }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Operation was cancelled")
    }

    /// Attach the details a JSON service sent along with the error
    pub fn with_server_details(mut self, reason: Option<String>, server_message: Option<String>) -> Self {
        self.reason = reason;
        self.server_message = server_message;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn server_message(&self) -> Option<&str> {
        self.server_message.as_deref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Errors raised while turning a document into entities
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("A ‘{element}’ element was missing required content.")]
    MissingContent { element: String },

    #[error("A required element (<{parent}/{element}>) was not present.")]
    RequiredElementMissing { parent: String, element: String },

    #[error("A singleton element ({element}) was duplicated.")]
    DuplicateElement { element: String },

    #[error("The content of a {element} element (‘{content}’) was not in ISO 8601 format.")]
    NotIso8601 { element: String, content: String },

    #[error("A required property of a {element} element (@{property}) was not present.")]
    RequiredPropertyMissing { element: String, property: String },

    #[error("The content of a ‘{element}’ element (‘{content}’) was not in hexadecimal RGB format.")]
    NotHexColour { element: String, content: String },

    #[error("The content of a ‘{element}’ element (‘{content}’) was not of the expected type.")]
    WrongType { element: String, content: String },

    #[error("Error parsing XML: {0}")]
    Xml(String),

    #[error("Error parsing JSON: {0}")]
    Json(String),

    #[error("Expected a <{expected}> root element but got <{found}>.")]
    UnexpectedRoot { expected: String, found: String },
}

impl ParseError {
    pub fn required_element_missing<P: Into<String>, E: Into<String>>(element: E, parent: P) -> Self {
        ParseError::RequiredElementMissing { parent: parent.into(), element: element.into() }
    }

    pub fn duplicate<E: Into<String>>(element: E) -> Self {
        ParseError::DuplicateElement { element: element.into() }
    }

    pub fn missing_content<E: Into<String>>(element: E) -> Self {
        ParseError::MissingContent { element: element.into() }
    }
}

impl From<minidom::Error> for ParseError {
    fn from(err: minidom::Error) -> Self {
        ParseError::Xml(err.to_string())
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err.to_string())
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::new(ErrorKind::Protocol, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
