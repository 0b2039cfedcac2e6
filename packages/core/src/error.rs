//! Error types shared by the package registry and the communicator catalog.

use std::fmt;

use thiserror::Error;

/// Boxed error returned by user-supplied hooks and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What kind of named entry an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Package,
    Communicator,
    Channel,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Package => write!(f, "package"),
            EntryKind::Communicator => write!(f, "communicator"),
            EntryKind::Channel => write!(f, "channel"),
        }
    }
}

/// Registration and lookup errors.
///
/// Registration-time variants (`DuplicateName`, `InvalidName`,
/// `MalformedDefinition`, `RegistrationClosed`) abort the whole registration
/// call and leave the registry untouched. The rest are returned from lookups.
#[derive(Debug, Error)]
pub enum Error {
    /// No entry with this name was registered.
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntryKind, name: String },

    /// Two entries share a name.
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: EntryKind, name: String },

    /// A name is not a valid identifier.
    #[error("invalid name '{name}': {message}")]
    InvalidName { name: String, message: String },

    /// A communicator definition failed structural validation.
    #[error("malformed definition '{name}': {message}")]
    MalformedDefinition { name: String, message: String },

    /// A package was resolved again while its own initialization was running
    /// on the same call stack.
    #[error("re-entrant initialization of '{name}' ({})", .chain.join(" -> "))]
    ReentrantInit { name: String, chain: Vec<String> },

    /// A package initialization hook failed with an error of its own.
    /// Registry errors from nested resolves are re-raised unwrapped.
    #[error("initialization of '{name}' failed: {source}")]
    Initialization { name: String, source: BoxError },

    /// A package is restricted to a domain the host is not running on.
    #[error("package '{name}' is restricted to the {domain} domain, host runs as {side}")]
    DomainMismatch {
        name: String,
        domain: String,
        side: String,
    },

    /// A resolved instance is not of the requested type.
    #[error("package '{name}' is not a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Registration was attempted after the registry was sealed.
    #[error("registration is closed")]
    RegistrationClosed,

    /// Structural data could not be decoded.
    #[error("decode error: {message}")]
    Decode { message: String },
}

impl Error {
    pub fn not_found(kind: EntryKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn duplicate(kind: EntryKind, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    pub fn malformed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedDefinition {
            name: name.into(),
            message: message.into(),
        }
    }

    /// True for errors raised while registering containers.
    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateName { .. }
                | Error::InvalidName { .. }
                | Error::MalformedDefinition { .. }
                | Error::RegistrationClosed
        )
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
