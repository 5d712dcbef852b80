//! Error type shared by every component.
//!
//! An [`Error`] is a small tagged struct: an optional logical operation, a
//! machine-readable [`Code`], an optional human message and an optional cause.
//! Errors are assembled with the builder methods and wrapped as they travel
//! up through the layers, e.g.
//!
//! ```ignore
//! Err(Error::op("outbox.PollableDataSource.set_as_processed").wrap(err))
//! ```

use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable error code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Code {
    #[default]
    Other,
    Internal,
    Invalid,
    NotFound,
    Exists,
    Expired,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Other => "other error",
            Code::Internal => "internal error",
            Code::Invalid => "invalid error",
            Code::NotFound => "item not found",
            Code::Exists => "item already exists",
            Code::Expired => "item has expired",
        };
        f.write_str(s)
    }
}

/// Error with an operation tag, a code, a message and a causal chain.
#[derive(Debug, Default)]
pub struct Error {
    op: Option<&'static str>,
    code: Code,
    message: Option<String>,
    cause: Option<BoxError>,
}

impl Error {
    pub fn new(code: Code) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Start an error tagged with the operation that produced it.
    pub fn op(op: &'static str) -> Self {
        Self {
            op: Some(op),
            ..Self::default()
        }
    }

    /// Plain error carrying only a human message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::default().with_message(message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound).with_message(message)
    }

    pub fn exists(message: impl Into<String>) -> Self {
        Self::new(Code::Exists).with_message(message)
    }

    pub fn with_op(mut self, op: &'static str) -> Self {
        self.op = Some(op);
        self
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Wrap another crate error as the cause.
    pub fn wrap(self, cause: Error) -> Self {
        self.with_cause(cause)
    }

    pub fn operation(&self) -> Option<&'static str> {
        self.op
    }

    /// Code of the outermost explicitly coded error in the chain; wrappers
    /// without a code defer to their cause.
    ///
    /// A chain without any code, or one that ends in a foreign error, is
    /// reported as [`Code::Internal`].
    pub fn code(&self) -> Code {
        if self.code != Code::Other {
            return self.code;
        }
        match self.inner() {
            Some(inner) => inner.code(),
            None => Code::Internal,
        }
    }

    pub fn is(&self, code: Code) -> bool {
        self.code() == code
    }

    /// Innermost human-readable message, or a generic one.
    pub fn user_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match self.inner() {
            Some(inner) => inner.user_message(),
            None => "An internal error has occurred. Please contact technical support.".to_string(),
        }
    }

    fn inner(&self) -> Option<&Error> {
        self.cause.as_deref().and_then(|c| c.downcast_ref::<Error>())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.op {
            write!(f, "{op}: ")?;
        }
        if self.code != Code::Other {
            write!(f, "<{}> ", self.code)?;
        }
        if let Some(message) = &self.message {
            f.write_str(message)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n\t\t{cause}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(Code::Invalid)
            .with_message("malformed json payload")
            .with_cause(err)
    }
}
