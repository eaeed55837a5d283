//! The client error types.

/// An error that can occur while working with Databento's API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An invalid argument was passed to a function.
    #[error("bad argument `{param_name}`: {desc}")]
    BadArgument {
        /// The name of the invalid parameter.
        param_name: String,
        /// Why the parameter was invalid.
        desc: String,
    },
    /// An I/O error while reading or writing a file or stream.
    #[error("I/O error: {source} while {context}")]
    Io {
        /// The original error.
        #[source]
        source: std::io::Error,
        /// The operation that failed.
        context: String,
    },
    /// A source of DBN data contained no bytes.
    #[error("empty DBN source: {0}")]
    Empty(String),
    /// An error in the DBN encoding layer.
    #[error(transparent)]
    Dbn(#[from] dbn::Error),
    /// Authentication with the gateway failed.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Establishing a connection with the gateway failed.
    #[error("connection to {gateway} failed: {source}")]
    Connect {
        /// The gateway address.
        gateway: String,
        /// The original error.
        #[source]
        source: std::io::Error,
    },
    /// A timeout while connecting to or authenticating with the gateway.
    #[error("timed out {during} with {gateway}")]
    Timeout {
        /// The gateway address.
        gateway: String,
        /// The phase that timed out.
        during: &'static str,
    },
    /// An unparseable control message from the gateway.
    #[error("invalid gateway message: `{0}`")]
    Gateway(String),
    /// An unexpected HTTP status from the historical API.
    #[error("HTTP status {status}: {message}{}", request_id.as_ref().map(|id| format!(" (request ID {id})")).unwrap_or_default())]
    Http {
        /// The response status code.
        status: u16,
        /// The response body.
        message: String,
        /// The request ID from the response headers, when present.
        request_id: Option<String>,
    },
    /// An error at the HTTP transport layer.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// One or more error records sent by the gateway over the course of a live
    /// session, surfaced when the session closes.
    #[error("session error(s) from the gateway: {}", messages.join("; "))]
    Session {
        /// The accumulated error messages.
        messages: Vec<String>,
    },
    /// The connection was lost while streaming.
    #[error("disconnected while streaming")]
    Disconnected,
}

/// An alias for a `Result` with [`databento::Error`](crate::Error) as the error
/// type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new bad-argument error for `param_name`.
    pub fn bad_argument(param_name: impl ToString, desc: impl ToString) -> Self {
        Self::BadArgument {
            param_name: param_name.to_string(),
            desc: desc.to_string(),
        }
    }

    /// Creates a new I/O error with the given `context`.
    pub fn io(source: std::io::Error, context: impl ToString) -> Self {
        Self::Io {
            source,
            context: context.to_string(),
        }
    }
}
