//! Error types for the DBN crate.

use std::fmt;

/// An error that can occur while processing DBN.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error while reading or writing DBN or another encoding.
    #[error("I/O error: {source} while {context}")]
    Io {
        /// The original error.
        #[source]
        source: std::io::Error,
        /// The operation that failed.
        context: String,
    },
    /// A failure decoding data, e.g. corrupt or truncated input.
    #[error("decoding error: {0}")]
    Decode(String),
    /// A failure encoding data.
    #[error("encoding error: {0}")]
    Encode(String),
    /// A failure converting bytes or values to a particular type.
    #[error("couldn't convert {input} to {desired_type}")]
    Conversion {
        /// The input to the conversion.
        input: String,
        /// The desired type.
        desired_type: &'static str,
    },
    /// An invalid argument was passed to a function.
    #[error("bad argument `{param_name}`: {desc}")]
    BadArgument {
        /// The name of the invalid parameter.
        param_name: String,
        /// Why the parameter was invalid.
        desc: String,
    },
    /// Invalid UTF-8 in a string field.
    #[error("UTF-8 error: {source} while {context}")]
    Utf8 {
        /// The original error.
        #[source]
        source: std::str::Utf8Error,
        /// The operation that failed.
        context: String,
    },
}

/// An alias for a `Result` with [`dbn::Error`](crate::Error) as the error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new I/O error with the given `context`.
    pub fn io(source: std::io::Error, context: impl ToString) -> Self {
        Self::Io {
            source,
            context: context.to_string(),
        }
    }

    /// Creates a new decode error with the given `msg`.
    pub fn decode(msg: impl ToString) -> Self {
        Self::Decode(msg.to_string())
    }

    /// Creates a new encode error with the given `msg`.
    pub fn encode(msg: impl ToString) -> Self {
        Self::Encode(msg.to_string())
    }

    /// Creates a new conversion error where `input` couldn't be converted to `T`.
    pub fn conversion<T>(input: impl fmt::Display) -> Self {
        Self::Conversion {
            input: input.to_string(),
            desired_type: std::any::type_name::<T>(),
        }
    }

    /// Creates a new bad-argument error for `param_name`.
    pub fn bad_argument(param_name: impl ToString, desc: impl ToString) -> Self {
        Self::BadArgument {
            param_name: param_name.to_string(),
            desc: desc.to_string(),
        }
    }

    /// Creates a new UTF-8 error with the given `context`.
    pub fn utf8(source: std::str::Utf8Error, context: impl ToString) -> Self {
        Self::Utf8 {
            source,
            context: context.to_string(),
        }
    }
}

/// Maps a clean end of the input to `Ok(None)` and everything else to an error.
/// Used by the record decoders, where EOF at a record boundary is an ordinary
/// end of stream but EOF mid-record is a truncation.
pub(crate) fn silence_eof_error<T>(err: std::io::Error) -> std::io::Result<Option<T>> {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Ok(None)
    } else {
        Err(err)
    }
}
