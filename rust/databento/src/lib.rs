//! The official Databento client library.
//!
//! The clients support fast and lightweight access to the Databento API:
//! - [`HistoricalClient`] for streaming historical market data over HTTP
//! - [`LiveClient`] for subscribing to real-time and intraday replay data over a
//!   raw TCP session
//!
//! Both clients exchange data in Databento Binary Encoding (DBN), re-exported here
//! from the [`dbn`] crate. Historical data is materialized in a [`DbnStore`], which
//! supports iteration as well as tabular, CSV, and JSON projections.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::missing_errors_doc)]

pub mod error;
pub mod historical;
pub mod live;
mod store;
pub mod symbology;
mod symbols;
mod transcode;
mod validation;

pub use dbn;

pub use crate::{
    error::{Error, Result},
    historical::HistoricalClient,
    live::{LiveClient, ReconnectPolicy, Subscription},
    store::{
        DataSource, DbnStore, DfIter, DfParams, ExportParams, PriceType, RecordBatchIter,
        StoreIter,
    },
    symbology::{InstrumentMap, Resolution},
    symbols::{SymbolList, ALL_SYMBOLS},
    transcode::{TranscodeParams, Transcoder},
    validation::DateTimeArg,
};

pub(crate) mod cram;

/// The expected length of an API key.
pub const API_KEY_LENGTH: usize = 32;
/// The length of the API key suffix used as a server-side lookup tag.
pub const BUCKET_ID_LENGTH: usize = 5;
/// The environment variable holding the default API key.
pub const API_KEY_ENV_VAR: &str = "DATABENTO_API_KEY";

/// A validated Databento API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(pub(crate) String);

impl ApiKey {
    /// Validates `key` and returns a new `ApiKey`.
    ///
    /// # Errors
    /// This function returns an error if the key is of an invalid length or
    /// contains non-ASCII characters.
    pub fn new(key: String) -> Result<Self> {
        validation::validate_key(key)
    }

    /// Reads and validates the API key from the `DATABENTO_API_KEY` environment
    /// variable.
    ///
    /// # Errors
    /// This function returns an error if the environment variable is not set or the
    /// key is invalid.
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(API_KEY_ENV_VAR).map_err(|_| {
            Error::bad_argument(
                "key",
                format!("no key was provided and {API_KEY_ENV_VAR} is not set"),
            )
        })?;
        Self::new(key)
    }

    /// Returns the API key as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last five characters of the key, used as a server-side key
    /// lookup tag.
    pub fn bucket_id(&self) -> &str {
        &self.0[API_KEY_LENGTH - BUCKET_ID_LENGTH..]
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // avoid leaking the key in logs
        write!(f, "ApiKey(****{})", self.bucket_id())
    }
}
