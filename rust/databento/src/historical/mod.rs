//! The historical client: HTTP access to Databento's historical market data and
//! symbology.

pub mod symbology;
pub mod timeseries;

use crate::{ApiKey, Error, Result};

/// The default address of the historical API gateway.
pub const DEFAULT_HISTORICAL_GATEWAY: &str = "https://hist.databento.com";
/// The API version path prefix.
pub(crate) const API_VERSION: u8 = 0;

/// A client for Databento's historical market data API.
pub struct HistoricalClient {
    key: ApiKey,
    base_url: String,
    http: reqwest::Client,
}

/// A builder for [`HistoricalClient`].
#[derive(Default)]
pub struct HistoricalClientBuilder {
    key: Option<ApiKey>,
    base_url: Option<String>,
}

impl HistoricalClientBuilder {
    /// Sets the API key.
    ///
    /// # Errors
    /// This function returns an error if the key is invalid.
    pub fn key(mut self, key: impl ToString) -> Result<Self> {
        self.key = Some(ApiKey::new(key.to_string())?);
        Ok(self)
    }

    /// Reads the API key from the `DATABENTO_API_KEY` environment variable.
    ///
    /// # Errors
    /// This function returns an error if the environment variable is not set or
    /// the key is invalid.
    pub fn key_from_env(mut self) -> Result<Self> {
        self.key = Some(ApiKey::from_env()?);
        Ok(self)
    }

    /// Overrides the historical gateway address, e.g. for testing.
    pub fn base_url(mut self, base_url: impl ToString) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    /// Builds the client. Falls back to the `DATABENTO_API_KEY` environment
    /// variable if no key was set.
    ///
    /// # Errors
    /// This function returns an error if no valid key is available.
    pub fn build(self) -> Result<HistoricalClient> {
        let key = match self.key {
            Some(key) => key,
            None => ApiKey::from_env()?,
        };
        Ok(HistoricalClient {
            key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_HISTORICAL_GATEWAY.to_owned()),
            http: reqwest::Client::new(),
        })
    }
}

impl HistoricalClient {
    /// Returns a builder for configuring a `HistoricalClient`.
    pub fn builder() -> HistoricalClientBuilder {
        HistoricalClientBuilder::default()
    }

    /// Creates a new client with the given API key and the default gateway.
    ///
    /// # Errors
    /// This function returns an error if the key is invalid.
    pub fn new(key: impl ToString) -> Result<Self> {
        Self::builder().key(key)?.build()
    }

    /// Returns the timeseries sub-client.
    pub fn timeseries(&self) -> timeseries::TimeseriesClient<'_> {
        timeseries::TimeseriesClient { inner: self }
    }

    /// Returns the symbology sub-client.
    pub fn symbology(&self) -> symbology::SymbologyClient<'_> {
        symbology::SymbologyClient { inner: self }
    }

    /// Builds an authenticated GET request for the given endpoint.
    pub(crate) fn get(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/v{API_VERSION}/{endpoint}", self.base_url))
            // the API key is the username; the password is empty
            .basic_auth(self.key.as_str(), Some(""))
    }
}

/// Verifies the response has a successful status, otherwise consumes it into an
/// [`Error::Http`] with the request ID from the headers when present.
pub(crate) async fn check_http_error(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let request_id = response
        .headers()
        .get("request-id")
        .and_then(|id| id.to_str().ok())
        .map(str::to_owned);
    let message = response.text().await.unwrap_or_default();
    Err(Error::Http {
        status,
        message,
        request_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_key() {
        std::env::remove_var(crate::API_KEY_ENV_VAR);
        assert!(HistoricalClient::builder().build().is_err());
        assert!(HistoricalClient::new("db-unittestapikey1234567890FFFFF").is_ok());
    }
}
