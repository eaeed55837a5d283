//! The historical timeseries API: bulk DBN over HTTP.

use std::path::Path;

use dbn::{SType, Schema};
use tokio::io::AsyncWriteExt;

use crate::{
    historical::{check_http_error, HistoricalClient},
    symbols::SymbolList,
    validation::DateTimeArg,
    DbnStore, Error, Result,
};

/// Parameters for [`TimeseriesClient::get_range()`].
#[derive(Debug, Clone)]
pub struct GetRangeParams {
    /// The dataset code.
    pub dataset: String,
    /// The symbols to request.
    pub symbols: SymbolList,
    /// The data record schema.
    pub schema: Schema,
    /// The start of the request range in UNIX epoch nanoseconds (inclusive).
    pub start: u64,
    /// The end of the request range in UNIX epoch nanoseconds (exclusive).
    pub end: u64,
    /// The input symbology type.
    pub stype_in: SType,
    /// The output symbology type.
    pub stype_out: SType,
    /// The optional maximum number of records to return.
    pub limit: Option<u64>,
}

impl GetRangeParams {
    /// Creates new parameters for the given request range, defaulting to raw
    /// symbol input and instrument ID output symbology.
    pub fn new(
        dataset: impl ToString,
        schema: Schema,
        symbols: impl Into<SymbolList>,
        start: impl Into<DateTimeArg>,
        end: impl Into<DateTimeArg>,
    ) -> Self {
        Self {
            dataset: dataset.to_string(),
            symbols: symbols.into(),
            schema,
            start: start.into().unix_nanos(),
            end: end.into().unix_nanos(),
            stype_in: SType::RawSymbol,
            stype_out: SType::InstrumentId,
            limit: None,
        }
    }

    /// Sets the input symbology type and returns the parameters.
    pub fn stype_in(mut self, stype_in: SType) -> Self {
        self.stype_in = stype_in;
        self
    }

    /// Sets the maximum number of records and returns the parameters.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn query(&self) -> Result<Vec<(&'static str, String)>> {
        let mut query = vec![
            ("dataset", self.dataset.clone()),
            ("symbols", self.symbols.to_api_string(self.stype_in)?),
            ("schema", self.schema.to_string()),
            ("start", self.start.to_string()),
            ("end", self.end.to_string()),
            ("stype_in", self.stype_in.to_string()),
            ("stype_out", self.stype_out.to_string()),
            ("encoding", "dbn".to_owned()),
        ];
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        Ok(query)
    }
}

/// The sub-client for the historical timeseries API.
pub struct TimeseriesClient<'a> {
    pub(crate) inner: &'a HistoricalClient,
}

impl TimeseriesClient<'_> {
    /// Requests a range of data from the dataset, streaming the
    /// Zstandard-compressed DBN response body into memory and returning a
    /// [`DbnStore`] over it.
    ///
    /// # Errors
    /// This function returns an error on an unsuccessful HTTP status, a transport
    /// failure, or an invalid DBN response.
    pub async fn get_range(&self, params: GetRangeParams) -> Result<DbnStore> {
        let mut response = check_http_error(
            self.inner
                .get("timeseries.get_range")
                .query(&params.query()?)
                .send()
                .await?,
        )
        .await?;
        let mut buffer = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        DbnStore::from_bytes(buffer)
    }

    /// Requests a range of data from the dataset, streaming the response body to
    /// the file at `path` and returning a [`DbnStore`] over it.
    ///
    /// # Errors
    /// This function returns an error on an unsuccessful HTTP status, a transport
    /// failure, an I/O failure writing the file, or an invalid DBN response.
    pub async fn get_range_to_file(
        &self,
        params: GetRangeParams,
        path: impl AsRef<Path>,
    ) -> Result<DbnStore> {
        let path = path.as_ref();
        let mut response = check_http_error(
            self.inner
                .get("timeseries.get_range")
                .query(&params.query()?)
                .send()
                .await?,
        )
        .await?;
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| Error::io(e, format!("creating file at '{}'", path.display())))?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, format!("writing DBN to '{}'", path.display())))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::io(e, format!("flushing DBN to '{}'", path.display())))?;
        DbnStore::from_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_construction() {
        let params = GetRangeParams::new(
            "GLBX.MDP3",
            Schema::Mbo,
            vec!["ES.c.0"],
            1_700_000_000_000_000_000u64,
            1_700_086_400_000_000_000u64,
        )
        .stype_in(SType::Continuous)
        .limit(1000);
        let query = params.query().unwrap();
        assert!(query.contains(&("dataset", "GLBX.MDP3".to_owned())));
        assert!(query.contains(&("symbols", "ES.c.0".to_owned())));
        assert!(query.contains(&("schema", "mbo".to_owned())));
        assert!(query.contains(&("start", "1700000000000000000".to_owned())));
        assert!(query.contains(&("stype_in", "continuous".to_owned())));
        assert!(query.contains(&("stype_out", "instrument_id".to_owned())));
        assert!(query.contains(&("limit", "1000".to_owned())));
    }
}
