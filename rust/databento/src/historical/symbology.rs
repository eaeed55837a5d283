//! The historical symbology API.

use dbn::SType;
use time::Date;

use crate::{
    historical::{check_http_error, HistoricalClient},
    symbology::Resolution,
    symbols::SymbolList,
    Result,
};

/// Parameters for [`SymbologyClient::resolve()`].
#[derive(Debug, Clone)]
pub struct ResolveParams {
    /// The dataset code.
    pub dataset: String,
    /// The symbols to resolve.
    pub symbols: SymbolList,
    /// The input symbology type.
    pub stype_in: SType,
    /// The output symbology type.
    pub stype_out: SType,
    /// The start of the resolution date range (inclusive).
    pub start_date: Date,
    /// The end of the resolution date range (exclusive).
    pub end_date: Date,
}

impl ResolveParams {
    /// Creates new parameters for resolving raw symbols to instrument IDs over
    /// the given date range.
    pub fn new(
        dataset: impl ToString,
        symbols: impl Into<SymbolList>,
        start_date: Date,
        end_date: Date,
    ) -> Self {
        Self {
            dataset: dataset.to_string(),
            symbols: symbols.into(),
            stype_in: SType::RawSymbol,
            stype_out: SType::InstrumentId,
            start_date,
            end_date,
        }
    }

    /// Sets the input symbology type and returns the parameters.
    pub fn stype_in(mut self, stype_in: SType) -> Self {
        self.stype_in = stype_in;
        self
    }

    /// Sets the output symbology type and returns the parameters.
    pub fn stype_out(mut self, stype_out: SType) -> Self {
        self.stype_out = stype_out;
        self
    }

    fn query(&self) -> Result<Vec<(&'static str, String)>> {
        let date_err = |e: time::error::Format| {
            crate::Error::bad_argument("date", format!("unformattable date: {e}"))
        };
        Ok(vec![
            ("dataset", self.dataset.clone()),
            ("symbols", self.symbols.to_api_string(self.stype_in)?),
            ("stype_in", self.stype_in.to_string()),
            ("stype_out", self.stype_out.to_string()),
            (
                "start_date",
                self.start_date
                    .format(dbn::metadata::DATE_FORMAT)
                    .map_err(date_err)?,
            ),
            (
                "end_date",
                self.end_date
                    .format(dbn::metadata::DATE_FORMAT)
                    .map_err(date_err)?,
            ),
        ])
    }
}

/// The sub-client for the historical symbology API.
pub struct SymbologyClient<'a> {
    pub(crate) inner: &'a HistoricalClient,
}

impl SymbologyClient<'_> {
    /// Resolves a list of symbols from an input symbology type to an output one
    /// over a date range. The response can be fed to
    /// [`InstrumentMap::insert_json()`](crate::InstrumentMap::insert_json).
    ///
    /// # Errors
    /// This function returns an error on an unsuccessful HTTP status, a transport
    /// failure, or an unparseable response.
    pub async fn resolve(&self, params: ResolveParams) -> Result<Resolution> {
        let response = check_http_error(
            self.inner
                .get("symbology.resolve")
                .query(&params.query()?)
                .send()
                .await?,
        )
        .await?;
        Ok(response.json::<Resolution>().await?)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn query_construction() {
        let params = ResolveParams::new(
            "XNAS.ITCH",
            vec!["AAPL", "MSFT"],
            date!(2024 - 01 - 02),
            date!(2024 - 01 - 10),
        );
        let query = params.query().unwrap();
        assert!(query.contains(&("dataset", "XNAS.ITCH".to_owned())));
        assert!(query.contains(&("symbols", "AAPL,MSFT".to_owned())));
        assert!(query.contains(&("stype_in", "raw_symbol".to_owned())));
        assert!(query.contains(&("stype_out", "instrument_id".to_owned())));
        assert!(query.contains(&("start_date", "2024-01-02".to_owned())));
        assert!(query.contains(&("end_date", "2024-01-10".to_owned())));
    }
}
