//! A time-interval map from instrument ID to raw symbol, built from metadata
//! mappings, in-stream symbol mapping records, or symbology resolution responses.

use std::collections::HashMap;

use dbn::{Metadata, Record, SType, SymbolMappingMsg};
use serde::Deserialize;
use time::{macros::date, Date};

use crate::{Error, Result};

/// An instrument ID to raw symbol mapping over a date interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingInterval {
    /// The start of the mapping period (inclusive).
    pub start_date: Date,
    /// The end of the mapping period (exclusive).
    pub end_date: Date,
    /// The raw symbol for the period.
    pub raw_symbol: String,
}

/// A map of instrument ID and date to raw symbol.
#[derive(Debug, Clone, Default)]
pub struct InstrumentMap {
    mappings: HashMap<u32, Vec<MappingInterval>>,
}

/// A symbology resolution response from the historical API.
#[derive(Debug, Clone, Deserialize)]
pub struct Resolution {
    /// A mapping from input symbol to a list of resolved symbols in the output
    /// symbology.
    pub result: HashMap<String, Vec<dbn::MappingInterval>>,
    /// Symbols that did not resolve for at least one day in the date range.
    #[serde(default)]
    pub partial: Vec<String>,
    /// Symbols that did not resolve for any day in the date range.
    #[serde(default)]
    pub not_found: Vec<String>,
    /// The input symbology type.
    pub stype_in: String,
    /// The output symbology type.
    pub stype_out: String,
}

// Dates for mapping records with undefined interval bounds.
const MIN_MAPPING_DATE: Date = date!(1970 - 01 - 01);
const MAX_MAPPING_DATE: Date = date!(2263 - 01 - 01);

impl InstrumentMap {
    /// Creates a new empty `InstrumentMap`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the map contains no intervals.
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Resolves an instrument ID to a raw symbol for `date`: the first inserted
    /// interval for `instrument_id` with `start_date <= date < end_date`.
    pub fn resolve(&self, instrument_id: u32, date: Date) -> Option<&str> {
        self.mappings.get(&instrument_id).and_then(|intervals| {
            intervals
                .iter()
                .find(|interval| date >= interval.start_date && date < interval.end_date)
                .map(|interval| interval.raw_symbol.as_str())
        })
    }

    /// Resolves the raw symbol for a record by its instrument ID and the date of
    /// its primary timestamp.
    pub fn resolve_for_record<R: Record>(&self, record: &R) -> Option<&str> {
        record
            .index_date()
            .and_then(|date| self.resolve(record.header().instrument_id, date))
    }

    /// Inserts the symbol mappings from decoded DBN metadata.
    ///
    /// # Errors
    /// This function returns an error if neither `stype_in` nor `stype_out` is
    /// `instrument_id`.
    pub fn insert_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        let inverse = match (metadata.stype_in, metadata.stype_out) {
            (_, SType::InstrumentId) => false,
            (Some(SType::InstrumentId), _) => true,
            _ => {
                return Err(Error::bad_argument(
                    "metadata",
                    "either stype_in or stype_out must be instrument_id to build an instrument map",
                ))
            }
        };
        for mapping in &metadata.mappings {
            for interval in &mapping.intervals {
                if inverse {
                    // instrument IDs on the input side mapping to raw symbols
                    let Ok(instrument_id) = mapping.raw_symbol.parse::<u32>() else {
                        continue;
                    };
                    self.insert(
                        instrument_id,
                        interval.start_date,
                        interval.end_date,
                        &interval.symbol,
                    );
                } else {
                    let Ok(instrument_id) = interval.symbol.parse::<u32>() else {
                        continue;
                    };
                    self.insert(
                        instrument_id,
                        interval.start_date,
                        interval.end_date,
                        &mapping.raw_symbol,
                    );
                }
            }
        }
        Ok(())
    }

    /// Inserts one mapping interval from a streamed symbol mapping record.
    ///
    /// # Errors
    /// This function returns an error if the record's output symbol contains
    /// invalid UTF-8.
    pub fn insert_symbol_mapping(&mut self, mapping: &SymbolMappingMsg) -> Result<()> {
        let raw_symbol = mapping.stype_out_symbol()?;
        let start_date = mapping
            .start_ts()
            .map(|dt| dt.date())
            .unwrap_or(MIN_MAPPING_DATE);
        let end_date = mapping
            .end_ts()
            .map(|dt| dt.date())
            .unwrap_or(MAX_MAPPING_DATE);
        self.insert(
            mapping.header().instrument_id,
            start_date,
            end_date,
            raw_symbol,
        );
        Ok(())
    }

    /// Inserts the symbol mappings from a symbology resolution response.
    ///
    /// # Errors
    /// This function returns an error if not exactly one of `stype_in` and
    /// `stype_out` is `instrument_id`, or if an instrument ID fails to parse.
    pub fn insert_json(&mut self, resolution: &Resolution) -> Result<()> {
        let stype_in: SType = resolution
            .stype_in
            .parse()
            .map_err(|_| Error::bad_argument("stype_in", "unknown symbology type"))?;
        let stype_out: SType = resolution
            .stype_out
            .parse()
            .map_err(|_| Error::bad_argument("stype_out", "unknown symbology type"))?;
        let inverse = match (stype_in, stype_out) {
            (SType::InstrumentId, SType::InstrumentId) | (_, SType::InstrumentId) => false,
            (SType::InstrumentId, _) => true,
            _ => {
                return Err(Error::bad_argument(
                    "resolution",
                    "either stype_in or stype_out must be instrument_id",
                ))
            }
        };
        for (symbol_in, intervals) in &resolution.result {
            for interval in intervals {
                if interval.symbol.is_empty() {
                    continue;
                }
                let (instrument_id, raw_symbol) = if inverse {
                    let instrument_id = symbol_in.parse::<u32>().map_err(|_| {
                        Error::bad_argument(
                            "resolution",
                            format!("`{symbol_in}` is not a valid instrument ID"),
                        )
                    })?;
                    (instrument_id, interval.symbol.as_str())
                } else {
                    let instrument_id = interval.symbol.parse::<u32>().map_err(|_| {
                        Error::bad_argument(
                            "resolution",
                            format!("`{}` is not a valid instrument ID", interval.symbol),
                        )
                    })?;
                    (instrument_id, symbol_in.as_str())
                };
                self.insert(
                    instrument_id,
                    interval.start_date,
                    interval.end_date,
                    raw_symbol,
                );
            }
        }
        Ok(())
    }

    /// Appends an interval for `instrument_id`. Intervals with an empty symbol and
    /// exact duplicates are discarded.
    pub fn insert(
        &mut self,
        instrument_id: u32,
        start_date: Date,
        end_date: Date,
        raw_symbol: &str,
    ) {
        if raw_symbol.is_empty() {
            return;
        }
        let intervals = self.mappings.entry(instrument_id).or_default();
        let exists = intervals.iter().any(|interval| {
            interval.start_date == start_date
                && interval.end_date == end_date
                && interval.raw_symbol == raw_symbol
        });
        if !exists {
            intervals.push(MappingInterval {
                start_date,
                end_date,
                raw_symbol: raw_symbol.to_owned(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use dbn::{MetadataBuilder, Schema, SymbolMapping};

    use super::*;

    #[test]
    fn resolve_json_literal() {
        let resolution: Resolution = serde_json::from_str(
            r#"{
                "result": {
                    "AAPL": [{"d0": "2024-01-02", "d1": "2024-01-10", "s": "14593"}]
                },
                "stype_in": "raw_symbol",
                "stype_out": "instrument_id"
            }"#,
        )
        .unwrap();
        let mut target = InstrumentMap::new();
        target.insert_json(&resolution).unwrap();
        assert_eq!(
            target.resolve(14593, date!(2024 - 01 - 05)),
            Some("AAPL")
        );
        assert_eq!(target.resolve(14593, date!(2024 - 01 - 02)), Some("AAPL"));
        // the end date is exclusive
        assert_eq!(target.resolve(14593, date!(2024 - 01 - 10)), None);
        assert_eq!(target.resolve(14593, date!(2024 - 01 - 01)), None);
        assert_eq!(target.resolve(1, date!(2024 - 01 - 05)), None);
    }

    #[test]
    fn insert_json_inverse() {
        let resolution: Resolution = serde_json::from_str(
            r#"{
                "result": {
                    "14593": [{"d0": "2024-01-02", "d1": "2024-01-10", "s": "AAPL"}]
                },
                "stype_in": "instrument_id",
                "stype_out": "raw_symbol"
            }"#,
        )
        .unwrap();
        let mut target = InstrumentMap::new();
        target.insert_json(&resolution).unwrap();
        assert_eq!(target.resolve(14593, date!(2024 - 01 - 05)), Some("AAPL"));
    }

    #[test]
    fn insert_json_requires_instrument_id_side() {
        let resolution: Resolution = serde_json::from_str(
            r#"{
                "result": {},
                "stype_in": "raw_symbol",
                "stype_out": "continuous"
            }"#,
        )
        .unwrap();
        let mut target = InstrumentMap::new();
        assert!(matches!(
            target.insert_json(&resolution),
            Err(Error::BadArgument { .. })
        ));
    }

    #[test]
    fn insert_metadata_and_duplicates() {
        let metadata = MetadataBuilder::new()
            .dataset(dbn::datasets::XNAS_ITCH)
            .schema(Some(Schema::Trades))
            .start(0)
            .stype_in(Some(dbn::SType::RawSymbol))
            .stype_out(dbn::SType::InstrumentId)
            .mappings(vec![SymbolMapping {
                raw_symbol: "TSLA".to_owned(),
                intervals: vec![dbn::MappingInterval {
                    start_date: date!(2024 - 01 - 01),
                    end_date: date!(2024 - 02 - 01),
                    symbol: "10221".to_owned(),
                }],
            }])
            .build();
        let mut target = InstrumentMap::new();
        target.insert_metadata(&metadata).unwrap();
        // a duplicate insert is discarded
        target.insert_metadata(&metadata).unwrap();
        assert_eq!(target.mappings[&10221].len(), 1);
        assert_eq!(target.resolve(10221, date!(2024 - 01 - 15)), Some("TSLA"));
    }

    #[test]
    fn insert_symbol_mapping_record() {
        let mapping = SymbolMappingMsg::new(
            5482,
            0,
            dbn::SType::RawSymbol,
            "ESM4",
            dbn::SType::RawSymbol,
            "ESM4",
            time::macros::datetime!(2024-03-01 00:00 UTC).unix_timestamp_nanos() as u64,
            time::macros::datetime!(2024-06-21 00:00 UTC).unix_timestamp_nanos() as u64,
        )
        .unwrap();
        let mut target = InstrumentMap::new();
        target.insert_symbol_mapping(&mapping).unwrap();
        assert_eq!(target.resolve(5482, date!(2024 - 04 - 01)), Some("ESM4"));
        assert_eq!(target.resolve(5482, date!(2024 - 06 - 21)), None);
    }

    #[test]
    fn ties_broken_by_insertion_order() {
        let mut target = InstrumentMap::new();
        target.insert(1, date!(2024 - 01 - 01), date!(2024 - 02 - 01), "FIRST");
        target.insert(1, date!(2024 - 01 - 15), date!(2024 - 02 - 01), "SECOND");
        assert_eq!(target.resolve(1, date!(2024 - 01 - 20)), Some("FIRST"));
        // empty symbols are discarded on insert
        target.insert(2, date!(2024 - 01 - 01), date!(2024 - 02 - 01), "");
        assert_eq!(target.resolve(2, date!(2024 - 01 - 02)), None);
    }
}
