//! Maps for resolving instrument IDs to human-readable symbols.

use std::{cmp::Ordering, collections::HashMap, ops::Deref, sync::Arc};

use crate::{
    compat::{self, SymbolMappingMsgV1},
    record::Record,
    Error, Metadata, RType, RecordRef, SType, SymbolMappingMsg,
};

/// A timeseries symbol map. Generally useful for working with historical data and
/// is commonly built from a [`Metadata`] object via [`Self::from_metadata()`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsSymbolMap(HashMap<(time::Date, u32), Arc<String>>);

/// A point-in-time symbol map. Useful for working with live symbology or a
/// historical request over a single day or other situations where the symbol
/// mappings are known not to change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PitSymbolMap(HashMap<u32, String>);

/// Used for retrieving a symbol mapping for a DBN record.
pub trait SymbolIndex {
    /// Returns the associated symbol mapping for `record`. Returns `None` if no
    /// mapping exists.
    fn get_for_rec<R: Record>(&self, record: &R) -> Option<&String>;
}

impl TsSymbolMap {
    /// Creates a new empty timeseries symbol map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of symbol mappings in the map.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Creates a new timeseries symbol map from the metadata.
    ///
    /// # Errors
    /// This function returns an error if neither `stype_in` nor `stype_out` is
    /// [`SType::InstrumentId`]. It will also return an error if it can't parse a
    /// symbol into a `u32` instrument ID.
    pub fn from_metadata(metadata: &Metadata) -> crate::Result<Self> {
        Self::try_from(metadata)
    }

    /// Inserts a new mapping into the symbol map for each day in the interval.
    ///
    /// If the map already had a mapping, the mapping is updated.
    ///
    /// # Errors
    /// This function returns an error if `start_date` comes after `end_date`.
    pub fn insert(
        &mut self,
        instrument_id: u32,
        start_date: time::Date,
        end_date: time::Date,
        symbol: Arc<String>,
    ) -> crate::Result<()> {
        match start_date.cmp(&end_date) {
            Ordering::Less => {
                let mut day = start_date;
                loop {
                    self.0.insert((day, instrument_id), symbol.clone());
                    day = day.next_day().unwrap();
                    if day >= end_date {
                        break;
                    }
                }
                Ok(())
            }
            // An empty interval maps nothing
            Ordering::Equal => Ok(()),
            Ordering::Greater => Err(Error::BadArgument {
                param_name: "start_date".to_owned(),
                desc: "start_date cannot come after end_date".to_owned(),
            }),
        }
    }

    /// Returns the symbol mapping for the given date and instrument ID. Returns
    /// `None` if no mapping exists.
    pub fn get(&self, date: time::Date, instrument_id: u32) -> Option<&String> {
        self.0.get(&(date, instrument_id)).map(Deref::deref)
    }

    /// Returns a reference to the inner map.
    pub fn inner(&self) -> &HashMap<(time::Date, u32), Arc<String>> {
        &self.0
    }
}

impl SymbolIndex for TsSymbolMap {
    fn get_for_rec<R: Record>(&self, record: &R) -> Option<&String> {
        record
            .index_date()
            .and_then(|date| self.get(date, record.header().instrument_id))
    }
}

impl TryFrom<&Metadata> for TsSymbolMap {
    type Error = Error;

    fn try_from(metadata: &Metadata) -> Result<Self, Error> {
        let mut res = Self::new();
        if is_inverse(metadata)? {
            for mapping in metadata.mappings.iter() {
                let iid = mapping
                    .raw_symbol
                    .parse()
                    .map_err(|_| Error::conversion::<u32>(mapping.raw_symbol.clone()))?;
                for interval in mapping.intervals.iter() {
                    // handle the old symbology format
                    if interval.symbol.is_empty() {
                        continue;
                    }
                    let symbol = Arc::new(interval.symbol.clone());
                    res.insert(iid, interval.start_date, interval.end_date, symbol)?;
                }
            }
        } else {
            for mapping in metadata.mappings.iter() {
                let symbol = Arc::new(mapping.raw_symbol.clone());
                for interval in mapping.intervals.iter() {
                    // handle the old symbology format
                    if interval.symbol.is_empty() {
                        continue;
                    }
                    let iid = interval
                        .symbol
                        .parse()
                        .map_err(|_| Error::conversion::<u32>(interval.symbol.clone()))?;
                    res.insert(iid, interval.start_date, interval.end_date, symbol.clone())?;
                }
            }
        }
        Ok(res)
    }
}

impl PitSymbolMap {
    /// Creates a new empty `PitSymbolMap`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no mappings.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of symbol mappings in the map.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Handles updating the mappings (if required) for a generic record.
    ///
    /// # Errors
    /// This function returns an error if `record` contains a symbol mapping with
    /// invalid UTF-8.
    pub fn on_record(&mut self, record: RecordRef) -> crate::Result<()> {
        if matches!(record.header().rtype(), Ok(RType::SymbolMapping)) {
            if record.record_size() >= std::mem::size_of::<SymbolMappingMsg>() {
                // Safety: checked rtype and size
                self.on_symbol_mapping(unsafe { record.get_unchecked::<SymbolMappingMsg>() })
            } else if let Some(mapping) = record.get::<SymbolMappingMsgV1>() {
                self.on_symbol_mapping(mapping)
            } else {
                Err(Error::decode("symbol mapping record of unexpected size"))
            }
        } else {
            Ok(())
        }
    }

    /// Handles updating the mappings for a symbol mapping record of any version.
    ///
    /// # Errors
    /// This function returns an error if `symbol_mapping` contains invalid UTF-8.
    pub fn on_symbol_mapping<S: compat::SymbolMappingRec>(
        &mut self,
        symbol_mapping: &S,
    ) -> crate::Result<()> {
        let stype_out_symbol = symbol_mapping.stype_out_symbol()?;
        self.0.insert(
            symbol_mapping.header().instrument_id,
            stype_out_symbol.to_owned(),
        );
        Ok(())
    }

    /// Returns the mapping for the given instrument ID. Returns `None` if no mapping
    /// exists.
    pub fn get(&self, instrument_id: u32) -> Option<&String> {
        self.0.get(&instrument_id)
    }

    /// Returns a reference to the inner map.
    pub fn inner(&self) -> &HashMap<u32, String> {
        &self.0
    }
}

impl SymbolIndex for PitSymbolMap {
    fn get_for_rec<R: Record>(&self, record: &R) -> Option<&String> {
        self.get(record.header().instrument_id)
    }
}

fn is_inverse(metadata: &Metadata) -> crate::Result<bool> {
    match (metadata.stype_in, metadata.stype_out) {
        (_, SType::InstrumentId) => Ok(false),
        (Some(SType::InstrumentId), _) => Ok(true),
        _ => Err(Error::BadArgument {
            param_name: "metadata".to_owned(),
            desc:
                "can only create symbol maps from metadata where either stype_out or stype_in is instrument ID"
                    .to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use time::macros::{date, datetime};

    use crate::{MappingInterval, MetadataBuilder, Schema, SymbolMapping};

    use super::*;

    fn metadata_w_mappings() -> Metadata {
        MetadataBuilder::new()
            .dataset(crate::datasets::XNAS_ITCH)
            .schema(Some(Schema::Trades))
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .start(datetime!(2023-07-01 00:00 UTC).unix_timestamp_nanos() as u64)
            .end(NonZeroU64::new(
                datetime!(2023-08-01 00:00 UTC).unix_timestamp_nanos() as u64,
            ))
            .mappings(vec![
                SymbolMapping {
                    raw_symbol: "AAPL".to_owned(),
                    intervals: vec![MappingInterval {
                        start_date: date!(2023 - 07 - 01),
                        end_date: date!(2023 - 08 - 01),
                        symbol: "32".to_owned(),
                    }],
                },
                SymbolMapping {
                    raw_symbol: "TSLA".to_owned(),
                    intervals: vec![
                        MappingInterval {
                            start_date: date!(2023 - 07 - 01),
                            end_date: date!(2023 - 07 - 10),
                            symbol: "10221".to_owned(),
                        },
                        MappingInterval {
                            start_date: date!(2023 - 07 - 10),
                            end_date: date!(2023 - 08 - 01),
                            symbol: "10213".to_owned(),
                        },
                    ],
                },
            ])
            .build()
    }

    #[test]
    fn ts_symbol_map_from_metadata() {
        let target = TsSymbolMap::from_metadata(&metadata_w_mappings()).unwrap();
        assert_eq!(target.get(date!(2023 - 07 - 02), 32).unwrap(), "AAPL");
        assert_eq!(target.get(date!(2023 - 07 - 31), 32).unwrap(), "AAPL");
        assert_eq!(target.get(date!(2023 - 07 - 09), 10221).unwrap(), "TSLA");
        assert_eq!(target.get(date!(2023 - 07 - 10), 10213).unwrap(), "TSLA");
        // exclusive end
        assert!(target.get(date!(2023 - 07 - 10), 10221).is_none());
        assert!(target.get(date!(2023 - 08 - 01), 32).is_none());
    }

    #[test]
    fn ts_symbol_map_inverse() {
        let mut metadata = metadata_w_mappings();
        metadata.stype_in = Some(SType::InstrumentId);
        metadata.stype_out = SType::RawSymbol;
        metadata.mappings = vec![SymbolMapping {
            raw_symbol: "32".to_owned(),
            intervals: vec![MappingInterval {
                start_date: date!(2023 - 07 - 01),
                end_date: date!(2023 - 08 - 01),
                symbol: "AAPL".to_owned(),
            }],
        }];
        let target = TsSymbolMap::from_metadata(&metadata).unwrap();
        assert_eq!(target.get(date!(2023 - 07 - 02), 32).unwrap(), "AAPL");
    }

    #[test]
    fn no_instrument_id_stype_is_error() {
        let mut metadata = metadata_w_mappings();
        metadata.stype_in = Some(SType::RawSymbol);
        metadata.stype_out = SType::Continuous;
        assert!(matches!(
            TsSymbolMap::from_metadata(&metadata),
            Err(Error::BadArgument { .. })
        ));
    }

    #[test]
    fn pit_symbol_map_on_record() {
        let mut target = PitSymbolMap::new();
        let mapping = SymbolMappingMsg::new(
            5482,
            0,
            SType::RawSymbol,
            "ESM4",
            SType::RawSymbol,
            "ESM4",
            0,
            0,
        )
        .unwrap();
        target.on_record(RecordRef::from(&mapping)).unwrap();
        assert_eq!(target.get(5482).unwrap(), "ESM4");
        // non-mapping records are ignored
        target
            .on_record(RecordRef::from(&crate::TradeMsg::default()))
            .unwrap();
        assert_eq!(target.len(), 1);
    }
}
