//! Enums used in DBN records and the APIs that carry them.

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A side of the market. The side of the market for resting orders, or the side of
/// the aggressor for trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Side {
    /// A sell order or sell aggressor in a trade.
    Ask = b'A',
    /// A buy order or a buy aggressor in a trade.
    Bid = b'B',
    /// No side specified by the original source.
    #[default]
    None = b'N',
}

impl From<Side> for char {
    fn from(side: Side) -> Self {
        u8::from(side) as char
    }
}

/// An order event or order book operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Action {
    /// An existing order was modified: price and/or size.
    Modify = b'M',
    /// An aggressing order traded. Does not affect the book.
    Trade = b'T',
    /// An existing order was filled. Does not affect the book.
    Fill = b'F',
    /// An order was fully or partially cancelled.
    Cancel = b'C',
    /// A new order was added to the book.
    Add = b'A',
    /// Reset the book; clear all orders for an instrument.
    Clear = b'R',
    /// Has no effect on the book, but may carry flags or other information.
    #[default]
    None = b'N',
}

impl From<Action> for char {
    fn from(action: Action) -> Self {
        u8::from(action) as char
    }
}

/// The class of instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum InstrumentClass {
    /// A bond.
    Bond = b'B',
    /// A call option.
    Call = b'C',
    /// A future.
    Future = b'F',
    /// A stock.
    Stock = b'K',
    /// A spread composed of multiple instrument classes.
    MixedSpread = b'M',
    /// A put option.
    Put = b'P',
    /// A spread composed of futures.
    FutureSpread = b'S',
    /// A spread composed of options.
    OptionSpread = b'T',
    /// A foreign exchange spot.
    FxSpot = b'X',
}

impl From<InstrumentClass> for char {
    fn from(class: InstrumentClass) -> Self {
        u8::from(class) as char
    }
}

/// Whether an instrument definition was added, modified, or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SecurityUpdateAction {
    /// A new instrument definition.
    #[default]
    Add = b'A',
    /// A modified instrument definition.
    Modify = b'M',
    /// A deleted instrument definition.
    Delete = b'D',
}

/// Whether the instrument is user-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum UserDefinedInstrument {
    /// The instrument is not user-defined.
    #[default]
    No = b'N',
    /// The instrument is user-defined.
    Yes = b'Y',
}

/// The type of statistic contained in a [`StatMsg`](crate::record::StatMsg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum StatType {
    /// The price of the first trade of an instrument.
    OpeningPrice = 1,
    /// The probable price of the first trade of an instrument published during pre-open.
    IndicativeOpeningPrice = 2,
    /// The settlement price of an instrument.
    SettlementPrice = 3,
    /// The lowest trade price of an instrument during the trading session.
    TradingSessionLowPrice = 4,
    /// The highest trade price of an instrument during the trading session.
    TradingSessionHighPrice = 5,
    /// The number of contracts cleared for an instrument on the previous trading date.
    ClearedVolume = 6,
    /// The lowest offer price for an instrument during the trading session.
    LowestOffer = 7,
    /// The highest bid price for an instrument during the trading session.
    HighestBid = 8,
    /// The current number of outstanding contracts of an instrument.
    OpenInterest = 9,
    /// The volume-weighted average price for a fixing period.
    FixingPrice = 10,
    /// The last trade price during a trading session.
    ClosePrice = 11,
    /// The change in price from the close price of the previous trading session to the
    /// most recent trading session.
    NetChange = 12,
    /// The volume-weighted average price for the trading session.
    Vwap = 13,
}

/// The type of [`StatMsg`](crate::record::StatMsg) update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum StatUpdateAction {
    /// A new statistic.
    #[default]
    New = 1,
    /// A removal of a statistic.
    Delete = 2,
}

/// A symbology type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SType {
    /// Symbology using a unique numeric ID.
    InstrumentId = 0,
    /// Symbology using the original symbols provided by the publisher.
    RawSymbol = 1,
    /// A Databento-specific symbology where one symbol may point to different
    /// instruments at different points of time, e.g. to always refer to the front
    /// month future.
    Continuous = 3,
    /// A Databento-specific symbology for referring to a group of symbols by one
    /// "parent" symbol, e.g. ES.FUT to refer to all ES futures.
    Parent = 4,
    /// Symbology for US equities using NASDAQ Integrated suffix conventions.
    NasdaqSymbol = 5,
    /// Symbology for US equities using CMS suffix conventions.
    CmsSymbol = 6,
}

impl FromStr for SType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instrument_id" | "product_id" => Ok(SType::InstrumentId),
            "raw_symbol" | "native" => Ok(SType::RawSymbol),
            "continuous" => Ok(SType::Continuous),
            "parent" => Ok(SType::Parent),
            "nasdaq_symbol" | "nasdaq" => Ok(SType::NasdaqSymbol),
            "cms_symbol" | "cms" => Ok(SType::CmsSymbol),
            _ => Err(crate::Error::conversion::<Self>(s)),
        }
    }
}

impl SType {
    /// Converts the symbology type to its `str` representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SType::InstrumentId => "instrument_id",
            SType::RawSymbol => "raw_symbol",
            SType::Continuous => "continuous",
            SType::Parent => "parent",
            SType::NasdaqSymbol => "nasdaq_symbol",
            SType::CmsSymbol => "cms_symbol",
        }
    }
}

impl AsRef<str> for SType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for SType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub use rtype::RType;

/// Record types, possible values for [`RecordHeader::rtype`][crate::RecordHeader::rtype].
pub mod rtype {
    use num_enum::{IntoPrimitive, TryFromPrimitive};

    use super::Schema;

    /// A record type, i.e. a sentinel for the different types implementing
    /// [`HasRType`](crate::record::HasRType). Indicates the layout of a record in
    /// streams containing multiple record types.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
    #[repr(u8)]
    pub enum RType {
        /// Market by price with a book depth of 0 (the trades schema).
        Mbp0 = 0,
        /// Market by price with a book depth of 1 (also the tbbo schema).
        Mbp1 = 0x01,
        /// Market by price with a book depth of 10.
        Mbp10 = 0x0A,
        /// An exchange status record.
        Status = 0x12,
        /// An instrument definition record.
        InstrumentDef = 0x13,
        /// An order imbalance record.
        Imbalance = 0x14,
        /// An error from the gateway.
        Error = 0x15,
        /// A symbol mapping record.
        SymbolMapping = 0x16,
        /// A non-error message from the gateway. Also used for heartbeats.
        System = 0x17,
        /// A statistics record from the publisher (not calculated by Databento).
        Statistics = 0x18,
        /// An open, high, low, close, and volume record at a 1-second cadence.
        Ohlcv1S = 0x20,
        /// An open, high, low, close, and volume record at a 1-minute cadence.
        Ohlcv1M = 0x21,
        /// An open, high, low, close, and volume record at an hourly cadence.
        Ohlcv1H = 0x22,
        /// An open, high, low, close, and volume record at a daily cadence.
        Ohlcv1D = 0x23,
        /// A market-by-order record.
        Mbo = 0xA0,
    }

    /// Market by price with a book depth of 0 (the trades schema).
    pub const MBP_0: u8 = RType::Mbp0 as u8;
    /// Market by price with a book depth of 1 (also the tbbo schema).
    pub const MBP_1: u8 = RType::Mbp1 as u8;
    /// Market by price with a book depth of 10.
    pub const MBP_10: u8 = RType::Mbp10 as u8;
    /// An exchange status record.
    pub const STATUS: u8 = RType::Status as u8;
    /// An instrument definition record.
    pub const INSTRUMENT_DEF: u8 = RType::InstrumentDef as u8;
    /// An order imbalance record.
    pub const IMBALANCE: u8 = RType::Imbalance as u8;
    /// An error from the gateway.
    pub const ERROR: u8 = RType::Error as u8;
    /// A symbol mapping record.
    pub const SYMBOL_MAPPING: u8 = RType::SymbolMapping as u8;
    /// A non-error message from the gateway. Also used for heartbeats.
    pub const SYSTEM: u8 = RType::System as u8;
    /// A statistics record from the publisher.
    pub const STATISTICS: u8 = RType::Statistics as u8;
    /// An open, high, low, close, and volume record at a 1-second cadence.
    pub const OHLCV_1S: u8 = RType::Ohlcv1S as u8;
    /// An open, high, low, close, and volume record at a 1-minute cadence.
    pub const OHLCV_1M: u8 = RType::Ohlcv1M as u8;
    /// An open, high, low, close, and volume record at an hourly cadence.
    pub const OHLCV_1H: u8 = RType::Ohlcv1H as u8;
    /// An open, high, low, close, and volume record at a daily cadence.
    pub const OHLCV_1D: u8 = RType::Ohlcv1D as u8;
    /// A market-by-order record.
    pub const MBO: u8 = RType::Mbo as u8;

    impl From<Schema> for RType {
        fn from(schema: Schema) -> Self {
            match schema {
                Schema::Mbo => RType::Mbo,
                Schema::Mbp1 | Schema::Tbbo => RType::Mbp1,
                Schema::Mbp10 => RType::Mbp10,
                Schema::Trades => RType::Mbp0,
                Schema::Ohlcv1S => RType::Ohlcv1S,
                Schema::Ohlcv1M => RType::Ohlcv1M,
                Schema::Ohlcv1H => RType::Ohlcv1H,
                Schema::Ohlcv1D => RType::Ohlcv1D,
                Schema::Definition => RType::InstrumentDef,
                Schema::Statistics => RType::Statistics,
                Schema::Status => RType::Status,
                Schema::Imbalance => RType::Imbalance,
            }
        }
    }

    impl RType {
        /// Tries to convert the record type to its associated schema. Returns `None`
        /// for record types that aren't the sole type of any schema.
        pub fn try_into_schema(self) -> Option<Schema> {
            match self {
                RType::Mbp0 => Some(Schema::Trades),
                RType::Mbp1 => Some(Schema::Mbp1),
                RType::Mbp10 => Some(Schema::Mbp10),
                RType::Status => Some(Schema::Status),
                RType::InstrumentDef => Some(Schema::Definition),
                RType::Imbalance => Some(Schema::Imbalance),
                RType::Statistics => Some(Schema::Statistics),
                RType::Ohlcv1S => Some(Schema::Ohlcv1S),
                RType::Ohlcv1M => Some(Schema::Ohlcv1M),
                RType::Ohlcv1H => Some(Schema::Ohlcv1H),
                RType::Ohlcv1D => Some(Schema::Ohlcv1D),
                RType::Mbo => Some(Schema::Mbo),
                RType::Error | RType::SymbolMapping | RType::System => None,
            }
        }
    }
}

/// A data record schema. Each value except [`Schema::Tbbo`] corresponds with a
/// particular record layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Schema {
    /// Market by order.
    Mbo = 0,
    /// Market by price with a book depth of 1.
    Mbp1 = 1,
    /// Market by price with a book depth of 10.
    Mbp10 = 2,
    /// All trade events with the best bid and offer at the time of the trade.
    Tbbo = 3,
    /// All trade events.
    Trades = 4,
    /// Open, high, low, close, and volume at a one-second cadence.
    Ohlcv1S = 5,
    /// Open, high, low, close, and volume at a one-minute cadence.
    Ohlcv1M = 6,
    /// Open, high, low, close, and volume at an hourly cadence.
    Ohlcv1H = 7,
    /// Open, high, low, close, and volume at a daily cadence.
    Ohlcv1D = 8,
    /// Instrument definitions.
    Definition = 9,
    /// Additional data disseminated by publishers.
    Statistics = 10,
    /// Exchange status.
    Status = 11,
    /// Auction imbalance events.
    Imbalance = 12,
}

impl FromStr for Schema {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mbo" => Ok(Schema::Mbo),
            "mbp-1" => Ok(Schema::Mbp1),
            "mbp-10" => Ok(Schema::Mbp10),
            "tbbo" => Ok(Schema::Tbbo),
            "trades" => Ok(Schema::Trades),
            "ohlcv-1s" => Ok(Schema::Ohlcv1S),
            "ohlcv-1m" => Ok(Schema::Ohlcv1M),
            "ohlcv-1h" => Ok(Schema::Ohlcv1H),
            "ohlcv-1d" => Ok(Schema::Ohlcv1D),
            "definition" => Ok(Schema::Definition),
            "statistics" => Ok(Schema::Statistics),
            "status" => Ok(Schema::Status),
            "imbalance" => Ok(Schema::Imbalance),
            _ => Err(crate::Error::conversion::<Self>(s)),
        }
    }
}

impl Schema {
    /// Converts the schema to its `str` representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Schema::Mbo => "mbo",
            Schema::Mbp1 => "mbp-1",
            Schema::Mbp10 => "mbp-10",
            Schema::Tbbo => "tbbo",
            Schema::Trades => "trades",
            Schema::Ohlcv1S => "ohlcv-1s",
            Schema::Ohlcv1M => "ohlcv-1m",
            Schema::Ohlcv1H => "ohlcv-1h",
            Schema::Ohlcv1D => "ohlcv-1d",
            Schema::Definition => "definition",
            Schema::Statistics => "statistics",
            Schema::Status => "status",
            Schema::Imbalance => "imbalance",
        }
    }
}

impl AsRef<str> for Schema {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data encoding format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Encoding {
    /// Databento Binary Encoding.
    Dbn = 0,
    /// Comma-separated values.
    Csv = 1,
    /// JavaScript object notation.
    Json = 2,
}

impl FromStr for Encoding {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dbn" => Ok(Encoding::Dbn),
            "csv" => Ok(Encoding::Csv),
            "json" => Ok(Encoding::Json),
            _ => Err(crate::Error::conversion::<Self>(s)),
        }
    }
}

impl Encoding {
    /// Converts the encoding to its `str` representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Encoding::Dbn => "dbn",
            Encoding::Csv => "csv",
            Encoding::Json => "json",
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compression format or none if uncompressed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Compression {
    /// Uncompressed.
    #[default]
    None = 0,
    /// Zstandard compressed.
    ZStd = 1,
}

impl FromStr for Compression {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "zstd" => Ok(Compression::ZStd),
            _ => Err(crate::Error::conversion::<Self>(s)),
        }
    }
}

/// How to handle decoding DBN data from prior versions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VersionUpgradePolicy {
    /// Decode data from previous versions as-is.
    AsIs,
    /// Decode data from previous versions, upgrading each record to the current
    /// version, filling fields added in later versions with their null sentinels.
    #[default]
    Upgrade,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Schema::Mbo)]
    #[case(Schema::Mbp1)]
    #[case(Schema::Mbp10)]
    #[case(Schema::Tbbo)]
    #[case(Schema::Trades)]
    #[case(Schema::Ohlcv1S)]
    #[case(Schema::Ohlcv1M)]
    #[case(Schema::Ohlcv1H)]
    #[case(Schema::Ohlcv1D)]
    #[case(Schema::Definition)]
    #[case(Schema::Statistics)]
    #[case(Schema::Status)]
    #[case(Schema::Imbalance)]
    fn schema_str_round_trip(#[case] schema: Schema) {
        assert_eq!(Schema::from_str(schema.as_str()).unwrap(), schema);
    }

    #[test]
    fn stype_str_round_trip() {
        for stype in [
            SType::InstrumentId,
            SType::RawSymbol,
            SType::Continuous,
            SType::Parent,
        ] {
            assert_eq!(SType::from_str(stype.as_str()).unwrap(), stype);
        }
    }

    #[test]
    fn rtype_schema_round_trip() {
        for schema in [Schema::Mbo, Schema::Trades, Schema::Ohlcv1D, Schema::Mbp10] {
            assert_eq!(RType::from(schema).try_into_schema(), Some(schema));
        }
        // Both mbp-1 and tbbo share a layout; the canonical schema is mbp-1.
        assert_eq!(RType::from(Schema::Tbbo).try_into_schema(), Some(Schema::Mbp1));
    }
}
