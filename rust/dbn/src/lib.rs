//! A crate for working with Databento Binary Encoding (DBN): fixed-layout
//! market-data records behind a metadata header, with streaming decoders and
//! encoders for DBN itself as well as CSV and JSON.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(clippy::missing_errors_doc)]

pub mod compat;
pub mod decode;
pub mod encode;
pub mod enums;
pub mod error;
pub mod metadata;
pub mod pretty;
pub mod record;
pub mod record_enum;
pub mod record_ref;
pub mod symbol_map;

pub use crate::{
    enums::{
        rtype, Action, Compression, Encoding, InstrumentClass, RType, SType, Schema,
        SecurityUpdateAction, Side, StatType, StatUpdateAction, UserDefinedInstrument,
        VersionUpgradePolicy,
    },
    error::{Error, Result},
    metadata::{MappingInterval, Metadata, MetadataBuilder, SymbolMapping},
    record::{
        c_chars_to_str, str_to_c_chars, ts_to_dt, BidAskPair, ErrorMsg, HasRType, ImbalanceMsg,
        InstrumentDefMsg, MboMsg, Mbp10Msg, Mbp1Msg, OhlcvMsg, Record, RecordHeader, RecordMut,
        StatMsg, StatusMsg, SymbolMappingMsg, SystemMsg, TbboMsg, TradeMsg,
    },
    record_enum::{RecordEnum, RecordRefEnum},
    record_ref::RecordRef,
    symbol_map::{PitSymbolMap, SymbolIndex, TsSymbolMap},
};

/// The current version of the DBN encoding, which is different from the crate version.
pub const DBN_VERSION: u8 = 2;

/// The length of fixed-length symbol strings in the current DBN version, including
/// the null terminator.
pub const SYMBOL_CSTR_LEN: usize = 71;

pub(crate) const METADATA_DATASET_CSTR_LEN: usize = 16;
pub(crate) const METADATA_RESERVED_LEN: usize = 53;
/// Excludes the magic string, version, and length prelude.
pub(crate) const METADATA_FIXED_LEN: usize = 100;
pub(crate) const NULL_LIMIT: u64 = 0;
pub(crate) const NULL_SCHEMA: u16 = u16::MAX;
pub(crate) const NULL_STYPE: u8 = u8::MAX;

/// The largest record size, plus space for the optional send timestamp trailer.
pub const MAX_RECORD_LEN: usize = std::mem::size_of::<InstrumentDefMsg>() + 8;

/// The denominator of fixed prices in DBN.
pub const FIXED_PRICE_SCALE: i64 = 1_000_000_000;
/// The sentinel value for an unset or null price.
pub const UNDEF_PRICE: i64 = i64::MIN;
/// The sentinel value for an unset or null order quantity.
pub const UNDEF_ORDER_SIZE: u32 = u32::MAX;
/// The sentinel value for an unset or null statistic quantity.
pub const UNDEF_STAT_QUANTITY: i32 = i32::MAX;
/// The sentinel value for an unset or null timestamp.
pub const UNDEF_TIMESTAMP: u64 = u64::MAX;

/// Contains dataset code constants.
pub mod datasets {
    /// The dataset code for CME Globex MDP 3.0.
    pub const GLBX_MDP3: &str = "GLBX.MDP3";
    /// The dataset code for Nasdaq TotalView ITCH.
    pub const XNAS_ITCH: &str = "XNAS.ITCH";
    /// The dataset code for OPRA pillar.
    pub const OPRA_PILLAR: &str = "OPRA.PILLAR";
}
