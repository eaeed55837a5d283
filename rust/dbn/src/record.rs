//! Market data record types for the different DBN [`Schema`](crate::enums::Schema)s
//! and conversion functions.

use std::{ffi::CStr, mem, os::raw::c_char, ptr::NonNull, slice};

use crate::{
    enums::{
        rtype, Action, InstrumentClass, RType, SType, SecurityUpdateAction, Side, StatType,
        StatUpdateAction, UserDefinedInstrument,
    },
    Error, Result, SYMBOL_CSTR_LEN, UNDEF_ORDER_SIZE, UNDEF_PRICE, UNDEF_STAT_QUANTITY,
    UNDEF_TIMESTAMP,
};

/// Common data for all DBN records. Always found at the beginning of a record struct.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// The length of the record in 32-bit words.
    pub(crate) length: u8,
    /// The record type. The set of possible values is defined in [`rtype`].
    pub rtype: u8,
    /// The publisher ID assigned by Databento, which denotes the dataset and venue.
    pub publisher_id: u16,
    /// The numeric instrument ID.
    pub instrument_id: u32,
    /// The matching-engine-received timestamp expressed as the number of nanoseconds
    /// since the UNIX epoch.
    pub ts_event: u64,
}

/// Used for polymorphism around types all beginning with a [`RecordHeader`] where
/// `rtype` is the discriminant used to indicate the type of record.
pub trait Record: AsRef<[u8]> {
    /// Returns a reference to the `RecordHeader` that comes at the beginning of all
    /// record types.
    fn header(&self) -> &RecordHeader;

    /// Returns the size of the record in bytes.
    fn record_size(&self) -> usize {
        self.header().record_size()
    }

    /// Tries to convert the raw record type into an enum which is useful for
    /// exhaustive pattern matching.
    ///
    /// # Errors
    /// This function returns an error if the `rtype` field does not contain a valid,
    /// known [`RType`].
    fn rtype(&self) -> Result<RType> {
        self.header().rtype()
    }

    /// Returns the raw primary timestamp for the record.
    ///
    /// This timestamp should be used for sorting records as well as indexing into any
    /// symbology data structure.
    fn raw_index_ts(&self) -> u64 {
        self.header().ts_event
    }

    /// Returns the primary timestamp for the record. Returns `None` if the primary
    /// timestamp contains the sentinel for a null timestamp.
    fn index_ts(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.raw_index_ts())
    }

    /// Returns the date component of the primary timestamp. Returns `None` if the
    /// primary timestamp contains the sentinel for a null timestamp.
    fn index_date(&self) -> Option<time::Date> {
        self.index_ts().map(|dt| dt.date())
    }
}

/// Used for polymorphism around mutable types beginning with a [`RecordHeader`].
pub trait RecordMut {
    /// Returns a mutable reference to the `RecordHeader` at the beginning of the
    /// record.
    fn header_mut(&mut self) -> &mut RecordHeader;
}

/// An extension of the [`Record`] trait for types with a static [`RType`]. Used for
/// determining whether an `rtype` matches a type.
pub trait HasRType: Record + RecordMut {
    /// Returns `true` if `rtype` matches the value(s) associated with the
    /// implementing type.
    fn has_rtype(rtype: u8) -> bool;
}

/// A market-by-order (MBO) tick message. The record of the
/// [`Mbo`](crate::enums::Schema::Mbo) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MboMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The order ID assigned at the venue.
    pub order_id: u64,
    /// The order price as a signed integer where every 1 unit corresponds to 1e-9,
    /// i.e. 1/1,000,000,000 or 0.000000001.
    pub price: i64,
    /// The order quantity.
    pub size: u32,
    /// A combination of packet end with matching engine status.
    pub flags: u8,
    /// A channel ID within the venue.
    pub channel_id: u8,
    /// The event action. Can be **A**dd, **C**ancel, **M**odify, clea**R**, **T**rade,
    /// or **F**ill.
    pub action: c_char,
    /// The order side. Can be **A**sk, **B**id, or **N**one.
    pub side: c_char,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The delta of `ts_recv - ts_exchange_send`, max 2 seconds.
    pub ts_in_delta: i32,
    /// The message sequence number assigned at the venue.
    pub sequence: u32,
}

/// A price level.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BidAskPair {
    /// The bid price.
    pub bid_px: i64,
    /// The ask price.
    pub ask_px: i64,
    /// The bid size.
    pub bid_sz: u32,
    /// The ask size.
    pub ask_sz: u32,
    /// The bid order count.
    pub bid_ct: u32,
    /// The ask order count.
    pub ask_ct: u32,
}

/// Market by price with a book depth of 0. The record of the
/// [`Trades`](crate::enums::Schema::Trades) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The trade price as a signed integer where every 1 unit corresponds to 1e-9.
    pub price: i64,
    /// The trade quantity.
    pub size: u32,
    /// The event action. Always **T**rade in the trades schema.
    pub action: c_char,
    /// The aggressing order's side in the trade. Can be **A**sk, **B**id, or **N**one.
    pub side: c_char,
    /// A combination of packet end with matching engine status.
    pub flags: u8,
    /// The depth of actual book change.
    pub depth: u8,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The delta of `ts_recv - ts_exchange_send`, max 2 seconds.
    pub ts_in_delta: i32,
    /// The message sequence number assigned at the venue.
    pub sequence: u32,
}

/// Market by price with a book depth of 1. The record of the
/// [`Mbp1`](crate::enums::Schema::Mbp1) and [`Tbbo`](crate::enums::Schema::Tbbo)
/// schemas.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mbp1Msg {
    /// The common header.
    pub hd: RecordHeader,
    /// The order price as a signed integer where every 1 unit corresponds to 1e-9.
    pub price: i64,
    /// The order quantity.
    pub size: u32,
    /// The event action. Can be **A**dd, **C**ancel, **M**odify, clea**R**, or
    /// **T**rade.
    pub action: c_char,
    /// The order side. Can be **A**sk, **B**id, or **N**one.
    pub side: c_char,
    /// A combination of packet end with matching engine status.
    pub flags: u8,
    /// The depth of actual book change.
    pub depth: u8,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The delta of `ts_recv - ts_exchange_send`, max 2 seconds.
    pub ts_in_delta: i32,
    /// The message sequence number assigned at the venue.
    pub sequence: u32,
    /// The top of the order book.
    pub levels: [BidAskPair; 1],
}

/// Market by price with a book depth of 10. The record of the
/// [`Mbp10`](crate::enums::Schema::Mbp10) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mbp10Msg {
    /// The common header.
    pub hd: RecordHeader,
    /// The order price as a signed integer where every 1 unit corresponds to 1e-9.
    pub price: i64,
    /// The order quantity.
    pub size: u32,
    /// The event action. Can be **A**dd, **C**ancel, **M**odify, clea**R**, or
    /// **T**rade.
    pub action: c_char,
    /// The order side. Can be **A**sk, **B**id, or **N**one.
    pub side: c_char,
    /// A combination of packet end with matching engine status.
    pub flags: u8,
    /// The depth of actual book change.
    pub depth: u8,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The delta of `ts_recv - ts_exchange_send`, max 2 seconds.
    pub ts_in_delta: i32,
    /// The message sequence number assigned at the venue.
    pub sequence: u32,
    /// The top 10 levels of the order book.
    pub levels: [BidAskPair; 10],
}

/// The record of the [`Tbbo`](crate::enums::Schema::Tbbo) schema.
pub type TbboMsg = Mbp1Msg;

/// Open, high, low, close, and volume. The record of the OHLCV family of schemas.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OhlcvMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The open price for the bar.
    pub open: i64,
    /// The high price for the bar.
    pub high: i64,
    /// The low price for the bar.
    pub low: i64,
    /// The close price for the bar.
    pub close: i64,
    /// The total volume traded during the aggregation period.
    pub volume: u64,
}

/// A trading status update message. The record of the
/// [`Status`](crate::enums::Schema::Status) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The type of status change.
    pub action: u16,
    /// Additional details about the cause of the status change.
    pub reason: u16,
    /// Further details about the status change.
    pub trading_event: u16,
    /// Whether trading in the instrument is currently permitted: **Y**es, **N**o, or
    /// **~** for undefined.
    pub is_trading: c_char,
    /// Whether quoting in the instrument is currently permitted: **Y**es, **N**o, or
    /// **~** for undefined.
    pub is_quoting: c_char,
    /// Whether short selling in the instrument is currently restricted: **Y**es,
    /// **N**o, or **~** for undefined.
    pub is_short_sell_restricted: c_char,
    // Filler for alignment.
    pub _reserved: [u8; 7],
}

/// A definition of an instrument. The record of the
/// [`Definition`](crate::enums::Schema::Definition) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrumentDefMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The minimum constant tick for the instrument in units of 1e-9.
    pub min_price_increment: i64,
    /// The multiplier to convert the venue's display price to the conventional price.
    pub display_factor: i64,
    /// The last eligible trade time in UNIX epoch nanoseconds. Will be
    /// [`UNDEF_TIMESTAMP`](crate::UNDEF_TIMESTAMP) when null, such as for equities.
    pub expiration: u64,
    /// The time of instrument activation in UNIX epoch nanoseconds. Will be
    /// [`UNDEF_TIMESTAMP`](crate::UNDEF_TIMESTAMP) when null, such as for equities.
    pub activation: u64,
    /// The allowable high limit price for the trading day in units of 1e-9.
    pub high_limit_price: i64,
    /// The allowable low limit price for the trading day in units of 1e-9.
    pub low_limit_price: i64,
    /// The differential value for price banding in units of 1e-9.
    pub max_price_variation: i64,
    /// The trading session settlement price on `trading_reference_date`.
    pub trading_reference_price: i64,
    /// The contract size for each instrument, in combination with `unit_of_measure`.
    pub unit_of_measure_qty: i64,
    /// The value currently under development by the venue, in units of 1e-9.
    pub min_price_increment_amount: i64,
    /// The value used for price calculation in spread and leg pricing in units of
    /// 1e-9.
    pub price_ratio: i64,
    /// The strike price of the option in units of 1e-9.
    pub strike_price: i64,
    /// A bitmap of instrument eligibility attributes.
    pub inst_attrib_value: i32,
    /// The `instrument_id` of the first underlying instrument.
    pub underlying_id: u32,
    /// The instrument ID assigned by the publisher. May be the same as
    /// `instrument_id`.
    pub raw_instrument_id: u32,
    /// The implied book depth on the price level data feed.
    pub market_depth_implied: i32,
    /// The (outright) book depth on the price level data feed.
    pub market_depth: i32,
    /// The market segment of the instrument.
    pub market_segment_id: u32,
    /// The maximum trading volume for the instrument.
    pub max_trade_vol: u32,
    /// The minimum order entry quantity for the instrument.
    pub min_lot_size: i32,
    /// The minimum quantity required for a block trade of the instrument.
    pub min_lot_size_block: i32,
    /// The minimum quantity required for a round lot of the instrument.
    pub min_lot_size_round_lot: i32,
    /// The minimum trading volume for the instrument.
    pub min_trade_vol: u32,
    /// The number of deliverables per instrument.
    pub contract_multiplier: i32,
    /// The quantity that a contract will decay daily, after `decay_start_date` has
    /// been reached.
    pub decay_quantity: i32,
    /// The fixed contract value assigned to each instrument.
    pub original_contract_size: i32,
    /// The trading session date corresponding to the settlement price in
    /// `trading_reference_price`, in number of days since the UNIX epoch.
    pub trading_reference_date: u16,
    /// The channel ID assigned at the venue.
    pub appl_id: i16,
    /// The calendar year reflected in the instrument symbol.
    pub maturity_year: u16,
    /// The date at which a contract will begin to decay.
    pub decay_start_date: u16,
    /// The channel ID assigned by Databento as an incrementing integer starting at
    /// zero.
    pub channel_id: u16,
    /// The currency used for price fields.
    pub currency: [c_char; 4],
    /// The currency used for settlement, if different from `currency`.
    pub settl_currency: [c_char; 4],
    /// The strategy type of the spread.
    pub secsubtype: [c_char; 6],
    /// The instrument raw symbol assigned by the publisher.
    pub raw_symbol: [c_char; SYMBOL_CSTR_LEN],
    /// The security group code of the instrument.
    pub group: [c_char; 21],
    /// The exchange used to identify the instrument.
    pub exchange: [c_char; 5],
    /// The underlying asset code (product code) of the instrument.
    pub asset: [c_char; 7],
    /// The ISO standard instrument categorization code.
    pub cfi: [c_char; 7],
    /// The type of the instrument, e.g. FUT for future or future spread.
    pub security_type: [c_char; 7],
    /// The unit of measure for the instrument's original contract size, e.g. USD or
    /// LBS.
    pub unit_of_measure: [c_char; 31],
    /// The symbol of the first underlying instrument.
    pub underlying: [c_char; 21],
    /// The currency of [`strike_price`](Self::strike_price).
    pub strike_price_currency: [c_char; 4],
    /// The classification of the instrument.
    pub instrument_class: c_char,
    /// The matching algorithm used for the instrument, typically **F**IFO.
    pub match_algorithm: c_char,
    /// The current trading state of the instrument.
    pub md_security_trading_status: u8,
    /// The price denominator of the main fraction.
    pub main_fraction: u8,
    /// The number of digits to the right of the tick mark, to display fractional
    /// prices.
    pub price_display_format: u8,
    /// The type indicators for the settlement price, as a bitmap.
    pub settl_price_type: u8,
    /// The price denominator of the sub fraction.
    pub sub_fraction: u8,
    /// The product complex of the instrument.
    pub underlying_product: u8,
    /// Indicates if the instrument definition has been added, modified, or deleted.
    pub security_update_action: c_char,
    /// The calendar month reflected in the instrument symbol.
    pub maturity_month: u8,
    /// The calendar day reflected in the instrument symbol, or 0.
    pub maturity_day: u8,
    /// The calendar week reflected in the instrument symbol, or 0.
    pub maturity_week: u8,
    /// Indicates if the instrument is user defined: **Y**es or **N**o.
    pub user_defined_instrument: c_char,
    /// The type of `contract_multiplier`: `1` for hours, `2` for days.
    pub contract_multiplier_unit: i8,
    /// The schedule for delivering electricity.
    pub flow_schedule_type: i8,
    /// The tick rule of the spread.
    pub tick_rule: u8,
    // Filler for alignment.
    pub _reserved: [u8; 10],
}

/// An auction imbalance message. The record of the
/// [`Imbalance`](crate::enums::Schema::Imbalance) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImbalanceMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The price at which the imbalance shares are calculated, in units of 1e-9.
    pub ref_price: i64,
    /// Reserved for future use.
    pub auction_time: u64,
    /// The hypothetical auction-clearing price for both cross and continuous orders.
    pub cont_book_clr_price: i64,
    /// The hypothetical auction-clearing price for cross orders only.
    pub auct_interest_clr_price: i64,
    /// Reserved for future use.
    pub ssr_filling_price: i64,
    /// Reserved for future use.
    pub ind_match_price: i64,
    /// Reserved for future use.
    pub upper_collar: i64,
    /// Reserved for future use.
    pub lower_collar: i64,
    /// The quantity of shares that are eligible to be matched at `ref_price`.
    pub paired_qty: u32,
    /// The quantity of shares that are not paired at `ref_price`.
    pub total_imbalance_qty: u32,
    /// Reserved for future use.
    pub market_imbalance_qty: u32,
    /// Reserved for future use.
    pub unpaired_qty: u32,
    /// Venue-specific character code indicating the auction type.
    pub auction_type: c_char,
    /// The market side of the `total_imbalance_qty`. Can be **A**sk, **B**id, or
    /// **N**one.
    pub side: c_char,
    /// Venue-specific character code. For Nasdaq, contains the raw Auction
    /// Collar Extension.
    pub auction_status: u8,
    /// Venue-specific character code. For Nasdaq, contains the raw Price
    /// Variation Indicator.
    pub freeze_status: u8,
    /// Reserved for future use.
    pub num_extensions: u8,
    /// Reserved for future use.
    pub unpaired_side: c_char,
    /// Venue-specific character code. For Nasdaq, contains the raw Significant
    /// Imbalance Indicator.
    pub significant_imbalance: c_char,
    // Filler for alignment.
    pub _reserved: [u8; 1],
}

/// A statistics message. A catchall for various data disseminated by publishers. The
/// record of the [`Statistics`](crate::enums::Schema::Statistics) schema.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// Reference timestamp for the indicator in UNIX epoch nanoseconds. Will be
    /// [`UNDEF_TIMESTAMP`](crate::UNDEF_TIMESTAMP) when unused.
    pub ts_ref: u64,
    /// The value for price statistics in units of 1e-9. Will be
    /// [`UNDEF_PRICE`](crate::UNDEF_PRICE) when unused.
    pub price: i64,
    /// The value for non-price statistics. Will be
    /// [`UNDEF_STAT_QUANTITY`](crate::UNDEF_STAT_QUANTITY) when unused.
    pub quantity: i32,
    /// The message sequence number assigned at the venue.
    pub sequence: u32,
    /// The delta of `ts_recv - ts_exchange_send`, max 2 seconds.
    pub ts_in_delta: i32,
    /// The type of statistic value contained in the message. See [`StatType`].
    pub stat_type: u16,
    /// The channel ID assigned by Databento as an incrementing integer starting at
    /// zero.
    pub channel_id: u16,
    /// Indicates if the statistic is newly added (1) or deleted (2).
    pub update_action: u8,
    /// Additional flags associated with certain stat types.
    pub stat_flags: u8,
    // Filler for alignment.
    pub _reserved: [u8; 6],
}

/// The length of error and system message strings.
pub(crate) const MSG_CSTR_LEN: usize = 302;

/// An error message from the live gateway.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The error message.
    pub err: [c_char; MSG_CSTR_LEN],
    /// The error code.
    pub code: u8,
    /// Whether this is the last in a series of error records.
    pub is_last: u8,
}

/// A symbol mapping message from the live gateway which maps a symbol from one
/// [`SType`](crate::enums::SType) to another.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolMappingMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The input symbology type of `stype_in_symbol`.
    pub stype_in: u8,
    /// The input symbol.
    pub stype_in_symbol: [c_char; SYMBOL_CSTR_LEN],
    /// The output symbology type of `stype_out_symbol`.
    pub stype_out: u8,
    /// The output symbol.
    pub stype_out_symbol: [c_char; SYMBOL_CSTR_LEN],
    /// The start of the mapping interval in UNIX epoch nanoseconds.
    pub start_ts: u64,
    /// The end of the mapping interval in UNIX epoch nanoseconds.
    pub end_ts: u64,
}

/// A non-error message from the live gateway. Also used for heartbeats.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemMsg {
    /// The common header.
    pub hd: RecordHeader,
    /// The message from the gateway.
    pub msg: [c_char; MSG_CSTR_LEN],
    /// The type of system message.
    pub code: u8,
    // Filler for alignment.
    pub _reserved: [u8; 1],
}

/// Aliases `data` as a slice of raw bytes.
///
/// # Safety
/// `data` must be sized and plain old data (POD), i.e. contain no pointers.
pub(crate) unsafe fn as_u8_slice<T: Sized>(data: &T) -> &[u8] {
    slice::from_raw_parts((data as *const T).cast(), mem::size_of::<T>())
}

/// Provides a _relatively safe_ method for converting a view on bytes into a record
/// of type `T`. Checks `rtype` before casting.
///
/// # Safety
/// `bytes` must contain a full, valid record of type `T` if `rtype` matches.
///
/// # Panics
/// Panics if `bytes` is shorter than `T`.
pub unsafe fn transmute_record_bytes<T: HasRType>(bytes: &[u8]) -> Option<&T> {
    assert!(
        bytes.len() >= mem::size_of::<T>(),
        "passing a slice smaller than `{}` to `transmute_record_bytes` is invalid",
        std::any::type_name::<T>()
    );
    let non_null = NonNull::new_unchecked(bytes.as_ptr().cast_mut());
    if T::has_rtype(non_null.cast::<RecordHeader>().as_ref().rtype) {
        Some(non_null.cast::<T>().as_ref())
    } else {
        None
    }
}

/// Tries to convert a str slice to a fixed-length null-terminated C char array.
///
/// # Errors
/// This function returns an error if `s` contains more than `N - 1` characters. The
/// last character is reserved for the null byte.
pub fn str_to_c_chars<const N: usize>(s: &str) -> Result<[c_char; N]> {
    if s.len() > (N - 1) {
        return Err(Error::encode(format!(
            "string cannot be longer than {}; received str of length {}",
            N - 1,
            s.len(),
        )));
    }
    let mut res = [0; N];
    for (i, byte) in s.as_bytes().iter().enumerate() {
        res[i] = *byte as c_char;
    }
    Ok(res)
}

/// Tries to convert a slice of `c_char`s to a UTF-8 `str`.
///
/// # Errors
/// This function returns an error if `chars` contains invalid UTF-8.
pub fn c_chars_to_str<const N: usize>(chars: &[c_char; N]) -> Result<&str> {
    let cstr = unsafe { CStr::from_ptr(chars.as_ptr()) };
    cstr.to_str()
        .map_err(|e| Error::utf8(e, format!("converting c_char array: {chars:?}")))
}

/// Parses a raw nanosecond-precision UNIX timestamp to an `OffsetDateTime`. Returns
/// `None` if `ts` contains the sentinel for a null timestamp.
pub fn ts_to_dt(ts: u64) -> Option<time::OffsetDateTime> {
    if ts == UNDEF_TIMESTAMP {
        None
    } else {
        // u64::MAX is within the maximum allowable range
        Some(time::OffsetDateTime::from_unix_timestamp_nanos(ts as i128).unwrap())
    }
}

// Implements `AsRef<[u8]>`, `Record`, `RecordMut`, and `HasRType` for a record
// struct. The `index: $field` form marks `$field` as the primary timestamp.
macro_rules! impl_record {
    ($ty:ident, index: $index:ident, $($rtype:pat),+) => {
        impl_record!(@common $ty, $($rtype),+);

        impl Record for $ty {
            fn header(&self) -> &RecordHeader {
                &self.hd
            }

            fn raw_index_ts(&self) -> u64 {
                self.$index
            }
        }

        impl $ty {
            /// Parses the raw capture-server-received timestamp into a datetime.
            /// Returns `None` if the field contains the null timestamp sentinel.
            pub fn ts_recv(&self) -> Option<time::OffsetDateTime> {
                ts_to_dt(self.ts_recv)
            }
        }
    };
    ($ty:ident, $($rtype:pat),+) => {
        impl_record!(@common $ty, $($rtype),+);

        impl Record for $ty {
            fn header(&self) -> &RecordHeader {
                &self.hd
            }
        }
    };
    (@common $ty:ident, $($rtype:pat),+) => {
        impl AsRef<[u8]> for $ty {
            fn as_ref(&self) -> &[u8] {
                unsafe { as_u8_slice(self) }
            }
        }

        impl RecordMut for $ty {
            fn header_mut(&mut self) -> &mut RecordHeader {
                &mut self.hd
            }
        }

        impl HasRType for $ty {
            fn has_rtype(rtype: u8) -> bool {
                matches!(rtype, $($rtype)|+)
            }
        }
    };
}
pub(crate) use impl_record;

impl_record!(MboMsg, index: ts_recv, rtype::MBO);
impl_record!(TradeMsg, index: ts_recv, rtype::MBP_0);
impl_record!(Mbp1Msg, index: ts_recv, rtype::MBP_1);
impl_record!(Mbp10Msg, index: ts_recv, rtype::MBP_10);
impl_record!(
    OhlcvMsg,
    rtype::OHLCV_1S,
    rtype::OHLCV_1M,
    rtype::OHLCV_1H,
    rtype::OHLCV_1D
);
impl_record!(StatusMsg, index: ts_recv, rtype::STATUS);
impl_record!(InstrumentDefMsg, index: ts_recv, rtype::INSTRUMENT_DEF);
impl_record!(ImbalanceMsg, index: ts_recv, rtype::IMBALANCE);
impl_record!(StatMsg, index: ts_recv, rtype::STATISTICS);
impl_record!(ErrorMsg, rtype::ERROR);
impl_record!(SymbolMappingMsg, rtype::SYMBOL_MAPPING);
impl_record!(SystemMsg, rtype::SYSTEM);

impl RecordHeader {
    /// The multiplier for converting the `length` field to the size in bytes.
    pub const LENGTH_MULTIPLIER: usize = 4;

    /// Creates a new `RecordHeader`. `R` and `rtype` should be compatible.
    pub const fn new<R: HasRType>(
        rtype: u8,
        publisher_id: u16,
        instrument_id: u32,
        ts_event: u64,
    ) -> Self {
        Self {
            length: (mem::size_of::<R>() / Self::LENGTH_MULTIPLIER) as u8,
            rtype,
            publisher_id,
            instrument_id,
            ts_event,
        }
    }

    /// Returns the size of the **entire** record in bytes.
    pub const fn record_size(&self) -> usize {
        self.length as usize * Self::LENGTH_MULTIPLIER
    }

    /// Tries to convert the raw record type into an enum.
    ///
    /// # Errors
    /// This function returns an error if the `rtype` field does not contain a valid,
    /// known [`RType`].
    pub fn rtype(&self) -> Result<RType> {
        RType::try_from(self.rtype)
            .map_err(|_| Error::conversion::<RType>(format!("{:#04X}", self.rtype)))
    }

    /// Parses the raw matching-engine-received timestamp into a datetime. Returns
    /// `None` if `ts_event` contains the sentinel for a null timestamp.
    pub fn ts_event(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.ts_event)
    }
}

macro_rules! impl_side_action {
    ($($ty:ident),+) => {
        $(
            impl $ty {
                /// Tries to convert the raw order side to an enum.
                ///
                /// # Errors
                /// This function returns an error if the `side` field does not
                /// contain a valid [`Side`].
                pub fn side(&self) -> Result<Side> {
                    Side::try_from(self.side as u8)
                        .map_err(|_| Error::conversion::<Side>(format!("{:#04X}", self.side as u8)))
                }

                /// Tries to convert the raw event action to an enum.
                ///
                /// # Errors
                /// This function returns an error if the `action` field does not
                /// contain a valid [`Action`].
                pub fn action(&self) -> Result<Action> {
                    Action::try_from(self.action as u8)
                        .map_err(|_| Error::conversion::<Action>(format!("{:#04X}", self.action as u8)))
                }
            }
        )+
    };
}
impl_side_action!(MboMsg, TradeMsg, Mbp1Msg, Mbp10Msg);

impl InstrumentDefMsg {
    /// Returns the raw symbol assigned by the publisher as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `raw_symbol` contains invalid UTF-8.
    pub fn raw_symbol(&self) -> Result<&str> {
        c_chars_to_str(&self.raw_symbol)
    }

    /// Returns the currency used for price fields as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `currency` contains invalid UTF-8.
    pub fn currency(&self) -> Result<&str> {
        c_chars_to_str(&self.currency)
    }

    /// Returns the exchange used to identify the instrument as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `exchange` contains invalid UTF-8.
    pub fn exchange(&self) -> Result<&str> {
        c_chars_to_str(&self.exchange)
    }

    /// Returns the underlying asset code as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `asset` contains invalid UTF-8.
    pub fn asset(&self) -> Result<&str> {
        c_chars_to_str(&self.asset)
    }

    /// Tries to convert the raw classification of the instrument to an enum.
    ///
    /// # Errors
    /// This function returns an error if the `instrument_class` field does not
    /// contain a valid [`InstrumentClass`].
    pub fn instrument_class(&self) -> Result<InstrumentClass> {
        InstrumentClass::try_from(self.instrument_class as u8).map_err(|_| {
            Error::conversion::<InstrumentClass>(format!("{:#04X}", self.instrument_class as u8))
        })
    }

    /// Tries to convert the raw `security_update_action` to an enum.
    ///
    /// # Errors
    /// This function returns an error if the field does not contain a valid
    /// [`SecurityUpdateAction`].
    pub fn security_update_action(&self) -> Result<SecurityUpdateAction> {
        SecurityUpdateAction::try_from(self.security_update_action as u8).map_err(|_| {
            Error::conversion::<SecurityUpdateAction>(format!(
                "{:#04X}",
                self.security_update_action as u8
            ))
        })
    }

    /// Tries to convert the raw `user_defined_instrument` to an enum.
    ///
    /// # Errors
    /// This function returns an error if the field does not contain a valid
    /// [`UserDefinedInstrument`].
    pub fn user_defined_instrument(&self) -> Result<UserDefinedInstrument> {
        UserDefinedInstrument::try_from(self.user_defined_instrument as u8).map_err(|_| {
            Error::conversion::<UserDefinedInstrument>(format!(
                "{:#04X}",
                self.user_defined_instrument as u8
            ))
        })
    }

    /// Parses the raw last eligible trade time into a datetime. Returns `None` if
    /// `expiration` contains the sentinel for a null timestamp.
    pub fn expiration(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.expiration)
    }

    /// Parses the raw time of instrument activation into a datetime. Returns `None`
    /// if `activation` contains the sentinel for a null timestamp.
    pub fn activation(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.activation)
    }
}

impl StatMsg {
    /// Tries to convert the raw type of the statistic value to an enum.
    ///
    /// # Errors
    /// This function returns an error if the `stat_type` field does not contain a
    /// valid [`StatType`].
    pub fn stat_type(&self) -> Result<StatType> {
        StatType::try_from(self.stat_type)
            .map_err(|_| Error::conversion::<StatType>(format!("{}", self.stat_type)))
    }

    /// Tries to convert the raw `update_action` to an enum.
    ///
    /// # Errors
    /// This function returns an error if the `update_action` field does not contain
    /// a valid [`StatUpdateAction`].
    pub fn update_action(&self) -> Result<StatUpdateAction> {
        StatUpdateAction::try_from(self.update_action)
            .map_err(|_| Error::conversion::<StatUpdateAction>(format!("{}", self.update_action)))
    }

    /// Parses the reference timestamp of the statistic into a datetime. Returns
    /// `None` if `ts_ref` contains the sentinel for a null timestamp.
    pub fn ts_ref(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.ts_ref)
    }
}

impl ErrorMsg {
    /// Creates a new `ErrorMsg`.
    ///
    /// # Panics
    /// Panics if `msg` is longer than 301 characters.
    pub fn new(ts_event: u64, msg: &str, is_last: bool) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(rtype::ERROR, 0, 0, ts_event),
            err: str_to_c_chars(msg).expect("error message within bounds"),
            code: 0,
            is_last: is_last as u8,
        }
    }

    /// Returns the error message as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `err` contains invalid UTF-8.
    pub fn err(&self) -> Result<&str> {
        c_chars_to_str(&self.err)
    }
}

impl SystemMsg {
    /// The message contents of a heartbeat record.
    pub const HEARTBEAT: &'static str = "Heartbeat";

    /// Creates a new `SystemMsg`.
    ///
    /// # Errors
    /// This function returns an error if `msg` is longer than 301 characters.
    pub fn new(ts_event: u64, msg: &str) -> Result<Self> {
        Ok(Self {
            hd: RecordHeader::new::<Self>(rtype::SYSTEM, 0, 0, ts_event),
            msg: str_to_c_chars(msg)?,
            code: 0,
            _reserved: [0; 1],
        })
    }

    /// Creates a new heartbeat `SystemMsg`.
    pub fn heartbeat(ts_event: u64) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(rtype::SYSTEM, 0, 0, ts_event),
            msg: str_to_c_chars(Self::HEARTBEAT).expect("heartbeat within bounds"),
            code: 0,
            _reserved: [0; 1],
        }
    }

    /// Returns `true` if this is a heartbeat message from the gateway.
    pub fn is_heartbeat(&self) -> bool {
        self.msg()
            .map(|msg| msg == Self::HEARTBEAT)
            .unwrap_or_default()
    }

    /// Returns the message from the gateway as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `msg` contains invalid UTF-8.
    pub fn msg(&self) -> Result<&str> {
        c_chars_to_str(&self.msg)
    }
}

impl SymbolMappingMsg {
    /// Creates a new `SymbolMappingMsg`.
    ///
    /// # Errors
    /// This function returns an error if either symbol is too long for its
    /// fixed-length field.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument_id: u32,
        ts_event: u64,
        stype_in: SType,
        stype_in_symbol: &str,
        stype_out: SType,
        stype_out_symbol: &str,
        start_ts: u64,
        end_ts: u64,
    ) -> Result<Self> {
        Ok(Self {
            hd: RecordHeader::new::<Self>(rtype::SYMBOL_MAPPING, 0, instrument_id, ts_event),
            stype_in: stype_in as u8,
            stype_in_symbol: str_to_c_chars(stype_in_symbol)?,
            stype_out: stype_out as u8,
            stype_out_symbol: str_to_c_chars(stype_out_symbol)?,
            start_ts,
            end_ts,
        })
    }

    /// Tries to convert the raw input symbology type to an enum.
    ///
    /// # Errors
    /// This function returns an error if `stype_in` does not contain a valid
    /// [`SType`].
    pub fn stype_in(&self) -> Result<SType> {
        SType::try_from(self.stype_in)
            .map_err(|_| Error::conversion::<SType>(format!("{:#04X}", self.stype_in)))
    }

    /// Returns the input symbol as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `stype_in_symbol` contains invalid UTF-8.
    pub fn stype_in_symbol(&self) -> Result<&str> {
        c_chars_to_str(&self.stype_in_symbol)
    }

    /// Tries to convert the raw output symbology type to an enum.
    ///
    /// # Errors
    /// This function returns an error if `stype_out` does not contain a valid
    /// [`SType`].
    pub fn stype_out(&self) -> Result<SType> {
        SType::try_from(self.stype_out)
            .map_err(|_| Error::conversion::<SType>(format!("{:#04X}", self.stype_out)))
    }

    /// Returns the output symbol as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if `stype_out_symbol` contains invalid UTF-8.
    pub fn stype_out_symbol(&self) -> Result<&str> {
        c_chars_to_str(&self.stype_out_symbol)
    }

    /// Parses the start of the mapping interval into a datetime. Returns `None` if
    /// `start_ts` contains the sentinel for a null timestamp.
    pub fn start_ts(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.start_ts)
    }

    /// Parses the end of the mapping interval into a datetime. Returns `None` if
    /// `end_ts` contains the sentinel for a null timestamp.
    pub fn end_ts(&self) -> Option<time::OffsetDateTime> {
        ts_to_dt(self.end_ts)
    }
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self {
            length: (mem::size_of::<Self>() / Self::LENGTH_MULTIPLIER) as u8,
            rtype: 0,
            publisher_id: 0,
            instrument_id: 0,
            ts_event: UNDEF_TIMESTAMP,
        }
    }
}

macro_rules! default_header {
    ($ty:ident, $rtype:expr) => {
        RecordHeader::new::<$ty>($rtype, 0, 0, UNDEF_TIMESTAMP)
    };
}

impl Default for BidAskPair {
    fn default() -> Self {
        Self {
            bid_px: UNDEF_PRICE,
            ask_px: UNDEF_PRICE,
            bid_sz: 0,
            ask_sz: 0,
            bid_ct: 0,
            ask_ct: 0,
        }
    }
}

impl Default for MboMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(MboMsg, rtype::MBO),
            order_id: 0,
            price: UNDEF_PRICE,
            size: UNDEF_ORDER_SIZE,
            flags: 0,
            channel_id: 0,
            action: Action::None as u8 as c_char,
            side: Side::None as u8 as c_char,
            ts_recv: UNDEF_TIMESTAMP,
            ts_in_delta: 0,
            sequence: 0,
        }
    }
}

impl Default for TradeMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(TradeMsg, rtype::MBP_0),
            price: UNDEF_PRICE,
            size: UNDEF_ORDER_SIZE,
            action: Action::Trade as u8 as c_char,
            side: Side::None as u8 as c_char,
            flags: 0,
            depth: 0,
            ts_recv: UNDEF_TIMESTAMP,
            ts_in_delta: 0,
            sequence: 0,
        }
    }
}

impl Default for Mbp1Msg {
    fn default() -> Self {
        Self {
            hd: default_header!(Mbp1Msg, rtype::MBP_1),
            price: UNDEF_PRICE,
            size: UNDEF_ORDER_SIZE,
            action: Action::None as u8 as c_char,
            side: Side::None as u8 as c_char,
            flags: 0,
            depth: 0,
            ts_recv: UNDEF_TIMESTAMP,
            ts_in_delta: 0,
            sequence: 0,
            levels: Default::default(),
        }
    }
}

impl Default for Mbp10Msg {
    fn default() -> Self {
        Self {
            hd: default_header!(Mbp10Msg, rtype::MBP_10),
            price: UNDEF_PRICE,
            size: UNDEF_ORDER_SIZE,
            action: Action::None as u8 as c_char,
            side: Side::None as u8 as c_char,
            flags: 0,
            depth: 0,
            ts_recv: UNDEF_TIMESTAMP,
            ts_in_delta: 0,
            sequence: 0,
            levels: Default::default(),
        }
    }
}

impl OhlcvMsg {
    /// Creates a default OHLCV record with the rtype for `schema`.
    pub fn default_for_schema(schema: crate::Schema) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(RType::from(schema) as u8, 0, 0, UNDEF_TIMESTAMP),
            ..Default::default()
        }
    }
}

impl Default for OhlcvMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(OhlcvMsg, rtype::OHLCV_1D),
            open: UNDEF_PRICE,
            high: UNDEF_PRICE,
            low: UNDEF_PRICE,
            close: UNDEF_PRICE,
            volume: 0,
        }
    }
}

impl Default for StatusMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(StatusMsg, rtype::STATUS),
            ts_recv: UNDEF_TIMESTAMP,
            action: 0,
            reason: 0,
            trading_event: 0,
            is_trading: b'~' as c_char,
            is_quoting: b'~' as c_char,
            is_short_sell_restricted: b'~' as c_char,
            _reserved: [0; 7],
        }
    }
}

impl Default for InstrumentDefMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(InstrumentDefMsg, rtype::INSTRUMENT_DEF),
            ts_recv: UNDEF_TIMESTAMP,
            min_price_increment: UNDEF_PRICE,
            display_factor: UNDEF_PRICE,
            expiration: UNDEF_TIMESTAMP,
            activation: UNDEF_TIMESTAMP,
            high_limit_price: UNDEF_PRICE,
            low_limit_price: UNDEF_PRICE,
            max_price_variation: UNDEF_PRICE,
            trading_reference_price: UNDEF_PRICE,
            unit_of_measure_qty: UNDEF_PRICE,
            min_price_increment_amount: UNDEF_PRICE,
            price_ratio: UNDEF_PRICE,
            strike_price: UNDEF_PRICE,
            inst_attrib_value: 0,
            underlying_id: 0,
            raw_instrument_id: 0,
            market_depth_implied: 0,
            market_depth: 0,
            market_segment_id: 0,
            max_trade_vol: 0,
            min_lot_size: 0,
            min_lot_size_block: 0,
            min_lot_size_round_lot: 0,
            min_trade_vol: 0,
            contract_multiplier: 0,
            decay_quantity: 0,
            original_contract_size: 0,
            trading_reference_date: 0,
            appl_id: 0,
            maturity_year: 0,
            decay_start_date: 0,
            channel_id: 0,
            currency: [0; 4],
            settl_currency: [0; 4],
            secsubtype: [0; 6],
            raw_symbol: [0; SYMBOL_CSTR_LEN],
            group: [0; 21],
            exchange: [0; 5],
            asset: [0; 7],
            cfi: [0; 7],
            security_type: [0; 7],
            unit_of_measure: [0; 31],
            underlying: [0; 21],
            strike_price_currency: [0; 4],
            instrument_class: 0,
            match_algorithm: b'F' as c_char,
            md_security_trading_status: 0,
            main_fraction: u8::MAX,
            price_display_format: u8::MAX,
            settl_price_type: u8::MAX,
            sub_fraction: u8::MAX,
            underlying_product: u8::MAX,
            security_update_action: SecurityUpdateAction::Add as u8 as c_char,
            maturity_month: u8::MAX,
            maturity_day: u8::MAX,
            maturity_week: u8::MAX,
            user_defined_instrument: UserDefinedInstrument::No as u8 as c_char,
            contract_multiplier_unit: 0,
            flow_schedule_type: 0,
            tick_rule: u8::MAX,
            _reserved: [0; 10],
        }
    }
}

impl Default for ImbalanceMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(ImbalanceMsg, rtype::IMBALANCE),
            ts_recv: UNDEF_TIMESTAMP,
            ref_price: UNDEF_PRICE,
            auction_time: 0,
            cont_book_clr_price: UNDEF_PRICE,
            auct_interest_clr_price: UNDEF_PRICE,
            ssr_filling_price: UNDEF_PRICE,
            ind_match_price: UNDEF_PRICE,
            upper_collar: UNDEF_PRICE,
            lower_collar: UNDEF_PRICE,
            paired_qty: UNDEF_ORDER_SIZE,
            total_imbalance_qty: UNDEF_ORDER_SIZE,
            market_imbalance_qty: UNDEF_ORDER_SIZE,
            unpaired_qty: UNDEF_ORDER_SIZE,
            auction_type: b'~' as c_char,
            side: Side::None as u8 as c_char,
            auction_status: 0,
            freeze_status: 0,
            num_extensions: 0,
            unpaired_side: Side::None as u8 as c_char,
            significant_imbalance: b'~' as c_char,
            _reserved: [0; 1],
        }
    }
}

impl Default for StatMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(StatMsg, rtype::STATISTICS),
            ts_recv: UNDEF_TIMESTAMP,
            ts_ref: UNDEF_TIMESTAMP,
            price: UNDEF_PRICE,
            quantity: UNDEF_STAT_QUANTITY,
            sequence: 0,
            ts_in_delta: 0,
            stat_type: 0,
            channel_id: 0,
            update_action: StatUpdateAction::New as u8,
            stat_flags: 0,
            _reserved: [0; 6],
        }
    }
}

impl Default for ErrorMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(ErrorMsg, rtype::ERROR),
            err: [0; MSG_CSTR_LEN],
            code: 0,
            is_last: 1,
        }
    }
}

impl Default for SymbolMappingMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(SymbolMappingMsg, rtype::SYMBOL_MAPPING),
            stype_in: u8::MAX,
            stype_in_symbol: [0; SYMBOL_CSTR_LEN],
            stype_out: u8::MAX,
            stype_out_symbol: [0; SYMBOL_CSTR_LEN],
            start_ts: UNDEF_TIMESTAMP,
            end_ts: UNDEF_TIMESTAMP,
        }
    }
}

impl Default for SystemMsg {
    fn default() -> Self {
        Self {
            hd: default_header!(SystemMsg, rtype::SYSTEM),
            msg: [0; MSG_CSTR_LEN],
            code: u8::MAX,
            _reserved: [0; 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes() {
        assert_eq!(mem::size_of::<RecordHeader>(), 16);
        assert_eq!(mem::size_of::<MboMsg>(), 56);
        assert_eq!(mem::size_of::<TradeMsg>(), 48);
        assert_eq!(mem::size_of::<Mbp1Msg>(), 80);
        assert_eq!(mem::size_of::<Mbp10Msg>(), 368);
        assert_eq!(mem::size_of::<OhlcvMsg>(), 56);
        assert_eq!(mem::size_of::<StatusMsg>(), 40);
        assert_eq!(mem::size_of::<InstrumentDefMsg>(), 400);
        assert_eq!(mem::size_of::<ImbalanceMsg>(), 112);
        assert_eq!(mem::size_of::<StatMsg>(), 64);
        assert_eq!(mem::size_of::<ErrorMsg>(), 320);
        assert_eq!(mem::size_of::<SymbolMappingMsg>(), 176);
        assert_eq!(mem::size_of::<SystemMsg>(), 320);
    }

    #[test]
    fn lengths_are_whole_words() {
        assert_eq!(mem::size_of::<Mbp10Msg>() % RecordHeader::LENGTH_MULTIPLIER, 0);
        assert_eq!(
            mem::size_of::<InstrumentDefMsg>() % RecordHeader::LENGTH_MULTIPLIER,
            0
        );
        assert_eq!(
            mem::size_of::<SymbolMappingMsg>() % RecordHeader::LENGTH_MULTIPLIER,
            0
        );
    }

    #[test]
    fn header_length_matches_size() {
        let rec = Mbp10Msg::default();
        assert_eq!(rec.record_size(), mem::size_of::<Mbp10Msg>());
        let rec = InstrumentDefMsg::default();
        assert_eq!(rec.record_size(), mem::size_of::<InstrumentDefMsg>());
    }

    #[test]
    fn key_field_offsets() {
        assert_eq!(mem::offset_of!(MboMsg, order_id), 16);
        assert_eq!(mem::offset_of!(MboMsg, ts_recv), 40);
        assert_eq!(mem::offset_of!(TradeMsg, ts_recv), 32);
        assert_eq!(mem::offset_of!(Mbp1Msg, levels), 48);
        assert_eq!(mem::offset_of!(SymbolMappingMsg, start_ts), 160);
        assert_eq!(mem::offset_of!(InstrumentDefMsg, raw_symbol), 200);
        assert_eq!(mem::offset_of!(InstrumentDefMsg, instrument_class), 374);
    }

    #[test]
    fn c_chars_round_trip() {
        let chars = str_to_c_chars::<21>("ESM4").unwrap();
        assert_eq!(c_chars_to_str(&chars).unwrap(), "ESM4");
        assert!(str_to_c_chars::<4>("TOO LONG").is_err());
    }

    #[test]
    fn system_msg_heartbeat() {
        let hb = SystemMsg::heartbeat(0);
        assert!(hb.is_heartbeat());
        assert!(!SystemMsg::new(0, "Subscription request received").unwrap().is_heartbeat());
    }
}
