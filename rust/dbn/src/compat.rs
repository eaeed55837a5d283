//! Compatibility layer for previous DBN versions: the version-1 record layouts with
//! narrower fixed-length strings, and the upgrade of those records to the current
//! layouts.

use std::os::raw::c_char;

use crate::{
    enums::{rtype, VersionUpgradePolicy},
    record::{
        as_u8_slice, impl_record, ts_to_dt, ErrorMsg, HasRType, InstrumentDefMsg, Record,
        RecordHeader, RecordMut, SymbolMappingMsg, SystemMsg,
    },
    record_ref::RecordRef,
    Result, UNDEF_TIMESTAMP,
};

/// The length of fixed-length symbol strings in DBN version 1, including the null
/// terminator.
pub const SYMBOL_CSTR_LEN_V1: usize = 22;
/// The length of the reserved region of version-1 metadata.
pub(crate) const METADATA_RESERVED_LEN_V1: usize = 47;
/// The length of error and system message strings in DBN version 1.
pub(crate) const MSG_CSTR_LEN_V1: usize = 64;

/// Returns the length of fixed-length symbol strings in the given DBN version.
pub fn version_symbol_cstr_len(version: u8) -> usize {
    if version < 2 {
        SYMBOL_CSTR_LEN_V1
    } else {
        crate::SYMBOL_CSTR_LEN
    }
}

/// A version-1 error message from the live gateway.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorMsgV1 {
    /// The common header.
    pub hd: RecordHeader,
    /// The error message.
    pub err: [c_char; MSG_CSTR_LEN_V1],
}

/// A version-1 non-error message from the live gateway.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemMsgV1 {
    /// The common header.
    pub hd: RecordHeader,
    /// The message from the gateway.
    pub msg: [c_char; MSG_CSTR_LEN_V1],
}

/// A version-1 symbol mapping message.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolMappingMsgV1 {
    /// The common header.
    pub hd: RecordHeader,
    /// The input symbol.
    pub stype_in_symbol: [c_char; SYMBOL_CSTR_LEN_V1],
    /// The output symbol.
    pub stype_out_symbol: [c_char; SYMBOL_CSTR_LEN_V1],
    // Filler for alignment.
    pub _dummy: [u8; 4],
    /// The start of the mapping interval in UNIX epoch nanoseconds.
    pub start_ts: u64,
    /// The end of the mapping interval in UNIX epoch nanoseconds.
    pub end_ts: u64,
}

/// A version-1 definition of an instrument.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstrumentDefMsgV1 {
    /// The common header.
    pub hd: RecordHeader,
    /// The capture-server-received timestamp in UNIX epoch nanoseconds.
    pub ts_recv: u64,
    /// The minimum constant tick for the instrument in units of 1e-9.
    pub min_price_increment: i64,
    /// The multiplier to convert the venue's display price to the conventional
    /// price.
    pub display_factor: i64,
    /// The last eligible trade time in UNIX epoch nanoseconds.
    pub expiration: u64,
    /// The time of instrument activation in UNIX epoch nanoseconds.
    pub activation: u64,
    /// The allowable high limit price for the trading day in units of 1e-9.
    pub high_limit_price: i64,
    /// The allowable low limit price for the trading day in units of 1e-9.
    pub low_limit_price: i64,
    /// The differential value for price banding in units of 1e-9.
    pub max_price_variation: i64,
    /// The trading session settlement price on `trading_reference_date`.
    pub trading_reference_price: i64,
    /// The contract size for each instrument, in combination with
    /// `unit_of_measure`.
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
    /// The instrument ID assigned by the publisher.
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
    /// The quantity that a contract will decay daily.
    pub decay_quantity: i32,
    /// The fixed contract value assigned to each instrument.
    pub original_contract_size: i32,
    /// The trading session date corresponding to the settlement price in
    /// `trading_reference_price`.
    pub trading_reference_date: u16,
    /// The channel ID assigned at the venue.
    pub appl_id: i16,
    /// The calendar year reflected in the instrument symbol.
    pub maturity_year: u16,
    /// The date at which a contract will begin to decay.
    pub decay_start_date: u16,
    /// The channel ID assigned by Databento.
    pub channel_id: u16,
    /// The currency used for price fields.
    pub currency: [c_char; 4],
    /// The currency used for settlement, if different from `currency`.
    pub settl_currency: [c_char; 4],
    /// The strategy type of the spread.
    pub secsubtype: [c_char; 6],
    /// The instrument raw symbol assigned by the publisher.
    pub raw_symbol: [c_char; SYMBOL_CSTR_LEN_V1],
    /// The security group code of the instrument.
    pub group: [c_char; 21],
    /// The exchange used to identify the instrument.
    pub exchange: [c_char; 5],
    /// The underlying asset code (product code) of the instrument.
    pub asset: [c_char; 7],
    /// The ISO standard instrument categorization code.
    pub cfi: [c_char; 7],
    /// The type of the instrument.
    pub security_type: [c_char; 7],
    /// The unit of measure for the instrument's original contract size.
    pub unit_of_measure: [c_char; 31],
    /// The symbol of the first underlying instrument.
    pub underlying: [c_char; 21],
    /// The currency of `strike_price`.
    pub strike_price_currency: [c_char; 4],
    /// The classification of the instrument.
    pub instrument_class: c_char,
    /// The matching algorithm used for the instrument.
    pub match_algorithm: c_char,
    /// The current trading state of the instrument.
    pub md_security_trading_status: u8,
    /// The price denominator of the main fraction.
    pub main_fraction: u8,
    /// The number of digits to the right of the tick mark.
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
    /// Indicates if the instrument is user defined.
    pub user_defined_instrument: c_char,
    /// The type of `contract_multiplier`.
    pub contract_multiplier_unit: i8,
    /// The schedule for delivering electricity.
    pub flow_schedule_type: i8,
    /// The tick rule of the spread.
    pub tick_rule: u8,
    // Filler for alignment.
    pub _reserved: [u8; 11],
}

impl_record!(ErrorMsgV1, rtype::ERROR);
impl_record!(SystemMsgV1, rtype::SYSTEM);
impl_record!(SymbolMappingMsgV1, rtype::SYMBOL_MAPPING);
impl_record!(InstrumentDefMsgV1, index: ts_recv, rtype::INSTRUMENT_DEF);

/// A trait for symbol mapping records of any DBN version.
pub trait SymbolMappingRec: HasRType {
    /// Returns the output symbol as a `&str`.
    ///
    /// # Errors
    /// This function returns an error if the output symbol contains invalid UTF-8.
    fn stype_out_symbol(&self) -> Result<&str>;

    /// Parses the start of the mapping interval into a datetime.
    fn start_ts(&self) -> Option<time::OffsetDateTime>;

    /// Parses the end of the mapping interval into a datetime.
    fn end_ts(&self) -> Option<time::OffsetDateTime>;
}

impl SymbolMappingRec for SymbolMappingMsg {
    fn stype_out_symbol(&self) -> Result<&str> {
        Self::stype_out_symbol(self)
    }

    fn start_ts(&self) -> Option<time::OffsetDateTime> {
        Self::start_ts(self)
    }

    fn end_ts(&self) -> Option<time::OffsetDateTime> {
        Self::end_ts(self)
    }
}

impl SymbolMappingRec for SymbolMappingMsgV1 {
    fn stype_out_symbol(&self) -> Result<&str> {
        crate::record::c_chars_to_str(&self.stype_out_symbol)
    }

    fn start_ts(&self) -> Option<time::OffsetDateTime> {
        crate::record::ts_to_dt(self.start_ts)
    }

    fn end_ts(&self) -> Option<time::OffsetDateTime> {
        crate::record::ts_to_dt(self.end_ts)
    }
}

fn widen_c_chars<const IN: usize, const OUT: usize>(chars: &[c_char; IN]) -> [c_char; OUT] {
    debug_assert!(OUT >= IN);
    let mut res = [0; OUT];
    res[..IN].copy_from_slice(chars);
    res
}

impl From<&ErrorMsgV1> for ErrorMsg {
    fn from(old: &ErrorMsgV1) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(
                rtype::ERROR,
                old.hd.publisher_id,
                old.hd.instrument_id,
                old.hd.ts_event,
            ),
            err: widen_c_chars(&old.err),
            code: u8::MAX,
            is_last: u8::MAX,
        }
    }
}

impl From<&SystemMsgV1> for SystemMsg {
    fn from(old: &SystemMsgV1) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(
                rtype::SYSTEM,
                old.hd.publisher_id,
                old.hd.instrument_id,
                old.hd.ts_event,
            ),
            msg: widen_c_chars(&old.msg),
            code: u8::MAX,
            _reserved: [0; 1],
        }
    }
}

impl From<&SymbolMappingMsgV1> for SymbolMappingMsg {
    fn from(old: &SymbolMappingMsgV1) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(
                rtype::SYMBOL_MAPPING,
                old.hd.publisher_id,
                old.hd.instrument_id,
                old.hd.ts_event,
            ),
            // Version 1 doesn't encode the symbology types.
            stype_in: u8::MAX,
            stype_in_symbol: widen_c_chars(&old.stype_in_symbol),
            stype_out: u8::MAX,
            stype_out_symbol: widen_c_chars(&old.stype_out_symbol),
            start_ts: old.start_ts,
            end_ts: old.end_ts,
        }
    }
}

impl From<&InstrumentDefMsgV1> for InstrumentDefMsg {
    fn from(old: &InstrumentDefMsgV1) -> Self {
        Self {
            hd: RecordHeader::new::<Self>(
                rtype::INSTRUMENT_DEF,
                old.hd.publisher_id,
                old.hd.instrument_id,
                old.hd.ts_event,
            ),
            ts_recv: old.ts_recv,
            min_price_increment: old.min_price_increment,
            display_factor: old.display_factor,
            expiration: old.expiration,
            activation: old.activation,
            high_limit_price: old.high_limit_price,
            low_limit_price: old.low_limit_price,
            max_price_variation: old.max_price_variation,
            trading_reference_price: old.trading_reference_price,
            unit_of_measure_qty: old.unit_of_measure_qty,
            min_price_increment_amount: old.min_price_increment_amount,
            price_ratio: old.price_ratio,
            strike_price: old.strike_price,
            inst_attrib_value: old.inst_attrib_value,
            underlying_id: old.underlying_id,
            raw_instrument_id: old.raw_instrument_id,
            market_depth_implied: old.market_depth_implied,
            market_depth: old.market_depth,
            market_segment_id: old.market_segment_id,
            max_trade_vol: old.max_trade_vol,
            min_lot_size: old.min_lot_size,
            min_lot_size_block: old.min_lot_size_block,
            min_lot_size_round_lot: old.min_lot_size_round_lot,
            min_trade_vol: old.min_trade_vol,
            contract_multiplier: old.contract_multiplier,
            decay_quantity: old.decay_quantity,
            original_contract_size: old.original_contract_size,
            trading_reference_date: old.trading_reference_date,
            appl_id: old.appl_id,
            maturity_year: old.maturity_year,
            decay_start_date: old.decay_start_date,
            channel_id: old.channel_id,
            currency: old.currency,
            settl_currency: old.settl_currency,
            secsubtype: old.secsubtype,
            raw_symbol: widen_c_chars(&old.raw_symbol),
            group: old.group,
            exchange: old.exchange,
            asset: old.asset,
            cfi: old.cfi,
            security_type: old.security_type,
            unit_of_measure: old.unit_of_measure,
            underlying: old.underlying,
            strike_price_currency: old.strike_price_currency,
            instrument_class: old.instrument_class,
            match_algorithm: old.match_algorithm,
            md_security_trading_status: old.md_security_trading_status,
            main_fraction: old.main_fraction,
            price_display_format: old.price_display_format,
            settl_price_type: old.settl_price_type,
            sub_fraction: old.sub_fraction,
            underlying_product: old.underlying_product,
            security_update_action: old.security_update_action,
            maturity_month: old.maturity_month,
            maturity_day: old.maturity_day,
            maturity_week: old.maturity_week,
            user_defined_instrument: old.user_defined_instrument,
            contract_multiplier_unit: old.contract_multiplier_unit,
            flow_schedule_type: old.flow_schedule_type,
            tick_rule: old.tick_rule,
            _reserved: [0; 10],
        }
    }
}

fn upgrade_record<T>(compat_buffer: &mut [u8; crate::MAX_RECORD_LEN], rec: &T) -> usize
where
    T: HasRType,
{
    let size = rec.record_size();
    compat_buffer[..size].copy_from_slice(rec.as_ref());
    size
}

/// Decodes a record reference from `input`, upgrading records from previous DBN
/// versions into `compat_buffer` according to `upgrade_policy`.
///
/// # Safety
/// `input` must contain a full, valid record: a [`RecordHeader`] and a body of
/// `length * 4` bytes.
pub(crate) unsafe fn decode_record_ref<'a>(
    version: u8,
    upgrade_policy: VersionUpgradePolicy,
    compat_buffer: &'a mut [u8; crate::MAX_RECORD_LEN],
    input: &'a [u8],
) -> RecordRef<'a> {
    if version == 1 && upgrade_policy == VersionUpgradePolicy::Upgrade {
        let rec_ref = RecordRef::new(input);
        let size = match rec_ref.header().rtype {
            rtype::ERROR => {
                let upgraded = ErrorMsg::from(rec_ref.get_unchecked::<ErrorMsgV1>());
                upgrade_record(compat_buffer, &upgraded)
            }
            rtype::SYSTEM => {
                let upgraded = SystemMsg::from(rec_ref.get_unchecked::<SystemMsgV1>());
                upgrade_record(compat_buffer, &upgraded)
            }
            rtype::SYMBOL_MAPPING => {
                let upgraded =
                    SymbolMappingMsg::from(rec_ref.get_unchecked::<SymbolMappingMsgV1>());
                upgrade_record(compat_buffer, &upgraded)
            }
            rtype::INSTRUMENT_DEF => {
                let upgraded =
                    InstrumentDefMsg::from(rec_ref.get_unchecked::<InstrumentDefMsgV1>());
                upgrade_record(compat_buffer, &upgraded)
            }
            // Unchanged between versions.
            _ => return RecordRef::new(input),
        };
        let compat_buffer: &'a [u8; crate::MAX_RECORD_LEN] = compat_buffer;
        RecordRef::new(&compat_buffer[..size])
    } else {
        RecordRef::new(input)
    }
}

impl Default for InstrumentDefMsgV1 {
    fn default() -> Self {
        let current = InstrumentDefMsg::default();
        Self {
            hd: RecordHeader::new::<Self>(
                rtype::INSTRUMENT_DEF,
                0,
                0,
                UNDEF_TIMESTAMP,
            ),
            ts_recv: current.ts_recv,
            min_price_increment: current.min_price_increment,
            display_factor: current.display_factor,
            expiration: current.expiration,
            activation: current.activation,
            high_limit_price: current.high_limit_price,
            low_limit_price: current.low_limit_price,
            max_price_variation: current.max_price_variation,
            trading_reference_price: current.trading_reference_price,
            unit_of_measure_qty: current.unit_of_measure_qty,
            min_price_increment_amount: current.min_price_increment_amount,
            price_ratio: current.price_ratio,
            strike_price: current.strike_price,
            inst_attrib_value: current.inst_attrib_value,
            underlying_id: current.underlying_id,
            raw_instrument_id: current.raw_instrument_id,
            market_depth_implied: current.market_depth_implied,
            market_depth: current.market_depth,
            market_segment_id: current.market_segment_id,
            max_trade_vol: current.max_trade_vol,
            min_lot_size: current.min_lot_size,
            min_lot_size_block: current.min_lot_size_block,
            min_lot_size_round_lot: current.min_lot_size_round_lot,
            min_trade_vol: current.min_trade_vol,
            contract_multiplier: current.contract_multiplier,
            decay_quantity: current.decay_quantity,
            original_contract_size: current.original_contract_size,
            trading_reference_date: current.trading_reference_date,
            appl_id: current.appl_id,
            maturity_year: current.maturity_year,
            decay_start_date: current.decay_start_date,
            channel_id: current.channel_id,
            currency: current.currency,
            settl_currency: current.settl_currency,
            secsubtype: current.secsubtype,
            raw_symbol: [0; SYMBOL_CSTR_LEN_V1],
            group: current.group,
            exchange: current.exchange,
            asset: current.asset,
            cfi: current.cfi,
            security_type: current.security_type,
            unit_of_measure: current.unit_of_measure,
            underlying: current.underlying,
            strike_price_currency: current.strike_price_currency,
            instrument_class: current.instrument_class,
            match_algorithm: current.match_algorithm,
            md_security_trading_status: current.md_security_trading_status,
            main_fraction: current.main_fraction,
            price_display_format: current.price_display_format,
            settl_price_type: current.settl_price_type,
            sub_fraction: current.sub_fraction,
            underlying_product: current.underlying_product,
            security_update_action: current.security_update_action,
            maturity_month: current.maturity_month,
            maturity_day: current.maturity_day,
            maturity_week: current.maturity_week,
            user_defined_instrument: current.user_defined_instrument,
            contract_multiplier_unit: current.contract_multiplier_unit,
            flow_schedule_type: current.flow_schedule_type,
            tick_rule: current.tick_rule,
            _reserved: [0; 11],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;
    use crate::record::{c_chars_to_str, str_to_c_chars};

    #[test]
    fn v1_record_sizes() {
        assert_eq!(mem::size_of::<ErrorMsgV1>(), 80);
        assert_eq!(mem::size_of::<SystemMsgV1>(), 80);
        assert_eq!(mem::size_of::<SymbolMappingMsgV1>(), 80);
        assert_eq!(mem::size_of::<InstrumentDefMsgV1>(), 352);
    }

    #[test]
    fn upgrade_symbol_mapping() {
        let old = SymbolMappingMsgV1 {
            hd: RecordHeader::new::<SymbolMappingMsgV1>(rtype::SYMBOL_MAPPING, 1, 42, 2),
            stype_in_symbol: str_to_c_chars("ESM4").unwrap(),
            stype_out_symbol: str_to_c_chars("3403").unwrap(),
            _dummy: [0; 4],
            start_ts: 10,
            end_ts: 20,
        };
        let new = SymbolMappingMsg::from(&old);
        assert_eq!(new.hd.instrument_id, 42);
        assert_eq!(new.record_size(), mem::size_of::<SymbolMappingMsg>());
        assert_eq!(c_chars_to_str(&new.stype_in_symbol).unwrap(), "ESM4");
        assert_eq!(c_chars_to_str(&new.stype_out_symbol).unwrap(), "3403");
        assert_eq!(new.start_ts, 10);
        assert_eq!(new.end_ts, 20);
    }

    #[test]
    fn upgrade_error_widens_message() {
        let old = ErrorMsgV1 {
            hd: RecordHeader::new::<ErrorMsgV1>(rtype::ERROR, 0, 0, UNDEF_TIMESTAMP),
            err: str_to_c_chars("Authentication failed").unwrap(),
        };
        let new = ErrorMsg::from(&old);
        assert_eq!(new.err().unwrap(), "Authentication failed");
        assert_eq!(new.record_size(), mem::size_of::<ErrorMsg>());
    }

    #[test]
    fn decode_record_ref_upgrades_defs() {
        let old = InstrumentDefMsgV1 {
            raw_symbol: str_to_c_chars("AAPL").unwrap(),
            ..Default::default()
        };
        let mut compat_buffer = [0; crate::MAX_RECORD_LEN];
        let rec_ref = unsafe {
            decode_record_ref(
                1,
                VersionUpgradePolicy::Upgrade,
                &mut compat_buffer,
                old.as_ref(),
            )
        };
        let new = rec_ref.get::<InstrumentDefMsg>().unwrap();
        assert_eq!(new.raw_symbol().unwrap(), "AAPL");
        assert_eq!(new.record_size(), mem::size_of::<InstrumentDefMsg>());
    }

    #[test]
    fn decode_record_ref_as_is() {
        let old = ErrorMsgV1 {
            hd: RecordHeader::new::<ErrorMsgV1>(rtype::ERROR, 0, 0, UNDEF_TIMESTAMP),
            err: str_to_c_chars("err").unwrap(),
        };
        let mut compat_buffer = [0; crate::MAX_RECORD_LEN];
        let rec_ref = unsafe {
            decode_record_ref(
                1,
                VersionUpgradePolicy::AsIs,
                &mut compat_buffer,
                old.as_ref(),
            )
        };
        assert_eq!(rec_ref.record_size(), mem::size_of::<ErrorMsgV1>());
    }
}
