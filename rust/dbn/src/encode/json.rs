//! Encoding of DBN records into newline-delimited JSON (NDJSON).

use std::io;

use crate::{
    encode::{DbnEncodable, EncodeDbn, EncodeRecord, EncodeRecordRef},
    record_enum::RecordRefEnum,
    record_ref::RecordRef,
    Error, Result,
};

use self::serialize::to_json_string;

/// Type for encoding files and streams of DBN records in newline-delimited JSON:
/// one JSON object per record.
pub struct Encoder<W>
where
    W: io::Write,
{
    writer: W,
    use_pretty_px: bool,
    use_pretty_ts: bool,
}

impl<W> Encoder<W>
where
    W: io::Write,
{
    /// Creates a new [`Encoder`] that will write to `writer`. If `use_pretty_px` is
    /// `true`, price fields are serialized as decimal strings, with the null
    /// sentinel rendered as JSON `null`. If `use_pretty_ts` is `true`, timestamp
    /// fields are serialized as ISO 8601 datetime strings.
    pub fn new(writer: W, use_pretty_px: bool, use_pretty_ts: bool) -> Self {
        Self {
            writer,
            use_pretty_px,
            use_pretty_ts,
        }
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Encodes a single record with a `symbol` key, `null` when unmapped.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer.
    pub fn encode_record_with_sym<R: DbnEncodable>(
        &mut self,
        record: &R,
        symbol: Option<&str>,
    ) -> Result<()> {
        let json = serialize::to_json_string_with_sym(
            record,
            symbol,
            self.use_pretty_px,
            self.use_pretty_ts,
        );
        match self.writer.write_all(json.as_bytes()) {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::io(e, format!("serializing {record:?}"))),
        }
    }

    /// Encodes a single record of dynamic type with a `symbol` key, `null` when
    /// unmapped.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer or the record is of an unknown type.
    pub fn encode_ref_with_sym(&mut self, record: RecordRef, symbol: Option<&str>) -> Result<()> {
        match RecordRefEnum::try_from(record)? {
            RecordRefEnum::Mbo(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Trade(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Mbp1(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Mbp10(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Ohlcv(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Status(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::InstrumentDef(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Imbalance(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Stat(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::Error(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::SymbolMapping(rec) => self.encode_record_with_sym(rec, symbol),
            RecordRefEnum::System(rec) => self.encode_record_with_sym(rec, symbol),
        }
    }
}

impl<W> EncodeRecord for Encoder<W>
where
    W: io::Write,
{
    fn encode_record<R: DbnEncodable>(&mut self, record: &R) -> Result<()> {
        let json = to_json_string(record, self.use_pretty_px, self.use_pretty_ts);
        match self.writer.write_all(json.as_bytes()) {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::io(e, format!("serializing {record:?}"))),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::io(e, "flushing JSON"))
    }
}

impl<W> EncodeRecordRef for Encoder<W>
where
    W: io::Write,
{
    fn encode_record_ref(&mut self, record: RecordRef) -> Result<()> {
        match RecordRefEnum::try_from(record)? {
            RecordRefEnum::Mbo(rec) => self.encode_record(rec),
            RecordRefEnum::Trade(rec) => self.encode_record(rec),
            RecordRefEnum::Mbp1(rec) => self.encode_record(rec),
            RecordRefEnum::Mbp10(rec) => self.encode_record(rec),
            RecordRefEnum::Ohlcv(rec) => self.encode_record(rec),
            RecordRefEnum::Status(rec) => self.encode_record(rec),
            RecordRefEnum::InstrumentDef(rec) => self.encode_record(rec),
            RecordRefEnum::Imbalance(rec) => self.encode_record(rec),
            RecordRefEnum::Stat(rec) => self.encode_record(rec),
            RecordRefEnum::Error(rec) => self.encode_record(rec),
            RecordRefEnum::SymbolMapping(rec) => self.encode_record(rec),
            RecordRefEnum::System(rec) => self.encode_record(rec),
        }
    }
}

impl<W> EncodeDbn for Encoder<W> where W: io::Write {}

pub(crate) mod serialize {
    use std::os::raw::c_char;

    use json_writer::{JSONObjectWriter, JSONWriter, NULL};

    use crate::{
        pretty::{fmt_px, fmt_ts},
        record::{
            c_chars_to_str, BidAskPair, ErrorMsg, ImbalanceMsg, InstrumentDefMsg, MboMsg,
            Mbp10Msg, Mbp1Msg, OhlcvMsg, RecordHeader, StatMsg, StatusMsg, SymbolMappingMsg,
            SystemMsg, TradeMsg,
        },
        UNDEF_PRICE, UNDEF_TIMESTAMP,
    };

    /// Serializes `obj` to a single line of JSON, terminated by a newline.
    pub fn to_json_string<T: JsonSerialize>(
        obj: &T,
        use_pretty_px: bool,
        use_pretty_ts: bool,
    ) -> String {
        let mut res = String::new();
        {
            let mut writer = JSONObjectWriter::new(&mut res);
            match (use_pretty_px, use_pretty_ts) {
                (true, true) => obj.to_json::<String, true, true>(&mut writer),
                (true, false) => obj.to_json::<String, true, false>(&mut writer),
                (false, true) => obj.to_json::<String, false, true>(&mut writer),
                (false, false) => obj.to_json::<String, false, false>(&mut writer),
            }
        }
        res.push('\n');
        res
    }

    /// Serializes `obj` to a single line of JSON with a `symbol` key, terminated by
    /// a newline.
    pub fn to_json_string_with_sym<T: JsonSerialize>(
        obj: &T,
        symbol: Option<&str>,
        use_pretty_px: bool,
        use_pretty_ts: bool,
    ) -> String {
        let mut res = String::new();
        {
            let mut writer = JSONObjectWriter::new(&mut res);
            match (use_pretty_px, use_pretty_ts) {
                (true, true) => obj.to_json::<String, true, true>(&mut writer),
                (true, false) => obj.to_json::<String, true, false>(&mut writer),
                (false, true) => obj.to_json::<String, false, true>(&mut writer),
                (false, false) => obj.to_json::<String, false, false>(&mut writer),
            }
            match symbol {
                Some(symbol) => writer.value("symbol", symbol),
                None => writer.value("symbol", NULL),
            }
        }
        res.push('\n');
        res
    }

    /// Trait for serializing records to JSON objects.
    pub trait JsonSerialize {
        /// Serializes the fields of the object to `writer`.
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        );
    }

    fn write_px_field<J: JSONWriter, const PRETTY_PX: bool>(
        writer: &mut JSONObjectWriter<J>,
        key: &str,
        px: i64,
    ) {
        if PRETTY_PX {
            if px == UNDEF_PRICE {
                writer.value(key, NULL);
            } else {
                writer.value(key, fmt_px(px).as_str());
            }
        } else {
            // i64 values are serialized as strings to avoid loss of precision
            writer.value(key, itoa::Buffer::new().format(px));
        }
    }

    fn write_ts_field<J: JSONWriter, const PRETTY_TS: bool>(
        writer: &mut JSONObjectWriter<J>,
        key: &str,
        ts: u64,
    ) {
        if PRETTY_TS {
            match ts {
                0 | UNDEF_TIMESTAMP => writer.value(key, NULL),
                ts => writer.value(key, fmt_ts(ts).as_str()),
            }
        } else {
            // u64 values are serialized as strings to avoid loss of precision
            writer.value(key, itoa::Buffer::new().format(ts));
        }
    }

    fn write_c_char_field<J: JSONWriter>(
        writer: &mut JSONObjectWriter<J>,
        key: &str,
        c: c_char,
    ) {
        if c == 0 {
            writer.value(key, "");
        } else {
            let mut buf = [0u8; 4];
            writer.value(key, &*(c as u8 as char).encode_utf8(&mut buf));
        }
    }

    fn write_c_chars_field<J: JSONWriter, const N: usize>(
        writer: &mut JSONObjectWriter<J>,
        key: &str,
        chars: &[c_char; N],
    ) {
        writer.value(key, c_chars_to_str(chars).unwrap_or_default());
    }

    fn write_u64_field<J: JSONWriter>(writer: &mut JSONObjectWriter<J>, key: &str, val: u64) {
        // u64 values are serialized as strings to avoid loss of precision
        writer.value(key, itoa::Buffer::new().format(val));
    }

    fn write_i64_field<J: JSONWriter>(writer: &mut JSONObjectWriter<J>, key: &str, val: i64) {
        // i64 values are serialized as strings to avoid loss of precision
        writer.value(key, itoa::Buffer::new().format(val));
    }

    fn write_header<J: JSONWriter, const PRETTY_TS: bool>(
        writer: &mut JSONObjectWriter<J>,
        hd: &RecordHeader,
    ) {
        let mut hd_writer = writer.object("hd");
        // serialize ts_event first to be more human-readable
        write_ts_field::<J, PRETTY_TS>(&mut hd_writer, "ts_event", hd.ts_event);
        hd_writer.value("rtype", hd.rtype);
        hd_writer.value("publisher_id", hd.publisher_id);
        hd_writer.value("instrument_id", hd.instrument_id);
    }

    fn write_levels<J: JSONWriter, const PRETTY_PX: bool>(
        writer: &mut JSONObjectWriter<J>,
        levels: &[BidAskPair],
    ) {
        let mut arr_writer = writer.array("levels");
        for level in levels {
            let mut item_writer = arr_writer.object();
            if PRETTY_PX {
                if level.bid_px == UNDEF_PRICE {
                    item_writer.value("bid_px", NULL);
                } else {
                    item_writer.value("bid_px", fmt_px(level.bid_px).as_str());
                }
                if level.ask_px == UNDEF_PRICE {
                    item_writer.value("ask_px", NULL);
                } else {
                    item_writer.value("ask_px", fmt_px(level.ask_px).as_str());
                }
            } else {
                item_writer.value("bid_px", itoa::Buffer::new().format(level.bid_px));
                item_writer.value("ask_px", itoa::Buffer::new().format(level.ask_px));
            }
            item_writer.value("bid_sz", level.bid_sz);
            item_writer.value("ask_sz", level.ask_sz);
            item_writer.value("bid_ct", level.bid_ct);
            item_writer.value("ask_ct", level.ask_ct);
        }
    }

    impl JsonSerialize for MboMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_u64_field(writer, "order_id", self.order_id);
            write_px_field::<J, PRETTY_PX>(writer, "price", self.price);
            writer.value("size", self.size);
            writer.value("flags", self.flags);
            writer.value("channel_id", self.channel_id);
            write_c_char_field(writer, "action", self.action);
            write_c_char_field(writer, "side", self.side);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            writer.value("ts_in_delta", self.ts_in_delta);
            writer.value("sequence", self.sequence);
        }
    }

    impl JsonSerialize for TradeMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_px_field::<J, PRETTY_PX>(writer, "price", self.price);
            writer.value("size", self.size);
            write_c_char_field(writer, "action", self.action);
            write_c_char_field(writer, "side", self.side);
            writer.value("flags", self.flags);
            writer.value("depth", self.depth);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            writer.value("ts_in_delta", self.ts_in_delta);
            writer.value("sequence", self.sequence);
        }
    }

    impl JsonSerialize for Mbp1Msg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_px_field::<J, PRETTY_PX>(writer, "price", self.price);
            writer.value("size", self.size);
            write_c_char_field(writer, "action", self.action);
            write_c_char_field(writer, "side", self.side);
            writer.value("flags", self.flags);
            writer.value("depth", self.depth);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            writer.value("ts_in_delta", self.ts_in_delta);
            writer.value("sequence", self.sequence);
            write_levels::<J, PRETTY_PX>(writer, &self.levels);
        }
    }

    impl JsonSerialize for Mbp10Msg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_px_field::<J, PRETTY_PX>(writer, "price", self.price);
            writer.value("size", self.size);
            write_c_char_field(writer, "action", self.action);
            write_c_char_field(writer, "side", self.side);
            writer.value("flags", self.flags);
            writer.value("depth", self.depth);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            writer.value("ts_in_delta", self.ts_in_delta);
            writer.value("sequence", self.sequence);
            write_levels::<J, PRETTY_PX>(writer, &self.levels);
        }
    }

    impl JsonSerialize for OhlcvMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_px_field::<J, PRETTY_PX>(writer, "open", self.open);
            write_px_field::<J, PRETTY_PX>(writer, "high", self.high);
            write_px_field::<J, PRETTY_PX>(writer, "low", self.low);
            write_px_field::<J, PRETTY_PX>(writer, "close", self.close);
            write_u64_field(writer, "volume", self.volume);
        }
    }

    impl JsonSerialize for StatusMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            writer.value("action", self.action);
            writer.value("reason", self.reason);
            writer.value("trading_event", self.trading_event);
            write_c_char_field(writer, "is_trading", self.is_trading);
            write_c_char_field(writer, "is_quoting", self.is_quoting);
            write_c_char_field(
                writer,
                "is_short_sell_restricted",
                self.is_short_sell_restricted,
            );
        }
    }

    impl JsonSerialize for InstrumentDefMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            write_px_field::<J, PRETTY_PX>(writer, "min_price_increment", self.min_price_increment);
            write_i64_field(writer, "display_factor", self.display_factor);
            write_ts_field::<J, PRETTY_TS>(writer, "expiration", self.expiration);
            write_ts_field::<J, PRETTY_TS>(writer, "activation", self.activation);
            write_px_field::<J, PRETTY_PX>(writer, "high_limit_price", self.high_limit_price);
            write_px_field::<J, PRETTY_PX>(writer, "low_limit_price", self.low_limit_price);
            write_px_field::<J, PRETTY_PX>(writer, "max_price_variation", self.max_price_variation);
            write_px_field::<J, PRETTY_PX>(
                writer,
                "trading_reference_price",
                self.trading_reference_price,
            );
            write_i64_field(writer, "unit_of_measure_qty", self.unit_of_measure_qty);
            write_px_field::<J, PRETTY_PX>(
                writer,
                "min_price_increment_amount",
                self.min_price_increment_amount,
            );
            write_px_field::<J, PRETTY_PX>(writer, "price_ratio", self.price_ratio);
            write_px_field::<J, PRETTY_PX>(writer, "strike_price", self.strike_price);
            writer.value("inst_attrib_value", self.inst_attrib_value);
            writer.value("underlying_id", self.underlying_id);
            writer.value("raw_instrument_id", self.raw_instrument_id);
            writer.value("market_depth_implied", self.market_depth_implied);
            writer.value("market_depth", self.market_depth);
            writer.value("market_segment_id", self.market_segment_id);
            writer.value("max_trade_vol", self.max_trade_vol);
            writer.value("min_lot_size", self.min_lot_size);
            writer.value("min_lot_size_block", self.min_lot_size_block);
            writer.value("min_lot_size_round_lot", self.min_lot_size_round_lot);
            writer.value("min_trade_vol", self.min_trade_vol);
            writer.value("contract_multiplier", self.contract_multiplier);
            writer.value("decay_quantity", self.decay_quantity);
            writer.value("original_contract_size", self.original_contract_size);
            writer.value("trading_reference_date", self.trading_reference_date);
            writer.value("appl_id", self.appl_id);
            writer.value("maturity_year", self.maturity_year);
            writer.value("decay_start_date", self.decay_start_date);
            writer.value("channel_id", self.channel_id);
            write_c_chars_field(writer, "currency", &self.currency);
            write_c_chars_field(writer, "settl_currency", &self.settl_currency);
            write_c_chars_field(writer, "secsubtype", &self.secsubtype);
            write_c_chars_field(writer, "raw_symbol", &self.raw_symbol);
            write_c_chars_field(writer, "group", &self.group);
            write_c_chars_field(writer, "exchange", &self.exchange);
            write_c_chars_field(writer, "asset", &self.asset);
            write_c_chars_field(writer, "cfi", &self.cfi);
            write_c_chars_field(writer, "security_type", &self.security_type);
            write_c_chars_field(writer, "unit_of_measure", &self.unit_of_measure);
            write_c_chars_field(writer, "underlying", &self.underlying);
            write_c_chars_field(writer, "strike_price_currency", &self.strike_price_currency);
            write_c_char_field(writer, "instrument_class", self.instrument_class);
            write_c_char_field(writer, "match_algorithm", self.match_algorithm);
            writer.value(
                "md_security_trading_status",
                self.md_security_trading_status,
            );
            writer.value("main_fraction", self.main_fraction);
            writer.value("price_display_format", self.price_display_format);
            writer.value("settl_price_type", self.settl_price_type);
            writer.value("sub_fraction", self.sub_fraction);
            writer.value("underlying_product", self.underlying_product);
            write_c_char_field(writer, "security_update_action", self.security_update_action);
            writer.value("maturity_month", self.maturity_month);
            writer.value("maturity_day", self.maturity_day);
            writer.value("maturity_week", self.maturity_week);
            write_c_char_field(
                writer,
                "user_defined_instrument",
                self.user_defined_instrument,
            );
            writer.value("contract_multiplier_unit", self.contract_multiplier_unit);
            writer.value("flow_schedule_type", self.flow_schedule_type);
            writer.value("tick_rule", self.tick_rule);
        }
    }

    impl JsonSerialize for ImbalanceMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            write_px_field::<J, PRETTY_PX>(writer, "ref_price", self.ref_price);
            write_u64_field(writer, "auction_time", self.auction_time);
            write_px_field::<J, PRETTY_PX>(writer, "cont_book_clr_price", self.cont_book_clr_price);
            write_px_field::<J, PRETTY_PX>(
                writer,
                "auct_interest_clr_price",
                self.auct_interest_clr_price,
            );
            write_px_field::<J, PRETTY_PX>(writer, "ssr_filling_price", self.ssr_filling_price);
            write_px_field::<J, PRETTY_PX>(writer, "ind_match_price", self.ind_match_price);
            write_px_field::<J, PRETTY_PX>(writer, "upper_collar", self.upper_collar);
            write_px_field::<J, PRETTY_PX>(writer, "lower_collar", self.lower_collar);
            writer.value("paired_qty", self.paired_qty);
            writer.value("total_imbalance_qty", self.total_imbalance_qty);
            writer.value("market_imbalance_qty", self.market_imbalance_qty);
            writer.value("unpaired_qty", self.unpaired_qty);
            write_c_char_field(writer, "auction_type", self.auction_type);
            write_c_char_field(writer, "side", self.side);
            writer.value("auction_status", self.auction_status);
            writer.value("freeze_status", self.freeze_status);
            writer.value("num_extensions", self.num_extensions);
            write_c_char_field(writer, "unpaired_side", self.unpaired_side);
            write_c_char_field(writer, "significant_imbalance", self.significant_imbalance);
        }
    }

    impl JsonSerialize for StatMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_recv", self.ts_recv);
            write_ts_field::<J, PRETTY_TS>(writer, "ts_ref", self.ts_ref);
            write_px_field::<J, PRETTY_PX>(writer, "price", self.price);
            writer.value("quantity", self.quantity);
            writer.value("sequence", self.sequence);
            writer.value("ts_in_delta", self.ts_in_delta);
            writer.value("stat_type", self.stat_type);
            writer.value("channel_id", self.channel_id);
            writer.value("update_action", self.update_action);
            writer.value("stat_flags", self.stat_flags);
        }
    }

    impl JsonSerialize for ErrorMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_c_chars_field(writer, "err", &self.err);
            writer.value("code", self.code);
            writer.value("is_last", self.is_last);
        }
    }

    impl JsonSerialize for SymbolMappingMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            writer.value("stype_in", self.stype_in);
            write_c_chars_field(writer, "stype_in_symbol", &self.stype_in_symbol);
            writer.value("stype_out", self.stype_out);
            write_c_chars_field(writer, "stype_out_symbol", &self.stype_out_symbol);
            write_ts_field::<J, PRETTY_TS>(writer, "start_ts", self.start_ts);
            write_ts_field::<J, PRETTY_TS>(writer, "end_ts", self.end_ts);
        }
    }

    impl JsonSerialize for SystemMsg {
        fn to_json<J: JSONWriter, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            writer: &mut JSONObjectWriter<J>,
        ) {
            write_header::<J, PRETTY_TS>(writer, &self.hd);
            write_c_chars_field(writer, "msg", &self.msg);
            writer.value("code", self.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{OhlcvMsg, RecordHeader, TradeMsg};

    fn encode_to_string<R: DbnEncodable>(
        rec: &R,
        use_pretty_px: bool,
        use_pretty_ts: bool,
    ) -> String {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, use_pretty_px, use_pretty_ts);
        encoder.encode_record(rec).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn one_object_per_line() {
        let rec = TradeMsg::default();
        let res = encode_to_string(&rec, false, false);
        assert!(res.ends_with('\n'));
        assert_eq!(res.lines().count(), 1);
        assert!(res.starts_with("{\"hd\":"));
    }

    #[test]
    fn pretty_px_null_sentinel() {
        let rec = OhlcvMsg {
            hd: RecordHeader::new::<OhlcvMsg>(crate::rtype::OHLCV_1S, 1, 2, 3),
            open: 1_500_000_000,
            high: crate::UNDEF_PRICE,
            low: 1_000_000_000,
            close: 1_250_000_000,
            volume: 100,
        };
        let res = encode_to_string(&rec, true, false);
        assert!(res.contains("\"open\":\"1.500000000\""));
        assert!(res.contains("\"high\":null"));
    }

    #[test]
    fn fixed_px_is_stringified_int() {
        let rec = OhlcvMsg {
            hd: RecordHeader::new::<OhlcvMsg>(crate::rtype::OHLCV_1S, 1, 2, 3),
            open: 1_500_000_000,
            high: 2_000_000_000,
            low: 1_000_000_000,
            close: 1_250_000_000,
            volume: 100,
        };
        let res = encode_to_string(&rec, false, false);
        assert!(res.contains("\"open\":\"1500000000\""));
        assert!(res.contains("\"volume\":\"100\""));
    }
}
