//! Encoding of DBN records into comma-separated values (CSV).

use std::io;

use crate::{
    decode::{DbnMetadata, DecodeRecordRef},
    encode::{DbnEncodable, EncodeDbn, EncodeRecord, EncodeRecordRef},
    enums::Schema,
    record::{
        ErrorMsg, ImbalanceMsg, InstrumentDefMsg, MboMsg, Mbp10Msg, Mbp1Msg, OhlcvMsg, StatMsg,
        StatusMsg, SymbolMappingMsg, SystemMsg, TradeMsg,
    },
    record_enum::RecordRefEnum,
    record_ref::RecordRef,
    Error, Result,
};

/// Type for encoding files and streams of DBN records in CSV.
///
/// Note that encoding [`Metadata`](crate::Metadata) in CSV is not supported.
pub struct Encoder<W>
where
    W: io::Write,
{
    writer: csv::Writer<W>,
    use_pretty_px: bool,
    use_pretty_ts: bool,
}

impl<W> Encoder<W>
where
    W: io::Write,
{
    /// Creates a new [`Encoder`] that will write to `writer`. If `use_pretty_px` is
    /// `true`, price fields are serialized as decimal strings, with the null
    /// sentinel rendered as an empty field. If `use_pretty_ts` is `true`, timestamp
    /// fields are serialized as ISO 8601 datetime strings.
    pub fn new(writer: W, use_pretty_px: bool, use_pretty_ts: bool) -> Self {
        let csv_writer = csv::WriterBuilder::new()
            // the header is written separately with untyped field names
            .has_headers(false)
            .from_writer(writer);
        Self {
            writer: csv_writer,
            use_pretty_px,
            use_pretty_ts,
        }
    }

    /// Encodes the header row for records of type `R`.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer.
    pub fn encode_header<R: DbnEncodable>(&mut self) -> Result<()> {
        R::serialize_header(&mut self.writer).map_err(csv_err)?;
        // end of line
        self.writer.write_record(None::<&[u8]>).map_err(csv_err)?;
        Ok(())
    }

    /// Encodes the header row for the record type of `schema`.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer.
    pub fn encode_header_for_schema(&mut self, schema: Schema) -> Result<()> {
        match schema {
            Schema::Mbo => self.encode_header::<MboMsg>(),
            Schema::Mbp1 | Schema::Tbbo => self.encode_header::<Mbp1Msg>(),
            Schema::Mbp10 => self.encode_header::<Mbp10Msg>(),
            Schema::Trades => self.encode_header::<TradeMsg>(),
            Schema::Ohlcv1S | Schema::Ohlcv1M | Schema::Ohlcv1H | Schema::Ohlcv1D => {
                self.encode_header::<OhlcvMsg>()
            }
            Schema::Definition => self.encode_header::<InstrumentDefMsg>(),
            Schema::Statistics => self.encode_header::<StatMsg>(),
            Schema::Status => self.encode_header::<StatusMsg>(),
            Schema::Imbalance => self.encode_header::<ImbalanceMsg>(),
        }
    }

    /// Encodes the header row for records of type `R` with a trailing `symbol`
    /// column.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer.
    pub fn encode_header_with_sym<R: DbnEncodable>(&mut self) -> Result<()> {
        R::serialize_header(&mut self.writer).map_err(csv_err)?;
        self.writer.write_field("symbol").map_err(csv_err)?;
        self.writer.write_record(None::<&[u8]>).map_err(csv_err)?;
        Ok(())
    }

    /// Encodes the header row for the record type of `schema` with a trailing
    /// `symbol` column.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer.
    pub fn encode_header_for_schema_with_sym(&mut self, schema: Schema) -> Result<()> {
        match schema {
            Schema::Mbo => self.encode_header_with_sym::<MboMsg>(),
            Schema::Mbp1 | Schema::Tbbo => self.encode_header_with_sym::<Mbp1Msg>(),
            Schema::Mbp10 => self.encode_header_with_sym::<Mbp10Msg>(),
            Schema::Trades => self.encode_header_with_sym::<TradeMsg>(),
            Schema::Ohlcv1S | Schema::Ohlcv1M | Schema::Ohlcv1H | Schema::Ohlcv1D => {
                self.encode_header_with_sym::<OhlcvMsg>()
            }
            Schema::Definition => self.encode_header_with_sym::<InstrumentDefMsg>(),
            Schema::Statistics => self.encode_header_with_sym::<StatMsg>(),
            Schema::Status => self.encode_header_with_sym::<StatusMsg>(),
            Schema::Imbalance => self.encode_header_with_sym::<ImbalanceMsg>(),
        }
    }

    /// Encodes a single record with a trailing symbol column.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer or there's a serialization error.
    pub fn encode_record_with_sym<R: DbnEncodable>(
        &mut self,
        record: &R,
        symbol: Option<&str>,
    ) -> Result<()> {
        self.serialize_fields(record)
            .and_then(|()| self.writer.write_field(symbol.unwrap_or_default()))
            .and_then(|()| self.writer.write_record(None::<&[u8]>))
            .map_err(|e| Error::encode(format!("failed to serialize {record:?}: {e}")))
    }

    /// Encodes a single record of dynamic type with a trailing symbol column.
    ///
    /// # Errors
    /// This function returns an error if it's unable to write to the underlying
    /// writer, there's a serialization error, or the record is of an unknown type.
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

    fn serialize_fields<R: DbnEncodable>(&mut self, record: &R) -> csv::Result<()> {
        match (self.use_pretty_px, self.use_pretty_ts) {
            (true, true) => record.serialize_to::<W, true, true>(&mut self.writer),
            (true, false) => record.serialize_to::<W, true, false>(&mut self.writer),
            (false, true) => record.serialize_to::<W, false, true>(&mut self.writer),
            (false, false) => record.serialize_to::<W, false, false>(&mut self.writer),
        }
    }

    fn serialize_record<R: DbnEncodable>(&mut self, record: &R) -> csv::Result<()> {
        self.serialize_fields(record)?;
        // end of line
        self.writer.write_record(None::<&[u8]>)
    }
}

fn csv_err(e: csv::Error) -> Error {
    match e.into_kind() {
        csv::ErrorKind::Io(err) => Error::io(err, "writing CSV"),
        e => Error::encode(format!("CSV serialization error: {e:?}")),
    }
}

impl<W> EncodeRecord for Encoder<W>
where
    W: io::Write,
{
    fn encode_record<R: DbnEncodable>(&mut self, record: &R) -> Result<()> {
        self.serialize_record(record)
            .map_err(|e| Error::encode(format!("failed to serialize {record:?}: {e}")))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::io(e, "flushing CSV"))
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

impl<W> EncodeDbn for Encoder<W>
where
    W: io::Write,
{
    /// Encodes DBN records directly from a DBN decoder. The CSV encoder has the
    /// additional constraint of only being able to encode a single schema in a
    /// stream.
    ///
    /// # Errors
    /// This function returns an error if the decoded stream has no schema, i.e.
    /// contains mixed record types, or if it's unable to write to the underlying
    /// writer.
    fn encode_decoded<D: DecodeRecordRef + DbnMetadata>(&mut self, mut decoder: D) -> Result<()> {
        let Some(schema) = decoder.metadata().schema else {
            return Err(Error::encode("can't encode a mixed DBN stream in CSV"));
        };
        self.encode_header_for_schema(schema)?;
        while let Some(record) = decoder.decode_record_ref()? {
            self.encode_record_ref(record)?;
        }
        self.flush()
    }
}

pub(crate) mod serialize {
    use std::{io, os::raw::c_char};

    use csv::Writer;

    use crate::{
        pretty::{fmt_px, fmt_ts},
        record::{
            c_chars_to_str, BidAskPair, ErrorMsg, ImbalanceMsg, InstrumentDefMsg, MboMsg,
            Mbp10Msg, Mbp1Msg, OhlcvMsg, RecordHeader, StatMsg, StatusMsg, SymbolMappingMsg,
            SystemMsg, TradeMsg,
        },
        UNDEF_PRICE,
    };

    /// Because of the flat nature of CSVs, there are several limitations in the
    /// serde CSV serialization. This trait works around them with hand-written
    /// serialization per record type.
    pub trait CsvSerialize {
        /// Encodes the header fields to `csv_writer`.
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()>;

        /// Serializes the object to `csv_writer`.
        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()>;
    }

    fn write_px_field<W: io::Write, const PRETTY_PX: bool>(
        csv_writer: &mut Writer<W>,
        px: i64,
    ) -> csv::Result<()> {
        if PRETTY_PX {
            if px == UNDEF_PRICE {
                csv_writer.write_field("")
            } else {
                csv_writer.write_field(fmt_px(px))
            }
        } else {
            csv_writer.write_field(itoa::Buffer::new().format(px))
        }
    }

    fn write_ts_field<W: io::Write, const PRETTY_TS: bool>(
        csv_writer: &mut Writer<W>,
        ts: u64,
    ) -> csv::Result<()> {
        if PRETTY_TS {
            // renders the null sentinel as an empty field
            csv_writer.write_field(fmt_ts(ts))
        } else {
            csv_writer.write_field(itoa::Buffer::new().format(ts))
        }
    }

    fn write_c_char_field<W: io::Write>(
        csv_writer: &mut Writer<W>,
        c: c_char,
    ) -> csv::Result<()> {
        if c == 0 {
            csv_writer.write_field("")
        } else {
            csv_writer.write_field((c as u8 as char).to_string())
        }
    }

    fn write_c_chars_field<W: io::Write, const N: usize>(
        csv_writer: &mut Writer<W>,
        chars: &[c_char; N],
    ) -> csv::Result<()> {
        csv_writer.write_field(c_chars_to_str(chars).unwrap_or_default())
    }

    fn write_ba_pair<W: io::Write, const PRETTY_PX: bool>(
        csv_writer: &mut Writer<W>,
        level: &BidAskPair,
    ) -> csv::Result<()> {
        write_px_field::<W, PRETTY_PX>(csv_writer, level.bid_px)?;
        write_px_field::<W, PRETTY_PX>(csv_writer, level.ask_px)?;
        csv_writer.write_field(level.bid_sz.to_string())?;
        csv_writer.write_field(level.ask_sz.to_string())?;
        csv_writer.write_field(level.bid_ct.to_string())?;
        csv_writer.write_field(level.ask_ct.to_string())
    }

    impl CsvSerialize for RecordHeader {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            ["rtype", "publisher_id", "instrument_id", "ts_event"]
                .iter()
                .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            csv_writer.write_field(self.rtype.to_string())?;
            csv_writer.write_field(self.publisher_id.to_string())?;
            csv_writer.write_field(self.instrument_id.to_string())?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_event)
        }
    }

    impl CsvSerialize for MboMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "order_id",
                "price",
                "size",
                "flags",
                "channel_id",
                "action",
                "side",
                "ts_recv",
                "ts_in_delta",
                "sequence",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            csv_writer.write_field(self.order_id.to_string())?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.price)?;
            csv_writer.write_field(self.size.to_string())?;
            csv_writer.write_field(self.flags.to_string())?;
            csv_writer.write_field(self.channel_id.to_string())?;
            write_c_char_field(csv_writer, self.action)?;
            write_c_char_field(csv_writer, self.side)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_recv)?;
            csv_writer.write_field(self.ts_in_delta.to_string())?;
            csv_writer.write_field(self.sequence.to_string())
        }
    }

    impl CsvSerialize for TradeMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "price",
                "size",
                "action",
                "side",
                "flags",
                "depth",
                "ts_recv",
                "ts_in_delta",
                "sequence",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.price)?;
            csv_writer.write_field(self.size.to_string())?;
            write_c_char_field(csv_writer, self.action)?;
            write_c_char_field(csv_writer, self.side)?;
            csv_writer.write_field(self.flags.to_string())?;
            csv_writer.write_field(self.depth.to_string())?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_recv)?;
            csv_writer.write_field(self.ts_in_delta.to_string())?;
            csv_writer.write_field(self.sequence.to_string())
        }
    }

    fn serialize_mbp_body<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
        csv_writer: &mut Writer<W>,
        hd: &RecordHeader,
        price: i64,
        size: u32,
        action: c_char,
        side: c_char,
        flags: u8,
        depth: u8,
        ts_recv: u64,
        ts_in_delta: i32,
        sequence: u32,
        levels: &[BidAskPair],
    ) -> csv::Result<()> {
        hd.serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
        write_px_field::<W, PRETTY_PX>(csv_writer, price)?;
        csv_writer.write_field(size.to_string())?;
        write_c_char_field(csv_writer, action)?;
        write_c_char_field(csv_writer, side)?;
        csv_writer.write_field(flags.to_string())?;
        csv_writer.write_field(depth.to_string())?;
        write_ts_field::<W, PRETTY_TS>(csv_writer, ts_recv)?;
        csv_writer.write_field(ts_in_delta.to_string())?;
        csv_writer.write_field(sequence.to_string())?;
        for level in levels {
            write_ba_pair::<W, PRETTY_PX>(csv_writer, level)?;
        }
        Ok(())
    }

    fn mbp_headers<W: io::Write>(csv_writer: &mut Writer<W>, levels: usize) -> csv::Result<()> {
        RecordHeader::serialize_header(csv_writer)?;
        [
            "price",
            "size",
            "action",
            "side",
            "flags",
            "depth",
            "ts_recv",
            "ts_in_delta",
            "sequence",
        ]
        .iter()
        .try_for_each(|header| csv_writer.write_field(header))?;
        for level in 0..levels {
            for field in ["bid_px", "ask_px", "bid_sz", "ask_sz", "bid_ct", "ask_ct"] {
                csv_writer.write_field(format!("{field}_{level:02}"))?;
            }
        }
        Ok(())
    }

    impl CsvSerialize for Mbp1Msg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            mbp_headers(csv_writer, 1)
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            serialize_mbp_body::<W, PRETTY_PX, PRETTY_TS>(
                csv_writer,
                &self.hd,
                self.price,
                self.size,
                self.action,
                self.side,
                self.flags,
                self.depth,
                self.ts_recv,
                self.ts_in_delta,
                self.sequence,
                &self.levels,
            )
        }
    }

    impl CsvSerialize for Mbp10Msg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            mbp_headers(csv_writer, 10)
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            serialize_mbp_body::<W, PRETTY_PX, PRETTY_TS>(
                csv_writer,
                &self.hd,
                self.price,
                self.size,
                self.action,
                self.side,
                self.flags,
                self.depth,
                self.ts_recv,
                self.ts_in_delta,
                self.sequence,
                &self.levels,
            )
        }
    }

    impl CsvSerialize for OhlcvMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            ["open", "high", "low", "close", "volume"]
                .iter()
                .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.open)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.high)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.low)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.close)?;
            csv_writer.write_field(self.volume.to_string())
        }
    }

    impl CsvSerialize for StatusMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "ts_recv",
                "action",
                "reason",
                "trading_event",
                "is_trading",
                "is_quoting",
                "is_short_sell_restricted",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_recv)?;
            csv_writer.write_field(self.action.to_string())?;
            csv_writer.write_field(self.reason.to_string())?;
            csv_writer.write_field(self.trading_event.to_string())?;
            write_c_char_field(csv_writer, self.is_trading)?;
            write_c_char_field(csv_writer, self.is_quoting)?;
            write_c_char_field(csv_writer, self.is_short_sell_restricted)
        }
    }

    impl CsvSerialize for InstrumentDefMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "ts_recv",
                "min_price_increment",
                "display_factor",
                "expiration",
                "activation",
                "high_limit_price",
                "low_limit_price",
                "max_price_variation",
                "trading_reference_price",
                "unit_of_measure_qty",
                "min_price_increment_amount",
                "price_ratio",
                "strike_price",
                "inst_attrib_value",
                "underlying_id",
                "raw_instrument_id",
                "market_depth_implied",
                "market_depth",
                "market_segment_id",
                "max_trade_vol",
                "min_lot_size",
                "min_lot_size_block",
                "min_lot_size_round_lot",
                "min_trade_vol",
                "contract_multiplier",
                "decay_quantity",
                "original_contract_size",
                "trading_reference_date",
                "appl_id",
                "maturity_year",
                "decay_start_date",
                "channel_id",
                "currency",
                "settl_currency",
                "secsubtype",
                "raw_symbol",
                "group",
                "exchange",
                "asset",
                "cfi",
                "security_type",
                "unit_of_measure",
                "underlying",
                "strike_price_currency",
                "instrument_class",
                "match_algorithm",
                "md_security_trading_status",
                "main_fraction",
                "price_display_format",
                "settl_price_type",
                "sub_fraction",
                "underlying_product",
                "security_update_action",
                "maturity_month",
                "maturity_day",
                "maturity_week",
                "user_defined_instrument",
                "contract_multiplier_unit",
                "flow_schedule_type",
                "tick_rule",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_recv)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.min_price_increment)?;
            csv_writer.write_field(self.display_factor.to_string())?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.expiration)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.activation)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.high_limit_price)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.low_limit_price)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.max_price_variation)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.trading_reference_price)?;
            csv_writer.write_field(self.unit_of_measure_qty.to_string())?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.min_price_increment_amount)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.price_ratio)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.strike_price)?;
            csv_writer.write_field(self.inst_attrib_value.to_string())?;
            csv_writer.write_field(self.underlying_id.to_string())?;
            csv_writer.write_field(self.raw_instrument_id.to_string())?;
            csv_writer.write_field(self.market_depth_implied.to_string())?;
            csv_writer.write_field(self.market_depth.to_string())?;
            csv_writer.write_field(self.market_segment_id.to_string())?;
            csv_writer.write_field(self.max_trade_vol.to_string())?;
            csv_writer.write_field(self.min_lot_size.to_string())?;
            csv_writer.write_field(self.min_lot_size_block.to_string())?;
            csv_writer.write_field(self.min_lot_size_round_lot.to_string())?;
            csv_writer.write_field(self.min_trade_vol.to_string())?;
            csv_writer.write_field(self.contract_multiplier.to_string())?;
            csv_writer.write_field(self.decay_quantity.to_string())?;
            csv_writer.write_field(self.original_contract_size.to_string())?;
            csv_writer.write_field(self.trading_reference_date.to_string())?;
            csv_writer.write_field(self.appl_id.to_string())?;
            csv_writer.write_field(self.maturity_year.to_string())?;
            csv_writer.write_field(self.decay_start_date.to_string())?;
            csv_writer.write_field(self.channel_id.to_string())?;
            write_c_chars_field(csv_writer, &self.currency)?;
            write_c_chars_field(csv_writer, &self.settl_currency)?;
            write_c_chars_field(csv_writer, &self.secsubtype)?;
            write_c_chars_field(csv_writer, &self.raw_symbol)?;
            write_c_chars_field(csv_writer, &self.group)?;
            write_c_chars_field(csv_writer, &self.exchange)?;
            write_c_chars_field(csv_writer, &self.asset)?;
            write_c_chars_field(csv_writer, &self.cfi)?;
            write_c_chars_field(csv_writer, &self.security_type)?;
            write_c_chars_field(csv_writer, &self.unit_of_measure)?;
            write_c_chars_field(csv_writer, &self.underlying)?;
            write_c_chars_field(csv_writer, &self.strike_price_currency)?;
            write_c_char_field(csv_writer, self.instrument_class)?;
            write_c_char_field(csv_writer, self.match_algorithm)?;
            csv_writer.write_field(self.md_security_trading_status.to_string())?;
            csv_writer.write_field(self.main_fraction.to_string())?;
            csv_writer.write_field(self.price_display_format.to_string())?;
            csv_writer.write_field(self.settl_price_type.to_string())?;
            csv_writer.write_field(self.sub_fraction.to_string())?;
            csv_writer.write_field(self.underlying_product.to_string())?;
            write_c_char_field(csv_writer, self.security_update_action)?;
            csv_writer.write_field(self.maturity_month.to_string())?;
            csv_writer.write_field(self.maturity_day.to_string())?;
            csv_writer.write_field(self.maturity_week.to_string())?;
            write_c_char_field(csv_writer, self.user_defined_instrument)?;
            csv_writer.write_field(self.contract_multiplier_unit.to_string())?;
            csv_writer.write_field(self.flow_schedule_type.to_string())?;
            csv_writer.write_field(self.tick_rule.to_string())
        }
    }

    impl CsvSerialize for ImbalanceMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "ts_recv",
                "ref_price",
                "auction_time",
                "cont_book_clr_price",
                "auct_interest_clr_price",
                "ssr_filling_price",
                "ind_match_price",
                "upper_collar",
                "lower_collar",
                "paired_qty",
                "total_imbalance_qty",
                "market_imbalance_qty",
                "unpaired_qty",
                "auction_type",
                "side",
                "auction_status",
                "freeze_status",
                "num_extensions",
                "unpaired_side",
                "significant_imbalance",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_recv)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.ref_price)?;
            csv_writer.write_field(self.auction_time.to_string())?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.cont_book_clr_price)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.auct_interest_clr_price)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.ssr_filling_price)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.ind_match_price)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.upper_collar)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.lower_collar)?;
            csv_writer.write_field(self.paired_qty.to_string())?;
            csv_writer.write_field(self.total_imbalance_qty.to_string())?;
            csv_writer.write_field(self.market_imbalance_qty.to_string())?;
            csv_writer.write_field(self.unpaired_qty.to_string())?;
            write_c_char_field(csv_writer, self.auction_type)?;
            write_c_char_field(csv_writer, self.side)?;
            csv_writer.write_field(self.auction_status.to_string())?;
            csv_writer.write_field(self.freeze_status.to_string())?;
            csv_writer.write_field(self.num_extensions.to_string())?;
            write_c_char_field(csv_writer, self.unpaired_side)?;
            write_c_char_field(csv_writer, self.significant_imbalance)
        }
    }

    impl CsvSerialize for StatMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "ts_recv",
                "ts_ref",
                "price",
                "quantity",
                "sequence",
                "ts_in_delta",
                "stat_type",
                "channel_id",
                "update_action",
                "stat_flags",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_recv)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.ts_ref)?;
            write_px_field::<W, PRETTY_PX>(csv_writer, self.price)?;
            csv_writer.write_field(self.quantity.to_string())?;
            csv_writer.write_field(self.sequence.to_string())?;
            csv_writer.write_field(self.ts_in_delta.to_string())?;
            csv_writer.write_field(self.stat_type.to_string())?;
            csv_writer.write_field(self.channel_id.to_string())?;
            csv_writer.write_field(self.update_action.to_string())?;
            csv_writer.write_field(self.stat_flags.to_string())
        }
    }

    impl CsvSerialize for ErrorMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            ["err", "code", "is_last"]
                .iter()
                .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_c_chars_field(csv_writer, &self.err)?;
            csv_writer.write_field(self.code.to_string())?;
            csv_writer.write_field(self.is_last.to_string())
        }
    }

    impl CsvSerialize for SymbolMappingMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            [
                "stype_in",
                "stype_in_symbol",
                "stype_out",
                "stype_out_symbol",
                "start_ts",
                "end_ts",
            ]
            .iter()
            .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            csv_writer.write_field(self.stype_in.to_string())?;
            write_c_chars_field(csv_writer, &self.stype_in_symbol)?;
            csv_writer.write_field(self.stype_out.to_string())?;
            write_c_chars_field(csv_writer, &self.stype_out_symbol)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.start_ts)?;
            write_ts_field::<W, PRETTY_TS>(csv_writer, self.end_ts)
        }
    }

    impl CsvSerialize for SystemMsg {
        fn serialize_header<W: io::Write>(csv_writer: &mut Writer<W>) -> csv::Result<()> {
            RecordHeader::serialize_header(csv_writer)?;
            ["msg", "code"]
                .iter()
                .try_for_each(|header| csv_writer.write_field(header))
        }

        fn serialize_to<W: io::Write, const PRETTY_PX: bool, const PRETTY_TS: bool>(
            &self,
            csv_writer: &mut Writer<W>,
        ) -> csv::Result<()> {
            self.hd
                .serialize_to::<W, PRETTY_PX, PRETTY_TS>(csv_writer)?;
            write_c_chars_field(csv_writer, &self.msg)?;
            csv_writer.write_field(self.code.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BidAskPair, RecordHeader};

    fn encode_to_string<R: DbnEncodable>(
        rec: &R,
        use_pretty_px: bool,
        use_pretty_ts: bool,
    ) -> String {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, use_pretty_px, use_pretty_ts);
        encoder.encode_header::<R>().unwrap();
        encoder.encode_record(rec).unwrap();
        encoder.flush().unwrap();
        drop(encoder);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn trade_row() {
        let rec = TradeMsg {
            hd: RecordHeader::new::<TradeMsg>(crate::rtype::MBP_0, 1, 42, 1_700_000_000_000_000_000),
            price: 5_500_250_000_000,
            size: 2,
            action: b'T' as std::os::raw::c_char,
            side: b'B' as std::os::raw::c_char,
            flags: 128,
            depth: 0,
            ts_recv: 1_700_000_000_000_000_100,
            ts_in_delta: 100,
            sequence: 7,
        };
        let res = encode_to_string(&rec, false, false);
        let mut lines = res.lines();
        assert_eq!(
            lines.next().unwrap(),
            "rtype,publisher_id,instrument_id,ts_event,price,size,action,side,flags,depth,ts_recv,ts_in_delta,sequence"
        );
        assert_eq!(
            lines.next().unwrap(),
            "0,1,42,1700000000000000000,5500250000000,2,T,B,128,0,1700000000000000100,100,7"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn pretty_px_renders_decimal_and_empty_null() {
        let rec = OhlcvMsg {
            hd: RecordHeader::new::<OhlcvMsg>(crate::rtype::OHLCV_1D, 1, 42, 0),
            open: 372_275_000_000_000,
            high: crate::UNDEF_PRICE,
            low: 1,
            close: -1_000_000_000,
            volume: 9,
        };
        let res = encode_to_string(&rec, true, false);
        let row = res.lines().nth(1).unwrap();
        assert_eq!(row, "35,1,42,0,372275.000000000,,0.000000001,-1.000000000,9");
    }

    #[test]
    fn mbp1_header_includes_level_fields() {
        let rec = Mbp1Msg {
            levels: [BidAskPair::default(); 1],
            ..Default::default()
        };
        let res = encode_to_string(&rec, false, false);
        let header = res.lines().next().unwrap();
        assert!(header.ends_with(
            "sequence,bid_px_00,ask_px_00,bid_sz_00,ask_sz_00,bid_ct_00,ask_ct_00"
        ));
    }
}
