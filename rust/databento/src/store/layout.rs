//! Static per-schema field layouts used for the tabular projection: field names,
//! kinds, and byte offsets into the fixed-size records.

use std::{collections::HashMap, mem, sync::OnceLock};

use dbn::{
    BidAskPair, ImbalanceMsg, InstrumentDefMsg, MboMsg, Mbp10Msg, Mbp1Msg, OhlcvMsg, RecordHeader,
    Schema, StatMsg, StatusMsg, TradeMsg,
};

/// The kind of a record field, driving its column representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    /// A fixed-precision price with scale 1e-9.
    Px,
    /// A UNIX nanosecond timestamp.
    Ts,
    /// A single ASCII character.
    Char,
    /// A fixed-width null-padded ASCII string of the contained length.
    Str(usize),
}

/// One field of a record layout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub offset: usize,
}

const fn field(name: &'static str, kind: FieldKind, offset: usize) -> Field {
    Field { name, kind, offset }
}

fn header_fields() -> Vec<Field> {
    vec![
        field("ts_event", FieldKind::Ts, mem::offset_of!(RecordHeader, ts_event)),
        field("rtype", FieldKind::U8, mem::offset_of!(RecordHeader, rtype)),
        field(
            "publisher_id",
            FieldKind::U16,
            mem::offset_of!(RecordHeader, publisher_id),
        ),
        field(
            "instrument_id",
            FieldKind::U32,
            mem::offset_of!(RecordHeader, instrument_id),
        ),
    ]
}

fn mbo_layout() -> Vec<Field> {
    let mut fields = vec![field("ts_recv", FieldKind::Ts, mem::offset_of!(MboMsg, ts_recv))];
    fields.extend(header_fields());
    fields.extend([
        field("order_id", FieldKind::U64, mem::offset_of!(MboMsg, order_id)),
        field("price", FieldKind::Px, mem::offset_of!(MboMsg, price)),
        field("size", FieldKind::U32, mem::offset_of!(MboMsg, size)),
        field("flags", FieldKind::U8, mem::offset_of!(MboMsg, flags)),
        field(
            "channel_id",
            FieldKind::U8,
            mem::offset_of!(MboMsg, channel_id),
        ),
        field("action", FieldKind::Char, mem::offset_of!(MboMsg, action)),
        field("side", FieldKind::Char, mem::offset_of!(MboMsg, side)),
        field(
            "ts_in_delta",
            FieldKind::I32,
            mem::offset_of!(MboMsg, ts_in_delta),
        ),
        field("sequence", FieldKind::U32, mem::offset_of!(MboMsg, sequence)),
    ]);
    fields
}

fn mbp_layout(levels: usize) -> Vec<Field> {
    let mut fields = vec![field(
        "ts_recv",
        FieldKind::Ts,
        mem::offset_of!(TradeMsg, ts_recv),
    )];
    fields.extend(header_fields());
    fields.extend([
        field("price", FieldKind::Px, mem::offset_of!(TradeMsg, price)),
        field("size", FieldKind::U32, mem::offset_of!(TradeMsg, size)),
        field("action", FieldKind::Char, mem::offset_of!(TradeMsg, action)),
        field("side", FieldKind::Char, mem::offset_of!(TradeMsg, side)),
        field("flags", FieldKind::U8, mem::offset_of!(TradeMsg, flags)),
        field("depth", FieldKind::U8, mem::offset_of!(TradeMsg, depth)),
        field(
            "ts_in_delta",
            FieldKind::I32,
            mem::offset_of!(TradeMsg, ts_in_delta),
        ),
        field(
            "sequence",
            FieldKind::U32,
            mem::offset_of!(TradeMsg, sequence),
        ),
    ]);
    if levels > 0 {
        // the level arrays begin at the same offset for both book depths
        debug_assert_eq!(
            mem::offset_of!(Mbp1Msg, levels),
            mem::offset_of!(Mbp10Msg, levels)
        );
        let base = mem::offset_of!(Mbp1Msg, levels);
        let level_names: [(&str, FieldKind, usize); 6] = [
            ("bid_px", FieldKind::Px, mem::offset_of!(BidAskPair, bid_px)),
            ("ask_px", FieldKind::Px, mem::offset_of!(BidAskPair, ask_px)),
            ("bid_sz", FieldKind::U32, mem::offset_of!(BidAskPair, bid_sz)),
            ("ask_sz", FieldKind::U32, mem::offset_of!(BidAskPair, ask_sz)),
            ("bid_ct", FieldKind::U32, mem::offset_of!(BidAskPair, bid_ct)),
            ("ask_ct", FieldKind::U32, mem::offset_of!(BidAskPair, ask_ct)),
        ];
        for level in 0..levels {
            let level_base = base + level * mem::size_of::<BidAskPair>();
            for (name, kind, offset) in level_names {
                fields.push(Field {
                    name: leak_name(format!("{name}_{level:02}")),
                    kind,
                    offset: level_base + offset,
                });
            }
        }
    }
    fields
}

// Level field names are generated once per process and then cached in the layout
// table for the rest of the program's lifetime.
fn leak_name(name: String) -> &'static str {
    Box::leak(name.into_boxed_str())
}

fn ohlcv_layout() -> Vec<Field> {
    let mut fields = header_fields();
    fields.extend([
        field("open", FieldKind::Px, mem::offset_of!(OhlcvMsg, open)),
        field("high", FieldKind::Px, mem::offset_of!(OhlcvMsg, high)),
        field("low", FieldKind::Px, mem::offset_of!(OhlcvMsg, low)),
        field("close", FieldKind::Px, mem::offset_of!(OhlcvMsg, close)),
        field("volume", FieldKind::U64, mem::offset_of!(OhlcvMsg, volume)),
    ]);
    fields
}

fn status_layout() -> Vec<Field> {
    let mut fields = vec![field(
        "ts_recv",
        FieldKind::Ts,
        mem::offset_of!(StatusMsg, ts_recv),
    )];
    fields.extend(header_fields());
    fields.extend([
        field("action", FieldKind::U16, mem::offset_of!(StatusMsg, action)),
        field("reason", FieldKind::U16, mem::offset_of!(StatusMsg, reason)),
        field(
            "trading_event",
            FieldKind::U16,
            mem::offset_of!(StatusMsg, trading_event),
        ),
        field(
            "is_trading",
            FieldKind::Char,
            mem::offset_of!(StatusMsg, is_trading),
        ),
        field(
            "is_quoting",
            FieldKind::Char,
            mem::offset_of!(StatusMsg, is_quoting),
        ),
        field(
            "is_short_sell_restricted",
            FieldKind::Char,
            mem::offset_of!(StatusMsg, is_short_sell_restricted),
        ),
    ]);
    fields
}

fn definition_layout() -> Vec<Field> {
    use FieldKind::*;
    let mut fields = vec![field(
        "ts_recv",
        Ts,
        mem::offset_of!(InstrumentDefMsg, ts_recv),
    )];
    fields.extend(header_fields());
    macro_rules! def_field {
        ($name:ident, $kind:expr) => {
            field(
                stringify!($name),
                $kind,
                mem::offset_of!(InstrumentDefMsg, $name),
            )
        };
    }
    fields.extend([
        def_field!(min_price_increment, Px),
        def_field!(display_factor, I64),
        def_field!(expiration, Ts),
        def_field!(activation, Ts),
        def_field!(high_limit_price, Px),
        def_field!(low_limit_price, Px),
        def_field!(max_price_variation, Px),
        def_field!(trading_reference_price, Px),
        def_field!(unit_of_measure_qty, I64),
        def_field!(min_price_increment_amount, Px),
        def_field!(price_ratio, Px),
        def_field!(strike_price, Px),
        def_field!(inst_attrib_value, I32),
        def_field!(underlying_id, U32),
        def_field!(raw_instrument_id, U32),
        def_field!(market_depth_implied, I32),
        def_field!(market_depth, I32),
        def_field!(market_segment_id, U32),
        def_field!(max_trade_vol, U32),
        def_field!(min_lot_size, I32),
        def_field!(min_lot_size_block, I32),
        def_field!(min_lot_size_round_lot, I32),
        def_field!(min_trade_vol, U32),
        def_field!(contract_multiplier, I32),
        def_field!(decay_quantity, I32),
        def_field!(original_contract_size, I32),
        def_field!(trading_reference_date, U16),
        def_field!(appl_id, I16),
        def_field!(maturity_year, U16),
        def_field!(decay_start_date, U16),
        def_field!(channel_id, U16),
        def_field!(currency, Str(4)),
        def_field!(settl_currency, Str(4)),
        def_field!(secsubtype, Str(6)),
        def_field!(raw_symbol, Str(dbn::SYMBOL_CSTR_LEN)),
        def_field!(group, Str(21)),
        def_field!(exchange, Str(5)),
        def_field!(asset, Str(7)),
        def_field!(cfi, Str(7)),
        def_field!(security_type, Str(7)),
        def_field!(unit_of_measure, Str(31)),
        def_field!(underlying, Str(21)),
        def_field!(strike_price_currency, Str(4)),
        def_field!(instrument_class, Char),
        def_field!(match_algorithm, Char),
        def_field!(md_security_trading_status, U8),
        def_field!(main_fraction, U8),
        def_field!(price_display_format, U8),
        def_field!(settl_price_type, U8),
        def_field!(sub_fraction, U8),
        def_field!(underlying_product, U8),
        def_field!(security_update_action, Char),
        def_field!(maturity_month, U8),
        def_field!(maturity_day, U8),
        def_field!(maturity_week, U8),
        def_field!(user_defined_instrument, Char),
        def_field!(contract_multiplier_unit, I8),
        def_field!(flow_schedule_type, I8),
        def_field!(tick_rule, U8),
    ]);
    fields
}

fn imbalance_layout() -> Vec<Field> {
    use FieldKind::*;
    let mut fields = vec![field(
        "ts_recv",
        Ts,
        mem::offset_of!(ImbalanceMsg, ts_recv),
    )];
    fields.extend(header_fields());
    macro_rules! imb_field {
        ($name:ident, $kind:expr) => {
            field(
                stringify!($name),
                $kind,
                mem::offset_of!(ImbalanceMsg, $name),
            )
        };
    }
    fields.extend([
        imb_field!(ref_price, Px),
        imb_field!(auction_time, U64),
        imb_field!(cont_book_clr_price, Px),
        imb_field!(auct_interest_clr_price, Px),
        imb_field!(ssr_filling_price, Px),
        imb_field!(ind_match_price, Px),
        imb_field!(upper_collar, Px),
        imb_field!(lower_collar, Px),
        imb_field!(paired_qty, U32),
        imb_field!(total_imbalance_qty, U32),
        imb_field!(market_imbalance_qty, U32),
        imb_field!(unpaired_qty, U32),
        imb_field!(auction_type, Char),
        imb_field!(side, Char),
        imb_field!(auction_status, U8),
        imb_field!(freeze_status, U8),
        imb_field!(num_extensions, U8),
        imb_field!(unpaired_side, Char),
        imb_field!(significant_imbalance, Char),
    ]);
    fields
}

fn statistics_layout() -> Vec<Field> {
    use FieldKind::*;
    let mut fields = vec![field("ts_recv", Ts, mem::offset_of!(StatMsg, ts_recv))];
    fields.extend(header_fields());
    macro_rules! stat_field {
        ($name:ident, $kind:expr) => {
            field(stringify!($name), $kind, mem::offset_of!(StatMsg, $name))
        };
    }
    fields.extend([
        stat_field!(ts_ref, Ts),
        stat_field!(price, Px),
        stat_field!(quantity, I32),
        stat_field!(sequence, U32),
        stat_field!(ts_in_delta, I32),
        stat_field!(stat_type, U16),
        stat_field!(channel_id, U16),
        stat_field!(update_action, U8),
        stat_field!(stat_flags, U8),
    ]);
    fields
}

/// Returns the static layout for `schema`: the index timestamp first, followed by
/// the header and body fields.
pub(crate) fn schema_layout(schema: Schema) -> &'static [Field] {
    static LAYOUTS: OnceLock<HashMap<Schema, Vec<Field>>> = OnceLock::new();
    let layouts = LAYOUTS.get_or_init(|| {
        let mut res = HashMap::new();
        res.insert(Schema::Mbo, mbo_layout());
        res.insert(Schema::Trades, mbp_layout(0));
        res.insert(Schema::Tbbo, mbp_layout(1));
        res.insert(Schema::Mbp1, mbp_layout(1));
        res.insert(Schema::Mbp10, mbp_layout(10));
        for ohlcv in [
            Schema::Ohlcv1S,
            Schema::Ohlcv1M,
            Schema::Ohlcv1H,
            Schema::Ohlcv1D,
        ] {
            res.insert(ohlcv, ohlcv_layout());
        }
        res.insert(Schema::Status, status_layout());
        res.insert(Schema::Definition, definition_layout());
        res.insert(Schema::Imbalance, imbalance_layout());
        res.insert(Schema::Statistics, statistics_layout());
        res
    });
    layouts[&schema].as_slice()
}

/// Returns the fixed record size for `schema`.
pub(crate) fn schema_record_size(schema: Schema) -> usize {
    match schema {
        Schema::Mbo => mem::size_of::<MboMsg>(),
        Schema::Trades => mem::size_of::<TradeMsg>(),
        Schema::Mbp1 | Schema::Tbbo => mem::size_of::<Mbp1Msg>(),
        Schema::Mbp10 => mem::size_of::<Mbp10Msg>(),
        Schema::Ohlcv1S | Schema::Ohlcv1M | Schema::Ohlcv1H | Schema::Ohlcv1D => {
            mem::size_of::<OhlcvMsg>()
        }
        Schema::Status => mem::size_of::<StatusMsg>(),
        Schema::Definition => mem::size_of::<InstrumentDefMsg>(),
        Schema::Imbalance => mem::size_of::<ImbalanceMsg>(),
        Schema::Statistics => mem::size_of::<StatMsg>(),
    }
}

impl FieldKind {
    /// The size in bytes of the field on the wire.
    pub(crate) fn size(&self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 | FieldKind::Char => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::U64 | FieldKind::I64 | FieldKind::Px | FieldKind::Ts => 8,
            FieldKind::Str(len) => *len,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Schema::Mbo)]
    #[case(Schema::Trades)]
    #[case(Schema::Mbp1)]
    #[case(Schema::Mbp10)]
    #[case(Schema::Ohlcv1D)]
    #[case(Schema::Status)]
    #[case(Schema::Definition)]
    #[case(Schema::Imbalance)]
    #[case(Schema::Statistics)]
    fn fields_fit_in_record(#[case] schema: Schema) {
        let size = schema_record_size(schema);
        for field in schema_layout(schema) {
            assert!(
                field.offset + field.kind.size() <= size,
                "field {} of {schema} exceeds record size",
                field.name
            );
        }
    }

    #[test]
    fn index_column_is_first() {
        assert_eq!(schema_layout(Schema::Mbo)[0].name, "ts_recv");
        assert_eq!(schema_layout(Schema::Ohlcv1S)[0].name, "ts_event");
    }

    #[test]
    fn mbp10_has_all_levels() {
        let layout = schema_layout(Schema::Mbp10);
        assert_eq!(
            layout.iter().filter(|f| f.name.starts_with("bid_px_")).count(),
            10
        );
        assert_eq!(layout.last().unwrap().name, "ask_ct_09");
    }

    #[test]
    fn field_names_are_unique() {
        for schema in [Schema::Mbo, Schema::Mbp10, Schema::Definition] {
            let layout = schema_layout(schema);
            let mut names: Vec<_> = layout.iter().map(|f| f.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), layout.len());
        }
    }
}
