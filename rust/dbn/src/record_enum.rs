//! Owned and borrowed sum types over every record type, for `match`ing where
//! [`RecordRef`]'s generic accessors are awkward.

use crate::{
    record::{
        ErrorMsg, HasRType, ImbalanceMsg, InstrumentDefMsg, MboMsg, Mbp10Msg, Mbp1Msg, OhlcvMsg,
        Record, RecordHeader, RecordMut, StatMsg, StatusMsg, SymbolMappingMsg, SystemMsg,
        TradeMsg,
    },
    Error, RType, RecordRef,
};

/// An owned DBN record of flexible type.
#[derive(Debug, Clone)]
pub enum RecordEnum {
    /// A market-by-order message.
    Mbo(MboMsg),
    /// A trade message.
    Trade(TradeMsg),
    /// A market-by-price message with a book depth of 1.
    Mbp1(Mbp1Msg),
    /// A market-by-price message with a book depth of 10.
    Mbp10(Mbp10Msg),
    /// An open, high, low, close, and volume message.
    Ohlcv(OhlcvMsg),
    /// A trading status message.
    Status(StatusMsg),
    /// An instrument definition message.
    InstrumentDef(InstrumentDefMsg),
    /// An auction imbalance message.
    Imbalance(ImbalanceMsg),
    /// A publisher statistic message.
    Stat(StatMsg),
    /// An error message from the live gateway.
    Error(ErrorMsg),
    /// A symbol mapping message.
    SymbolMapping(SymbolMappingMsg),
    /// A non-error message from the live gateway.
    System(SystemMsg),
}

/// An immutable reference to a DBN record of flexible type. Unlike [`RecordRef`],
/// this type allows `match`ing.
#[derive(Debug, Copy, Clone)]
pub enum RecordRefEnum<'a> {
    /// A reference to a market-by-order message.
    Mbo(&'a MboMsg),
    /// A reference to a trade message.
    Trade(&'a TradeMsg),
    /// A reference to a market-by-price message with a book depth of 1.
    Mbp1(&'a Mbp1Msg),
    /// A reference to a market-by-price message with a book depth of 10.
    Mbp10(&'a Mbp10Msg),
    /// A reference to an open, high, low, close, and volume message.
    Ohlcv(&'a OhlcvMsg),
    /// A reference to a trading status message.
    Status(&'a StatusMsg),
    /// A reference to an instrument definition message.
    InstrumentDef(&'a InstrumentDefMsg),
    /// A reference to an auction imbalance message.
    Imbalance(&'a ImbalanceMsg),
    /// A reference to a publisher statistic message.
    Stat(&'a StatMsg),
    /// A reference to an error message from the live gateway.
    Error(&'a ErrorMsg),
    /// A reference to a symbol mapping message.
    SymbolMapping(&'a SymbolMappingMsg),
    /// A reference to a non-error message from the live gateway.
    System(&'a SystemMsg),
}

impl<'a> From<&'a RecordEnum> for RecordRefEnum<'a> {
    fn from(rec_enum: &'a RecordEnum) -> Self {
        match rec_enum {
            RecordEnum::Mbo(rec) => Self::Mbo(rec),
            RecordEnum::Trade(rec) => Self::Trade(rec),
            RecordEnum::Mbp1(rec) => Self::Mbp1(rec),
            RecordEnum::Mbp10(rec) => Self::Mbp10(rec),
            RecordEnum::Ohlcv(rec) => Self::Ohlcv(rec),
            RecordEnum::Status(rec) => Self::Status(rec),
            RecordEnum::InstrumentDef(rec) => Self::InstrumentDef(rec),
            RecordEnum::Imbalance(rec) => Self::Imbalance(rec),
            RecordEnum::Stat(rec) => Self::Stat(rec),
            RecordEnum::Error(rec) => Self::Error(rec),
            RecordEnum::SymbolMapping(rec) => Self::SymbolMapping(rec),
            RecordEnum::System(rec) => Self::System(rec),
        }
    }
}

impl RecordRefEnum<'_> {
    /// Converts the reference enum into an owned enum value.
    pub fn to_owned(&self) -> RecordEnum {
        match self {
            Self::Mbo(rec) => RecordEnum::Mbo(**rec),
            Self::Trade(rec) => RecordEnum::Trade(**rec),
            Self::Mbp1(rec) => RecordEnum::Mbp1(**rec),
            Self::Mbp10(rec) => RecordEnum::Mbp10(**rec),
            Self::Ohlcv(rec) => RecordEnum::Ohlcv(**rec),
            Self::Status(rec) => RecordEnum::Status(**rec),
            Self::InstrumentDef(rec) => RecordEnum::InstrumentDef(**rec),
            Self::Imbalance(rec) => RecordEnum::Imbalance(**rec),
            Self::Stat(rec) => RecordEnum::Stat(**rec),
            Self::Error(rec) => RecordEnum::Error(**rec),
            Self::SymbolMapping(rec) => RecordEnum::SymbolMapping(**rec),
            Self::System(rec) => RecordEnum::System(**rec),
        }
    }
}

impl<'a> TryFrom<RecordRef<'a>> for RecordRefEnum<'a> {
    type Error = Error;

    fn try_from(rec_ref: RecordRef<'a>) -> Result<Self, Error> {
        Ok(unsafe {
            match rec_ref.header().rtype()? {
                RType::Mbo => RecordRefEnum::Mbo(rec_ref.get_unchecked()),
                RType::Mbp0 => RecordRefEnum::Trade(rec_ref.get_unchecked()),
                RType::Mbp1 => RecordRefEnum::Mbp1(rec_ref.get_unchecked()),
                RType::Mbp10 => RecordRefEnum::Mbp10(rec_ref.get_unchecked()),
                RType::Ohlcv1S | RType::Ohlcv1M | RType::Ohlcv1H | RType::Ohlcv1D => {
                    RecordRefEnum::Ohlcv(rec_ref.get_unchecked())
                }
                RType::Status => RecordRefEnum::Status(rec_ref.get_unchecked()),
                RType::InstrumentDef => RecordRefEnum::InstrumentDef(rec_ref.get_unchecked()),
                RType::Imbalance => RecordRefEnum::Imbalance(rec_ref.get_unchecked()),
                RType::Statistics => RecordRefEnum::Stat(rec_ref.get_unchecked()),
                RType::Error => RecordRefEnum::Error(rec_ref.get_unchecked()),
                RType::SymbolMapping => RecordRefEnum::SymbolMapping(rec_ref.get_unchecked()),
                RType::System => RecordRefEnum::System(rec_ref.get_unchecked()),
            }
        })
    }
}

macro_rules! with_inner {
    ($self:ident, $rec:ident => $expr:expr) => {
        match $self {
            Self::Mbo($rec) => $expr,
            Self::Trade($rec) => $expr,
            Self::Mbp1($rec) => $expr,
            Self::Mbp10($rec) => $expr,
            Self::Ohlcv($rec) => $expr,
            Self::Status($rec) => $expr,
            Self::InstrumentDef($rec) => $expr,
            Self::Imbalance($rec) => $expr,
            Self::Stat($rec) => $expr,
            Self::Error($rec) => $expr,
            Self::SymbolMapping($rec) => $expr,
            Self::System($rec) => $expr,
        }
    };
}

impl AsRef<[u8]> for RecordEnum {
    fn as_ref(&self) -> &[u8] {
        with_inner!(self, rec => rec.as_ref())
    }
}

impl Record for RecordEnum {
    fn header(&self) -> &RecordHeader {
        with_inner!(self, rec => rec.header())
    }

    fn raw_index_ts(&self) -> u64 {
        with_inner!(self, rec => rec.raw_index_ts())
    }
}

impl RecordMut for RecordEnum {
    fn header_mut(&mut self) -> &mut RecordHeader {
        with_inner!(self, rec => rec.header_mut())
    }
}

impl AsRef<[u8]> for RecordRefEnum<'_> {
    fn as_ref(&self) -> &[u8] {
        with_inner!(self, rec => (*rec).as_ref())
    }
}

impl Record for RecordRefEnum<'_> {
    fn header(&self) -> &RecordHeader {
        with_inner!(self, rec => rec.header())
    }

    fn raw_index_ts(&self) -> u64 {
        with_inner!(self, rec => rec.raw_index_ts())
    }
}

macro_rules! impl_from_record {
    ($($rec:ident => $variant:ident),+ $(,)?) => {
        $(
            impl From<$rec> for RecordEnum {
                fn from(rec: $rec) -> Self {
                    Self::$variant(rec)
                }
            }

            impl<'a> From<&'a $rec> for RecordRefEnum<'a> {
                fn from(rec: &'a $rec) -> Self {
                    Self::$variant(rec)
                }
            }
        )+
    };
}
impl_from_record! {
    MboMsg => Mbo,
    TradeMsg => Trade,
    Mbp1Msg => Mbp1,
    Mbp10Msg => Mbp10,
    OhlcvMsg => Ohlcv,
    StatusMsg => Status,
    InstrumentDefMsg => InstrumentDef,
    ImbalanceMsg => Imbalance,
    StatMsg => Stat,
    ErrorMsg => Error,
    SymbolMappingMsg => SymbolMapping,
    SystemMsg => System,
}

impl<'a> From<&'a RecordEnum> for RecordRef<'a> {
    fn from(rec_enum: &'a RecordEnum) -> Self {
        match RecordRefEnum::from(rec_enum) {
            RecordRefEnum::Mbo(rec) => Self::from(rec),
            RecordRefEnum::Trade(rec) => Self::from(rec),
            RecordRefEnum::Mbp1(rec) => Self::from(rec),
            RecordRefEnum::Mbp10(rec) => Self::from(rec),
            RecordRefEnum::Ohlcv(rec) => Self::from(rec),
            RecordRefEnum::Status(rec) => Self::from(rec),
            RecordRefEnum::InstrumentDef(rec) => Self::from(rec),
            RecordRefEnum::Imbalance(rec) => Self::from(rec),
            RecordRefEnum::Stat(rec) => Self::from(rec),
            RecordRefEnum::Error(rec) => Self::from(rec),
            RecordRefEnum::SymbolMapping(rec) => Self::from(rec),
            RecordRefEnum::System(rec) => Self::from(rec),
        }
    }
}

impl RecordEnum {
    /// Converts a [`RecordRef`] into an owned record enum.
    ///
    /// # Errors
    /// This function returns an error if `rec_ref` does not reference a known record
    /// type.
    pub fn try_from_ref(rec_ref: RecordRef) -> crate::Result<Self> {
        RecordRefEnum::try_from(rec_ref).map(|r| r.to_owned())
    }

    /// Returns a reference to the inner record if it is of type `T`.
    pub fn get<T: HasRType>(&self) -> Option<&T> {
        RecordRef::from(self).get::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_round_trip() {
        let rec = TradeMsg {
            price: 5,
            ..Default::default()
        };
        let rec_ref = RecordRef::from(&rec);
        let rec_enum = RecordEnum::try_from_ref(rec_ref).unwrap();
        assert!(matches!(rec_enum, RecordEnum::Trade(t) if t.price == 5));
    }

    #[test]
    fn get_typed() {
        let rec_enum = RecordEnum::from(MboMsg::default());
        assert!(rec_enum.get::<MboMsg>().is_some());
        assert!(rec_enum.get::<TradeMsg>().is_none());
    }
}
