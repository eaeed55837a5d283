//! Encoding DBN records and metadata into DBN, Zstandard-compressed or not.

use std::{io, mem, num::NonZeroU64};

use crate::{
    encode::{DbnEncodable, DynWriter, EncodeDbn, EncodeRecord, EncodeRecordRef},
    enums::Compression,
    record_ref::RecordRef,
    Error, Metadata, Result, SymbolMapping, DBN_VERSION, METADATA_FIXED_LEN, NULL_LIMIT,
    NULL_SCHEMA, NULL_STYPE, UNDEF_TIMESTAMP,
};

const NULL_RECORD_COUNT: u64 = u64::MAX;

/// Type for encoding files and streams in Databento Binary Encoding (DBN).
pub struct Encoder<W>
where
    W: io::Write,
{
    record_encoder: RecordEncoder<W>,
}

impl<W> Encoder<W>
where
    W: io::Write,
{
    /// Creates a new DBN [`Encoder`] that will write to `writer`, first encoding
    /// `metadata`.
    ///
    /// # Errors
    /// This function returns an error if it fails to encode `metadata` to `writer`.
    pub fn new(mut writer: W, metadata: &Metadata) -> Result<Self> {
        MetadataEncoder::new(&mut writer).encode(metadata)?;
        Ok(Self {
            record_encoder: RecordEncoder::new(writer),
        })
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.record_encoder.get_ref()
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        self.record_encoder.get_mut()
    }
}

impl<'a, W> Encoder<DynWriter<'a, W>>
where
    W: io::Write,
{
    /// Creates a new DBN [`Encoder`] that will write to `writer` with the specified
    /// `compression`.
    ///
    /// # Errors
    /// This function returns an error if it fails to initialize the compression or
    /// to encode `metadata`.
    pub fn with_compression(
        writer: W,
        metadata: &Metadata,
        compression: Compression,
    ) -> Result<Self> {
        Self::new(DynWriter::new(writer, compression)?, metadata)
    }
}

impl<W> EncodeRecord for Encoder<W>
where
    W: io::Write,
{
    fn encode_record<R: DbnEncodable>(&mut self, record: &R) -> Result<()> {
        self.record_encoder.encode_record(record)
    }

    fn flush(&mut self) -> Result<()> {
        self.record_encoder.flush()
    }
}

impl<W> EncodeRecordRef for Encoder<W>
where
    W: io::Write,
{
    fn encode_record_ref(&mut self, record: RecordRef) -> Result<()> {
        self.record_encoder.encode_record_ref(record)
    }
}

impl<W> EncodeDbn for Encoder<W> where W: io::Write {}

/// Type for encoding DBN records, without the metadata header.
pub struct RecordEncoder<W>
where
    W: io::Write,
{
    writer: W,
}

impl<W> RecordEncoder<W>
where
    W: io::Write,
{
    /// Creates a new DBN [`RecordEncoder`] that will write to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encodes a single record with its send timestamp trailer.
    ///
    /// # Errors
    /// This function returns an error if it fails to write to the underlying writer.
    pub fn encode_record_with_ts_out<R: crate::record::HasRType + AsRef<[u8]>>(
        &mut self,
        record: &R,
        ts_out: u64,
    ) -> Result<()> {
        match self
            .writer
            .write_all(record.as_ref())
            .and_then(|()| self.writer.write_all(&ts_out.to_le_bytes()))
        {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::io(e, "serializing record with ts_out")),
        }
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W> EncodeRecord for RecordEncoder<W>
where
    W: io::Write,
{
    fn encode_record<R: DbnEncodable>(&mut self, record: &R) -> Result<()> {
        match self.writer.write_all(record.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::io(e, format!("serializing {record:?}"))),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::io(e, "flushing output"))
    }
}

impl<W> EncodeRecordRef for RecordEncoder<W>
where
    W: io::Write,
{
    fn encode_record_ref(&mut self, record: RecordRef) -> Result<()> {
        match self.writer.write_all(record.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) => Err(Error::io(e, "serializing record reference")),
        }
    }
}

impl<W> EncodeDbn for RecordEncoder<W> where W: io::Write {}

/// Type for encoding [`Metadata`] into Databento Binary Encoding (DBN).
pub struct MetadataEncoder<W>
where
    W: io::Write,
{
    writer: W,
}

impl<W> MetadataEncoder<W>
where
    W: io::Write,
{
    /// Creates a new [`MetadataEncoder`] that will write to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Encodes `metadata` into DBN.
    ///
    /// # Errors
    /// This function returns an error if it fails to write to the underlying writer
    /// or `metadata` is from a newer DBN version than is supported.
    pub fn encode(&mut self, metadata: &Metadata) -> Result<()> {
        let metadata_err = |e| Error::io(e, "writing DBN metadata");
        if metadata.version == 0 || metadata.version > DBN_VERSION {
            return Err(Error::encode(format!(
                "can't encode metadata with version {} which is greater than the maximum supported version {DBN_VERSION}",
                metadata.version
            )));
        }
        self.writer.write_all(b"DBN").map_err(metadata_err)?;
        self.writer
            .write_all(&[metadata.version])
            .map_err(metadata_err)?;
        let length = Self::calc_length(metadata);
        self.writer
            .write_all(length.to_le_bytes().as_slice())
            .map_err(metadata_err)?;
        self.encode_fixed_len_cstr(crate::METADATA_DATASET_CSTR_LEN, &metadata.dataset)?;
        self.writer
            .write_all(
                metadata
                    .schema
                    .map(|s| s as u16)
                    .unwrap_or(NULL_SCHEMA)
                    .to_le_bytes()
                    .as_slice(),
            )
            .map_err(metadata_err)?;
        self.encode_range_and_counts(
            metadata.version,
            metadata.start,
            metadata.end,
            metadata.limit,
        )?;
        self.writer
            .write_all(&[
                metadata.stype_in.map(|s| s as u8).unwrap_or(NULL_STYPE),
                metadata.stype_out as u8,
                metadata.ts_out as u8,
            ])
            .map_err(metadata_err)?;
        if metadata.version > 1 {
            self.writer
                .write_all(&(metadata.symbol_cstr_len as u16).to_le_bytes())
                .map_err(metadata_err)?;
        }
        // padding
        self.writer
            .write_all(if metadata.version == 1 {
                &[0; crate::compat::METADATA_RESERVED_LEN_V1]
            } else {
                &[0; crate::METADATA_RESERVED_LEN]
            })
            .map_err(metadata_err)?;
        // schema_definition_length
        self.writer
            .write_all(0u32.to_le_bytes().as_slice())
            .map_err(metadata_err)?;
        self.encode_repeated_symbol_cstr(metadata.symbol_cstr_len, metadata.symbols.as_slice())?;
        self.encode_repeated_symbol_cstr(metadata.symbol_cstr_len, metadata.partial.as_slice())?;
        self.encode_repeated_symbol_cstr(metadata.symbol_cstr_len, metadata.not_found.as_slice())?;
        self.encode_symbol_mappings(metadata.symbol_cstr_len, metadata.mappings.as_slice())?;

        Ok(())
    }

    fn calc_length(metadata: &Metadata) -> u32 {
        let mapping_interval_len = mem::size_of::<u32>() * 2 + metadata.symbol_cstr_len;
        // schema_definition_length, symbols_count, partial_count, not_found_count,
        // mappings_count
        let var_len_counts_size = mem::size_of::<u32>() * 5;

        let c_str_count =
            metadata.symbols.len() + metadata.partial.len() + metadata.not_found.len();
        (METADATA_FIXED_LEN
            + var_len_counts_size
            + c_str_count * metadata.symbol_cstr_len
            + metadata
                .mappings
                .iter()
                .map(|m| {
                    metadata.symbol_cstr_len
                        + mem::size_of::<u32>()
                        + m.intervals.len() * mapping_interval_len
                })
                .sum::<usize>()) as u32
    }

    fn encode_range_and_counts(
        &mut self,
        version: u8,
        start: u64,
        end: Option<NonZeroU64>,
        limit: Option<NonZeroU64>,
    ) -> Result<()> {
        let metadata_err = |e| Error::io(e, "writing DBN metadata");
        self.writer
            .write_all(start.to_le_bytes().as_slice())
            .map_err(metadata_err)?;
        self.writer
            .write_all(
                end.map(|e| e.get())
                    .unwrap_or(UNDEF_TIMESTAMP)
                    .to_le_bytes()
                    .as_slice(),
            )
            .map_err(metadata_err)?;
        self.writer
            .write_all(
                limit
                    .map(|l| l.get())
                    .unwrap_or(NULL_LIMIT)
                    .to_le_bytes()
                    .as_slice(),
            )
            .map_err(metadata_err)?;
        if version == 1 {
            // the deprecated record count
            self.writer
                .write_all(NULL_RECORD_COUNT.to_le_bytes().as_slice())
                .map_err(metadata_err)?;
        }
        Ok(())
    }

    fn encode_repeated_symbol_cstr(
        &mut self,
        symbol_cstr_len: usize,
        symbols: &[String],
    ) -> Result<()> {
        self.writer
            .write_all((symbols.len() as u32).to_le_bytes().as_slice())
            .map_err(|e| Error::io(e, "writing cstr length"))?;
        for symbol in symbols {
            self.encode_fixed_len_cstr(symbol_cstr_len, symbol)?;
        }
        Ok(())
    }

    fn encode_symbol_mappings(
        &mut self,
        symbol_cstr_len: usize,
        symbol_mappings: &[SymbolMapping],
    ) -> Result<()> {
        // encode mappings_count
        self.writer
            .write_all((symbol_mappings.len() as u32).to_le_bytes().as_slice())
            .map_err(|e| Error::io(e, "writing symbol mappings length"))?;
        for symbol_mapping in symbol_mappings {
            self.encode_symbol_mapping(symbol_cstr_len, symbol_mapping)?;
        }
        Ok(())
    }

    fn encode_symbol_mapping(
        &mut self,
        symbol_cstr_len: usize,
        symbol_mapping: &SymbolMapping,
    ) -> Result<()> {
        self.encode_fixed_len_cstr(symbol_cstr_len, &symbol_mapping.raw_symbol)?;
        // encode interval_count
        self.writer
            .write_all(
                (symbol_mapping.intervals.len() as u32)
                    .to_le_bytes()
                    .as_slice(),
            )
            .map_err(|e| Error::io(e, "writing symbol mapping interval count"))?;
        for interval in symbol_mapping.intervals.iter() {
            self.encode_date(interval.start_date)?;
            self.encode_date(interval.end_date)?;
            self.encode_fixed_len_cstr(symbol_cstr_len, &interval.symbol)?;
        }
        Ok(())
    }

    fn encode_fixed_len_cstr(&mut self, symbol_cstr_len: usize, string: &str) -> Result<()> {
        if !string.is_ascii() {
            return Err(Error::Conversion {
                input: string.to_owned(),
                desired_type: "ASCII string",
            });
        }
        if string.len() >= symbol_cstr_len {
            return Err(Error::encode(format!(
                "'{string}' is too long to encode in DBN; it cannot be longer than {} characters",
                symbol_cstr_len - 1
            )));
        }
        let cstr_err = |e| Error::io(e, "writing fixed-length cstr");
        self.writer.write_all(string.as_bytes()).map_err(cstr_err)?;
        // pad remaining space with null bytes
        for _ in string.len()..symbol_cstr_len {
            self.writer.write_all(&[0]).map_err(cstr_err)?;
        }
        Ok(())
    }

    fn encode_date(&mut self, date: time::Date) -> Result<()> {
        let mut date_int = date.year() as u32 * 10_000;
        date_int += date.month() as u32 * 100;
        date_int += date.day() as u32;
        self.writer
            .write_all(date_int.to_le_bytes().as_slice())
            .map_err(|e| Error::io(e, "writing date"))?;
        Ok(())
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::{
        decode::dbn::MetadataDecoder, MappingInterval, MetadataBuilder, SType, Schema,
    };

    #[test]
    fn metadata_with_mappings_round_trip() {
        let metadata = MetadataBuilder::new()
            .dataset(crate::datasets::XNAS_ITCH)
            .schema(Some(Schema::Trades))
            .start(1_657_230_820_000_000_000)
            .end(NonZeroU64::new(1_658_960_170_000_000_000))
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .symbols(vec!["AAPL".to_owned(), "TSLA".to_owned()])
            .partial(vec!["TSLA".to_owned()])
            .mappings(vec![SymbolMapping {
                raw_symbol: "AAPL".to_owned(),
                intervals: vec![MappingInterval {
                    start_date: date!(2022 - 07 - 07),
                    end_date: date!(2022 - 07 - 28),
                    symbol: "32".to_owned(),
                }],
            }])
            .build();
        let mut buffer = Vec::new();
        MetadataEncoder::new(&mut buffer).encode(&metadata).unwrap();
        let res = MetadataDecoder::new(buffer.as_slice()).decode().unwrap();
        assert_eq!(res, metadata);
    }

    #[test]
    fn non_ascii_symbol_rejected() {
        let metadata = MetadataBuilder::new()
            .dataset(crate::datasets::XNAS_ITCH)
            .schema(Some(Schema::Trades))
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .symbols(vec!["YES\u{1F44D}".to_owned()])
            .build();
        let mut buffer = Vec::new();
        let res = MetadataEncoder::new(&mut buffer).encode(&metadata);
        assert!(matches!(res, Err(Error::Conversion { .. })));
    }

    #[test]
    fn encoded_length_matches_prelude() {
        let metadata = MetadataBuilder::new()
            .dataset(crate::datasets::GLBX_MDP3)
            .schema(Some(Schema::Mbo))
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .symbols(vec!["ES.FUT".to_owned()])
            .build();
        let mut buffer = Vec::new();
        MetadataEncoder::new(&mut buffer).encode(&metadata).unwrap();
        let length = u32::from_le_bytes(buffer[4..8].try_into().unwrap());
        assert_eq!(buffer.len(), 8 + length as usize);
    }
}
