//! Decoding of DBN files and streams, both metadata and records.

use std::{
    fs::File,
    io::{self, BufReader},
    mem,
    num::NonZeroU64,
    path::Path,
    str::Utf8Error,
};

use crate::{
    compat::{self, METADATA_RESERVED_LEN_V1, SYMBOL_CSTR_LEN_V1},
    decode::{
        DbnMetadata, DecodeRecord, DecodeRecordRef, DecodeStream, FromLittleEndianSlice,
        StreamIterDecoder,
    },
    enums::VersionUpgradePolicy,
    error::silence_eof_error,
    HasRType, MappingInterval, Metadata, RecordHeader, RecordRef, SType, Schema, SymbolMapping,
    DBN_VERSION, METADATA_FIXED_LEN, METADATA_RESERVED_LEN, NULL_SCHEMA, NULL_STYPE,
    UNDEF_TIMESTAMP,
};

pub(crate) const DBN_PREFIX: &[u8] = b"DBN";
pub(crate) const DBN_PREFIX_LEN: usize = DBN_PREFIX.len();

/// Returns `true` if `bytes` starts with valid uncompressed DBN.
pub fn starts_with_prefix(bytes: &[u8]) -> bool {
    bytes.len() > DBN_PREFIX_LEN && &bytes[..DBN_PREFIX_LEN] == DBN_PREFIX
}

/// Type for decoding files and streams in Databento Binary Encoding (DBN), both
/// metadata and records.
pub struct Decoder<R> {
    metadata: Metadata,
    decoder: RecordDecoder<R>,
}

impl<R> Decoder<R>
where
    R: io::Read,
{
    /// Creates a new DBN [`Decoder`] from `reader`. Records from previous DBN
    /// versions are upgraded to the current version.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader` or the input is encoded in a newer version of DBN.
    pub fn new(reader: R) -> crate::Result<Self> {
        Self::with_upgrade_policy(reader, VersionUpgradePolicy::default())
    }

    /// Creates a new DBN [`Decoder`] from `reader` that will decode records from
    /// previous DBN versions according to `upgrade_policy`.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader` or the input is encoded in a newer version of DBN.
    pub fn with_upgrade_policy(
        mut reader: R,
        upgrade_policy: VersionUpgradePolicy,
    ) -> crate::Result<Self> {
        let mut metadata = MetadataDecoder::new(&mut reader).decode()?;
        // capture the original version before the upgrade
        let version = metadata.version;
        let ts_out = metadata.ts_out;
        metadata.upgrade(upgrade_policy);
        Ok(Self {
            decoder: RecordDecoder::with_version(reader, version, upgrade_policy, ts_out)?,
            metadata,
        })
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        self.decoder.get_mut()
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        self.decoder.get_ref()
    }

    /// Consumes the decoder and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }

    /// Returns the send timestamp appended to the most recently decoded record, if
    /// there was one.
    pub fn last_ts_out(&self) -> Option<u64> {
        self.decoder.last_ts_out()
    }
}

impl<R> Decoder<zstd::stream::Decoder<'_, BufReader<R>>>
where
    R: io::Read,
{
    /// Creates a new DBN [`Decoder`] from Zstandard-compressed `reader`.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader`.
    pub fn with_zstd(reader: R) -> crate::Result<Self> {
        Decoder::new(
            zstd::stream::Decoder::new(reader)
                .map_err(|e| crate::Error::io(e, "creating zstd decoder"))?,
        )
    }
}

impl<R> Decoder<zstd::stream::Decoder<'_, R>>
where
    R: io::BufRead,
{
    /// Creates a new DBN [`Decoder`] from Zstandard-compressed buffered `reader`.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader`.
    pub fn with_zstd_buffer(reader: R) -> crate::Result<Self> {
        Decoder::new(
            zstd::stream::Decoder::with_buffer(reader)
                .map_err(|e| crate::Error::io(e, "creating zstd decoder"))?,
        )
    }
}

impl Decoder<BufReader<File>> {
    /// Creates a DBN [`Decoder`] from the file at `path`.
    ///
    /// # Errors
    /// This function returns an error if it is unable to read the file at `path` or
    /// if it is unable to parse the metadata in the file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            crate::Error::io(
                e,
                format!("opening DBN file at path '{}'", path.as_ref().display()),
            )
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R> DbnMetadata for Decoder<R> {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl<R> DecodeRecordRef for Decoder<R>
where
    R: io::Read,
{
    fn decode_record_ref(&mut self) -> crate::Result<Option<RecordRef>> {
        self.decoder.decode_ref()
    }
}

impl<R> DecodeRecord for Decoder<R>
where
    R: io::Read,
{
    fn decode_record<T: HasRType>(&mut self) -> crate::Result<Option<&T>> {
        self.decoder.decode()
    }
}

impl<R> DecodeStream for Decoder<R>
where
    R: io::Read,
{
    fn decode_stream<T: HasRType + Clone>(self) -> StreamIterDecoder<Self, T> {
        StreamIterDecoder::new(self)
    }
}

/// A DBN decoder of records.
pub struct RecordDecoder<R> {
    version: u8,
    upgrade_policy: VersionUpgradePolicy,
    ts_out: bool,
    last_ts_out: Option<u64>,
    reader: R,
    read_buffer: Vec<u8>,
    compat_buffer: [u8; crate::MAX_RECORD_LEN],
}

impl<R> RecordDecoder<R>
where
    R: io::Read,
{
    /// Creates a new `RecordDecoder` that will decode from `reader`.
    ///
    /// Note: assumes the input is of the current DBN version. To decode records from
    /// a previous version, use [`RecordDecoder::with_version()`].
    pub fn new(reader: R) -> Self {
        // the upgrade policy is a no-op for the current version
        Self::with_version(reader, DBN_VERSION, VersionUpgradePolicy::default(), false).unwrap()
    }

    /// Creates a new `RecordDecoder` that will decode from `reader` with the
    /// specified DBN version, upgrading records according to `upgrade_policy`. When
    /// `ts_out` is `true`, expects an 8-byte send timestamp after every record.
    ///
    /// # Errors
    /// This function returns an error if `version` exceeds the highest supported
    /// version.
    pub fn with_version(
        reader: R,
        version: u8,
        upgrade_policy: VersionUpgradePolicy,
        ts_out: bool,
    ) -> crate::Result<Self> {
        if version == 0 || version > DBN_VERSION {
            return Err(crate::Error::decode(format!(
                "can't decode DBN version {version}. Decoder version is {DBN_VERSION}"
            )));
        }
        Ok(Self {
            version,
            upgrade_policy,
            ts_out,
            last_ts_out: None,
            reader,
            // `read_buffer` should always have capacity for reading `length`
            read_buffer: vec![0],
            compat_buffer: [0; crate::MAX_RECORD_LEN],
        })
    }

    /// Sets the DBN version to expect when decoding.
    ///
    /// # Errors
    /// This function returns an error if `version` exceeds the highest supported
    /// version.
    pub fn set_version(&mut self, version: u8) -> crate::Result<()> {
        if version == 0 || version > DBN_VERSION {
            Err(crate::Error::decode(format!(
                "can't decode DBN version {version}. Decoder version is {DBN_VERSION}"
            )))
        } else {
            self.version = version;
            Ok(())
        }
    }

    /// Sets whether to expect a send timestamp appended after every record.
    pub fn set_ts_out(&mut self, ts_out: bool) {
        self.ts_out = ts_out;
    }

    /// Returns the send timestamp appended to the most recently decoded record, if
    /// there was one.
    pub fn last_ts_out(&self) -> Option<u64> {
        self.last_ts_out
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Returns a reference to the inner reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Consumes the decoder and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Tries to decode the next record of type `T`. Returns `Ok(None)` if the reader
    /// is exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error, the
    /// input is truncated mid-record, or the next record is of a different type than
    /// `T`.
    pub fn decode<T: HasRType>(&mut self) -> crate::Result<Option<&T>> {
        let rec_ref = self.decode_ref()?;
        if let Some(rec_ref) = rec_ref {
            rec_ref
                .get::<T>()
                .ok_or_else(|| {
                    crate::Error::conversion::<T>(format!(
                        "record with rtype {:#04X}",
                        rec_ref.header().rtype
                    ))
                })
                .map(Some)
        } else {
            Ok(None)
        }
    }

    /// Tries to decode a generic reference to a record. Returns `Ok(None)` if the
    /// reader is exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error, the
    /// `length` of the record is invalid, or the input ends mid-record.
    pub fn decode_ref(&mut self) -> crate::Result<Option<RecordRef>> {
        let io_err = |e| crate::Error::io(e, "decoding record reference");
        if let Err(err) = self.reader.read_exact(&mut self.read_buffer[..1]) {
            return silence_eof_error(err).map_err(io_err);
        }
        let length = self.read_buffer[0] as usize * RecordHeader::LENGTH_MULTIPLIER;
        if length < mem::size_of::<RecordHeader>() {
            return Err(crate::Error::decode(format!(
                "invalid record with length {length} shorter than the header"
            )));
        }
        if length > self.read_buffer.len() {
            self.read_buffer.resize(length, 0);
        }
        self.reader
            .read_exact(&mut self.read_buffer[1..length])
            .map_err(truncation_err)?;
        self.last_ts_out = if self.ts_out {
            let mut ts_out_buffer = [0; 8];
            self.reader
                .read_exact(&mut ts_out_buffer)
                .map_err(truncation_err)?;
            Some(u64::from_le_bytes(ts_out_buffer))
        } else {
            None
        };
        // Safety: `read_buffer` contains the full record of `length` bytes.
        Ok(Some(unsafe {
            compat::decode_record_ref(
                self.version,
                self.upgrade_policy,
                &mut self.compat_buffer,
                &self.read_buffer[..length],
            )
        }))
    }
}

/// Running out of input mid-record is a truncation, unlike a clean EOF at a record
/// boundary.
fn truncation_err(err: io::Error) -> crate::Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        crate::Error::decode("unexpected end of input: truncated record")
    } else {
        crate::Error::io(err, "decoding record")
    }
}

impl<R> DecodeRecordRef for RecordDecoder<R>
where
    R: io::Read,
{
    fn decode_record_ref(&mut self) -> crate::Result<Option<RecordRef>> {
        self.decode_ref()
    }
}

impl<R> DecodeRecord for RecordDecoder<R>
where
    R: io::Read,
{
    fn decode_record<T: HasRType>(&mut self) -> crate::Result<Option<&T>> {
        self.decode()
    }
}

/// Type for decoding [`Metadata`] from Databento Binary Encoding (DBN).
pub struct MetadataDecoder<R>
where
    R: io::Read,
{
    reader: R,
}

impl<R> MetadataDecoder<R>
where
    R: io::Read,
{
    const U32_SIZE: usize = mem::size_of::<u32>();

    /// Creates a new DBN [`MetadataDecoder`] from `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Decodes and returns DBN [`Metadata`].
    ///
    /// Accepts both the plain `DBN` prelude and metadata encapsulated in a Zstandard
    /// skippable frame.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata.
    pub fn decode(&mut self) -> crate::Result<Metadata> {
        let mut prelude_buffer = [0u8; 8];
        self.reader
            .read_exact(&mut prelude_buffer)
            .map_err(|e| crate::Error::io(e, "reading metadata prelude"))?;
        if crate::decode::zstd::ZSTD_SKIPPABLE_MAGIC_RANGE
            .contains(&u32::from_le_slice(&prelude_buffer))
        {
            // Metadata encapsulated in a skippable frame: the DBN prelude follows
            // the 8-byte frame header.
            self.reader
                .read_exact(&mut prelude_buffer)
                .map_err(|e| crate::Error::io(e, "reading skippable frame contents"))?;
        }
        if &prelude_buffer[..DBN_PREFIX_LEN] != DBN_PREFIX {
            return Err(crate::Error::decode("invalid DBN header"));
        }
        let version = prelude_buffer[DBN_PREFIX_LEN];
        if version == 0 || version > DBN_VERSION {
            return Err(crate::Error::decode(format!(
                "can't decode DBN version {version}. Decoder version is {DBN_VERSION}"
            )));
        }
        let length = u32::from_le_slice(&prelude_buffer[4..]);
        if (length as usize) < METADATA_FIXED_LEN {
            return Err(crate::Error::decode(
                "invalid DBN metadata: length shorter than the fixed length",
            ));
        }
        let mut metadata_buffer = vec![0u8; length as usize];
        self.reader
            .read_exact(&mut metadata_buffer)
            .map_err(|e| crate::Error::io(e, "reading fixed metadata"))?;
        Self::decode_metadata_fields(version, metadata_buffer)
    }

    pub(crate) fn decode_metadata_fields(version: u8, buffer: Vec<u8>) -> crate::Result<Metadata> {
        const U64_SIZE: usize = mem::size_of::<u64>();
        let mut pos = 0;
        let dataset = std::str::from_utf8(&buffer[pos..pos + crate::METADATA_DATASET_CSTR_LEN])
            .map_err(|e| crate::Error::utf8(e, "reading dataset from metadata"))?
            .trim_end_matches('\0')
            .to_owned();
        pos += crate::METADATA_DATASET_CSTR_LEN;

        let raw_schema = u16::from_le_slice(&buffer[pos..]);
        let schema = if raw_schema == NULL_SCHEMA {
            None
        } else {
            Some(Schema::try_from(raw_schema).map_err(|_| {
                crate::Error::conversion::<Schema>(format!("{:?}", &buffer[pos..pos + 2]))
            })?)
        };
        pos += mem::size_of::<u16>();
        let start = u64::from_le_slice(&buffer[pos..]);
        pos += U64_SIZE;
        let end = u64::from_le_slice(&buffer[pos..]);
        pos += U64_SIZE;
        let limit = NonZeroU64::new(u64::from_le_slice(&buffer[pos..]));
        pos += U64_SIZE;
        if version == 1 {
            // skip the deprecated record count
            pos += U64_SIZE;
        }
        let stype_in = if buffer[pos] == NULL_STYPE {
            None
        } else {
            Some(
                SType::try_from(buffer[pos])
                    .map_err(|_| crate::Error::conversion::<SType>(buffer[pos]))?,
            )
        };
        pos += mem::size_of::<u8>();
        let stype_out = SType::try_from(buffer[pos])
            .map_err(|_| crate::Error::conversion::<SType>(buffer[pos]))?;
        pos += mem::size_of::<u8>();
        let ts_out = buffer[pos] != 0;
        pos += mem::size_of::<bool>();
        let symbol_cstr_len = if version == 1 {
            SYMBOL_CSTR_LEN_V1
        } else {
            let res = u16::from_le_slice(&buffer[pos..]);
            pos += mem::size_of::<u16>();
            res as usize
        };
        // skip reserved
        pos += if version == 1 {
            METADATA_RESERVED_LEN_V1
        } else {
            METADATA_RESERVED_LEN
        };
        let schema_definition_length = u32::from_le_slice(&buffer[pos..]);
        if schema_definition_length != 0 {
            return Err(crate::Error::decode(
                "this version of dbn can't parse schema definitions",
            ));
        }
        pos += Self::U32_SIZE + schema_definition_length as usize;
        let symbols =
            Self::decode_repeated_symbol_cstr(symbol_cstr_len, buffer.as_slice(), &mut pos)?;
        let partial =
            Self::decode_repeated_symbol_cstr(symbol_cstr_len, buffer.as_slice(), &mut pos)?;
        let not_found =
            Self::decode_repeated_symbol_cstr(symbol_cstr_len, buffer.as_slice(), &mut pos)?;
        let mappings = Self::decode_symbol_mappings(symbol_cstr_len, buffer.as_slice(), &mut pos)?;

        Ok(Metadata {
            version,
            dataset,
            schema,
            start,
            end: if end == UNDEF_TIMESTAMP {
                None
            } else {
                NonZeroU64::new(end)
            },
            limit,
            stype_in,
            stype_out,
            ts_out,
            symbol_cstr_len,
            symbols,
            partial,
            not_found,
            mappings,
        })
    }

    fn decode_repeated_symbol_cstr(
        symbol_cstr_len: usize,
        buffer: &[u8],
        pos: &mut usize,
    ) -> crate::Result<Vec<String>> {
        if *pos + Self::U32_SIZE > buffer.len() {
            return Err(crate::Error::decode(
                "unexpected end of metadata buffer while parsing symbols",
            ));
        }
        let count = u32::from_le_slice(&buffer[*pos..]) as usize;
        *pos += Self::U32_SIZE;
        let read_size = count * symbol_cstr_len;
        if *pos + read_size > buffer.len() {
            return Err(crate::Error::decode(
                "unexpected end of metadata buffer while parsing symbols",
            ));
        }
        let mut res = Vec::with_capacity(count);
        for i in 0..count {
            res.push(
                Self::decode_symbol(symbol_cstr_len, buffer, pos)
                    .map_err(|e| crate::Error::utf8(e, format!("decoding symbol at index {i}")))?,
            );
        }
        Ok(res)
    }

    fn decode_symbol_mappings(
        symbol_cstr_len: usize,
        buffer: &[u8],
        pos: &mut usize,
    ) -> crate::Result<Vec<SymbolMapping>> {
        if *pos + Self::U32_SIZE > buffer.len() {
            return Err(crate::Error::decode(
                "unexpected end of metadata buffer while parsing symbol mappings",
            ));
        }
        let count = u32::from_le_slice(&buffer[*pos..]) as usize;
        *pos += Self::U32_SIZE;
        let mut res = Vec::with_capacity(count);
        // Each `SymbolMapping` is of a variable length, so decoding it requires
        // frequent bounds checks.
        for i in 0..count {
            res.push(Self::decode_symbol_mapping(
                symbol_cstr_len,
                i,
                buffer,
                pos,
            )?);
        }
        Ok(res)
    }

    fn decode_symbol_mapping(
        symbol_cstr_len: usize,
        idx: usize,
        buffer: &[u8],
        pos: &mut usize,
    ) -> crate::Result<SymbolMapping> {
        let min_symbol_mapping_encoded_len = symbol_cstr_len + mem::size_of::<u32>();
        let mapping_interval_encoded_len = mem::size_of::<u32>() * 2 + symbol_cstr_len;
        if *pos + min_symbol_mapping_encoded_len > buffer.len() {
            return Err(crate::Error::decode(format!(
                "unexpected end of metadata buffer while parsing symbol mapping at index {idx}"
            )));
        }
        let raw_symbol = Self::decode_symbol(symbol_cstr_len, buffer, pos)
            .map_err(|e| crate::Error::utf8(e, "parsing raw symbol"))?;
        let interval_count = u32::from_le_slice(&buffer[*pos..]) as usize;
        *pos += Self::U32_SIZE;
        let read_size = interval_count * mapping_interval_encoded_len;
        if *pos + read_size > buffer.len() {
            return Err(crate::Error::decode(format!(
                "symbol mapping at index {idx} with interval_count {interval_count} larger than remaining buffer"
            )));
        }
        let mut intervals = Vec::with_capacity(interval_count);
        for i in 0..interval_count {
            let raw_start_date = u32::from_le_slice(&buffer[*pos..]);
            *pos += Self::U32_SIZE;
            let start_date = decode_iso8601(raw_start_date).map_err(|e| {
                crate::Error::decode(format!(
                    "{e} while parsing start date of mapping interval at index {i} within mapping at index {idx}"
                ))
            })?;
            let raw_end_date = u32::from_le_slice(&buffer[*pos..]);
            *pos += Self::U32_SIZE;
            let end_date = decode_iso8601(raw_end_date).map_err(|e| {
                crate::Error::decode(format!(
                    "{e} while parsing end date of mapping interval at index {i} within mapping at index {idx}"
                ))
            })?;
            let symbol = Self::decode_symbol(symbol_cstr_len, buffer, pos).map_err(|e| {
                crate::Error::utf8(
                    e,
                    format!("parsing symbol of mapping interval at index {i} within mapping at index {idx}"),
                )
            })?;
            intervals.push(MappingInterval {
                start_date,
                end_date,
                symbol,
            });
        }
        Ok(SymbolMapping {
            raw_symbol,
            intervals,
        })
    }

    fn decode_symbol(
        symbol_cstr_len: usize,
        buffer: &[u8],
        pos: &mut usize,
    ) -> Result<String, Utf8Error> {
        let symbol_slice = &buffer[*pos..*pos + symbol_cstr_len];
        let symbol = std::str::from_utf8(symbol_slice)?
            .trim_end_matches('\0')
            .to_owned();
        *pos += symbol_cstr_len;
        Ok(symbol)
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the decoder and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Decodes a `yyyymmdd` integer into a date.
pub(crate) fn decode_iso8601(raw: u32) -> Result<time::Date, String> {
    let year = raw / 10_000;
    let remaining = raw % 10_000;
    let raw_month = remaining / 100;
    let month = u8::try_from(raw_month)
        .map_err(|e| format!("{e:?} while parsing {raw} into date"))
        .and_then(|m| {
            time::Month::try_from(m).map_err(|e| format!("{e:?} while parsing {raw} into date"))
        })?;
    let day = remaining % 100;
    time::Date::from_calendar_date(year as i32, month, day as u8)
        .map_err(|e| format!("couldn't convert {raw} to a valid date: {e:?}"))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        encode::{
            dbn::{Encoder, MetadataEncoder, RecordEncoder},
            DynWriter, EncodeRecord,
        },
        enums::Compression,
        record::{ErrorMsg, MboMsg, Mbp10Msg, Mbp1Msg, OhlcvMsg, Record, TradeMsg},
        Error, MetadataBuilder,
    };

    fn test_metadata(schema: Option<Schema>) -> Metadata {
        MetadataBuilder::new()
            .dataset(crate::datasets::GLBX_MDP3)
            .schema(schema)
            .start(1_700_000_000_000_000_000)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .symbols(vec!["ES.FUT".to_owned()])
            .build()
    }

    #[test]
    fn metadata_identity() {
        let metadata = test_metadata(Some(Schema::Mbo));
        let mut buffer = Vec::new();
        MetadataEncoder::new(&mut buffer).encode(&metadata).unwrap();
        let res = MetadataDecoder::new(buffer.as_slice()).decode().unwrap();
        assert_eq!(res, metadata);
    }

    #[rstest]
    #[case::uncompressed(Compression::None)]
    #[case::zstd(Compression::ZStd)]
    fn dbn_identity(#[case] compression: Compression) {
        let metadata = test_metadata(Some(Schema::Mbp10));
        let records = vec![
            Mbp10Msg {
                price: 100_000_000_000,
                ..Default::default()
            },
            Mbp10Msg {
                price: 100_250_000_000,
                ..Default::default()
            },
        ];
        let mut buffer = Vec::new();
        let mut encoder =
            Encoder::new(DynWriter::new(&mut buffer, compression).unwrap(), &metadata).unwrap();
        for rec in &records {
            encoder.encode_record(rec).unwrap();
        }
        encoder.flush().unwrap();
        drop(encoder);

        let decoder = crate::decode::DynDecoder::new_inferred(io::Cursor::new(buffer)).unwrap();
        assert_eq!(*DbnMetadata::metadata(&decoder), metadata);
        let res = decoder.decode_records::<Mbp10Msg>().unwrap();
        assert_eq!(res, records);
    }

    #[test]
    fn decode_record_ref_mixed_stream() {
        let metadata = test_metadata(None);
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, &metadata).unwrap();
        let ohlcv = OhlcvMsg::default();
        let error = ErrorMsg::new(0, "Test failed successfully", true);
        encoder.encode_record(&ohlcv).unwrap();
        encoder.encode_record(&error).unwrap();
        drop(encoder);

        let mut decoder = Decoder::new(buffer.as_slice()).unwrap();
        let ref1 = decoder.decode_record_ref().unwrap().unwrap();
        assert_eq!(*ref1.get::<OhlcvMsg>().unwrap(), ohlcv);
        let ref2 = decoder.decode_record_ref().unwrap().unwrap();
        assert_eq!(*ref2.get::<ErrorMsg>().unwrap(), error);
        assert!(decoder.decode_record_ref().unwrap().is_none());
    }

    #[test]
    fn decode_record_0_length() {
        let buf = vec![0u8];
        let mut target = RecordDecoder::new(buf.as_slice());
        assert!(
            matches!(target.decode_ref(), Err(Error::Decode(msg)) if msg.starts_with("invalid record with length"))
        );
    }

    #[test]
    fn decode_partial_record_is_truncation() {
        let buf = vec![6u8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
        assert!(buf[0] as usize * RecordHeader::LENGTH_MULTIPLIER > buf.len());

        let mut target = RecordDecoder::new(buf.as_slice());
        assert!(
            matches!(target.decode_ref(), Err(Error::Decode(msg)) if msg.contains("truncated"))
        );
    }

    #[test]
    fn decode_record_length_less_than_header() {
        let buf = vec![3u8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
        assert_eq!(buf[0] as usize * RecordHeader::LENGTH_MULTIPLIER, buf.len());

        let mut target = RecordDecoder::new(buf.as_slice());
        assert!(
            matches!(target.decode_ref(), Err(Error::Decode(msg)) if msg.starts_with("invalid record with length"))
        );
    }

    #[test]
    fn decode_ts_out_trailer() {
        let rec = TradeMsg {
            price: 17,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        let mut encoder = RecordEncoder::new(&mut buffer);
        encoder.encode_record_with_ts_out(&rec, 1_700_000_000_000_000_001).unwrap();
        encoder.encode_record_with_ts_out(&rec, 1_700_000_000_000_000_002).unwrap();

        let mut decoder = RecordDecoder::with_version(
            buffer.as_slice(),
            DBN_VERSION,
            VersionUpgradePolicy::default(),
            true,
        )
        .unwrap();
        let res = decoder.decode::<TradeMsg>().unwrap().unwrap();
        assert_eq!(res.price, 17);
        assert_eq!(decoder.last_ts_out(), Some(1_700_000_000_000_000_001));
        decoder.decode::<TradeMsg>().unwrap().unwrap();
        assert_eq!(decoder.last_ts_out(), Some(1_700_000_000_000_000_002));
        assert!(decoder.decode::<TradeMsg>().unwrap().is_none());
    }

    #[test]
    fn decode_wrong_type_is_conversion_error() {
        let mut buffer = Vec::new();
        let mut encoder = RecordEncoder::new(&mut buffer);
        encoder.encode_record(&MboMsg::default()).unwrap();
        let mut decoder = RecordDecoder::new(buffer.as_slice());
        assert!(matches!(
            decoder.decode::<Mbp1Msg>(),
            Err(Error::Conversion { .. })
        ));
    }

    #[test]
    fn decode_newer_version_rejected() {
        let metadata = test_metadata(Some(Schema::Trades));
        let mut buffer = Vec::new();
        MetadataEncoder::new(&mut buffer).encode(&metadata).unwrap();
        // bump the version past the decoder's
        buffer[3] = DBN_VERSION + 1;
        let res = MetadataDecoder::new(buffer.as_slice()).decode();
        assert!(matches!(res, Err(Error::Decode(msg)) if msg.contains("can't decode DBN version")));
    }

    #[test]
    fn decode_iso8601_valid() {
        let res = decode_iso8601(20151031).unwrap();
        let exp = time::Date::from_calendar_date(2015, time::Month::October, 31).unwrap();
        assert_eq!(res, exp);
    }

    #[test]
    fn decode_iso8601_invalid_month() {
        assert!(decode_iso8601(20101305).is_err());
    }

    #[test]
    fn decode_iso8601_invalid_day() {
        assert!(decode_iso8601(20100600).is_err());
    }
}
