//! A streaming byte-in/byte-out transcoder from DBN (raw or Zstandard-compressed)
//! to CSV or JSON.

use std::io;

use dbn::{
    decode::{
        dbn::starts_with_prefix as starts_with_dbn,
        zstd::{ZSTD_FRAME_MAGIC, ZSTD_SKIPPABLE_MAGIC_RANGE},
        DbnMetadataDecoder, DbnRecordDecoder, DecodeRecordRef,
    },
    encode::{CsvEncoder, EncodeRecord, EncodeRecordRef, JsonEncoder},
    Encoding, Metadata, RecordHeader, VersionUpgradePolicy,
};

use crate::{symbology::InstrumentMap, Error, Result};

/// The knobs controlling a [`Transcoder`]'s output.
#[derive(Debug, Clone)]
pub struct TranscodeParams {
    /// The output encoding: CSV or JSON.
    pub encoding: Encoding,
    /// If `true`, prices are rendered as fixed-precision decimal strings.
    pub pretty_px: bool,
    /// If `true`, timestamps are rendered as ISO 8601 datetime strings.
    pub pretty_ts: bool,
    /// If `Some`, each row gets a symbol resolved per record against the map.
    pub instrument_map: Option<InstrumentMap>,
}

impl TranscodeParams {
    /// Creates new parameters for the given output `encoding` with pretty prices
    /// and timestamps off and no symbol mapping.
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            pretty_px: false,
            pretty_ts: false,
            instrument_map: None,
        }
    }
}

/// A streaming transcoder from DBN bytes to CSV or JSON.
///
/// Accepts arbitrary chunks of a raw or Zstandard-compressed DBN stream,
/// including partial records, buffering the unparsed tail internally.
/// [`finish()`](Self::finish) fails if the input ended mid-record or before the
/// metadata completed.
pub struct Transcoder<W: io::Write> {
    input: Input<W>,
}

enum Input<W: io::Write> {
    /// Accumulating the first bytes to detect the compression.
    Detect {
        buffer: Vec<u8>,
        parser: Option<RecordParser<W>>,
    },
    ZStd(zstd::stream::write::Decoder<'static, RecordParser<W>>),
    Plain(RecordParser<W>),
}

impl<W: io::Write> Transcoder<W> {
    /// Creates a new transcoder writing its output to `writer`.
    ///
    /// # Errors
    /// This function returns an error if `params.encoding` is not CSV or JSON.
    pub fn new(writer: W, params: TranscodeParams) -> Result<Self> {
        if params.encoding == Encoding::Dbn {
            return Err(Error::bad_argument(
                "encoding",
                "transcoding output must be CSV or JSON",
            ));
        }
        Ok(Self {
            input: Input::Detect {
                buffer: Vec::new(),
                parser: Some(RecordParser::new(writer, params)),
            },
        })
    }

    /// Feeds a chunk of DBN input to the transcoder, emitting any whole records to
    /// the output.
    ///
    /// # Errors
    /// This function returns an error if the input is not DBN, contains an invalid
    /// record, or the output writer fails.
    pub fn write(&mut self, chunk: &[u8]) -> Result<()> {
        match &mut self.input {
            Input::Detect { buffer, parser } => {
                buffer.extend_from_slice(chunk);
                if buffer.len() < 4 {
                    return Ok(());
                }
                let magic = u32::from_le_bytes(buffer[..4].try_into().unwrap());
                let buffered = std::mem::take(buffer);
                let parser = parser.take().unwrap();
                // The skippable-frame encapsulation of metadata is handled by the
                // metadata decoder, not the decompressor.
                if starts_with_dbn(&buffered) || ZSTD_SKIPPABLE_MAGIC_RANGE.contains(&magic) {
                    let mut parser = parser;
                    parser.process(&buffered)?;
                    self.input = Input::Plain(parser);
                } else if magic == ZSTD_FRAME_MAGIC {
                    let mut decoder = zstd::stream::write::Decoder::new(parser)
                        .map_err(|e| Error::io(e, "creating zstd decoder"))?;
                    write_to_parser(&mut decoder, &buffered)?;
                    self.input = Input::ZStd(decoder);
                } else {
                    return Err(Error::Dbn(dbn::Error::decode("unknown container")));
                }
                Ok(())
            }
            Input::ZStd(decoder) => write_to_parser(decoder, chunk),
            Input::Plain(parser) => parser.process(chunk),
        }
    }

    /// Flushes the output and verifies the input ended cleanly at a record
    /// boundary.
    ///
    /// # Errors
    /// This function returns an error if the input ended mid-record or before the
    /// metadata completed, or if flushing the output writer fails.
    pub fn finish(self) -> Result<()> {
        let parser = match self.input {
            Input::Detect { buffer, parser } => {
                if !buffer.is_empty() {
                    return Err(Error::Dbn(dbn::Error::decode(
                        "unexpected end of input: truncated metadata",
                    )));
                }
                parser.unwrap()
            }
            Input::ZStd(mut decoder) => {
                io::Write::flush(&mut decoder).map_err(|e| Error::io(e, "flushing zstd"))?;
                decoder.into_inner()
            }
            Input::Plain(parser) => parser,
        };
        parser.finish()
    }
}

fn write_to_parser<W: io::Write>(writer: &mut W, mut chunk: &[u8]) -> Result<()> {
    use io::Write;
    while !chunk.is_empty() {
        let written = writer
            .write(chunk)
            .map_err(unwrap_parser_error)?;
        chunk = &chunk[written..];
    }
    writer.flush().map_err(unwrap_parser_error)
}

// The record parser surfaces its typed errors through `io::Error` when driven
// through the zstd decoder.
fn unwrap_parser_error(err: io::Error) -> Error {
    if err.get_ref().is_some_and(|inner| inner.is::<ErrorBox>()) {
        let inner = err.into_inner().unwrap().downcast::<ErrorBox>().unwrap();
        inner.0
    } else {
        Error::io(err, "transcoding")
    }
}

#[derive(Debug)]
struct ErrorBox(Error);

impl std::fmt::Display for ErrorBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ErrorBox {}

/// Parses whole records out of arriving decompressed bytes and encodes them.
struct RecordParser<W: io::Write> {
    buffer: Vec<u8>,
    metadata: Option<Metadata>,
    encoder: OutputEncoder<W>,
    instrument_map: Option<InstrumentMap>,
}

enum OutputEncoder<W: io::Write> {
    Csv(CsvEncoder<W>),
    Json(JsonEncoder<W>),
}

impl<W: io::Write> RecordParser<W> {
    fn new(writer: W, params: TranscodeParams) -> Self {
        let encoder = match params.encoding {
            Encoding::Json => {
                OutputEncoder::Json(JsonEncoder::new(writer, params.pretty_px, params.pretty_ts))
            }
            _ => OutputEncoder::Csv(CsvEncoder::new(writer, params.pretty_px, params.pretty_ts)),
        };
        Self {
            buffer: Vec::new(),
            metadata: None,
            encoder,
            instrument_map: params.instrument_map,
        }
    }

    fn process(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        if self.metadata.is_none() && !self.try_parse_metadata()? {
            return Ok(());
        }
        self.drain_records()
    }

    /// Returns `true` once the metadata frame has been fully parsed and consumed.
    fn try_parse_metadata(&mut self) -> Result<bool> {
        const PRELUDE_LEN: usize = 8;
        if self.buffer.len() < PRELUDE_LEN {
            return Ok(false);
        }
        let magic = u32::from_le_bytes(self.buffer[..4].try_into().unwrap());
        let offset = if ZSTD_SKIPPABLE_MAGIC_RANGE.contains(&magic) {
            PRELUDE_LEN
        } else {
            0
        };
        if self.buffer.len() < offset + PRELUDE_LEN {
            return Ok(false);
        }
        let length =
            u32::from_le_bytes(self.buffer[offset + 4..offset + 8].try_into().unwrap()) as usize;
        let total = offset + PRELUDE_LEN + length;
        if self.buffer.len() < total {
            return Ok(false);
        }
        let metadata = DbnMetadataDecoder::new(&self.buffer[..total]).decode()?;
        self.buffer.drain(..total);
        if let OutputEncoder::Csv(encoder) = &mut self.encoder {
            let Some(schema) = metadata.schema else {
                return Err(Error::bad_argument(
                    "schema",
                    "the stream is heterogeneous; CSV requires a homogeneous schema",
                ));
            };
            if self.instrument_map.is_some() {
                encoder.encode_header_for_schema_with_sym(schema)?;
            } else {
                encoder.encode_header_for_schema(schema)?;
            }
        }
        self.metadata = Some(metadata);
        Ok(true)
    }

    fn drain_records(&mut self) -> Result<()> {
        let metadata = self.metadata.as_ref().unwrap();
        let version = metadata.version;
        let ts_out = metadata.ts_out;
        let mut consumed = 0;
        loop {
            let remaining = &self.buffer[consumed..];
            if remaining.is_empty() {
                break;
            }
            let length = remaining[0] as usize * RecordHeader::LENGTH_MULTIPLIER;
            if length < std::mem::size_of::<RecordHeader>() {
                return Err(Error::Dbn(dbn::Error::decode(format!(
                    "invalid record with length {length} shorter than the header"
                ))));
            }
            let needed = length + if ts_out { 8 } else { 0 };
            if remaining.len() < needed {
                break;
            }
            // Run the whole record through a decoder for version upgrading.
            let mut decoder = DbnRecordDecoder::with_version(
                &remaining[..length],
                version,
                VersionUpgradePolicy::Upgrade,
                false,
            )?;
            let rec = decoder
                .decode_record_ref()?
                .expect("complete record in buffer");
            let symbol = self.instrument_map.as_mut().map(|map| {
                if let Some(mapping) = rec.get::<dbn::SymbolMappingMsg>() {
                    let _ = map.insert_symbol_mapping(mapping);
                }
                map.resolve_for_record(&rec).map(str::to_owned)
            });
            match &mut self.encoder {
                OutputEncoder::Csv(encoder) => match &symbol {
                    Some(symbol) => encoder.encode_ref_with_sym(rec, symbol.as_deref())?,
                    None => encoder.encode_record_ref(rec)?,
                },
                OutputEncoder::Json(encoder) => match &symbol {
                    Some(symbol) => encoder.encode_ref_with_sym(rec, symbol.as_deref())?,
                    None => encoder.encode_record_ref(rec)?,
                },
            }
            consumed += needed;
        }
        self.buffer.drain(..consumed);
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if self.metadata.is_none() {
            return Err(Error::Dbn(dbn::Error::decode(
                "unexpected end of input: truncated metadata",
            )));
        }
        if !self.buffer.is_empty() {
            return Err(Error::Dbn(dbn::Error::decode(
                "unexpected end of input: truncated record",
            )));
        }
        match &mut self.encoder {
            OutputEncoder::Csv(encoder) => encoder.flush()?,
            OutputEncoder::Json(encoder) => encoder.flush()?,
        }
        Ok(())
    }
}

impl<W: io::Write> io::Write for RecordParser<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.process(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, ErrorBox(e)))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dbn::{
        encode::{dbn::Encoder as DbnEncoder, DynWriter, EncodeRecord},
        Compression, MetadataBuilder, OhlcvMsg, SType, Schema, TradeMsg,
    };
    use rstest::rstest;

    use super::*;

    fn test_stream(compression: Compression, schema: Option<Schema>) -> Vec<u8> {
        let metadata = MetadataBuilder::new()
            .dataset(dbn::datasets::XNAS_ITCH)
            .schema(schema)
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .build();
        let mut buffer = Vec::new();
        let mut encoder = DbnEncoder::new(
            DynWriter::new(&mut buffer, compression).unwrap(),
            &metadata,
        )
        .unwrap();
        for sequence in 0..3 {
            encoder
                .encode_record(&TradeMsg {
                    price: 1_000_000_000 + sequence as i64,
                    sequence,
                    ..Default::default()
                })
                .unwrap();
        }
        encoder.flush().unwrap();
        drop(encoder);
        buffer
    }

    #[rstest]
    #[case::uncompressed(Compression::None)]
    #[case::zstd(Compression::ZStd)]
    fn csv_one_byte_at_a_time(#[case] compression: Compression) {
        let stream = test_stream(compression, Some(Schema::Trades));
        let mut out = Vec::new();
        let mut transcoder = Transcoder::new(&mut out, TranscodeParams::new(Encoding::Csv)).unwrap();
        for byte in &stream {
            transcoder.write(std::slice::from_ref(byte)).unwrap();
        }
        transcoder.finish().unwrap();
        let res = String::from_utf8(out).unwrap();
        // header plus one row per record
        assert_eq!(res.lines().count(), 4);
        assert!(res.lines().next().unwrap().starts_with("rtype,"));
    }

    #[test]
    fn json_emits_one_object_per_record() {
        let stream = test_stream(Compression::None, Some(Schema::Trades));
        let mut out = Vec::new();
        let mut transcoder = Transcoder::new(&mut out, TranscodeParams::new(Encoding::Json)).unwrap();
        transcoder.write(&stream).unwrap();
        transcoder.finish().unwrap();
        let res = String::from_utf8(out).unwrap();
        assert_eq!(res.lines().count(), 3);
        for line in res.lines() {
            assert!(line.starts_with('{') && line.ends_with('}'));
        }
    }

    #[test]
    fn csv_requires_schema() {
        let stream = test_stream(Compression::None, None);
        let mut out = Vec::new();
        let mut transcoder = Transcoder::new(&mut out, TranscodeParams::new(Encoding::Csv)).unwrap();
        let res = transcoder.write(&stream);
        assert!(matches!(res, Err(Error::BadArgument { .. })));
    }

    #[test]
    fn truncated_record_fails_finish() {
        let stream = test_stream(Compression::None, Some(Schema::Trades));
        let mut out = Vec::new();
        let mut transcoder = Transcoder::new(&mut out, TranscodeParams::new(Encoding::Csv)).unwrap();
        // drop the final 10 bytes mid-record
        transcoder.write(&stream[..stream.len() - 10]).unwrap();
        let res = transcoder.finish();
        assert!(matches!(res, Err(Error::Dbn(dbn::Error::Decode(msg))) if msg.contains("truncated")));
    }

    #[test]
    fn unknown_container_is_an_error() {
        let mut out = Vec::new();
        let mut transcoder = Transcoder::new(&mut out, TranscodeParams::new(Encoding::Csv)).unwrap();
        let res = transcoder.write(b"totally not dbn");
        assert!(matches!(res, Err(Error::Dbn(dbn::Error::Decode(msg))) if msg.contains("unknown container")));
    }

    #[test]
    fn ohlcv_with_mixed_chunks() {
        let metadata = MetadataBuilder::new()
            .dataset(dbn::datasets::GLBX_MDP3)
            .schema(Some(Schema::Ohlcv1D))
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .build();
        let mut stream = Vec::new();
        let mut encoder = DbnEncoder::new(&mut stream, &metadata).unwrap();
        encoder.encode_record(&OhlcvMsg::default()).unwrap();
        drop(encoder);

        let mut out = Vec::new();
        let mut transcoder = Transcoder::new(&mut out, TranscodeParams::new(Encoding::Csv)).unwrap();
        let mid = stream.len() / 2 + 3;
        transcoder.write(&stream[..mid]).unwrap();
        transcoder.write(&stream[mid..]).unwrap();
        transcoder.finish().unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }
}
