//! Decoding DBN and Zstandard-compressed DBN files and streams.

pub mod dbn;
mod stream;
#[doc(hidden)]
pub mod zstd;

// Re-exports
pub use self::dbn::{
    Decoder as DbnDecoder, MetadataDecoder as DbnMetadataDecoder, RecordDecoder as DbnRecordDecoder,
};
pub use stream::StreamIterDecoder;

#[cfg(feature = "async")]
mod r#async;
#[cfg(feature = "async")]
pub use r#async::{
    Decoder as AsyncDbnDecoder, MetadataDecoder as AsyncDbnMetadataDecoder,
    RecordDecoder as AsyncDbnRecordDecoder,
};

use std::{
    fs::File,
    io::{self, BufReader},
    mem,
    path::Path,
};

use crate::{enums::Compression, record::HasRType, record_ref::RecordRef, Metadata};

/// Trait for decoders with access to the stream's [`Metadata`].
pub trait DbnMetadata {
    /// Returns a reference to the decoded [`Metadata`].
    fn metadata(&self) -> &Metadata;

    /// Returns a mutable reference to the decoded [`Metadata`].
    fn metadata_mut(&mut self) -> &mut Metadata;
}

/// Trait for types that decode references to DBN records of a dynamic type.
pub trait DecodeRecordRef {
    /// Tries to decode a generic reference to a record. Returns `Ok(None)` if the
    /// input has been exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error or
    /// the input is truncated mid-record. If the `length` property of the record is
    /// invalid, an [`Error::Decode`](crate::Error::Decode) is returned.
    fn decode_record_ref(&mut self) -> crate::Result<Option<RecordRef>>;
}

/// Trait for types that decode DBN records of a particular type.
pub trait DecodeRecord: DecodeRecordRef {
    /// Tries to decode a reference to a single record of type `T`. Returns
    /// `Ok(None)` if the input has been exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error,
    /// the input is truncated mid-record, or the next record is of a different type
    /// than `T`.
    fn decode_record<T: HasRType>(&mut self) -> crate::Result<Option<&T>>;

    /// Tries to decode all records into a `Vec`. This eagerly decodes the data.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error,
    /// the input is truncated mid-record, or any of the records is of a different
    /// type than `T`.
    fn decode_records<T: HasRType + Clone>(mut self) -> crate::Result<Vec<T>>
    where
        Self: Sized,
    {
        let mut res = Vec::new();
        while let Some(rec) = self.decode_record::<T>()? {
            res.push(rec.clone());
        }
        Ok(res)
    }
}

/// Trait for decoders that can be converted to streaming iterators.
pub trait DecodeStream: DecodeRecord {
    /// Converts the decoder into a streaming iterator of records of type `T`. This
    /// lazily decodes the data.
    fn decode_stream<T: HasRType + Clone>(self) -> StreamIterDecoder<Self, T>
    where
        Self: Sized;
}

/// A decoder whose [`Compression`] is determined at runtime by peeking at the first
/// few bytes.
pub struct DynDecoder<'a, R>(DynDecoderImpl<'a, R>)
where
    R: io::BufRead;

enum DynDecoderImpl<'a, R>
where
    R: io::BufRead,
{
    Dbn(dbn::Decoder<R>),
    ZstdDbn(dbn::Decoder<::zstd::stream::Decoder<'a, R>>),
}

impl<R> DynDecoder<'_, BufReader<R>>
where
    R: io::Read,
{
    /// Creates a new [`DynDecoder`] from a reader, with the specified `compression`.
    ///
    /// # Errors
    /// This function returns an error if it fails to parse the metadata.
    pub fn new(reader: R, compression: Compression) -> crate::Result<Self> {
        Self::with_buffer(BufReader::new(reader), compression)
    }

    /// Creates a new [`DynDecoder`] from a reader, inferring the compression. If
    /// `reader` also implements [`io::BufRead`], it is better to use
    /// [`inferred_with_buffer()`](Self::inferred_with_buffer).
    ///
    /// # Errors
    /// This function returns an error if it is unable to determine the encoding of
    /// `reader` or it fails to parse the metadata.
    pub fn new_inferred(reader: R) -> crate::Result<Self> {
        Self::inferred_with_buffer(BufReader::new(reader))
    }
}

impl<R> DynDecoder<'_, R>
where
    R: io::BufRead,
{
    /// Creates a new [`DynDecoder`] from a buffered reader with the specified
    /// `compression`.
    ///
    /// # Errors
    /// This function returns an error if it fails to parse the metadata.
    pub fn with_buffer(reader: R, compression: Compression) -> crate::Result<Self> {
        match compression {
            Compression::None => Ok(Self(DynDecoderImpl::Dbn(dbn::Decoder::new(reader)?))),
            Compression::ZStd => Ok(Self(DynDecoderImpl::ZstdDbn(
                dbn::Decoder::with_zstd_buffer(reader)?,
            ))),
        }
    }

    /// Creates a new [`DynDecoder`] from a buffered reader, inferring the
    /// compression.
    ///
    /// # Errors
    /// This function returns an error if it is unable to determine the encoding of
    /// `reader` or it fails to parse the metadata.
    pub fn inferred_with_buffer(mut reader: R) -> crate::Result<Self> {
        let first_bytes = reader
            .fill_buf()
            .map_err(|e| crate::Error::io(e, "creating buffer to infer encoding"))?;
        if dbn::starts_with_prefix(first_bytes) {
            Ok(Self(DynDecoderImpl::Dbn(dbn::Decoder::new(reader)?)))
        } else if zstd::starts_with_prefix(first_bytes) {
            Ok(Self(DynDecoderImpl::ZstdDbn(
                dbn::Decoder::with_zstd_buffer(reader)?,
            )))
        } else {
            Err(crate::Error::decode("unable to determine encoding"))
        }
    }

    /// Returns the send timestamp appended to the most recently decoded record, if
    /// there was one.
    pub fn last_ts_out(&self) -> Option<u64> {
        match &self.0 {
            DynDecoderImpl::Dbn(decoder) => decoder.last_ts_out(),
            DynDecoderImpl::ZstdDbn(decoder) => decoder.last_ts_out(),
        }
    }
}

impl DynDecoder<'_, BufReader<File>> {
    /// Creates a new [`DynDecoder`] from the file at `path`.
    ///
    /// # Errors
    /// This function returns an error if the file doesn't exist, it is unable to
    /// determine the encoding of the file, or it fails to parse the metadata.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            crate::Error::io(
                e,
                format!(
                    "opening file to decode at path '{}'",
                    path.as_ref().display()
                ),
            )
        })?;
        DynDecoder::new_inferred(file)
    }
}

impl<R> DbnMetadata for DynDecoder<'_, R>
where
    R: io::BufRead,
{
    fn metadata(&self) -> &Metadata {
        match &self.0 {
            DynDecoderImpl::Dbn(decoder) => decoder.metadata(),
            DynDecoderImpl::ZstdDbn(decoder) => decoder.metadata(),
        }
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        match &mut self.0 {
            DynDecoderImpl::Dbn(decoder) => decoder.metadata_mut(),
            DynDecoderImpl::ZstdDbn(decoder) => decoder.metadata_mut(),
        }
    }
}

impl<R> DecodeRecordRef for DynDecoder<'_, R>
where
    R: io::BufRead,
{
    fn decode_record_ref(&mut self) -> crate::Result<Option<RecordRef>> {
        match &mut self.0 {
            DynDecoderImpl::Dbn(decoder) => decoder.decode_record_ref(),
            DynDecoderImpl::ZstdDbn(decoder) => decoder.decode_record_ref(),
        }
    }
}

impl<R> DecodeRecord for DynDecoder<'_, R>
where
    R: io::BufRead,
{
    fn decode_record<T: HasRType>(&mut self) -> crate::Result<Option<&T>> {
        match &mut self.0 {
            DynDecoderImpl::Dbn(decoder) => decoder.decode_record(),
            DynDecoderImpl::ZstdDbn(decoder) => decoder.decode_record(),
        }
    }
}

impl<R> DecodeStream for DynDecoder<'_, R>
where
    R: io::BufRead,
{
    fn decode_stream<T: HasRType + Clone>(self) -> StreamIterDecoder<Self, T> {
        StreamIterDecoder::new(self)
    }
}

/// Type for runtime polymorphism over reading uncompressed or Zstandard-compressed
/// input. Implements [`std::io::Read`].
pub struct DynReader<'a, R>(DynReaderImpl<'a, R>)
where
    R: io::BufRead;

enum DynReaderImpl<'a, R>
where
    R: io::BufRead,
{
    Uncompressed(R),
    ZStd(::zstd::stream::Decoder<'a, R>),
}

impl<R> DynReader<'_, BufReader<R>>
where
    R: io::Read,
{
    /// Creates a new [`DynReader`] from a reader, with the specified `compression`.
    ///
    /// # Errors
    /// This function returns an error if it fails to create the zstd decoder.
    pub fn new(reader: R, compression: Compression) -> crate::Result<Self> {
        Self::with_buffer(BufReader::new(reader), compression)
    }

    /// Creates a new [`DynReader`] from a reader, inferring the compression.
    ///
    /// # Errors
    /// This function returns an error if it is unable to read from `reader` or it
    /// fails to create the zstd decoder.
    pub fn new_inferred(reader: R) -> crate::Result<Self> {
        Self::inferred_with_buffer(BufReader::new(reader))
    }
}

impl<R> DynReader<'_, R>
where
    R: io::BufRead,
{
    /// Creates a new [`DynReader`] from a buffered reader with the specified
    /// `compression`.
    ///
    /// # Errors
    /// This function returns an error if it fails to create the zstd decoder.
    pub fn with_buffer(reader: R, compression: Compression) -> crate::Result<Self> {
        match compression {
            Compression::None => Ok(Self(DynReaderImpl::Uncompressed(reader))),
            Compression::ZStd => Ok(Self(DynReaderImpl::ZStd(
                ::zstd::stream::Decoder::with_buffer(reader)
                    .map_err(|e| crate::Error::io(e, "creating zstd decoder"))?,
            ))),
        }
    }

    /// Creates a new [`DynReader`] from a buffered reader, inferring the
    /// compression.
    ///
    /// # Errors
    /// This function returns an error if it fails to read from `reader` or creating
    /// the zstd decoder fails.
    pub fn inferred_with_buffer(mut reader: R) -> crate::Result<Self> {
        let first_bytes = reader
            .fill_buf()
            .map_err(|e| crate::Error::io(e, "creating buffer to infer compression"))?;
        if zstd::starts_with_prefix(first_bytes) {
            Ok(Self(DynReaderImpl::ZStd(
                ::zstd::stream::Decoder::with_buffer(reader)
                    .map_err(|e| crate::Error::io(e, "creating zstd decoder"))?,
            )))
        } else {
            Ok(Self(DynReaderImpl::Uncompressed(reader)))
        }
    }
}

impl DynReader<'_, BufReader<File>> {
    /// Creates a new [`DynReader`] from the file at `path`.
    ///
    /// # Errors
    /// This function returns an error if the file doesn't exist or it is unable to
    /// determine the compression of the file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            crate::Error::io(
                e,
                format!(
                    "opening file to decode at path '{}'",
                    path.as_ref().display()
                ),
            )
        })?;
        DynReader::new_inferred(file)
    }
}

impl<R> io::Read for DynReader<'_, R>
where
    R: io::BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            DynReaderImpl::Uncompressed(r) => r.read(buf),
            DynReaderImpl::ZStd(r) => r.read(buf),
        }
    }
}

pub(crate) trait FromLittleEndianSlice {
    fn from_le_slice(slice: &[u8]) -> Self;
}

impl FromLittleEndianSlice for u64 {
    /// NOTE: assumes the length of `slice` is at least 8 bytes
    fn from_le_slice(slice: &[u8]) -> Self {
        let (bytes, _) = slice.split_at(mem::size_of::<Self>());
        Self::from_le_bytes(bytes.try_into().unwrap())
    }
}

impl FromLittleEndianSlice for u32 {
    /// NOTE: assumes the length of `slice` is at least 4 bytes
    fn from_le_slice(slice: &[u8]) -> Self {
        let (bytes, _) = slice.split_at(mem::size_of::<Self>());
        Self::from_le_bytes(bytes.try_into().unwrap())
    }
}

impl FromLittleEndianSlice for u16 {
    /// NOTE: assumes the length of `slice` is at least 2 bytes
    fn from_le_slice(slice: &[u8]) -> Self {
        let (bytes, _) = slice.split_at(mem::size_of::<Self>());
        Self::from_le_bytes(bytes.try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use crate::{
        encode::{dbn::Encoder, DynWriter, EncodeRecord},
        MetadataBuilder, OhlcvMsg, SType, Schema,
    };

    use super::*;

    fn test_metadata() -> Metadata {
        MetadataBuilder::new()
            .dataset(crate::datasets::XNAS_ITCH)
            .schema(Some(Schema::Ohlcv1D))
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .build()
    }

    fn encode_test_data(compression: Compression) -> Vec<u8> {
        let mut buffer = Vec::new();
        let writer = DynWriter::new(&mut buffer, compression).unwrap();
        let mut encoder = Encoder::new(writer, &test_metadata()).unwrap();
        encoder.encode_record(&OhlcvMsg::default()).unwrap();
        encoder.flush().unwrap();
        drop(encoder);
        buffer
    }

    #[test]
    fn dyn_reader_infers_compression() {
        let uncompressed = encode_test_data(Compression::None);
        let compressed = encode_test_data(Compression::ZStd);

        let mut plain_res = Vec::new();
        DynReader::new_inferred(Cursor::new(&uncompressed))
            .unwrap()
            .read_to_end(&mut plain_res)
            .unwrap();
        let mut zstd_res = Vec::new();
        DynReader::new_inferred(Cursor::new(&compressed))
            .unwrap()
            .read_to_end(&mut zstd_res)
            .unwrap();
        assert_eq!(plain_res, zstd_res);
        assert_eq!(plain_res, uncompressed);
    }

    #[test]
    fn dyn_decoder_infers_either_container() {
        for compression in [Compression::None, Compression::ZStd] {
            let buffer = encode_test_data(compression);
            let mut decoder = DynDecoder::new_inferred(Cursor::new(buffer)).unwrap();
            assert_eq!(decoder.metadata().dataset, crate::datasets::XNAS_ITCH);
            let rec = decoder.decode_record::<OhlcvMsg>().unwrap().unwrap();
            assert_eq!(*rec, OhlcvMsg::default());
            assert!(decoder.decode_record::<OhlcvMsg>().unwrap().is_none());
        }
    }

    #[test]
    fn unknown_container_is_an_error() {
        let res = DynDecoder::new_inferred(Cursor::new(b"not a valid input".to_vec()));
        assert!(
            matches!(res, Err(crate::Error::Decode(msg)) if msg.contains("unable to determine"))
        );
    }
}
