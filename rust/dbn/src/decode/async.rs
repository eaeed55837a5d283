//! Async decoding of DBN metadata and records built on tokio.

use async_compression::tokio::bufread::ZstdDecoder;
use tokio::io;

use crate::{
    compat,
    decode::FromLittleEndianSlice,
    enums::VersionUpgradePolicy,
    error::silence_eof_error,
    HasRType, Metadata, RecordHeader, RecordRef, DBN_VERSION, METADATA_FIXED_LEN,
};

use super::dbn::{DBN_PREFIX, DBN_PREFIX_LEN};

/// An async decoder for Databento Binary Encoding (DBN), both metadata and records.
pub struct Decoder<R>
where
    R: io::AsyncReadExt + Unpin,
{
    metadata: Metadata,
    decoder: RecordDecoder<R>,
}

impl<R> Decoder<R>
where
    R: io::AsyncReadExt + Unpin,
{
    /// Creates a new async DBN [`Decoder`] from `reader`. Records from previous DBN
    /// versions are upgraded to the current version.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader` or the input is encoded in a newer version of DBN.
    pub async fn new(reader: R) -> crate::Result<Self> {
        Self::with_upgrade_policy(reader, VersionUpgradePolicy::default()).await
    }

    /// Creates a new async DBN [`Decoder`] from `reader` that will decode records
    /// from previous DBN versions according to `upgrade_policy`.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader` or the input is encoded in a newer version of DBN.
    pub async fn with_upgrade_policy(
        mut reader: R,
        upgrade_policy: VersionUpgradePolicy,
    ) -> crate::Result<Self> {
        let mut metadata = MetadataDecoder::new(&mut reader).decode().await?;
        let version = metadata.version;
        let ts_out = metadata.ts_out;
        metadata.upgrade(upgrade_policy);
        Ok(Self {
            decoder: RecordDecoder::with_version(reader, version, upgrade_policy, ts_out)?,
            metadata,
        })
    }

    /// Returns a reference to the decoded metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns a mutable reference to the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        self.decoder.get_mut()
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

    /// Tries to decode a single record of type `T`. Returns `Ok(None)` if the reader
    /// has been exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error, the
    /// input is truncated mid-record, or the next record is of a different type than
    /// `T`.
    pub async fn decode_record<'a, T: HasRType + 'a>(&'a mut self) -> crate::Result<Option<&'a T>> {
        self.decoder.decode().await
    }

    /// Tries to decode a generic reference to a record. Returns `Ok(None)` if the
    /// reader has been exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error, the
    /// `length` of the record is invalid, or the input ends mid-record.
    pub async fn decode_record_ref(&mut self) -> crate::Result<Option<RecordRef>> {
        self.decoder.decode_ref().await
    }
}

impl<R> Decoder<ZstdDecoder<io::BufReader<R>>>
where
    R: io::AsyncReadExt + Unpin,
{
    /// Creates a new async DBN [`Decoder`] from Zstandard-compressed `reader`.
    ///
    /// # Errors
    /// This function returns an error if it is unable to parse the metadata in
    /// `reader`.
    pub async fn with_zstd(reader: R) -> crate::Result<Self> {
        Self::new(zstd_decoder(io::BufReader::new(reader))).await
    }
}

/// Helper to always enable decoding multiple frames.
fn zstd_decoder<R>(reader: R) -> ZstdDecoder<R>
where
    R: io::AsyncBufReadExt + Unpin,
{
    let mut zstd_decoder = ZstdDecoder::new(reader);
    zstd_decoder.multiple_members(true);
    zstd_decoder
}

/// An async decoder for files and streams of DBN records.
pub struct RecordDecoder<R>
where
    R: io::AsyncReadExt + Unpin,
{
    version: u8,
    upgrade_policy: VersionUpgradePolicy,
    ts_out: bool,
    last_ts_out: Option<u64>,
    reader: R,
    read_buffer: Vec<u8>,
    /// The total bytes of the in-progress record including any send timestamp
    /// trailer, or 0 when between records. Persisting the read progress in the
    /// decoder makes `decode_ref` cancel safe.
    pending_total: usize,
    filled: usize,
    compat_buffer: [u8; crate::MAX_RECORD_LEN],
}

impl<R> RecordDecoder<R>
where
    R: io::AsyncReadExt + Unpin,
{
    /// Creates a new async `RecordDecoder` that will decode from `reader`.
    ///
    /// Note: assumes the input is of the current DBN version. To decode records from
    /// a previous version, use [`RecordDecoder::with_version()`].
    pub fn new(reader: R) -> Self {
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
            read_buffer: vec![0],
            pending_total: 0,
            filled: 0,
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

    /// Consumes the decoder and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Tries to decode a single record of type `T`. Returns `Ok(None)` if the reader
    /// has been exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error, the
    /// input is truncated mid-record, or the next record is of a different type than
    /// `T`.
    pub async fn decode<'a, T: HasRType + 'a>(&'a mut self) -> crate::Result<Option<&'a T>> {
        let rec_ref = self.decode_ref().await?;
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
    /// reader has been exhausted.
    ///
    /// # Errors
    /// This function returns an error if the underlying reader returns an error, the
    /// `length` of the record is invalid, or the input ends mid-record.
    ///
    /// # Cancel safety
    /// This method is cancel safe: the progress through a partially-read record is
    /// kept in the decoder, so it can be used in a [`tokio::select!`] statement
    /// without corrupting the stream.
    pub async fn decode_ref(&mut self) -> crate::Result<Option<RecordRef>> {
        let io_err = |e| crate::Error::io(e, "decoding record reference");
        if self.pending_total == 0 {
            // A single-byte read is all-or-nothing, so no progress is lost if
            // this future is dropped here.
            if let Err(err) = self.reader.read_exact(&mut self.read_buffer[..1]).await {
                return silence_eof_error(err).map_err(io_err);
            }
            let length = self.read_buffer[0] as usize * RecordHeader::LENGTH_MULTIPLIER;
            if length < std::mem::size_of::<RecordHeader>() {
                return Err(crate::Error::decode(format!(
                    "invalid record with length {length} shorter than the header"
                )));
            }
            let total = length + if self.ts_out { 8 } else { 0 };
            if total > self.read_buffer.len() {
                self.read_buffer.resize(total, 0);
            }
            self.pending_total = total;
            self.filled = 1;
        }
        while self.filled < self.pending_total {
            match self
                .reader
                .read(&mut self.read_buffer[self.filled..self.pending_total])
                .await
            {
                Ok(0) => {
                    return Err(crate::Error::decode(
                        "unexpected end of input: truncated record",
                    ))
                }
                Ok(nbytes) => self.filled += nbytes,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(crate::Error::io(e, "decoding record")),
            }
        }
        let total = std::mem::take(&mut self.pending_total);
        self.filled = 0;
        let length = total - if self.ts_out { 8 } else { 0 };
        self.last_ts_out = self.ts_out.then(|| {
            u64::from_le_bytes(self.read_buffer[length..total].try_into().unwrap())
        });
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

/// An async decoder for DBN [`Metadata`].
pub struct MetadataDecoder<R>
where
    R: io::AsyncReadExt + Unpin,
{
    reader: R,
}

impl<R> MetadataDecoder<R>
where
    R: io::AsyncReadExt + Unpin,
{
    /// Creates a new async DBN [`MetadataDecoder`] from `reader`.
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
    pub async fn decode(&mut self) -> crate::Result<Metadata> {
        let mut prelude_buffer = [0u8; 8];
        self.reader
            .read_exact(&mut prelude_buffer)
            .await
            .map_err(|e| crate::Error::io(e, "reading metadata prelude"))?;
        if crate::decode::zstd::ZSTD_SKIPPABLE_MAGIC_RANGE
            .contains(&u32::from_le_slice(&prelude_buffer))
        {
            self.reader
                .read_exact(&mut prelude_buffer)
                .await
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
            .await
            .map_err(|e| crate::Error::io(e, "reading fixed metadata"))?;
        super::dbn::MetadataDecoder::<std::fs::File>::decode_metadata_fields(
            version,
            metadata_buffer,
        )
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode::{dbn::Encoder, EncodeRecord},
        MetadataBuilder, OhlcvMsg, SType, Schema,
    };

    #[tokio::test]
    async fn decode_ref_cancel_safety() {
        let (client, server) = tokio::io::duplex(16);
        let mut decoder = RecordDecoder::new(client);
        let rec = crate::TradeMsg {
            price: 42,
            ..Default::default()
        };
        let bytes = rec.as_ref().to_vec();
        let writer_task = tokio::spawn(async move {
            let mut server = server;
            for chunk in bytes.chunks(7) {
                io::AsyncWriteExt::write_all(&mut server, chunk).await.unwrap();
                io::AsyncWriteExt::flush(&mut server).await.unwrap();
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            }
        });
        // repeatedly cancel the in-flight decode without corrupting the stream
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(1));
        let decoded = loop {
            tokio::select! {
                biased;
                _ = interval.tick() => {}
                res = decoder.decode_ref() => {
                    break *res.unwrap().unwrap().get::<crate::TradeMsg>().unwrap();
                }
            }
        };
        assert_eq!(decoded, rec);
        writer_task.await.unwrap();
    }

    #[tokio::test]
    async fn async_decode_matches_sync() {
        let metadata = MetadataBuilder::new()
            .dataset(crate::datasets::GLBX_MDP3)
            .schema(Some(Schema::Ohlcv1D))
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .build();
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, &metadata).unwrap();
        let rec = OhlcvMsg {
            open: 1,
            high: 4,
            low: 0,
            close: 3,
            volume: 88,
            ..Default::default()
        };
        encoder.encode_record(&rec).unwrap();
        drop(encoder);

        let mut decoder = Decoder::new(buffer.as_slice()).await.unwrap();
        assert_eq!(decoder.metadata().dataset, crate::datasets::GLBX_MDP3);
        let res = decoder.decode_record::<OhlcvMsg>().await.unwrap().unwrap();
        assert_eq!(*res, rec);
        assert!(decoder.decode_record::<OhlcvMsg>().await.unwrap().is_none());
    }
}
