//! A container over a DBN byte source exposing metadata, readers, record
//! iteration, and tabular, CSV, and JSON projections.

mod layout;

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use dbn::{
    decode::{
        dbn::starts_with_prefix as starts_with_dbn, zstd::ZSTD_FRAME_MAGIC, DbnMetadataDecoder,
        DecodeRecord, DecodeRecordRef, DynDecoder, DynReader,
    },
    Compression, Encoding, HasRType, Metadata, Record, RecordEnum, Schema, FIXED_PRICE_SCALE,
    UNDEF_PRICE, UNDEF_TIMESTAMP,
};
use polars::prelude::{AnyValue, DataFrame, DataType, NamedFrom, Series, TimeUnit};

use crate::{
    store::layout::{schema_layout, schema_record_size, Field, FieldKind},
    symbology::InstrumentMap,
    transcode::{TranscodeParams, Transcoder},
    Error, Result,
};

/// The backing bytes of a [`DbnStore`]: a file path or an in-memory buffer. Both
/// are rewindable, so every iteration starts at the record offset after the
/// metadata frame.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// A DBN file on disk.
    File(PathBuf),
    /// An in-memory DBN buffer.
    Memory(Arc<Vec<u8>>),
}

#[derive(Clone)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A fresh reader over the raw bytes of a [`DataSource`].
pub enum SourceReader {
    /// A reader over a file.
    File(BufReader<File>),
    /// A reader over an in-memory buffer.
    Memory(io::Cursor<SharedBytes>),
}

impl io::Read for SourceReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::File(reader) => reader.read(buf),
            Self::Memory(reader) => reader.read(buf),
        }
    }
}

impl DataSource {
    fn reader(&self) -> Result<SourceReader> {
        match self {
            Self::File(path) => {
                let file = File::open(path).map_err(|e| {
                    Error::io(e, format!("opening DBN file at path '{}'", path.display()))
                })?;
                Ok(SourceReader::File(BufReader::new(file)))
            }
            Self::Memory(bytes) => Ok(SourceReader::Memory(io::Cursor::new(SharedBytes(
                Arc::clone(bytes),
            )))),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory(_) => "<memory>".to_owned(),
        }
    }

    fn nbytes(&self) -> Result<u64> {
        match self {
            Self::File(path) => Ok(std::fs::metadata(path)
                .map_err(|e| Error::io(e, format!("reading size of '{}'", path.display())))?
                .len()),
            Self::Memory(bytes) => Ok(bytes.len() as u64),
        }
    }
}

/// How to represent price fields in the tabular projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriceType {
    /// Leave the fixed-precision integers as-is.
    Fixed,
    /// Divide by 1e9, with the null sentinel becoming NaN.
    #[default]
    Float,
    /// Exact fixed-point decimals with scale 9.
    Decimal,
}

/// Parameters for the tabular projection of a [`DbnStore`].
#[derive(Debug, Clone)]
pub struct DfParams {
    /// How to represent price fields.
    pub price_type: PriceType,
    /// If `true`, timestamp columns become tz-aware UTC datetimes, with the
    /// undefined sentinel becoming null.
    pub pretty_ts: bool,
    /// If `true`, adds a `symbol` column resolved per-row by the row's date
    /// against the store's instrument map.
    pub map_symbols: bool,
    /// The schema to project. Required iff the store is heterogeneous.
    pub schema: Option<Schema>,
    /// The maximum number of records per frame. `None` produces a single frame
    /// with everything.
    pub count: Option<usize>,
}

impl Default for DfParams {
    fn default() -> Self {
        Self {
            price_type: PriceType::Float,
            pretty_ts: true,
            map_symbols: true,
            schema: None,
            count: None,
        }
    }
}

/// Parameters for the CSV and JSON projections of a [`DbnStore`].
#[derive(Debug, Clone)]
pub struct ExportParams {
    /// If `true`, prices are rendered as fixed-precision decimal strings.
    pub pretty_px: bool,
    /// If `true`, timestamps are rendered as ISO 8601 datetime strings.
    pub pretty_ts: bool,
    /// If `true`, each row gets a symbol resolved against the store's instrument
    /// map.
    pub map_symbols: bool,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            pretty_px: true,
            pretty_ts: true,
            map_symbols: true,
        }
    }
}

/// A container over a DBN byte source: the decoded metadata, the detected
/// compression, and projections over the record stream.
pub struct DbnStore {
    source: DataSource,
    metadata: Metadata,
    compression: Compression,
    instrument_map: Mutex<InstrumentMap>,
}

impl DbnStore {
    /// Opens the DBN file at `path`.
    ///
    /// # Errors
    /// This function returns an error if the file is missing, empty, or not DBN.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(DataSource::File(path.as_ref().to_path_buf()))
    }

    /// Creates a store over an in-memory DBN buffer.
    ///
    /// # Errors
    /// This function returns an error if the buffer is empty or not DBN.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(DataSource::Memory(Arc::new(data.into())))
    }

    fn new(source: DataSource) -> Result<Self> {
        if source.nbytes()? == 0 {
            return Err(Error::Empty(source.name()));
        }
        let compression = Self::detect_compression(&source)?;
        let mut decoded = DynReader::new(source.reader()?, compression)?;
        let metadata = DbnMetadataDecoder::new(&mut decoded).decode()?;
        let instrument_map = {
            let mut map = InstrumentMap::new();
            // live captures aren't guaranteed to carry instrument-ID mappings
            let _ = map.insert_metadata(&metadata);
            Mutex::new(map)
        };
        Ok(Self {
            source,
            metadata,
            compression,
            instrument_map,
        })
    }

    fn detect_compression(source: &DataSource) -> Result<Compression> {
        let mut reader = source.reader()?;
        let mut prefix = [0u8; 18];
        let nbytes = read_up_to(&mut reader, &mut prefix)
            .map_err(|e| Error::io(e, "reading container prefix"))?;
        let prefix = &prefix[..nbytes];
        // The skippable-frame encapsulation of metadata precedes uncompressed
        // records, so only a standard zstd frame means a compressed stream.
        if starts_with_dbn(prefix) {
            Ok(Compression::None)
        } else if prefix.len() >= 4 {
            let magic = u32::from_le_bytes(prefix[..4].try_into().unwrap());
            if magic == ZSTD_FRAME_MAGIC {
                Ok(Compression::ZStd)
            } else if dbn::decode::zstd::ZSTD_SKIPPABLE_MAGIC_RANGE.contains(&magic) {
                Ok(Compression::None)
            } else {
                Err(Error::Dbn(dbn::Error::decode("unknown container")))
            }
        } else {
            Err(Error::Dbn(dbn::Error::decode("unknown container")))
        }
    }

    /// Returns the decoded metadata of the store.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the record schema of the store. `None` indicates a heterogeneous
    /// stream, which can only come from a live capture.
    pub fn schema(&self) -> Option<Schema> {
        self.metadata.schema
    }

    /// Returns the detected compression of the underlying source.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Returns the dataset code of the store.
    pub fn dataset(&self) -> &str {
        &self.metadata.dataset
    }

    /// Returns the size of the store's raw bytes, compressed if so.
    ///
    /// # Errors
    /// This function returns an error if the source file can't be read.
    pub fn nbytes(&self) -> Result<u64> {
        self.source.nbytes()
    }

    /// Returns a snapshot of the store's instrument map, as populated from the
    /// metadata and any symbol mapping records observed during iteration.
    pub fn instrument_map(&self) -> InstrumentMap {
        self.instrument_map.lock().unwrap().clone()
    }

    /// Returns a fresh reader over the bytes as stored, compressed if so.
    ///
    /// # Errors
    /// This function returns an error if the source file can't be opened.
    pub fn raw_reader(&self) -> Result<SourceReader> {
        self.source.reader()
    }

    /// Returns a fresh reader over the transparently decompressed bytes,
    /// positioned at the record offset immediately after the metadata frame.
    ///
    /// # Errors
    /// This function returns an error if the source can't be read or the metadata
    /// frame is invalid.
    pub fn decoded_reader(&self) -> Result<impl io::Read + '_> {
        let mut decoded = DynReader::new(self.source.reader()?, self.compression)?;
        // consume the metadata frame to position the reader at the first record
        DbnMetadataDecoder::new(&mut decoded).decode()?;
        Ok(decoded)
    }

    fn decoder(&self) -> Result<DynDecoder<'static, BufReader<SourceReader>>> {
        Ok(DynDecoder::new(self.source.reader()?, self.compression)?)
    }

    /// Eagerly decodes every record of type `T` in the store.
    ///
    /// # Errors
    /// This function returns an error if the source can't be read or contains a
    /// record of a type other than `T`.
    pub fn records<T: HasRType + Clone>(&self) -> Result<Vec<T>> {
        Ok(self.decoder()?.decode_records::<T>()?)
    }

    /// Returns an iterator over all non-metadata records of the store in stream
    /// order. Symbol mapping records update the store's instrument map as they
    /// pass.
    ///
    /// # Errors
    /// This function returns an error if the source can't be read.
    pub fn iter_records(&self) -> Result<StoreIter<'_>> {
        Ok(StoreIter {
            decoder: self.decoder()?,
            store: self,
        })
    }

    /// Returns an iterator of contiguous batches of records of type `T`, of at
    /// most `count` records each; with `count = None` a single batch contains
    /// everything. For heterogeneous stores, records of other types are filtered
    /// out.
    ///
    /// # Errors
    /// This function returns an error if the source can't be read or, for a
    /// homogeneous store, `T` doesn't match the store's schema.
    pub fn to_record_batches<T: HasRType + Clone>(
        &self,
        count: Option<usize>,
    ) -> Result<RecordBatchIter<T>> {
        let homogeneous = match self.schema() {
            Some(schema) => {
                if !T::has_rtype(dbn::RType::from(schema) as u8) {
                    return Err(Error::bad_argument(
                        "T",
                        format!("record type doesn't match the stream schema {schema}"),
                    ));
                }
                true
            }
            None => false,
        };
        Ok(RecordBatchIter {
            decoder: self.decoder()?,
            count,
            homogeneous,
            done: false,
            _marker: std::marker::PhantomData,
        })
    }

    /// Produces the tabular projection of the store as one dataframe.
    ///
    /// The first column is the layout's index timestamp.
    ///
    /// # Errors
    /// This function returns an error if the store is heterogeneous and
    /// `params.schema` is `None`, or if the source can't be read.
    pub fn to_df(&self, params: DfParams) -> Result<DataFrame> {
        let mut iter = self.to_df_iter(DfParams {
            count: None,
            ..params
        })?;
        iter.next()
            .unwrap_or_else(|| empty_df(iter.layout, &iter.params))
    }

    /// Returns an iterator of dataframes of at most `params.count` rows each.
    ///
    /// # Errors
    /// This function returns an error if the store is heterogeneous and
    /// `params.schema` is `None`, or if the source can't be read.
    pub fn to_df_iter(&self, params: DfParams) -> Result<DfIter> {
        let schema = match (params.schema, self.schema()) {
            (Some(schema), _) => schema,
            (None, Some(schema)) => schema,
            (None, None) => {
                return Err(Error::bad_argument(
                    "schema",
                    "the store is heterogeneous; a schema must be specified",
                ))
            }
        };
        Ok(DfIter {
            decoder: self.decoder()?,
            layout: schema_layout(schema),
            record_size: schema_record_size(schema),
            rtype: dbn::RType::from(schema) as u8,
            params,
            instrument_map: self.instrument_map.lock().unwrap().clone(),
            done: false,
        })
    }

    /// Transcodes the entire store to CSV at `path`, preserving record order. The
    /// output begins with a header row.
    ///
    /// # Errors
    /// This function returns an error if the store is heterogeneous, the source
    /// can't be read, or the output can't be written.
    pub fn to_csv(&self, path: impl AsRef<Path>, params: ExportParams) -> Result<()> {
        self.transcode(path.as_ref(), Encoding::Csv, params)
    }

    /// Transcodes the entire store to newline-delimited JSON at `path`,
    /// preserving record order.
    ///
    /// # Errors
    /// This function returns an error if the source can't be read or the output
    /// can't be written.
    pub fn to_json(&self, path: impl AsRef<Path>, params: ExportParams) -> Result<()> {
        self.transcode(path.as_ref(), Encoding::Json, params)
    }

    fn transcode(&self, path: &Path, encoding: Encoding, params: ExportParams) -> Result<()> {
        let out = File::create(path)
            .map_err(|e| Error::io(e, format!("creating output file '{}'", path.display())))?;
        let mut transcoder = Transcoder::new(
            io::BufWriter::new(out),
            TranscodeParams {
                encoding,
                pretty_px: params.pretty_px,
                pretty_ts: params.pretty_ts,
                instrument_map: params
                    .map_symbols
                    .then(|| self.instrument_map.lock().unwrap().clone()),
            },
        )?;
        let mut reader = self.raw_reader()?;
        let mut chunk = [0u8; 16 * 1024];
        loop {
            let nbytes = reader
                .read(&mut chunk)
                .map_err(|e| Error::io(e, "reading DBN source"))?;
            if nbytes == 0 {
                break;
            }
            transcoder.write(&chunk[..nbytes])?;
        }
        transcoder.finish()
    }

    /// Writes the store's exact byte representation, including its compression
    /// state, to a new file at `path`.
    ///
    /// # Errors
    /// This function returns an error if the source can't be read or the output
    /// can't be written.
    pub fn write_dbn(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut reader = self.raw_reader()?;
        let mut out = File::create(path)
            .map_err(|e| Error::io(e, format!("creating output file '{}'", path.display())))?;
        io::copy(&mut reader, &mut out)
            .map_err(|e| Error::io(e, format!("writing DBN to '{}'", path.display())))?;
        Ok(())
    }
}

fn read_up_to<R: io::Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// An iterator over all non-metadata records of a [`DbnStore`].
pub struct StoreIter<'a> {
    decoder: DynDecoder<'static, BufReader<SourceReader>>,
    store: &'a DbnStore,
}

impl Iterator for StoreIter<'_> {
    type Item = Result<RecordEnum>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.decoder.decode_record_ref() {
            Ok(Some(rec_ref)) => {
                if let Some(mapping) = rec_ref.get::<dbn::SymbolMappingMsg>() {
                    let mut map = self.store.instrument_map.lock().unwrap();
                    if let Err(err) = map.insert_symbol_mapping(mapping) {
                        return Some(Err(err));
                    }
                }
                Some(RecordEnum::try_from_ref(rec_ref).map_err(Error::from))
            }
            Ok(None) => None,
            Err(e) => Some(Err(Error::from(e))),
        }
    }
}

/// An iterator of contiguous batches of records of a single type. For
/// heterogeneous streams it filters by record type; for homogeneous streams it
/// expects every record to match.
pub struct RecordBatchIter<T> {
    decoder: DynDecoder<'static, BufReader<SourceReader>>,
    count: Option<usize>,
    homogeneous: bool,
    done: bool,
    _marker: std::marker::PhantomData<T>,
}

impl<T: HasRType + Clone> Iterator for RecordBatchIter<T> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let limit = self.count.unwrap_or(usize::MAX);
        let mut batch = Vec::new();
        while batch.len() < limit {
            if self.homogeneous {
                // contiguous, uniform records
                match self.decoder.decode_record::<T>() {
                    Ok(Some(rec)) => batch.push(rec.clone()),
                    Ok(None) => {
                        self.done = true;
                        break;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(Error::from(e)));
                    }
                }
            } else {
                // mixed stream: filter by record type
                match self.decoder.decode_record_ref() {
                    Ok(Some(rec_ref)) => {
                        if let Some(rec) = rec_ref.get::<T>() {
                            batch.push(rec.clone());
                        }
                    }
                    Ok(None) => {
                        self.done = true;
                        break;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(Error::from(e)));
                    }
                }
            }
        }
        if batch.is_empty() && self.done && self.count.is_some() {
            None
        } else if batch.is_empty() && self.count.is_none() && self.done {
            // a single batch is always produced for `count = None`
            Some(Ok(batch))
        } else if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

/// An iterator of dataframes over the records of a [`DbnStore`].
pub struct DfIter {
    decoder: DynDecoder<'static, BufReader<SourceReader>>,
    layout: &'static [Field],
    record_size: usize,
    rtype: u8,
    params: DfParams,
    instrument_map: InstrumentMap,
    done: bool,
}

impl Iterator for DfIter {
    type Item = Result<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let limit = self.params.count.unwrap_or(usize::MAX);
        let mut raw_records: Vec<Vec<u8>> = Vec::new();
        while raw_records.len() < limit {
            match self.decoder.decode_record_ref() {
                Ok(Some(rec_ref)) => {
                    if let Some(mapping) = rec_ref.get::<dbn::SymbolMappingMsg>() {
                        let _ = self.instrument_map.insert_symbol_mapping(mapping);
                    }
                    if rec_ref.header().rtype == self.rtype
                        && rec_ref.record_size() >= self.record_size
                    {
                        raw_records.push(rec_ref.as_ref().to_vec());
                    }
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::from(e)));
                }
            }
        }
        if raw_records.is_empty() && self.params.count.is_some() {
            return None;
        }
        Some(build_df(
            self.layout,
            &self.params,
            &raw_records,
            &self.instrument_map,
        ))
    }
}

fn empty_df(layout: &'static [Field], params: &DfParams) -> Result<DataFrame> {
    build_df(layout, params, &[], &InstrumentMap::new())
}

fn build_df(
    layout: &'static [Field],
    params: &DfParams,
    raw_records: &[Vec<u8>],
    instrument_map: &InstrumentMap,
) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(layout.len() + usize::from(params.map_symbols));
    for field in layout {
        columns.push(build_series(field, params, raw_records)?);
    }
    if params.map_symbols {
        columns.push(build_symbol_series(layout, raw_records, instrument_map));
    }
    DataFrame::new(columns).map_err(Error::from)
}

fn read_u64(record: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(record[offset..offset + 8].try_into().unwrap())
}

fn read_i64(record: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(record[offset..offset + 8].try_into().unwrap())
}

fn build_series(field: &Field, params: &DfParams, raw_records: &[Vec<u8>]) -> Result<Series> {
    let offset = field.offset;
    let series = match field.kind {
        FieldKind::U8 => Series::new(
            field.name,
            raw_records.iter().map(|r| r[offset]).collect::<Vec<u8>>(),
        ),
        FieldKind::U16 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| u16::from_le_bytes(r[offset..offset + 2].try_into().unwrap()))
                .collect::<Vec<u16>>(),
        ),
        FieldKind::U32 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| u32::from_le_bytes(r[offset..offset + 4].try_into().unwrap()))
                .collect::<Vec<u32>>(),
        ),
        FieldKind::U64 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| read_u64(r, offset))
                .collect::<Vec<u64>>(),
        ),
        FieldKind::I8 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| r[offset] as i8)
                .collect::<Vec<i8>>(),
        ),
        FieldKind::I16 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| i16::from_le_bytes(r[offset..offset + 2].try_into().unwrap()))
                .collect::<Vec<i16>>(),
        ),
        FieldKind::I32 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| i32::from_le_bytes(r[offset..offset + 4].try_into().unwrap()))
                .collect::<Vec<i32>>(),
        ),
        FieldKind::I64 => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| read_i64(r, offset))
                .collect::<Vec<i64>>(),
        ),
        FieldKind::Px => build_px_series(field.name, params.price_type, raw_records, offset)?,
        FieldKind::Ts => {
            if params.pretty_ts {
                let values: Vec<Option<i64>> = raw_records
                    .iter()
                    .map(|r| match read_u64(r, offset) {
                        UNDEF_TIMESTAMP => None,
                        ts => Some(ts as i64),
                    })
                    .collect();
                Series::new(field.name, values)
                    .cast(&DataType::Datetime(
                        TimeUnit::Nanoseconds,
                        Some("UTC".to_string()),
                    ))
                    .map_err(Error::from)?
            } else {
                Series::new(
                    field.name,
                    raw_records
                        .iter()
                        .map(|r| read_u64(r, offset))
                        .collect::<Vec<u64>>(),
                )
            }
        }
        FieldKind::Char => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| {
                    let c = r[offset];
                    if c == 0 {
                        String::new()
                    } else {
                        (c as char).to_string()
                    }
                })
                .collect::<Vec<String>>(),
        ),
        FieldKind::Str(len) => Series::new(
            field.name,
            raw_records
                .iter()
                .map(|r| {
                    let bytes = &r[offset..offset + len];
                    let end = bytes.iter().position(|b| *b == 0).unwrap_or(len);
                    String::from_utf8_lossy(&bytes[..end]).into_owned()
                })
                .collect::<Vec<String>>(),
        ),
    };
    Ok(series)
}

fn build_px_series(
    name: &str,
    price_type: PriceType,
    raw_records: &[Vec<u8>],
    offset: usize,
) -> Result<Series> {
    Ok(match price_type {
        PriceType::Fixed => Series::new(
            name,
            raw_records
                .iter()
                .map(|r| read_i64(r, offset))
                .collect::<Vec<i64>>(),
        ),
        PriceType::Float => Series::new(
            name,
            raw_records
                .iter()
                .map(|r| match read_i64(r, offset) {
                    UNDEF_PRICE => f64::NAN,
                    px => px as f64 / FIXED_PRICE_SCALE as f64,
                })
                .collect::<Vec<f64>>(),
        ),
        PriceType::Decimal => {
            let values: Vec<AnyValue> = raw_records
                .iter()
                .map(|r| match read_i64(r, offset) {
                    UNDEF_PRICE => AnyValue::Null,
                    px => AnyValue::Decimal(px as i128, 9),
                })
                .collect();
            Series::from_any_values_and_dtype(
                name,
                &values,
                &DataType::Decimal(None, Some(9)),
                true,
            )
            .map_err(Error::from)?
        }
    })
}

fn build_symbol_series(
    layout: &'static [Field],
    raw_records: &[Vec<u8>],
    instrument_map: &InstrumentMap,
) -> Series {
    // the leading layout column is the index timestamp; instrument ID follows the
    // header layout
    let index_offset = layout[0].offset;
    let instrument_id_offset = layout
        .iter()
        .find(|f| f.name == "instrument_id")
        .map(|f| f.offset)
        .expect("layouts contain instrument_id");
    let values: Vec<Option<String>> = raw_records
        .iter()
        .map(|r| {
            let instrument_id =
                u32::from_le_bytes(r[instrument_id_offset..instrument_id_offset + 4].try_into().unwrap());
            let date = dbn::ts_to_dt(read_u64(r, index_offset)).map(|dt| dt.date())?;
            instrument_map
                .resolve(instrument_id, date)
                .map(str::to_owned)
        })
        .collect();
    Series::new("symbol", values)
}

impl From<polars::error::PolarsError> for Error {
    fn from(err: polars::error::PolarsError) -> Self {
        Error::bad_argument("dataframe", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use dbn::{
        encode::{dbn::Encoder as DbnEncoder, DynWriter, EncodeRecord},
        MetadataBuilder, OhlcvMsg, RecordHeader, SType, TradeMsg,
    };
    use rstest::rstest;
    use time::macros::date;

    use super::*;

    fn trades_metadata() -> Metadata {
        MetadataBuilder::new()
            .dataset(dbn::datasets::XNAS_ITCH)
            .schema(Some(Schema::Trades))
            .start(1_700_000_000_000_000_000)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .mappings(vec![dbn::SymbolMapping {
                raw_symbol: "AAPL".to_owned(),
                intervals: vec![dbn::MappingInterval {
                    start_date: date!(2023 - 11 - 01),
                    end_date: date!(2023 - 12 - 01),
                    symbol: "32".to_owned(),
                }],
            }])
            .build()
    }

    fn trade_rec(sequence: u32, price: i64) -> TradeMsg {
        TradeMsg {
            hd: RecordHeader::new::<TradeMsg>(
                dbn::rtype::MBP_0,
                1,
                32,
                1_700_000_000_000_000_000,
            ),
            price,
            size: 1,
            action: b'T' as std::os::raw::c_char,
            side: b'B' as std::os::raw::c_char,
            flags: 0,
            depth: 0,
            ts_recv: 1_700_000_000_000_000_000,
            ts_in_delta: 0,
            sequence,
        }
    }

    fn trades_store(compression: Compression, count: u32) -> DbnStore {
        let mut buffer = Vec::new();
        let mut encoder = DbnEncoder::new(
            DynWriter::new(&mut buffer, compression).unwrap(),
            &trades_metadata(),
        )
        .unwrap();
        for sequence in 0..count {
            encoder
                .encode_record(&trade_rec(sequence, 5_000_000_000 + sequence as i64))
                .unwrap();
        }
        encoder.flush().unwrap();
        drop(encoder);
        DbnStore::from_bytes(buffer).unwrap()
    }

    #[rstest]
    #[case::uncompressed(Compression::None)]
    #[case::zstd(Compression::ZStd)]
    fn metadata_and_compression_detection(#[case] compression: Compression) {
        let store = trades_store(compression, 2);
        assert_eq!(store.compression(), compression);
        assert_eq!(store.schema(), Some(Schema::Trades));
        assert_eq!(store.dataset(), dbn::datasets::XNAS_ITCH);
    }

    #[test]
    fn empty_source_is_an_error() {
        assert!(matches!(
            DbnStore::from_bytes(Vec::new()),
            Err(Error::Empty(_))
        ));
    }

    #[test]
    fn unknown_container_is_an_error() {
        let res = DbnStore::from_bytes(b"unknown bytes that are not dbn".to_vec());
        assert!(matches!(res, Err(Error::Dbn(dbn::Error::Decode(msg))) if msg.contains("unknown")));
    }

    #[test]
    fn missing_file_is_io_error() {
        let res = DbnStore::from_file("/nonexistent/path/data.dbn");
        assert!(matches!(res, Err(Error::Io { .. })));
    }

    #[rstest]
    #[case::uncompressed(Compression::None)]
    #[case::zstd(Compression::ZStd)]
    fn records_round_trip(#[case] compression: Compression) {
        let store = trades_store(compression, 3);
        let records = store.records::<TradeMsg>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].sequence, 2);
    }

    #[rstest]
    fn iteration_yields_in_order_and_rewinds(#[values(2usize, 5)] n: usize) {
        let store = trades_store(Compression::None, n as u32);
        for _ in 0..2 {
            let seqs: Vec<u32> = store
                .iter_records()
                .unwrap()
                .map(|r| match r.unwrap() {
                    RecordEnum::Trade(t) => t.sequence,
                    _ => panic!("unexpected record type"),
                })
                .collect();
            assert_eq!(seqs, (0..n as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn record_batches_chunking() {
        let store = trades_store(Compression::None, 5);
        let batches: Vec<Vec<TradeMsg>> = store
            .to_record_batches::<TradeMsg>(Some(2))
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);

        let all: Vec<Vec<TradeMsg>> = store
            .to_record_batches::<TradeMsg>(None)
            .unwrap()
            .map(|b| b.unwrap())
            .collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].len(), 5);
    }

    #[test]
    fn record_batches_wrong_type_is_error() {
        let store = trades_store(Compression::None, 1);
        assert!(matches!(
            store.to_record_batches::<OhlcvMsg>(None),
            Err(Error::BadArgument { .. })
        ));
    }

    #[test]
    fn df_row_count_and_columns() {
        let store = trades_store(Compression::None, 4);
        let df = store
            .to_df(DfParams {
                price_type: PriceType::Fixed,
                pretty_ts: false,
                map_symbols: false,
                schema: None,
                count: None,
            })
            .unwrap();
        assert_eq!(df.height(), 4);
        let layout = schema_layout(Schema::Trades);
        assert_eq!(df.width(), layout.len());
        assert_eq!(df.get_column_names()[0], "ts_recv");
    }

    #[test]
    fn df_float_prices() {
        let mut buffer = Vec::new();
        let metadata = trades_metadata();
        let mut encoder = DbnEncoder::new(&mut buffer, &metadata).unwrap();
        encoder
            .encode_record(&trade_rec(0, 372_275_000_000_000))
            .unwrap();
        let mut undef = trade_rec(1, 0);
        undef.price = UNDEF_PRICE;
        encoder.encode_record(&undef).unwrap();
        drop(encoder);
        let store = DbnStore::from_bytes(buffer).unwrap();

        let df = store
            .to_df(DfParams {
                price_type: PriceType::Float,
                pretty_ts: false,
                map_symbols: false,
                schema: None,
                count: None,
            })
            .unwrap();
        let prices = df.column("price").unwrap().f64().unwrap();
        assert_eq!(prices.get(0), Some(372_275.0));
        assert!(prices.get(1).unwrap().is_nan());
    }

    #[test]
    fn df_map_symbols() {
        let store = trades_store(Compression::None, 2);
        let df = store.to_df(DfParams::default()).unwrap();
        let symbols = df.column("symbol").unwrap().utf8().unwrap();
        // ts 1_700_000_000 is 2023-11-14, within the mapped interval
        assert_eq!(symbols.get(0), Some("AAPL"));
    }

    #[test]
    fn df_mixed_stream_requires_schema() {
        let metadata = MetadataBuilder::new()
            .dataset(dbn::datasets::XNAS_ITCH)
            .schema(None)
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .build();
        let mut buffer = Vec::new();
        let mut encoder = DbnEncoder::new(&mut buffer, &metadata).unwrap();
        encoder.encode_record(&TradeMsg::default()).unwrap();
        encoder.encode_record(&OhlcvMsg::default()).unwrap();
        drop(encoder);
        let store = DbnStore::from_bytes(buffer).unwrap();

        let res = store.to_df(DfParams::default());
        assert!(matches!(res, Err(Error::BadArgument { param_name, .. }) if param_name == "schema"));

        // specifying the schema projects only the matching records
        let df = store
            .to_df(DfParams {
                schema: Some(Schema::Trades),
                map_symbols: false,
                ..DfParams::default()
            })
            .unwrap();
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn write_dbn_round_trips_bytes() {
        let store = trades_store(Compression::ZStd, 3);
        let dir = std::env::temp_dir().join("dbn_store_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.dbn.zst");
        store.write_dbn(&path).unwrap();

        let reopened = DbnStore::from_file(&path).unwrap();
        assert_eq!(reopened.metadata(), store.metadata());
        assert_eq!(reopened.compression(), Compression::ZStd);
        let original = store.records::<TradeMsg>().unwrap();
        let roundtripped = reopened.records::<TradeMsg>().unwrap();
        assert_eq!(original, roundtripped);
        std::fs::remove_file(&path).ok();
    }

    #[rstest]
    fn to_csv_and_json_transcode(#[values(true, false)] map_symbols: bool) {
        let store = trades_store(Compression::None, 2);
        let dir = std::env::temp_dir().join("dbn_store_test");
        std::fs::create_dir_all(&dir).unwrap();
        let csv_path = dir.join(format!("out_{map_symbols}.csv"));
        let json_path = dir.join(format!("out_{map_symbols}.json"));

        store
            .to_csv(
                &csv_path,
                ExportParams {
                    map_symbols,
                    ..Default::default()
                },
            )
            .unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert_eq!(csv.lines().next().unwrap().ends_with(",symbol"), map_symbols);

        store
            .to_json(
                &json_path,
                ExportParams {
                    map_symbols,
                    ..Default::default()
                },
            )
            .unwrap();
        let json = std::fs::read_to_string(&json_path).unwrap();
        assert_eq!(json.lines().count(), 2);
        assert_eq!(json.contains("\"symbol\":\"AAPL\""), map_symbols);

        std::fs::remove_file(&csv_path).ok();
        std::fs::remove_file(&json_path).ok();
    }
}
