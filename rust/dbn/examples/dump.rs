//! Dumps a DBN file (raw or Zstandard-compressed) to stdout as
//! newline-delimited JSON.

use std::io;

use dbn::{
    decode::{DbnMetadata, DynDecoder},
    encode::{EncodeDbn, JsonEncoder},
};

fn main() -> Result<(), dbn::Error> {
    let path = std::env::args().nth(1).ok_or_else(|| {
        dbn::Error::bad_argument("path", "usage: dump <PATH_TO_DBN_FILE>")
    })?;
    let decoder = DynDecoder::from_file(path)?;
    eprintln!(
        "dataset {} schema {}",
        decoder.metadata().dataset,
        decoder
            .metadata()
            .schema
            .map(|s| s.to_string())
            .unwrap_or_else(|| "mixed".to_owned())
    );
    let mut encoder = JsonEncoder::new(io::stdout().lock(), true, true);
    encoder.encode_decoded(decoder)
}
