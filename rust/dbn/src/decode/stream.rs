//! A streaming iterator adapter for record decoders.

use std::marker::PhantomData;

use streaming_iterator::StreamingIterator;

use crate::{decode::DecodeRecord, record::HasRType};

/// A consuming iterator wrapping a decoder. Lazily decodes the records of the DBN
/// stream one at a time.
///
/// Implements [`streaming_iterator::StreamingIterator`].
pub struct StreamIterDecoder<D, T>
where
    D: DecodeRecord,
    T: HasRType + Clone,
{
    /// The underlying decoder implementation.
    decoder: D,
    /// The most recently decoded record.
    current: Option<T>,
    /// Whether the decoder has hit the end of the stream or an error.
    finished: bool,
    _marker: PhantomData<T>,
}

impl<D, T> StreamIterDecoder<D, T>
where
    D: DecodeRecord,
    T: HasRType + Clone,
{
    pub(crate) fn new(decoder: D) -> Self {
        Self {
            decoder,
            current: None,
            finished: false,
            _marker: PhantomData,
        }
    }
}

impl<D, T> StreamingIterator for StreamIterDecoder<D, T>
where
    D: DecodeRecord,
    T: HasRType + Clone,
{
    type Item = T;

    fn advance(&mut self) {
        if self.finished {
            return;
        }
        match self.decoder.decode_record::<T>() {
            Ok(Some(rec)) => {
                self.current = Some(rec.clone());
            }
            // Also stops iterating on error, like `sys::io::Lines`
            Ok(None) | Err(_) => {
                self.finished = true;
                self.current = None;
            }
        }
    }

    fn get(&self) -> Option<&Self::Item> {
        if self.finished {
            None
        } else {
            self.current.as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use streaming_iterator::StreamingIterator;

    use crate::{
        decode::{dbn::Decoder, DecodeStream},
        encode::{dbn::Encoder, EncodeRecord},
        MetadataBuilder, SType, Schema, TradeMsg,
    };

    #[test]
    fn stream_yields_all_records() {
        let metadata = MetadataBuilder::new()
            .dataset(crate::datasets::XNAS_ITCH)
            .schema(Some(Schema::Trades))
            .start(0)
            .stype_in(Some(SType::RawSymbol))
            .stype_out(SType::InstrumentId)
            .build();
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, &metadata).unwrap();
        for sequence in 0..4u32 {
            encoder
                .encode_record(&TradeMsg {
                    sequence,
                    ..Default::default()
                })
                .unwrap();
        }
        drop(encoder);

        let decoder = Decoder::new(buffer.as_slice()).unwrap();
        let mut stream = decoder.decode_stream::<TradeMsg>();
        let mut expected_sequence = 0u32;
        while let Some(rec) = stream.next() {
            assert_eq!(rec.sequence, expected_sequence);
            expected_sequence += 1;
        }
        assert_eq!(expected_sequence, 4);
    }
}
