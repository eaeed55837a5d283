//! A wrapper for references to records of dynamic type.

use std::{marker::PhantomData, mem, ptr::NonNull, slice};

use crate::record::{HasRType, Record, RecordHeader};

/// A non-owning reference to a DBN record. Allows for mixing of record types and
/// schemas, and runtime record polymorphism.
#[derive(Clone, Copy, Debug)]
pub struct RecordRef<'a> {
    ptr: NonNull<RecordHeader>,
    _marker: PhantomData<&'a RecordHeader>,
}

// Safety: RecordRef exclusively provides read-only access.
unsafe impl Send for RecordRef<'_> {}
unsafe impl Sync for RecordRef<'_> {}

impl<'a> RecordRef<'a> {
    /// Constructs a new reference to the DBN record in `buffer`.
    ///
    /// # Safety
    /// `buffer` must begin with a valid [`RecordHeader`] and contain the complete
    /// record, i.e. at least `length * 4` bytes.
    pub unsafe fn new(buffer: &'a [u8]) -> Self {
        debug_assert!(buffer.len() >= mem::size_of::<RecordHeader>());
        let ptr = NonNull::new_unchecked(buffer.as_ptr().cast_mut().cast::<RecordHeader>());
        debug_assert!(buffer.len() >= ptr.as_ref().record_size());
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Returns a reference to the [`RecordHeader`] of the referenced record.
    pub fn header(&self) -> &'a RecordHeader {
        // Safety: `ptr` points to a `RecordHeader` by construction.
        unsafe { self.ptr.as_ref() }
    }

    /// Returns `true` if the object references a record of type `T`.
    pub fn has<T: HasRType>(&self) -> bool {
        T::has_rtype(self.header().rtype)
    }

    /// Returns a reference to the underlying record of type `T` or `None` if it
    /// references another record type.
    ///
    /// Note: for safety, this method calls [`has::<T>()`](Self::has) and checks the
    /// record length. To avoid a duplicate check, use
    /// [`get_unchecked()`](Self::get_unchecked).
    pub fn get<T: HasRType>(&self) -> Option<&'a T> {
        if self.has::<T>() && self.record_size() >= mem::size_of::<T>() {
            // Safety: checked `rtype` and size. Assumes the data passed to `new()`
            // is a valid record.
            Some(unsafe { self.ptr.cast::<T>().as_ref() })
        } else {
            None
        }
    }

    /// Returns a reference to the underlying record of type `T` without checking if
    /// this object references a record of type `T`.
    ///
    /// For a safe alternative, see [`get()`](Self::get).
    ///
    /// # Safety
    /// The caller needs to validate this object references a `T`.
    pub unsafe fn get_unchecked<T: HasRType>(&self) -> &'a T {
        debug_assert!(self.has::<T>());
        debug_assert!(self.record_size() >= mem::size_of::<T>());
        self.ptr.cast::<T>().as_ref()
    }
}

impl AsRef<[u8]> for RecordRef<'_> {
    fn as_ref(&self) -> &[u8] {
        // Safety: the constructor requires the buffer contain the complete record.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.record_size()) }
    }
}

impl Record for RecordRef<'_> {
    fn header(&self) -> &RecordHeader {
        RecordRef::header(self)
    }

    fn raw_index_ts(&self) -> u64 {
        use crate::record::{
            ImbalanceMsg, InstrumentDefMsg, MboMsg, Mbp10Msg, Mbp1Msg, StatMsg, StatusMsg,
            TradeMsg,
        };
        // Prefer ts_recv for the record types that have it.
        if let Some(rec) = self.get::<MboMsg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<TradeMsg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<Mbp1Msg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<Mbp10Msg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<StatusMsg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<InstrumentDefMsg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<ImbalanceMsg>() {
            rec.ts_recv
        } else if let Some(rec) = self.get::<StatMsg>() {
            rec.ts_recv
        } else {
            self.header().ts_event
        }
    }
}

impl<'a, R: HasRType> From<&'a R> for RecordRef<'a> {
    fn from(rec: &'a R) -> Self {
        Self {
            // Safety: a reference is never null.
            ptr: unsafe {
                NonNull::new_unchecked((rec.header() as *const RecordHeader).cast_mut())
            },
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::record::{ErrorMsg, MboMsg, OhlcvMsg, TradeMsg};

    use super::*;

    #[test]
    fn get_checks_rtype() {
        let rec = MboMsg::default();
        let rec_ref = RecordRef::from(&rec);
        assert!(rec_ref.has::<MboMsg>());
        assert!(!rec_ref.has::<TradeMsg>());
        assert!(rec_ref.get::<TradeMsg>().is_none());
        assert_eq!(*rec_ref.get::<MboMsg>().unwrap(), rec);
    }

    #[test]
    fn as_ref_covers_whole_record() {
        let rec = ErrorMsg::new(1, "uh oh", true);
        let rec_ref = RecordRef::from(&rec);
        assert_eq!(rec_ref.as_ref().len(), std::mem::size_of::<ErrorMsg>());
        assert_eq!(rec_ref.as_ref(), rec.as_ref());
    }

    #[test]
    fn index_ts_falls_back_to_ts_event() {
        let mut rec = OhlcvMsg::default();
        rec.hd.ts_event = 17;
        let rec_ref = RecordRef::from(&rec);
        assert_eq!(Record::raw_index_ts(&rec_ref), 17);
    }
}
