//! New types for pretty-printing the timestamps and fixed-precision prices found in
//! DBN records.

use std::fmt;

use time::format_description::BorrowedFormatItem;

use crate::FIXED_PRICE_SCALE;

/// A new type for formatting nanosecond UNIX timestamps to the canonical ISO 8601
/// format.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Ts(pub u64);

/// A new type for formatting the fixed-precision prices used in DBN.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Px(pub i64);

impl From<u64> for Ts {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<i64> for Px {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

const TS_FORMAT: &[BorrowedFormatItem<'static>] = time::macros::format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
);

impl fmt::Display for Ts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.0;
        if ts != 0 && ts != crate::UNDEF_TIMESTAMP {
            // Always in range because we're widening from u64 to i128
            let dt = time::OffsetDateTime::from_unix_timestamp_nanos(ts as i128).unwrap();
            if let Ok(dt_str) = dt.format(TS_FORMAT) {
                f.pad(&dt_str)?;
            } else {
                // Fall back to plain integer formatting
                fmt::Display::fmt(&ts, f)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let px = self.0;
        if px == crate::UNDEF_PRICE {
            f.write_str("UNDEF_PRICE")
        } else {
            let (is_nonnegative, px_abs) = if px < 0 { (false, -px) } else { (true, px) };
            let px_integer = px_abs / FIXED_PRICE_SCALE;
            let px_fraction = px_abs % FIXED_PRICE_SCALE;
            f.pad_integral(is_nonnegative, "", &format!("{px_integer}.{px_fraction:09}"))
        }
    }
}

/// Converts a fixed-precision price to a decimal string with all 9 decimal places.
pub fn fmt_px(px: i64) -> String {
    let mut res = String::new();
    // Writing to a string is infallible
    fmt_px_into(&mut res, px).unwrap();
    res
}

pub(crate) fn fmt_px_into<W: fmt::Write>(mut out: W, px: i64) -> fmt::Result {
    if px == crate::UNDEF_PRICE {
        write!(out, "UNDEF_PRICE")
    } else {
        let (sign, px_abs) = if px < 0 { ("-", -px) } else { ("", px) };
        let px_integer = px_abs / FIXED_PRICE_SCALE;
        let px_fraction = px_abs % FIXED_PRICE_SCALE;
        write!(
            out,
            "{sign}{}.{:0>9}",
            itoa::Buffer::new().format(px_integer),
            itoa::Buffer::new().format(px_fraction)
        )
    }
}

/// Converts a nanosecond UNIX timestamp to a human-readable string in the format
/// `[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z`.
pub fn fmt_ts(ts: u64) -> String {
    Ts(ts).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn px_display() {
        assert_eq!(Px(372_275_000_000_000).to_string(), "372275.000000000");
        assert_eq!(Px(-100_500_000).to_string(), "-0.100500000");
        assert_eq!(Px(crate::UNDEF_PRICE).to_string(), "UNDEF_PRICE");
        assert_eq!(fmt_px(1_000_000_001), "1.000000001");
    }

    #[test]
    fn ts_display() {
        assert_eq!(fmt_ts(0), "");
        assert_eq!(fmt_ts(crate::UNDEF_TIMESTAMP), "");
        assert_eq!(
            fmt_ts(1_700_000_000_000_000_000),
            "2023-11-14T22:13:20.000000000Z"
        );
    }
}
