//! Fixed-point amount arithmetic.
//!
//! Upstream amounts are string-encoded decimals with seven fractional
//! digits. The mapper must sum and compare them exactly, so they are parsed
//! into scaled integers rather than floats.

/// Fractional digits in upstream amount strings.
pub const AMOUNT_DECIMALS: u32 = 7;

const SCALE: i128 = 10_000_000;

/// Parse a string-encoded decimal into scaled integer units.
///
/// Accepts an optional leading minus, at most [`AMOUNT_DECIMALS`] fractional
/// digits, and nothing else. Returns `None` for anything malformed.
pub fn parse_amount(s: &str) -> Option<i128> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let mut parts = s.splitn(2, '.');
    let whole = parts.next()?;
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i128 = whole.parse().ok()?;

    let frac: i128 = match parts.next() {
        None => 0,
        Some(frac) => {
            if frac.is_empty()
                || frac.len() > AMOUNT_DECIMALS as usize
                || !frac.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            format!("{:0<width$}", frac, width = AMOUNT_DECIMALS as usize)
                .parse()
                .ok()?
        }
    };

    let scaled = whole.checked_mul(SCALE)?.checked_add(frac)?;
    Some(if negative { -scaled } else { scaled })
}

/// Format scaled integer units back into the canonical decimal string.
pub fn format_amount(scaled: i128) -> String {
    let sign = if scaled < 0 { "-" } else { "" };
    let abs = scaled.unsigned_abs();
    format!(
        "{}{}.{:07}",
        sign,
        abs / SCALE as u128,
        abs % SCALE as u128
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_amount("100"), Some(1_000_000_000));
        assert_eq!(parse_amount("100.5"), Some(1_005_000_000));
        assert_eq!(parse_amount("0.0000001"), Some(1));
        assert_eq!(parse_amount("-3.25"), Some(-32_500_000));
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("1.23456789"), None);
        assert_eq!(parse_amount("1.2.3"), None);
        assert_eq!(parse_amount("."), None);
    }

    #[test]
    fn formats_canonically() {
        assert_eq!(format_amount(1_000_000_000), "100.0000000");
        assert_eq!(format_amount(0), "0.0000000");
        assert_eq!(format_amount(-32_500_000), "-3.2500000");
    }

    #[test]
    fn roundtrips() {
        for s in ["0.0000000", "1.5000000", "922337203685.4775807"] {
            assert_eq!(format_amount(parse_amount(s).unwrap()), s);
        }
    }
}
