/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! FIX CheckSum(10).
//!
//! The checksum is the byte sum of everything before the `10=` field, modulo
//! 256, rendered as exactly three ASCII digits.

/// Sums `data` modulo 256.
///
/// # Example
/// ```
/// use fixline_tagvalue::checksum::{calculate_checksum, format_checksum};
///
/// let data = b"8=FIX.4.4\x019=5\x0135=0\x01";
/// let rendered = format_checksum(calculate_checksum(data));
/// assert_eq!(rendered.len(), 3);
/// ```
#[inline]
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Renders a checksum as three zero-padded ASCII digits.
#[inline]
#[must_use]
pub fn format_checksum(checksum: u8) -> [u8; 3] {
    [
        b'0' + checksum / 100,
        b'0' + (checksum / 10) % 10,
        b'0' + checksum % 10,
    ]
}

/// Parses a three-digit checksum value.
///
/// # Returns
/// `None` unless `bytes` is exactly three ASCII digits no greater than 255.
#[inline]
#[must_use]
pub fn parse_checksum(bytes: &[u8]) -> Option<u8> {
    let [a, b, c] = <[u8; 3]>::try_from(bytes).ok()?;
    if !(a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit()) {
        return None;
    }
    let value = u32::from(a - b'0') * 100 + u32::from(b - b'0') * 10 + u32::from(c - b'0');
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_wraps_at_256() {
        assert_eq!(calculate_checksum(b""), 0);
        assert_eq!(calculate_checksum(&[200, 100]), 44);
        let data = vec![255u8; 1000];
        assert_eq!(calculate_checksum(&data), ((255u32 * 1000) % 256) as u8);
    }

    #[test]
    fn test_known_heartbeat() {
        let frame = b"8=FIX.4.4\x019=5\x0135=0\x01";
        let sum: u32 = frame.iter().map(|&b| u32::from(b)).sum();
        assert_eq!(u32::from(calculate_checksum(frame)), sum % 256);
    }

    #[test]
    fn test_always_three_digits() {
        assert_eq!(format_checksum(0), *b"000");
        assert_eq!(format_checksum(7), *b"007");
        assert_eq!(format_checksum(42), *b"042");
        assert_eq!(format_checksum(255), *b"255");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(parse_checksum(b"042"), Some(42));
        assert_eq!(parse_checksum(b"42"), None);
        assert_eq!(parse_checksum(b"0042"), None);
        assert_eq!(parse_checksum(b"4a2"), None);
        assert_eq!(parse_checksum(b"256"), None);
    }
}
