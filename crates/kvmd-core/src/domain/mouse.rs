//! Mouse coordinate math.
//!
//! Absolute pointer positions travel on the wire in the full signed 16-bit
//! range.  Some HID targets only accept a narrower window, so the daemon can
//! remap positions into a configured `[min, max]` range per axis.
//!
//! Relative and wheel deltas are signed bytes clamped to `±127`.  When a
//! client sends many small deltas at once they can be *squashed*: summed into
//! as few reports as possible without overflowing either axis.

/// The full absolute pointer range.
pub struct MouseRange;

impl MouseRange {
    pub const MIN: i32 = -32768;
    pub const MAX: i32 = 32767;
    pub const RANGE: (i32, i32) = (Self::MIN, Self::MAX);

    /// Maps `value` from the full range into `[out_min, out_max]`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kvmd_core::MouseRange;
    ///
    /// assert_eq!(MouseRange::remap(MouseRange::MIN, 0, 1000), 0);
    /// assert_eq!(MouseRange::remap(MouseRange::MAX, 0, 1000), 1000);
    /// ```
    pub fn remap(value: i32, out_min: i32, out_max: i32) -> i32 {
        remap(value, Self::MIN, Self::MAX, out_min, out_max)
    }
}

/// Integer linear map from `[in_min, in_max]` to `[out_min, out_max]`, rounding down.
pub fn remap(value: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    let in_span = i64::from(in_max) - i64::from(in_min);
    let in_span = if in_span == 0 { 1 } else { in_span };
    let scaled = (i64::from(value) - i64::from(in_min)) * (i64::from(out_max) - i64::from(out_min));
    (scaled.div_euclid(in_span) + i64::from(out_min)) as i32
}

/// Largest magnitude of a single relative or wheel delta.
pub const DELTA_LIMIT: i32 = 127;

/// Clamps a delta into `[-127, 127]`.
pub fn clamp_delta(value: i32) -> i32 {
    value.clamp(-DELTA_LIMIT, DELTA_LIMIT)
}

/// Sums consecutive deltas while both axes stay within [`DELTA_LIMIT`].
///
/// A delta that would overflow the running sum flushes it and starts a new
/// one.  A trailing all-zero sum is dropped.
pub fn squash_deltas<I>(deltas: I) -> Vec<(i32, i32)>
where
    I: IntoIterator<Item = (i32, i32)>,
{
    let mut squashed = Vec::new();
    let mut prev = (0, 0);
    for cur in deltas {
        let sum = (prev.0 + cur.0, prev.1 + cur.1);
        if sum.0.abs() > DELTA_LIMIT || sum.1.abs() > DELTA_LIMIT {
            squashed.push(prev);
            prev = cur;
        } else {
            prev = sum;
        }
    }
    if prev != (0, 0) {
        squashed.push(prev);
    }
    squashed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_full_range_is_identity() {
        for value in [MouseRange::MIN, -1, 0, 1, 12345, MouseRange::MAX] {
            assert_eq!(MouseRange::remap(value, MouseRange::MIN, MouseRange::MAX), value);
        }
    }

    #[test]
    fn test_remap_into_positive_window() {
        // Midpoint of the i16 range maps to (roughly) the midpoint of the window.
        assert_eq!(MouseRange::remap(0, 0, 65535), 32768);
        assert_eq!(MouseRange::remap(MouseRange::MIN, 100, 200), 100);
        assert_eq!(MouseRange::remap(MouseRange::MAX, 100, 200), 200);
    }

    #[test]
    fn test_remap_zero_width_input_does_not_divide_by_zero() {
        assert_eq!(remap(5, 5, 5, 0, 10), 0);
    }

    #[test]
    fn test_clamp_delta() {
        assert_eq!(clamp_delta(-128), -127);
        assert_eq!(clamp_delta(200), 127);
        assert_eq!(clamp_delta(-5), -5);
    }

    #[test]
    fn test_squash_sums_small_deltas() {
        assert_eq!(squash_deltas([(1, 1), (2, 2), (3, -3)]), vec![(6, 0)]);
    }

    #[test]
    fn test_squash_flushes_before_overflow() {
        assert_eq!(
            squash_deltas([(100, 0), (50, 0), (-10, 5)]),
            vec![(100, 0), (40, 5)]
        );
    }

    #[test]
    fn test_squash_drops_zero_remainder() {
        assert_eq!(squash_deltas([(5, 5), (-5, -5)]), Vec::<(i32, i32)>::new());
        assert!(squash_deltas(Vec::new()).is_empty());
    }
}
