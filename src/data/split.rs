use std::ops::Range;

/// Splits `total` samples into a leading training range and a trailing test range.
///
/// The test range holds `floor(total * test_ratio)` samples, so small datasets
/// may end up with an empty test range.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
pub fn split_ranges(total: usize, test_ratio: f32) -> (Range<usize>, Range<usize>) {
    assert!((0.0..1.0).contains(&test_ratio), "test_ratio out of range");

    // Stays in f32: 10 files at 0.7 give 7 test files.
    let test_len = (total as f32 * test_ratio).floor() as usize;
    let boundary = total - test_len.min(total);

    (0..boundary, boundary..total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_takes_the_tail_for_testing() {
        assert_eq!(split_ranges(10, 0.1), (0..9, 9..10));
        assert_eq!(split_ranges(100, 0.25), (0..75, 75..100));
    }

    #[test]
    fn typed_ratios_keep_their_decimal_value() {
        assert_eq!(split_ranges(10, 0.7), (0..3, 3..10));
        assert_eq!(split_ranges(10, "0.9".parse().unwrap()), (0..1, 1..10));
    }

    #[test]
    fn small_datasets_can_have_no_test_split() {
        assert_eq!(split_ranges(5, 0.1), (0..5, 5..5));
        assert_eq!(split_ranges(0, 0.5), (0..0, 0..0));
    }

    #[test]
    fn zero_ratio_keeps_everything_for_training() {
        assert_eq!(split_ranges(7, 0.0), (0..7, 7..7));
    }
}
