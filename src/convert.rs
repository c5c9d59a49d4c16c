//! Unit conversion for raw station values.
//!
//! Source files store every measurement as an integer in tenths of a unit.
//! A reserved sentinel integer means "no measurement" and must come out of
//! here as `None`, never as zero.

/// Sentinel used by the station files when a value was not recorded.
pub const DEFAULT_MISSING_SENTINEL: i64 = -9999;

// ---

/// Convert tenths of a degree Celsius to degrees Celsius.
///
/// `556` becomes `55.6`. Returns `None` for an absent raw value or the sentinel.
pub fn temp_from_tenths(raw: Option<i64>, sentinel: i64) -> Option<f64> {
    // ---
    present(raw, sentinel).map(|v| v as f64 / 10.0)
}

/// Convert tenths of a millimetre of precipitation to centimetres.
///
/// Tenths of mm to mm is one division by ten, mm to cm is another. `100`
/// becomes `1.0`. Returns `None` for an absent raw value or the sentinel.
pub fn precip_cm_from_tenths_mm(raw: Option<i64>, sentinel: i64) -> Option<f64> {
    // ---
    present(raw, sentinel).map(|v| (v as f64 / 10.0) / 10.0)
}

fn present(raw: Option<i64>, sentinel: i64) -> Option<i64> {
    raw.filter(|v| *v != sentinel)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_temperature_tenths() {
        // ---
        assert_eq!(temp_from_tenths(Some(556), DEFAULT_MISSING_SENTINEL), Some(55.6));
        assert_eq!(temp_from_tenths(Some(-122), DEFAULT_MISSING_SENTINEL), Some(-12.2));
        assert_eq!(temp_from_tenths(Some(0), DEFAULT_MISSING_SENTINEL), Some(0.0));
    }

    #[test]
    fn test_precipitation_is_divided_exactly_twice() {
        // ---
        // 100 tenths of mm = 10 mm = 1.0 cm
        assert_eq!(
            precip_cm_from_tenths_mm(Some(100), DEFAULT_MISSING_SENTINEL),
            Some(1.0)
        );
        assert_eq!(
            precip_cm_from_tenths_mm(Some(5), DEFAULT_MISSING_SENTINEL),
            Some(0.05)
        );
    }

    #[test]
    fn test_sentinel_is_absent_not_zero() {
        // ---
        assert_eq!(temp_from_tenths(Some(-9999), DEFAULT_MISSING_SENTINEL), None);
        assert_eq!(precip_cm_from_tenths_mm(Some(-9999), DEFAULT_MISSING_SENTINEL), None);
        assert_eq!(temp_from_tenths(None, DEFAULT_MISSING_SENTINEL), None);
    }

    #[test]
    fn test_custom_sentinel() {
        // ---
        assert_eq!(temp_from_tenths(Some(-9999), -1), Some(-999.9));
        assert_eq!(temp_from_tenths(Some(-1), -1), None);
    }
}
