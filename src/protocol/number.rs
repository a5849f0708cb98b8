/// Token written for values the ingestion port should store as null.
pub const NAN_TOKEN: &str = "NaN";

/// Render a metric value without exponent notation.
///
/// Finite values use the shortest decimal that round-trips, integral values
/// keep a trailing `.0`. NaN and infinities all render as `NaN`.
pub fn format_metric_value(value: f64) -> String {
    if !value.is_finite() {
        return NAN_TOKEN.to_string();
    }

    let mut rendered = value.to_string();
    if !rendered.contains('.') {
        rendered.push_str(".0");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_values_keep_decimal_point() {
        assert_eq!(format_metric_value(35791.0), "35791.0");
        assert_eq!(format_metric_value(0.0), "0.0");
        assert_eq!(format_metric_value(-2.0), "-2.0");
    }

    #[test]
    fn test_fractional_values() {
        assert_eq!(format_metric_value(-31.1), "-31.1");
        assert_eq!(format_metric_value(0.125), "0.125");
    }

    #[test]
    fn test_no_exponent_notation() {
        assert_eq!(format_metric_value(1e20), "100000000000000000000.0");
        assert_eq!(format_metric_value(1e-7), "0.0000001");
        assert!(!format_metric_value(123_456_789_012.5).contains('e'));
    }

    #[test]
    fn test_non_finite_values() {
        assert_eq!(format_metric_value(f64::NAN), "NaN");
        assert_eq!(format_metric_value(f64::INFINITY), "NaN");
        assert_eq!(format_metric_value(f64::NEG_INFINITY), "NaN");
    }
}
