//! Formatting helpers shared by the command-line reports.

/// Format an integer with thousands separators (e.g., "12,345").
pub fn format_count(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a percentage with one decimal (e.g., "40.0%").
pub fn format_percent(pct: f64) -> String {
    format!("{:.1}%", pct)
}

/// Format an optional statistic, or "-" when undefined.
pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
        assert_eq!(format_count(-12_345), "-12,345");
    }

    #[test]
    fn test_format_stat() {
        assert_eq!(format_stat(Some(3.0)), "3");
        assert_eq!(format_stat(Some(1.25778)), "1.258");
        assert_eq!(format_stat(None), "-");
        assert_eq!(format_percent(40.0), "40.0%");
    }
}
