//! Terminal output helpers shared by the commands.

use std::io::Write;

pub fn write_error(err: &mut dyn Write, msg: &str) -> std::io::Result<()> {
    writeln!(err, "Error: {}", msg)
}

/// Display a warning message to stderr with "WARNING:" prefix
pub fn display_warning(err: &mut dyn Write, message: &str) -> std::io::Result<()> {
    writeln!(err, "WARNING: {}", message)
}

/// `count` out of `total` as a percentage with one decimal.
pub fn percent(count: u32, total: u32) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", f64::from(count) * 100.0 / f64::from(total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_has_prefix() {
        let mut err = Vec::new();
        display_warning(&mut err, "levels ignored").unwrap();
        assert_eq!(String::from_utf8(err).unwrap(), "WARNING: levels ignored\n");
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(3, 0), "0.0%");
        assert_eq!(percent(1, 3), "33.3%");
    }
}
