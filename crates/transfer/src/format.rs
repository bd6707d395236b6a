//! Human-readable progress and size strings.

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Rounded completion percentage, 0–100.
///
/// A zero `total` has nothing left to transfer and reports 100.
pub fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (done as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Formats a byte count in the largest unit that keeps the value below
/// 1024, with one decimal place. GB is the largest unit.
pub fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_examples() {
        assert_eq!(format_size(0), "0.0 B");
        assert_eq!(format_size(1023), "1023.0 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(1_073_741_824), "1.0 GB");
    }

    #[test]
    fn size_caps_at_gigabytes() {
        assert_eq!(format_size(2048 * 1_073_741_824), "2048.0 GB");
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(progress_percent(0, 200), 0);
        assert_eq!(progress_percent(1, 200), 1); // 0.5 rounds away from zero
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(200, 200), 100);
    }

    #[test]
    fn percent_guards_zero_total() {
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn percent_never_exceeds_100() {
        assert_eq!(progress_percent(300, 200), 100);
    }

    #[test]
    fn percent_is_monotonic() {
        let total = 40_000;
        let mut last = 0;
        for done in (0..=total).step_by(16_384).chain([total]) {
            let pct = progress_percent(done, total);
            assert!(pct >= last);
            last = pct;
        }
        assert_eq!(last, 100);
    }
}
