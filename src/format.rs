//! Human-readable byte-size formatting for download item display.

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Formats a byte count using binary (1024) units.
///
/// Selects the largest unit whose threshold the value reaches and renders at
/// most two decimal places with trailing zeros trimmed: `1536` becomes
/// `"1.5 KB"`, `1024` becomes `"1 KB"`, `0` becomes `"0 B"`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 4] = [(TB, "TB"), (GB, "GB"), (MB, "MB"), (KB, "KB")];

    for (threshold, unit) in UNITS {
        if bytes >= threshold {
            #[allow(clippy::cast_precision_loss)]
            let value = bytes as f64 / threshold as f64;
            return format!("{} {unit}", trim_trailing_zeros(&format!("{value:.2}")));
        }
    }
    format!("{bytes} B")
}

/// Strips trailing zeros (and a then-dangling decimal point) from a number
/// rendered with fixed precision.
fn trim_trailing_zeros(value: &str) -> &str {
    value.trim_end_matches('0').trim_end_matches('.')
}
