/// Compact display form of a count: `999`, `1k`, `1.5k`, `1M`, `2.5M`.
///
/// One decimal place, rounded half up, with a trailing `.0` dropped.
pub fn format_count(count: i64) -> String {
    if count >= 1_000_000 {
        compact(count, 1_000_000, "M")
    } else if count >= 1_000 {
        compact(count, 1_000, "k")
    } else {
        count.to_string()
    }
}

fn compact(count: i64, unit: i64, suffix: &str) -> String {
    let tenths = (i128::from(count) * 10 + i128::from(unit) / 2) / i128::from(unit);
    let (whole, frac) = (tenths / 10, tenths % 10);
    if frac == 0 {
        format!("{whole}{suffix}")
    } else {
        format!("{whole}.{frac}{suffix}")
    }
}
