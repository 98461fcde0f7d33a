//! Console output icons and styled text helpers.

use console::{style, StyledObject};

/// Success checkmark icon (green ✓).
pub fn success() -> StyledObject<&'static str> {
    style("✓").green()
}

/// Info/progress arrow icon (cyan →).
pub fn info() -> StyledObject<&'static str> {
    style("→").cyan()
}

/// Warning icon (yellow !).
pub fn warn() -> StyledObject<&'static str> {
    style("!").yellow()
}

/// Error icon (red ✗).
pub fn error() -> StyledObject<&'static str> {
    style("✗").red()
}

/// Dim arrow for secondary info.
pub fn dim_arrow() -> StyledObject<&'static str> {
    style("→").dim()
}

/// Bullet point.
pub fn bullet() -> StyledObject<&'static str> {
    style("•").dim()
}

/// Confidence as a percentage, coloured by how trustworthy it is.
pub fn confidence(value: f32) -> StyledObject<String> {
    let text = format!("{:.0}%", value * 100.0);
    if value >= 0.75 {
        style(text).green()
    } else if value >= 0.4 {
        style(text).yellow()
    } else {
        style(text).red()
    }
}
