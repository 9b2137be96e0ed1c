//! Presentation models built from [UsageState](crate::storage::entities::UsageState). Nothing here
//! renders anything, the CLI decides how a bar or a color ends up on the terminal.

pub mod annotation;
pub mod charts;
pub mod history;

/// Short scroll distance, `1234` becomes `1.2k`.
pub fn format_pixels(pixels: i64) -> String {
    if pixels.unsigned_abs() >= 1000 {
        format!("{:.1}k", pixels as f64 / 1000.)
    } else {
        pixels.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::format_pixels;

    #[test]
    fn test_format_pixels() {
        assert_eq!(format_pixels(0), "0");
        assert_eq!(format_pixels(999), "999");
        assert_eq!(format_pixels(1000), "1.0k");
        assert_eq!(format_pixels(1234), "1.2k");
        assert_eq!(format_pixels(-2500), "-2.5k");
    }
}
