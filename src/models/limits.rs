//! Column widths of the VARCHAR fields, in characters
//!
//! Postgres rejects longer values and SQLite stores them silently, so
//! services check input against these before writing.

pub const EMAIL: usize = 255;
pub const USER_NAME: usize = 120;

pub const GUIDE_SLUG: usize = 150;
pub const GUIDE_NAME: usize = 150;
pub const CITY: usize = 100;
pub const WHATSAPP: usize = 40;

pub const THERAPY_SLUG: usize = 200;
pub const TITLE: usize = 200;
pub const LOCATION: usize = 200;
pub const DURATION: usize = 100;

pub const URL: usize = 500;

/// `Err` with a user-facing message when `value` is longer than `max`
pub fn check_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}

/// The first `max` characters of `value`
pub fn clip(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_len_counts_characters() {
        assert!(check_len("City", &"ñ".repeat(CITY), CITY).is_ok());
        let err = check_len("City", &"ñ".repeat(CITY + 1), CITY).unwrap_err();
        assert_eq!(err, "City must be at most 100 characters");
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("añejo", 2), "añ");
        assert_eq!(clip("ok", 10), "ok");
    }
}
