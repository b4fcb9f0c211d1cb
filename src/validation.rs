//! Input validation shared by the services.

use crate::errors::AppError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// 400 `Illegal Email Format` unless `email` is well formed.
pub fn require_email(email: &str) -> Result<(), AppError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::bad_request("Illegal Email Format"))
    }
}

/// Parse a `yyyy-MM-dd` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::not_acceptable("invalid date format"))
}

/// Parse a resource id. A malformed id cannot name an existing resource, so
/// it is reported as `what` not found.
pub fn parse_id(value: &str, what: &'static str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|_| AppError::NotFound(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
        assert!(!is_valid_email(""));
        assert!(require_email("nope").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2000-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2000, 2, 29).unwrap()
        );
        let err = parse_date("29/02/2000").unwrap_err();
        assert_eq!(err.public_message(), "invalid date format");
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "song").unwrap(), id);
        let err = parse_id("42", "song").unwrap_err();
        assert_eq!(err.public_message(), "song not found");
    }
}
