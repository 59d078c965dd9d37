use thiserror::Error;

/// Input rejected before it reaches any store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is required")]
    EmptyTitle,
    #[error("name must not be empty")]
    EmptyName,
    #[error("hour {0} out of range: must be 0-23")]
    Hour(u32),
    #[error("minute {0} out of range: must be 0-59")]
    Minute(u32),
    #[error("invalid time '{0}': expected HH:MM")]
    TimeFormat(String),
}

/// A title must contain something other than whitespace.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(())
}

/// Trim a display name, rejecting one that is empty afterwards.
pub fn normalize_name(name: &str) -> Result<&str, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed)
}

pub fn validate_clock(hour: u32, minute: u32) -> Result<(), ValidationError> {
    if hour > 23 {
        return Err(ValidationError::Hour(hour));
    }
    if minute > 59 {
        return Err(ValidationError::Minute(minute));
    }
    Ok(())
}

/// Parse `HH:MM` into an hour and minute.
pub fn parse_clock(s: &str) -> Result<(u32, u32), ValidationError> {
    let bad = || ValidationError::TimeFormat(s.to_string());
    let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
    let hour: u32 = h.parse().map_err(|_| bad())?;
    let minute: u32 = m.parse().map_err(|_| bad())?;
    validate_clock(hour, minute)?;
    Ok((hour, minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles() {
        assert!(validate_title("Buy milk").is_ok());
        assert_eq!(validate_title(""), Err(ValidationError::EmptyTitle));
        assert_eq!(validate_title("  \t"), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn names_are_trimmed() {
        assert_eq!(normalize_name("  Ann "), Ok("Ann"));
        assert_eq!(normalize_name("   "), Err(ValidationError::EmptyName));
    }

    #[test]
    fn clock_parsing() {
        assert_eq!(parse_clock("07:05"), Ok((7, 5)));
        assert_eq!(parse_clock("23:59"), Ok((23, 59)));
        assert_eq!(parse_clock("24:00"), Err(ValidationError::Hour(24)));
        assert_eq!(parse_clock("12:60"), Err(ValidationError::Minute(60)));
        assert!(matches!(parse_clock("noon"), Err(ValidationError::TimeFormat(_))));
        assert!(matches!(parse_clock("1:x"), Err(ValidationError::TimeFormat(_))));
    }
}
