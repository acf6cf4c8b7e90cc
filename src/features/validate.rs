use super::Feature;
use chrono::NaiveTime;
use humantime::parse_duration;

/// Rejections at the command boundary. The message is shown to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("⚠️ Minimum Interval Is **{min} Minutes**.")]
    IntervalTooShort { min: u64 },
    #[error("⚠️ Invalid interval `{0}`. Examples: `30`, `90m`, `2h`.")]
    InvalidInterval(String),
    #[error("⚠️ Invalid post time `{0}`. Use 24h UTC `HH:MM`, e.g. `09:00`.")]
    InvalidPostTime(String),
    #[error("⚠️ Post limit must be between 1 and {max}.")]
    PostLimitOutOfRange { max: usize },
    #[error("⚠️ `{key}` is not a setting of the {feature} feature.")]
    UnsupportedSetting { feature: &'static str, key: String },
    #[error("⚠️ Invalid configuration: {0}")]
    Invalid(String),
}

pub const MAX_POST_LIMIT: usize = 20;

/// Parse an interval given as plain minutes (`30`) or a humantime duration
/// (`90m`, `1h 30m`) and enforce the feature's minimum.
pub fn parse_interval_minutes(feature: Feature, input: &str) -> Result<u64, ValidationError> {
    let trimmed = input.trim();
    let minutes = if let Ok(minutes) = trimmed.parse::<u64>() {
        minutes
    } else {
        parse_duration(trimmed)
            .map(|d| d.as_secs() / 60)
            .map_err(|_| ValidationError::InvalidInterval(trimmed.to_string()))?
    };

    let min = feature.min_interval_minutes();
    if minutes < min {
        return Err(ValidationError::IntervalTooShort { min });
    }
    Ok(minutes)
}

/// Parse a 24h `HH:MM` time of day.
pub fn parse_post_time(input: &str) -> Result<NaiveTime, ValidationError> {
    let invalid = || ValidationError::InvalidPostTime(input.trim().to_string());
    let (hour, minute) = input.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

pub fn validate_post_limit(limit: usize) -> Result<usize, ValidationError> {
    if (1..=MAX_POST_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(ValidationError::PostLimitOutOfRange { max: MAX_POST_LIMIT })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval_minutes() {
        assert_eq!(parse_interval_minutes(Feature::Meme, "30"), Ok(30));
        assert_eq!(parse_interval_minutes(Feature::Meme, "90m"), Ok(90));
        assert_eq!(parse_interval_minutes(Feature::Quote, "2h"), Ok(120));
        assert_eq!(
            parse_interval_minutes(Feature::Meme, "5"),
            Err(ValidationError::IntervalTooShort { min: 10 })
        );
        assert_eq!(parse_interval_minutes(Feature::Rss, "1"), Ok(1));
        assert!(matches!(
            parse_interval_minutes(Feature::Meme, "soon"),
            Err(ValidationError::InvalidInterval(_))
        ));
    }

    #[test]
    fn test_parse_post_time() {
        assert_eq!(
            parse_post_time("09:00"),
            Ok(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_post_time(" 7:05 "),
            Ok(NaiveTime::from_hms_opt(7, 5, 0).unwrap())
        );
        assert!(parse_post_time("24:00").is_err());
        assert!(parse_post_time("12:60").is_err());
        assert!(parse_post_time("noon").is_err());
    }

    #[test]
    fn test_validate_post_limit() {
        assert_eq!(validate_post_limit(5), Ok(5));
        assert!(validate_post_limit(0).is_err());
        assert!(validate_post_limit(21).is_err());
    }
}
