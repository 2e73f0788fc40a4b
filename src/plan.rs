use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_INTERVAL_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotType {
    #[default]
    Portrait,
    Cowboy,
    Fullbody,
    Group,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Portrait => "portrait",
            ShotType::Cowboy => "cowboy",
            ShotType::Fullbody => "fullbody",
            ShotType::Group => "group",
        }
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.as_str();
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            write!(f, "{}{}", first.to_ascii_uppercase(), chars.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for ShotType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(ShotType::Portrait),
            "cowboy" => Ok(ShotType::Cowboy),
            "fullbody" | "full-body" => Ok(ShotType::Fullbody),
            "group" => Ok(ShotType::Group),
            other => Err(format!(
                "unknown shot type '{other}' (expected portrait, cowboy, fullbody or group)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Horizontal => f.write_str("Horizontal"),
            Orientation::Vertical => f.write_str("Vertical"),
        }
    }
}

/// Immutable input to a capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePlan {
    pub shot_type: ShotType,
    pub horizontal_count: u32,
    pub vertical_count: u32,
    pub interval: Duration,
}

impl Default for CapturePlan {
    fn default() -> Self {
        Self {
            shot_type: ShotType::Portrait,
            horizontal_count: 0,
            vertical_count: 0,
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
        }
    }
}

impl CapturePlan {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval.is_zero() {
            return Err("interval between shots must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn count_for(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Horizontal => self.horizontal_count,
            Orientation::Vertical => self.vertical_count,
        }
    }

    pub fn total_shots(&self) -> u32 {
        self.horizontal_count.saturating_add(self.vertical_count)
    }

    /// Orientation a fresh session starts in.
    ///
    /// Horizontal goes first whenever it has shots; a plan with only vertical
    /// shots starts directly in the vertical phase.
    pub fn initial_orientation(&self) -> Orientation {
        if self.horizontal_count == 0 && self.vertical_count > 0 {
            Orientation::Vertical
        } else {
            Orientation::Horizontal
        }
    }
}

/// Parse the leading integer of a user-typed field, ignoring trailing text.
///
/// `" 12 shots"` parses as 12, `"abc"` and `""` as `None`. Overlong digit
/// runs saturate instead of failing.
pub fn parse_leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * magnitude)
}

pub fn parse_count(value: &str) -> u32 {
    parse_leading_int(value)
        .filter(|n| *n > 0)
        .map(|n| n.min(u32::MAX as i64) as u32)
        .unwrap_or(0)
}

pub fn parse_interval(value: &str) -> Duration {
    let secs = parse_leading_int(value)
        .filter(|n| *n > 0)
        .map(|n| n as u64)
        .unwrap_or(DEFAULT_INTERVAL_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::{
        CapturePlan, Orientation, ShotType, parse_count, parse_interval, parse_leading_int,
    };
    use std::time::Duration;

    #[test]
    fn rejects_zero_interval() {
        let plan = CapturePlan {
            interval: Duration::ZERO,
            ..CapturePlan::default()
        };
        assert!(plan.validate().is_err());
        assert!(CapturePlan::default().validate().is_ok());
    }

    #[test]
    fn vertical_only_plan_starts_vertical() {
        let plan = CapturePlan {
            horizontal_count: 0,
            vertical_count: 4,
            ..CapturePlan::default()
        };
        assert_eq!(plan.initial_orientation(), Orientation::Vertical);

        let both = CapturePlan {
            horizontal_count: 2,
            vertical_count: 4,
            ..CapturePlan::default()
        };
        assert_eq!(both.initial_orientation(), Orientation::Horizontal);

        let empty = CapturePlan::default();
        assert_eq!(empty.initial_orientation(), Orientation::Horizontal);
    }

    #[test]
    fn parses_leading_integers_like_form_input() {
        assert_eq!(parse_leading_int("12"), Some(12));
        assert_eq!(parse_leading_int("  7 shots"), Some(7));
        assert_eq!(parse_leading_int("-2"), Some(-2));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
    }

    #[test]
    fn overlong_counts_saturate() {
        let huge = "99999999999999999999999";
        assert_eq!(parse_leading_int(huge), Some(i64::MAX));
        assert_eq!(parse_leading_int("-99999999999999999999999"), Some(-i64::MAX));
        assert_eq!(parse_count(huge), u32::MAX);
        assert_eq!(parse_count("-99999999999999999999999"), 0);
    }

    #[test]
    fn falls_back_for_unusable_fields() {
        assert_eq!(parse_count("x"), 0);
        assert_eq!(parse_count("-3"), 0);
        assert_eq!(parse_count("5"), 5);
        assert_eq!(parse_interval(""), Duration::from_secs(3));
        assert_eq!(parse_interval("0"), Duration::from_secs(3));
        assert_eq!(parse_interval("10"), Duration::from_secs(10));
    }

    #[test]
    fn shot_type_displays_capitalized() {
        assert_eq!(ShotType::Fullbody.to_string(), "Fullbody");
        assert_eq!("Group".parse::<ShotType>(), Ok(ShotType::Group));
        assert!("selfie".parse::<ShotType>().is_err());
    }
}
