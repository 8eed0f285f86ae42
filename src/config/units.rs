//! Human-readable durations and byte sizes.
//!
//! Durations are written as one or more `<integer><unit>` groups where the unit
//! is `ms`, `s`, `m` or `h` (`1m30s`, `100ms`). A bare `0` is accepted.
//! Byte sizes are an integer followed by an optional SI (`KB`, `MB`, `GB`) or
//! IEC (`KiB`, `MiB`, `GiB`) unit; plain integers are bytes.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error returned when a duration or byte-size string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("empty value")]
    Empty,

    #[error("invalid number in `{0}`")]
    InvalidNumber(String),

    #[error("unknown unit `{unit}` in `{input}`")]
    UnknownUnit { input: String, unit: String },

    #[error("`{0}` is out of range")]
    Overflow(String),
}

/// Parse a duration such as `10s`, `100ms` or `1h30m`.
pub fn parse_duration(input: &str) -> Result<Duration, UnitError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UnitError::Empty);
    }
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    let overflow = || UnitError::Overflow(input.to_string());
    let mut total = Duration::ZERO;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let (value, after_number) = split_number(rest, input)?;
        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(after_number.len());
        let (unit, remaining) = after_number.split_at(unit_len);

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60).ok_or_else(overflow)?),
            "h" => Duration::from_secs(value.checked_mul(3600).ok_or_else(overflow)?),
            other => {
                return Err(UnitError::UnknownUnit {
                    input: input.to_string(),
                    unit: other.to_string(),
                })
            }
        };

        total = total.checked_add(part).ok_or_else(overflow)?;
        rest = remaining;
    }

    Ok(total)
}

fn split_number<'a>(s: &'a str, input: &str) -> Result<(u64, &'a str), UnitError> {
    let digits = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if digits == 0 {
        return Err(UnitError::InvalidNumber(input.to_string()));
    }
    let (number, rest) = s.split_at(digits);
    let value = number
        .parse::<u64>()
        .map_err(|_| UnitError::Overflow(input.to_string()))?;
    Ok((value, rest))
}

/// Format a duration the way it would be written in a config file.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() != 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}s", duration.as_secs())
    }
}

/// Serde adapter for `Duration` fields written as strings.
pub mod duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_duration(&raw).map_err(de::Error::custom)
    }
}

/// A size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = UnitError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(UnitError::Empty);
        }

        let (value, unit) = split_number(trimmed, input)?;
        let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" => 1_000,
            "m" | "mb" => 1_000_000,
            "g" | "gb" => 1_000_000_000,
            "ki" | "kib" => 1 << 10,
            "mi" | "mib" => 1 << 20,
            "gi" | "gib" => 1 << 30,
            _ => {
                return Err(UnitError::UnknownUnit {
                    input: input.to_string(),
                    unit: unit.trim().to_string(),
                })
            }
        };

        value
            .checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| UnitError::Overflow(input.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"5MB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ByteSize, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ByteSize, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("byte size must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ByteSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}
