use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A chat platform event timestamp such as `"1355517523.000005"`.
///
/// Ordered by seconds, then by the fractional part read as microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventTimestamp {
    secs: u64,
    micros: u32,
}

const FRACTION_DIGITS: usize = 6;

impl EventTimestamp {
    #[must_use]
    pub fn new(secs: u64, micros: u32) -> Self {
        Self { secs, micros }
    }

    #[must_use]
    pub fn secs(&self) -> u64 {
        self.secs
    }
}

impl FromStr for EventTimestamp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (secs, fraction) = s.split_once('.').unwrap_or((s, ""));

        let secs = secs
            .parse::<u64>()
            .map_err(|_| format!("invalid event timestamp '{s}'"))?;

        if !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid event timestamp '{s}'"));
        }

        let mut digits: String = fraction.chars().take(FRACTION_DIGITS).collect();
        while digits.len() < FRACTION_DIGITS {
            digits.push('0');
        }
        let micros = digits
            .parse::<u32>()
            .map_err(|_| format!("invalid event timestamp '{s}'"))?;

        Ok(Self { secs, micros })
    }
}

impl TryFrom<String> for EventTimestamp {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EventTimestamp> for String {
    fn from(ts: EventTimestamp) -> Self {
        ts.to_string()
    }
}

impl fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.secs, self.micros)
    }
}
