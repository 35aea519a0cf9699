/*
[INPUT]:  Streaming channel parameters and serde requirements
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for API communication
[UPDATE]: When the service adds candle resolutions or trade statuses
*/

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Candle resolution accepted by the `candle` streaming channel.
///
/// Unknown resolutions are kept verbatim in [`CandleInterval::Other`] so a
/// server-side addition never breaks routing. Equality follows the wire
/// value, so `Other("1min")` is the same interval as `OneMinute`.
#[derive(Debug, Clone, Default)]
pub enum CandleInterval {
    #[default]
    OneMinute,
    TwoMinutes,
    ThreeMinutes,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    Hour,
    Day,
    Week,
    Month,
    Other(String),
}

impl CandleInterval {
    pub fn as_str(&self) -> &str {
        match self {
            CandleInterval::OneMinute => "1min",
            CandleInterval::TwoMinutes => "2min",
            CandleInterval::ThreeMinutes => "3min",
            CandleInterval::FiveMinutes => "5min",
            CandleInterval::TenMinutes => "10min",
            CandleInterval::FifteenMinutes => "15min",
            CandleInterval::ThirtyMinutes => "30min",
            CandleInterval::Hour => "hour",
            CandleInterval::Day => "day",
            CandleInterval::Week => "week",
            CandleInterval::Month => "month",
            CandleInterval::Other(value) => value,
        }
    }
}

impl PartialEq for CandleInterval {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for CandleInterval {}

impl Hash for CandleInterval {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<&str> for CandleInterval {
    fn from(value: &str) -> Self {
        match value {
            "1min" => CandleInterval::OneMinute,
            "2min" => CandleInterval::TwoMinutes,
            "3min" => CandleInterval::ThreeMinutes,
            "5min" => CandleInterval::FiveMinutes,
            "10min" => CandleInterval::TenMinutes,
            "15min" => CandleInterval::FifteenMinutes,
            "30min" => CandleInterval::ThirtyMinutes,
            "hour" => CandleInterval::Hour,
            "day" => CandleInterval::Day,
            "week" => CandleInterval::Week,
            "month" => CandleInterval::Month,
            other => CandleInterval::Other(other.to_string()),
        }
    }
}

impl From<String> for CandleInterval {
    fn from(value: String) -> Self {
        CandleInterval::from(value.as_str())
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CandleInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CandleInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(CandleInterval::from(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    NormalTrading,
    NotAvailableForTrading,
}
