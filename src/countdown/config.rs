use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_WARN_MINUTES: i64 = 4;
pub const DEFAULT_ALERT_MINUTES: i64 = 2;
pub const DEFAULT_BLINK_SECONDS: i64 = 10;
pub const DEFAULT_OVERRUN_MINUTES: i64 = 1;

const MINUTE_MS: i64 = 60_000;
const SECOND_MS: i64 = 1_000;

/// Countdown configuration as seen by the tick engine.
///
/// Built leniently from whatever JSON the configuration store hands over:
/// conversion never fails, bad fields fall back to defaults or are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownConfig {
    pub mode: ModeSpec,
    pub overrides: TargetOverrides,
    pub thresholds: Thresholds,
}

/// Target strategy, carrying only the fields that belong to that mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    Daily { daily_time: Option<String> },
    Once { once_at: Option<String> },
    Duration { minutes: i64, started_ms: i64 },
    Clock,
    Unrecognized(String),
}

impl ModeSpec {
    pub fn name(&self) -> &str {
        match self {
            ModeSpec::Daily { .. } => "daily",
            ModeSpec::Once { .. } => "once",
            ModeSpec::Duration { .. } => "duration",
            ModeSpec::Clock => "clock",
            ModeSpec::Unrecognized(name) => name,
        }
    }
}

/// Explicit targets that take precedence over the daily/once schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOverrides {
    pub target_ms: Option<i64>,
    pub target_datetime: Option<String>,
    pub target_iso: Option<String>,
}

impl TargetOverrides {
    /// ISO override strings in priority order.
    pub fn iso_candidates(&self) -> impl Iterator<Item = &str> {
        self.target_datetime
            .as_deref()
            .into_iter()
            .chain(self.target_iso.as_deref())
    }
}

/// Phase thresholds, already converted to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub warn_ms: i64,
    pub alert_ms: i64,
    pub blink_ms: i64,
    pub overrun_ms: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn_ms: DEFAULT_WARN_MINUTES * MINUTE_MS,
            alert_ms: DEFAULT_ALERT_MINUTES * MINUTE_MS,
            blink_ms: DEFAULT_BLINK_SECONDS * SECOND_MS,
            overrun_ms: DEFAULT_OVERRUN_MINUTES * MINUTE_MS,
        }
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            mode: ModeSpec::Daily { daily_time: None },
            overrides: TargetOverrides::default(),
            thresholds: Thresholds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DailyTimeError {
    #[error("daily time '{0}' must be HH:MM")]
    Format(String),
    #[error("daily time '{0}' is outside 00:00-23:59")]
    Range(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("mode '{0}' is not one of daily|once|duration|clock")]
    UnknownMode(String),
    #[error("daily_time is required in daily mode")]
    MissingDailyTime,
    #[error(transparent)]
    DailyTime(#[from] DailyTimeError),
    #[error("once_at '{0}' must be ISO-8601 (YYYY-MM-DDTHH:MM[:SS][+TZ])")]
    InvalidOnceAt(String),
    #[error("duration_minutes must be > 0, got {0}")]
    NonPositiveDuration(i64),
}

/// An ISO-8601 instant, with or without a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsoDateTime {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl CountdownConfig {
    pub fn from_value(value: &Value) -> Self {
        let raw = match value {
            Value::Object(_) => CountdownConfigFile::deserialize(value).unwrap_or_default(),
            _ => CountdownConfigFile::default(),
        };

        let mode = match raw.mode.as_ref().and_then(coerce_mode_name) {
            None => "daily".to_string(),
            Some(name) => name,
        };
        let mode = match mode.as_str() {
            "daily" => ModeSpec::Daily {
                daily_time: coerce_text(raw.daily_time.as_ref()),
            },
            "once" => ModeSpec::Once {
                once_at: coerce_text(raw.once_at.as_ref()),
            },
            "duration" => ModeSpec::Duration {
                minutes: coerce_int(raw.duration_minutes.as_ref()).unwrap_or(0),
                started_ms: coerce_int(raw.duration_started_ms.as_ref()).unwrap_or(0),
            },
            "clock" | "screen" => ModeSpec::Clock,
            _ => ModeSpec::Unrecognized(mode),
        };

        Self {
            mode,
            overrides: TargetOverrides {
                target_ms: coerce_int(raw.target_ms.as_ref()).filter(|ms| *ms > 0),
                target_datetime: coerce_text(raw.target_datetime.as_ref()),
                target_iso: coerce_text(raw.target_iso.as_ref()),
            },
            thresholds: Thresholds {
                warn_ms: threshold_ms(raw.warn_minutes.as_ref(), DEFAULT_WARN_MINUTES, MINUTE_MS),
                alert_ms: threshold_ms(
                    raw.alert_minutes.as_ref(),
                    DEFAULT_ALERT_MINUTES,
                    MINUTE_MS,
                ),
                blink_ms: threshold_ms(
                    raw.blink_seconds.as_ref(),
                    DEFAULT_BLINK_SECONDS,
                    SECOND_MS,
                ),
                overrun_ms: threshold_ms(
                    raw.overrun_minutes.as_ref(),
                    DEFAULT_OVERRUN_MINUTES,
                    MINUTE_MS,
                ),
            },
        }
    }

    /// Write-side checks. The tick path never calls this.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.mode {
            ModeSpec::Unrecognized(name) => Err(ConfigError::UnknownMode(name.clone())),
            ModeSpec::Daily { daily_time } => {
                let text = daily_time.as_deref().ok_or(ConfigError::MissingDailyTime)?;
                parse_daily_time(text)?;
                Ok(())
            }
            ModeSpec::Once { once_at } => match once_at.as_deref() {
                Some(text) if parse_iso_datetime(text).is_none() => {
                    Err(ConfigError::InvalidOnceAt(text.to_string()))
                }
                _ => Ok(()),
            },
            ModeSpec::Duration { minutes, .. } => {
                if *minutes <= 0 {
                    Err(ConfigError::NonPositiveDuration(*minutes))
                } else {
                    Ok(())
                }
            }
            ModeSpec::Clock => Ok(()),
        }
    }
}

pub fn load_countdown_config(path: &Path) -> Result<CountdownConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    parse_countdown_config_text(&content)
}

pub fn parse_countdown_config_text(content: &str) -> Result<CountdownConfig> {
    let value = serde_json::from_str::<Value>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;
    Ok(CountdownConfig::from_value(&value))
}

/// Parses a 24h `HH:MM` wall-clock time. Single-digit fields are accepted.
pub fn parse_daily_time(input: &str) -> Result<NaiveTime, DailyTimeError> {
    let trimmed = input.trim();
    let format_err = || DailyTimeError::Format(trimmed.to_string());
    let (hh, mm) = trimmed.split_once(':').ok_or_else(format_err)?;
    let is_field = |field: &str| {
        (1..=2).contains(&field.len()) && field.bytes().all(|b| b.is_ascii_digit())
    };
    if !is_field(hh) || !is_field(mm) {
        return Err(format_err());
    }

    let hour = hh.parse::<u32>().map_err(|_| format_err())?;
    let minute = mm.parse::<u32>().map_err(|_| format_err())?;
    if hour > 23 || minute > 59 {
        return Err(DailyTimeError::Range(trimmed.to_string()));
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| DailyTimeError::Range(trimmed.to_string()))
}

pub fn parse_iso_datetime(input: &str) -> Option<IsoDateTime> {
    const ZONED_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M%:z",
    ];
    const NAIVE_FORMATS: [&str; 6] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(IsoDateTime::Zoned(dt));
    }
    if let Some(dt) = ZONED_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(trimmed, format).ok())
    {
        return Some(IsoDateTime::Zoned(dt));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(IsoDateTime::Naive)
}

/// Values that mean "explicitly cleared" rather than "malformed".
fn is_cleared(text: &str) -> bool {
    text.is_empty()
        || text == "0"
        || text.eq_ignore_ascii_case("none")
        || text.eq_ignore_ascii_case("null")
}

fn coerce_mode_name(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let name = text.trim().to_ascii_lowercase();
            (!name.is_empty()).then_some(name)
        }
        other => Some(other.to_string()),
    }
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!is_cleared(trimmed)).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn coerce_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.trunc() as i64)
        }),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite())
                    .map(|float| float.trunc() as i64)
            })
        }
        _ => None,
    }
}

fn threshold_ms(value: Option<&Value>, default_units: i64, unit_ms: i64) -> i64 {
    coerce_int(value)
        .filter(|units| *units >= 0)
        .unwrap_or(default_units)
        .saturating_mul(unit_ms)
}

#[derive(Debug, Default, Deserialize)]
struct CountdownConfigFile {
    #[serde(default)]
    mode: Option<Value>,
    #[serde(default)]
    daily_time: Option<Value>,
    #[serde(default)]
    once_at: Option<Value>,
    #[serde(default)]
    target_ms: Option<Value>,
    #[serde(default)]
    target_datetime: Option<Value>,
    #[serde(default)]
    target_iso: Option<Value>,
    #[serde(default)]
    duration_minutes: Option<Value>,
    #[serde(default)]
    duration_started_ms: Option<Value>,
    #[serde(default)]
    warn_minutes: Option<Value>,
    #[serde(default)]
    alert_minutes: Option<Value>,
    #[serde(default)]
    blink_seconds: Option<Value>,
    #[serde(default)]
    overrun_minutes: Option<Value>,
}
