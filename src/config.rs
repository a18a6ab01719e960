use std::fmt;
use std::time::Duration;

use chrono::Weekday;
use serde::Deserialize;

use crate::limits::{MAX_VISIBLE_DAYS, MIN_SLOT_MINUTES};
use crate::model::{DAY_END, Minute};

// ── Errors ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Slot width must be at least `MIN_SLOT_MINUTES` and divide the day evenly.
    BadSlotWidth(Minute),
    ZeroTimeout,
    BadVisibleDays(u32),
    BadLocale(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BadSlotWidth(w) => {
                write!(f, "slot width {w} must divide a day and be >= {MIN_SLOT_MINUTES} minutes")
            }
            ConfigError::ZeroTimeout => write!(f, "operation timeout must be non-zero"),
            ConfigError::BadVisibleDays(n) => {
                write!(f, "visible days {n} outside 1..={MAX_VISIBLE_DAYS}")
            }
            ConfigError::BadLocale(tag) => write!(f, "malformed locale tag: {tag:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ── Engine ────────────────────────────────────────────────

/// Tunables for the availability engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of one bookable slot. Must divide 24h evenly.
    pub slot_minutes: Minute,
    /// Upper bound on any single store or booking-source call.
    pub op_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 60,
            op_timeout: Duration::from_secs(4),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_minutes < MIN_SLOT_MINUTES || DAY_END % self.slot_minutes != 0 {
            return Err(ConfigError::BadSlotWidth(self.slot_minutes));
        }
        if self.op_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

// ── Calendar ──────────────────────────────────────────────

/// Presentation-side tunables: window size, week layout, cache freshness.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub visible_days: u32,
    pub week_starts_on: Weekday,
    pub locale: LocaleTag,
    /// How long a cached window may serve reads before it is refetched.
    pub cache_ttl: Duration,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            visible_days: 7,
            week_starts_on: Weekday::Mon,
            locale: LocaleTag::default(),
            cache_ttl: Duration::from_secs(180),
        }
    }
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.visible_days == 0 || self.visible_days > MAX_VISIBLE_DAYS {
            return Err(ConfigError::BadVisibleDays(self.visible_days));
        }
        Ok(())
    }
}

// ── Locale tag ────────────────────────────────────────────

/// Opaque language tag ("en", "pt-BR"). Validated for shape only; the
/// rendering layer decides what it means.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct LocaleTag(String);

impl LocaleTag {
    pub fn new(tag: impl Into<String>) -> Result<Self, ConfigError> {
        let tag = tag.into();
        let mut parts = tag.split('-');
        let primary = parts.next().unwrap_or("");
        let primary_ok =
            (2..=8).contains(&primary.len()) && primary.bytes().all(|b| b.is_ascii_alphabetic());
        let rest_ok = parts.clone().all(|p| {
            (1..=8).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_alphanumeric())
        });
        if !primary_ok || !rest_ok {
            return Err(ConfigError::BadLocale(tag));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LocaleTag {
    fn default() -> Self {
        Self("en".to_string())
    }
}

impl fmt::Display for LocaleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LocaleTag {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
