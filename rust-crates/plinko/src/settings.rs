use crate::{
    Error,
    Points,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};

/// Key/value persistence for game configuration. Values are kept in their
/// string form and parsed on read; unknown or unparseable keys yield the
/// caller's default.
pub trait SettingsStore {
    fn raw_setting(&self, key: &str) -> crate::Result<Option<String>>;

    fn put_raw_setting(&self, key: &str, value: &str) -> crate::Result<()>;

    fn get<T: SettingValue>(&self, key: &str, default: T) -> crate::Result<T> {
        let Some(raw) = self.raw_setting(key)? else {
            return Ok(default);
        };
        match T::parse_setting(&raw) {
            Some(value) => Ok(value),
            None => {
                tracing::warn!("stored setting {key}={raw:?} does not parse; using default");
                Ok(default)
            }
        }
    }

    fn set<T: SettingValue>(&self, key: &str, value: T) -> crate::Result<()> {
        self.put_raw_setting(key, &value.to_setting())
    }
}

pub trait SettingValue: Sized {
    fn parse_setting(raw: &str) -> Option<Self>;

    fn to_setting(&self) -> String;
}

impl SettingValue for bool {
    fn parse_setting(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    fn to_setting(&self) -> String {
        String::from(if *self { "1" } else { "0" })
    }
}

impl SettingValue for i64 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn to_setting(&self) -> String {
        self.to_string()
    }
}

impl SettingValue for u32 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }

    fn to_setting(&self) -> String {
        self.to_string()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Enabled,
    MinBet,
    MaxBet,
    DailyLimit,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::Enabled,
        SettingKey::MinBet,
        SettingKey::MaxBet,
        SettingKey::DailyLimit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::Enabled => "enabled",
            SettingKey::MinBet => "min_bet",
            SettingKey::MaxBet => "max_bet",
            SettingKey::DailyLimit => "daily_limit",
        }
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str() == raw.trim())
            .ok_or_else(|| Error::InvalidConfigKey(raw.to_string()))
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The configuration a single play is validated against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSettings {
    pub enabled: bool,
    pub min_bet: Points,
    pub max_bet: Points,
    pub daily_limit: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_bet: 1,
            max_bet: 100,
            daily_limit: 50,
        }
    }
}

impl GameSettings {
    pub fn load<S: SettingsStore + ?Sized>(store: &S) -> crate::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            enabled: store.get(SettingKey::Enabled.as_str(), defaults.enabled)?,
            min_bet: store.get(SettingKey::MinBet.as_str(), defaults.min_bet)?,
            max_bet: store.get(SettingKey::MaxBet.as_str(), defaults.max_bet)?,
            daily_limit: store
                .get(SettingKey::DailyLimit.as_str(), defaults.daily_limit)?,
        })
    }

    /// Write defaults for any key the store does not hold yet.
    pub fn seed_defaults<S: SettingsStore + ?Sized>(store: &S) -> crate::Result<()> {
        let defaults = Self::default();
        for key in SettingKey::ALL {
            if store.raw_setting(key.as_str())?.is_none() {
                store.put_raw_setting(key.as_str(), &defaults.value_of(key))?;
            }
        }
        Ok(())
    }

    /// Coerce `raw` to the type `key` expects and persist it.
    pub fn update<S: SettingsStore + ?Sized>(
        store: &S,
        key: &str,
        raw: &str,
    ) -> crate::Result<Self> {
        let key = key.parse::<SettingKey>()?;
        let invalid = || Error::InvalidConfigValue {
            key: key.to_string(),
            value: raw.to_string(),
        };
        match key {
            SettingKey::Enabled => {
                let value = bool::parse_setting(raw).ok_or_else(invalid)?;
                store.set(key.as_str(), value)?;
            }
            SettingKey::MinBet => {
                let value = i64::parse_setting(raw)
                    .filter(|value| *value >= 1)
                    .ok_or_else(invalid)?;
                store.set(key.as_str(), value)?;
            }
            SettingKey::MaxBet => {
                let value = i64::parse_setting(raw)
                    .filter(|value| *value >= 0)
                    .ok_or_else(invalid)?;
                store.set(key.as_str(), value)?;
            }
            SettingKey::DailyLimit => {
                let value = u32::parse_setting(raw).ok_or_else(invalid)?;
                store.set(key.as_str(), value)?;
            }
        }
        tracing::info!("setting {key} updated to {raw}");
        Self::load(store)
    }

    pub fn value_of(&self, key: SettingKey) -> String {
        match key {
            SettingKey::Enabled => self.enabled.to_setting(),
            SettingKey::MinBet => self.min_bet.to_setting(),
            SettingKey::MaxBet => self.max_bet.to_setting(),
            SettingKey::DailyLimit => self.daily_limit.to_setting(),
        }
    }
}
