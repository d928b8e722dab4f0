//! # Configuration Module
//!
//! Survey rules and bot settings read from the environment (and `.env`).

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MIN_BUDGET: i64 = 10_000;
pub const DEFAULT_MIN_TRAVELERS: i32 = 1;
pub const DEFAULT_MAX_TRAVELERS: i32 = 20;
pub const MIN_NIGHTS: i32 = 3;
pub const MAX_NIGHTS: i32 = 21;
pub const MAX_CHILDREN: i32 = 10;
pub const MAX_DESTINATION_CHARS: usize = 200;
pub const DEFAULT_THROTTLE_SECS: f64 = 1.0;
pub const DEFAULT_SHEET_RANGE: &str = "A1";
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";
pub const DEFAULT_OPERATOR_LOCALE: &str = "ru";

/// Configurable bounds applied by the survey validators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyRules {
    /// Smallest accepted budget
    pub min_budget: i64,
    /// Smallest accepted number of adults
    pub min_travelers: i32,
    /// Largest accepted number of adults
    pub max_travelers: i32,
}

impl Default for SurveyRules {
    fn default() -> Self {
        Self {
            min_budget: DEFAULT_MIN_BUDGET,
            min_travelers: DEFAULT_MIN_TRAVELERS,
            max_travelers: DEFAULT_MAX_TRAVELERS,
        }
    }
}

/// Where the Google service-account key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    /// Raw JSON, typically injected by the hosting platform
    Inline(String),
    /// Path to a key file on disk
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetsConfig {
    pub spreadsheet_id: String,
    pub range: String,
    pub credentials: CredentialsSource,
}

/// Complete bot configuration
#[derive(Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    /// Telegram id of the single operator allowed to run admin commands
    pub operator_id: i64,
    pub database_url: Option<String>,
    /// `None` disables spreadsheet export
    pub sheets: Option<SheetsConfig>,
    pub rules: SurveyRules,
    /// Minimum spacing between two processed messages of one user
    pub throttle: Duration,
    /// Surveys untouched for longer than this are discarded
    pub idle_timeout: Option<Duration>,
    pub operator_locale: String,
    pub locales_dir: Option<PathBuf>,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("telegram_token", &"<redacted>")
            .field("operator_id", &self.operator_id)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("sheets", &self.sheets.as_ref().map(|s| &s.spreadsheet_id))
            .field("rules", &self.rules)
            .field("throttle", &self.throttle)
            .field("idle_timeout", &self.idle_timeout)
            .field("operator_locale", &self.operator_locale)
            .field("locales_dir", &self.locales_dir)
            .finish()
    }
}

impl BotConfig {
    /// Load the configuration from the process environment, reading `.env` first
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let telegram_token = get("TELEGRAM_TOKEN").context("TELEGRAM_TOKEN must be set")?;
        let operator_id = parse_required::<i64>(get("ADMIN_CHAT_ID"), "ADMIN_CHAT_ID")?;

        let rules = SurveyRules {
            min_budget: parse_or(get("MIN_BUDGET"), "MIN_BUDGET", DEFAULT_MIN_BUDGET)?,
            min_travelers: parse_or(get("MIN_TRAVELERS"), "MIN_TRAVELERS", DEFAULT_MIN_TRAVELERS)?,
            max_travelers: parse_or(get("MAX_TRAVELERS"), "MAX_TRAVELERS", DEFAULT_MAX_TRAVELERS)?,
        };
        if rules.min_travelers < 1 || rules.min_travelers > rules.max_travelers {
            bail!(
                "traveler bounds are inconsistent: MIN_TRAVELERS={} MAX_TRAVELERS={}",
                rules.min_travelers,
                rules.max_travelers
            );
        }

        let throttle_secs: f64 = parse_or(get("THROTTLE_SECONDS"), "THROTTLE_SECONDS", DEFAULT_THROTTLE_SECS)?;
        let throttle = Duration::try_from_secs_f64(throttle_secs)
            .map_err(|e| anyhow!("invalid THROTTLE_SECONDS={throttle_secs}: {e}"))?;

        let idle_timeout = get("SURVEY_IDLE_TIMEOUT_SECS")
            .map(|raw| parse_value::<u64>(&raw, "SURVEY_IDLE_TIMEOUT_SECS"))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let sheets = get("SPREADSHEET_ID").map(|spreadsheet_id| {
            let credentials = match get("GOOGLE_CREDENTIALS_JSON") {
                Some(json) => CredentialsSource::Inline(json),
                None => CredentialsSource::File(PathBuf::from(
                    get("GOOGLE_CREDENTIALS_FILE").unwrap_or_else(|| DEFAULT_CREDENTIALS_FILE.to_string()),
                )),
            };
            SheetsConfig {
                spreadsheet_id,
                range: get("SHEET_RANGE").unwrap_or_else(|| DEFAULT_SHEET_RANGE.to_string()),
                credentials,
            }
        });

        Ok(Self {
            telegram_token,
            operator_id,
            database_url: get("DATABASE_URL"),
            sheets,
            rules,
            throttle,
            idle_timeout,
            operator_locale: get("OPERATOR_LOCALE").unwrap_or_else(|| DEFAULT_OPERATOR_LOCALE.to_string()),
            locales_dir: get("LOCALES_DIR").map(PathBuf::from),
        })
    }
}

fn parse_value<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow!("invalid {key}={raw}: {e}"))
}

fn parse_required<T>(raw: Option<String>, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = raw.with_context(|| format!("{key} must be set"))?;
    parse_value(&raw, key)
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}
