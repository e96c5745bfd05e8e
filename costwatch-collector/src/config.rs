use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::out::OutMode;
use crate::utils::{env_flag, env_or, parse_list};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// `None` means discover enabled regions at startup.
    pub regions: Option<Vec<String>>,
    pub home_region: String,
    pub interval: Duration,
    pub concurrency: usize,
    pub db_path: PathBuf,
    pub lookback_secs: u64,
    pub ephemeral_secs: i64,
    pub idle_cpu_pct: f64,
    pub idle_window_hours: i64,
    pub idle_period_secs: u32,
    pub snapshot_max_age_days: i64,
    pub days_per_month: f64,
    pub trend_len: usize,
    pub trend_width: usize,
    pub out: OutMode,
    pub endpoint: String,
    pub once: bool,
    pub mock: bool,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            regions: None,
            home_region: "us-east-1".into(),
            interval: Duration::from_secs(600),
            concurrency: 10,
            db_path: PathBuf::from("aws_costwatch.db"),
            lookback_secs: 600,
            ephemeral_secs: 600,
            idle_cpu_pct: 5.0,
            idle_window_hours: 3,
            idle_period_secs: 300,
            snapshot_max_age_days: 30,
            days_per_month: 30.0,
            trend_len: 7,
            trend_width: 40,
            out: OutMode::Stdout,
            endpoint: "http://localhost:8080/api/snapshots".into(),
            once: false,
            mock: false,
            log_format: LogFormat::Text,
        }
    }
}

fn num<T: FromStr>(key: &str, raw: String) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: raw,
    })
}

fn positive<T: PartialOrd + Default>(key: &str, v: T) -> Result<T, ConfigError> {
    if v > T::default() {
        Ok(v)
    } else {
        Err(ConfigError::NotPositive { key: key.to_string() })
    }
}

/// Positive and no larger than `max`.
fn bounded<T: PartialOrd + Default + ToString>(key: &str, v: T, max: T) -> Result<T, ConfigError> {
    let v = positive(key, v)?;
    if v > max {
        return Err(ConfigError::TooLarge {
            key: key.to_string(),
            max: max.to_string(),
        });
    }
    Ok(v)
}

/// CloudTrail lookups reach back 90 days.
const MAX_LOOKBACK_SECS: u64 = 90 * 24 * 3600;
const MAX_IDLE_WINDOW_HOURS: i64 = 90 * 24;
const MAX_IDLE_PERIOD_SECS: u32 = 24 * 3600;
const MAX_SNAPSHOT_AGE_DAYS: i64 = 100 * 365;

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::from_lookup(env_or)?;
        cfg.once = env_flag("COSTWATCH_ONCE");
        cfg.mock = env_flag("MOCK_MODE");
        Ok(cfg)
    }

    /// Build from `get(key, default)`; flags are left at their defaults.
    pub fn from_lookup(get: impl Fn(&str, &str) -> String) -> Result<Self, ConfigError> {
        let d = Self::default();
        let regions = parse_list(&get("COSTWATCH_REGIONS", ""));

        Ok(Self {
            regions: (!regions.is_empty()).then_some(regions),
            home_region: get("COSTWATCH_HOME_REGION", &d.home_region),
            interval: Duration::from_secs(positive(
                "COSTWATCH_INTERVAL_SECS",
                num("COSTWATCH_INTERVAL_SECS", get("COSTWATCH_INTERVAL_SECS", "600"))?,
            )?),
            concurrency: positive(
                "COSTWATCH_CONCURRENCY",
                num("COSTWATCH_CONCURRENCY", get("COSTWATCH_CONCURRENCY", "10"))?,
            )?,
            db_path: PathBuf::from(get("COSTWATCH_DB", "aws_costwatch.db")),
            lookback_secs: bounded(
                "COSTWATCH_LOOKBACK_SECS",
                num("COSTWATCH_LOOKBACK_SECS", get("COSTWATCH_LOOKBACK_SECS", "600"))?,
                MAX_LOOKBACK_SECS,
            )?,
            ephemeral_secs: bounded(
                "COSTWATCH_EPHEMERAL_SECS",
                num("COSTWATCH_EPHEMERAL_SECS", get("COSTWATCH_EPHEMERAL_SECS", "600"))?,
                MAX_LOOKBACK_SECS as i64,
            )?,
            idle_cpu_pct: bounded(
                "COSTWATCH_IDLE_CPU_PCT",
                num("COSTWATCH_IDLE_CPU_PCT", get("COSTWATCH_IDLE_CPU_PCT", "5"))?,
                100.0,
            )?,
            idle_window_hours: bounded(
                "COSTWATCH_IDLE_WINDOW_HOURS",
                num("COSTWATCH_IDLE_WINDOW_HOURS", get("COSTWATCH_IDLE_WINDOW_HOURS", "3"))?,
                MAX_IDLE_WINDOW_HOURS,
            )?,
            idle_period_secs: bounded(
                "COSTWATCH_IDLE_PERIOD_SECS",
                num("COSTWATCH_IDLE_PERIOD_SECS", get("COSTWATCH_IDLE_PERIOD_SECS", "300"))?,
                MAX_IDLE_PERIOD_SECS,
            )?,
            snapshot_max_age_days: bounded(
                "COSTWATCH_SNAPSHOT_MAX_AGE_DAYS",
                num("COSTWATCH_SNAPSHOT_MAX_AGE_DAYS", get("COSTWATCH_SNAPSHOT_MAX_AGE_DAYS", "30"))?,
                MAX_SNAPSHOT_AGE_DAYS,
            )?,
            days_per_month: positive(
                "COSTWATCH_DAYS_PER_MONTH",
                num("COSTWATCH_DAYS_PER_MONTH", get("COSTWATCH_DAYS_PER_MONTH", "30"))?,
            )?,
            trend_len: positive("COSTWATCH_TREND_LEN", num("COSTWATCH_TREND_LEN", get("COSTWATCH_TREND_LEN", "7"))?)?,
            trend_width: positive(
                "COSTWATCH_TREND_WIDTH",
                num("COSTWATCH_TREND_WIDTH", get("COSTWATCH_TREND_WIDTH", "40"))?,
            )?,
            out: OutMode::parse(&get("COSTWATCH_OUT", "stdout")),
            endpoint: get("COSTWATCH_ENDPOINT", &d.endpoint),
            log_format: LogFormat::parse(&get("COSTWATCH_LOG_FORMAT", "text")),
            ..d
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use std::collections::HashMap;

    fn lookup(vars: HashMap<&'static str, &'static str>) -> impl Fn(&str, &str) -> String {
        move |k, default| vars.get(k).map(|v| v.to_string()).unwrap_or_else(|| default.to_string())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = EngineConfig::from_lookup(lookup(HashMap::new())).unwrap();
        assert_eq!(cfg.regions, None);
        assert_eq!(cfg.interval, Duration::from_secs(600));
        assert_eq!(cfg.concurrency, 10);
        assert_eq!(cfg.trend_len, 7);
        assert_eq!(cfg.trend_width, 40);
        assert_eq!(cfg.idle_cpu_pct, 5.0);
        assert_eq!(cfg.out, OutMode::Stdout);
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = EngineConfig::from_lookup(lookup(hashmap! {
            "COSTWATCH_REGIONS" => "us-east-1,eu-west-1",
            "COSTWATCH_CONCURRENCY" => "4",
            "COSTWATCH_IDLE_CPU_PCT" => "2.5",
            "COSTWATCH_OUT" => "HTTP",
            "COSTWATCH_LOG_FORMAT" => "json",
        }))
        .unwrap();
        assert_eq!(cfg.regions, Some(vec!["us-east-1".to_string(), "eu-west-1".to_string()]));
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.idle_cpu_pct, 2.5);
        assert_eq!(cfg.out, OutMode::Http);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_number_is_an_error() {
        let err = EngineConfig::from_lookup(lookup(hashmap! { "COSTWATCH_INTERVAL_SECS" => "ten" })).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { ref key, .. } if key == "COSTWATCH_INTERVAL_SECS"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = EngineConfig::from_lookup(lookup(hashmap! { "COSTWATCH_CONCURRENCY" => "0" })).unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive { .. }));
    }

    #[test]
    fn windows_must_be_positive_and_bounded() {
        for (key, value) in [
            ("COSTWATCH_IDLE_WINDOW_HOURS", "-3"),
            ("COSTWATCH_LOOKBACK_SECS", "0"),
            ("COSTWATCH_SNAPSHOT_MAX_AGE_DAYS", "-1"),
        ] {
            let err = EngineConfig::from_lookup(lookup(hashmap! { key => value })).unwrap_err();
            assert!(matches!(err, ConfigError::NotPositive { .. }), "{key}={value}");
        }
        for (key, value) in [
            ("COSTWATCH_IDLE_WINDOW_HOURS", "9223372036854775807"),
            ("COSTWATCH_LOOKBACK_SECS", "18446744073709551615"),
            ("COSTWATCH_SNAPSHOT_MAX_AGE_DAYS", "9223372036854775807"),
            ("COSTWATCH_IDLE_CPU_PCT", "250"),
        ] {
            let err = EngineConfig::from_lookup(lookup(hashmap! { key => value })).unwrap_err();
            assert!(matches!(err, ConfigError::TooLarge { key: ref k, .. } if k == key), "{key}={value}");
        }
    }
}
