//! Process configuration, read from the environment.
//!
//! | Variable                     | Default            |
//! |------------------------------|--------------------|
//! | `DATABASE_URL`               | unset: in-memory   |
//! | `STOCKROOM_BIND`             | `0.0.0.0:8080`     |
//! | `STOCKROOM_NUMBER_PAD`       | `0`                |
//! | `STOCKROOM_NUMBER_SEPARATOR` | `-`                |
//! | `STOCKROOM_PERIOD`           | current UTC year   |
//! | `STOCKROOM_SERIES`           | standard catalog   |
//! | `STOCKROOM_ADMIN_TOKEN`      | unset: admin open  |

use std::net::SocketAddr;

use chrono::{DateTime, Datelike, Utc};
use stockroom_core::{DEFAULT_SEPARATOR, MAX_PAD_WIDTH, NumberFormat};
use thiserror::Error;

use crate::series::SeriesCatalog;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.to_string(),
        }
    }
}

/// How the period component of new document numbers is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PeriodPolicy {
    /// Calendar year of the allocation, in UTC (`2026`).
    #[default]
    CurrentYear,
    /// Fixed period label, e.g. a fiscal year `FY26`.
    Fixed(String),
}

impl PeriodPolicy {
    pub fn resolve(&self, now: DateTime<Utc>) -> String {
        match self {
            PeriodPolicy::CurrentYear => now.year().to_string(),
            PeriodPolicy::Fixed(period) => period.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockroomConfig {
    pub database_url: Option<String>,
    pub bind: SocketAddr,
    pub format: NumberFormat,
    pub period: PeriodPolicy,
    pub series: SeriesCatalog,
    pub admin_token: Option<String>,
}

impl StockroomConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind = get("STOCKROOM_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("STOCKROOM_BIND", e))?;

        let pad_width = match get("STOCKROOM_NUMBER_PAD") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid("STOCKROOM_NUMBER_PAD", e))?,
            None => 0,
        };

        let separator = match get("STOCKROOM_NUMBER_SEPARATOR") {
            Some(raw) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => {
                        return Err(ConfigError::invalid(
                            "STOCKROOM_NUMBER_SEPARATOR",
                            "must be a single character",
                        ));
                    }
                }
            }
            None => DEFAULT_SEPARATOR,
        };

        let format = NumberFormat::new(separator, pad_width).map_err(|e| {
            let var = if pad_width > MAX_PAD_WIDTH {
                "STOCKROOM_NUMBER_PAD"
            } else {
                "STOCKROOM_NUMBER_SEPARATOR"
            };
            ConfigError::invalid(var, e)
        })?;

        let period = match get("STOCKROOM_PERIOD") {
            Some(p) => {
                let p = p.trim().to_string();
                // Reject periods that cannot form a key before anything is allocated.
                format
                    .key("X", &p)
                    .map_err(|e| ConfigError::invalid("STOCKROOM_PERIOD", e))?;
                PeriodPolicy::Fixed(p)
            }
            None => PeriodPolicy::CurrentYear,
        };

        let mut series = SeriesCatalog::standard();
        if let Some(overrides) = get("STOCKROOM_SERIES") {
            series = series
                .apply_overrides(&overrides)
                .map_err(|e| ConfigError::invalid("STOCKROOM_SERIES", e))?;
        }
        series
            .validate(&format)
            .map_err(|e| ConfigError::invalid("STOCKROOM_SERIES", e))?;

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind,
            format,
            period,
            series,
            admin_token: get("STOCKROOM_ADMIN_TOKEN"),
        })
    }
}

impl Default for StockroomConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            format: NumberFormat::default(),
            period: PeriodPolicy::CurrentYear,
            series: SeriesCatalog::standard(),
            admin_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<StockroomConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StockroomConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = from(&[]).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.bind.port(), 8080);
        assert_eq!(cfg.format, NumberFormat::default());
        assert_eq!(cfg.period, PeriodPolicy::CurrentYear);
        assert_eq!(PeriodPolicy::default(), PeriodPolicy::CurrentYear);
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn explicit_values_are_used() {
        let cfg = from(&[
            ("DATABASE_URL", "postgres://localhost/stockroom"),
            ("STOCKROOM_BIND", "127.0.0.1:9000"),
            ("STOCKROOM_NUMBER_PAD", "5"),
            ("STOCKROOM_NUMBER_SEPARATOR", "/"),
            ("STOCKROOM_PERIOD", "FY26"),
            ("STOCKROOM_SERIES", "customer-order=SO"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/stockroom"));
        assert_eq!(cfg.bind.port(), 9000);
        assert_eq!(cfg.format.pad_width(), 5);
        assert_eq!(cfg.format.separator(), '/');
        assert_eq!(cfg.period, PeriodPolicy::Fixed("FY26".to_string()));
        assert_eq!(
            cfg.series
                .get(stockroom_invalidation::EntityKind::CustomerOrder)
                .unwrap()
                .prefix,
            "SO"
        );
    }

    #[test]
    fn empty_database_url_means_in_memory() {
        assert!(from(&[("DATABASE_URL", "  ")]).unwrap().database_url.is_none());
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(from(&[("STOCKROOM_NUMBER_PAD", "many")]).is_err());
        assert!(from(&[("STOCKROOM_NUMBER_PAD", "40")]).is_err());
        assert!(from(&[("STOCKROOM_NUMBER_SEPARATOR", "--")]).is_err());
        assert!(from(&[("STOCKROOM_PERIOD", "20 26")]).is_err());
        assert!(from(&[("STOCKROOM_BIND", "nowhere")]).is_err());
    }

    #[test]
    fn current_year_policy_uses_utc_year() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(PeriodPolicy::CurrentYear.resolve(now), "2026");
        assert_eq!(PeriodPolicy::Fixed("FY27".into()).resolve(now), "FY27");
    }
}
