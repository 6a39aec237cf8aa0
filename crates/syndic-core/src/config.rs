use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::models::Provider;
use crate::reconcile::MatchConfig;
use crate::retry::RetryPolicy;
use crate::throttle::ProviderGate;

/// Tunables consumed by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Upper bound on ATS fetches in flight at once.
    pub max_concurrent_fetches: usize,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    pub matching: MatchConfig,
    /// Minimum spacing between dispatches to one provider.
    pub provider_delay: Duration,
    pub provider_delays: HashMap<Provider, Duration>,
    /// Stop accepting new candidates once this many have been captured.
    pub max_candidates: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 3,
            fetch_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            matching: MatchConfig::default(),
            provider_delay: Duration::from_secs(1),
            provider_delays: HashMap::new(),
            max_candidates: None,
        }
    }
}

impl PipelineConfig {
    /// Read configuration from `SYNDIC_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// - `SYNDIC_MAX_CONCURRENT_FETCHES`
    /// - `SYNDIC_FETCH_TIMEOUT_SECS`
    /// - `SYNDIC_MAX_RETRIES`, `SYNDIC_BACKOFF_BASE_MS`, `SYNDIC_MAX_BACKOFF_MS`
    /// - `SYNDIC_MATCH_THRESHOLD`, `SYNDIC_TITLE_WEIGHT`, `SYNDIC_COMPANY_WEIGHT`,
    ///   `SYNDIC_TIE_BAND`, `SYNDIC_LOCATION_AGREEMENT`
    /// - `SYNDIC_PROVIDER_DELAY_MS`
    /// - `SYNDIC_PROVIDER_DELAYS` (e.g. `workday=3000,lever=500`, milliseconds)
    /// - `SYNDIC_MAX_CANDIDATES`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            max_concurrent_fetches: parse_or(
                &get,
                "SYNDIC_MAX_CONCURRENT_FETCHES",
                defaults.max_concurrent_fetches,
            )?,
            fetch_timeout: Duration::from_secs(parse_or(
                &get,
                "SYNDIC_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )?),
            retry: RetryPolicy {
                max_retries: parse_or(&get, "SYNDIC_MAX_RETRIES", defaults.retry.max_retries)?,
                backoff_base: millis_or(
                    &get,
                    "SYNDIC_BACKOFF_BASE_MS",
                    defaults.retry.backoff_base,
                )?,
                max_backoff: millis_or(&get, "SYNDIC_MAX_BACKOFF_MS", defaults.retry.max_backoff)?,
            },
            matching: MatchConfig {
                threshold: parse_or(&get, "SYNDIC_MATCH_THRESHOLD", defaults.matching.threshold)?,
                title_weight: parse_or(
                    &get,
                    "SYNDIC_TITLE_WEIGHT",
                    defaults.matching.title_weight,
                )?,
                company_weight: parse_or(
                    &get,
                    "SYNDIC_COMPANY_WEIGHT",
                    defaults.matching.company_weight,
                )?,
                tie_band: parse_or(&get, "SYNDIC_TIE_BAND", defaults.matching.tie_band)?,
                location_agreement: parse_or(
                    &get,
                    "SYNDIC_LOCATION_AGREEMENT",
                    defaults.matching.location_agreement,
                )?,
            },
            provider_delay: millis_or(&get, "SYNDIC_PROVIDER_DELAY_MS", defaults.provider_delay)?,
            provider_delays: match get("SYNDIC_PROVIDER_DELAYS") {
                Some(raw) => parse_provider_delays(&raw)?,
                None => HashMap::new(),
            },
            max_candidates: match get("SYNDIC_MAX_CANDIDATES") {
                Some(raw) => Some(parse_value("SYNDIC_MAX_CANDIDATES", &raw)?),
                None => None,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_concurrent_fetches == 0 {
            return Err(AppError::Config(
                "max concurrent fetches must be at least 1".into(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(AppError::Config("fetch timeout must be positive".into()));
        }
        if self.retry.max_backoff < self.retry.backoff_base {
            return Err(AppError::Config(
                "max backoff must not be shorter than the backoff base".into(),
            ));
        }
        if self.max_candidates == Some(0) {
            return Err(AppError::Config("max candidates must be at least 1".into()));
        }
        self.matching.validate()
    }

    pub fn gate(&self) -> ProviderGate {
        ProviderGate::new(self.provider_delay).with_overrides(self.provider_delays.clone())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid {key} '{raw}'")))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, key: &str, default: Duration) -> Result<Duration, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value::<u64>(key, &raw).map(Duration::from_millis),
        None => Ok(default),
    }
}

/// Parse `provider=millis` pairs separated by commas.
fn parse_provider_delays(raw: &str) -> Result<HashMap<Provider, Duration>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, ms) = pair.split_once('=').ok_or_else(|| {
                AppError::Config(format!(
                    "Invalid SYNDIC_PROVIDER_DELAYS entry '{pair}': expected provider=millis"
                ))
            })?;
            let provider = name.trim().parse::<Provider>().map_err(AppError::Config)?;
            let ms: u64 = parse_value("SYNDIC_PROVIDER_DELAYS", ms)?;
            Ok((provider, Duration::from_millis(ms)))
        })
        .collect()
}
