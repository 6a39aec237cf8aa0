//! Adapters for the public posting APIs of supported ATS providers.
//!
//! Every adapter is a thin mapping layer: build the provider URL, fetch it
//! through a [`Fetcher`], deserialize into lenient provider structs and map
//! them onto [`AtsRecord`]s. Transport concerns (timeouts, retries) live in
//! the fetcher stack.

mod ashby;
mod breezy;
mod comeet;
mod greenhouse;
mod lever;
mod recruitee;
mod smartrecruiters;
mod workday;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use moka::future::Cache;
use serde::de::DeserializeOwned;
use syndic_core::config::PipelineConfig;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::registry::AdapterRegistry;
use syndic_core::retry::RetryingFetcher;
use syndic_core::traits::{Cleaner, Fetcher};

pub use ashby::AshbyAdapter;
pub use breezy::BreezyAdapter;
pub use comeet::ComeetAdapter;
pub use greenhouse::GreenhouseAdapter;
pub use lever::LeverAdapter;
pub use recruitee::RecruiteeAdapter;
pub use smartrecruiters::SmartRecruitersAdapter;
pub use workday::WorkdayAdapter;

/// Registry with an adapter for every provider that has a public API,
/// each fetching through a retrying, timeout-bounded wrapper of `fetcher`.
pub fn default_registry<F, C>(fetcher: F, cleaner: C, config: &PipelineConfig) -> AdapterRegistry
where
    F: Fetcher + 'static,
    C: Cleaner + 'static,
{
    let fetcher = RetryingFetcher::new(fetcher, config.retry.clone(), config.fetch_timeout);
    AdapterRegistry::new()
        .with(Arc::new(GreenhouseAdapter::new(fetcher.clone(), cleaner.clone())))
        .with(Arc::new(LeverAdapter::new(fetcher.clone(), cleaner.clone())))
        .with(Arc::new(AshbyAdapter::new(fetcher.clone(), cleaner.clone())))
        .with(Arc::new(SmartRecruitersAdapter::new(
            fetcher.clone(),
            cleaner.clone(),
        )))
        .with(Arc::new(WorkdayAdapter::new(fetcher.clone(), cleaner.clone())))
        .with(Arc::new(RecruiteeAdapter::new(fetcher.clone(), cleaner.clone())))
        .with(Arc::new(BreezyAdapter::new(fetcher.clone(), cleaner.clone())))
        .with(Arc::new(ComeetAdapter::new(fetcher, cleaner)))
}

/// How long a whole-board download stays reusable for detail lookups.
const BOARD_TTL: Duration = Duration::from_secs(300);

/// Whole-board listings for providers without a per-posting endpoint, so a
/// detail lookup after a listing (or several lookups on one board) costs one
/// download. Concurrent misses for the same company share one fetch.
#[derive(Clone)]
struct BoardCache {
    boards: Cache<String, Arc<Vec<AtsRecord>>>,
}

impl BoardCache {
    fn new() -> Self {
        Self {
            boards: Cache::builder()
                .max_capacity(256)
                .time_to_live(BOARD_TTL)
                .build(),
        }
    }

    async fn get_or_fetch<Fut>(
        &self,
        company: &str,
        fetch: Fut,
    ) -> Result<Arc<Vec<AtsRecord>>, AppError>
    where
        Fut: Future<Output = Result<Vec<AtsRecord>, AppError>>,
    {
        self.boards
            .try_get_with(company.to_string(), async { fetch.await.map(Arc::new) })
            .await
            .map_err(Arc::unwrap_or_clone)
    }
}

/// Fetch `url` and deserialize the body, tagging shape errors with the provider.
async fn get_json<T, F>(fetcher: &F, provider: Provider, url: &str) -> Result<T, AppError>
where
    T: DeserializeOwned,
    F: Fetcher,
{
    let body = fetcher.fetch(url).await?;
    serde_json::from_str(&body)
        .map_err(|e| AppError::MalformedResponse(format!("{provider} response from {url}: {e}")))
}

/// Convert an HTML description to text. Falls back to the raw HTML if the
/// conversion fails; empty results become `None`.
fn html_to_text<C: Cleaner>(cleaner: &C, html: Option<&str>) -> Option<String> {
    let html = html.map(str::trim).filter(|h| !h.is_empty())?;
    let text = cleaner.clean(html).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to clean ATS description, keeping raw HTML");
        html.to_string()
    });
    non_empty(Some(text))
}

/// Trimmed value, or `None` when absent or blank.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// RFC 3339 timestamps, plus the `YYYY-MM-DD HH:MM:SS UTC` form some
/// providers use.
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches(" UTC"), "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// A listing posting that lacked an ID or title.
fn skip_incomplete(provider: Provider, company: &str) {
    tracing::debug!(%provider, %company, "Skipping posting without id or title");
}

/// Error for a detail response that lacked required fields.
fn incomplete_detail(provider: Provider, company: &str, job_id: &str) -> AppError {
    AppError::MalformedResponse(format!(
        "{provider} posting {job_id} for {company} has no id or title"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use syndic_core::testutil::MockFetcher;

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp(Some("2024-03-01T09:30:00-05:00")).unwrap();
        assert_eq!(rfc.hour(), 14);
        let spaced = parse_timestamp(Some("2025-01-02 14:22:42 UTC")).unwrap();
        assert_eq!(spaced.day(), 2);
        assert!(parse_timestamp(Some("Posted 2 Days Ago")).is_none());
        assert!(parse_timestamp(None).is_none());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  x ".into())).as_deref(), Some("x"));
        assert!(non_empty(Some("   ".into())).is_none());
        assert!(non_empty(None).is_none());
    }

    #[tokio::test]
    async fn test_get_json_tags_provider_on_shape_error() {
        let fetcher = MockFetcher::new("<html>not json</html>");
        let err = get_json::<serde_json::Value, _>(&fetcher, Provider::Lever, "https://x.test")
            .await
            .unwrap_err();
        let AppError::MalformedResponse(msg) = err else {
            panic!("expected malformed response");
        };
        assert!(msg.starts_with("lever response from https://x.test"));
    }

    #[test]
    fn test_default_registry_covers_adapters() {
        let registry = default_registry(
            MockFetcher::new("{}"),
            crate::HtmdCleaner::new(),
            &PipelineConfig::default(),
        );
        assert_eq!(
            registry.providers(),
            vec![
                Provider::Greenhouse,
                Provider::Lever,
                Provider::Ashby,
                Provider::SmartRecruiters,
                Provider::Workday,
                Provider::Recruitee,
                Provider::Breezy,
                Provider::Comeet,
            ]
        );
        assert!(!registry.supports(Provider::Taleo));
    }
}
