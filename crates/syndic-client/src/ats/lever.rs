use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{get_json, html_to_text, incomplete_detail, non_empty, skip_incomplete};

const API_BASE: &str = "https://api.lever.co/v0/postings";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Posting {
    #[serde(default)]
    id: Option<String>,
    /// Lever calls the title `text`.
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    hosted_url: Option<String>,
    #[serde(default)]
    apply_url: Option<String>,
    #[serde(default)]
    categories: Option<Categories>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(default)]
    description_plain: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Categories {
    #[serde(default)]
    location: Option<String>,
}

/// Lever postings API.
#[derive(Clone)]
pub struct LeverAdapter<F, C> {
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> LeverAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self { fetcher, cleaner }
    }

    /// Pages with `skip`/`limit` until a short or empty page.
    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let mut records = Vec::new();
        let mut skip = 0;
        loop {
            let url = format!("{API_BASE}/{company}?mode=json&skip={skip}&limit={PAGE_SIZE}");
            let page: Vec<Posting> = get_json(&self.fetcher, Provider::Lever, &url).await?;
            let count = page.len();
            for posting in page {
                match self.to_record(company, posting) {
                    Some(record) => records.push(record),
                    None => skip_incomplete(Provider::Lever, company),
                }
            }
            if count < PAGE_SIZE {
                break;
            }
            skip += count;
        }
        Ok(records)
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        let url = format!("{API_BASE}/{company}/{job_id}");
        let posting: Posting = get_json(&self.fetcher, Provider::Lever, &url).await?;
        self.to_record(company, posting)
            .ok_or_else(|| incomplete_detail(Provider::Lever, company, job_id))
    }

    fn to_record(&self, company: &str, posting: Posting) -> Option<AtsRecord> {
        let id = non_empty(posting.id)?;
        let title = non_empty(posting.text)?;
        let description_text = non_empty(posting.description_plain)
            .or_else(|| html_to_text(&self.cleaner, posting.description.as_deref()));
        Some(AtsRecord {
            provider: Provider::Lever,
            apply_url: non_empty(posting.apply_url)
                .or_else(|| non_empty(posting.hosted_url))
                .unwrap_or_else(|| format!("https://jobs.lever.co/{company}/{id}")),
            provider_job_id: id,
            company_identifier: company.to_string(),
            title,
            company_name: company.to_string(),
            location_text: non_empty(posting.categories.and_then(|c| c.location)),
            description_text,
            posted_at: posting.created_at.and_then(DateTime::from_timestamp_millis),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for LeverAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Lever
    }

    fn list_postings<'a>(
        &'a self,
        company: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AtsRecord>, AppError>> {
        self.list(company).boxed()
    }

    fn fetch_detail<'a>(
        &'a self,
        company: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<AtsRecord, AppError>> {
        self.detail(company, job_id).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HtmdCleaner;
    use syndic_core::testutil::MockFetcher;

    const ID: &str = "5ac21346-8e0c-4494-8e7a-3eb92ff77902";

    fn posting(i: usize) -> serde_json::Value {
        serde_json::json!({
            "id": format!("00000000-0000-0000-0000-{i:012}"),
            "text": format!("Engineer {i}"),
        })
    }

    #[tokio::test]
    async fn test_listing_pages_until_short_page() {
        let full: Vec<_> = (0..PAGE_SIZE).map(posting).collect();
        let short: Vec<_> = (PAGE_SIZE..PAGE_SIZE + 3).map(posting).collect();
        let fetcher = MockFetcher::with_responses(vec![
            Ok(serde_json::to_string(&full).unwrap()),
            Ok(serde_json::to_string(&short).unwrap()),
        ]);
        let adapter = LeverAdapter::new(fetcher.clone(), HtmdCleaner::new());

        let records = adapter.list("acme").await.unwrap();
        assert_eq!(records.len(), PAGE_SIZE + 3);
        assert_eq!(
            fetcher.requested_urls(),
            vec![
                "https://api.lever.co/v0/postings/acme?mode=json&skip=0&limit=100",
                "https://api.lever.co/v0/postings/acme?mode=json&skip=100&limit=100",
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_listing_stops_immediately() {
        let fetcher = MockFetcher::new("[]");
        let adapter = LeverAdapter::new(fetcher.clone(), HtmdCleaner::new());
        assert!(adapter.list("acme").await.unwrap().is_empty());
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_detail_prefers_plain_description() {
        let body = serde_json::json!({
            "id": ID,
            "text": "Backend Engineer",
            "hostedUrl": format!("https://jobs.lever.co/acme/{ID}"),
            "applyUrl": format!("https://jobs.lever.co/acme/{ID}/apply"),
            "categories": {"location": "Remote - EU", "team": "Platform"},
            "createdAt": 1_700_000_000_000_i64,
            "descriptionPlain": "Build the platform.",
            "description": "<div>Build the platform.</div>"
        });
        let fetcher = MockFetcher::new(&body.to_string());
        let adapter = LeverAdapter::new(fetcher.clone(), HtmdCleaner::new());

        let record = adapter.fetch_detail("acme", ID).await.unwrap();
        assert_eq!(
            fetcher.requested_urls(),
            vec![format!("https://api.lever.co/v0/postings/acme/{ID}")]
        );
        assert_eq!(record.title, "Backend Engineer");
        assert_eq!(record.apply_url, format!("https://jobs.lever.co/acme/{ID}/apply"));
        assert_eq!(record.location_text.as_deref(), Some("Remote - EU"));
        assert_eq!(record.description_text.as_deref(), Some("Build the platform."));
        assert_eq!(record.posted_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_non_array_listing_is_malformed() {
        let adapter = LeverAdapter::new(
            MockFetcher::new(r#"{"ok": false, "error": "Document not found"}"#),
            HtmdCleaner::new(),
        );
        let err = adapter.list("acme").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }
}
