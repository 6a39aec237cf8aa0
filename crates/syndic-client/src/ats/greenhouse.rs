use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use scraper::Html;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{get_json, html_to_text, incomplete_detail, non_empty, parse_timestamp, skip_incomplete};

const API_BASE: &str = "https://boards-api.greenhouse.io/v1/boards";

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    id: Option<u64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    absolute_url: Option<String>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    updated_at: Option<String>,
    /// HTML, entity-escaped. Only present on the detail endpoint.
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    name: Option<String>,
}

/// Greenhouse job board API.
#[derive(Clone)]
pub struct GreenhouseAdapter<F, C> {
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> GreenhouseAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self { fetcher, cleaner }
    }

    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let url = format!("{API_BASE}/{company}/jobs");
        let list: JobList = get_json(&self.fetcher, Provider::Greenhouse, &url).await?;
        Ok(list
            .jobs
            .into_iter()
            .filter_map(|job| {
                let record = self.to_record(company, job);
                if record.is_none() {
                    skip_incomplete(Provider::Greenhouse, company);
                }
                record
            })
            .collect())
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        let url = format!("{API_BASE}/{company}/jobs/{job_id}");
        let job: Job = get_json(&self.fetcher, Provider::Greenhouse, &url).await?;
        self.to_record(company, job)
            .ok_or_else(|| incomplete_detail(Provider::Greenhouse, company, job_id))
    }

    fn to_record(&self, company: &str, job: Job) -> Option<AtsRecord> {
        let id = job.id?.to_string();
        let title = non_empty(job.title)?;
        let content = job.content.as_deref().map(unescape_entities);
        Some(AtsRecord {
            provider: Provider::Greenhouse,
            apply_url: non_empty(job.absolute_url)
                .unwrap_or_else(|| format!("https://boards.greenhouse.io/{company}/jobs/{id}")),
            provider_job_id: id,
            company_identifier: company.to_string(),
            title,
            company_name: non_empty(job.company_name).unwrap_or_else(|| company.to_string()),
            location_text: non_empty(job.location.and_then(|l| l.name)),
            description_text: html_to_text(&self.cleaner, content.as_deref()),
            posted_at: parse_timestamp(job.updated_at.as_deref()),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for GreenhouseAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Greenhouse
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

/// Greenhouse entity-escapes the HTML in `content`. Decoding it as an HTML
/// text node yields the markup for the cleaner; content that already carries
/// tags is passed through untouched.
fn unescape_entities(raw: &str) -> String {
    if raw.contains('<') {
        return raw.to_string();
    }
    Html::parse_fragment(raw).root_element().text().collect()
}
