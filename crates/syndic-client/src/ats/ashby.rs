use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{BoardCache, get_json, html_to_text, non_empty, parse_timestamp, skip_incomplete};

const API_BASE: &str = "https://api.ashbyhq.com/posting-api/job-board";

#[derive(Debug, Deserialize)]
struct JobBoard {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    is_remote: Option<bool>,
    #[serde(default)]
    job_url: Option<String>,
    #[serde(default)]
    apply_url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    description_plain: Option<String>,
    #[serde(default)]
    description_html: Option<String>,
}

/// Ashby public job board API. There is no per-posting endpoint and the
/// board response already carries full descriptions, so detail lookups are
/// served from a cached board download.
#[derive(Clone)]
pub struct AshbyAdapter<F, C> {
    fetcher: F,
    cleaner: C,
    boards: BoardCache,
}

impl<F: Fetcher, C: Cleaner> AshbyAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self {
            fetcher,
            cleaner,
            boards: BoardCache::new(),
        }
    }

    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        Ok(self.board(company).await?.as_ref().clone())
    }

    async fn board(&self, company: &str) -> Result<Arc<Vec<AtsRecord>>, AppError> {
        self.boards
            .get_or_fetch(company, self.download(company))
            .await
    }

    async fn download(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let url = format!("{API_BASE}/{company}");
        let board: JobBoard = get_json(&self.fetcher, Provider::Ashby, &url).await?;
        Ok(board
            .jobs
            .into_iter()
            .filter_map(|job| {
                let record = self.to_record(company, job);
                if record.is_none() {
                    skip_incomplete(Provider::Ashby, company);
                }
                record
            })
            .collect())
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        self.board(company)
            .await?
            .iter()
            .find(|r| r.provider_job_id.eq_ignore_ascii_case(job_id))
            .cloned()
            .ok_or_else(|| AppError::HttpStatus {
                status: 404,
                url: format!("https://jobs.ashbyhq.com/{company}/{job_id}"),
            })
    }

    fn to_record(&self, company: &str, job: Job) -> Option<AtsRecord> {
        let id = non_empty(job.id).or_else(|| {
            job.job_url
                .as_deref()
                .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
                .map(str::to_string)
        })?;
        let title = non_empty(job.title)?;
        let location_text = match (non_empty(job.location), job.is_remote) {
            (Some(loc), _) => Some(loc),
            (None, Some(true)) => Some("Remote".to_string()),
            (None, _) => None,
        };
        Some(AtsRecord {
            provider: Provider::Ashby,
            apply_url: non_empty(job.apply_url)
                .or_else(|| non_empty(job.job_url))
                .unwrap_or_else(|| format!("https://jobs.ashbyhq.com/{company}/{id}")),
            provider_job_id: id,
            company_identifier: company.to_string(),
            title,
            company_name: company.to_string(),
            location_text,
            description_text: non_empty(job.description_plain)
                .or_else(|| html_to_text(&self.cleaner, job.description_html.as_deref())),
            posted_at: parse_timestamp(job.published_at.as_deref()),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for AshbyAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Ashby
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
