use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{BoardCache, get_json, html_to_text, non_empty, parse_timestamp, skip_incomplete};

#[derive(Debug, Deserialize)]
struct Position {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    friendly_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    company: Option<Company>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<Named>,
    #[serde(default)]
    country: Option<Named>,
    #[serde(default)]
    is_remote: bool,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Company {
    #[serde(default)]
    name: Option<String>,
}

impl Location {
    fn text(self) -> Option<String> {
        let parts: Vec<String> = [
            self.city,
            self.state.and_then(|s| s.name),
            self.country.and_then(|c| c.name),
        ]
        .into_iter()
        .filter_map(non_empty)
        .collect();
        let place = non_empty(self.name).or_else(|| (!parts.is_empty()).then(|| parts.join(", ")));
        match (place, self.is_remote) {
            (Some(place), true) => Some(format!("{place} (Remote)")),
            (Some(place), false) => Some(place),
            (None, true) => Some("Remote".to_string()),
            (None, false) => None,
        }
    }
}

/// Breezy HR public positions feed (`{co}.breezy.hr/json`). There is no
/// per-position JSON endpoint, so detail lookups are served from a cached
/// feed download.
#[derive(Clone)]
pub struct BreezyAdapter<F, C> {
    fetcher: F,
    cleaner: C,
    boards: BoardCache,
}

impl<F: Fetcher, C: Cleaner> BreezyAdapter<F, C> {
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
        let url = format!("https://{company}.breezy.hr/json");
        let positions: Vec<Position> = get_json(&self.fetcher, Provider::Breezy, &url).await?;
        Ok(positions
            .into_iter()
            .filter_map(|position| {
                let record = self.to_record(company, position);
                if record.is_none() {
                    skip_incomplete(Provider::Breezy, company);
                }
                record
            })
            .collect())
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        self.board(company)
            .await?
            .iter()
            .find(|r| r.provider_job_id == job_id)
            .cloned()
            .ok_or_else(|| AppError::HttpStatus {
                status: 404,
                url: format!("https://{company}.breezy.hr/p/{job_id}"),
            })
    }

    /// Apply URLs carry the friendly ID (`/p/{friendly_id}`), so that is the
    /// provider job ID when present.
    fn to_record(&self, company: &str, position: Position) -> Option<AtsRecord> {
        let id = non_empty(position.friendly_id).or_else(|| non_empty(position.id))?;
        let title = non_empty(position.name)?;
        Some(AtsRecord {
            provider: Provider::Breezy,
            apply_url: non_empty(position.url)
                .unwrap_or_else(|| format!("https://{company}.breezy.hr/p/{id}")),
            provider_job_id: id,
            company_identifier: company.to_string(),
            title,
            company_name: non_empty(position.company.and_then(|c| c.name))
                .unwrap_or_else(|| company.to_string()),
            location_text: position.location.and_then(Location::text),
            description_text: html_to_text(&self.cleaner, position.description.as_deref()),
            posted_at: parse_timestamp(position.published_date.as_deref()),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for BreezyAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Breezy
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
