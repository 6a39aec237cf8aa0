use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{get_json, html_to_text, incomplete_detail, non_empty, parse_timestamp, skip_incomplete};

const API_BASE: &str = "https://api.smartrecruiters.com/v1/companies";
const PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostingPage {
    #[serde(default)]
    total_found: Option<usize>,
    #[serde(default)]
    content: Vec<Posting>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Posting {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    company: Option<Company>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    released_date: Option<String>,
    #[serde(default)]
    apply_url: Option<String>,
    #[serde(default)]
    posting_url: Option<String>,
    #[serde(default)]
    job_ad: Option<JobAd>,
}

#[derive(Debug, Deserialize)]
struct Company {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    #[serde(default)]
    full_location: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    remote: Option<bool>,
}

impl Location {
    fn text(self) -> Option<String> {
        if let Some(full) = non_empty(self.full_location) {
            return Some(full);
        }
        let parts: Vec<String> = [self.city, self.region, self.country]
            .into_iter()
            .filter_map(non_empty)
            .collect();
        match (parts.is_empty(), self.remote) {
            (false, _) => Some(parts.join(", ")),
            (true, Some(true)) => Some("Remote".to_string()),
            (true, _) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobAd {
    #[serde(default)]
    sections: Option<Sections>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Sections {
    #[serde(default)]
    job_description: Option<Section>,
    #[serde(default)]
    qualifications: Option<Section>,
    #[serde(default)]
    additional_information: Option<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    #[serde(default)]
    text: Option<String>,
}

impl Sections {
    /// Description and qualifications, as one HTML fragment.
    fn html(self) -> Option<String> {
        let parts: Vec<String> = [
            self.job_description,
            self.qualifications,
            self.additional_information,
        ]
        .into_iter()
        .flatten()
        .filter_map(|s| non_empty(s.text))
        .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }
}

/// SmartRecruiters posting API.
#[derive(Clone)]
pub struct SmartRecruitersAdapter<F, C> {
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> SmartRecruitersAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self { fetcher, cleaner }
    }

    /// Pages with `offset`/`limit` until `totalFound` is reached or a page
    /// comes back empty.
    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let url = format!("{API_BASE}/{company}/postings?offset={offset}&limit={PAGE_SIZE}");
            let page: PostingPage =
                get_json(&self.fetcher, Provider::SmartRecruiters, &url).await?;
            let count = page.content.len();
            for posting in page.content {
                match self.to_record(company, posting) {
                    Some(record) => records.push(record),
                    None => skip_incomplete(Provider::SmartRecruiters, company),
                }
            }
            offset += count;
            if count == 0 || page.total_found.is_none_or(|total| offset >= total) {
                break;
            }
        }
        Ok(records)
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        let url = format!("{API_BASE}/{company}/postings/{job_id}");
        let posting: Posting = get_json(&self.fetcher, Provider::SmartRecruiters, &url).await?;
        self.to_record(company, posting)
            .ok_or_else(|| incomplete_detail(Provider::SmartRecruiters, company, job_id))
    }

    fn to_record(&self, company: &str, posting: Posting) -> Option<AtsRecord> {
        let id = non_empty(posting.id)?;
        let title = non_empty(posting.name)?;
        let description_html = posting
            .job_ad
            .and_then(|ad| ad.sections)
            .and_then(Sections::html);
        Some(AtsRecord {
            provider: Provider::SmartRecruiters,
            apply_url: non_empty(posting.posting_url)
                .or_else(|| non_empty(posting.apply_url))
                .unwrap_or_else(|| format!("https://jobs.smartrecruiters.com/{company}/{id}")),
            provider_job_id: id,
            company_identifier: company.to_string(),
            title,
            company_name: non_empty(posting.company.and_then(|c| c.name))
                .unwrap_or_else(|| company.to_string()),
            location_text: posting.location.and_then(Location::text),
            description_text: html_to_text(&self.cleaner, description_html.as_deref()),
            posted_at: parse_timestamp(posting.released_date.as_deref()),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for SmartRecruitersAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::SmartRecruiters
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
