use chrono::{NaiveDate, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{get_json, html_to_text, incomplete_detail, non_empty, skip_incomplete};

const PAGE_SIZE: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPage {
    /// Only reliable on the first page; later pages report 0.
    #[serde(default)]
    total: usize,
    #[serde(default)]
    job_postings: Vec<JobSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobSummary {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    external_path: Option<String>,
    #[serde(default)]
    locations_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDetail {
    job_posting_info: Option<JobPostingInfo>,
    #[serde(default)]
    hiring_organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobPostingInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    job_description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    external_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    #[serde(default)]
    name: Option<String>,
}

/// A Workday career site, parsed from a `{tenant}.{pod}/{site}` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Site {
    host: String,
    tenant: String,
    site: String,
}

impl Site {
    fn parse(identifier: &str) -> Result<Self, AppError> {
        let invalid = || {
            AppError::MissingIdentifier(format!(
                "Workday identifier '{identifier}' is not tenant.pod/site"
            ))
        };
        let (host_part, site) = identifier.split_once('/').ok_or_else(invalid)?;
        let (tenant, pod) = host_part.split_once('.').ok_or_else(invalid)?;
        if tenant.is_empty() || pod.is_empty() || site.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: format!("{tenant}.{pod}.myworkdayjobs.com"),
            tenant: tenant.to_string(),
            site: site.trim_matches('/').to_string(),
        })
    }

    fn api_base(&self) -> String {
        format!("https://{}/wday/cxs/{}/{}", self.host, self.tenant, self.site)
    }

    fn public_url(&self, job_path: &str) -> String {
        format!("https://{}/{}/{}", self.host, self.site, job_path)
    }
}

/// Workday candidate experience ("cxs") API.
///
/// Job identifiers are the posting's external path without the leading
/// slash (`job/{location}/{slug}_{req}`).
#[derive(Clone)]
pub struct WorkdayAdapter<F, C> {
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> WorkdayAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self { fetcher, cleaner }
    }

    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let site = Site::parse(company)?;
        let mut records = Vec::new();
        let mut offset = 0;
        let mut first_total = None;
        loop {
            let url = format!("{}/jobs?offset={offset}&limit={PAGE_SIZE}", site.api_base());
            let page: JobPage = get_json(&self.fetcher, Provider::Workday, &url).await?;
            let total = *first_total.get_or_insert(page.total);
            let count = page.job_postings.len();
            for summary in page.job_postings {
                match summary_record(company, &site, summary) {
                    Some(record) => records.push(record),
                    None => skip_incomplete(Provider::Workday, company),
                }
            }
            offset += count;
            if count == 0 || offset >= total {
                break;
            }
        }
        Ok(records)
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        let site = Site::parse(company)?;
        let job_path = job_id.trim_start_matches('/');
        let url = format!("{}/{job_path}", site.api_base());
        let detail: JobDetail = get_json(&self.fetcher, Provider::Workday, &url).await?;

        let incomplete = || incomplete_detail(Provider::Workday, company, job_id);
        let info = detail.job_posting_info.ok_or_else(incomplete)?;
        let title = non_empty(info.title).ok_or_else(incomplete)?;
        Ok(AtsRecord {
            provider: Provider::Workday,
            provider_job_id: job_path.to_string(),
            company_identifier: company.to_string(),
            title,
            company_name: non_empty(detail.hiring_organization.and_then(|o| o.name))
                .unwrap_or_else(|| site.tenant.clone()),
            location_text: non_empty(info.location),
            description_text: html_to_text(&self.cleaner, info.job_description.as_deref()),
            apply_url: non_empty(info.external_url).unwrap_or_else(|| site.public_url(job_path)),
            posted_at: info
                .start_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
            fetched_at: Utc::now(),
        })
    }
}

/// Listing rows have no description and only a relative "Posted N days ago".
fn summary_record(company: &str, site: &Site, summary: JobSummary) -> Option<AtsRecord> {
    let path = non_empty(summary.external_path)?;
    let job_path = path.trim_start_matches('/').to_string();
    let title = non_empty(summary.title)?;
    Some(AtsRecord {
        provider: Provider::Workday,
        apply_url: site.public_url(&job_path),
        provider_job_id: job_path,
        company_identifier: company.to_string(),
        title,
        company_name: site.tenant.clone(),
        location_text: non_empty(summary.locations_text),
        description_text: None,
        posted_at: None,
        fetched_at: Utc::now(),
    })
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for WorkdayAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Workday
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
