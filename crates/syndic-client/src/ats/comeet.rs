use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use moka::future::Cache;
use regex::Regex;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{
    get_json, html_to_text, incomplete_detail, non_empty, parse_timestamp, skip_incomplete,
};

const API_BASE: &str = "https://www.comeet.co/careers-api/2.0/company";
const CAREERS_BASE: &str = "https://www.comeet.com/jobs";

/// Detail sections that make up the posting description, in output order.
const DESCRIPTION_SECTIONS: [&str; 2] = ["Description", "Requirements"];

/// The positions endpoint answers with a bare array on some tenants and a
/// `{"data": [...]}` envelope on others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionList {
    Bare(Vec<Position>),
    Wrapped {
        #[serde(default)]
        data: Vec<Position>,
    },
}

impl PositionList {
    fn into_positions(self) -> Vec<Position> {
        match self {
            PositionList::Bare(positions) | PositionList::Wrapped { data: positions } => positions,
        }
    }
}

/// A single-position lookup sometimes comes back as a one-element array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PositionBody {
    Many(Vec<Position>),
    One(Position),
}

#[derive(Debug, Deserialize)]
struct Position {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    workplace_type: Option<String>,
    #[serde(default)]
    url_comeet_hosted_page: Option<String>,
    #[serde(default)]
    url_active_page: Option<String>,
    #[serde(default)]
    time_updated: Option<String>,
    #[serde(default)]
    details: Vec<Detail>,
}

#[derive(Debug, Deserialize)]
struct Location {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    is_remote: bool,
}

#[derive(Debug, Deserialize)]
struct Detail {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl Position {
    fn is_remote(&self) -> bool {
        self.location.as_ref().is_some_and(|l| l.is_remote)
            || self
                .workplace_type
                .as_deref()
                .is_some_and(|w| w.eq_ignore_ascii_case("remote"))
    }

    fn location_text(&mut self) -> Option<String> {
        let remote = self.is_remote();
        let place = self.location.take().and_then(|loc| {
            let parts: Vec<String> = [loc.city, loc.state, loc.country]
                .into_iter()
                .filter_map(non_empty)
                .collect();
            non_empty(loc.name).or_else(|| (!parts.is_empty()).then(|| parts.join(", ")))
        });
        match (place, remote) {
            (Some(place), true) if !place.to_lowercase().contains("remote") => {
                Some(format!("{place} (Remote)"))
            }
            (Some(place), _) => Some(place),
            (None, true) => Some("Remote".to_string()),
            (None, false) => None,
        }
    }

    fn description_html(&self) -> Option<String> {
        let sections: Vec<&str> = DESCRIPTION_SECTIONS
            .iter()
            .filter_map(|section| {
                self.details
                    .iter()
                    .find(|d| d.name.as_deref() == Some(*section))
                    .and_then(|d| d.value.as_deref())
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
            })
            .collect();
        (!sections.is_empty()).then(|| sections.join("\n"))
    }
}

/// Comeet careers API.
///
/// The company identifier is `{slug}/{company_uid}`, the path under
/// `comeet.com/jobs/`. The API wants a per-company token, which is read
/// off the public careers page once and cached.
#[derive(Clone)]
pub struct ComeetAdapter<F, C> {
    fetcher: F,
    cleaner: C,
    tokens: Cache<String, Option<Arc<str>>>,
}

impl<F: Fetcher, C: Cleaner> ComeetAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self {
            fetcher,
            cleaner,
            tokens: Cache::builder().max_capacity(256).build(),
        }
    }

    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let url = self.api_url(company, "positions?details=true").await?;
        let list: PositionList = get_json(&self.fetcher, Provider::Comeet, &url).await?;
        Ok(list
            .into_positions()
            .into_iter()
            .filter_map(|position| {
                let record = self.to_record(company, position);
                if record.is_none() {
                    skip_incomplete(Provider::Comeet, company);
                }
                record
            })
            .collect())
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        let url = self
            .api_url(company, &format!("positions/{job_id}?details=true"))
            .await?;
        let body: PositionBody = get_json(&self.fetcher, Provider::Comeet, &url).await?;
        let position = match body {
            PositionBody::One(position) => Some(position),
            PositionBody::Many(positions) => positions.into_iter().next(),
        };
        position
            .and_then(|p| self.to_record(company, p))
            .ok_or_else(|| incomplete_detail(Provider::Comeet, company, job_id))
    }

    /// API URL for `path` under the company, with the token appended when
    /// the careers page exposed one.
    async fn api_url(&self, company: &str, path: &str) -> Result<String, AppError> {
        let uid = company_uid(company);
        let url = format!("{API_BASE}/{uid}/{path}");
        Ok(match self.token(company).await? {
            Some(token) => format!("{url}&token={token}"),
            None => url,
        })
    }

    async fn token(&self, company: &str) -> Result<Option<Arc<str>>, AppError> {
        self.tokens
            .try_get_with(company.to_string(), async {
                let page = format!("{CAREERS_BASE}/{company}");
                let html = self.fetcher.fetch(&page).await?;
                let token = find_token(&html);
                if token.is_none() {
                    tracing::warn!(company, "No Comeet token on careers page, calling API without one");
                }
                Ok::<_, AppError>(token.map(Arc::from))
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }

    fn to_record(&self, company: &str, mut position: Position) -> Option<AtsRecord> {
        let id = non_empty(position.uid.take())?;
        let title = non_empty(position.name.take())?;
        let description = position.description_html();
        Some(AtsRecord {
            provider: Provider::Comeet,
            apply_url: non_empty(position.url_comeet_hosted_page.take())
                .or_else(|| non_empty(position.url_active_page.take()))
                .unwrap_or_else(|| format!("{CAREERS_BASE}/{company}/position/{id}")),
            provider_job_id: id,
            company_identifier: company.to_string(),
            title,
            company_name: non_empty(position.company_name.take())
                .unwrap_or_else(|| company_slug(company).to_string()),
            location_text: position.location_text(),
            description_text: html_to_text(&self.cleaner, description.as_deref()),
            posted_at: parse_timestamp(position.time_updated.as_deref()),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for ComeetAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Comeet
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

fn company_uid(company: &str) -> &str {
    company.rsplit('/').next().unwrap_or(company)
}

fn company_slug(company: &str) -> &str {
    company.split('/').next().unwrap_or(company)
}

/// The careers page embeds its API calls, token included.
fn find_token(html: &str) -> Option<String> {
    let pattern = Regex::new(r"(?i)token=([0-9a-f]{32})").ok()?;
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HtmdCleaner;
    use syndic_core::testutil::MockFetcher;

    const TOKEN: &str = "A1B2C3D4E5F60718293A4B5C6D7E8F90";
    const CAREERS_PAGE: &str = "https://www.comeet.com/jobs/acme/E5.00A";
    const LIST_URL: &str = "https://www.comeet.co/careers-api/2.0/company/E5.00A/positions?details=true&token=A1B2C3D4E5F60718293A4B5C6D7E8F90";

    fn careers_html() -> String {
        format!(
            r#"<html><script>fetch("/careers-api/2.0/company/E5.00A/positions?token={TOKEN}")</script></html>"#
        )
    }

    const POSITIONS: &str = r#"{"data": [
        {
            "uid": "3C.B12",
            "name": "Backend Engineer",
            "company_name": "Acme",
            "department": "R&D",
            "location": {"name": "Tel Aviv", "city": "Tel Aviv", "country": "IL", "is_remote": false},
            "workplace_type": "Hybrid",
            "url_comeet_hosted_page": "https://www.comeet.com/jobs/acme/E5.00A/backend-engineer/3C.B12",
            "position_url": "https://www.comeet.co/careers-api/2.0/company/E5.00A/positions/3C.B12",
            "time_updated": "2024-05-01T12:00:00Z",
            "details": [
                {"name": "Requirements", "value": "<ul><li>Rust</li></ul>"},
                {"name": "Description", "value": "<p>Own the <b>ingest</b> path.</p>"},
                {"name": "About Acme", "value": "<p>We sell anvils.</p>"}
            ]
        },
        {
            "uid": "3C.B13",
            "name": "Designer",
            "location": {"city": "Lisbon", "country": "PT"},
            "workplace_type": "Remote"
        },
        {"uid": "3C.B14", "name": ""}
    ]}"#;

    fn fetcher() -> MockFetcher {
        MockFetcher::new("{}")
            .route(CAREERS_PAGE, Ok(careers_html()))
            .route(LIST_URL, Ok(POSITIONS.to_string()))
    }

    #[tokio::test]
    async fn test_listing_reads_token_then_maps_positions() {
        let fetcher = fetcher();
        let adapter = ComeetAdapter::new(fetcher.clone(), HtmdCleaner::new());
        let records = adapter.list("acme/E5.00A").await.unwrap();

        assert_eq!(fetcher.requested_urls(), vec![CAREERS_PAGE, LIST_URL]);
        assert_eq!(records.len(), 2);

        let backend = &records[0];
        assert_eq!(backend.provider_job_id, "3C.B12");
        assert_eq!(backend.company_name, "Acme");
        assert_eq!(backend.location_text.as_deref(), Some("Tel Aviv"));
        assert!(backend.apply_url.ends_with("/backend-engineer/3C.B12"));
        assert!(backend.posted_at.is_some());
        let description = backend.description_text.as_deref().unwrap();
        assert!(description.find("ingest").unwrap() < description.find("Rust").unwrap());
        assert!(!description.contains("anvils"));

        let designer = &records[1];
        assert_eq!(designer.company_name, "acme");
        assert_eq!(designer.location_text.as_deref(), Some("Lisbon, PT (Remote)"));
        assert!(designer.description_text.is_none());
    }

    #[tokio::test]
    async fn test_bare_array_listing() {
        let body = r#"[{"uid": "3C.B12", "name": "Backend Engineer"}]"#;
        let fetcher = MockFetcher::new("{}")
            .route(CAREERS_PAGE, Ok(careers_html()))
            .route(LIST_URL, Ok(body.to_string()));
        let adapter = ComeetAdapter::new(fetcher, HtmdCleaner::new());
        let records = adapter.list("acme/E5.00A").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Backend Engineer");
    }

    #[tokio::test]
    async fn test_token_is_read_once_per_company() {
        let detail_url = "https://www.comeet.co/careers-api/2.0/company/E5.00A/positions/3C.B12?details=true&token=A1B2C3D4E5F60718293A4B5C6D7E8F90";
        let fetcher = fetcher().route(
            detail_url,
            Ok(r#"[{"uid": "3C.B12", "name": "Backend Engineer"}]"#.to_string()),
        );
        let adapter = ComeetAdapter::new(fetcher.clone(), HtmdCleaner::new());

        adapter.list_postings("acme/E5.00A").await.unwrap();
        let record = adapter.fetch_detail("acme/E5.00A", "3C.B12").await.unwrap();

        assert_eq!(record.provider_job_id, "3C.B12");
        assert_eq!(fetcher.requested_urls(), vec![CAREERS_PAGE, LIST_URL, detail_url]);
    }

    #[tokio::test]
    async fn test_missing_token_calls_api_without_one() {
        let bare = "https://www.comeet.co/careers-api/2.0/company/E5.00A/positions?details=true";
        let fetcher = MockFetcher::new("{}")
            .route(CAREERS_PAGE, Ok("<html>no api here</html>".to_string()))
            .route(bare, Ok("[]".to_string()));
        let adapter = ComeetAdapter::new(fetcher.clone(), HtmdCleaner::new());

        let records = adapter.list("acme/E5.00A").await.unwrap();
        assert!(records.is_empty());
        assert_eq!(fetcher.requested_urls(), vec![CAREERS_PAGE, bare]);
    }

    #[tokio::test]
    async fn test_detail_without_title_is_malformed() {
        let detail_url = "https://www.comeet.co/careers-api/2.0/company/E5.00A/positions/3C.B12?details=true&token=A1B2C3D4E5F60718293A4B5C6D7E8F90";
        let fetcher = fetcher().route(detail_url, Ok(r#"{"uid": "3C.B12"}"#.to_string()));
        let adapter = ComeetAdapter::new(fetcher, HtmdCleaner::new());
        let err = adapter.fetch_detail("acme/E5.00A", "3C.B12").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
    }

    #[test]
    fn test_find_token() {
        assert_eq!(find_token(&careers_html()).as_deref(), Some(TOKEN));
        assert!(find_token("token=short").is_none());
    }
}
