use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use syndic_core::error::AppError;
use syndic_core::models::{AtsRecord, Provider};
use syndic_core::traits::{AtsAdapter, Cleaner, Fetcher};

use super::{get_json, html_to_text, incomplete_detail, non_empty, parse_timestamp, skip_incomplete};

#[derive(Debug, Deserialize)]
struct OfferList {
    #[serde(default)]
    offers: Vec<Offer>,
}

#[derive(Debug, Deserialize)]
struct OfferDetail {
    offer: Option<Offer>,
}

#[derive(Debug, Deserialize)]
struct Offer {
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    remote: Option<bool>,
    #[serde(default)]
    careers_url: Option<String>,
    #[serde(default)]
    careers_apply_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    requirements: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

/// Recruitee careers-site offers API. Offers are addressed by slug, which is
/// what apply URLs (`/o/{slug}`) carry.
#[derive(Clone)]
pub struct RecruiteeAdapter<F, C> {
    fetcher: F,
    cleaner: C,
}

impl<F: Fetcher, C: Cleaner> RecruiteeAdapter<F, C> {
    pub fn new(fetcher: F, cleaner: C) -> Self {
        Self { fetcher, cleaner }
    }

    async fn list(&self, company: &str) -> Result<Vec<AtsRecord>, AppError> {
        let url = format!("https://{company}.recruitee.com/api/offers/");
        let list: OfferList = get_json(&self.fetcher, Provider::Recruitee, &url).await?;
        Ok(list
            .offers
            .into_iter()
            .filter_map(|offer| {
                let record = self.to_record(company, offer);
                if record.is_none() {
                    skip_incomplete(Provider::Recruitee, company);
                }
                record
            })
            .collect())
    }

    async fn detail(&self, company: &str, job_id: &str) -> Result<AtsRecord, AppError> {
        let url = format!("https://{company}.recruitee.com/api/offers/{job_id}");
        let detail: OfferDetail = get_json(&self.fetcher, Provider::Recruitee, &url).await?;
        detail
            .offer
            .and_then(|offer| self.to_record(company, offer))
            .ok_or_else(|| incomplete_detail(Provider::Recruitee, company, job_id))
    }

    fn to_record(&self, company: &str, offer: Offer) -> Option<AtsRecord> {
        let slug = non_empty(offer.slug)?;
        let title = non_empty(offer.title)?;
        let location_text = non_empty(offer.location).or_else(|| {
            let parts: Vec<String> = [offer.city, offer.country]
                .into_iter()
                .filter_map(non_empty)
                .collect();
            match (parts.is_empty(), offer.remote) {
                (false, _) => Some(parts.join(", ")),
                (true, Some(true)) => Some("Remote".to_string()),
                (true, _) => None,
            }
        });
        let html = match (offer.description, offer.requirements) {
            (Some(d), Some(r)) => Some(format!("{d}\n{r}")),
            (d, r) => d.or(r),
        };
        Some(AtsRecord {
            provider: Provider::Recruitee,
            apply_url: non_empty(offer.careers_apply_url)
                .or_else(|| non_empty(offer.careers_url))
                .unwrap_or_else(|| format!("https://{company}.recruitee.com/o/{slug}")),
            provider_job_id: slug,
            company_identifier: company.to_string(),
            title,
            company_name: non_empty(offer.company_name).unwrap_or_else(|| company.to_string()),
            location_text,
            description_text: html_to_text(&self.cleaner, html.as_deref()),
            posted_at: parse_timestamp(offer.published_at.as_deref()),
            fetched_at: Utc::now(),
        })
    }
}

impl<F: Fetcher, C: Cleaner> AtsAdapter for RecruiteeAdapter<F, C> {
    fn provider(&self) -> Provider {
        Provider::Recruitee
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
