//! Test utilities: handwritten mocks for the core traits.
//!
//! All mocks use `Arc<Mutex<_>>` for interior mutability so tests can
//! assert on recorded calls after handing a clone to the code under test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::AppError;
use crate::models::{AtsRecord, JobCandidate, Provider};
use crate::pipeline::{PipelineEvent, PipelineReporter};
use crate::traits::{AtsAdapter, Fetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher returning queued responses and recording requested URLs.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns `{}`.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    /// Responses keyed by exact URL, served before the queue.
    routes: Arc<Mutex<HashMap<String, Result<String, AppError>>>>,
    requested: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self::with_responses(vec![Ok(body.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            routes: Arc::new(Mutex::new(HashMap::new())),
            requested: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    /// Serve `response` whenever exactly `url` is requested.
    pub fn route(self, url: &str, response: Result<String, AppError>) -> Self {
        self.routes.lock().unwrap().insert(url.to_string(), response);
        self
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requested.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        let response = {
            let routed = self.routes.lock().unwrap().get(url).cloned();
            routed.unwrap_or_else(|| {
                let mut responses = self.responses.lock().unwrap();
                if responses.is_empty() {
                    Ok("{}".to_string())
                } else {
                    responses.remove(0)
                }
            })
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response
    }
}

// ---------------------------------------------------------------------------
// MockAdapter
// ---------------------------------------------------------------------------

/// Mock ATS adapter with canned listings and details.
#[derive(Clone)]
pub struct MockAdapter {
    provider: Provider,
    listing: Arc<Mutex<Result<Vec<AtsRecord>, AppError>>>,
    details: Arc<Mutex<HashMap<String, AtsRecord>>>,
    detail_error: Arc<Mutex<Option<AppError>>>,
    latency: Duration,
    list_calls: Arc<Mutex<usize>>,
    detail_calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockAdapter {
    /// An adapter with an empty listing and no details.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            listing: Arc::new(Mutex::new(Ok(Vec::new()))),
            details: Arc::new(Mutex::new(HashMap::new())),
            detail_error: Arc::new(Mutex::new(None)),
            latency: Duration::ZERO,
            list_calls: Arc::new(Mutex::new(0)),
            detail_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_listing(self, records: Vec<AtsRecord>) -> Self {
        *self.listing.lock().unwrap() = Ok(records);
        self
    }

    pub fn with_listing_error(self, error: AppError) -> Self {
        *self.listing.lock().unwrap() = Err(error);
        self
    }

    /// Serve `record` for detail requests of its provider job ID.
    pub fn with_detail(self, record: AtsRecord) -> Self {
        self.details
            .lock()
            .unwrap()
            .insert(record.provider_job_id.clone(), record);
        self
    }

    /// Fail every detail request with `error`.
    pub fn with_detail_error(self, error: AppError) -> Self {
        *self.detail_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn detail_calls(&self) -> Vec<(String, String)> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls() + self.detail_calls.lock().unwrap().len()
    }
}

impl AtsAdapter for MockAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn list_postings<'a>(
        &'a self,
        _company: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AtsRecord>, AppError>> {
        async move {
            *self.list_calls.lock().unwrap() += 1;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.listing.lock().unwrap().clone()
        }
        .boxed()
    }

    fn fetch_detail<'a>(
        &'a self,
        company: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<AtsRecord, AppError>> {
        async move {
            self.detail_calls
                .lock()
                .unwrap()
                .push((company.to_string(), job_id.to_string()));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if let Some(e) = self.detail_error.lock().unwrap().clone() {
                return Err(e);
            }
            self.details
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .ok_or_else(|| AppError::HttpStatus {
                    status: 404,
                    url: format!("mock://{}/{company}/{job_id}", self.provider),
                })
        }
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records the name of every event it receives.
#[derive(Clone, Default)]
pub struct MockReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == name).count()
    }
}

impl PipelineReporter for MockReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        self.events.lock().unwrap().push(event.name().to_string());
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn make_candidate(
    platform_job_id: &str,
    title: &str,
    company_name: &str,
    apply_url: Option<&str>,
) -> JobCandidate {
    JobCandidate {
        platform_job_id: platform_job_id.to_string(),
        title: title.to_string(),
        company_name: company_name.to_string(),
        location_text: None,
        apply_url: apply_url.map(str::to_string),
        easy_apply: false,
        description_text: None,
        source_platform: "linkedin".to_string(),
        source_url: format!("https://www.linkedin.com/jobs/view/{platform_job_id}/"),
        discovered_at: Utc::now(),
    }
}

pub fn make_record(
    provider: Provider,
    provider_job_id: &str,
    title: &str,
    company_name: &str,
) -> AtsRecord {
    AtsRecord {
        provider,
        provider_job_id: provider_job_id.to_string(),
        company_identifier: company_name.to_lowercase(),
        title: title.to_string(),
        company_name: company_name.to_string(),
        location_text: None,
        description_text: Some(format!("{title} at {company_name}")),
        apply_url: format!("https://ats.test/{provider}/{provider_job_id}"),
        posted_at: None,
        fetched_at: Utc::now(),
    }
}
