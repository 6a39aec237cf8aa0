use std::future::Future;

use futures::future::BoxFuture;

use crate::error::AppError;
use crate::models::{AtsRecord, Provider};

/// Fetches a response body from a URL.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Converts provider HTML into plain text.
pub trait Cleaner: Send + Sync + Clone {
    fn clean(&self, html: &str) -> Result<String, AppError>;
}

/// Client for one ATS provider's public postings API.
///
/// Object-safe so adapters for every provider can live in one registry.
pub trait AtsAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// All open postings for a company, at listing-level detail.
    fn list_postings<'a>(
        &'a self,
        company: &'a str,
    ) -> BoxFuture<'a, Result<Vec<AtsRecord>, AppError>>;

    /// One posting with its full description.
    fn fetch_detail<'a>(
        &'a self,
        company: &'a str,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<AtsRecord, AppError>>;
}
