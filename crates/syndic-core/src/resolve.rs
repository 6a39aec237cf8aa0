//! Per-candidate ATS resolution: fetch the authoritative record and score it.

use std::sync::Arc;

use moka::future::Cache;

use crate::error::AppError;
use crate::models::{AtsRecord, JobCandidate, MatchResult, Provider, ProviderMatch};
use crate::reconcile::Reconciler;
use crate::registry::AdapterRegistry;
use crate::traits::AtsAdapter;

/// What one resolution attempt produced.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: Option<AtsRecord>,
    pub result: MatchResult,
}

/// Resolves ATS-sourced candidates against their provider.
///
/// Company listings are cached for the lifetime of the resolver, and
/// concurrent requests for the same listing share one fetch.
pub struct Resolver {
    registry: AdapterRegistry,
    reconciler: Reconciler,
    listings: Cache<(Provider, String), Arc<Vec<AtsRecord>>>,
}

impl Resolver {
    pub fn new(registry: AdapterRegistry, reconciler: Reconciler) -> Self {
        Self {
            registry,
            reconciler,
            listings: Cache::builder().max_capacity(1_000).build(),
        }
    }

    pub fn supports(&self, provider: Provider) -> bool {
        self.registry.supports(provider)
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Fetch and compare. With a job identifier this is one detail fetch;
    /// without, the company listing is scored and the best posting's detail
    /// is fetched only if the listing-level comparison already matches.
    pub async fn resolve(
        &self,
        candidate: &JobCandidate,
        target: &ProviderMatch,
    ) -> Result<Resolution, AppError> {
        let adapter = self
            .registry
            .get(target.provider)
            .ok_or(AppError::UnsupportedProvider(target.provider))?;
        let company = target.company_identifier.as_str();

        if let Some(job_id) = target.job_identifier.as_deref() {
            let record = adapter.fetch_detail(company, job_id).await?;
            let result = self.reconciler.compare(candidate, &record);
            return Ok(Resolution {
                record: Some(record),
                result,
            });
        }

        let listing = self.listing(adapter.as_ref(), target).await?;
        let Some((best, listed)) = self.reconciler.best_match(candidate, &listing) else {
            tracing::debug!(
                provider = %target.provider,
                company = %company,
                "Provider listed no postings"
            );
            return Ok(Resolution {
                record: None,
                result: MatchResult::not_attempted(&candidate.platform_job_id),
            });
        };

        if !listed.is_match() {
            return Ok(Resolution {
                record: Some(best.clone()),
                result: listed,
            });
        }

        let record = adapter.fetch_detail(company, &best.provider_job_id).await?;
        let result = self.reconciler.compare(candidate, &record);
        Ok(Resolution {
            record: Some(record),
            result,
        })
    }

    async fn listing(
        &self,
        adapter: &dyn AtsAdapter,
        target: &ProviderMatch,
    ) -> Result<Arc<Vec<AtsRecord>>, AppError> {
        let key = (target.provider, target.company_identifier.clone());
        self.listings
            .try_get_with(key, async {
                adapter
                    .list_postings(&target.company_identifier)
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(Arc::unwrap_or_clone)
    }
}
