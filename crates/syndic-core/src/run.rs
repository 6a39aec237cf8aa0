use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, ErrorKind};
use crate::models::{
    AtsRecord, BlockReason, BlockState, JobCandidate, MatchResult, Origin, Provider,
    ProviderMatch, compute_hash,
};

/// Orchestrator states. `Classifying`, `Fetching` and `Reconciling` are
/// per-candidate; the rest describe the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Init,
    Capturing,
    Classifying,
    Fetching,
    Reconciling,
    Finalizing,
    Aborted,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Init => "INIT",
            PipelineStage::Capturing => "CAPTURING",
            PipelineStage::Classifying => "CLASSIFYING",
            PipelineStage::Fetching => "FETCHING",
            PipelineStage::Reconciling => "RECONCILING",
            PipelineStage::Finalizing => "FINALIZING",
            PipelineStage::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A per-candidate failure, kept for later triage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateError {
    pub kind: ErrorKind,
    pub provider: Option<Provider>,
    pub company_identifier: Option<String>,
    pub stage: PipelineStage,
    pub message: String,
}

impl CandidateError {
    pub fn new(error: &AppError, stage: PipelineStage, target: Option<&ProviderMatch>) -> Self {
        Self {
            kind: error.kind(),
            provider: target.map(|m| m.provider),
            company_identifier: target.map(|m| m.company_identifier.clone()),
            stage,
            message: error.to_string(),
        }
    }
}

/// Where a finalized record's fields came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    Authoritative { provider: Provider },
    Platform { platform: String },
}

/// The one record emitted per candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizedRecord {
    pub provenance: Provenance,
    pub platform_job_id: String,
    pub provider_job_id: Option<String>,
    /// Provider-side company (board, tenant) the posting belongs to.
    pub company_identifier: Option<String>,
    pub title: String,
    pub company_name: String,
    pub location_text: Option<String>,
    pub description_text: Option<String>,
    pub apply_url: Option<String>,
    pub source_url: String,
    /// SHA-256 of the description, for change detection downstream.
    pub content_hash: Option<String>,
    pub finalized_at: DateTime<Utc>,
}

impl FinalizedRecord {
    pub fn from_platform(candidate: &JobCandidate) -> Self {
        Self {
            provenance: Provenance::Platform {
                platform: candidate.source_platform.clone(),
            },
            platform_job_id: candidate.platform_job_id.clone(),
            provider_job_id: None,
            company_identifier: None,
            title: candidate.title.clone(),
            company_name: candidate.company_name.clone(),
            location_text: candidate.location_text.clone(),
            description_text: candidate.description_text.clone(),
            apply_url: candidate.apply_url.clone(),
            source_url: candidate.source_url.clone(),
            content_hash: candidate.description_text.as_deref().map(compute_hash),
            finalized_at: Utc::now(),
        }
    }

    /// Authoritative fields from the ATS, with platform values filling gaps.
    pub fn from_authoritative(candidate: &JobCandidate, record: &AtsRecord) -> Self {
        let description_text = record
            .description_text
            .clone()
            .or_else(|| candidate.description_text.clone());
        Self {
            provenance: Provenance::Authoritative {
                provider: record.provider,
            },
            platform_job_id: candidate.platform_job_id.clone(),
            provider_job_id: Some(record.provider_job_id.clone()),
            company_identifier: Some(record.company_identifier.clone()),
            title: record.title.clone(),
            company_name: record.company_name.clone(),
            location_text: record
                .location_text
                .clone()
                .or_else(|| candidate.location_text.clone()),
            content_hash: description_text.as_deref().map(compute_hash),
            description_text,
            apply_url: Some(record.apply_url.clone()),
            source_url: candidate.source_url.clone(),
            finalized_at: Utc::now(),
        }
    }

    /// Identity used for cross-candidate deduplication.
    ///
    /// Slug and path style job IDs (Recruitee, Breezy, Workday) repeat
    /// across companies, so authoritative identities are scoped by company.
    pub fn identity(&self) -> String {
        match &self.provenance {
            Provenance::Authoritative { provider } => format!(
                "{provider}:{}:{}",
                self.company_identifier.as_deref().unwrap_or_default(),
                self.provider_job_id
                    .as_deref()
                    .unwrap_or(&self.platform_job_id)
            ),
            Provenance::Platform { platform } => format!("{platform}:{}", self.platform_job_id),
        }
    }
}

/// Everything the run learned about one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub candidate: JobCandidate,
    pub origin: Origin,
    pub ats_record: Option<AtsRecord>,
    pub match_result: Option<MatchResult>,
    /// `None` when the run aborted before this candidate was finalized.
    pub record: Option<FinalizedRecord>,
    pub error: Option<CandidateError>,
}

/// Caller-facing summary of how a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { candidates: usize, errors: usize },
    Aborted { reason: BlockReason, finalized: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub candidates: usize,
    pub ats_sourced: usize,
    pub platform_native: usize,
    pub unknown: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub errors: usize,
    pub finalized: usize,
}

/// The aggregate of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exchanges_seen: u64,
    /// Captured responses that matched an endpoint shape but failed to parse.
    pub soft_errors: u64,
    /// ATS resolutions actually dispatched.
    pub fetches_dispatched: u64,
    pub candidates: Vec<CandidateReport>,
    pub block: Option<BlockState>,
}

impl PipelineRun {
    pub fn is_aborted(&self) -> bool {
        self.block.is_some()
    }

    pub fn finalized(&self) -> impl Iterator<Item = &FinalizedRecord> {
        self.candidates.iter().filter_map(|c| c.record.as_ref())
    }

    pub fn error_count(&self) -> usize {
        self.candidates.iter().filter(|c| c.error.is_some()).count()
    }

    pub fn outcome(&self) -> RunOutcome {
        match &self.block {
            Some(block) => RunOutcome::Aborted {
                reason: block.reason,
                finalized: self.finalized().count(),
            },
            None => RunOutcome::Completed {
                candidates: self.candidates.len(),
                errors: self.error_count(),
            },
        }
    }

    /// Finalized records with repeats of the same posting removed, first
    /// occurrence kept.
    pub fn distinct_records(&self) -> Vec<&FinalizedRecord> {
        let mut seen = HashSet::new();
        self.finalized()
            .filter(|r| seen.insert(r.identity()))
            .collect()
    }

    pub fn stats(&self) -> RunStats {
        let mut stats = RunStats {
            candidates: self.candidates.len(),
            ..RunStats::default()
        };
        for report in &self.candidates {
            match report.origin {
                Origin::AtsSourced(_) => stats.ats_sourced += 1,
                Origin::PlatformNative => stats.platform_native += 1,
                Origin::Unknown => stats.unknown += 1,
            }
            if let Some(result) = &report.match_result {
                if result.is_match() {
                    stats.matched += 1;
                } else {
                    stats.unmatched += 1;
                }
            }
            if report.error.is_some() {
                stats.errors += 1;
            }
            if report.record.is_some() {
                stats.finalized += 1;
            }
        }
        stats
    }
}
