//! Pipeline orchestrator.
//!
//! Capture is single-threaded: [`Pipeline::ingest`] handles one exchange at a
//! time, in arrival order. ATS resolution fans out to a bounded pool of
//! tasks, which report back over a channel; the pipeline itself is the only
//! writer of run state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::block::BlockDetector;
use crate::capture::{Capture, CaptureClassifier, DetailUpdate, PlatformProfile};
use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::models::{
    AtsRecord, BlockState, JobCandidate, MatchResult, Origin, Provider, ProviderMatch,
    RawExchange,
};
use crate::origin::{OriginClassifier, RedirectLog};
use crate::reconcile::Reconciler;
use crate::registry::AdapterRegistry;
use crate::resolve::{Resolution, Resolver};
use crate::run::{
    CandidateError, CandidateReport, FinalizedRecord, PipelineRun, PipelineStage, RunOutcome,
};
use crate::signatures::SignatureTable;
use crate::throttle::ProviderGate;

/// Events emitted by the pipeline for monitoring/logging.
#[derive(Debug, Clone)]
pub enum PipelineEvent<'a> {
    Started {
        run_id: Uuid,
    },
    SoftError {
        url: &'a str,
        error: &'a str,
    },
    CandidateCaptured {
        candidate: &'a JobCandidate,
    },
    DuplicateCandidate {
        platform_job_id: &'a str,
    },
    CollectionTargetReached {
        max_candidates: usize,
    },
    Classified {
        candidate_id: &'a str,
        origin: &'a Origin,
    },
    FetchDispatched {
        candidate_id: &'a str,
        provider: Provider,
        company: &'a str,
    },
    FetchSkipped {
        candidate_id: &'a str,
    },
    Reconciled {
        result: &'a MatchResult,
    },
    CandidateFailed {
        candidate_id: &'a str,
        error: &'a CandidateError,
    },
    Blocked {
        state: &'a BlockState,
    },
    Finished {
        run_id: Uuid,
        outcome: &'a RunOutcome,
    },
}

impl PipelineEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::Started { .. } => "started",
            PipelineEvent::SoftError { .. } => "soft_error",
            PipelineEvent::CandidateCaptured { .. } => "candidate_captured",
            PipelineEvent::DuplicateCandidate { .. } => "duplicate_candidate",
            PipelineEvent::CollectionTargetReached { .. } => "collection_target_reached",
            PipelineEvent::Classified { .. } => "classified",
            PipelineEvent::FetchDispatched { .. } => "fetch_dispatched",
            PipelineEvent::FetchSkipped { .. } => "fetch_skipped",
            PipelineEvent::Reconciled { .. } => "reconciled",
            PipelineEvent::CandidateFailed { .. } => "candidate_failed",
            PipelineEvent::Blocked { .. } => "blocked",
            PipelineEvent::Finished { .. } => "finished",
        }
    }
}

/// Trait for receiving pipeline events (decoupled logging).
pub trait PipelineReporter: Send + Sync {
    fn report(&self, event: PipelineEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPipelineReporter;

impl PipelineReporter for TracingPipelineReporter {
    fn report(&self, event: PipelineEvent<'_>) {
        match event {
            PipelineEvent::Started { run_id } => {
                tracing::info!(%run_id, "Pipeline started");
            }
            PipelineEvent::SoftError { url, error } => {
                tracing::warn!(%url, %error, "Captured response could not be parsed");
            }
            PipelineEvent::CandidateCaptured { candidate } => {
                tracing::debug!(
                    candidate_id = %candidate.platform_job_id,
                    title = %candidate.title,
                    company = %candidate.company_name,
                    "Candidate captured"
                );
            }
            PipelineEvent::DuplicateCandidate { platform_job_id } => {
                tracing::debug!(candidate_id = %platform_job_id, "Duplicate candidate ignored");
            }
            PipelineEvent::CollectionTargetReached { max_candidates } => {
                tracing::info!(%max_candidates, "Collection target reached");
            }
            PipelineEvent::Classified {
                candidate_id,
                origin,
            } => {
                tracing::info!(%candidate_id, origin = origin.label(), "Candidate classified");
            }
            PipelineEvent::FetchDispatched {
                candidate_id,
                provider,
                company,
            } => {
                tracing::info!(%candidate_id, %provider, %company, "ATS fetch dispatched");
            }
            PipelineEvent::FetchSkipped { candidate_id } => {
                tracing::info!(%candidate_id, "ATS fetch skipped after block");
            }
            PipelineEvent::Reconciled { result } => {
                tracing::info!(
                    candidate_id = %result.candidate_id,
                    ats_record_id = ?result.ats_record_id,
                    score = %format!("{:.3}", result.score),
                    decision = ?result.decision,
                    tie_break = %result.tie_break,
                    "Candidate reconciled"
                );
            }
            PipelineEvent::CandidateFailed {
                candidate_id,
                error,
            } => {
                tracing::warn!(
                    %candidate_id,
                    kind = ?error.kind,
                    provider = ?error.provider,
                    stage = %error.stage,
                    error = %error.message,
                    "Candidate failed"
                );
            }
            PipelineEvent::Blocked { state } => {
                tracing::error!(
                    reason = %state.reason,
                    url = %state.url,
                    exchange_index = %state.exchange_index,
                    "Session blocked, aborting"
                );
            }
            PipelineEvent::Finished { run_id, outcome } => {
                tracing::info!(%run_id, ?outcome, "Pipeline finished");
            }
        }
    }
}

/// Static collaborators of a pipeline, built once per process.
#[derive(Debug, Clone)]
pub struct PipelineParts {
    pub profile: PlatformProfile,
    pub signatures: SignatureTable,
    pub blocks: BlockDetector,
    pub registry: AdapterRegistry,
}

impl PipelineParts {
    /// LinkedIn capture profile with the built-in signature table.
    pub fn linkedin(registry: AdapterRegistry) -> Result<Self, AppError> {
        Ok(Self {
            profile: PlatformProfile::linkedin()?,
            signatures: SignatureTable::builtin()?,
            blocks: BlockDetector::linkedin()?,
            registry,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Origin not yet determinable; waiting for a detail record or for the
    /// destination of a platform redirect link.
    Pending,
    InFlight,
    /// Dispatch was abandoned because the session got blocked.
    Skipped,
    Done,
}

#[derive(Debug)]
struct Slot {
    candidate: JobCandidate,
    origin: Option<Origin>,
    state: SlotState,
    ats_record: Option<AtsRecord>,
    match_result: Option<MatchResult>,
    record: Option<FinalizedRecord>,
    error: Option<CandidateError>,
}

#[derive(Debug)]
enum FetchOutcome {
    Resolved(Resolution),
    Failed(AppError),
    Skipped,
}

/// Everything a fetch task needs, cloned per dispatch.
struct FetchContext<R> {
    resolver: Arc<Resolver>,
    gate: ProviderGate,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    dispatched: Arc<AtomicU64>,
    reporter: Arc<R>,
}

impl<R> Clone for FetchContext<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            gate: self.gate.clone(),
            permits: self.permits.clone(),
            cancel: self.cancel.clone(),
            dispatched: self.dispatched.clone(),
            reporter: self.reporter.clone(),
        }
    }
}

/// Drives one capture session from raw exchanges to a [`PipelineRun`].
pub struct Pipeline<R: PipelineReporter + 'static = TracingPipelineReporter> {
    config: PipelineConfig,
    capture: CaptureClassifier,
    blocks: BlockDetector,
    origins: OriginClassifier,
    redirects: RedirectLog,
    ctx: FetchContext<R>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stage: PipelineStage,
    exchanges_seen: u64,
    soft_errors: u64,
    slots: Vec<Slot>,
    by_platform_id: HashMap<String, usize>,
    target_reached: bool,
    block: Option<BlockState>,
    tasks: JoinSet<()>,
    results_tx: mpsc::UnboundedSender<(usize, FetchOutcome)>,
    results_rx: mpsc::UnboundedReceiver<(usize, FetchOutcome)>,
}

impl Pipeline<TracingPipelineReporter> {
    pub fn new(config: PipelineConfig, parts: PipelineParts) -> Result<Self, AppError> {
        Self::with_reporter(config, parts, TracingPipelineReporter)
    }
}

impl<R: PipelineReporter + 'static> Pipeline<R> {
    pub fn with_reporter(
        config: PipelineConfig,
        parts: PipelineParts,
        reporter: R,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let profile = Arc::new(parts.profile);
        let origins = OriginClassifier::new(Arc::new(parts.signatures), profile.clone());
        let resolver = Resolver::new(parts.registry, Reconciler::new(config.matching.clone()));
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let pipeline = Self {
            capture: CaptureClassifier::new(profile.as_ref().clone()),
            blocks: parts.blocks,
            origins,
            redirects: RedirectLog::new(),
            ctx: FetchContext {
                resolver: Arc::new(resolver),
                gate: config.gate(),
                permits: Arc::new(Semaphore::new(config.max_concurrent_fetches)),
                cancel: CancellationToken::new(),
                dispatched: Arc::new(AtomicU64::new(0)),
                reporter: Arc::new(reporter),
            },
            config,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stage: PipelineStage::Init,
            exchanges_seen: 0,
            soft_errors: 0,
            slots: Vec::new(),
            by_platform_id: HashMap::new(),
            target_reached: false,
            block: None,
            tasks: JoinSet::new(),
            results_tx,
            results_rx,
        };
        pipeline.ctx.reporter.report(PipelineEvent::Started {
            run_id: pipeline.run_id,
        });
        Ok(pipeline)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn is_blocked(&self) -> bool {
        self.block.is_some()
    }

    /// True once the configured candidate limit has been hit.
    pub fn target_reached(&self) -> bool {
        self.target_reached
    }

    /// Fetches dispatched so far.
    pub fn fetches_dispatched(&self) -> u64 {
        self.ctx.dispatched.load(Ordering::SeqCst)
    }

    /// Candidates with a finalized record so far.
    pub fn finalized_count(&self) -> usize {
        self.slots.iter().filter(|s| s.record.is_some()).count()
    }

    /// A token that is cancelled when the session gets blocked.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    /// Ingest one captured exchange.
    ///
    /// Must be called from within a Tokio runtime; ATS fetches for newly
    /// classified candidates are spawned onto it.
    pub fn ingest(&mut self, exchange: RawExchange) {
        self.absorb_ready();

        if self.block.is_some() {
            tracing::debug!(url = %exchange.url, "Ignoring exchange after block");
            return;
        }

        let index = self.exchanges_seen;
        self.exchanges_seen += 1;
        if self.stage == PipelineStage::Init {
            self.stage = PipelineStage::Capturing;
        }

        if let Some(state) = self.blocks.inspect(&exchange, index) {
            self.abort(state);
            return;
        }

        if self.redirects.record(&exchange) {
            self.classify_redirected();
        }

        match self.capture.try_classify(&exchange) {
            Ok(Capture::Listing(candidates)) => {
                for candidate in candidates {
                    self.admit(candidate);
                }
            }
            Ok(Capture::Detail(updates)) => {
                for update in updates {
                    self.apply_detail(update);
                }
            }
            Ok(Capture::Irrelevant) => {}
            Err(e) => {
                self.soft_errors += 1;
                let error = e.to_string();
                self.ctx.reporter.report(PipelineEvent::SoftError {
                    url: &exchange.url,
                    error: &error,
                });
            }
        }
    }

    /// Wait for every dispatched fetch to finish and fold in its result.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Fetch task failed");
            }
        }
        self.absorb_ready();

        for slot in self.slots.iter_mut().filter(|s| s.state == SlotState::InFlight) {
            let target = slot.origin.as_ref().and_then(Origin::provider_match);
            let error = CandidateError::new(
                &AppError::Generic("fetch task ended without a result".into()),
                PipelineStage::Fetching,
                target,
            );
            slot.record = Some(FinalizedRecord::from_platform(&slot.candidate));
            slot.error = Some(error);
            slot.state = SlotState::Done;
        }
    }

    /// Classify whatever is still pending, wait for in-flight fetches and
    /// hand back the finished run.
    pub async fn finish(mut self) -> PipelineRun {
        self.stage = if self.block.is_some() {
            PipelineStage::Aborted
        } else {
            PipelineStage::Finalizing
        };

        let pending: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Pending)
            .map(|(i, _)| i)
            .collect();
        for idx in pending {
            self.classify_slot(idx);
        }

        self.settle().await;

        let candidates = self
            .slots
            .into_iter()
            .map(|slot| CandidateReport {
                origin: slot.origin.unwrap_or(Origin::PlatformNative),
                candidate: slot.candidate,
                ats_record: slot.ats_record,
                match_result: slot.match_result,
                record: slot.record,
                error: slot.error,
            })
            .collect();

        let run = PipelineRun {
            run_id: self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            exchanges_seen: self.exchanges_seen,
            soft_errors: self.soft_errors,
            fetches_dispatched: self.ctx.dispatched.load(Ordering::SeqCst),
            candidates,
            block: self.block,
        };
        self.ctx.reporter.report(PipelineEvent::Finished {
            run_id: run.run_id,
            outcome: &run.outcome(),
        });
        run
    }

    /// Consume exchanges until the session ends, the collection target is
    /// reached or the session is blocked, then finish the run.
    pub async fn run(mut self, mut exchanges: mpsc::Receiver<RawExchange>) -> PipelineRun {
        while let Some(exchange) = exchanges.recv().await {
            self.ingest(exchange);
            if self.block.is_some() || self.target_reached {
                break;
            }
        }
        self.finish().await
    }

    // -----------------------------------------------------------------------
    // Capture
    // -----------------------------------------------------------------------

    fn admit(&mut self, candidate: JobCandidate) {
        if self.by_platform_id.contains_key(&candidate.platform_job_id) {
            self.ctx.reporter.report(PipelineEvent::DuplicateCandidate {
                platform_job_id: &candidate.platform_job_id,
            });
            return;
        }
        if let Some(max) = self.config.max_candidates
            && self.slots.len() >= max
        {
            if !self.target_reached {
                self.target_reached = true;
                self.ctx
                    .reporter
                    .report(PipelineEvent::CollectionTargetReached {
                        max_candidates: max,
                    });
            }
            return;
        }

        self.ctx
            .reporter
            .report(PipelineEvent::CandidateCaptured {
                candidate: &candidate,
            });
        let ready = self.is_ready(&candidate);
        let idx = self.slots.len();
        self.by_platform_id
            .insert(candidate.platform_job_id.clone(), idx);
        self.slots.push(Slot {
            candidate,
            origin: None,
            state: SlotState::Pending,
            ats_record: None,
            match_result: None,
            record: None,
            error: None,
        });

        if let Some(max) = self.config.max_candidates
            && self.slots.len() >= max
            && !self.target_reached
        {
            self.target_reached = true;
            self.ctx
                .reporter
                .report(PipelineEvent::CollectionTargetReached {
                    max_candidates: max,
                });
        }

        if ready {
            self.classify_slot(idx);
        }
    }

    fn apply_detail(&mut self, update: DetailUpdate) {
        let Some(&idx) = self.by_platform_id.get(&update.platform_job_id) else {
            tracing::debug!(
                candidate_id = %update.platform_job_id,
                "Detail record for unknown candidate"
            );
            return;
        };
        let slot = &mut self.slots[idx];
        if slot.state != SlotState::Pending {
            return;
        }
        update.apply_to(&mut slot.candidate);
        if self.is_ready(&self.slots[idx].candidate) {
            self.classify_slot(idx);
        }
    }

    fn is_ready(&self, candidate: &JobCandidate) -> bool {
        candidate.origin_is_determinable() && !self.origins.awaits_redirect(candidate, &self.redirects)
    }

    /// Classify pending candidates whose redirect destination just showed up.
    fn classify_redirected(&mut self) {
        let ready: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::Pending && self.is_ready(&s.candidate))
            .map(|(i, _)| i)
            .collect();
        for idx in ready {
            self.classify_slot(idx);
        }
    }

    // -----------------------------------------------------------------------
    // Classification and dispatch
    // -----------------------------------------------------------------------

    fn classify_slot(&mut self, idx: usize) {
        let origin = self
            .origins
            .classify_with(&self.slots[idx].candidate, &self.redirects);
        self.ctx.reporter.report(PipelineEvent::Classified {
            candidate_id: &self.slots[idx].candidate.platform_job_id,
            origin: &origin,
        });
        self.slots[idx].origin = Some(origin.clone());

        if self.block.is_some() {
            // Tagged, never finalized.
            self.slots[idx].state = SlotState::Skipped;
            return;
        }

        match origin {
            Origin::AtsSourced(target) if self.ctx.resolver.supports(target.provider) => {
                self.dispatch(idx, target);
            }
            Origin::AtsSourced(target) => {
                let error = CandidateError::new(
                    &AppError::UnsupportedProvider(target.provider),
                    PipelineStage::Fetching,
                    Some(&target),
                );
                self.fail(idx, error);
            }
            Origin::PlatformNative | Origin::Unknown => {
                let slot = &mut self.slots[idx];
                slot.record = Some(FinalizedRecord::from_platform(&slot.candidate));
                slot.state = SlotState::Done;
            }
        }
    }

    fn dispatch(&mut self, idx: usize, target: ProviderMatch) {
        self.slots[idx].state = SlotState::InFlight;
        let candidate = self.slots[idx].candidate.clone();
        let ctx = self.ctx.clone();
        let tx = self.results_tx.clone();

        self.tasks.spawn(async move {
            let outcome = fetch_candidate(&ctx, &candidate, &target).await;
            // The receiver lives as long as the pipeline.
            let _ = tx.send((idx, outcome));
        });
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    fn absorb_ready(&mut self) {
        while let Ok((idx, outcome)) = self.results_rx.try_recv() {
            self.absorb(idx, outcome);
        }
    }

    fn absorb(&mut self, idx: usize, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Resolved(resolution) => {
                let slot = &mut self.slots[idx];
                slot.record = Some(match &resolution.record {
                    Some(record) if resolution.result.is_match() => {
                        FinalizedRecord::from_authoritative(&slot.candidate, record)
                    }
                    _ => FinalizedRecord::from_platform(&slot.candidate),
                });
                slot.ats_record = resolution.record;
                slot.state = SlotState::Done;
                self.ctx.reporter.report(PipelineEvent::Reconciled {
                    result: &resolution.result,
                });
                slot.match_result = Some(resolution.result);
            }
            FetchOutcome::Failed(e) => {
                let target = self.slots[idx]
                    .origin
                    .as_ref()
                    .and_then(Origin::provider_match);
                let error = CandidateError::new(&e, PipelineStage::Fetching, target);
                self.fail(idx, error);
            }
            FetchOutcome::Skipped => {
                self.slots[idx].state = SlotState::Skipped;
                self.ctx.reporter.report(PipelineEvent::FetchSkipped {
                    candidate_id: &self.slots[idx].candidate.platform_job_id,
                });
            }
        }
    }

    /// Record a per-candidate error; the platform record still stands.
    fn fail(&mut self, idx: usize, error: CandidateError) {
        let slot = &mut self.slots[idx];
        self.ctx.reporter.report(PipelineEvent::CandidateFailed {
            candidate_id: &slot.candidate.platform_job_id,
            error: &error,
        });
        slot.record = Some(FinalizedRecord::from_platform(&slot.candidate));
        slot.error = Some(error);
        slot.state = SlotState::Done;
    }

    fn abort(&mut self, state: BlockState) {
        self.ctx.reporter.report(PipelineEvent::Blocked { state: &state });
        self.block = Some(state);
        self.stage = PipelineStage::Aborted;
        self.ctx.cancel.cancel();
    }
}

/// One candidate's FETCHING and RECONCILING steps, run on a worker task.
async fn fetch_candidate<R: PipelineReporter>(
    ctx: &FetchContext<R>,
    candidate: &JobCandidate,
    target: &ProviderMatch,
) -> FetchOutcome {
    let Ok(_permit) = ctx.permits.acquire().await else {
        return FetchOutcome::Skipped;
    };
    if ctx.cancel.is_cancelled() {
        return FetchOutcome::Skipped;
    }

    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return FetchOutcome::Skipped,
        _ = ctx.gate.wait(target.provider) => {}
    }
    if ctx.cancel.is_cancelled() {
        return FetchOutcome::Skipped;
    }

    ctx.dispatched.fetch_add(1, Ordering::SeqCst);
    ctx.reporter.report(PipelineEvent::FetchDispatched {
        candidate_id: &candidate.platform_job_id,
        provider: target.provider,
        company: &target.company_identifier,
    });

    match ctx.resolver.resolve(candidate, target).await {
        Ok(resolution) => FetchOutcome::Resolved(resolution),
        Err(e) => FetchOutcome::Failed(e),
    }
}
