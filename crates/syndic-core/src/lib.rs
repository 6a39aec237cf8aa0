pub mod block;
pub mod capture;
pub mod config;
pub mod error;
pub mod models;
pub mod origin;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod resolve;
pub mod retry;
pub mod run;
pub mod signatures;
pub mod throttle;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{AppError, ErrorKind};
pub use models::{
    AtsRecord, BlockReason, BlockState, JobCandidate, MatchDecision, MatchResult, Origin,
    Provider, ProviderMatch, RawExchange, compute_hash,
};
pub use pipeline::{Pipeline, PipelineEvent, PipelineReporter, TracingPipelineReporter};
pub use run::{PipelineRun, RunOutcome};
pub use traits::{AtsAdapter, Cleaner, Fetcher};
