//! Loading orchestration
//!
//! - `orchestrator` - named operations with timeout, cancellation and
//!   retry-on-timeout, plus live state and the event channel
//! - `batch` - sequential batches with a shared progress indicator
//! - `cancellation` - the cooperative [`CancellationToken`]
//! - `history` - bounded outcome history and statistics

pub mod batch;
pub mod cancellation;
pub mod history;
pub mod orchestrator;

pub use batch::{BatchError, BatchOperation, BatchOptions, BatchOutcome, BatchResult};
pub use cancellation::CancellationToken;
pub use history::{OperationHistoryEntry, OperationStats, OperationStatus};
pub use orchestrator::{
    LoadingEvent, LoadingOperation, LoadingOptions, LoadingOrchestrator, OperationContext,
    OrchestratorConfig, Progress, ProgressReporter,
};
