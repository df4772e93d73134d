pub mod cancel;
pub mod orchestrator;
pub mod progress;
pub mod selection;
pub mod state;

pub use cancel::CancelToken;
pub use orchestrator::{CleaningResult, FailedItem, Job, Orchestrator, OrchestratorBuilder, RestoreReport};
pub use progress::{BarProgress, ChannelProgress, LatestProgress, NoProgress, Progress, ProgressSink};
pub use selection::Selection;
pub use state::{EngineState, RunOutcome};
