//! Monitoring engine: arbitration, state machine, scheduler and the
//! `Engine` control surface.

pub mod arbiter;
mod context;
mod monitor;
pub mod ocr;
mod scheduler;
pub mod stability;
pub mod state;

pub use arbiter::{Arbiter, Environment, OcrDispatch, Verdict};
pub use context::{EngineStatus, RecognitionArea, Shared};
pub use monitor::{Engine, EngineParts, LifecycleParts};
pub use ocr::{OcrEvaluator, OcrRequest, OcrVerdict};
pub use scheduler::{Scheduler, SchedulerParts, TickOutcome};
pub use stability::StabilityGate;
pub use state::{MonitoringState, PriorityMode, StateKind, StepResult, TickContext};
