// src/pipeline/mod.rs

pub mod driver;
pub mod event_bus;
pub mod metrics;
pub mod phase_engine;
pub mod run_context;

pub use driver::Driver;
pub use event_bus::{EventBus, EventCounts, PhaseEvent};
pub use metrics::{MetricsAggregator, MetricsSnapshot};
pub use phase_engine::{process_frame, FrameObservation, FrameOutcome};
pub use run_context::{FrameDiagnostic, RunContext, RunSummary, TrialRecord};
