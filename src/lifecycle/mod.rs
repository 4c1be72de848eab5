//! Application lifecycle on the media engine.
//!
//! - [`engine`]: typed engine operations and their command templates
//! - [`controller`]: start/stop/restart/block/unblock/status
//! - [`reload`]: digest-authenticated schedule hot-reload
//! - [`probe`]: low-latency ingest HTTP probe

pub mod controller;
pub mod digest;
pub mod engine;
pub mod probe;
pub mod reload;

pub use controller::{ActionOutcome, AppAction, LifecycleController, StatusReport};
pub use engine::{EngineCommands, EngineOp};
pub use probe::{IngestProbe, IngestState};
pub use reload::{ReloadClient, ReloadOutcome};
