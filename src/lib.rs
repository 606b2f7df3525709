// ============================================================================
// cmdflow: partitioned command-processing engine
// ============================================================================

pub mod background;
pub mod cluster;
pub mod config;
pub mod core;
pub mod engine;
pub mod protocol;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use cluster::{ActorCluster, InMemoryCluster};
pub use config::EngineConfig;
pub use core::{EngineError, Result};
pub use engine::Engine;
pub use protocol::{Intent, Record, RecordType, RecordValue, Rejection, RejectionType, ValueType};
pub use state::ProcessingState;
pub use stream::{CommandResponse, StreamProcessor};
