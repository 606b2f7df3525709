// ============================================================================
// Stream processing: log, writers, scheduling and partition actors
// ============================================================================

pub mod actor;
pub mod log;
pub mod processor;
pub mod response;
pub mod schedule;
pub mod transport;
pub mod writers;

pub use actor::{PartitionActor, PartitionHandle};
pub use log::{InMemoryLogStorage, LogStorage};
pub use processor::{
    PartitionPhase, RecordProcessor, RecoveredContext, StreamProcessor, StreamProcessorContext,
    run_async_task,
};
pub use response::{CommandResponse, CommandResponseWriter, RecordingResponseWriter};
pub use schedule::{
    AsyncScheduledTask, PartitionMessage, ProcessingScheduleService, ScheduleRequest,
    ScheduledTask, Task, TaskActor, TaskContext, TaskId, TaskTimers,
};
pub use transport::{InMemoryCommandSender, InterPartitionCommandSender};
pub use writers::{
    CommandWriter, ProcessingResult, ProcessingResultBuilder, RejectionWriter, ResponseWriter,
    SideEffect, SideEffectWriter, StateWriter,
};
