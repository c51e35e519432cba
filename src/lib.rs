// Export modules for library usage
pub mod broadcast;
pub mod chain;
pub mod errors;
pub mod stage;
pub mod value;

// Re-export commonly used types
pub use crate::broadcast::{broadcast, BroadcastBuilder, CopyFn};
pub use crate::chain::{pipeline, PipelineBuilder};
pub use crate::errors::{BuildError, ProtocolError};
pub use crate::stage::{make_stage, stage, Delivery, Process, Stage, StageDef};
pub use crate::value::Shared;
