//! Error taxonomy for stage delivery and pipeline construction.
//!
//! Two categories, surfaced at different times: [`ProtocolError`] when a
//! value is handed to a stage that cannot accept it, [`BuildError`] when a
//! composite is assembled from a misconfigured definition list. Stages
//! never catch errors raised by their downstream or registrant stages; a
//! failure mid-delivery propagates unchanged to the original caller.

use thiserror::Error;

/// Violations of the delivery protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The stage was constructed without going through a stage definition
    /// and never advanced to its first ready-to-receive point.
    #[error("stage '{0}' is not primed; build it from a stage definition or call prime() first")]
    NotPrimed(String),

    /// The stage was closed and permanently stopped accepting deliveries.
    #[error("stage '{0}' is closed")]
    Closed(String),
}

/// Misconfigured compositions, surfaced at build time so bad wiring fails
/// fast instead of at first delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A pipeline was built from an empty definition list.
    #[error("a pipeline needs at least one stage")]
    EmptyPipeline,
}
