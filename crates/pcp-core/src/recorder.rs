//! Sink for produced forward results

use crate::models::ForwardResult;

/// Receives every [`ForwardResult`] the forwarding engine produces.
///
/// Implementations must not fail outward: a recorder that cannot persist a
/// result reports it on its own and returns.
pub trait ResultRecorder: Send + Sync {
    fn record(&self, result: &ForwardResult);
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl ResultRecorder for NoopRecorder {
    fn record(&self, _result: &ForwardResult) {}
}
