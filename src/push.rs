//! Push gateway: the low-latency hint fired after a commit.
//!
//! The durable notification row is the source of truth; the push only tells
//! connected clients to re-poll. It is injected into the engine at
//! construction, called at most once per recipient per transition, strictly
//! outside the commit path, and its failures are logged and swallowed.

use crate::error::Result;

/// Fire-and-forget push transport.
pub trait PushGateway {
    /// Deliver a hint on `channel`. May fail; the engine never retries and
    /// never rolls back on failure.
    fn trigger(&self, channel: &str, event: &str, payload: Option<&serde_json::Value>)
        -> Result<()>;
}

/// No-op gateway: default for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct NoOpPush;

impl PushGateway for NoOpPush {
    fn trigger(
        &self,
        _channel: &str,
        _event: &str,
        _payload: Option<&serde_json::Value>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Gateway that logs every trigger; stands in for a real transport in the
/// CLI.
#[derive(Debug, Clone, Default)]
pub struct LogPush;

impl PushGateway for LogPush {
    fn trigger(
        &self,
        channel: &str,
        event: &str,
        _payload: Option<&serde_json::Value>,
    ) -> Result<()> {
        crate::logger::Logger::info(&format!("push: {} -> {}", event, channel));
        Ok(())
    }
}
