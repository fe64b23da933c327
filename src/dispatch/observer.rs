//! Dispatch lifecycle callbacks

use tracing::{error, info, warn};

use crate::dispatch::AggregateState;
use crate::error::FanoutError;
use crate::llm::{ProviderId, ProviderResult};
use crate::question::Question;

/// Receives every state transition of a dispatch.
///
/// Callbacks run on the coordinating task, in the same order the stream
/// consumer sees events, so they must not block.
pub trait DispatchObserver: Send + Sync {
    /// Called once all provider tasks have been started
    fn on_dispatch_start(&self, _question: &Question, _providers: &[ProviderId]) {}

    /// Called after a result is merged, `position` counts from 1
    fn on_provider_complete(&self, _result: &ProviderResult, _position: usize, _total: usize) {}

    /// Called just before the summary is emitted
    fn on_dispatch_complete(&self, _state: &AggregateState) {}

    /// Called when the consumer went away before the summary
    fn on_consumer_gone(&self, _pending: usize) {}

    /// Called when the dispatch protocol is broken
    fn on_invariant_violation(&self, _error: &FanoutError) {}
}

/// No-op observer for when nothing needs to watch
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

/// Logs every transition through `tracing`
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_dispatch_start(&self, question: &Question, providers: &[ProviderId]) {
        info!(
            providers = providers.len(),
            question_chars = question.content().chars().count(),
            "dispatch started"
        );
    }

    fn on_provider_complete(&self, result: &ProviderResult, position: usize, total: usize) {
        if result.is_success() {
            info!(
                provider = result.provider.key(),
                status = result.status.status,
                "{}/{} provider answered",
                position,
                total
            );
        } else {
            warn!(
                provider = result.provider.key(),
                status = result.status.status,
                detail = %result.status.detail,
                "{}/{} provider failed: {}",
                position,
                total,
                result.error.as_deref().unwrap_or_default()
            );
        }
    }

    fn on_dispatch_complete(&self, state: &AggregateState) {
        info!(
            succeeded = state.succeeded(),
            failed = state.failed(),
            "dispatch complete"
        );
    }

    fn on_consumer_gone(&self, pending: usize) {
        warn!(pending, "consumer dropped the stream, aborting in-flight providers");
    }

    fn on_invariant_violation(&self, err: &FanoutError) {
        error!("dispatch protocol violated: {}", err);
    }
}
