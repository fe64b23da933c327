//! Concurrent fan-out of one question to many providers

use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::dispatch::stream::EventSender;
use crate::dispatch::{AggregateState, DispatchObserver, ResultStream, StreamEvent, TracingObserver};
use crate::error::{FanoutError, Result};
use crate::llm::{ProviderAdapter, ProviderError, ProviderId, ProviderRegistry, ProviderResult};
use crate::question::Question;

/// Starts every provider call for a question at once and streams the outcomes
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    observer: Arc<dyn DispatchObserver>,
}

impl Dispatcher {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Ask every registered provider
    pub fn dispatch(&self, question: Question) -> Result<ResultStream> {
        self.dispatch_all(question, &self.registry.ids())
    }

    /// Ask the given providers concurrently.
    ///
    /// Selection errors (empty, duplicate or unregistered providers) are
    /// returned before anything is started. Must be called from within a
    /// tokio runtime; the calls run on a background task that stops early
    /// only if the returned stream is dropped.
    pub fn dispatch_all(&self, question: Question, providers: &[ProviderId]) -> Result<ResultStream> {
        let adapters = self.resolve(providers)?;
        let expected: Vec<ProviderId> = adapters.iter().map(ProviderAdapter::id).collect();
        let (tx, stream) = ResultStream::channel(expected);

        tokio::spawn(coordinate(question, adapters, tx, Arc::clone(&self.observer)));

        Ok(stream)
    }

    fn resolve(&self, providers: &[ProviderId]) -> Result<Vec<ProviderAdapter>> {
        if providers.is_empty() {
            return Err(FanoutError::NoProviders);
        }

        let mut seen = HashSet::new();
        providers
            .iter()
            .map(|&id| {
                if !seen.insert(id) {
                    return Err(FanoutError::DuplicateProvider(id));
                }
                self.registry
                    .get(id)
                    .cloned()
                    .ok_or(FanoutError::ProviderNotEnabled(id))
            })
            .collect()
    }
}

async fn coordinate(
    question: Question,
    adapters: Vec<ProviderAdapter>,
    tx: EventSender,
    observer: Arc<dyn DispatchObserver>,
) {
    let expected: Vec<ProviderId> = adapters.iter().map(ProviderAdapter::id).collect();

    let mut tasks = JoinSet::new();
    for adapter in adapters {
        tasks.spawn(invoke_guarded(adapter, question.clone()));
    }
    observer.on_dispatch_start(&question, &expected);

    drain(AggregateState::new(question), tasks, &expected, tx, observer.as_ref()).await;
}

/// A panicking provider still produces exactly one result
async fn invoke_guarded(adapter: ProviderAdapter, question: Question) -> ProviderResult {
    let id = adapter.id();
    AssertUnwindSafe(adapter.invoke(&question))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| ProviderResult::from_error(id, &ProviderError::Panicked))
}

/// Single writer of the aggregate: merges each completion, then emits it.
///
/// Stops and aborts the remaining tasks as soon as the consumer goes away,
/// even while no provider is completing.
async fn drain(
    mut state: AggregateState,
    mut tasks: JoinSet<ProviderResult>,
    expected: &[ProviderId],
    tx: EventSender,
    observer: &dyn DispatchObserver,
) {
    let total = expected.len();

    loop {
        let joined = tokio::select! {
            joined = tasks.join_next() => joined,
            () = tx.closed() => {
                observer.on_consumer_gone(tasks.len());
                tasks.abort_all();
                return;
            }
        };
        let Some(joined) = joined else { break };

        let result = match joined {
            Ok(result) => result,
            Err(e) => {
                // Lost task; the completeness check reports it
                warn!("provider task did not finish: {}", e);
                continue;
            }
        };

        state = match state.merge(&result) {
            Ok(next) => next,
            Err(err) => {
                fail(&tx, observer, err).await;
                return;
            }
        };
        observer.on_provider_complete(&result, state.completion_order().len(), total);

        if tx.send(Ok(StreamEvent::Partial(result))).await.is_err() {
            observer.on_consumer_gone(tasks.len());
            tasks.abort_all();
            return;
        }
    }

    let missing = state.missing(expected);
    if !missing.is_empty() {
        fail(&tx, observer, FanoutError::IncompleteDispatch(missing)).await;
        return;
    }

    observer.on_dispatch_complete(&state);
    if tx.send(Ok(StreamEvent::Summary { result: state })).await.is_err() {
        debug!("consumer dropped the stream before the summary");
    }
}

async fn fail(tx: &EventSender, observer: &dyn DispatchObserver, err: FanoutError) {
    observer.on_invariant_violation(&err);
    if tx.send(Err(err)).await.is_err() {
        debug!("consumer dropped the stream before the error was delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NoopObserver;
    use crate::llm::{ApiStatus, Completion, LlmProvider};
    use futures::StreamExt;

    struct Echo(ProviderId);

    #[async_trait::async_trait]
    impl LlmProvider for Echo {
        async fn generate(&self, prompt: &str) -> std::result::Result<Completion, ProviderError> {
            Ok(Completion::new(format!("{}: {}", self.0.key(), prompt)))
        }

        fn id(&self) -> ProviderId {
            self.0
        }
    }

    struct Panics;

    #[async_trait::async_trait]
    impl LlmProvider for Panics {
        async fn generate(&self, _prompt: &str) -> std::result::Result<Completion, ProviderError> {
            panic!("provider blew up");
        }

        fn id(&self) -> ProviderId {
            ProviderId::Perplexity
        }
    }

    fn dispatcher() -> Dispatcher {
        let registry = ProviderRegistry::new()
            .with_provider(Arc::new(Echo(ProviderId::OpenAi)))
            .with_provider(Arc::new(Echo(ProviderId::Gemini)))
            .with_provider(Arc::new(Panics));
        Dispatcher::new(registry)
    }

    #[test]
    fn test_selection_errors() {
        let dispatcher = dispatcher();
        let q = || Question::new("hi").unwrap();

        assert!(matches!(
            dispatcher.dispatch_all(q(), &[]),
            Err(FanoutError::NoProviders)
        ));
        assert!(matches!(
            dispatcher.dispatch_all(q(), &[ProviderId::OpenAi, ProviderId::OpenAi]),
            Err(FanoutError::DuplicateProvider(ProviderId::OpenAi))
        ));
        assert!(matches!(
            dispatcher.dispatch_all(q(), &[ProviderId::Anthropic]),
            Err(FanoutError::ProviderNotEnabled(ProviderId::Anthropic))
        ));
    }

    #[tokio::test]
    async fn test_question_reaches_every_provider() {
        let stream = dispatcher()
            .dispatch_all(Question::new("ping").unwrap(), &[ProviderId::OpenAi, ProviderId::Gemini])
            .unwrap();
        let summary = stream.into_summary().await.unwrap();

        assert_eq!(summary.answers()[&ProviderId::OpenAi], "openai: ping");
        assert_eq!(summary.answers()[&ProviderId::Gemini], "gemini: ping");
    }

    #[tokio::test]
    async fn test_panicking_provider_becomes_failure() {
        let summary = dispatcher()
            .dispatch(Question::new("ping").unwrap())
            .unwrap()
            .into_summary()
            .await
            .unwrap();

        let status = &summary.api_status()[&ProviderId::Perplexity];
        assert_eq!(status.status, 500);
        assert_eq!(status.detail, "panic");
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.failed(), 1);
    }

    #[tokio::test]
    async fn test_lost_provider_task_ends_stream_with_error() {
        let expected = [ProviderId::OpenAi, ProviderId::Gemini];
        let (tx, mut stream) = ResultStream::channel(expected.to_vec());

        let mut tasks = JoinSet::new();
        tasks.spawn(async {
            ProviderResult::success(ProviderId::OpenAi, "X", ApiStatus::new(200, "stop"))
        });
        tasks.spawn(std::future::pending::<ProviderResult>()).abort();

        let state = AggregateState::new(Question::new("ping").unwrap());
        drain(state, tasks, &expected, tx, &NoopObserver).await;

        assert!(matches!(stream.next_event().await, Some(Ok(StreamEvent::Partial(_)))));
        match stream.next_event().await {
            Some(Err(FanoutError::IncompleteDispatch(missing))) => {
                assert_eq!(missing, vec![ProviderId::Gemini]);
            }
            other => panic!("expected incomplete dispatch, got {other:?}"),
        }
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_completion_ends_stream_with_error() {
        let expected = [ProviderId::Upstage];
        let (tx, stream) = ResultStream::channel(expected.to_vec());

        let mut tasks = JoinSet::new();
        for _ in 0..2 {
            tasks.spawn(async {
                ProviderResult::success(ProviderId::Upstage, "hi", ApiStatus::new(200, "stop"))
            });
        }

        let state = AggregateState::new(Question::new("ping").unwrap());
        drain(state, tasks, &expected, tx, &NoopObserver).await;

        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(StreamEvent::Partial(_))));
        assert!(matches!(events[1], Err(FanoutError::DuplicateMerge(ProviderId::Upstage))));
    }
}
