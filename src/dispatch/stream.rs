//! Ordered event stream from one dispatch to its consumer

use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::dispatch::AggregateState;
use crate::error::{FanoutError, Result};
use crate::llm::{ProviderId, ProviderResult};

/// One record of a dispatch
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A provider finished, successfully or not
    Partial(ProviderResult),
    /// Terminal snapshot of every provider's outcome
    Summary { result: AggregateState },
}

impl StreamEvent {
    /// Encode as a single NDJSON line, newline included
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn is_summary(&self) -> bool {
        matches!(self, StreamEvent::Summary { .. })
    }
}

/// NDJSON line reporting a dispatch-protocol failure
pub fn error_line(err: &FanoutError) -> String {
    let mut line = serde_json::json!({ "type": "error", "message": err.to_string() }).to_string();
    line.push('\n');
    line
}

pub(crate) type EventSender = mpsc::Sender<Result<StreamEvent>>;

/// Consumer side of a dispatch.
///
/// Yields one `Partial` per provider in completion order, then the `Summary`.
/// After the summary, or after an error item, every read returns `None`.
/// If the producer disappears early the missing providers are reported as
/// [`FanoutError::IncompleteDispatch`].
pub struct ResultStream {
    receiver: mpsc::Receiver<Result<StreamEvent>>,
    expected: Vec<ProviderId>,
    seen: Vec<ProviderId>,
    finished: bool,
}

impl ResultStream {
    /// Channel sized so every partial plus the summary fits without blocking the producer
    pub(crate) fn channel(expected: Vec<ProviderId>) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(expected.len() + 1);
        let stream = Self {
            receiver: rx,
            expected,
            seen: Vec::new(),
            finished: false,
        };
        (tx, stream)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Wait for the next event
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        if self.finished {
            return None;
        }
        let item = self.receiver.recv().await;
        self.observe(item)
    }

    /// Drain the stream and return only the summary
    pub async fn into_summary(mut self) -> Result<AggregateState> {
        while let Some(item) = self.next_event().await {
            if let StreamEvent::Summary { result } = item? {
                return Ok(result);
            }
        }
        Err(FanoutError::IncompleteDispatch(self.missing()))
    }

    fn missing(&self) -> Vec<ProviderId> {
        self.expected
            .iter()
            .copied()
            .filter(|id| !self.seen.contains(id))
            .collect()
    }

    fn observe(&mut self, item: Option<Result<StreamEvent>>) -> Option<Result<StreamEvent>> {
        match item {
            Some(Ok(StreamEvent::Partial(result))) => {
                self.seen.push(result.provider);
                Some(Ok(StreamEvent::Partial(result)))
            }
            Some(terminal) => {
                self.finish();
                Some(terminal)
            }
            None => {
                self.finish();
                Some(Err(FanoutError::IncompleteDispatch(self.missing())))
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.receiver.close();
    }
}

impl Stream for ResultStream {
    type Item = Result<StreamEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        this.receiver.poll_recv(cx).map(|item| this.observe(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ApiStatus;
    use crate::question::Question;
    use futures::StreamExt;

    fn partial(id: ProviderId) -> StreamEvent {
        StreamEvent::Partial(ProviderResult::success(id, "X", ApiStatus::new(200, "stop")))
    }

    fn summary() -> StreamEvent {
        StreamEvent::Summary {
            result: AggregateState::new(Question::new("q").unwrap()),
        }
    }

    #[tokio::test]
    async fn test_stream_ends_after_summary() {
        let (tx, mut stream) = ResultStream::channel(vec![ProviderId::OpenAi]);
        tx.send(Ok(partial(ProviderId::OpenAi))).await.unwrap();
        tx.send(Ok(summary())).await.unwrap();

        assert!(matches!(stream.next_event().await, Some(Ok(StreamEvent::Partial(_)))));
        assert!(matches!(stream.next_event().await, Some(Ok(StreamEvent::Summary { .. }))));
        assert!(stream.is_finished());
        assert!(stream.next_event().await.is_none());
        assert!(stream.next().await.is_none());
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_premature_close_reports_missing() {
        let (tx, mut stream) = ResultStream::channel(vec![ProviderId::OpenAi, ProviderId::Gemini]);
        tx.send(Ok(partial(ProviderId::Gemini))).await.unwrap();
        drop(tx);

        assert!(stream.next().await.unwrap().is_ok());
        match stream.next().await {
            Some(Err(FanoutError::IncompleteDispatch(missing))) => {
                assert_eq!(missing, vec![ProviderId::OpenAi]);
            }
            other => panic!("expected incomplete dispatch, got {other:?}"),
        }
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_error_item_is_terminal() {
        let (tx, mut stream) = ResultStream::channel(vec![ProviderId::OpenAi]);
        tx.send(Err(FanoutError::DuplicateMerge(ProviderId::OpenAi))).await.unwrap();

        assert!(matches!(stream.next_event().await, Some(Err(FanoutError::DuplicateMerge(_)))));
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_into_summary_skips_partials() {
        let (tx, stream) = ResultStream::channel(vec![ProviderId::Upstage]);
        tx.send(Ok(partial(ProviderId::Upstage))).await.unwrap();
        tx.send(Ok(summary())).await.unwrap();

        let state = stream.into_summary().await.unwrap();
        assert_eq!(state.question().content(), "q");
    }

    #[test]
    fn test_json_lines() {
        let line = partial(ProviderId::OpenAi).to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "partial");
        assert_eq!(value["model"], "OpenAI");

        let value: serde_json::Value =
            serde_json::from_str(summary().to_json_line().unwrap().trim_end()).unwrap();
        assert_eq!(value["type"], "summary");
        assert_eq!(value["result"]["question"], "q");

        let value: serde_json::Value =
            serde_json::from_str(error_line(&FanoutError::NoProviders).trim_end()).unwrap();
        assert_eq!(value["type"], "error");
    }
}
