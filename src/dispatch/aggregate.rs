//! Per-request accumulator of provider outcomes

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::{FanoutError, Result};
use crate::llm::{ApiStatus, Message, ProviderId, ProviderResult};
use crate::question::Question;

/// Everything known about one dispatch so far.
///
/// Each provider is merged at most once. `answers` and `api_status` are
/// ordered maps, so a finished state serializes identically no matter which
/// provider completed first; only `completion_order` reflects timing.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateState {
    question: Question,
    answers: BTreeMap<ProviderId, String>,
    api_status: BTreeMap<ProviderId, ApiStatus>,
    messages: Vec<Message>,
    completion_order: Vec<ProviderId>,
    #[serde(skip)]
    seen_messages: HashSet<Message>,
}

impl AggregateState {
    pub fn new(question: Question) -> Self {
        let opening = Message::user(question.content());
        let mut seen_messages = HashSet::new();
        seen_messages.insert(opening.clone());

        Self {
            question,
            answers: BTreeMap::new(),
            api_status: BTreeMap::new(),
            messages: vec![opening],
            completion_order: Vec::new(),
            seen_messages,
        }
    }

    /// Record one provider's outcome.
    ///
    /// Fails with [`FanoutError::DuplicateMerge`] if the provider was already merged.
    pub fn merge(mut self, result: &ProviderResult) -> Result<Self> {
        let id = result.provider;
        if self.contains(id) {
            return Err(FanoutError::DuplicateMerge(id));
        }

        if let Some(answer) = &result.answer {
            self.answers.insert(id, answer.clone());
        }
        self.api_status.insert(id, result.status.clone());
        self.completion_order.push(id);

        for message in &result.messages {
            if self.seen_messages.insert(message.clone()) {
                self.messages.push(message.clone());
            }
        }

        Ok(self)
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.api_status.contains_key(&id)
    }

    /// Providers from `expected` that have not been merged yet
    pub fn missing(&self, expected: &[ProviderId]) -> Vec<ProviderId> {
        expected.iter().copied().filter(|id| !self.contains(*id)).collect()
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn answers(&self) -> &BTreeMap<ProviderId, String> {
        &self.answers
    }

    pub fn api_status(&self) -> &BTreeMap<ProviderId, ApiStatus> {
        &self.api_status
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn completion_order(&self) -> &[ProviderId] {
        &self.completion_order
    }

    pub fn succeeded(&self) -> usize {
        self.answers.len()
    }

    pub fn failed(&self) -> usize {
        self.api_status.len() - self.answers.len()
    }
}
