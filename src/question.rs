//! Question value object

use serde::Serialize;
use std::fmt;

use crate::error::{FanoutError, Result};

/// The prompt sent unchanged to every provider.
///
/// Surrounding whitespace is trimmed and an empty question is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Question {
    content: String,
}

impl Question {
    pub fn new(content: impl AsRef<str>) -> Result<Self> {
        let trimmed = content.as_ref().trim();
        if trimmed.is_empty() {
            return Err(FanoutError::InvalidQuestion(
                "question must not be empty".to_string(),
            ));
        }

        Ok(Self {
            content: trimmed.to_string(),
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

impl TryFrom<&str> for Question {
    type Error = FanoutError;

    fn try_from(s: &str) -> Result<Self> {
        Question::new(s)
    }
}

impl TryFrom<String> for Question {
    type Error = FanoutError;

    fn try_from(s: String) -> Result<Self> {
        Question::new(s)
    }
}
