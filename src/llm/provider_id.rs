//! Provider identities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FanoutError;

/// The fixed set of upstream LLM services a question can be sent to.
///
/// Serialized as the display label (`"OpenAI"`, `"Gemini"`, ...), which is also
/// the key used in the `answers` and `api_status` maps of a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderId {
    #[serde(rename = "OpenAI")]
    OpenAi,
    Gemini,
    Anthropic,
    Upstage,
    Perplexity,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::OpenAi,
        ProviderId::Gemini,
        ProviderId::Anthropic,
        ProviderId::Upstage,
        ProviderId::Perplexity,
    ];

    /// Key used in config files and on the command line
    pub fn key(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Gemini => "gemini",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Upstage => "upstage",
            ProviderId::Perplexity => "perplexity",
        }
    }

    /// Label shown to clients
    pub fn label(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OpenAI",
            ProviderId::Gemini => "Gemini",
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Upstage => "Upstage",
            ProviderId::Perplexity => "Perplexity",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ProviderId {
    type Err = FanoutError;

    /// Accepts either the config key or the label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.key().eq_ignore_ascii_case(wanted) || id.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FanoutError::UnknownProvider(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_and_label() {
        assert_eq!("openai".parse::<ProviderId>().unwrap(), ProviderId::OpenAi);
        assert_eq!("OpenAI".parse::<ProviderId>().unwrap(), ProviderId::OpenAi);
        assert_eq!(" Gemini ".parse::<ProviderId>().unwrap(), ProviderId::Gemini);
        assert_eq!("PERPLEXITY".parse::<ProviderId>().unwrap(), ProviderId::Perplexity);
    }

    #[test]
    fn test_parse_unknown() {
        let err = "mistral".parse::<ProviderId>().unwrap_err();
        assert!(matches!(err, FanoutError::UnknownProvider(name) if name == "mistral"));
    }

    #[test]
    fn test_serializes_as_label() {
        assert_eq!(serde_json::to_string(&ProviderId::OpenAi).unwrap(), "\"OpenAI\"");
        assert_eq!(serde_json::to_string(&ProviderId::Upstage).unwrap(), "\"Upstage\"");
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<_> = ProviderId::ALL.iter().map(|id| id.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ProviderId::ALL.len());
    }
}
