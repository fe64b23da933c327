//! Configuration management for multiask

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::llm::ProviderId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider configurations, keyed by provider key (`openai`, `gemini`, ...)
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Dispatch settings
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API endpoint URL
    pub endpoint: String,

    /// API key (can be env var reference like $OPENAI_API_KEY)
    pub api_key: String,

    /// Model to use
    pub model: String,

    /// Whether this provider is enabled
    pub enabled: bool,

    /// Max tokens for responses
    pub max_tokens: Option<u32>,

    /// Temperature setting
    pub temperature: Option<f32>,

    /// Nucleus sampling setting
    pub top_p: Option<f32>,

    /// Per-provider wait bound, overrides `dispatch.timeout_secs`
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default wait bound per provider in seconds, 0 disables it
    pub timeout_secs: u64,

    /// Providers asked when none are named on the command line (empty = all enabled)
    pub providers: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            providers: Vec::new(),
        }
    }
}

fn provider(
    endpoint: &str,
    api_key: &str,
    model: &str,
    temperature: Option<f32>,
    top_p: Option<f32>,
) -> ProviderConfig {
    ProviderConfig {
        endpoint: endpoint.to_string(),
        api_key: api_key.to_string(),
        model: model.to_string(),
        enabled: true,
        max_tokens: None,
        temperature,
        top_p,
        timeout_secs: None,
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();

        providers.insert(
            ProviderId::OpenAi.key().to_string(),
            provider("https://api.openai.com/v1", "$OPENAI_API_KEY", "gpt-5-nano", None, None),
        );
        providers.insert(
            ProviderId::Gemini.key().to_string(),
            provider(
                "https://generativelanguage.googleapis.com/v1beta",
                "$GOOGLE_API_KEY",
                "gemini-2.5-flash-lite",
                Some(0.0),
                None,
            ),
        );
        providers.insert(
            ProviderId::Anthropic.key().to_string(),
            provider(
                "https://api.anthropic.com/v1",
                "$ANTHROPIC_API_KEY",
                "claude-haiku-4-5-20251001",
                Some(0.0),
                None,
            ),
        );
        providers.insert(
            ProviderId::Upstage.key().to_string(),
            provider("https://api.upstage.ai/v1", "$UPSTAGE_API_KEY", "solar-mini", None, None),
        );
        providers.insert(
            ProviderId::Perplexity.key().to_string(),
            provider(
                "https://api.perplexity.ai",
                "$PPLX_API_KEY",
                "sonar",
                Some(0.2),
                Some(0.9),
            ),
        );

        Self {
            providers,
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Config {
    /// Load config from file or create default
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => Self::default_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("multiask")
            .join("config.toml")
    }

    pub fn provider(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.key())
    }

    /// Resolve API key from config (handles env var references)
    pub fn resolve_api_key(&self, id: ProviderId) -> Option<String> {
        self.provider(id).and_then(|p| {
            if let Some(var) = p.api_key.strip_prefix('$') {
                std::env::var(var).ok().filter(|v| !v.is_empty())
            } else if p.api_key.is_empty() {
                None
            } else {
                Some(p.api_key.clone())
            }
        })
    }

    /// Effective wait bound for one provider, `None` when unbounded
    pub fn timeout_for(&self, id: ProviderId) -> Option<Duration> {
        let secs = self
            .provider(id)
            .and_then(|p| p.timeout_secs)
            .unwrap_or(self.dispatch.timeout_secs);

        (secs > 0).then(|| Duration::from_secs(secs))
    }
}
