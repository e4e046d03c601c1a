//! Provider selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::backend::AnalysisBackend;
use crate::config::LlmConfig;
use crate::dashscope::DashScopeBackend;
use crate::error::{LlmError, LlmResult};
use crate::gemini::GeminiBackend;

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Qwen,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Qwen => "qwen",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qwen" | "dashscope" => Ok(Provider::Qwen),
            "gemini" => Ok(Provider::Gemini),
            other => Err(LlmError::config(format!(
                "Unknown provider: {}. Supported providers: qwen, gemini",
                other
            ))),
        }
    }
}

/// Build the backend for `provider`, failing if it has no API key configured.
pub fn create_backend(provider: Provider, config: &LlmConfig) -> LlmResult<Arc<dyn AnalysisBackend>> {
    let backend: Arc<dyn AnalysisBackend> = match provider {
        Provider::Qwen => {
            let settings = config
                .qwen
                .clone()
                .ok_or_else(|| LlmError::config("Qwen not configured (QWEN_API_KEY missing)"))?;
            Arc::new(DashScopeBackend::new(settings, config.timeout)?)
        }
        Provider::Gemini => {
            let settings = config
                .gemini
                .clone()
                .ok_or_else(|| LlmError::config("Gemini not configured (GEMINI_API_KEY missing)"))?;
            Arc::new(GeminiBackend::new(settings, config.timeout)?)
        }
    };

    info!("Created {} backend", provider);
    Ok(backend)
}

/// Providers with credentials in `config`.
pub fn available_providers(config: &LlmConfig) -> Vec<Provider> {
    let mut providers = Vec::new();
    if config.qwen.is_some() {
        providers.push(Provider::Qwen);
    }
    if config.gemini.is_some() {
        providers.push(Provider::Gemini);
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::types::StreamShape;

    #[test]
    fn test_parse_provider() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("qwen".parse::<Provider>().unwrap(), Provider::Qwen);
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_create_requires_key() {
        let config = LlmConfig::default();
        assert!(available_providers(&config).is_empty());
        assert!(matches!(
            create_backend(Provider::Gemini, &config),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_create_configured_backends() {
        let config = LlmConfig {
            qwen: Some(ProviderSettings::qwen("sk")),
            gemini: Some(ProviderSettings::gemini("g")),
            ..Default::default()
        };
        assert_eq!(
            available_providers(&config),
            vec![Provider::Qwen, Provider::Gemini]
        );

        let qwen = create_backend(Provider::Qwen, &config).unwrap();
        assert_eq!(qwen.name(), "qwen");
        assert_eq!(qwen.shape(), StreamShape::Cumulative);

        let gemini = create_backend(Provider::Gemini, &config).unwrap();
        assert_eq!(gemini.shape(), StreamShape::Incremental);
    }
}
