//! Backend configuration.

use std::time::Duration;

pub const DEFAULT_QWEN_ENDPOINT: &str = "https://dashscope.aliyuncs.com/api/v1";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Credentials, endpoint and models for one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    /// Base URL; request paths are appended
    pub endpoint: String,
    /// Model used for video analysis
    pub vl_model: String,
    /// Model used for text-only calls (refinement, title, memory)
    pub text_model: String,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("vl_model", &self.vl_model)
            .field("text_model", &self.text_model)
            .finish()
    }
}

impl ProviderSettings {
    pub fn qwen(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_QWEN_ENDPOINT.to_string(),
            vl_model: "qwen-vl-max".to_string(),
            text_model: "qwen-max".to_string(),
        }
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            vl_model: "gemini-2.0-flash".to_string(),
            text_model: "gemini-2.0-flash".to_string(),
        }
    }

    /// Point at a different base URL (tests, proxies).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

/// Configuration for all backends.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub qwen: Option<ProviderSettings>,
    pub gemini: Option<ProviderSettings>,
    /// Timeout for single-shot calls and for connecting
    pub timeout: Duration,
    /// Retries for single-shot calls
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            qwen: None,
            gemini: None,
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Create config from environment variables.
    ///
    /// A provider is configured when its API key variable is non-empty.
    pub fn from_env() -> Self {
        let qwen = non_empty_env("QWEN_API_KEY").map(|key| {
            let defaults = ProviderSettings::qwen(key);
            ProviderSettings {
                endpoint: std::env::var("QWEN_API_ENDPOINT")
                    .map(|e| e.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.endpoint.clone()),
                vl_model: std::env::var("QWEN_VL_MODEL").unwrap_or(defaults.vl_model.clone()),
                text_model: std::env::var("QWEN_TEXT_MODEL").unwrap_or(defaults.text_model.clone()),
                ..defaults
            }
        });

        let gemini = non_empty_env("GEMINI_API_KEY").map(|key| {
            let defaults = ProviderSettings::gemini(key);
            ProviderSettings {
                endpoint: std::env::var("GEMINI_API_ENDPOINT")
                    .map(|e| e.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.endpoint.clone()),
                vl_model: std::env::var("GEMINI_VL_MODEL").unwrap_or(defaults.vl_model.clone()),
                text_model: std::env::var("GEMINI_TEXT_MODEL")
                    .unwrap_or(defaults.text_model.clone()),
                ..defaults
            }
        });

        Self {
            qwen,
            gemini,
            timeout: Duration::from_secs(
                std::env::var("LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            max_retries: std::env::var("LLM_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_api_key() {
        let settings = ProviderSettings::qwen("sk-secret");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("qwen-vl-max"));
    }

    #[test]
    fn test_with_endpoint_trims_slash() {
        let settings = ProviderSettings::gemini("k").with_endpoint("http://127.0.0.1:9999/");
        assert_eq!(settings.endpoint, "http://127.0.0.1:9999");
    }
}
