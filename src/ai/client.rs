//! Chat-completion client for the rewrite model
//!
//! One prompt in, one completion out. Every backend except Anthropic speaks
//! the OpenAI chat-completions dialect. Calls are sync (ureq); the async
//! pipeline runs them on the blocking pool.

use crate::ai::{AiError, AiResult, TextTransform};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Groq,
    Anthropic,
    OpenAi,
    Deepinfra,
    OpenRouter,
    Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    OpenAi,
    Anthropic,
}

/// Static facts about one backend
struct Profile {
    label: &'static str,
    /// `None` for local backends that take no key
    key_var: Option<&'static str>,
    key_url: &'static str,
    model: &'static str,
    endpoint: &'static str,
    dialect: Dialect,
}

const GROQ: Profile = Profile {
    label: "Groq",
    key_var: Some("GROQ_API_KEY"),
    key_url: "https://console.groq.com/keys",
    model: "llama-3.3-70b-versatile",
    endpoint: "https://api.groq.com/openai/v1/chat/completions",
    dialect: Dialect::OpenAi,
};

const ANTHROPIC: Profile = Profile {
    label: "Anthropic",
    key_var: Some("ANTHROPIC_API_KEY"),
    key_url: "https://console.anthropic.com/settings/keys",
    model: "claude-sonnet-4-20250514",
    endpoint: "https://api.anthropic.com/v1/messages",
    dialect: Dialect::Anthropic,
};

const OPENAI: Profile = Profile {
    label: "OpenAI",
    key_var: Some("OPENAI_API_KEY"),
    key_url: "https://platform.openai.com/api-keys",
    model: "gpt-4o",
    endpoint: "https://api.openai.com/v1/chat/completions",
    dialect: Dialect::OpenAi,
};

const DEEPINFRA: Profile = Profile {
    label: "Deepinfra",
    key_var: Some("DEEPINFRA_API_KEY"),
    key_url: "https://deepinfra.com/dash/api_keys",
    model: "meta-llama/Llama-3.3-70B-Instruct",
    endpoint: "https://api.deepinfra.com/v1/openai/chat/completions",
    dialect: Dialect::OpenAi,
};

const OPENROUTER: Profile = Profile {
    label: "OpenRouter",
    key_var: Some("OPENROUTER_API_KEY"),
    key_url: "https://openrouter.ai/keys",
    model: "anthropic/claude-sonnet-4",
    endpoint: "https://openrouter.ai/api/v1/chat/completions",
    dialect: Dialect::OpenAi,
};

const OLLAMA: Profile = Profile {
    label: "Ollama (local)",
    key_var: None,
    key_url: "https://ollama.ai",
    model: "deepseek-coder:6.7b",
    endpoint: "http://localhost:11434/v1/chat/completions",
    dialect: Dialect::OpenAi,
};

impl LlmBackend {
    fn profile(self) -> &'static Profile {
        match self {
            LlmBackend::Groq => &GROQ,
            LlmBackend::Anthropic => &ANTHROPIC,
            LlmBackend::OpenAi => &OPENAI,
            LlmBackend::Deepinfra => &DEEPINFRA,
            LlmBackend::OpenRouter => &OPENROUTER,
            LlmBackend::Ollama => &OLLAMA,
        }
    }

    /// Environment variable holding the API key, if the backend needs one
    pub fn key_var(self) -> Option<&'static str> {
        self.profile().key_var
    }

    pub fn default_model(self) -> &'static str {
        self.profile().model
    }

    pub fn display_name(self) -> &'static str {
        self.profile().label
    }
}

impl FromStr for LlmBackend {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(LlmBackend::Groq),
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" => Ok(LlmBackend::OpenAi),
            "deepinfra" => Ok(LlmBackend::Deepinfra),
            "openrouter" => Ok(LlmBackend::OpenRouter),
            "ollama" => Ok(LlmBackend::Ollama),
            other => Err(AiError::ConfigError(format!("unknown backend '{}'", other))),
        }
    }
}

/// Model selection and sampling settings
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub backend: LlmBackend,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            model: None,
            max_tokens: 4096,
            temperature: 0.1,
        }
    }
}

impl AiConfig {
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }
}

pub struct AiClient {
    config: AiConfig,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl AiClient {
    pub fn new(config: AiConfig, api_key: Option<String>) -> Self {
        // Status codes are mapped by hand so 429 can be told apart from 401
        let agent = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(120)))
            .build()
            .new_agent();
        Self {
            config,
            api_key,
            agent,
        }
    }

    /// Build a client, reading the backend's key from the environment
    pub fn from_env_with_config(mut config: AiConfig) -> AiResult<Self> {
        let profile = config.backend.profile();
        let Some(var) = profile.key_var else {
            if config.model.is_none() {
                config.model = env::var("OLLAMA_MODEL").ok().filter(|m| !m.trim().is_empty());
            }
            return Ok(Self::new(config, None));
        };

        match env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(config, Some(key))),
            _ => Err(AiError::MissingApiKey {
                env_var: var.to_string(),
                signup_url: profile.key_url.to_string(),
            }),
        }
    }

    pub fn backend(&self) -> LlmBackend {
        self.config.backend
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// Send a single user prompt and return the completion text
    pub fn complete(&self, prompt: &str) -> AiResult<String> {
        let profile = self.config.backend.profile();
        let turn = [Turn {
            role: "user",
            content: prompt,
        }];
        debug!("{} request ({} chars) to {}", profile.label, prompt.len(), self.model());

        let mut req = self
            .agent
            .post(profile.endpoint)
            .header("Content-Type", "application/json");

        let response = match profile.dialect {
            Dialect::OpenAi => {
                if let Some(key) = &self.api_key {
                    req = req.header("Authorization", &format!("Bearer {}", key));
                }
                req.send_json(&ChatRequest {
                    model: self.model(),
                    messages: &turn,
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                })
            }
            Dialect::Anthropic => req
                .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
                .header("anthropic-version", "2023-06-01")
                .send_json(&ChatRequest {
                    model: self.model(),
                    messages: &turn,
                    max_tokens: self.config.max_tokens,
                    temperature: self.config.temperature,
                }),
        }
        .map_err(|e| AiError::ApiError {
            status: 0,
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let mut body = response.into_body();
        if status >= 400 {
            return Err(AiError::from_status(status, body.read_to_string().unwrap_or_default()));
        }

        let text = match profile.dialect {
            Dialect::OpenAi => body
                .read_json::<ChatCompletion>()
                .map_err(|e| AiError::ParseError(e.to_string()))?
                .text(),
            Dialect::Anthropic => body
                .read_json::<MessagesReply>()
                .map_err(|e| AiError::ParseError(e.to_string()))?
                .text(),
        };
        text.ok_or_else(|| AiError::ParseError(format!("No text in {} response", profile.label)))
    }
}

impl TextTransform for AiClient {
    fn transform(&self, prompt: &str) -> AiResult<String> {
        let text = self.complete(prompt)?;
        if text.trim().is_empty() {
            return Err(AiError::ParseError(format!(
                "Empty response from {}",
                self.config.backend.display_name()
            )));
        }
        Ok(text)
    }
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

/// Same shape for both dialects when there is no system prompt
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn<'a>],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompletion {
    fn text(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessagesReply {
    fn text(self) -> Option<String> {
        self.content.into_iter().find(|b| b.kind == "text").map(|b| b.text)
    }
}
