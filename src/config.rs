use crate::{Error, Options};

use serde::Deserialize;
use tokio::fs;

use std::path::Path;
use std::time::Duration;

/// The contents of a `chat-config.toml` file.
///
/// ```toml
/// [config]
/// model = "Llama-3.2-1B-Instruct"
/// system = ["You are a pirate.", "Answer in one sentence."]
/// max_new_tokens = 256
///
/// [reasoning]
/// max_steps = 10
/// ```
///
/// Every table and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub config: Chat,
    pub reasoning: Config,
}

impl Settings {
    pub const FILE: &'static str = "chat-config.toml";

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let toml = fs::read_to_string(path).await?;

        Self::from_toml(&toml)
    }

    /// Loads [`Settings::FILE`] from the current directory, if present.
    pub async fn discover() -> Result<Self, Error> {
        if !fs::try_exists(Self::FILE).await? {
            return Ok(Self::default());
        }

        tracing::info!(file = Self::FILE, "loading configuration");

        Self::load(Self::FILE).await
    }

    pub fn from_toml(toml: &str) -> Result<Self, Error> {
        toml::from_str(toml).map_err(Error::InvalidConfig)
    }
}

/// Connection and generation settings of a chat front-end.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Chat {
    pub host: String,
    pub model: String,
    /// System prompt lines.
    pub system: Vec<String>,
    pub max_new_tokens: u32,
    pub temperature: f32,
    /// Falls back to `max_new_tokens` when absent.
    pub max_length: Option<u32>,
}

impl Chat {
    pub fn options(&self) -> Options {
        Options {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            max_length: self.max_length.unwrap_or(self.max_new_tokens),
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_owned(),
            model: "Llama-3.2-1B-Instruct".to_owned(),
            system: Vec::new(),
            max_new_tokens: 128,
            temperature: 1.0,
            max_length: None,
        }
    }
}

/// Generation and retry settings of a reasoning [`Chain`](crate::Chain).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub temperature: f32,
    /// Token budget of each reasoning step.
    pub step_tokens: u32,
    /// Token budget of the final answer.
    pub final_tokens: u32,
    /// Overall length ceiling given to the oracle on every call.
    pub max_length: u32,
    /// Maximum amount of numbered steps before a final answer is forced.
    pub max_steps: usize,
    /// Attempts per oracle call before giving up.
    pub attempts: usize,
    pub retry_delay_ms: u64,
}

impl Config {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn step_options(&self) -> Options {
        Options {
            max_new_tokens: self.step_tokens,
            temperature: self.temperature,
            max_length: self.max_length,
        }
    }

    pub fn final_options(&self) -> Options {
        Options {
            max_new_tokens: self.final_tokens,
            ..self.step_options()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            step_tokens: 300,
            final_tokens: 200,
            max_length: 300,
            max_steps: 25,
            attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}
