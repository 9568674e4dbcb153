mod error;

pub mod chain;
pub mod config;
pub mod conversation;

pub use chain::{Chain, Snapshot, Step};
pub use config::{Chat, Config, Settings};
pub use conversation::{Command, Conversation};
pub use error::Error;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sipper::{Straw, sipper};
use tokio::time;

use std::future::Future;
use std::time::Duration;

pub use reqwest::IntoUrl;
pub use url::Url;

/// A source of generated text.
///
/// The reasoning [`Chain`] only ever talks to a model through this trait, so
/// anything able to turn a list of messages into a completion can drive it.
pub trait Oracle {
    fn generate(
        &self,
        messages: &[Message],
        options: Options,
    ) -> impl Future<Output = Result<String, Error>>;
}

impl<T: Oracle> Oracle for &T {
    fn generate(
        &self,
        messages: &[Message],
        options: Options,
    ) -> impl Future<Output = Result<String, Error>> {
        T::generate(self, messages, options)
    }
}

/// Generation limits for a single oracle call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub max_length: u32,
}

/// A model served by an OpenAI-compatible completion server, like `llama-server`.
#[derive(Debug, Clone)]
pub struct Reason {
    name: String,
    host: Url,
    client: reqwest::Client,
}

impl Reason {
    pub async fn connect(host: impl IntoUrl, model: &str) -> Result<Self, Error> {
        let host = host.into_url()?;
        let client = reqwest::Client::new();

        loop {
            let ready = client
                .get(format!(
                    "{host}/v1/models",
                    host = host.as_str().trim_end_matches('/')
                ))
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .and_then(reqwest::Response::error_for_status);

            match ready {
                Ok(_) => break,
                Err(error) => tracing::debug!(%host, %error, "server not ready yet"),
            }

            time::sleep(Duration::from_secs(1)).await;
        }

        tracing::info!(%host, model, "connected");

        Ok(Self {
            name: model.to_owned(),
            host,
            client,
        })
    }

    /// Streams the completion of the given messages.
    ///
    /// Text deltas are sent as progress while they arrive; the straw resolves
    /// to the whole completion.
    pub fn complete(
        &self,
        messages: &[Message],
        options: Options,
    ) -> impl Straw<String, String, Error> {
        sipper(move |mut sender| async move {
            let request = self
                .client
                .post(format!("{host}/v1/chat/completions", host = self.host()))
                .json(&json!({
                    "model": self.name,
                    "messages": messages,
                    "stream": true,
                    "cache_prompt": true,
                    "temperature": options.temperature,
                    // The length ceiling bounds generation as well
                    "max_tokens": options.max_new_tokens.min(options.max_length),
                }));

            let mut response = request.send().await?.error_for_status()?;
            let mut buffer = Vec::new();
            let mut completion = String::new();

            while let Some(chunk) = response.chunk().await? {
                buffer.extend(chunk);

                let mut lines = buffer
                    .split(|byte| *byte == 0x0A)
                    .filter(|bytes| !bytes.is_empty());

                let last_line = if buffer.ends_with(&[0x0A]) {
                    &[]
                } else {
                    lines.next_back().unwrap_or_default()
                };

                for line in lines {
                    #[derive(Deserialize)]
                    struct Data {
                        choices: Vec<Choice>,
                    }

                    #[derive(Deserialize)]
                    struct Choice {
                        delta: Delta,
                    }

                    #[derive(Deserialize)]
                    struct Delta {
                        #[serde(default)]
                        content: Option<String>,
                    }

                    const PREFIX: usize = b"data:".len();

                    if line.len() < PREFIX {
                        continue;
                    }

                    let Ok(data): Result<Data, _> = serde_json::from_slice(&line[PREFIX..]) else {
                        continue;
                    };

                    let Some(content) = data
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                    else {
                        continue;
                    };

                    if content.is_empty() {
                        continue;
                    }

                    completion.push_str(&content);
                    sender.send(content).await;
                }

                buffer = last_line.to_vec();
            }

            if completion.trim().is_empty() {
                return Err(Error::EmptyCompletion);
            }

            Ok(completion)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        self.host.as_str().trim_end_matches('/')
    }
}

impl Oracle for Reason {
    async fn generate(&self, messages: &[Message], options: Options) -> Result<String, Error> {
        self.complete(messages, options).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "lowercase")]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
}

impl Message {
    pub fn system(prompt: impl AsRef<str>) -> Self {
        Self::System(prompt.as_ref().to_owned())
    }

    pub fn user(prompt: impl AsRef<str>) -> Self {
        Self::User(prompt.as_ref().to_owned())
    }

    pub fn assistant(reply: impl AsRef<str>) -> Self {
        Self::Assistant(reply.as_ref().to_owned())
    }

    pub fn content(&self) -> &str {
        match self {
            Self::System(content) | Self::User(content) | Self::Assistant(content) => content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connecting_waits_for_a_refusing_server() {
        let attempt = time::timeout(
            Duration::from_millis(1500),
            Reason::connect("http://127.0.0.1:1", "model"),
        )
        .await;

        assert!(attempt.is_err(), "connect gave up: {attempt:?}");
    }

    #[tokio::test]
    async fn connecting_succeeds_once_the_server_is_up() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let server = tokio::spawn(async move {
            time::sleep(Duration::from_millis(1200)).await;

            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = [0; 1024];
            let _ = socket.read(&mut request).await.unwrap();

            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                    Content-Type: application/json\r\n\
                    Content-Length: 2\r\n\
                    Connection: close\r\n\r\n{}",
                )
                .await
                .unwrap();
        });

        let reason = time::timeout(
            Duration::from_secs(10),
            Reason::connect(format!("http://127.0.0.1:{port}"), "model"),
        )
        .await
        .expect("connect should not hang")
        .unwrap();

        server.await.unwrap();

        assert_eq!(reason.name(), "model");
        assert_eq!(reason.host(), format!("http://127.0.0.1:{port}"));
    }

    #[test]
    fn messages_use_chat_roles() {
        let messages = [
            Message::system("Be brief."),
            Message::user("Hi"),
            Message::assistant("Hello!"),
        ];

        assert_eq!(
            serde_json::to_value(&messages).unwrap(),
            json!([
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "Hi" },
                { "role": "assistant", "content": "Hello!" },
            ])
        );
    }

    #[test]
    fn messages_are_read_back_from_json() {
        let message: Message =
            serde_json::from_str(r#"{ "role": "user", "content": "What is 2+2?" }"#).unwrap();

        assert_eq!(message, Message::user("What is 2+2?"));
        assert_eq!(message.content(), "What is 2+2?");
    }
}
