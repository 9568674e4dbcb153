use crate::{Error, Message};

use tokio::fs;

use std::path::{Path, PathBuf};

const DEFAULT_SYSTEM: &str = "You are a helpful assistant with knowledge of many things.";

/// A chat history owned by whoever drives the conversation.
///
/// The first message is always the system prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: impl IntoIterator<Item = String>) -> Self {
        let system: Vec<String> = system.into_iter().collect();

        let system = if system.is_empty() {
            DEFAULT_SYSTEM.to_owned()
        } else {
            system.join("\n")
        };

        Self {
            messages: vec![Message::System(system)],
        }
    }

    pub fn push_user(&mut self, prompt: impl AsRef<str>) {
        self.messages.push(Message::user(prompt));
    }

    pub fn push_assistant(&mut self, reply: impl AsRef<str>) {
        self.messages.push(Message::assistant(reply));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Amount of turns after the system prompt.
    pub fn len(&self) -> usize {
        self.messages.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let json =
            serde_json::to_string_pretty(&self.messages).map_err(Error::InvalidConversation)?;

        fs::write(path, json).await?;

        Ok(())
    }

    /// Appends every message stored in the given file.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<usize, Error> {
        let json = fs::read_to_string(path).await?;
        let messages: Vec<Message> =
            serde_json::from_str(&json).map_err(Error::InvalidConversation)?;

        let loaded = messages.len();
        self.messages.extend(messages);

        Ok(loaded)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

/// A slash command typed at a chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    Clear,
    Save(PathBuf),
    Load(PathBuf),
    MissingFile,
    Unknown(String),
}

impl Command {
    /// Parses a line of input, returning `None` when it is not a command.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let command = line.strip_prefix('/')?;

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let file = parts.next().map(PathBuf::from);

        Some(match (name, file) {
            ("help", _) => Self::Help,
            ("exit", _) => Self::Exit,
            ("clear", _) => Self::Clear,
            ("save", Some(file)) => Self::Save(file),
            ("load", Some(file)) => Self::Load(file),
            ("save" | "load", None) => Self::MissingFile,
            _ => Self::Unknown(line.to_owned()),
        })
    }
}
