//! Step-by-step reasoning chains.
//!
//! A [`Chain`] asks an [`Oracle`] for one reasoning step at a time, feeding
//! every answer back into the conversation until the oracle decides it is
//! ready to answer (or runs out of steps). A final answer is then requested
//! on its own.
use crate::{Config, Error, Message, Oracle};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sipper::{Sipper, sipper};
use tokio::time;

use std::borrow::Cow;
use std::time::{Duration, Instant};

const INSTRUCTIONS: &str = "You are an expert AI assistant that explains your reasoning step by step. \
For each step, provide a title that describes what you're doing in that step, along with the content. \
Decide if you need another step or if you're ready to give the final answer. \
Respond in JSON format with 'title', 'content', and 'next_action' (either 'continue' or 'final_answer') keys.";

const ACKNOWLEDGEMENT: &str = "Thank you! I will now think step by step following my instructions, \
starting at the beginning after decomposing the problem.";

const FINAL_REQUEST: &str = "Please provide the final answer based on your reasoning above.";

#[derive(Debug, Clone)]
pub struct Chain<O> {
    oracle: O,
    config: Config,
}

impl<O: Oracle> Chain<O> {
    pub fn new(oracle: O, config: Config) -> Self {
        Self { oracle, config }
    }

    /// Reasons about the given prompt.
    ///
    /// Every numbered step produces a [`Snapshot`] as progress. The sipper
    /// resolves to the finished snapshot, the only one carrying a total
    /// thinking time.
    ///
    /// Oracle failures never escape; they end up as failed steps.
    pub fn run(&self, prompt: &str) -> impl Sipper<Snapshot, Snapshot> {
        sipper(move |mut progress| async move {
            let mut messages = vec![
                Message::system(INSTRUCTIONS),
                Message::user(prompt),
                Message::assistant(ACKNOWLEDGEMENT),
            ];

            let mut steps = Vec::new();
            let mut total = Duration::ZERO;
            let mut number = 1;

            loop {
                let label = Label::Numbered(number);

                let started_at = Instant::now();
                let result = self.consult(&messages, label).await;
                let thinking_time = started_at.elapsed();

                total += thinking_time;

                let is_ready = match &result {
                    Ok(thought) => thought.next_action == NextAction::FinalAnswer,
                    Err(_) => true,
                };

                messages.push(Message::assistant(transcript(&result, label)));
                steps.push(Step {
                    label,
                    outcome: Outcome::new(result),
                    thinking_time,
                });

                progress
                    .send(Snapshot {
                        steps: steps.clone(),
                        total_thinking_time: None,
                    })
                    .await;

                if is_ready || number >= self.config.max_steps {
                    break;
                }

                number += 1;
            }

            messages.push(Message::user(FINAL_REQUEST));

            let started_at = Instant::now();
            let result = self.consult(&messages, Label::Final).await;
            let thinking_time = started_at.elapsed();

            total += thinking_time;

            steps.push(Step {
                label: Label::Final,
                outcome: Outcome::new(result),
                thinking_time,
            });

            tracing::info!(steps = steps.len(), ?total, "reasoning finished");

            Snapshot {
                steps,
                total_thinking_time: Some(total),
            }
        })
    }

    async fn consult(&self, messages: &[Message], label: Label) -> Result<Thought, Failure> {
        let options = match label {
            Label::Numbered(_) => self.config.step_options(),
            Label::Final => self.config.final_options(),
        };

        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(attempt, ?label, "consulting oracle");

            let error = match self.oracle.generate(messages, options).await {
                Ok(text) => match Thought::parse(&text) {
                    Ok(thought) => return Ok(thought),
                    Err(error) => error,
                },
                Err(error) => error,
            };

            if attempt >= attempts {
                tracing::warn!(attempt, ?label, %error, "giving up on oracle");

                return Err(Failure {
                    attempts: attempt,
                    reason: error.to_string(),
                });
            }

            tracing::warn!(attempt, ?label, %error, "oracle attempt failed");

            time::sleep(self.config.retry_delay()).await;
            attempt += 1;
        }
    }
}

/// The cumulative view of a reasoning session.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub steps: Vec<Step>,
    /// Only present once the final answer is in.
    pub total_thinking_time: Option<Duration>,
}

impl Snapshot {
    pub fn is_done(&self) -> bool {
        self.total_thinking_time.is_some()
    }

    /// Renders the whole chain as markdown.
    pub fn render(&self) -> String {
        let mut output = String::new();

        for step in &self.steps {
            let entry = if step.is_final() {
                format!("### {}\n{}", step.title(), step.content())
            } else {
                format!("\n**{}**\n{}", step.title(), step.content())
            };

            output.push_str(&entry);
            output.push('\n');
        }

        if let Some(total) = self.total_thinking_time {
            output.push_str(&format!(
                "\nTotal thinking time: {:.2} seconds\n",
                total.as_secs_f64()
            ));
        }

        output
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub label: Label,
    pub outcome: Outcome,
    pub thinking_time: Duration,
}

impl Step {
    pub fn title(&self) -> String {
        match (self.label, &self.outcome) {
            (Label::Final, _) => "Final Answer".to_owned(),
            (Label::Numbered(number), Outcome::Thought { title, .. }) => {
                format!("Step {number}: {title}")
            }
            (Label::Numbered(number), Outcome::Failed { .. }) => format!("Step {number}: Error"),
        }
    }

    pub fn content(&self) -> Cow<'_, str> {
        match &self.outcome {
            Outcome::Thought { content, .. } => Cow::Borrowed(content.as_str()),
            Outcome::Failed { attempts, reason } => {
                Cow::Owned(failure_message(self.label, *attempts, reason))
            }
        }
    }

    pub fn is_final(&self) -> bool {
        self.label == Label::Final
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Numbered(usize),
    Final,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Thought { title: String, content: String },
    Failed { attempts: usize, reason: String },
}

impl Outcome {
    fn new(result: Result<Thought, Failure>) -> Self {
        match result {
            Ok(thought) => Self::Thought {
                title: thought.title,
                content: thought.content,
            },
            Err(Failure { attempts, reason }) => Self::Failed { attempts, reason },
        }
    }
}

/// A single structured answer of the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub next_action: NextAction,
}

impl Thought {
    /// Parses an oracle completion.
    ///
    /// Models like to wrap JSON in code fences or chatter, so the first
    /// balanced object that parses is accepted when the whole text does not.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();

        match serde_json::from_str(text) {
            Ok(thought) => Ok(thought),
            Err(error) => objects(text)
                .find_map(|object| serde_json::from_str(object).ok())
                .ok_or(Error::MalformedOutput(error)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    #[default]
    Continue,
    FinalAnswer,
}

#[derive(Debug, Clone)]
struct Failure {
    attempts: usize,
    reason: String,
}

fn failure_message(label: Label, attempts: usize, reason: &str) -> String {
    let target = match label {
        Label::Numbered(_) => "step",
        Label::Final => "final answer",
    };

    format!("Failed to generate {target} after {attempts} attempts. Error: {reason}")
}

/// The assistant turn recorded for a step, so the oracle sees its own reasoning.
fn transcript(result: &Result<Thought, Failure>, label: Label) -> String {
    match result {
        Ok(thought) => json!(thought).to_string(),
        Err(failure) => json!({
            "title": "Error",
            "content": failure_message(label, failure.attempts, &failure.reason),
            "next_action": NextAction::FinalAnswer,
        })
        .to_string(),
    }
}

fn objects(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .filter_map(move |(start, _)| {
            let mut depth = 0;
            let mut in_string = false;
            let mut escaped = false;

            for (offset, c) in text[start..].char_indices() {
                if in_string {
                    match c {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => in_string = false,
                        _ => {}
                    }

                    continue;
                }

                match c {
                    '"' => in_string = true,
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;

                        if depth == 0 {
                            return Some(&text[start..=start + offset]);
                        }
                    }
                    _ => {}
                }
            }

            None
        })
}
