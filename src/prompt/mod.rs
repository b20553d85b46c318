//! Prompt Protocol - structured questions from jobs to a presenter
//!
//! A running job builds a [`Prompt`] and awaits it through
//! `JobContext::add_prompt`. The context turns it into a [`PromptRequest`]
//! sent over an unbounded channel; a [`Presenter`] answers through the
//! request's one-shot reply. Dropping the reply side (job cancelled) is
//! observable via [`PromptRequest::is_cancelled`].
//!
//! - `presenter`: Presenter trait, serve loop, scripted and terminal presenters

mod presenter;

pub use presenter::{serve, AskedPrompt, Presenter, ScriptedPresenter, TerminalPresenter};

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ConvoyError, Result};

pub type PromptSender = mpsc::UnboundedSender<PromptRequest>;
pub type PromptReceiver = mpsc::UnboundedReceiver<PromptRequest>;

/// Create the prompt channel shared by all jobs of a run
pub fn channel() -> (PromptSender, PromptReceiver) {
    mpsc::unbounded_channel()
}

/// Invoked with the answer before `add_prompt` returns
pub type Callback = Arc<dyn Fn(&Answer) + Send + Sync>;

/// One selectable option of a choice prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: Value,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PromptKind {
    Text {
        default: Option<String>,
    },
    Choice {
        options: Vec<ChoiceOption>,
        focused: usize,
    },
}

/// A question a job asks while running
#[derive(Clone)]
pub struct Prompt {
    question: String,
    kind: PromptKind,
    callbacks: Vec<Callback>,
}

impl Prompt {
    pub fn text(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            kind: PromptKind::Text { default: None },
            callbacks: Vec::new(),
        }
    }

    pub fn choice(question: impl Into<String>, options: impl IntoIterator<Item = ChoiceOption>) -> Self {
        Self {
            question: question.into(),
            kind: PromptKind::Choice {
                options: options.into_iter().collect(),
                focused: 0,
            },
            callbacks: Vec::new(),
        }
    }

    /// "Yes"/"No" choice resolving to `true`/`false`
    pub fn yes_no(question: impl Into<String>, focus_yes: bool) -> Self {
        Self::choice(
            question,
            [ChoiceOption::new("Yes", true), ChoiceOption::new("No", false)],
        )
        .focused(if focus_yes { 0 } else { 1 })
    }

    /// Pre-filled text; ignored for choice prompts
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        if let PromptKind::Text { default } = &mut self.kind {
            *default = Some(text.into());
        }
        self
    }

    /// Initially focused option; ignored for text prompts
    pub fn focused(mut self, index: usize) -> Self {
        if let PromptKind::Choice { options, focused } = &mut self.kind {
            *focused = index.min(options.len().saturating_sub(1));
        }
        self
    }

    pub fn on_answer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Answer) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn kind(&self) -> &PromptKind {
        &self.kind
    }

    pub(crate) fn run_callbacks(&self, answer: &Answer) {
        for callback in &self.callbacks {
            callback(answer);
        }
    }

    pub(crate) fn to_request(
        &self,
        job: Arc<str>,
    ) -> (PromptRequest, oneshot::Receiver<Result<Answer>>) {
        let (reply, rx) = oneshot::channel();
        let request = PromptRequest {
            job,
            question: self.question.clone(),
            kind: self.kind.clone(),
            reply,
        };
        (request, rx)
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prompt")
            .field("question", &self.question)
            .field("kind", &self.kind)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// What the user answered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Choice {
        index: usize,
        label: String,
        value: Value,
    },
}

impl Answer {
    /// Entered text, or the label of the chosen option
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Choice { label, .. } => label,
        }
    }

    /// Value of the chosen option
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Text(_) => None,
            Self::Choice { value, .. } => Some(value),
        }
    }

    /// Chosen option carries `true`
    pub fn is_yes(&self) -> bool {
        self.value() == Some(&Value::Bool(true))
    }
}

/// A prompt in flight, owned by the presenter until answered
pub struct PromptRequest {
    job: Arc<str>,
    question: String,
    kind: PromptKind,
    reply: oneshot::Sender<Result<Answer>>,
}

impl PromptRequest {
    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn kind(&self) -> &PromptKind {
        &self.kind
    }

    pub fn default_text(&self) -> Option<&str> {
        match &self.kind {
            PromptKind::Text { default } => default.as_deref(),
            PromptKind::Choice { .. } => None,
        }
    }

    pub fn options(&self) -> &[ChoiceOption] {
        match &self.kind {
            PromptKind::Text { .. } => &[],
            PromptKind::Choice { options, .. } => options,
        }
    }

    /// The asking job stopped waiting (cancelled or aborted)
    pub fn is_cancelled(&self) -> bool {
        self.reply.is_closed()
    }

    /// Resolves when the asking job stops waiting
    pub async fn cancelled(&mut self) {
        self.reply.closed().await
    }

    /// Interpret typed text: verbatim for text prompts, a label for choices
    pub fn resolve_text(&self, text: &str) -> Result<Answer> {
        match &self.kind {
            PromptKind::Text { .. } => Ok(Answer::Text(text.to_string())),
            PromptKind::Choice { options, .. } => options
                .iter()
                .position(|o| o.label == text)
                .or_else(|| {
                    options
                        .iter()
                        .position(|o| o.label.eq_ignore_ascii_case(text.trim()))
                })
                .map_or_else(
                    || {
                        Err(ConvoyError::InvalidAnswer {
                            job: self.job.to_string(),
                            reason: format!("'{}' is not one of the options", text),
                        })
                    },
                    |index| self.resolve_index(index),
                ),
        }
    }

    /// Pick an option by position
    pub fn resolve_index(&self, index: usize) -> Result<Answer> {
        match self.options().get(index) {
            Some(option) => Ok(Answer::Choice {
                index,
                label: option.label.clone(),
                value: option.value.clone(),
            }),
            None => Err(ConvoyError::InvalidAnswer {
                job: self.job.to_string(),
                reason: format!("option {} out of range", index),
            }),
        }
    }

    /// Deliver the answer; returns false if the job stopped waiting
    pub fn respond(self, answer: Result<Answer>) -> bool {
        self.reply.send(answer).is_ok()
    }
}

impl fmt::Debug for PromptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptRequest")
            .field("job", &self.job)
            .field("question", &self.question)
            .field("kind", &self.kind)
            .finish()
    }
}
