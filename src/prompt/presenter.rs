//! Presenters - the consumers of prompt requests
//!
//! - `ScriptedPresenter`: answers from queues (tests, `--answers` file)
//! - `TerminalPresenter`: interactive terminal via dialoguer

use std::collections::VecDeque;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dialoguer::{Error as DialoguerError, Input, Select};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Answer, PromptKind, PromptReceiver, PromptRequest};
use crate::error::{ConvoyError, Result};

/// Consumer of prompt requests
///
/// Implementations must answer (or drop) every request they receive.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn present(&self, request: PromptRequest);
}

/// Feed requests to `presenter` until the channel closes or the run is cancelled
pub async fn serve(
    mut requests: PromptReceiver,
    presenter: Arc<dyn Presenter>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = requests.recv() => next,
        };
        let Some(request) = next else {
            break;
        };
        if request.is_cancelled() {
            debug!(job = %request.job(), "skipping prompt of cancelled job");
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = presenter.present(request) => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// SCRIPTED
// ═══════════════════════════════════════════════════════════════

/// Record of a prompt shown by [`ScriptedPresenter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskedPrompt {
    pub job: String,
    pub question: String,
    pub default: Option<String>,
    pub options: Vec<String>,
    pub focused: Option<usize>,
}

/// Answers prompts from queued strings
///
/// Per-job queues are consulted first, then the shared queue. Choice prompts
/// take the answer as an option label; text matching no option is passed on
/// as a plain text answer for the job to reject. Running out of answers fails
/// the prompt with `InvalidAnswer`.
#[derive(Debug, Default)]
pub struct ScriptedPresenter {
    shared: Mutex<VecDeque<String>>,
    per_job: Mutex<FxHashMap<String, VecDeque<String>>>,
    asked: Mutex<Vec<AskedPrompt>>,
}

/// Shape of an `--answers` YAML file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AnswersFile {
    Shared(Vec<String>),
    PerJob(FxHashMap<String, OneOrMany>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl ScriptedPresenter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shared: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Queue answers consumed only by prompts of `job`
    pub fn with_job_answers<I, S>(self, job: impl Into<String>, answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.per_job
            .lock()
            .entry(job.into())
            .or_default()
            .extend(answers.into_iter().map(Into::into));
        self
    }

    /// Load answers from YAML: a list (shared queue) or a map of job to answer(s)
    pub fn from_yaml(content: &str) -> Result<Self> {
        let parsed: AnswersFile =
            serde_yaml::from_str(content).map_err(|e| ConvoyError::ConfigError {
                reason: format!("Invalid answers file: {}", e),
            })?;

        Ok(match parsed {
            AnswersFile::Shared(answers) => Self::new(answers),
            AnswersFile::PerJob(map) => {
                map.into_iter()
                    .fold(Self::default(), |presenter, (job, answers)| match answers {
                        OneOrMany::One(answer) => presenter.with_job_answers(job, [answer]),
                        OneOrMany::Many(answers) => presenter.with_job_answers(job, answers),
                    })
            }
        })
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Every prompt presented so far, in order
    pub fn asked(&self) -> Vec<AskedPrompt> {
        self.asked.lock().clone()
    }

    /// Questions presented so far, in order
    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().iter().map(|a| a.question.clone()).collect()
    }

    /// Answers not yet consumed
    pub fn remaining(&self) -> usize {
        self.shared.lock().len() + self.per_job.lock().values().map(VecDeque::len).sum::<usize>()
    }

    fn next_answer(&self, job: &str) -> Option<String> {
        if let Some(answer) = self.per_job.lock().get_mut(job).and_then(VecDeque::pop_front) {
            return Some(answer);
        }
        self.shared.lock().pop_front()
    }
}

#[async_trait]
impl Presenter for ScriptedPresenter {
    async fn present(&self, request: PromptRequest) {
        let (focused, options) = match request.kind() {
            PromptKind::Text { .. } => (None, Vec::new()),
            PromptKind::Choice { options, focused } => (
                Some(*focused),
                options.iter().map(|o| o.label.clone()).collect(),
            ),
        };
        self.asked.lock().push(AskedPrompt {
            job: request.job().to_string(),
            question: request.question().to_string(),
            default: request.default_text().map(str::to_string),
            options,
            focused,
        });

        let answer = match self.next_answer(request.job()) {
            Some(text) => Ok(request
                .resolve_text(&text)
                .unwrap_or_else(|_| Answer::Text(text))),
            None => Err(ConvoyError::InvalidAnswer {
                job: request.job().to_string(),
                reason: format!("no scripted answer left for '{}'", request.question()),
            }),
        };
        request.respond(answer);
    }
}

// ═══════════════════════════════════════════════════════════════
// TERMINAL
// ═══════════════════════════════════════════════════════════════

/// Interactive presenter reading from the terminal
///
/// Prompts are shown one at a time on a blocking thread. If the asking job is
/// cancelled meanwhile, the answer is discarded.
#[derive(Debug, Default, Clone)]
pub struct TerminalPresenter;

impl TerminalPresenter {
    fn ask(job: &str, question: &str, kind: &PromptKind) -> Result<Answer> {
        let prompt = format!("[{}] {}", job, question);
        match kind {
            PromptKind::Text { default } => {
                let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
                if let Some(default) = default {
                    input = input.with_initial_text(default.clone());
                }
                input.interact_text().map(Answer::Text).map_err(map_dialoguer)
            }
            PromptKind::Choice { options, focused } => {
                let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
                let index = Select::new()
                    .with_prompt(prompt)
                    .items(&labels)
                    .default(*focused)
                    .interact()
                    .map_err(map_dialoguer)?;
                let option = &options[index];
                Ok(Answer::Choice {
                    index,
                    label: option.label.clone(),
                    value: option.value.clone(),
                })
            }
        }
    }
}

fn map_dialoguer(err: DialoguerError) -> ConvoyError {
    match err {
        DialoguerError::IO(err) if err.kind() == IoErrorKind::Interrupted => ConvoyError::Cancelled,
        other => ConvoyError::Io(std::io::Error::other(other.to_string())),
    }
}

#[async_trait]
impl Presenter for TerminalPresenter {
    async fn present(&self, mut request: PromptRequest) {
        let job = request.job().to_string();
        let question = request.question().to_string();
        let kind = request.kind().clone();
        let blocking =
            tokio::task::spawn_blocking(move || TerminalPresenter::ask(&job, &question, &kind));

        let outcome = tokio::select! {
            _ = request.cancelled() => None,
            joined = blocking => Some(joined),
        };

        match outcome {
            Some(Ok(answer)) => {
                request.respond(answer);
            }
            Some(Err(join_err)) => {
                request.respond(Err(ConvoyError::TaskPanicked {
                    details: join_err.to_string(),
                }));
            }
            None => warn!(job = %request.job(), "prompt cancelled while shown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{channel, ChoiceOption, Prompt};

    #[tokio::test]
    async fn test_scripted_answers_in_order() {
        let presenter = ScriptedPresenter::new(["first", "second"]);

        let (req, rx) = Prompt::text("A:").to_request("job".into());
        presenter.present(req).await;
        assert_eq!(rx.await.unwrap().unwrap().text(), "first");

        let (req, rx) = Prompt::text("B:").with_default("d").to_request("job".into());
        presenter.present(req).await;
        assert_eq!(rx.await.unwrap().unwrap().text(), "second");

        assert_eq!(presenter.questions(), vec!["A:", "B:"]);
        assert_eq!(presenter.asked()[1].default.as_deref(), Some("d"));
        assert_eq!(presenter.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_per_job_queue_wins() {
        let presenter = ScriptedPresenter::new(["shared"]).with_job_answers("title", ["mine"]);

        let (req, rx) = Prompt::text("Title:").to_request("title".into());
        presenter.present(req).await;
        assert_eq!(rx.await.unwrap().unwrap().text(), "mine");

        let (req, rx) = Prompt::text("Title:").to_request("title".into());
        presenter.present(req).await;
        assert_eq!(rx.await.unwrap().unwrap().text(), "shared");
    }

    #[tokio::test]
    async fn test_scripted_choice_by_label() {
        let presenter = ScriptedPresenter::new(["No"]);
        let (req, rx) = Prompt::yes_no("Sure?", false).to_request("job".into());
        presenter.present(req).await;

        let answer = rx.await.unwrap().unwrap();
        assert!(!answer.is_yes());
        let asked = presenter.asked();
        assert_eq!(asked[0].options, vec!["Yes", "No"]);
        assert_eq!(asked[0].focused, Some(1));
    }

    #[tokio::test]
    async fn test_scripted_unknown_option_is_passed_as_text() {
        let presenter = ScriptedPresenter::new(["Maybe"]);
        let (req, rx) = Prompt::yes_no("Sure?", false).to_request("job".into());
        presenter.present(req).await;

        let answer = rx.await.unwrap().unwrap();
        assert_eq!(answer, Answer::Text("Maybe".into()));
        assert_eq!(answer.value(), None);
    }

    #[tokio::test]
    async fn test_scripted_exhausted_fails_prompt() {
        let presenter = ScriptedPresenter::new(Vec::<String>::new());
        let (req, rx) = Prompt::text("A:").to_request("job".into());
        presenter.present(req).await;

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "CONVOY-032");
    }

    #[test]
    fn test_answers_from_yaml() {
        let shared = ScriptedPresenter::from_yaml("- one\n- two\n").unwrap();
        assert_eq!(shared.remaining(), 2);

        let per_job = ScriptedPresenter::from_yaml("title: The Matrix\ntype: [Movie]\n").unwrap();
        assert_eq!(per_job.remaining(), 2);

        assert!(ScriptedPresenter::from_yaml("42").is_err());
    }

    #[tokio::test]
    async fn test_serve_answers_until_channel_closes() {
        let (tx, rx) = channel();
        let presenter: Arc<dyn Presenter> = Arc::new(ScriptedPresenter::new(["Season"]));
        let server = tokio::spawn(serve(rx, presenter, CancellationToken::new()));

        let prompt = Prompt::choice(
            "Type?",
            [
                ChoiceOption::new("Movie", "movie"),
                ChoiceOption::new("Season", "season"),
            ],
        );
        let (req, reply) = prompt.to_request("type".into());
        tx.send(req).unwrap();
        let answer = reply.await.unwrap().unwrap();
        assert_eq!(answer.value(), Some(&serde_json::json!("season")));

        drop(tx);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_serve_skips_cancelled_requests() {
        let (tx, rx) = channel();
        let scripted = Arc::new(ScriptedPresenter::new(["x"]));
        let presenter: Arc<dyn Presenter> = scripted.clone();

        let (req, reply) = Prompt::text("Gone:").to_request("job".into());
        drop(reply);
        tx.send(req).unwrap();
        drop(tx);

        serve(rx, presenter, CancellationToken::new()).await;
        assert!(scripted.asked().is_empty());
        assert_eq!(scripted.remaining(), 1);
    }
}
