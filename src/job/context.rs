//! JobContext - what a running worker sees
//!
//! Cheap to clone (all `Arc`s). Gives the worker its options, read access to
//! upstream outputs, the output slot of its own job and the prompt protocol.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Options;
use crate::error::{ConvoyError, Result};
use crate::event::{EventEmitter, EventKind};
use crate::job::handle::{Job, JobTable};
use crate::job::spec::JobSpec;
use crate::job::state::JobState;
use crate::payload::Harvester;
use crate::prompt::{Answer, Prompt, PromptSender};

#[derive(Clone)]
pub struct JobContext {
    job: Arc<Job>,
    jobs: Arc<JobTable>,
    options: Arc<Options>,
    prompts: PromptSender,
    emitter: Arc<dyn EventEmitter>,
    cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(
        job: Arc<Job>,
        jobs: Arc<JobTable>,
        options: Arc<Options>,
        prompts: PromptSender,
        emitter: Arc<dyn EventEmitter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            job,
            jobs,
            options,
            prompts,
            emitter,
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn spec(&self) -> &JobSpec {
        self.job.spec()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn emitter(&self) -> &Arc<dyn EventEmitter> {
        &self.emitter
    }

    // ═══════════════════════════════════════════
    // UPSTREAM READS
    // ═══════════════════════════════════════════

    /// Read-only view limited to this job's upstream
    pub fn harvester(&self) -> Harvester<'_> {
        Harvester::scoped(&self.jobs, self.name(), self.job.upstream())
    }

    pub fn output(&self, job: &str, index: usize) -> Result<String> {
        self.harvester().get_job_output(job, index)
    }

    pub fn output_or(&self, job: &str, index: usize, default: impl Into<String>) -> Result<String> {
        self.harvester().get_job_output_or(job, index, default)
    }

    pub fn outputs(&self, job: &str) -> Result<Vec<String>> {
        self.harvester().get_job_outputs(job)
    }

    pub fn attribute(&self, job: &str, name: &str) -> Result<Value> {
        self.harvester().get_job_attribute(job, name)
    }

    // ═══════════════════════════════════════════
    // OWN OUTPUT
    // ═══════════════════════════════════════════

    fn ensure_active(&self, action: &str) -> Result<()> {
        let state = self.job.state();
        if state.is_active() {
            Ok(())
        } else {
            Err(ConvoyError::NotRunning {
                job: self.name().to_string(),
                action: action.to_string(),
                state: state.to_string(),
            })
        }
    }

    /// Append one output value
    pub fn send(&self, value: impl Into<String>) -> Result<()> {
        self.ensure_active("send output")?;
        let value = value.into();
        self.emitter.emit(EventKind::JobOutput {
            job: Arc::clone(self.job.name_arc()),
            value: value.clone(),
        });
        self.job.push_output(value);
        Ok(())
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.job.set_attribute(name, value.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        self.emitter.emit(EventKind::JobWarning {
            job: Arc::clone(self.job.name_arc()),
            message: message.clone(),
        });
        self.job.add_warning(message);
    }

    pub fn clear_warnings(&self) {
        self.job.clear_warnings();
    }

    /// Record an error without raising; the job's exit code becomes 1
    pub fn error(&self, message: impl Into<String>) {
        self.job.add_error(message);
    }

    pub fn set_info(&self, info: impl Into<String>) {
        self.job.set_info(info);
    }

    // ═══════════════════════════════════════════
    // PROMPTS
    // ═══════════════════════════════════════════

    /// Ask the user and wait for the answer.
    ///
    /// Moves the job to PROMPTING for the duration. Prompts of one job are
    /// serialized by the job's prompt lock. Cancelling the run drops the
    /// request's reply channel and returns `Cancelled`.
    pub async fn add_prompt(&self, prompt: Prompt) -> Result<Answer> {
        let _guard = self.job.prompt_lock.lock().await;

        if self.job.state() != JobState::Running {
            return Err(ConvoyError::NotRunning {
                job: self.name().to_string(),
                action: "add a prompt".to_string(),
                state: self.job.state().to_string(),
            });
        }

        self.job.transition(JobState::Prompting)?;
        self.emitter.emit(EventKind::PromptIssued {
            job: Arc::clone(self.job.name_arc()),
            question: prompt.question().to_string(),
        });
        debug!(job = %self.name(), question = %prompt.question(), "prompt issued");

        let (request, reply) = prompt.to_request(Arc::clone(self.job.name_arc()));
        if self.prompts.send(request).is_err() {
            return Err(ConvoyError::PromptDropped {
                job: self.name().to_string(),
            });
        }

        let answer = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ConvoyError::Cancelled),
            reply = reply => reply.map_err(|_| ConvoyError::PromptDropped {
                job: self.name().to_string(),
            })??,
        };

        prompt.run_callbacks(&answer);
        self.job.transition(JobState::Running)?;
        self.emitter.emit(EventKind::PromptAnswered {
            job: Arc::clone(self.job.name_arc()),
        });
        Ok(answer)
    }

    /// Ask a free-text question, pre-filled with `default`
    pub async fn ask_text(&self, question: &str, default: &str) -> Result<String> {
        let answer = self
            .add_prompt(Prompt::text(question).with_default(default))
            .await?;
        Ok(answer.text().to_string())
    }

    /// Ask a yes/no question until one of the two is picked
    pub async fn confirm(&self, question: &str, focus_yes: bool) -> Result<bool> {
        loop {
            let answer = self.add_prompt(Prompt::yes_no(question, focus_yes)).await?;
            if answer.value().is_some() {
                return Ok(answer.is_yes());
            }
            self.warn(format!("'{}' is not one of the options", answer.text()));
        }
    }

    // ═══════════════════════════════════════════
    // CANCELLATION
    // ═══════════════════════════════════════════

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job", &self.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{Presenter, ScriptedPresenter};
    use crate::test_utils::{finished_job, running_context, table};

    #[tokio::test]
    async fn test_send_requires_running_job() {
        let (ctx, _rx) = running_context(JobSpec::constant("a", ["x"]), table([]));
        ctx.send("one").unwrap();
        assert_eq!(ctx.job().output(), vec!["one"]);

        ctx.job().transition(JobState::Finished).unwrap();
        let err = ctx.send("late").unwrap_err();
        assert!(matches!(err, ConvoyError::NotRunning { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_prompt_round_trip_toggles_state() {
        let (ctx, rx) = running_context(JobSpec::constant("a", ["x"]), table([]));
        let presenter: Arc<dyn Presenter> = Arc::new(ScriptedPresenter::new(["hello"]));
        tokio::spawn(crate::prompt::serve(rx, presenter, CancellationToken::new()));

        let seen = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&seen);
        let answer = ctx
            .add_prompt(
                Prompt::text("Say:").on_answer(move |a| *slot.lock() = Some(a.text().to_string())),
            )
            .await
            .unwrap();

        assert_eq!(answer.text(), "hello");
        assert_eq!(seen.lock().as_deref(), Some("hello"));
        assert_eq!(ctx.job().state(), JobState::Running);
    }

    #[tokio::test]
    async fn test_prompt_after_finish_is_fatal() {
        let (ctx, _rx) = running_context(JobSpec::constant("a", ["x"]), table([]));
        ctx.job().transition(JobState::Finished).unwrap();

        let err = ctx.add_prompt(Prompt::text("Q")).await.unwrap_err();
        assert!(matches!(err, ConvoyError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn test_prompt_with_closed_channel() {
        let (ctx, rx) = running_context(JobSpec::constant("a", ["x"]), table([]));
        drop(rx);
        let err = ctx.add_prompt(Prompt::text("Q")).await.unwrap_err();
        assert!(matches!(err, ConvoyError::PromptDropped { .. }));
    }

    #[tokio::test]
    async fn test_reads_limited_to_upstream() {
        let jobs = table([finished_job("imdb", &["tt0133093"]), finished_job("other", &["x"])]);
        let (ctx, _rx) = running_context(JobSpec::constant("title", ["x"]).prejobs(["imdb"]), jobs);

        assert_eq!(ctx.output("imdb", 0).unwrap(), "tt0133093");
        let err = ctx.output("other", 0).unwrap_err();
        assert!(matches!(err, ConvoyError::UndeclaredRead { .. }));
    }
}
