//! Interactive field jobs
//!
//! A field job asks one question and emits the accepted answer. Text fields
//! may be pre-filled by an async function; choice fields may autodetect the
//! option to focus. With `autofinish`, a pre-filled or detected value that
//! passes validation is accepted without prompting.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::error::{ConvoyError, Result};
use crate::job::context::JobContext;
use crate::job::spec::JobSpec;
use crate::prompt::{Answer, ChoiceOption, Prompt};

/// Attribute holding the value of the chosen option
pub const CHOICE_ATTRIBUTE: &str = "choice";

/// Async source of a suggested value
pub type Prefill = Arc<dyn Fn(JobContext) -> BoxFuture<'static, Result<Option<String>>> + Send + Sync>;

fn boxed_prefill<F, Fut>(f: F) -> Prefill
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

// ═══════════════════════════════════════════════════════════════
// TEXT
// ═══════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct TextField {
    question: String,
    default: Option<String>,
    prefill: Option<Prefill>,
}

impl TextField {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            default: None,
            prefill: None,
        }
    }

    pub fn default_text(mut self, text: impl Into<String>) -> Self {
        self.default = Some(text.into());
        self
    }

    /// Compute the default at run time (e.g. from a prejob or a collaborator)
    pub fn prefill_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        self.prefill = Some(boxed_prefill(f));
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }
}

impl fmt::Debug for TextField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextField")
            .field("question", &self.question)
            .field("default", &self.default)
            .field("prefill", &self.prefill.is_some())
            .finish()
    }
}

/// Empty text is only acceptable with `no_output_is_ok`
fn check_text(spec: &JobSpec, text: &str) -> Result<()> {
    if text.is_empty() {
        return if spec.is_no_output_ok() {
            Ok(())
        } else {
            Err(ConvoyError::validation("A value is required"))
        };
    }
    spec.validate(text)
}

fn accept_text(ctx: &JobContext, text: String) -> Result<()> {
    if !text.is_empty() {
        ctx.send(text)?;
    }
    Ok(())
}

pub(crate) async fn run_text(ctx: &JobContext, field: &TextField) -> Result<()> {
    let spec = ctx.spec();
    let mut default = field.default.as_deref().map(|d| spec.normalize(d));

    if let Some(prefill) = &field.prefill {
        match prefill(ctx.clone()).await {
            Ok(Some(text)) => {
                let text = spec.normalize(&text);
                if spec.is_autofinish() {
                    match check_text(spec, &text) {
                        Ok(()) => return accept_text(ctx, text),
                        Err(ConvoyError::Validation { reason }) => {
                            debug!(job = %ctx.name(), %reason, "pre-filled value rejected");
                        }
                        Err(e) => return Err(e),
                    }
                }
                default = Some(text);
            }
            Ok(None) => {}
            Err(e) if spec.tolerates(e.kind()) => {
                debug!(job = %ctx.name(), error = %e, "pre-fill failed");
                default = None;
            }
            Err(e) => return Err(e),
        }
    }

    loop {
        let mut prompt = Prompt::text(field.question.clone());
        if let Some(text) = &default {
            prompt = prompt.with_default(text.clone());
        }

        let answer = ctx.add_prompt(prompt).await?;
        let text = spec.normalize(answer.text());
        match check_text(spec, &text) {
            Ok(()) => {
                ctx.clear_warnings();
                return accept_text(ctx, text);
            }
            Err(ConvoyError::Validation { reason }) => {
                ctx.warn(reason);
                default = Some(text);
            }
            Err(e) => return Err(e),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// CHOICE
// ═══════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ChoiceField {
    question: String,
    options: Vec<ChoiceOption>,
    focused: usize,
    autodetect: Option<Prefill>,
}

impl ChoiceField {
    pub fn new(question: impl Into<String>, options: impl IntoIterator<Item = ChoiceOption>) -> Self {
        Self {
            question: question.into(),
            options: options.into_iter().collect(),
            focused: 0,
            autodetect: None,
        }
    }

    /// Focus the option matching `hint` (label or value)
    pub fn focus(mut self, hint: &str) -> Self {
        if let Some(index) = self.index_of(hint) {
            self.focused = index;
        }
        self
    }

    /// Detect the option at run time; the result is matched like [`focus`](Self::focus)
    pub fn autodetect_with<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        self.autodetect = Some(boxed_prefill(f));
        self
    }

    pub fn options(&self) -> &[ChoiceOption] {
        &self.options
    }

    /// Position of the option whose label or value matches `hint`
    pub fn index_of(&self, hint: &str) -> Option<usize> {
        self.options
            .iter()
            .position(|o| o.label.eq_ignore_ascii_case(hint))
            .or_else(|| {
                self.options.iter().position(|o| match &o.value {
                    serde_json::Value::String(s) => s.eq_ignore_ascii_case(hint),
                    other => other.to_string() == hint,
                })
            })
    }
}

impl fmt::Debug for ChoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChoiceField")
            .field("question", &self.question)
            .field("options", &self.options)
            .field("focused", &self.focused)
            .field("autodetect", &self.autodetect.is_some())
            .finish()
    }
}

fn accept_choice(ctx: &JobContext, field: &ChoiceField, index: usize) -> Result<()> {
    let option = field
        .options
        .get(index)
        .ok_or_else(|| ConvoyError::InvalidAnswer {
            job: ctx.name().to_string(),
            reason: format!("option {} out of range", index),
        })?;
    ctx.set_attribute(CHOICE_ATTRIBUTE, option.value.clone());
    ctx.send(option.label.clone())
}

pub(crate) async fn run_choice(ctx: &JobContext, field: &ChoiceField) -> Result<()> {
    let spec = ctx.spec();
    let mut focused = field.focused;

    if let Some(detect) = &field.autodetect {
        match detect(ctx.clone()).await {
            Ok(Some(hint)) => match field.index_of(&hint) {
                Some(index) if spec.is_autofinish() => return accept_choice(ctx, field, index),
                Some(index) => focused = index,
                None => debug!(job = %ctx.name(), %hint, "autodetected value is not an option"),
            },
            Ok(None) => {}
            Err(e) if spec.tolerates(e.kind()) => {
                debug!(job = %ctx.name(), error = %e, "autodetection failed");
            }
            Err(e) => return Err(e),
        }
    }

    loop {
        let prompt =
            Prompt::choice(field.question.clone(), field.options.clone()).focused(focused);
        let answer = ctx.add_prompt(prompt).await?;
        let index = match &answer {
            Answer::Choice { index, .. } if *index < field.options.len() => Some(*index),
            Answer::Choice { .. } => None,
            Answer::Text(text) => field.index_of(text.trim()),
        };
        match index {
            Some(index) => {
                ctx.clear_warnings();
                return accept_choice(ctx, field, index);
            }
            None => ctx.warn(format!("'{}' is not one of the options", answer.text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds() -> ChoiceField {
        ChoiceField::new(
            "Type?",
            [
                ChoiceOption::new("Movie", "movie"),
                ChoiceOption::new("Season", "season"),
                ChoiceOption::new("Episode", "episode"),
            ],
        )
    }

    #[test]
    fn test_index_of_matches_label_or_value() {
        let field = kinds();
        assert_eq!(field.index_of("Season"), Some(1));
        assert_eq!(field.index_of("episode"), Some(2));
        assert_eq!(field.index_of("MOVIE"), Some(0));
        assert_eq!(field.index_of("documentary"), None);
    }

    #[test]
    fn test_focus_ignores_unknown_hint() {
        assert_eq!(kinds().focus("episode").focused, 2);
        assert_eq!(kinds().focus("nope").focused, 0);
    }

    #[test]
    fn test_empty_text_requires_no_output_is_ok() {
        let strict = JobSpec::text("t", TextField::new("Q"));
        let lenient = JobSpec::text("t", TextField::new("Q")).no_output_is_ok(true);
        assert!(check_text(&strict, "").is_err());
        assert!(check_text(&lenient, "").is_ok());
        assert!(check_text(&strict, "value").is_ok());
    }
}
