//! Feedback cycle attached to one rendered answer.
//!
//! ```text
//!   pending ──mark_correct──▶ correct
//!      │
//!      └──mark_incorrect──▶ incorrect ──complete_correction──▶ complete
//!                             ▲    │
//!                             └────┘ fail_correction (draft kept)
//! ```
//!
//! A `Feedback` lives inside its `AnswerRecord`; a new answer gets a fresh one, so there
//! is no separate reset operation.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::markdown::{segment, ContentBlock};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackState {
  #[default]
  Pending,
  Correct,
  Incorrect,
  Complete,
}

impl FeedbackState {
  pub fn as_str(self) -> &'static str {
    match self {
      FeedbackState::Pending => "pending",
      FeedbackState::Correct => "correct",
      FeedbackState::Incorrect => "incorrect",
      FeedbackState::Complete => "complete",
    }
  }
}

impl fmt::Display for FeedbackState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackAction {
  MarkCorrect,
  MarkIncorrect,
  SubmitCorrection,
}

impl fmt::Display for FeedbackAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      FeedbackAction::MarkCorrect => "mark the answer correct",
      FeedbackAction::MarkIncorrect => "mark the answer incorrect",
      FeedbackAction::SubmitCorrection => "submit a correction",
    })
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedbackError {
  #[error("cannot {action} while feedback is {state}")]
  InvalidTransition { state: FeedbackState, action: FeedbackAction },
  #[error("Accepted code cannot be empty.")]
  EmptyDraft,
  #[error("A corrective analysis is already in progress.")]
  InFlight,
}

/// Corrective analysis returned by the model, kept raw and segmented.
#[derive(Clone, Debug, Serialize)]
pub struct Analysis {
  pub markdown: String,
  pub blocks: Vec<ContentBlock>,
}

#[derive(Clone, Debug, Default)]
pub struct Feedback {
  state: FeedbackState,
  draft: String,
  analysis: Option<Analysis>,
  learning: bool,
}

impl Feedback {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> FeedbackState {
    self.state
  }

  /// Accepted code typed by the user while the answer is marked incorrect.
  pub fn draft(&self) -> &str {
    &self.draft
  }

  /// Present only once the cycle is `complete`.
  pub fn analysis(&self) -> Option<&Analysis> {
    self.analysis.as_ref()
  }

  /// True while a corrective-analysis call is outstanding.
  pub fn is_learning(&self) -> bool {
    self.learning
  }

  pub fn mark_correct(&mut self) -> Result<(), FeedbackError> {
    self.require(FeedbackState::Pending, FeedbackAction::MarkCorrect)?;
    self.state = FeedbackState::Correct;
    Ok(())
  }

  pub fn mark_incorrect(&mut self) -> Result<(), FeedbackError> {
    self.require(FeedbackState::Pending, FeedbackAction::MarkIncorrect)?;
    self.state = FeedbackState::Incorrect;
    self.draft.clear();
    Ok(())
  }

  /// Validate and record the draft, and mark a correction as in flight.
  /// Returns the draft to send. Rejections leave the machine untouched.
  pub fn begin_correction(&mut self, draft: &str) -> Result<String, FeedbackError> {
    self.require(FeedbackState::Incorrect, FeedbackAction::SubmitCorrection)?;
    if self.learning {
      return Err(FeedbackError::InFlight);
    }
    if draft.trim().is_empty() {
      return Err(FeedbackError::EmptyDraft);
    }
    self.draft = draft.to_string();
    self.learning = true;
    Ok(self.draft.clone())
  }

  pub fn complete_correction(&mut self, markdown: String) -> Result<(), FeedbackError> {
    self.require(FeedbackState::Incorrect, FeedbackAction::SubmitCorrection)?;
    if !self.learning {
      return Err(FeedbackError::InvalidTransition {
        state: self.state,
        action: FeedbackAction::SubmitCorrection,
      });
    }
    let blocks = segment(&markdown);
    self.analysis = Some(Analysis { markdown, blocks });
    self.state = FeedbackState::Complete;
    self.learning = false;
    Ok(())
  }

  /// The call failed: stay `incorrect` with the draft intact so the user can retry.
  pub fn fail_correction(&mut self) {
    self.learning = false;
  }

  fn require(&self, expected: FeedbackState, action: FeedbackAction) -> Result<(), FeedbackError> {
    if self.state == expected {
      Ok(())
    } else {
      Err(FeedbackError::InvalidTransition { state: self.state, action })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starts_pending() {
    let fb = Feedback::new();
    assert_eq!(fb.state(), FeedbackState::Pending);
    assert!(fb.analysis().is_none());
    assert!(!fb.is_learning());
  }

  #[test]
  fn correct_is_terminal() {
    let mut fb = Feedback::new();
    fb.mark_correct().unwrap();
    assert_eq!(fb.state(), FeedbackState::Correct);
    assert_eq!(
      fb.mark_incorrect(),
      Err(FeedbackError::InvalidTransition {
        state: FeedbackState::Correct,
        action: FeedbackAction::MarkIncorrect
      })
    );
    assert!(fb.mark_correct().is_err());
    assert_eq!(fb.state(), FeedbackState::Correct);
  }

  #[test]
  fn incorrect_clears_draft_and_accepts_submission() {
    let mut fb = Feedback::new();
    fb.mark_incorrect().unwrap();
    assert_eq!(fb.draft(), "");
    let sent = fb.begin_correction("def two_sum(a, t): ...").unwrap();
    assert_eq!(sent, "def two_sum(a, t): ...");
    assert!(fb.is_learning());
    fb.complete_correction("## Core Flaw\nGreedy was wrong.".into()).unwrap();
    assert_eq!(fb.state(), FeedbackState::Complete);
    assert!(!fb.is_learning());
    let analysis = fb.analysis().unwrap();
    assert_eq!(analysis.blocks[0], ContentBlock::Heading { level: 2, text: "Core Flaw".into() });
  }

  #[test]
  fn blank_draft_is_rejected_without_side_effects() {
    let mut fb = Feedback::new();
    fb.mark_incorrect().unwrap();
    assert_eq!(fb.begin_correction("  \n\t"), Err(FeedbackError::EmptyDraft));
    assert!(!fb.is_learning());
    assert_eq!(fb.state(), FeedbackState::Incorrect);
  }

  #[test]
  fn second_submission_while_learning_is_rejected() {
    let mut fb = Feedback::new();
    fb.mark_incorrect().unwrap();
    fb.begin_correction("a").unwrap();
    assert_eq!(fb.begin_correction("b"), Err(FeedbackError::InFlight));
    assert_eq!(fb.draft(), "a");
  }

  #[test]
  fn failure_keeps_draft_for_retry() {
    let mut fb = Feedback::new();
    fb.mark_incorrect().unwrap();
    fb.begin_correction("accepted();").unwrap();
    fb.fail_correction();
    assert_eq!(fb.state(), FeedbackState::Incorrect);
    assert_eq!(fb.draft(), "accepted();");
    assert!(!fb.is_learning());
    assert!(fb.begin_correction("accepted();").is_ok());
  }

  #[test]
  fn submission_requires_incorrect() {
    let mut fb = Feedback::new();
    assert!(matches!(
      fb.begin_correction("code"),
      Err(FeedbackError::InvalidTransition { state: FeedbackState::Pending, .. })
    ));
    assert!(fb.complete_correction("x".into()).is_err());
  }

  #[test]
  fn complete_rejects_reentry() {
    let mut fb = Feedback::new();
    fb.mark_incorrect().unwrap();
    fb.begin_correction("x").unwrap();
    fb.complete_correction("done".into()).unwrap();
    assert!(fb.begin_correction("x").is_err());
    assert!(fb.mark_incorrect().is_err());
  }
}
