//! Domain models: analysis modes, problem submissions, and the per-answer record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feedback::Feedback;
use crate::markdown::{first_code_block, segment, ContentBlock};

/// What the user wants done with the problem (and their code, if any).
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
  #[default]
  #[serde(alias = "suggest")]
  SuggestAlgorithm,
  #[serde(alias = "debug")]
  FindAndFixBugs,
  #[serde(alias = "optimize")]
  OptimizePerformance,
  #[serde(alias = "explain")]
  ExplainCode,
}

impl AnalysisMode {
  pub const ALL: [AnalysisMode; 4] = [
    AnalysisMode::SuggestAlgorithm,
    AnalysisMode::FindAndFixBugs,
    AnalysisMode::OptimizePerformance,
    AnalysisMode::ExplainCode,
  ];

  pub fn label(self) -> &'static str {
    match self {
      AnalysisMode::SuggestAlgorithm => "Suggest Algorithm",
      AnalysisMode::FindAndFixBugs => "Find & Fix Bugs",
      AnalysisMode::OptimizePerformance => "Optimize Performance",
      AnalysisMode::ExplainCode => "Explain Code",
    }
  }
}

/// User's verdict on a displayed answer.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Correct,
  Incorrect,
}

/// One problem submission. `constraints` and `code` may be empty.
#[derive(Clone, Debug)]
pub struct ProblemInput {
  pub problem: String,
  pub constraints: String,
  pub code: String,
  pub language: String,
  pub mode: AnalysisMode,
}

/// Payload of a corrective-analysis call.
#[derive(Clone, Debug)]
pub struct CorrectionRequest {
  pub problem: String,
  pub constraints: String,
  pub language: String,
  /// First fenced block of the rejected answer; empty when it had none.
  pub incorrect_code: String,
  pub accepted_code: String,
}

/// Decoded image ready to be sent for transcription.
#[derive(Clone, Debug)]
pub struct ImageInput {
  pub bytes: Vec<u8>,
  pub mime: String,
}

/// A rendered answer plus its own feedback cycle.
#[derive(Clone, Debug)]
pub struct AnswerRecord {
  pub id: String,
  /// Solve generation this answer was produced by.
  pub generation: u64,
  pub input: ProblemInput,
  pub markdown: String,
  pub blocks: Vec<ContentBlock>,
  pub feedback: Feedback,
}

impl AnswerRecord {
  pub fn new(generation: u64, input: ProblemInput, markdown: String) -> Self {
    let blocks = segment(&markdown);
    Self {
      id: Uuid::new_v4().to_string(),
      generation,
      input,
      markdown,
      blocks,
      feedback: Feedback::new(),
    }
  }

  /// Code the model proposed, taken from the already-segmented reply.
  pub fn incorrect_code(&self) -> Option<&str> {
    first_code_block(&self.blocks)
  }
}
