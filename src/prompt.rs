//! Prompt assembly for the two Markdown-producing model calls.

use crate::config::Prompts;
use crate::domain::{CorrectionRequest, ProblemInput};
use crate::util::{fill_template, or_placeholder};

const NO_CONSTRAINTS_SOLVE: &str = "No constraints provided. Assume standard competitive programming limits (e.g., N <= 10^5, time limit 1-2 seconds).";
const NO_CONSTRAINTS: &str = "No constraints provided.";
const NO_CODE: &str = "// No code provided.";
const NO_PREVIOUS_CODE: &str = "// Your previous code was not found in the output.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

pub fn solve_prompt(prompts: &Prompts, input: &ProblemInput) -> PromptPair {
    let language_tag = input.language.to_lowercase();
    let user = fill_template(
        &prompts.solve_user_template,
        &[
            ("problem", input.problem.as_str()),
            ("constraints", or_placeholder(&input.constraints, NO_CONSTRAINTS_SOLVE)),
            ("language", input.language.as_str()),
            ("language_tag", language_tag.as_str()),
            ("code", or_placeholder(&input.code, NO_CODE)),
            ("request", prompts.instruction_for(input.mode)),
        ],
    );
    PromptPair { system: prompts.solve_system.clone(), user }
}

pub fn correction_prompt(prompts: &Prompts, req: &CorrectionRequest) -> PromptPair {
    let language_tag = req.language.to_lowercase();
    let user = fill_template(
        &prompts.correction_user_template,
        &[
            ("problem", req.problem.as_str()),
            ("constraints", or_placeholder(&req.constraints, NO_CONSTRAINTS)),
            ("language", req.language.as_str()),
            ("language_tag", language_tag.as_str()),
            ("incorrect_code", or_placeholder(&req.incorrect_code, NO_PREVIOUS_CODE)),
            ("accepted_code", req.accepted_code.as_str()),
        ],
    );
    PromptPair { system: prompts.correction_system.clone(), user }
}
