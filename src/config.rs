//! Loading prompt/catalog configuration from TOML.
//!
//! Every field is optional; missing ones keep the built-in defaults, so a file that only
//! overrides `prompts.solve_system` is valid. See `AgentConfig` and `Prompts`.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::AnalysisMode;

pub const DEFAULT_LANGUAGE: &str = "Python";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
  pub prompts: Prompts,
  /// Languages offered to the user; submissions must use one of these.
  pub languages: Vec<String>,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      prompts: Prompts::default(),
      languages: ["C++", "Java", "Python", "JavaScript", "Go", "Rust"]
        .into_iter()
        .map(String::from)
        .collect(),
    }
  }
}

impl AgentConfig {
  /// Case-insensitive lookup; returns the configured spelling.
  pub fn resolve_language(&self, language: &str) -> Option<&str> {
    let wanted = language.trim();
    self
      .languages
      .iter()
      .find(|l| l.eq_ignore_ascii_case(wanted))
      .map(String::as_str)
  }
}

/// Prompts used by the model client. Templates use `{name}` placeholders.
///
/// Solve template: `{problem} {constraints} {language} {language_tag} {code} {request}`.
/// Correction template: `{problem} {constraints} {language} {language_tag} {incorrect_code} {accepted_code}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub solve_system: String,
  pub solve_user_template: String,
  pub correction_system: String,
  pub correction_user_template: String,
  pub ocr_instruction: String,
  // Per-mode request line, also shown as the mode description.
  pub suggest_algorithm: String,
  pub find_and_fix_bugs: String,
  pub optimize_performance: String,
  pub explain_code: String,
}

impl Prompts {
  pub fn instruction_for(&self, mode: AnalysisMode) -> &str {
    match mode {
      AnalysisMode::SuggestAlgorithm => &self.suggest_algorithm,
      AnalysisMode::FindAndFixBugs => &self.find_and_fix_bugs,
      AnalysisMode::OptimizePerformance => &self.optimize_performance,
      AnalysisMode::ExplainCode => &self.explain_code,
    }
  }
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      solve_system: SOLVE_SYSTEM.trim().into(),
      solve_user_template: SOLVE_USER_TEMPLATE.trim().into(),
      correction_system: CORRECTION_SYSTEM.trim().into(),
      correction_user_template: CORRECTION_USER_TEMPLATE.trim().into(),
      ocr_instruction: OCR_INSTRUCTION.trim().into(),
      suggest_algorithm: "Based on the problem, suggest suitable algorithms and data structures. Provide a boilerplate implementation.".into(),
      find_and_fix_bugs: "Analyze the code for logical errors, syntax issues, and edge cases. Provide a corrected version.".into(),
      optimize_performance: "Improve the time and space complexity of the solution. Provide a more efficient implementation.".into(),
      explain_code: "Provide a detailed, line-by-line explanation of the provided code and its logic.".into(),
    }
  }
}

const SOLVE_SYSTEM: &str = r#"
You are a Legendary Grandmaster of competitive programming, coaching a contestant one on one.
Reason from first principles: reduce every problem to its core and surface the non-obvious
observation that unlocks an efficient solution.

Coding rules:
- Write idiomatic code for the requested language (STL in C++, Pythonic Python, ...).
- In C++ and Java use 64-bit integers wherever sums or products may overflow 32 bits, and say why in a comment.
- Include fast I/O boilerplate where input size makes it matter.
- Keep code short and clean; use conventional contest names (i, j, n, m, res).

Before answering, challenge your own insight, try to break your algorithm the way a rival would,
and prefer the simplest structure that reaches the optimal complexity.
"#;

const SOLVE_USER_TEMPLATE: &str = r#"
**Problem Statement:**
---
{problem}
---

**Problem Constraints:**
---
{constraints}
---

**Programming Language:** {language}

**User's Code Submission:**
---
```{language_tag}
{code}
```
---

**Specific Request:** {request}

Answer in clean Markdown with exactly these sections:

## 1. Problem Deconstruction & Core Insight
One-sentence core, the key observation, and the algorithmic paradigm.

## 2. Algorithmic Walkthrough & Justification
Step-by-step algorithm, why it is correct and fast enough for the constraints, role of each data structure.

## 3. Champion-Grade Code
Full solution in {language} inside one fenced block. If the user sent code, first point out its flaws.

## 4. Complexity Analysis
Time and space, justified.

## 5. Corner Cases & Edge Case Analysis
Edge cases and how the code handles each.

## 6. Alternative Strategies & Why They're Inferior
Other approaches and the constraint that rules each out.
"#;

const CORRECTION_SYSTEM: &str = r#"
You are a competitive programming Grandmaster reviewing your own mistake. You previously gave an
incorrect solution; you now have the user's accepted code. Analyse precisely and humbly where your
reasoning went wrong, focusing on the conceptual misunderstanding behind the flawed code.
"#;

const CORRECTION_USER_TEMPLATE: &str = r#"
**Original Problem Statement:**
---
{problem}
---

**Problem Constraints:**
---
{constraints}
---

**Language:** {language}

**Your Incorrect Code:**
---
```{language_tag}
{incorrect_code}
```
---

**User's Accepted (AC) Code:**
---
```{language_tag}
{accepted_code}
```
---

Answer in clean Markdown with exactly these sections:

## 1. Core Flaw Identification
The fundamental logical error, in one sentence.

## 2. Side-by-Side Comparison
The exact lines where your logic diverged, and why the accepted code is right there.

## 3. Conceptual Misunderstanding
The algorithmic concept or data-structure property you misapplied or overlooked.

## 4. Key Learning
A rule or heuristic you will apply to similar problems from now on.
"#;

const OCR_INSTRUCTION: &str = r#"
You are a highly accurate OCR engine for competitive programming problems. Extract all text from
this image. Pay close attention to special characters, mathematical symbols, numbers and code.
Preserve line breaks and indentation. Return only the extracted text, without commentary.
"#;

/// Parse a TOML document into `AgentConfig`.
pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "grandmaster_backend", %path, languages = cfg.languages.len(), "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "grandmaster_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "grandmaster_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
