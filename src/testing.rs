//! In-process stand-in for the model API, shared by the logic, route and WS tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::AgentConfig;
use crate::domain::{AnalysisMode, CorrectionRequest, ImageInput, ProblemInput};
use crate::error::AppError;
use crate::openai::Collaborator;
use crate::state::AppState;

pub const TWO_SUM_REPLY: &str = "## 1. Problem Deconstruction & Core Insight\n\
**One-Sentence Core:** find two indices summing to target.\n\
## 2. Algorithmic Walkthrough & Justification\n\
* Keep a hash map of seen values.\n\
## 3. Champion-Grade Code\n\
```python\ndef two_sum(nums, target):\n    seen = {}\n    return []\n```\n\
## 4. Complexity Analysis\nO(N).\n\
## 5. Corner Cases & Edge Case Analysis\n* Empty input.\n\
## 6. Alternative Strategies & Why They're Inferior\nBrute force is O(N^2).\n";

/// Records every call. These block until `release` is notified:
///   - a solve for the problem "slow"
///   - a correction whose accepted code starts with "slow"
///   - a transcription of an `image/gif`
#[derive(Default)]
pub struct MockCollaborator {
  pub solves: Mutex<Vec<ProblemInput>>,
  pub corrections: Mutex<Vec<CorrectionRequest>>,
  pub images: Mutex<Vec<String>>,
  pub fail_corrections: Mutex<usize>,
  pub reply_without_code: bool,
  pub entered: Notify,
  pub release: Notify,
}

impl MockCollaborator {
  async fn hold(&self) {
    self.entered.notify_one();
    self.release.notified().await;
  }
}

#[async_trait]
impl Collaborator for MockCollaborator {
  async fn generate_solution(&self, input: &ProblemInput) -> Result<String, AppError> {
    self.solves.lock().unwrap().push(input.clone());
    if input.problem == "slow" {
      self.hold().await;
      return Ok("## stale".into());
    }
    if self.reply_without_code {
      return Ok("## No code\nJust prose.".into());
    }
    Ok(TWO_SUM_REPLY.into())
  }

  async fn generate_corrective_analysis(&self, req: &CorrectionRequest) -> Result<String, AppError> {
    self.corrections.lock().unwrap().push(req.clone());
    if req.accepted_code.starts_with("slow") {
      self.hold().await;
    }
    let failed = {
      let mut failures = self.fail_corrections.lock().unwrap();
      let failed = *failures > 0;
      if failed {
        *failures -= 1;
      }
      failed
    };
    if failed {
      return Err(AppError::Collaborator("quota exceeded".into()));
    }
    Ok("## 1. Core Flaw Identification\nOff by one.".into())
  }

  async fn extract_text_from_image(&self, image: &ImageInput) -> Result<String, AppError> {
    self.images.lock().unwrap().push(image.mime.clone());
    if image.mime == "image/gif" {
      self.hold().await;
    }
    Ok("Given an array of integers...".into())
  }
}

pub fn state_with(mock: MockCollaborator) -> (Arc<AppState>, Arc<MockCollaborator>) {
  let mock = Arc::new(mock);
  let state = AppState::with_collaborator(AgentConfig::default(), Some(mock.clone() as Arc<dyn Collaborator>));
  (Arc::new(state), mock)
}

pub fn problem(text: &str) -> ProblemInput {
  ProblemInput {
    problem: text.into(),
    constraints: String::new(),
    code: String::new(),
    language: "python".into(),
    mode: AnalysisMode::SuggestAlgorithm,
  }
}
