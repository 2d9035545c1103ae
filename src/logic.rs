//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Solving a problem (generation-tagged; late replies from superseded solves are dropped)
//!   - Recording the user's verdict on the current answer
//!   - Submitting accepted code for a corrective analysis
//!   - Transcribing an uploaded image into problem text
//!
//! Corrections and transcriptions set an in-flight marker. The model call and the step
//! that clears the marker run in a spawned task, so a caller that goes away mid-call
//! (client disconnect, timeout) never leaves the marker set.

use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::domain::{AnswerRecord, CorrectionRequest, ProblemInput, Verdict};
use crate::error::AppError;
use crate::feedback::Feedback;
use crate::state::AppState;
use crate::util::{merge_extracted, parse_image};

/// Result of an image transcription: the raw text and the merged problem field.
#[derive(Debug, Clone)]
pub struct Extraction {
  pub text: String,
  pub problem: String,
}

#[instrument(level = "info", skip(state, input), fields(%session_id, language = %input.language, mode = ?input.mode))]
pub async fn solve(state: &AppState, session_id: &str, mut input: ProblemInput) -> Result<AnswerRecord, AppError> {
  let collaborator = state.collaborator().await?;
  if input.problem.trim().is_empty() {
    return Err(AppError::Validation("Problem description cannot be empty.".into()));
  }
  input.language = state
    .config
    .resolve_language(&input.language)
    .ok_or_else(|| AppError::Validation(format!("Unsupported language: {}", input.language)))?
    .to_string();

  // Dispatch: bump the generation and drop the previous answer with its feedback cycle.
  let generation = state
    .with_session(session_id, |s| {
      s.generation += 1;
      s.answer = None;
      Ok(s.generation)
    })
    .await?;
  info!(target: "solve", %session_id, generation, problem_len = input.problem.len(), "Solve dispatched");

  let result = collaborator.generate_solution(&input).await;

  state
    .with_session(session_id, |s| {
      if s.generation != generation {
        warn!(target: "solve", %session_id, generation, current = s.generation, "Dropping reply from superseded solve");
        return Err(AppError::Superseded(generation));
      }
      let markdown = result.map_err(|e| {
        error!(target: "solve", %session_id, generation, error = %e, "Solve failed");
        e
      })?;
      let answer = AnswerRecord::new(generation, input, markdown);
      info!(target: "solve", %session_id, generation, answer_id = %answer.id, blocks = answer.blocks.len(), "Answer installed");
      s.answer = Some(answer.clone());
      Ok(answer)
    })
    .await
}

#[instrument(level = "info", skip(state), fields(%session_id, %answer_id))]
pub async fn mark_feedback(
  state: &AppState,
  session_id: &str,
  answer_id: &str,
  verdict: Verdict,
) -> Result<Feedback, AppError> {
  state
    .with_session(session_id, |s| {
      let answer = s.answer_mut(answer_id)?;
      match verdict {
        Verdict::Correct => answer.feedback.mark_correct()?,
        Verdict::Incorrect => answer.feedback.mark_incorrect()?,
      }
      info!(target: "feedback", %answer_id, state = %answer.feedback.state(), "Verdict recorded");
      Ok(answer.feedback.clone())
    })
    .await
}

#[instrument(level = "info", skip(state, accepted_code), fields(%session_id, %answer_id, accepted_len = accepted_code.len()))]
pub async fn submit_correction(
  state: &Arc<AppState>,
  session_id: &str,
  answer_id: &str,
  accepted_code: &str,
) -> Result<Feedback, AppError> {
  let collaborator = state.collaborator().await?;

  let req = state
    .with_session(session_id, |s| {
      let answer = s.answer_mut(answer_id)?;
      let accepted_code = answer.feedback.begin_correction(accepted_code)?;
      let incorrect_code = match answer.incorrect_code() {
        Some(code) => code.to_string(),
        None => {
          warn!(target: "feedback", %answer_id, "Answer has no fenced code; sending placeholder as incorrect code");
          String::new()
        }
      };
      Ok(CorrectionRequest {
        problem: answer.input.problem.clone(),
        constraints: answer.input.constraints.clone(),
        language: answer.input.language.clone(),
        incorrect_code,
        accepted_code,
      })
    })
    .await?;
  debug!(target: "feedback", %answer_id, incorrect_len = req.incorrect_code.len(), "Corrective analysis dispatched");

  let state = Arc::clone(state);
  let session_id = session_id.to_string();
  let answer_id = answer_id.to_string();
  let task = tokio::spawn(
    async move {
      let result = collaborator.generate_corrective_analysis(&req).await;
      apply_correction(&state, &session_id, &answer_id, result).await
    }
    .in_current_span(),
  );
  task.await.map_err(task_failed)?
}

/// Settle the in-flight correction started by `submit_correction`.
async fn apply_correction(
  state: &AppState,
  session_id: &str,
  answer_id: &str,
  result: Result<String, AppError>,
) -> Result<Feedback, AppError> {
  state
    .with_session(session_id, |s| {
      let current = s.generation;
      let answer = s.answer_mut(answer_id).map_err(|_| {
        warn!(target: "feedback", %answer_id, "Answer replaced while analysing; dropping result");
        AppError::Superseded(current)
      })?;
      match result {
        Ok(markdown) => {
          answer.feedback.complete_correction(markdown)?;
          info!(target: "feedback", %answer_id, "Corrective analysis complete");
          Ok(answer.feedback.clone())
        }
        Err(e) => {
          answer.feedback.fail_correction();
          error!(target: "feedback", %answer_id, error = %e, "Corrective analysis failed; draft kept");
          Err(e)
        }
      }
    })
    .await
}

#[instrument(level = "info", skip(state, payload, current_problem), fields(%session_id, payload_len = payload.len()))]
pub async fn extract_image(
  state: &Arc<AppState>,
  session_id: &str,
  payload: &str,
  mime: Option<&str>,
  current_problem: &str,
) -> Result<Extraction, AppError> {
  let collaborator = state.collaborator().await?;
  let image = parse_image(payload, mime)?;

  state
    .with_session(session_id, |s| {
      if s.extracting {
        return Err(AppError::Busy("An image is already being transcribed."));
      }
      s.extracting = true;
      Ok(())
    })
    .await?;

  let task = {
    let state = Arc::clone(state);
    let session_id = session_id.to_string();
    tokio::spawn(
      async move {
        let result = collaborator.extract_text_from_image(&image).await;
        // The session may be gone by now; the flag only matters if it is not.
        let _ = state
          .with_session(&session_id, |s| {
            s.extracting = false;
            Ok(())
          })
          .await;
        result
      }
      .in_current_span(),
    )
  };

  let text = task.await.map_err(task_failed)??;
  info!(target: "grandmaster_backend", %session_id, text_len = text.len(), "Image transcribed");
  Ok(Extraction { problem: merge_extracted(current_problem, &text), text })
}

fn task_failed(e: JoinError) -> AppError {
  error!(target: "grandmaster_backend", error = %e, "Model call task did not finish");
  AppError::Collaborator(format!("The request could not be completed: {e}"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  use crate::config::AgentConfig;
  use crate::feedback::{FeedbackError, FeedbackState};
  use crate::testing::{problem as input, state_with as setup, MockCollaborator};

  /// Poll until the session's background work has settled.
  async fn settled(state: &AppState, sid: &str) {
    for _ in 0..200 {
      let busy = state.with_session(sid, |s| Ok(s.is_busy())).await.unwrap();
      if !busy {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("background work never settled");
  }

  #[tokio::test]
  async fn two_sum_scenario() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;

    let answer = solve(&state, &sid, input("Two Sum")).await.unwrap();
    assert_eq!(answer.input.language, "Python");
    assert!(answer.blocks.iter().any(|b| matches!(
      b,
      crate::markdown::ContentBlock::CodeBlock { language_tag, .. } if language_tag == "python"
    )));
    assert_eq!(answer.feedback.state(), FeedbackState::Pending);

    let fb = mark_feedback(&state, &sid, &answer.id, Verdict::Incorrect).await.unwrap();
    assert_eq!(fb.state(), FeedbackState::Incorrect);

    let fb = submit_correction(&state, &sid, &answer.id, "def two_sum(nums, target): ...").await.unwrap();
    assert_eq!(fb.state(), FeedbackState::Complete);
    assert!(fb.analysis().is_some());

    let calls = mock.corrections.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].incorrect_code, "def two_sum(nums, target):\n    seen = {}\n    return []");
    assert_eq!(calls[0].accepted_code, "def two_sum(nums, target): ...");
    assert_eq!(calls[0].problem, "Two Sum");
  }

  #[tokio::test]
  async fn empty_draft_never_reaches_the_model() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;
    let answer = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mark_feedback(&state, &sid, &answer.id, Verdict::Incorrect).await.unwrap();

    let err = submit_correction(&state, &sid, &answer.id, "   ").await.unwrap_err();
    assert!(matches!(err, AppError::Feedback(FeedbackError::EmptyDraft)));
    assert!(mock.corrections.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn failed_correction_keeps_draft() {
    let (state, mock) = setup(MockCollaborator { fail_corrections: 1.into(), ..Default::default() });
    let sid = state.open_session().await;
    let answer = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mark_feedback(&state, &sid, &answer.id, Verdict::Incorrect).await.unwrap();

    let err = submit_correction(&state, &sid, &answer.id, "accepted()").await.unwrap_err();
    assert!(matches!(err, AppError::Collaborator(_)));
    let (fb_state, draft, learning) = state
      .with_session(&sid, |s| {
        let fb = &s.answer_mut(&answer.id)?.feedback;
        Ok((fb.state(), fb.draft().to_string(), fb.is_learning()))
      })
      .await
      .unwrap();
    assert_eq!(fb_state, FeedbackState::Incorrect);
    assert_eq!(draft, "accepted()");
    assert!(!learning);

    // Retry succeeds.
    let fb = submit_correction(&state, &sid, &answer.id, "accepted()").await.unwrap();
    assert_eq!(fb.state(), FeedbackState::Complete);
    assert_eq!(mock.corrections.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn abandoned_correction_still_settles_and_can_be_retried() {
    let (state, mock) = setup(MockCollaborator { fail_corrections: 1.into(), ..Default::default() });
    let sid = state.open_session().await;
    let answer = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mark_feedback(&state, &sid, &answer.id, Verdict::Incorrect).await.unwrap();

    // The caller gives up while the model call is still running.
    let abandoned =
      tokio::time::timeout(Duration::from_millis(20), submit_correction(&state, &sid, &answer.id, "slow()")).await;
    assert!(abandoned.is_err());

    // Still in flight: a second submission is refused, not queued.
    let err = submit_correction(&state, &sid, &answer.id, "accepted()").await.unwrap_err();
    assert!(matches!(err, AppError::Feedback(FeedbackError::InFlight)));

    // The detached call fails; the marker clears and the draft is kept.
    mock.release.notify_one();
    settled(&state, &sid).await;
    let draft = state
      .with_session(&sid, |s| Ok(s.answer_mut(&answer.id)?.feedback.draft().to_string()))
      .await
      .unwrap();
    assert_eq!(draft, "slow()");

    let fb = submit_correction(&state, &sid, &answer.id, "accepted()").await.unwrap();
    assert_eq!(fb.state(), FeedbackState::Complete);
  }

  #[tokio::test]
  async fn abandoned_extraction_releases_the_session() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;

    let abandoned = tokio::time::timeout(
      Duration::from_millis(20),
      extract_image(&state, &sid, "data:image/gif;base64,R0lG", None, ""),
    )
    .await;
    assert!(abandoned.is_err());
    let err = extract_image(&state, &sid, "data:image/png;base64,aGVsbG8=", None, "").await.unwrap_err();
    assert!(matches!(err, AppError::Busy(_)));

    mock.release.notify_one();
    settled(&state, &sid).await;
    let out = extract_image(&state, &sid, "data:image/png;base64,aGVsbG8=", None, "").await.unwrap();
    assert_eq!(out.problem, "Given an array of integers...");
  }

  #[tokio::test]
  async fn correct_verdict_blocks_incorrect() {
    let (state, _mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;
    let answer = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mark_feedback(&state, &sid, &answer.id, Verdict::Correct).await.unwrap();
    let err = mark_feedback(&state, &sid, &answer.id, Verdict::Incorrect).await.unwrap_err();
    assert!(matches!(err, AppError::Feedback(FeedbackError::InvalidTransition { .. })));
  }

  #[tokio::test]
  async fn missing_code_block_sends_empty_incorrect_code() {
    let (state, mock) = setup(MockCollaborator { reply_without_code: true, ..Default::default() });
    let sid = state.open_session().await;
    let answer = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mark_feedback(&state, &sid, &answer.id, Verdict::Incorrect).await.unwrap();
    submit_correction(&state, &sid, &answer.id, "ok()").await.unwrap();
    assert_eq!(mock.corrections.lock().unwrap()[0].incorrect_code, "");
  }

  #[tokio::test]
  async fn new_solve_resets_feedback() {
    let (state, _mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;
    let first = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mark_feedback(&state, &sid, &first.id, Verdict::Incorrect).await.unwrap();

    let second = solve(&state, &sid, input("Three Sum")).await.unwrap();
    assert_eq!(second.generation, 2);
    assert_eq!(second.feedback.state(), FeedbackState::Pending);
    let err = mark_feedback(&state, &sid, &first.id, Verdict::Correct).await.unwrap_err();
    assert!(matches!(err, AppError::AnswerNotFound(_)));
  }

  #[tokio::test]
  async fn late_reply_from_superseded_solve_is_dropped() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;

    let slow = {
      let state = state.clone();
      let sid = sid.clone();
      tokio::spawn(async move { solve(&state, &sid, input("slow")).await })
    };
    mock.entered.notified().await;

    let fresh = solve(&state, &sid, input("Two Sum")).await.unwrap();
    mock.release.notify_one();
    let stale = slow.await.unwrap();
    assert!(matches!(stale, Err(AppError::Superseded(1))));

    let current = state
      .with_session(&sid, |s| Ok(s.answer.as_ref().map(|a| a.id.clone())))
      .await
      .unwrap();
    assert_eq!(current, Some(fresh.id));
  }

  #[tokio::test]
  async fn validation_happens_before_dispatch() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;
    assert!(matches!(solve(&state, &sid, input("  ")).await, Err(AppError::Validation(_))));
    let mut cobol = input("Two Sum");
    cobol.language = "COBOL".into();
    assert!(matches!(solve(&state, &sid, cobol).await, Err(AppError::Validation(_))));
    assert!(mock.solves.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn credential_is_checked_first() {
    let state = Arc::new(AppState::with_collaborator(AgentConfig::default(), None));
    let sid = state.open_session().await;
    assert!(matches!(solve(&state, &sid, input("Two Sum")).await, Err(AppError::CredentialMissing)));
    assert!(matches!(
      extract_image(&state, &sid, "data:image/png;base64,AA==", None, "").await,
      Err(AppError::CredentialMissing)
    ));
  }

  #[tokio::test]
  async fn image_text_is_merged_into_problem() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;
    let out = extract_image(&state, &sid, "data:image/png;base64,aGVsbG8=", None, "Typed intro").await.unwrap();
    assert_eq!(out.text, "Given an array of integers...");
    assert_eq!(out.problem, "Typed intro\n\n--- From Image ---\nGiven an array of integers...");
    assert_eq!(mock.images.lock().unwrap().as_slice(), ["image/png"]);
    let extracting = state.with_session(&sid, |s| Ok(s.extracting)).await.unwrap();
    assert!(!extracting);
  }

  #[tokio::test]
  async fn undecodable_image_is_rejected_before_the_call() {
    let (state, mock) = setup(MockCollaborator::default());
    let sid = state.open_session().await;
    let err = extract_image(&state, &sid, "not base64 at all", Some("image/png"), "").await.unwrap_err();
    assert!(matches!(err, AppError::Extraction(_)));
    assert!(mock.images.lock().unwrap().is_empty());
  }
}
