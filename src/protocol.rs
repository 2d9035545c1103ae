//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, DEFAULT_LANGUAGE};
use crate::domain::{AnalysisMode, AnswerRecord, ProblemInput, Verdict};
use crate::feedback::{Feedback, FeedbackState};
use crate::markdown::ContentBlock;

/// Problem form fields, shared by the HTTP body and the WS message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemIn {
    pub problem: String,
    #[serde(default)]
    pub constraints: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub analysis_type: AnalysisMode,
}

impl ProblemIn {
    pub fn into_input(self) -> ProblemInput {
        ProblemInput {
            problem: self.problem,
            constraints: self.constraints,
            code: self.code,
            language: self.language.unwrap_or_else(|| DEFAULT_LANGUAGE.into()),
            mode: self.analysis_type,
        }
    }
}

/// Messages the client can send over WebSocket. The connection is the session.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    SetApiKey {
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    Solve(ProblemIn),
    Feedback {
        #[serde(rename = "answerId")]
        answer_id: String,
        verdict: Verdict,
    },
    SubmitCorrection {
        #[serde(rename = "answerId")]
        answer_id: String,
        #[serde(rename = "acceptedCode")]
        accepted_code: String,
    },
    ExtractImage {
        image: String,
        #[serde(default)]
        mime: Option<String>,
        #[serde(default, rename = "currentProblem")]
        current_problem: String,
    },
    Render {
        content: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    CredentialSaved,
    Answer {
        answer: AnswerOut,
    },
    Feedback {
        #[serde(rename = "answerId")]
        answer_id: String,
        feedback: FeedbackOut,
    },
    Extracted {
        text: String,
        problem: String,
    },
    Rendered {
        blocks: Vec<ContentBlock>,
    },
    Error {
        error: &'static str,
        message: String,
    },
}

/// DTO used by both WS and HTTP for answer delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOut {
    pub answer_id: String,
    pub generation: u64,
    pub language: String,
    pub markdown: String,
    pub blocks: Vec<ContentBlock>,
    pub feedback: FeedbackOut,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOut {
    pub state: FeedbackState,
    pub draft: String,
    pub learning: bool,
    pub analysis: Option<String>,
    pub analysis_blocks: Vec<ContentBlock>,
}

pub fn answer_out(a: &AnswerRecord) -> AnswerOut {
    AnswerOut {
        answer_id: a.id.clone(),
        generation: a.generation,
        language: a.input.language.clone(),
        markdown: a.markdown.clone(),
        blocks: a.blocks.clone(),
        feedback: feedback_out(&a.feedback),
    }
}

pub fn feedback_out(f: &Feedback) -> FeedbackOut {
    FeedbackOut {
        state: f.state(),
        draft: f.draft().to_string(),
        learning: f.is_learning(),
        analysis: f.analysis().map(|a| a.markdown.clone()),
        analysis_blocks: f.analysis().map(|a| a.blocks.clone()).unwrap_or_default(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIn {
    pub session_id: String,
    #[serde(flatten)]
    pub problem: ProblemIn,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackIn {
    pub session_id: String,
    pub answer_id: String,
    pub verdict: Verdict,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionIn {
    pub session_id: String,
    pub answer_id: String,
    pub accepted_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReplyOut {
    pub answer_id: String,
    pub feedback: FeedbackOut,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractIn {
    pub session_id: String,
    /// `data:` URL, or bare base64 together with `mime`.
    pub image: String,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub current_problem: String,
}
#[derive(Serialize)]
pub struct ExtractOut {
    pub text: String,
    pub problem: String,
}

#[derive(Deserialize)]
pub struct RenderIn {
    pub content: String,
}
#[derive(Serialize)]
pub struct RenderOut {
    pub blocks: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialIn {
    pub api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeOut {
    pub value: AnalysisMode,
    pub label: &'static str,
    pub description: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsOut {
    pub languages: Vec<String>,
    pub default_language: &'static str,
    pub analysis_modes: Vec<ModeOut>,
    pub default_analysis_type: AnalysisMode,
}

pub fn options_out(cfg: &AgentConfig) -> OptionsOut {
    OptionsOut {
        languages: cfg.languages.clone(),
        default_language: DEFAULT_LANGUAGE,
        analysis_modes: AnalysisMode::ALL
            .into_iter()
            .map(|m| ModeOut {
                value: m,
                label: m.label(),
                description: cfg.prompts.instruction_for(m).to_string(),
            })
            .collect(),
        default_analysis_type: AnalysisMode::default(),
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthOut {
    pub ok: bool,
    pub has_api_key: bool,
}
