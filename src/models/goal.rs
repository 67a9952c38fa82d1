//! Goal, response and conversation types for the assistant.
//!
//! K_i: These types represent the data flowing through a goal execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classified kind of a goal.
///
/// K_i: When several keyword groups match, the last group checked wins
/// (research → coding → educational → problem solving).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalKind {
    #[default]
    General,
    Research,
    Coding,
    Educational,
    ProblemSolving,
}

impl GoalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Research => "research",
            Self::Coding => "coding",
            Self::Educational => "educational",
            Self::ProblemSolving => "problem_solving",
        }
    }
}

/// Rough size of a goal by word count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

/// Result of classifying a goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalAnalysis {
    pub kind: GoalKind,
    pub needs_research: bool,
    pub needs_code: bool,
    pub is_educational: bool,
    pub is_problem_solving: bool,
    pub complexity: Complexity,
    /// Lowercased whitespace-separated words of the goal
    pub keywords: Vec<String>,
}

/// Metadata attached to a goal response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub session_id: String,
    pub goal_type: GoalKind,

    /// Number of research sources that returned results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_sources: Option<usize>,

    pub response_length: usize,
    pub suggestions_count: usize,
    pub conversation_turn: usize,
    pub processing_time_ms: u64,
}

/// Markdown response to a goal plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalResponse {
    pub content: String,
    pub metadata: ResponseMetadata,
}

/// One user turn in a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    pub user_input: String,
    pub session_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_response: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

/// Summary of the last goal handled in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMemory {
    pub last_goal: String,
    pub last_response_length: usize,
    pub goal_type: GoalKind,
    pub timestamp: DateTime<Utc>,
}

/// Public view of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub turns: usize,
}
