//! Keyword-based goal classification.

use crate::models::{Complexity, GoalAnalysis, GoalKind};

const RESEARCH_KEYWORDS: &[&str] = &[
    "research",
    "find",
    "search",
    "what is",
    "tell me about",
    "information",
    "latest",
];

const CODE_KEYWORDS: &[&str] = &[
    "code",
    "program",
    "script",
    "function",
    "algorithm",
    "implement",
    "develop",
];

const EDUCATIONAL_KEYWORDS: &[&str] = &[
    "learn",
    "explain",
    "how does",
    "tutorial",
    "guide",
    "teach",
    "understand",
];

const PROBLEM_KEYWORDS: &[&str] = &["solve", "help", "fix", "debug", "error", "problem", "issue"];

pub(crate) fn mentions(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// Classify a goal by substring matches on its lowercase form.
///
/// Groups are checked research, coding, educational, problem solving;
/// each match sets its flag and overwrites the kind.
pub fn analyze_goal(goal: &str) -> GoalAnalysis {
    let lowered = goal.to_lowercase();
    let mut analysis = GoalAnalysis {
        keywords: lowered.split_whitespace().map(str::to_string).collect(),
        ..Default::default()
    };

    if mentions(&lowered, RESEARCH_KEYWORDS) {
        analysis.needs_research = true;
        analysis.kind = GoalKind::Research;
    }
    if mentions(&lowered, CODE_KEYWORDS) {
        analysis.needs_code = true;
        analysis.kind = GoalKind::Coding;
    }
    if mentions(&lowered, EDUCATIONAL_KEYWORDS) {
        analysis.is_educational = true;
        analysis.kind = GoalKind::Educational;
    }
    if mentions(&lowered, PROBLEM_KEYWORDS) {
        analysis.is_problem_solving = true;
        analysis.kind = GoalKind::ProblemSolving;
    }

    let words = goal.split_whitespace().count();
    analysis.complexity = if words > 20 {
        Complexity::High
    } else if words < 5 {
        Complexity::Low
    } else {
        Complexity::Medium
    };

    analysis
}
