//! Payloads describing agent progress and structured questions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of the coding agent attached to a project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Stopped,
    Running,
    Paused,
    Crashed,
}

/// Feature completion counters pushed by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ProgressSnapshot {
    pub passing: u32,
    pub in_progress: u32,
    pub total: u32,
    pub percentage: f64,
}

/// Structured question raised by the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecQuestion {
    pub question: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, rename = "multiSelect", alias = "multi_select")]
    pub multi_select: bool,
}

/// Selectable option of a [`SpecQuestion`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Answer to a single question: one choice or several.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerValue {
    One(String),
    Many(Vec<String>),
}

/// Answers keyed by question index; serialized with string keys.
pub type Answers = BTreeMap<usize, AnswerValue>;
