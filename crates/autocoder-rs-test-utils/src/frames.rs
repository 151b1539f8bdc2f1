//! Server frame builders.

use serde_json::{Value, json};

pub fn text(content: &str) -> Value {
    json!({ "type": "text", "content": content })
}

pub fn tool_call(tool: &str) -> Value {
    json!({ "type": "tool_call", "tool": tool, "input": {} })
}

pub fn response_done() -> Value {
    json!({ "type": "response_done" })
}

pub fn error(content: &str) -> Value {
    json!({ "type": "error", "content": content })
}

pub fn conversation_created(conversation_id: i64) -> Value {
    json!({ "type": "conversation_created", "conversation_id": conversation_id })
}

pub fn log(line: &str) -> Value {
    json!({ "type": "log", "line": line, "timestamp": "2024-05-01T10:00:00Z" })
}

pub fn progress(passing: u32, in_progress: u32, total: u32) -> Value {
    let percentage = if total == 0 {
        0.0
    } else {
        f64::from(passing) * 100.0 / f64::from(total)
    };
    json!({
        "type": "progress",
        "passing": passing,
        "in_progress": in_progress,
        "total": total,
        "percentage": percentage,
    })
}

pub fn agent_status(status: &str) -> Value {
    json!({ "type": "agent_status", "status": status })
}

pub fn feature_update(feature_id: i64, passes: bool) -> Value {
    json!({ "type": "feature_update", "feature_id": feature_id, "passes": passes })
}
