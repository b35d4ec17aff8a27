use serde_json::{Value, json};

use review_core::ToolOutcome;

use crate::runtime::ToolRuntime;

/// Records a free-form progress note. Always `ok`; no gating. Event: `agent_status_update`.
pub fn status_update(
    runtime: &mut ToolRuntime,
    step: &str,
    completed: Option<&str>,
    blocked: Option<&str>,
    todo: Option<&str>,
) -> ToolOutcome {
    let record = json!({
        "step": step,
        "completed": completed,
        "blocked": blocked,
        "todo": todo,
    });
    runtime.status_updates.push(record.clone());
    runtime.record_event("agent_status_update", [("step", Value::String(step.to_string()))]);

    let _ = runtime.sync_job_record(|job| {
        job.message = step.to_string();
    });

    ToolOutcome::ok(json!({ "recorded": true, "status_update_count": runtime.status_updates.len() }))
}
