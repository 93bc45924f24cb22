//! Reflection prompt assembly.

use std::fmt::Write;

use ace_contracts::{agent::AgentIdentity, delta::InsightType, trace::ExecutionTrace};

/// Build the single batch request sent to the insight extractor.
pub fn build_prompt(agent: &AgentIdentity, traces: &[ExecutionTrace], playbook_snapshot: &str) -> String {
    let vocabulary = InsightType::EXPECTED
        .iter()
        .map(InsightType::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let serialized = serde_json::to_string_pretty(traces).unwrap_or_else(|_| "[]".to_string());

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are reviewing recent work by the agent \"{}\" to extract reusable lessons.",
        agent.name
    );
    if !agent.objective.is_empty() {
        let _ = writeln!(prompt, "Agent objective: {}", agent.objective);
    }
    if !agent.success_criteria.is_empty() {
        let _ = writeln!(prompt, "Success criteria: {}", agent.success_criteria.join("; "));
    }

    let _ = writeln!(prompt, "\n## Current playbook\n\n{playbook_snapshot}");
    let _ = writeln!(
        prompt,
        "\n## Execution traces ({} total)\n\nEach trace may hold two runs of the same request; \
         compare them when present.\n\n```json\n{serialized}\n```",
        traces.len()
    );
    let _ = writeln!(
        prompt,
        "\n## Instructions\n\n\
         Return a JSON array inside a ```json fenced block. Each element must have:\n\
         - insight_type: one of {vocabulary}\n\
         - title: a short name for the insight\n\
         - description: what was observed\n\
         - recommendation: concrete guidance for future runs\n\
         - evidence: list of {{\"trace_id\", \"execution\", \"example\"}} objects\n\
         - applicability: when the guidance applies\n\
         - priority: 1 (low) to 5 (critical), or null if unsure\n\
         - confidence: 0.0 to 1.0, or null if unsure\n\
         - suggested_action: add_new, update_existing, or mark_harmful\n\n\
         Do not repeat guidance the playbook already contains unless the traces \
         contradict it. Return [] when there is nothing new to learn."
    );
    prompt
}
