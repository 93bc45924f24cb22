//! Human-readable renderings of traces and playbooks.

use std::fmt::Write;

use ace_contracts::{
    playbook::{Playbook, PlaybookBullet},
    trace::{ExecutionStatus, ExecutionTrace},
};

/// Rendered in place of a playbook that has no active bullets.
pub const NO_EXISTING_PLAYBOOK: &str = "no existing playbook";

/// Render the active bullets of a playbook, grouped by category.
///
/// Within a category bullets are ordered by priority, then confidence, then
/// helpful count, all descending. Deprecated bullets are omitted.
pub fn render_playbook_markdown(playbook: &Playbook) -> String {
    if playbook.active_count() == 0 {
        return NO_EXISTING_PLAYBOOK.to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "# Playbook: {}", playbook.agent.name);
    let _ = writeln!(
        out,
        "\nVersion {} | {} active bullets | effectiveness {:.2}",
        playbook.version,
        playbook.active_count(),
        playbook.effectiveness_score
    );

    for (category, bullets) in &playbook.categories {
        let mut active: Vec<&PlaybookBullet> = bullets.iter().filter(|b| b.is_active()).collect();
        if active.is_empty() {
            continue;
        }
        active.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.confidence.total_cmp(&a.confidence))
                .then(b.helpful_count.cmp(&a.helpful_count))
        });

        let _ = writeln!(out, "\n## {}\n", category_heading(category));
        for bullet in active {
            let _ = writeln!(
                out,
                "- **[{}]** {} _(priority {}, confidence {:.2}, helpful {}, harmful {})_",
                bullet.id,
                bullet.content,
                bullet.priority,
                bullet.confidence,
                bullet.helpful_count,
                bullet.harmful_count
            );
        }
    }
    out
}

fn category_heading(category: &str) -> String {
    category
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a trace for manual inspection.
pub fn render_trace_markdown(trace: &ExecutionTrace) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Trace {}", trace.trace_id);
    let _ = writeln!(out, "\n- Agent: {}", trace.agent.name);
    let _ = writeln!(out, "- Created: {}", trace.created_at.to_rfc3339());
    if let Some(parent) = &trace.parent_trace_id {
        let _ = writeln!(out, "- Parent: {parent}");
    }
    if trace.delegation_chain.len() > 1 {
        let chain: Vec<&str> = trace.delegation_chain.iter().map(|h| h.agent.as_str()).collect();
        let _ = writeln!(out, "- Delegation: {}", chain.join(" -> "));
    }

    let _ = writeln!(out, "\n## Request\n\n{}", trace.request);

    for execution in &trace.executions {
        let status = match execution.status {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
        };
        let _ = writeln!(
            out,
            "\n## Execution {} ({status}, {:.1}s)\n",
            execution.sequence, execution.duration_secs
        );
        let _ = writeln!(out, "- Files: {}", execution.external.vcs_summary);
        for step in &execution.internal.reasoning_steps {
            let _ = writeln!(out, "- Reasoning: {step}");
        }
        for decision in &execution.internal.decisions {
            let _ = writeln!(out, "- Decision: {decision}");
        }
        for error in &execution.errors {
            let _ = writeln!(out, "- Error: {error}");
        }
        if !execution.output_preview.is_empty() {
            let _ = writeln!(out, "\n```\n{}\n```", execution.output_preview);
        }
    }

    if let Some(reason) = &trace.skip_reason {
        let _ = writeln!(out, "\n## Second execution skipped\n\n{reason}");
    }
    if let Some(comparative) = &trace.comparative {
        let _ = writeln!(out, "\n## Comparison\n");
        let _ = writeln!(out, "- {}", comparative.strategy_variance);
        let _ = writeln!(out, "- {}", comparative.effectiveness_comparison);
        for pattern in &comparative.patterns {
            let _ = writeln!(out, "- {pattern}");
        }
    }
    if let Some(satisfaction) = &trace.user_satisfaction {
        let _ = writeln!(out, "\n## User satisfaction: {}/5", satisfaction.score);
        if let Some(from) = &satisfaction.propagated_from {
            let _ = writeln!(out, "\nPropagated from {from}.");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use ace_contracts::{
        agent::AgentIdentity,
        delta::InsightType,
        playbook::{Playbook, PlaybookBullet},
    };

    use super::*;

    fn bullet(id: &str, content: &str, priority: u8, confidence: f64, helpful: u32) -> PlaybookBullet {
        PlaybookBullet {
            id: id.to_string(),
            bullet_type: InsightType::BestPractice,
            content: content.to_string(),
            helpful_count: helpful,
            harmful_count: 0,
            confidence,
            priority,
            created_at: Utc::now(),
            last_updated: Utc::now(),
            evidence: vec![],
            applicability: String::new(),
            tags: vec![],
            embedding: None,
            deprecated: false,
            deprecation_reason: None,
        }
    }

    #[test]
    fn empty_playbook_renders_placeholder() {
        let playbook = Playbook::empty(AgentIdentity::named("docs-writer"));
        assert_eq!(render_playbook_markdown(&playbook), NO_EXISTING_PLAYBOOK);
    }

    #[test]
    fn bullets_sorted_and_deprecated_omitted() {
        let mut playbook = Playbook::empty(AgentIdentity::named("docs-writer"));
        let mut hidden = bullet("bp-dead", "Retired advice", 5, 1.0, 9);
        hidden.deprecate("too little evidence");
        *playbook.category_mut(InsightType::BestPractice) = vec![
            bullet("bp-low", "Low priority", 2, 0.9, 5),
            bullet("bp-tie-b", "Tie broken by helpful", 4, 0.8, 7),
            bullet("bp-tie-a", "Tie loses on helpful", 4, 0.8, 3),
            bullet("bp-top", "Highest confidence", 4, 0.95, 1),
            hidden,
        ];

        let rendered = render_playbook_markdown(&playbook);

        assert!(rendered.contains("## Best Practice"));
        assert!(!rendered.contains("Retired advice"));
        let order: Vec<usize> = ["bp-top", "bp-tie-b", "bp-tie-a", "bp-low"]
            .iter()
            .map(|id| rendered.find(id).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "unexpected order:\n{rendered}");
    }
}
