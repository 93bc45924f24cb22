//! Playbook health metrics.

use chrono::Utc;

use ace_contracts::{
    delta::InsightType,
    playbook::{HealthMetrics, Playbook},
};

/// Metrics over the active bullets of `playbook`.
///
/// The effectiveness ratio is total helpful over total helpful plus harmful,
/// or 0.0 before any bullet has been marked either way.
pub fn compute_health(playbook: &Playbook, added: usize, updated: usize, pruned: usize) -> HealthMetrics {
    let active: Vec<_> = playbook.active_bullets().collect();
    let helpful: u64 = active.iter().map(|b| u64::from(b.helpful_count)).sum();
    let harmful: u64 = active.iter().map(|b| u64::from(b.harmful_count)).sum();

    let avg_helpful_count = if active.is_empty() {
        0.0
    } else {
        helpful as f64 / active.len() as f64
    };
    let effectiveness_ratio = if helpful + harmful == 0 {
        0.0
    } else {
        helpful as f64 / (helpful + harmful) as f64
    };

    let covered = InsightType::EXPECTED
        .iter()
        .filter(|kind| active.iter().any(|b| b.bullet_type == **kind))
        .count();

    HealthMetrics {
        total_bullets: active.len(),
        avg_helpful_count,
        effectiveness_ratio,
        added_this_session: added,
        updated_this_session: updated,
        pruned_this_session: pruned,
        coverage_score: covered as f64 / InsightType::EXPECTED.len() as f64,
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use ace_contracts::{agent::AgentIdentity, playbook::PlaybookBullet};

    use super::*;

    fn bullet(kind: InsightType, helpful: u32, harmful: u32, deprecated: bool) -> PlaybookBullet {
        PlaybookBullet {
            id: format!("{}-x", kind.short_code()),
            bullet_type: kind,
            content: "c".to_string(),
            helpful_count: helpful,
            harmful_count: harmful,
            confidence: 0.7,
            priority: 3,
            created_at: Utc::now(),
            last_updated: Utc::now(),
            evidence: vec![],
            applicability: String::new(),
            tags: vec![],
            embedding: None,
            deprecated,
            deprecation_reason: None,
        }
    }

    #[test]
    fn metrics_cover_active_bullets_only() {
        let mut playbook = Playbook::empty(AgentIdentity::named("docs-writer"));
        playbook
            .category_mut(InsightType::FailureMode)
            .push(bullet(InsightType::FailureMode, 3, 1, false));
        playbook
            .category_mut(InsightType::ToolUsage)
            .push(bullet(InsightType::ToolUsage, 1, 0, false));
        playbook
            .category_mut(InsightType::DomainConcept)
            .push(bullet(InsightType::DomainConcept, 50, 0, true));

        let health = compute_health(&playbook, 1, 2, 3);

        assert_eq!(health.total_bullets, 2);
        assert!((health.avg_helpful_count - 2.0).abs() < 1e-12);
        assert!((health.effectiveness_ratio - 0.8).abs() < 1e-12);
        assert!((health.coverage_score - 2.0 / 6.0).abs() < 1e-12);
        assert_eq!(
            (health.added_this_session, health.updated_this_session, health.pruned_this_session),
            (1, 2, 3)
        );
    }

    #[test]
    fn empty_playbook_is_all_zero() {
        let health = compute_health(&Playbook::empty(AgentIdentity::named("docs-writer")), 0, 0, 0);
        assert_eq!(health.total_bullets, 0);
        assert_eq!(health.effectiveness_ratio, 0.0);
        assert_eq!(health.coverage_score, 0.0);
    }
}
