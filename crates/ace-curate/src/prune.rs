//! Two-pass pruning.
//!
//! Pass 1 deprecates every active bullet with fewer than `min_helpful_count`
//! helpful marks. Pass 2 runs only if the playbook is still over
//! `max_bullets`: it deprecates the `ceil(excess * (1 + pruning_rate))`
//! lowest-scoring bullets, always leaving at least one active. Ties on score
//! go to the least recently updated bullet.

use chrono::{DateTime, Utc};
use tracing::debug;

use ace_contracts::playbook::Playbook;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruneSettings {
    pub min_helpful_count: u32,
    pub max_bullets: usize,
    pub pruning_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub below_minimum: usize,
    pub over_capacity: usize,
}

impl PruneSummary {
    pub fn total(&self) -> usize {
        self.below_minimum + self.over_capacity
    }
}

/// How many bullets pass 2 deprecates for `active` bullets.
pub fn over_capacity_count(active: usize, max_bullets: usize, pruning_rate: f64) -> usize {
    if active <= max_bullets {
        return 0;
    }
    let excess = (active - max_bullets) as f64;
    // The epsilon keeps 10 * 1.1 from rounding up to 12.
    let wanted = (excess * (1.0 + pruning_rate) - 1e-9).ceil().max(0.0) as usize;
    wanted.min(active.saturating_sub(1))
}

pub fn prune(playbook: &mut Playbook, settings: PruneSettings) -> PruneSummary {
    let mut summary = PruneSummary::default();

    // ── Pass 1: too little evidence ──────────────────────────────────────────
    for bullet in playbook.active_bullets_mut() {
        if bullet.helpful_count < settings.min_helpful_count {
            let reason = format!(
                "helpful_count {} below minimum {}",
                bullet.helpful_count, settings.min_helpful_count
            );
            debug!(bullet = %bullet.id, %reason, "deprecating bullet");
            bullet.deprecate(reason);
            summary.below_minimum += 1;
        }
    }

    // ── Pass 2: over capacity ────────────────────────────────────────────────
    let active = playbook.active_count();
    let count = over_capacity_count(active, settings.max_bullets, settings.pruning_rate);
    if count == 0 {
        return summary;
    }

    let mut ranked: Vec<(String, f64, DateTime<Utc>)> = playbook
        .active_bullets()
        .map(|b| (b.id.clone(), b.score(), b.last_updated))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)));
    let doomed: Vec<(String, f64)> = ranked
        .into_iter()
        .take(count)
        .map(|(id, score, _)| (id, score))
        .collect();

    for bullet in playbook.active_bullets_mut() {
        if let Some((_, score)) = doomed.iter().find(|(id, _)| *id == bullet.id) {
            bullet.deprecate(format!(
                "score {score:.3} among the lowest while over the {} bullet limit",
                settings.max_bullets
            ));
            summary.over_capacity += 1;
        }
    }
    debug!(active, pruned = summary.over_capacity, max = settings.max_bullets, "capacity pruning done");
    summary
}
