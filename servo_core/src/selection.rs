//! Minimal set of fitted steps spanning the achievable speed range.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::model::StepModel;

/// Pick the steps to keep from the fitted models.
///
/// The step reaching the global maximum speed and the step reaching the global
/// minimum are always kept (ties go to the smaller step number). When their
/// intervals do not meet, the first step in descending order whose interval
/// intersects the gap between them is added as a single bridge; further gaps
/// are not searched. Returns an empty set for empty input.
pub fn select_covering_steps(models: &BTreeMap<u32, StepModel>) -> BTreeSet<u32> {
    let mut selected = BTreeSet::new();
    let Some((index_max, index_min)) = extremes(models) else {
        return selected;
    };
    selected.insert(index_max);
    selected.insert(index_min);

    let (Some(low), Some(high)) = (models.get(&index_min), models.get(&index_max)) else {
        return selected;
    };
    if low.max_speed >= high.min_speed {
        debug!(index_min, index_max, "extreme steps overlap");
        return selected;
    }

    let (gap_lo, gap_hi) = (low.max_speed, high.min_speed);
    let bridge = models
        .values()
        .rev()
        .filter(|m| m.step != index_min && m.step != index_max)
        .find(|m| m.min_speed <= gap_hi && m.max_speed >= gap_lo);
    match bridge {
        Some(m) => {
            debug!(step = m.step, gap_lo, gap_hi, "bridging step");
            selected.insert(m.step);
        }
        None => debug!(gap_lo, gap_hi, "no step intersects the gap"),
    }
    selected
}

/// `(index_max, index_min)`: steps holding the global max and min speed.
fn extremes(models: &BTreeMap<u32, StepModel>) -> Option<(u32, u32)> {
    let mut index_max: Option<&StepModel> = None;
    let mut index_min: Option<&StepModel> = None;
    // Ascending iteration with strict comparisons keeps the smallest step on ties
    for m in models.values() {
        if index_max.is_none_or(|best| m.max_speed > best.max_speed) {
            index_max = Some(m);
        }
        if index_min.is_none_or(|best| m.min_speed < best.min_speed) {
            index_min = Some(m);
        }
    }
    Some((index_max?.step, index_min?.step))
}
