//! Pure planning of one round's function-call batch.
//!
//! Every function here takes slices and returns new vectors. The
//! orchestrator never filters its pending calls or raw parts in place.

use std::collections::HashMap;

use fastpath_types::llm::{FunctionCall, RawPart};

use crate::tool::classifier::ToolClassifier;

/// What to do with the calls the model emitted in one round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    /// Calls to execute, in execution order.
    pub execute: Vec<FunctionCall>,
    /// Mutating calls removed because the batch also contained read-only calls.
    pub dropped: Vec<FunctionCall>,
    /// Calls beyond the per-round cap.
    pub truncated: Vec<FunctionCall>,
    /// Calls echoed back in the model turn: `execute`, followed by `dropped`
    /// when skipped calls are answered explicitly.
    pub replay: Vec<FunctionCall>,
    /// Raw provider parts matching `replay` by per-name multiplicity.
    pub raw_parts: Vec<RawPart>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.replay.is_empty()
    }
}

/// Split a batch into (kept, dropped).
///
/// When read-only and mutating calls arrive together, every mutating call is
/// dropped: its arguments were chosen before the model saw any of the
/// read-only results. Homogeneous batches pass through unchanged.
pub fn filter_mixed_batch(
    calls: &[FunctionCall],
    classifier: &ToolClassifier,
) -> (Vec<FunctionCall>, Vec<FunctionCall>) {
    let (read_only, mutating): (Vec<_>, Vec<_>) = calls
        .iter()
        .cloned()
        .partition(|c| classifier.is_read_only(&c.name));

    if read_only.is_empty() || mutating.is_empty() {
        return (calls.to_vec(), Vec::new());
    }
    (read_only, mutating)
}

/// Stable-sort read-only calls first and keep the first `max_calls`.
///
/// Returns (kept, truncated).
pub fn prioritize_and_truncate(
    calls: &[FunctionCall],
    classifier: &ToolClassifier,
    max_calls: usize,
) -> (Vec<FunctionCall>, Vec<FunctionCall>) {
    if calls.len() <= max_calls {
        return (calls.to_vec(), Vec::new());
    }
    let mut sorted = calls.to_vec();
    // `sort_by_key` is stable.
    sorted.sort_by_key(|c| !classifier.is_read_only(&c.name));
    let truncated = sorted.split_off(max_calls);
    (sorted, truncated)
}

fn name_counts(calls: &[FunctionCall]) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    for call in calls {
        *counts.entry(call.name.as_str()).or_insert(0) += 1;
    }
    counts
}

/// Keep raw parts so that each call name appears at most as many times as it
/// does in `kept`. Parts that carry no function call are always kept.
pub fn sync_raw_parts(raw_parts: &[RawPart], kept: &[FunctionCall]) -> Vec<RawPart> {
    let mut budget = name_counts(kept);
    raw_parts
        .iter()
        .filter(|part| match part.call_name.as_deref() {
            None => true,
            Some(name) => match budget.get_mut(name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            },
        })
        .cloned()
        .collect()
}

/// Whether `raw_parts` carries exactly the calls in `calls`, name for name.
///
/// Only then can the raw parts stand in for the function-call parts of the
/// model turn.
pub fn raw_covers(raw_parts: &[RawPart], calls: &[FunctionCall]) -> bool {
    let mut raw_counts: HashMap<&str, usize> = HashMap::new();
    for name in raw_parts.iter().filter_map(|p| p.call_name.as_deref()) {
        *raw_counts.entry(name).or_insert(0) += 1;
    }
    !calls.is_empty() && raw_counts == name_counts(calls)
}

/// Plan one round: mixed-batch filter, then prioritized truncation, then
/// raw-part synchronization against the calls that will be replayed.
pub fn plan_batch(
    calls: &[FunctionCall],
    raw_parts: &[RawPart],
    classifier: &ToolClassifier,
    max_calls: usize,
    replay_dropped: bool,
) -> BatchPlan {
    let (kept, dropped) = filter_mixed_batch(calls, classifier);
    let (execute, truncated) = prioritize_and_truncate(&kept, classifier, max_calls);

    let mut replay = execute.clone();
    if replay_dropped {
        replay.extend(dropped.iter().cloned());
    }
    let raw_parts = sync_raw_parts(raw_parts, &replay);

    BatchPlan {
        execute,
        dropped,
        truncated,
        replay,
        raw_parts,
    }
}
