//! Context-window policy
//!
//! History is cut into atomic groups: a user turn, a plain assistant turn,
//! or an assistant tool-call turn together with all of its results. Groups
//! are kept newest first while they fit the token budget. The newest group
//! is always kept, and the latest user turn is pinned in front of the kept
//! suffix when it would otherwise fall out of the window.
//!
//! Neither of those two is checked against the budget, so one oversized
//! turn is still sent whole and the prompt overflows the budget. That case
//! is logged as a warning.

use super::Turn;

/// History actually sent to the model for one step
#[derive(Debug, Clone, PartialEq)]
pub struct PromptHistory {
    pub turns: Vec<Turn>,
    /// Number of older turns left out
    pub omitted: usize,
}

impl PromptHistory {
    /// Whole history, nothing omitted
    pub fn full(turns: &[Turn]) -> Self {
        Self {
            turns: turns.to_vec(),
            omitted: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    budget_tokens: usize,
}

impl ContextWindow {
    pub fn new(budget_tokens: usize) -> Self {
        Self { budget_tokens }
    }

    pub fn select(&self, turns: &[Turn]) -> PromptHistory {
        let groups = group_ranges(turns);
        let cost = |range: &(usize, usize)| -> usize {
            turns[range.0..range.1]
                .iter()
                .map(Turn::estimated_tokens)
                .sum()
        };

        let mut used = 0;
        let mut first_kept = turns.len();
        for (i, range) in groups.iter().enumerate().rev() {
            let group_cost = cost(range);
            let is_newest = i + 1 == groups.len();
            if !is_newest && used + group_cost > self.budget_tokens {
                break;
            }
            used += group_cost;
            first_kept = range.0;
        }

        let pinned = turns[..first_kept]
            .iter()
            .rposition(|t| matches!(t, Turn::User { .. }))
            .filter(|_| !turns[first_kept..].iter().any(|t| matches!(t, Turn::User { .. })));
        if let Some(idx) = pinned {
            used += turns[idx].estimated_tokens();
        }
        if used > self.budget_tokens {
            tracing::warn!(
                estimated_tokens = used,
                budget_tokens = self.budget_tokens,
                "Prompt history exceeds the context budget"
            );
        }

        if first_kept == 0 {
            return PromptHistory::full(turns);
        }

        let mut kept = Vec::with_capacity(turns.len() - first_kept + 1);
        if let Some(idx) = pinned {
            kept.push(turns[idx].clone());
        }
        kept.extend_from_slice(&turns[first_kept..]);

        PromptHistory {
            turns: kept,
            omitted: first_kept - usize::from(pinned.is_some()),
        }
    }
}

/// Half-open index ranges of the atomic groups, oldest first
fn group_ranges(turns: &[Turn]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < turns.len() {
        let mut end = start + 1;
        if !turns[start].tool_calls().is_empty() {
            while end < turns.len() && matches!(turns[end], Turn::Tool { .. }) {
                end += 1;
            }
        }
        ranges.push((start, end));
        start = end;
    }
    ranges
}
