use crate::decode::Action;
use crate::error::StatsError;

/// Lengths of the maximal runs of consecutive WAIT actions in a trace.
///
/// Only constructed by [`consecutive_waits`], which guarantees at least one
/// run, so [`WaitRuns::mean`] and [`WaitRuns::max`] never reduce an empty set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRuns {
    runs: Vec<usize>,
}

impl WaitRuns {
    pub fn runs(&self) -> &[usize] {
        &self.runs
    }

    pub fn mean(&self) -> f32 {
        self.runs.iter().sum::<usize>() as f32 / self.runs.len() as f32
    }

    pub fn max(&self) -> usize {
        self.runs.iter().copied().max().unwrap_or(0)
    }
}

/// Collect the consecutive-WAIT runs of a trace.
///
/// A run is closed whenever a non-WAIT action follows at least one WAIT, and
/// a trailing run is flushed at the end. Fails with [`StatsError::NoWait`]
/// when the trace has no WAIT at all.
pub fn consecutive_waits(actions: &[Action]) -> Result<WaitRuns, StatsError> {
    let mut runs = Vec::new();
    let mut current = 0usize;
    for &action in actions {
        if action == Action::Wait {
            current += 1;
        } else if current > 0 {
            runs.push(current);
            current = 0;
        }
    }
    if current > 0 {
        runs.push(current);
    }

    if runs.is_empty() {
        return Err(StatsError::NoWait);
    }
    Ok(WaitRuns { runs })
}

/// Maximum simultaneous lag of a trace.
///
/// WAIT increments the read counter and FINISH increments the close counter;
/// COMMIT moves neither. Returns the largest `reads - closes` seen.
pub fn max_lag(actions: &[Action]) -> usize {
    let mut reads = 0usize;
    let mut closes = 0usize;
    let mut max = 0usize;
    for action in actions {
        match action {
            Action::Wait => reads += 1,
            Action::Finish => closes += 1,
            Action::Commit => {}
        }
        max = max.max(reads.saturating_sub(closes));
    }
    max
}

/// Average proportion of the source read when each target token was emitted.
///
/// `reads_at_commit[t]` is the number of source tokens read when target token
/// `t` was written. An episode that wrote nothing gets the worst delay, 1.0.
pub fn average_proportion(source_len: usize, reads_at_commit: &[usize]) -> f32 {
    if source_len == 0 || reads_at_commit.is_empty() {
        return 1.0;
    }
    let total: usize = reads_at_commit.iter().sum();
    total as f32 / (reads_at_commit.len() * source_len) as f32
}
