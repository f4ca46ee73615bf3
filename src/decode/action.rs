use serde::{Deserialize, Serialize};

/// A read/write decision taken by the policy at one step of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Consume one more source token.
    Wait,
    /// Emit one target token without consuming source.
    Commit,
    /// End the episode.
    Finish,
}

impl Action {
    /// Every action, ordered by code.
    pub const ALL: [Action; 3] = [Action::Wait, Action::Commit, Action::Finish];

    /// Actions that remain legal once the whole source has been read.
    pub const AFTER_SOURCE: [Action; 2] = [Action::Commit, Action::Finish];

    /// Integer code used by the action space (WAIT=0, COMMIT=1, FINISH=2).
    pub const fn code(self) -> usize {
        match self {
            Action::Wait => 0,
            Action::Commit => 1,
            Action::Finish => 2,
        }
    }

    /// Single-letter label used in trace dumps.
    pub const fn label(self) -> char {
        match self {
            Action::Wait => 'W',
            Action::Commit => 'C',
            Action::Finish => 'F',
        }
    }

    pub fn from_code(code: usize) -> Option<Action> {
        Action::ALL.get(code).copied()
    }
}

/// Render a trace as comma separated labels, e.g. `W,W,C,F`.
pub fn format_trace(actions: &[Action]) -> String {
    actions
        .iter()
        .map(|a| a.label().to_string())
        .collect::<Vec<_>>()
        .join(",")
}
