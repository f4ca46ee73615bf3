//! Decision episode runner: the WAIT/COMMIT/FINISH protocol that couples a
//! translator to a read/write policy.

mod action;
mod episode;
mod runner;
mod translator;

pub use action::{format_trace, Action};
pub use episode::{Cursor, DecodeRequest, Episode, StepInfo, Translation};
pub use runner::{DecoderConfig, EpisodeRunner, SimultaneousDecoder};
pub use translator::{CopyTranslator, SourceView, Step, Translator};
