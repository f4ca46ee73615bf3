//! Training infrastructure: the iteration loop, validation passes, rolling
//! metrics, and remote display of windowed averages.

pub mod metrics;
pub mod monitor;
pub mod trainer;
pub mod validation;

pub use monitor::{JsonlMonitor, LogWindow, RemoteDisplay};
pub use trainer::{TrainOutcome, Trainer, TrainerConfig};
pub use validation::{ValidationSummary, Validator};
