pub mod action;
pub mod config;
pub mod env;
pub mod error;
pub mod frame;
pub mod network;
pub mod policy;
pub mod values;
pub mod weights;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types for convenience
pub use action::{Action, ActionSet};
pub use config::PolicySpec;
pub use env::{BlankEnvironment, Environment};
pub use error::{PolicyError, Result};
pub use frame::{HistoryBuffer, ObservationFrame, Perception};
pub use network::{QFunction, QNetwork, QNetworkConfig};
pub use policy::{Distribution, FlatPolicy, HierarchicalPolicy, Policy, Selection, SkillRunner};
pub use weights::{TrainingSetup, WeightStore};
