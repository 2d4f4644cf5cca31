pub mod isolation_forest;
pub mod rules;

pub use isolation_forest::{ForestParams, IsolationForest};
pub use rules::RuleEngine;
