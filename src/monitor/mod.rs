pub mod controller;
pub mod decision_log;
pub mod report;
pub mod state;

pub use controller::MonitorLoop;
pub use decision_log::DecisionLog;
pub use report::MonitorReport;
pub use state::{LoopState, LoopStatus};
