pub mod approval;
pub mod database;
pub mod metrics;

pub use approval::{ApprovalPolicy, SideEffects, Visibility, WorkflowError};
pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
