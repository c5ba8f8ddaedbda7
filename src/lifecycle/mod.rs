//! Session lifecycle: ordering rules and the controller that enforces them.

mod controller;
mod operation;

pub use controller::{InitRequest, LifecycleController};
pub use operation::TOOL_ENV;
