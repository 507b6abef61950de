//! Export planning and execution.

mod driver;
mod planner;

pub use driver::ExportDriver;
pub use planner::{ExportPlanner, MERGED_DOCUMENT_STEM};
