pub mod icons;
pub mod progress;

pub use progress::{UiMode, WorkflowUI, print_workflow};
