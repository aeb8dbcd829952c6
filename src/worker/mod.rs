//! Background execution of long-running tasks

mod task_runner;

pub use task_runner::{StartStatus, Task, TaskContext, TaskRunner};
