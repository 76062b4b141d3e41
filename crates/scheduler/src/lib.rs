pub mod scheduler;

pub use scheduler::{JobFuture, TaskScheduler, MIN_INTERVAL};
