//! Background execution: a fixed worker pool and a semaphore that bounds
//! in-flight write tasks.

mod pool;
mod semaphore;

pub(crate) use pool::panic_message;
pub use pool::{PoolError, TaskHandle, WorkerPool};
pub use semaphore::{Permit, Semaphore};
