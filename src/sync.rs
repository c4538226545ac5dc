#[cfg(not(loom))]
pub use std::sync::{atomic, Arc, Mutex, MutexGuard};

#[cfg(loom)]
pub use loom::sync::{atomic, Arc, Mutex, MutexGuard};
