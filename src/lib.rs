#![warn(missing_docs)]

//! Publish immutable snapshots of a value to a real-time thread.
//!
//! The producer side may block, allocate and take locks; the real-time side
//! reads the most recently published snapshot with one atomic load and one
//! reference-count increment. Memory used by old snapshots is recycled by an
//! explicit (or automatic) garbage collection step that runs on the producer,
//! never on the real-time thread.

/// The multi-version snapshot store and its immutable views.
pub mod value;

/// A working value layered over a snapshot store, committed with `publish`.
pub mod synced;

/// A frame tick that gates when a single real-time reader re-fetches.
pub mod signal;

/// Latched single-reader views of a published value.
pub mod latched;

/// A one-shot edge-triggered flag.
pub mod trigger;

/// An atomic token passed between threads to serialise access to a resource.
pub mod ball;

/// Zero-sized witnesses naming the kind of thread at a call site.
pub mod tags;

mod sync;

pub use tags::{Nort, Rt, Safe};

type PhantomUnsync = std::marker::PhantomData<std::cell::Cell<()>>;
