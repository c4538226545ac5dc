use {
    crate::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Mutex, MutexGuard,
        },
        tags::{Nort, Safe},
        value::{Snapshot, Versioned},
    },
    std::mem,
};

/// A mutable working value layered over a published snapshot store.
///
/// Producers edit the working value with [`set`] and [`update`]; edits stay
/// invisible to readers until [`publish`] copies the working value into the
/// store as a new snapshot. The combined forms [`set_publish`] and
/// [`update_publish`] do both.
///
/// A `Synced` publishes its initial value at construction, so readers never
/// observe an empty snapshot.
///
/// The unread flag reports whether a publish has happened with no
/// [`read_published`] after it. It is an observability hint only; the
/// snapshot payload is synchronised by the store's current pointer.
///
/// Any number of producers (serialised by a mutex) and any number of
/// real-time readers are supported.
///
/// [`set`]: Synced::set
/// [`update`]: Synced::update
/// [`publish`]: Synced::publish
/// [`set_publish`]: Synced::set_publish
/// [`update_publish`]: Synced::update_publish
/// [`read_published`]: Synced::read_published
pub struct Synced<T, const AUTO_GC: bool = false> {
    working: Mutex<T>,
    published: Versioned<T, AUTO_GC>,
    unread: AtomicBool,
}

impl<T: Clone + Default, const AUTO_GC: bool> Synced<T, AUTO_GC> {
    /// Creates a synced value and publishes `initial` as the first snapshot.
    pub fn new(initial: T) -> Self {
        let synced = Self {
            working: Mutex::new(initial.clone()),
            published: Versioned::new(initial),
            unread: AtomicBool::new(false),
        };
        synced.publish(Nort);
        synced
    }

    /// A copy of the working value.
    pub fn read(&self, _tag: Nort) -> T {
        self.working().clone()
    }

    /// Replaces the working value without publishing it.
    pub fn set(&self, _tag: Nort, value: T) {
        *self.working() = value;
    }

    /// Edits the working value without publishing it, returning a copy of
    /// the result.
    pub fn update(&self, _tag: Nort, update: impl FnOnce(T) -> T) -> T {
        let mut working = self.working();
        *working = update(mem::take(&mut *working));
        working.clone()
    }

    /// Copies the working value into the store as the new published
    /// snapshot and marks it unread.
    pub fn publish(&self, _tag: Nort) {
        // Lock order: working mutex first, then the store's writer mutex
        // inside `set`. Nothing acquires them in the other order.
        let working = self.working();
        self.published.set(Nort, working.clone());
        drop(working);

        self.unread.store(true, Ordering::Release);
    }

    /// [`set`](Synced::set) followed by [`publish`](Synced::publish).
    pub fn set_publish(&self, tag: Nort, value: T) {
        self.set(tag, value);
        self.publish(tag);
    }

    /// [`update`](Synced::update) followed by [`publish`](Synced::publish),
    /// returning a copy of the result.
    pub fn update_publish(&self, tag: Nort, update: impl FnOnce(T) -> T) -> T {
        let value = self.update(tag, update);
        self.publish(tag);
        value
    }

    fn working(&self) -> MutexGuard<'_, T> {
        self.working
            .lock()
            .unwrap_or_else(|error| error.into_inner())
    }
}

impl<T, const AUTO_GC: bool> Synced<T, AUTO_GC> {
    /// A snapshot of the published value, clearing the unread flag.
    ///
    /// Wait-free and allocation-free; safe from any thread.
    pub fn read_published(&self, _tag: impl Into<Safe>) -> Snapshot<T> {
        // Clear before fetching: a publish racing with this read leaves the
        // flag set only if its snapshot was not the one fetched.
        self.unread.store(false, Ordering::Release);
        self.published.read(Safe)
    }

    /// Whether a publish has happened with no `read_published` after it.
    pub fn is_unread(&self, _tag: impl Into<Safe>) -> bool {
        self.unread.load(Ordering::Acquire)
    }

    /// Reclaims published versions no snapshot refers to.
    pub fn garbage_collect(&self, tag: Nort) {
        self.published.garbage_collect(tag);
    }
}

impl<T: Clone + Default, const AUTO_GC: bool> Default for Synced<T, AUTO_GC> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
