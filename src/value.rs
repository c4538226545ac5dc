use {
    crate::{
        sync::{
            atomic::{AtomicPtr, Ordering},
            Arc, Mutex, MutexGuard,
        },
        tags::{Nort, Safe},
    },
    crossbeam_utils::CachePadded,
    std::{cell::UnsafeCell, fmt, mem, ops::Deref, ptr::null_mut},
};

// Each version cell holds an `Option<T>` rather than a bare `T` so that a
// reclaimed payload can have its destructor run while the cell's allocation
// stays behind for the next version. The refcount of the cell doubles as the
// liveness signal: the store itself accounts for one reference, so a count
// above one means some snapshot still pins the payload.

struct SlotCell<T> {
    value: UnsafeCell<Option<T>>,
}

impl<T> SlotCell<T> {
    fn new() -> Self {
        Self {
            value: UnsafeCell::new(None),
        }
    }

    /// The caller must have exclusive access to the payload: the slot is dead
    /// and unreachable through the current pointer.
    unsafe fn set(&self, value: T) {
        *self.value.get() = Some(value);
    }

    /// The caller must have exclusive access to the payload.
    unsafe fn clear(&self) {
        *self.value.get() = None;
    }

    /// The caller must ensure no mutation of the payload can occur for the
    /// lifetime of the returned reference.
    unsafe fn get(&self) -> Option<&T> {
        (*self.value.get()).as_ref()
    }
}

// SAFETY: a cell may be dropped or have its payload replaced on a thread
// other than the one that filled it, which moves `T` across threads; handing
// out `&T` to concurrent snapshot holders additionally requires `T: Sync`.
unsafe impl<T: Send> Send for SlotCell<T> {}
unsafe impl<T: Send + Sync> Sync for SlotCell<T> {}

struct Slot<T> {
    cell: Arc<SlotCell<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            cell: Arc::new(SlotCell::new()),
        }
    }

    /// A slot is reclaimable when only the store's own reference remains.
    fn is_garbage(&self) -> bool {
        Arc::strong_count(&self.cell) <= 1
    }
}

/// An immutable view of one published version of a `T`.
///
/// A snapshot keeps the version it refers to alive: the payload is not
/// reclaimed, and its destructor does not run, until every snapshot of it has
/// been dropped *and* the producer runs garbage collection. Cloning and
/// dropping a snapshot are wait-free and do not allocate.
pub struct Snapshot<T> {
    cell: Option<Arc<SlotCell<T>>>,
}

impl<T> Snapshot<T> {
    /// The payload, or `None` for the empty snapshot.
    pub fn get(&self) -> Option<&T> {
        let cell = self.cell.as_deref()?;

        // SAFETY: we hold a strong reference, so the refcount is above one
        // and the producer will neither clear nor reuse this cell.
        unsafe { cell.get() }
    }

    /// Whether this snapshot refers to no version at all.
    ///
    /// Only a snapshot read from a store that has never published is empty.
    pub fn is_empty(&self) -> bool {
        self.get().is_none()
    }

    /// Whether two snapshots refer to the same published version.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.cell, &other.cell) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> Default for Snapshot<T> {
    /// The empty snapshot. Dereferencing it panics.
    fn default() -> Self {
        Self { cell: None }
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty snapshot")
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Snapshot").field(&self.get()).finish()
    }
}

/// A multi-version store publishing immutable snapshots of a `T`.
///
/// Producers replace the value with [`set`] or [`modify`]; each publication
/// fills a fresh version slot and swings an atomic pointer to it. Readers
/// call [`read`] to obtain a [`Snapshot`] of the version that is current at
/// that moment; the read path is wait-free, does not allocate, and is safe
/// from a real-time thread.
///
/// Slots whose snapshots have all been dropped are reclaimed by
/// [`garbage_collect`]: the payload's destructor runs on the producer and the
/// slot's allocation is reused for a later version, so the steady-state slot
/// count is bounded by how many versions ever coexist with live snapshots.
/// With `AUTO_GC` set, every [`modify`] collects before returning. A store
/// that never collects keeps every payload alive, destructors pending.
///
/// All producer operations serialise on an internal writer mutex; any number
/// of concurrent readers are supported.
///
/// [`set`]: Versioned::set
/// [`modify`]: Versioned::modify
/// [`read`]: Versioned::read
/// [`garbage_collect`]: Versioned::garbage_collect
pub struct Versioned<T, const AUTO_GC: bool = false> {
    current: CachePadded<AtomicPtr<Slot<T>>>,
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    working: T,
    /// Slot allocations, stable for the lifetime of the store. Raw pointers
    /// from `Box::into_raw`, freed in `Drop`; boxing keeps each slot's
    /// address fixed while the vec grows.
    slots: Vec<*mut Slot<T>>,
    /// One flag per slot; a dead slot holds no payload and may be reused.
    dead: Vec<bool>,
    /// Extra reference to the current slot's cell. Keeps its refcount above
    /// one so the current version is never considered garbage.
    keepalive: Option<Arc<SlotCell<T>>>,
}

// SAFETY: the raw slot pointers are owned by the store and freed exactly once
// in `Drop`; all access to them is either serialised by the writer mutex or
// funnelled through the refcounted cells, whose own bounds require
// `T: Send + Sync`.
unsafe impl<T: Send + Sync, const AUTO_GC: bool> Send for Versioned<T, AUTO_GC> {}
unsafe impl<T: Send + Sync, const AUTO_GC: bool> Sync for Versioned<T, AUTO_GC> {}

impl<T, const AUTO_GC: bool> Versioned<T, AUTO_GC> {
    /// Creates a store whose working value is `initial`.
    ///
    /// Nothing is published yet: until the first [`set`] or [`modify`],
    /// readers observe the empty snapshot.
    ///
    /// [`set`]: Versioned::set
    /// [`modify`]: Versioned::modify
    pub fn new(initial: T) -> Self {
        Self {
            current: CachePadded::new(AtomicPtr::new(null_mut())),
            inner: Mutex::new(Inner {
                working: initial,
                slots: Vec::new(),
                dead: Vec::new(),
                keepalive: None,
            }),
        }
    }

    /// A snapshot of the currently published version.
    ///
    /// Wait-free: one acquire load and one refcount increment. Never
    /// allocates, never blocks, safe from any thread.
    pub fn read(&self, _tag: impl Into<Safe>) -> Snapshot<T> {
        let slot = self.current.load(Ordering::Acquire);

        if slot.is_null() {
            return Snapshot::default();
        }

        // SAFETY: slot allocations are never freed or moved while the store
        // is alive, and `cell` is never reassigned after construction.
        // Cloning the arc pins the payload before the snapshot is returned.
        let cell = unsafe { Arc::clone(&(*slot).cell) };

        Snapshot { cell: Some(cell) }
    }

    /// Reclaims every version that no snapshot refers to.
    ///
    /// The payloads of reclaimed versions are dropped here, on the calling
    /// thread; their slots are retained and reused by later publications.
    /// The current version is never reclaimed.
    pub fn garbage_collect(&self, _tag: Nort) {
        let mut inner = self.lock();
        Self::collect(&mut inner);
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|error| error.into_inner())
    }

    fn collect(inner: &mut Inner<T>) {
        for index in 0..inner.slots.len() {
            if inner.dead[index] {
                continue;
            }

            // SAFETY: slot pointers stay valid for the store's lifetime.
            let slot = unsafe { &*inner.slots[index] };

            // The keepalive also holds the current slot's refcount above
            // one, so `is_garbage` could never match it anyway.
            let is_current = inner
                .keepalive
                .as_ref()
                .is_some_and(|keepalive| Arc::ptr_eq(keepalive, &slot.cell));

            if !is_current && slot.is_garbage() {
                // SAFETY: a refcount of one means no snapshot exists, so
                // the slot is unreachable to readers and we have exclusive
                // access to the payload.
                unsafe { slot.cell.clear() };
                inner.dead[index] = true;
            }
        }
    }

    /// First dead slot, or a freshly allocated one. The returned slot is
    /// always marked dead until its payload is in place.
    fn empty_slot(inner: &mut Inner<T>) -> usize {
        if let Some(index) = inner.dead.iter().position(|&dead| dead) {
            return index;
        }

        inner.slots.push(Box::into_raw(Box::new(Slot::new())));
        inner.dead.push(true);
        inner.slots.len() - 1
    }
}

impl<T: Clone + Default, const AUTO_GC: bool> Versioned<T, AUTO_GC> {
    /// Publishes a new version computed from the working value.
    ///
    /// `update` receives the working value by move and returns its
    /// replacement, which becomes both the new working value and the new
    /// published version. Blocks on the writer mutex; may allocate a slot.
    pub fn modify(&self, _tag: Nort, update: impl FnOnce(T) -> T) {
        let mut inner = self.lock();

        let new_value = update(mem::take(&mut inner.working));
        inner.working = new_value.clone();

        let index = Self::empty_slot(&mut inner);
        let slot_ptr = inner.slots[index];

        // SAFETY: slot pointers stay valid for the store's lifetime.
        let slot = unsafe { &*slot_ptr };

        // The keepalive must move to the new slot before it becomes current,
        // so there is no instant at which the current pointer addresses a
        // reclaimable slot.
        inner.keepalive = Some(Arc::clone(&slot.cell));

        // SAFETY: the slot is dead: it holds no payload, no snapshot of it
        // exists, and the current pointer does not address it.
        unsafe { slot.cell.set(new_value) };
        inner.dead[index] = false;

        self.current.store(slot_ptr, Ordering::Release);

        if AUTO_GC {
            Self::collect(&mut inner);
        }
    }

    /// Publishes `value` as the new version.
    pub fn set(&self, tag: Nort, value: T) {
        self.modify(tag, move |_| value);
    }
}

impl<T: Default, const AUTO_GC: bool> Default for Versioned<T, AUTO_GC> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, const AUTO_GC: bool> Drop for Versioned<T, AUTO_GC> {
    fn drop(&mut self) {
        let inner = self.lock();

        for &slot in &inner.slots {
            // SAFETY: every pointer in `slots` came from `Box::into_raw` and
            // is freed exactly once, here.
            drop(unsafe { Box::from_raw(slot) });
        }
    }
}

#[cfg(test)]
impl<T, const AUTO_GC: bool> Versioned<T, AUTO_GC> {
    fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    fn dead_slot_count(&self) -> usize {
        self.lock().dead.iter().filter(|&&dead| dead).count()
    }

    fn current_slot_index(&self) -> Option<usize> {
        let inner = self.lock();
        let current = self.current.load(Ordering::Relaxed);
        inner.slots.iter().position(|&slot| slot == current)
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        static_assertions::{assert_impl_all, assert_not_impl_any},
        std::{rc::Rc, sync::atomic::AtomicUsize, thread},
    };

    assert_impl_all!(Versioned<i32>: Send, Sync);
    assert_impl_all!(Snapshot<i32>: Send, Sync, Clone);
    assert_not_impl_any!(Versioned<Rc<i32>>: Send, Sync);
    assert_not_impl_any!(Snapshot<Rc<i32>>: Send, Sync);

    #[derive(Clone, Debug, Default)]
    struct Droppable(Arc<AtomicUsize>);

    impl Droppable {
        fn new(drop_count: &Arc<AtomicUsize>) -> Self {
            Droppable(Arc::clone(drop_count))
        }
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn reading_before_the_first_publish_yields_the_empty_snapshot() {
        let store = Versioned::<i32>::default();

        let snapshot = store.read(Safe);

        assert!(snapshot.is_empty());
        assert_eq!(snapshot.get(), None);
    }

    #[test]
    #[should_panic(expected = "empty snapshot")]
    fn dereferencing_the_empty_snapshot_panics() {
        let store = Versioned::<i32>::default();

        let _ = *store.read(Safe);
    }

    #[test]
    fn publishing_makes_the_value_visible() {
        let store = Versioned::<i32>::default();

        store.set(Nort, 7);
        assert_eq!(*store.read(Safe), 7);

        store.modify(Nort, |value| value + 1);
        assert_eq!(*store.read(Safe), 8);
    }

    #[test]
    fn snapshots_are_stable_across_later_publishes_and_collections() {
        let store = Versioned::<String>::default();

        store.set(Nort, "a".to_owned());
        let pinned = store.read(Safe);

        for i in 0..100 {
            store.set(Nort, format!("{i}"));
            store.garbage_collect(Nort);
        }

        assert_eq!(*pinned, "a");
        assert_eq!(*store.read(Safe), "99");
    }

    #[test]
    fn pinned_versions_survive_collection_until_released() {
        let store = Versioned::<&str>::default();

        store.set(Nort, "a");
        let pinned = store.read(Safe);

        store.set(Nort, "b");
        store.set(Nort, "c");
        store.garbage_collect(Nort);

        assert_eq!(*pinned, "a");
        assert!(store.slot_count() >= 3);

        drop(pinned);
        store.garbage_collect(Nort);

        assert_eq!(store.dead_slot_count(), 2);
        assert_eq!(store.slot_count() - store.dead_slot_count(), 1);
        assert_eq!(*store.read(Safe), "c");
    }

    #[test]
    fn collected_slots_are_reused_instead_of_growing_the_store() {
        let store = Versioned::<usize>::default();
        let mut indexes = Vec::new();

        for i in 0..1000 {
            store.set(Nort, i);
            store.garbage_collect(Nort);
            indexes.push(store.current_slot_index().unwrap());
        }

        assert!(store.slot_count() <= 2);

        // After the second publish the store ping-pongs between two slots.
        for pair in indexes[1..].windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn an_auto_collecting_store_never_needs_a_manual_collection() {
        let store = Versioned::<usize, true>::default();

        for i in 0..1000 {
            store.set(Nort, i);
        }

        assert!(store.slot_count() <= 2);
        assert_eq!(*store.read(Safe), 999);
    }

    #[test]
    fn payload_destructors_run_exactly_once_and_only_when_collecting() {
        let store = Versioned::<Droppable>::default();

        let first = Arc::new(AtomicUsize::new(0));
        store.set(Nort, Droppable::new(&first));

        let pinned = store.read(Safe);

        // Publishing again discards the previous working copy, which shares
        // the first counter; the slot payload itself must stay untouched.
        store.set(Nort, Droppable::default());
        assert_eq!(first.load(Ordering::Relaxed), 1);

        store.garbage_collect(Nort);
        assert_eq!(first.load(Ordering::Relaxed), 1);

        drop(pinned);
        assert_eq!(first.load(Ordering::Relaxed), 1);

        store.garbage_collect(Nort);
        assert_eq!(first.load(Ordering::Relaxed), 2);

        store.garbage_collect(Nort);
        assert_eq!(first.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn readers_observe_a_monotone_sequence_of_versions() {
        let store = Arc::new(Versioned::<usize>::default());
        store.set(Nort, 0);

        const PUBLISHES: usize = 10_000;

        let writer = thread::spawn({
            let store = Arc::clone(&store);
            move || {
                for value in 1..=PUBLISHES {
                    store.set(Nort, value);
                    if value % 64 == 0 {
                        store.garbage_collect(Nort);
                    }
                }
            }
        });

        let mut last = 0;
        while last < PUBLISHES {
            let snapshot = store.read(Safe);
            assert!(*snapshot >= last);
            last = *snapshot;
        }

        writer.join().unwrap();
    }

    #[test]
    fn snapshots_taken_by_many_readers_pin_their_versions() {
        let store = Arc::new(Versioned::<usize>::default());
        store.set(Nort, 0);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let snapshot = store.read(Safe);
                        let value = *snapshot;
                        assert_eq!(*snapshot, value);
                    }
                })
            })
            .collect();

        for value in 1..=1000 {
            store.set(Nort, value);
            store.garbage_collect(Nort);
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }
}
