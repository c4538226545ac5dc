use {
    crate::{
        signal::FrameSignal,
        sync::Arc,
        synced::Synced,
        tags::{Nort, Rt, Safe},
        value::Snapshot,
        PhantomUnsync,
    },
    std::{array, marker::PhantomData},
};

struct Shared<T, const AUTO_GC: bool> {
    synced: Synced<T, AUTO_GC>,
    signal: Arc<FrameSignal>,
}

/// The producer half of a latched value.
///
/// Works like [`Synced`]: edit the working value, then publish it. Cloneable
/// and shareable; publishes from several producers serialise on the inner
/// mutexes.
pub struct LatchedWriter<T, const AUTO_GC: bool = false> {
    shared: Arc<Shared<T, AUTO_GC>>,
}

/// The real-time half of a latched value.
///
/// [`read`](LatchedReader::read) returns the published snapshot that was
/// current when the attached [`FrameSignal`] last advanced, caching it until
/// the next tick. Within one frame every read returns the same snapshot,
/// however many publishes land in between.
///
/// The cached snapshot is deliberately unsynchronised, which is why this
/// handle is exclusive: it is `Send` but not `Sync` and not `Clone`, and
/// reading requires `&mut self`, so exactly one thread can ever read it.
pub struct LatchedReader<T, const AUTO_GC: bool = false> {
    shared: Arc<Shared<T, AUTO_GC>>,
    last_tick: u64,
    latched: Snapshot<T>,
    _marker: PhantomUnsync,
}

/// Creates a latched value attached to `signal`, with `initial` published.
pub fn latched<T>(
    signal: Arc<FrameSignal>,
    initial: T,
) -> (LatchedWriter<T>, LatchedReader<T>)
where
    T: Clone + Default,
{
    latched_in(signal, initial)
}

/// Like [`latched`], but the store collects garbage on every publish.
pub fn latched_auto_gc<T>(
    signal: Arc<FrameSignal>,
    initial: T,
) -> (LatchedWriter<T, true>, LatchedReader<T, true>)
where
    T: Clone + Default,
{
    latched_in(signal, initial)
}

fn latched_in<T, const AUTO_GC: bool>(
    signal: Arc<FrameSignal>,
    initial: T,
) -> (LatchedWriter<T, AUTO_GC>, LatchedReader<T, AUTO_GC>)
where
    T: Clone + Default,
{
    let shared = Arc::new(Shared {
        synced: Synced::new(initial),
        signal,
    });

    (
        LatchedWriter {
            shared: Arc::clone(&shared),
        },
        LatchedReader {
            shared,
            last_tick: 0,
            latched: Snapshot::default(),
            _marker: PhantomData,
        },
    )
}

impl<T: Clone + Default, const AUTO_GC: bool> LatchedWriter<T, AUTO_GC> {
    /// A copy of the working value.
    pub fn read(&self, tag: Nort) -> T {
        self.shared.synced.read(tag)
    }

    /// Replaces the working value without publishing it.
    pub fn set(&self, tag: Nort, value: T) {
        self.shared.synced.set(tag, value);
    }

    /// Edits the working value without publishing it.
    pub fn update(&self, tag: Nort, update: impl FnOnce(T) -> T) -> T {
        self.shared.synced.update(tag, update)
    }

    /// Publishes the working value and marks it unread.
    ///
    /// The reader picks the new snapshot up when its signal next advances.
    pub fn publish(&self, tag: Nort) {
        self.shared.synced.publish(tag);
    }

    /// [`set`](LatchedWriter::set) followed by
    /// [`publish`](LatchedWriter::publish).
    pub fn set_publish(&self, tag: Nort, value: T) {
        self.shared.synced.set_publish(tag, value);
    }

    /// [`update`](LatchedWriter::update) followed by
    /// [`publish`](LatchedWriter::publish).
    pub fn update_publish(&self, tag: Nort, update: impl FnOnce(T) -> T) -> T {
        self.shared.synced.update_publish(tag, update)
    }
}

impl<T, const AUTO_GC: bool> LatchedWriter<T, AUTO_GC> {
    /// Whether the latest publish has not been fetched by the reader yet.
    pub fn is_unread(&self, tag: impl Into<Safe>) -> bool {
        self.shared.synced.is_unread(tag)
    }

    /// Reclaims published versions no snapshot refers to.
    pub fn garbage_collect(&self, tag: Nort) {
        self.shared.synced.garbage_collect(tag);
    }
}

impl<T, const AUTO_GC: bool> Clone for LatchedWriter<T, AUTO_GC> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, const AUTO_GC: bool> LatchedReader<T, AUTO_GC> {
    /// The latched snapshot.
    ///
    /// Fetches the published value only when there is an unfetched publish
    /// *and* the signal has advanced past the tick of the previous fetch;
    /// otherwise returns the cached snapshot. Wait-free, allocation-free.
    pub fn read(&mut self, _tag: Rt) -> &Snapshot<T> {
        if self.shared.synced.is_unread(Rt) {
            let tick = self.shared.signal.get(Rt);

            if tick > self.last_tick {
                self.last_tick = tick;
                self.latched = self.shared.synced.read_published(Rt);
            }
        }

        &self.latched
    }

    /// Whether the latest publish has not been fetched yet.
    pub fn is_unread(&self, tag: impl Into<Safe>) -> bool {
        self.shared.synced.is_unread(tag)
    }
}

/// The real-time half of a latched value, fanned out into `N` snapshot
/// slots.
///
/// [`read_into`](LatchedArrayReader::read_into) latches the current snapshot
/// into the chosen slot and leaves the other slots holding whatever they
/// held before. With `N == 2` this supports crossfading: refresh one slot
/// with the incoming state while the outgoing slot keeps the old state
/// alive.
pub struct LatchedArrayReader<T, const N: usize, const AUTO_GC: bool = false> {
    reader: LatchedReader<T, AUTO_GC>,
    slots: [Snapshot<T>; N],
}

/// Creates a latched value whose reader binds snapshots into `N` slots.
pub fn latched_array<T, const N: usize>(
    signal: Arc<FrameSignal>,
    initial: T,
) -> (LatchedWriter<T>, LatchedArrayReader<T, N>)
where
    T: Clone + Default,
{
    let (writer, reader) = latched(signal, initial);

    (
        writer,
        LatchedArrayReader {
            reader,
            slots: array::from_fn(|_| Snapshot::default()),
        },
    )
}

impl<T, const N: usize, const AUTO_GC: bool> LatchedArrayReader<T, N, AUTO_GC> {
    /// Latches the current snapshot into `slot` and returns its payload.
    ///
    /// Slots not named by `slot` keep the snapshot they last latched, and
    /// keep pinning the versions those snapshots refer to.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= N`.
    pub fn read_into(&mut self, tag: Rt, slot: usize) -> &T {
        assert!(slot < N, "slot {slot} out of range for {N} slots");

        self.slots[slot] = self.reader.read(tag).clone();
        &self.slots[slot]
    }

    /// Whether the latest publish has not been fetched yet.
    pub fn is_unread(&self, tag: impl Into<Safe>) -> bool {
        self.reader.is_unread(tag)
    }
}
