//! The underlying ring buffer storage for the lossy MPSC channel.
//!
//! Producers claim globally unique sequence numbers from a shared counter
//! and install heap-allocated entries into `slots[seq % capacity]` with a
//! single atomic swap. Displaced entries are retired through the epoch
//! collector so a concurrent reader can finish with them safely.

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::CachePadded;

/// One produced value plus the global order position it occupied at write
/// time.
///
/// Entries are immutable once installed. A slot always points at the entry
/// most recently swapped into it; the previous occupant is handed to the
/// epoch collector, never freed in place.
struct Entry<T> {
    seq: u64,
    value: T,
}

/// The backing storage for a lossy MPSC ring.
///
/// Memory layout (single allocation):
/// ```text
/// ┌───────────────────────────────────────────────────────┐
/// │ RingBuffer header                                     │
/// │   ref_count, capacity, buffer, layout                 │
/// │   sender_count, receiver_disconnected                 │
/// ├───────────────────────────────────────────────────────┤
/// │ head (cache-line padded) - producer sequence counter  │
/// ├───────────────────────────────────────────────────────┤
/// │ Slot[0]: Atomic<Entry<T>>                             │
/// │ Slot[1]: Atomic<Entry<T>>                             │
/// │ ...                                                   │
/// └───────────────────────────────────────────────────────┘
/// ```
///
/// A null slot pointer means the slot was never written. Capacity is exact:
/// the overwrite contract is `index = seq % capacity`, so no power-of-two
/// rounding is applied.
#[repr(C)]
pub struct RingBuffer<T> {
    // === Reference counting ===
    ref_count: AtomicUsize,

    // === Immutable configuration ===
    capacity: u64,
    buffer: *mut Atomic<Entry<T>>,
    layout: Layout,

    // === Liveness tracking ===
    /// Number of senders alive. When 0, all producers disconnected.
    sender_count: AtomicUsize,
    /// Set when the receiver is dropped.
    receiver_disconnected: AtomicBool,

    // === Cache-line padded producer counter ===
    /// Next sequence number to hand out. Starts at 0 so the first claim
    /// yields sequence 0.
    head: CachePadded<AtomicU64>,
}

// Safety: RingBuffer can be shared between threads. Producers synchronize
// on `head` and on per-slot swaps; entries are immutable after the release
// swap that publishes them, and the epoch collector keeps an entry alive
// while any pinned reader may still hold a pointer to it. Entries may be
// dropped on a different thread than the one that created them.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Computes the memory layout for a ring buffer with the given capacity.
    fn layout_for(capacity: usize) -> (Layout, usize) {
        let header = Layout::new::<Self>();
        let slots = Layout::array::<Atomic<Entry<T>>>(capacity).expect("capacity too large");
        let (layout, buffer_offset) = header.extend(slots).expect("layout overflow");
        (layout.pad_to_align(), buffer_offset)
    }

    /// Allocates and initializes a new ring buffer.
    ///
    /// All slots start null (never written). Initial ref_count is 2
    /// (one sender + one receiver).
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn allocate(capacity: usize) -> NonNull<Self> {
        assert!(capacity > 0, "capacity must be non-zero");

        let (layout, buffer_offset) = Self::layout_for(capacity);

        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }

        let buffer = unsafe { ptr.add(buffer_offset).cast::<Atomic<Entry<T>>>() };
        let rb = ptr.cast::<Self>();

        unsafe {
            ptr::write(
                rb,
                Self {
                    ref_count: AtomicUsize::new(2),
                    capacity: capacity as u64,
                    buffer,
                    layout,
                    sender_count: AtomicUsize::new(1),
                    receiver_disconnected: AtomicBool::new(false),
                    head: CachePadded::new(AtomicU64::new(0)),
                },
            );

            for i in 0..capacity {
                ptr::write(buffer.add(i), Atomic::null());
            }

            NonNull::new_unchecked(rb)
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, pos: u64) -> &Atomic<Entry<T>> {
        // pos % capacity < capacity, which came from a usize.
        let index = (pos % self.capacity) as usize;
        unsafe { &*self.buffer.add(index) }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    // === Producer operations ===

    /// Claims a fresh, globally unique sequence number.
    ///
    /// Relaxed is enough here: the counter only needs to hand out distinct
    /// values. Publication of the payload happens via the slot swap.
    #[inline]
    pub fn claim(&self) -> u64 {
        self.head.fetch_add(1, Ordering::Relaxed)
    }

    /// Installs an entry at `slots[seq % capacity]`, displacing whatever
    /// was there.
    ///
    /// Wait-free: a single swap, no retries. The release half of the swap
    /// publishes the fully-written entry to the consumer's acquire load.
    #[inline]
    pub fn install(&self, seq: u64, value: T) {
        let guard = epoch::pin();
        let old = self
            .slot(seq)
            .swap(Owned::new(Entry { seq, value }), Ordering::AcqRel, &guard);

        if !old.is_null() {
            // The consumer may still be reading the displaced entry under
            // its own guard; the collector frees it after the grace period.
            unsafe { guard.defer_destroy(old) };
        }
    }

    /// Loads the current head position (the next unclaimed sequence).
    #[inline]
    pub fn load_head(&self) -> u64 {
        self.head.load(Ordering::Acquire)
    }

    // === Consumer operations ===

    /// Reads the entry currently at `slots[pos % capacity]`.
    ///
    /// Returns the entry's sequence number and a clone of its payload, or
    /// `None` if the slot was never written. The read is non-destructive:
    /// the entry stays in its slot until a producer displaces it.
    #[inline]
    pub fn read(&self, pos: u64) -> Option<(u64, T)>
    where
        T: Clone,
    {
        let guard = epoch::pin();
        let shared = self.slot(pos).load(Ordering::Acquire, &guard);

        // Safety: a non-null pointer was published by a release swap, and
        // the guard keeps it from being reclaimed while we hold it.
        unsafe { shared.as_ref() }.map(|entry| (entry.seq, entry.value.clone()))
    }

    // === Liveness ===

    #[inline]
    pub fn add_sender(&self) {
        self.sender_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn remove_sender(&self) -> usize {
        self.sender_count.fetch_sub(1, Ordering::AcqRel)
    }

    #[inline]
    pub fn sender_count(&self) -> usize {
        self.sender_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_receiver_disconnected(&self) -> bool {
        self.receiver_disconnected.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_receiver_disconnected(&self) {
        self.receiver_disconnected.store(true, Ordering::Release);
    }

    // === Lifecycle ===

    pub fn acquire(this: NonNull<Self>) {
        unsafe {
            this.as_ref().ref_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub unsafe fn release(this: NonNull<Self>) {
        let inner = unsafe { this.as_ref() };

        if inner.ref_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            unsafe {
                Self::drop_entries(this);
                let layout = inner.layout;
                ptr::drop_in_place(this.as_ptr());
                dealloc(this.as_ptr().cast(), layout);
            }
        }
    }

    /// Drops every entry still sitting in a slot.
    ///
    /// # Safety
    ///
    /// Must only be called from the final `release`, when no other thread
    /// can touch the buffer.
    unsafe fn drop_entries(this: NonNull<Self>) {
        let inner = unsafe { this.as_ref() };

        // Safety: the last reference is gone, so no thread is pinned on us.
        let guard = unsafe { epoch::unprotected() };

        for i in 0..inner.capacity {
            let shared = inner.slot(i).load(Ordering::Relaxed, guard);
            if !shared.is_null() {
                drop(unsafe { shared.into_owned() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_start_empty() {
        let rb = RingBuffer::<u64>::allocate(8);

        unsafe {
            let inner = rb.as_ref();

            for pos in 0..8 {
                assert!(inner.read(pos).is_none());
            }

            RingBuffer::release(rb);
            RingBuffer::release(rb);
        }
    }

    #[test]
    fn claims_are_sequential_from_zero() {
        let rb = RingBuffer::<u64>::allocate(4);

        unsafe {
            let inner = rb.as_ref();

            assert_eq!(inner.claim(), 0);
            assert_eq!(inner.claim(), 1);
            assert_eq!(inner.claim(), 2);
            assert_eq!(inner.load_head(), 3);

            RingBuffer::release(rb);
            RingBuffer::release(rb);
        }
    }

    #[test]
    fn install_then_read() {
        let rb = RingBuffer::<u64>::allocate(8);

        unsafe {
            let inner = rb.as_ref();

            let seq = inner.claim();
            inner.install(seq, 42);

            assert_eq!(inner.read(0), Some((0, 42)));

            RingBuffer::release(rb);
            RingBuffer::release(rb);
        }
    }

    #[test]
    fn later_install_displaces_earlier() {
        let rb = RingBuffer::<u64>::allocate(4);

        unsafe {
            let inner = rb.as_ref();

            // Sequences 1 and 5 share slot 1.
            inner.install(1, 10);
            inner.install(5, 20);

            assert_eq!(inner.read(1), Some((5, 20)));
            assert_eq!(inner.read(5), Some((5, 20)));

            RingBuffer::release(rb);
            RingBuffer::release(rb);
        }
    }

    #[test]
    fn read_is_nondestructive() {
        let rb = RingBuffer::<String>::allocate(2);

        unsafe {
            let inner = rb.as_ref();

            inner.install(0, "telemetry".to_string());

            let first = inner.read(0).unwrap();
            let second = inner.read(0).unwrap();
            assert_eq!(first, second);

            RingBuffer::release(rb);
            RingBuffer::release(rb);
        }
    }

    #[test]
    fn capacity_is_exact() {
        let rb = RingBuffer::<u64>::allocate(5);

        unsafe {
            let inner = rb.as_ref();

            assert_eq!(inner.capacity(), 5);
            // Sequence 5 wraps to slot 0 under exact modulo.
            inner.install(0, 1);
            inner.install(5, 2);
            assert_eq!(inner.read(0), Some((5, 2)));

            RingBuffer::release(rb);
            RingBuffer::release(rb);
        }
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn zero_capacity_panics() {
        let _ = RingBuffer::<u64>::allocate(0);
    }
}
