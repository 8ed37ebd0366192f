//! Lossy multi-producer single-consumer (MPSC) ring channel.
//!
//! Any number of producers write concurrently; a single consumer polls.
//! The ring never reports "full" and never blocks a producer: each write
//! claims the next global sequence number and overwrites the slot at
//! `seq % capacity`, silently discarding whatever unread entry was there.
//! When producers outrun the consumer, old data is lost by design.
//!
//! # Example
//!
//! ```
//! use lossyring::mpsc;
//! use std::thread;
//!
//! let (tx, mut rx) = mpsc::channel::<u64>(64);
//! let tx2 = tx.clone();
//!
//! let h = thread::spawn(move || {
//!     for i in 0..1000 {
//!         tx2.send(i).unwrap();
//!     }
//! });
//! for i in 1000..2000 {
//!     tx.send(i).unwrap();
//! }
//! h.join().unwrap();
//!
//! // 2000 writes landed in 64 slots; the survivors are readable now.
//! let sample = rx.try_recv().unwrap();
//! assert!(sample.value < 2000);
//! ```
//!
//! # Reading and freshness
//!
//! Reads are non-destructive: an entry stays in its slot until a producer
//! displaces it, so a consumer that laps the ring re-observes entries it
//! has already seen. Instead of a "consumed" marker, every [`Sample`]
//! carries a `fresh` flag computed from the entry's sequence number and
//! the consumer's own cursor; see [`Freshness`] for the exact rule. The
//! cursor advances on *every* [`Receiver::try_recv`] call, whether or not
//! the call found data.
//!
//! # Performance Notes
//!
//! Push is wait-free: one relaxed fetch-add on the shared counter plus one
//! release swap on the slot. Producers never wait on each other, and a
//! slow producer cannot block a fast one. The consumer side is a single
//! acquire load per poll. Displaced entries are retired through the epoch
//! collector rather than freed in place, so a reader that raced with an
//! overwrite can finish with the old entry safely.

mod ring;

use std::fmt;
use std::ptr::NonNull;

use ring::RingBuffer;

/// Creates a new lossy MPSC channel with the given capacity.
///
/// Capacity is exact, with no power-of-two rounding: the overwrite contract
/// is `slot = seq % capacity`, so pushing `capacity + 1` items discards
/// exactly the oldest one. Uses the default [`Freshness`] rule.
///
/// # Panics
///
/// Panics if `capacity` is 0.
///
/// # Example
///
/// ```
/// use lossyring::mpsc;
///
/// let (tx, _rx) = mpsc::channel::<String>(100);
/// assert_eq!(tx.capacity(), 100);
/// ```
pub fn channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    channel_with(capacity, Freshness::default())
}

/// Creates a new lossy MPSC channel with an explicit [`Freshness`] rule.
///
/// # Panics
///
/// Panics if `capacity` is 0.
pub fn channel_with<T>(capacity: usize, freshness: Freshness) -> (Sender<T>, Receiver<T>) {
    let inner = RingBuffer::<T>::allocate(capacity);

    (
        Sender { inner },
        Receiver {
            inner,
            cursor: 0,
            freshness,
        },
    )
}

/// Controls how the receiver classifies an entry as fresh or stale.
///
/// A read compares the entry's sequence number against the receiver's
/// cursor. `visited` below is the cursor value at the start of the call
/// (the position being read); the cursor has already advanced to
/// `visited + 1` by the time the comparison runs.
///
/// The unit tests pin the exact boundary behavior of each rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Fresh only when the entry's sequence is strictly greater than the
    /// advanced cursor: `seq > visited + 1`.
    ///
    /// An entry read in lockstep with its producer (`seq == visited`)
    /// counts as stale under this rule; only entries that have lapped the
    /// cursor count as fresh. This conservative comparison is the default.
    #[default]
    StrictlyAhead,
    /// Fresh when the entry's sequence is at or past the visited position:
    /// `seq >= visited`.
    ///
    /// An entry read in lockstep with its producer counts as fresh; only
    /// entries the cursor has already moved past count as stale.
    AtCursor,
}

impl Freshness {
    #[inline]
    fn is_fresh(self, seq: u64, visited: u64) -> bool {
        match self {
            Self::StrictlyAhead => seq > visited + 1,
            Self::AtCursor => seq >= visited,
        }
    }
}

/// Result of a successful receive operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Sample<T> {
    /// The global sequence number the entry was written under.
    pub seq: u64,
    /// A copy of the entry's payload.
    pub value: T,
    /// Whether the entry is fresh relative to the receiver's cursor, per
    /// the channel's [`Freshness`] rule. A stale sample usually means the
    /// consumer re-observed a slot it already visited, or caught up with
    /// a producer that has stopped writing.
    pub fresh: bool,
}

impl<T> Sample<T> {
    /// Returns the value, discarding sequence and freshness information.
    #[inline]
    pub fn into_value(self) -> T {
        self.value
    }
}

/// Error returned by [`Sender::send`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SendError<T> {
    /// The receiver has been dropped. Contains the value that couldn't be
    /// sent.
    Disconnected(T),
}

impl<T> SendError<T> {
    /// Returns the value that couldn't be sent.
    pub fn into_inner(self) -> T {
        match self {
            Self::Disconnected(value) => value,
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver disconnected")
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Error returned by [`Receiver::try_recv`] and [`Receiver::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// The slot at the receiver's position was never written.
    Empty,
    /// All senders have been dropped and the receiver's cursor has caught
    /// up with every claimed sequence number.
    Disconnected,
}

impl TryRecvError {
    /// Returns `true` if this error is the `Empty` variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` if this error is the `Disconnected` variant.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "slot never written"),
            Self::Disconnected => write!(f, "all senders disconnected"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// The sending half of a lossy MPSC channel.
///
/// This struct can be cloned to create multiple producers. All clones
/// share the same underlying ring.
pub struct Sender<T> {
    inner: NonNull<RingBuffer<T>>,
}

// Safety: Sender can be sent to and shared across threads. The ring uses
// atomic sequence claims and per-slot swaps for multi-producer access, and
// displaced entries may be dropped on any thread.
unsafe impl<T: Send> Send for Sender<T> {}
unsafe impl<T: Send> Sync for Sender<T> {}

impl<T> Sender<T> {
    /// Sends a value, overwriting the oldest unread entry in its slot if
    /// the ring has wrapped.
    ///
    /// Never blocks and never reports "full": overwriting is the
    /// documented contract under producer pressure, not an error.
    ///
    /// # Errors
    ///
    /// Returns `Err(SendError::Disconnected(value))` if the receiver has
    /// been dropped.
    #[inline]
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        let inner = unsafe { self.inner.as_ref() };

        if inner.is_receiver_disconnected() {
            return Err(SendError::Disconnected(value));
        }

        inner.install(inner.claim(), value);
        Ok(())
    }

    /// Sends a value without checking whether the receiver is still alive.
    ///
    /// The pure fire-and-forget push: wait-free, total, no failure modes.
    /// Slightly faster than [`send`](Self::send) when you know the
    /// receiver is alive, or don't care about the disconnection.
    #[inline]
    pub fn send_unchecked(&self, value: T) {
        let inner = unsafe { self.inner.as_ref() };
        inner.install(inner.claim(), value);
    }

    /// Returns the capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { self.inner.as_ref().capacity() }
    }

    /// Returns `true` if the receiver has been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        unsafe { self.inner.as_ref().is_receiver_disconnected() }
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        let inner = unsafe { self.inner.as_ref() };
        inner.add_sender();
        RingBuffer::acquire(self.inner);

        Self { inner: self.inner }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        unsafe {
            self.inner.as_ref().remove_sender();
            RingBuffer::release(self.inner);
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// The receiving half of a lossy MPSC channel.
///
/// This struct cannot be cloned and its receive methods take `&mut self`:
/// there is exactly one consumer, enforced by the type system.
pub struct Receiver<T> {
    inner: NonNull<RingBuffer<T>>,

    /// Our read position. We're the only reader, so no atomic needed.
    cursor: u64,

    /// The freshness rule this channel was built with.
    freshness: Freshness,
}

// Safety: Receiver can be sent to another thread, but not shared (not
// Sync). Entries are immutable after publication and read by at most one
// thread at a time.
unsafe impl<T: Send> Send for Receiver<T> {}

impl<T> Receiver<T> {
    /// Polls the slot at the receiver's current position.
    ///
    /// The cursor advances by one on **every** call, whether or not the
    /// call found data. Reads are non-destructive: the entry stays in its
    /// slot, so a cursor that laps the ring re-observes old entries;
    /// those come back with `fresh == false` per the channel's
    /// [`Freshness`] rule.
    ///
    /// # Errors
    ///
    /// Returns `Err(TryRecvError::Empty)` if the slot was never written.
    /// Returns `Err(TryRecvError::Disconnected)` if the slot was never
    /// written, all senders are gone, and the cursor has caught up with
    /// every claimed sequence number.
    #[inline]
    pub fn try_recv(&mut self) -> Result<Sample<T>, TryRecvError>
    where
        T: Clone,
    {
        let inner = unsafe { self.inner.as_ref() };

        let visited = self.cursor;
        self.cursor += 1;

        match inner.read(visited) {
            Some((seq, value)) => Ok(Sample {
                seq,
                value,
                fresh: self.freshness.is_fresh(seq, visited),
            }),
            None => {
                if inner.sender_count() == 0 && visited >= inner.load_head() {
                    Err(TryRecvError::Disconnected)
                } else {
                    Err(TryRecvError::Empty)
                }
            }
        }
    }

    /// Receives a sample, spinning until one is available.
    ///
    /// Never returns [`TryRecvError::Empty`]; keeps polling (and advancing
    /// the cursor) while slots are unwritten.
    ///
    /// # Errors
    ///
    /// Returns `Err(TryRecvError::Disconnected)` if all senders were
    /// dropped and the cursor has caught up with every claimed sequence.
    #[inline]
    pub fn recv(&mut self) -> Result<Sample<T>, TryRecvError>
    where
        T: Clone,
    {
        loop {
            match self.try_recv() {
                Ok(sample) => return Ok(sample),
                Err(TryRecvError::Empty) => std::hint::spin_loop(),
                Err(TryRecvError::Disconnected) => return Err(TryRecvError::Disconnected),
            }
        }
    }

    /// Returns the capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { self.inner.as_ref().capacity() }
    }

    /// Returns the freshness rule this channel was built with.
    #[inline]
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Returns `true` if all senders have been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        unsafe { self.inner.as_ref().sender_count() == 0 }
    }

    /// Returns `true` if the cursor has caught up with every claimed
    /// sequence number.
    ///
    /// Note: this is a snapshot and may be immediately outdated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cursor >= unsafe { self.inner.as_ref().load_head() }
    }

    /// Returns how many claimed sequence numbers lie ahead of the cursor.
    ///
    /// This can exceed the capacity when producers have lapped the
    /// consumer. Note: this is a snapshot and may be immediately outdated.
    #[inline]
    pub fn lag(&self) -> u64 {
        let head = unsafe { self.inner.as_ref().load_head() };
        head.saturating_sub(self.cursor)
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        unsafe {
            self.inner.as_ref().set_receiver_disconnected();
            RingBuffer::release(self.inner);
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .field("freshness", &self.freshness)
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}
