//! [`PublishedSlot`] – capacity-bounded, lock-guarded published value.
//!
//! Each value the registry exposes to its clients (reply text, backend state,
//! one waveform per channel, …) is backed by one slot.  A slot owns a fixed
//! buffer of `capacity` bytes that is always NUL-terminated: writes longer
//! than `capacity - 1` bytes are silently truncated.
//!
//! Every slot has its own [`Mutex`], so writers on unrelated slots never
//! contend, and a reader always sees either the previous or the new value in
//! full.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Fire-and-forget "value updated" primitive of the registry runtime.
///
/// Called after the new value has been copied in and the slot lock released,
/// so implementations may read the slot back.
pub trait ServiceNotifier: Send + Sync {
    fn service_updated(&self, service: &str, len: usize);
}

/// Notifier that only records updates in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ServiceNotifier for TracingNotifier {
    fn service_updated(&self, service: &str, len: usize) {
        debug!(service, bytes = len, "published value updated");
    }
}

struct SlotBuffer {
    bytes: Vec<u8>,
    len: usize,
    updated_at: Option<DateTime<Utc>>,
}

/// One externally-visible published value.
pub struct PublishedSlot {
    name: String,
    capacity: usize,
    inner: Mutex<SlotBuffer>,
    notifier: Arc<dyn ServiceNotifier>,
}

impl PublishedSlot {
    /// Create an empty slot.  A `capacity` of 0 is promoted to 1 so the
    /// terminator always fits.
    pub fn new(name: impl Into<String>, capacity: usize, notifier: Arc<dyn ServiceNotifier>) -> Self {
        let capacity = capacity.max(1);
        Self {
            name: name.into(),
            capacity,
            inner: Mutex::new(SlotBuffer {
                bytes: vec![0; capacity],
                len: 0,
                updated_at: None,
            }),
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Buffer size in bytes, terminator included.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `value` into the slot and notify the registry.
    ///
    /// Copying stops at the first NUL in `value` or after `capacity - 1`
    /// bytes, whichever comes first.  Returns the number of bytes stored.
    pub fn update(&self, value: impl AsRef<[u8]>) -> usize {
        let src = value.as_ref();
        let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
        let stored = end.min(self.capacity - 1);
        {
            let mut buf = self.lock();
            let previous = buf.len;
            buf.bytes[..stored].copy_from_slice(&src[..stored]);
            if previous > stored {
                buf.bytes[stored..previous].fill(0);
            }
            buf.bytes[stored] = 0;
            buf.len = stored;
            buf.updated_at = Some(Utc::now());
        }
        if stored < end {
            trace!(service = %self.name, offered = end, stored, "value truncated to capacity");
        }
        self.notifier.service_updated(&self.name, stored);
        stored
    }

    /// Copy of the current value, without the terminator.
    pub fn snapshot(&self) -> Vec<u8> {
        let buf = self.lock();
        buf.bytes[..buf.len].to_vec()
    }

    /// Current value as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> String {
        self.with_value(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Run `f` on the current value while holding the slot lock.
    ///
    /// Keep `f` short: writers to this slot wait for it.
    pub fn with_value<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let buf = self.lock();
        f(&buf.bytes[..buf.len])
    }

    /// Copy of the whole fixed buffer, terminator and padding included.
    pub fn raw_buffer(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    /// Length of the current value in bytes.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wall-clock time of the last [`PublishedSlot::update`], if any.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.lock().updated_at
    }

    // Slots hold plain bytes, so a writer that panicked mid-update cannot
    // leave a state worse than a stale value.
    fn lock(&self) -> MutexGuard<'_, SlotBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PublishedSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedSlot")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
