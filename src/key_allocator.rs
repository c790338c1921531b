use crate::Key;
use crate::error::{Error, Result};

/// Issues strictly increasing keys for inserts that do not name one.
///
/// Keys are never handed out twice, not even after the entry that used one is deleted. Keys
/// chosen by callers are reported through [`observe`](Self::observe) so later allocations
/// stay above them.
///
/// # Examples
///
/// ```
/// use minidb_engine::KeyAllocator;
///
/// let mut keys = KeyAllocator::new(1);
/// assert_eq!(keys.allocate(), Ok(1));
/// assert_eq!(keys.allocate(), Ok(2));
/// keys.observe(10);
/// assert_eq!(keys.allocate(), Ok(11));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyAllocator {
    /// The next key to hand out, `None` once `Key::MAX` has been issued.
    next: Option<Key>,
}

impl KeyAllocator {
    /// Creates an allocator whose first key is `first`.
    #[must_use]
    pub const fn new(first: Key) -> Self {
        Self { next: Some(first) }
    }

    /// An allocator that has already handed out `Key::MAX`.
    #[must_use]
    pub(crate) const fn exhausted() -> Self {
        Self { next: None }
    }

    /// Returns the next key without consuming it.
    #[must_use]
    pub const fn peek(&self) -> Option<Key> {
        self.next
    }

    /// Hands out the next key.
    ///
    /// Fails with [`Error::AllocatorExhausted`] once `Key::MAX` has been issued; the allocator
    /// is unchanged by the failure.
    pub fn allocate(&mut self) -> Result<Key> {
        let key = self.next.ok_or(Error::AllocatorExhausted)?;
        self.next = key.checked_add(1);
        Ok(key)
    }

    /// Records that `key` is in use, moving the counter past it if needed.
    pub fn observe(&mut self, key: Key) {
        if let Some(next) = self.next
            && key >= next
        {
            self.next = key.checked_add(1);
        }
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new(1)
    }
}
