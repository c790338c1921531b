use alloc::string::String;

use thiserror::Error;

use crate::Key;

pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by tree operations.
///
/// A failed operation never changes the tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested order is below the minimum of 3.
    #[error("invalid order {order}: a tree needs an order of at least 3")]
    InvalidOrder { order: usize },
    /// No entry exists for the key.
    #[error("key {key} not found")]
    NotFound { key: Key },
    /// A caller-supplied key is already present.
    #[error("key {key} already present")]
    DuplicateKey { key: Key },
    /// A snapshot failed structural validation; the message names the offending node.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
    /// Every representable key has been handed out.
    #[error("key allocator exhausted")]
    AllocatorExhausted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn messages_name_the_key() {
        assert_eq!(Error::NotFound { key: 7 }.to_string(), "key 7 not found");
        assert_eq!(Error::DuplicateKey { key: 3 }.to_string(), "key 3 already present");
        assert_eq!(
            Error::InvalidOrder { order: 2 }.to_string(),
            "invalid order 2: a tree needs an order of at least 3"
        );
        assert_eq!(
            Error::CorruptSnapshot("root: keys not ascending".into()).to_string(),
            "corrupt snapshot: root: keys not ascending"
        );
    }
}
