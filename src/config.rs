//! Tree construction parameters.
//!
//! [`TreeConfig`] deserializes with per-field defaults, so hosts can keep it in whatever
//! format they already load settings from and only name the fields they change.

use serde::{Deserialize, Serialize};

use crate::Key;
use crate::error::{Error, Result};
use crate::raw::MIN_ORDER;

/// Parameters for a new [`BPlusTree`](crate::BPlusTree).
///
/// # Examples
///
/// ```
/// use minidb_engine::{BPlusTree, TreeConfig};
///
/// let config = TreeConfig { order: 8, ..TreeConfig::default() };
/// let tree: BPlusTree<String> = BPlusTree::with_config(config).unwrap();
/// assert_eq!(tree.order(), 8);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Maximum number of children of an internal node. Must be at least 3.
    pub order: usize,
    /// First key handed out for inserts that do not name one.
    pub first_key: Key,
}

impl TreeConfig {
    /// Default order.
    pub const DEFAULT_ORDER: usize = 4;
    /// Default first allocated key.
    pub const DEFAULT_FIRST_KEY: Key = 1;

    /// Checks that the configuration describes a valid tree.
    pub fn validate(&self) -> Result<()> {
        if self.order < MIN_ORDER {
            return Err(Error::InvalidOrder { order: self.order });
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: Self::DEFAULT_ORDER,
            first_key: Self::DEFAULT_FIRST_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(TreeConfig::default().validate(), Ok(()));
    }

    #[test]
    fn small_orders_are_rejected() {
        for order in 0..MIN_ORDER {
            let config = TreeConfig {
                order,
                ..TreeConfig::default()
            };
            assert_eq!(config.validate(), Err(Error::InvalidOrder { order }));
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: TreeConfig = serde_json::from_str(r#"{"order": 16}"#).unwrap();
        assert_eq!(
            config,
            TreeConfig {
                order: 16,
                first_key: 1
            }
        );

        let config: TreeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TreeConfig::default());
    }
}
