use crate::error::{Error, Result};

/// The maximum number of keys a node may hold before it splits.
///
/// Every node other than the root keeps at least [`min_keys`](Order::min_keys)
/// keys, so the order bounds the height of a tree holding `n` values to roughly
/// `log(n) / log(order / 2)`.
///
/// # Examples
///
/// ```
/// use bplus_index::Order;
///
/// let order = Order::new(5).unwrap();
/// assert_eq!(order.get(), 5);
/// assert_eq!(order.min_keys(), 2);
///
/// assert!(Order::new(2).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Order(usize);

impl Order {
    /// The smallest supported order.
    pub const MIN: usize = 3;

    /// The order used by [`BPlusTree::default`](crate::BPlusTree::default).
    pub const DEFAULT: Self = Self(32);

    /// Validates `order` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`] if `order` is below [`Order::MIN`].
    pub fn new(order: usize) -> Result<Self> {
        if order < Self::MIN {
            return Err(Error::InvalidOrder {
                order,
                min: Self::MIN,
            });
        }
        Ok(Self(order))
    }

    /// Returns the maximum number of keys per node.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Returns the minimum number of keys a non-root node must keep.
    #[must_use]
    pub const fn min_keys(self) -> usize {
        self.0 / 2
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<usize> for Order {
    type Error = Error;

    fn try_from(order: usize) -> Result<Self> {
        Self::new(order)
    }
}
