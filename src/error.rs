use alloc::string::String;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors reported by [`BPlusTree`](crate::BPlusTree) and [`Order`](crate::Order).
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested order is too small to keep nodes balanced.
    #[error("order {order} is below the minimum of {min}")]
    InvalidOrder {
        /// The rejected order.
        order: usize,
        /// The smallest accepted order.
        min: usize,
    },

    /// The value to remove is not stored in the tree.
    #[error("value not found")]
    NotFound,

    /// The value to insert is already stored in the tree.
    #[error("value already present")]
    DuplicateKey,

    /// [`BPlusTree::validate`](crate::BPlusTree::validate) found broken invariants.
    #[error("tree invariants violated:\n{0}")]
    Corrupted(String),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn error_display() {
        let err = Error::InvalidOrder {
            order: 2,
            min: 3,
        };
        assert_eq!(err.to_string(), "order 2 is below the minimum of 3");
        assert_eq!(Error::NotFound.to_string(), "value not found");
        assert_eq!(Error::DuplicateKey.to_string(), "value already present");
        assert_eq!(Error::Corrupted("leaf 3 unsorted".into()).to_string(), "tree invariants violated:\nleaf 3 unsorted");
    }
}
