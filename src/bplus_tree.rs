use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;

use crate::error::{Error, Result};
use crate::order::Order;
use crate::raw::{Handle, RawBPlusTree};

/// An ordered index of unique values backed by a B+Tree.
///
/// Values live only in the leaves, which are linked into a doubly linked chain in
/// ascending order, so full scans never touch internal nodes. Internal nodes hold
/// separator keys, each equal to the smallest value of the subtree to its right.
///
/// Equal values are rejected: [`insert`](BPlusTree::insert) returns
/// [`Error::DuplicateKey`](crate::Error::DuplicateKey) and leaves the tree unchanged.
///
/// It is a logic error for a value to be modified in such a way that its ordering
/// relative to any other value, as determined by the [`Ord`] trait, changes while it
/// is in the tree.
///
/// # Examples
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut index = BPlusTree::new(3)?;
/// for value in [5, 3, 21, 9, 1] {
///     index.insert(value)?;
/// }
///
/// assert!(index.contains(&9));
/// assert_eq!(index.min(), Some(&1));
/// assert_eq!(index.max(), Some(&21));
///
/// index.remove(&9)?;
/// assert_eq!(index.iter().copied().collect::<Vec<_>>(), [1, 3, 5, 21]);
/// # Ok::<(), bplus_index::Error>(())
/// ```
///
/// # Concurrency
///
/// All mutation goes through `&mut self`, so sharing a tree between threads takes
/// one lock around the whole tree (for example `Mutex<BPlusTree<T>>`). Rebalancing
/// may touch every level up to the root, so finer-grained locking is not possible.
pub struct BPlusTree<T> {
    raw: RawBPlusTree<T>,
}

/// An iterator over the values of a `BPlusTree`, in ascending order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`]. It walks the
/// leaf chain and never descends the tree. It borrows the tree, so the tree cannot
/// be mutated while the iterator is alive; call [`iter`] again to restart a scan.
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, T> {
    tree: &'a RawBPlusTree<T>,
    front_leaf: Option<Handle>,
    front_index: usize,
    back_leaf: Option<Handle>,
    back_index: usize,
    remaining: usize,
}

/// An owning iterator over the values of a `BPlusTree`, in ascending order.
///
/// This `struct` is created by the [`into_iter`] method on [`BPlusTree`]
/// (provided by the [`IntoIterator`] trait).
///
/// [`into_iter`]: BPlusTree#method.into_iter
pub struct IntoIter<T> {
    inner: alloc::vec::IntoIter<T>,
}

impl<T> BPlusTree<T> {
    /// Creates an empty tree whose nodes hold at most `order` values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOrder`](crate::Error::InvalidOrder) if `order < 3`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let index: BPlusTree<u32> = BPlusTree::new(4)?;
    /// assert_eq!(index.order().get(), 4);
    ///
    /// assert!(matches!(BPlusTree::<u32>::new(2), Err(Error::InvalidOrder { order: 2, .. })));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn new(order: usize) -> Result<Self> {
        Ok(Self::with_order(Order::new(order)?))
    }

    /// Creates an empty tree with an already validated [`Order`].
    #[must_use]
    pub const fn with_order(order: Order) -> Self {
        BPlusTree {
            raw: RawBPlusTree::new(order),
        }
    }

    /// Returns the order the tree was created with.
    #[must_use]
    pub const fn order(&self) -> Order {
        self.raw.order()
    }

    /// Returns the number of values in the tree.
    ///
    /// # Complexity
    ///
    /// O(1)
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the tree contains no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Returns the number of levels in the tree: 0 when empty, 1 while the root is
    /// a leaf.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut index = BPlusTree::new(3)?;
    /// assert_eq!(index.height(), 0);
    /// index.extend([1, 2, 3]);
    /// assert_eq!(index.height(), 1);
    /// index.insert(4)?;
    /// assert_eq!(index.height(), 2);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Returns the smallest value, or `None` if the tree is empty.
    ///
    /// # Complexity
    ///
    /// O(1) - reads the cached first leaf.
    #[must_use]
    pub fn min(&self) -> Option<&T> {
        self.raw.first()
    }

    /// Returns the largest value, or `None` if the tree is empty.
    ///
    /// # Complexity
    ///
    /// O(1) - reads the cached last leaf.
    #[must_use]
    pub fn max(&self) -> Option<&T> {
        self.raw.last()
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Gets an iterator that visits the values in ascending order.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let index: BPlusTree<_> = [3, 1, 2].into_iter().collect();
    /// let mut iter = index.iter();
    /// assert_eq!(iter.next(), Some(&1));
    /// assert_eq!(iter.next_back(), Some(&3));
    /// assert_eq!(iter.next(), Some(&2));
    /// assert_eq!(iter.next(), None);
    /// ```
    ///
    /// # Complexity
    ///
    /// O(1) to create the iterator; amortized O(1) per step along the leaf chain.
    pub fn iter(&self) -> Iter<'_, T> {
        let back_index = self.raw.last_leaf().map_or(0, |h| self.raw.node(h).key_count().saturating_sub(1));
        Iter {
            tree: &self.raw,
            front_leaf: self.raw.first_leaf(),
            front_index: 0,
            back_leaf: self.raw.last_leaf(),
            back_index,
            remaining: self.raw.len(),
        }
    }
}

impl<T: Ord + Clone> BPlusTree<T> {
    /// Inserts a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`](crate::Error::DuplicateKey) if an equal value
    /// is already stored; the tree is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let mut index = BPlusTree::new(3)?;
    /// index.insert(2)?;
    /// assert_eq!(index.insert(2), Err(Error::DuplicateKey));
    /// assert_eq!(index.len(), 1);
    /// # Ok::<(), Error>(())
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn insert(&mut self, value: T) -> Result<()> {
        self.raw.insert(value)
    }

    /// Removes a value and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) if no equal value is
    /// stored; the tree is left unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error};
    ///
    /// let mut index: BPlusTree<_> = [1, 2, 3].into_iter().collect();
    /// assert_eq!(index.remove(&2), Ok(2));
    /// assert_eq!(index.remove(&2), Err(Error::NotFound));
    /// ```
    ///
    /// # Complexity
    ///
    /// O(log n)
    pub fn remove<Q>(&mut self, value: &Q) -> Result<T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove(value)
    }

    /// Returns `true` if the tree contains a value equal to `value`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let index: BPlusTree<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
    /// assert!(index.contains("a"));
    /// assert!(!index.contains("c"));
    /// ```
    #[must_use]
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.contains(value)
    }

    /// Returns a reference to the stored value equal to `value`, if any.
    #[must_use]
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(value)
    }

    /// Removes and returns the smallest value, or `None` if the tree is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut index: BPlusTree<_> = [2, 1].into_iter().collect();
    /// while let Some(n) = index.pop_first() {
    ///     assert!(index.iter().all(|&k| k > n));
    /// }
    /// assert!(index.is_empty());
    /// ```
    pub fn pop_first(&mut self) -> Option<T> {
        self.raw.pop_first()
    }

    /// Removes and returns the largest value, or `None` if the tree is empty.
    pub fn pop_last(&mut self) -> Option<T> {
        self.raw.pop_last()
    }

    /// Checks every structural invariant of the tree: sorted keys, node fill,
    /// equal leaf depth, separator keys equal to right-subtree minimums, parent
    /// links, and a leaf chain that visits every leaf once in both directions.
    ///
    /// A violation is always a bug in this crate; there is no repair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupted`](crate::Error::Corrupted) listing every violation.
    ///
    /// # Complexity
    ///
    /// O(n)
    pub fn validate(&self) -> Result<()> {
        self.raw.validate()
    }
}

impl<T: Clone> Clone for BPlusTree<T> {
    fn clone(&self) -> Self {
        BPlusTree {
            raw: self.raw.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for BPlusTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: PartialEq> PartialEq for BPlusTree<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Eq> Eq for BPlusTree<T> {}

impl<T> Default for BPlusTree<T> {
    /// Creates an empty tree of order [`Order::DEFAULT`].
    fn default() -> Self {
        BPlusTree::with_order(Order::DEFAULT)
    }
}

impl<T: Ord + Clone> FromIterator<T> for BPlusTree<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tree = BPlusTree::default();
        tree.extend(iter);
        tree
    }
}

impl<T: Ord + Clone> Extend<T> for BPlusTree<T> {
    /// Inserts every value, skipping ones already present.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            // Duplicates are skipped, matching `BTreeSet::extend`.
            match self.insert(value) {
                Ok(()) | Err(Error::DuplicateKey) => {}
                Err(err) => unreachable!("insert can only fail on a duplicate: {err}"),
            }
        }
    }
}

impl<'a, T: 'a + Ord + Copy> Extend<&'a T> for BPlusTree<T> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().copied());
    }
}

impl<T> IntoIterator for BPlusTree<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    /// Moves the values out in ascending order.
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let index: BPlusTree<_> = [4, 2, 3, 1].into_iter().collect();
    /// let v: Vec<_> = index.into_iter().collect();
    /// assert_eq!(v, [1, 2, 3, 4]);
    /// ```
    fn into_iter(mut self) -> IntoIter<T> {
        IntoIter {
            inner: self.raw.drain_to_vec().into_iter(),
        }
    }
}

impl<'a, T> IntoIterator for &'a BPlusTree<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }

        let leaf = self.tree.node(self.front_leaf?).as_leaf();
        let value = leaf.key(self.front_index);
        self.remaining -= 1;
        self.front_index += 1;

        if self.front_index >= leaf.key_count() {
            self.front_leaf = leaf.next();
            self.front_index = 0;
        }

        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }

    fn last(mut self) -> Option<&'a T> {
        self.next_back()
    }
}

impl<'a, T> DoubleEndedIterator for Iter<'a, T> {
    fn next_back(&mut self) -> Option<&'a T> {
        if self.remaining == 0 {
            return None;
        }

        let leaf = self.tree.node(self.back_leaf?).as_leaf();
        let value = leaf.key(self.back_index);
        self.remaining -= 1;

        if self.back_index == 0 {
            self.back_leaf = leaf.prev();
            if let Some(prev) = self.back_leaf {
                self.back_index = self.tree.node(prev).key_count().saturating_sub(1);
            }
        } else {
            self.back_index -= 1;
        }

        Some(value)
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<T> FusedIterator for Iter<'_, T> {}

impl<T> Clone for Iter<'_, T> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            front_leaf: self.front_leaf,
            front_index: self.front_index,
            back_leaf: self.back_leaf,
            back_index: self.back_index,
            remaining: self.remaining,
        }
    }
}

impl<T> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for IntoIter<T> {
    fn next_back(&mut self) -> Option<T> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for IntoIter<T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl<T> FusedIterator for IntoIter<T> {}

impl<T: fmt::Debug> fmt::Debug for IntoIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntoIter").field(&self.inner.as_slice()).finish()
    }
}
