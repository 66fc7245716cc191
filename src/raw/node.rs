use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;

/// Keys held inline before node storage spills to the heap.
///
/// Covers orders up to 7 (one spare slot for the split); larger orders spill once,
/// at creation, to a buffer sized for the order.
pub(crate) const INLINE_KEYS: usize = 8;

pub(crate) type Keys<K> = SmallVec<[K; INLINE_KEYS]>;
pub(crate) type Children = SmallVec<[Handle; INLINE_KEYS + 1]>;

#[allow(clippy::large_enum_variant)]
#[derive(Clone, Debug)]
pub(crate) enum Node<K> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K>),
}

// B+Tree: internal nodes only route; every key also lives in some leaf.
#[derive(Clone, Debug)]
pub(crate) struct InternalNode<K> {
    parent: Option<Handle>,
    index_in_parent: usize,
    // keys[i] is the minimum key reachable through children[i + 1].
    // Holds one extra key transiently while the node is being split.
    keys: Keys<K>,
    children: Children,
}

#[derive(Clone, Debug)]
pub(crate) struct LeafNode<K> {
    parent: Option<Handle>,
    index_in_parent: usize,
    prev: Option<Handle>,
    next: Option<Handle>,
    keys: Keys<K>,
}

/// Result of searching for a key in a leaf.
pub(crate) enum SearchResult {
    /// Key was found at the given index.
    Found(usize),
    /// Key was not found; index is where it would be inserted.
    NotFound(usize),
}

impl<K> Node<K> {
    pub(crate) fn as_leaf(&self) -> &LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn into_leaf(self) -> LeafNode<K> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    pub(crate) fn into_internal(self) -> InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys().len()
    }

    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Internal(internal) => internal.keys(),
            Node::Leaf(leaf) => leaf.keys(),
        }
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        match self {
            Node::Internal(internal) => internal.parent,
            Node::Leaf(leaf) => leaf.parent,
        }
    }

    pub(crate) fn index_in_parent(&self) -> usize {
        match self {
            Node::Internal(internal) => internal.index_in_parent,
            Node::Leaf(leaf) => leaf.index_in_parent,
        }
    }

    /// Records where this node hangs in the tree.
    pub(crate) fn set_parent(&mut self, parent: Option<Handle>, index: usize) {
        let (slot, index_slot) = match self {
            Node::Internal(internal) => (&mut internal.parent, &mut internal.index_in_parent),
            Node::Leaf(leaf) => (&mut leaf.parent, &mut leaf.index_in_parent),
        };
        *slot = parent;
        *index_slot = index;
    }
}

impl<K> InternalNode<K> {
    /// Creates an empty internal node with room for `order` keys plus the split slot.
    pub(crate) fn with_capacity(order: usize) -> Self {
        Self {
            parent: None,
            index_in_parent: 0,
            keys: SmallVec::with_capacity(order + 1),
            children: SmallVec::with_capacity(order + 2),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Returns the index of the child whose subtree may contain `key`.
    #[inline]
    pub(crate) fn search_child<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        // A key equal to keys[i] is the minimum of children[i + 1].
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// Replaces the separator at `index`, returning the old one.
    pub(crate) fn replace_key(&mut self, index: usize, key: K) -> K {
        core::mem::replace(&mut self.keys[index], key)
    }

    /// Sets the only child of a node that has no keys yet.
    pub(crate) fn set_first_child(&mut self, child: Handle) {
        debug_assert!(self.children.is_empty(), "first child set twice");
        self.children.push(child);
    }

    /// Inserts `key` at `index` with `child` as its right-hand child.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the key at `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Pops the last key together with the last child.
    pub(crate) fn pop_child(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop()?;
        Some((key, child))
    }

    /// Pops the first key together with the first child.
    pub(crate) fn pop_child_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        Some((self.keys.remove(0), self.children.remove(0)))
    }

    /// Splits an overfull node. Keys `[0, mid)` and children `[0, mid]` stay,
    /// `keys[mid]` is returned for promotion and the rest move to the new right node.
    pub(crate) fn split(&mut self, order: usize) -> (K, InternalNode<K>) {
        debug_assert_eq!(self.keys.len(), order + 1, "split of a node that is not overfull");
        let mid = (order + 1) / 2;

        let mut right = InternalNode::with_capacity(order);
        right.keys.extend(self.keys.drain(mid + 1..));
        right.children.extend(self.children.drain(mid + 1..));

        let median = self.keys.pop().expect("overfull node has a median key");
        (median, right)
    }

    /// Absorbs `right`, with `separator` pulled down from the parent between them.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K> LeafNode<K> {
    pub(crate) fn with_capacity(order: usize) -> Self {
        Self {
            parent: None,
            index_in_parent: 0,
            prev: None,
            next: None,
            keys: SmallVec::with_capacity(order + 1),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn prev(&self) -> Option<Handle> {
        self.prev
    }

    pub(crate) fn set_prev(&mut self, prev: Option<Handle>) {
        self.prev = prev;
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    pub(crate) fn first_key(&self) -> Option<&K> {
        self.keys.first()
    }

    pub(crate) fn last_key(&self) -> Option<&K> {
        self.keys.last()
    }

    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    pub(crate) fn insert(&mut self, index: usize, key: K) {
        self.keys.insert(index, key);
    }

    pub(crate) fn remove(&mut self, index: usize) -> K {
        self.keys.remove(index)
    }

    pub(crate) fn push(&mut self, key: K) {
        self.keys.push(key);
    }

    pub(crate) fn push_front(&mut self, key: K) {
        self.keys.insert(0, key);
    }

    pub(crate) fn pop(&mut self) -> Option<K> {
        self.keys.pop()
    }

    pub(crate) fn pop_front(&mut self) -> Option<K> {
        if self.keys.is_empty() {
            return None;
        }
        Some(self.keys.remove(0))
    }

    /// Takes every key, leaving the leaf empty.
    pub(crate) fn take_all(&mut self) -> Keys<K> {
        core::mem::take(&mut self.keys)
    }

    /// Splits an overfull leaf. Keys `[0, mid)` stay and keys `[mid, order]` move to
    /// the returned right leaf, whose first key becomes the separator. Links are
    /// left for the caller to fix.
    pub(crate) fn split(&mut self, order: usize) -> LeafNode<K> {
        debug_assert_eq!(self.keys.len(), order + 1, "split of a leaf that is not overfull");
        let mid = (order + 1) / 2;

        let mut right = LeafNode::with_capacity(order);
        right.keys.extend(self.keys.drain(mid..));
        right
    }

    /// Absorbs `right` and takes over its `next` link.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K>) {
        self.keys.append(&mut right.keys);
        self.next = right.next;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn leaf_of(order: usize, keys: &[i32]) -> LeafNode<i32> {
        let mut leaf = LeafNode::with_capacity(order);
        for &key in keys {
            leaf.push(key);
        }
        leaf
    }

    #[test]
    fn search_child_routes_equal_keys_right() {
        let mut node = InternalNode::with_capacity(3);
        node.set_first_child(Handle::from_slot(0));
        node.push_child(10, Handle::from_slot(1));
        node.push_child(20, Handle::from_slot(2));

        assert_eq!(node.search_child(&5), 0);
        assert_eq!(node.search_child(&10), 1);
        assert_eq!(node.search_child(&15), 1);
        assert_eq!(node.search_child(&20), 2);
        assert_eq!(node.search_child(&99), 2);
    }

    #[test]
    fn leaf_split_keeps_the_larger_half_right() {
        let mut left = leaf_of(3, &[1, 2, 3, 4]);
        let right = left.split(3);
        assert_eq!(left.keys(), &[1, 2]);
        assert_eq!(right.keys(), &[3, 4]);

        let mut left = leaf_of(4, &[1, 2, 3, 4, 5]);
        let right = left.split(4);
        assert_eq!(left.keys(), &[1, 2]);
        assert_eq!(right.keys(), &[3, 4, 5]);
    }

    #[test]
    fn internal_split_promotes_the_median() {
        for order in 3..12 {
            let mut node = InternalNode::with_capacity(order);
            node.set_first_child(Handle::from_slot(0));
            for i in 0..=order {
                node.push_child(i * 10, Handle::from_slot(i + 1));
            }

            let (median, right) = node.split(order);
            let min_keys = order / 2;
            assert!(node.key_count() >= min_keys, "order {order}: left too small");
            assert!(right.key_count() >= min_keys, "order {order}: right too small");
            assert_eq!(node.key_count() + right.key_count() + 1, order + 1);
            assert_eq!(node.child_count(), node.key_count() + 1);
            assert_eq!(right.child_count(), right.key_count() + 1);
            assert_eq!(median, node.key_count() * 10);
            assert_eq!(right.children()[0], Handle::from_slot(node.key_count() + 1));
        }
    }

    #[test]
    fn merge_folds_in_separator() {
        let mut left = InternalNode::with_capacity(3);
        left.set_first_child(Handle::from_slot(0));
        left.push_child(5, Handle::from_slot(1));
        let mut right = InternalNode::with_capacity(3);
        right.set_first_child(Handle::from_slot(2));
        right.push_child(20, Handle::from_slot(3));

        left.merge_with_right(10, right);
        assert_eq!(left.keys(), &[5, 10, 20]);
        let slots: Vec<_> = left.children().iter().map(|h| h.slot()).collect();
        assert_eq!(slots, [0, 1, 2, 3]);
    }

    #[test]
    fn rotation_helpers() {
        let mut node = InternalNode::with_capacity(3);
        node.set_first_child(Handle::from_slot(0));
        node.push_child(10, Handle::from_slot(1));
        node.push_child(20, Handle::from_slot(2));

        assert_eq!(node.pop_child_front(), Some((10, Handle::from_slot(0))));
        assert_eq!(node.pop_child(), Some((20, Handle::from_slot(2))));
        assert_eq!(node.pop_child(), None);
        assert_eq!(node.child_count(), 1);

        let mut leaf = leaf_of(3, &[1, 2, 3]);
        assert_eq!(leaf.pop_front(), Some(1));
        assert_eq!(leaf.pop(), Some(3));
        leaf.push_front(0);
        assert_eq!(leaf.keys(), &[0, 2]);
    }

    #[test]
    fn small_orders_stay_inline() {
        let mut leaf = leaf_of(7, &[1, 2, 3, 4, 5, 6, 7]);
        leaf.insert(7, 8);
        assert!(!leaf.keys.spilled());

        let mut node = InternalNode::with_capacity(7);
        node.set_first_child(Handle::from_slot(0));
        for slot in 1..=8usize {
            node.push_child(slot, Handle::from_slot(slot));
        }
        assert!(!node.keys.spilled());
        assert!(!node.children.spilled());

        let wide: LeafNode<i32> = LeafNode::with_capacity(32);
        assert!(wide.keys.spilled());
        assert!(wide.keys.capacity() >= 33);
    }
}
