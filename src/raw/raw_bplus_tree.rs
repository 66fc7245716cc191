use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::borrow::Borrow;

use log::{debug, trace};

use super::arena::Arena;
use super::handle::Handle;
use super::node::{InternalNode, LeafNode, Node, SearchResult};
use crate::error::{Error, Result};
use crate::order::Order;

/// The core B+Tree implementation backing `BPlusTree`.
#[derive(Clone, Debug)]
pub(crate) struct RawBPlusTree<K> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K>>,
    /// Handle to the root node, if the tree is non-empty.
    root: Option<Handle>,
    /// Total number of keys in the tree.
    len: usize,
    /// Handle to the first (leftmost) leaf, for forward iteration and `first`.
    first_leaf: Option<Handle>,
    /// Handle to the last (rightmost) leaf, for backward iteration and `last`.
    last_leaf: Option<Handle>,
    order: Order,
}

/// Bookkeeping gathered while validating the tree.
#[derive(Default)]
struct Walk {
    leaf_depth: Option<usize>,
    leaves: Vec<Handle>,
    nodes: usize,
}

impl<K> RawBPlusTree<K> {
    pub(crate) const fn new(order: Order) -> Self {
        Self {
            nodes: Arena::new(),
            root: None,
            len: 0,
            first_leaf: None,
            last_leaf: None,
            order,
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
        self.len = 0;
        self.first_leaf = None;
        self.last_leaf = None;
    }

    pub(crate) fn first_leaf(&self) -> Option<Handle> {
        self.first_leaf
    }

    pub(crate) fn last_leaf(&self) -> Option<Handle> {
        self.last_leaf
    }

    pub(crate) fn node(&self, handle: Handle) -> &Node<K> {
        self.nodes.get(handle)
    }

    /// Returns the smallest key in O(1) through the cached first leaf.
    pub(crate) fn first(&self) -> Option<&K> {
        self.nodes.get(self.first_leaf?).as_leaf().first_key()
    }

    /// Returns the largest key in O(1) through the cached last leaf.
    pub(crate) fn last(&self) -> Option<&K> {
        self.nodes.get(self.last_leaf?).as_leaf().last_key()
    }

    /// Number of levels, counting the leaf level; 0 for an empty tree.
    pub(crate) fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(handle) = current {
            height += 1;
            current = match self.nodes.get(handle) {
                Node::Internal(internal) => Some(internal.child(0)),
                Node::Leaf(_) => None,
            };
        }
        height
    }

    /// Moves every key out in ascending order by walking the leaf chain, leaving
    /// the tree empty. O(n), no rebalancing.
    pub(crate) fn drain_to_vec(&mut self) -> Vec<K> {
        let mut result = Vec::with_capacity(self.len);
        let mut current = self.first_leaf;

        while let Some(handle) = current {
            let leaf = self.nodes.get_mut(handle).as_leaf_mut();
            current = leaf.next();
            result.extend(leaf.take_all());
        }

        self.clear();
        result
    }

    /// Points every child of `parent` from `from` onwards back at its slot.
    fn reindex_children(&mut self, parent: Handle, from: usize) {
        for index in from..self.nodes.get(parent).as_internal().child_count() {
            let child = self.nodes.get(parent).as_internal().child(index);
            self.nodes.get_mut(child).set_parent(Some(parent), index);
        }
    }

    /// Returns the left and right siblings of the child at `index` under `parent`.
    fn siblings(&self, parent: Handle, index: usize) -> (Option<Handle>, Option<Handle>) {
        let internal = self.nodes.get(parent).as_internal();
        let left = index.checked_sub(1).map(|i| internal.child(i));
        let right = (index + 1 < internal.child_count()).then(|| internal.child(index + 1));
        (left, right)
    }

    /// Returns the minimum key reachable from `handle`.
    fn subtree_min(&self, handle: Handle) -> Option<&K> {
        let mut current = handle;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(0),
                Node::Leaf(leaf) => return leaf.first_key(),
            }
        }
    }
}

impl<K: Ord + Clone> RawBPlusTree<K> {
    /// Descends from the root to the leaf whose range covers `key`.
    pub(crate) fn find_leaf<Q>(&self, key: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root?;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.search_child(key)),
                Node::Leaf(_) => return Some(current),
            }
        }
    }

    /// Searches for a key and returns the leaf handle and index if found.
    pub(crate) fn search<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf = self.find_leaf(key)?;
        match self.nodes.get(leaf).as_leaf().search(key) {
            SearchResult::Found(index) => Some((leaf, index)),
            SearchResult::NotFound(_) => None,
        }
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&K>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf, index) = self.search(key)?;
        Some(self.nodes.get(leaf).as_leaf().key(index))
    }

    pub(crate) fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.search(key).is_some()
    }

    /// Inserts a key, rejecting it if an equal key is already stored.
    pub(crate) fn insert(&mut self, key: K) -> Result<()> {
        let order = self.order.get();
        let Some(leaf_handle) = self.find_leaf(&key) else {
            let mut leaf = LeafNode::with_capacity(order);
            leaf.push(key);
            let handle = self.nodes.alloc(Node::Leaf(leaf));
            self.root = Some(handle);
            self.first_leaf = Some(handle);
            self.last_leaf = Some(handle);
            self.len = 1;
            return Ok(());
        };

        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let index = match leaf.search(&key) {
            SearchResult::Found(_) => return Err(Error::DuplicateKey),
            SearchResult::NotFound(index) => index,
        };
        // Every leaf but the first starts with its separator, and an equal key would
        // have been found, so only the first leaf can gain a new minimum.
        debug_assert!(index > 0 || self.first_leaf == Some(leaf_handle), "insert below separator of {leaf_handle:?}");

        leaf.insert(index, key);
        let overflow = leaf.key_count() > order;
        self.len += 1;

        if overflow {
            self.split_leaf(leaf_handle);
        }
        Ok(())
    }

    /// Splits an overfull leaf and threads the new right half into the leaf chain.
    fn split_leaf(&mut self, handle: Handle) {
        let leaf = self.nodes.get_mut(handle).as_leaf_mut();
        let mut right = leaf.split(self.order.get());
        let old_next = leaf.next();

        // The separator is a copy; the key itself stays in the right leaf.
        let separator = right.key(0).clone();
        right.set_prev(Some(handle));
        right.set_next(old_next);
        let right_handle = self.nodes.alloc(Node::Leaf(right));

        self.nodes.get_mut(handle).as_leaf_mut().set_next(Some(right_handle));
        match old_next {
            Some(next) => self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(right_handle)),
            None => self.last_leaf = Some(right_handle),
        }

        debug!("split leaf {handle:?}, new right sibling {right_handle:?}");
        self.insert_into_parent(handle, separator, right_handle);
    }

    /// Splits an overfull internal node, re-parenting the children that move right.
    fn split_internal(&mut self, handle: Handle) {
        let order = self.order.get();
        let (median, right) = self.nodes.get_mut(handle).as_internal_mut().split(order);
        let right_handle = self.nodes.alloc(Node::Internal(right));
        self.reindex_children(right_handle, 0);

        debug!("split internal {handle:?}, new right sibling {right_handle:?}");
        self.insert_into_parent(handle, median, right_handle);
    }

    /// Hangs `right` next to `left` under their parent, growing a new root when
    /// `left` was the root.
    fn insert_into_parent(&mut self, left: Handle, separator: K, right: Handle) {
        let order = self.order.get();
        let node = self.nodes.get(left);

        let Some(parent) = node.parent() else {
            let mut root = InternalNode::with_capacity(order);
            root.set_first_child(left);
            root.push_child(separator, right);
            let root_handle = self.nodes.alloc(Node::Internal(root));
            self.reindex_children(root_handle, 0);
            self.root = Some(root_handle);
            debug!("root split, tree grew to height {}", self.height());
            return;
        };

        let index = node.index_in_parent();
        let internal = self.nodes.get_mut(parent).as_internal_mut();
        internal.insert_child(index, separator, right);
        let overflow = internal.key_count() > order;
        self.reindex_children(parent, index + 1);

        if overflow {
            self.split_internal(parent);
        }
    }

    /// Rewrites the separator that must equal the minimum of `handle`'s subtree.
    ///
    /// That separator sits in the closest ancestor reached through a child other than
    /// the leftmost; along a leftmost spine there is none.
    fn update_index(&mut self, handle: Handle) {
        let Some(min) = self.subtree_min(handle).cloned() else {
            return;
        };

        let mut current = handle;
        while let Some(parent) = self.nodes.get(current).parent() {
            let index = self.nodes.get(current).index_in_parent();
            if index > 0 {
                let internal = self.nodes.get_mut(parent).as_internal_mut();
                if *internal.key(index - 1) != min {
                    trace!("repaired separator {} of {parent:?}", index - 1);
                    internal.replace_key(index - 1, min);
                }
                return;
            }
            current = parent;
        }
    }

    /// Removes a key from the tree and returns it.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Result<K>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let (leaf_handle, index) = self.search(key).ok_or(Error::NotFound)?;
        let removed = self.nodes.get_mut(leaf_handle).as_leaf_mut().remove(index);
        self.len -= 1;

        if self.len == 0 {
            self.clear();
            return Ok(removed);
        }

        self.rebalance_leaf(leaf_handle);
        Ok(removed)
    }

    pub(crate) fn pop_first(&mut self) -> Option<K> {
        let key = self.first()?.clone();
        self.remove(&key).ok()
    }

    pub(crate) fn pop_last(&mut self) -> Option<K> {
        let key = self.last()?.clone();
        self.remove(&key).ok()
    }

    /// Restores the minimum fill of a leaf that just lost a key.
    fn rebalance_leaf(&mut self, handle: Handle) {
        let min_keys = self.order.min_keys();
        let node = self.nodes.get(handle);
        let Some(parent) = node.parent() else {
            return;
        };

        if node.key_count() >= min_keys {
            self.update_index(handle);
            return;
        }

        let index = node.index_in_parent();
        let (left, right) = self.siblings(parent, index);
        if let Some(right) = right
            && self.nodes.get(right).key_count() > min_keys
        {
            self.rotate_leaf_from_right(handle, right, parent, index);
        } else if let Some(left) = left
            && self.nodes.get(left).key_count() > min_keys
        {
            self.rotate_leaf_from_left(handle, left, parent, index);
        } else if let Some(right) = right {
            self.merge_leaves(handle, right, parent, index);
        } else if let Some(left) = left {
            self.merge_leaves(left, handle, parent, index - 1);
        } else {
            unreachable!("non-root leaf {handle:?} has no siblings");
        }
    }

    /// Moves the right sibling's first key to the end of `handle`.
    fn rotate_leaf_from_right(&mut self, handle: Handle, right: Handle, parent: Handle, index: usize) {
        let right_leaf = self.nodes.get_mut(right).as_leaf_mut();
        let borrowed = right_leaf.pop_front().expect("right sibling has keys to lend");
        let separator = right_leaf.key(0).clone();

        self.nodes.get_mut(handle).as_leaf_mut().push(borrowed);
        self.nodes.get_mut(parent).as_internal_mut().replace_key(index, separator);
        trace!("rotated a key from leaf {right:?} into {handle:?}");

        // `handle` may have been emptied, in which case its minimum changed.
        self.update_index(handle);
    }

    /// Moves the left sibling's last key to the front of `handle`.
    fn rotate_leaf_from_left(&mut self, handle: Handle, left: Handle, parent: Handle, index: usize) {
        let borrowed = self.nodes.get_mut(left).as_leaf_mut().pop().expect("left sibling has keys to lend");

        self.nodes.get_mut(parent).as_internal_mut().replace_key(index - 1, borrowed.clone());
        self.nodes.get_mut(handle).as_leaf_mut().push_front(borrowed);
        trace!("rotated a key from leaf {left:?} into {handle:?}");
    }

    /// Merges two adjacent leaves into `left`, freeing `right`.
    fn merge_leaves(&mut self, left: Handle, right: Handle, parent: Handle, separator_index: usize) {
        debug_assert_ne!(self.first_leaf, Some(right), "first leaf merged into its left sibling");
        let right_leaf = self.nodes.take(right).into_leaf();

        let left_leaf = self.nodes.get_mut(left).as_leaf_mut();
        left_leaf.merge_with_right(right_leaf);
        match left_leaf.next() {
            Some(next) => self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(left)),
            None => self.last_leaf = Some(left),
        }

        let (_, removed) = self.nodes.get_mut(parent).as_internal_mut().remove_child(separator_index);
        debug_assert_eq!(removed, right, "separator {separator_index} of {parent:?} did not lead to {right:?}");
        self.reindex_children(parent, separator_index + 1);
        debug!("merged leaf {right:?} into {left:?}");

        self.update_index(left);
        self.rebalance_internal(parent);
    }

    /// Restores the minimum fill of an internal node that just lost a child, or
    /// collapses the root when it is left with a single child.
    fn rebalance_internal(&mut self, handle: Handle) {
        let min_keys = self.order.min_keys();
        let node = self.nodes.get(handle);

        let Some(parent) = node.parent() else {
            if node.key_count() == 0 {
                let child = node.as_internal().child(0);
                self.nodes.free(handle);
                self.nodes.get_mut(child).set_parent(None, 0);
                self.root = Some(child);
                debug!("root collapsed into {child:?}, tree shrank to height {}", self.height());
            }
            return;
        };

        if node.key_count() >= min_keys {
            return;
        }

        let index = node.index_in_parent();
        let (left, right) = self.siblings(parent, index);
        if let Some(right) = right
            && self.nodes.get(right).key_count() > min_keys
        {
            self.rotate_internal_from_right(handle, right, parent, index);
        } else if let Some(left) = left
            && self.nodes.get(left).key_count() > min_keys
        {
            self.rotate_internal_from_left(handle, left, parent, index);
        } else if let Some(right) = right {
            self.merge_internals(handle, right, parent, index);
        } else if let Some(left) = left {
            self.merge_internals(left, handle, parent, index - 1);
        } else {
            unreachable!("non-root internal node {handle:?} has no siblings");
        }
    }

    /// Pulls the parent separator down as the last key of `handle` and adopts the
    /// right sibling's first child; the sibling's first key moves up.
    fn rotate_internal_from_right(&mut self, handle: Handle, right: Handle, parent: Handle, index: usize) {
        let (first_key, first_child) =
            self.nodes.get_mut(right).as_internal_mut().pop_child_front().expect("right sibling has keys to lend");
        let separator = self.nodes.get_mut(parent).as_internal_mut().replace_key(index, first_key);

        let internal = self.nodes.get_mut(handle).as_internal_mut();
        internal.push_child(separator, first_child);
        let last = internal.child_count() - 1;
        self.nodes.get_mut(first_child).set_parent(Some(handle), last);
        self.reindex_children(right, 0);
        trace!("rotated child {first_child:?} from {right:?} into {handle:?}");
    }

    /// Pulls the parent separator down as the first key of `handle` and adopts the
    /// left sibling's last child; the sibling's last key moves up.
    fn rotate_internal_from_left(&mut self, handle: Handle, left: Handle, parent: Handle, index: usize) {
        let (last_key, last_child) =
            self.nodes.get_mut(left).as_internal_mut().pop_child().expect("left sibling has keys to lend");
        let separator = self.nodes.get_mut(parent).as_internal_mut().replace_key(index - 1, last_key);

        self.nodes.get_mut(handle).as_internal_mut().push_child_front(separator, last_child);
        self.reindex_children(handle, 0);
        trace!("rotated child {last_child:?} from {left:?} into {handle:?}");
    }

    /// Merges two adjacent internal nodes into `left` around their parent separator.
    fn merge_internals(&mut self, left: Handle, right: Handle, parent: Handle, separator_index: usize) {
        let right_node = self.nodes.take(right).into_internal();
        let (separator, removed) = self.nodes.get_mut(parent).as_internal_mut().remove_child(separator_index);
        debug_assert_eq!(removed, right, "separator {separator_index} of {parent:?} did not lead to {right:?}");

        let left_node = self.nodes.get_mut(left).as_internal_mut();
        let first_moved = left_node.child_count();
        left_node.merge_with_right(separator, right_node);

        self.reindex_children(left, first_moved);
        self.reindex_children(parent, separator_index + 1);
        debug!("merged internal {right:?} into {left:?}");

        self.rebalance_internal(parent);
    }

    /// Checks every structural invariant, collecting all violations.
    pub(crate) fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        match self.root {
            None => {
                if self.len != 0 {
                    errors.push(format!("empty tree has len {}", self.len));
                }
                if self.first_leaf.is_some() || self.last_leaf.is_some() {
                    errors.push("empty tree still caches first/last leaf".into());
                }
                if !self.nodes.is_empty() {
                    errors.push(format!("empty tree still holds {} nodes", self.nodes.len()));
                }
            }
            Some(root) => {
                let mut walk = Walk::default();
                self.validate_node(root, None, 0, 0, &mut walk, &mut errors);
                self.validate_leaf_chain(&walk.leaves, &mut errors);

                let count: usize = walk.leaves.iter().map(|&h| self.nodes.get(h).key_count()).sum();
                if count != self.len {
                    errors.push(format!("len mismatch: len={}, leaves hold {count}", self.len));
                }
                if walk.nodes != self.nodes.len() {
                    errors.push(format!("{} nodes reachable but {} allocated", walk.nodes, self.nodes.len()));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Corrupted(errors.join("\n")))
        }
    }

    /// Validates the subtree at `handle`, returning its minimum and maximum keys.
    fn validate_node(
        &self,
        handle: Handle,
        parent: Option<Handle>,
        index: usize,
        depth: usize,
        walk: &mut Walk,
        errors: &mut Vec<String>,
    ) -> Option<(K, K)> {
        walk.nodes += 1;
        let node = self.nodes.get(handle);

        if node.parent() != parent || (parent.is_some() && node.index_in_parent() != index) {
            errors.push(format!(
                "{handle:?} links to ({:?}, {}) but hangs at ({parent:?}, {index})",
                node.parent(),
                node.index_in_parent()
            ));
        }

        let keys = node.keys();
        if keys.len() > self.order.get() {
            errors.push(format!("{handle:?} holds {} keys, order is {}", keys.len(), self.order.get()));
        }
        if parent.is_some() && keys.len() < self.order.min_keys() {
            errors.push(format!("{handle:?} holds {} keys, minimum is {}", keys.len(), self.order.min_keys()));
        }
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            errors.push(format!("{handle:?} keys are not strictly ascending"));
        }

        match node {
            Node::Leaf(_) => {
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        errors.push(format!("leaf {handle:?} at depth {depth}, expected {expected}"));
                    }
                    Some(_) => {}
                }
                walk.leaves.push(handle);

                if keys.is_empty() {
                    errors.push(format!("leaf {handle:?} is empty"));
                    return None;
                }
                Some((keys[0].clone(), keys[keys.len() - 1].clone()))
            }
            Node::Internal(internal) => {
                if internal.key_count() == 0 {
                    errors.push(format!("internal {handle:?} has no keys"));
                }
                if internal.child_count() != internal.key_count() + 1 {
                    errors.push(format!(
                        "internal {handle:?} has {} keys but {} children",
                        internal.key_count(),
                        internal.child_count()
                    ));
                    return None;
                }

                let mut min = None;
                let mut max = None;
                for (i, &child) in internal.children().iter().enumerate() {
                    let Some((child_min, child_max)) = self.validate_node(child, Some(handle), i, depth + 1, walk, errors)
                    else {
                        continue;
                    };
                    if i > 0 && *internal.key(i - 1) != child_min {
                        errors.push(format!("separator {} of {handle:?} is not the minimum of child {i}", i - 1));
                    }
                    if i < internal.key_count() && child_max >= *internal.key(i) {
                        errors.push(format!("child {i} of {handle:?} reaches past separator {i}"));
                    }
                    if i == 0 {
                        min = Some(child_min);
                    }
                    max = Some(child_max);
                }
                Some((min?, max?))
            }
        }
    }

    /// Walks the leaf chain and compares it with the leaves found by descent.
    fn validate_leaf_chain(&self, leaves: &[Handle], errors: &mut Vec<String>) {
        if self.first_leaf != leaves.first().copied() {
            errors.push(format!("first_leaf is {:?}, expected {:?}", self.first_leaf, leaves.first()));
        }
        if self.last_leaf != leaves.last().copied() {
            errors.push(format!("last_leaf is {:?}, expected {:?}", self.last_leaf, leaves.last()));
        }

        let mut current = self.first_leaf;
        for (position, &expected) in leaves.iter().enumerate() {
            if current != Some(expected) {
                errors.push(format!("leaf chain reaches {current:?} at position {position}, expected {expected:?}"));
                return;
            }
            let leaf = self.nodes.get(expected).as_leaf();
            let expected_prev = position.checked_sub(1).map(|p| leaves[p]);
            if leaf.prev() != expected_prev {
                errors.push(format!("leaf {expected:?} links back to {:?}, expected {expected_prev:?}", leaf.prev()));
            }
            current = leaf.next();
        }
        if current.is_some() {
            errors.push(format!("leaf chain continues past the last leaf into {current:?}"));
        }

        for pair in leaves.windows(2) {
            let left = self.nodes.get(pair[0]).as_leaf();
            let right = self.nodes.get(pair[1]).as_leaf();
            if let (Some(last), Some(first)) = (left.last_key(), right.first_key())
                && last >= first
            {
                errors.push(format!("leaves {:?} and {:?} overlap", pair[0], pair[1]));
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use alloc::collections::BTreeSet;
    use proptest::prelude::*;

    fn tree_of(order: usize, keys: impl IntoIterator<Item = i32>) -> RawBPlusTree<i32> {
        let mut tree = RawBPlusTree::new(Order::new(order).unwrap());
        for key in keys {
            tree.insert(key).unwrap();
            tree.validate().unwrap();
        }
        tree
    }

    fn keys_of(tree: &RawBPlusTree<i32>) -> Vec<i32> {
        tree.clone().drain_to_vec()
    }

    fn root_keys(tree: &RawBPlusTree<i32>) -> Vec<i32> {
        tree.node(tree.root.unwrap()).keys().to_vec()
    }

    #[test]
    fn first_insert_creates_leaf_root() {
        let tree = tree_of(3, [7]);
        let root = tree.root.unwrap();
        assert_eq!(tree.first_leaf, Some(root));
        assert_eq!(tree.last_leaf, Some(root));
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.first(), Some(&7));
        assert_eq!(tree.last(), Some(&7));
    }

    #[test]
    fn leaf_split_copies_separator_up() {
        let tree = tree_of(3, [1, 2, 3, 4]);
        assert_eq!(tree.height(), 2);
        assert_eq!(root_keys(&tree), [3]);

        let first = tree.node(tree.first_leaf.unwrap()).as_leaf();
        let last = tree.node(tree.last_leaf.unwrap()).as_leaf();
        assert_eq!(first.keys(), &[1, 2]);
        assert_eq!(last.keys(), &[3, 4]);
        assert_eq!(first.next(), tree.last_leaf);
        assert_eq!(last.prev(), tree.first_leaf);
    }

    #[test]
    fn root_split_grows_height() {
        let tree = tree_of(3, 1..=10);
        assert_eq!(tree.height(), 3);
        assert_eq!(keys_of(&tree), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_insert_leaves_tree_unchanged() {
        let mut tree = tree_of(3, [5, 3, 8, 1]);
        assert_eq!(tree.insert(3), Err(Error::DuplicateKey));
        assert_eq!(tree.len(), 4);
        assert_eq!(keys_of(&tree), [1, 3, 5, 8]);
        tree.validate().unwrap();
    }

    #[test]
    fn removing_leaf_minimum_repairs_ancestor_separator() {
        // Leaves: [10, 20, 30] [40, 50, 60]; the right leaf stays above minimum.
        let mut tree = tree_of(5, [10, 20, 30, 40, 50, 60]);
        assert_eq!(root_keys(&tree), [40]);

        assert_eq!(tree.remove(&40), Ok(40));
        assert_eq!(root_keys(&tree), [50]);
        tree.validate().unwrap();
    }

    #[test]
    fn repair_reaches_past_leftmost_spine() {
        let mut tree = tree_of(3, 1..=20);
        tree.validate().unwrap();

        // The root separator is the minimum of a leaf two levels down.
        let root = tree.node(tree.root.unwrap()).as_internal();
        let target = *root.key(0);
        assert_eq!(tree.remove(&target), Ok(target));
        tree.validate().unwrap();
        assert!(!tree.contains(&target));
        assert!(!root_keys(&tree).contains(&target));
    }

    #[test]
    fn underflow_rotates_from_right_sibling() {
        let mut tree = tree_of(3, [1, 2, 3, 4, 5]);
        // Leaves: [1, 2] [3, 4, 5]
        assert_eq!(tree.remove(&1), Ok(1));
        assert_eq!(tree.remove(&2), Ok(2));
        tree.validate().unwrap();
        assert_eq!(root_keys(&tree), [4]);
        assert_eq!(tree.node(tree.first_leaf.unwrap()).keys(), &[3]);
    }

    #[test]
    fn underflow_rotates_from_left_sibling() {
        let mut tree = tree_of(3, [10, 20, 30, 40, 5]);
        // Leaves: [5, 10, 20] [30, 40]
        assert_eq!(tree.remove(&30), Ok(30));
        assert_eq!(tree.remove(&40), Ok(40));
        tree.validate().unwrap();
        assert_eq!(root_keys(&tree), [20]);
        assert_eq!(tree.node(tree.last_leaf.unwrap()).keys(), &[20]);
    }

    #[test]
    fn merge_collapses_root() {
        let mut tree = tree_of(3, [1, 2, 3, 4]);
        // Leaves: [2] [3]; neither can lend once 3 goes.
        assert_eq!(tree.remove(&1), Ok(1));
        assert_eq!(tree.remove(&4), Ok(4));
        assert_eq!(tree.remove(&3), Ok(3));
        tree.validate().unwrap();
        assert_eq!(keys_of(&tree), [2]);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.first_leaf, tree.last_leaf);
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn internal_underflow_merges_and_collapses_root() {
        let mut tree = tree_of(3, 1..=30);
        let grown = tree.height();
        assert!(grown >= 4, "height {grown}");

        for key in 1..=25 {
            assert_eq!(tree.remove(&key), Ok(key));
            tree.validate().unwrap();
        }
        assert!(tree.height() < grown, "height stayed at {grown}");
        assert_eq!(keys_of(&tree), (26..=30).collect::<Vec<_>>());
        assert_eq!(tree.node(tree.root.unwrap()).parent(), None);
    }

    #[test]
    fn removing_everything_empties_the_arena() {
        let mut tree = tree_of(4, 0..200);
        for key in (0..200).rev() {
            assert_eq!(tree.remove(&key), Ok(key));
            tree.validate().unwrap();
        }
        assert!(tree.is_empty());
        assert!(tree.root.is_none());
        assert!(tree.nodes.is_empty());
        assert_eq!(tree.remove(&0), Err(Error::NotFound));
    }

    #[test]
    fn missing_key_is_not_removed() {
        let mut tree = tree_of(3, [1, 3, 5]);
        assert_eq!(tree.remove(&2), Err(Error::NotFound));
        assert_eq!(tree.len(), 3);
        tree.validate().unwrap();
    }

    #[test]
    fn validate_reports_broken_separator() {
        let mut tree = tree_of(3, [1, 2, 3, 4]);
        let root = tree.root.unwrap();
        tree.nodes.get_mut(root).as_internal_mut().replace_key(0, 2);
        let Err(Error::Corrupted(report)) = tree.validate() else {
            panic!("corruption not detected");
        };
        assert!(report.contains("separator 0"), "{report}");
    }

    #[test]
    fn validate_reports_broken_chain() {
        let mut tree = tree_of(3, [1, 2, 3, 4]);
        let last = tree.last_leaf.unwrap();
        tree.nodes.get_mut(last).as_leaf_mut().set_prev(None);
        assert!(matches!(tree.validate(), Err(Error::Corrupted(_))));
    }

    #[test]
    fn pop_first_and_last() {
        let mut tree = tree_of(3, 1..=9);
        assert_eq!(tree.pop_first(), Some(1));
        assert_eq!(tree.pop_last(), Some(9));
        tree.validate().unwrap();
        assert_eq!(keys_of(&tree), (2..=8).collect::<Vec<_>>());
    }

    // Test operations enum for property testing
    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0i32..400).prop_map(Op::Insert),
            2 => (0i32..400).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn invariants_hold_after_every_operation(order in 3usize..9, ops in prop::collection::vec(op_strategy(), 0..400)) {
            let mut tree: RawBPlusTree<i32> = RawBPlusTree::new(Order::new(order).unwrap());
            let mut model: BTreeSet<i32> = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        let expected = if model.insert(key) { Ok(()) } else { Err(Error::DuplicateKey) };
                        prop_assert_eq!(tree.insert(key), expected);
                    }
                    Op::Remove(key) => {
                        let expected = if model.remove(&key) { Ok(key) } else { Err(Error::NotFound) };
                        prop_assert_eq!(tree.remove(&key), expected);
                    }
                }
                if let Err(err) = tree.validate() {
                    prop_assert!(false, "order {}: {}", order, err);
                }
                prop_assert_eq!(tree.len(), model.len());
                prop_assert_eq!(tree.first(), model.first());
                prop_assert_eq!(tree.last(), model.last());
            }

            prop_assert_eq!(keys_of(&tree), model.into_iter().collect::<Vec<_>>());
        }

        #[test]
        fn drain_in_any_order_returns_to_empty(order in 3usize..7, keys in prop::collection::btree_set(0i32..10_000, 0..300)) {
            let mut tree: RawBPlusTree<i32> = RawBPlusTree::new(Order::new(order).unwrap());
            let keys: Vec<i32> = keys.into_iter().collect();
            for &key in &keys {
                tree.insert(key).unwrap();
            }

            // Interleave from both ends to exercise left and right rebalancing.
            let mut lo = 0;
            let mut hi = keys.len();
            let mut from_front = true;
            while lo < hi {
                let key = if from_front { lo += 1; keys[lo - 1] } else { hi -= 1; keys[hi] };
                from_front = !from_front;
                prop_assert_eq!(tree.remove(&key), Ok(key));
                prop_assert!(tree.validate().is_ok());
            }

            prop_assert!(tree.is_empty());
            prop_assert_eq!(tree.height(), 0);
            prop_assert!(tree.nodes.is_empty());
        }
    }
}
