extern crate alloc;

use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Error, Links, NodeRef, TreeNode};

/// An ordered multiset based on an [AVL tree].
///
/// Values that compare equal are all kept; each one is stored to the right of those inserted
/// before it.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlSet<T: Ord + fmt::Debug> {
    pub(crate) tree: AvlTree<SetNode<T>>,
}

pub(crate) struct SetNode<T> {
    links: Links<SetNode<T>>,
    value: T,
    _unpin: PhantomPinned,
}

unsafe impl<T> Linked<Links<SetNode<T>>> for SetNode<T> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<SetNode<T>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<T: Ord + fmt::Debug> TreeNode<Links<SetNode<T>>> for SetNode<T> {
    type Key = T;

    fn key(&self) -> &Self::Key {
        &self.value
    }
}

// SAFETY: the set owns every node it links to and hands out only shared references tied to a
// borrow of the set, so moving or sharing it across threads is as safe as doing so with `T`.
unsafe impl<T: Ord + fmt::Debug + Send> Send for AvlSet<T> {}
unsafe impl<T: Ord + fmt::Debug + Sync> Sync for AvlSet<T> {}

/// A read-only view of one node of an [`AvlSet`].
///
/// Nodes expose the shape of the tree (children, parent, height) for traversal and printing.
pub struct Node<'set, T: Ord + fmt::Debug> {
    inner: NodeRef<'set, SetNode<T>>,
}

impl<'set, T: Ord + fmt::Debug> Node<'set, T> {
    fn new(inner: NodeRef<'set, SetNode<T>>) -> Self {
        Node { inner }
    }

    /// Returns the value held by this node.
    pub fn value(&self) -> &'set T {
        self.inner.key()
    }

    /// Returns the root of this node's left subtree.
    pub fn left(&self) -> Option<Self> {
        self.inner.left().map(Node::new)
    }

    /// Returns the root of this node's right subtree.
    pub fn right(&self) -> Option<Self> {
        self.inner.right().map(Node::new)
    }

    /// Returns this node's parent, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.inner.parent().map(Node::new)
    }

    /// Returns the height of the subtree rooted at this node. A leaf has height 0.
    pub fn height(&self) -> usize {
        self.inner.height()
    }

    /// Returns the right subtree's height minus the left subtree's height.
    pub fn balance_factor(&self) -> i8 {
        self.inner.balance_factor()
    }

    /// Returns `true` if both views point at the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T: Ord + fmt::Debug> Clone for Node<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Ord + fmt::Debug> Copy for Node<'_, T> {}

impl<T: Ord + fmt::Debug> fmt::Debug for Node<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("value", self.value())
            .field("height", &self.height())
            .finish()
    }
}

impl<T: Ord + fmt::Debug> AvlSet<T> {
    /// Creates a new, empty `AvlSet`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the set contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the set, counting duplicates.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Adds a value to the set.
    ///
    /// This always succeeds. A value equal to one already present is stored alongside it.
    pub fn insert(&mut self, value: T) {
        self.tree.insert(Box::new(SetNode {
            links: Links::new(),
            value,
            _unpin: PhantomPinned,
        }));
    }

    /// Removes one element equal to `value` and returns it.
    ///
    /// Returns [`Error::NotFound`] and leaves the set untouched if no element matches.
    pub fn remove<Q>(&mut self, value: &Q) -> Result<T, Error>
    where
        T: Borrow<Q>,
        Q: Ord + fmt::Debug + ?Sized,
    {
        match self.tree.remove(value) {
            Some(node) => Ok(node.value),
            None => {
                tracing::info!(?value, "element not found");
                Err(Error::NotFound)
            }
        }
    }

    /// Returns the node holding a value equal to `value`.
    #[inline]
    pub fn find<Q>(&self, value: &Q) -> Result<Node<'_, T>, Error>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(value).map(Node::new).ok_or(Error::NotFound)
    }

    /// Returns `true` if the set contains a value equal to `value`.
    #[inline]
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(value)
    }

    /// Returns the node holding the smallest value.
    #[inline]
    pub fn min(&self) -> Result<Node<'_, T>, Error> {
        self.tree.first().map(Node::new).ok_or(Error::EmptyTree)
    }

    /// Returns the node holding the largest value.
    #[inline]
    pub fn max(&self) -> Result<Node<'_, T>, Error> {
        self.tree.last().map(Node::new).ok_or(Error::EmptyTree)
    }

    /// Returns the topmost node of the tree.
    #[inline]
    pub fn root(&self) -> Result<Node<'_, T>, Error> {
        self.tree.root().map(Node::new).ok_or(Error::EmptyTree)
    }

    /// Returns an iterator over the values of the set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + ExactSizeIterator + '_ {
        self.tree.iter().map(|node| &node.value)
    }

    /// Clears the set, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }
}

impl<T: Ord + fmt::Debug> Default for AvlSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + fmt::Debug> fmt::Debug for AvlSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::RwLock, thread};

    use super::*;

    #[test]
    fn empty_set_signals() {
        let mut set: AvlSet<u32> = AvlSet::new();

        assert_eq!(set.min().unwrap_err(), Error::EmptyTree);
        assert_eq!(set.max().unwrap_err(), Error::EmptyTree);
        assert_eq!(set.root().unwrap_err(), Error::EmptyTree);
        assert_eq!(set.find(&5).unwrap_err(), Error::NotFound);
        assert_eq!(set.remove(&5), Err(Error::NotFound));
        assert!(set.is_empty());
    }

    #[test]
    fn node_view_walks_the_shape() {
        let mut set = AvlSet::new();
        for v in [10, 20, 30] {
            set.insert(v);
        }

        let root = set.root().unwrap();
        assert_eq!(*root.value(), 20);
        assert_eq!(root.height(), 1);
        assert_eq!(root.balance_factor(), 0);
        assert!(root.parent().is_none());

        let left = root.left().unwrap();
        let right = root.right().unwrap();
        assert_eq!(*left.value(), 10);
        assert_eq!(*right.value(), 30);
        assert!(left.parent().unwrap().ptr_eq(&root));
        assert!(right.parent().unwrap().ptr_eq(&root));
        assert_eq!(left.height(), 0);

        set.insert(40);
        let root = set.root().unwrap();
        assert_eq!(root.balance_factor(), 1);
        assert_eq!(root.right().unwrap().balance_factor(), 1);
        assert!(root.left().unwrap().left().is_none());
    }

    #[test]
    fn duplicates_are_kept() {
        let mut set = AvlSet::new();
        for v in [5, 5, 5, 3, 5] {
            set.insert(v);
            set.tree.assert_invariants();
        }

        assert_eq!(set.len(), 5);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), [3, 5, 5, 5, 5]);

        for remaining in (0..4).rev() {
            assert_eq!(set.remove(&5), Ok(5));
            set.tree.assert_invariants();
            assert_eq!(set.iter().filter(|&&v| v == 5).count(), remaining);
        }

        assert_eq!(set.remove(&5), Err(Error::NotFound));
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), [3]);
    }

    #[test]
    fn borrowed_lookup() {
        let mut set = AvlSet::new();
        for word in ["pear", "apple", "fig"] {
            set.insert(String::from(word));
        }

        assert!(set.contains("fig"));
        assert_eq!(set.find("apple").unwrap().value(), "apple");
        assert_eq!(set.min().unwrap().value(), "apple");
        assert_eq!(set.max().unwrap().value(), "pear");
        assert_eq!(set.remove("pear").as_deref(), Ok("pear"));
        assert_eq!(format!("{set:?}"), r#"{"apple", "fig"}"#);
    }

    #[test]
    fn shared_behind_rwlock() {
        let set = RwLock::new(AvlSet::new());

        thread::scope(|s| {
            for t in 0..4u32 {
                let set = &set;
                s.spawn(move || {
                    for v in 0..50 {
                        set.write().unwrap().insert(t * 50 + v);
                    }
                });
            }
        });

        let set = set.into_inner().unwrap();
        set.tree.assert_invariants();
        assert_eq!(set.len(), 200);
        assert_eq!(*set.min().unwrap().value(), 0);
        assert_eq!(*set.max().unwrap().value(), 199);
    }
}
