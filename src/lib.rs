//! An intrusive AVL tree with parent back-links and progressive, bottom-up rebalancing.

// Conventions used in comments:
// - The height of a node `x` is denoted `h(x)`. Leaves have height 0; a missing child counts as
//   height -1.
// - The balance factor of `x` is denoted `bf(x)`. With both children present it is
//   `h(right(x)) - h(left(x))`. With one child it is `h(x)` signed by the side of that child, which
//   is negative for a lone left child and positive for a lone right child.
// - The parent of a node `x` is denoted `p(x)`.
//
// The invariants of the tree are:
// 1. An in-order walk yields keys in non-decreasing order. Keys that compare equal to a node go to
//    its right on insertion.
// 2. `h(x) = 1 + max(h(left(x)), h(right(x)))` for every node.
// 3. `bf(x) ∈ {-1, 0, 1}` for every node whenever no operation is in progress.
// 4. `x` is a child of `p(x)` for every non-root node, and the root has no parent.
//
// Insertion and removal are "progressive": a downward pass performs the structural edit, then one
// upward walk starting at the point of mutation restores (2) and (3). The walk rotates where a node
// is off by two, and whichever node it reaches without a parent becomes the root.

use core::{
    cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not, ptr::NonNull,
};
use std::borrow::Borrow;

use cordyceps::Linked;

mod error;
mod iter;
mod node;
pub mod set;

#[cfg(any(test, feature = "model"))]
pub mod model;

#[cfg(test)]
mod tests;

pub use error::Error;
pub use iter::Iter;
pub use node::NodeRef;
pub use set::AvlSet;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// Every node carries a cached subtree height and a non-owning link to its parent, so balance
/// queries are _O(1)_ and repairs can walk upward from the point of mutation without recursion.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

/// The intrusive links embedded in every element of an [`AvlTree`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    height: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the topmost node of the tree, or `None` if the tree is empty.
    ///
    /// This exposes the tree's shape to traversal and printing code; see [`NodeRef::left`] and
    /// [`NodeRef::right`].
    pub fn root(&self) -> Option<NodeRef<'_, T>> {
        self.root.map(|root| unsafe { NodeRef::new(root) })
    }

    /// Returns an iterator over the elements of the tree, in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree must have len 0");
            return;
        };

        unsafe {
            assert_eq!(self.links(root).parent(), None, "root must not have a parent");

            let count = self.assert_invariants_at(root);
            assert_eq!(count, self.len, "len out of sync with node count");
        }

        let mut prev: Option<&T::Key> = None;
        for item in self.iter() {
            if let Some(prev) = prev {
                assert!(
                    prev <= item.key(),
                    "in-order walk out of order: {prev:?} > {:?}",
                    item.key()
                );
            }
            prev = Some(item.key());
        }
    }

    // Checks invariants 1-4 on the subtree rooted at `node` and returns its node count.
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) -> usize {
        unsafe {
            let links = self.links(node);
            let key = node.as_ref().key();

            assert_eq!(
                links.height(),
                compute_height(node),
                "stale height cached at {key:?}"
            );

            let bf = balance_factor(Some(node));
            assert!((-1..=1).contains(&bf), "node {key:?} is unbalanced: bf = {bf}");

            let mut count = 1;

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = links.child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = self
                        .links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    let child_key = child.as_ref().key();
                    match dir {
                        Dir::Left => assert!(child_key <= key, "{child_key:?} left of {key:?}"),
                        Dir::Right => assert!(child_key >= key, "{child_key:?} right of {key:?}"),
                    }

                    count += self.assert_invariants_at(child);
                }
            }

            count
        }
    }

    /// Returns the node holding `key`, or `None` if no such node exists.
    ///
    /// If several nodes hold equal keys, the first one met on the way down from the root is
    /// returned.
    pub fn get<Q>(&self, key: &Q) -> Option<NodeRef<'_, T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(NodeRef::new(ptr)) }
    }

    /// Returns `true` if the tree contains a node holding `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = self.links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = self.links(cur).right(),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<NodeRef<'_, T>> {
        let root = self.root?;

        unsafe { Some(NodeRef::new(self.min_in_subtree(root).0)) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<NodeRef<'_, T>> {
        let mut cur = self.root?;

        unsafe {
            while let Some(right) = self.links(cur).right() {
                cur = right;
            }

            Some(NodeRef::new(cur))
        }
    }

    #[inline]
    unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`, and points
    // `new_child`'s parent link at `parent`.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            debug_assert_eq!(
                self.links(parent).child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );
            if let Some(new_child) = new_child {
                debug_assert_ne!(
                    self.links(parent).child(!dir),
                    Some(new_child),
                    "`new_child` must not be a child of `parent`"
                );
            }

            self.links_mut(parent).set_child(dir, new_child);
            self.maybe_set_parent(new_child, Some(parent));
        }
    }

    // Rotates the subtree rooted at `node` towards `dir`, promoting the child on the opposite side
    // and returning it as the new subtree top.
    //
    // The promoted child inherits `node`'s parent link, but the parent's child slot still points at
    // `node`; re-linking it (or recording a new root) is left to the caller. Heights are not
    // updated.
    unsafe fn rotate(&mut self, node: NonNull<T>, dir: Dir) -> NonNull<T> {
        unsafe {
            // - `up` goes from the `!dir` child of `node` to its parent.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `node`.
            let up = self
                .links(node)
                .child(!dir)
                .expect("rotation requires a child on the promoted side");

            tracing::trace!(
                pivot = ?node.as_ref().key(),
                up = ?up.as_ref().key(),
                ?dir,
                "rotating"
            );

            let across = self.links(up).child(dir);
            self.links_mut(node).set_child(!dir, across);
            self.maybe_set_parent(across, Some(node));

            self.links_mut(up).set_child(dir, Some(node));
            let parent = self.links_mut(node).set_parent(Some(up));
            self.links_mut(up).set_parent(parent);

            up
        }
    }

    /// Rotates `node` to the left, promoting its right child.
    #[inline]
    unsafe fn rotate_left(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe { self.rotate(node, Dir::Left) }
    }

    /// Rotates `node` to the right, promoting its left child.
    #[inline]
    unsafe fn rotate_right(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe { self.rotate(node, Dir::Right) }
    }

    // Walks from `start` up to the root, refreshing cached heights and rotating wherever a node's
    // balance factor has reached ±2. The node the walk ends on has no parent and becomes the root.
    fn rebalance_from(&mut self, start: Link<T>) {
        let mut opt_cur = start;

        while let Some(cur) = opt_cur {
            unsafe {
                let height = compute_height(cur);
                self.links_mut(cur).set_height(height);

                let parent = self.links(cur).parent();

                let heavy = match balance_factor(Some(cur)) {
                    -1..=1 => {
                        // Balanced here. Go up, or stop at the top.
                        if parent.is_none() {
                            if self.root != Some(cur) {
                                tracing::trace!(root = ?cur.as_ref().key(), "new root");
                            }
                            self.root = Some(cur);
                        }

                        opt_cur = parent;
                        continue;
                    }
                    bf if bf < 0 => Dir::Left,
                    _ => Dir::Right,
                };

                let child = self
                    .links(cur)
                    .child(heavy)
                    .expect("heavy side must have a child");
                let child_bf = balance_factor(Some(child));

                // The child leans the same way as `cur`, or not at all.
                let outer = match heavy {
                    Dir::Left => child_bf < 1,
                    Dir::Right => child_bf > -1,
                };

                if outer {
                    // Left-left or right-right: a single rotation at `cur`.
                    let up = match heavy {
                        Dir::Left => self.rotate_right(cur),
                        Dir::Right => self.rotate_left(cur),
                    };

                    if let Some(parent) = parent {
                        self.replace_child(parent, cur, Some(up));
                    }

                    // `cur` is now below `up`; refresh it first, then carry on through `up`.
                    opt_cur = Some(cur);
                } else {
                    // Left-right or right-left: rotate the child so the shape becomes an outer
                    // case, which the next pass resolves at `cur`.
                    let up = match heavy {
                        Dir::Left => self.rotate_left(child),
                        Dir::Right => self.rotate_right(child),
                    };

                    self.links_mut(cur).set_child(heavy, Some(up));

                    // The half-rotated subtree may read ±2 on its own; only its heights are
                    // refreshed, bottom first, and balancing resumes at `cur`.
                    for node in [child, up] {
                        let height = compute_height(node);
                        self.links_mut(node).set_height(height);
                    }

                    opt_cur = Some(cur);
                }
            }
        }
    }

    /// Inserts an item into the tree.
    ///
    /// Items whose keys compare equal to an existing key are placed to its right, so duplicates
    /// are kept rather than replaced.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);

        unsafe { self.links_mut(ptr).clear() };

        let key = unsafe { ptr.as_ref().key() };

        let Some(root) = self.root else {
            // Tree is empty. Set `item` as the root and return.
            tracing::debug!(?key, "inserted as root");

            self.root = Some(ptr);
            self.len += 1;
            return;
        };

        let mut parent = root;

        // Descend the tree, looking for an empty slot.
        loop {
            let dir = unsafe {
                if key < parent.as_ref().key() {
                    Dir::Left
                } else {
                    Dir::Right
                }
            };

            unsafe {
                match self.links(parent).child(dir) {
                    // Descend.
                    Some(child) => parent = child,

                    // Set `item` as child.
                    None => {
                        self.links_mut(parent).set_child(dir, Some(ptr));
                        self.links_mut(ptr).set_parent(Some(parent));
                        break;
                    }
                }
            }
        }

        tracing::debug!(?key, parent = ?unsafe { parent.as_ref().key() }, "inserted leaf");

        self.len += 1;

        // Start balancing from the bottom.
        self.rebalance_from(Some(parent));
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { self.links(cur).left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    /// Removes the node holding `key` and returns it, or returns `None` if there is no such node.
    ///
    /// The tree is left untouched when `key` is absent.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;

        unsafe { Some(self.remove_at(node)) }
    }

    /// Removes an arbitrary node from the tree.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are two cases:
        //
        // 1. `node` has two children.
        //
        //    Its successor[^1] takes over `node`'s position, links and height. The successor has
        //    no left child, so this is a unary or leaf removal at the successor's old position, and
        //    the repair walk starts at the successor's old parent. If the successor was `node`'s
        //    right child, that parent is `node` itself, whose place is now held by the successor.
        //
        // 2. `node` has at most one child.
        //
        //    That child (if any) replaces `node` under `node`'s parent, and the repair walk starts
        //    at the parent. If `node` was the root, the child becomes the root and the walk starts
        //    there.
        //
        // [^1]: The successor of a node `a` is the least node in `a`'s right subtree.

        unsafe {
            let parent = self.links(node).parent();
            let left = self.links(node).left();
            let right = self.links(node).right();

            let start = match (left, right) {
                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = self.min_in_subtree(right);

                    let start = match successor_parent {
                        Some(successor_parent) => {
                            // Elevate the successor's right child to replace it.
                            let successor_right = self.links(successor).right();
                            self.replace_child(successor_parent, successor, successor_right);

                            self.links_mut(successor).set_right(Some(right));
                            self.links_mut(right).set_parent(Some(successor));

                            successor_parent
                        }
                        // Right link is kept iff succ == right.
                        None => successor,
                    };

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    // Transfer the position of `node` to `successor`.
                    let node_height = self.links(node).height();
                    self.links_mut(successor).set_parent(parent);
                    self.links_mut(successor).set_height(node_height);
                    self.links_mut(successor).set_left(Some(left));
                    self.links_mut(left).set_parent(Some(successor));

                    Some(start)
                }

                (Some(child), None) | (None, Some(child)) => {
                    self.replace_child_or_set_root(parent, node, Some(child));
                    self.links_mut(child).set_parent(parent);

                    parent.or(Some(child))
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);

                    parent
                }
            };

            tracing::debug!(
                key = ?node.as_ref().key(),
                start = ?start.map(|s| s.as_ref().key()),
                "removed node"
            );

            self.links_mut(node).clear();
            self.len -= 1;

            self.rebalance_from(start);

            T::from_ptr(node)
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| self.links(cur).parent());

                let right = self.links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                self.links_mut(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { self.links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

// Height and balance primitives =============================================

/// Returns the cached height of the pointed-to node, or -1 for a missing node.
#[inline]
unsafe fn height_of<T>(node: Link<T>) -> i8
where
    T: TreeNode<Links<T>> + ?Sized,
{
    node.map(|n| unsafe { T::links(n).as_ref().height() })
        .unwrap_or(-1)
}

/// Recomputes the height of `node` from its children's cached heights.
unsafe fn compute_height<T>(node: NonNull<T>) -> i8
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe {
        let links = T::links(node).as_ref();

        if links.is_leaf() {
            return 0;
        }

        height_of(links.left()).max(height_of(links.right())) + 1
    }
}

/// Returns the balance factor of the pointed-to node, or 0 for a missing node.
///
/// A node with a single child reports its own height, negated if that child is on the left.
unsafe fn balance_factor<T>(node: Link<T>) -> i8
where
    T: TreeNode<Links<T>> + ?Sized,
{
    let Some(node) = node else {
        return 0;
    };

    unsafe {
        let links = T::links(node).as_ref();

        match (links.left(), links.right()) {
            (Some(left), Some(right)) => height_of(Some(right)) - height_of(Some(left)),
            (None, Some(_)) => links.height(),
            (_, None) => -links.height(),
        }
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                height: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    fn height(&self) -> i8 {
        unsafe { (*self.inner.get()).height }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_height(&mut self, height: i8) {
        self.inner.get_mut().height = height;
    }

    // Resets the links to those of a detached leaf.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.height = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("height", &self.height())
            .finish()
    }
}
