use core::{fmt, marker::PhantomData, ops::Deref, pin::Pin, ptr::NonNull};

use crate::{balance_factor, AvlTree, Links, TreeNode};

/// A shared reference to an element of an [`AvlTree`], which can also move to the element's
/// neighbors in the tree.
///
/// A `NodeRef` borrows the tree, so it can't outlive the next mutation of the tree.
pub struct NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    ptr: NonNull<T>,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T> NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    // # Safety
    //
    // `ptr` must be an element of a tree that stays borrowed for `'tree`.
    pub(crate) unsafe fn new(ptr: NonNull<T>) -> Self {
        NodeRef {
            ptr,
            _tree: PhantomData,
        }
    }

    #[inline]
    fn links(&self) -> &'tree Links<T> {
        // SAFETY: the tree is borrowed for `'tree`, so the element and its links are alive and
        // not being mutated.
        unsafe { T::links(self.ptr).as_ref() }
    }

    /// Returns a pinned reference to the element.
    pub fn get(&self) -> Pin<&'tree T> {
        // SAFETY: elements are pinned by contract with `Linked`.
        unsafe { Pin::new_unchecked(self.ptr.as_ref()) }
    }

    /// Returns the element's key.
    pub fn key(&self) -> &'tree T::Key {
        Pin::get_ref(self.get()).key()
    }

    /// Returns the root of the element's left subtree.
    pub fn left(&self) -> Option<Self> {
        self.links().left().map(|ptr| unsafe { Self::new(ptr) })
    }

    /// Returns the root of the element's right subtree.
    pub fn right(&self) -> Option<Self> {
        self.links().right().map(|ptr| unsafe { Self::new(ptr) })
    }

    /// Returns the element's parent, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.links().parent().map(|ptr| unsafe { Self::new(ptr) })
    }

    /// Returns the height of the subtree rooted at this element. A leaf has height 0.
    pub fn height(&self) -> usize {
        self.links().height() as usize
    }

    /// Returns the balance factor of this element.
    ///
    /// This is the right subtree's height minus the left subtree's height, and always lies in
    /// `-1..=1` between tree operations.
    pub fn balance_factor(&self) -> i8 {
        unsafe { balance_factor(Some(self.ptr)) }
    }

    /// Returns `true` if both references point at the same element.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl<T> Clone for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> where T: TreeNode<Links<T>> + ?Sized {}

impl<'tree, T> Deref for NodeRef<'tree, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    type Target = T;

    fn deref(&self) -> &T {
        Pin::get_ref(self.get())
    }
}

impl<T> fmt::Debug for NodeRef<'_, T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("key", self.key())
            .field("height", &self.height())
            .finish()
    }
}
