use core::{iter::FusedIterator, marker::PhantomData};

use crate::{AvlTree, Link, Links, TreeNode};

/// An in-order iterator over the elements of an [`AvlTree`].
///
/// The iterator follows parent links back up the tree, so it needs neither recursion nor an
/// auxiliary stack.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    next: Link<T>,
    len: usize,
    _tree: PhantomData<&'tree AvlTree<T>>,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            next: tree.root.map(|root| unsafe { tree.min_in_subtree(root).0 }),
            len: tree.len(),
            _tree: PhantomData,
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next?;
        self.len -= 1;

        unsafe {
            self.next = match T::links(cur).as_ref().right() {
                // The successor is the minimum of the right subtree.
                Some(mut succ) => {
                    while let Some(left) = T::links(succ).as_ref().left() {
                        succ = left;
                    }

                    Some(succ)
                }

                // Otherwise, ascend until we arrive from a left child.
                None => {
                    let mut child = cur;
                    let mut opt_parent = T::links(cur).as_ref().parent();

                    while let Some(parent) = opt_parent {
                        if T::links(parent).as_ref().left() == Some(child) {
                            break;
                        }

                        child = parent;
                        opt_parent = T::links(parent).as_ref().parent();
                    }

                    opt_parent
                }
            };

            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'_, T> {}

impl<T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'_, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> IntoIterator for &'tree AvlTree<T> {
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
