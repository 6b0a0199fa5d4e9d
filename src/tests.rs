extern crate std;

use std::{ops::Range, pin::Pin, prelude::v1::*, rc::Rc};

use proptest::prelude::*;

use crate::model;

use super::*;

#[derive(Debug)]
#[repr(C)]
struct TestNode {
    links: Links<TestNode>,
    key: u32,
}

impl TestNode {
    fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree = AvlTree::new();

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    tree
}

// Pre-order (key, height) listing, with `None` for missing children.
fn shape(tree: &AvlTree<TestNode>) -> Vec<Option<(u32, usize)>> {
    fn walk(node: Option<NodeRef<'_, TestNode>>, out: &mut Vec<Option<(u32, usize)>>) {
        match node {
            None => out.push(None),
            Some(node) => {
                out.push(Some((node.key, node.height())));
                walk(node.left(), out);
                walk(node.right(), out);
            }
        }
    }

    let mut out = Vec::new();
    walk(tree.root(), &mut out);
    out
}

fn keys(tree: &AvlTree<TestNode>) -> Vec<u32> {
    tree.iter().map(|node| node.key).collect()
}

fn permutations(n: u32) -> Vec<Vec<u32>> {
    if n == 0 {
        return vec![vec![]];
    }

    let mut out = Vec::new();
    for perm in permutations(n - 1) {
        for idx in 0..=perm.len() {
            let mut p = perm.clone();
            p.insert(idx, n - 1);
            out.push(p);
        }
    }
    out
}

fn insert_find_all(keys: &[u32]) {
    let tree = tree_of(keys);

    for key in keys {
        let node = tree.get(key).expect("item not found");
        assert_eq!(node.key(), key);
    }
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree = tree_of(keys);

    for key in keys {
        let node = tree.remove(key).expect("item not found");
        assert_eq!(node.key, *key);
        assert!(!tree.contains_key(key));
        tree.assert_invariants();
    }

    for &key in keys {
        tree.insert(TestNode::new(key));
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        let node = tree.get(key).expect("item not found").get();
        let ptr = NonNull::from(Pin::get_ref(node));
        unsafe { tree.remove_at(ptr) };
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    assert!(tree.root().is_none());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn all_permutations_find() {
    for n in 2..=6 {
        for keys in permutations(n) {
            insert_find_all(&keys);
        }
    }
}

#[test]
fn all_permutations_remove() {
    for n in 1..=6 {
        for keys in permutations(n) {
            insert_remove_all(&keys);
        }
    }
}

#[test]
fn right_right_rotates_left() {
    let tree = tree_of(&[10, 20, 30]);
    assert_eq!(shape(&tree), shape(&tree_of(&[20, 10, 30])));

    let root = tree.root().unwrap();
    assert_eq!(root.key, 20);
    assert_eq!(root.left().unwrap().key, 10);
    assert_eq!(root.right().unwrap().key, 30);
}

#[test]
fn left_right_rotates_twice() {
    let tree = tree_of(&[30, 10, 20]);

    let root = tree.root().unwrap();
    assert_eq!(root.key, 20);
    assert_eq!(root.left().unwrap().key, 10);
    assert_eq!(root.right().unwrap().key, 30);
}

#[test]
fn left_left_and_right_left() {
    for keys in [[30, 20, 10], [10, 30, 20]] {
        let tree = tree_of(&keys);
        assert_eq!(
            shape(&tree),
            [Some((20, 1)), Some((10, 0)), None, None, Some((30, 0)), None, None]
        );
    }
}

// The root goes right-heavy while its right child leans left, so the child is rotated first and
// the root is balanced on the following pass.
#[test]
fn inner_case_right_left_settles() {
    let tree = tree_of(&[2, 1, 0, 5, 4, 3]);

    assert_eq!(
        shape(&tree),
        [
            Some((2, 2)),
            Some((1, 1)),
            Some((0, 0)),
            None,
            None,
            None,
            Some((4, 1)),
            Some((3, 0)),
            None,
            None,
            Some((5, 0)),
            None,
            None,
        ]
    );
    assert_eq!(keys(&tree), [0, 1, 2, 3, 4, 5]);
}

#[test]
fn inner_case_left_right_settles() {
    let tree = tree_of(&[3, 4, 5, 0, 1, 2]);

    assert_eq!(
        shape(&tree),
        [
            Some((3, 2)),
            Some((1, 1)),
            Some((0, 0)),
            None,
            None,
            Some((2, 0)),
            None,
            None,
            Some((4, 1)),
            None,
            Some((5, 0)),
            None,
            None,
        ]
    );
    assert_eq!(keys(&tree), [0, 1, 2, 3, 4, 5]);
}

#[test]
fn removal_inner_case_with_unary_child() {
    // After removing 1, the root has only a right child, which has only a left child.
    let mut tree = tree_of(&[2, 1, 4, 3]);

    tree.remove(&1).expect("1 is present");
    tree.assert_invariants();

    assert_eq!(
        shape(&tree),
        [Some((3, 1)), Some((2, 0)), None, None, Some((4, 0)), None, None]
    );
    assert!(tree.root().unwrap().parent().is_none());
}

#[test]
fn ascending_run_is_perfect() {
    let tree = tree_of(&[1, 2, 3, 4, 5, 6, 7]);

    let root = tree.root().unwrap();
    assert_eq!(root.key, 4);
    assert_eq!(root.height(), 2);
    assert_eq!(keys(&tree), [1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn remove_two_child_root_promotes_successor() {
    let mut tree = tree_of(&[3, 2, 4, 1, 5]);

    let root = tree.root().unwrap();
    assert_eq!(root.key, 3);
    assert!(root.left().is_some() && root.right().is_some());

    let removed = tree.remove(&3).expect("3 is present");
    assert_eq!(removed.key, 3);
    tree.assert_invariants();

    let root = tree.root().unwrap();
    assert_eq!(root.key, 4);
    assert_eq!(root.left().unwrap().key, 2);
    assert_eq!(root.right().unwrap().key, 5);
    assert!(tree.get(&3).is_none());
    assert_eq!(keys(&tree), [1, 2, 4, 5]);
}

#[test]
fn remove_two_child_with_deep_successor() {
    let mut tree = tree_of(&[4, 2, 8, 1, 3, 6, 9, 5, 7]);

    // The successor of 4 is 5, the left child of 6.
    tree.remove(&4).expect("4 is present");
    tree.assert_invariants();

    assert_eq!(tree.root().unwrap().key, 5);
    assert_eq!(keys(&tree), [1, 2, 3, 5, 6, 7, 8, 9]);
}

#[test]
fn removal_rotates_to_new_root() {
    let mut tree = tree_of(&[2, 1, 3, 4]);

    tree.remove(&1).expect("1 is present");
    tree.assert_invariants();

    let root = tree.root().unwrap();
    assert_eq!(root.key, 3);
    assert!(root.parent().is_none());
    assert_eq!(keys(&tree), [2, 3, 4]);
}

#[test]
fn empty_tree_lookups() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    assert!(tree.first().is_none());
    assert!(tree.last().is_none());
    assert!(tree.get(&5).is_none());
    assert!(tree.remove(&5).is_none());
    assert!(tree.root().is_none());
    assert_eq!(tree.iter().len(), 0);
}

#[test]
fn remove_absent_is_a_no_op() {
    let mut tree = tree_of(&[50, 20, 80, 10, 30, 70]);
    let before = shape(&tree);

    assert!(tree.remove(&25).is_none());
    assert!(tree.remove(&99).is_none());

    assert_eq!(shape(&tree), before);
    assert_eq!(tree.len(), 6);
}

#[test]
fn first_and_last() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4, 9]);

    assert_eq!(tree.first().unwrap().key, 1);
    assert_eq!(tree.last().unwrap().key, 9);

    tree.remove(&1);
    tree.remove(&9);

    assert_eq!(tree.first().unwrap().key, 3);
    assert_eq!(tree.last().unwrap().key, 8);
}

#[test]
fn rotations_preserve_order_and_parents() {
    let mut tree = tree_of(&[2, 1, 3]);
    let before = shape(&tree);

    unsafe {
        let root = tree.root.unwrap();
        let up = tree.rotate_left(root);
        tree.root = Some(up);

        assert_eq!(up.as_ref().key, 3);
        assert_eq!(tree.links(up).parent(), None);
        assert_eq!(tree.links(root).parent(), Some(up));
        assert_eq!(tree.links(up).left(), Some(root));
        assert_eq!(tree.links(root).right(), None);
        assert_eq!(keys(&tree), [1, 2, 3]);

        let down = tree.rotate_right(up);
        tree.root = Some(down);

        assert_eq!(down, root);
        assert_eq!(keys(&tree), [1, 2, 3]);
    }

    assert_eq!(shape(&tree), before);
    tree.assert_invariants();
}

#[test]
fn clear_releases_everything() {
    let values: Vec<Rc<u32>> = (0..64).map(Rc::new).collect();

    let mut set = AvlSet::new();
    for v in &values {
        set.insert(Rc::clone(v));
    }
    assert!(values.iter().all(|v| Rc::strong_count(v) == 2));

    set.clear();
    assert!(set.is_empty());
    assert!(set.root().is_err());
    assert!(values.iter().all(|v| Rc::strong_count(v) == 1));

    for v in &values {
        set.insert(Rc::clone(v));
    }
    drop(set);
    assert!(values.iter().all(|v| Rc::strong_count(v) == 1));
}

#[test]
fn set_scenarios() {
    let mut set = AvlSet::new();
    for v in 1..=7 {
        set.insert(v);
    }
    assert_eq!(*set.root().unwrap().value(), 4);
    assert_eq!(set.root().unwrap().height(), 2);

    assert_eq!(*set.find(&6).unwrap().value(), 6);
    assert_eq!(set.remove(&6), Ok(6));
    assert_eq!(set.find(&6).unwrap_err(), Error::NotFound);

    assert_eq!(*set.min().unwrap().value(), 1);
    assert_eq!(*set.max().unwrap().value(), 7);
}

fn max_avl_height(n: usize) -> f64 {
    1.44 * ((n + 2) as f64).log2()
}

#[test]
fn height_stays_logarithmic() {
    let mut set = AvlSet::new();

    for v in 0..4096u32 {
        set.insert(v);
        let height = set.root().unwrap().height();
        assert!(height as f64 <= max_avl_height(set.len()));
    }

    for v in (0..4096u32).step_by(2) {
        set.remove(&v).unwrap();
        let height = set.root().unwrap().height();
        assert!(height as f64 <= max_avl_height(set.len()));
    }

    set.tree.assert_invariants();
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn multiset_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_multiset_equivalence(ops);
    }

    #[test]
    fn height_bound(values in proptest::collection::vec(any::<u16>(), 1..2000)) {
        let mut set = AvlSet::new();
        for v in values {
            set.insert(v);
        }

        let height = set.root().unwrap().height();
        prop_assert!(height as f64 <= max_avl_height(set.len()));
    }

    #[test]
    fn insert_then_remove_round_trip(
        values in proptest::collection::vec(0u32..500, 0..200),
        needle in 0u32..500,
    ) {
        let mut set = AvlSet::new();
        for &v in &values {
            set.insert(v);
        }

        set.insert(needle);
        prop_assert_eq!(*set.find(&needle).unwrap().value(), needle);

        let present = values.iter().filter(|&&v| v == needle).count();
        for _ in 0..=present {
            prop_assert_eq!(set.remove(&needle), Ok(needle));
        }
        prop_assert_eq!(set.find(&needle).unwrap_err(), Error::NotFound);
        set.tree.assert_invariants();
    }
}
