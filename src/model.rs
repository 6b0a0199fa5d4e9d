//! Differential testing of [`AvlSet`] against a sorted `Vec` multiset.

extern crate std;

use std::prelude::v1::*;

use arbitrary::Arbitrary;
use proptest::strategy::{Just, Strategy};

use crate::{AvlSet, Error};

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Find(ItemValue),
    Remove(ItemValue),
    Min,
    Max,
    Clear,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                // Indexing into the live values makes hits (and duplicates) likely.
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(sorted, item)),
            Op::Find(item) => FinalOp::Find(get_value(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(sorted, item)),
            Op::Min => FinalOp::Min,
            Op::Max => FinalOp::Max,
            Op::Clear => FinalOp::Clear,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Find(u32),
    Remove(u32),
    Min,
    Max,
    Clear,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        8 => value_strategy().prop_map(Op::Insert),
        3 => value_strategy().prop_map(Op::Find),
        6 => value_strategy().prop_map(Op::Remove),
        2 => Just(Op::Min),
        2 => Just(Op::Max),
        1 => Just(Op::Clear),
    ]
}

pub fn run_multiset_equivalence(ops: Vec<Op>) {
    let mut sorted_values: Vec<u32> = Vec::with_capacity(ops.len());
    let mut set: AvlSet<u32> = AvlSet::new();

    fn insert_sorted(v: &mut Vec<u32>, value: u32) {
        let idx = v.partition_point(|&x| x <= value);
        v.insert(idx, value);
    }

    fn remove_sorted(v: &mut Vec<u32>, value: u32) -> Result<u32, Error> {
        match v.binary_search(&value) {
            Ok(idx) => Ok(v.remove(idx)),
            Err(_) => Err(Error::NotFound),
        }
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let final_op = op.finalize(&sorted_values);

        match final_op {
            FinalOp::Insert(value) => {
                insert_sorted(&mut sorted_values, value);
                set.insert(value);
            }

            FinalOp::Find(value) => {
                let from_model = sorted_values
                    .binary_search(&value)
                    .map(|_| value)
                    .map_err(|_| Error::NotFound);
                let from_set = set.find(&value).map(|node| *node.value());

                assert_eq!(from_model, from_set, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(value) => {
                let from_model = remove_sorted(&mut sorted_values, value);
                let from_set = set.remove(&value);

                assert_eq!(from_model, from_set, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Min => {
                let from_model = sorted_values.first().copied().ok_or(Error::EmptyTree);
                let from_set = set.min().map(|node| *node.value());

                assert_eq!(from_model, from_set, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Max => {
                let from_model = sorted_values.last().copied().ok_or(Error::EmptyTree);
                let from_set = set.max().map(|node| *node.value());

                assert_eq!(from_model, from_set, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Clear => {
                sorted_values.clear();
                set.clear();
            }
        }

        set.tree.assert_invariants();
        assert_eq!(sorted_values.len(), set.len());
        assert!(sorted_values.iter().eq(set.iter()));
    }
}
