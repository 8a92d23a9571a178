//! Property-based tests for the store engine and index resolution.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    use crate::array::NdArray;
    use crate::index::{Index, resolve_analytic, resolve_materialized};
    use crate::value::Value;
    use crate::views::Stored;
    use crate::Database;

    // Strategy for scalar leaves; floats stay finite so equality is meaningful
    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-50i64..50).prop_map(Value::Int),
            (-1.0e6f64..1.0e6).prop_map(Value::Float),
            "[a-z]{0,4}".prop_map(Value::Text),
        ]
    }

    fn int_array() -> impl Strategy<Value = Value> {
        proptest::collection::vec(-20i64..20, 0..6).prop_map(|values| {
            let values = values.into_iter().map(Value::Int).collect();
            NdArray::from_vec(values).map(Value::Array).unwrap_or(Value::Null)
        })
    }

    // Strategy for arbitrarily nested values, up to a few levels deep
    fn value() -> impl Strategy<Value = Value> {
        prop_oneof![scalar(), int_array()].prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Tuple),
                proptest::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                    .prop_map(|m: BTreeMap<String, Value>| Value::Map(m)),
            ]
        })
    }

    fn step() -> impl Strategy<Value = Option<i64>> {
        prop_oneof![Just(None), (-3i64..=-1).prop_map(Some), (1i64..=3).prop_map(Some)]
    }

    // One non-fancy index component for an axis of length `dim`
    fn component(dim: usize) -> impl Strategy<Value = Index> {
        let dim = dim as i64;
        prop_oneof![
            (-dim..dim).prop_map(Index::Int),
            (
                proptest::option::of(-6i64..6),
                proptest::option::of(-6i64..6),
                step()
            )
                .prop_map(|(start, stop, step)| Index::slice(start, stop, step)),
            Just(Index::NewAxis),
        ]
    }

    // Per-axis components, with at most one ellipsis spliced in anywhere
    fn shape_and_index() -> impl Strategy<Value = (Vec<usize>, Vec<Index>)> {
        proptest::collection::vec(1usize..5, 1..4)
            .prop_flat_map(|shape| {
                let components: Vec<_> = shape.iter().map(|&d| component(d)).collect();
                let len = shape.len();
                (Just(shape), components, proptest::option::of(0..=len))
            })
            .prop_map(|(shape, mut index, ellipsis)| {
                if let Some(at) = ellipsis {
                    index.insert(at.min(index.len()), Index::Ellipsis);
                }
                (shape, index)
            })
    }

    #[derive(Debug, Clone)]
    enum Op {
        Append(i64),
        Insert(i64, i64),
        Delete(usize),
        Set(usize, i64),
        Pop,
        Reverse,
        Sort,
        SetElement(usize, i64),
        DeleteElement(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..10).prop_map(Op::Append),
            (-8i64..8, 0i64..10).prop_map(|(i, v)| Op::Insert(i, v)),
            (0usize..16).prop_map(Op::Delete),
            (0usize..16, 0i64..10).prop_map(|(i, v)| Op::Set(i, v)),
            Just(Op::Pop),
            Just(Op::Reverse),
            Just(Op::Sort),
            (0usize..16, 0i64..10).prop_map(|(i, v)| Op::SetElement(i, v)),
            (0usize..16).prop_map(Op::DeleteElement),
        ]
    }

    proptest! {
        #[test]
        fn stored_value_round_trips(v in value()) {
            let db = Database::open_in_memory().unwrap();
            db.set("v", v.clone()).unwrap();
            prop_assert_eq!(db.value("v").unwrap(), v);
            prop_assert!(db.check().unwrap().is_clean());

            db.delete("v").unwrap();
            prop_assert_eq!(db.stats().unwrap().objects, 0);
            prop_assert_eq!(db.stats().unwrap().items, 0);
        }

        #[test]
        fn rebinding_keeps_store_consistent(a in value(), b in value()) {
            let db = Database::open_in_memory().unwrap();
            db.set("x", a.clone()).unwrap();
            db.set("y", a).unwrap();
            db.set("x", b.clone()).unwrap();
            prop_assert_eq!(db.value("x").unwrap(), b);
            prop_assert!(db.check().unwrap().is_clean());
        }

        #[test]
        fn index_strategies_agree((shape, index) in shape_and_index()) {
            let materialized = resolve_materialized(&shape, &index);
            let analytic = resolve_analytic(&shape, &index);
            match (materialized, analytic) {
                (Ok(m), Ok(a)) => prop_assert_eq!(m, a),
                (Err(_), Err(_)) => {}
                (m, a) => prop_assert!(false, "strategies disagree: {:?} vs {:?}", m, a),
            }
        }

        #[test]
        fn list_indices_stay_dense(
            initial in proptest::collection::vec(0i64..10, 0..6),
            ops in proptest::collection::vec(op(), 0..12),
        ) {
            let db = Database::open_in_memory().unwrap();
            db.set("l", initial.clone()).unwrap();
            let seq = db.get("l").unwrap().into_sequence().unwrap();
            let mut model = initial;

            for op in ops {
                match op {
                    Op::Append(v) => {
                        seq.append(v).unwrap();
                        model.push(v);
                    }
                    Op::Insert(i, v) => {
                        seq.insert(i, v).unwrap();
                        let len = model.len() as i64;
                        let pos = if i < 0 { (i + len).max(0) } else { i.min(len) };
                        model.insert(pos as usize, v);
                    }
                    Op::Delete(i) if !model.is_empty() => {
                        let i = i % model.len();
                        seq.delete(i as i64).unwrap();
                        model.remove(i);
                    }
                    Op::Set(i, v) if !model.is_empty() => {
                        let i = i % model.len();
                        seq.set(i as i64, v).unwrap();
                        model[i] = v;
                    }
                    Op::Pop if !model.is_empty() => {
                        let popped = seq.pop(None).unwrap();
                        prop_assert_eq!(popped, Value::Int(model.pop().unwrap_or_default()));
                    }
                    Op::Reverse => {
                        seq.reverse().unwrap();
                        model.reverse();
                    }
                    Op::Sort => {
                        seq.sort().unwrap();
                        model.sort();
                    }
                    Op::SetElement(i, v) if !model.is_empty() => {
                        let i = i % model.len();
                        seq.get(i as i64).unwrap().into_scalar().unwrap().set(v).unwrap();
                        model[i] = v;
                    }
                    Op::DeleteElement(i) if !model.is_empty() => {
                        let i = i % model.len();
                        seq.get(i as i64).unwrap().delete().unwrap();
                        model.remove(i);
                    }
                    _ => {}
                }

                let id = seq.id().unwrap();
                let expected: Vec<i64> = (0..model.len() as i64).collect();
                prop_assert_eq!(db.store().indices(id).unwrap(), expected);
            }

            prop_assert_eq!(db.value("l").unwrap(), Value::from(model));
            prop_assert!(db.check().unwrap().is_clean());
        }
    }
}
