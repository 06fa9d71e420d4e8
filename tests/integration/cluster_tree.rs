#![allow(missing_docs)]

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use cairn::cluster::StoreArena;
use cairn::schema::ColumnSpec;
use cairn::table::Table;
use cairn::types::{ColIx, DataType, ObjKey, Value};
use cairn::Result;

const CHURN_OPS: usize = 20_000;
const KEY_SPACE: i64 = 4_000;
const SEED: u64 = 0x5eed_cafe;

const VAL: ColIx = ColIx(0);

fn int_table(arena: &mut StoreArena) -> Result<Table> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Table::new(arena, vec![ColumnSpec::new("v", DataType::Int, false)])
}

#[test]
fn randomized_churn_matches_model() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = int_table(&mut arena)?;
    let mut model: BTreeMap<i64, i64> = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(SEED);

    for op in 0..CHURN_OPS {
        let key = rng.gen_range(0..KEY_SPACE);
        match rng.gen_range(0..10) {
            // Insert under an explicit key.
            0..=4 => {
                let value = rng.gen_range(-1_000..1_000);
                match model.entry(key) {
                    std::collections::btree_map::Entry::Vacant(e) => {
                        table.create_object_with_key(&mut arena, ObjKey(key))?;
                        table.set_value(&mut arena, ObjKey(key), VAL, Value::Int(value))?;
                        e.insert(value);
                    }
                    std::collections::btree_map::Entry::Occupied(_) => {
                        assert!(table.create_object_with_key(&mut arena, ObjKey(key)).is_err());
                    }
                }
            }
            // Overwrite.
            5..=6 => {
                let value = rng.gen_range(-1_000..1_000);
                if model.contains_key(&key) {
                    table.set_value(&mut arena, ObjKey(key), VAL, Value::Int(value))?;
                    model.insert(key, value);
                } else {
                    assert!(table
                        .set_value(&mut arena, ObjKey(key), VAL, Value::Int(value))
                        .is_err());
                }
            }
            // Erase.
            7..=8 => {
                if model.remove(&key).is_some() {
                    table.erase_object(&mut arena, ObjKey(key))?;
                } else {
                    assert!(table.erase_object(&mut arena, ObjKey(key)).is_err());
                }
            }
            // Commit a version boundary mid-stream.
            _ => {
                arena.commit();
            }
        }
        if op % 4_096 == 0 {
            assert_eq!(table.size(), model.len());
        }
    }

    assert_eq!(table.size(), model.len());
    let keys = table.keys(&arena)?;
    assert_eq!(
        keys.iter().map(|k| k.0).collect::<Vec<_>>(),
        model.keys().copied().collect::<Vec<_>>()
    );
    for (&key, &value) in &model {
        assert_eq!(table.get_value(&arena, ObjKey(key), VAL)?, Value::Int(value));
    }

    // Positional addressing agrees with key order.
    for (ndx, (&key, _)) in model.iter().enumerate() {
        let (found, _) = table.tree().get_by_index(&arena, ndx)?;
        assert_eq!(found.0, key);
    }
    Ok(())
}

#[test]
fn committed_version_is_isolated() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = int_table(&mut arena)?;
    for i in 0..500 {
        let key = table.create_object(&mut arena)?;
        table.set_value(&mut arena, key, VAL, Value::Int(i))?;
    }
    // Pin the committed location of a row, then mutate past the commit.
    let watched = ObjKey(123);
    let old_state = table.tree().get(&arena, watched)?;
    arena.commit();

    table.set_value(&mut arena, watched, VAL, Value::Int(-1))?;
    for i in 500..600 {
        let key = table.create_object(&mut arena)?;
        table.set_value(&mut arena, key, VAL, Value::Int(i))?;
    }

    let new_state = table.tree().get(&arena, watched)?;
    assert_ne!(old_state.node, new_state.node);
    assert!(arena.is_read_only(old_state.node));
    let old_value = arena
        .translate(old_state.node)?
        .as_leaf()?
        .column(VAL)?
        .get(old_state.index)?;
    assert_eq!(old_value, Value::Int(123));
    assert_eq!(table.get_value(&arena, watched, VAL)?, Value::Int(-1));
    Ok(())
}

#[test]
fn growth_and_total_erasure_round_trip() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = int_table(&mut arena)?;
    for i in 0..5_000 {
        let key = table.create_object(&mut arena)?;
        table.set_value(&mut arena, key, VAL, Value::Int(i))?;
    }
    assert!(table.tree().depth(&arena)? >= 2);

    // Erase in an order that exercises both edge and interior pruning.
    let mut keys = table.keys(&arena)?;
    let mut rng = ChaCha8Rng::seed_from_u64(SEED ^ 1);
    keys.shuffle(&mut rng);
    for key in keys {
        table.erase_object(&mut arena, key)?;
    }
    assert_eq!(table.size(), 0);
    assert_eq!(table.tree().depth(&arena)?, 0);

    // Reuse after emptying, including keys below the old range start.
    table.create_object_with_key(&mut arena, ObjKey(0))?;
    assert_eq!(table.size(), 1);
    Ok(())
}

#[test]
fn schema_changes_reach_every_cluster() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = int_table(&mut arena)?;
    for i in 0..2_000 {
        let key = table.create_object(&mut arena)?;
        table.set_value(&mut arena, key, VAL, Value::Int(i))?;
    }
    let name = table.add_column(&mut arena, ColumnSpec::new("name", DataType::String, true))?;
    for key in table.keys(&arena)? {
        assert_eq!(table.get_value(&arena, key, name)?, Value::Null);
        // Old payload is untouched.
        assert_eq!(table.get_value(&arena, key, VAL)?, Value::Int(key.0));
    }
    table.set_value(&mut arena, ObjKey(1_500), name, Value::Str("deep".into()))?;
    assert_eq!(
        table.get_value(&arena, ObjKey(1_500), name)?,
        Value::Str("deep".into())
    );

    table.remove_column(&mut arena, name)?;
    assert!(table.get_value(&arena, ObjKey(1_500), name).is_err());
    assert_eq!(table.get_value(&arena, ObjKey(1_500), VAL)?, Value::Int(1_500));
    Ok(())
}

#[derive(Clone, Debug)]
enum Op {
    Insert(i64, i64),
    Erase(i64),
    Commit,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..256i64, any::<i64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        2 => (0..256i64).prop_map(Op::Erase),
        1 => Just(Op::Commit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_op_sequences_match_model(ops in prop::collection::vec(op_strategy(), 0..400)) {
        let mut arena = StoreArena::new();
        let mut table = int_table(&mut arena).unwrap();
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Insert(k, v) => {
                    if model.contains_key(&k) {
                        prop_assert!(table.create_object_with_key(&mut arena, ObjKey(k)).is_err());
                    } else {
                        table.create_object_with_key(&mut arena, ObjKey(k)).unwrap();
                        table.set_value(&mut arena, ObjKey(k), VAL, Value::Int(v)).unwrap();
                        model.insert(k, v);
                    }
                }
                Op::Erase(k) => {
                    if model.remove(&k).is_some() {
                        table.erase_object(&mut arena, ObjKey(k)).unwrap();
                    } else {
                        prop_assert!(table.erase_object(&mut arena, ObjKey(k)).is_err());
                    }
                }
                Op::Commit => {
                    arena.commit();
                }
            }
        }

        prop_assert_eq!(table.size(), model.len());
        let keys: Vec<i64> = table.keys(&arena).unwrap().iter().map(|k| k.0).collect();
        prop_assert_eq!(keys, model.keys().copied().collect::<Vec<_>>());
        for (&k, &v) in &model {
            prop_assert_eq!(table.get_value(&arena, ObjKey(k), VAL).unwrap(), Value::Int(v));
        }
    }
}
