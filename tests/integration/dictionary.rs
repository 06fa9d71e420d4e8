#![allow(missing_docs)]

use cairn::cluster::StoreArena;
use cairn::column::DictRefs;
use cairn::dict::DictCore;
use cairn::schema::ColumnSpec;
use cairn::table::Table;
use cairn::types::{ColIx, DataType, ObjKey, Value};
use cairn::{CairnError, Result};

const DICT: ColIx = ColIx(0);

fn dict_table(arena: &mut StoreArena) -> Result<Table> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Table::new(arena, vec![ColumnSpec::dictionary("props")])
}

fn stored_refs(table: &Table, arena: &StoreArena, key: ObjKey) -> Result<Option<DictRefs>> {
    let state = table.tree().get(arena, key)?;
    arena
        .translate(state.node)?
        .as_leaf()?
        .column(DICT)?
        .dict_refs(state.index)
}

#[test]
fn basics_update_and_not_found() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;

    // Nothing stored until the first insert.
    assert_eq!(dict.size(&table, &arena)?, 0);
    assert!(stored_refs(&table, &arena, obj)?.is_none());
    assert!(matches!(
        dict.get(&table, &arena, &Value::Str("a".into())),
        Err(CairnError::NotFound(_))
    ));

    let (_, inserted) = dict.insert(&mut table, &mut arena, Value::Str("a".into()), Value::Int(1))?;
    assert!(inserted);
    let (_, inserted) = dict.insert(&mut table, &mut arena, Value::Str("b".into()), Value::Bool(true))?;
    assert!(inserted);
    assert!(stored_refs(&table, &arena, obj)?.is_some());

    // Update-or-insert overwrites in place.
    let (ndx, inserted) =
        dict.insert(&mut table, &mut arena, Value::Str("a".into()), Value::Int(9))?;
    assert!(!inserted);
    assert_eq!(ndx, 0);
    assert_eq!(dict.size(&table, &arena)?, 2);
    assert_eq!(dict.get(&table, &arena, &Value::Str("a".into()))?, Value::Int(9));
    assert!(dict.contains_key(&table, &arena, &Value::Str("b".into()))?);

    // Erase is idempotent: the second call is a no-op.
    assert!(dict.erase(&mut table, &mut arena, &Value::Str("a".into()))?);
    assert!(!dict.erase(&mut table, &mut arena, &Value::Str("a".into()))?);
    assert_eq!(dict.size(&table, &arena)?, 1);
    Ok(())
}

#[test]
fn erase_and_clear_without_storage_are_no_ops() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    assert!(!dict.erase(&mut table, &mut arena, &Value::Int(1))?);
    dict.clear(&mut table, &mut arena)?;
    // Neither call may create the underlying storage.
    assert!(stored_refs(&table, &arena, obj)?.is_none());
    Ok(())
}

#[test]
fn positions_and_placeholder_flow() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;

    // Reserve the slot, then fill it by position.
    let (ndx, created) =
        dict.get_or_insert_placeholder(&mut table, &mut arena, Value::Str("x".into()))?;
    assert!(created);
    assert_eq!(dict.get_by_position(&table, &arena, ndx)?.1, Value::Null);
    dict.set_by_position(&mut table, &mut arena, ndx, Value::Float(2.5))?;
    assert_eq!(dict.get(&table, &arena, &Value::Str("x".into()))?, Value::Float(2.5));

    let (again, created) =
        dict.get_or_insert_placeholder(&mut table, &mut arena, Value::Str("x".into()))?;
    assert!(!created);
    assert_eq!(again, ndx);

    assert!(dict.get_by_position(&table, &arena, 5).is_err());
    assert!(dict
        .insert(&mut table, &mut arena, Value::Null, Value::Int(0))
        .is_err());
    Ok(())
}

#[test]
fn second_handle_sees_fresh_state() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let first = table.get_dictionary(&arena, obj, DICT)?;
    let second = table.get_dictionary(&arena, obj, DICT)?;

    first.insert(&mut table, &mut arena, Value::Int(1), Value::Int(10))?;
    // Populate the second handle's cache, then mutate through the first.
    assert_eq!(second.size(&table, &arena)?, 1);
    first.insert(&mut table, &mut arena, Value::Int(2), Value::Int(20))?;
    assert_eq!(second.size(&table, &arena)?, 2);
    assert_eq!(second.get(&table, &arena, &Value::Int(2))?, Value::Int(20));
    Ok(())
}

#[test]
fn view_survives_copy_on_write_relocation() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    dict.insert(&mut table, &mut arena, Value::Str("k".into()), Value::Int(1))?;

    let committed = stored_refs(&table, &arena, obj)?
        .ok_or(CairnError::Corruption("dictionary cell empty"))?;
    arena.commit();

    dict.insert(&mut table, &mut arena, Value::Str("l".into()), Value::Int(2))?;

    // The row cell was rewritten to point at cloned blocks.
    let live = stored_refs(&table, &arena, obj)?
        .ok_or(CairnError::Corruption("dictionary cell empty"))?;
    assert_ne!(live.keys, committed.keys);
    assert_eq!(dict.size(&table, &arena)?, 2);

    // The committed version still reads the old single entry.
    let old = DictCore::from_refs(committed);
    assert_eq!(old.size(&arena)?, 1);
    assert_eq!(old.get(&arena, &Value::Str("k".into()))?, Value::Int(1));
    Ok(())
}

#[test]
fn view_survives_row_movement() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let mut keys = Vec::new();
    for _ in 0..300 {
        keys.push(table.create_object(&mut arena)?);
    }
    let owner = keys[250];
    let dict = table.get_dictionary(&arena, owner, DICT)?;
    dict.insert(&mut table, &mut arena, Value::Str("home".into()), Value::Int(7))?;
    assert_eq!(dict.size(&table, &arena)?, 1);

    // Erasing everything before the owner reshapes the tree around it.
    for key in &keys[..250] {
        table.erase_object(&mut arena, *key)?;
    }
    assert_eq!(dict.get(&table, &arena, &Value::Str("home".into()))?, Value::Int(7));
    dict.insert(&mut table, &mut arena, Value::Str("away".into()), Value::Int(8))?;
    assert_eq!(dict.size(&table, &arena)?, 2);
    Ok(())
}

#[test]
fn committed_snapshot_survives_owner_erase() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    dict.insert(&mut table, &mut arena, Value::Str("k".into()), Value::Int(1))?;
    let committed = stored_refs(&table, &arena, obj)?
        .ok_or(CairnError::Corruption("dictionary cell empty"))?;
    arena.commit();

    table.erase_object(&mut arena, obj)?;
    // Churn the allocator so a wrongly freed slot would be recycled.
    let other = table.create_object(&mut arena)?;
    let noise = table.get_dictionary(&arena, other, DICT)?;
    noise.insert(&mut table, &mut arena, Value::Int(0), Value::Int(0))?;

    // The committed version still reads the erased object's dictionary.
    let old = DictCore::from_refs(committed);
    assert_eq!(old.size(&arena)?, 1);
    assert_eq!(old.get(&arena, &Value::Str("k".into()))?, Value::Int(1));
    Ok(())
}

#[test]
fn committed_snapshot_survives_column_removal() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    dict.insert(&mut table, &mut arena, Value::Str("k".into()), Value::Int(1))?;
    let committed = stored_refs(&table, &arena, obj)?
        .ok_or(CairnError::Corruption("dictionary cell empty"))?;
    arena.commit();

    table.remove_column(&mut arena, DICT)?;
    let old = DictCore::from_refs(committed);
    assert_eq!(old.get(&arena, &Value::Str("k".into()))?, Value::Int(1));
    Ok(())
}

#[test]
fn erasing_the_owner_releases_storage() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    dict.insert(&mut table, &mut arena, Value::Int(1), Value::Int(1))?;
    let refs = stored_refs(&table, &arena, obj)?
        .ok_or(CairnError::Corruption("dictionary cell empty"))?;

    table.erase_object(&mut arena, obj)?;
    assert!(arena.translate(refs.keys).is_err());
    assert!(arena.translate(refs.values).is_err());
    assert!(matches!(
        dict.size(&table, &arena),
        Err(CairnError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn entries_and_cursor_iterate_in_storage_order() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    // Insertion order, not key order.
    for key in ["b", "a", "c"] {
        dict.insert(&mut table, &mut arena, Value::Str(key.into()), Value::Int(0))?;
    }
    let entries = dict.entries(&table, &arena)?;
    let keys: Vec<Value> = entries.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(
        keys,
        vec![
            Value::Str("b".into()),
            Value::Str("a".into()),
            Value::Str("c".into()),
        ]
    );

    let mut cursor = dict.cursor();
    let mut seen = Vec::new();
    while let Some(entry) = cursor.next(&table, &arena)? {
        seen.push(entry);
    }
    assert_eq!(seen, entries);

    dict.clear(&mut table, &mut arena)?;
    assert_eq!(dict.size(&table, &arena)?, 0);
    assert!(dict.entries(&table, &arena)?.is_empty());
    Ok(())
}

#[test]
fn deep_copied_storage_is_independent() -> Result<()> {
    let mut arena = StoreArena::new();
    let mut table = dict_table(&mut arena)?;
    let obj = table.create_object(&mut arena)?;
    let dict = table.get_dictionary(&arena, obj, DICT)?;
    dict.insert(&mut table, &mut arena, Value::Str("k".into()), Value::Int(1))?;

    let refs = stored_refs(&table, &arena, obj)?
        .ok_or(CairnError::Corruption("dictionary cell empty"))?;
    let copy = DictCore::from_refs(refs).deep_copy(&mut arena)?;
    copy.insert(&mut arena, Value::Str("extra".into()), Value::Int(2))?;

    assert_eq!(dict.size(&table, &arena)?, 1);
    assert_eq!(copy.size(&arena)?, 2);
    assert!(!DictCore::from_refs(refs).eq(&arena, copy)?);
    copy.destroy(&mut arena)?;
    Ok(())
}
