//! Descriptor persistence: reopen, registry resolution, and deterministic
//! level assignment across index instances.

mod common;

use common::create_test_storage;
use trellis_db::graph::schema::Meta;
use trellis_db::rocksdb::{ColumnFamily, Store};
use trellis_db::vector::{Comparator, Distance};
use trellis_db::Index;

#[test]
fn test_reopen_preserves_parameters_and_entry_point() {
    let (_temp_dir, storage) = create_test_storage();

    {
        let index = Index::builder(4, Distance::Cosine, 500)
            .with_vertex_type("Doc")
            .with_edge_type("Near")
            .with_m(6)
            .with_ef(20)
            .with_ef_construction(80)
            .build(&storage)
            .unwrap();

        for i in 0..30 {
            index
                .insert(
                    &storage,
                    &format!("doc-{}", i),
                    &[i as f32, 1.0, -1.0, (i % 3) as f32],
                )
                .unwrap();
        }
    }

    let reopened = Index::open(&storage, "Doc").unwrap();
    assert_eq!(reopened.dimensions(), 4);
    assert_eq!(reopened.m(), 6);
    assert_eq!(reopened.ef(), 20);
    assert_eq!(reopened.ef_construction(), 80);
    assert_eq!(reopened.max_item_count(), 500);
    assert_eq!(reopened.distance(), Distance::Cosine);
    assert_eq!(reopened.comparator(), Comparator::NaturalOrder);
    assert_eq!(reopened.edge_type(), "Near");

    // Entry point survives the reopen and the graph stays searchable.
    let entry = reopened.entry_point().unwrap();
    let vertices = reopened.vertices(&storage).unwrap();
    assert_eq!(vertices.len(), 30);
    let global_max = vertices.iter().map(|v| v.max_level).max().unwrap();
    let entry_level = vertices.iter().find(|v| v.id == entry).unwrap().max_level;
    assert_eq!(entry_level, global_max);

    let hits = reopened
        .find_nearest(&storage, &[3.0, 1.0, -1.0, 0.0], 3)
        .unwrap();
    assert_eq!(hits.len(), 3);

    // Further inserts work against the reopened instance.
    reopened
        .insert(&storage, "doc-late", &[100.0, 1.0, -1.0, 0.0])
        .unwrap();
    assert!(reopened.get(&storage, "doc-late").unwrap().is_some());
}

#[test]
fn test_open_unknown_index_fails() {
    let (_temp_dir, storage) = create_test_storage();
    let err = Index::open(&storage, "Nope").unwrap_err();
    assert!(err.to_string().contains("No index found"));
}

#[test]
fn test_duplicate_index_rejected() {
    let (_temp_dir, storage) = create_test_storage();
    Index::builder(2, Distance::L2, 10)
        .with_vertex_type("Doc")
        .build(&storage)
        .unwrap();
    let err = Index::builder(2, Distance::L2, 10)
        .with_vertex_type("Doc")
        .build(&storage)
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[test]
fn test_unknown_distance_function_fails_open() {
    let (_temp_dir, storage) = create_test_storage();
    Index::builder(2, Distance::L2, 10)
        .with_vertex_type("Doc")
        .build(&storage)
        .unwrap();

    // Corrupt the persisted descriptor with an unregistered function name.
    let txn_db = storage.transaction_db().unwrap();
    let store = Store::db(txn_db);
    let key = Meta::descriptor_key("Doc");
    let bytes = store.get(Meta::CF_NAME, &key).unwrap().unwrap();
    let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    value["distanceFunction"] = serde_json::json!("frobnitz");
    store
        .put(Meta::CF_NAME, &key, &serde_json::to_vec(&value).unwrap())
        .unwrap();

    let err = Index::open(&storage, "Doc").unwrap_err();
    assert!(err.to_string().contains("Unknown distance function"));
}

#[test]
fn test_two_indexes_share_one_database() {
    let (_temp_dir, storage) = create_test_storage();
    let first = Index::builder(2, Distance::L2, 10)
        .with_vertex_type("A")
        .build(&storage)
        .unwrap();
    let second = Index::builder(2, Distance::L2, 10)
        .with_vertex_type("B")
        .build(&storage)
        .unwrap();

    first.insert(&storage, "only-in-a", &[0.0, 0.0]).unwrap();
    second.insert(&storage, "only-in-b", &[1.0, 1.0]).unwrap();

    assert!(first.get(&storage, "only-in-b").unwrap().is_none());
    assert!(second.get(&storage, "only-in-a").unwrap().is_none());
    assert_eq!(first.vertices(&storage).unwrap().len(), 1);
    assert_eq!(second.vertices(&storage).unwrap().len(), 1);
}

#[test]
fn test_level_assignment_deterministic_across_indices() {
    // Same id, same m: identical max level in two fresh databases.
    let (_dir_a, storage_a) = create_test_storage();
    let (_dir_b, storage_b) = create_test_storage();

    let build = |storage: &trellis_db::Storage| {
        Index::builder(4, Distance::L2, 100)
            .with_vertex_type("Doc")
            .with_m(10)
            .build(storage)
            .unwrap()
    };
    let index_a = build(&storage_a);
    let index_b = build(&storage_b);

    for i in 0..40 {
        let id = format!("stable-{}", i);
        let vector = [i as f32, 0.0, 1.0, -1.0];
        index_a.insert(&storage_a, &id, &vector).unwrap();
        index_b.insert(&storage_b, &id, &vector).unwrap();
    }

    for i in 0..40 {
        let id = format!("stable-{}", i);
        let level_a = index_a.get(&storage_a, &id).unwrap().unwrap().max_level;
        let level_b = index_b.get(&storage_b, &id).unwrap().unwrap().max_level;
        assert_eq!(level_a, level_b, "level of {} diverged", id);
    }
}

#[test]
fn test_descriptor_snapshot_tracks_entry_point() {
    let (_temp_dir, storage) = create_test_storage();
    let index = Index::builder(2, Distance::L2, 10)
        .with_vertex_type("Doc")
        .build(&storage)
        .unwrap();

    assert_eq!(index.descriptor().entry_point, None);
    index.insert(&storage, "first", &[0.0, 0.0]).unwrap();
    let descriptor = index.descriptor();
    assert_eq!(descriptor.entry_point, index.entry_point());
    assert_eq!(descriptor.to_json()["vertexType"], "Doc");
}
