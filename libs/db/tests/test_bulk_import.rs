//! Bulk import: an index seeded from an in-memory origin answers queries
//! identically to the origin.

mod common;

use common::{create_test_storage, random_vectors};
use trellis_db::vector::Distance;
use trellis_db::{Index, RamIndex};

fn build_origin(count: usize, dim: usize, seed: u64) -> (RamIndex, Vec<Vec<f32>>) {
    let vectors = random_vectors(count, dim, seed);
    let mut origin = RamIndex::new(dim as u32, Distance::L2, count)
        .with_m(8)
        .with_ef(50)
        .with_ef_construction(100);
    for (i, vector) in vectors.iter().enumerate() {
        origin.insert(&format!("item-{}", i), vector).unwrap();
    }
    (origin, vectors)
}

#[test]
fn test_import_materializes_all_vertices() {
    let (_temp_dir, storage) = create_test_storage();
    let (origin, _vectors) = build_origin(120, 8, 5);

    let index = Index::builder_from(&origin)
        .with_vertex_type("Item")
        .with_transaction_batch_size(32)
        .build(&storage)
        .unwrap();

    let vertices = index.vertices(&storage).unwrap();
    assert_eq!(vertices.len(), origin.len());

    for node in origin.iter_nodes() {
        let vertex = index.get(&storage, node.external_id).unwrap().unwrap();
        assert_eq!(vertex.max_level, node.max_level);
        assert_eq!(vertex.vector, node.vector);
    }

    // The entry point maps to the origin's entry node.
    let entry = index.entry_point().unwrap();
    let entry_vertex = vertices.into_iter().find(|v| v.id == entry).unwrap();
    assert_eq!(
        entry_vertex.external_id,
        origin.external_id(origin.entry_point().unwrap())
    );
}

#[test]
fn test_import_preserves_adjacency() {
    let (_temp_dir, storage) = create_test_storage();
    let (origin, _vectors) = build_origin(100, 8, 11);

    let index = Index::builder_from(&origin)
        .with_vertex_type("Item")
        .with_transaction_batch_size(16)
        .build(&storage)
        .unwrap();

    let external_id_of: std::collections::HashMap<_, _> = index
        .vertices(&storage)
        .unwrap()
        .into_iter()
        .map(|v| (v.id, v.external_id))
        .collect();

    for node in origin.iter_nodes() {
        let vertex = index.get(&storage, node.external_id).unwrap().unwrap();
        for (layer, connections) in node.connections.iter().enumerate() {
            let mut expected: Vec<String> = connections
                .iter()
                .map(|&n| origin.external_id(n).to_string())
                .collect();
            expected.sort_unstable();
            expected.dedup();

            let mut persisted: Vec<String> = index
                .neighbors_of(&storage, vertex.id, layer as u8)
                .unwrap()
                .into_iter()
                .map(|n| external_id_of[&n].clone())
                .collect();
            persisted.sort_unstable();

            assert_eq!(
                persisted, expected,
                "adjacency mismatch for {} at layer {}",
                node.external_id, layer
            );
        }
    }
}

#[test]
fn test_import_equivalence_with_origin_searches() {
    let (_temp_dir, storage) = create_test_storage();
    let (origin, _vectors) = build_origin(500, 16, 42);

    let index = Index::builder_from(&origin)
        .with_vertex_type("Item")
        .with_transaction_batch_size(64)
        .build(&storage)
        .unwrap();

    let queries = random_vectors(20, 16, 4242);
    for query in &queries {
        let origin_ids: Vec<String> = origin
            .search(query, 10)
            .unwrap()
            .into_iter()
            .map(|hit| origin.external_id(hit.node).to_string())
            .collect();

        let persisted_ids: Vec<String> = index
            .find_nearest(&storage, query, 10)
            .unwrap()
            .into_iter()
            .map(|r| r.vertex.external_id)
            .collect();

        assert_eq!(
            persisted_ids, origin_ids,
            "imported index diverged from origin"
        );
    }
}

#[test]
fn test_imported_index_accepts_online_inserts() {
    let (_temp_dir, storage) = create_test_storage();
    let (origin, _vectors) = build_origin(60, 8, 13);

    let index = Index::builder_from(&origin)
        .with_vertex_type("Item")
        .build(&storage)
        .unwrap();

    let extra = random_vectors(20, 8, 99);
    for (i, vector) in extra.iter().enumerate() {
        index
            .insert(&storage, &format!("extra-{}", i), vector)
            .unwrap();
    }

    assert_eq!(index.vertices(&storage).unwrap().len(), 80);
    let hits = index.find_nearest(&storage, &extra[0], 3).unwrap();
    assert_eq!(hits[0].vertex.external_id, "extra-0");
}
