use std::sync::Arc;

use arbor::cache::DocumentCache;
use arbor::connector::{Connector, ConnectorRegistry, MemoryConnector};
use arbor::document::{ChildEntry, DocumentView};
use arbor::path::Name;

const CHILD_COUNT: usize = 7;
const BLOCK_SIZE: u64 = 3;

fn paged_setup() -> (Arc<MemoryConnector>, DocumentCache) {
    let conn = Arc::new(MemoryConnector::new("mem"));
    let mut children = Vec::new();
    for i in 0..CHILD_COUNT {
        let id = format!("c{i}");
        conn.seed(&id, Some("parent"), &[]);
        children.push(ChildEntry {
            name: Name::local(format!("child{i}")),
            key: conn.key(&id),
        });
    }
    conn.insert_paged(
        DocumentView {
            key: conn.key("parent"),
            parent: None,
            primary_type: Name::qualified("nt", "unstructured"),
            mixins: Vec::new(),
            properties: Default::default(),
            children: Vec::new(),
            children_info: None,
        },
        children,
        BLOCK_SIZE,
    );
    let registry = Arc::new(ConnectorRegistry::new());
    registry.register(Arc::clone(&conn) as Arc<dyn Connector>);
    (conn.clone(), DocumentCache::new(registry))
}

fn traverse(cache: &DocumentCache, conn: &MemoryConnector) -> Vec<String> {
    cache
        .children(&conn.key("parent"))
        .map(|entry| entry.expect("traversal succeeds").key.id().to_string())
        .collect()
}

fn expected_ids() -> Vec<String> {
    (0..CHILD_COUNT).map(|i| format!("c{i}")).collect()
}

#[test]
fn children_arrive_once_and_in_order_across_blocks() {
    let (conn, cache) = paged_setup();

    let ids = traverse(&cache, &conn);
    assert_eq!(ids, expected_ids());
    // The first block rides on the document read; two follow-up fetches
    // cover offsets 3 and 6.
    assert_eq!(conn.block_fetches(), 2);

    // The fetched blocks were folded into the cached node, so a second
    // traversal touches no blocks at all.
    let again = traverse(&cache, &conn);
    assert_eq!(again, expected_ids());
    assert_eq!(conn.block_fetches(), 2);
    assert_eq!(conn.reads("parent"), 1);
}

#[test]
fn stale_block_restarts_without_duplicating_entries() {
    let (conn, cache) = paged_setup();
    conn.mark_stale("parent", BLOCK_SIZE);

    let ids = traverse(&cache, &conn);
    assert_eq!(ids, expected_ids());
    // The stale fetch, then offsets 3 and 6 against the fresh chain.
    assert_eq!(conn.block_fetches(), 3);
    // The restart reloaded the document once.
    assert_eq!(conn.reads("parent"), 2);
}

#[test]
fn withdrawn_paging_restarts_onto_the_inline_list() {
    let (conn, cache) = paged_setup();

    let mut iter = cache.children(&conn.key("parent"));
    let mut ids: Vec<String> = Vec::new();
    for _ in 0..BLOCK_SIZE {
        let entry = iter.next().expect("first block entry").unwrap();
        ids.push(entry.key.id().to_string());
    }

    // The connector stops paging this document mid-traversal.
    conn.unpage("parent");
    for entry in iter {
        ids.push(entry.unwrap().key.id().to_string());
    }

    assert_eq!(ids, expected_ids());
    // The withdrawn-paging check answers before any block is served, and
    // the restart reads the full inline list in one document load.
    assert_eq!(conn.block_fetches(), 0);
    assert_eq!(conn.reads("parent"), 2);
}

#[test]
fn sibling_indexes_are_assigned_across_block_boundaries() {
    let conn = Arc::new(MemoryConnector::new("mem"));
    let mut children = Vec::new();
    for i in 0..5 {
        let id = format!("t{i}");
        conn.seed(&id, Some("parent"), &[]);
        children.push(ChildEntry {
            name: Name::local("twin"),
            key: conn.key(&id),
        });
    }
    conn.insert_paged(
        DocumentView {
            key: conn.key("parent"),
            parent: None,
            primary_type: Name::qualified("nt", "unstructured"),
            mixins: Vec::new(),
            properties: Default::default(),
            children: Vec::new(),
            children_info: None,
        },
        children,
        2,
    );
    let registry = Arc::new(ConnectorRegistry::new());
    registry.register(Arc::clone(&conn) as Arc<dyn Connector>);
    let cache = DocumentCache::new(registry);

    let indexes: Vec<u32> = cache
        .children(&conn.key("parent"))
        .map(|entry| entry.unwrap().segment.sibling_index())
        .collect();
    assert_eq!(indexes, vec![1, 2, 3, 4, 5]);
}
