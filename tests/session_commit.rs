use std::sync::Arc;

use arbor::cache::{DocumentCache, InvalidationCause, SessionId};
use arbor::connector::{Connector, ConnectorRegistry, MemoryConnector};
use arbor::document::{Mutation, Property, PropertyValue};
use arbor::path::Name;
use arbor::RepoError;

fn string_prop(text: &str) -> Property {
    Property::single(PropertyValue::String(text.to_string()))
}

fn setup() -> (Arc<MemoryConnector>, DocumentCache) {
    let conn = Arc::new(MemoryConnector::new("mem"));
    conn.seed("root", None, &[("doc", "doc")]);
    conn.seed("doc", Some("root"), &[]);
    conn.set_property("doc", Name::local("title"), string_prop("draft"));
    let registry = Arc::new(ConnectorRegistry::new());
    registry.register(Arc::clone(&conn) as Arc<dyn Connector>);
    (conn.clone(), DocumentCache::new(registry))
}

#[test]
fn sessions_read_their_own_writes_in_isolation() {
    let (conn, cache) = setup();
    let doc = conn.key("doc");
    let writer = SessionId(1);
    let bystander = SessionId(2);

    cache.put_transient(
        writer,
        doc.clone(),
        Mutation::SetProperty {
            name: Name::local("title"),
            property: string_prop("edited"),
        },
    );

    let seen_by_writer = cache.node_for_session(writer, &doc, None).unwrap();
    assert_eq!(
        seen_by_writer.properties()[&Name::local("title")].first(),
        Some(&PropertyValue::String("edited".into()))
    );

    // Neither another session nor a plain read sees the buffered change.
    let seen_by_bystander = cache.node_for_session(bystander, &doc, None).unwrap();
    assert_eq!(
        seen_by_bystander.properties()[&Name::local("title")].first(),
        Some(&PropertyValue::String("draft".into()))
    );
    let shared = cache.get_node(&doc, None).unwrap();
    assert_eq!(
        shared.properties()[&Name::local("title")].first(),
        Some(&PropertyValue::String("draft".into()))
    );
}

#[test]
fn commit_publishes_to_connector_and_shared_cache() {
    let (conn, cache) = setup();
    let doc = conn.key("doc");
    let session = SessionId(7);

    // Warm the cache so commit has a snapshot to merge into.
    cache.get_node(&doc, None).unwrap();

    cache.put_transient(
        session,
        doc.clone(),
        Mutation::SetProperty {
            name: Name::local("title"),
            property: string_prop("published"),
        },
    );
    let receipt = cache.commit(session).expect("commit succeeds");
    assert_eq!(receipt.outcomes.len(), 1);
    assert!(receipt.outcomes[0].succeeded);

    // Visible to everyone without re-reading the connector.
    let reads_before = conn.reads("doc");
    let shared = cache.get_node(&doc, None).unwrap();
    assert_eq!(
        shared.properties()[&Name::local("title")].first(),
        Some(&PropertyValue::String("published".into()))
    );
    assert_eq!(conn.reads("doc"), reads_before);

    // And the connector's own copy was updated.
    let stored = conn.document("doc").unwrap();
    assert_eq!(
        stored.properties[&Name::local("title")].first(),
        Some(&PropertyValue::String("published".into()))
    );

    // The session buffer is gone.
    let after = cache.node_for_session(session, &doc, None).unwrap();
    assert_eq!(
        after.properties()[&Name::local("title")].first(),
        Some(&PropertyValue::String("published".into()))
    );
}

#[test]
fn discard_drops_buffered_changes() {
    let (conn, cache) = setup();
    let doc = conn.key("doc");
    let session = SessionId(3);

    cache.put_transient(
        session,
        doc.clone(),
        Mutation::SetProperty {
            name: Name::local("title"),
            property: string_prop("abandoned"),
        },
    );
    cache.discard(session);

    let node = cache.node_for_session(session, &doc, None).unwrap();
    assert_eq!(
        node.properties()[&Name::local("title")].first(),
        Some(&PropertyValue::String("draft".into()))
    );
    let receipt = cache.commit(session).expect("empty commit is a no-op");
    assert!(receipt.outcomes.is_empty());
}

#[test]
fn failed_connector_leaves_a_partial_commit_behind() {
    let good = Arc::new(MemoryConnector::new("alpha"));
    good.seed("a", None, &[]);
    good.set_property("a", Name::local("state"), string_prop("old"));
    let bad = Arc::new(MemoryConnector::new("beta"));
    bad.seed("b", None, &[]);
    bad.set_property("b", Name::local("state"), string_prop("old"));
    bad.set_fail_writes(true);

    let registry = Arc::new(ConnectorRegistry::new());
    registry.register(Arc::clone(&good) as Arc<dyn Connector>);
    registry.register(Arc::clone(&bad) as Arc<dyn Connector>);
    let cache = DocumentCache::new(registry);

    let a = good.key("a");
    let b = bad.key("b");
    cache.get_node(&a, None).unwrap();
    cache.get_node(&b, None).unwrap();

    let session = SessionId(11);
    cache.put_transient(
        session,
        a.clone(),
        Mutation::SetProperty {
            name: Name::local("state"),
            property: string_prop("new"),
        },
    );
    cache.put_transient(
        session,
        b.clone(),
        Mutation::SetProperty {
            name: Name::local("state"),
            property: string_prop("new"),
        },
    );

    let err = cache.commit(session).expect_err("beta rejects writes");
    let RepoError::PartialCommit(partial) = err else {
        panic!("expected a partial commit error");
    };
    assert_eq!(partial.outcomes.len(), 2);
    assert_eq!(partial.succeeded().count(), 1);
    assert_eq!(partial.failed().count(), 1);
    assert_eq!(partial.succeeded().next().unwrap().key, a);
    assert_eq!(partial.failed().next().unwrap().key, b);

    // The successful half stays applied; the failed half is untouched.
    let a_node = cache.get_node(&a, None).unwrap();
    assert_eq!(
        a_node.properties()[&Name::local("state")].first(),
        Some(&PropertyValue::String("new".into()))
    );
    let b_node = cache.get_node(&b, None).unwrap();
    assert_eq!(
        b_node.properties()[&Name::local("state")].first(),
        Some(&PropertyValue::String("old".into()))
    );
}

#[test]
fn added_siblings_receive_increasing_indexes() {
    let (conn, cache) = setup();
    let root = conn.key("root");
    let session = SessionId(5);
    cache.get_node(&root, None).unwrap();

    for id in ["x1", "x2"] {
        conn.seed(id, Some("root"), &[]);
        cache.put_transient(
            session,
            root.clone(),
            Mutation::AddChild {
                name: Name::local("item"),
                key: conn.key(id),
            },
        );
    }
    cache.commit(session).expect("adds apply");
    // Connector-side child list changed shape; reload the document.
    cache.invalidate(&root, InvalidationCause::Local);

    let node = cache.get_node(&root, None).unwrap();
    let indexes: Vec<_> = node
        .children()
        .entries()
        .iter()
        .filter(|c| c.key.id().starts_with('x'))
        .map(|c| c.segment.sibling_index())
        .collect();
    assert_eq!(indexes, vec![1, 2]);
}
