//! DNS synchronizer behavior against an in-memory provider.

mod common;

use node_dns_sync::provider::RECORD_TYPE_A;
use node_dns_sync::{DnsOperationCause, NodeEntry, RemoveOutcome, SyncError, UpsertOutcome};

use common::*;

#[tokio::test]
async fn upsert_creates_missing_record() {
    let h = Harness::new();
    let sync = h.synchronizer();

    let outcome = sync.upsert(&NodeEntry::new("node-a", "198.51.100.1")).await.unwrap();
    assert!(matches!(outcome, UpsertOutcome::Created { .. }));

    let records = h.provider.a_records(&name_of("node-a"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "198.51.100.1");
    assert_eq!(records[0].ttl, TTL);
    assert!(!records[0].proxied);
}

#[tokio::test]
async fn upsert_twice_leaves_one_record() {
    let h = Harness::new();
    let sync = h.synchronizer();
    let entry = NodeEntry::new("node-a", "198.51.100.1");

    sync.upsert(&entry).await.unwrap();
    let second = sync.upsert(&entry).await.unwrap();

    assert!(matches!(second, UpsertOutcome::Unchanged { .. }));
    let records = h.provider.a_records(&name_of("node-a"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "198.51.100.1");
}

#[tokio::test]
async fn upsert_updates_existing_record_in_place() {
    let h = Harness::new();
    let id = h
        .provider
        .seed(&name_of("node-a"), RECORD_TYPE_A, "198.51.100.1");
    let sync = h.synchronizer();

    let outcome = sync.upsert(&NodeEntry::new("node-a", "198.51.100.2")).await.unwrap();
    assert_eq!(
        outcome,
        UpsertOutcome::Updated {
            record_id: id.clone(),
            previous: "198.51.100.1".to_string(),
        }
    );

    let records = h.provider.a_records(&name_of("node-a"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].content, "198.51.100.2");
}

#[tokio::test]
async fn upsert_with_duplicates_updates_first_and_keeps_rest() {
    let h = Harness::new();
    let name = name_of("node-a");
    let first = h.provider.seed(&name, RECORD_TYPE_A, "198.51.100.1");
    let second = h.provider.seed(&name, RECORD_TYPE_A, "198.51.100.9");
    let sync = h.synchronizer();

    sync.upsert(&NodeEntry::new("node-a", "198.51.100.5")).await.unwrap();

    let records = h.provider.a_records(&name);
    assert_eq!(records.len(), 2);
    let updated = records.iter().find(|r| r.id == first).unwrap();
    let untouched = records.iter().find(|r| r.id == second).unwrap();
    assert_eq!(updated.content, "198.51.100.5");
    assert_eq!(untouched.content, "198.51.100.9");
}

#[tokio::test]
async fn upsert_ignores_other_record_types() {
    let h = Harness::new();
    let name = name_of("node-a");
    h.provider.seed(&name, "TXT", "owner=someone-else");
    let sync = h.synchronizer();

    let outcome = sync.upsert(&NodeEntry::new("node-a", "198.51.100.1")).await.unwrap();
    assert!(matches!(outcome, UpsertOutcome::Created { .. }));
    assert_eq!(h.provider.records_named(&name).len(), 2);
}

#[tokio::test]
async fn remove_deletes_all_matching_a_records() {
    let h = Harness::new();
    let name = name_of("node-a");
    h.provider.seed(&name, RECORD_TYPE_A, "198.51.100.1");
    h.provider.seed(&name, RECORD_TYPE_A, "198.51.100.2");
    h.provider.seed(&name, "TXT", "keep me");
    let sync = h.synchronizer();

    let outcome = sync.remove(&NodeEntry::new("node-a", "198.51.100.1")).await.unwrap();
    assert_eq!(outcome, RemoveOutcome::Deleted(2));
    assert!(h.provider.a_records(&name).is_empty());
    assert_eq!(h.provider.records_named(&name).len(), 1);
}

#[tokio::test]
async fn remove_missing_record_is_noop() {
    let h = Harness::new();
    let sync = h.synchronizer();
    let entry = NodeEntry::new("node-a", "198.51.100.1");

    assert_eq!(sync.remove(&entry).await.unwrap(), RemoveOutcome::AlreadyAbsent);
    assert_eq!(sync.remove(&entry).await.unwrap(), RemoveOutcome::AlreadyAbsent);
    assert!(h.provider.mutations().is_empty());
}

#[tokio::test]
async fn provider_failure_is_scoped_to_node() {
    let h = Harness::new();
    h.provider.fail_on(Op::Create, &name_of("node-a"));
    let sync = h.synchronizer();

    let err = sync
        .upsert(&NodeEntry::new("node-a", "198.51.100.1"))
        .await
        .unwrap_err();
    match &err {
        SyncError::DnsOperation { node_id, source } => {
            assert_eq!(node_id, "node-a");
            assert!(matches!(source, DnsOperationCause::Provider(p) if p.is_transient()));
        }
        other => panic!("expected DnsOperation, got {:?}", other),
    }
    assert!(!err.is_fatal());

    // Other nodes are unaffected.
    sync.upsert(&NodeEntry::new("node-b", "198.51.100.2")).await.unwrap();
    assert_eq!(h.provider.a_records(&name_of("node-b")).len(), 1);
}

#[tokio::test]
async fn unnameable_node_fails_without_provider_calls() {
    let h = Harness::new();
    let sync = h.synchronizer();

    let err = sync.upsert(&NodeEntry::new("...", "198.51.100.1")).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::DnsOperation {
            source: DnsOperationCause::Naming(_),
            ..
        }
    ));
    assert!(h.provider.calls().is_empty());
}
