//! Full sync cycles over two in-memory replicas

use duplex_engine::SyncEngine;
use duplex_sync::{ConflictType, SyncSnapshot};
use duplex_tests::test_utils::engine;
use duplex_tests::MemoryReplica;
use duplex_tree::{PropagationNodeModel, TreeNodeModel};
use duplex_types::{Error, FileSystemErrorCode, UpdateStatus};
use tokio_util::sync::CancellationToken;

/// Documents/{a.txt, b.txt} on a replica; returns the ids of Documents and a.txt
fn populate(replica: &MemoryReplica) -> (String, String) {
    let root = replica.root_id();
    let documents = replica.add_directory(&root, "Documents");
    let file = replica.add_file(&documents, "a.txt", 10);
    replica.add_file(&documents, "b.txt", 20);
    (documents, file)
}

fn planned<'a>(snapshot: &'a SyncSnapshot, name: &str) -> Option<&'a PropagationNodeModel> {
    snapshot.propagation.iter().find(|node| node.name() == name)
}

/// Two replicas with the same content, linked by a first cycle
async fn synced_pair() -> (SyncEngine, MemoryReplica, MemoryReplica, String, String) {
    let remote = MemoryReplica::new("r");
    let local = MemoryReplica::new("l");
    let (_, remote_file) = populate(&remote);
    let (_, local_file) = populate(&local);
    let engine = engine(&remote, &local).unwrap();

    let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.reconciliation.real_conflicts().count(), 0);
    (engine, remote, local, remote_file, local_file)
}

async fn rescan_cycle(engine: &SyncEngine) -> duplex_engine::CycleReport {
    engine.request_rescan();
    engine.run_cycle(&CancellationToken::new()).await.unwrap()
}

#[tokio::test]
async fn test_identical_replicas_converge_without_propagation() {
    let (engine, _, _, _, _) = synced_pair().await;

    let snapshot = engine.snapshot().await.unwrap();

    assert!(snapshot.propagation.is_empty(), "{:?}", snapshot.propagation);
    assert!(snapshot.local_updates.is_empty());
    assert!(snapshot.remote_updates.is_empty());
    let names: Vec<_> = snapshot.synced.iter().map(|node| node.name().to_string()).collect();
    for name in ["1", "Documents", "a.txt", "b.txt"] {
        assert!(names.contains(&name.to_string()), "{name} missing from {names:?}");
    }
}

#[tokio::test]
async fn test_remote_only_content_is_planned_for_local_creation() {
    let remote = MemoryReplica::new("r");
    let local = MemoryReplica::new("l");
    populate(&remote);
    let engine = engine(&remote, &local).unwrap();

    let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();
    let snapshot = engine.snapshot().await.unwrap();

    assert!(report.has_pending_changes());
    for name in ["Documents", "a.txt", "b.txt"] {
        let node = planned(&snapshot, name).unwrap();
        assert_eq!(node.remote_status, UpdateStatus::CREATED, "{name}");
        assert_eq!(node.local_status, UpdateStatus::UNCHANGED, "{name}");
    }
}

#[tokio::test]
async fn test_local_rename_is_planned_for_remote() {
    let (engine, _, local, _, local_file) = synced_pair().await;

    local.rename(&local_file, "renamed.txt");
    let report = rescan_cycle(&engine).await;

    assert_eq!(report.local_updates, 1);
    assert_eq!(report.remote_updates, 0);
    let snapshot = engine.snapshot().await.unwrap();
    let node = planned(&snapshot, "renamed.txt").unwrap();
    assert_eq!(node.local_status, UpdateStatus::RENAMED);
    assert_eq!(node.remote_status, UpdateStatus::UNCHANGED);
    assert!(planned(&snapshot, "a.txt").is_none());
}

#[tokio::test]
async fn test_both_edits_keep_remote_content_and_back_up_local() {
    let (engine, remote, local, remote_file, local_file) = synced_pair().await;

    remote.edit(&remote_file, 11);
    local.edit(&local_file, 12);
    let report = rescan_cycle(&engine).await;

    assert!(report
        .reconciliation
        .conflicts
        .iter()
        .any(|conflict| conflict.conflict_type == ConflictType::EditEdit));
    let snapshot = engine.snapshot().await.unwrap();
    let node = planned(&snapshot, "a.txt").unwrap();
    assert!(node.remote_status.contains(UpdateStatus::EDITED));
    let backup = node.backup_name.as_deref().unwrap();
    assert!(backup.starts_with("a (# Edit conflict"), "{backup}");
}

#[tokio::test]
async fn test_same_edit_on_both_sides_is_a_pseudo_conflict() {
    let (engine, remote, local, remote_file, local_file) = synced_pair().await;

    remote.edit(&remote_file, 15);
    local.edit(&local_file, 15);
    let report = rescan_cycle(&engine).await;

    assert_eq!(report.reconciliation.real_conflicts().count(), 0);
    assert!(!report.has_pending_changes());
}

#[tokio::test]
async fn test_remote_directory_deletion_is_planned_locally() {
    let remote = MemoryReplica::new("r");
    let local = MemoryReplica::new("l");
    let (remote_documents, _) = populate(&remote);
    populate(&local);
    let engine = engine(&remote, &local).unwrap();
    engine.run_cycle(&CancellationToken::new()).await.unwrap();

    remote.remove(&remote_documents);
    let report = rescan_cycle(&engine).await;

    assert!(report.remote.deleted > 0);
    let snapshot = engine.snapshot().await.unwrap();
    let node = planned(&snapshot, "Documents").unwrap();
    assert!(node.remote_status.contains(UpdateStatus::DELETED));
    assert_eq!(node.local_status, UpdateStatus::UNCHANGED);
}

#[tokio::test]
async fn test_failed_listing_is_completed_by_a_later_cycle() {
    let remote = MemoryReplica::new("r");
    let local = MemoryReplica::new("l");
    let (documents, _) = populate(&remote);
    remote.fail_with(&documents, FileSystemErrorCode::SharingViolation);
    let engine = engine(&remote, &local).unwrap();
    let token = CancellationToken::new();

    let first = engine.run_cycle(&token).await.unwrap();
    assert!(first.has_failures());
    assert!(planned(&engine.snapshot().await.unwrap(), "a.txt").is_none());

    remote.clear_failures();
    let second = engine.run_cycle(&token).await.unwrap();

    assert!(!second.has_failures());
    assert_eq!(second.remote_updates, 2);
    let snapshot = engine.snapshot().await.unwrap();
    assert_eq!(planned(&snapshot, "a.txt").unwrap().remote_status, UpdateStatus::CREATED);
    assert!(planned(&snapshot, "Documents").is_some());
}

#[tokio::test]
async fn test_cancelled_cycle_changes_nothing() {
    let remote = MemoryReplica::new("r");
    let local = MemoryReplica::new("l");
    populate(&remote);
    let engine = engine(&remote, &local).unwrap();
    let token = CancellationToken::new();
    token.cancel();

    assert_eq!(engine.run_cycle(&token).await.unwrap_err(), Error::Cancelled);

    assert_eq!(engine.snapshot().await.unwrap(), SyncSnapshot::default());
    let report = engine.run_cycle(&CancellationToken::new()).await.unwrap();
    assert!(report.has_pending_changes());
}
