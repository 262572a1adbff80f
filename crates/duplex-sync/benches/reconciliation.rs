//! Reconciliation of a wide tree

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use duplex_sync::{ConflictNaming, SyncSnapshot, SyncState};
use duplex_tree::{SyncedNodeModel, UpdateNodeModel};
use duplex_types::{NodeAttributes, NodeId, UpdateStatus};
use tokio_util::sync::CancellationToken;

const REMOTE_OFFSET: u64 = 1_000_000;

/// `directories` directories of `files` files each in one sync root; every third file renamed locally,
/// every fifth edited remotely and every seventh directory deleted remotely
fn wide_state(directories: u64, files: u64) -> SyncState {
    let mut snapshot = SyncSnapshot::default();
    let sync_root = NodeId::new(1);
    let remote_sync_root = NodeId::new(1 + REMOTE_OFFSET);
    snapshot
        .synced
        .push(SyncedNodeModel::directory(sync_root, NodeId::ROOT, "Sync", remote_sync_root));
    snapshot.remote_updates.push(UpdateNodeModel::directory(
        remote_sync_root,
        NodeId::ROOT,
        "Sync",
        UpdateStatus::UNCHANGED,
    ));
    snapshot
        .local_updates
        .push(UpdateNodeModel::directory(sync_root, NodeId::ROOT, "Sync", UpdateStatus::UNCHANGED));

    let mut next = 2;
    for directory in 0..directories {
        let directory_id = next;
        next += 1;
        let name = format!("dir-{directory}");
        snapshot.synced.push(SyncedNodeModel::directory(
            NodeId::new(directory_id),
            sync_root,
            name.clone(),
            NodeId::new(directory_id + REMOTE_OFFSET),
        ));
        let deleted = directory % 7 == 0;
        snapshot.remote_updates.push(UpdateNodeModel::directory(
            NodeId::new(directory_id + REMOTE_OFFSET),
            remote_sync_root,
            name.clone(),
            if deleted { UpdateStatus::DELETED } else { UpdateStatus::UNCHANGED },
        ));
        snapshot.local_updates.push(UpdateNodeModel::directory(
            NodeId::new(directory_id),
            sync_root,
            name,
            UpdateStatus::UNCHANGED,
        ));

        for file in 0..files {
            let id = next;
            next += 1;
            let name = format!("file-{file}.txt");
            snapshot.synced.push(SyncedNodeModel::file(
                NodeId::new(id),
                NodeId::new(directory_id),
                name.clone(),
                NodeId::new(id + REMOTE_OFFSET),
            ));
            if deleted {
                snapshot.remote_updates.push(UpdateNodeModel::file(
                    NodeId::new(id + REMOTE_OFFSET),
                    NodeId::new(directory_id + REMOTE_OFFSET),
                    name.clone(),
                    UpdateStatus::DELETED,
                ));
            } else if file % 5 == 0 {
                let mut edited = UpdateNodeModel::file(
                    NodeId::new(id + REMOTE_OFFSET),
                    NodeId::new(directory_id + REMOTE_OFFSET),
                    name.clone(),
                    UpdateStatus::EDITED,
                );
                edited.node.attributes = NodeAttributes::with_size(file);
                snapshot.remote_updates.push(edited);
            }
            if file % 3 == 0 {
                snapshot.local_updates.push(UpdateNodeModel::file(
                    NodeId::new(id),
                    NodeId::new(directory_id),
                    format!("renamed-{file}.txt"),
                    UpdateStatus::RENAMED,
                ));
            }
        }
    }
    SyncState::from_snapshot(snapshot).unwrap()
}

fn bench_wide_tree(c: &mut Criterion) {
    let naming = ConflictNaming::default();
    let token = CancellationToken::new();
    let mut group = c.benchmark_group("reconcile_wide_tree");

    for (directories, files) in [(10, 100), (50, 100), (100, 200)] {
        let state = wide_state(directories, files);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{directories}x{files}")),
            &state,
            |b, state| {
                b.iter(|| {
                    let mut state = state.clone();
                    black_box(state.reconcile(&naming, &token).unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_wide_tree);
criterion_main!(benches);
