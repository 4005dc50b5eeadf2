use async_trait::async_trait;
use linkgrid_core::{
    compute_delta, AssociationKind, CommitCoordinator, CommitOutcome, EntityId, FetchedEntity,
    InMemoryLinkRepository, LinkOp, LinkRepository, MatrixScope, RepoResult, Snapshot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

const KIND: AssociationKind = AssociationKind::LearningOutcomePlo;

/// Every mutation waits until `parties` mutations are in flight together.
struct RendezvousRepository {
    barrier: Barrier,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RendezvousRepository {
    fn new(parties: usize) -> Self {
        Self {
            barrier: Barrier::new(parties),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    async fn meet(&self) -> RepoResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.barrier.wait().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl LinkRepository for RendezvousRepository {
    async fn fetch_rows(&self, _scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        Ok(Vec::new())
    }

    async fn fetch_columns(&self, _scope: MatrixScope) -> RepoResult<Vec<FetchedEntity>> {
        Ok(Vec::new())
    }

    async fn add_links(
        &self,
        _kind: AssociationKind,
        _row_id: EntityId,
        _column_ids: &[EntityId],
    ) -> RepoResult<()> {
        self.meet().await
    }

    async fn remove_links(
        &self,
        _kind: AssociationKind,
        _row_id: EntityId,
        _column_ids: &[EntityId],
    ) -> RepoResult<()> {
        self.meet().await
    }
}

#[tokio::test]
async fn empty_delta_dispatches_no_calls() {
    let repo = Arc::new(InMemoryLinkRepository::new());
    let coordinator = CommitCoordinator::new(Arc::clone(&repo));
    let snapshot = Snapshot::from_pairs([(1, 10)]);

    let outcome = coordinator
        .commit(KIND, &compute_delta(&snapshot, &snapshot))
        .await;

    assert!(matches!(outcome, CommitOutcome::NothingToSave));
    assert_eq!(outcome.user_message(), "nothing to save");
    let counts = repo.call_counts();
    assert_eq!((counts.adds, counts.removes), (0, 0));
}

#[tokio::test]
async fn all_calls_are_in_flight_at_once() {
    let initial = Snapshot::from_pairs([(1, 10), (2, 20)]);
    let working = Snapshot::from_pairs([(1, 11), (2, 21), (3, 30)]);
    let delta = compute_delta(&initial, &working);
    assert_eq!(delta.call_count(), 5);

    // Sequential dispatch would never release the barrier.
    let coordinator = CommitCoordinator::new(RendezvousRepository::new(5));
    let outcome = coordinator.commit(KIND, &delta).await;

    assert!(outcome.is_saved());
    assert_eq!(outcome.report().unwrap().calls.len(), 5);
    assert_eq!(coordinator.repo().peak.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn max_in_flight_bounds_concurrency() {
    let initial = Snapshot::new();
    let working = Snapshot::from_pairs([(1, 10), (2, 20), (3, 30), (4, 40)]);
    let delta = compute_delta(&initial, &working);

    let coordinator =
        CommitCoordinator::new(RendezvousRepository::new(2)).with_max_in_flight(Some(2));
    let outcome = coordinator.commit(KIND, &delta).await;

    assert!(outcome.is_saved());
    assert_eq!(coordinator.repo().peak.load(Ordering::SeqCst), 2);
    let rows: Vec<i64> = outcome
        .report()
        .unwrap()
        .calls
        .iter()
        .map(|call| call.row_id)
        .collect();
    assert_eq!(rows, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn failed_call_is_reported_without_rolling_back_successes() {
    let repo = Arc::new(InMemoryLinkRepository::new());
    repo.link(KIND, 1, 10).unwrap();
    repo.fail_remove_for(1).unwrap();
    let coordinator = CommitCoordinator::new(Arc::clone(&repo));

    let initial = Snapshot::from_pairs([(1, 10)]);
    let working = Snapshot::from_pairs([(1, 20), (2, 10)]);
    let outcome = coordinator
        .commit(KIND, &compute_delta(&initial, &working))
        .await;

    assert!(matches!(outcome, CommitOutcome::Failed(_)));
    assert_eq!(outcome.user_message(), "some changes could not be saved");

    let report = outcome.report().unwrap();
    assert_eq!(report.calls.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed_rows(), vec![1]);
    let failed: Vec<_> = report.failed_calls().map(|call| call.op).collect();
    assert_eq!(failed, vec![LinkOp::Remove]);

    // Add calls went through; the refused removal left (1, 10) in place.
    assert_eq!(
        repo.links(KIND).unwrap(),
        Snapshot::from_pairs([(1, 10), (1, 20), (2, 10)])
    );
}
