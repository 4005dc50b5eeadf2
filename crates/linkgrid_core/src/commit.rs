//! Commit coordination: turning a delta into concurrent backend calls.
//!
//! # Responsibility
//! - Plan at most one add call and one remove call per changed row.
//! - Dispatch every planned call concurrently and gather every result.
//! - Classify the batch as saved, failed, or nothing to save.
//!
//! # Invariants
//! - An empty delta dispatches zero calls.
//! - A batch is `Saved` only if every call succeeded.
//! - Succeeded calls are never rolled back; call errors never escape as `Err`.

use crate::diff::Delta;
use crate::model::entity::{AssociationKind, EntityId};
use crate::repo::link_repo::{LinkRepository, RepoError};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Backend mutation kind for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkOp {
    Add,
    Remove,
}

impl Display for LinkOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => f.write_str("add"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

/// One call the coordinator will dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCall {
    pub row_id: EntityId,
    pub op: LinkOp,
    pub column_ids: Vec<EntityId>,
}

/// Result of one dispatched call.
#[derive(Debug)]
pub struct CallResult {
    pub row_id: EntityId,
    pub op: LinkOp,
    pub column_ids: Vec<EntityId>,
    pub outcome: Result<(), RepoError>,
}

impl CallResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Every call dispatched by one commit, ordered by row then op.
#[derive(Debug)]
pub struct CommitReport {
    pub kind: AssociationKind,
    pub calls: Vec<CallResult>,
}

impl CommitReport {
    pub fn is_success(&self) -> bool {
        self.calls.iter().all(CallResult::is_ok)
    }

    pub fn failed_calls(&self) -> impl Iterator<Item = &CallResult> {
        self.calls.iter().filter(|call| !call.is_ok())
    }

    /// Rows with at least one failed call, ascending.
    pub fn failed_rows(&self) -> Vec<EntityId> {
        self.failed_calls()
            .map(|call| call.row_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.calls.iter().filter(|call| call.is_ok()).count()
    }
}

/// Aggregate result of one commit.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The delta was empty; no call was made.
    NothingToSave,
    /// Every call succeeded.
    Saved(CommitReport),
    /// At least one call failed. Earlier successes stay applied.
    Failed(CommitReport),
}

impl CommitOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }

    pub fn report(&self) -> Option<&CommitReport> {
        match self {
            Self::NothingToSave => None,
            Self::Saved(report) | Self::Failed(report) => Some(report),
        }
    }

    pub fn into_report(self) -> Option<CommitReport> {
        match self {
            Self::NothingToSave => None,
            Self::Saved(report) | Self::Failed(report) => Some(report),
        }
    }

    /// User-facing notification text.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NothingToSave => "nothing to save",
            Self::Saved(_) => "changes saved",
            Self::Failed(_) => "some changes could not be saved",
        }
    }
}

/// Plans the calls for `delta`: per row, an add call when `added` is
/// non-empty and a remove call when `removed` is non-empty.
pub fn plan_calls(delta: &Delta) -> Vec<PlannedCall> {
    let mut calls = Vec::with_capacity(delta.call_count());
    for (&row_id, row) in delta {
        if !row.added.is_empty() {
            calls.push(PlannedCall {
                row_id,
                op: LinkOp::Add,
                column_ids: row.added.clone(),
            });
        }
        if !row.removed.is_empty() {
            calls.push(PlannedCall {
                row_id,
                op: LinkOp::Remove,
                column_ids: row.removed.clone(),
            });
        }
    }
    calls
}

/// Dispatches deltas to a `LinkRepository`.
pub struct CommitCoordinator<R> {
    repo: R,
    max_in_flight: Option<usize>,
}

impl<R: LinkRepository> CommitCoordinator<R> {
    /// Creates a coordinator without an in-flight limit.
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            max_in_flight: None,
        }
    }

    /// Bounds the number of simultaneous calls. `None` or `Some(0)` means
    /// unbounded.
    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit.filter(|limit| *limit > 0);
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Sends `delta` for association `kind` and gathers every call result.
    pub async fn commit(&self, kind: AssociationKind, delta: &Delta) -> CommitOutcome {
        let planned = plan_calls(delta);
        if planned.is_empty() {
            info!("event=commit_dispatch module=commit status=skipped kind={kind} calls=0");
            return CommitOutcome::NothingToSave;
        }

        let started_at = Instant::now();
        let (added, removed) = delta.link_counts();
        info!(
            "event=commit_dispatch module=commit status=start kind={} rows={} calls={} added={} removed={} max_in_flight={}",
            kind,
            delta.len(),
            planned.len(),
            added,
            removed,
            self.max_in_flight
                .map_or_else(|| "unbounded".to_string(), |limit| limit.to_string())
        );

        let mut calls = match self.max_in_flight {
            None => join_all(planned.into_iter().map(|call| self.dispatch(kind, call))).await,
            Some(limit) => {
                stream::iter(planned.into_iter().map(|call| self.dispatch(kind, call)))
                    .buffer_unordered(limit)
                    .collect::<Vec<_>>()
                    .await
            }
        };
        calls.sort_by_key(|call| (call.row_id, call.op));

        let report = CommitReport { kind, calls };
        let failed = report.calls.len() - report.succeeded();
        let status = if failed == 0 { "ok" } else { "error" };
        info!(
            "event=commit_done module=commit status={} kind={} calls={} failed={} failed_rows={:?} duration_ms={}",
            status,
            kind,
            report.calls.len(),
            failed,
            report.failed_rows(),
            started_at.elapsed().as_millis()
        );

        if report.is_success() {
            CommitOutcome::Saved(report)
        } else {
            CommitOutcome::Failed(report)
        }
    }

    async fn dispatch(&self, kind: AssociationKind, call: PlannedCall) -> CallResult {
        let PlannedCall {
            row_id,
            op,
            column_ids,
        } = call;
        let outcome = match op {
            LinkOp::Add => self.repo.add_links(kind, row_id, &column_ids).await,
            LinkOp::Remove => self.repo.remove_links(kind, row_id, &column_ids).await,
        };
        if let Err(err) = &outcome {
            warn!(
                "event=commit_call module=commit status=error kind={} op={} row_id={} columns={} error={}",
                kind,
                op,
                row_id,
                column_ids.len(),
                err
            );
        }
        CallResult {
            row_id,
            op,
            column_ids,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_calls, LinkOp, PlannedCall};
    use crate::diff::compute_delta;
    use crate::model::snapshot::Snapshot;

    #[test]
    fn plan_issues_one_call_per_direction_per_row() {
        let initial = Snapshot::from_pairs([(1, 10), (1, 11), (2, 20)]);
        let working = Snapshot::from_pairs([(1, 12), (1, 13), (2, 20), (2, 21)]);

        let calls = plan_calls(&compute_delta(&initial, &working));

        assert_eq!(
            calls,
            vec![
                PlannedCall {
                    row_id: 1,
                    op: LinkOp::Add,
                    column_ids: vec![12, 13]
                },
                PlannedCall {
                    row_id: 1,
                    op: LinkOp::Remove,
                    column_ids: vec![10, 11]
                },
                PlannedCall {
                    row_id: 2,
                    op: LinkOp::Add,
                    column_ids: vec![21]
                },
            ]
        );
    }

    #[test]
    fn empty_delta_plans_nothing() {
        let snapshot = Snapshot::from_pairs([(1, 10)]);
        assert!(plan_calls(&compute_delta(&snapshot, &snapshot)).is_empty());
    }
}
