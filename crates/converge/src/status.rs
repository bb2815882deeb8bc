//! Provider status codes and per-kind reachability graphs.
//!
//! A status only moves along its kind's graph. Waiting for a target that
//! cannot be reached from the observed status is a misconfiguration the
//! poller reports immediately instead of burning the whole timeout.

use crate::types::{ABSENT, ResourceKind};
use std::collections::{BTreeSet, VecDeque};

/// Being prepared.
pub const INIT: &str = "INIT";
/// Being created.
pub const CREAT: &str = "CREAT";
/// Running.
pub const RUN: &str = "RUN";
/// Stopped.
pub const NSTOP: &str = "NSTOP";
/// Being terminated.
pub const TERMT: &str = "TERMT";
/// Attached to a server.
pub const ATTAC: &str = "ATTAC";
/// Detached.
pub const DETAC: &str = "DETAC";
/// Load balancer in service.
pub const USED: &str = "USED";
/// Synthetic status for kinds the provider reports no status for.
pub const ACTIVE: &str = "ACTIVE";

const SERVER_EDGES: &[(&str, &str)] = &[
    (INIT, CREAT),
    (CREAT, RUN),
    (CREAT, NSTOP),
    (RUN, NSTOP),
    (NSTOP, RUN),
    (RUN, TERMT),
    (NSTOP, TERMT),
    (TERMT, ABSENT),
];

const STORAGE_EDGES: &[(&str, &str)] = &[
    (INIT, CREAT),
    (CREAT, ATTAC),
    (CREAT, DETAC),
    (ATTAC, DETAC),
    (DETAC, ATTAC),
    (ATTAC, TERMT),
    (DETAC, TERMT),
    (TERMT, ABSENT),
];

const LOAD_BALANCER_EDGES: &[(&str, &str)] = &[(INIT, USED), (USED, TERMT), (TERMT, ABSENT)];

const STATUSLESS_EDGES: &[(&str, &str)] = &[(ACTIVE, ABSENT)];

/// Transition edges declared for a kind.
#[must_use]
pub fn edges(kind: ResourceKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        ResourceKind::Server => SERVER_EDGES,
        ResourceKind::BlockStorage => STORAGE_EDGES,
        ResourceKind::LoadBalancer => LOAD_BALANCER_EDGES,
        ResourceKind::AutoScalingGroup | ResourceKind::ScalingPolicy => STATUSLESS_EDGES,
    }
}

/// Statuses reachable from `from`, including `from` itself.
///
/// Returns `None` when `from` is not part of the graph; callers treat an
/// unknown status as "anything may still happen".
#[must_use]
pub fn reachable_from(kind: ResourceKind, from: &str) -> Option<BTreeSet<&'static str>> {
    let graph = edges(kind);
    let start = graph
        .iter()
        .flat_map(|(a, b)| [*a, *b])
        .find(|s| *s == from)?;

    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for (_, next) in graph.iter().filter(|(a, _)| *a == current) {
            if seen.insert(*next) {
                queue.push_back(*next);
            }
        }
    }
    Some(seen)
}

/// Whether any of `targets` can still be reached from `from`.
///
/// Unknown statuses are not rejected.
pub fn can_reach<'a, I>(kind: ResourceKind, from: &str, targets: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    match reachable_from(kind, from) {
        Some(reachable) => targets.into_iter().any(|t| reachable.contains(t)),
        None => true,
    }
}
