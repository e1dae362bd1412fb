//! Dispatch queue ranking.
//!
//! Open requests are served most urgent first, then oldest first, with the
//! request id as the final tie-break so the order is total and independent
//! of input order. A [`Ranking`] is a snapshot: it never observes ledger
//! writes made after it was built.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use lifelink_core::Timestamp;
use lifelink_domain::{PriorityStatus, RequestId, RequestStatus, Result, TransportRequest};

use crate::store::RequestLedger;

/// Heap entry; the max element is the next request to serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RankKey {
    priority: PriorityStatus,
    created_at: Timestamp,
    id: RequestId,
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .rank()
            .cmp(&other.priority.rank())
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&TransportRequest> for RankKey {
    fn from(request: &TransportRequest) -> Self {
        Self {
            priority: request.priority,
            created_at: request.created_at,
            id: request.id,
        }
    }
}

/// Ordering of two requests in the dispatch queue; `Less` is served first
pub fn compare(a: &TransportRequest, b: &TransportRequest) -> Ordering {
    RankKey::from(b).cmp(&RankKey::from(a))
}

/// Restartable, lazily ordered view over a set of open requests
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    heap: BinaryHeap<RankKey>,
}

impl Ranking {
    /// Request ids in serving order.
    ///
    /// Each call starts from the top; ordering work is done per item pulled.
    pub fn iter(&self) -> impl Iterator<Item = RequestId> + '_ {
        let mut heap = self.heap.clone();
        std::iter::from_fn(move || heap.pop().map(|key| key.id))
    }

    /// Next request to serve
    pub fn first(&self) -> Option<RequestId> {
        self.heap.peek().map(|key| key.id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn to_vec(&self) -> Vec<RequestId> {
        self.iter().collect()
    }
}

/// Rank the `Requested` members of `requests`; others are ignored
pub fn rank(requests: &[TransportRequest]) -> Ranking {
    Ranking {
        heap: requests
            .iter()
            .filter(|r| r.status == RequestStatus::Requested)
            .map(RankKey::from)
            .collect(),
    }
}

/// Rank a snapshot of the ledger's open requests
pub fn rank_ledger(ledger: &dyn RequestLedger) -> Result<Ranking> {
    let open = ledger.list_by_status(RequestStatus::Requested)?;
    Ok(rank(&open))
}
