use crate::{RequestId, Result, RpcError};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Completion handler of one outbound request.
pub(crate) type ResponseSender = oneshot::Sender<Result<Value>>;

/// One outstanding outbound request.
///
/// Carries the same completion contract as the caller's handler:
/// [`resolve`](Self::resolve) and [`reject`](Self::reject). Both consume the
/// entry, so a request can be completed at most once no matter which of
/// response, timeout or close reaches it first.
pub(crate) struct PendingRequest {
    // ---
    id: RequestId,
    method: String,
    deadline: Instant,
    handler: ResponseSender,
}

impl PendingRequest {
    // ---

    pub fn new(
        id: RequestId,
        method: impl Into<String>,
        deadline: Instant,
        handler: ResponseSender,
    ) -> Self {
        // ---
        Self {
            id,
            method: method.into(),
            deadline,
            handler,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Deliver the response data.
    pub fn resolve(self, data: Value) {
        self.complete(Ok(data));
    }

    /// Deliver a failure.
    pub fn reject(self, err: RpcError) {
        self.complete(Err(err));
    }

    /// Deliver the fixed timeout failure (`408`, `"request timeout"`).
    pub fn time_out(self) {
        self.reject(RpcError::Timeout);
    }

    fn complete(self, result: Result<Value>) {
        // ---
        // The requester may have dropped its future; nothing left to notify.
        let _ = self.handler.send(result);
    }
}

/// Tracks outbound requests waiting for a response.
///
/// Entries are keyed by request id. Deadlines live in a single ordered
/// index so one timer (the dispatcher's) serves every request: the
/// dispatcher sleeps until [`next_deadline`](Self::next_deadline) and then
/// calls [`expire`](Self::expire).
///
/// Removing an entry by any path also unschedules its deadline, so an entry
/// leaves the tracker exactly once.
pub(crate) struct PendingRequests {
    // ---
    entries: HashMap<RequestId, PendingRequest>,
    deadlines: BTreeSet<(Instant, RequestId)>,
}

impl PendingRequests {
    // ---

    /// Create a new empty tracker
    pub fn new() -> Self {
        // ---
        Self {
            entries: HashMap::new(),
            deadlines: BTreeSet::new(),
        }
    }

    /// Register a request and schedule its deadline.
    ///
    /// Returns the entry previously registered under the same id, if any;
    /// its deadline is unscheduled.
    pub fn insert(&mut self, entry: PendingRequest) -> Option<PendingRequest> {
        // ---
        let previous = self.take(&entry.id);
        self.deadlines.insert((entry.deadline, entry.id));
        self.entries.insert(entry.id, entry);
        previous
    }

    /// Remove a request and cancel its deadline without completing it.
    pub fn take(&mut self, id: &RequestId) -> Option<PendingRequest> {
        // ---
        let entry = self.entries.remove(id)?;
        self.deadlines.remove(&(entry.deadline, entry.id));
        Some(entry)
    }

    /// Earliest scheduled deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        // ---
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every request whose deadline is at or before `now`,
    /// earliest first.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingRequest> {
        // ---
        let mut expired = Vec::new();
        while let Some(&(deadline, id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            self.deadlines.pop_first();
            if let Some(entry) = self.entries.remove(&id) {
                expired.push(entry);
            }
        }
        expired
    }

    /// Remove every request and cancel all deadlines.
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        // ---
        self.deadlines.clear();
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Get the number of pending requests
    pub fn len(&self) -> usize {
        // ---
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn entry(raw: u64, deadline: Instant) -> (PendingRequest, oneshot::Receiver<Result<Value>>) {
        // ---
        let (tx, rx) = oneshot::channel();
        let id = RequestId::new(raw).unwrap();
        (PendingRequest::new(id, "test", deadline, tx), rx)
    }

    #[test]
    fn test_insert_and_resolve() {
        // ---
        let mut pending = PendingRequests::new();
        let (request, mut rx) = entry(1, Instant::now() + Duration::from_secs(5));
        let id = request.id();

        assert!(pending.insert(request).is_none());
        assert_eq!(pending.len(), 1);

        let request = pending.take(&id).unwrap();
        assert_eq!(request.method(), "test");
        request.resolve(json!({"ok": 1}));

        // Should be removed after completion
        assert!(pending.is_empty());
        assert_eq!(pending.next_deadline(), None);

        let received = rx.try_recv().unwrap().unwrap();
        assert_eq!(received, json!({"ok": 1}));
    }

    #[test]
    fn test_take_twice() {
        // ---
        let mut pending = PendingRequests::new();
        let (request, _rx) = entry(3, Instant::now() + Duration::from_secs(1));
        let id = request.id();
        pending.insert(request);

        assert!(pending.take(&id).is_some());
        // Second take finds nothing
        assert!(pending.take(&id).is_none());
    }

    #[test]
    fn test_take_unknown_id() {
        // ---
        let mut pending = PendingRequests::new();
        let (request, mut rx) = entry(1, Instant::now() + Duration::from_secs(1));
        pending.insert(request);

        assert!(pending.take(&RequestId::new(99).unwrap()).is_none());
        assert_eq!(pending.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_expire_in_deadline_order() {
        // ---
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        let (late, _late_rx) = entry(1, now + Duration::from_secs(30));
        let (early, mut early_rx) = entry(2, now + Duration::from_secs(10));
        let (middle, _middle_rx) = entry(3, now + Duration::from_secs(20));
        pending.insert(late);
        pending.insert(early);
        pending.insert(middle);

        assert_eq!(pending.next_deadline(), Some(now + Duration::from_secs(10)));

        let expired = pending.expire(now + Duration::from_secs(20));
        let ids: Vec<u64> = expired.iter().map(|e| e.id().get()).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.next_deadline(), Some(now + Duration::from_secs(30)));

        for request in expired {
            request.time_out();
        }
        let err = early_rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.code(), Some(408));
    }

    #[test]
    fn test_taken_entry_never_expires() {
        // ---
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        let (request, _rx) = entry(1, now + Duration::from_secs(1));
        let id = request.id();
        pending.insert(request);

        pending.take(&id);
        assert!(pending.expire(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn test_drain_cancels_everything() {
        // ---
        let now = Instant::now();
        let mut pending = PendingRequests::new();
        let (a, mut a_rx) = entry(1, now + Duration::from_secs(1));
        let (b, mut b_rx) = entry(2, now + Duration::from_secs(2));
        pending.insert(a);
        pending.insert(b);

        for request in pending.drain() {
            request.reject(RpcError::PeerClosed);
        }

        assert!(pending.is_empty());
        assert_eq!(pending.next_deadline(), None);
        assert!(matches!(a_rx.try_recv().unwrap(), Err(RpcError::PeerClosed)));
        assert!(matches!(b_rx.try_recv().unwrap(), Err(RpcError::PeerClosed)));
    }

    #[test]
    fn test_completion_after_requester_dropped() {
        // ---
        let (request, rx) = entry(1, Instant::now());
        drop(rx);
        // Must not panic
        request.resolve(json!({}));
    }
}
