//! Pending call table.
//!
//! Correlates outbound Calls with their CallResult/CallError. Each entry owns
//! a oneshot sender; whoever removes the entry from the map is the only one
//! allowed to complete it, and removal plus completion happen under the table
//! lock. That gives every call exactly one terminal outcome:
//!
//! - success ([`resolve`](PendingCallTable::resolve))
//! - peer error ([`reject`](PendingCallTable::reject), surfaced as [`OcppError::Remote`])
//! - [`OcppError::Timeout`]
//! - [`OcppError::ConnectionClosed`] ([`close_all`](PendingCallTable::close_all))
//!
//! A response whose id is no longer in the table is an orphan and is dropped.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::config::deadline_after;
use crate::error::{OcppError, Result};
use crate::protocol::CallError;

type Completion = oneshot::Sender<Result<Value>>;

struct PendingCall {
    action: String,
    submitted_at: Instant,
    deadline: Instant,
    tx: Completion,
}

#[derive(Default)]
struct Inner {
    calls: HashMap<String, PendingCall>,
    next_id: u64,
    closed: bool,
}

/// Per-connection map from correlation id to a waiting caller.
pub struct PendingCallTable {
    inner: Mutex<Inner>,
    max_pending: usize,
}

/// Snapshot of one in-flight call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub id: String,
    pub action: String,
    /// Time since submission.
    pub age: Duration,
    /// Time left before the call times out.
    pub remaining: Duration,
}

/// Withdraws the entry if the `submit` future is dropped early.
struct PendingGuard<'a> {
    table: &'a PendingCallTable,
    id: &'a str,
    active: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.active = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if self.table.inner.lock().calls.remove(self.id).is_some() {
            tracing::debug!(id = self.id, "call abandoned: removed pending entry");
        }
    }
}

impl PendingCallTable {
    /// Create a table; `max_pending` of 0 means unbounded.
    pub fn new(max_pending: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_pending,
        }
    }

    /// Register a call, transmit it, and wait for its outcome.
    ///
    /// `transmit` receives the allocated id and must encode and queue the
    /// Call frame. The deadline starts before transmission, so time spent
    /// waiting on the writer counts toward `timeout`.
    ///
    /// # Errors
    ///
    /// - [`OcppError::ConnectionClosed`] if the table is closed, now or later
    /// - [`OcppError::TooManyPendingCalls`] at the limit
    /// - [`OcppError::Timeout`] when the deadline passes
    /// - [`OcppError::Remote`] when the peer answers with a CallError
    /// - whatever `transmit` fails with
    pub async fn submit<F, Fut>(&self, action: &str, timeout: Duration, transmit: F) -> Result<Value>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (id, deadline, mut rx) = self.register(action, timeout)?;
        let mut guard = PendingGuard {
            table: self,
            id: &id,
            active: true,
        };

        let outcome = tokio::time::timeout_at(deadline, async {
            transmit(id.clone()).await?;
            tracing::debug!(id = %id, action, "call sent");
            match (&mut rx).await {
                Ok(result) => result,
                Err(_) => Err(OcppError::ConnectionClosed),
            }
        })
        .await;

        match outcome {
            Ok(result) => {
                // Completed entries are already gone; transmit failures are
                // withdrawn by the guard.
                if result.is_ok() {
                    guard.disarm();
                }
                result
            }
            Err(_elapsed) => {
                let removed = self.inner.lock().calls.remove(&id).is_some();
                guard.disarm();
                if removed {
                    tracing::warn!(id = %id, action, ?timeout, "call timed out");
                    return Err(OcppError::Timeout {
                        action: action.to_string(),
                        id: id.clone(),
                        timeout,
                    });
                }
                // Completed under the lock just as the deadline fired.
                match rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(OcppError::Timeout {
                        action: action.to_string(),
                        id: id.clone(),
                        timeout,
                    }),
                }
            }
        }
    }

    fn register(
        &self,
        action: &str,
        timeout: Duration,
    ) -> Result<(String, Instant, oneshot::Receiver<Result<Value>>)> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(OcppError::ConnectionClosed);
        }
        if self.max_pending != 0 && inner.calls.len() >= self.max_pending {
            tracing::warn!(action, limit = self.max_pending, "pending call limit reached");
            return Err(OcppError::TooManyPendingCalls(self.max_pending));
        }

        // Monotonic counter; skip anything still in flight after wrap-around.
        let id = loop {
            inner.next_id = inner.next_id.wrapping_add(1);
            let candidate = inner.next_id.to_string();
            if !inner.calls.contains_key(&candidate) {
                break candidate;
            }
        };

        let now = Instant::now();
        let deadline = deadline_after(now, timeout);
        let (tx, rx) = oneshot::channel();
        inner.calls.insert(
            id.clone(),
            PendingCall {
                action: action.to_string(),
                submitted_at: now,
                deadline,
                tx,
            },
        );

        Ok((id, deadline, rx))
    }

    /// Complete a call with its CallResult payload.
    ///
    /// Returns `false` and logs an orphan if no call is waiting on `id`.
    pub fn resolve(&self, id: &str, payload: Value) -> bool {
        self.complete(id, Ok(payload))
    }

    /// Complete a call with the peer's CallError.
    ///
    /// Returns `false` and logs an orphan if no call is waiting on the id.
    pub fn reject(&self, error: CallError) -> bool {
        let id = error.id.clone();
        self.complete(&id, Err(OcppError::Remote(error)))
    }

    fn complete(&self, id: &str, outcome: Result<Value>) -> bool {
        let mut inner = self.inner.lock();
        match inner.calls.remove(id) {
            Some(call) => {
                tracing::debug!(
                    id,
                    action = %call.action,
                    elapsed = ?call.submitted_at.elapsed(),
                    ok = outcome.is_ok(),
                    "call completed"
                );
                // The receiver may be gone if the caller was cancelled.
                let _ = call.tx.send(outcome);
                true
            }
            None => {
                tracing::warn!(id, "orphan response dropped");
                false
            }
        }
    }

    /// Fail every waiting call with [`OcppError::ConnectionClosed`] and refuse
    /// new ones. Returns how many calls were failed.
    pub fn close_all(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let count = inner.calls.len();
        for (id, call) in inner.calls.drain() {
            tracing::debug!(id = %id, action = %call.action, "failing call: connection closed");
            let _ = call.tx.send(Err(OcppError::ConnectionClosed));
        }
        count
    }

    /// Number of calls waiting for a response.
    pub fn len(&self) -> usize {
        self.inner.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Ids of waiting calls in allocation order.
    pub fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().calls.keys().cloned().collect();
        ids.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        ids
    }

    /// Details of waiting calls in allocation order.
    pub fn snapshot(&self) -> Vec<PendingInfo> {
        let now = Instant::now();
        let mut calls: Vec<PendingInfo> = self
            .inner
            .lock()
            .calls
            .iter()
            .map(|(id, call)| PendingInfo {
                id: id.clone(),
                action: call.action.clone(),
                age: now.saturating_duration_since(call.submitted_at),
                remaining: call.deadline.saturating_duration_since(now),
            })
            .collect();
        calls.sort_by(|a, b| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)));
        calls
    }
}

impl std::fmt::Debug for PendingCallTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PendingCallTable")
            .field("pending", &inner.calls.len())
            .field("closed", &inner.closed)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Table plus a channel that receives the id of every transmitted call.
    fn fixture(max: usize) -> (Arc<PendingCallTable>, mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(PendingCallTable::new(max)), rx, tx)
    }

    fn spawn_call(
        table: &Arc<PendingCallTable>,
        sent: &mpsc::UnboundedSender<String>,
        timeout: Duration,
    ) -> tokio::task::JoinHandle<Result<Value>> {
        let table = table.clone();
        let sent = sent.clone();
        tokio::spawn(async move {
            table
                .submit("Heartbeat", timeout, |id| async move {
                    let _ = sent.send(id);
                    Ok(())
                })
                .await
        })
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let (table, mut sent, tx) = fixture(0);
        let call = spawn_call(&table, &tx, Duration::from_secs(5));

        let id = sent.recv().await.unwrap();
        assert_eq!(id, "1");
        assert!(table.resolve(&id, json!({"currentTime": "2024-01-01T00:00:00Z"})));

        let payload = call.await.unwrap().unwrap();
        assert_eq!(payload["currentTime"], "2024-01-01T00:00:00Z");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unbounded_timeout_resolves() {
        let (table, mut sent, tx) = fixture(0);
        let call = spawn_call(&table, &tx, Duration::MAX);

        let id = sent.recv().await.unwrap();
        assert_eq!(table.snapshot().len(), 1);
        assert!(table.resolve(&id, json!({})));
        assert_eq!(call.await.unwrap().unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_reject_carries_code() {
        let (table, mut sent, tx) = fixture(0);
        let call = spawn_call(&table, &tx, Duration::from_secs(5));

        let id = sent.recv().await.unwrap();
        assert!(table.reject(CallError::new(id, "NotImplemented", "unsupported", json!({}))));

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.remote().unwrap().code, "NotImplemented");
    }

    #[tokio::test]
    async fn test_responses_route_by_id() {
        let (table, mut sent, tx) = fixture(0);
        let a = spawn_call(&table, &tx, Duration::from_secs(5));
        let id_a = sent.recv().await.unwrap();
        let b = spawn_call(&table, &tx, Duration::from_secs(5));
        let id_b = sent.recv().await.unwrap();
        assert_ne!(id_a, id_b);

        assert!(table.resolve(&id_b, json!({"who": "b"})));
        assert_eq!(b.await.unwrap().unwrap()["who"], "b");
        assert_eq!(table.pending_ids(), vec![id_a.clone()]);

        assert!(table.resolve(&id_a, json!({"who": "a"})));
        assert_eq!(a.await.unwrap().unwrap()["who"], "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_response_is_orphan() {
        let (table, mut sent, tx) = fixture(0);
        let call = spawn_call(&table, &tx, Duration::from_secs(5));
        let id = sent.recv().await.unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, OcppError::Timeout { ref action, .. } if action == "Heartbeat"));

        assert!(!table.resolve(&id, json!({})));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_orphan_without_any_call() {
        let table = PendingCallTable::new(0);
        assert!(!table.resolve("999", json!({})));
        assert!(!table.reject(CallError::new("999", "GenericError", "", json!({}))));
    }

    #[tokio::test]
    async fn test_close_all_fails_every_call() {
        let (table, mut sent, tx) = fixture(0);
        let calls: Vec<_> = (0..3)
            .map(|_| spawn_call(&table, &tx, Duration::from_secs(3600)))
            .collect();
        for _ in 0..3 {
            sent.recv().await.unwrap();
        }

        assert_eq!(table.close_all(), 3);
        assert!(table.is_closed());
        for call in calls {
            assert!(call.await.unwrap().unwrap_err().is_connection_closed());
        }

        // New submits fail immediately.
        let err = table
            .submit("Heartbeat", Duration::from_secs(1), |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(err.is_connection_closed());
    }

    #[tokio::test]
    async fn test_transmit_failure_withdraws_entry() {
        let table = PendingCallTable::new(0);
        let err = table
            .submit("Heartbeat", Duration::from_secs(1), |_| async {
                Err(OcppError::BackpressureTimeout)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OcppError::BackpressureTimeout));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_submit_withdraws_entry() {
        let (table, mut sent, tx) = fixture(0);
        let call = spawn_call(&table, &tx, Duration::from_secs(3600));
        sent.recv().await.unwrap();
        assert_eq!(table.len(), 1);

        call.abort();
        let _ = call.await;
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_pending_limit() {
        let (table, mut sent, tx) = fixture(2);
        let _a = spawn_call(&table, &tx, Duration::from_secs(3600));
        let _b = spawn_call(&table, &tx, Duration::from_secs(3600));
        sent.recv().await.unwrap();
        sent.recv().await.unwrap();

        let err = table
            .submit("Heartbeat", Duration::from_secs(1), |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, OcppError::TooManyPendingCalls(2)));
    }

    #[test]
    fn test_id_allocation_skips_in_flight() {
        let table = PendingCallTable::new(0);
        let (first, _, _rx1) = table.register("A", Duration::from_secs(1)).unwrap();
        assert_eq!(first, "1");

        // Force the counter to wrap onto the in-flight id.
        table.inner.lock().next_id = u64::MAX;
        let (second, _, _rx2) = table.register("B", Duration::from_secs(1)).unwrap();
        assert_eq!(second, "0");
        let (third, _, _rx3) = table.register("C", Duration::from_secs(1)).unwrap();
        assert_eq!(third, "2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_remaining_time() {
        let (table, mut sent, tx) = fixture(0);
        let _call = spawn_call(&table, &tx, Duration::from_secs(10));
        sent.recv().await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].action, "Heartbeat");
        assert_eq!(snapshot[0].age, Duration::from_secs(4));
        assert_eq!(snapshot[0].remaining, Duration::from_secs(6));
    }
}
