//! Inbound read loop.
//!
//! One dispatcher task per connection reads messages in arrival order:
//!
//! - Call: looked up in the connection variant's registry namespace and run on
//!   its own task, bounded by a semaphore. The response (CallResult or
//!   CallError, always carrying the Call's id) is queued on the writer when
//!   the handler finishes, so responses leave in completion order.
//! - CallResult / CallError: handed to the pending call table by id.
//! - Anything undecodable: logged and absorbed.
//!
//! Malformed frames and orphan responses extend one streak of consecutive
//! invalid frames; any good frame resets it. A streak longer than the
//! configured limit closes the connection.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::connection::{CloseReason, Connection};
use crate::error::Result;
use crate::handler::{CallContext, HandlerError, HandlerResult};
use crate::protocol::{Call, CallResult, ErrorCode, Frame, MalformedFrame, MessageType};
use crate::transport::TransportError;
use crate::version::Variant;

/// How an incoming Call was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handler succeeded; a CallResult was sent.
    Success,
    /// Handler failed; a CallError with this code was sent.
    Failed(ErrorCode),
    /// No handler for the action on this variant; UnknownAction was sent.
    UnknownAction,
    /// Handler capacity was exhausted; the Call was refused.
    Overloaded,
    /// Handler panicked; InternalError was sent.
    Panicked,
    /// The connection closed before the response could be sent.
    Discarded,
}

/// Record of one incoming Call, reported once it has been answered.
#[derive(Debug, Clone)]
pub struct DispatchedCall {
    pub id: String,
    pub action: String,
    pub variant: Variant,
    pub outcome: DispatchOutcome,
    /// Time from receipt to response.
    pub elapsed: Duration,
}

/// Hook for observing a connection.
///
/// Plain closures taking `&DispatchedCall` are observers.
pub trait ConnectionObserver: Send + Sync + 'static {
    /// An incoming Call was answered.
    fn on_call(&self, _call: &DispatchedCall) {}

    /// The connection closed.
    fn on_close(&self, _reason: &CloseReason) {}
}

impl<F> ConnectionObserver for F
where
    F: Fn(&DispatchedCall) + Send + Sync + 'static,
{
    fn on_call(&self, call: &DispatchedCall) {
        self(call)
    }
}

/// Per-connection read loop state.
pub(crate) struct Dispatcher {
    connection: Connection,
    semaphore: Arc<Semaphore>,
    invalid_streak: usize,
}

impl Dispatcher {
    pub(crate) fn new(connection: Connection) -> Self {
        let permits = connection.shared.config.max_concurrent_handlers.max(1);
        Self {
            connection,
            semaphore: Arc::new(Semaphore::new(permits)),
            invalid_streak: 0,
        }
    }

    /// Run until the transport ends, the writer stops, or the connection is closed.
    pub(crate) async fn run<S>(mut self, mut stream: S, mut writer_task: JoinHandle<Result<()>>)
    where
        S: Stream<Item = std::result::Result<String, TransportError>> + Unpin,
    {
        let shared = self.connection.shared.clone();
        let mut close_rx = shared.close_tx.subscribe();

        let reason = if shared.is_closed() {
            None
        } else {
            loop {
                tokio::select! {
                    biased;
                    _ = close_rx.changed() => break None,
                    result = &mut writer_task => {
                        let reason = match result {
                            Ok(Ok(())) => "writer stopped".to_string(),
                            Ok(Err(e)) => e.to_string(),
                            Err(e) => e.to_string(),
                        };
                        tracing::error!(peer = %shared.peer_identity, %reason, "writer failed");
                        break Some(CloseReason::WriterFailed(reason));
                    }
                    message = stream.next() => match message {
                        Some(Ok(text)) => {
                            if let Some(reason) = self.on_message(&text) {
                                break Some(reason);
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!(peer = %shared.peer_identity, error = %e, "transport failed");
                            break Some(CloseReason::Transport(e.to_string()));
                        }
                        None => break Some(CloseReason::PeerClosed),
                    },
                }
            }
        };

        if let Some(reason) = reason {
            shared.shutdown(reason);
        }
    }

    /// Handle one inbound message. Returns a close reason if the connection must close.
    pub(crate) fn on_message(&mut self, text: &str) -> Option<CloseReason> {
        let shared = &self.connection.shared;
        if shared.is_closed() {
            tracing::debug!(peer = %shared.peer_identity, "connection closing; frame not dispatched");
            return None;
        }

        match Frame::decode(text) {
            Ok(Frame::Call(call)) => {
                self.invalid_streak = 0;
                self.dispatch_call(call);
                None
            }
            Ok(Frame::CallResult(result)) => {
                if shared.pending.resolve(&result.id, result.payload) {
                    self.invalid_streak = 0;
                    None
                } else {
                    self.record_invalid()
                }
            }
            Ok(Frame::CallError(error)) => {
                if shared.pending.reject(error) {
                    self.invalid_streak = 0;
                    None
                } else {
                    self.record_invalid()
                }
            }
            Err(err) => {
                tracing::warn!(
                    peer = %shared.peer_identity,
                    id = err.message_id(),
                    error = %err,
                    "malformed frame"
                );
                if let Some(id) = malformed_call_id(&err) {
                    let reply = HandlerError::format_violation(err.to_string());
                    let frame = Frame::CallError(shared.adapter.error_frame(id, &reply));
                    if let Err(e) = shared.writer.try_send(frame.encode()) {
                        tracing::debug!(id, error = %e, "error reply not sent");
                    }
                }
                self.record_invalid()
            }
        }
    }

    fn record_invalid(&mut self) -> Option<CloseReason> {
        self.invalid_streak += 1;
        let limit = self.connection.shared.config.max_consecutive_invalid_frames;
        if limit != 0 && self.invalid_streak > limit {
            tracing::warn!(
                peer = %self.connection.shared.peer_identity,
                streak = self.invalid_streak,
                limit,
                "too many consecutive invalid frames"
            );
            return Some(CloseReason::TooManyInvalidFrames(self.invalid_streak));
        }
        None
    }

    fn dispatch_call(&self, call: Call) {
        let shared = &self.connection.shared;
        let variant = shared.adapter.variant();
        let received = Instant::now();
        let Call {
            id,
            action,
            payload,
        } = call;

        tracing::debug!(peer = %shared.peer_identity, id = %id, action = %action, "call received");

        let ctx = CallContext::attached(
            id.clone(),
            action.clone(),
            variant,
            shared.peer_identity.clone(),
            self.connection.clone(),
        );
        let future = match shared.adapter.registry().dispatch(payload, ctx) {
            Ok(future) => future,
            Err(e) => {
                tracing::warn!(
                    peer = %shared.peer_identity,
                    id = %id,
                    action = %action,
                    error = %e,
                    "no handler for action"
                );
                let reply = HandlerError::new(
                    ErrorCode::UnknownAction,
                    format!("action {action} is not supported on {variant}"),
                );
                self.refuse(id, action, received, reply, DispatchOutcome::UnknownAction);
                return;
            }
        };

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    peer = %shared.peer_identity,
                    id = %id,
                    action = %action,
                    "handler capacity reached, refusing call"
                );
                let reply = HandlerError::new(ErrorCode::RpcFrameworkError, "handler capacity reached");
                self.refuse(id, action, received, reply, DispatchOutcome::Overloaded);
                return;
            }
        };

        let connection = self.connection.clone();
        tokio::spawn(async move {
            let _permit = permit;

            let (result, outcome) = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(payload)) if payload.is_object() => (Ok(payload), DispatchOutcome::Success),
                Ok(Ok(_)) => {
                    tracing::warn!(id = %id, action = %action, "handler returned a non-object payload");
                    let err = HandlerError::internal("handler returned a non-object payload");
                    let outcome = DispatchOutcome::Failed(err.code.clone());
                    (Err(err), outcome)
                }
                Ok(Err(err)) => {
                    tracing::debug!(id = %id, action = %action, error = %err, "handler failed");
                    let outcome = DispatchOutcome::Failed(err.code.clone());
                    (Err(err), outcome)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(id = %id, action = %action, %message, "handler panicked");
                    (Err(HandlerError::internal(message)), DispatchOutcome::Panicked)
                }
            };

            respond(&connection, id, action, received, result, outcome).await;
        });
    }

    /// Answer a Call without running a handler.
    ///
    /// The CallError is queued without waiting: a refusal never holds a task
    /// open, and refusals leave in the order their Calls arrived. If the
    /// outbound queue is full the reply is dropped.
    fn refuse(
        &self,
        id: String,
        action: String,
        received: Instant,
        reply: HandlerError,
        mut outcome: DispatchOutcome,
    ) {
        let shared = &self.connection.shared;
        let frame = Frame::CallError(shared.adapter.error_frame(id.clone(), &reply));
        if let Err(e) = shared.writer.try_send(frame.encode()) {
            tracing::warn!(id = %id, action = %action, error = %e, "refusal not sent");
            outcome = DispatchOutcome::Discarded;
        }
        report(&self.connection, id, action, received, outcome);
    }
}

/// Queue the response to an incoming Call and report it to observers.
async fn respond(
    connection: &Connection,
    id: String,
    action: String,
    received: Instant,
    result: HandlerResult,
    mut outcome: DispatchOutcome,
) {
    let shared = &connection.shared;
    if shared.is_closed() {
        tracing::debug!(id = %id, action = %action, "connection closed; response discarded");
        outcome = DispatchOutcome::Discarded;
    } else {
        let frame = match result {
            Ok(payload) => Frame::CallResult(CallResult::new(id.clone(), payload)),
            Err(err) => Frame::CallError(shared.adapter.error_frame(id.clone(), &err)),
        };
        if let Err(e) = shared.writer.send(frame.encode()).await {
            tracing::warn!(id = %id, action = %action, error = %e, "response not sent");
            outcome = DispatchOutcome::Discarded;
        } else {
            tracing::debug!(id = %id, action = %action, ?outcome, "response queued");
        }
    }

    report(connection, id, action, received, outcome);
}

fn report(connection: &Connection, id: String, action: String, received: Instant, outcome: DispatchOutcome) {
    let shared = &connection.shared;
    let record = DispatchedCall {
        id,
        action,
        variant: shared.adapter.variant(),
        outcome,
        elapsed: received.elapsed(),
    };
    for observer in &shared.observers {
        observer.on_call(&record);
    }
}

/// Id of a structurally broken Call, if it could be read.
fn malformed_call_id(err: &MalformedFrame) -> Option<&str> {
    match err {
        MalformedFrame::WrongLength {
            message_type: MessageType::Call,
            id: Some(id),
            ..
        }
        | MalformedFrame::WrongType {
            message_type: MessageType::Call,
            id: Some(id),
            ..
        } => Some(id),
        _ => None,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_call_id() {
        let err = Frame::decode(r#"[2,"17","Heartbeat",[]]"#).unwrap_err();
        assert_eq!(malformed_call_id(&err), Some("17"));

        let err = Frame::decode(r#"[2,"17","Heartbeat"]"#).unwrap_err();
        assert_eq!(malformed_call_id(&err), Some("17"));

        // responses never get a reply
        let err = Frame::decode(r#"[3,"17",[]]"#).unwrap_err();
        assert_eq!(malformed_call_id(&err), None);

        let err = Frame::decode("not json").unwrap_err();
        assert_eq!(malformed_call_id(&err), None);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked: boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("bad state"));
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked: bad state");

        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "handler panicked");
    }

    #[test]
    fn test_closure_is_observer() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let observer: Arc<dyn ConnectionObserver> = Arc::new(move |call: &DispatchedCall| {
            assert_eq!(call.outcome, DispatchOutcome::Success);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        observer.on_call(&DispatchedCall {
            id: "1".into(),
            action: "Heartbeat".into(),
            variant: Variant::V201,
            outcome: DispatchOutcome::Success,
            elapsed: Duration::ZERO,
        });
        observer.on_close(&CloseReason::LocalClose);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
