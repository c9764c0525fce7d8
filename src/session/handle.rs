//! Per-session state machine
//!
//! A [`Session`] moves `Initializing -> Open -> Closed`. Messages for one
//! session are processed one at a time, in arrival order, by the protocol
//! engine bound to it.

use std::{
    fmt,
    pin::Pin,
    sync::{Arc, Weak},
    task::{Context, Poll},
};

use chrono::{DateTime, Utc};
use futures::Stream;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use super::SessionId;
use crate::errors::SessionError;
use crate::mcp::engine::{EngineReply, ProtocolEngine};

/// Events buffered for a slow stream consumer before `notify` starts dropping.
pub const STREAM_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Terminated,
    Disconnected,
    EngineFailure,
    HandshakeRejected,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminated => "terminated",
            Self::Disconnected => "disconnected",
            Self::EngineFailure => "engine_failure",
            Self::HandshakeRejected => "handshake_rejected",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives a notification when a session reaches `Closed`.
pub trait SessionObserver: Send + Sync {
    fn session_closed(&self, id: &SessionId, reason: CloseReason);
}

struct SessionInner {
    state: SessionState,
    closed_by: Option<CloseReason>,
    observers: Vec<Weak<dyn SessionObserver>>,
    stream: Option<mpsc::Sender<Value>>,
}

pub struct Session {
    id: SessionId,
    opened_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
    // FIFO lock; holding it across the engine call serializes the session.
    engine: AsyncMutex<Option<Box<dyn ProtocolEngine>>>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            opened_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Initializing,
                closed_by: None,
                observers: Vec::new(),
                stream: None,
            }),
            engine: AsyncMutex::new(None),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Attaches the engine that serves every later message and opens the session.
    pub async fn bind_engine(&self, engine: Box<dyn ProtocolEngine>) -> Result<(), SessionError> {
        let mut slot = self.engine.lock().await;
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Initializing => {}
            SessionState::Open => return Err(SessionError::InvalidState("engine already bound")),
            SessionState::Closed => return Err(SessionError::SessionClosed),
        }

        *slot = Some(engine);
        inner.state = SessionState::Open;
        debug!(session_id = %self.id, "session opened");
        Ok(())
    }

    /// Registers `observer` to be told once about this session closing.
    ///
    /// Observing an already closed session notifies immediately with the
    /// reason it was closed for.
    pub fn observe_close(&self, observer: Weak<dyn SessionObserver>) {
        let reason = {
            let mut inner = self.inner.lock();
            match inner.closed_by {
                Some(reason) => reason,
                None => {
                    inner.observers.push(observer);
                    return;
                }
            }
        };

        if let Some(observer) = observer.upgrade() {
            observer.session_closed(&self.id, reason);
        }
    }

    pub async fn handle(&self, message: Value) -> Result<EngineReply, SessionError> {
        let mut slot = self.engine.lock().await;
        match self.state() {
            SessionState::Open => {}
            SessionState::Initializing => return Err(SessionError::NotReady),
            SessionState::Closed => return Err(SessionError::SessionClosed),
        }
        let Some(engine) = slot.as_mut() else {
            return Err(SessionError::NotReady);
        };

        let context = SessionContext::new(self);
        match engine.process_message(message, &context).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "protocol engine failed");
                self.close(CloseReason::EngineFailure);
                Err(SessionError::EngineFailure(err.to_string()))
            }
        }
    }

    /// Opens the standalone server-to-client event stream.
    ///
    /// The stream ends when the session closes. Dropping it closes the session.
    pub fn open_stream(self: &Arc<Self>) -> Result<EventStream, SessionError> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Open => {}
            SessionState::Initializing => return Err(SessionError::NotReady),
            SessionState::Closed => return Err(SessionError::SessionClosed),
        }
        if inner
            .stream
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
        {
            return Err(SessionError::StreamConflict);
        }

        let (sender, receiver) = mpsc::channel(STREAM_BUFFER);
        inner.stream = Some(sender);
        debug!(session_id = %self.id, "event stream opened");

        Ok(EventStream {
            receiver,
            session: Arc::downgrade(self),
        })
    }

    /// Pushes `event` into the open event stream, if any.
    pub fn notify(&self, event: Value) -> bool {
        let inner = self.inner.lock();
        let Some(sender) = inner.stream.as_ref() else {
            return false;
        };

        match sender.try_send(event) {
            Ok(()) => true,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "dropped event for session stream");
                false
            }
        }
    }

    /// Moves the session to `Closed`. Returns `false` if it was already closed.
    pub fn close(&self, reason: CloseReason) -> bool {
        let observers = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return false;
            }
            inner.state = SessionState::Closed;
            inner.closed_by = Some(reason);
            inner.stream = None;
            std::mem::take(&mut inner.observers)
        };

        info!(session_id = %self.id, reason = %reason, "session closed");
        for observer in observers.iter().filter_map(Weak::upgrade) {
            observer.session_closed(&self.id, reason);
        }
        true
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("opened_at", &self.opened_at)
            .finish()
    }
}

/// What a protocol engine may see of the session it serves.
pub struct SessionContext<'a> {
    session: &'a Session,
}

impl<'a> SessionContext<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub fn session_id(&self) -> &SessionId {
        self.session.id()
    }

    pub fn notify(&self, event: Value) -> bool {
        self.session.notify(event)
    }
}

/// Server-to-client events of one session, in push order.
pub struct EventStream {
    receiver: mpsc::Receiver<Value>,
    session: Weak<Session>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

impl Stream for EventStream {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(session) = self.session.upgrade() {
            if session.close(CloseReason::Disconnected) {
                debug!(session_id = %session.id(), "event stream consumer went away");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::{json, Value};

    use super::*;
    use crate::errors::AppError;

    struct Recorder {
        delay_first: bool,
        seen: usize,
    }

    #[async_trait]
    impl ProtocolEngine for Recorder {
        async fn process_message(
            &mut self,
            message: Value,
            ctx: &SessionContext<'_>,
        ) -> Result<EngineReply, AppError> {
            if message["fail"] == json!(true) {
                return Err(AppError::internal("engine exploded"));
            }
            if self.delay_first && self.seen == 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.seen += 1;
            ctx.notify(json!({ "seen": self.seen }));
            Ok(EngineReply::Message(json!({
                "order": message["order"].clone(),
                "seen": self.seen,
                "session": ctx.session_id().as_str(),
            })))
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        closed: AtomicUsize,
    }

    impl SessionObserver for CountingObserver {
        fn session_closed(&self, _id: &SessionId, _reason: CloseReason) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn open_session(delay_first: bool) -> Arc<Session> {
        let session = Arc::new(Session::new(SessionId::generate()));
        session
            .bind_engine(Box::new(Recorder {
                delay_first,
                seen: 0,
            }))
            .await
            .expect("bind engine");
        session
    }

    #[tokio::test]
    async fn starts_initializing_and_opens_on_bind() {
        let session = Session::new(SessionId::generate());
        assert_eq!(session.state(), SessionState::Initializing);

        let err = session
            .handle(json!({ "order": 1 }))
            .await
            .expect_err("no engine bound yet");
        assert!(matches!(err, SessionError::NotReady));

        session
            .bind_engine(Box::new(Recorder {
                delay_first: false,
                seen: 0,
            }))
            .await
            .expect("bind engine");
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn binding_twice_is_rejected() {
        let session = open_session(false).await;
        let err = session
            .bind_engine(Box::new(Recorder {
                delay_first: false,
                seen: 0,
            }))
            .await
            .expect_err("second bind must fail");
        assert!(matches!(err, SessionError::InvalidState(_)));
    }

    #[tokio::test]
    async fn concurrent_messages_are_answered_in_arrival_order() {
        let session = open_session(true).await;

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.handle(json!({ "order": 1 })).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.handle(json!({ "order": 2 })).await })
        };

        let first = first.await.expect("join").expect("first reply");
        let second = second.await.expect("join").expect("second reply");

        let EngineReply::Message(first) = first else {
            panic!("expected single reply");
        };
        let EngineReply::Message(second) = second else {
            panic!("expected single reply");
        };
        assert_eq!(first["order"], 1);
        assert_eq!(first["seen"], 1);
        assert_eq!(second["order"], 2);
        assert_eq!(second["seen"], 2);
    }

    #[tokio::test]
    async fn closed_session_rejects_messages() {
        let session = open_session(false).await;
        assert!(session.close(CloseReason::Terminated));
        assert!(!session.close(CloseReason::Terminated));

        let err = session
            .handle(json!({ "order": 1 }))
            .await
            .expect_err("closed session must reject");
        assert!(matches!(err, SessionError::SessionClosed));
    }

    #[tokio::test]
    async fn engine_failure_closes_session() {
        let session = open_session(false).await;
        let err = session
            .handle(json!({ "fail": true }))
            .await
            .expect_err("engine failure");
        assert!(matches!(err, SessionError::EngineFailure(_)));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn observers_are_notified_once() {
        let session = open_session(false).await;
        let observer = Arc::new(CountingObserver::default());
        let weak: Weak<CountingObserver> = Arc::downgrade(&observer);
        session.observe_close(weak);

        session.close(CloseReason::Terminated);
        session.close(CloseReason::Shutdown);
        assert_eq!(observer.closed.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct ReasonLog {
        reasons: Mutex<Vec<CloseReason>>,
    }

    impl SessionObserver for ReasonLog {
        fn session_closed(&self, _id: &SessionId, reason: CloseReason) {
            self.reasons.lock().push(reason);
        }
    }

    #[tokio::test]
    async fn late_observer_learns_the_actual_close_reason() {
        let session = open_session(false).await;
        session.close(CloseReason::Disconnected);

        let log = Arc::new(ReasonLog::default());
        let weak: Weak<ReasonLog> = Arc::downgrade(&log);
        session.observe_close(weak);

        assert_eq!(*log.reasons.lock(), vec![CloseReason::Disconnected]);
    }

    #[tokio::test]
    async fn stream_receives_notifications_and_ends_on_close() {
        let session = open_session(false).await;
        let mut stream = session.open_stream().expect("open stream");

        session.handle(json!({ "order": 1 })).await.expect("reply");
        assert_eq!(stream.next().await, Some(json!({ "seen": 1 })));

        session.close(CloseReason::Terminated);
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn only_one_stream_per_session() {
        let session = open_session(false).await;
        let _stream = session.open_stream().expect("open stream");
        let err = session.open_stream().expect_err("second stream");
        assert!(matches!(err, SessionError::StreamConflict));
    }

    #[tokio::test]
    async fn dropping_stream_closes_session() {
        let session = open_session(false).await;
        let observer = Arc::new(CountingObserver::default());
        let weak: Weak<CountingObserver> = Arc::downgrade(&observer);
        session.observe_close(weak);

        let stream = session.open_stream().expect("open stream");
        drop(stream);

        assert!(session.is_closed());
        assert_eq!(observer.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notify_without_stream_is_dropped() {
        let session = open_session(false).await;
        assert!(!session.notify(json!({ "event": 1 })));
    }
}
