//! One client session and its server-to-client event channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::error::SessionError;

/// `Uninitialized -> Active -> Closed`. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Closed,
}

/// Why a session was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The bound subject sent DELETE.
    Terminated,
    /// The attached event stream went away.
    StreamDisconnected,
    /// No request and no attached stream for longer than the idle timeout.
    IdleTimeout,
    Shutdown,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Terminated => "terminated",
            Self::StreamDisconnected => "stream_disconnected",
            Self::IdleTimeout => "idle_timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A server-to-client message with its position in the session's stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub id: u64,
    pub data: Value,
}

/// Outbound side of a session: numbered events, a bounded replay buffer and
/// the live fan-out to an attached stream.
#[derive(Debug)]
pub struct TransportHandle {
    next_event_id: u64,
    history: VecDeque<ServerEvent>,
    history_limit: usize,
    sender: broadcast::Sender<ServerEvent>,
}

impl TransportHandle {
    fn new(history_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(history_limit.max(1));
        Self {
            next_event_id: 1,
            history: VecDeque::with_capacity(history_limit),
            history_limit,
            sender,
        }
    }

    /// Number the message, keep it for replay and hand it to the live stream.
    pub fn publish(&mut self, data: Value) -> u64 {
        let event = ServerEvent {
            id: self.next_event_id,
            data,
        };
        self.next_event_id += 1;

        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());
        // No receiver just means no stream is attached; the event stays in history.
        let _ = self.sender.send(event.clone());
        event.id
    }

    /// Events after `last_event_id`, oldest first. `None` replays nothing.
    #[must_use]
    pub fn replay_after(&self, last_event_id: Option<u64>) -> Vec<ServerEvent> {
        let Some(last) = last_event_id else {
            return Vec::new();
        };
        self.history
            .iter()
            .filter(|e| e.id > last)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn last_event_id(&self) -> u64 {
        self.next_event_id - 1
    }
}

/// What a newly attached stream receives: the missed events and a receiver
/// for everything published afterwards.
#[derive(Debug)]
pub struct StreamAttachment {
    pub replay: Vec<ServerEvent>,
    pub receiver: broadcast::Receiver<ServerEvent>,
}

/// A live session bound to the subject that created it.
#[derive(Debug)]
pub struct Session {
    id: String,
    bound_subject: String,
    created_at: OffsetDateTime,
    last_activity: Mutex<Instant>,
    state: Mutex<SessionState>,
    transport: tokio::sync::Mutex<TransportHandle>,
    stream_attached: AtomicBool,
    cancel: CancellationToken,
}

impl Session {
    pub(crate) fn new(id: String, bound_subject: &str, history_limit: usize) -> Self {
        Self {
            id,
            bound_subject: bound_subject.to_owned(),
            created_at: OffsetDateTime::now_utc(),
            last_activity: Mutex::new(Instant::now()),
            state: Mutex::new(SessionState::Uninitialized),
            transport: tokio::sync::Mutex::new(TransportHandle::new(history_limit)),
            stream_attached: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn bound_subject(&self) -> &str {
        &self.bound_subject
    }

    #[must_use]
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Time since the bound subject last reached this session.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Cancelled once the session closes; streams stop on it.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The transport handle. Holding the guard serialises work on this session.
    #[must_use]
    pub fn transport(&self) -> &tokio::sync::Mutex<TransportHandle> {
        &self.transport
    }

    pub(crate) fn activate(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Uninitialized {
            *state = SessionState::Active;
        }
    }

    /// Mark the session closed and stop its streams. Returns `false` if it
    /// was already closed.
    pub(crate) fn close(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return false;
            }
            *state = SessionState::Closed;
        }
        self.cancel.cancel();
        true
    }

    /// Attach the single server-to-client stream.
    ///
    /// Replay and subscription happen under the transport lock, so no event
    /// falls between the two.
    ///
    /// # Errors
    /// [`SessionError::StreamConflict`] when a stream is already attached,
    /// [`SessionError::NotFound`] when the session closed meanwhile.
    pub async fn attach_stream(
        &self,
        last_event_id: Option<u64>,
    ) -> Result<StreamAttachment, SessionError> {
        if self
            .stream_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::StreamConflict(self.id.clone()));
        }
        if self.is_closed() {
            self.detach_stream();
            return Err(SessionError::NotFound(self.id.clone()));
        }

        let transport = self.transport.lock().await;
        Ok(StreamAttachment {
            replay: transport.replay_after(last_event_id),
            receiver: transport.sender.subscribe(),
        })
    }

    pub fn detach_stream(&self) {
        self.stream_attached.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn has_stream(&self) -> bool {
        self.stream_attached.load(Ordering::Acquire)
    }
}
