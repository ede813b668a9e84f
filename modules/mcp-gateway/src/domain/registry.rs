//! Live sessions keyed by id, each bound to the subject that opened it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::error::SessionError;
use super::session::{CloseReason, Session};

/// Owns every live session of one endpoint.
///
/// Create, lookup and removal are single map operations, so concurrent
/// requests for the same id never observe a half-registered session.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    /// Open sessions per bound subject. An entry exists only while its count is positive.
    per_subject: DashMap<String, usize>,
    history_limit: usize,
    max_per_subject: usize,
}

impl SessionRegistry {
    /// A registry without a per-subject session limit.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            per_subject: DashMap::new(),
            history_limit,
            max_per_subject: usize::MAX,
        }
    }

    #[must_use]
    pub fn with_max_per_subject(mut self, max: usize) -> Self {
        self.max_per_subject = max;
        self
    }

    /// Mint a fresh id, bind it to `subject` and register the session.
    ///
    /// # Errors
    /// [`SessionError::LimitReached`] when `subject` already holds the
    /// maximum number of open sessions.
    pub fn create(&self, subject: &str) -> Result<Arc<Session>, SessionError> {
        // The count entry stays locked until the session is registered, so
        // concurrent creates for one subject cannot overshoot the limit.
        let mut open = self.per_subject.entry(subject.to_owned()).or_insert(0);
        if *open >= self.max_per_subject {
            tracing::warn!(subject, open = *open, "session limit reached");
            return Err(SessionError::LimitReached);
        }

        loop {
            let id = uuid::Uuid::new_v4().to_string();
            match self.sessions.entry(id) {
                Entry::Vacant(slot) => {
                    let session = Arc::new(Session::new(
                        slot.key().clone(),
                        subject,
                        self.history_limit,
                    ));
                    session.activate();
                    slot.insert(session.clone());
                    *open += 1;
                    tracing::info!(session_id = %session.id(), subject, "session created");
                    return Ok(session);
                }
                Entry::Occupied(slot) => {
                    tracing::warn!(session_id = %slot.key(), "session id collision, regenerating");
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Look up `id` for a request authenticated as `subject`.
    ///
    /// A mismatch leaves the session untouched. A match counts as activity.
    ///
    /// # Errors
    /// [`SessionError::NotFound`] for unknown or closed ids,
    /// [`SessionError::Mismatch`] when `subject` is not the bound subject.
    pub fn authorize(&self, id: &str, subject: &str) -> Result<Arc<Session>, SessionError> {
        let session = self
            .get(id)
            .filter(|s| !s.is_closed())
            .ok_or_else(|| SessionError::NotFound(id.to_owned()))?;

        if session.bound_subject() != subject {
            tracing::warn!(
                session_id = id,
                subject,
                "request for a session bound to another subject"
            );
            return Err(SessionError::Mismatch {
                session_id: id.to_owned(),
            });
        }
        session.touch();
        Ok(session)
    }

    /// Explicit termination by the bound subject.
    ///
    /// # Errors
    /// Same as [`SessionRegistry::authorize`].
    pub fn terminate(&self, id: &str, subject: &str) -> Result<(), SessionError> {
        self.authorize(id, subject)?;
        self.close(id, CloseReason::Terminated);
        Ok(())
    }

    /// Remove the session and close it. Returns `false` if it was not registered.
    pub fn close(&self, id: &str, reason: CloseReason) -> bool {
        let Some((_, session)) = self.sessions.remove(id) else {
            return false;
        };
        session.close();
        self.per_subject
            .remove_if_mut(session.bound_subject(), |_, open| {
                *open = open.saturating_sub(1);
                *open == 0
            });
        tracing::info!(
            session_id = id,
            subject = %session.bound_subject(),
            reason = reason.as_str(),
            "session closed"
        );
        true
    }

    /// Close sessions without an attached stream that have been idle for at
    /// least `max_idle`. Returns how many were closed.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| !e.value().has_stream() && e.value().idle_for() >= max_idle)
            .map(|e| e.key().clone())
            .collect();
        let closed = idle
            .iter()
            .filter(|id| self.close(id, CloseReason::IdleTimeout))
            .count();
        if closed > 0 {
            tracing::info!(closed, "idle sessions reaped");
        }
        closed
    }

    /// Close every live session. Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let closed = ids
            .iter()
            .filter(|id| self.close(id, CloseReason::Shutdown))
            .count();
        tracing::info!(closed, "session registry shut down");
        closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Open sessions bound to `subject`.
    #[must_use]
    pub fn open_for(&self, subject: &str) -> usize {
        self.per_subject.get(subject).map_or(0, |open| *open)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;

    use tracing_test::traced_test;

    use super::*;
    use crate::domain::session::SessionState;

    #[test]
    fn created_session_is_active_and_bound() {
        let registry = SessionRegistry::new(16);
        let session = registry.create("alice").unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.bound_subject(), "alice");
        assert!(Arc::ptr_eq(&registry.get(session.id()).unwrap(), &session));
    }

    #[test]
    fn mismatched_subject_is_rejected_without_side_effects() {
        let registry = SessionRegistry::new(16);
        let session = registry.create("alice").unwrap();

        let err = registry.authorize(session.id(), "mallory").unwrap_err();
        assert!(matches!(err, SessionError::Mismatch { .. }));

        let err = registry.terminate(session.id(), "mallory").unwrap_err();
        assert!(matches!(err, SessionError::Mismatch { .. }));

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(registry.len(), 1);
        assert!(registry.authorize(session.id(), "alice").is_ok());
    }

    #[test]
    #[traced_test]
    fn mismatch_is_logged_without_the_session_being_closed() {
        let registry = SessionRegistry::new(16);
        let session = registry.create("alice").unwrap();

        let _ = registry.authorize(session.id(), "mallory");

        assert!(logs_contain("request for a session bound to another subject"));
        assert!(!logs_contain("session closed"));
    }

    #[test]
    fn terminated_session_is_gone() {
        let registry = SessionRegistry::new(16);
        let session = registry.create("alice").unwrap();

        registry.terminate(session.id(), "alice").unwrap();

        assert!(session.is_closed());
        assert!(registry.is_empty());
        assert_eq!(
            registry.authorize(session.id(), "alice").unwrap_err(),
            SessionError::NotFound(session.id().to_owned())
        );
    }

    #[test]
    fn shutdown_closes_every_session() {
        let registry = SessionRegistry::new(16);
        let sessions: Vec<_> = ["alice", "bob", "carol"]
            .iter()
            .map(|s| registry.create(s).unwrap())
            .collect();

        assert_eq!(registry.shutdown(), 3);
        assert!(registry.is_empty());
        assert!(sessions.iter().all(|s| s.is_closed()));
        assert!(sessions.iter().all(|s| s.cancellation().is_cancelled()));
    }

    #[test]
    fn subject_limit_frees_up_when_a_session_closes() {
        let registry = SessionRegistry::new(16).with_max_per_subject(2);
        let first = registry.create("alice").unwrap();
        registry.create("alice").unwrap();

        assert_eq!(registry.create("alice").unwrap_err(), SessionError::LimitReached);
        assert!(registry.create("bob").is_ok());
        assert_eq!(registry.open_for("alice"), 2);

        registry.terminate(first.id(), "alice").unwrap();
        assert_eq!(registry.open_for("alice"), 1);
        assert!(registry.create("alice").is_ok());
    }

    #[test]
    fn concurrent_creates_respect_the_subject_limit() {
        let registry = Arc::new(SessionRegistry::new(4).with_max_per_subject(5));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..8)
                        .filter(|_| registry.create("alice").is_ok())
                        .count()
                })
            })
            .collect();

        let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(created, 5);
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.open_for("alice"), 5);
    }

    #[tokio::test]
    async fn reaping_spares_sessions_with_a_stream_or_recent_activity() {
        let registry = SessionRegistry::new(16);
        let idle = registry.create("alice").unwrap();
        let streaming = registry.create("alice").unwrap();
        let _attachment = streaming.attach_stream(None).await.unwrap();

        assert_eq!(registry.reap_idle(Duration::from_secs(3600)), 0);
        assert_eq!(registry.reap_idle(Duration::ZERO), 1);

        assert!(idle.is_closed());
        assert!(!streaming.is_closed());
        assert_eq!(registry.open_for("alice"), 1);
        assert_eq!(
            registry.authorize(idle.id(), "alice").unwrap_err(),
            SessionError::NotFound(idle.id().to_owned())
        );
    }

    #[test]
    fn authorize_resets_the_idle_clock() {
        let registry = SessionRegistry::new(16);
        let session = registry.create("alice").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(session.idle_for() >= Duration::from_millis(20));
        registry.authorize(session.id(), "alice").unwrap();
        assert!(session.idle_for() < Duration::from_millis(20));
    }

    #[test]
    fn independent_registries_do_not_share_sessions() {
        let a = SessionRegistry::new(16);
        let b = SessionRegistry::new(16);
        let session = a.create("alice").unwrap();

        assert!(b.get(session.id()).is_none());
    }

    #[test]
    fn concurrent_creates_yield_unique_ids() {
        let registry = Arc::new(SessionRegistry::new(4));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..64)
                        .map(|_| registry.create("alice").unwrap().id().to_owned())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 8 * 64);
        assert_eq!(registry.len(), 8 * 64);
    }
}
