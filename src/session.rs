use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Backend, BackendError};
use crate::db::LocalDb;
use crate::error::Error;
use crate::models::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

type Handler = Arc<dyn Fn(&SessionChange) + Send + Sync>;
type Handlers = Mutex<HashMap<Uuid, Handler>>;

struct GateState {
    session: Option<Session>,
    /// Bumped on every published change; stale restores compare against it.
    epoch: u64,
}

/// Owns the current auth session and tells subscribers when it changes.
pub struct SessionGate {
    backend: Arc<dyn Backend>,
    db: Option<LocalDb>,
    state: Mutex<GateState>,
    dispatch: Mutex<()>,
    handlers: Arc<Handlers>,
}

/// Live registration of a change handler. Dropping it unsubscribes.
pub struct Subscription {
    id: Uuid,
    handlers: Weak<Handlers>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            lock(&handlers).remove(&self.id);
        }
    }
}

impl SessionGate {
    pub fn new(backend: Arc<dyn Backend>, db: Option<LocalDb>) -> Self {
        SessionGate {
            backend,
            db,
            state: Mutex::new(GateState { session: None, epoch: 0 }),
            dispatch: Mutex::new(()),
            handlers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn current(&self) -> Option<Session> {
        lock(&self.state).session.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.state).session.is_some()
    }

    /// Registers `handler` for every future change, in publication order.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionChange) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        lock(&self.handlers).insert(id, Arc::new(handler));
        Subscription { id, handlers: Arc::downgrade(&self.handlers) }
    }

    /// Restores the persisted session once at startup, refreshing it if the
    /// access token has expired. Any failure leaves the gate unauthenticated.
    pub async fn get_current_session(&self) -> Option<Session> {
        let epoch = lock(&self.state).epoch;
        let restored = self.restore().await;

        let restored = match restored {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "could not restore session; continuing signed out");
                None
            }
        };
        if !self.publish(AuthEvent::InitialSession, restored.clone(), Some(epoch)) {
            debug!("session changed while restoring; dropping restored session");
            return self.current();
        }
        restored
    }

    async fn restore(&self) -> Result<Option<Session>, Error> {
        let Some(db) = &self.db else {
            return Ok(None);
        };
        let Some(session) = db.load_session()? else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!(user_id = %session.user_id(), "stored session expired; refreshing");
        let refreshed = self
            .backend
            .refresh_session(&session.refresh_token)
            .await
            .map_err(Error::Auth)?;
        Ok(Some(refreshed))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, Error> {
        let session = self
            .backend
            .sign_in_with_password(email, password)
            .await
            .map_err(Error::Auth)?;
        info!(user_id = %session.user_id(), "signed in");
        self.publish(AuthEvent::SignedIn, Some(session.clone()), None);
        Ok(session)
    }

    /// `Ok(None)` when the account was created but must be confirmed first.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, Error> {
        let session = self.backend.sign_up(email, password).await.map_err(Error::Auth)?;
        match &session {
            Some(session) => {
                info!(user_id = %session.user_id(), "signed up");
                self.publish(AuthEvent::SignedIn, Some(session.clone()), None);
            }
            None => info!("signed up; waiting for email confirmation"),
        }
        Ok(session)
    }

    pub async fn refresh(&self) -> Result<Session, Error> {
        let Some(current) = self.current() else {
            return Err(Error::Auth(BackendError::Api { status: 401, message: "No active session".into() }));
        };
        let session = self
            .backend
            .refresh_session(&current.refresh_token)
            .await
            .map_err(Error::Auth)?;
        self.publish(AuthEvent::TokenRefreshed, Some(session.clone()), None);
        Ok(session)
    }

    /// Clears the local session whether or not the remote sign-out worked.
    pub async fn sign_out(&self) {
        if let Some(session) = self.current() {
            if let Err(e) = self.backend.sign_out(&session).await {
                warn!(error = %e, "remote sign-out failed; clearing local session anyway");
            }
        }
        self.publish(AuthEvent::SignedOut, None, None);
        info!("signed out");
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(db) = &self.db else {
            return;
        };
        let result = match session {
            Some(session) => db.save_session(session),
            None => db.clear_session(),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist session");
        }
    }

    /// Stores, persists and announces a change. With `expected_epoch` set the
    /// change is dropped (and `false` returned) if another one landed first.
    ///
    /// The dispatch lock is held until every handler has run, so subscribers
    /// see changes in epoch order. It is always taken before the state lock.
    fn publish(&self, event: AuthEvent, session: Option<Session>, expected_epoch: Option<u64>) -> bool {
        let _dispatch = lock(&self.dispatch);
        {
            let mut state = lock(&self.state);
            if expected_epoch.is_some_and(|epoch| epoch != state.epoch) {
                return false;
            }
            self.persist(session.as_ref());
            state.session = session.clone();
            state.epoch += 1;
        }

        let change = SessionChange { event, session };
        let handlers: Vec<Handler> = lock(&self.handlers).values().cloned().collect();
        debug!(?event, subscribers = handlers.len(), "session changed");
        for handler in handlers {
            handler(&change);
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{session, FakeBackend};
    use tempfile::TempDir;

    fn recorder(gate: &SessionGate) -> (Arc<Mutex<Vec<SessionChange>>>, Subscription) {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink = seen.clone();
        let sub = gate.subscribe(move |change| sink.lock().unwrap().push(change.clone()));
        (seen, sub)
    }

    #[tokio::test]
    async fn test_starts_unauthenticated() {
        let gate = SessionGate::new(Arc::new(FakeBackend::default()), None);
        assert!(!gate.is_authenticated());
        let (seen, _sub) = recorder(&gate);

        assert_eq!(gate.get_current_session().await, None);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event, AuthEvent::InitialSession);
        assert_eq!(seen[0].session, None);
    }

    #[tokio::test]
    async fn test_sign_in_and_out_notify_in_order() {
        let backend = Arc::new(FakeBackend::default());
        let gate = SessionGate::new(backend.clone(), None);
        let (seen, _sub) = recorder(&gate);

        let s = gate.sign_in("user-1@example.ch", "pw").await.unwrap();
        assert_eq!(gate.current(), Some(s.clone()));
        gate.sign_out().await;
        assert_eq!(gate.current(), None);
        assert_eq!(backend.sign_outs(), 1);

        let events: Vec<_> = seen.lock().unwrap().iter().map(|c| c.event).collect();
        assert_eq!(events, vec![AuthEvent::SignedIn, AuthEvent::SignedOut]);
        assert_eq!(seen.lock().unwrap()[0].session, Some(s));
    }

    #[tokio::test]
    async fn test_failed_sign_in_stays_signed_out() {
        let backend = Arc::new(FakeBackend::default());
        backend.set_sign_in(Err(BackendError::Api { status: 400, message: "Invalid login credentials".into() }));
        let gate = SessionGate::new(backend, None);
        let (seen, _sub) = recorder(&gate);

        let err = gate.sign_in("x@example.ch", "wrong").await.unwrap_err();
        assert_eq!(err.code(), "AUTH_ERROR");
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(!gate.is_authenticated());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_even_when_remote_fails() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_sign_out(BackendError::Timeout);
        let gate = SessionGate::new(backend, None);
        gate.sign_in("a@example.ch", "pw").await.unwrap();

        gate.sign_out().await;
        assert!(!gate.is_authenticated());
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_delivery() {
        let gate = SessionGate::new(Arc::new(FakeBackend::default()), None);
        let (seen, sub) = recorder(&gate);
        gate.sign_in("a@example.ch", "pw").await.unwrap();
        sub.unsubscribe();
        gate.sign_out().await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_session_persists_across_restarts() {
        let temp = TempDir::new().unwrap();
        let db = LocalDb::open_in(temp.path()).unwrap();

        let gate = SessionGate::new(Arc::new(FakeBackend::default()), Some(db.clone()));
        let s = gate.sign_in("a@example.ch", "pw").await.unwrap();

        let restarted = SessionGate::new(Arc::new(FakeBackend::default()), Some(db.clone()));
        assert_eq!(restarted.get_current_session().await, Some(s));

        restarted.sign_out().await;
        assert_eq!(db.load_session().unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let temp = TempDir::new().unwrap();
        let db = LocalDb::open_in(temp.path()).unwrap();
        let mut expired = session("user-1");
        expired.expires_at = Some(0);
        db.save_session(&expired).unwrap();

        let backend = Arc::new(FakeBackend::default());
        let fresh = session("user-1");
        backend.set_refresh(Ok(fresh.clone()));
        let gate = SessionGate::new(backend, Some(db.clone()));

        assert_eq!(gate.get_current_session().await, Some(fresh.clone()));
        assert_eq!(db.load_session().unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn test_failed_refresh_means_no_session() {
        let temp = TempDir::new().unwrap();
        let db = LocalDb::open_in(temp.path()).unwrap();
        let mut expired = session("user-1");
        expired.expires_at = Some(0);
        db.save_session(&expired).unwrap();

        let gate = SessionGate::new(Arc::new(FakeBackend::default()), Some(db.clone()));
        assert_eq!(gate.get_current_session().await, None);
        assert!(!gate.is_authenticated());
        assert_eq!(db.load_session().unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_finishing_after_sign_in_is_ignored() {
        let temp = TempDir::new().unwrap();
        let db = LocalDb::open_in(temp.path()).unwrap();
        let mut expired = session("old-user");
        expired.expires_at = Some(0);
        db.save_session(&expired).unwrap();

        let backend = Arc::new(FakeBackend::default());
        backend.set_refresh(Ok(session("old-user")));
        let release = backend.gate_refresh();
        let gate = Arc::new(SessionGate::new(backend, Some(db)));

        let restoring = tokio::spawn({
            let gate = gate.clone();
            async move { gate.get_current_session().await }
        });
        tokio::task::yield_now().await;

        let signed_in = gate.sign_in("user-1@example.ch", "pw").await.unwrap();
        release.send(()).unwrap();

        assert_eq!(restoring.await.unwrap(), Some(signed_in.clone()));
        assert_eq!(gate.current(), Some(signed_in));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_restore_and_sign_in_agree() {
        for _ in 0..50 {
            let temp = TempDir::new().unwrap();
            let db = LocalDb::open_in(temp.path()).unwrap();
            db.save_session(&session("old-user")).unwrap();

            let gate = Arc::new(SessionGate::new(Arc::new(FakeBackend::default()), Some(db.clone())));
            let (seen, _sub) = recorder(&gate);

            let restoring = tokio::spawn({
                let gate = gate.clone();
                async move { gate.get_current_session().await }
            });
            let signing_in = tokio::spawn({
                let gate = gate.clone();
                async move { gate.sign_in("user-1@example.ch", "pw").await }
            });
            restoring.await.unwrap();
            let signed_in = signing_in.await.unwrap().unwrap();

            // Whatever the interleaving, the sign-in is the last word everywhere.
            assert_eq!(gate.current(), Some(signed_in.clone()));
            assert_eq!(db.load_session().unwrap(), Some(signed_in.clone()));
            assert_eq!(seen.lock().unwrap().last().unwrap().session, Some(signed_in));
        }
    }

    #[tokio::test]
    async fn test_refresh_requires_session() {
        let backend = Arc::new(FakeBackend::default());
        let gate = SessionGate::new(backend.clone(), None);
        assert!(gate.refresh().await.is_err());

        gate.sign_in("a@example.ch", "pw").await.unwrap();
        let (seen, _sub) = recorder(&gate);
        let fresh = session("user-1");
        backend.set_refresh(Ok(fresh.clone()));
        assert_eq!(gate.refresh().await.unwrap(), fresh);
        assert_eq!(seen.lock().unwrap()[0].event, AuthEvent::TokenRefreshed);
    }
}
