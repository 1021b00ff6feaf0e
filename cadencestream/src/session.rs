//! Session lifecycle.
//!
//! Idle -> Handshaking -> Authenticated -> Running -> Closed.
//!
//! The session owns at most one encrypted transport at a time, the dispatcher
//! task reading from it and the keepalive watchdog. When the watchdog expires
//! or the dispatcher loses the connection, a supervisor task tears the
//! transport down and reconnects with the reusable credentials from the last
//! welcome.
//!
//! The supervisor never keeps the session alive on its own: it stops as soon
//! as the last [`Session`] handle is dropped or the session is closed, even in
//! the middle of a backoff or a reconnection attempt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cadencetrust::{ApWelcome, LoginCredentials, ServerTrust};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::auth;
use crate::codec::{EncryptedTransport, PacketSender};
use crate::config::SessionConfig;
use crate::connect;
use crate::dispatch::{self, Attributes, Dispatcher, Handlers};
use crate::error::{CadenceStreamError, Result};
use crate::packet::PacketType;
use crate::time::TimeReference;
use crate::watchdog::Watchdog;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Idle,
    /// Handshake in progress, or transport up but not yet logged in.
    Handshaking,
    /// Logged in; packets may be sent.
    Authenticated,
    /// Dispatcher and watchdog running.
    Running,
    /// Shut down for good.
    Closed,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Handshaking => "Handshaking",
            SessionState::Authenticated => "Authenticated",
            SessionState::Running => "Running",
            SessionState::Closed => "Closed",
        }
    }

    /// Whether `send` may proceed.
    pub fn can_send(&self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What made the connection unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    KeepaliveTimeout,
    ReceiveFailed,
}

/// Resources bound to the live transport.
#[derive(Default)]
struct Live {
    /// Held between the handshake and `start`.
    transport: Option<EncryptedTransport>,
    sender: Option<PacketSender>,
    shutdown: Option<watch::Sender<bool>>,
    dispatcher: Option<JoinHandle<()>>,
    watchdog: Option<Watchdog>,
}

struct Inner {
    config: SessionConfig,
    trust: ServerTrust,
    handlers: Handlers,
    time: TimeReference,
    attributes: Arc<Attributes>,
    state: watch::Sender<SessionState>,
    live: Mutex<Live>,
    welcome: RwLock<Option<ApWelcome>>,
    /// Bumped on every `start`; triggers from older transports are ignored.
    generation: AtomicU64,
    triggers: mpsc::UnboundedSender<(u64, Trigger)>,
    trigger_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<(u64, Trigger)>>>,
    supervisor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// A connection to an access point. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
    /// Set by `close`; dropped with the last handle. Either stops the supervisor.
    owner: Arc<watch::Sender<bool>>,
}

impl Session {
    /// A session trusting the pinned access-point key.
    pub fn new(config: SessionConfig, handlers: Handlers) -> Result<Self> {
        Self::with_trust(config, handlers, ServerTrust::pinned()?)
    }

    /// A session trusting `trust` instead of the pinned key.
    pub fn with_trust(config: SessionConfig, handlers: Handlers, trust: ServerTrust) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(SessionState::Idle);
        let (triggers, trigger_rx) = mpsc::unbounded_channel();
        let (owner, _) = watch::channel(false);
        Ok(Self {
            owner: Arc::new(owner),
            inner: Arc::new(Inner {
                config,
                trust,
                handlers,
                time: TimeReference::new(),
                attributes: Arc::new(Attributes::default()),
                state,
                live: Mutex::new(Live::default()),
                welcome: RwLock::new(None),
                generation: AtomicU64::new(0),
                triggers,
                trigger_rx: parking_lot::Mutex::new(Some(trigger_rx)),
                supervisor: parking_lot::Mutex::new(None),
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Handshake with the first configured access point that answers.
    ///
    /// When every access point fails, the first error is returned and the
    /// session goes back to `Idle`.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if !inner.advance(SessionState::Idle, SessionState::Handshaking) {
            return Err(inner.transition_error(SessionState::Handshaking));
        }
        if let Err(e) = inner.connect().await {
            inner.advance(SessionState::Handshaking, SessionState::Idle);
            return Err(e);
        }
        Ok(())
    }

    /// Log in over the established transport.
    ///
    /// A rejected login drops the transport and returns the session to `Idle`.
    pub async fn authenticate(&self, credentials: &LoginCredentials) -> Result<ApWelcome> {
        let inner = &self.inner;
        match inner.authenticate(credentials).await {
            Ok(welcome) => Ok(welcome),
            Err(CadenceStreamError::NotConnected) => Err(CadenceStreamError::NotConnected),
            Err(e) => {
                inner.advance(SessionState::Handshaking, SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Start the dispatcher and the keepalive watchdog.
    pub async fn start(&self) -> Result<()> {
        self.inner.start().await?;
        self.inner.ensure_supervisor(self.owner.subscribe());
        Ok(())
    }

    /// Send one packet once the session is authenticated.
    ///
    /// Waits while a handshake or reconnection is in progress. Fails with
    /// `ConnectionClosed` if the session closes first and with `Timeout` if
    /// the configured send timeout runs out. Dropping the future cancels the
    /// wait.
    pub async fn send(&self, cmd: PacketType, payload: &[u8]) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let gate = async {
            rx.wait_for(|s| s.can_send() || *s == SessionState::Closed)
                .await
                .map(|s| *s)
        };
        let state = match self.inner.config.send_timeout() {
            Some(t) => tokio::time::timeout(t, gate)
                .await
                .map_err(|_| CadenceStreamError::Timeout)?,
            None => gate.await,
        }
        .map_err(|_| CadenceStreamError::ConnectionClosed)?;
        if state == SessionState::Closed {
            return Err(CadenceStreamError::ConnectionClosed);
        }

        let sender = self
            .inner
            .live
            .lock()
            .await
            .sender
            .clone()
            .ok_or(CadenceStreamError::NotConnected)?;
        sender.send(cmd, payload).await
    }

    /// Stop everything and release the transport. Idempotent.
    pub async fn close(&self) {
        let inner = &self.inner;
        self.owner.send_replace(true);
        if let Some(task) = inner.supervisor.lock().take() {
            task.abort();
        }
        inner.teardown().await;
        inner.set_state(SessionState::Closed);
    }

    /// The last welcome received from the access point.
    pub fn welcome(&self) -> Option<ApWelcome> {
        self.inner.welcome.read().clone()
    }

    pub fn username(&self) -> Option<String> {
        self.inner
            .welcome
            .read()
            .as_ref()
            .map(|w| w.canonical_username.clone())
    }

    pub fn country_code(&self) -> Option<String> {
        self.inner.attributes.country_code()
    }

    pub fn product_info(&self) -> Option<String> {
        self.inner.attributes.product_info()
    }

    pub fn time(&self) -> TimeReference {
        self.inner.time.clone()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.inner.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, to: SessionState) {
        let from = self.state.send_replace(to);
        if from != to {
            tracing::debug!(%from, %to, "session state");
        }
    }

    /// Move from `from` to `to`; false if the session was elsewhere.
    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        let moved = self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::debug!(%from, %to, "session state");
        }
        moved
    }

    fn transition_error(&self, to: SessionState) -> CadenceStreamError {
        CadenceStreamError::InvalidStateTransition {
            from: self.state().label().into(),
            to: to.label().into(),
        }
    }

    async fn connect(&self) -> Result<()> {
        let mut first_err = None;
        for addr in &self.config.access_points {
            let attempt = connect::connect(
                addr,
                self.trust.clone(),
                &self.config.client,
                self.config.connect_timeout(),
                self.config.handshake_timeout(),
                self.config.status_timeout(),
            )
            .await;
            match attempt {
                Ok(transport) => {
                    let mut live = self.live.lock().await;
                    if self.state() == SessionState::Closed {
                        return Err(CadenceStreamError::ConnectionClosed);
                    }
                    tracing::info!(addr = %addr, "connected to access point");
                    live.sender = Some(transport.sender());
                    live.transport = Some(transport);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "access point failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        Err(first_err.unwrap_or_else(|| CadenceStreamError::Config("no access points configured".into())))
    }

    async fn authenticate(&self, credentials: &LoginCredentials) -> Result<ApWelcome> {
        let mut transport = self.live.lock().await.transport.take();
        let result = auth::authenticate(
            transport.as_mut(),
            credentials,
            &self.config.client,
            self.config.handshake_timeout(),
        )
        .await;

        let mut live = self.live.lock().await;
        match result {
            Ok(welcome) => {
                if self.state() == SessionState::Closed {
                    return Err(CadenceStreamError::ConnectionClosed);
                }
                live.transport = transport;
                *self.welcome.write() = Some(welcome.clone());
                self.advance(SessionState::Handshaking, SessionState::Authenticated);
                Ok(welcome)
            }
            Err(e) => {
                if transport.is_some() {
                    live.sender = None;
                }
                Err(e)
            }
        }
    }

    async fn start(&self) -> Result<()> {
        let mut live = self.live.lock().await;
        if self.state() != SessionState::Authenticated {
            return Err(self.transition_error(SessionState::Running));
        }
        let transport = live.transport.take().ok_or(CadenceStreamError::NotConnected)?;
        let (sender, receiver) = transport.into_split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let triggers = self.triggers.clone();
        let watchdog = Watchdog::spawn(self.config.watchdog_timeout(), move || {
            let _ = triggers.send((generation, Trigger::KeepaliveTimeout));
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(
            receiver,
            sender.clone(),
            self.handlers.clone(),
            self.time.clone(),
            watchdog.handle(),
            self.attributes.clone(),
        );
        let triggers = self.triggers.clone();
        let task = dispatch::spawn(dispatcher, stop_rx, move |_| {
            let _ = triggers.send((generation, Trigger::ReceiveFailed));
        });

        live.sender = Some(sender);
        live.shutdown = Some(stop_tx);
        live.dispatcher = Some(task);
        live.watchdog = Some(watchdog);
        self.advance(SessionState::Authenticated, SessionState::Running);
        Ok(())
    }

    /// Stop the dispatcher, cancel the watchdog, join, release the transport.
    async fn teardown(&self) {
        let (shutdown, watchdog, dispatcher, sender, transport) = {
            let mut live = self.live.lock().await;
            (
                live.shutdown.take(),
                live.watchdog.take(),
                live.dispatcher.take(),
                live.sender.take(),
                live.transport.take(),
            )
        };
        if let Some(stop) = shutdown {
            let _ = stop.send(true);
        }
        if let Some(watchdog) = watchdog {
            watchdog.cancel();
        }
        if let Some(task) = dispatcher {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("dispatcher task panicked");
                }
            }
        }
        if let Some(sender) = sender {
            if let Err(e) = sender.shutdown().await {
                tracing::debug!(error = %e, "transport shutdown");
            }
        }
        drop(transport);
    }

    fn ensure_supervisor(self: &Arc<Self>, owner: watch::Receiver<bool>) {
        let Some(rx) = self.trigger_rx.lock().take() else {
            return;
        };
        let task = tokio::spawn(supervise(Arc::downgrade(self), rx, owner));
        *self.supervisor.lock() = Some(task);
    }

    async fn reestablish(&self, credentials: &LoginCredentials) -> Result<()> {
        self.connect().await?;
        self.authenticate(credentials).await?;
        self.start().await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.supervisor.get_mut().take() {
            task.abort();
        }
        let live = self.live.get_mut();
        if let Some(task) = live.dispatcher.take() {
            task.abort();
        }
        live.watchdog.take();
    }
}

/// Reconnect whenever the current transport reports a failure.
///
/// Triggers from a transport that has already been replaced, or that arrive
/// while a reconnection is running, are dropped. Only a [`Weak`] is kept
/// between steps, and every wait races the owner signal.
async fn supervise(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<(u64, Trigger)>,
    mut owner: watch::Receiver<bool>,
) {
    loop {
        let (generation, trigger) = tokio::select! {
            biased;
            _ = released(&mut owner) => break,
            next = rx.recv() => match next {
                Some(next) => next,
                None => break,
            },
        };
        {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if generation != inner.generation.load(Ordering::SeqCst)
                || inner.state() != SessionState::Running
            {
                tracing::trace!(?trigger, generation, "ignoring stale reconnection trigger");
                continue;
            }
        }
        tracing::warn!(?trigger, "connection lost");
        tokio::select! {
            biased;
            _ = released(&mut owner) => break,
            _ = reconnect(&inner) => {}
        }
    }
    tracing::debug!("reconnection supervisor stopped");
}

/// Resolves once the session is closed or every handle is gone.
async fn released(owner: &mut watch::Receiver<bool>) {
    // An error means the sender, and with it the last handle, was dropped.
    let _ = owner.wait_for(|closed| *closed).await;
}

/// Tear down the failed transport and retry with the reusable credentials.
async fn reconnect(weak: &Weak<Inner>) {
    let (credentials, policy) = {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        inner.teardown().await;
        if !inner.advance(SessionState::Running, SessionState::Handshaking) {
            return;
        }
        let credentials = inner.welcome.read().as_ref().map(LoginCredentials::from_welcome);
        let Some(credentials) = credentials else {
            tracing::error!("no reusable credentials, closing session");
            inner.set_state(SessionState::Closed);
            return;
        };
        (credentials, inner.config.reconnect.clone())
    };

    for attempt in 1..=policy.max_attempts {
        let delay = policy.backoff(attempt);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.state() == SessionState::Closed {
            return;
        }
        inner.advance(SessionState::Idle, SessionState::Handshaking);
        match inner.reestablish(&credentials).await {
            Ok(()) => {
                tracing::info!(attempt, "reconnected");
                return;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "reconnection attempt failed");
                inner.teardown().await;
            }
        }
    }

    if let Some(inner) = weak.upgrade() {
        tracing::error!(attempts = policy.max_attempts, "reconnection failed, closing session");
        inner.set_state(SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionConfig::default(), Handlers::default()).unwrap()
    }

    #[test]
    fn starts_idle() {
        assert_eq!(session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn authenticate_without_transport() {
        let s = session();
        let creds = LoginCredentials::with_password("alice", "secret");
        assert!(matches!(
            s.authenticate(&creds).await,
            Err(CadenceStreamError::NotConnected)
        ));
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn start_requires_authentication() {
        let s = session();
        assert!(matches!(
            s.start().await,
            Err(CadenceStreamError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let s = session();
        s.close().await;
        s.close().await;
        assert_eq!(s.state(), SessionState::Closed);
        assert!(matches!(
            s.send(PacketType::Ping, b"").await,
            Err(CadenceStreamError::ConnectionClosed)
        ));
        assert!(s.connect().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn send_waits_for_gate_until_timeout() {
        let config = SessionConfig {
            send_timeout_ms: Some(500),
            ..SessionConfig::default()
        };
        let s = Session::new(config, Handlers::default()).unwrap();
        assert!(matches!(
            s.send(PacketType::Ping, b"").await,
            Err(CadenceStreamError::Timeout)
        ));
    }

    #[tokio::test]
    async fn send_released_by_close() {
        let s = session();
        let waiter = {
            let s = s.clone();
            tokio::spawn(async move { s.send(PacketType::Ping, b"x").await })
        };
        tokio::task::yield_now().await;
        s.close().await;
        let res = waiter.await.unwrap();
        assert!(matches!(res, Err(CadenceStreamError::ConnectionClosed)));
    }
}
