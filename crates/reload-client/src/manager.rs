use std::{
    ops::ControlFlow,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use reload_core::{
    ConnectionState, ConnectionStateMachine, Message, MessageType, ReloadError, TransportError,
};
use tokio::{sync::Mutex as AsyncMutex, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::ClientConfig,
    reloader::{self, Reloader},
    transport::{Connector, TransportHandle},
};

struct Session<H> {
    machine: ConnectionStateMachine,
    handle: Option<Arc<H>>,
}

struct Inner<C: Connector> {
    config: ClientConfig,
    connector: C,
    reloader: Arc<dyn Reloader>,
    session: Mutex<Session<C::Handle>>,
    read_task: AsyncMutex<Option<JoinHandle<()>>>,
    closed: CancellationToken,
}

/// Client side of the reload notification channel.
///
/// Cheap to clone; all clones drive the same connection. `run` opens the
/// channel and starts a background read loop that invokes the reloader on
/// every reload notification. `close` tears the channel down and may be
/// called from anywhere, any number of times.
pub struct ReloadManager<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ReloadManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> ReloadManager<C> {
    pub fn new(config: ClientConfig, connector: C, reloader: Arc<dyn Reloader>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                reloader,
                session: Mutex::new(Session {
                    machine: ConnectionStateMachine::default(),
                    handle: None,
                }),
                read_task: AsyncMutex::new(None),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner.session).machine.state()
    }

    /// Connect, start the read loop, and announce startup.
    ///
    /// Returns once the read loop is running; it does not wait for the
    /// session to end. A startup announcement that never gets through is
    /// logged but not returned as an error.
    pub async fn run(&self) -> Result<(), ReloadError> {
        let channel = self.inner.config.validated_channel()?;
        lock(&self.inner.session).machine.begin_connect()?;
        info!(channel, "connecting to watcher");

        let policy = self.inner.config.retry;
        let connector = &self.inner.connector;
        let attempts = policy.retry("connect", move |_| connector.connect(channel));
        let connected = tokio::select! {
            _ = self.inner.closed.cancelled() => {
                info!(channel, "closed while connecting");
                return Err(ReloadError::invalid_state(ConnectionState::Closed, "run"));
            }
            outcome = timeout(policy.max_elapsed(), attempts) => {
                outcome.unwrap_or(Err(TransportError::Timeout))
            }
        };

        let handle = match connected {
            Ok(handle) => Arc::new(handle),
            Err(err) => {
                if lock(&self.inner.session).machine.on_connect_failed().is_err() {
                    debug!("manager closed while connecting");
                }
                error!(channel, error = %err, "unable to connect to watcher");
                return Err(ReloadError::connection("connect_failed", &err));
            }
        };

        {
            let mut session = lock(&self.inner.session);
            if let Err(err) = session.machine.on_connected() {
                drop(session);
                handle.close();
                warn!("manager closed before connection completed");
                return Err(err);
            }
            session.handle = Some(Arc::clone(&handle));
        }
        info!(channel, "connected to watcher");

        let task = tokio::spawn(self.clone().read_loop(Arc::clone(&handle)));
        *self.inner.read_task.lock().await = Some(task);

        self.announce_startup(&handle).await;
        Ok(())
    }

    /// Close the channel. Idempotent and safe to call from the read loop.
    ///
    /// Only the first call on an active connection closes the transport;
    /// closing a manager that never ran is a no-op.
    pub fn close(&self) {
        let handle = {
            let mut session = lock(&self.inner.session);
            if !session.machine.close() {
                debug!(state = ?session.machine.state(), "close ignored");
                return;
            }
            session.handle.take()
        };

        self.inner.closed.cancel();
        if let Some(handle) = handle {
            handle.close();
        }
        info!("connection to watcher closed");
    }

    /// Wait for the background read loop to exit.
    ///
    /// Returns immediately if `run` never started one. Cancel-safe. Must not
    /// be awaited from inside the reloader.
    pub async fn wait_for_shutdown(&self) {
        let mut slot = self.inner.read_task.lock().await;
        if let Some(task) = slot.as_mut()
            && let Err(err) = task.await
        {
            error!(error = %err, "read loop terminated abnormally");
        }
        *slot = None;
    }

    async fn announce_startup(&self, handle: &C::Handle) {
        let policy = self.inner.config.retry;
        let startup = Message::empty(MessageType::Startup);
        let startup = &startup;
        let attempts = policy.retry("startup", move |_| handle.write(startup));

        let outcome = tokio::select! {
            _ = self.inner.closed.cancelled() => {
                debug!("closed before startup announcement completed");
                return;
            }
            outcome = timeout(policy.max_elapsed(), attempts) => outcome,
        };

        match outcome {
            Ok(Ok(())) => info!("startup announced"),
            Ok(Err(err)) => error!(error = %err, "unable to send startup message"),
            Err(_) => error!(error = %TransportError::Timeout, "unable to send startup message"),
        }
    }

    async fn read_loop(self, handle: Arc<C::Handle>) {
        loop {
            let message = match handle.read().await {
                Ok(message) => message,
                Err(err) => {
                    self.on_read_error(&err);
                    break;
                }
            };
            if self.inner.closed.is_cancelled() {
                debug!(%message, "dropping message received after close");
                break;
            }
            if self.dispatch(&handle, message).await.is_break() {
                break;
            }
        }
        debug!("read loop exited");
    }

    async fn dispatch(&self, handle: &C::Handle, message: Message) -> ControlFlow<()> {
        match message.message_type() {
            Some(MessageType::Shutdown) => {
                info!("shutdown requested by watcher");
                self.close();
                ControlFlow::Break(())
            }
            Some(MessageType::Reload) => {
                let hint = message.payload_text().into_owned();
                info!(hint = %hint, "reload requested");
                if let Err(err) = reloader::invoke(&self.inner.reloader, hint).await {
                    error!(error = %err, "reload callback failed");
                }
                if self.inner.closed.is_cancelled() {
                    debug!("closed during reload, acknowledgement skipped");
                    return ControlFlow::Break(());
                }
                let ack = Message::new(MessageType::Reloaded, message.into_payload());
                self.reply(handle, &ack).await;
                ControlFlow::Continue(())
            }
            Some(MessageType::Ping) => {
                debug!("ping from watcher");
                self.reply(handle, &Message::empty(MessageType::Pong)).await;
                ControlFlow::Continue(())
            }
            Some(MessageType::Internal) => {
                debug!(bytes = message.payload().len(), "internal transport message");
                ControlFlow::Continue(())
            }
            Some(other) => {
                warn!(message_type = ?other, "unexpected message type from watcher");
                ControlFlow::Continue(())
            }
            None => {
                warn!(tag = message.tag(), "unknown message type from watcher");
                ControlFlow::Continue(())
            }
        }
    }

    fn on_read_error(&self, err: &TransportError) {
        let was_connected = lock(&self.inner.session).machine.is_connected();
        if was_connected {
            error!(error = %err, "connection to watcher lost");
            self.close();
        } else {
            debug!(error = %err, "read loop stopped after close");
        }
    }

    async fn reply(&self, handle: &C::Handle, message: &Message) {
        match handle.write(message).await {
            Ok(()) => {}
            Err(TransportError::Closed) if self.inner.closed.is_cancelled() => {
                debug!(%message, "reply dropped after close");
            }
            Err(err) => error!(%message, error = %err, "unable to send reply"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
