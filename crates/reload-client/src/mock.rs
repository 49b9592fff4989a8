//! Scripted in-memory transport for manager tests.

use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use reload_core::{LinkStatus, Message, MessageType, TransportError};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

use crate::transport::{Connector, TransportHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Wrote(Message),
    Reloaded(String),
    Closed,
}

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub(crate) fn push(&self, event: Event) {
        self.0.lock().expect("event log lock").push(event);
    }

    pub(crate) fn snapshot(&self) -> Vec<Event> {
        self.0.lock().expect("event log lock").clone()
    }

    /// Events after the startup announcement.
    pub(crate) fn after_startup(&self) -> Vec<Event> {
        self.snapshot()
            .into_iter()
            .filter(|event| !is_write_of(event, MessageType::Startup))
            .collect()
    }

    pub(crate) fn count_writes(&self, message_type: MessageType) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| is_write_of(event, message_type))
            .count()
    }
}

fn is_write_of(event: &Event, message_type: MessageType) -> bool {
    matches!(event, Event::Wrote(m) if m.message_type() == Some(message_type))
}

/// Counters shared between the test body and the mock transport.
#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) connect_hangs: AtomicBool,
    pub(crate) connect_calls: AtomicU32,
    pub(crate) connect_failures: AtomicU32,
    pub(crate) write_failures: AtomicU32,
    pub(crate) read_calls: AtomicU32,
    pub(crate) close_calls: AtomicU32,
}

impl Counters {
    pub(crate) fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockConnector {
    log: EventLog,
    counters: Arc<Counters>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
}

impl MockConnector {
    pub(crate) fn new(log: EventLog) -> (Self, Arc<Counters>, mpsc::UnboundedSender<Message>) {
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            log,
            counters: Arc::clone(&counters),
            inbound: Mutex::new(Some(rx)),
        };
        (connector, counters, tx)
    }
}

impl Connector for MockConnector {
    type Handle = MockHandle;

    async fn connect(&self, _channel: &str) -> Result<MockHandle, TransportError> {
        self.counters.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.counters.connect_hangs.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        let failing = self
            .counters
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(TransportError::Connect(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }

        let inbound = self
            .inbound
            .lock()
            .expect("inbound lock")
            .take()
            .unwrap_or_else(|| mpsc::unbounded_channel().1);
        Ok(MockHandle {
            log: self.log.clone(),
            counters: Arc::clone(&self.counters),
            inbound: AsyncMutex::new(inbound),
            closed: CancellationToken::new(),
        })
    }
}

pub(crate) struct MockHandle {
    log: EventLog,
    counters: Arc<Counters>,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    closed: CancellationToken,
}

impl TransportHandle for MockHandle {
    async fn read(&self) -> Result<Message, TransportError> {
        self.counters.read_calls.fetch_add(1, Ordering::SeqCst);
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            message = inbound.recv() => message.ok_or(TransportError::Closed),
        }
    }

    async fn write(&self, message: &Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let failing = self
            .counters
            .write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(TransportError::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            )));
        }
        self.log.push(Event::Wrote(message.clone()));
        Ok(())
    }

    fn close(&self) {
        self.counters.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        self.log.push(Event::Closed);
    }

    fn status(&self) -> LinkStatus {
        if self.closed.is_cancelled() {
            LinkStatus::Disconnected
        } else {
            LinkStatus::Connected
        }
    }
}

/// Formatted log output captured from a thread-local subscriber.
#[derive(Clone, Default)]
pub(crate) struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route events from this thread, including tasks polled on it, here.
    pub(crate) fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn lines_at(&self, level: &str) -> Vec<String> {
        let bytes = self.0.lock().expect("log buffer lock").clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.trim_start().starts_with(level))
            .map(str::to_owned)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
