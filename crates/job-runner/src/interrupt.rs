// Interrupt sources observed by the runner between tasks.
//
// A source hands out subscriptions. A subscription only sees interrupts raised
// after it was created, is polled without blocking, and is torn down as soon
// as it has yielded one interrupt.

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::task::AbortHandle;

/// Buffer size for interrupt channels. Only the first interrupt matters, so a
/// single slot is enough; extra interrupts overwrite it.
const INTERRUPT_CAPACITY: usize = 1;

/// Why a run was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// SIGINT / Ctrl-C.
    UserCancelled,
    /// SIGTERM.
    OperatingSystemShutdown,
    /// Raised programmatically through `ManualInterrupt`.
    Requested,
    /// The task thread could not be started or vanished without reporting.
    WorkerLost,
}

impl std::fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterruptReason::UserCancelled => write!(f, "UserCancelled"),
            InterruptReason::OperatingSystemShutdown => write!(f, "OperatingSystemShutdown"),
            InterruptReason::Requested => write!(f, "Requested"),
            InterruptReason::WorkerLost => write!(f, "WorkerLost"),
        }
    }
}

/// Something that can ask a run to stop starting new tasks.
pub trait InterruptSource: Send + Sync {
    /// Start listening. Interrupts raised before this call are not observed.
    fn subscribe(&self) -> Subscription;
}

/// A live registration with an `InterruptSource`.
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    receiver: Option<broadcast::Receiver<InterruptReason>>,
    /// Background task forwarding OS signals into `receiver`, if any.
    listener: Option<AbortHandle>,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<InterruptReason>) -> Self {
        Self {
            receiver: Some(receiver),
            listener: None,
        }
    }

    /// A subscription whose `listener` task is aborted on unsubscribe.
    pub fn with_listener(
        receiver: broadcast::Receiver<InterruptReason>,
        listener: AbortHandle,
    ) -> Self {
        Self {
            receiver: Some(receiver),
            listener: Some(listener),
        }
    }

    /// A subscription that never fires.
    pub fn inactive() -> Self {
        Self {
            receiver: None,
            listener: None,
        }
    }

    /// Check for a pending interrupt without blocking.
    ///
    /// Returns the first interrupt at most once: after it has been observed
    /// (or the source has gone away) the subscription is torn down and every
    /// later call returns `None`.
    pub fn poll(&mut self) -> Option<InterruptReason> {
        let receiver = self.receiver.as_mut()?;
        let observed = loop {
            match receiver.try_recv() {
                Ok(reason) => break Some(reason),
                // An older interrupt was overwritten; the newest one is still queued.
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => break None,
            }
        };
        self.teardown();
        observed
    }

    /// Whether this subscription can still observe an interrupt.
    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Stop listening.
    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.receiver = None;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// ManualInterrupt
// ---------------------------------------------------------------------------

/// An interrupt source driven by code rather than by the OS.
///
/// Clones share the same channel, so a handle can be moved into a task or
/// another thread and used to stop a run that subscribed through any clone.
#[derive(Debug, Clone)]
pub struct ManualInterrupt {
    sender: broadcast::Sender<InterruptReason>,
}

impl ManualInterrupt {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(INTERRUPT_CAPACITY);
        Self { sender }
    }

    /// Raise an interrupt with `InterruptReason::Requested`.
    ///
    /// Returns `false` when nothing is subscribed; such an interrupt is lost.
    pub fn interrupt(&self) -> bool {
        self.interrupt_with(InterruptReason::Requested)
    }

    /// Raise an interrupt with an explicit reason.
    pub fn interrupt_with(&self, reason: InterruptReason) -> bool {
        self.sender.send(reason).is_ok()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ManualInterrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptSource for ManualInterrupt {
    fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe())
    }
}

// ---------------------------------------------------------------------------
// SignalInterrupt
// ---------------------------------------------------------------------------

/// Interrupts delivered by the operating system: SIGINT and SIGTERM on unix,
/// Ctrl-C elsewhere.
///
/// Each subscription registers the signal listeners synchronously and spawns
/// a forwarding task on the current Tokio runtime; unsubscribing aborts it.
/// Tokio keeps its process-wide handler installed afterwards, so once a
/// subscription has existed SIGINT no longer terminates the process by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalInterrupt;

impl SignalInterrupt {
    pub fn new() -> Self {
        Self
    }
}

impl InterruptSource for SignalInterrupt {
    fn subscribe(&self) -> Subscription {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Cannot listen for OS signals outside a Tokio runtime: {}", e);
                return Subscription::inactive();
            }
        };

        let signals = match OsSignals::register() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!("Failed to register OS signal listeners: {}", e);
                return Subscription::inactive();
            }
        };

        let (sender, receiver) = broadcast::channel(INTERRUPT_CAPACITY);
        let listener = runtime.spawn(async move {
            let reason = signals.recv().await;
            tracing::info!("{} signal received", reason);
            let _ = sender.send(reason);
        });

        Subscription::with_listener(receiver, listener.abort_handle())
    }
}

#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) -> InterruptReason {
        tokio::select! {
            _ = self.interrupt.recv() => InterruptReason::UserCancelled,
            _ = self.terminate.recv() => InterruptReason::OperatingSystemShutdown,
        }
    }
}

#[cfg(not(unix))]
struct OsSignals;

#[cfg(not(unix))]
impl OsSignals {
    fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> InterruptReason {
        match tokio::signal::ctrl_c().await {
            Ok(()) => InterruptReason::UserCancelled,
            Err(e) => {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending().await
            }
        }
    }
}

/// Serializes tests that raise real signals: every live `SignalInterrupt`
/// subscription in the process sees them.
#[cfg(test)]
pub(crate) static SIGNAL_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());
