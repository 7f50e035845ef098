//! The observation scheduler: one independent polling loop per connector.
//!
//! Each registered connector is polled on its own interval by its own tokio
//! task, so a slow or stuck source never delays the others. All loops run
//! under one shared cancellation token owned by the scheduler; `stop()`
//! requests cancellation and returns without joining the loops.

use std::sync::Arc;
use std::time::Duration;

use buildwatch_connectors::{Connector, QueryOutcome};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default capacity of the event channel.
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default tick between due-time checks.
///
/// The tick bounds how often a loop wakes to check whether its connector is
/// due, independently of how often the connector actually polls.
const DEFAULT_CHECK_TICK: Duration = Duration::from_secs(1);

/// Lifecycle and per-result events fanned out to subscribers.
///
/// Delivery order is guaranteed within one connector's loop only; events
/// from different loops interleave arbitrarily.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Fired immediately before a poll begins.
    ObservationRunStarted,
    /// Fired after a poll completed, carrying the polled connector.
    StatusQueried(Arc<dyn Connector>),
    /// Fired after a poll, completed or cancelled.
    ObservationRunEnded,
}

/// Errors from scheduler lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The operation requires the scheduler to be stopped first.
    #[error("scheduler is running; stop it first")]
    Running,
    /// A stop is in progress.
    #[error("a stop is in progress")]
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Stopped,
    Running,
    Stopping,
}

#[derive(Clone)]
struct Registered {
    connector: Arc<dyn Connector>,
    interval: Duration,
}

struct Control {
    state: RunState,
    cancel: CancellationToken,
}

/// Drives interval-based polling of an arbitrary number of connectors.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use buildwatch::Scheduler;
/// use buildwatch_connectors::ping::PingConnector;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let scheduler = Scheduler::new();
///     let probe = Arc::new(PingConnector::builder().address("10.0.0.1:22").build()?);
///     scheduler.observe(probe);
///
///     let mut events = scheduler.subscribe();
///     scheduler.start()?;
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
///     Ok(())
/// }
/// ```
pub struct Scheduler {
    connectors: Mutex<Vec<Registered>>,
    control: Mutex<Control>,
    events: broadcast::Sender<SchedulerEvent>,
    check_tick: Duration,
}

impl Scheduler {
    /// Create a scheduler with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the scheduler.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    /// Register a connector, polled at its own preferred interval.
    ///
    /// No-op if the same connector (by identity) is already registered.
    /// Safe to call whether or not the scheduler is running; a connector
    /// registered while running is picked up at the next `start()`.
    pub fn observe(&self, connector: Arc<dyn Connector>) {
        let interval = connector.poll_interval();
        self.observe_every(connector, interval);
    }

    /// Register a connector with an explicit polling interval.
    pub fn observe_every(&self, connector: Arc<dyn Connector>, interval: Duration) {
        let mut connectors = self.connectors.lock();
        if connectors.iter().any(|r| r.connector.id() == connector.id()) {
            return;
        }
        connectors.push(Registered {
            connector,
            interval,
        });
    }

    /// Launch one polling loop per registered connector.
    ///
    /// Idempotent: calling while already running is a no-op. Fails while a
    /// stop is in progress.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let cancel = {
            let mut control = self.control.lock();
            match control.state {
                RunState::Running => return Ok(()),
                RunState::Stopping => return Err(SchedulerError::Stopping),
                RunState::Stopped => {
                    control.cancel = CancellationToken::new();
                    control.state = RunState::Running;
                    control.cancel.clone()
                }
            }
        };

        let connectors = self.connectors.lock().clone();
        info!(connectors = connectors.len(), "observation started");
        for registered in connectors {
            tokio::spawn(run_loop(
                registered.connector,
                registered.interval,
                self.check_tick,
                cancel.clone(),
                self.events.clone(),
            ));
        }
        Ok(())
    }

    /// Request cancellation of all polling loops.
    ///
    /// Safe to call even if never started. The running flag is cleared as
    /// soon as cancellation has been requested; loops unwind on their own
    /// and in-flight polls observe the token.
    pub fn stop(&self) {
        let mut control = self.control.lock();
        if control.state == RunState::Stopped {
            return;
        }
        control.state = RunState::Stopping;
        control.cancel.cancel();
        control.state = RunState::Stopped;
        info!("observation stopped");
    }

    /// Whether polling loops are currently running.
    pub fn is_running(&self) -> bool {
        self.control.lock().state == RunState::Running
    }

    /// Clear all registered connectors.
    ///
    /// Fails unless the scheduler is stopped.
    pub fn unobserve_all(&self) -> Result<(), SchedulerError> {
        if self.control.lock().state != RunState::Stopped {
            return Err(SchedulerError::Running);
        }
        self.connectors.lock().clear();
        Ok(())
    }

    /// Subscribe to scheduler events.
    ///
    /// Any number of consumers may subscribe; each receives every event
    /// sent after its subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// A read-only view of the registered connectors.
    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        self.connectors
            .lock()
            .iter()
            .map(|r| Arc::clone(&r.connector))
            .collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("connectors", &self.connectors.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Builder for configuring a [`Scheduler`].
#[derive(Debug, Default)]
pub struct SchedulerBuilder {
    check_tick: Option<Duration>,
    event_capacity: Option<usize>,
}

impl SchedulerBuilder {
    /// Set the tick between due-time checks (default: 1 second).
    pub fn check_tick(mut self, tick: Duration) -> Self {
        self.check_tick = Some(tick);
        self
    }

    /// Set the event channel capacity (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> Scheduler {
        let (events, _) =
            broadcast::channel(self.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY));
        Scheduler {
            connectors: Mutex::new(Vec::new()),
            control: Mutex::new(Control {
                state: RunState::Stopped,
                cancel: CancellationToken::new(),
            }),
            events,
            check_tick: self.check_tick.unwrap_or(DEFAULT_CHECK_TICK),
        }
    }
}

/// One connector's polling loop.
///
/// Polls whenever more than `interval` has passed since the last poll, then
/// sleeps one tick before re-checking. A poll that fails inside the
/// connector still produces a committed status (see `query_status`), so the
/// loop itself never fails.
async fn run_loop(
    connector: Arc<dyn Connector>,
    interval: Duration,
    tick: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<SchedulerEvent>,
) {
    debug!(connector = %connector.name(), interval = ?interval, "polling loop started");
    let mut last_poll: Option<Instant> = None;

    while !cancel.is_cancelled() {
        let due = last_poll.map_or(true, |at| at.elapsed() > interval);
        if due {
            let _ = events.send(SchedulerEvent::ObservationRunStarted);
            let outcome = connector.query_status(&cancel).await;
            last_poll = Some(Instant::now());
            match outcome {
                QueryOutcome::Completed(status) => {
                    debug!(
                        connector = %connector.name(),
                        state = status.state.symbol(),
                        "poll completed"
                    );
                    let _ = events.send(SchedulerEvent::StatusQueried(Arc::clone(&connector)));
                }
                QueryOutcome::Cancelled => {
                    debug!(connector = %connector.name(), "poll cancelled");
                }
            }
            let _ = events.send(SchedulerEvent::ObservationRunEnded);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(tick) => {}
        }
    }
    debug!(connector = %connector.name(), "polling loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use buildwatch_connectors::{ConnectorConfig, ConnectorError, ConnectorState};
    use buildwatch_types::{BuildState, Status};

    #[derive(Debug)]
    struct CountingConnector {
        config: ConnectorConfig,
        state: ConnectorState,
        interval: Duration,
        polls: AtomicUsize,
    }

    impl CountingConnector {
        fn new(name: &str, interval: Duration) -> Arc<Self> {
            let config = ConnectorConfig::new("counting", name);
            Arc::new(Self {
                state: ConnectorState::new(&config.name, 8),
                config,
                interval,
                polls: AtomicUsize::new(0),
            })
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        fn configuration(&self) -> &ConnectorConfig {
            &self.config
        }

        fn state(&self) -> &ConnectorState {
            &self.state
        }

        fn poll_interval(&self) -> Duration {
            self.interval
        }

        async fn fetch_status(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Status, ConnectorError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(Status::builder(self.name())
                .state(BuildState::Success)
                .build())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn intervals_are_independent_across_connectors() {
        let scheduler = Scheduler::new();
        let fast = CountingConnector::new("fast", Duration::from_secs(1));
        let slow = CountingConnector::new("slow", Duration::from_secs(100));
        scheduler.observe(fast.clone());
        scheduler.observe(slow.clone());

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        scheduler.stop();

        // The first poll happens immediately; the fast connector gets at
        // least one more within three seconds, the slow one none.
        assert!(fast.polls() >= 2, "fast polled {} times", fast.polls());
        assert_eq!(slow.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let scheduler = Scheduler::new();
        let connector = CountingConnector::new("svc", Duration::from_secs(100));
        scheduler.observe(connector.clone());

        scheduler.start().unwrap();
        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.stop();

        // A second start must not spawn a second loop.
        assert_eq!(connector.polls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn observe_same_connector_twice_is_a_noop() {
        let scheduler = Scheduler::new();
        let connector = CountingConnector::new("svc", Duration::from_secs(100));
        scheduler.observe(connector.clone());
        scheduler.observe(connector.clone());

        assert_eq!(scheduler.connectors().len(), 1);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.stop();
        assert_eq!(connector.polls(), 1);
    }

    #[tokio::test]
    async fn stop_without_start_is_safe() {
        let scheduler = Scheduler::new();
        scheduler.stop();
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn unobserve_all_refuses_while_running() {
        let scheduler = Scheduler::new();
        let connector = CountingConnector::new("svc", Duration::from_secs(100));
        scheduler.observe(connector);

        scheduler.start().unwrap();
        assert_eq!(scheduler.unobserve_all(), Err(SchedulerError::Running));

        scheduler.stop();
        scheduler.unobserve_all().unwrap();
        assert!(scheduler.connectors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn events_fan_out_to_every_subscriber() {
        let scheduler = Scheduler::new();
        let connector = CountingConnector::new("svc", Duration::from_secs(100));
        scheduler.observe(connector);

        let mut first = scheduler.subscribe();
        let mut second = scheduler.subscribe();

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        scheduler.stop();

        for rx in [&mut first, &mut second] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                SchedulerEvent::ObservationRunStarted
            ));
            match rx.try_recv().unwrap() {
                SchedulerEvent::StatusQueried(polled) => assert_eq!(polled.name(), "svc"),
                other => panic!("expected StatusQueried, got {other:?}"),
            }
            assert!(matches!(
                rx.try_recv().unwrap(),
                SchedulerEvent::ObservationRunEnded
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart_polls_again_with_a_fresh_cancellation_source() {
        let scheduler = Scheduler::new();
        let connector = CountingConnector::new("svc", Duration::from_secs(100));
        scheduler.observe(connector.clone());

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop();
        assert_eq!(connector.polls(), 1);

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.stop();
        assert_eq!(connector.polls(), 2);
    }
}
