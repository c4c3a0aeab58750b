//! Drives a [`ClientView`] from an input channel and a local ticker.
//!
//! The reducer never reads a clock; the driver stamps every input with
//! [`Clock::now_millis`] and re-renders once per tick so staleness and the
//! rate-limit countdown advance even when the stream is silent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::view::{ClientView, ViewState};
use crate::worker::{WorkerEvent, epoch_millis};

/// Interval between re-renders.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Source of wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now_millis(&self) -> u64;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        epoch_millis()
    }
}

/// Input consumed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewInput {
    /// An event from the worker stream.
    Event(WorkerEvent),
    /// The stream connection failed.
    ConnectionLost(String),
    /// The user acknowledged the "update available" prompt.
    AcknowledgeUpdate,
}

/// Owns a [`ClientView`] and publishes its rendered state.
pub struct ViewDriver {
    view: ClientView,
    clock: Arc<dyn Clock>,
    tick: Duration,
}

impl ViewDriver {
    /// Creates a driver around an empty view.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            view: ClientView::new(),
            clock,
            tick: DEFAULT_TICK,
        }
    }

    /// Overrides the re-render interval.
    #[must_use]
    pub const fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Spawns the driver, returning the state receiver and task handle.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(
        self,
        inputs: UnboundedReceiver<ViewInput>,
        cancel: CancellationToken,
    ) -> (watch::Receiver<ViewState>, JoinHandle<()>) {
        let initial = self.view.render(self.clock.now_millis());
        let (updates, receiver) = watch::channel(initial);
        let handle = tokio::spawn(self.run(inputs, updates, cancel));
        (receiver, handle)
    }

    /// Applies inputs and ticks until `cancel` fires. Keeps ticking after
    /// the input channel closes.
    pub async fn run(
        mut self,
        mut inputs: UnboundedReceiver<ViewInput>,
        updates: watch::Sender<ViewState>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inputs_open = true;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                input = inputs.recv(), if inputs_open => match input {
                    Some(input) => self.handle(input),
                    None => {
                        debug!("view inputs closed; ticking only");
                        inputs_open = false;
                        continue;
                    }
                },
                _ = ticker.tick() => {}
            }
            updates.send_replace(self.view.render(self.clock.now_millis()));
        }
    }

    fn handle(&mut self, input: ViewInput) {
        match input {
            ViewInput::Event(event) => self.view.apply(event, self.clock.now_millis()),
            ViewInput::ConnectionLost(message) => self.view.connection_lost(message),
            ViewInput::AcknowledgeUpdate => self.view.acknowledge_update(),
        }
    }
}
