//! Background runner driving a controller from a timer and an event channel.
//!
//! Ticks and events are serialized through one async mutex around the
//! controller. A tick that finds the controller busy is dropped and
//! counted instead of queued, so a slow optimizer never builds a backlog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use evotrial_core::FitnessEvaluator;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::controller::{Conclusion, DrawOutcome, Succession, TickOutcome, TrialController, TrialStats};
use crate::error::{Result, TrialError};

/// Events raised by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEvent {
    /// The agent hit a terminal failure
    Failure,
    /// The agent completed its task
    Success,
    /// Apply the next cached candidate
    DrawTrigger,
    /// Clear history and restart
    Reset,
}

/// What the runner did, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialNotice {
    /// Periodic re-evaluation result
    Tick(TickOutcome),
    /// Failure handled (`None` if the trial had concluded)
    Succession(Option<Succession>),
    /// Success handled (`None` if the trial had concluded)
    Success(Option<Conclusion>),
    /// Draw handled
    Draw(DrawOutcome),
    /// Reset handled
    Reset {
        /// Whether the restart succeeded
        ok: bool,
    },
}

/// Controller shared between the runner tasks and the environment.
pub type SharedController<E> = Arc<Mutex<TrialController<E>>>;

/// Handle to a running trial.
pub struct TrialRunner<E: FitnessEvaluator> {
    controller: SharedController<E>,
    events: mpsc::UnboundedSender<TrialEvent>,
    stop: watch::Sender<bool>,
    dropped: Arc<AtomicU64>,
    ticker: JoinHandle<()>,
    handler: JoinHandle<()>,
}

impl<E> TrialRunner<E>
where
    E: FitnessEvaluator + 'static,
    E::State: Clone + Send + Sync + 'static,
{
    /// Start the timer and event tasks. The first tick fires one interval
    /// after spawning.
    pub fn spawn(controller: TrialController<E>) -> (Self, mpsc::UnboundedReceiver<TrialNotice>) {
        let period = controller.config().interval;
        let namespace = controller.namespace().clone();
        let shared = Arc::new(Mutex::new(controller));
        let dropped = Arc::new(AtomicU64::new(0));

        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);

        let ticker = tokio::spawn(tick_loop(
            shared.clone(),
            period,
            stop_rx,
            dropped.clone(),
            notice_tx.clone(),
        ));
        let handler = tokio::spawn(event_loop(shared.clone(), event_rx, notice_tx));

        info!("Trial runner for {} started, ticking every {:?}", namespace, period);

        let runner = Self {
            controller: shared,
            events: event_tx,
            stop: stop_tx,
            dropped,
            ticker,
            handler,
        };
        (runner, notice_rx)
    }

    /// Queue an event. Events are handled one at a time, in order.
    pub fn send(&self, event: TrialEvent) -> Result<()> {
        self.events.send(event).map_err(|_| TrialError::RunnerClosed)
    }

    /// Queue a failure event.
    pub fn fail(&self) -> Result<()> {
        self.send(TrialEvent::Failure)
    }

    /// Queue a success event.
    pub fn succeed(&self) -> Result<()> {
        self.send(TrialEvent::Success)
    }

    /// Queue a draw trigger.
    pub fn trigger_draw(&self) -> Result<()> {
        self.send(TrialEvent::DrawTrigger)
    }

    /// Queue a reset.
    pub fn reset(&self) -> Result<()> {
        self.send(TrialEvent::Reset)
    }

    /// Shared controller, for environment updates between ticks.
    pub fn controller(&self) -> SharedController<E> {
        self.controller.clone()
    }

    /// Ticks skipped because an exchange was still outstanding.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop ticking, finish queued events and any in-flight exchange, and
    /// return the final counters.
    pub async fn shutdown(self) -> TrialStats {
        let TrialRunner {
            controller,
            events,
            stop,
            dropped,
            ticker,
            handler,
        } = self;

        let _ = stop.send(true);
        if let Err(e) = ticker.await {
            warn!("Tick task ended abnormally: {}", e);
        }

        // Closing the channel lets the handler drain what is queued
        drop(events);
        if let Err(e) = handler.await {
            warn!("Event task ended abnormally: {}", e);
        }

        let controller = controller.lock().await;
        info!(
            "Trial runner for {} stopped ({} ticks dropped)",
            controller.namespace(),
            dropped.load(Ordering::Relaxed)
        );
        controller.stats().clone()
    }
}

async fn tick_loop<E>(
    shared: SharedController<E>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    dropped: Arc<AtomicU64>,
    notices: mpsc::UnboundedSender<TrialNotice>,
) where
    E: FitnessEvaluator + 'static,
    E::State: Clone + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                match shared.clone().try_lock_owned() {
                    Ok(mut controller) => {
                        let notices = notices.clone();
                        tokio::spawn(async move {
                            let outcome = controller.tick().await;
                            let _ = notices.send(TrialNotice::Tick(outcome));
                        });
                    }
                    Err(_) => {
                        let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        debug!("Tick dropped, previous exchange still outstanding ({} so far)", total);
                        let _ = notices.send(TrialNotice::Tick(TickOutcome::Dropped));
                    }
                }
            }
        }
    }
}

async fn event_loop<E>(
    shared: SharedController<E>,
    mut events: mpsc::UnboundedReceiver<TrialEvent>,
    notices: mpsc::UnboundedSender<TrialNotice>,
) where
    E: FitnessEvaluator + 'static,
    E::State: Clone + Send + Sync + 'static,
{
    while let Some(event) = events.recv().await {
        let mut controller = shared.lock().await;
        debug!("Handling {:?} for {}", event, controller.namespace());

        let notice = match event {
            TrialEvent::Failure => TrialNotice::Succession(controller.on_failure().await),
            TrialEvent::Success => TrialNotice::Success(controller.on_success().await),
            TrialEvent::DrawTrigger => TrialNotice::Draw(controller.trigger_draw().await),
            TrialEvent::Reset => match controller.reset().await {
                Ok(()) => TrialNotice::Reset { ok: true },
                Err(e) => {
                    error!("Reset of {} failed: {}", controller.namespace(), e);
                    TrialNotice::Reset { ok: false }
                }
            },
        };
        drop(controller);

        let _ = notices.send(notice);
    }
}
