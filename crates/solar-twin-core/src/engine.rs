//! The simulation engine: run state, replay cursor, and the tick task.
//!
//! [`SimulationEngine`] is a cheap-to-clone handle around one owned
//! simulation state. The state is guarded by a single async mutex; tick
//! bodies and start/stop transitions both run under it, so they never
//! interleave.
//!
//! # States
//!
//! | State | `running` | tick task |
//! |-------|-----------|-----------|
//! | Stopped (initial) | `false` | `None` |
//! | Running | `true` | `Some` |
//!
//! The running flag and the task handle are always written together under
//! the lock.
//!
//! # Tick
//!
//! Each tick advances the fleet, then, if replay data is loaded, emits the
//! record at the cursor as a `combined` frame and advances the cursor,
//! wrapping to zero at the end so replay loops forever. With no replay data
//! it emits a fleet-only `panels` frame instead.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use solar_twin_types::{
    CombinedFrame, ConnectedEvent, EngineStatus, HistoryPoint, LivePanels, PanelsFrame,
    ReplaySample, StartOutcome, StopOutcome, StoppedEvent, StreamEvent, SubscriberId,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::broadcast::{Broadcaster, Subscription};
use crate::config::{FleetConfig, TwinConfig};
use crate::fleet::Fleet;
use crate::replay::ReplaySource;

/// Errors surfaced to the caller of a single engine command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The command needs replay data and none is loaded.
    #[error("no replay data loaded")]
    NoData,
}

/// Engine parameters, usually derived from [`TwinConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Time between ticks.
    pub tick_interval: Duration,
    /// Number of recent ticks kept in the history window.
    pub history_window: usize,
    /// Fail `start` with [`EngineError::NoData`] when no replay data is
    /// loaded, instead of running fleet-only.
    pub require_replay_data: bool,
    /// Per-subscriber buffer size.
    pub channel_capacity: usize,
    /// Number of records returned by [`SimulationEngine::sample`].
    pub sample_size: usize,
    /// Seed for the fleet's random source.
    pub seed: Option<u64>,
    /// Fleet parameters.
    pub fleet: FleetConfig,
}

impl EngineSettings {
    /// Extract engine settings from the full configuration.
    pub fn from_config(config: &TwinConfig) -> Self {
        Self {
            tick_interval: config.simulation.tick_interval(),
            history_window: config.simulation.history_window,
            require_replay_data: config.replay.require_data,
            channel_capacity: config.broadcast.channel_capacity,
            sample_size: config.replay.sample_size,
            seed: config.simulation.seed,
            fleet: config.fleet.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&TwinConfig::default())
    }
}

struct EngineState {
    running: bool,
    /// Next replay position to emit; always `< replay.len()` when the
    /// replay is non-empty, `0` otherwise.
    cursor: usize,
    /// Ticks executed since the engine was created.
    tick: u64,
    /// Incremented on every start so a task from an earlier run can tell
    /// it has been superseded.
    epoch: u64,
    fleet: Fleet,
    rng: SmallRng,
    history: VecDeque<HistoryPoint>,
    task: Option<JoinHandle<()>>,
}

impl Drop for EngineState {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Shared {
    state: Mutex<EngineState>,
    replay: ReplaySource,
    broadcaster: Broadcaster,
    settings: EngineSettings,
}

/// Handle to the simulation engine. Clones share the same state.
#[derive(Clone)]
pub struct SimulationEngine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("records", &self.shared.replay.len())
            .field("subscribers", &self.shared.broadcaster.len())
            .finish_non_exhaustive()
    }
}

impl SimulationEngine {
    /// Create a stopped engine over `replay` with a freshly initialized
    /// fleet.
    pub fn new(replay: ReplaySource, settings: EngineSettings) -> Self {
        let mut rng = settings
            .seed
            .map_or_else(|| SmallRng::from_rng(&mut rand::rng()), SmallRng::seed_from_u64);
        let fleet = Fleet::initialize(&settings.fleet, &mut rng);

        info!(
            records = replay.len(),
            panels = fleet.len(),
            tick_interval = ?settings.tick_interval,
            require_replay_data = settings.require_replay_data,
            "simulation engine initialized"
        );

        let state = EngineState {
            running: false,
            cursor: 0,
            tick: 0,
            epoch: 0,
            fleet,
            rng,
            history: VecDeque::new(),
            task: None,
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                replay,
                broadcaster: Broadcaster::new(),
                settings,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start ticking.
    ///
    /// Already running is a no-op reported with `accepted: false`. With no
    /// replay data the engine runs fleet-only, unless
    /// [`EngineSettings::require_replay_data`] is set.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoData`] only in strict mode with an empty
    /// replay source.
    pub async fn start(&self) -> Result<StartOutcome, EngineError> {
        let mut state = self.shared.state.lock().await;

        if state.running {
            return Ok(StartOutcome {
                accepted: false,
                running: true,
                message: "Simulation already running".to_owned(),
            });
        }

        if self.shared.replay.is_empty() && self.shared.settings.require_replay_data {
            return Err(EngineError::NoData);
        }

        state.epoch = state.epoch.wrapping_add(1);
        let task = tokio::spawn(run_ticks(
            Arc::downgrade(&self.shared),
            state.epoch,
            self.shared.settings.tick_interval,
        ));
        state.task = Some(task);
        state.running = true;

        info!(
            epoch = state.epoch,
            cursor = state.cursor,
            records = self.shared.replay.len(),
            fleet_only = self.shared.replay.is_empty(),
            "simulation started"
        );

        Ok(StartOutcome {
            accepted: true,
            running: true,
            message: "Simulation started".to_owned(),
        })
    }

    /// Stop ticking and notify subscribers.
    ///
    /// Already stopped is a no-op and publishes nothing. Once this returns
    /// no further tick will run until the next [`start`](Self::start).
    pub async fn stop(&self) -> StopOutcome {
        let mut state = self.shared.state.lock().await;

        if !state.running {
            return StopOutcome {
                running: false,
                message: "Simulation not running".to_owned(),
            };
        }

        if let Some(task) = state.task.take() {
            task.abort();
        }
        state.running = false;

        let delivered = self.shared.broadcaster.publish(StreamEvent::Stopped(StoppedEvent {
            message: "Simulation stopped".to_owned(),
        }));
        info!(tick = state.tick, cursor = state.cursor, delivered, "simulation stopped");

        StopOutcome {
            running: false,
            message: "Simulation stopped".to_owned(),
        }
    }

    /// Consistent read of the run flag, cursor, and replay size.
    pub async fn status(&self) -> EngineStatus {
        let state = self.shared.state.lock().await;
        self.status_of(&state)
    }

    /// The first records of the replay, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoData`] if no replay data is loaded.
    pub fn sample(&self) -> Result<ReplaySample, EngineError> {
        self.sample_n(self.shared.settings.sample_size)
    }

    /// The first `n` records of the replay.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoData`] if no replay data is loaded.
    pub fn sample_n(&self, n: usize) -> Result<ReplaySample, EngineError> {
        let replay = &self.shared.replay;
        if replay.is_empty() {
            return Err(EngineError::NoData);
        }
        Ok(ReplaySample {
            sample_data: replay.sample(n).to_vec(),
            total_points: to_u64(replay.len()),
        })
    }

    /// Current panels and aggregate, outside the stream.
    pub async fn live_panels(&self) -> LivePanels {
        let state = self.shared.state.lock().await;
        LivePanels {
            panels: state.fleet.panels().to_vec(),
            metrics: state.fleet.aggregate(),
            timestamp: Utc::now(),
        }
    }

    /// The bounded recent-history window, oldest first.
    pub async fn history(&self) -> Vec<HistoryPoint> {
        let state = self.shared.state.lock().await;
        state.history.iter().copied().collect()
    }

    // -----------------------------------------------------------------------
    // Subscribers
    // -----------------------------------------------------------------------

    /// Register a new subscriber.
    ///
    /// The subscriber's first event is always `connected`, carrying the
    /// status at registration time; the state lock is held across
    /// registration so no tick frame can precede it.
    pub async fn subscribe(&self) -> Subscription {
        let state = self.shared.state.lock().await;
        let greeting = StreamEvent::Connected(ConnectedEvent {
            message: "Connected to solar panel stream".to_owned(),
            total_data_points: to_u64(self.shared.replay.len()),
            is_running: state.running,
        });
        let subscription = self
            .shared
            .broadcaster
            .subscribe(self.shared.settings.channel_capacity, greeting);
        drop(state);

        info!(
            subscriber = %subscription.id(),
            subscribers = self.shared.broadcaster.len(),
            "client connected"
        );
        subscription
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.shared.broadcaster.unregister(id);
        if removed {
            info!(subscriber = %id, "client disconnected");
        }
        removed
    }

    /// The subscriber registry, for attaching custom sinks.
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.shared.broadcaster
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.broadcaster.len()
    }

    /// The loaded replay source.
    pub fn replay(&self) -> &ReplaySource {
        &self.shared.replay
    }

    /// The settings the engine was built with.
    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    fn status_of(&self, state: &EngineState) -> EngineStatus {
        EngineStatus {
            running: state.running,
            cursor: to_u64(state.cursor),
            total_records: to_u64(self.shared.replay.len()),
            has_data: !self.shared.replay.is_empty(),
        }
    }
}

impl Shared {
    /// One tick. Returns `false` if the task that called it is stale and
    /// should exit.
    async fn on_tick(&self, epoch: u64) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.running || state.epoch != epoch {
            return false;
        }

        state.fleet.tick(&mut state.rng);
        state.tick = state.tick.saturating_add(1);

        let timestamp = Utc::now();
        let panels = state.fleet.panels().to_vec();
        let metrics = state.fleet.aggregate();
        let total = self.replay.len();

        let (event, point) = if let Some(record) = self.replay.get(state.cursor) {
            let current_index = to_u64(state.cursor.saturating_add(1));
            let point = HistoryPoint {
                tick: state.tick,
                current_index: Some(current_index),
                active_power: Some(record.readings.active_power),
                total_power: metrics.total_power,
                timestamp,
            };
            let frame = CombinedFrame {
                id: record.id,
                recorded_at: record.timestamp.clone(),
                readings: record.readings,
                current_index,
                total_points: to_u64(total),
                tick: state.tick,
                timestamp,
                panels,
                metrics,
            };

            state.cursor = state.cursor.saturating_add(1);
            if state.cursor >= total {
                state.cursor = 0;
                debug!(tick = state.tick, "reached end of replay, looping to start");
            }
            (StreamEvent::Combined(frame), point)
        } else {
            let point = HistoryPoint {
                tick: state.tick,
                current_index: None,
                active_power: None,
                total_power: metrics.total_power,
                timestamp,
            };
            let frame = PanelsFrame {
                tick: state.tick,
                timestamp,
                panels,
                metrics,
            };
            (StreamEvent::Panels(frame), point)
        };

        if self.settings.history_window > 0 {
            if state.history.len() >= self.settings.history_window {
                state.history.pop_front();
            }
            state.history.push_back(point);
        }

        let delivered = self.broadcaster.publish(event);
        trace!(tick = state.tick, cursor = state.cursor, delivered, "tick published");
        true
    }
}

/// The repeating tick task. The first tick fires one interval after start.
async fn run_ticks(engine: Weak<Shared>, epoch: u64, period: Duration) {
    let period = period.max(Duration::from_millis(1));
    let now = Instant::now();
    let first = now.checked_add(period).unwrap_or(now);
    let mut interval = tokio::time::interval_at(first, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let Some(shared) = engine.upgrade() else {
            break;
        };
        if !shared.on_tick(epoch).await {
            break;
        }
    }
    trace!(epoch, "tick task exited");
}

fn to_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use solar_twin_types::{Readings, ReplayRecord};

    use super::*;

    const PERIOD: Duration = Duration::from_secs(1);

    fn records(n: u64) -> ReplaySource {
        ReplaySource::from_records(
            (1..=n)
                .map(|id| ReplayRecord {
                    id,
                    timestamp: format!("t{id}"),
                    readings: Readings::default(),
                })
                .collect(),
        )
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            tick_interval: PERIOD,
            seed: Some(17),
            ..EngineSettings::default()
        }
    }

    async fn next_frame(sub: &mut Subscription) -> Option<Arc<StreamEvent>> {
        loop {
            let event = sub.recv().await?;
            if event.is_frame() {
                return Some(event);
            }
        }
    }

    async fn task_is_present(engine: &SimulationEngine) -> bool {
        engine.shared.state.lock().await.task.is_some()
    }

    #[tokio::test(start_paused = true)]
    async fn starts_stopped() {
        let engine = SimulationEngine::new(records(3), settings());
        let status = engine.status().await;
        assert!(!status.running);
        assert_eq!(status.cursor, 0);
        assert_eq!(status.total_records, 3);
        assert!(status.has_data);
        assert!(!task_is_present(&engine).await);
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_tracks_tick_count_modulo_length() {
        let engine = SimulationEngine::new(records(4), settings());
        let mut sub = engine.subscribe().await;
        assert!(engine.start().await.is_ok());

        for tick in 1..=10_u64 {
            let frame = next_frame(&mut sub).await;
            assert!(frame.is_some());
            assert_eq!(engine.status().await.cursor, tick % 4);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replay_loops_back_to_start() {
        let engine = SimulationEngine::new(records(3), settings());
        let mut sub = engine.subscribe().await;
        let start_cursor = engine.status().await.cursor;
        assert!(engine.start().await.is_ok());

        let mut indices = Vec::new();
        for _ in 0..6 {
            if let Some(StreamEvent::Combined(frame)) = next_frame(&mut sub).await.as_deref() {
                indices.push(frame.current_index);
            }
        }
        assert_eq!(indices, vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(engine.status().await.cursor, start_cursor);
    }

    #[tokio::test(start_paused = true)]
    async fn double_start_keeps_a_single_task() {
        let engine = SimulationEngine::new(records(5), settings());
        let mut sub = engine.subscribe().await;

        let first = engine.start().await;
        let second = engine.start().await;
        assert!(first.is_ok_and(|o| o.accepted && o.running));
        assert!(second.is_ok_and(|o| !o.accepted && o.running));
        assert!(task_is_present(&engine).await);

        // Three periods produce three frames, not six.
        tokio::time::sleep(Duration::from_millis(3500)).await;
        let mut frames = 0;
        while let Some(event) = sub.try_recv() {
            if event.is_frame() {
                frames += 1;
            }
        }
        assert_eq!(frames, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn double_stop_publishes_once_and_leaves_no_task() {
        let engine = SimulationEngine::new(records(2), settings());
        let mut sub = engine.subscribe().await;
        assert!(engine.start().await.is_ok());
        assert!(next_frame(&mut sub).await.is_some());

        let first = engine.stop().await;
        let second = engine.stop().await;
        assert!(!first.running);
        assert!(!second.running);
        assert!(!task_is_present(&engine).await);
        assert!(!engine.status().await.running);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let mut kinds = Vec::new();
        while let Some(event) = sub.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec!["stopped"]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_from_cursor() {
        let engine = SimulationEngine::new(records(5), settings());
        let mut sub = engine.subscribe().await;
        assert!(engine.start().await.is_ok());
        assert!(next_frame(&mut sub).await.is_some());
        assert!(next_frame(&mut sub).await.is_some());
        engine.stop().await;
        assert_eq!(engine.status().await.cursor, 2);

        assert!(engine.start().await.is_ok());
        let frame = next_frame(&mut sub).await;
        assert!(frame.is_some_and(|e| matches!(
            e.as_ref(),
            StreamEvent::Combined(f) if f.current_index == 3 && f.tick == 3
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_replay_runs_fleet_only() {
        let engine = SimulationEngine::new(ReplaySource::empty(), settings());
        let mut sub = engine.subscribe().await;

        let outcome = engine.start().await;
        assert!(outcome.is_ok_and(|o| o.running));
        let status = engine.status().await;
        assert!(status.running);
        assert!(!status.has_data);

        for _ in 0..3 {
            let frame = next_frame(&mut sub).await;
            assert!(frame.is_some_and(|e| matches!(
                e.as_ref(),
                StreamEvent::Panels(f) if f.panels.len() == 30
            )));
        }
        assert_eq!(engine.status().await.cursor, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_mode_refuses_to_start_without_data() {
        let strict = EngineSettings {
            require_replay_data: true,
            ..settings()
        };
        let engine = SimulationEngine::new(ReplaySource::empty(), strict);

        assert_eq!(engine.start().await, Err(EngineError::NoData));
        assert!(!engine.status().await.running);
        assert!(!task_is_present(&engine).await);
    }

    #[tokio::test(start_paused = true)]
    async fn history_window_is_bounded() {
        let windowed = EngineSettings {
            history_window: 3,
            ..settings()
        };
        let engine = SimulationEngine::new(records(10), windowed);
        let mut sub = engine.subscribe().await;
        assert!(engine.start().await.is_ok());
        for _ in 0..5 {
            assert!(next_frame(&mut sub).await.is_some());
        }

        let history = engine.history().await;
        let ticks: Vec<u64> = history.iter().map(|p| p.tick).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
        assert_eq!(history.last().and_then(|p| p.current_index), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_buffers_do_not_panic() {
        let oversized = EngineSettings {
            history_window: usize::MAX,
            channel_capacity: usize::MAX,
            ..settings()
        };
        let engine = SimulationEngine::new(records(2), oversized);
        let mut sub = engine.subscribe().await;
        assert!(engine.start().await.is_ok());
        assert!(next_frame(&mut sub).await.is_some());
        assert_eq!(engine.history().await.len(), 1);
    }

    #[tokio::test]
    async fn sample_requires_data() {
        let empty = SimulationEngine::new(ReplaySource::empty(), settings());
        assert_eq!(empty.sample().err(), Some(EngineError::NoData));

        let loaded = SimulationEngine::new(records(8), settings());
        let sample = loaded.sample();
        assert!(sample.is_ok_and(|s| s.sample_data.len() == 5 && s.total_points == 8));
    }

    #[tokio::test]
    async fn live_panels_match_their_metrics() {
        let engine = SimulationEngine::new(records(1), settings());
        let live = engine.live_panels().await;
        let sum: f64 = live.panels.iter().map(|p| p.power).sum();
        assert_eq!(live.panels.len(), 30);
        assert!((live.metrics.total_power - sum).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_reflects_running_state() {
        let engine = SimulationEngine::new(records(3), settings());
        assert!(engine.start().await.is_ok());

        let mut sub = engine.subscribe().await;
        let first = sub.recv().await;
        assert!(first.is_some_and(|e| matches!(
            e.as_ref(),
            StreamEvent::Connected(c) if c.is_running && c.total_data_points == 3
        )));
        assert_eq!(engine.subscriber_count(), 1);

        assert!(engine.unsubscribe(sub.id()));
        assert!(!engine.unsubscribe(sub.id()));
        assert_eq!(engine.subscriber_count(), 0);
    }
}
