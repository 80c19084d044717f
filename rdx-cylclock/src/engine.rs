//! The runtime that owns one clock and drives it.

use crate::common::{LabelId, MinuteIndex};
use crate::components::ring::{LabelRing, ReplyOutcome};
use crate::components::watcher::{BoundaryWatcher, WatchDecision, WatchState};
use crate::config::ClockConfig;
use crate::error::{ClockError, Result};
use crate::events::{LabelEvent, SystemEvent};
use crate::factory::{GeometryReply, GeometryRequest, MeshFactory, StyleParams, TextMeshFactory};
use crate::rotation::RotationClock;
use crate::scene::composer::ComposerStats;
use crate::scene::{Renderer, SceneComposer, Viewport};
use crate::time::{FrameTicker, RebasedTime, SystemTimeSource, TickEvent, TimeSource};
use crate::worker::{generate_in_place, GeometryWorker, WorkerResponse};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Where a clock is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Initializing,
    Running,
    Destroyed,
}

/// One label as seen from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSnapshot {
    pub id: LabelId,
    pub minute_index: MinuteIndex,
    pub display_text: String,
    /// Angle in the cylinder's own frame.
    pub angle: f64,
    /// Where the label currently appears; 0 is the front.
    pub world_angle: f64,
    pub hidden: bool,
    pub has_mesh: bool,
    pub pending: bool,
}

/// A point-in-time view of a running clock.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSnapshot {
    pub state: ClockState,
    pub now: DateTime<Utc>,
    pub offset_ms: i64,
    pub rotation: f64,
    pub viewport: Viewport,
    pub watch_state: WatchState,
    /// Sorted by minute.
    pub labels: Vec<LabelSnapshot>,
    pub frames: ComposerStats,
    pub disposed_meshes: u64,
}

/// Collaborators a clock can be built with. The defaults are the real clock
/// and the block-text factory.
pub struct ClockOptions {
    pub time_source: Arc<dyn TimeSource>,
    pub factory: Arc<dyn MeshFactory>,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            time_source: Arc::new(SystemTimeSource),
            factory: Arc::new(TextMeshFactory),
        }
    }
}

#[derive(Debug)]
enum Command {
    Resize(Viewport),
    SetTime(DateTime<Utc>),
    ResetTime,
    Snapshot(oneshot::Sender<ClockSnapshot>),
    Destroy(oneshot::Sender<()>),
}

/// A cloneable handle for talking to a clock from anywhere.
#[derive(Clone)]
pub struct ClockHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ClockState>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    label_event_sender: broadcast::Sender<LabelEvent>,
}

impl ClockHandle {
    pub fn state(&self) -> ClockState {
        *self.state_rx.borrow()
    }

    fn send(&self, command: Command) -> Result<()> {
        if self.state() == ClockState::Destroyed {
            return Err(ClockError::NotRunning);
        }
        self.command_tx
            .send(command)
            .map_err(|_| ClockError::NotRunning)
    }

    /// Tells the clock its viewport changed size.
    pub fn resize(&self, viewport: Viewport) -> Result<()> {
        self.send(Command::Resize(viewport))
    }

    /// Moves "now" to `at`. The clock keeps ticking from there at the real
    /// rate, and every label is rebuilt for the new time.
    pub fn set_time(&self, at: DateTime<Utc>) -> Result<()> {
        self.send(Command::SetTime(at))
    }

    /// Goes back to the time source's own time.
    pub fn reset_time(&self) -> Result<()> {
        self.send(Command::ResetTime)
    }

    pub async fn snapshot(&self) -> Result<ClockSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| ClockError::NotRunning)
    }

    /// Tears the clock down and waits until it has released everything.
    /// Calling it again, or on a clock that is already gone, does nothing.
    pub async fn destroy(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.command_tx.send(Command::Destroy(ack_tx)).is_ok() {
            ack_rx.await.ok();
        }
    }

    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    pub fn subscribe_label_events(&self) -> broadcast::Receiver<LabelEvent> {
        self.label_event_sender.subscribe()
    }
}

/// A cylinder clock, built and ready to run.
///
/// Construction validates the config, acquires the renderer, seeds the label
/// ring and starts the geometry worker. [`CylinderClock::run`] then drives
/// the clock until it is destroyed or every [`ClockHandle`] is dropped.
///
/// Must be created from within a Tokio runtime.
pub struct CylinderClock {
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    core: ClockCore,
}

impl CylinderClock {
    pub fn new(
        config: ClockConfig,
        renderer: impl Renderer + 'static,
        viewport: Viewport,
    ) -> Result<Self> {
        Self::with_options(config, renderer, viewport, ClockOptions::default())
    }

    pub fn with_options(
        config: ClockConfig,
        renderer: impl Renderer + 'static,
        viewport: Viewport,
        options: ClockOptions,
    ) -> Result<Self> {
        config.validate()?;
        let mut renderer: Box<dyn Renderer> = Box::new(renderer);
        let mut composer = SceneComposer::new(&config, viewport)?;

        if let Err(err) = renderer.init(viewport.surface_size()) {
            error!("Clock failed to start: {}", err);
            composer.dispose();
            return Err(match err {
                ClockError::RendererInit(_) => err,
                other => ClockError::RendererInit(other.to_string()),
            });
        }

        let (system_event_sender, _) = broadcast::channel(64);
        let (label_event_sender, _) = broadcast::channel(256);
        let (state_tx, _) = watch::channel(ClockState::Initializing);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (worker, worker_rx) = GeometryWorker::spawn(options.factory.clone());

        let mut core = ClockCore {
            time: RebasedTime::new(options.time_source),
            rotation_clock: config.rotation_clock(),
            ring: LabelRing::new(
                config.num_major_markers,
                config.formatter(),
                StyleParams::from_config(&config),
            ),
            watcher: BoundaryWatcher::new(config.poll_interval()),
            next_watch_ms: 0,
            geometry_timeout_ms: config.geometry_timeout().as_millis() as i64,
            composer,
            renderer,
            factory: options.factory,
            worker,
            worker_rx,
            state_tx,
            system_event_sender,
            label_event_sender,
            config: Arc::new(config),
        };
        let now_ms = core.time.now_ms();
        core.reseed(now_ms);
        info!(
            "Cylinder clock ready: {} labels, one turn every {} min.",
            core.ring.len(),
            core.config.num_major_markers
        );

        Ok(Self {
            command_tx,
            command_rx,
            core,
        })
    }

    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            command_tx: self.command_tx.clone(),
            state_rx: self.core.state_tx.subscribe(),
            system_event_sender: self.core.system_event_sender.clone(),
            label_event_sender: self.core.label_event_sender.clone(),
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.core.config
    }

    /// Runs until destroyed or until every handle is gone. The clock is
    /// always destroyed on return.
    pub async fn run(self) -> Result<()> {
        let CylinderClock {
            command_tx,
            command_rx,
            mut core,
        } = self;
        drop(command_tx);
        core.run(command_rx).await
    }

    /// Destroys a clock that was never run.
    pub fn destroy(mut self) {
        self.core.destroy();
    }
}

struct ClockCore {
    config: Arc<ClockConfig>,
    time: RebasedTime,
    rotation_clock: RotationClock,
    ring: LabelRing,
    watcher: BoundaryWatcher,
    /// Clock time at which the watcher next wants polling.
    next_watch_ms: i64,
    geometry_timeout_ms: i64,
    composer: SceneComposer,
    renderer: Box<dyn Renderer>,
    factory: Arc<dyn MeshFactory>,
    worker: GeometryWorker,
    worker_rx: mpsc::UnboundedReceiver<WorkerResponse>,
    state_tx: watch::Sender<ClockState>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    label_event_sender: broadcast::Sender<LabelEvent>,
}

impl ClockCore {
    fn state(&self) -> ClockState {
        *self.state_tx.borrow()
    }

    async fn run(&mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) -> Result<()> {
        if self.state() != ClockState::Initializing {
            return Err(ClockError::NotRunning);
        }
        let (shutdown_tx, _) = broadcast::channel(1);
        let (tick_tx, mut tick_rx) = broadcast::channel::<Arc<TickEvent>>(16);
        let ticker = FrameTicker::new(self.config.max_refresh_rate_hz, tick_tx);
        let ticker_task = tokio::spawn(ticker.run(shutdown_tx.subscribe()));

        self.state_tx.send_replace(ClockState::Running);
        self.system_event_sender
            .send(SystemEvent::ClockStarted {
                timestamp: Instant::now(),
            })
            .ok();
        info!("Cylinder clock running.");

        loop {
            let wake_at = self.watch_deadline();
            tokio::select! {
                biased;
                command = command_rx.recv() => match command {
                    Some(Command::Destroy(ack)) => {
                        self.destroy();
                        ack.send(()).ok();
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        info!("Every clock handle is gone; stopping.");
                        break;
                    }
                },
                Some(response) = self.worker_rx.recv() => {
                    self.apply_reply(GeometryReply::from(response));
                }
                _ = tokio::time::sleep_until(wake_at) => self.on_watch_wake(),
                tick = tick_rx.recv() => match tick {
                    Ok(tick) => self.on_tick(&tick),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        trace!("Frame loop lagged by {} ticks.", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        shutdown_tx.send(()).ok();
        ticker_task.await.ok();
        self.destroy();
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        if self.state() != ClockState::Running {
            debug!("Ignoring {:?}: clock is not running.", command);
            return;
        }
        match command {
            Command::Resize(viewport) => {
                if let Some(size) = self.composer.resize(viewport) {
                    self.renderer.resize(size);
                    self.system_event_sender
                        .send(SystemEvent::Resized {
                            width: viewport.width,
                            height: viewport.height,
                        })
                        .ok();
                }
            }
            Command::SetTime(at) => {
                let jump_ms = self.time.set_time(&at);
                self.on_rebased(jump_ms);
            }
            Command::ResetTime => {
                let jump_ms = self.time.reset();
                info!("Clock back on its own time (jump of {} ms).", jump_ms);
                self.on_rebased(jump_ms);
            }
            Command::Snapshot(reply) => {
                reply.send(self.snapshot()).ok();
            }
            Command::Destroy(ack) => {
                self.destroy();
                ack.send(()).ok();
            }
        }
    }

    fn on_rebased(&mut self, jump_ms: i64) {
        let now_ms = self.time.now_ms();
        self.reseed(now_ms);
        self.system_event_sender
            .send(SystemEvent::TimeRebased {
                jump_ms,
                offset_ms: self.time.offset_ms(),
            })
            .ok();
    }

    fn watch_deadline(&self) -> Instant {
        let wait_ms = (self.next_watch_ms - self.time.now_ms()).max(0);
        Instant::now() + Duration::from_millis(wait_ms as u64)
    }

    fn on_tick(&mut self, tick: &TickEvent) {
        if self.state() != ClockState::Running {
            return;
        }
        let rotation = self.rotation_clock.angle_at(self.time.now_ms());
        if let Err(err) =
            self.composer
                .render_frame(tick.timestamp, rotation, &self.ring, self.renderer.as_mut())
        {
            warn!("Frame {} dropped: {}", tick.tick_count, err);
        }
    }

    fn on_watch_wake(&mut self) {
        if self.state() != ClockState::Running {
            return;
        }
        let now_ms = self.time.now_ms();
        match self.watcher.poll(now_ms, self.ring.oldest_is_hidden(now_ms)) {
            WatchDecision::Idle => {}
            WatchDecision::Replace => self.replace_oldest(now_ms),
            WatchDecision::Reseed => self.reseed(now_ms),
        }
        self.rebuild_overdue(now_ms);
        self.next_watch_ms = self.watcher.next_wake_ms(now_ms);
    }

    /// Rebuilds every label for `now_ms` and starts watching afresh.
    fn reseed(&mut self, now_ms: i64) {
        let rotation = self.rotation_clock.angle_at(now_ms);
        let requests = self.ring.seed(now_ms, rotation);
        self.watcher.reset();
        self.next_watch_ms = now_ms;
        self.label_event_sender
            .send(LabelEvent::RingSeeded {
                minutes: self.ring.minute_indices(),
            })
            .ok();
        for request in requests {
            self.dispatch(request);
        }
    }

    fn replace_oldest(&mut self, now_ms: i64) {
        let Some((label, retired)) = self.ring.oldest().map(|(id, l)| (id, l.minute_index)) else {
            return;
        };
        let rotation = self.rotation_clock.angle_at(now_ms);
        let Some(request) = self.ring.advance_oldest(now_ms, rotation) else {
            return;
        };
        info!(
            "Minute {} retired; label now shows '{}'.",
            retired, request.display_text
        );
        self.label_event_sender
            .send(LabelEvent::Reassigned {
                label,
                retired,
                minute_index: request.minute_index,
                display_text: request.display_text.clone(),
            })
            .ok();
        self.dispatch(request);
    }

    fn dispatch(&mut self, request: GeometryRequest) {
        if let Err(err) = self.worker.request(request.clone()) {
            warn!("{}; building {} in place.", err, request.minute_index);
            let reply = generate_in_place(self.factory.as_ref(), &request);
            self.apply_reply(reply);
        }
    }

    fn rebuild_overdue(&mut self, now_ms: i64) {
        for request in self.ring.reissue_overdue(now_ms, self.geometry_timeout_ms) {
            warn!(
                "Geometry for {} took longer than {} ms; building it in place.",
                request.minute_index, self.geometry_timeout_ms
            );
            self.label_event_sender
                .send(LabelEvent::GeometryTimedOut {
                    minute_index: request.minute_index,
                    request_id: request.request_id,
                })
                .ok();
            let reply = generate_in_place(self.factory.as_ref(), &request);
            self.apply_reply(reply);
        }
    }

    fn apply_reply(&mut self, reply: GeometryReply) {
        if self.state() == ClockState::Destroyed {
            return;
        }
        let event = match self.ring.apply_reply(reply) {
            ReplyOutcome::Installed {
                label,
                minute_index,
                request_id,
            } => {
                let vertex_count = self
                    .ring
                    .get(label)
                    .map_or(0, |l| l.mesh.geometry.vertex_count());
                debug!("{} installed for {} ({} vertices).", request_id, minute_index, vertex_count);
                LabelEvent::GeometryInstalled {
                    minute_index,
                    request_id,
                    vertex_count,
                }
            }
            ReplyOutcome::Superseded {
                minute_index,
                request_id,
            } => LabelEvent::GeometryDiscarded {
                minute_index,
                request_id,
            },
            ReplyOutcome::Failed(err) => {
                warn!("Keeping the previous mesh: {}", err);
                LabelEvent::GeometryFailed {
                    minute_index: err.minute_index,
                    request_id: err.request_id,
                    message: err.message,
                }
            }
        };
        self.label_event_sender.send(event).ok();
    }

    fn snapshot(&self) -> ClockSnapshot {
        let now_ms = self.time.now_ms();
        let rotation = self.rotation_clock.angle_at(now_ms);
        let cycle = self.rotation_clock.cycle_duration_ms();
        let mut labels: Vec<LabelSnapshot> = self
            .ring
            .labels()
            .map(|(id, label)| {
                let world_angle =
                    crate::angle::world_angle_for_minute(label.minute_index, cycle, now_ms);
                LabelSnapshot {
                    id,
                    minute_index: label.minute_index,
                    display_text: label.display_text.clone(),
                    angle: label.angle,
                    world_angle,
                    hidden: crate::angle::is_in_hidden_zone(world_angle),
                    has_mesh: label.mesh.source.is_some(),
                    pending: label.pending.is_some(),
                }
            })
            .collect();
        labels.sort_by_key(|l| l.minute_index);

        ClockSnapshot {
            state: self.state(),
            now: self.time.now(),
            offset_ms: self.time.offset_ms(),
            rotation,
            viewport: self.composer.viewport(),
            watch_state: self.watcher.state(),
            labels,
            frames: self.composer.stats(),
            disposed_meshes: self.ring.disposed_meshes(),
        }
    }

    /// Releases everything exactly once.
    fn destroy(&mut self) {
        if self.state() == ClockState::Destroyed {
            return;
        }
        self.state_tx.send_replace(ClockState::Destroyed);
        let labels = self.ring.dispose_all();
        let fixed = self.composer.dispose();
        self.renderer.dispose();
        self.worker.terminate();
        info!(
            "Cylinder clock destroyed: released {} label meshes and {} fixed meshes.",
            labels, fixed
        );
        self.system_event_sender
            .send(SystemEvent::ClockDestroyed)
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::HeadlessRenderer;
    use crate::time::TokioTimeSource;
    use std::sync::Mutex;

    const NOON_MS: i64 = 1_700_049_600_000;

    fn options() -> ClockOptions {
        ClockOptions {
            time_source: Arc::new(TokioTimeSource::starting_at(NOON_MS)),
            factory: Arc::new(TextMeshFactory),
        }
    }

    #[tokio::test]
    async fn renderer_failure_aborts_construction() {
        let result = CylinderClock::with_options(
            ClockConfig::default(),
            HeadlessRenderer::unavailable(),
            Viewport::new(640, 160),
            options(),
        );
        assert!(matches!(result, Err(ClockError::RendererInit(_))));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_anything_starts() {
        let config = ClockConfig {
            num_major_markers: 1,
            ..ClockConfig::default()
        };
        let result = CylinderClock::new(config, HeadlessRenderer::new(), Viewport::new(1, 1));
        assert!(matches!(result, Err(ClockError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn destroying_an_unrun_clock_disposes_the_renderer_once() {
        let renderer = Arc::new(Mutex::new(HeadlessRenderer::new()));
        let clock = CylinderClock::with_options(
            ClockConfig::default(),
            renderer.clone(),
            Viewport::new(640, 160),
            options(),
        )
        .unwrap();
        let handle = clock.handle();
        assert_eq!(handle.state(), ClockState::Initializing);
        clock.destroy();
        assert_eq!(handle.state(), ClockState::Destroyed);
        assert_eq!(renderer.lock().unwrap().stats().disposed, 1);
        handle.destroy().await;
        assert!(matches!(handle.resize(Viewport::new(10, 10)), Err(ClockError::NotRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn set_time_rebuilds_the_ring_around_the_new_now() {
        let clock = CylinderClock::with_options(
            ClockConfig::default(),
            HeadlessRenderer::new(),
            Viewport::new(640, 160),
            options(),
        )
        .unwrap();
        let handle = clock.handle();
        let task = tokio::spawn(clock.run());

        let target = DateTime::from_timestamp_millis(NOON_MS + 5 * 3_600_000 + 42_000).unwrap();
        handle.set_time(target).unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, ClockState::Running);
        assert!((snapshot.offset_ms - (5 * 3_600_000 + 42_000)).abs() < 1_000);

        let minutes: Vec<i64> = snapshot.labels.iter().map(|l| l.minute_index.0).collect();
        let current = MinuteIndex::containing(target.timestamp_millis()).0;
        assert!(minutes.contains(&current), "{minutes:?} misses {current}");
        assert!(minutes.windows(2).all(|w| w[1] == w[0] + 1));

        handle.destroy().await;
        task.await.unwrap().unwrap();
        assert_eq!(handle.state(), ClockState::Destroyed);
    }
}
