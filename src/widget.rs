//! widget.rs
//!
//! The poller/renderer. A `Widget` performs render cycles (fetch, decode,
//! write); `Widget::start` schedules one every `interval` and hands back a
//! `PollerHandle` that owns the schedule.
//!
//! Cycles are independent tasks. If a fetch outlives the interval the next
//! cycle starts anyway, and whichever cycle resolves last leaves its text
//! on the target.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::config::WidgetConfig;
use crate::error::WidgetError;
use crate::reading::Reading;
use crate::render::{render, RenderedReading};
use crate::source::{HttpSource, ReadingSource};
use crate::target::RenderTarget;

/// Outcome of one scheduled cycle, broadcast to subscribers of the handle.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub poller_id: Uuid,
    /// 1-based tick number that started the cycle.
    pub cycle: u64,
    pub outcome: Result<RenderedReading, WidgetError>,
}

type Clock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Set once by `PollerHandle::stop`. Cycles hold the read side across
/// check-and-render, so `stop` cannot return while a render is in progress.
type StopFlag = Arc<RwLock<bool>>;

fn is_stopped(flag: &RwLock<bool>) -> bool {
    *flag.read().unwrap_or_else(PoisonError::into_inner)
}

fn wall_clock_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

pub struct Widget {
    config: WidgetConfig,
    source: Arc<dyn ReadingSource>,
    target: Arc<dyn RenderTarget>,
    clock: Clock,
}

impl Widget {
    pub fn new(
        config: WidgetConfig,
        source: Arc<dyn ReadingSource>,
        target: Arc<dyn RenderTarget>,
    ) -> Self {
        Self {
            config,
            source,
            target,
            clock: Arc::new(wall_clock_secs),
        }
    }

    /// Build a widget polling the HTTP endpoint named by `config`.
    pub fn http(config: WidgetConfig, target: Arc<dyn RenderTarget>) -> Result<Self, WidgetError> {
        let source = HttpSource::new(&config.base_url, &config.path, config.request_timeout)?;
        Ok(Self::new(config, Arc::new(source), target))
    }

    /// Replace the wall clock (Unix seconds) used for the connectivity flag.
    pub fn with_clock(mut self, clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    /// Fetch and decode the current reading without touching the target.
    pub async fn fetch_reading(&self) -> Result<Reading, WidgetError> {
        let body = self.source.fetch().await?;
        Ok(Reading::from_slice(&body, self.config.defaulting)?)
    }

    /// Write an already decoded reading to the target.
    pub fn render_reading(&self, reading: &Reading) -> Result<RenderedReading, WidgetError> {
        let now = (self.clock)();
        Ok(render(reading, &self.config, now, self.target.as_ref())?)
    }

    /// One full render cycle. On error the target is left untouched.
    pub async fn run_cycle(&self) -> Result<RenderedReading, WidgetError> {
        let reading = self.fetch_reading().await?;
        self.render_reading(&reading)
    }

    /// Start the repeating schedule. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) -> PollerHandle {
        let id = Uuid::new_v4();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (report_tx, _) = broadcast::channel(64);
        let stopped: StopFlag = Arc::new(RwLock::new(false));
        let cycles = Arc::new(AtomicU64::new(0));

        // interval_at panics on a zero period
        let period = self.config.interval.max(Duration::from_millis(1));
        let first_tick = if self.config.fire_immediately {
            Instant::now()
        } else {
            Instant::now() + period
        };

        log::info!(
            "Poller {} started: {} every {:?}",
            id,
            self.source.describe(),
            period
        );

        let widget = Arc::clone(self);
        let mut shutdown = shutdown_tx.subscribe();
        let ticker_shutdown = shutdown_tx.clone();
        let ticker_reports = report_tx.clone();
        let ticker_stopped = Arc::clone(&stopped);
        let ticker_cycles = Arc::clone(&cycles);
        tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if is_stopped(&ticker_stopped) {
                            break;
                        }
                        let cycle = ticker_cycles.fetch_add(1, Ordering::SeqCst) + 1;
                        spawn_cycle(
                            Arc::clone(&widget),
                            id,
                            cycle,
                            ticker_shutdown.subscribe(),
                            Arc::clone(&ticker_stopped),
                            ticker_reports.clone(),
                        );
                    }
                    _ = shutdown.recv() => break,
                }
            }
            log::debug!("Poller {} ticker exited", id);
        });

        PollerHandle {
            id,
            shutdown_tx,
            report_tx,
            stopped,
            cycles,
        }
    }
}

fn spawn_cycle(
    widget: Arc<Widget>,
    poller_id: Uuid,
    cycle: u64,
    mut shutdown: broadcast::Receiver<()>,
    stopped: StopFlag,
    reports: broadcast::Sender<CycleReport>,
) {
    tokio::spawn(async move {
        let fetched = tokio::select! {
            result = widget.fetch_reading() => result,
            _ = shutdown.recv() => return,
        };
        let outcome = {
            let stopped = stopped.read().unwrap_or_else(PoisonError::into_inner);
            if *stopped {
                return;
            }
            fetched.and_then(|reading| widget.render_reading(&reading))
        };
        match &outcome {
            Ok(rendered) => log::debug!("Poller {} cycle {} rendered {:?}", poller_id, cycle, rendered),
            Err(e) => log::error!(
                "Poller {} cycle {}: error fetching data from {}: {}",
                poller_id,
                cycle,
                widget.source.describe(),
                e
            ),
        }

        // No subscribers is the normal case for an unobserved widget.
        let _ = reports.send(CycleReport {
            poller_id,
            cycle,
            outcome,
        });
    });
}

/// Owns a running schedule. Dropping the handle leaves the poller running;
/// call `stop` to end it.
pub struct PollerHandle {
    id: Uuid,
    shutdown_tx: broadcast::Sender<()>,
    report_tx: broadcast::Sender<CycleReport>,
    stopped: StopFlag,
    cycles: Arc<AtomicU64>,
}

impl PollerHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop ticking and drop in-flight fetches. Waits for a render already
    /// in progress; no render happens after this returns.
    pub fn stop(&self) {
        let was_running = {
            let mut stopped = self.stopped.write().unwrap_or_else(PoisonError::into_inner);
            !std::mem::replace(&mut *stopped, true)
        };
        if was_running {
            log::info!("Poller {} stopped after {} cycles", self.id, self.cycles_started());
        }
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        !is_stopped(&self.stopped)
    }

    /// Number of cycles the schedule has started.
    pub fn cycles_started(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Receive a report for every cycle that completes after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<CycleReport> {
        self.report_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use std::sync::{mpsc, Mutex};

    use crate::reading::DefaultingPolicy;
    use crate::render::{ConnectionStatus, Formatting};
    use crate::source::{ScriptedResponse, ScriptedSource, SourceError};
    use crate::target::{ElementMap, TargetError};

    const NOW: f64 = 1_700_000_000.0;

    /// Collects every log record emitted in the test binary. Tests filter by
    /// poller id since the logger is process-global.
    struct CaptureLogger;

    static CAPTURED: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());
    static LOGGER: CaptureLogger = CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            CAPTURED
                .lock()
                .unwrap()
                .push((record.level(), record.args().to_string()));
        }

        fn flush(&self) {}
    }

    fn capture_logs() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Debug);
    }

    fn captured_for(poller_id: Uuid, level: log::Level) -> Vec<String> {
        let id = poller_id.to_string();
        CAPTURED
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, msg)| *l == level && msg.contains(&id))
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Blocks inside the first render until released.
    struct GatedTarget {
        inner: ElementMap,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl RenderTarget for GatedTarget {
        fn has_element(&self, id: &str) -> bool {
            let entered = self.entered.lock().unwrap().take();
            if let Some(entered) = entered {
                let _ = entered.send(());
                let release = self.release.lock().unwrap().take();
                if let Some(release) = release {
                    let _ = release.recv();
                }
            }
            self.inner.has_element(id)
        }

        fn set_text(&self, id: &str, text: &str) -> Result<(), TargetError> {
            self.inner.set_text(id, text)
        }
    }

    fn page() -> Arc<ElementMap> {
        Arc::new(ElementMap::with_elements([
            "heart_rate",
            "spo2",
            "temperature",
            "connection_status",
        ]))
    }

    fn widget(config: WidgetConfig, source: ScriptedSource, target: &Arc<ElementMap>) -> Arc<Widget> {
        let target: Arc<dyn RenderTarget> = target.clone();
        Arc::new(Widget::new(config, Arc::new(source), target).with_clock(|| NOW))
    }

    fn reading(hr: u32, ts: f64) -> ScriptedResponse {
        ScriptedResponse::json(&json!({
            "heart_rate": hr,
            "spo2": 98,
            "temperature": 36.6,
            "_last_ts": ts,
        }))
    }

    #[tokio::test]
    async fn test_cycle_renders_fresh_reading() {
        let target = page();
        let w = widget(
            WidgetConfig::unit_suffixed(),
            ScriptedSource::new().then(reading(72, NOW - 3.0)),
            &target,
        );

        let rendered = w.run_cycle().await.unwrap();

        assert_eq!(rendered.connection, Some(ConnectionStatus::Connected));
        assert_eq!(target.text("heart_rate").as_deref(), Some("72 bpm"));
        assert_eq!(target.text("connection_status").as_deref(), Some("Connected"));
    }

    #[tokio::test]
    async fn test_stale_reading_is_disconnected() {
        let target = page();
        let w = widget(
            WidgetConfig::unit_suffixed(),
            ScriptedSource::new().then(reading(72, NOW - 10.0)),
            &target,
        );

        w.run_cycle().await.unwrap();

        assert_eq!(target.text("connection_status").as_deref(), Some("Disconnected"));
    }

    #[tokio::test]
    async fn test_failed_cycles_leave_target_untouched() {
        let target = page();
        let w = widget(
            WidgetConfig::unit_suffixed(),
            ScriptedSource::new()
                .then(ScriptedResponse::Status(500))
                .then(ScriptedResponse::Body(b"<html>oops".to_vec()))
                .then(ScriptedResponse::NetworkFailure("connection refused".into())),
            &target,
        );

        assert_eq!(
            w.run_cycle().await.unwrap_err(),
            WidgetError::Fetch(SourceError::Status(500))
        );
        assert!(matches!(w.run_cycle().await, Err(WidgetError::Decode(_))));
        assert!(matches!(
            w.run_cycle().await,
            Err(WidgetError::Fetch(SourceError::Network(_)))
        ));
        assert_eq!(target.write_count(), 0);
    }

    #[tokio::test]
    async fn test_second_cycle_overwrites_first() {
        let target = page();
        let w = widget(
            WidgetConfig::raw(),
            ScriptedSource::new()
                .then(reading(72, NOW))
                .then(ScriptedResponse::json(&json!({"spo2": 91}))),
            &target,
        );

        w.run_cycle().await.unwrap();
        w.run_cycle().await.unwrap();

        assert_eq!(target.text("heart_rate").as_deref(), Some("0"));
        assert_eq!(target.text("spo2").as_deref(), Some("91"));
        assert_eq!(target.text("temperature").as_deref(), Some("0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_waits_one_interval() {
        let target = page();
        let source = Arc::new(ScriptedSource::new().then(reading(72, NOW)));
        let target_dyn: Arc<dyn RenderTarget> = target.clone();
        let w = Arc::new(
            Widget::new(WidgetConfig::unit_suffixed(), source.clone(), target_dyn)
                .with_clock(|| NOW),
        );

        let started = Instant::now();
        let handle = w.start();
        let mut reports = handle.subscribe();

        let first = reports.recv().await.unwrap();
        assert_eq!(first.cycle, 1);
        assert_eq!(first.poller_id, handle.id());
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert!(first.outcome.is_ok());

        let second = reports.recv().await.unwrap();
        assert_eq!(second.cycle, 2);
        assert!(started.elapsed() >= Duration::from_millis(10000));
        assert_eq!(source.fetch_count(), 2);

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_the_timer() {
        let target = page();
        let mut config = WidgetConfig::unit_suffixed();
        config.fire_immediately = true;
        let w = widget(
            config,
            ScriptedSource::new()
                .then(ScriptedResponse::Status(503))
                .then(reading(64, NOW)),
            &target,
        );

        let handle = w.start();
        let mut reports = handle.subscribe();

        let first = reports.recv().await.unwrap();
        assert_eq!(first.outcome, Err(WidgetError::Fetch(SourceError::Status(503))));
        let second = reports.recv().await.unwrap();
        assert!(second.outcome.is_ok());
        assert_eq!(target.text("heart_rate").as_deref(), Some("64 bpm"));

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycles_last_resolved_wins() {
        let target = page();
        // Cycle 1 starts at 5s and resolves at 12s; cycle 2 starts at 10s
        // and resolves at 11s.
        let w = widget(
            WidgetConfig::raw(),
            ScriptedSource::new()
                .then_after(Duration::from_secs(7), reading(70, NOW))
                .then_after(Duration::from_secs(1), reading(80, NOW)),
            &target,
        );

        let handle = w.start();
        let mut reports = handle.subscribe();

        let first_done = reports.recv().await.unwrap();
        assert_eq!(first_done.cycle, 2);
        assert_eq!(target.text("heart_rate").as_deref(), Some("80"));

        let second_done = reports.recv().await.unwrap();
        assert_eq!(second_done.cycle, 1);
        assert_eq!(target.text("heart_rate").as_deref(), Some("70"));

        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_schedule_and_in_flight_fetch() {
        let target = page();
        let source = Arc::new(
            ScriptedSource::new().then_after(Duration::from_secs(3), reading(72, NOW)),
        );
        let target_dyn: Arc<dyn RenderTarget> = target.clone();
        let w = Arc::new(Widget::new(WidgetConfig::unit_suffixed(), source.clone(), target_dyn));

        let handle = w.start();
        assert!(handle.is_running());

        // First tick at 5s; its fetch is still pending at 6s.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(source.fetch_count(), 1);
        handle.stop();
        assert!(!handle.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(handle.cycles_started(), 1);
        assert_eq!(target.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_is_logged() {
        capture_logs();
        let target = page();
        let mut config = WidgetConfig::unit_suffixed();
        config.fire_immediately = true;
        let w = widget(config, ScriptedSource::new().then(ScriptedResponse::Status(500)), &target);

        let handle = w.start();
        let mut reports = handle.subscribe();
        let report = reports.recv().await.unwrap();
        handle.stop();

        assert!(report.outcome.is_err());
        let errors = captured_for(handle.id(), log::Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("HTTP error! Status: 500"));
        assert!(errors[0].contains("cycle 1"));
        assert_eq!(target.write_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_waits_for_render_in_progress() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let target = Arc::new(GatedTarget {
            inner: ElementMap::with_elements(["heart_rate", "spo2", "temperature"]),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        let mut config = WidgetConfig::raw();
        config.fire_immediately = true;
        let target_dyn: Arc<dyn RenderTarget> = target.clone();
        let w = Arc::new(
            Widget::new(
                config,
                Arc::new(ScriptedSource::new().then(reading(72, NOW))),
                target_dyn,
            )
            .with_clock(|| NOW),
        );

        let handle = Arc::new(w.start());
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // The cycle is now parked inside render; stop from another thread.
        let stopper = {
            let handle = Arc::clone(&handle);
            let target = Arc::clone(&target);
            std::thread::spawn(move || {
                handle.stop();
                target.inner.write_count()
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!stopper.is_finished());
        release_tx.send(()).unwrap();

        let writes_when_stopped = stopper.join().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(writes_when_stopped, 3);
        assert_eq!(target.inner.write_count(), writes_when_stopped);
    }

    #[tokio::test]
    async fn test_config_and_page_snapshot() {
        let target = page();
        let w = widget(
            WidgetConfig::raw(),
            ScriptedSource::new().then(reading(75, NOW)),
            &target,
        );
        assert_eq!(w.config().formatting, Formatting::Raw);
        assert_eq!(w.config().defaulting, DefaultingPolicy::Falsy);

        w.run_cycle().await.unwrap();

        let snapshot = target.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot["heart_rate"], "75");
        assert_eq!(snapshot["spo2"], "98");
        assert_eq!(snapshot["temperature"], "36.6");
        assert_eq!(snapshot["connection_status"], "");
    }
}
