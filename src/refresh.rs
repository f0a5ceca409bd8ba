use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::encoder::{EncodedFrame, FrameEncoder};
use crate::options::MatrixConfig;
use crate::swap::FrontBuffer;
use crate::telemetry::{LogTelemetry, RefreshTelemetry};
use crate::{Canvas, PanelSink};

const MEASURE_WINDOW: Duration = Duration::from_secs(1);

/// Lifecycle of a [`RefreshLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    Stopped,
    Running,
    /// Stop requested; the current frame and the blanking frame are still
    /// being emitted.
    Stopping,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
            Self::Stopping => 2,
        }
    }
}

/// Invalid lifecycle transitions and worker failures.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("refresh loop is already running")]
    AlreadyRunning,
    #[error("refresh loop is not running")]
    NotRunning,
    #[error("refresh thread panicked; the panel sink is lost")]
    WorkerPanicked,
    #[error("the panel sink was lost with an earlier refresh thread")]
    SinkLost,
    #[error("failed to spawn refresh thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[cfg(target_os = "espidf")]
    #[error("failed to configure the refresh task: {0}")]
    Task(#[from] esp_idf_svc::sys::EspError),
}

/// Counters of a [`RefreshLoop`], cumulative over its lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    /// Frames of front buffer content emitted completely.
    pub frames_emitted: u64,
    /// Frames abandoned because the sink failed.
    pub frames_dropped: u64,
}

#[derive(Debug, Default)]
struct Shared {
    stop: AtomicBool,
    state: AtomicU8,
    frames_emitted: AtomicU64,
    frames_dropped: AtomicU64,
}

impl Shared {
    fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Read-only view of a [`RefreshLoop`]'s state from any thread.
///
/// [`RefreshLoop::stop`] holds the loop mutably until the panel is blank, so
/// this is the only way to see [`LoopState::Stopping`].
#[derive(Debug, Clone)]
pub struct StateWatch {
    shared: Arc<Shared>,
}

impl StateWatch {
    pub fn get(&self) -> LoopState {
        self.shared.state()
    }
}

/// What the worker thread owns while running and hands back on exit.
struct Parts<S> {
    sink: S,
    telemetry: Box<dyn RefreshTelemetry>,
}

/// Continuously emits the front canvas to a [`PanelSink`] on its own thread.
///
/// Each cycle snapshots the front buffer, encodes it (reusing the last
/// encoding while the front is unchanged), emits every segment and then
/// waits out the rest of the frame period. A failing sink costs one frame;
/// the loop logs the error and carries on with the next cycle.
///
/// Stopping is only observed between frames. The frame in flight is always
/// completed and followed by a blank frame so no LED stays lit.
///
/// On ESP-IDF the thread runs as a high priority FreeRTOS task, pinned to the
/// second core on dual-core chips, so refresh is not starved by application
/// or network tasks. Elsewhere it is an ordinary thread at the default OS
/// priority.
pub struct RefreshLoop<S: PanelSink + Send + 'static> {
    config: MatrixConfig,
    front: FrontBuffer,
    shared: Arc<Shared>,
    parts: Option<Parts<S>>,
    worker: Option<JoinHandle<Parts<S>>>,
}

impl<S: PanelSink + Send + 'static> RefreshLoop<S> {
    /// A stopped loop reporting refresh rates through [`LogTelemetry`].
    pub fn new(config: MatrixConfig, front: FrontBuffer, sink: S) -> Self {
        Self {
            config,
            front,
            shared: Arc::new(Shared::default()),
            parts: Some(Parts {
                sink,
                telemetry: Box::new(LogTelemetry),
            }),
            worker: None,
        }
    }

    /// Replace the refresh rate collaborator.
    pub fn with_telemetry(mut self, telemetry: impl RefreshTelemetry + 'static) -> Self {
        if let Some(parts) = &mut self.parts {
            parts.telemetry = Box::new(telemetry);
        }
        self
    }

    pub fn state(&self) -> LoopState {
        self.shared.state()
    }

    /// A handle that reads the state while another thread drives the loop.
    pub fn state_watch(&self) -> StateWatch {
        StateWatch {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            frames_emitted: self.shared.frames_emitted.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
        }
    }

    /// The sink, while the loop is stopped.
    pub fn sink(&self) -> Option<&S> {
        self.parts.as_ref().map(|parts| &parts.sink)
    }

    /// Stop the loop if needed and take the sink back.
    pub fn into_sink(mut self) -> Option<S> {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                log::error!("Refresh loop did not stop cleanly: {e}");
            }
        }
        self.parts.take().map(|parts| parts.sink)
    }

    /// Spawn the refresh thread.
    pub fn start(&mut self) -> Result<(), StateError> {
        if self.worker.is_some() {
            return Err(StateError::AlreadyRunning);
        }
        let parts = self.parts.take().ok_or(StateError::SinkLost)?;

        log::info!(
            "Starting refresh: {}x{} pixels, {} scan rows, {} PWM bits, frame period {:?} (max {:.1} Hz)",
            self.config.width(),
            self.config.height(),
            self.config.scan_rows(),
            self.config.pwm_bits(),
            self.config.frame_period(),
            self.config.max_refresh_hz(),
        );

        self.shared.stop.store(false, Ordering::Release);
        self.shared.set_state(LoopState::Running);

        let worker = Worker {
            encoder: FrameEncoder::new(&self.config),
            front: self.front.clone(),
            shared: Arc::clone(&self.shared),
            period: self.config.frame_period(),
            show_refresh_rate: self.config.show_refresh_rate(),
        };
        #[cfg(target_os = "espidf")]
        let task = match task::RefreshTask::configure() {
            Ok(task) => task,
            Err(e) => {
                self.parts = Some(parts);
                self.shared.set_state(LoopState::Stopped);
                return Err(e.into());
            }
        };
        let spawned = thread::Builder::new()
            .name("matrix-refresh".into())
            .spawn(move || worker.run(parts));
        #[cfg(target_os = "espidf")]
        drop(task);

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The closure, and the sink with it, is gone.
                self.shared.set_state(LoopState::Stopped);
                Err(StateError::Spawn(e))
            }
        }
    }

    /// Request termination and wait until the panel has been blanked.
    pub fn stop(&mut self) -> Result<(), StateError> {
        let worker = self.worker.take().ok_or(StateError::NotRunning)?;

        self.shared.set_state(LoopState::Stopping);
        self.shared.stop.store(true, Ordering::Release);

        let joined = worker.join();
        self.shared.set_state(LoopState::Stopped);

        match joined {
            Ok(parts) => {
                self.parts = Some(parts);
                log::info!("Refresh stopped after {} frames", self.stats().frames_emitted);
                Ok(())
            }
            Err(_) => Err(StateError::WorkerPanicked),
        }
    }
}

impl<S: PanelSink + Send + 'static> Drop for RefreshLoop<S> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.stop() {
                log::error!("Refresh loop did not stop cleanly: {e}");
            }
        }
    }
}

struct Worker {
    encoder: FrameEncoder,
    front: FrontBuffer,
    shared: Arc<Shared>,
    period: Duration,
    show_refresh_rate: bool,
}

impl Worker {
    fn run<S: PanelSink>(mut self, mut parts: Parts<S>) -> Parts<S> {
        let mut shown: Option<(Arc<Canvas>, EncodedFrame)> = None;
        let mut window_start = Instant::now();
        let mut window_frames = 0u32;

        while !self.shared.stop.load(Ordering::Acquire) {
            let cycle_start = Instant::now();

            let canvas = self.front.snapshot();
            if !matches!(&shown, Some((prev, _)) if Arc::ptr_eq(prev, &canvas)) {
                let frame = self.encoder.encode(&canvas);
                shown = Some((canvas, frame));
            }
            let Some((_, frame)) = &shown else {
                continue;
            };

            match emit(&mut parts.sink, frame) {
                Ok(()) => {
                    self.shared.frames_emitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    log::warn!("Dropped frame: {e}");
                    self.shared.frames_dropped.fetch_add(1, Ordering::Relaxed);
                }
            }

            match pace(self.period, cycle_start.elapsed()) {
                Pace::Sleep(rest) => thread::sleep(rest),
                Pace::Yield => thread::yield_now(),
            }

            window_frames += 1;
            let window = window_start.elapsed();
            if self.show_refresh_rate && window >= MEASURE_WINDOW {
                let hz = f64::from(window_frames) / window.as_secs_f64();
                parts.telemetry.report_refresh_rate(hz);
                window_start = Instant::now();
                window_frames = 0;
            }
        }

        let blank = self.encoder.blank_frame();
        if let Err(e) = emit(&mut parts.sink, &blank) {
            log::error!("Failed to blank panel on stop: {e}");
        }

        parts
    }
}

/// What the worker does with the rest of a frame period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pace {
    Sleep(Duration),
    /// The frame overran its period; let other ready tasks run before the
    /// next one.
    Yield,
}

fn pace(period: Duration, elapsed: Duration) -> Pace {
    match period.checked_sub(elapsed) {
        Some(rest) if !rest.is_zero() => Pace::Sleep(rest),
        _ => Pace::Yield,
    }
}

#[cfg(target_os = "espidf")]
mod task {
    use esp_idf_svc::hal::cpu::Core;
    use esp_idf_svc::hal::task::thread::ThreadSpawnConfiguration;
    use esp_idf_svc::sys::EspError;

    /// FreeRTOS priority of the refresh task, above the default of 5 used
    /// by application threads.
    const PRIORITY: u8 = 20;

    /// Spawn settings for the refresh thread, in force until dropped.
    pub(super) struct RefreshTask;

    impl RefreshTask {
        pub(super) fn configure() -> Result<Self, EspError> {
            ThreadSpawnConfiguration {
                priority: PRIORITY,
                pin_to_core: refresh_core(),
                ..Default::default()
            }
            .set()?;
            Ok(Self)
        }
    }

    impl Drop for RefreshTask {
        fn drop(&mut self) {
            if let Err(e) = ThreadSpawnConfiguration::default().set() {
                log::warn!("Failed to restore thread spawn settings: {e}");
            }
        }
    }

    #[cfg(not(esp_idf_freertos_unicore))]
    fn refresh_core() -> Option<Core> {
        Some(Core::Core1)
    }

    #[cfg(esp_idf_freertos_unicore)]
    fn refresh_core() -> Option<Core> {
        None
    }
}

/// Emit one frame. The first sink error abandons the rest of it.
fn emit<S: PanelSink>(sink: &mut S, frame: &EncodedFrame) -> Result<(), S::Error> {
    sink.begin_frame()?;
    for segment in frame.segments() {
        sink.write_segment(&segment)?;
    }
    sink.end_frame()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Segment;
    use test_case::test_case;
    use crate::options::MatrixOptions;
    use crate::swap::DoubleBuffer;

    /// Counts frame boundaries; fails every write while `fail` is set and
    /// takes `write_ms` per write.
    #[derive(Debug, Default, Clone)]
    struct CountingSink {
        begins: Arc<AtomicU64>,
        ends: Arc<AtomicU64>,
        last: Arc<Mutex<Option<&'static str>>>,
        fail: Arc<AtomicBool>,
        panic: Arc<AtomicBool>,
        write_ms: Arc<AtomicU64>,
    }

    impl PanelSink for CountingSink {
        type Error = &'static str;

        fn begin_frame(&mut self) -> Result<(), Self::Error> {
            self.begins.fetch_add(1, Ordering::Relaxed);
            *self.last.lock().unwrap() = Some("begin");
            Ok(())
        }

        fn write_segment(&mut self, _segment: &Segment<'_>) -> Result<(), Self::Error> {
            thread::sleep(Duration::from_millis(self.write_ms.load(Ordering::Relaxed)));
            if self.panic.load(Ordering::Relaxed) {
                panic!("sink driver crashed");
            }
            if self.fail.load(Ordering::Relaxed) {
                return Err("bus fault");
            }
            *self.last.lock().unwrap() = Some("segment");
            Ok(())
        }

        fn end_frame(&mut self) -> Result<(), Self::Error> {
            self.ends.fetch_add(1, Ordering::Relaxed);
            *self.last.lock().unwrap() = Some("end");
            Ok(())
        }
    }

    struct Rates(Arc<Mutex<Vec<f64>>>);

    impl RefreshTelemetry for Rates {
        fn report_refresh_rate(&mut self, hz: f64) {
            self.0.lock().unwrap().push(hz);
        }
    }

    fn setup(show_refresh_rate: bool) -> (DoubleBuffer, RefreshLoop<CountingSink>, CountingSink) {
        let config = MatrixOptions {
            rows: 8,
            cols: 8,
            pwm_bits: 2,
            show_refresh_rate,
            ..MatrixOptions::default()
        }
        .validate()
        .expect("valid");
        let buffers = DoubleBuffer::new(&config);
        let sink = CountingSink::default();
        let refresh = RefreshLoop::new(config, buffers.front_handle(), sink.clone());
        (buffers, refresh, sink)
    }

    fn wait_for(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn lifecycle_transitions() {
        let (_buffers, mut refresh, _sink) = setup(false);
        assert_eq!(refresh.state(), LoopState::Stopped);

        refresh.start().unwrap();
        assert_eq!(refresh.state(), LoopState::Running);
        assert!(refresh.sink().is_none());

        refresh.stop().unwrap();
        assert_eq!(refresh.state(), LoopState::Stopped);
        assert!(refresh.sink().is_some());
    }

    #[test]
    fn start_twice_fails() {
        let (_buffers, mut refresh, _sink) = setup(false);
        refresh.start().unwrap();

        assert!(matches!(refresh.start(), Err(StateError::AlreadyRunning)));
        assert_eq!(refresh.state(), LoopState::Running);
    }

    #[test]
    fn stop_when_stopped_fails() {
        let (_buffers, mut refresh, _sink) = setup(false);

        assert!(matches!(refresh.stop(), Err(StateError::NotRunning)));
    }

    #[test]
    fn restart_after_stop() {
        let (_buffers, mut refresh, _sink) = setup(false);
        refresh.start().unwrap();
        refresh.stop().unwrap();

        refresh.start().unwrap();
        wait_for(|| refresh.stats().frames_emitted > 0);
        refresh.stop().unwrap();
    }

    #[test]
    fn sink_errors_drop_frames_and_continue() {
        let (_buffers, mut refresh, sink) = setup(false);
        sink.fail.store(true, Ordering::Relaxed);
        refresh.start().unwrap();

        wait_for(|| refresh.stats().frames_dropped >= 3);
        assert_eq!(refresh.state(), LoopState::Running);

        sink.fail.store(false, Ordering::Relaxed);
        wait_for(|| refresh.stats().frames_emitted >= 1);
        refresh.stop().unwrap();
    }

    #[test]
    fn failed_frames_never_end() {
        let (_buffers, mut refresh, sink) = setup(false);
        sink.fail.store(true, Ordering::Relaxed);
        refresh.start().unwrap();
        wait_for(|| refresh.stats().frames_dropped >= 2);
        refresh.stop().unwrap();

        assert!(sink.begins.load(Ordering::Relaxed) >= 2);
        assert_eq!(sink.ends.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn refresh_rate_reported_when_enabled() {
        let (_buffers, refresh, _sink) = setup(true);
        let rates = Arc::new(Mutex::new(Vec::new()));
        let mut refresh = refresh.with_telemetry(Rates(Arc::clone(&rates)));

        refresh.start().unwrap();
        wait_for(|| !rates.lock().unwrap().is_empty());
        refresh.stop().unwrap();

        assert!(rates.lock().unwrap()[0] > 0.0);
    }

    #[test]
    fn drop_stops_running_loop() {
        let (_buffers, mut refresh, sink) = setup(false);
        refresh.start().unwrap();
        wait_for(|| refresh.stats().frames_emitted > 0);

        drop(refresh);

        // The blank frame is the last thing emitted
        assert_eq!(*sink.last.lock().unwrap(), Some("end"));
        assert_eq!(
            sink.ends.load(Ordering::Relaxed),
            sink.begins.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn stopping_is_visible_from_another_thread() {
        let (_buffers, mut refresh, sink) = setup(false);
        sink.write_ms.store(5, Ordering::Relaxed);
        let watch = refresh.state_watch();
        refresh.start().unwrap();
        assert_eq!(watch.get(), LoopState::Running);

        let stopper = thread::spawn(move || refresh.stop().map(|()| refresh));
        wait_for(|| watch.get() == LoopState::Stopping);
        let refresh = stopper.join().unwrap().unwrap();

        assert_eq!(watch.get(), LoopState::Stopped);
        assert_eq!(refresh.state(), LoopState::Stopped);
    }

    #[test]
    fn start_after_worker_panic_reports_lost_sink() {
        let (_buffers, mut refresh, sink) = setup(false);
        sink.panic.store(true, Ordering::Relaxed);
        refresh.start().unwrap();
        wait_for(|| sink.begins.load(Ordering::Relaxed) > 0);

        assert!(matches!(refresh.stop(), Err(StateError::WorkerPanicked)));
        assert_eq!(refresh.state(), LoopState::Stopped);
        assert!(refresh.sink().is_none());
        assert!(matches!(refresh.start(), Err(StateError::SinkLost)));
    }

    #[test_case(10, 4, Pace::Sleep(Duration::from_millis(6)); "time left")]
    #[test_case(10, 10, Pace::Yield; "exactly on time")]
    #[test_case(10, 25, Pace::Yield; "overran")]
    fn pacing_yields_when_the_period_is_used_up(period_ms: u64, elapsed_ms: u64, expected: Pace) {
        assert_eq!(
            pace(Duration::from_millis(period_ms), Duration::from_millis(elapsed_ms)),
            expected
        );
    }
}
