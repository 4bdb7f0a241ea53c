use crate::bus::{BusEvent, RuntimeError};
use crate::config::PollConfig;
use crate::display::{DisplayControl, DisplayError, FrameDisplay};
use crate::frame::{Frame, FrameError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where decoded frames and pipeline events come from.
///
/// Implemented by [`crate::pipeline::RtspPipeline`]; the poll loop only talks
/// to this trait, so it can be driven by a scripted source in tests.
pub trait FrameSource {
    /// Wait up to `timeout` for one decoded frame and lend it to `consume`.
    ///
    /// Returns `Ok(None)` when no frame became available in time. The frame
    /// must not outlive the call; any mapping backing it is released before
    /// this returns.
    fn pull_frame<R>(
        &mut self,
        timeout: Duration,
        consume: impl FnOnce(&Frame<'_>) -> R,
    ) -> Result<Option<R>, FrameError>;

    /// Pop the next pending bus event without blocking
    fn pop_event(&mut self) -> Option<BusEvent>;
}

/// Why the poll loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    /// Quit requested from the display
    UserQuit,
    /// Ctrl+C
    Interrupted,
    /// No frame arrived within the stall timeout
    Stalled(Duration),
    DisplayFailed(String),
    Error(RuntimeError),
}

impl StopReason {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StopReason::Error(_) | StopReason::DisplayFailed(_) | StopReason::Stalled(_)
        )
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        if self.is_error() {
            1
        } else {
            0
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => f.write_str("end of stream"),
            StopReason::UserQuit => f.write_str("quit requested"),
            StopReason::Interrupted => f.write_str("interrupted"),
            StopReason::Stalled(timeout) => write!(f, "no frame received for {timeout:?}"),
            StopReason::DisplayFailed(e) => write!(f, "display failed: {e}"),
            StopReason::Error(e) => write!(f, "{e}"),
        }
    }
}

/// The "keep polling" flag, together with the reason it was cleared
#[derive(Debug, Default)]
pub struct RunState {
    reason: Option<StopReason>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.reason.is_none()
    }

    /// Stop the loop. The first reason wins, except that a pipeline error
    /// replaces a normal termination recorded in the same iteration.
    pub fn stop(&mut self, reason: StopReason) {
        let replace = match &self.reason {
            None => true,
            Some(StopReason::Error(_)) => false,
            Some(_) => matches!(reason, StopReason::Error(_)),
        };
        if replace {
            self.reason = Some(reason);
        }
    }

    pub fn reason(&self) -> Option<&StopReason> {
        self.reason.as_ref()
    }
}

/// Timing of the poll loop
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub pull_timeout: Duration,
    pub idle_backoff: Duration,
    pub stall_timeout: Option<Duration>,
    pub stats_interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollOptions {
    fn from(config: &PollConfig) -> Self {
        Self {
            pull_timeout: config.pull_timeout(),
            idle_backoff: config.idle_backoff(),
            stall_timeout: config.stall_timeout(),
            stats_interval: config.stats_interval(),
        }
    }
}

/// What happened during one iteration of the poll loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Iteration {
    /// A frame was pulled and shown
    pub displayed: bool,
    /// Pull timed out without a frame
    pub timed_out: bool,
    /// Bus events drained after the pull
    pub events: usize,
}

/// Summary returned once the session has been torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: StopReason,
    pub iterations: u64,
    pub frames: u64,
}

struct LoopStats {
    iterations: u64,
    frames: u64,
    skipped: u64,
    resolution: (u32, u32),
    last_frame: Instant,
    window_frames: u64,
    window_start: Instant,
}

impl LoopStats {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            iterations: 0,
            frames: 0,
            skipped: 0,
            resolution: (0, 0),
            last_frame: now,
            window_frames: 0,
            window_start: now,
        }
    }
}

/// Owns everything the viewer needs while it runs: the frame source (and
/// through it the pipeline, sink and bus handles), the run state and the
/// interrupt flag.
///
/// [`Session::run`] consumes the session, so the source is torn down exactly
/// once when the loop ends, whatever made it stop.
pub struct Session<S: FrameSource> {
    source: S,
    run_state: RunState,
    options: PollOptions,
    interrupt: Option<Arc<AtomicBool>>,
    stats: LoopStats,
}

impl<S: FrameSource> Session<S> {
    pub fn new(source: S, options: PollOptions) -> Self {
        Self {
            source,
            run_state: RunState::new(),
            options,
            interrupt: None,
            stats: LoopStats::new(),
        }
    }

    /// Stop at the next iteration once `flag` is raised
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Run until end of stream, pipeline error, quit or interrupt, then tear
    /// the source down.
    pub fn run<D: FrameDisplay + ?Sized>(mut self, display: &mut D) -> SessionReport {
        log::info!(
            "Polling frames (pull timeout {:?}, idle backoff {:?})",
            self.options.pull_timeout,
            self.options.idle_backoff
        );

        let reason = loop {
            if let Some(reason) = self.run_state.reason() {
                break reason.clone();
            }
            if self.interrupted() {
                self.run_state.stop(StopReason::Interrupted);
                continue;
            }
            self.poll_once(display);
        };

        let report = SessionReport {
            reason,
            iterations: self.stats.iterations,
            frames: self.stats.frames,
        };

        log::info!(
            "Stopping after {} iterations, {} frames displayed, {} samples skipped: {}",
            report.iterations,
            report.frames,
            self.stats.skipped,
            report.reason
        );

        // Tears down the source
        drop(self);

        report
    }

    /// One iteration: pull at most one frame, show it, then drain the bus.
    ///
    /// The bus is drained even when the display asked to quit, so errors
    /// posted in the meantime are still reported.
    pub fn poll_once<D: FrameDisplay + ?Sized>(&mut self, display: &mut D) -> Iteration {
        self.stats.iterations += 1;
        let mut iteration = Iteration::default();

        let pulled = self
            .source
            .pull_frame(self.options.pull_timeout, |frame| {
                (display.show(frame), (frame.width, frame.height))
            });

        match pulled {
            Ok(Some((shown, resolution))) => {
                iteration.displayed = true;
                self.record_frame(resolution);
                self.handle_display(shown);
            }
            Ok(None) => {
                iteration.timed_out = true;
                std::thread::sleep(self.options.idle_backoff);
            }
            Err(e) => {
                self.stats.skipped += 1;
                log::warn!("Skipping sample: {}", e);
            }
        }

        iteration.events = self.drain_bus();
        self.check_stall();

        iteration
    }

    /// Handle every pending bus event, in arrival order
    fn drain_bus(&mut self) -> usize {
        let mut drained = 0;
        while let Some(event) = self.source.pop_event() {
            drained += 1;
            match event {
                BusEvent::Error(err) => {
                    log::error!("{}", err);
                    log::error!(
                        "Debugging information: {}",
                        err.debug.as_deref().unwrap_or("none")
                    );
                    self.run_state.stop(StopReason::Error(err));
                }
                BusEvent::EndOfStream => {
                    log::info!("End-Of-Stream reached.");
                    self.run_state.stop(StopReason::EndOfStream);
                }
                BusEvent::Other(kind) => {
                    log::trace!("Ignoring bus message {}", kind);
                }
            }
        }
        drained
    }

    fn handle_display(&mut self, shown: Result<DisplayControl, DisplayError>) {
        match shown {
            Ok(DisplayControl::Continue) => {}
            Ok(DisplayControl::Quit) => {
                log::info!("Quit requested");
                self.run_state.stop(StopReason::UserQuit);
            }
            Err(e) => {
                log::error!("Display failed: {}", e);
                self.run_state.stop(StopReason::DisplayFailed(e.to_string()));
            }
        }
    }

    fn record_frame(&mut self, resolution: (u32, u32)) {
        let stats = &mut self.stats;
        stats.frames += 1;
        stats.window_frames += 1;
        stats.resolution = resolution;
        stats.last_frame = Instant::now();

        let elapsed = stats.window_start.elapsed();
        if elapsed >= self.options.stats_interval {
            log::info!(
                "frame {}, {:.1} fps ({}x{}, {} skipped)",
                stats.frames,
                stats.window_frames as f64 / elapsed.as_secs_f64(),
                stats.resolution.0,
                stats.resolution.1,
                stats.skipped
            );
            stats.window_frames = 0;
            stats.window_start = Instant::now();
        }
    }

    fn check_stall(&mut self) {
        let Some(timeout) = self.options.stall_timeout else {
            return;
        };
        if self.run_state.is_running() && self.stats.last_frame.elapsed() >= timeout {
            log::warn!("No frame received for {:?}, giving up", timeout);
            self.run_state.stop(StopReason::Stalled(timeout));
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
