//! Scripted frame source and display for driving the poll loop without GStreamer

#![allow(dead_code)]

use rtsp_viewer::bus::BusEvent;
use rtsp_viewer::display::{DisplayControl, DisplayError, FrameDisplay};
use rtsp_viewer::frame::{Frame, FrameError, PixelFormat};
use rtsp_viewer::session::{FrameSource, PollOptions};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the source produces on one pull
#[derive(Debug, Clone)]
pub enum Pull {
    Frame { width: u32, height: u32 },
    Timeout,
    Malformed,
}

/// One scripted iteration: the pull result plus the bus events that arrive
/// while the pull is in progress
#[derive(Debug, Clone)]
pub struct Step {
    pub pull: Pull,
    pub events: Vec<BusEvent>,
}

impl Step {
    pub fn frame() -> Self {
        Self {
            pull: Pull::Frame {
                width: 4,
                height: 2,
            },
            events: Vec::new(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            pull: Pull::Timeout,
            events: Vec::new(),
        }
    }

    pub fn malformed() -> Self {
        Self {
            pull: Pull::Malformed,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: BusEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Counters shared between a test and the source it handed to a session
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub pulls: Arc<AtomicUsize>,
    pub teardowns: Arc<AtomicUsize>,
    pub mapped: Arc<AtomicBool>,
    pub pending: Arc<AtomicUsize>,
}

impl Counters {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Marks the frame buffer as mapped while alive
struct MapGuard<'a>(&'a AtomicBool);

impl<'a> MapGuard<'a> {
    fn map(flag: &'a AtomicBool) -> Self {
        assert!(
            !flag.swap(true, Ordering::SeqCst),
            "buffer mapped twice, previous frame was not released"
        );
        Self(flag)
    }
}

impl Drop for MapGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Frame source that plays back a script, then times out forever
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    events: VecDeque<BusEvent>,
    pixels: Vec<u8>,
    sequence: u64,
    counters: Counters,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> (Self, Counters) {
        let counters = Counters::default();
        let source = Self {
            steps: steps.into(),
            events: VecDeque::new(),
            pixels: Vec::new(),
            sequence: 0,
            counters: counters.clone(),
        };
        (source, counters)
    }

    fn sync_pending(&self) {
        self.counters.pending.store(self.events.len(), Ordering::SeqCst);
    }
}

impl FrameSource for ScriptedSource {
    fn pull_frame<R>(
        &mut self,
        _timeout: Duration,
        consume: impl FnOnce(&Frame<'_>) -> R,
    ) -> Result<Option<R>, FrameError> {
        self.counters.pulls.fetch_add(1, Ordering::SeqCst);

        let Some(step) = self.steps.pop_front() else {
            return Ok(None);
        };
        self.events.extend(step.events);
        self.sync_pending();

        match step.pull {
            Pull::Timeout => Ok(None),
            Pull::Malformed => Err(FrameError::MissingCaps),
            Pull::Frame { width, height } => {
                let size = (width * height * 3) as usize;
                self.pixels.resize(size, 0x80);

                let _guard = MapGuard::map(&self.counters.mapped);
                let frame = Frame::new(
                    &self.pixels,
                    width,
                    height,
                    (width * 3) as usize,
                    PixelFormat::Bgr,
                )?
                .with_sequence(self.sequence);
                self.sequence += 1;
                Ok(Some(consume(&frame)))
            }
        }
    }

    fn pop_event(&mut self) -> Option<BusEvent> {
        let event = self.events.pop_front();
        self.sync_pending();
        event
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.counters.teardowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// What the scripted display does when shown its n-th frame
#[derive(Debug, Clone, Copy)]
pub enum Reaction {
    Continue,
    Quit,
    Fail,
}

/// Display that follows a script of reactions, then continues
pub struct ScriptedDisplay {
    reactions: VecDeque<Reaction>,
    mapped: Option<Arc<AtomicBool>>,
    pub shown: Vec<(u32, u32, u64)>,
}

impl ScriptedDisplay {
    pub fn new(reactions: Vec<Reaction>) -> Self {
        Self {
            reactions: reactions.into(),
            mapped: None,
            shown: Vec::new(),
        }
    }

    pub fn continuing() -> Self {
        Self::new(Vec::new())
    }

    /// Assert that every frame is shown while its buffer is mapped
    pub fn watching(mut self, counters: &Counters) -> Self {
        self.mapped = Some(counters.mapped.clone());
        self
    }
}

impl FrameDisplay for ScriptedDisplay {
    fn show(&mut self, frame: &Frame<'_>) -> Result<DisplayControl, DisplayError> {
        if let Some(mapped) = &self.mapped {
            assert!(
                mapped.load(Ordering::SeqCst),
                "frame shown after its buffer was released"
            );
        }
        self.shown.push((frame.width, frame.height, frame.sequence));

        match self.reactions.pop_front().unwrap_or(Reaction::Continue) {
            Reaction::Continue => Ok(DisplayControl::Continue),
            Reaction::Quit => Ok(DisplayControl::Quit),
            Reaction::Fail => Err(DisplayError::Backend("window closed".to_string())),
        }
    }
}

/// Poll options that keep tests fast
pub fn fast_options() -> PollOptions {
    PollOptions {
        pull_timeout: Duration::from_millis(1),
        idle_backoff: Duration::from_millis(1),
        stall_timeout: None,
        stats_interval: Duration::from_secs(60),
    }
}
