use crate::bus::BusEvent;
use crate::config::ViewerConfig;
use crate::frame::{self, Frame, FrameError, PixelFormat};
use crate::session::FrameSource;
use gstreamer::prelude::*;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("GStreamer initialization failed: {0}")]
    Init(#[from] gstreamer::glib::Error),
    #[error("RTSP URL must not be empty")]
    EmptyUrl,
    #[error("Failed to create {stage} element '{factory}' (is the plugin installed?)")]
    ElementCreation { stage: StageRole, factory: String },
    #[error("Failed to set property '{property}' on {stage} element: {reason}")]
    Property {
        stage: StageRole,
        property: String,
        reason: String,
    },
    #[error("Failed to add elements to the pipeline: {0}")]
    AddToBin(String),
    #[error("Failed to link {upstream} to {downstream}")]
    Link {
        upstream: StageRole,
        downstream: StageRole,
    },
    #[error("Sink element is not an appsink")]
    SinkType,
    #[error("Pipeline has no bus")]
    MissingBus,
    #[error("GStreamer state change error: {0}")]
    StateChange(#[from] gstreamer::StateChangeError),
}

/// Position of a stage in the fixed topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    Source,
    Depayloader,
    Parser,
    Decoder,
    Converter,
    Sink,
}

impl StageRole {
    /// All roles, upstream first
    pub const ORDER: [StageRole; 6] = [
        StageRole::Source,
        StageRole::Depayloader,
        StageRole::Parser,
        StageRole::Decoder,
        StageRole::Converter,
        StageRole::Sink,
    ];

    /// Element name inside the pipeline
    pub fn element_name(&self) -> &'static str {
        match self {
            StageRole::Source => "source",
            StageRole::Depayloader => "depay",
            StageRole::Parser => "h264parse",
            StageRole::Decoder => "decoder",
            StageRole::Converter => "videoconvert",
            StageRole::Sink => "appsink",
        }
    }

    fn index(&self) -> usize {
        match self {
            StageRole::Source => 0,
            StageRole::Depayloader => 1,
            StageRole::Parser => 2,
            StageRole::Decoder => 3,
            StageRole::Converter => 4,
            StageRole::Sink => 5,
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageRole::Source => "source",
            StageRole::Depayloader => "depayloader",
            StageRole::Parser => "parser",
            StageRole::Decoder => "decoder",
            StageRole::Converter => "converter",
            StageRole::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// Value of a stage property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    UInt(u32),
    Bool(bool),
    /// Caps in their string form, parsed when the stage is configured
    Caps(String),
}

impl PropertyValue {
    fn to_gvalue(&self) -> Result<gstreamer::glib::Value, String> {
        Ok(match self {
            PropertyValue::Str(s) => s.to_value(),
            PropertyValue::UInt(v) => v.to_value(),
            PropertyValue::Bool(b) => b.to_value(),
            PropertyValue::Caps(s) => s
                .parse::<gstreamer::Caps>()
                .map_err(|e| format!("invalid caps '{s}': {e}"))?
                .to_value(),
        })
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) | PropertyValue::Caps(s) => f.write_str(s),
            PropertyValue::UInt(v) => write!(f, "{v}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// One stage of the pipeline: which factory to instantiate and how to set it up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub role: StageRole,
    /// GStreamer factory (capability) name
    pub factory: String,
    pub properties: Vec<(String, PropertyValue)>,
}

impl StageSpec {
    pub fn new(role: StageRole, factory: impl Into<String>) -> Self {
        Self {
            role,
            factory: factory.into(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn create(&self) -> Result<gstreamer::Element, PipelineError> {
        gstreamer::ElementFactory::make(&self.factory)
            .name(self.role.element_name())
            .build()
            .map_err(|_| PipelineError::ElementCreation {
                stage: self.role,
                factory: self.factory.clone(),
            })
    }

    fn configure(&self, element: &gstreamer::Element) -> Result<(), PipelineError> {
        for (name, value) in &self.properties {
            let property_error = |reason: String| PipelineError::Property {
                stage: self.role,
                property: name.clone(),
                reason,
            };

            let pspec = element
                .find_property(name)
                .ok_or_else(|| property_error(format!("'{}' has no such property", self.factory)))?;
            let gvalue = value.to_gvalue().map_err(property_error)?;
            if !gvalue.type_().is_a(pspec.value_type()) {
                return Err(property_error(format!(
                    "expected {}, got {}",
                    pspec.value_type(),
                    gvalue.type_()
                )));
            }

            element.set_property_from_value(name, &gvalue);
            log::debug!(
                "{} ({}): {} = {}",
                self.role.element_name(),
                self.factory,
                name,
                value
            );
        }
        Ok(())
    }
}

/// The fixed six-stage topology:
///
/// ```text
/// rtspsrc -> rtph264depay -> h264parse -> decoder -> videoconvert -> appsink
/// ```
///
/// Stages are kept in an array indexed by [`StageRole`], so there is always
/// exactly one source, one sink, and the order cannot change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    stages: [StageSpec; 6],
}

impl PipelineSpec {
    pub fn rtsp(url: &str, config: &ViewerConfig) -> Result<Self, PipelineError> {
        if url.trim().is_empty() {
            return Err(PipelineError::EmptyUrl);
        }

        let source = StageSpec::new(StageRole::Source, "rtspsrc")
            .property("location", PropertyValue::Str(url.to_string()))
            .property("latency", PropertyValue::UInt(config.source.latency))
            .property(
                "udp-reconnect",
                PropertyValue::Bool(config.source.udp_reconnect),
            );

        // Pull mode: no new-sample signals, and never wait on the clock
        let sink = StageSpec::new(StageRole::Sink, "appsink")
            .property("emit-signals", PropertyValue::Bool(false))
            .property("sync", PropertyValue::Bool(false))
            .property("caps", PropertyValue::Caps(PixelFormat::Bgr.caps().to_string()));

        Ok(Self {
            stages: [
                source,
                StageSpec::new(StageRole::Depayloader, "rtph264depay"),
                StageSpec::new(StageRole::Parser, "h264parse"),
                StageSpec::new(StageRole::Decoder, config.decoder.element_name()),
                StageSpec::new(StageRole::Converter, "videoconvert"),
                sink,
            ],
        })
    }

    /// Replace the stage with the same role
    pub fn with_stage(mut self, stage: StageSpec) -> Self {
        let index = stage.role.index();
        self.stages[index] = stage;
        self
    }

    pub fn stage(&self, role: StageRole) -> &StageSpec {
        &self.stages[role.index()]
    }

    /// Stages in upstream-to-downstream order
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// gst-launch style description, for logging
    pub fn describe(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.factory.as_str())
            .collect::<Vec<_>>()
            .join(" ! ")
    }
}

/// Result of handling one pad-added notification from the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PadLinkOutcome {
    Linked,
    AlreadyLinked,
    Failed(String),
}

/// Link a freshly negotiated source pad to the depayloader's sink pad.
///
/// Only the first compatible pad is linked; later notifications leave the
/// existing link untouched.
pub fn link_source_pad(new_pad: &gstreamer::Pad, depay: &gstreamer::Element) -> PadLinkOutcome {
    let Some(sink_pad) = depay.static_pad("sink") else {
        return PadLinkOutcome::Failed(format!("{} has no sink pad", depay.name()));
    };

    if sink_pad.is_linked() {
        return PadLinkOutcome::AlreadyLinked;
    }

    match new_pad.link(&sink_pad) {
        Ok(_) => PadLinkOutcome::Linked,
        Err(e) => PadLinkOutcome::Failed(format!("{e:?}")),
    }
}

/// A built RTSP pipeline with its sink and bus handles.
///
/// Dropping it sets the pipeline to `Null` before any handle is released.
pub struct RtspPipeline {
    // Field order is release order
    bus: gstreamer::Bus,
    appsink: gstreamer_app::AppSink,
    pipeline: gstreamer::Pipeline,
    sequence: u64,
}

impl RtspPipeline {
    /// Build the pipeline from `spec` without starting it
    pub fn build(spec: &PipelineSpec) -> Result<Self, PipelineError> {
        if !gstreamer::INITIALIZED.load(std::sync::atomic::Ordering::Relaxed) {
            gstreamer::init()?;
        }

        log::debug!("Creating pipeline: {}", spec.describe());

        // Create everything first so a missing plugin is reported before any
        // property is touched
        let elements = spec
            .stages()
            .iter()
            .map(StageSpec::create)
            .collect::<Result<Vec<_>, _>>()?;

        for (stage, element) in spec.stages().iter().zip(&elements) {
            stage.configure(element)?;
        }

        let pipeline = gstreamer::Pipeline::builder()
            .name("rtsp-pipeline")
            .build();
        pipeline
            .add_many(&elements)
            .map_err(|e| PipelineError::AddToBin(e.to_string()))?;

        // The source pad only exists after RTSP negotiation, so only the
        // downstream chain is linked statically
        let roles = &StageRole::ORDER[1..];
        for (i, pair) in elements[1..].windows(2).enumerate() {
            pair[0].link(&pair[1]).map_err(|_| PipelineError::Link {
                upstream: roles[i],
                downstream: roles[i + 1],
            })?;
        }

        let source = &elements[StageRole::Source.index()];
        let depay_weak = elements[StageRole::Depayloader.index()].downgrade();
        source.connect_pad_added(move |src, new_pad| {
            let Some(depay) = depay_weak.upgrade() else {
                return;
            };
            match link_source_pad(new_pad, &depay) {
                PadLinkOutcome::Linked => {
                    log::info!("Linked {}:{} to {}", src.name(), new_pad.name(), depay.name());
                }
                PadLinkOutcome::AlreadyLinked => {
                    log::debug!(
                        "Ignoring pad {}:{}, {} is already linked",
                        src.name(),
                        new_pad.name(),
                        depay.name()
                    );
                }
                PadLinkOutcome::Failed(reason) => {
                    log::warn!(
                        "Failed to link {}:{} to {}: {}",
                        src.name(),
                        new_pad.name(),
                        depay.name(),
                        reason
                    );
                }
            }
        });

        let appsink = elements[StageRole::Sink.index()]
            .clone()
            .dynamic_cast::<gstreamer_app::AppSink>()
            .map_err(|_| PipelineError::SinkType)?;

        let bus = pipeline.bus().ok_or(PipelineError::MissingBus)?;

        Ok(Self {
            bus,
            appsink,
            pipeline,
            sequence: 0,
        })
    }

    /// Build the pipeline and set it to `Playing`.
    ///
    /// Playing takes effect asynchronously; the first frames arrive once the
    /// RTSP handshake and the first keyframe have gone through.
    pub fn launch(spec: &PipelineSpec) -> Result<Self, PipelineError> {
        let pipeline = Self::build(spec)?;
        pipeline.start()?;
        Ok(pipeline)
    }

    pub fn start(&self) -> Result<(), PipelineError> {
        self.pipeline.set_state(gstreamer::State::Playing)?;
        log::info!("Pipeline set to Playing");
        Ok(())
    }

    pub fn pipeline(&self) -> &gstreamer::Pipeline {
        &self.pipeline
    }

    fn close(&self) -> Result<(), PipelineError> {
        self.pipeline.set_state(gstreamer::State::Null)?;
        Ok(())
    }
}

impl FrameSource for RtspPipeline {
    fn pull_frame<R>(
        &mut self,
        timeout: Duration,
        consume: impl FnOnce(&Frame<'_>) -> R,
    ) -> Result<Option<R>, FrameError> {
        let timeout = gstreamer::ClockTime::from_nseconds(
            u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX),
        );
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            return Ok(None);
        };

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        frame::with_sample_frame(&sample, sequence, consume).map(Some)
    }

    fn pop_event(&mut self) -> Option<BusEvent> {
        self.bus.pop().map(|msg| BusEvent::from(&msg))
    }
}

impl Drop for RtspPipeline {
    fn drop(&mut self) {
        match self.close() {
            Ok(()) => log::debug!("Pipeline set to Null"),
            Err(e) => log::error!("Error stopping pipeline: {}", e),
        }
    }
}
