use thiserror::Error;

/// Errors that can occur while turning a sample into a frame view
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("Sample carries no caps")]
    MissingCaps,
    #[error("Failed to read video info from caps: {0}")]
    InvalidCaps(String),
    #[error("Unsupported pixel format {0}, expected BGR")]
    UnsupportedFormat(String),
    #[error("Sample carries no buffer")]
    MissingBuffer,
    #[error("Failed to map buffer readable")]
    Map,
    #[error("Frame data truncated: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Pixel layout of decoded frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red
    Bgr,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgr => 3,
        }
    }

    /// Caps string the sink negotiates for this format
    pub fn caps(&self) -> &'static str {
        match self {
            PixelFormat::Bgr => "video/x-raw,format=BGR",
        }
    }
}

/// A decoded frame borrowed from the pipeline's buffer pool.
///
/// The pixel slice points straight into the mapped GStreamer buffer and is
/// only valid while the pull that produced it is in progress.
#[derive(Debug)]
pub struct Frame<'a> {
    data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including padding
    pub stride: usize,
    pub format: PixelFormat,
    /// Presentation timestamp in nanoseconds
    pub pts: Option<u64>,
    /// Frame sequence number
    pub sequence: u64,
}

impl<'a> Frame<'a> {
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidCaps(format!(
                "zero-sized frame {width}x{height}"
            )));
        }

        let row_bytes = width as usize * format.bytes_per_pixel();
        if stride < row_bytes {
            return Err(FrameError::InvalidCaps(format!(
                "stride {stride} is smaller than a row of {row_bytes} bytes"
            )));
        }

        // The last row may omit its padding
        let expected = stride * (height as usize - 1) + row_bytes;
        if data.len() < expected {
            return Err(FrameError::Truncated {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            stride,
            format,
            pts: None,
            sequence: 0,
        })
    }

    pub fn with_pts(mut self, pts: Option<u64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.data
    }

    /// Bytes of pixel data in one row, without padding
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Whether rows follow each other without padding
    #[inline]
    pub fn is_packed(&self) -> bool {
        self.stride == self.row_bytes()
    }

    /// Pixel data of row `y`, without padding
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data.get(start..start + self.row_bytes())
    }

    /// Copy the pixels out of the borrowed buffer into a tightly packed vector
    pub fn to_packed(&self) -> Vec<u8> {
        let mut packed = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            if let Some(row) = self.row(y) {
                packed.extend_from_slice(row);
            }
        }
        packed
    }
}

/// Map the buffer of a decoded sample and lend it to `consume` as a [`Frame`].
///
/// The buffer is mapped read-only for exactly the duration of the call; the
/// mapping is released when this function returns, including when `consume`
/// unwinds.
pub fn with_sample_frame<R>(
    sample: &gstreamer::Sample,
    sequence: u64,
    consume: impl FnOnce(&Frame<'_>) -> R,
) -> Result<R, FrameError> {
    let caps = sample.caps().ok_or(FrameError::MissingCaps)?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|e| FrameError::InvalidCaps(e.to_string()))?;

    if info.format() != gstreamer_video::VideoFormat::Bgr {
        return Err(FrameError::UnsupportedFormat(format!("{:?}", info.format())));
    }

    let stride = info
        .stride()
        .first()
        .copied()
        .and_then(|s| usize::try_from(s).ok())
        .ok_or_else(|| FrameError::InvalidCaps("missing plane stride".to_string()))?;

    let buffer = sample.buffer().ok_or(FrameError::MissingBuffer)?;
    let pts = buffer.pts().map(|t| t.nseconds());

    let map = buffer.map_readable().map_err(|_| FrameError::Map)?;

    let frame = Frame::new(
        map.as_slice(),
        info.width(),
        info.height(),
        stride,
        PixelFormat::Bgr,
    )?
    .with_pts(pts)
    .with_sequence(sequence);

    Ok(consume(&frame))
}
