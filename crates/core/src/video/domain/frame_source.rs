use crate::shared::frame::Frame;

/// What a source reported when it was opened.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Native frame rate, or 0 when the source has none (still images).
    pub fps: f64,
    pub total_frames: Option<usize>,
    pub description: String,
}

/// Supplies frames one at a time to a monitoring session.
///
/// `read` may block on I/O. It returns `Ok(None)` once the source is
/// exhausted; a live source never is.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>>;

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Releases the underlying resource. Safe to call more than once.
    fn close(&mut self);
}
