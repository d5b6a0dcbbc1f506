use std::path::Path;

use crate::shared::frame::Frame;

/// Writes a single annotated frame to an image file.
pub trait FrameWriter: Send {
    /// Writes `frame` to `path`, optionally resizing to `size`.
    fn write(
        &self,
        path: &Path,
        frame: &Frame,
        size: Option<(u32, u32)>,
    ) -> Result<(), Box<dyn std::error::Error>>;
}
