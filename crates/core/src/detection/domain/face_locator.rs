use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

/// Domain interface for locating candidate faces in a frame.
///
/// Output order is the detector's own order and is preserved downstream.
/// Implementations may keep scratch buffers between frames, hence
/// `&mut self`.
pub trait FaceLocator: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>>;
}
