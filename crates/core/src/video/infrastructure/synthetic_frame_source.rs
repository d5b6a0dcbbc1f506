use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;
use crate::video::domain::frame_source::{FrameSource, SourceInfo};

const BACKGROUND: u8 = 64;
const PATCH: u8 = 220;

/// Deterministic test source: uniform gray frames with optional bright
/// rectangles standing in for faces.
///
/// Yields exactly `frame_count` frames. Patches drift right by
/// `drift` pixels per frame, which exercises the position-keyed cooldown.
#[derive(Clone, Debug)]
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    frame_count: usize,
    patches: Vec<FaceRegion>,
    drift: i32,
    fps: f64,
    cursor: Option<usize>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, frame_count: usize) -> Self {
        Self {
            width,
            height,
            frame_count,
            patches: Vec::new(),
            drift: 0,
            fps: 30.0,
            cursor: None,
        }
    }

    pub fn with_patch(mut self, region: FaceRegion) -> Self {
        self.patches.push(region);
        self
    }

    pub fn with_drift(mut self, pixels_per_frame: i32) -> Self {
        self.drift = pixels_per_frame;
        self
    }

    pub fn patches(&self) -> &[FaceRegion] {
        &self.patches
    }

    fn render(&self, index: usize) -> Frame {
        let mut frame = Frame::filled(self.width, self.height, [BACKGROUND; 3], index);
        let (fw, fh) = frame.bounds();
        let shift = self.drift.saturating_mul(index as i32);
        let stride = self.width as usize * 3;
        let data = frame.data_mut();
        for patch in &self.patches {
            let x0 = (patch.x + shift).clamp(0, fw) as usize;
            let x1 = (patch.x + shift + patch.width).clamp(0, fw) as usize;
            let y0 = patch.y.clamp(0, fh) as usize;
            let y1 = (patch.y + patch.height).clamp(0, fh) as usize;
            for row in y0..y1 {
                data[row * stride + x0 * 3..row * stride + x1 * 3].fill(PATCH);
            }
        }
        frame
    }
}

impl FrameSource for SyntheticFrameSource {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        if self.width == 0 || self.height == 0 {
            return Err("synthetic source needs a non-zero resolution".into());
        }
        self.cursor = Some(0);
        Ok(SourceInfo {
            width: self.width,
            height: self.height,
            fps: self.fps,
            total_frames: Some(self.frame_count),
            description: format!(
                "synthetic {}x{} ({} patches)",
                self.width,
                self.height,
                self.patches.len()
            ),
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let index = self.cursor.ok_or("SyntheticFrameSource: not opened")?;
        if index >= self.frame_count {
            return Ok(None);
        }
        self.cursor = Some(index + 1);
        Ok(Some(self.render(index)))
    }

    fn close(&mut self) {
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_exact_frame_count() {
        let mut source = SyntheticFrameSource::new(32, 24, 3);
        let info = source.open().unwrap();
        assert_eq!(info.total_frames, Some(3));

        let mut count = 0;
        while let Some(frame) = source.read().unwrap() {
            assert_eq!(frame.index(), count);
            assert_eq!((frame.width(), frame.height()), (32, 24));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_patch_is_painted_bright() {
        let mut source =
            SyntheticFrameSource::new(20, 20, 1).with_patch(FaceRegion::new(5, 5, 4, 4));
        source.open().unwrap();
        let frame = source.read().unwrap().unwrap();
        let px = |x: usize, y: usize| frame.data()[(y * 20 + x) * 3];
        assert_eq!(px(6, 6), PATCH);
        assert_eq!(px(9, 9), BACKGROUND);
        assert_eq!(px(0, 0), BACKGROUND);
    }

    #[test]
    fn test_drift_moves_patches_and_clips() {
        let mut source = SyntheticFrameSource::new(20, 10, 3)
            .with_patch(FaceRegion::new(12, 0, 4, 4))
            .with_drift(4);
        source.open().unwrap();
        let _ = source.read().unwrap();
        let second = source.read().unwrap().unwrap();
        assert_eq!(second.data()[16 * 3], PATCH);
        assert_eq!(second.data()[12 * 3], BACKGROUND);
        let third = source.read().unwrap().unwrap();
        assert_eq!(third.data()[19 * 3], BACKGROUND);
    }

    #[test]
    fn test_frames_are_deterministic() {
        let mut a = SyntheticFrameSource::new(16, 16, 2).with_patch(FaceRegion::new(2, 2, 6, 6));
        let mut b = a.clone();
        a.open().unwrap();
        b.open().unwrap();
        assert_eq!(a.read().unwrap(), b.read().unwrap());
    }

    #[test]
    fn test_read_before_open_fails() {
        let mut source = SyntheticFrameSource::new(8, 8, 1);
        assert!(source.read().is_err());
    }

    #[test]
    fn test_zero_resolution_fails_to_open() {
        assert!(SyntheticFrameSource::new(0, 8, 1).open().is_err());
    }
}
