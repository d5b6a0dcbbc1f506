use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{FrameSource, SourceInfo};

/// Plays a single image, or every image in a directory in file-name order.
pub struct ImageSequenceSource {
    path: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub fn is_image_path(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn list_images(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && Self::is_image_path(p))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        self.files = if self.path.is_dir() {
            Self::list_images(&self.path)?
        } else if self.path.is_file() {
            vec![self.path.clone()]
        } else {
            return Err(format!("no such image or directory: {}", self.path.display()).into());
        };
        self.cursor = 0;

        let first = self
            .files
            .first()
            .ok_or_else(|| format!("no images in {}", self.path.display()))?;
        let (width, height) = image::image_dimensions(first)?;

        Ok(SourceInfo {
            width,
            height,
            fps: 0.0,
            total_frames: Some(self.files.len()),
            description: self.path.display().to_string(),
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let img = image::open(path)
            .map_err(|e| format!("failed to decode {}: {e}", path.display()))?
            .to_rgb8();
        let frame = Frame::from_rgb_image(img, self.cursor);
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }
}
