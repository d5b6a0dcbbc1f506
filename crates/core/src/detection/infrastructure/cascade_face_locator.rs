/// Classical face locator: a Haar cascade slid over an image pyramid.
use std::path::Path;

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::config::DetectionConfig;
use crate::shared::frame::Frame;
use crate::shared::region::FaceRegion;

use super::haar_cascade::{CascadeError, HaarCascade};
use super::integral_image::IntegralImage;
use super::math::{collect_groups, similar_regions, union};

/// Relative edge tolerance when clustering raw hits.
const GROUP_EPS: f64 = 0.2;

pub struct CascadeFaceLocator {
    cascade: HaarCascade,
    scale_factor: f64,
    min_neighbors: u32,
    min_size: (u32, u32),
}

impl CascadeFaceLocator {
    pub fn new(cascade: HaarCascade, config: &DetectionConfig) -> Result<Self, CascadeError> {
        if !(config.scale_factor > 1.0) {
            return Err(CascadeError::Invalid(format!(
                "scale factor must be greater than 1.0, got {}",
                config.scale_factor
            )));
        }
        cascade.validate()?;
        Ok(Self {
            cascade,
            scale_factor: config.scale_factor,
            min_neighbors: config.min_neighbors,
            min_size: config.min_size,
        })
    }

    /// Loads the OpenCV cascade XML at `path`; failure here means no session
    /// can start.
    pub fn from_file(path: &Path, config: &DetectionConfig) -> Result<Self, CascadeError> {
        let cascade = HaarCascade::from_file(path)?;
        log::info!(
            "Loaded face cascade {} ({} stages, {}x{} window)",
            path.display(),
            cascade.stages.len(),
            cascade.window_width,
            cascade.window_height
        );
        Self::new(cascade, config)
    }

    fn scan(&self, ii: &IntegralImage) -> Vec<FaceRegion> {
        let mut hits = Vec::new();
        let mut scale = 1.0f64;
        loop {
            let scaled = self.cascade.scaled(scale);
            let (ww, wh) = scaled.window();
            if ww > ii.width() || wh > ii.height() {
                break;
            }
            if ww >= self.min_size.0 as usize && wh >= self.min_size.1 as usize {
                let step = ((scale * 2.0).round() as usize).max(1);
                for y in (0..=ii.height() - wh).step_by(step) {
                    for x in (0..=ii.width() - ww).step_by(step) {
                        if scaled.accepts(ii, x, y) {
                            hits.push(FaceRegion::new(x as i32, y as i32, ww as i32, wh as i32));
                        }
                    }
                }
            }
            scale *= self.scale_factor;
        }
        hits
    }
}

impl FaceLocator for CascadeFaceLocator {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let gray = frame.to_grayscale();
        let ii = IntegralImage::new(&gray, frame.width() as usize, frame.height() as usize);
        let hits = self.scan(&ii);
        Ok(group_regions(&hits, self.min_neighbors))
    }
}

/// Merges overlapping hits into one averaged region per face.
///
/// Clusters with `min_neighbors` or fewer members are dropped, as are
/// clusters lying inside a better-supported one. With `min_neighbors == 0`
/// the raw hits are returned untouched.
pub fn group_regions(hits: &[FaceRegion], min_neighbors: u32) -> Vec<FaceRegion> {
    if min_neighbors == 0 || hits.is_empty() {
        return hits.to_vec();
    }

    let mut parent: Vec<usize> = (0..hits.len()).collect();
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if similar_regions(&hits[i], &hits[j], GROUP_EPS) {
                union(&mut parent, i, j);
            }
        }
    }

    let clusters: Vec<(FaceRegion, usize)> = collect_groups(&mut parent)
        .into_iter()
        .map(|members| (average(hits, &members), members.len()))
        .filter(|&(_, n)| n > min_neighbors as usize)
        .collect();

    clusters
        .iter()
        .enumerate()
        .filter(|&(i, &(r1, n1))| {
            !clusters.iter().enumerate().any(|(j, &(r2, n2))| {
                i != j && contains_with_margin(&r2, &r1) && (n2 > n1.max(3) || n1 < 3)
            })
        })
        .map(|(_, &(r, _))| r)
        .collect()
}

fn average(hits: &[FaceRegion], members: &[usize]) -> FaceRegion {
    let n = members.len() as f64;
    let mut acc = [0f64; 4];
    for &m in members {
        let r = &hits[m];
        acc[0] += r.x as f64;
        acc[1] += r.y as f64;
        acc[2] += r.width as f64;
        acc[3] += r.height as f64;
    }
    FaceRegion::new(
        (acc[0] / n).round() as i32,
        (acc[1] / n).round() as i32,
        (acc[2] / n).round() as i32,
        (acc[3] / n).round() as i32,
    )
}

/// `inner` fits inside `outer` grown by a fifth of its size.
fn contains_with_margin(outer: &FaceRegion, inner: &FaceRegion) -> bool {
    let dx = (outer.width as f64 * GROUP_EPS).round() as i32;
    let dy = (outer.height as f64 * GROUP_EPS).round() as i32;
    inner.x >= outer.x - dx
        && inner.y >= outer.y - dy
        && inner.x + inner.width <= outer.x + outer.width + dx
        && inner.y + inner.height <= outer.y + outer.height + dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::haar_cascade::tests::{
        center_blob_cascade, face_cascade, paint_face, FACE_CASCADE_XML,
    };
    use tempfile::TempDir;

    fn config(min_neighbors: u32, min_size: (u32, u32)) -> DetectionConfig {
        DetectionConfig {
            cascade_path: None,
            cascade_url: None,
            scale_factor: 1.1,
            min_neighbors,
            min_size,
        }
    }

    fn blob_frame() -> Frame {
        let mut frame = Frame::filled(64, 64, [0, 0, 0], 0);
        let data = frame.data_mut();
        for y in 26..38 {
            for x in 26..38 {
                let i = (y * 64 + x) * 3;
                data[i..i + 3].copy_from_slice(&[255, 255, 255]);
            }
        }
        frame
    }

    #[test]
    fn test_detects_blob_near_center() {
        let mut locator = CascadeFaceLocator::new(center_blob_cascade(), &config(1, (20, 20))).unwrap();
        let faces = locator.detect(&blob_frame()).unwrap();
        assert!(!faces.is_empty());
        assert!(faces.iter().any(|f| {
            let (cx, cy) = f.center();
            (cx - 32).abs() <= 4 && (cy - 32).abs() <= 4
        }));
        for f in &faces {
            assert!(f.is_valid(64, 64, (20, 20)), "{f:?}");
        }
    }

    fn face_frame() -> Frame {
        let mut gray = vec![100u8; 128 * 128];
        paint_face(&mut gray, 128, (40, 40), 2);
        Frame::new(gray, 128, 128, 1, 0)
    }

    #[test]
    fn test_detects_face_from_cascade_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("haarcascade_frontalface_default.xml");
        std::fs::write(&path, FACE_CASCADE_XML).unwrap();
        let mut cfg = config(0, (24, 24));
        cfg.scale_factor = 2.0;

        let mut locator = CascadeFaceLocator::from_file(&path, &cfg).unwrap();
        let faces = locator.detect(&face_frame()).unwrap();
        assert!(faces.contains(&FaceRegion::new(40, 40, 48, 48)), "{faces:?}");
    }

    #[test]
    fn test_face_cascade_ignores_blank_frame() {
        let mut cfg = config(0, (24, 24));
        cfg.scale_factor = 2.0;
        let mut locator = CascadeFaceLocator::new(face_cascade(), &cfg).unwrap();
        let frame = Frame::filled(128, 128, [100, 100, 100], 0);
        assert!(locator.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_inconsistent_cascade() {
        let mut cascade = face_cascade();
        cascade.features.clear();
        assert!(CascadeFaceLocator::new(cascade, &config(1, (20, 20))).is_err());
    }

    #[test]
    fn test_uniform_frame_has_no_faces() {
        let mut locator = CascadeFaceLocator::new(center_blob_cascade(), &config(1, (20, 20))).unwrap();
        let frame = Frame::filled(64, 64, [90, 90, 90], 0);
        assert!(locator.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_min_neighbors_zero_returns_raw_hits() {
        let mut raw = CascadeFaceLocator::new(center_blob_cascade(), &config(0, (20, 20))).unwrap();
        let mut grouped =
            CascadeFaceLocator::new(center_blob_cascade(), &config(1, (20, 20))).unwrap();
        let frame = blob_frame();
        let raw_hits = raw.detect(&frame).unwrap();
        let faces = grouped.detect(&frame).unwrap();
        assert!(raw_hits.len() > faces.len());
    }

    #[test]
    fn test_min_size_skips_small_windows() {
        let mut locator = CascadeFaceLocator::new(center_blob_cascade(), &config(0, (40, 40))).unwrap();
        let faces = locator.detect(&blob_frame()).unwrap();
        assert!(faces.iter().all(|f| f.width >= 40 && f.height >= 40));
    }

    #[test]
    fn test_frame_smaller_than_window() {
        let mut locator = CascadeFaceLocator::new(center_blob_cascade(), &config(1, (20, 20))).unwrap();
        let frame = Frame::filled(16, 16, [0, 0, 0], 0);
        assert!(locator.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_growing_scale_factor() {
        let mut cfg = config(1, (20, 20));
        cfg.scale_factor = 1.0;
        assert!(CascadeFaceLocator::new(center_blob_cascade(), &cfg).is_err());
    }

    #[test]
    fn test_group_regions_averages_cluster() {
        let hits = vec![
            FaceRegion::new(100, 100, 50, 50),
            FaceRegion::new(102, 100, 50, 50),
            FaceRegion::new(104, 102, 50, 50),
            FaceRegion::new(300, 300, 50, 50),
        ];
        let faces = group_regions(&hits, 1);
        assert_eq!(faces, vec![FaceRegion::new(102, 101, 50, 50)]);
    }

    #[test]
    fn test_group_regions_drops_nested_weak_cluster() {
        let mut hits: Vec<FaceRegion> = (0..5).map(|i| FaceRegion::new(100 + i, 100, 80, 80)).collect();
        hits.extend([FaceRegion::new(120, 120, 30, 30), FaceRegion::new(121, 120, 30, 30)]);
        let faces = group_regions(&hits, 1);
        assert_eq!(faces, vec![FaceRegion::new(102, 100, 80, 80)]);
    }
}
