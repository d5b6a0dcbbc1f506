//! Viola-Jones Haar cascade read from OpenCV's `opencv_storage` XML layout.
//!
//! A cascade is a list of boosted stages. Each stage sums the leaf votes of
//! its weak trees (single-split stumps in the stock frontal face models) and
//! rejects the window when the sum falls below the stage threshold. Tree
//! nodes compare a Haar feature, normalized by window area and standard
//! deviation, against the node threshold.
//!
//! Only `BOOST` stages over upright `HAAR` features are understood. LBP
//! cascades, tilted features and the pre-2.4 `opencv-haar-classifier`
//! layout are rejected as [`CascadeError::Invalid`].
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use thiserror::Error;

use super::integral_image::IntegralImage;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cascade {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
    #[error("invalid cascade: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<HaarRect>,
}

/// Split node of a weak tree.
///
/// A child `> 0` is the index of the next node; a child `<= 0` selects
/// `leaves[-child]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HaarCascade {
    pub window_width: u32,
    pub window_height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<HaarFeature>,
}

/// Feature rectangles resolved to pixel offsets at one detection scale.
struct ScaledFeature {
    rects: Vec<(usize, usize, usize, usize, f64)>,
}

/// The cascade resized for a single window size.
pub struct ScaledCascade<'a> {
    cascade: &'a HaarCascade,
    window: (usize, usize),
    /// Inner window used for mean and deviation, one base pixel in from each edge.
    norm_rect: (usize, usize, usize, usize),
    inv_area: f64,
    features: Vec<ScaledFeature>,
}

impl HaarCascade {
    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let xml = fs::read_to_string(path).map_err(|e| CascadeError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_xml(&xml).map_err(|e| match e {
            CascadeError::Parse { source, .. } => CascadeError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = Document::parse(xml).map_err(|e| CascadeError::Parse {
            path: PathBuf::new(),
            source: e,
        })?;
        let root = doc.root_element();
        if root.tag_name().name() != "opencv_storage" {
            return Err(invalid(format!(
                "expected <opencv_storage>, found <{}>",
                root.tag_name().name()
            )));
        }
        if elements(root).any(|n| n.attribute("type_id") == Some("opencv-haar-classifier")) {
            return Err(invalid(
                "legacy opencv-haar-classifier layout is not supported".into(),
            ));
        }

        let node = child(root, "cascade")?;
        expect_text(node, "stageType", "BOOST")?;
        expect_text(node, "featureType", "HAAR")?;

        let cascade = Self {
            window_width: parse(text(child(node, "width")?))?,
            window_height: parse(text(child(node, "height")?))?,
            stages: elements(child(node, "stages")?)
                .map(parse_stage)
                .collect::<Result<_, _>>()?,
            features: elements(child(node, "features")?)
                .map(parse_feature)
                .collect::<Result<_, _>>()?,
        };
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn validate(&self) -> Result<(), CascadeError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(invalid(format!(
                "window must be non-zero, got {}x{}",
                self.window_width, self.window_height
            )));
        }
        if self.stages.is_empty() {
            return Err(invalid("cascade has no stages".into()));
        }
        for (fi, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return Err(invalid(format!("feature {fi} has no rectangles")));
            }
            for r in &feature.rects {
                if r.width == 0
                    || r.height == 0
                    || r.x + r.width > self.window_width
                    || r.y + r.height > self.window_height
                {
                    return Err(invalid(format!(
                        "feature {fi} rectangle {r:?} lies outside the {}x{} window",
                        self.window_width, self.window_height
                    )));
                }
            }
        }
        for (si, stage) in self.stages.iter().enumerate() {
            if stage.classifiers.is_empty() {
                return Err(invalid(format!("stage {si} has no classifiers")));
            }
            for classifier in &stage.classifiers {
                self.validate_tree(si, classifier)?;
            }
        }
        Ok(())
    }

    /// Children must point forward so evaluation always reaches a leaf.
    fn validate_tree(&self, si: usize, classifier: &WeakClassifier) -> Result<(), CascadeError> {
        if classifier.nodes.is_empty() {
            return Err(invalid(format!("stage {si} has a classifier without nodes")));
        }
        for (ni, node) in classifier.nodes.iter().enumerate() {
            if node.feature >= self.features.len() {
                return Err(invalid(format!(
                    "stage {si} references feature {} of {}",
                    node.feature,
                    self.features.len()
                )));
            }
            for next in [node.left, node.right] {
                let ok = if next <= 0 {
                    (next.unsigned_abs() as usize) < classifier.leaves.len()
                } else {
                    (next as usize) > ni && (next as usize) < classifier.nodes.len()
                };
                if !ok {
                    return Err(invalid(format!(
                        "stage {si} node {ni} has a dangling child {next}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves every feature for a window scaled by `scale`.
    ///
    /// The first rectangle's weight is re-derived so each feature sums to
    /// zero over a uniform patch despite rounding.
    pub fn scaled(&self, scale: f64) -> ScaledCascade<'_> {
        let ww = (self.window_width as f64 * scale).round() as usize;
        let wh = (self.window_height as f64 * scale).round() as usize;
        let border = (scale.round() as usize).max(1);
        let norm_rect = if ww > 2 * border && wh > 2 * border {
            (border, border, ww - 2 * border, wh - 2 * border)
        } else {
            (0, 0, ww.max(1), wh.max(1))
        };
        ScaledCascade {
            cascade: self,
            window: (ww, wh),
            norm_rect,
            inv_area: 1.0 / (norm_rect.2 * norm_rect.3) as f64,
            features: self
                .features
                .iter()
                .map(|f| scale_feature(f, scale, ww, wh))
                .collect(),
        }
    }
}

fn parse_stage(node: Node) -> Result<Stage, CascadeError> {
    Ok(Stage {
        threshold: parse(text(child(node, "stageThreshold")?))?,
        classifiers: elements(child(node, "weakClassifiers")?)
            .map(parse_weak_classifier)
            .collect::<Result<_, _>>()?,
    })
}

/// `internalNodes` holds `left right feature threshold` per node.
fn parse_weak_classifier(node: Node) -> Result<WeakClassifier, CascadeError> {
    let tokens: Vec<&str> = text(child(node, "internalNodes")?)
        .split_whitespace()
        .collect();
    if tokens.is_empty() || tokens.len() % 4 != 0 {
        return Err(invalid(format!(
            "internalNodes must hold groups of 4 values, got {}",
            tokens.len()
        )));
    }
    let nodes = tokens
        .chunks_exact(4)
        .map(|t| -> Result<TreeNode, CascadeError> {
            Ok(TreeNode {
                left: parse(t[0])?,
                right: parse(t[1])?,
                feature: parse(t[2])?,
                threshold: parse(t[3])?,
            })
        })
        .collect::<Result<_, _>>()?;
    Ok(WeakClassifier {
        nodes,
        leaves: numbers(child(node, "leafValues")?)?,
    })
}

fn parse_feature(node: Node) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = elements(node).find(|n| n.tag_name().name() == "tilted") {
        if text(tilted) != "0" {
            return Err(invalid("tilted features are not supported".into()));
        }
    }
    let rects = elements(child(node, "rects")?)
        .map(|r| -> Result<HaarRect, CascadeError> {
            let t: Vec<&str> = text(r).split_whitespace().collect();
            if t.len() != 5 {
                return Err(invalid(format!("rectangle needs 5 values, got {:?}", text(r))));
            }
            Ok(HaarRect {
                x: parse(t[0])?,
                y: parse(t[1])?,
                width: parse(t[2])?,
                height: parse(t[3])?,
                weight: parse(t[4])?,
            })
        })
        .collect::<Result<_, _>>()?;
    Ok(HaarFeature { rects })
}

fn elements<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(Node::is_element)
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>, CascadeError> {
    elements(node)
        .find(|n| n.tag_name().name() == name)
        .ok_or_else(|| invalid(format!("<{}> has no <{name}>", node.tag_name().name())))
}

fn text<'a>(node: Node<'a, '_>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn expect_text(node: Node, name: &str, expected: &str) -> Result<(), CascadeError> {
    let found = text(child(node, name)?);
    if found != expected {
        return Err(invalid(format!("unsupported {name} {found:?}, expected {expected}")));
    }
    Ok(())
}

fn parse<T: FromStr>(token: &str) -> Result<T, CascadeError> {
    token
        .parse()
        .map_err(|_| invalid(format!("malformed value {token:?}")))
}

fn numbers<T: FromStr>(node: Node) -> Result<Vec<T>, CascadeError> {
    text(node).split_whitespace().map(parse).collect()
}

fn invalid(message: String) -> CascadeError {
    CascadeError::Invalid(message)
}

fn scale_feature(f: &HaarFeature, scale: f64, ww: usize, wh: usize) -> ScaledFeature {
    let mut rects: Vec<(usize, usize, usize, usize, f64)> = f
        .rects
        .iter()
        .map(|r| {
            let x = ((r.x as f64 * scale).round() as usize).min(ww.saturating_sub(1));
            let y = ((r.y as f64 * scale).round() as usize).min(wh.saturating_sub(1));
            let w = ((r.width as f64 * scale).round() as usize).clamp(1, ww - x);
            let h = ((r.height as f64 * scale).round() as usize).clamp(1, wh - y);
            (x, y, w, h, r.weight)
        })
        .collect();

    if rects.len() > 1 {
        let area0 = (rects[0].2 * rects[0].3) as f64;
        let rest: f64 = rects[1..]
            .iter()
            .map(|&(_, _, w, h, weight)| weight * (w * h) as f64)
            .sum();
        rects[0].4 = -rest / area0;
    }

    ScaledFeature { rects }
}

impl ScaledFeature {
    fn value(&self, ii: &IntegralImage, x: usize, y: usize) -> f64 {
        self.rects
            .iter()
            .map(|&(rx, ry, rw, rh, weight)| weight * ii.rect_sum(x + rx, y + ry, rw, rh) as f64)
            .sum()
    }
}

impl ScaledCascade<'_> {
    pub fn window(&self) -> (usize, usize) {
        self.window
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// Flat windows use a deviation of 1.
    pub fn accepts(&self, ii: &IntegralImage, x: usize, y: usize) -> bool {
        let (nx, ny, nw, nh) = self.norm_rect;
        let mean = ii.rect_sum(x + nx, y + ny, nw, nh) as f64 * self.inv_area;
        let variance = ii.rect_sq_sum(x + nx, y + ny, nw, nh) as f64 * self.inv_area - mean * mean;
        let std = if variance > 1.0 { variance.sqrt() } else { 1.0 };
        let norm = self.inv_area / std;

        self.cascade.stages.iter().all(|stage| {
            let vote: f64 = stage
                .classifiers
                .iter()
                .map(|c| self.vote(c, ii, x, y, norm))
                .sum();
            vote >= stage.threshold
        })
    }

    fn vote(&self, classifier: &WeakClassifier, ii: &IntegralImage, x: usize, y: usize, norm: f64) -> f64 {
        let mut index = 0;
        loop {
            let node = &classifier.nodes[index];
            let value = self.features[node.feature].value(ii, x, y) * norm;
            let next = if value < node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return classifier.leaves[next.unsigned_abs() as usize];
            }
            index = next as usize;
        }
    }
}
