pub mod annotator;
pub mod canvas;
