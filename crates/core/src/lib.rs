pub mod classification;
pub mod detection;
pub mod monitoring;
pub mod overlay;
pub mod pipeline;
pub mod shared;
pub mod video;
