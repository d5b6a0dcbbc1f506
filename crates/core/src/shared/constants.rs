pub const MASK_MODEL_NAME: &str = "mask_detector.onnx";
pub const CASCADE_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// Pixels of context added around a face before classification.
pub const ROI_PADDING: i32 = 20;

pub const MIN_ASPECT_RATIO: f64 = 0.5;
pub const MAX_ASPECT_RATIO: f64 = 2.0;

/// Timestamp layout of the violation log (local time, second precision).
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const VIOLATION_LOG_HEADER: &str = "timestamp,violation_type,confidence,face_position,duration";

pub const ALERT_MESSAGE: &str = "MASK VIOLATION DETECTED!";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
