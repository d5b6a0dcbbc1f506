/// A batch of normalized face crops in NHWC layout: `(batch, height, width, 3)`
/// with values in `[0, 1]`.
pub type FaceTensor = ndarray::Array4<f32>;
