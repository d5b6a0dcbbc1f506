pub mod execution_provider;
pub mod onnx_mask_classifier;
