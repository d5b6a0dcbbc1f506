pub mod mask_pipeline;
pub mod model_load_task;
pub mod monitor_session;
pub mod pipeline_logger;
pub mod shared_pipeline;

#[cfg(test)]
pub(crate) mod test_support;
