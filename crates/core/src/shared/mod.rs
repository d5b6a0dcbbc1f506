pub mod clock;
pub mod config;
pub mod constants;
pub mod frame;
pub mod region;
pub mod resource_resolver;
pub mod tensor;
