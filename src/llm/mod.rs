pub mod breaker;
pub mod gateway;
pub mod limiter;
pub mod prompts;

pub use gateway::{GatewayError, LlmGateway, ModelVerdict, ValidationRequest};
