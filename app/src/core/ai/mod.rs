//! AI Module
//!
//! Provider table, HTTP transport, prompt templates, error classification
//! and the script gateway that ties them together.

pub mod classifier;
pub mod gateway;
pub mod prompt;
pub mod provider;
pub mod providers;

pub use classifier::classify_error;
pub use gateway::{
    parse_script_content, prepare_generation, GatewayConfig, GenerationError, ScriptGateway,
};
pub use prompt::{build_user_prompt, GenerationMode, PromptTemplate, SceneTarget};
#[cfg(feature = "ai-providers")]
pub use provider::ReqwestTransport;
pub use provider::{HttpRequest, HttpResponse, HttpTransport, MockTransport};
pub use providers::{ApiKeySet, AuthStyle, ProviderKind, ProviderSpec, PROVIDERS};
