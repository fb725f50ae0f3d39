// ABOUTME: Tool registry for the Octroi gateway
// ABOUTME: Tool model, validation service, endpoint templates, and credential storage

pub mod crypto;
pub mod cursor;
pub mod service;
pub mod store;
pub mod template;
pub mod types;

pub use crypto::{AesGcmCipher, Cipher, CryptoError};
pub use service::{RegistryError, ToolService};
pub use store::ToolStore;
pub use template::{extract_template_vars, resolve_template, TemplateError};
pub use types::{CreateToolInput, Tool, ToolListParams, UpdateToolInput};
