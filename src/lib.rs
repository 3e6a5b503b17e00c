pub mod core;
pub mod utils;

pub use crate::core::config::{ClientConfig, ConfigError};
pub use crate::core::errors::ClientError;
pub use crate::core::kernel::{HttpClient, HttpClientBuilder, HttpRequest, HttpResponse};
pub use crate::core::types::*;
pub use utils::ServiceClientFactory;
