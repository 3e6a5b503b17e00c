pub mod config;
pub mod errors;
pub mod kernel;
pub mod model;
pub mod traits;
pub mod types;
