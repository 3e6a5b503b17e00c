pub mod service_factory;

pub use service_factory::ServiceClientFactory;
