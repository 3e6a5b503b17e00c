use crate::core::errors::ClientError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Serializer trait for request and response payloads
///
/// This trait is the object-safe core of the serialization contract: it
/// converts between JSON trees and wire bytes. Typed encoding and decoding
/// are provided for every implementation by [`SerializerExt`].
///
/// A client's serializer is chosen when the client is built and never
/// changes afterwards.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Write a JSON tree as wire bytes
    fn write_value(&self, value: Value) -> Result<Vec<u8>, ClientError>;

    /// Parse wire bytes into a JSON tree
    fn read_value(&self, bytes: &[u8]) -> Result<Value, ClientError>;
}

/// Typed encode/decode on top of any [`Serializer`]
pub trait SerializerExt {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ClientError>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ClientError>;

    fn decode_list<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Vec<T>, ClientError>;
}

impl<S: Serializer + ?Sized> SerializerExt for S {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, ClientError> {
        let tree = serde_json::to_value(value)
            .map_err(|e| ClientError::Serialization(format!("Failed to encode value: {}", e)))?;
        self.write_value(tree)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, ClientError> {
        let tree = self.read_value(bytes)?;
        serde_json::from_value(tree)
            .map_err(|e| ClientError::Serialization(format!("Failed to decode value: {}", e)))
    }

    fn decode_list<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Vec<T>, ClientError> {
        match self.read_value(bytes)? {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    serde_json::from_value(item).map_err(|e| {
                        ClientError::Serialization(format!(
                            "Failed to decode list element {}: {}",
                            index, e
                        ))
                    })
                })
                .collect(),
            other => Err(ClientError::Serialization(format!(
                "Expected a JSON array, found {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Minimal serializer usable with zero configuration: compact `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSerializer;

impl Serializer for DefaultSerializer {
    fn name(&self) -> &'static str {
        "default"
    }

    fn write_value(&self, value: Value) -> Result<Vec<u8>, ClientError> {
        serde_json::to_vec(&value)
            .map_err(|e| ClientError::Serialization(format!("Failed to write JSON: {}", e)))
    }

    fn read_value(&self, bytes: &[u8]) -> Result<Value, ClientError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Serialization(format!("Failed to parse JSON: {}", e)))
    }
}

/// Rewrites JSON trees on their way to and from the wire.
///
/// Adapters are the extension point of an [`ObjectMapper`]: applications
/// register them once on the shared mapper and every managed client picks
/// them up. Both hooks see the root of the document.
pub trait TypeAdapter: Send + Sync + fmt::Debug {
    fn write(&self, value: Value) -> Result<Value, ClientError> {
        Ok(value)
    }

    fn read(&self, value: Value) -> Result<Value, ClientError> {
        Ok(value)
    }
}

/// Centrally configured mapper shared by managed serializers
#[derive(Debug, Clone, Default)]
pub struct ObjectMapper {
    pretty: bool,
    adapters: Vec<Arc<dyn TypeAdapter>>,
}

impl ObjectMapper {
    pub fn builder() -> ObjectMapperBuilder {
        ObjectMapperBuilder::default()
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    pub fn adapter_count(&self) -> usize {
        self.adapters.len()
    }

    pub fn write_value(&self, value: Value) -> Result<Vec<u8>, ClientError> {
        let value = self
            .adapters
            .iter()
            .try_fold(value, |value, adapter| adapter.write(value))?;
        let written = if self.pretty {
            serde_json::to_vec_pretty(&value)
        } else {
            serde_json::to_vec(&value)
        };
        written.map_err(|e| ClientError::Serialization(format!("Failed to write JSON: {}", e)))
    }

    pub fn read_value(&self, bytes: &[u8]) -> Result<Value, ClientError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Serialization(format!("Failed to parse JSON: {}", e)))?;
        self.adapters
            .iter()
            .try_fold(value, |value, adapter| adapter.read(value))
    }
}

#[derive(Debug, Default)]
pub struct ObjectMapperBuilder {
    pretty: bool,
    adapters: Vec<Arc<dyn TypeAdapter>>,
}

impl ObjectMapperBuilder {
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Adapters run in registration order on write and on read
    pub fn adapter(mut self, adapter: Arc<dyn TypeAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> ObjectMapper {
        ObjectMapper {
            pretty: self.pretty,
            adapters: self.adapters,
        }
    }
}

/// Serializer that defers to a shared [`ObjectMapper`]
#[derive(Debug, Clone)]
pub struct ManagedSerializer {
    mapper: Arc<ObjectMapper>,
}

impl ManagedSerializer {
    pub fn new(mapper: Arc<ObjectMapper>) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &Arc<ObjectMapper> {
        &self.mapper
    }
}

impl Serializer for ManagedSerializer {
    fn name(&self) -> &'static str {
        "managed"
    }

    fn write_value(&self, value: Value) -> Result<Vec<u8>, ClientError> {
        self.mapper.write_value(value)
    }

    fn read_value(&self, bytes: &[u8]) -> Result<Value, ClientError> {
        self.mapper.read_value(bytes)
    }
}
