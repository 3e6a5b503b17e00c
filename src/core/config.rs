use crate::core::errors::ClientError;
use crate::core::kernel::HttpClientBuilder;
use crate::core::types::{ClientProperty, SerializerKind};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::env;

/// Environment variable suffixes that map onto client properties
const PROPERTY_VARIABLES: &[(&str, &str)] = &[
    ("SOCKET_PATH", ClientProperty::SOCKET_PATH),
    ("BUFFERED", ClientProperty::BUFFERED),
    ("CONNECT_TIMEOUT_MS", ClientProperty::CONNECT_TIMEOUT),
    ("READ_TIMEOUT_MS", ClientProperty::READ_TIMEOUT),
    ("MAX_RETRIES", ClientProperty::MAX_RETRIES),
    ("USER_AGENT", ClientProperty::USER_AGENT),
    ("SYSTEM_PROXY", ClientProperty::SYSTEM_PROXY),
    ("TRUST_STORE", ClientProperty::TRUST_STORE),
];

/// Client configuration as supplied by the host application.
///
/// Property values are kept as strings and validated when they are applied
/// to a builder, so a typo in the environment fails exactly like a typo in
/// code.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_uri: String,
    pub properties: BTreeMap<String, String>,
    pub serializer: SerializerKind,
    pub key_id: Option<String>,
    pub signing_secret: Option<Secret<String>>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ClientConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ClientConfig", 5)?;
        state.serialize_field("base_uri", &self.base_uri)?;
        state.serialize_field("properties", &self.properties)?;
        state.serialize_field("serializer", &self.serializer.to_string())?;
        state.serialize_field("key_id", &self.key_id)?;
        state.serialize_field(
            "signing_secret",
            &self.signing_secret.as_ref().map(|_| "[REDACTED]"),
        )?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ClientConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ClientConfigHelper {
            base_uri: String,
            #[serde(default)]
            properties: BTreeMap<String, String>,
            #[serde(default)]
            serializer: Option<String>,
            #[serde(default)]
            key_id: Option<String>,
            #[serde(default)]
            signing_secret: Option<String>,
        }

        let helper = ClientConfigHelper::deserialize(deserializer)?;
        let serializer = helper
            .serializer
            .as_deref()
            .unwrap_or_default()
            .parse::<SerializerKind>()
            .map_err(<D::Error as serde::de::Error>::custom)?;
        Ok(Self {
            base_uri: helper.base_uri,
            properties: helper.properties,
            serializer,
            key_id: helper.key_id,
            signing_secret: helper.signing_secret.map(Secret::new),
        })
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_uri: String) -> Self {
        Self {
            base_uri,
            properties: BTreeMap::new(),
            serializer: SerializerKind::Default,
            key_id: None,
            signing_secret: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_BASE_URI` (required)
    /// - `{PREFIX}_SOCKET_PATH`, `{PREFIX}_BUFFERED`, `{PREFIX}_CONNECT_TIMEOUT_MS`,
    ///   `{PREFIX}_READ_TIMEOUT_MS`, `{PREFIX}_MAX_RETRIES`, `{PREFIX}_USER_AGENT`,
    ///   `{PREFIX}_SYSTEM_PROXY`, `{PREFIX}_TRUST_STORE` (optional client properties)
    /// - `{PREFIX}_SERIALIZER` (optional, `default` or `managed`)
    /// - `{PREFIX}_KEY_ID` and `{PREFIX}_SIGNING_SECRET` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |name| env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a caller-supplied variable source
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = prefix.to_uppercase();
        let var = |suffix: &str| {
            let name = format!("{}_{}", prefix, suffix);
            let value = lookup(&name);
            (name, value)
        };

        let (base_uri_var, base_uri) = var("BASE_URI");
        let base_uri = base_uri
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingEnvironmentVariable(base_uri_var))?;

        let properties = PROPERTY_VARIABLES
            .iter()
            .filter_map(|(suffix, key)| var(*suffix).1.map(|value| ((*key).to_string(), value)))
            .collect();

        let (serializer_var, serializer) = var("SERIALIZER");
        let serializer = serializer
            .as_deref()
            .unwrap_or_default()
            .parse::<SerializerKind>()
            .map_err(|e| ConfigError::InvalidConfiguration(format!("{}: {}", serializer_var, e)))?;

        Ok(Self {
            base_uri,
            properties,
            serializer,
            key_id: var("KEY_ID").1.filter(|value| !value.is_empty()),
            signing_secret: var("SIGNING_SECRET").1.map(Secret::new),
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    ///
    /// A missing file is not an error; the process environment is used as is.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, key_id: String, signing_secret: String) -> Self {
        self.key_id = Some(key_id);
        self.signing_secret = Some(Secret::new(signing_secret));
        self
    }

    /// Check if this configuration can sign requests
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.key_id.as_deref().is_some_and(|key| !key.is_empty())
            && self
                .signing_secret
                .as_ref()
                .is_some_and(|secret| !secret.expose_secret().is_empty())
    }

    pub const fn serializer_kind(&self) -> SerializerKind {
        self.serializer
    }

    /// Push the base URI and every property into `builder`.
    ///
    /// Fails on the first unknown key or unparsable value.
    pub fn apply_to(&self, builder: &mut HttpClientBuilder) -> Result<(), ClientError> {
        builder.base_uri(&self.base_uri)?;
        for (key, value) in &self.properties {
            builder.property_str(key, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TransportKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_reads_prefixed_variables() {
        let config = ClientConfig::from_lookup(
            "cloudsdk",
            lookup(&[
                ("CLOUDSDK_BASE_URI", "https://objectstorage.example.com"),
                ("CLOUDSDK_SOCKET_PATH", "/tmp/agent.sock"),
                ("CLOUDSDK_READ_TIMEOUT_MS", "5000"),
                ("CLOUDSDK_TRUST_STORE", "/etc/pki/roots.pem"),
                ("CLOUDSDK_SERIALIZER", "managed"),
                ("CLOUDSDK_KEY_ID", "ocid1.key"),
                ("CLOUDSDK_SIGNING_SECRET", "s3cret"),
            ]),
        )
        .unwrap();

        assert_eq!(config.base_uri, "https://objectstorage.example.com");
        assert_eq!(config.properties["socketPath"], "/tmp/agent.sock");
        assert_eq!(config.properties["readTimeout"], "5000");
        assert_eq!(config.properties["trustStore"], "/etc/pki/roots.pem");
        assert_eq!(config.serializer_kind(), SerializerKind::Managed);
        assert!(config.has_credentials());
    }

    #[test]
    fn test_missing_base_uri() {
        let err = ClientConfig::from_lookup("svc", lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvironmentVariable(ref name) if name == "SVC_BASE_URI"));
    }

    #[test]
    fn test_invalid_serializer() {
        let err = ClientConfig::from_lookup(
            "svc",
            lookup(&[("SVC_BASE_URI", "http://localhost"), ("SVC_SERIALIZER", "xml")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("SVC_SERIALIZER"));
    }

    #[test]
    fn test_apply_to_validates_properties() {
        let config = ClientConfig::new("http://localhost".to_string())
            .with_property("socketPath", "/tmp/agent.sock")
            .with_property("buffered", "false");
        let mut builder = HttpClientBuilder::new();
        config.apply_to(&mut builder).unwrap();
        assert_eq!(builder.transport_kind(), TransportKind::UnixSocket);

        let bad = ClientConfig::new("http://localhost".to_string()).with_property("buffered", "maybe");
        let err = bad.apply_to(&mut HttpClientBuilder::new()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_serialize_redacts_secret() {
        let config = ClientConfig::new("http://localhost".to_string())
            .with_credentials("ocid1.key".to_string(), "s3cret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("s3cret"));
        assert!(!format!("{:?}", config).contains("s3cret"));
    }

    #[test]
    fn test_deserialize_round_trip() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"base_uri":"http://localhost","properties":{"maxRetries":"2"},"serializer":"managed","signing_secret":"s"}"#,
        )
        .unwrap();
        assert_eq!(config.serializer_kind(), SerializerKind::Managed);
        assert_eq!(config.properties["maxRetries"], "2");
        assert!(!config.has_credentials());
    }
}
