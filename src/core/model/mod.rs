//! Support for SDK model types that distinguish "never set" from "set to null".
//!
//! A model keeps an [`ExplicitlySet`] recorder next to its fields, exposes it
//! through [`SerializableModel::explicitly_set`], and writes its properties
//! through a [`ModelWriter`]. The writer consults a [`PropertyFilter`] per
//! property, so a `None` field is emitted as `null` only when a setter
//! touched it:
//!
//! ```rust
//! use cloudsdk_http::core::model::{deserialize_tracked, ExplicitlySet, ModelWriter, SerializableModel};
//! use serde::{Deserialize, Deserializer, Serialize, Serializer};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! pub struct UpdateBucketDetails {
//!     pub name: Option<String>,
//!     pub public_access_type: Option<String>,
//!     explicitly_set: ExplicitlySet,
//! }
//!
//! impl UpdateBucketDetails {
//!     const PROPERTIES: &'static [&'static str] = &["name", "publicAccessType"];
//!
//!     pub fn new() -> Self {
//!         Self {
//!             name: None,
//!             public_access_type: None,
//!             explicitly_set: ExplicitlySet::new(Self::PROPERTIES),
//!         }
//!     }
//!
//!     pub fn set_public_access_type(&mut self, value: Option<String>) {
//!         self.public_access_type = value;
//!         self.explicitly_set.mark("publicAccessType");
//!     }
//! }
//!
//! impl SerializableModel for UpdateBucketDetails {
//!     fn explicitly_set(&self) -> Option<&dyn cloudsdk_http::core::model::ExplicitlySetTracker> {
//!         Some(&self.explicitly_set)
//!     }
//! }
//!
//! impl Serialize for UpdateBucketDetails {
//!     fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
//!         ModelWriter::new(self)
//!             .property("name", &self.name)
//!             .property("publicAccessType", &self.public_access_type)
//!             .serialize(serializer)
//!     }
//! }
//!
//! impl<'de> Deserialize<'de> for UpdateBucketDetails {
//!     fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
//!         #[derive(Deserialize)]
//!         #[serde(rename_all = "camelCase")]
//!         struct Helper {
//!             name: Option<String>,
//!             public_access_type: Option<String>,
//!         }
//!
//!         let (helper, explicitly_set) =
//!             deserialize_tracked::<D, Helper>(deserializer, Self::PROPERTIES)?;
//!         Ok(Self {
//!             name: helper.name,
//!             public_access_type: helper.public_access_type,
//!             explicitly_set,
//!         })
//!     }
//! }
//!
//! let mut details = UpdateBucketDetails::new();
//! details.set_public_access_type(None);
//! assert_eq!(
//!     serde_json::to_string(&details).unwrap(),
//!     r#"{"publicAccessType":null}"#
//! );
//! ```

pub mod dates;
pub mod filter;

pub use filter::{ExplicitlySetFilter, PropertyFilter};

use serde::de::{self, DeserializeOwned};
use serde::ser::{self, SerializeMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{trace, warn};

/// Capability of a model that records which properties a caller touched
pub trait ExplicitlySetTracker {
    /// Whether `property` was explicitly set, even to null.
    ///
    /// Returns `None` when the tracker does not know the property at all.
    fn was_property_explicitly_set(&self, property: &str) -> Option<bool>;
}

/// A payload type that can be written through a [`ModelWriter`].
///
/// Both methods are capability queries; the defaults describe a plain type
/// with no explicit-set tracking and no polymorphic type tag.
pub trait SerializableModel {
    fn explicitly_set(&self) -> Option<&dyn ExplicitlySetTracker> {
        None
    }

    /// Name of the type-tag property used for polymorphic decoding.
    /// It is always written, whatever its value.
    fn discriminator(&self) -> Option<&'static str> {
        None
    }
}

/// Records which of a model's declared properties have been set.
///
/// Lookups accept the wire name (`publicAccessType`) or its snake_case form
/// (`public_access_type`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitlySet {
    properties: &'static [&'static str],
    set: BTreeSet<&'static str>,
}

impl ExplicitlySet {
    pub fn new(properties: &'static [&'static str]) -> Self {
        Self {
            properties,
            set: BTreeSet::new(),
        }
    }

    /// Build a recorder with every key in `present` marked
    pub fn from_present<'a>(
        properties: &'static [&'static str],
        present: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut explicitly_set = Self::new(properties);
        for key in present {
            explicitly_set.mark(key);
        }
        explicitly_set
    }

    /// Mark a property as set. Names outside the declared list are ignored.
    pub fn mark(&mut self, property: &str) {
        if let Some(name) = self.resolve(property) {
            self.set.insert(name);
        }
    }

    pub fn unmark(&mut self, property: &str) {
        if let Some(name) = self.resolve(property) {
            self.set.remove(name);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn properties(&self) -> &'static [&'static str] {
        self.properties
    }

    fn resolve(&self, property: &str) -> Option<&'static str> {
        if let Some(found) = self.properties.iter().find(|p| **p == property) {
            return Some(*found);
        }
        let camel = lower_underscore_to_lower_camel(property);
        self.properties.iter().find(|p| **p == camel).copied()
    }
}

impl ExplicitlySetTracker for ExplicitlySet {
    fn was_property_explicitly_set(&self, property: &str) -> Option<bool> {
        self.resolve(property).map(|name| self.set.contains(name))
    }
}

fn lower_underscore_to_lower_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

static DEFAULT_FILTER: ExplicitlySetFilter = ExplicitlySetFilter;

/// Writes a model's properties in declaration order, dropping the ones the
/// filter rejects.
///
/// Property values are converted to JSON trees eagerly; a conversion failure
/// is reported when [`ModelWriter::serialize`] runs.
pub struct ModelWriter<'a> {
    owner: &'a dyn SerializableModel,
    filter: &'a dyn PropertyFilter,
    properties: Vec<(&'static str, Value)>,
    error: Option<String>,
}

impl<'a> ModelWriter<'a> {
    pub fn new(owner: &'a dyn SerializableModel) -> Self {
        Self {
            owner,
            filter: &DEFAULT_FILTER,
            properties: Vec::new(),
            error: None,
        }
    }

    pub fn with_filter(mut self, filter: &'a dyn PropertyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn property<T: Serialize + ?Sized>(mut self, name: &'static str, value: &T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_json::to_value(value) {
            Ok(value) => self.properties.push((name, value)),
            Err(e) => self.error = Some(format!("property '{}': {}", name, e)),
        }
        self
    }

    /// The properties that survive filtering
    pub fn into_map(self) -> Result<Map<String, Value>, String> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let owner = self.owner;
        let filter = self.filter;
        Ok(self
            .properties
            .into_iter()
            .filter(|(name, value)| filter.should_include(owner, name, value))
            .map(|(name, value)| (name.to_string(), value))
            .collect())
    }

    pub fn serialize<S: Serializer>(self, serializer: S) -> Result<S::Ok, S::Error> {
        let included = self.into_map().map_err(ser::Error::custom)?;
        let mut map = serializer.serialize_map(Some(included.len()))?;
        for (name, value) in &included {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Deserialize a model through a field helper, recording every key that was
/// present on the wire (null or not) as explicitly set.
pub fn deserialize_tracked<'de, D, H>(
    deserializer: D,
    properties: &'static [&'static str],
) -> Result<(H, ExplicitlySet), D::Error>
where
    D: Deserializer<'de>,
    H: DeserializeOwned,
{
    let map = Map::<String, Value>::deserialize(deserializer)?;
    let explicitly_set = ExplicitlySet::from_present(properties, map.keys().map(String::as_str));
    for key in map.keys() {
        if explicitly_set.was_property_explicitly_set(key).is_none() {
            trace!(property = %key, "ignoring unknown property");
        }
    }
    let helper = H::deserialize(Value::Object(map)).map_err(de::Error::custom)?;
    Ok((helper, explicitly_set))
}

/// Log an explicit-set lookup that failed for a property the model claims
/// to track.
pub(crate) fn report_untracked(property: &str) {
    warn!(
        property = %property,
        "model reports explicit-set tracking but does not know the property; excluding it"
    );
}
