use crate::core::model::{report_untracked, SerializableModel};
use serde_json::Value;

/// Decides, per property, whether a model writes it
pub trait PropertyFilter: Send + Sync {
    fn should_include(&self, owner: &dyn SerializableModel, property: &str, value: &Value) -> bool;
}

/// Emits a property iff its value is non-null or the owner reports it as
/// explicitly set. The owner's discriminator property is always emitted.
///
/// An owner that tracks explicit sets but cannot resolve a property name is
/// treated as "not set": the property is logged and left out rather than
/// failing the whole payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitlySetFilter;

impl PropertyFilter for ExplicitlySetFilter {
    fn should_include(&self, owner: &dyn SerializableModel, property: &str, value: &Value) -> bool {
        if owner.discriminator() == Some(property) {
            return true;
        }
        if !value.is_null() {
            return true;
        }
        let Some(tracker) = owner.explicitly_set() else {
            return false;
        };
        tracker.was_property_explicitly_set(property).unwrap_or_else(|| {
            report_untracked(property);
            false
        })
    }
}
