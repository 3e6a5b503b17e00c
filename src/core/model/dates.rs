//! Wire format for timestamps: RFC 3339 in UTC, always with milliseconds
//! (`2024-03-01T12:30:45.120Z`), never epoch numbers.
//!
//! Use with `#[serde(with = "cloudsdk_http::core::model::dates::rfc3339")]`,
//! or `dates::rfc3339::option` for `Option<DateTime<Utc>>`.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn format(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw).map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{de, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&super::super::format(value)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| {
                    super::super::parse(&raw)
                        .map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
                })
                .transpose()
        }
    }
}
