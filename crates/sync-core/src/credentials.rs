//! Source-database credentials stored on a category.
//!
//! The admin UI stores a `db_type` and a JSON `db_creds` blob on each
//! category. Only Postgres sources support schema and table discovery. The
//! other types are accepted so that a category can be recorded before its
//! connector exists.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::{Category, Result, SyncError};

/// Marker written in place of secrets.
pub const REDACTED: &str = "***REDACTED***";

/// Keys inside `db_creds` whose values are secrets.
const SECRET_KEYS: &[&str] = &["password", "secret", "token", "private_key"];

/// Source database types known to the onboarding flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDbType {
    Postgres,
    Gcp,
    Kinetica,
    Teradata,
    Spanner,
}

impl SourceDbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDbType::Postgres => "postgres",
            SourceDbType::Gcp => "gcp",
            SourceDbType::Kinetica => "kinetica",
            SourceDbType::Teradata => "teradata",
            SourceDbType::Spanner => "spanner",
        }
    }

    /// Whether schemas and tables can be listed for this source type.
    pub fn supports_discovery(&self) -> bool {
        matches!(self, SourceDbType::Postgres)
    }

    /// Type of a category's source. Unset means Postgres, matching the
    /// admin UI's default.
    pub fn for_category(category: &Category) -> Result<Self> {
        match category.db_type.as_deref() {
            Some(t) if !t.trim().is_empty() => t.parse::<SourceDbType>(),
            _ => Ok(SourceDbType::Postgres),
        }
    }
}

impl fmt::Display for SourceDbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceDbType {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SourceDbType::Postgres),
            "gcp" => Ok(SourceDbType::Gcp),
            "kinetica" => Ok(SourceDbType::Kinetica),
            "teradata" => Ok(SourceDbType::Teradata),
            "spanner" => Ok(SourceDbType::Spanner),
            _ => Err(SyncError::ValidationError(format!(
                "Unknown database type: {}",
                s
            ))),
        }
    }
}

/// Connection details for a Postgres source database.
///
/// # Security
///
/// The `Debug` implementation masks the password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SourceCredentials {
    pub database: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl SourceCredentials {
    /// Parse credentials from a `db_creds` JSON blob.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let creds: SourceCredentials = serde_json::from_value(value.clone()).map_err(|e| {
            SyncError::ValidationError(format!("Invalid database credentials: {}", e))
        })?;

        if creds.host.trim().is_empty() {
            return Err(SyncError::ValidationError(
                "Database credentials are missing a host".to_string(),
            ));
        }
        if creds.database.trim().is_empty() {
            return Err(SyncError::ValidationError(
                "Database credentials are missing a database name".to_string(),
            ));
        }

        Ok(creds)
    }

    /// Resolve the discoverable credentials of a category.
    pub fn from_category(category: &Category) -> Result<Self> {
        let db_type = SourceDbType::for_category(category)?;

        if !db_type.supports_discovery() {
            return Err(SyncError::ValidationError(format!(
                "Database type '{}' is not supported for schema discovery",
                db_type
            )));
        }

        match category.db_creds.as_ref() {
            Some(value) if !value.is_null() => Self::from_json(value),
            _ => Err(SyncError::ValidationError(format!(
                "Category {} has no database credentials",
                category.categoryid
            ))),
        }
    }
}

/// Accept the port as a JSON number or a numeric string (form inputs post strings).
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(n) => Ok(n),
        Port::Text(s) => s
            .trim()
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
    }
}

/// Return a copy of a credentials blob with secret values masked.
pub fn redact_creds(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SECRET_KEYS.contains(&k.to_lowercase().as_str()) && !v.is_null() {
                        (k.clone(), serde_json::Value::String(REDACTED.to_string()))
                    } else {
                        (k.clone(), v.clone())
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Put back stored secrets wherever `incoming` still holds the redaction marker.
pub fn restore_redacted_creds(incoming: &mut serde_json::Value, stored: &serde_json::Value) {
    if let (Some(incoming), Some(stored)) = (incoming.as_object_mut(), stored.as_object()) {
        for (key, value) in incoming.iter_mut() {
            if value.as_str() == Some(REDACTED) {
                if let Some(original) = stored.get(key) {
                    *value = original.clone();
                }
            }
        }
    }
}

/// Reject a blob that still carries the redaction marker.
///
/// Runs after [`restore_redacted_creds`]; any marker left is one with no
/// stored secret behind it and would otherwise be saved as the secret.
pub fn reject_redacted_marker(value: Option<&serde_json::Value>) -> Result<()> {
    let Some(map) = value.and_then(|v| v.as_object()) else {
        return Ok(());
    };
    match map.iter().find(|(_, v)| v.as_str() == Some(REDACTED)) {
        Some((key, _)) => Err(SyncError::ValidationError(format!(
            "db_creds.{} is redacted and there is no stored value to keep; send the real value",
            key
        ))),
        None => Ok(()),
    }
}

/// `serialize_with` helper for `db_creds` fields.
pub fn serialize_redacted_creds<S>(
    value: &Option<serde_json::Value>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.as_ref().map(redact_creds).serialize(serializer)
}
