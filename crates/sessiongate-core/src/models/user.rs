use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Cached profile of the signed-in user.
///
/// The server is authoritative; this is whatever it last returned. Only `id`
/// and `username` are required, everything else defaults when missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub persona_data: Option<String>,
    #[serde(default)]
    pub subscription_tier: Option<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl UserRecord {
    pub fn new(id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: None,
            first_name: None,
            last_name: None,
            persona_data: None,
            subscription_tier: None,
            created_at: None,
            is_active: None,
        }
    }

    /// "First Last", falling back to the username when no name parts are set.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }

    /// Merge the fields named in `update` into this record.
    ///
    /// Values come from `server` when the server echoed the record back,
    /// otherwise from the update itself. Fields the update does not name are
    /// left untouched.
    pub fn merge_update(&mut self, update: &ProfileUpdate, server: Option<&UserRecord>) {
        if let Some(ref username) = update.username {
            self.username = server
                .map(|s| s.username.clone())
                .unwrap_or_else(|| username.clone());
        }
        if let Some(ref first) = update.first_name {
            self.first_name = pick(server.map(|s| &s.first_name), first);
        }
        if let Some(ref last) = update.last_name {
            self.last_name = pick(server.map(|s| &s.last_name), last);
        }
        if let Some(ref persona) = update.persona_data {
            self.persona_data = pick(server.map(|s| &s.persona_data), persona);
        }
    }
}

fn pick(server: Option<&Option<String>>, submitted: &str) -> Option<String> {
    match server {
        Some(Some(value)) => Some(value.clone()),
        _ => Some(submitted.to_string()),
    }
}

/// Accepts RFC 3339 or a naive ISO-8601 timestamp (assumed UTC).
/// Anything else becomes `None` instead of rejecting the whole record.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Partial profile edit. Only `Some` fields are sent and merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_data: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.persona_data.is_none()
    }
}

/// New account fields for `register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}
