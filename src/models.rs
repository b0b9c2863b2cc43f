use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

/// Flexible float deserializer: services disagree on whether numbers travel as JSON numbers or strings
fn deserialize_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleFloat {
        Float(f64),
        Int(i64),
        String(String),
    }

    match FlexibleFloat::deserialize(deserializer)? {
        FlexibleFloat::Float(f) => Ok(f),
        FlexibleFloat::Int(i) => Ok(i as f64),
        FlexibleFloat::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub lng: f64,
}

impl Coordinates {
    /// Stand-in for "resolution has not succeeded". Pins at (0, 0) are a known degenerate case.
    pub const UNRESOLVED: Coordinates = Coordinates { lat: 0.0, lng: 0.0 };

    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_unresolved(&self) -> bool {
        *self == Self::UNRESOLVED
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::UNRESOLVED
    }
}

/// Locality description as delivered by the lookup service.
///
/// The wire shape is `string | string[]`; the variant is the discriminant the
/// detail panel renders by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Structured(Vec<String>),
    Narrative(String),
}

impl Default for Description {
    fn default() -> Self {
        Description::Structured(Vec::new())
    }
}

/// The currently selected locality. Replaced wholesale on every successful lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalityRecord {
    pub name: String,
    pub rating: f64,
    pub description: Description,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

// Locality lookup request format
#[derive(Debug, Serialize, Clone)]
pub struct LookupRequest {
    pub locality: String,
}

// Locality lookup response format
#[derive(Debug, Deserialize, Clone)]
pub struct LookupResponse {
    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub rating: f64,
    #[serde(default)]
    pub description: Description,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Whatever the service calls the place. Never shown; the selection string wins.
    #[serde(default)]
    pub name: Option<String>,
}

impl LookupResponse {
    pub fn into_record(self, name: &str) -> LocalityRecord {
        if let Some(alias) = self.name.as_deref().filter(|alias| *alias != name) {
            tracing::debug!("Ignoring service alias '{}' for selection '{}'", alias, name);
        }
        LocalityRecord {
            name: name.to_string(),
            rating: self.rating,
            description: self.description,
            coordinates: self.coordinates,
        }
    }
}

// Assistant request format
#[derive(Debug, Serialize, Clone)]
pub struct AskRequest {
    pub question: String,
}

// Assistant response format
#[derive(Debug, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

/// One geocoder hit. Nominatim sends `lat`/`lon` as strings.
#[derive(Debug, Deserialize, Clone)]
pub struct GeocodeMatch {
    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub lon: f64,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl From<&GeocodeMatch> for Coordinates {
    fn from(m: &GeocodeMatch) -> Self {
        Coordinates::new(m.lat, m.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    pub role: Role,
    pub text: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// A suggestion offered by the search box, optionally with known coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionSeed {
    pub name: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl SuggestionSeed {
    pub fn new(name: impl Into<String>, coordinates: Option<Coordinates>) -> Self {
        Self {
            name: name.into(),
            coordinates,
        }
    }
}
