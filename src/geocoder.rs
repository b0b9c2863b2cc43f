use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SpotOnError};
use crate::models::{Coordinates, GeocodeMatch};
use crate::transport::Transport;

#[cfg(test)]
use mockall::automock;

/// Resolves a free-text place name to coordinates.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// First match for `place`. No match is a `Resolution` error.
    async fn geocode(&self, place: &str) -> Result<Coordinates>;
}

/// Nominatim-compatible geocoder. Remembers the last coordinate it resolved.
pub struct NominatimGeocoder {
    tx: Arc<dyn Transport>,
    url: String,
    last: Mutex<Option<Coordinates>>,
}

impl NominatimGeocoder {
    pub fn new(tx: Arc<dyn Transport>, url: String) -> Self {
        Self {
            tx,
            url,
            last: Mutex::new(None),
        }
    }

    pub fn last_resolved(&self) -> Option<Coordinates> {
        self.last.lock().ok().and_then(|last| *last)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, place: &str) -> Result<Coordinates> {
        tracing::info!("Geocoding place: {}", place);

        let value = self
            .tx
            .get_json(&self.url, &[("q", place), ("format", "json"), ("limit", "1")])
            .await?;
        let matches: Vec<GeocodeMatch> = serde_json::from_value(value)?;

        let first = matches
            .first()
            .ok_or_else(|| SpotOnError::Resolution(format!("no geocoding match for '{place}'")))?;
        let coords = Coordinates::from(first);
        tracing::debug!(
            "Geocoded '{}' to ({}, {}) via {:?}",
            place,
            coords.lat,
            coords.lng,
            first.display_name
        );

        if let Ok(mut last) = self.last.lock() {
            *last = Some(coords);
        }
        Ok(coords)
    }
}
