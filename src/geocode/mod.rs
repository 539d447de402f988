//! Address lookup against a Nominatim-compatible service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::geo::GeoPoint;

const USER_AGENT: &str = "RescueBackend/0.1 (Emergency Rescue Coordination)";
const SEARCH_LIMIT: usize = 5;

/// A resolved address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Address at a point, if any.
    async fn reverse(&self, point: GeoPoint) -> Result<Option<Address>, AppError>;

    /// Addresses matching a free-text query.
    async fn search(&self, query: &str) -> Result<Vec<Address>, AppError>;
}

/// Nominatim API response row
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

impl NominatimPlace {
    fn into_address(self) -> Option<Address> {
        Some(Address {
            latitude: self.lat.parse().ok()?,
            longitude: self.lon.parse().ok()?,
            display_name: self.display_name,
        })
    }
}

pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, point: GeoPoint) -> Result<Option<Address>, AppError> {
        let response = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Reverse geocoding request failed");
                AppError::from(e)
            })?
            .error_for_status()?;

        // Nominatim answers 200 with {"error": ...} when nothing is there.
        let body: serde_json::Value = response.json().await?;
        if body.get("error").is_some() {
            tracing::debug!(lat = point.latitude, lng = point.longitude, "No address found");
            return Ok(None);
        }
        let place: NominatimPlace = serde_json::from_value(body)
            .map_err(|e| AppError::Upstream(format!("Unexpected geocoder response: {}", e)))?;
        Ok(place.into_address())
    }

    async fn search(&self, query: &str) -> Result<Vec<Address>, AppError> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query.to_string()),
                ("format", "json".to_string()),
                ("limit", SEARCH_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, query = %query, "Geocoding search failed");
                AppError::from(e)
            })?
            .error_for_status()?
            .json()
            .await?;

        Ok(places
            .into_iter()
            .filter_map(NominatimPlace::into_address)
            .collect())
    }
}
