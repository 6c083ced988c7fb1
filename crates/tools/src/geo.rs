//! Geocoding and hospital proximity search against OpenStreetMap services.

use async_trait::async_trait;
use eldercare_core::config::GeoConfig;
use eldercare_core::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub name: String,
    pub address: String,
    pub phone: Option<String>,
    pub emergency: bool,
    pub lat: f64,
    pub lon: f64,
    pub distance_km: f64,
    pub maps_link: String,
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>>;
    /// Hospitals around a point, nearest first.
    async fn hospitals_near(&self, at: GeoPoint) -> Result<Vec<Hospital>>;
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

pub fn maps_link(at: GeoPoint) -> String {
    format!("https://www.google.com/maps/search/?api=1&query={},{}", at.lat, at.lon)
}

fn overpass_query(at: GeoPoint, radius_m: u32) -> String {
    format!(
        "[out:json][timeout:25];(node[\"amenity\"=\"hospital\"](around:{r},{lat},{lon});way[\"amenity\"=\"hospital\"](around:{r},{lat},{lon}););out center;",
        r = radius_m,
        lat = at.lat,
        lon = at.lon
    )
}

/// Turn an Overpass response into hospitals sorted by distance from `origin`.
pub fn parse_overpass(body: &Value, origin: GeoPoint, limit: usize) -> Vec<Hospital> {
    let Some(elements) = body.get("elements").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut hospitals: Vec<Hospital> = elements
        .iter()
        .filter_map(|el| {
            let (lat, lon) = match (el.get("lat"), el.get("lon")) {
                (Some(lat), Some(lon)) => (lat.as_f64()?, lon.as_f64()?),
                _ => {
                    let center = el.get("center")?;
                    (center.get("lat")?.as_f64()?, center.get("lon")?.as_f64()?)
                }
            };
            let tags = el.get("tags");
            let tag = |k: &str| {
                tags.and_then(|t| t.get(k))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            };
            let address = [tag("addr:housenumber"), tag("addr:street"), tag("addr:city")]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ");
            let point = GeoPoint { lat, lon };
            Some(Hospital {
                name: tag("name").unwrap_or_else(|| "Unnamed Hospital".to_string()),
                address: if address.is_empty() { "Address not available".to_string() } else { address },
                phone: tag("phone").or_else(|| tag("contact:phone")),
                emergency: tag("emergency").map(|e| e == "yes").unwrap_or(false),
                lat,
                lon,
                distance_km: (haversine_km(origin, point) * 100.0).round() / 100.0,
                maps_link: maps_link(point),
            })
        })
        .collect();

    hospitals.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    hospitals.truncate(limit);
    hospitals
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim for geocoding, Overpass for the hospital search.
pub struct OsmLocator {
    client: Client,
    config: GeoConfig,
}

impl OsmLocator {
    pub fn new(config: GeoConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build geo HTTP client, using default");
                Client::new()
            });
        Self { client, config }
    }
}

#[async_trait]
impl GeoLocator for OsmLocator {
    async fn geocode(&self, place: &str) -> Result<Option<GeoPoint>> {
        debug!(place = %place, "Geocoding");
        let response = self
            .client
            .get(&self.config.nominatim_url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::Geo(format!("Nominatim request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Geo(format!("Nominatim returned {}", response.status())));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| Error::Geo(format!("Failed to parse Nominatim response: {}", e)))?;

        Ok(places.first().and_then(|p| {
            Some(GeoPoint {
                lat: p.lat.parse().ok()?,
                lon: p.lon.parse().ok()?,
            })
        }))
    }

    async fn hospitals_near(&self, at: GeoPoint) -> Result<Vec<Hospital>> {
        let query = overpass_query(at, self.config.radius_m);
        let response = self
            .client
            .post(&self.config.overpass_url)
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| Error::Geo(format!("Overpass request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Geo(format!("Overpass returned {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Geo(format!("Failed to parse Overpass response: {}", e)))?;

        let hospitals = parse_overpass(&body, at, self.config.result_limit);
        info!(count = hospitals.len(), lat = at.lat, lon = at.lon, "Hospitals found");
        Ok(hospitals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_haversine_known_distance() {
        // Pune to Mumbai is roughly 120 km as the crow flies
        let pune = GeoPoint { lat: 18.5204, lon: 73.8567 };
        let mumbai = GeoPoint { lat: 19.0760, lon: 72.8777 };
        let d = haversine_km(pune, mumbai);
        assert!((115.0..125.0).contains(&d), "got {}", d);
        assert_eq!(haversine_km(pune, pune), 0.0);
    }

    #[test]
    fn test_parse_overpass_sorts_and_limits() {
        let origin = GeoPoint { lat: 40.0, lon: -74.0 };
        let body = json!({
            "elements": [
                {"type": "node", "lat": 40.05, "lon": -74.0, "tags": {"name": "Far General", "emergency": "yes"}},
                {"type": "way", "center": {"lat": 40.01, "lon": -74.0}, "tags": {"name": "Near Clinic", "addr:street": "Main St", "phone": "+1 555"}},
                {"type": "node", "lat": 40.02, "lon": -74.0},
                {"type": "way", "tags": {"name": "No coordinates"}}
            ]
        });
        let hospitals = parse_overpass(&body, origin, 2);
        assert_eq!(hospitals.len(), 2);
        assert_eq!(hospitals[0].name, "Near Clinic");
        assert_eq!(hospitals[0].address, "Main St");
        assert_eq!(hospitals[0].phone.as_deref(), Some("+1 555"));
        assert_eq!(hospitals[1].name, "Unnamed Hospital");
        assert!(hospitals[0].distance_km < hospitals[1].distance_km);
    }

    #[test]
    fn test_parse_overpass_without_elements() {
        let origin = GeoPoint { lat: 0.0, lon: 0.0 };
        assert!(parse_overpass(&json!({"remark": "timeout"}), origin, 5).is_empty());
    }

    #[test]
    fn test_overpass_query_shape() {
        let q = overpass_query(GeoPoint { lat: 1.5, lon: 2.5 }, 10_000);
        assert!(q.contains("around:10000,1.5,2.5"));
        assert!(q.ends_with("out center;"));
    }
}
