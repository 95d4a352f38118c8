// API models and data fetching for the MBTA V3 API (Massachusetts Bay Transportation Authority)
// Developer portal: https://www.mbta.com/developers/v3-api
//
// API Endpoints:
// - Stop by id: https://api-v3.mbta.com/stops/{id}?include=child_stops
// - Routes serving a stop: https://api-v3.mbta.com/routes?filter[stop]={id}&filter[type]=2
// - Predictions: https://api-v3.mbta.com/predictions?include=stop,trip&filter[stop]={id}&filter[route]={ids}
// - Trips: https://api-v3.mbta.com/trips?filter[id]={ids}

use chrono::{DateTime, Utc};
use chrono_tz::America::New_York;
use log::{debug, info, warn};
use reqwest::blocking;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub platform_id: String,
    pub platform_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub stop_id: String,
    pub stop_name: String,
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub trip_id: String,
    pub departure: DateTime<Utc>,
    pub track: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub trip_id: String,
    pub train: String,
    pub headsign: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayRow {
    pub departure: DateTime<Utc>,
    pub destination: String,
    pub train: String,
    pub track: String,
    pub status: Option<String>,
}

/// One fully assembled board, published atomically after a successful
/// refresh cycle. Front-ends only ever read it.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub stop_id: String,
    pub stop_name: String,
    pub rows: Vec<DisplayRow>,
    pub last_update: DateTime<Utc>,
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub stop_id: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub refresh_secs: u64,
    pub tick_millis: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            stop_id: SolariModels::DEFAULT_STOP.to_string(),
            base_url: SolariModels::BASE_URL.to_string(),
            api_key: None,
            refresh_secs: 60,
            tick_millis: 100,
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum SolariError {
    NetworkError(String),
    ApiError(String),
    ParseError(String),
}

impl std::fmt::Display for SolariError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolariError::NetworkError(e) => write!(f, "Network error: {}", e),
            SolariError::ApiError(e) => write!(f, "API error: {}", e),
            SolariError::ParseError(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for SolariError {}

pub type Result<T> = std::result::Result<T, SolariError>;

// ============================================================================
// Main Implementation
// ============================================================================

pub struct SolariModels;

impl SolariModels {
    pub const DEFAULT_STOP: &'static str = "place-north";
    pub const BASE_URL: &'static str = "https://api-v3.mbta.com";
    pub const TRACK_TBD: &'static str = "TBD";
    /// MBTA route type code for commuter rail.
    const COMMUTER_RAIL: &'static str = "2";
    const REQUEST_TIMEOUT_SECS: u64 = 15;

    /// Run one full refresh cycle: stop -> routes -> predictions -> trips,
    /// each stage feeding the next, and assemble the board. Any stage
    /// failure aborts the cycle; the caller keeps its previous snapshot.
    pub fn refresh_board(config: &BoardConfig) -> Result<BoardSnapshot> {
        info!("refreshing departures for {}", config.stop_id);

        let station = Self::fetch_station(config)?;
        debug!(
            "resolved {} ({} platforms)",
            station.stop_name,
            station.platforms.len()
        );

        let route_ids = Self::fetch_route_ids(config)?;
        debug!(
            "{} commuter rail routes serve {}",
            route_ids.len(),
            station.stop_id
        );

        let predictions = Self::fetch_predictions(config, &route_ids, &station.platforms)?;

        let rows = if predictions.is_empty() {
            debug!("no departure predictions for {}", station.stop_id);
            Vec::new()
        } else {
            let trips = Self::fetch_trips(config, &predictions)?;
            Self::assemble_rows(&predictions, &trips)
        };

        info!("board refreshed: {} departures", rows.len());

        Ok(BoardSnapshot {
            stop_id: station.stop_id,
            stop_name: station.stop_name,
            rows,
            last_update: Utc::now(),
        })
    }

    /// Resolve the station and its boarding platforms.
    pub fn fetch_station(config: &BoardConfig) -> Result<Station> {
        let url = Self::endpoint(
            config,
            &format!("stops/{}?include=child_stops", config.stop_id),
        );
        let json = Self::get_json(&url)?;
        Self::parse_station(&config.stop_id, &json)
    }

    /// Fetch the commuter rail route ids serving the station. Rapid transit
    /// and bus routes are filtered out server-side; the ids are used only as
    /// a prediction filter.
    pub fn fetch_route_ids(config: &BoardConfig) -> Result<Vec<String>> {
        let url = Self::endpoint(
            config,
            &format!(
                "routes?filter[stop]={}&filter[type]={}",
                config.stop_id,
                Self::COMMUTER_RAIL
            ),
        );
        let json = Self::get_json(&url)?;
        Self::parse_route_ids(&json)
    }

    /// Fetch upcoming predictions for the station, restricted to the given
    /// route set. An empty route set is passed through to the API as an
    /// empty filter.
    pub fn fetch_predictions(
        config: &BoardConfig,
        route_ids: &[String],
        platforms: &[Platform],
    ) -> Result<Vec<Prediction>> {
        let url = Self::endpoint(
            config,
            &format!(
                "predictions?include=stop,trip&filter[stop]={}&filter[route]={}",
                config.stop_id,
                route_ids.join(",")
            ),
        );
        let json = Self::get_json(&url)?;
        Self::parse_predictions(&json, platforms)
    }

    /// Fetch trip metadata (train number, headsign) for every trip the
    /// prediction set references.
    pub fn fetch_trips(config: &BoardConfig, predictions: &[Prediction]) -> Result<Vec<Trip>> {
        let mut seen = HashSet::new();
        let trip_ids: Vec<&str> = predictions
            .iter()
            .map(|p| p.trip_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect();

        let url = Self::endpoint(config, &format!("trips?filter[id]={}", trip_ids.join(",")));
        let json = Self::get_json(&url)?;
        Self::parse_trips(&json)
    }

    // ========================================================================
    // Parsing (pure, one function per pipeline stage)
    // ========================================================================

    pub fn parse_station(stop_id: &str, json: &serde_json::Value) -> Result<Station> {
        let stop_name = json["data"]["attributes"]["name"]
            .as_str()
            .ok_or_else(|| {
                SolariError::ParseError("Missing or invalid stop data in API response".to_string())
            })?
            .to_string();

        let platforms = match json["included"].as_array() {
            Some(children) => {
                // The station has child stops, one per boarding platform.
                // Some children belong to rapid transit lines, but those never
                // match commuter-rail predictions, so carrying them is harmless.
                children
                    .iter()
                    .filter_map(|child| {
                        let platform_id = child["id"].as_str()?.to_string();
                        let platform_code = child["attributes"]["platform_code"]
                            .as_str()
                            .filter(|code| !code.is_empty())
                            .unwrap_or(Self::TRACK_TBD)
                            .to_string();
                        Some(Platform {
                            platform_id,
                            platform_code,
                        })
                    })
                    .collect()
            }
            // No child stops: the station is its own single platform.
            None => vec![Platform {
                platform_id: stop_id.to_string(),
                platform_code: String::new(),
            }],
        };

        Ok(Station {
            stop_id: stop_id.to_string(),
            stop_name,
            platforms,
        })
    }

    pub fn parse_route_ids(json: &serde_json::Value) -> Result<Vec<String>> {
        let routes = json["data"].as_array().ok_or_else(|| {
            SolariError::ParseError("Missing or invalid route data in API response".to_string())
        })?;

        Ok(routes
            .iter()
            .filter_map(|route| route["id"].as_str().map(String::from))
            .collect())
    }

    pub fn parse_predictions(
        json: &serde_json::Value,
        platforms: &[Platform],
    ) -> Result<Vec<Prediction>> {
        let entries = json["data"].as_array().ok_or_else(|| {
            SolariError::ParseError(
                "Missing or invalid prediction data in API response".to_string(),
            )
        })?;

        let predictions = entries
            .iter()
            .filter_map(|entry| {
                // Arrival-only entries are trips terminating here; there is no
                // departure to show, so they never enter the board.
                let departure = entry["attributes"]["departure_time"].as_str()?;
                let departure = DateTime::parse_from_rfc3339(departure)
                    .ok()?
                    .with_timezone(&Utc);

                let trip_id = match entry["relationships"]["trip"]["data"]["id"].as_str() {
                    Some(id) => id.to_string(),
                    None => {
                        warn!("skipping prediction without a trip relationship");
                        return None;
                    }
                };

                let stop_ref = entry["relationships"]["stop"]["data"]["id"]
                    .as_str()
                    .unwrap_or("");
                let track = platforms
                    .iter()
                    .find(|platform| platform.platform_id == stop_ref)
                    .map(|platform| platform.platform_code.clone())
                    .unwrap_or_else(|| Self::TRACK_TBD.to_string());

                let status = entry["attributes"]["status"].as_str().map(String::from);

                Some(Prediction {
                    trip_id,
                    departure,
                    track,
                    status,
                })
            })
            .collect();

        Ok(predictions)
    }

    pub fn parse_trips(json: &serde_json::Value) -> Result<Vec<Trip>> {
        let entries = json["data"].as_array().ok_or_else(|| {
            SolariError::ParseError("Missing or invalid trip data in API response".to_string())
        })?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                let trip_id = entry["id"].as_str()?.to_string();
                let train = entry["attributes"]["name"].as_str()?.to_string();
                let headsign = entry["attributes"]["headsign"].as_str()?.to_string();
                Some(Trip {
                    trip_id,
                    train,
                    headsign,
                })
            })
            .collect())
    }

    /// Join predictions against trip metadata and sort into display order:
    /// departure time ascending, train number as tie-break. A prediction
    /// whose trip id was not returned is dropped rather than shown with
    /// blank destination fields.
    pub fn assemble_rows(predictions: &[Prediction], trips: &[Trip]) -> Vec<DisplayRow> {
        let mut rows: Vec<DisplayRow> = predictions
            .iter()
            .filter_map(|prediction| {
                let trip = match trips.iter().find(|t| t.trip_id == prediction.trip_id) {
                    Some(trip) => trip,
                    None => {
                        warn!(
                            "no trip metadata for {}; dropping its departure row",
                            prediction.trip_id
                        );
                        return None;
                    }
                };
                Some(DisplayRow {
                    departure: prediction.departure,
                    destination: trip.headsign.clone(),
                    train: trip.train.clone(),
                    track: prediction.track.clone(),
                    status: prediction.status.clone(),
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            a.departure
                .cmp(&b.departure)
                .then_with(|| a.train.cmp(&b.train))
        });

        rows
    }

    // ========================================================================
    // HTTP plumbing
    // ========================================================================

    fn endpoint(config: &BoardConfig, path_and_query: &str) -> String {
        let mut url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            path_and_query
        );
        if let Some(key) = &config.api_key {
            url.push(if path_and_query.contains('?') { '&' } else { '?' });
            url.push_str("api_key=");
            url.push_str(key);
        }
        url
    }

    fn get_json(url: &str) -> Result<serde_json::Value> {
        let client = blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                SolariError::NetworkError(format!("Failed to create HTTP client: {}", e))
            })?;

        let response = client.get(url).send().map_err(|e| {
            SolariError::NetworkError(format!(
                "Failed to fetch {}: {}. Check your internet connection.",
                url, e
            ))
        })?;

        if !response.status().is_success() {
            return Err(SolariError::ApiError(format!(
                "API returned error status: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .map_err(|e| SolariError::NetworkError(format!("Failed to read response: {}", e)))?;

        serde_json::from_str(&body)
            .map_err(|e| SolariError::ParseError(format!("Invalid JSON response: {}", e)))
    }

    // ========================================================================
    // Display formatting
    // ========================================================================

    /// Departure column format, Eastern time: "9:10 AM".
    pub fn format_departure(time: &DateTime<Utc>) -> String {
        time.with_timezone(&New_York)
            .format("%l:%M %p")
            .to_string()
            .trim_start()
            .to_string()
    }

    /// Wall-clock and last-updated format, Eastern time.
    pub fn format_clock(time: &DateTime<Utc>) -> String {
        time.with_timezone(&New_York).format("%H:%M:%S").to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn platform(id: &str, code: &str) -> Platform {
        Platform {
            platform_id: id.to_string(),
            platform_code: code.to_string(),
        }
    }

    fn prediction(trip_id: &str, departure: &str, track: &str) -> Prediction {
        Prediction {
            trip_id: trip_id.to_string(),
            departure: utc(departure),
            track: track.to_string(),
            status: None,
        }
    }

    fn trip(trip_id: &str, train: &str, headsign: &str) -> Trip {
        Trip {
            trip_id: trip_id.to_string(),
            train: train.to_string(),
            headsign: headsign.to_string(),
        }
    }

    #[test]
    fn station_with_child_stops_yields_one_platform_per_child() {
        let json = json!({
            "data": { "id": "place-north", "attributes": { "name": "North Station" } },
            "included": [
                { "id": "North Station-01", "attributes": { "platform_code": "1" } },
                { "id": "North Station-02", "attributes": { "platform_code": "2" } },
            ]
        });

        let station = SolariModels::parse_station("place-north", &json).unwrap();

        assert_eq!(station.stop_name, "North Station");
        assert_eq!(station.platforms.len(), 2);
        assert_eq!(station.platforms[0].platform_id, "North Station-01");
        assert_eq!(station.platforms[0].platform_code, "1");
        assert_eq!(station.platforms[1].platform_code, "2");
    }

    #[test]
    fn missing_platform_code_defaults_to_tbd() {
        let json = json!({
            "data": { "attributes": { "name": "North Station" } },
            "included": [
                { "id": "North Station-03", "attributes": { "platform_code": null } },
                { "id": "North Station-04", "attributes": {} },
            ]
        });

        let station = SolariModels::parse_station("place-north", &json).unwrap();

        assert_eq!(station.platforms.len(), 2);
        assert!(station.platforms.iter().all(|p| p.platform_code == "TBD"));
    }

    #[test]
    fn station_without_child_stops_synthesizes_single_platform() {
        let json = json!({
            "data": { "attributes": { "name": "Anderson/Woburn" } }
        });

        let station = SolariModels::parse_station("place-foo", &json).unwrap();

        assert_eq!(station.platforms.len(), 1);
        assert_eq!(station.platforms[0].platform_id, "place-foo");
        assert_eq!(station.platforms[0].platform_code, "");
    }

    #[test]
    fn station_missing_name_is_a_parse_error() {
        let json = json!({ "data": {} });

        match SolariModels::parse_station("place-north", &json) {
            Err(SolariError::ParseError(_)) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn route_ids_extracted_in_api_order() {
        let json = json!({
            "data": [
                { "id": "CR-Fitchburg" },
                { "id": "CR-Haverhill" },
                { "id": "CR-Lowell" },
            ]
        });

        let route_ids = SolariModels::parse_route_ids(&json).unwrap();

        assert_eq!(route_ids, vec!["CR-Fitchburg", "CR-Haverhill", "CR-Lowell"]);
    }

    #[test]
    fn predictions_without_departure_time_are_excluded() {
        let platforms = vec![platform("North Station-01", "1")];
        let json = json!({
            "data": [
                {
                    "attributes": { "departure_time": "2026-08-06T09:10:00-04:00", "status": "On time" },
                    "relationships": {
                        "stop": { "data": { "id": "North Station-01" } },
                        "trip": { "data": { "id": "CR-trip-301" } }
                    }
                },
                {
                    "attributes": { "departure_time": null, "arrival_time": "2026-08-06T09:20:00-04:00" },
                    "relationships": {
                        "stop": { "data": { "id": "North Station-01" } },
                        "trip": { "data": { "id": "CR-trip-302" } }
                    }
                },
            ]
        });

        let predictions = SolariModels::parse_predictions(&json, &platforms).unwrap();

        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].trip_id, "CR-trip-301");
        assert_eq!(predictions[0].status.as_deref(), Some("On time"));
    }

    #[test]
    fn prediction_track_resolves_via_platform_set_or_tbd() {
        let platforms = vec![
            platform("North Station-01", "1"),
            platform("North Station-02", "2"),
        ];
        let json = json!({
            "data": [
                {
                    "attributes": { "departure_time": "2026-08-06T09:10:00-04:00" },
                    "relationships": {
                        "stop": { "data": { "id": "North Station-02" } },
                        "trip": { "data": { "id": "CR-trip-301" } }
                    }
                },
                {
                    "attributes": { "departure_time": "2026-08-06T09:15:00-04:00" },
                    "relationships": {
                        "stop": { "data": { "id": "North Station-99" } },
                        "trip": { "data": { "id": "CR-trip-302" } }
                    }
                },
            ]
        });

        let predictions = SolariModels::parse_predictions(&json, &platforms).unwrap();

        // Unmatched stops fall back to TBD; the prediction itself is kept.
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].track, "2");
        assert_eq!(predictions[1].track, "TBD");
    }

    #[test]
    fn prediction_without_trip_relationship_is_skipped() {
        let platforms = vec![platform("North Station-01", "1")];
        let json = json!({
            "data": [
                {
                    "attributes": { "departure_time": "2026-08-06T09:10:00-04:00" },
                    "relationships": {
                        "stop": { "data": { "id": "North Station-01" } }
                    }
                },
            ]
        });

        let predictions = SolariModels::parse_predictions(&json, &platforms).unwrap();

        assert!(predictions.is_empty());
    }

    #[test]
    fn predictions_document_without_data_array_is_parse_error() {
        let json = json!({ "errors": [{ "status": "400" }] });

        match SolariModels::parse_predictions(&json, &[]) {
            Err(SolariError::ParseError(_)) => {}
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn trips_parsed_by_id() {
        let json = json!({
            "data": [
                { "id": "CR-trip-301", "attributes": { "name": "301", "headsign": "Lowell" } },
                { "id": "CR-trip-205", "attributes": { "name": "205", "headsign": "Fitchburg" } },
            ]
        });

        let trips = SolariModels::parse_trips(&json).unwrap();

        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].train, "301");
        assert_eq!(trips[1].headsign, "Fitchburg");
    }

    #[test]
    fn rows_sorted_by_departure_then_train() {
        let predictions = vec![
            prediction("T1", "2026-08-06T09:10:00-04:00", "1"),
            prediction("T2", "2026-08-06T09:05:00-04:00", "2"),
            prediction("T3", "2026-08-06T09:10:00-04:00", "3"),
        ];
        let trips = vec![
            trip("T1", "102", "Haverhill"),
            trip("T2", "205", "Fitchburg"),
            trip("T3", "101", "Lowell"),
        ];

        let rows = SolariModels::assemble_rows(&predictions, &trips);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].destination, "Fitchburg");
        assert_eq!(rows[0].track, "2");
        // Equal departure times fall back to the train number.
        assert_eq!(rows[1].train, "101");
        assert_eq!(rows[2].train, "102");
        assert!(rows.windows(2).all(|w| w[0].departure <= w[1].departure));
    }

    #[test]
    fn row_count_matches_predictions_when_all_trips_resolve() {
        let predictions = vec![
            prediction("T1", "2026-08-06T09:10:00-04:00", "1"),
            prediction("T2", "2026-08-06T09:05:00-04:00", "TBD"),
        ];
        let trips = vec![trip("T1", "102", "Haverhill"), trip("T2", "205", "Fitchburg")];

        let rows = SolariModels::assemble_rows(&predictions, &trips);

        assert_eq!(rows.len(), predictions.len());
    }

    #[test]
    fn unknown_trip_id_drops_the_row() {
        let predictions = vec![
            prediction("T1", "2026-08-06T09:10:00-04:00", "1"),
            prediction("T-unknown", "2026-08-06T09:05:00-04:00", "2"),
        ];
        let trips = vec![trip("T1", "102", "Haverhill")];

        let rows = SolariModels::assemble_rows(&predictions, &trips);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].train, "102");
    }

    #[test]
    fn assembly_is_idempotent() {
        let predictions = vec![
            prediction("T1", "2026-08-06T09:10:00-04:00", "1"),
            prediction("T2", "2026-08-06T09:05:00-04:00", "2"),
        ];
        let trips = vec![trip("T1", "102", "Haverhill"), trip("T2", "205", "Fitchburg")];

        let first = SolariModels::assemble_rows(&predictions, &trips);
        let second = SolariModels::assemble_rows(&predictions, &trips);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.departure, b.departure);
            assert_eq!(a.train, b.train);
            assert_eq!(a.destination, b.destination);
        }
    }

    #[test]
    fn departure_formatting_uses_eastern_twelve_hour_time() {
        let time = utc("2026-08-06T09:05:00-04:00");

        assert_eq!(SolariModels::format_departure(&time), "9:05 AM");
        assert_eq!(SolariModels::format_clock(&time), "09:05:00");
    }

    #[test]
    fn api_key_appended_to_query() {
        let mut config = BoardConfig::default();
        assert_eq!(
            SolariModels::endpoint(&config, "stops/place-north?include=child_stops"),
            "https://api-v3.mbta.com/stops/place-north?include=child_stops"
        );

        config.api_key = Some("secret".to_string());
        let url = SolariModels::endpoint(&config, "stops/place-north?include=child_stops");
        assert!(url.ends_with("&api_key=secret"));
    }
}
