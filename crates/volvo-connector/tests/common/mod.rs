#![allow(dead_code)]

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use volvo_connector::api::{CONNECTED_VEHICLE_URL, LOCATION_URL};
use volvo_connector::model::InMemoryGarage;
use volvo_connector::test_utils::ScriptedTransport;
use volvo_connector::{ConnectorConfig, ConnectorHost, MemoryStore};

pub const VIN: &str = "YV1DZ8256C2271234";

#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn config() -> ConnectorConfig {
    ConnectorConfig::new("primary-key", "secondary-key", "access-token")
}

pub fn url(path: &str) -> String {
    format!("{CONNECTED_VEHICLE_URL}{path}")
}

pub fn location_url(vin: &str) -> String {
    format!("{LOCATION_URL}/{vin}/location")
}

pub fn vehicle_list(vins: &[&str]) -> Value {
    let entries: Vec<Value> = vins.iter().map(|vin| json!({"vin": vin})).collect();
    json!({"data": entries})
}

/// Serve a complete diesel vehicle at every endpoint a cycle touches.
pub fn route_vehicle(transport: &ScriptedTransport, vin: &str) {
    transport.route(
        &url(&format!("/{vin}")),
        StatusCode::OK,
        json!({"data": {
            "vin": vin,
            "modelYear": 2022,
            "fuelType": "DIESEL",
            "descriptions": {"model": "XC60", "steering": "LEFT"}
        }}),
    );
    transport.route(
        &url(&format!("/{vin}/doors")),
        StatusCode::OK,
        json!({"data": {"centralLock": {"value": "LOCKED", "timestamp": "2024-05-01T10:00:00Z"}}}),
    );
    transport.route(
        &url(&format!("/{vin}/windows")),
        StatusCode::OK,
        json!({"data": {"sunroof": {"value": "CLOSED"}}}),
    );
    transport.route(
        &url(&format!("/{vin}/odometer")),
        StatusCode::OK,
        json!({"data": {"odometer": {"value": 12345, "unit": "km"}}}),
    );
    transport.route(
        &url(&format!("/{vin}/fuel")),
        StatusCode::OK,
        json!({"data": {"fuelAmount": {"value": "41.5", "unit": "l"}}}),
    );
    transport.route(
        &location_url(vin),
        StatusCode::OK,
        json!({"data": {
            "type": "Feature",
            "properties": {"timestamp": "2024-05-01T10:00:00Z", "heading": "180"},
            "geometry": {"type": "Point", "coordinates": [11.97, 57.70, 0.0]}
        }}),
    );
}

/// Requests made by one full resync of a single diesel vehicle.
pub fn resync_urls(vin: &str) -> Vec<String> {
    vec![
        url(""),
        url(&format!("/{vin}")),
        url(&format!("/{vin}/doors")),
        url(&format!("/{vin}/windows")),
        url(&format!("/{vin}/odometer")),
        url(&format!("/{vin}/fuel")),
        location_url(vin),
    ]
}

pub struct Harness {
    pub garage: Arc<InMemoryGarage>,
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            garage: Arc::new(InMemoryGarage::new()),
            store: Arc::new(MemoryStore::new()),
            transport: Arc::new(ScriptedTransport::new()),
        }
    }

    pub fn host(&self) -> ConnectorHost {
        ConnectorHost {
            garage: self.garage.clone(),
            token_store: self.store.clone(),
            cache_store: self.store.clone(),
            transport: self.transport.clone(),
        }
    }
}
