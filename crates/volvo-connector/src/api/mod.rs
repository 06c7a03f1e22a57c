//! Volvo API field refreshers.
//!
//! Every refresher goes through [`Fetcher::fetch_data`] and then hands the
//! payload to a pure `apply_*` function that writes into the vehicle model.
//! A `None` payload clears the attributes the refresher owns.

mod location;
mod status;
mod vehicles;

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::auth::Session;
use crate::error::Result;
use crate::fetch::{FetchOptions, Fetcher};
use crate::model::{Garage, SharedVehicle, Unit};
use crate::poll::PollCycle;
use crate::util::{API_LOG_TARGET, parse_timestamp};

pub use location::apply_location;
pub use status::{apply_doors, apply_fuel, apply_odometer, apply_windows};
pub use vehicles::{apply_vehicle_details, drive_kind_for_fuel, vehicle_list};

pub const CONNECTED_VEHICLE_URL: &str = "https://api.volvocars.com/connected-vehicle/v2/vehicles";
pub const LOCATION_URL: &str = "https://api.volvocars.com/location/v1/vehicles";

/// Poll cycle implementation against the Volvo cloud APIs.
pub struct VolvoApi {
    connector_id: String,
    garage: Arc<dyn Garage>,
    fetcher: Arc<Fetcher>,
    connected_vehicle: Arc<Session>,
    location: Arc<Session>,
    hide_vins: HashSet<String>,
}

impl VolvoApi {
    pub fn new(
        connector_id: impl Into<String>,
        garage: Arc<dyn Garage>,
        fetcher: Arc<Fetcher>,
        connected_vehicle: Arc<Session>,
        location: Arc<Session>,
        hide_vins: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            connector_id: connector_id.into(),
            garage,
            fetcher,
            connected_vehicle,
            location,
            hide_vins: hide_vins.into_iter().collect(),
        }
    }

    /// Refresh every vehicle in the garage that this connector manages.
    pub async fn update_vehicles(&self) -> Result<()> {
        for vin in self.garage.list_vins() {
            let Some(vehicle) = self.garage.get_vehicle(&vin) else {
                continue;
            };
            let managed = vehicle.read().is_managed_by(&self.connector_id);
            if !managed {
                continue;
            }
            self.refresh_vehicle(&vin, &vehicle).await?;
        }
        Ok(())
    }

    async fn refresh_vehicle(&self, vin: &str, vehicle: &SharedVehicle) -> Result<()> {
        debug!(vin, "Refreshing vehicle");
        let status_options = FetchOptions::new().allow_empty();
        let optional_options = FetchOptions::new()
            .allow_empty()
            .allow_errors([StatusCode::NOT_FOUND]);

        let url = format!("{CONNECTED_VEHICLE_URL}/{vin}/doors");
        let doors = self.fetch_connected(&url, &status_options).await?;
        apply_doors(&mut vehicle.write(), doors.as_ref());

        let url = format!("{CONNECTED_VEHICLE_URL}/{vin}/windows");
        let windows = self.fetch_connected(&url, &status_options).await?;
        apply_windows(&mut vehicle.write(), windows.as_ref());

        let url = format!("{CONNECTED_VEHICLE_URL}/{vin}/odometer");
        let odometer = self.fetch_connected(&url, &status_options).await?;
        apply_odometer(&mut vehicle.write(), odometer.as_ref());

        let has_combustion = vehicle.read().drivetrain.combustion().is_some();
        if has_combustion {
            let url = format!("{CONNECTED_VEHICLE_URL}/{vin}/fuel");
            let fuel = self.fetch_connected(&url, &optional_options).await?;
            apply_fuel(&mut vehicle.write(), fuel.as_ref());
        }

        let url = format!("{LOCATION_URL}/{vin}/location");
        let location = self
            .fetcher
            .fetch_data(&url, &self.location, &optional_options)
            .await?;
        apply_location(&mut vehicle.write(), location.as_ref());

        Ok(())
    }

    async fn fetch_connected(&self, url: &str, options: &FetchOptions) -> Result<Option<Value>> {
        self.fetcher
            .fetch_data(url, &self.connected_vehicle, options)
            .await
    }
}

#[async_trait]
impl PollCycle for VolvoApi {
    async fn full_resync(&self) -> Result<()> {
        self.fetch_vehicles().await?;
        self.update_vehicles().await
    }

    async fn refresh(&self) -> Result<()> {
        self.update_vehicles().await
    }
}

/// The `data` object of an API envelope.
pub(crate) fn data_object(payload: Option<&Value>) -> Option<&Map<String, Value>> {
    payload?.get("data")?.as_object()
}

/// A `{"value": .., "unit": .., "timestamp": ..}` field.
pub(crate) struct Reading<'a> {
    pub value: &'a Value,
    pub unit: Option<Unit>,
    pub measured: Option<DateTime<Utc>>,
}

pub(crate) fn reading<'a>(data: &'a Map<String, Value>, key: &str) -> Option<Reading<'a>> {
    let field = data.get(key)?.as_object()?;
    let value = field.get("value").filter(|v| !v.is_null())?;
    let unit = field.get("unit").and_then(Value::as_str).and_then(|raw| {
        Unit::from_str(raw)
            .inspect_err(|_| warn!(target: API_LOG_TARGET, field = key, unit = raw, "Unknown unit"))
            .ok()
    });
    let measured = field
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    Some(Reading {
        value,
        unit,
        measured,
    })
}

/// Parse an API enum string, mapping anything unknown to the default variant.
pub(crate) fn parse_enum<T: FromStr + Default>(context: &str, raw: &str) -> T {
    T::from_str(raw).unwrap_or_else(|_| {
        warn!(target: API_LOG_TARGET, context, value = raw, "Unknown enum value");
        T::default()
    })
}

/// Numbers sometimes arrive as strings.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
