use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CONNECTED_VEHICLE_URL, VolvoApi, data_object, parse_enum};
use crate::error::{ConnectorError, Result};
use crate::fetch::FetchOptions;
use crate::model::{DriveKind, SteeringPosition, Unit, Vehicle};
use crate::util::{API_LOG_TARGET, log_extra_keys};

const DETAIL_KEYS: &[&str] = &[
    "vin",
    "modelYear",
    "gearbox",
    "fuelType",
    "externalColour",
    "batteryCapacityKWH",
    "images",
    "descriptions",
];
const DESCRIPTION_KEYS: &[&str] = &["model", "upholstery", "steering"];

impl VolvoApi {
    /// Enumerate the account's vehicles and reconcile the garage.
    ///
    /// New VINs are added and managed by this connector, details are refreshed
    /// for every listed VIN and managed vehicles that are no longer listed are
    /// removed.
    pub async fn fetch_vehicles(&self) -> Result<()> {
        let listing = self
            .fetcher
            .fetch_data(CONNECTED_VEHICLE_URL, &self.connected_vehicle, &FetchOptions::new())
            .await?;
        let vins = vehicle_list(listing.as_ref())?;

        let mut seen = HashSet::with_capacity(vins.len());
        for vin in vins {
            if self.hide_vins.contains(&vin) {
                debug!(vin = %vin, "Skipping hidden vehicle");
                continue;
            }
            seen.insert(vin.clone());

            let vehicle = match self.garage.get_vehicle(&vin) {
                Some(vehicle) => vehicle,
                None => {
                    info!(vin = %vin, "Adding new vehicle");
                    self.garage
                        .add_vehicle(Vehicle::managed(vin.clone(), &self.connector_id))
                }
            };

            let url = format!("{CONNECTED_VEHICLE_URL}/{vin}");
            let details = self
                .fetcher
                .fetch_data(&url, &self.connected_vehicle, &FetchOptions::new())
                .await?;
            apply_vehicle_details(&mut vehicle.write(), details.as_ref());
        }

        for vin in self.garage.list_vins() {
            if seen.contains(&vin) {
                continue;
            }
            let Some(vehicle) = self.garage.get_vehicle(&vin) else {
                continue;
            };
            let managed = vehicle.read().is_managed_by(&self.connector_id);
            if managed {
                info!(vin = %vin, "Removing vehicle no longer listed by the account");
                self.garage.remove_vehicle(&vin);
            }
        }
        Ok(())
    }
}

/// VINs from the vehicle list payload.
pub fn vehicle_list(payload: Option<&Value>) -> Result<Vec<String>> {
    let Some(entries) = payload
        .and_then(|p| p.get("data"))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };

    entries
        .iter()
        .map(|entry| {
            entry
                .get("vin")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ConnectorError::api_compatibility("could not fetch vehicle data, VIN missing")
                })
        })
        .collect()
}

/// Drivetrain implied by the API's `fuelType`. `None` when it says nothing.
pub fn drive_kind_for_fuel(fuel_type: &str) -> Option<DriveKind> {
    match fuel_type.to_ascii_uppercase().as_str() {
        "ELECTRIC" => Some(DriveKind::Electric),
        "PETROL" | "DIESEL" | "GASOLINE" => Some(DriveKind::Combustion),
        "PETROL/ELECTRIC" | "DIESEL/ELECTRIC" | "HYBRID" | "PHEV" | "MHEV" => {
            Some(DriveKind::Hybrid)
        }
        "NONE" | "" => None,
        other => {
            warn!(target: API_LOG_TARGET, fuel_type = other, "Unknown fuel type");
            None
        }
    }
}

/// Apply the vehicle details payload.
pub fn apply_vehicle_details(vehicle: &mut Vehicle, payload: Option<&Value>) {
    let Some(data) = data_object(payload) else {
        return;
    };

    if let Some(year) = data.get("modelYear").and_then(Value::as_i64) {
        vehicle.model_year.set_value(year);
    }

    if let Some(descriptions) = data.get("descriptions").and_then(Value::as_object) {
        if let Some(model) = descriptions.get("model").and_then(Value::as_str) {
            vehicle.model.set_value(model.to_string());
        }
        if let Some(steering) = descriptions.get("steering").and_then(Value::as_str) {
            let position: SteeringPosition = parse_enum("steering", steering);
            vehicle.steering_wheel_position.set_value(position);
        }
        log_extra_keys("descriptions", descriptions, DESCRIPTION_KEYS);
    }

    if let Some(kind) = data
        .get("fuelType")
        .and_then(Value::as_str)
        .and_then(drive_kind_for_fuel)
        && vehicle.drivetrain.promote(kind)
    {
        debug!(vin = %vehicle.vin, drivetrain = %kind, "Drivetrain changed");
    }

    if let (Some(capacity), Some(electric)) = (
        data.get("batteryCapacityKWH").and_then(Value::as_f64),
        vehicle.drivetrain.electric(),
    ) {
        electric
            .battery_capacity
            .set(Some(capacity), None, Some(Unit::KilowattHour));
    }

    if let Some(images) = data.get("images").and_then(Value::as_object) {
        vehicle.images = images
            .iter()
            .filter_map(|(id, url)| url.as_str().map(|url| (id.clone(), url.to_string())))
            .collect();
    }

    log_extra_keys(CONNECTED_VEHICLE_URL, data, DETAIL_KEYS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::logs::LogCapture;
    use serde_json::json;
    use tracing::Level;

    fn details() -> Value {
        json!({"data": {
            "vin": "YV4952NA4F120DEMO",
            "modelYear": 2019,
            "gearbox": "AUTOMATIC",
            "fuelType": "PETROL/ELECTRIC",
            "externalColour": "SAVILE GREY",
            "batteryCapacityKWH": 11.6,
            "images": {
                "exteriorImageUrl": "https://cas.volvocars.com/exterior.png",
                "internalImageUrl": "https://cas.volvocars.com/interior.png"
            },
            "descriptions": {"model": "V60 II", "upholstery": "CHARCOAL", "steering": "LEFT"}
        }})
    }

    #[test]
    fn details_populate_vehicle() {
        let mut vehicle = Vehicle::new("YV4952NA4F120DEMO");
        apply_vehicle_details(&mut vehicle, Some(&details()));

        assert_eq!(vehicle.model.value().as_deref(), Some("V60 II"));
        assert_eq!(vehicle.model_year.value(), Some(2019));
        assert_eq!(vehicle.steering_wheel_position.value(), Some(SteeringPosition::Left));
        assert_eq!(vehicle.drivetrain.kind(), DriveKind::Hybrid);
        assert_eq!(
            vehicle.drivetrain.electric().unwrap().battery_capacity.value(),
            Some(11.6)
        );
        assert_eq!(vehicle.images.len(), 2);
    }

    #[test]
    fn unknown_steering_maps_to_unknown_with_warning() {
        let (logs, _guard) = LogCapture::install();
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {"descriptions": {"steering": "SIDEWAYS"}}});
        apply_vehicle_details(&mut vehicle, Some(&payload));
        assert_eq!(
            vehicle.steering_wheel_position.value(),
            Some(SteeringPosition::Unknown)
        );
        assert!(logs.contains(crate::API_LOG_TARGET, Level::WARN));
    }

    #[test]
    fn known_steering_is_not_reported() {
        let (logs, _guard) = LogCapture::install();
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {"descriptions": {"steering": "LEFT"}}});
        apply_vehicle_details(&mut vehicle, Some(&payload));
        assert_eq!(
            vehicle.steering_wheel_position.value(),
            Some(SteeringPosition::Left)
        );
        assert!(!logs.contains(crate::API_LOG_TARGET, Level::WARN));
    }

    #[test]
    fn list_requires_vins() {
        let payload = json!({"data": [{"vin": "A"}, {"vin": "B"}]});
        assert_eq!(vehicle_list(Some(&payload)).unwrap(), vec!["A", "B"]);
        assert!(vehicle_list(None).unwrap().is_empty());

        let broken = json!({"data": [{"vin": "A"}, {"model": "XC40"}]});
        assert!(matches!(
            vehicle_list(Some(&broken)),
            Err(ConnectorError::ApiCompatibility(_))
        ));
    }

    #[test]
    fn fuel_types_select_drivetrain() {
        assert_eq!(drive_kind_for_fuel("ELECTRIC"), Some(DriveKind::Electric));
        assert_eq!(drive_kind_for_fuel("diesel"), Some(DriveKind::Combustion));
        assert_eq!(drive_kind_for_fuel("PETROL/ELECTRIC"), Some(DriveKind::Hybrid));
        assert_eq!(drive_kind_for_fuel("NONE"), None);
        assert_eq!(drive_kind_for_fuel("HYDROGEN"), None);
    }
}
