use std::fmt::Display;

use chrono::{DateTime, Utc};
#[cfg(feature = "colored-output")]
use colored::*;
use serde::Serialize;
use serde::ser::{SerializeSeq, Serializer};
use volvo_connector::model::{AttributeValue, SharedVehicle};
use volvo_connector::{ConnectionState, Connector, RequestStats};

use crate::{cli::OutputFormat, error::Result};

/// Connector status plus the vehicles it currently manages.
#[derive(Serialize)]
pub struct GarageReport {
    pub connector: String,
    pub state: ConnectionState,
    pub healthy: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub stats: RequestStats,
    #[serde(serialize_with = "serialize_vehicles")]
    pub vehicles: Vec<SharedVehicle>,
}

impl GarageReport {
    pub fn collect(connector: &Connector, vehicles: Vec<SharedVehicle>) -> Self {
        let vehicles = vehicles
            .into_iter()
            .filter(|vehicle| vehicle.read().is_managed_by(connector.id()))
            .collect();
        Self {
            connector: connector.id().to_string(),
            state: connector.connection_state(),
            healthy: connector.is_healthy(),
            last_update: connector.last_update(),
            stats: connector.request_stats(),
            vehicles,
        }
    }
}

fn serialize_vehicles<S: Serializer>(
    vehicles: &[SharedVehicle],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(vehicles.len()))?;
    for vehicle in vehicles {
        seq.serialize_element(&*vehicle.read())?;
    }
    seq.end()
}

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_report(&self, report: &GarageReport, format: &OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.format_pretty(report)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::JsonCompact => Ok(serde_json::to_string(report)?),
        }
    }

    fn format_pretty(&self, report: &GarageReport) -> String {
        let mut output = String::new();
        let last_update = report
            .last_update
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        output.push_str(&format!(
            "{} {} ({}, last update {})\n",
            self.colorize("Connector", &Color::Green, true),
            report.connector,
            self.colorize(&report.state.to_string(), &Color::Cyan, false),
            last_update
        ));
        output.push_str(&format!(
            "  {}: {} sent, {} from cache, {} failed",
            self.colorize("Requests", &Color::Yellow, false),
            report.stats.requests,
            report.stats.cache_hits,
            report.stats.failures
        ));
        if let Some(mean) = report.stats.mean_latency() {
            output.push_str(&format!(", mean latency {} ms", mean.as_millis()));
        }
        output.push('\n');

        if report.vehicles.is_empty() {
            output.push_str("  No vehicles\n");
        }
        for vehicle in &report.vehicles {
            output.push('\n');
            self.format_vehicle(&mut output, vehicle);
        }
        output
    }

    fn format_vehicle(&self, output: &mut String, vehicle: &SharedVehicle) {
        let vehicle = vehicle.read();
        let model = vehicle.model.value().unwrap_or_else(|| "Unknown model".to_string());
        let year = vehicle
            .model_year
            .value()
            .map(|year| format!(" ({year})"))
            .unwrap_or_default();
        output.push_str(&format!(
            "{} {}{}\n",
            self.colorize(&vehicle.vin, &Color::Blue, true),
            model,
            year
        ));

        self.field(output, "Drivetrain", &vehicle.drivetrain.kind());
        if let Some(odometer) = with_unit(&vehicle.odometer.get()) {
            self.field(output, "Odometer", &odometer);
        }
        if let Some(lock) = vehicle.doors.lock_state.value() {
            self.field(output, "Central lock", &lock);
        }
        let open: Vec<&str> = vehicle
            .doors
            .doors
            .iter()
            .filter(|(_, door)| door.open_state.value().is_some_and(|s| s.is_open()))
            .map(|(id, _)| id.as_str())
            .collect();
        if !open.is_empty() {
            self.field(output, "Open", &open.join(", "));
        }
        if let Some(fuel) = vehicle
            .drivetrain
            .combustion()
            .and_then(|c| with_unit(&c.fuel_amount.get()))
        {
            self.field(output, "Fuel", &fuel);
        }
        if let Some(capacity) = vehicle
            .drivetrain
            .electric()
            .and_then(|e| with_unit(&e.battery_capacity.get()))
        {
            self.field(output, "Battery capacity", &capacity);
        }
        if let (Some(latitude), Some(longitude)) = (
            vehicle.position.latitude.value(),
            vehicle.position.longitude.value(),
        ) {
            self.field(output, "Position", &format!("{latitude:.5}, {longitude:.5}"));
        }
    }

    fn field(&self, output: &mut String, label: &str, value: &dyn Display) {
        output.push_str(&format!(
            "  {}: {}\n",
            self.colorize(label, &Color::Yellow, false),
            value
        ));
    }

    fn colorize(&self, text: &str, color: &Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Yellow => text.yellow(),
                    Color::Blue => text.blue(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (self.colored, color, bold);
            text.to_string()
        }
    }
}

fn with_unit(value: &AttributeValue<f64>) -> Option<String> {
    let number = value.value?;
    Some(match value.unit {
        Some(unit) => format!("{number} {unit}"),
        None => number.to_string(),
    })
}

enum Color {
    Green,
    Yellow,
    Blue,
    Cyan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::RwLock;
    use volvo_connector::model::{DriveKind, LockState, Unit, Vehicle};

    fn report() -> GarageReport {
        let mut vehicle = Vehicle::managed("YV1TEST", "volvo");
        vehicle.model.set_value("XC40".to_string());
        vehicle.model_year.set_value(2023);
        vehicle.drivetrain.promote(DriveKind::Electric);
        vehicle.odometer.set(Some(1500.0), None, Some(Unit::Kilometer));
        vehicle.doors.lock_state.set_value(LockState::Locked);

        GarageReport {
            connector: "volvo".to_string(),
            state: ConnectionState::Connected,
            healthy: true,
            last_update: None,
            stats: RequestStats::default(),
            vehicles: vec![Arc::new(RwLock::new(vehicle))],
        }
    }

    #[test]
    fn pretty_output_lists_vehicle_fields() {
        let text = OutputManager::new(false)
            .format_report(&report(), &OutputFormat::Pretty)
            .unwrap();
        assert!(text.contains("YV1TEST XC40 (2023)"));
        assert!(text.contains("Odometer: 1500 km"));
        assert!(text.contains("Central lock: LOCKED"));
        assert!(text.contains("last update never"));
    }

    #[test]
    fn json_output_includes_state_and_vehicles() {
        let text = OutputManager::new(false)
            .format_report(&report(), &OutputFormat::JsonCompact)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["state"], "connected");
        assert_eq!(value["vehicles"][0]["vin"], "YV1TEST");
    }
}
