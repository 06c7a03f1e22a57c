use serde_json::Value;

use super::{as_f64, data_object, parse_enum, reading};
use crate::model::{LockState, OpenState, Unit, Vehicle};
use crate::util::log_extra_keys;

const CENTRAL_LOCK: &str = "centralLock";
const DOOR_IDS: &[&str] = &[
    "frontLeftDoor",
    "frontRightDoor",
    "rearLeftDoor",
    "rearRightDoor",
    "hood",
    "tailgate",
    "tankLid",
];
const WINDOW_IDS: &[&str] = &[
    "frontLeftWindow",
    "frontRightWindow",
    "rearLeftWindow",
    "rearRightWindow",
    "sunroof",
];

pub fn apply_doors(vehicle: &mut Vehicle, payload: Option<&Value>) {
    let Some(data) = data_object(payload) else {
        vehicle.doors.clear();
        return;
    };

    match reading(data, CENTRAL_LOCK).and_then(|r| r.value.as_str().map(|v| (v, r.measured))) {
        Some((raw, measured)) => {
            let state: LockState = parse_enum(CENTRAL_LOCK, raw);
            vehicle.doors.lock_state.set(Some(state), measured, None);
        }
        None => {
            vehicle.doors.lock_state.clear();
        }
    }

    for id in DOOR_IDS {
        let door = vehicle.doors.door(id);
        match reading(data, id).and_then(|r| r.value.as_str().map(|v| (v, r.measured))) {
            Some((raw, measured)) => {
                let state: OpenState = parse_enum(id, raw);
                door.open_state.set(Some(state), measured, None);
            }
            None => {
                door.open_state.clear();
            }
        }
    }

    let mut known = DOOR_IDS.to_vec();
    known.push(CENTRAL_LOCK);
    log_extra_keys("doors", data, &known);
}

pub fn apply_windows(vehicle: &mut Vehicle, payload: Option<&Value>) {
    let Some(data) = data_object(payload) else {
        vehicle.windows.clear();
        return;
    };

    for id in WINDOW_IDS {
        let window = vehicle.windows.window(id);
        match reading(data, id).and_then(|r| r.value.as_str().map(|v| (v, r.measured))) {
            Some((raw, measured)) => {
                let state: OpenState = parse_enum(id, raw);
                window.open_state.set(Some(state), measured, None);
            }
            None => {
                window.open_state.clear();
            }
        }
    }
    log_extra_keys("windows", data, WINDOW_IDS);
}

pub fn apply_odometer(vehicle: &mut Vehicle, payload: Option<&Value>) {
    let odometer = data_object(payload).and_then(|data| {
        log_extra_keys("odometer", data, &["odometer"]);
        reading(data, "odometer")
    });
    match odometer.and_then(|r| as_f64(r.value).map(|v| (v, r.measured, r.unit))) {
        Some((value, measured, unit)) => {
            vehicle
                .odometer
                .set(Some(value), measured, unit.or(Some(Unit::Kilometer)));
        }
        None => {
            vehicle.odometer.clear();
        }
    }
}

/// Fuel level in liters. Ignored for vehicles without a combustion engine.
pub fn apply_fuel(vehicle: &mut Vehicle, payload: Option<&Value>) {
    let Some(combustion) = vehicle.drivetrain.combustion() else {
        return;
    };
    let fuel = data_object(payload).and_then(|data| {
        log_extra_keys("fuel", data, &["fuelAmount"]);
        reading(data, "fuelAmount")
    });
    match fuel.and_then(|r| as_f64(r.value).map(|v| (v, r.measured, r.unit))) {
        Some((value, measured, unit)) => {
            combustion
                .fuel_amount
                .set(Some(value), measured, unit.or(Some(Unit::Liter)));
        }
        None => {
            combustion.fuel_amount.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DriveKind;
    use serde_json::json;

    #[test]
    fn doors_and_lock_are_mapped() {
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {
            "centralLock": {"value": "LOCKED", "timestamp": "2024-05-01T10:00:00.000Z"},
            "frontLeftDoor": {"value": "CLOSED", "timestamp": "2024-05-01T10:00:00.000Z"},
            "tailgate": {"value": "OPEN", "timestamp": "2024-05-01T10:00:00.000Z"},
            "hood": {"value": "UNSPECIFIED", "timestamp": "2024-05-01T10:00:00.000Z"}
        }});
        apply_doors(&mut vehicle, Some(&payload));

        assert_eq!(vehicle.doors.lock_state.value(), Some(LockState::Locked));
        assert!(vehicle.doors.lock_state.get().measured.is_some());
        let door = |id: &str| vehicle.doors.doors[id].open_state.value();
        assert_eq!(door("frontLeftDoor"), Some(OpenState::Closed));
        assert_eq!(door("tailgate"), Some(OpenState::Open));
        assert_eq!(door("hood"), Some(OpenState::Unknown));
        assert_eq!(door("rearLeftDoor"), None);
    }

    #[test]
    fn missing_payload_clears_doors() {
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {"centralLock": {"value": "UNLOCKED"}, "hood": {"value": "OPEN"}}});
        apply_doors(&mut vehicle, Some(&payload));
        apply_doors(&mut vehicle, None);

        assert_eq!(vehicle.doors.lock_state.value(), None);
        assert_eq!(vehicle.doors.doors["hood"].open_state.value(), None);
    }

    #[test]
    fn windows_are_mapped() {
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {"sunroof": {"value": "AJAR"}, "frontLeftWindow": {"value": "CLOSED"}}});
        apply_windows(&mut vehicle, Some(&payload));

        assert_eq!(vehicle.windows.windows["sunroof"].open_state.value(), Some(OpenState::Ajar));
        assert_eq!(
            vehicle.windows.windows["frontLeftWindow"].open_state.value(),
            Some(OpenState::Closed)
        );
    }

    #[test]
    fn odometer_keeps_reported_unit() {
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {"odometer": {"value": 30000, "unit": "mi", "timestamp": "2024-05-01T10:00:00Z"}}});
        apply_odometer(&mut vehicle, Some(&payload));

        let odometer = vehicle.odometer.get();
        assert_eq!(odometer.value, Some(30000.0));
        assert_eq!(odometer.unit, Some(Unit::Mile));

        apply_odometer(&mut vehicle, None);
        assert_eq!(vehicle.odometer.value(), None);
    }

    #[test]
    fn fuel_only_applies_to_combustion_drivetrains() {
        let payload = json!({"data": {"fuelAmount": {"value": "47.3", "unit": "l"}}});

        let mut electric = Vehicle::new("YV1");
        electric.drivetrain.promote(DriveKind::Electric);
        apply_fuel(&mut electric, Some(&payload));
        assert!(electric.drivetrain.combustion().is_none());

        let mut hybrid = Vehicle::new("YV2");
        hybrid.drivetrain.promote(DriveKind::Hybrid);
        apply_fuel(&mut hybrid, Some(&payload));
        assert_eq!(
            hybrid.drivetrain.combustion().unwrap().fuel_amount.value(),
            Some(47.3)
        );
    }
}
