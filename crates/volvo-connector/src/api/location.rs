use serde_json::Value;

use super::{as_f64, data_object};
use crate::model::{PositionType, Unit, Vehicle};
use crate::util::{log_extra_keys, parse_timestamp};

/// Apply a location API payload (a GeoJSON point feature).
///
/// Coordinates are `[longitude, latitude, altitude]`.
pub fn apply_location(vehicle: &mut Vehicle, payload: Option<&Value>) {
    let position = &vehicle.position;
    let Some(data) = data_object(payload) else {
        position.clear();
        return;
    };
    log_extra_keys("location", data, &["type", "properties", "geometry"]);

    let properties = data.get("properties").and_then(Value::as_object);
    let measured = properties
        .and_then(|p| p.get("timestamp"))
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    let heading = properties.and_then(|p| p.get("heading")).and_then(as_f64);

    let coordinates = data
        .get("geometry")
        .and_then(|g| g.get("coordinates"))
        .and_then(Value::as_array)
        .filter(|c| c.len() >= 2)
        .and_then(|c| Some((as_f64(&c[0])?, as_f64(&c[1])?)));

    match coordinates {
        Some((longitude, latitude)) => {
            position.latitude.set(Some(latitude), measured, None);
            position.longitude.set(Some(longitude), measured, None);
            position.heading.set(heading, measured, heading.map(|_| Unit::Degree));
            position
                .position_type
                .set(Some(PositionType::Parking), measured, None);
        }
        None => position.clear(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn geojson_point_sets_position() {
        let mut vehicle = Vehicle::new("YV1");
        let payload = json!({"data": {
            "type": "Feature",
            "properties": {"timestamp": "2024-05-01T10:00:00.000Z", "heading": "90"},
            "geometry": {"type": "Point", "coordinates": [11.97, 57.70, 0.0]}
        }});
        apply_location(&mut vehicle, Some(&payload));

        assert_eq!(vehicle.position.latitude.value(), Some(57.70));
        assert_eq!(vehicle.position.longitude.value(), Some(11.97));
        assert_eq!(vehicle.position.heading.value(), Some(90.0));
        assert_eq!(vehicle.position.position_type.value(), Some(PositionType::Parking));
        assert!(vehicle.position.latitude.get().measured.is_some());
    }

    #[test]
    fn missing_coordinates_clear_position() {
        let mut vehicle = Vehicle::new("YV1");
        vehicle.position.latitude.set_value(1.0);
        vehicle.position.longitude.set_value(2.0);

        let payload = json!({"data": {"type": "Feature", "geometry": {"coordinates": []}}});
        apply_location(&mut vehicle, Some(&payload));
        assert_eq!(vehicle.position.latitude.value(), None);

        vehicle.position.latitude.set_value(1.0);
        apply_location(&mut vehicle, None);
        assert_eq!(vehicle.position.latitude.value(), None);
        assert_eq!(vehicle.position.position_type.value(), None);
    }
}
