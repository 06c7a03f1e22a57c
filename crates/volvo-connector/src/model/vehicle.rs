//! Vehicle record and its sub-structures.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;

use serde::Serialize;
use strum::{Display, EnumString};

use super::attribute::Attribute;

pub const MANUFACTURER: &str = "Volvo";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum SteeringPosition {
    Left,
    Right,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum OpenState {
    Open,
    Closed,
    Ajar,
    #[default]
    #[strum(to_string = "UNKNOWN", serialize = "UNSPECIFIED")]
    Unknown,
}

impl OpenState {
    /// Open or ajar.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::Ajar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
    #[default]
    #[strum(to_string = "UNKNOWN", serialize = "UNSPECIFIED")]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    Parking,
    Driving,
    Unknown,
}

#[derive(Debug, Serialize)]
pub struct Position {
    pub latitude: Attribute<f64>,
    pub longitude: Attribute<f64>,
    pub heading: Attribute<f64>,
    pub position_type: Attribute<PositionType>,
}

impl Position {
    fn new() -> Self {
        Self {
            latitude: Attribute::new("latitude"),
            longitude: Attribute::new("longitude"),
            heading: Attribute::new("heading"),
            position_type: Attribute::new("position_type"),
        }
    }

    pub fn clear(&self) {
        self.latitude.clear();
        self.longitude.clear();
        self.heading.clear();
        self.position_type.clear();
    }
}

#[derive(Debug, Serialize)]
pub struct Door {
    pub open_state: Attribute<OpenState>,
}

#[derive(Debug, Serialize)]
pub struct Doors {
    /// Central lock of the whole vehicle.
    pub lock_state: Attribute<LockState>,
    /// Keyed by the API field name, e.g. `frontLeftDoor` or `tailgate`.
    pub doors: BTreeMap<String, Door>,
}

impl Doors {
    fn new() -> Self {
        Self {
            lock_state: Attribute::new("lock_state"),
            doors: BTreeMap::new(),
        }
    }

    pub fn door(&mut self, id: &str) -> &Door {
        self.doors.entry(id.to_string()).or_insert_with(|| Door {
            open_state: Attribute::new("open_state"),
        })
    }

    pub fn clear(&self) {
        self.lock_state.clear();
        for door in self.doors.values() {
            door.open_state.clear();
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Window {
    pub open_state: Attribute<OpenState>,
}

#[derive(Debug, Serialize)]
pub struct Windows {
    pub windows: BTreeMap<String, Window>,
}

impl Windows {
    fn new() -> Self {
        Self {
            windows: BTreeMap::new(),
        }
    }

    pub fn window(&mut self, id: &str) -> &Window {
        self.windows.entry(id.to_string()).or_insert_with(|| Window {
            open_state: Attribute::new("open_state"),
        })
    }

    pub fn clear(&self) {
        for window in self.windows.values() {
            window.open_state.clear();
        }
    }
}

/// Tag of a [`Drivetrain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DriveKind {
    Unknown,
    Combustion,
    Electric,
    Hybrid,
}

#[derive(Debug, Serialize)]
pub struct CombustionDrive {
    pub fuel_amount: Attribute<f64>,
}

impl CombustionDrive {
    pub fn new() -> Self {
        Self {
            fuel_amount: Attribute::new("fuel_amount"),
        }
    }
}

impl Default for CombustionDrive {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct ElectricDrive {
    pub battery_capacity: Attribute<f64>,
}

impl ElectricDrive {
    pub fn new() -> Self {
        Self {
            battery_capacity: Attribute::new("battery_capacity"),
        }
    }
}

impl Default for ElectricDrive {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Drivetrain {
    #[default]
    Unknown,
    Combustion(CombustionDrive),
    Electric(ElectricDrive),
    Hybrid {
        combustion: CombustionDrive,
        electric: ElectricDrive,
    },
}

impl Drivetrain {
    pub fn kind(&self) -> DriveKind {
        match self {
            Self::Unknown => DriveKind::Unknown,
            Self::Combustion(_) => DriveKind::Combustion,
            Self::Electric(_) => DriveKind::Electric,
            Self::Hybrid { .. } => DriveKind::Hybrid,
        }
    }

    pub fn combustion(&self) -> Option<&CombustionDrive> {
        match self {
            Self::Combustion(drive) | Self::Hybrid { combustion: drive, .. } => Some(drive),
            _ => None,
        }
    }

    pub fn electric(&self) -> Option<&ElectricDrive> {
        match self {
            Self::Electric(drive) | Self::Hybrid { electric: drive, .. } => Some(drive),
            _ => None,
        }
    }

    /// Rebuild the drivetrain as `kind`, keeping the sub-structures that
    /// still apply. Returns whether the kind changed.
    pub fn promote(&mut self, kind: DriveKind) -> bool {
        if self.kind() == kind {
            return false;
        }

        let (combustion, electric) = match mem::take(self) {
            Self::Unknown => (None, None),
            Self::Combustion(c) => (Some(c), None),
            Self::Electric(e) => (None, Some(e)),
            Self::Hybrid {
                combustion,
                electric,
            } => (Some(combustion), Some(electric)),
        };

        *self = match kind {
            DriveKind::Unknown => Self::Unknown,
            DriveKind::Combustion => Self::Combustion(combustion.unwrap_or_default()),
            DriveKind::Electric => Self::Electric(electric.unwrap_or_default()),
            DriveKind::Hybrid => Self::Hybrid {
                combustion: combustion.unwrap_or_default(),
                electric: electric.unwrap_or_default(),
            },
        };
        true
    }
}

#[derive(Debug, Serialize)]
pub struct Vehicle {
    pub vin: String,
    pub manufacturer: Attribute<String>,
    pub model: Attribute<String>,
    pub model_year: Attribute<i64>,
    pub steering_wheel_position: Attribute<SteeringPosition>,
    pub odometer: Attribute<f64>,
    pub position: Position,
    pub doors: Doors,
    pub windows: Windows,
    /// Image URLs keyed by the API's image id, e.g. `exteriorImageUrl`.
    pub images: BTreeMap<String, String>,
    pub is_active: Attribute<bool>,
    pub drivetrain: Drivetrain,
    managing_connectors: BTreeSet<String>,
}

impl Vehicle {
    pub fn new(vin: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            manufacturer: Attribute::with_value("manufacturer", MANUFACTURER.to_string()),
            model: Attribute::new("model"),
            model_year: Attribute::new("model_year"),
            steering_wheel_position: Attribute::new("steering_wheel_position"),
            odometer: Attribute::new("odometer"),
            position: Position::new(),
            doors: Doors::new(),
            windows: Windows::new(),
            images: BTreeMap::new(),
            is_active: Attribute::with_value("is_active", true),
            drivetrain: Drivetrain::Unknown,
            managing_connectors: BTreeSet::new(),
        }
    }

    /// New vehicle managed by `connector_id`.
    pub fn managed(vin: impl Into<String>, connector_id: &str) -> Self {
        let mut vehicle = Self::new(vin);
        vehicle.add_managing_connector(connector_id);
        vehicle
    }

    pub fn add_managing_connector(&mut self, connector_id: &str) {
        self.managing_connectors.insert(connector_id.to_string());
    }

    pub fn is_managed_by(&self, connector_id: &str) -> bool {
        self.managing_connectors.contains(connector_id)
    }

    /// Managed by `connector_id` and nobody else.
    pub fn is_solely_managed_by(&self, connector_id: &str) -> bool {
        self.managing_connectors.len() == 1 && self.is_managed_by(connector_id)
    }
}
