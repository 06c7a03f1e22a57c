//! Host-side vehicle model the connector writes into.

pub mod attribute;
pub mod garage;
pub mod vehicle;

pub use attribute::{Attribute, AttributeValue, Unit};
pub use garage::{Garage, InMemoryGarage, SharedVehicle};
pub use vehicle::{
    CombustionDrive, Door, Doors, DriveKind, Drivetrain, ElectricDrive, LockState, OpenState,
    Position, PositionType, SteeringPosition, Vehicle, Window, Windows,
};
