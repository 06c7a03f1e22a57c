//! Vehicle registry shared with the host.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::vehicle::Vehicle;

pub type SharedVehicle = Arc<RwLock<Vehicle>>;

/// Host-owned vehicle registry keyed by VIN.
///
/// Implementations must not block; locks on the returned vehicles are never
/// held across an await by the connector.
pub trait Garage: Send + Sync {
    /// Add `vehicle` unless its VIN is already present. Returns the stored vehicle.
    fn add_vehicle(&self, vehicle: Vehicle) -> SharedVehicle;

    /// Insert `vehicle`, returning the one it replaced.
    fn replace_vehicle(&self, vehicle: Vehicle) -> Option<SharedVehicle>;

    fn remove_vehicle(&self, vin: &str) -> Option<SharedVehicle>;

    fn get_vehicle(&self, vin: &str) -> Option<SharedVehicle>;

    fn list_vins(&self) -> Vec<String>;
}

/// [`Garage`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryGarage {
    vehicles: RwLock<BTreeMap<String, SharedVehicle>>,
}

impl InMemoryGarage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vehicles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.read().is_empty()
    }

    pub fn vehicles(&self) -> Vec<SharedVehicle> {
        self.vehicles.read().values().cloned().collect()
    }
}

impl Garage for InMemoryGarage {
    fn add_vehicle(&self, vehicle: Vehicle) -> SharedVehicle {
        self.vehicles
            .write()
            .entry(vehicle.vin.clone())
            .or_insert_with(|| Arc::new(RwLock::new(vehicle)))
            .clone()
    }

    fn replace_vehicle(&self, vehicle: Vehicle) -> Option<SharedVehicle> {
        self.vehicles
            .write()
            .insert(vehicle.vin.clone(), Arc::new(RwLock::new(vehicle)))
    }

    fn remove_vehicle(&self, vin: &str) -> Option<SharedVehicle> {
        self.vehicles.write().remove(vin)
    }

    fn get_vehicle(&self, vin: &str) -> Option<SharedVehicle> {
        self.vehicles.read().get(vin).cloned()
    }

    fn list_vins(&self) -> Vec<String> {
        self.vehicles.read().keys().cloned().collect()
    }
}
