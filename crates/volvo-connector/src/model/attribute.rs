//! Observable value with change notification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use strum::{Display, EnumString};
use tokio::sync::watch;

/// Measurement units reported by the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(ascii_case_insensitive)]
pub enum Unit {
    #[strum(to_string = "km")]
    #[serde(rename = "km")]
    Kilometer,
    #[strum(to_string = "mi", serialize = "miles")]
    #[serde(rename = "mi")]
    Mile,
    #[strum(to_string = "l", serialize = "liters")]
    #[serde(rename = "l")]
    Liter,
    #[strum(to_string = "gal", serialize = "gallons")]
    #[serde(rename = "gal")]
    Gallon,
    #[strum(to_string = "kWh")]
    #[serde(rename = "kWh")]
    KilowattHour,
    #[strum(to_string = "%", serialize = "percentage")]
    #[serde(rename = "%")]
    Percent,
    #[strum(to_string = "deg", serialize = "degrees")]
    #[serde(rename = "deg")]
    Degree,
}

/// Snapshot of an attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeValue<T> {
    pub value: Option<T>,
    /// When the vehicle measured the value, as reported by the API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measured: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(skip)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub last_changed: Option<DateTime<Utc>>,
}

impl<T> Default for AttributeValue<T> {
    fn default() -> Self {
        Self {
            value: None,
            measured: None,
            unit: None,
            last_updated: None,
            last_changed: None,
        }
    }
}

/// A named observable value.
///
/// Subscribers are only woken when value, measurement time or unit change.
pub struct Attribute<T> {
    name: &'static str,
    sender: watch::Sender<AttributeValue<T>>,
}

impl<T: Clone + PartialEq> Attribute<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sender: watch::Sender::new(AttributeValue::default()),
        }
    }

    pub fn with_value(name: &'static str, value: T) -> Self {
        let attribute = Self::new(name);
        attribute.set(Some(value), None, None);
        attribute
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self) -> Option<T> {
        self.sender.borrow().value.clone()
    }

    pub fn get(&self) -> AttributeValue<T> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AttributeValue<T>> {
        self.sender.subscribe()
    }

    /// Set the value. Returns whether subscribers were notified.
    pub fn set(&self, value: Option<T>, measured: Option<DateTime<Utc>>, unit: Option<Unit>) -> bool {
        let now = Utc::now();
        self.sender.send_if_modified(|current| {
            current.last_updated = Some(now);
            let changed = current.value != value || current.measured != measured || current.unit != unit;
            if changed {
                current.value = value;
                current.measured = measured;
                current.unit = unit;
                current.last_changed = Some(now);
            }
            changed
        })
    }

    pub fn set_value(&self, value: T) -> bool {
        self.set(Some(value), None, None)
    }

    pub fn clear(&self) -> bool {
        self.set(None, None, None)
    }
}

impl<T: fmt::Debug> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("value", &self.sender.borrow().value)
            .finish()
    }
}

impl<T: Serialize> Serialize for Attribute<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sender.borrow().serialize(serializer)
    }
}
