//! Published device state
//!
//! [`Snapshot`] owns the gauge families scraped by Prometheus. Each series is
//! created on first write and lives until the process exits; devices that stop
//! reporting keep their last value.

use crate::error::Result;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

const DEVICE_LABELS: &[&str] = &["name", "uniqueid"];
const ATTRIBUTE_LABELS: &[&str] = &["name", "uniqueid", "attribute"];

/// Gauge families for the latest known state of every device
#[derive(Clone)]
pub struct Snapshot {
    registry: Registry,
    latitude: GaugeVec,
    longitude: GaugeVec,
    altitude: GaugeVec,
    speed: GaugeVec,
    course: GaugeVec,
    attribute: GaugeVec,
}

impl Snapshot {
    /// Create the gauge families and register them into `registry`
    pub fn new(registry: Registry) -> Result<Self> {
        let latitude = device_gauge(&registry, "traccar_latitude", "Device latitude")?;
        let longitude = device_gauge(&registry, "traccar_longitude", "Device longitude")?;
        let altitude = device_gauge(&registry, "traccar_altitude", "Device altitude")?;
        let speed = device_gauge(&registry, "traccar_speed", "Device speed")?;
        let course = device_gauge(&registry, "traccar_course", "Device course")?;

        let attribute = GaugeVec::new(
            Opts::new("traccar_attribute", "Device I/O attribute"),
            ATTRIBUTE_LABELS,
        )?;
        registry.register(Box::new(attribute.clone()))?;

        Ok(Self {
            registry,
            latitude,
            longitude,
            altitude,
            speed,
            course,
            attribute,
        })
    }

    pub fn set_latitude(&self, name: &str, unique_id: &str, value: f64) {
        self.latitude.with_label_values(&[name, unique_id]).set(value);
    }

    pub fn set_longitude(&self, name: &str, unique_id: &str, value: f64) {
        self.longitude.with_label_values(&[name, unique_id]).set(value);
    }

    pub fn set_altitude(&self, name: &str, unique_id: &str, value: f64) {
        self.altitude.with_label_values(&[name, unique_id]).set(value);
    }

    pub fn set_speed(&self, name: &str, unique_id: &str, value: f64) {
        self.speed.with_label_values(&[name, unique_id]).set(value);
    }

    pub fn set_course(&self, name: &str, unique_id: &str, value: f64) {
        self.course.with_label_values(&[name, unique_id]).set(value);
    }

    pub fn set_attribute(&self, name: &str, unique_id: &str, key: &str, value: f64) {
        self.attribute
            .with_label_values(&[name, unique_id, key])
            .set(value);
    }

    /// Render every registered family in the text exposition format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Number of distinct series in the attribute family
    #[cfg(test)]
    pub(crate) fn attribute_series(&self) -> usize {
        series_count(&self.registry, "traccar_attribute")
    }

    /// Number of distinct devices in the latitude family
    #[cfg(test)]
    pub(crate) fn device_series(&self) -> usize {
        series_count(&self.registry, "traccar_latitude")
    }

    #[cfg(test)]
    pub(crate) fn scalar_value(&self, metric: &str, name: &str, unique_id: &str) -> f64 {
        let gauge = match metric {
            "latitude" => &self.latitude,
            "longitude" => &self.longitude,
            "altitude" => &self.altitude,
            "speed" => &self.speed,
            "course" => &self.course,
            other => panic!("unknown metric {other}"),
        };
        gauge.with_label_values(&[name, unique_id]).get()
    }

    #[cfg(test)]
    pub(crate) fn attribute_value(&self, name: &str, unique_id: &str, key: &str) -> f64 {
        self.attribute
            .with_label_values(&[name, unique_id, key])
            .get()
    }
}

fn device_gauge(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), DEVICE_LABELS)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

#[cfg(test)]
fn series_count(registry: &Registry, family: &str) -> usize {
    registry
        .gather()
        .iter()
        .find(|mf| mf.get_name() == family)
        .map(|mf| mf.get_metric().len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_last_write_wins() {
        let snapshot = Snapshot::new(Registry::new()).unwrap();

        snapshot.set_speed("truck1", "abc", 30.0);
        snapshot.set_speed("truck1", "abc", 45.0);

        assert_eq!(snapshot.scalar_value("speed", "truck1", "abc"), 45.0);
    }

    #[test]
    fn test_series_are_created_lazily() {
        let snapshot = Snapshot::new(Registry::new()).unwrap();
        assert_eq!(snapshot.attribute_series(), 0);

        snapshot.set_attribute("truck1", "abc", "ignition", 1.0);
        snapshot.set_attribute("truck1", "abc", "temp", 22.0);
        snapshot.set_attribute("truck1", "abc", "temp", 23.0);

        assert_eq!(snapshot.attribute_series(), 2);
        assert_eq!(snapshot.attribute_value("truck1", "abc", "temp"), 23.0);
    }

    #[test]
    fn test_encode_uses_exposition_names_and_labels() {
        let snapshot = Snapshot::new(Registry::new()).unwrap();
        snapshot.set_latitude("truck1", "abc", 10.5);
        snapshot.set_attribute("truck1", "abc", "ignition", 1.0);

        let text = String::from_utf8(snapshot.encode().unwrap()).unwrap();

        assert!(text.contains("# TYPE traccar_latitude gauge"));
        assert!(text.contains(r#"traccar_latitude{name="truck1",uniqueid="abc"} 10.5"#));
        assert!(text.contains(
            r#"traccar_attribute{attribute="ignition",name="truck1",uniqueid="abc"} 1"#
        ));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = Snapshot::new(Registry::new()).unwrap();
        let second = Snapshot::new(Registry::new()).unwrap();

        first.set_latitude("truck1", "abc", 10.5);

        assert_eq!(first.device_series(), 1);
        assert_eq!(second.device_series(), 0);
        let text = String::from_utf8(second.encode().unwrap()).unwrap();
        assert!(!text.contains("truck1"));
    }

    #[test]
    fn test_double_registration_is_rejected() {
        let registry = Registry::new();
        let _snapshot = Snapshot::new(registry.clone()).unwrap();
        assert!(Snapshot::new(registry).is_err());
    }
}
