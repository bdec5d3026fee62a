//! Projection of positions onto the published gauges

use crate::error::{ExporterError, Result};
use crate::models::{AttributeRenameRules, DeviceMap, PositionSnapshot};
use crate::snapshot::Snapshot;
use tracing::warn;

/// Outcome of a complete update pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSummary {
    pub positions: usize,
    pub attributes: usize,
}

/// Writes joined position and device data into a [`Snapshot`]
#[derive(Clone)]
pub struct SnapshotUpdater {
    snapshot: Snapshot,
}

impl SnapshotUpdater {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Apply one cycle's positions
    ///
    /// Rows are applied in order. A position whose device is missing from
    /// `devices` stops the pass with [`ExporterError::UnknownDevice`]; rows
    /// written before it stay visible.
    ///
    /// Attributes are written in document order, so when a renamed I/O key
    /// and a raw key land on the same display name the later one wins.
    pub fn update(
        &self,
        positions: &[PositionSnapshot],
        devices: &DeviceMap,
        rename_rules: &AttributeRenameRules,
    ) -> Result<UpdateSummary> {
        if positions.len() > devices.len() {
            warn!(
                positions = positions.len(),
                devices = devices.len(),
                "More positions than known devices"
            );
        }

        let mut summary = UpdateSummary::default();

        for position in positions {
            let device = devices
                .get(&position.device_id)
                .ok_or(ExporterError::UnknownDevice {
                    device_id: position.device_id,
                })?;
            let (name, unique_id) = (device.name.as_str(), device.unique_id.as_str());

            self.snapshot.set_latitude(name, unique_id, position.latitude);
            self.snapshot.set_longitude(name, unique_id, position.longitude);
            self.snapshot.set_altitude(name, unique_id, position.altitude);
            self.snapshot.set_speed(name, unique_id, position.speed);
            self.snapshot.set_course(name, unique_id, position.course);

            for (raw_key, value) in &position.attributes {
                let key = rename_rules.get(raw_key).unwrap_or(raw_key);
                self.snapshot.set_attribute(name, unique_id, key, *value);
                summary.attributes += 1;
            }

            summary.positions += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Device;
    use crate::positions::decode_position;
    use crate::store::memory::record;
    use chrono::NaiveDateTime;
    use prometheus::Registry;
    use std::collections::HashMap;

    fn setup() -> (SnapshotUpdater, Snapshot) {
        let snapshot = Snapshot::new(Registry::new()).unwrap();
        (SnapshotUpdater::new(snapshot.clone()), snapshot)
    }

    fn devices(entries: &[(i64, &str, &str)]) -> DeviceMap {
        entries
            .iter()
            .map(|(id, name, unique_id)| {
                (
                    *id,
                    Device {
                        id: *id,
                        name: name.to_string(),
                        unique_id: unique_id.to_string(),
                    },
                )
            })
            .collect()
    }

    fn position(device_id: i64, speed: f64, attributes: &[(&str, f64)]) -> PositionSnapshot {
        PositionSnapshot {
            device_id,
            server_time: NaiveDateTime::parse_from_str("2024-01-01 10:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            latitude: 10.5,
            longitude: 20.1,
            altitude: 5.0,
            speed,
            course: 90.0,
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    fn rules(entries: &[(&str, &str)]) -> AttributeRenameRules {
        entries
            .iter()
            .map(|(raw, display)| (raw.to_string(), display.to_string()))
            .collect()
    }

    #[test]
    fn test_end_to_end_example() {
        let (updater, snapshot) = setup();

        let summary = updater
            .update(
                &[position(1, 30.0, &[("io1", 1.0), ("temp", 22.0)])],
                &devices(&[(1, "truck1", "abc")]),
                &rules(&[("io1", "ignition")]),
            )
            .unwrap();

        assert_eq!(summary, UpdateSummary { positions: 1, attributes: 2 });
        assert_eq!(snapshot.scalar_value("latitude", "truck1", "abc"), 10.5);
        assert_eq!(snapshot.scalar_value("longitude", "truck1", "abc"), 20.1);
        assert_eq!(snapshot.scalar_value("altitude", "truck1", "abc"), 5.0);
        assert_eq!(snapshot.scalar_value("speed", "truck1", "abc"), 30.0);
        assert_eq!(snapshot.scalar_value("course", "truck1", "abc"), 90.0);
        assert_eq!(snapshot.attribute_value("truck1", "abc", "ignition"), 1.0);
        assert_eq!(snapshot.attribute_value("truck1", "abc", "temp"), 22.0);
    }

    #[test]
    fn test_renamed_key_replaces_raw_key() {
        let (updater, snapshot) = setup();

        updater
            .update(
                &[position(1, 30.0, &[("io1", 1.0), ("io2", 0.0)])],
                &devices(&[(1, "truck1", "abc")]),
                &rules(&[("io1", "ignition")]),
            )
            .unwrap();

        let text = String::from_utf8(snapshot.encode().unwrap()).unwrap();
        assert!(text.contains(r#"attribute="ignition""#));
        assert!(!text.contains(r#"attribute="io1""#));
        assert!(text.contains(r#"attribute="io2""#));
        assert_eq!(snapshot.attribute_series(), 2);
    }

    #[test]
    fn test_display_key_collision_is_stable_across_cycles() {
        let (updater, snapshot) = setup();
        let devices = devices(&[(1, "truck1", "abc")]);
        let rules = rules(&[("io1", "ignition")]);

        for _ in 0..50 {
            let decoded = decode_position(record(
                1,
                "2024-01-01 10:00:00",
                Some(r#"{"io1":1,"ignition":0}"#),
            ))
            .unwrap();
            updater.update(&[decoded.position], &devices, &rules).unwrap();

            // "ignition" follows "io1" in the document and is written last
            assert_eq!(snapshot.attribute_value("truck1", "abc", "ignition"), 0.0);
        }

        let decoded = decode_position(record(
            1,
            "2024-01-01 10:00:00",
            Some(r#"{"ignition":0,"io1":1}"#),
        ))
        .unwrap();
        updater.update(&[decoded.position], &devices, &rules).unwrap();
        assert_eq!(snapshot.attribute_value("truck1", "abc", "ignition"), 1.0);
        assert_eq!(snapshot.attribute_series(), 1);
    }

    #[test]
    fn test_update_is_idempotent() {
        let (updater, snapshot) = setup();
        let positions = vec![
            position(1, 30.0, &[("io1", 1.0), ("temp", 22.0)]),
            position(2, 55.0, &[("io3", 4.0)]),
        ];
        let devices = devices(&[(1, "truck1", "abc"), (2, "truck2", "def")]);
        let rules = rules(&[("io1", "ignition")]);

        updater.update(&positions, &devices, &rules).unwrap();
        let first = snapshot.encode().unwrap();
        updater.update(&positions, &devices, &rules).unwrap();
        let second = snapshot.encode().unwrap();

        assert_eq!(first, second);
        assert_eq!(snapshot.device_series(), 2);
        assert_eq!(snapshot.attribute_series(), 3);
    }

    #[test]
    fn test_unknown_device_aborts_remaining_rows() {
        let (updater, snapshot) = setup();

        let err = updater
            .update(
                &[
                    position(1, 30.0, &[]),
                    position(99, 40.0, &[]),
                    position(2, 50.0, &[]),
                ],
                &devices(&[(1, "truck1", "abc"), (2, "truck2", "def")]),
                &HashMap::new(),
            )
            .unwrap_err();

        assert!(matches!(err, ExporterError::UnknownDevice { device_id: 99 }));
        let text = String::from_utf8(snapshot.encode().unwrap()).unwrap();
        assert!(text.contains("truck1"));
        assert!(!text.contains("truck2"));
    }

    #[test]
    fn test_more_positions_than_devices_still_updates() {
        let (updater, snapshot) = setup();

        // Two rows for one device is a store bug, but the pass completes
        let summary = updater
            .update(
                &[position(1, 30.0, &[]), position(1, 35.0, &[])],
                &devices(&[(1, "truck1", "abc")]),
                &HashMap::new(),
            )
            .unwrap();

        assert_eq!(summary.positions, 2);
        assert_eq!(snapshot.scalar_value("speed", "truck1", "abc"), 35.0);
    }

    #[test]
    fn test_stale_devices_are_not_retracted() {
        let (updater, snapshot) = setup();
        let all = devices(&[(1, "truck1", "abc"), (2, "truck2", "def")]);

        updater
            .update(&[position(1, 30.0, &[]), position(2, 50.0, &[])], &all, &HashMap::new())
            .unwrap();
        updater
            .update(&[position(1, 31.0, &[])], &all, &HashMap::new())
            .unwrap();

        assert_eq!(snapshot.device_series(), 2);
        assert_eq!(snapshot.scalar_value("speed", "truck2", "def"), 50.0);
    }
}
