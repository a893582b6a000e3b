use crate::config::{
    ClockTime, LapseConfig, MotionZone, ScheduleException, SeasonalRule,
};
use crate::error::{LapseError, Result, SettingsError};
use crate::schedule::cron::validate_cron_pattern;
use parking_lot::RwLock;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Typed access to persisted settings using dotted keys such as `camera.default_interval`
pub trait SettingsStore: Send + Sync {
    /// A consistent copy of every setting with defaults applied
    fn snapshot(&self) -> LapseConfig;

    fn get(&self, key: &str) -> Result<Value>;

    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Settings kept in memory and optionally persisted to a TOML file on every write
pub struct TomlSettingsStore {
    config: RwLock<LapseConfig>,
    path: Option<PathBuf>,
}

impl TomlSettingsStore {
    /// Load from `path` (missing file means defaults) and persist changes back to it
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let config = LapseConfig::load_from_file(&path)?;
        config.validate()?;
        info!("Settings loaded from {}", path.display());
        Ok(Self {
            config: RwLock::new(config),
            path: Some(path),
        })
    }

    /// Settings that never touch the filesystem
    pub fn in_memory(config: LapseConfig) -> Self {
        Self {
            config: RwLock::new(config),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply a typed mutation, validate the result and persist it
    pub fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut LapseConfig) -> Result<()>,
    {
        let mut guard = self.config.write();
        let mut candidate = guard.clone();
        mutate(&mut candidate)?;
        candidate.validate()?;
        self.persist(&candidate)?;
        *guard = candidate;
        Ok(())
    }

    fn persist(&self, config: &LapseConfig) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let text = config.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Persist {
                path: path.clone(),
                source,
            })?;
        }
        std::fs::write(path, text).map_err(|source| SettingsError::Persist {
            path: path.clone(),
            source,
        })?;
        debug!("Settings persisted to {}", path.display());
        Ok(())
    }

    pub fn add_motion_zone(&self, zone: ZoneRequest) -> Result<MotionZone> {
        if zone.x < 0 || zone.y < 0 {
            return Err(SettingsError::InvalidZone {
                message: "zone origin must not be negative".to_string(),
            }
            .into());
        }
        if zone.width <= 0 || zone.height <= 0 {
            return Err(SettingsError::InvalidZone {
                message: "zone width and height must be positive".to_string(),
            }
            .into());
        }
        let to_u32 = |v: i64| {
            u32::try_from(v).map_err(|_| SettingsError::InvalidZone {
                message: format!("coordinate {} is out of range", v),
            })
        };

        let id = format!("zone-{}", uuid::Uuid::new_v4().simple());
        let mut created = None;
        self.update(|config| {
            let zones = &mut config.motion_detection.zones;
            let new_zone = MotionZone {
                x: to_u32(zone.x)?,
                y: to_u32(zone.y)?,
                width: to_u32(zone.width)?,
                height: to_u32(zone.height)?,
                id: id.clone(),
                name: zone
                    .name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("Zone {}", zones.len() + 1)),
            };
            zones.push(new_zone.clone());
            created = Some(new_zone);
            Ok(())
        })?;

        created.ok_or_else(|| LapseError::system("motion zone was not created"))
    }

    /// Returns whether a zone with `id` existed
    pub fn remove_motion_zone(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        self.update(|config| {
            let zones = &mut config.motion_detection.zones;
            let before = zones.len();
            zones.retain(|z| z.id != id);
            removed = zones.len() != before;
            Ok(())
        })?;
        Ok(removed)
    }

    pub fn add_cron_pattern(&self, pattern: &str) -> Result<()> {
        if !validate_cron_pattern(pattern) {
            return Err(SettingsError::InvalidCronPattern {
                pattern: pattern.to_string(),
            }
            .into());
        }
        self.update(|config| {
            config.scheduling.cron_patterns.push(pattern.trim().to_string());
            Ok(())
        })
    }

    pub fn add_seasonal_rule(
        &self,
        months: Vec<u32>,
        start_time: ClockTime,
        end_time: ClockTime,
    ) -> Result<()> {
        self.update(|config| {
            config.scheduling.seasonal_rules.push(SeasonalRule {
                months,
                start_time,
                end_time,
            });
            Ok(())
        })
    }

    pub fn add_schedule_exception(&self, exception: ScheduleException) -> Result<()> {
        if exception.date.is_none() && exception.date_range.is_none() {
            return Err(SettingsError::InvalidValue {
                key: "scheduling.exceptions".to_string(),
                message: "an exception needs a date or a date range".to_string(),
            }
            .into());
        }
        self.update(|config| {
            config.scheduling.exceptions.push(exception);
            Ok(())
        })
    }
}

impl SettingsStore for TomlSettingsStore {
    fn snapshot(&self) -> LapseConfig {
        self.config.read().clone()
    }

    fn get(&self, key: &str) -> Result<Value> {
        let tree = serde_json::to_value(&*self.config.read())?;
        lookup(&tree, key)
            .cloned()
            .ok_or_else(|| SettingsError::UnknownKey { key: key.to_string() }.into())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.update(|config| {
            let mut tree = serde_json::to_value(&*config)?;
            let slot = lookup_mut(&mut tree, key).ok_or_else(|| SettingsError::UnknownKey {
                key: key.to_string(),
            })?;
            *slot = value;
            *config = serde_json::from_value(tree).map_err(|e| SettingsError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
            Ok(())
        })?;
        debug!("Setting {} updated", key);
        Ok(())
    }
}

/// Input for a new motion zone; signed so that negative coordinates can be rejected
#[derive(Debug, Clone, Default)]
pub struct ZoneRequest {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub name: Option<String>,
}

fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(tree, |node, part| node.as_object()?.get(part))
}

// Optional fields are absent from the tree while unset, so the last segment may be created
fn lookup_mut<'a>(tree: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    let (parent, last) = match key.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, key),
    };
    let mut node = tree;
    if let Some(parent) = parent {
        for part in parent.split('.') {
            node = node.as_object_mut()?.get_mut(part)?;
        }
    }
    let object = node.as_object_mut()?;
    if !object.contains_key(last) && !OPTIONAL_KEYS.contains(&key) {
        return None;
    }
    Some(object.entry(last.to_string()).or_insert(Value::Null))
}

const OPTIONAL_KEYS: &[&str] = &["ftp.port", "auto_timelapse.last_run"];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_reads_dotted_keys() {
        let store = TomlSettingsStore::in_memory(LapseConfig::default());
        assert_eq!(store.get("camera.default_interval").unwrap(), json!(30));
        assert_eq!(store.get("video.default_quality").unwrap(), json!("high"));
        assert!(matches!(
            store.get("camera.nope"),
            Err(LapseError::Settings(SettingsError::UnknownKey { .. }))
        ));
    }

    #[test]
    fn test_set_updates_typed_snapshot() {
        let store = TomlSettingsStore::in_memory(LapseConfig::default());
        store.set("storage.max_storage_gb", json!(0.5)).unwrap();
        store.set("ftp.port", json!(2121)).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.storage.max_storage_gb, 0.5);
        assert_eq!(snapshot.ftp.effective_port(), 2121);
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let store = TomlSettingsStore::in_memory(LapseConfig::default());
        assert!(store.set("camera.default_interval", json!("soon")).is_err());
        assert!(store.set("motion_detection.sensitivity", json!(150)).is_err());
        assert!(store.set("unknown.key", json!(1)).is_err());
        assert_eq!(store.snapshot(), LapseConfig::default());
    }

    #[test]
    fn test_set_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lapsecam.toml");

        let store = TomlSettingsStore::open(&path).unwrap();
        store.set("camera.default_interval", json!(5)).unwrap();
        store.set("auto_timelapse.last_run", json!("2024-05-01T12:00:00Z")).unwrap();
        drop(store);

        let reopened = TomlSettingsStore::open(&path).unwrap();
        let snapshot = reopened.snapshot();
        assert_eq!(snapshot.camera.default_interval, 5);
        assert!(snapshot.auto_timelapse.last_run.is_some());
    }

    #[test]
    fn test_motion_zone_helpers() {
        let store = TomlSettingsStore::in_memory(LapseConfig::default());
        assert!(store
            .add_motion_zone(ZoneRequest {
                x: -1,
                y: 0,
                width: 10,
                height: 10,
                name: None,
            })
            .is_err());
        assert!(store
            .add_motion_zone(ZoneRequest {
                x: 0,
                y: 0,
                width: 0,
                height: 10,
                name: None,
            })
            .is_err());

        let zone = store
            .add_motion_zone(ZoneRequest {
                x: 10,
                y: 20,
                width: 30,
                height: 40,
                name: None,
            })
            .unwrap();
        assert_eq!(zone.name, "Zone 1");
        assert_eq!(store.snapshot().motion_detection.zones.len(), 1);

        assert!(store.remove_motion_zone(&zone.id).unwrap());
        assert!(!store.remove_motion_zone(&zone.id).unwrap());
        assert!(store.snapshot().motion_detection.zones.is_empty());
    }

    #[test]
    fn test_schedule_helpers() {
        let store = TomlSettingsStore::in_memory(LapseConfig::default());
        assert!(store.add_cron_pattern("not a pattern").is_err());
        store.add_cron_pattern("0 9-17 * * 1-5").unwrap();

        store
            .add_seasonal_rule(
                vec![12, 1, 2],
                "09:00".parse().unwrap(),
                "16:00".parse().unwrap(),
            )
            .unwrap();

        assert!(store
            .add_schedule_exception(ScheduleException {
                date: None,
                date_range: None,
                action: Default::default(),
            })
            .is_err());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.scheduling.cron_patterns, vec!["0 9-17 * * 1-5"]);
        assert_eq!(snapshot.scheduling.seasonal_rules.len(), 1);
        assert!(snapshot.scheduling.exceptions.is_empty());
    }
}
