use super::extras::Extras;
use super::validate::ValidationError;
use super::Feature;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

/// A configured delivery target as written in the feature file.
///
/// Hand-edited files sometimes carry ids as strings or garbage; those entries
/// survive loading and are skipped when the destination set is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DestinationRef {
    Id(u64),
    Raw(String),
    Invalid(Value),
}

impl DestinationRef {
    pub fn channel_id(&self) -> Option<u64> {
        match self {
            DestinationRef::Id(id) => Some(*id).filter(|id| *id > 0),
            DestinationRef::Raw(raw) => raw.trim().parse::<u64>().ok().filter(|id| *id > 0),
            DestinationRef::Invalid(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self.channel_id() {
            Some(id) => format!("<#{}>", id),
            None => match self {
                DestinationRef::Raw(raw) => format!("`{}` (invalid)", raw),
                other => format!("`{:?}` (invalid)", other),
            },
        }
    }
}

impl From<u64> for DestinationRef {
    fn from(id: u64) -> Self {
        DestinationRef::Id(id)
    }
}

/// Durable per-feature configuration.
///
/// Container-level `default` backfills any key missing on disk from
/// `FeatureConfig::default()`; unknown keys are ignored and disappear on the
/// next write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, bound(serialize = "X: Extras", deserialize = "X: Extras"))]
pub struct FeatureConfig<X> {
    pub enabled: bool,
    #[serde(rename = "channel_id", deserialize_with = "lenient_destinations")]
    pub destinations: Vec<DestinationRef>,
    pub interval_minutes: u64,
    #[serde(flatten)]
    pub extras: X,
}

impl<X: Extras> Default for FeatureConfig<X> {
    fn default() -> Self {
        Self {
            enabled: false,
            destinations: Vec::new(),
            interval_minutes: X::DEFAULT_INTERVAL_MINUTES,
            extras: X::default(),
        }
    }
}

impl<X: Extras> FeatureConfig<X> {
    /// Channel ids in configured order, duplicates and invalid entries removed.
    pub fn channel_ids(&self) -> Vec<u64> {
        let mut ids = Vec::with_capacity(self.destinations.len());
        for id in self.destinations.iter().filter_map(DestinationRef::channel_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

// Older files stored a single id (or null) instead of a list.
fn lenient_destinations<'de, D>(deserializer: D) -> Result<Vec<DestinationRef>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let refs = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(to_destination_ref).collect(),
        single => vec![to_destination_ref(single)],
    };
    Ok(refs)
}

fn to_destination_ref(value: Value) -> DestinationRef {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(id) => DestinationRef::Id(id),
            None => DestinationRef::Invalid(Value::Number(n)),
        },
        Value::String(s) => DestinationRef::Raw(s),
        other => DestinationRef::Invalid(other),
    }
}

/// One feature's configuration file plus its authoritative in-memory copy.
pub struct FeatureStore<X: Extras> {
    feature: Feature,
    path: PathBuf,
    config: FeatureConfig<X>,
}

impl<X: Extras> FeatureStore<X> {
    /// Open the feature's file inside `dir`.
    pub fn open(feature: Feature, dir: &Path) -> Self {
        Self::load(feature, dir.join(feature.file_name()))
    }

    /// Load the configuration at `path`.
    ///
    /// A missing file is created with defaults. A file that cannot be parsed
    /// is left untouched on disk and an in-memory default copy is used.
    pub fn load(feature: Feature, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            feature,
            path,
            config: FeatureConfig::default(),
        };

        match fs::read_to_string(&store.path) {
            Ok(raw) => match serde_json::from_str::<FeatureConfig<X>>(&raw) {
                Ok(config) => {
                    debug!(
                        "Loaded {} config from {}",
                        feature.key(),
                        store.path.display()
                    );
                    store.config = config;
                }
                Err(e) => {
                    error!(
                        "Failed loading {} config from {} - using defaults: {}",
                        feature.key(),
                        store.path.display(),
                        e
                    );
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No {} config at {}, writing defaults",
                    feature.key(),
                    store.path.display()
                );
                store.save();
            }
            Err(e) => {
                error!(
                    "Failed reading {} config from {} - using defaults: {}",
                    feature.key(),
                    store.path.display(),
                    e
                );
            }
        }

        store
    }

    pub fn feature(&self) -> Feature {
        self.feature
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &FeatureConfig<X> {
        &self.config
    }

    /// Rewrite the whole file. Failures are logged and reported as `false`;
    /// the in-memory copy stays authoritative either way.
    pub fn save(&self) -> bool {
        match self.write() {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Failed saving {} config to {}: {}",
                    self.feature.key(),
                    self.path.display(),
                    e
                );
                false
            }
        }
    }

    fn write(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Merge top-level keys from `partial` into the config and persist.
    ///
    /// The merged document is re-validated against the schema; a document
    /// that no longer deserializes is rejected and nothing changes.
    pub fn update(
        &mut self,
        partial: Map<String, Value>,
    ) -> Result<FeatureConfig<X>, ValidationError> {
        let mut merged = match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => return Err(ValidationError::Invalid(e.to_string())),
        };
        for (key, value) in partial {
            merged.insert(key, value);
        }

        let config: FeatureConfig<X> = serde_json::from_value(Value::Object(merged))
            .map_err(|e| ValidationError::Invalid(e.to_string()))?;
        self.config = config;
        self.save();
        Ok(self.config.clone())
    }

    /// Apply an in-place change and persist.
    pub fn modify(&mut self, change: impl FnOnce(&mut FeatureConfig<X>)) -> FeatureConfig<X> {
        change(&mut self.config);
        self.save();
        self.config.clone()
    }

    /// Reset to defaults and persist.
    pub fn clear(&mut self) -> FeatureConfig<X> {
        warn!("Resetting {} config to defaults", self.feature.key());
        self.config = FeatureConfig::default();
        self.save();
        self.config.clone()
    }
}

/// Cloneable handle shared by a feature's broadcast loop and admin commands.
/// The lock is only ever held for synchronous read-modify-write steps.
pub struct FeatureHandle<X: Extras> {
    inner: Arc<Mutex<FeatureStore<X>>>,
}

impl<X: Extras> Clone for FeatureHandle<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<X: Extras> FeatureHandle<X> {
    pub fn new(store: FeatureStore<X>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn open(feature: Feature, dir: &Path) -> Self {
        Self::new(FeatureStore::open(feature, dir))
    }

    fn lock(&self) -> MutexGuard<'_, FeatureStore<X>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn feature(&self) -> Feature {
        self.lock().feature()
    }

    pub fn snapshot(&self) -> FeatureConfig<X> {
        self.lock().config().clone()
    }

    pub fn update(&self, partial: Map<String, Value>) -> Result<FeatureConfig<X>, ValidationError> {
        self.lock().update(partial)
    }

    pub fn modify(&self, change: impl FnOnce(&mut FeatureConfig<X>)) -> FeatureConfig<X> {
        self.lock().modify(change)
    }

    pub fn clear(&self) -> FeatureConfig<X> {
        self.lock().clear()
    }
}
