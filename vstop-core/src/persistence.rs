//! Engine state persistence — last-known trailing-stop state per symbol.
//!
//! Only recurrence state crosses restarts: the trailing stops and the Wilder
//! ATR carry. Derived series, swings and cross events are recomputed from
//! whatever bar history the caller supplies. A snapshot is written once per
//! processed bar and read once at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::indicators::WilderAtr;
use crate::trailing_stop::StopSnapshot;

/// Everything needed to continue a symbol's recurrence as bar `i-1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub last_timestamp: Option<NaiveDateTime>,
    pub last_close: Option<f64>,
    pub bars_seen: usize,
    pub stops: Vec<StopSnapshot>,
    /// Absent in snapshots written before the carry was persisted; the ATR
    /// is then rebuilt from the resume history.
    #[serde(default)]
    pub atr: Option<WilderAtr>,
}

impl EngineSnapshot {
    pub fn stop(&self, multiplier: f64) -> Option<&StopSnapshot> {
        self.stops.iter().find(|s| s.multiplier == multiplier)
    }
}

/// Storage collaborator for engine snapshots.
pub trait StateStore: Send + Sync {
    fn load(&self, symbol: &str) -> Result<Option<EngineSnapshot>, StateError>;

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StateError>;
}

/// One pretty-printed JSON file per symbol under a directory.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for `symbol`. Path separators in the symbol are replaced.
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        let name: String = symbol
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl StateStore for JsonStateStore {
    /// A missing file is a cold start, not an error.
    fn load(&self, symbol: &str) -> Result<Option<EngineSnapshot>, StateError> {
        let path = self.path_for(symbol);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Io { path, source }),
        };
        let snapshot: EngineSnapshot = serde_json::from_str(&content)?;
        if snapshot.symbol != symbol {
            return Err(StateError::SymbolMismatch {
                expected: symbol.to_string(),
                got: snapshot.symbol,
            });
        }
        Ok(Some(snapshot))
    }

    /// Write to a temp file, then rename over the target.
    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StateError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StateError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(&snapshot.symbol);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)?;
        std::fs::write(&tmp, json).map_err(|source| StateError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| StateError::Io { path, source })
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshots: Mutex<HashMap<String, EngineSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, symbol: &str) -> Result<Option<EngineSnapshot>, StateError> {
        let snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(snapshots.get(symbol).cloned())
    }

    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), StateError> {
        let mut snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshots.insert(snapshot.symbol.clone(), snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::warmup::WarmupState;
    use crate::trailing_stop::TrailingStopState;
    use chrono::NaiveDate;

    fn warm(lookback: usize, processed: usize) -> WarmupState {
        let mut warmup = WarmupState::new(lookback);
        for _ in 0..processed {
            warmup.process_bar();
        }
        warmup
    }

    fn snapshot(symbol: &str) -> EngineSnapshot {
        EngineSnapshot {
            symbol: symbol.into(),
            last_timestamp: NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(15, 29, 0),
            last_close: Some(52_140.5),
            bars_seen: 640,
            stops: vec![
                StopSnapshot {
                    multiplier: 2.0,
                    state: Some(TrailingStopState {
                        running_max: 52_300.0,
                        running_min: 51_980.0,
                        trend_up: true,
                        stop: Some(52_010.0),
                    }),
                    seed_close: None,
                    warmup: warm(252, 640),
                },
                StopSnapshot {
                    multiplier: 3.0,
                    state: None,
                    seed_close: Some(52_140.5),
                    warmup: warm(252, 640),
                },
            ],
            atr: Some(WilderAtr::new(252)),
        }
    }

    #[test]
    fn json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        let snap = snapshot("BANKNIFTY");

        store.save(&snap).unwrap();
        let loaded = store.load("BANKNIFTY").unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(loaded.stop(3.0).unwrap().seed_close, Some(52_140.5));
        assert!(loaded.stop(4.0).is_none());
    }

    #[test]
    fn snapshot_without_atr_carry_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        let mut value = serde_json::to_value(snapshot("NIFTY")).unwrap();
        value.as_object_mut().unwrap().remove("atr");
        std::fs::write(store.path_for("NIFTY"), value.to_string()).unwrap();

        let loaded = store.load("NIFTY").unwrap().unwrap();
        assert!(loaded.atr.is_none());
        assert_eq!(loaded.stops.len(), 2);
    }

    #[test]
    fn missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("nested"));
        assert!(store.load("NIFTY").unwrap().is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        std::fs::write(store.path_for("NIFTY"), "not valid json {{{").unwrap();
        assert!(matches!(store.load("NIFTY"), Err(StateError::Encoding(_))));
    }

    #[test]
    fn file_for_other_symbol_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        store.save(&snapshot("NIFTY")).unwrap();
        std::fs::rename(store.path_for("NIFTY"), store.path_for("FINNIFTY")).unwrap();
        assert!(matches!(
            store.load("FINNIFTY"),
            Err(StateError::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        let mut snap = snapshot("NIFTY");
        store.save(&snap).unwrap();
        snap.bars_seen += 1;
        store.save(&snap).unwrap();
        assert_eq!(store.load("NIFTY").unwrap().unwrap().bars_seen, 641);
        assert!(!store.path_for("NIFTY").with_extension("json.tmp").exists());
    }

    #[test]
    fn memory_store_keys_by_symbol() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty());
        store.save(&snapshot("NIFTY")).unwrap();
        store.save(&snapshot("BANKNIFTY")).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.load("NIFTY").unwrap().unwrap().symbol, "NIFTY");
        assert!(store.load("SENSEX").unwrap().is_none());
    }
}
