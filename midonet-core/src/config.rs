//! Tunable simulation constants (§6), loaded from TOML with optional
//! hot-reload via `notify`, following the reference workspace's
//! `nyx-core::config` load/watch pattern.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Tunable constants from §6. Defaults match the historical system.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub max_devices_traversed: u32,
    pub temporary_drop_millis: u64,
    pub idle_expiration_millis: u64,
    pub return_flow_expiration_millis: u64,
    /// Forward-flow hard expiration; §4.5 fixes this at roughly half of
    /// `return_flow_expiration_millis`.
    pub forward_flow_expiration_millis: u64,
    pub min_vni: u32,
    pub max_vni: u32,
    /// Loop-detection revisit threshold (§4.5, "tunable").
    pub max_device_revisits: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_devices_traversed: 12,
            temporary_drop_millis: 5_000,
            idle_expiration_millis: 60_000,
            return_flow_expiration_millis: 60_000,
            forward_flow_expiration_millis: 30_000,
            min_vni: 10_000,
            max_vni: 0x00FF_FFFF,
            max_device_revisits: 2,
        }
    }
}

impl SimulationConfig {
    pub fn temporary_drop(&self) -> Duration {
        Duration::from_millis(self.temporary_drop_millis)
    }

    pub fn idle_expiration(&self) -> Duration {
        Duration::from_millis(self.idle_expiration_millis)
    }

    pub fn return_flow_expiration(&self) -> Duration {
        Duration::from_millis(self.return_flow_expiration_millis)
    }

    pub fn forward_flow_expiration(&self) -> Duration {
        Duration::from_millis(self.forward_flow_expiration_millis)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(&path)?;
        let cfg: Self = toml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.max_devices_traversed == 0 {
            return Err(Error::config("max_devices_traversed must be > 0"));
        }
        if self.min_vni >= self.max_vni {
            return Err(Error::config("min_vni must be < max_vni"));
        }
        Ok(())
    }

    /// Watch the configuration file for changes, returning the initial
    /// config plus a `watch::Receiver` that yields updates as they land on
    /// disk. Mirrors `nyx-core::config::NyxConfig::watch_file`.
    pub fn watch_file<P: AsRef<Path>>(
        path: P,
    ) -> Result<(Arc<SimulationConfig>, watch::Receiver<Arc<SimulationConfig>>)> {
        let path_buf = path.as_ref().to_path_buf();
        let initial = Arc::new(Self::from_file(&path_buf)?);
        let (tx, rx) = watch::channel(initial.clone());

        let watch_path = path_buf.clone();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(event) = res else { return };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            match Self::from_file(&watch_path) {
                Ok(cfg) => {
                    let _ = tx.send(Arc::new(cfg));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to reload simulation config");
                }
            }
        })
        .map_err(|e| Error::config(e.to_string()))?;

        watcher
            .watch(&path_buf, RecursiveMode::NonRecursive)
            .map_err(|e| Error::config(e.to_string()))?;
        // Leak the watcher onto the runtime: dropping it would stop delivery.
        // The reference workspace's config watcher is similarly kept alive
        // for the process lifetime via a background task handle.
        std::mem::forget(watcher);

        Ok((initial, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.max_devices_traversed, 12);
        assert_eq!(cfg.temporary_drop_millis, 5_000);
        assert_eq!(cfg.idle_expiration_millis, 60_000);
        assert_eq!(cfg.return_flow_expiration_millis, 60_000);
        assert_eq!(cfg.min_vni, 10_000);
        assert_eq!(cfg.max_vni, 0x00FF_FFFF);
    }

    #[test]
    fn rejects_bad_vni_range() {
        let mut cfg = SimulationConfig::default();
        cfg.min_vni = cfg.max_vni;
        assert!(cfg.validate().is_err());
    }
}
