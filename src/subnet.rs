//! Subnet Config (§4.5): the three-octet LAN prefix used to pick the local
//! bind address and the outbound broadcast target, persisted as a small
//! JSON document in a per-user config directory. Grounded on
//! `backend-rust/src/config.rs`'s `directories`-based settings path plus
//! serde_json read/write-with-fallback pattern.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SubnetConfigError;

const QUALIFIER: &str = "";
const ORGANIZATION: &str = "";
const APPLICATION: &str = "AOG-TaskController";
const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_SUBNET: Subnet = Subnet { a: 192, b: 168, c: 1 };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub a: u8,
    pub b: u8,
    pub c: u8,
}

impl Default for Subnet {
    fn default() -> Self {
        DEFAULT_SUBNET
    }
}

impl Subnet {
    pub fn broadcast_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.a, self.b, self.c, 255)
    }

    /// Whether `ip`'s first three octets match this subnet.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let octets = ip.octets();
        octets[0] == self.a && octets[1] == self.b && octets[2] == self.c
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingsDocument {
    subnet: [u8; 3],
}

/// Loads and persists the subnet prefix. Missing file or parse error falls
/// back to `{192, 168, 1}` (§4.5) rather than surfacing a startup error.
pub struct SubnetStore {
    subnet: Subnet,
    path: PathBuf,
}

impl SubnetStore {
    pub fn load() -> Self {
        let path = Self::settings_path();
        let subnet = Self::read(&path).unwrap_or_else(|e| {
            warn!(error = %e, path = %path.display(), "could not load subnet settings, using default");
            Subnet::default()
        });
        Self { subnet, path }
    }

    #[cfg(test)]
    fn load_at(path: PathBuf) -> Self {
        let subnet = Self::read(&path).unwrap_or_default();
        Self { subnet, path }
    }

    /// Test-only constructor for other modules' tests that need a
    /// throwaway, file-backed store without going through `ProjectDirs`.
    #[cfg(test)]
    pub fn load_at_for_test(path: PathBuf) -> Self {
        Self::load_at(path)
    }

    fn settings_path() -> PathBuf {
        ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
            .map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
            .unwrap_or_else(|| PathBuf::from(SETTINGS_FILE))
    }

    fn read(path: &Path) -> Result<Subnet, SubnetConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let doc: SettingsDocument = serde_json::from_str(&contents)?;
        let [a, b, c] = doc.subnet;
        Ok(Subnet { a, b, c })
    }

    pub fn current(&self) -> Subnet {
        self.subnet
    }

    /// Commits a new subnet and persists it. Per §9's "last-writer-wins,
    /// no locking" note, a write failure is logged, not propagated — the
    /// in-memory subnet still takes effect.
    pub fn set(&mut self, subnet: Subnet) {
        self.subnet = subnet;
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "could not create subnet settings directory");
            }
        }
        let doc = SettingsDocument { subnet: [subnet.a, subnet.b, subnet.c] };
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    warn!(error = %e, path = %self.path.display(), "could not persist subnet settings");
                }
            }
            Err(e) => warn!(error = %e, "could not serialise subnet settings"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_addr_fills_last_octet_with_255() {
        let subnet = Subnet { a: 16, b: 32, c: 48 };
        assert_eq!(subnet.broadcast_addr(), Ipv4Addr::new(16, 32, 48, 255));
    }

    #[test]
    fn contains_matches_on_first_three_octets_only() {
        let subnet = Subnet { a: 192, b: 168, c: 1 };
        assert!(subnet.contains(Ipv4Addr::new(192, 168, 1, 57)));
        assert!(!subnet.contains(Ipv4Addr::new(192, 168, 2, 57)));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let dir = std::env::temp_dir().join(format!("aog-tc-test-missing-{}", std::process::id()));
        let store = SubnetStore::load_at(dir.join(SETTINGS_FILE));
        assert_eq!(store.current(), Subnet::default());
    }

    #[test]
    fn set_persists_and_reload_reads_it_back() {
        let dir = std::env::temp_dir().join(format!("aog-tc-test-roundtrip-{}", std::process::id()));
        let path = dir.join(SETTINGS_FILE);
        let _ = std::fs::remove_file(&path);

        let mut store = SubnetStore::load_at(path.clone());
        store.set(Subnet { a: 16, b: 32, c: 48 });

        let reloaded = SubnetStore::load_at(path.clone());
        assert_eq!(reloaded.current(), Subnet { a: 16, b: 32, c: 48 });

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let dir = std::env::temp_dir().join(format!("aog-tc-test-corrupt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE);
        std::fs::write(&path, b"not json").unwrap();

        let store = SubnetStore::load_at(path.clone());
        assert_eq!(store.current(), Subnet::default());

        let _ = std::fs::remove_file(&path);
    }
}
