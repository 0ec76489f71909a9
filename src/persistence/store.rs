use crate::entities::inventory::InventorySlot;
use crate::entities::item::ItemTypeId;
use crate::world::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to encode save data: {0}")]
    Encode(#[from] serde_yaml::Error),
}

/// An item as written to disk, with the contents of containers nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedItem {
    pub type_id: ItemTypeId,
    #[serde(default = "one")]
    pub count: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub action_id: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<SavedItem>,
}

impl SavedItem {
    pub fn new(type_id: ItemTypeId, count: u16) -> Self {
        Self {
            type_id,
            count,
            text: None,
            action_id: 0,
            contents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquippedItem {
    pub slot: InventorySlot,
    pub item: SavedItem,
}

/// Everything about a character that outlives a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub name: String,
    #[serde(default)]
    pub account: u32,
    pub position: Position,
    pub health: u32,
    pub max_health: u32,
    #[serde(default)]
    pub mana: u32,
    #[serde(default)]
    pub max_mana: u32,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub equipment: Vec<EquippedItem>,
}

/// Ban list kept next to the player saves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BanList {
    pub names: Vec<String>,
    pub accounts: Vec<u32>,
    pub ips: Vec<u32>,
}

impl BanList {
    pub fn matches(&self, name: &str, account: u32, ip: u32) -> bool {
        self.names.iter().any(|banned| banned.eq_ignore_ascii_case(name))
            || self.accounts.contains(&account)
            || self.ips.contains(&ip)
    }
}

/// Where player state, bans and the global key-value table live.
pub trait PlayerStore: Send {
    fn load_player(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError>;
    fn save_player(&mut self, record: &PlayerRecord) -> Result<(), StoreError>;
    fn is_banned(&self, name: &str, account: u32, ip: u32) -> Result<bool, StoreError>;
    fn load_globals(&self) -> Result<BTreeMap<String, String>, StoreError>;
    fn save_globals(&mut self, globals: &BTreeMap<String, String>) -> Result<(), StoreError>;
}

/// YAML files under `<root>/save`. Every overwrite keeps the previous file
/// as `<name>.yaml#`, which loading falls back to when the main file is
/// missing or unreadable.
#[derive(Debug, Clone)]
pub struct YamlStore {
    root: PathBuf,
}

impl YamlStore {
    pub fn from_root(root: &Path) -> Self {
        Self {
            root: root.join("save"),
        }
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn player_dir(&self) -> PathBuf {
        self.root.join("players")
    }

    fn player_path(&self, name: &str) -> PathBuf {
        self.player_dir().join(format!("{}.yaml", file_stem(name)))
    }

    fn player_backup_path(&self, name: &str) -> PathBuf {
        self.player_dir().join(format!("{}.yaml#", file_stem(name)))
    }

    fn globals_path(&self) -> PathBuf {
        self.root.join("globals.yaml")
    }

    fn bans_path(&self) -> PathBuf {
        self.root.join("bans.yaml")
    }

    fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, StoreError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_yaml::from_str(&data)
            .map(Some)
            .map_err(|source| StoreError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn write_with_backup(&self, path: &Path, backup: Option<&Path>, data: &str) -> Result<(), StoreError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        if let Some(backup) = backup {
            if path.exists() {
                fs::copy(path, backup).map_err(|source| StoreError::Io {
                    path: backup.to_path_buf(),
                    source,
                })?;
            }
        }
        fs::write(path, data).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl PlayerStore for YamlStore {
    fn load_player(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        let path = self.player_path(name);
        let backup_path = self.player_backup_path(name);
        match Self::read_yaml::<PlayerRecord>(&path) {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => Self::read_yaml(&backup_path),
            Err(err) => match Self::read_yaml::<PlayerRecord>(&backup_path) {
                Ok(Some(record)) => {
                    tracing::warn!(target: "error", path = %path.display(), error = %err, "player save unreadable, using backup");
                    Ok(Some(record))
                }
                _ => Err(err),
            },
        }
    }

    fn save_player(&mut self, record: &PlayerRecord) -> Result<(), StoreError> {
        let data = serde_yaml::to_string(record)?;
        let path = self.player_path(&record.name);
        let backup_path = self.player_backup_path(&record.name);
        self.write_with_backup(&path, Some(&backup_path), &data)
    }

    fn is_banned(&self, name: &str, account: u32, ip: u32) -> Result<bool, StoreError> {
        let bans: BanList = Self::read_yaml(&self.bans_path())?.unwrap_or_default();
        Ok(bans.matches(name, account, ip))
    }

    fn load_globals(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(Self::read_yaml(&self.globals_path())?.unwrap_or_default())
    }

    fn save_globals(&mut self, globals: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let data = serde_yaml::to_string(globals)?;
        self.write_with_backup(&self.globals_path(), None, &data)
    }
}

/// Store kept entirely in memory, for tests and throwaway worlds.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub players: HashMap<String, PlayerRecord>,
    pub bans: BanList,
    pub globals: BTreeMap<String, String>,
    pub saves: usize,
}

impl PlayerStore for MemoryStore {
    fn load_player(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.players.get(&name.to_ascii_lowercase()).cloned())
    }

    fn save_player(&mut self, record: &PlayerRecord) -> Result<(), StoreError> {
        self.players.insert(record.name.to_ascii_lowercase(), record.clone());
        self.saves += 1;
        Ok(())
    }

    fn is_banned(&self, name: &str, account: u32, ip: u32) -> Result<bool, StoreError> {
        Ok(self.bans.matches(name, account, ip))
    }

    fn load_globals(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.globals.clone())
    }

    fn save_globals(&mut self, globals: &BTreeMap<String, String>) -> Result<(), StoreError> {
        self.globals = globals.clone();
        Ok(())
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
        .collect()
}

fn one() -> u16 {
    1
}

fn is_zero(value: &u16) -> bool {
    *value == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_store() -> YamlStore {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("tibia-core-save-test-{}", suffix));
        YamlStore::new(root)
    }

    fn record(name: &str) -> PlayerRecord {
        let mut backpack = SavedItem::new(ItemTypeId(1988), 1);
        backpack.contents.push(SavedItem::new(ItemTypeId(2148), 37));
        PlayerRecord {
            name: name.to_string(),
            account: 7,
            position: Position::new(100, 200, 7),
            health: 150,
            max_health: 185,
            mana: 10,
            max_mana: 35,
            capacity: 40_000,
            equipment: vec![EquippedItem {
                slot: InventorySlot::Backpack,
                item: backpack,
            }],
        }
    }

    #[test]
    fn save_and_load_player() {
        let mut store = temp_store();
        let saved = record("Sir Test");
        store.save_player(&saved).expect("save");
        let loaded = store.load_player("sir test").expect("load").expect("present");
        assert_eq!(loaded, saved);
        assert!(store.player_path("Sir Test").ends_with("sir_test.yaml"));
    }

    #[test]
    fn corrupt_save_falls_back_to_backup() {
        let mut store = temp_store();
        let mut saved = record("Backup");
        store.save_player(&saved).expect("first save");
        saved.health = 99;
        store.save_player(&saved).expect("second save");
        fs::write(store.player_path("Backup"), "name: [unterminated").expect("corrupt");

        let loaded = store.load_player("Backup").expect("load").expect("present");
        assert_eq!(loaded.health, 150);
    }

    #[test]
    fn unknown_players_are_none() {
        let store = temp_store();
        assert_eq!(store.load_player("nobody").expect("load"), None);
        assert!(!store.is_banned("nobody", 1, 1).expect("bans"));
    }

    #[test]
    fn bans_match_name_account_or_ip() {
        let store = temp_store();
        fs::create_dir_all(&store.root).expect("dir");
        fs::write(store.bans_path(), "names: [Griefer]\naccounts: [13]\n").expect("write");
        assert!(store.is_banned("griefer", 1, 1).expect("bans"));
        assert!(store.is_banned("someone", 13, 1).expect("bans"));
        assert!(!store.is_banned("someone", 12, 1).expect("bans"));
    }

    #[test]
    fn globals_survive_a_reload() {
        let mut store = temp_store();
        let mut globals = BTreeMap::new();
        globals.insert("last_raid".to_string(), "orcs".to_string());
        store.save_globals(&globals).expect("save");
        assert_eq!(store.load_globals().expect("load"), globals);
    }
}
