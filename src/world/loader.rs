//! World content on disk: `items.yaml` holds the catalog, `world.yaml` the
//! map. Floors are rectangles filled with one ground type; individual tiles
//! can override the ground and carry items.

use crate::config::EngineConfig;
use crate::entities::item::ItemTypeId;
use crate::world::engine::WorldEngine;
use crate::world::holder::{HolderRef, MoveFlags, SlotHint};
use crate::world::item_types::{CatalogError, ItemTypeIndex};
use crate::world::outcome::ReturnValue;
use crate::world::position::Position;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid world file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("unknown item type {type_id} at {position}")]
    UnknownType { type_id: ItemTypeId, position: Position },
    #[error("cannot place item type {type_id} at {position}: {reason}")]
    Placement {
        type_id: ItemTypeId,
        position: Position,
        reason: ReturnValue,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Corner {
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloorSpec {
    pub z: u8,
    pub from: Corner,
    pub to: Corner,
    pub ground: ItemTypeId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacedItem {
    pub type_id: ItemTypeId,
    #[serde(default)]
    pub count: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TileSpec {
    pub position: Position,
    #[serde(default)]
    pub ground: Option<ItemTypeId>,
    #[serde(default)]
    pub protection_zone: bool,
    /// Bottom first.
    #[serde(default)]
    pub items: Vec<PlacedItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorldFile {
    pub name: String,
    pub spawn: Option<Position>,
    pub floors: Vec<FloorSpec>,
    pub tiles: Vec<TileSpec>,
}

impl WorldFile {
    pub fn parse_yaml(data: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(data)?)
    }
}

/// Reads `<root>/items.yaml` and `<root>/world.yaml` into a fresh engine.
pub fn load_world(root: &Path, config: EngineConfig) -> Result<WorldEngine, LoadError> {
    let catalog = ItemTypeIndex::load_yaml(&root.join("items.yaml"))?;
    let path = root.join("world.yaml");
    let data = std::fs::read_to_string(&path).map_err(|source| LoadError::Io { path, source })?;
    let file = WorldFile::parse_yaml(&data)?;
    let mut world = WorldEngine::new(catalog, config);
    world.apply_world_file(&file)?;
    Ok(world)
}

impl WorldEngine {
    pub fn apply_world_file(&mut self, file: &WorldFile) -> Result<(), LoadError> {
        self.holders.map.name = file.name.clone();
        self.holders.map.spawn = file.spawn;

        for floor in &file.floors {
            for x in floor.from.x.min(floor.to.x)..=floor.from.x.max(floor.to.x) {
                for y in floor.from.y.min(floor.to.y)..=floor.from.y.max(floor.to.y) {
                    self.place_ground(Position::new(x, y, floor.z), floor.ground)?;
                }
            }
        }
        for tile in &file.tiles {
            if let Some(ground) = tile.ground {
                self.place_ground(tile.position, ground)?;
            }
            self.ensure_tile(tile.position).protection_zone = tile.protection_zone;
            for placed in &tile.items {
                self.place_loaded_item(tile.position, placed.type_id, placed.count)?;
            }
        }
        // Loading is one task; admit decaying items right away.
        self.cleanup();
        info!(
            target: "game",
            name = %self.holders.map.name,
            tiles = self.holders.map.tile_count(),
            "world loaded"
        );
        Ok(())
    }

    fn place_ground(&mut self, position: Position, ground: ItemTypeId) -> Result<(), LoadError> {
        let old = self.ensure_tile(position).ground();
        if let Some(old) = old {
            self.remove_item(old, None, false).map_err(|reason| LoadError::Placement {
                type_id: ground,
                position,
                reason,
            })?;
        }
        self.place_loaded_item(position, ground, 1)
    }

    fn place_loaded_item(&mut self, position: Position, type_id: ItemTypeId, count: u16) -> Result<(), LoadError> {
        if self.catalog.get(type_id).is_none() {
            return Err(LoadError::UnknownType { type_id, position });
        }
        let placement = |reason| LoadError::Placement {
            type_id,
            position,
            reason,
        };
        let item = self.create_item(type_id, count).map_err(placement)?;
        self.ensure_tile(position);
        self.add_item(HolderRef::Tile(position), item, SlotHint::Anywhere, MoveFlags::NO_LIMIT, false)
            .map_err(placement)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testkit;

    const WORLD: &str = "
name: Testland
spawn: {x: 100, y: 100, z: 7}
floors:
  - {z: 7, from: {x: 98, y: 98}, to: {x: 102, y: 102}, ground: 100}
tiles:
  - position: {x: 100, y: 100, z: 7}
    protection_zone: true
    items:
      - {type_id: 3031, count: 25}
  - position: {x: 101, y: 100, z: 7}
    ground: 101
";

    #[test]
    fn floors_and_tiles_are_filled() {
        let mut world = WorldEngine::new(testkit::catalog(), EngineConfig::default());
        let file = WorldFile::parse_yaml(WORLD).expect("parse");
        world.apply_world_file(&file).expect("apply");

        assert_eq!(world.map().name, "Testland");
        assert_eq!(world.map().tile_count(), 25);
        let spawn = Position::new(100, 100, 7);
        assert!(world.tile(spawn).map_or(false, |tile| tile.protection_zone));
        assert_eq!(world.get_money(HolderRef::Tile(spawn)), 25);
        let replaced = world
            .tile(Position::new(101, 100, 7))
            .and_then(|tile| tile.ground())
            .and_then(|ground| world.item(ground))
            .map(|ground| ground.type_id);
        assert_eq!(replaced, Some(ItemTypeId(101)));
    }

    #[test]
    fn unknown_types_are_reported_with_their_position() {
        let mut world = WorldEngine::new(testkit::catalog(), EngineConfig::default());
        let file = WorldFile::parse_yaml(
            "tiles:\n  - position: {x: 5, y: 5, z: 7}\n    items: [{type_id: 9999}]\n",
        )
        .expect("parse");
        let err = world.apply_world_file(&file).expect_err("unknown type");
        assert!(matches!(err, LoadError::UnknownType { type_id: ItemTypeId(9999), .. }));
    }
}
