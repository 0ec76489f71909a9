use crate::entities::inventory::InventorySlot;
use crate::entities::item::{ItemKind, ItemTypeId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Largest stack a stackable item may reach.
pub const MAX_STACK: u16 = 100;

fn default_true() -> bool {
    true
}

fn default_throw_range() -> u16 {
    7
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemType {
    pub id: ItemTypeId,
    pub name: String,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub has_charges: bool,
    #[serde(default = "default_true")]
    pub moveable: bool,
    #[serde(default = "default_true")]
    pub pickupable: bool,
    #[serde(default)]
    pub always_on_top: bool,
    #[serde(default)]
    pub block_solid: bool,
    #[serde(default)]
    pub has_height: bool,
    #[serde(default)]
    pub floor_change_down: bool,
    #[serde(default)]
    pub container_capacity: Option<u16>,
    /// Weight of one unit, in hundredths of an ounce.
    #[serde(default)]
    pub weight: u32,
    /// Value of one unit in the smallest coin.
    #[serde(default)]
    pub worth: u32,
    #[serde(default)]
    pub slot: Option<InventorySlot>,
    #[serde(default)]
    pub decay_to: Option<ItemTypeId>,
    #[serde(default)]
    pub decay_time_ms: u64,
    #[serde(default = "default_throw_range")]
    pub throw_range: u16,
    #[serde(default)]
    pub corpse: bool,
}

impl ItemType {
    pub fn new(id: ItemTypeId, name: &str, kind: ItemKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            stackable: false,
            has_charges: false,
            moveable: true,
            pickupable: true,
            always_on_top: false,
            block_solid: false,
            has_height: false,
            floor_change_down: false,
            container_capacity: None,
            weight: 0,
            worth: 0,
            slot: None,
            decay_to: None,
            decay_time_ms: 0,
            throw_range: default_throw_range(),
            corpse: false,
        }
    }

    pub fn is_ground(&self) -> bool {
        self.kind == ItemKind::Ground
    }

    pub fn is_container(&self) -> bool {
        self.container_capacity.is_some()
    }

    pub fn is_currency(&self) -> bool {
        self.stackable && self.worth > 0
    }

    /// Items whose `count` field carries meaning beyond "one object".
    pub fn has_sub_type(&self) -> bool {
        self.stackable || self.has_charges || self.kind == ItemKind::Fluid
    }

    pub fn can_decay(&self) -> bool {
        self.decay_time_ms > 0
    }

    /// Count a freshly created item of this type receives when none is given.
    pub fn default_count(&self) -> u16 {
        if self.stackable {
            1
        } else {
            0
        }
    }

    /// Normalises a requested count for this type.
    pub fn clamp_count(&self, count: u16) -> u16 {
        if self.stackable {
            count.clamp(1, MAX_STACK)
        } else if self.has_sub_type() {
            count
        } else {
            0
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("item catalog read failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("item catalog parse failed: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("item type {0} declared twice")]
    Duplicate(ItemTypeId),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    items: Vec<ItemType>,
}

#[derive(Debug, Default, Clone)]
pub struct ItemTypeIndex {
    types: HashMap<ItemTypeId, ItemType>,
}

impl ItemTypeIndex {
    pub fn from_types(types: impl IntoIterator<Item = ItemType>) -> Result<Self, CatalogError> {
        let mut index = Self::default();
        for item_type in types {
            index.insert(item_type)?;
        }
        Ok(index)
    }

    pub fn parse_yaml(data: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(data)?;
        Self::from_types(file.items)
    }

    pub fn load_yaml(path: &Path) -> Result<Self, CatalogError> {
        let data = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_yaml(&data)
    }

    pub fn get(&self, id: ItemTypeId) -> Option<&ItemType> {
        self.types.get(&id)
    }

    pub fn insert(&mut self, item: ItemType) -> Result<(), CatalogError> {
        if self.types.contains_key(&item.id) {
            return Err(CatalogError::Duplicate(item.id));
        }
        self.types.insert(item.id, item);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Coin types ordered from the most to the least valuable.
    pub fn currencies(&self) -> Vec<&ItemType> {
        let mut coins: Vec<&ItemType> = self.types.values().filter(|t| t.is_currency()).collect();
        coins.sort_by(|a, b| b.worth.cmp(&a.worth).then(a.id.cmp(&b.id)));
        coins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
items:
  - id: 100
    name: grass
    kind: ground
    moveable: false
    pickupable: false
  - id: 200
    name: gold coin
    kind: currency
    stackable: true
    weight: 10
    worth: 1
  - id: 202
    name: crystal coin
    kind: currency
    stackable: true
    weight: 10
    worth: 10000
  - id: 201
    name: platinum coin
    kind: currency
    stackable: true
    weight: 10
    worth: 100
  - id: 300
    name: backpack
    kind: container
    container_capacity: 20
    weight: 1800
    slot: backpack
  - id: 500
    name: torch
    decay_to: 501
    decay_time_ms: 3000
"#;

    #[test]
    fn parses_yaml_catalog_with_defaults() {
        let index = ItemTypeIndex::parse_yaml(CATALOG).expect("catalog");
        assert_eq!(index.len(), 6);

        let grass = index.get(ItemTypeId(100)).expect("grass");
        assert!(grass.is_ground());
        assert!(!grass.moveable);

        let backpack = index.get(ItemTypeId(300)).expect("backpack");
        assert!(backpack.is_container());
        assert!(backpack.moveable);
        assert_eq!(backpack.slot, Some(InventorySlot::Backpack));

        let torch = index.get(ItemTypeId(500)).expect("torch");
        assert!(torch.can_decay());
        assert_eq!(torch.decay_to, Some(ItemTypeId(501)));
        assert_eq!(torch.throw_range, 7);
    }

    #[test]
    fn currencies_are_ordered_by_worth() {
        let index = ItemTypeIndex::parse_yaml(CATALOG).expect("catalog");
        let worths: Vec<u32> = index.currencies().iter().map(|t| t.worth).collect();
        assert_eq!(worths, vec![10000, 100, 1]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let types = vec![
            ItemType::new(ItemTypeId(1), "a", ItemKind::Misc),
            ItemType::new(ItemTypeId(1), "b", ItemKind::Misc),
        ];
        let err = ItemTypeIndex::from_types(types).expect_err("duplicate");
        assert!(matches!(err, CatalogError::Duplicate(ItemTypeId(1))));
    }

    #[test]
    fn clamp_count_respects_sub_types() {
        let mut coin = ItemType::new(ItemTypeId(1), "coin", ItemKind::Currency);
        coin.stackable = true;
        assert_eq!(coin.clamp_count(0), 1);
        assert_eq!(coin.clamp_count(250), MAX_STACK);

        let sword = ItemType::new(ItemTypeId(2), "sword", ItemKind::Weapon);
        assert_eq!(sword.clamp_count(5), 0);
    }
}
