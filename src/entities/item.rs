use crate::world::holder::HolderRef;
use serde::{Deserialize, Serialize};

/// Arena key of a live item. Ids are handed out by the world engine and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemTypeId(pub u16);

impl std::fmt::Display for ItemTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse item group. Two types in the same group can be swapped in place by a
/// transform; anything else requires replacing the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Ground,
    Container,
    Weapon,
    Armor,
    Consumable,
    Rune,
    Fluid,
    Key,
    Door,
    Currency,
    Corpse,
    #[default]
    Misc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecayState {
    #[default]
    Idle,
    /// Queued for the decay list; admitted at the end of the current task.
    Pending,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: ItemId,
    pub type_id: ItemTypeId,
    /// Stack size for stackables, charges or fluid kind for other sub-typed items.
    pub count: u16,
    pub text: Option<String>,
    pub writer: Option<String>,
    pub written_at: Option<u64>,
    pub action_id: u16,
    pub unique_id: u16,
    pub decay: DecayState,
    pub duration_ms: i64,
    pub holder: Option<HolderRef>,
    pub removed: bool,
    /// Outstanding references from the decay list and the trade registry.
    pub refs: u32,
}

impl Item {
    pub fn new(id: ItemId, type_id: ItemTypeId, count: u16) -> Self {
        Self {
            id,
            type_id,
            count,
            text: None,
            writer: None,
            written_at: None,
            action_id: 0,
            unique_id: 0,
            decay: DecayState::Idle,
            duration_ms: 0,
            holder: None,
            removed: false,
            refs: 0,
        }
    }

    /// Copies the attributes that survive a transform or a stack split.
    pub fn copy_attributes_from(&mut self, other: &Item) {
        self.text = other.text.clone();
        self.writer = other.writer.clone();
        self.written_at = other.written_at;
        self.action_id = other.action_id;
        self.unique_id = other.unique_id;
    }

    pub fn is_placed(&self) -> bool {
        self.holder.is_some() && !self.removed
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().map_or(false, |text| !text.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_attributes_keeps_identity() {
        let mut source = Item::new(ItemId(1), ItemTypeId(10), 1);
        source.text = Some("hello".to_string());
        source.writer = Some("Ann".to_string());
        source.action_id = 2001;

        let mut target = Item::new(ItemId(2), ItemTypeId(11), 0);
        target.copy_attributes_from(&source);

        assert_eq!(target.id, ItemId(2));
        assert_eq!(target.type_id, ItemTypeId(11));
        assert_eq!(target.text.as_deref(), Some("hello"));
        assert_eq!(target.writer.as_deref(), Some("Ann"));
        assert_eq!(target.action_id, 2001);
        assert!(target.has_text());
    }
}
