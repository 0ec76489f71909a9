pub mod creature;
pub mod inventory;
pub mod item;
pub mod player;
pub mod stats;
