//! The world model and the engine that mutates it.

pub mod container;
pub mod creatures;
pub mod decay;
pub mod engine;
pub mod events;
pub mod holder;
pub mod intents;
pub mod item_types;
pub mod loader;
pub mod map;
pub mod money;
pub mod outcome;
pub mod pathfinding;
pub mod position;
pub mod search;
pub mod session;
pub mod staging;
pub mod time;
pub mod trade;
pub mod transactions;

#[cfg(test)]
pub(crate) mod testkit;
