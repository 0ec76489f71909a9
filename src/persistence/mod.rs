pub mod autosave;
pub mod store;
