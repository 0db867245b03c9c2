//! Client-side realtime sync core for a tessera issue board: change-event
//! normalization, optimistic mutations, board reconciliation, activity
//! timeline merging, and keybinding dispatch. Storage and LLM access are
//! consumed through the [`store::Database`] and [`textgen::TextGenerator`]
//! capabilities.

pub mod board;
pub mod config;
pub mod datetime;
pub mod error;
pub mod events;
pub mod keymap;
pub mod memory;
pub mod mutation;
pub mod seed;
pub mod store;
pub mod textgen;
pub mod timeline;
