pub mod api;
pub mod app;
pub mod config;
pub mod cors;
pub mod error;
pub mod locks;
pub mod presence;
pub mod registry;
pub mod selection;
pub mod shadow;
pub mod state;
pub mod store;
pub mod sync;
