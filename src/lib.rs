//! Client-side state core for the SpotOn locality explorer.
//!
//! Three asynchronous subsystems share one page: locality search and
//! selection, name-to-coordinate resolution feeding a map view, and a
//! turn-based assistant chat. [`page::LocalityPage`] wires them together.

pub mod assistant;
pub mod chat;
pub mod config;
pub mod detail;
pub mod error;
pub mod geocoder;
pub mod locality;
pub mod map_view;
pub mod models;
pub mod page;
pub mod retry;
pub mod search;
pub mod transport;

pub use crate::config::Config;
pub use crate::error::{Result, SpotOnError};
pub use crate::page::{LocalityPage, PageSnapshot};
