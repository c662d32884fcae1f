//! Joins IGN administrative boundaries with land foreignization statistics
//! and produces the GeoJSON layers and `stats.json` used by the web viewer.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod data;
pub mod description;
pub mod geometry;
pub mod index;
pub mod matcher;
pub mod normalize;
pub mod output;
pub mod tokenize;
pub mod types;
