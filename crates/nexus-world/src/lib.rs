//! Grid city model, weather effects, and routing for the Nexus simulation.
//!
//! # Modules
//!
//! - [`city`] -- [`CityMap`]: cells, buildings, road closures, weather.
//! - [`error`] -- Error types for grid operations.
//! - [`routing`] -- A*, Dijkstra and BFS over the 4-connected grid, plus
//!   the statistics-keeping [`Router`].
//! - [`starting_city`] -- Seeded default layout and fleet spawning.
//! - [`weather`] -- Weather multiplier tables.

pub mod city;
pub mod error;
pub mod routing;
pub mod starting_city;
pub mod weather;

pub use city::CityMap;
pub use error::WorldError;
pub use routing::{Algorithm, Router, SearchReport, search};
pub use starting_city::{create_starting_city, spawn_fleet};
