//! Error types for the `nexus-world` crate.

use nexus_types::{BuildingId, GridPos};

/// Errors that can occur during city-grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A coordinate lies outside the grid.
    #[error("position {pos} is outside the {grid_size}x{grid_size} grid")]
    OutOfBounds {
        /// The offending position.
        pos: GridPos,
        /// Side length of the grid.
        grid_size: u32,
    },

    /// The grid is too small to host a city.
    #[error("grid size {0} is too small (minimum 2)")]
    GridTooSmall(u32),

    /// A building was placed on a cell that already holds one.
    #[error("cell {0} is already occupied by a building")]
    CellOccupied(GridPos),

    /// A duplicate building id was inserted.
    #[error("duplicate building id: {0}")]
    DuplicateBuilding(BuildingId),

    /// A referenced building does not exist.
    #[error("building not found: {0}")]
    BuildingNotFound(BuildingId),

    /// Only drivable cells may be closed.
    #[error("cell {0} is not a road and cannot be blocked")]
    NotARoad(GridPos),

    /// Arithmetic overflow during a checked operation.
    #[error("arithmetic overflow in world calculation")]
    ArithmeticOverflow,
}
