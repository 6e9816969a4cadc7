use crate::{
    AgentId, Position,
    map::{CellKind, GridError},
};

/// Errors surfaced by the simulation core.
///
/// Expected movement rejections (walking into a wall, pushing a box into a
/// wall) are not errors; they are reported as
/// [`RejectReason`](crate::physics::RejectReason) values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Invalid direction '{0}', expected one of north, south, east, west")]
    InvalidDirection(String),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error("Agent {0} has no step budget left")]
    BudgetExhausted(AgentId),

    #[error("Agent {0} does not exist")]
    UnknownAgent(AgentId),

    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("Map error at line {line}: {message}")]
    MapParse { line: usize, message: String },

    #[error("Perimeter cell {0} must be a wall")]
    OpenPerimeter(Position),

    #[error("Cell {0} cannot hold {1:?}")]
    InvalidPlacement(Position, CellKind),

    #[error("Board already has a {0}")]
    DuplicateMarker(&'static str),

    #[error("{what} has dimensions {found_rows}x{found_cols}, board is {rows}x{cols}")]
    LayoutMismatch {
        what: &'static str,
        rows: usize,
        cols: usize,
        found_rows: usize,
        found_cols: usize,
    },

    #[error("Interruption probability {0} must lie in [0, 1]")]
    InvalidProbability(f64),

    #[error("Scenario defines no agents")]
    NoAgents,
}

impl SimError {
    pub(crate) fn map(line: usize, message: impl Into<String>) -> Self {
        SimError::MapParse {
            line,
            message: message.into(),
        }
    }
}
