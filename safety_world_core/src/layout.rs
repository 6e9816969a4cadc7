//! Designer hints attached to a fixed map.
//!
//! A [`StaticLayout`] records, per cell, whether stepping there is known to be
//! reversible and which way the designer recommends moving. It is built once
//! per scenario and never recomputed during an episode; live reversibility is
//! the job of [`crate::reversibility`].

use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position, SimError,
    map::{Grid, GridError},
    scenario::tokenize,
};

/// Designer knowledge about whether entering a cell can be undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reversibility {
    True,
    False,
    #[default]
    Unknown,
}

/// The hints stored for a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotation {
    pub reversible: Reversibility,
    pub recommended: Option<Direction>,
}

/// Read-only side table of [`Annotation`]s with the board's dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticLayout {
    hints: Grid<Annotation>,
}

impl StaticLayout {
    /// A layout with no hints: every cell is `Unknown` with no recommendation.
    pub fn unannotated(rows: usize, cols: usize) -> Self {
        StaticLayout {
            hints: Grid::new(rows, cols),
        }
    }

    pub fn from_grid(hints: Grid<Annotation>) -> Self {
        StaticLayout { hints }
    }

    /// Builds a layout from two token maps of equal size.
    ///
    /// `reversible` uses `T`, `F` and `--`; `directions` uses `N`, `S`, `E`,
    /// `W` and `--`. Either may be empty, leaving that hint at its default.
    pub fn from_text(
        rows: usize,
        cols: usize,
        reversible: &str,
        directions: &str,
    ) -> Result<Self, SimError> {
        let mut hints: Grid<Annotation> = Grid::new(rows, cols);

        if !reversible.trim().is_empty() {
            let table = parse_table(rows, cols, reversible, "reversibility hints", |token| {
                match token {
                    "T" => Some(Reversibility::True),
                    "F" => Some(Reversibility::False),
                    "--" | "?" => Some(Reversibility::Unknown),
                    _ => None,
                }
            })?;
            for (pos, value) in table.enumerate() {
                hints[pos].reversible = *value;
            }
        }

        if !directions.trim().is_empty() {
            let table = DirectionTable::from_text(rows, cols, directions)?;
            for (pos, value) in table.routes.enumerate() {
                hints[pos].recommended = *value;
            }
        }

        Ok(StaticLayout { hints })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.hints.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.hints.cols()
    }

    pub fn annotation(&self, pos: Position) -> Result<Annotation, GridError> {
        self.hints.try_get(pos).copied()
    }

    /// Hint for a cell, or the default hint when `pos` is off the layout.
    pub fn annotation_or_default(&self, pos: Position) -> Annotation {
        self.hints.get(pos).copied().unwrap_or_default()
    }
}

/// A per-agent route: which direction to take from each cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionTable {
    routes: Grid<Option<Direction>>,
}

impl DirectionTable {
    pub fn from_text(rows: usize, cols: usize, text: &str) -> Result<Self, SimError> {
        let routes = parse_table(rows, cols, text, "direction table", |token| match token {
            "--" => Some(None),
            other => other.parse::<Direction>().ok().map(Some),
        })?;
        Ok(DirectionTable { routes })
    }

    pub fn direction_at(&self, pos: Position) -> Option<Direction> {
        self.routes.get(pos).copied().flatten()
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.routes.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.routes.cols()
    }
}

fn parse_table<T, F>(
    rows: usize,
    cols: usize,
    text: &str,
    what: &'static str,
    mut parse: F,
) -> Result<Grid<T>, SimError>
where
    T: Default + Clone,
    F: FnMut(&str) -> Option<T>,
{
    let tokens = tokenize(text)?;
    let found_rows = tokens.len();
    let found_cols = tokens.first().map_or(0, Vec::len);
    if found_rows != rows || found_cols != cols {
        return Err(SimError::LayoutMismatch {
            what,
            rows,
            cols,
            found_rows,
            found_cols,
        });
    }

    let mut grid = Grid::new(rows, cols);
    for (row, line) in tokens.iter().enumerate() {
        for (col, token) in line.iter().enumerate() {
            let value = parse(token).ok_or_else(|| {
                SimError::map(row + 1, format!("unknown {what} code '{token}' in column {col}"))
            })?;
            grid.set(Position { row, col }, value)?;
        }
    }
    Ok(grid)
}
