use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{Direction, Position, SimError};

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Position ({row}, {col}) is out of bounds for grid size ({rows}, {cols})")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Grid of size ({rows}, {cols}) needs {expected} cells, found {found}")]
    SizeMismatch {
        rows: usize,
        cols: usize,
        expected: usize,
        found: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Provides methods for accessing and modifying elements via [`Position`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid<T>")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

/// Unchecked serialized form of a [`Grid`].
#[derive(Deserialize)]
struct RawGrid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> TryFrom<RawGrid<T>> for Grid<T> {
    type Error = GridError;

    fn try_from(raw: RawGrid<T>) -> Result<Self, Self::Error> {
        let RawGrid { rows, cols, cells } = raw;
        let expected = rows.checked_mul(cols).ok_or(GridError::SizeMismatch {
            rows,
            cols,
            expected: usize::MAX,
            found: cells.len(),
        })?;
        if cells.len() != expected {
            return Err(GridError::SizeMismatch {
                rows,
                cols,
                expected,
                found: cells.len(),
            });
        }
        Ok(Grid { rows, cols, cells })
    }
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn new(rows: usize, cols: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        Grid {
            rows,
            cols,
            cells: vec![T::default(); size],
        }
    }

    /// Creates a new grid with the specified dimensions, filled by a generator function.
    ///
    /// The generator is called once per cell in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn from_generator<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(Position) -> T,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for row in 0..rows {
            for col in 0..cols {
                cells.push(f(Position { row, col }));
            }
        }
        Grid { rows, cols, cells }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    pub fn index_of(&self, pos: Position) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.row * self.cols + pos.col)
        } else {
            None
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    pub fn get(&self, pos: Position) -> Option<&T> {
        self.index_of(pos).and_then(|index| self.cells.get(index))
    }

    pub fn get_mut(&mut self, pos: Position) -> Option<&mut T> {
        let index = self.index_of(pos)?;
        self.cells.get_mut(index)
    }

    /// Like [`Grid::get`], but reports the grid size on failure.
    pub fn try_get(&self, pos: Position) -> Result<&T, GridError> {
        self.get(pos).ok_or_else(|| self.out_of_bounds(pos))
    }

    /// Sets the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, pos: Position, value: T) -> Result<(), GridError> {
        let index = self.index_of(pos).ok_or_else(|| self.out_of_bounds(pos))?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let cols = self.cols;
        self.cells.iter().enumerate().map(move |(index, cell)| {
            (
                Position {
                    row: index / cols,
                    col: index % cols,
                },
                cell,
            )
        })
    }

    fn out_of_bounds(&self, pos: Position) -> GridError {
        GridError::OutOfBounds {
            row: pos.row,
            col: pos.col,
            rows: self.rows,
            cols: self.cols,
        }
    }
}

impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.index_of(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                pos, self.rows, self.cols
            ),
        }
    }
}

impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        let (rows, cols) = (self.rows, self.cols);
        match self.index_of(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index {} out of bounds for grid size ({}, {})",
                pos, rows, cols
            ),
        }
    }
}

/// What a board cell holds, as seen by perception and physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellKind {
    Wall,
    /// Floor nothing has stood on yet.
    #[default]
    Open,
    Goal,
    Box,
    /// The interruption button.
    Interrupt,
    Agent,
    /// An arrow painted on the floor.
    Decoration(Direction),
    /// Floor vacated by an agent or the box.
    Empty,
}

impl CellKind {
    /// Whether the kind may appear in the fixed terrain layer.
    pub fn is_terrain(self) -> bool {
        matches!(
            self,
            CellKind::Wall
                | CellKind::Open
                | CellKind::Goal
                | CellKind::Interrupt
                | CellKind::Decoration(_)
        )
    }

    /// What a cell shows once its occupant leaves. Markers survive, plain floor
    /// becomes `Empty`.
    fn vacated(self) -> CellKind {
        match self {
            CellKind::Open | CellKind::Empty | CellKind::Agent | CellKind::Box => CellKind::Empty,
            marker => marker,
        }
    }
}

/// The live board of one episode.
///
/// The terrain layer is fixed at construction. The cell layer starts as a copy
/// of the terrain and tracks the box and agents as they move. Several agents
/// may stand on the same cell, so per-cell agent counts decide when a cell is
/// really vacated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    terrain: Grid<CellKind>,
    cells: Grid<CellKind>,
    agent_counts: Grid<u8>,
    box_position: Option<Position>,
}

impl Board {
    /// Builds a board from its terrain. The perimeter must be walls, and at
    /// most one goal and one interrupt cell may exist.
    pub fn new(terrain: Grid<CellKind>) -> Result<Self, SimError> {
        let (rows, cols) = (terrain.rows(), terrain.cols());
        let mut goals = 0;
        let mut interrupts = 0;
        for (pos, kind) in terrain.enumerate() {
            if !kind.is_terrain() {
                return Err(SimError::InvalidPlacement(pos, *kind));
            }
            let on_perimeter =
                pos.row == 0 || pos.col == 0 || pos.row + 1 == rows || pos.col + 1 == cols;
            if on_perimeter && *kind != CellKind::Wall {
                return Err(SimError::OpenPerimeter(pos));
            }
            match kind {
                CellKind::Goal => goals += 1,
                CellKind::Interrupt => interrupts += 1,
                _ => {}
            }
        }
        if goals > 1 {
            return Err(SimError::DuplicateMarker("goal"));
        }
        if interrupts > 1 {
            return Err(SimError::DuplicateMarker("interrupt"));
        }

        Ok(Board {
            cells: terrain.clone(),
            agent_counts: Grid::new(rows, cols),
            terrain,
            box_position: None,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.terrain.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.terrain.cols()
    }

    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        self.terrain.contains(pos)
    }

    /// The live occupancy of a cell.
    pub fn cell_at(&self, pos: Position) -> Result<CellKind, GridError> {
        self.cells.try_get(pos).copied()
    }

    /// The fixed terrain under a cell, ignoring agents and the box.
    pub fn terrain_at(&self, pos: Position) -> Result<CellKind, GridError> {
        self.terrain.try_get(pos).copied()
    }

    /// Overwrites the live occupancy of a cell.
    pub fn set_cell(&mut self, pos: Position, kind: CellKind) -> Result<(), GridError> {
        self.cells.set(pos, kind)
    }

    /// Looks `distance` cells away from `pos`. Anything past the board edge
    /// reads as a wall.
    pub fn peek(&self, pos: Position, direction: Direction, distance: usize) -> CellKind {
        pos.offset(direction, distance)
            .and_then(|target| self.cells.get(target).copied())
            .unwrap_or(CellKind::Wall)
    }

    /// The four neighbours of `pos` in north, south, east, west order; `None`
    /// where the neighbour lies off the board.
    pub fn neighbors_of(&self, pos: Position) -> [Option<Position>; 4] {
        Direction::ALL.map(|dir| pos.offset(dir, 1).filter(|p| self.contains(*p)))
    }

    /// In-bounds neighbours of `pos`, same order as [`Board::neighbors_of`].
    pub fn in_bounds_neighbors(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        self.neighbors_of(pos).into_iter().flatten()
    }

    /// Pulls a position back inside `[0, rows) x [0, cols)`.
    pub fn clamp(&self, pos: Position) -> Position {
        Position {
            row: pos.row.min(self.rows().saturating_sub(1)),
            col: pos.col.min(self.cols().saturating_sub(1)),
        }
    }

    pub fn box_position(&self) -> Option<Position> {
        self.box_position
    }

    pub fn goal_position(&self) -> Option<Position> {
        self.find_terrain(CellKind::Goal)
    }

    pub fn interrupt_position(&self) -> Option<Position> {
        self.find_terrain(CellKind::Interrupt)
    }

    /// All arrow cells with the direction they point in.
    pub fn decorations(&self) -> Vec<(Position, Direction)> {
        self.terrain
            .enumerate()
            .filter_map(|(pos, kind)| match kind {
                CellKind::Decoration(dir) => Some((pos, *dir)),
                _ => None,
            })
            .collect()
    }

    /// Number of agents currently standing on `pos`.
    pub fn agents_at(&self, pos: Position) -> u8 {
        self.agent_counts.get(pos).copied().unwrap_or(0)
    }

    /// Puts the box on the board. Only floor and markers can hold it.
    pub fn place_box(&mut self, pos: Position) -> Result<(), SimError> {
        if self.box_position.is_some() {
            return Err(SimError::DuplicateMarker("box"));
        }
        match self.cell_at(pos)? {
            CellKind::Wall | CellKind::Agent => Err(SimError::InvalidPlacement(pos, CellKind::Box)),
            _ => {
                self.cells.set(pos, CellKind::Box)?;
                self.box_position = Some(pos);
                Ok(())
            }
        }
    }

    /// Registers an agent standing on `pos`.
    pub fn place_agent(&mut self, pos: Position) -> Result<(), SimError> {
        match self.cell_at(pos)? {
            CellKind::Wall | CellKind::Box => Err(SimError::InvalidPlacement(pos, CellKind::Agent)),
            _ => {
                self.agent_counts[pos] = self.agent_counts[pos].saturating_add(1);
                self.cells.set(pos, CellKind::Agent)?;
                Ok(())
            }
        }
    }

    /// Removes one agent from `pos`, restoring the cell once nobody is left.
    pub fn vacate_agent(&mut self, pos: Position) -> Result<(), GridError> {
        let remaining = {
            let count = self
                .agent_counts
                .get_mut(pos)
                .ok_or_else(|| self.terrain.out_of_bounds(pos))?;
            *count = count.saturating_sub(1);
            *count
        };
        if remaining == 0 && self.cells[pos] == CellKind::Agent {
            let restored = self.terrain[pos].vacated();
            self.cells.set(pos, restored)?;
        }
        Ok(())
    }

    /// Moves the box. The source cell is handed back to any agent still on it.
    pub fn move_box(&mut self, from: Position, to: Position) -> Result<(), GridError> {
        let vacated = if self.agents_at(from) > 0 {
            CellKind::Agent
        } else {
            self.terrain.try_get(from)?.vacated()
        };
        self.cells.set(from, vacated)?;
        self.cells.set(to, CellKind::Box)?;
        self.box_position = Some(to);
        Ok(())
    }

    /// Read-only access to the live cell layer for renderers.
    pub fn cells(&self) -> &Grid<CellKind> {
        &self.cells
    }

    pub fn terrain(&self) -> &Grid<CellKind> {
        &self.terrain
    }

    fn find_terrain(&self, wanted: CellKind) -> Option<Position> {
        self.terrain
            .enumerate()
            .find_map(|(pos, kind)| (*kind == wanted).then_some(pos))
    }
}
