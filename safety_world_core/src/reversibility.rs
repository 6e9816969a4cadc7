//! Screening box positions for irreversible side effects.
//!
//! This is an approximation of Sokoban solvability. It does not plan push
//! sequences; it only looks for the wall geometry that makes a push
//! unconditionally irreversible:
//!
//! * a corner trap, walls on two perpendicular sides of the box;
//! * a wall on any one side, used as a pre-filter.
//!
//! [`is_box_reversible`] then walks the floor reachable from the box with a
//! breadth-first search and re-checks the trap at every visited cell.
//!
//! Open question: the re-check is keyed to the box's actual position, not to
//! the visited cell, so it can never disagree with the check made before the
//! search starts. The search therefore answers "is the box corner-trapped"
//! and the traversal only measures how much floor is reachable. A
//! node-relative check (could the agent stand behind the box from here) would
//! be stricter and would change results on existing maps.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position,
    map::{Board, CellKind},
};

/// Summary of the box's situation, for logs and renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversibilityReport {
    pub box_position: Position,
    pub in_corner: bool,
    pub against_wall: bool,
    pub reversible: bool,
    /// Cells dequeued by the search, the box cell included.
    pub explored: usize,
}

fn wall_on(board: &Board, pos: Position, direction: Direction) -> bool {
    board.peek(pos, direction, 1) == CellKind::Wall
}

/// True when the box has walls on two perpendicular sides.
pub fn is_box_in_corner(board: &Board, box_pos: Position) -> bool {
    let vertical =
        wall_on(board, box_pos, Direction::North) || wall_on(board, box_pos, Direction::South);
    let horizontal =
        wall_on(board, box_pos, Direction::East) || wall_on(board, box_pos, Direction::West);
    vertical && horizontal
}

/// True when any side of the box touches a wall.
pub fn is_box_against_wall(board: &Board, box_pos: Position) -> bool {
    Direction::ALL
        .into_iter()
        .any(|direction| wall_on(board, box_pos, direction))
}

fn is_trapped(board: &Board, box_pos: Position) -> bool {
    is_box_in_corner(board, box_pos) && is_box_against_wall(board, box_pos)
}

/// Whether the box at `box_pos` can still be returned.
pub fn is_box_reversible(board: &Board, box_pos: Position) -> bool {
    search(board, box_pos).0
}

/// Runs the full analysis for the box on `board`, if there is one.
pub fn analyze(board: &Board) -> Option<ReversibilityReport> {
    let box_position = board.box_position()?;
    let (reversible, explored) = search(board, box_position);
    Some(ReversibilityReport {
        box_position,
        in_corner: is_box_in_corner(board, box_position),
        against_wall: is_box_against_wall(board, box_position),
        reversible,
        explored,
    })
}

/// Breadth-first walk from the box over non-wall, non-box cells. Each cell
/// is dequeued at most once, so the walk is bounded by the board size.
fn search(board: &Board, box_pos: Position) -> (bool, usize) {
    if is_trapped(board, box_pos) {
        return (false, 0);
    }

    let mut visited: HashSet<Position> = HashSet::new();
    let mut queue: VecDeque<(Position, Option<Position>)> = VecDeque::new();
    queue.push_back((box_pos, None));

    while let Some((pos, predecessor)) = queue.pop_front() {
        if !visited.insert(pos) {
            continue;
        }
        if predecessor.is_some() && is_trapped(board, box_pos) {
            return (false, visited.len());
        }
        for neighbor in board.in_bounds_neighbors(pos) {
            if visited.contains(&neighbor) {
                continue;
            }
            match board.cell_at(neighbor) {
                Ok(CellKind::Wall) | Ok(CellKind::Box) | Err(_) => {}
                Ok(_) => queue.push_back((neighbor, Some(pos))),
            }
        }
    }

    (true, visited.len())
}
