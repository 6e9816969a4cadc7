use serde::{Deserialize, Serialize};

use crate::{
    AgentId, Direction, Position,
    layout::{Annotation, Reversibility, StaticLayout},
    map::{Board, CellKind},
};

/// What an agent senses about the cell it stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perception {
    /// Terrain under the agent (goal, interrupt, arrow or floor).
    pub local: CellKind,
    pub annotation: Annotation,
}

/// Holds the mutable state of an agent within the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub position: Position,
    pub previous_position: Position,
    /// Attempted moves left; charged even when a move is rejected.
    pub step_budget: u32,
    pub last_action: Option<Direction>,
    /// Notes gathered during the current tick; cleared at the start of the next.
    pub action_log: Vec<String>,
}

impl AgentState {
    pub fn new(id: AgentId, position: Position, step_budget: u32) -> Self {
        AgentState {
            id,
            position,
            previous_position: position,
            step_budget,
            last_action: None,
            action_log: Vec::new(),
        }
    }

    pub fn perceive(&self, board: &Board, layout: &StaticLayout) -> Perception {
        Perception {
            local: board.terrain_at(self.position).unwrap_or(CellKind::Wall),
            annotation: layout.annotation_or_default(self.position),
        }
    }

    /// The cell one step away. Off-board reads as a wall.
    pub fn peek_adjacent(&self, board: &Board, direction: Direction) -> CellKind {
        board.peek(self.position, direction, 1)
    }

    /// The cell two steps away, i.e. right behind whatever is adjacent.
    pub fn peek_beyond(&self, board: &Board, direction: Direction) -> CellKind {
        board.peek(self.position, direction, 2)
    }

    pub fn log(&mut self, entry: impl Into<String>) {
        self.action_log.push(entry.into());
    }
}

/// One line of an agent's view of its surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveHint {
    pub direction: Direction,
    /// Live content of the adjacent cell.
    pub sees: CellKind,
    /// Whether the move passes the legality check (no wall, no blocked push).
    pub legal: bool,
    /// Static hint for the cell the move would enter.
    pub reversible: Reversibility,
}

/// Whether moving `direction` is physically possible: the adjacent cell is
/// not a wall, and a box there has room behind it.
pub fn is_legal_move(agent: &AgentState, board: &Board, direction: Direction) -> bool {
    match agent.peek_adjacent(board, direction) {
        CellKind::Wall => false,
        CellKind::Box => agent.peek_beyond(board, direction) != CellKind::Wall,
        _ => true,
    }
}

/// The agent's view in all four directions.
pub fn move_hints(agent: &AgentState, board: &Board, layout: &StaticLayout) -> Vec<MoveHint> {
    Direction::ALL
        .into_iter()
        .map(|direction| {
            let target = agent.position.offset(direction, 1);
            MoveHint {
                direction,
                sees: agent.peek_adjacent(board, direction),
                legal: is_legal_move(agent, board, direction),
                reversible: target
                    .map(|pos| layout.annotation_or_default(pos).reversible)
                    .unwrap_or_default(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Grid;

    fn corridor() -> Board {
        // 3 rows x 6 cols, open middle row, box at (1, 3)
        let terrain = Grid::from_generator(3, 6, |p| {
            if p.row == 1 && (1..5).contains(&p.col) {
                CellKind::Open
            } else {
                CellKind::Wall
            }
        });
        let mut board = Board::new(terrain).unwrap();
        board.place_box(Position::new(1, 3)).unwrap();
        board
    }

    #[test]
    fn peeks_report_adjacent_and_beyond() {
        let board = corridor();
        let agent = AgentState::new(0, Position::new(1, 2), 10);
        assert_eq!(agent.peek_adjacent(&board, Direction::East), CellKind::Box);
        assert_eq!(agent.peek_beyond(&board, Direction::East), CellKind::Open);
        assert_eq!(agent.peek_adjacent(&board, Direction::North), CellKind::Wall);
        assert_eq!(agent.peek_beyond(&board, Direction::North), CellKind::Wall);
    }

    #[test]
    fn perception_reads_terrain_not_occupancy() {
        let mut board = corridor();
        board.place_agent(Position::new(1, 1)).unwrap();
        let layout = StaticLayout::unannotated(3, 6);
        let agent = AgentState::new(0, Position::new(1, 1), 10);
        let seen = agent.perceive(&board, &layout);
        assert_eq!(seen.local, CellKind::Open);
        assert_eq!(seen.annotation.reversible, Reversibility::Unknown);
    }

    #[test]
    fn legality_depends_on_cell_behind_box() {
        let board = corridor();
        let pushing = AgentState::new(0, Position::new(1, 2), 10);
        assert!(is_legal_move(&pushing, &board, Direction::East));
        assert!(!is_legal_move(&pushing, &board, Direction::South));

        let mut blocked = corridor();
        blocked
            .move_box(Position::new(1, 3), Position::new(1, 4))
            .unwrap();
        let against = AgentState::new(0, Position::new(1, 3), 10);
        assert!(!is_legal_move(&against, &blocked, Direction::East));
        assert!(is_legal_move(&against, &blocked, Direction::West));
    }

    #[test]
    fn move_hints_cover_every_direction() {
        let board = corridor();
        let layout = StaticLayout::unannotated(3, 6);
        let agent = AgentState::new(0, Position::new(1, 2), 10);
        let hints = move_hints(&agent, &board, &layout);
        let directions: Vec<_> = hints.iter().map(|h| h.direction).collect();
        assert_eq!(directions, Direction::ALL.to_vec());
        assert!(hints.iter().any(|h| h.direction == Direction::East && h.legal));
    }
}
