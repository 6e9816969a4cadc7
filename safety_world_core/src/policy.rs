use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position,
    agent::{AgentState, is_legal_move},
    layout::{DirectionTable, StaticLayout},
    map::{Board, CellKind},
};

/// Provides a read-only view of the environment relevant to one agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentView<'a> {
    pub agent: &'a AgentState,
    pub board: &'a Board,
    pub layout: &'a StaticLayout,
}

/// Trait defining where an agent's moves come from.
pub trait ActionSource {
    /// Picks the next direction to try. `&mut self` lets a source keep state
    /// such as an RNG or a cached plan.
    fn next_action(&mut self, view: &AgentView) -> Direction;
}

/// Picks uniformly from a fixed list of directions.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
    moves: Vec<Direction>,
}

impl RandomWalker {
    /// An empty `moves` list falls back to all four directions.
    pub fn new(seed: u64, moves: Vec<Direction>) -> Self {
        let moves = if moves.is_empty() {
            Direction::ALL.to_vec()
        } else {
            moves
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
            moves,
        }
    }
}

impl ActionSource for RandomWalker {
    fn next_action(&mut self, _view: &AgentView) -> Direction {
        let index = self.rng.random_range(0..self.moves.len());
        self.moves[index]
    }
}

/// Follows the layout's recommended direction and plans with A* where the
/// layout has no recommendation.
#[derive(Debug, Default)]
pub struct ShortestPathAgent {
    current_plan: VecDeque<Position>, // Queue of positions to visit
}

impl ShortestPathAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn manhattan_distance(a: Position, b: Position) -> usize {
        a.row.abs_diff(b.row) + a.col.abs_diff(b.col)
    }

    /// Cells an agent can walk through without pushing anything.
    fn walkable_neighbors(board: &Board, position: Position) -> Vec<Position> {
        board
            .in_bounds_neighbors(position)
            .filter(|n| !matches!(board.cell_at(*n), Ok(CellKind::Wall | CellKind::Box) | Err(_)))
            .collect()
    }

    /// A* pathfinding from `start` to `goal`; the path includes both ends.
    fn a_star_path(board: &Board, start: Position, goal: Position) -> Option<Vec<Position>> {
        #[derive(Clone, Eq, PartialEq)]
        struct PrioritizedItem {
            priority: usize,
            position: Position,
        }

        impl Ord for PrioritizedItem {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reverse ordering for min-heap behavior
                other.priority.cmp(&self.priority)
            }
        }

        impl PartialOrd for PrioritizedItem {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut frontier = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut cost_so_far: HashMap<Position, usize> = HashMap::new();

        frontier.push(PrioritizedItem {
            priority: 0,
            position: start,
        });
        cost_so_far.insert(start, 0);

        let mut goal_reached = false;

        while let Some(PrioritizedItem {
            position: current, ..
        }) = frontier.pop()
        {
            if current == goal {
                goal_reached = true;
                break;
            }

            let current_cost = cost_so_far.get(&current).copied().unwrap_or(usize::MAX);
            for neighbor in Self::walkable_neighbors(board, current) {
                let new_cost = current_cost.saturating_add(1);
                let improves = cost_so_far
                    .get(&neighbor)
                    .is_none_or(|known| new_cost < *known);
                if improves {
                    cost_so_far.insert(neighbor, new_cost);
                    frontier.push(PrioritizedItem {
                        priority: new_cost + Self::manhattan_distance(neighbor, goal),
                        position: neighbor,
                    });
                    came_from.insert(neighbor, current);
                }
            }
        }

        if !goal_reached {
            return None;
        }

        let mut path = vec![goal];
        let mut current = goal;
        while current != start {
            current = *came_from.get(&current)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    fn planned_step(&mut self, view: &AgentView) -> Option<Direction> {
        let here = view.agent.position;
        // Drop a stale plan, e.g. after a rejected move.
        if let Some(next) = self.current_plan.front() {
            if here.direction_to(*next).is_none() {
                self.current_plan.clear();
            }
        }
        if self.current_plan.is_empty() {
            let goal = view.board.goal_position()?;
            let plan = Self::a_star_path(view.board, here, goal)?;
            self.current_plan.extend(plan.into_iter().skip(1));
        }
        let next = self.current_plan.pop_front()?;
        here.direction_to(next)
    }
}

impl ActionSource for ShortestPathAgent {
    fn next_action(&mut self, view: &AgentView) -> Direction {
        if let Some(hint) = view.layout.annotation_or_default(view.agent.position).recommended {
            self.current_plan.clear();
            return hint;
        }
        if let Some(step) = self.planned_step(view) {
            return step;
        }
        // No route: try anything that is not a wall.
        Direction::ALL
            .into_iter()
            .find(|dir| is_legal_move(view.agent, view.board, *dir))
            .unwrap_or(Direction::North)
    }
}

/// Follows a fixed per-agent route table. Off the route it keeps its last
/// heading.
#[derive(Debug)]
pub struct RouteFollower {
    table: DirectionTable,
    heading: Direction,
}

impl RouteFollower {
    pub fn new(table: DirectionTable) -> Self {
        RouteFollower {
            table,
            heading: Direction::North,
        }
    }
}

impl ActionSource for RouteFollower {
    fn next_action(&mut self, view: &AgentView) -> Direction {
        if let Some(direction) = self.table.direction_at(view.agent.position) {
            self.heading = direction;
        }
        self.heading
    }
}

/// Serializable description of an action source, used by scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicySpec {
    Random { moves: Vec<Direction> },
    ShortestPath,
    Route(DirectionTable),
}

impl PolicySpec {
    pub fn build(&self, seed: u64) -> Box<dyn ActionSource + Send> {
        match self {
            PolicySpec::Random { moves } => Box::new(RandomWalker::new(seed, moves.clone())),
            PolicySpec::ShortestPath => Box::new(ShortestPathAgent::new()),
            PolicySpec::Route(table) => Box::new(RouteFollower::new(table.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicySpec::Random { .. } => "random",
            PolicySpec::ShortestPath => "shortest-path",
            PolicySpec::Route(_) => "route",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Grid;

    fn room() -> Board {
        // 5x5 with a goal in the bottom-right interior corner and a pillar
        let terrain = Grid::from_generator(5, 5, |p| match (p.row, p.col) {
            (3, 3) => CellKind::Goal,
            (2, 2) => CellKind::Wall,
            (1..=3, 1..=3) => CellKind::Open,
            _ => CellKind::Wall,
        });
        Board::new(terrain).unwrap()
    }

    #[test]
    fn random_walker_only_uses_its_moves() {
        let board = room();
        let layout = StaticLayout::unannotated(5, 5);
        let agent = AgentState::new(0, Position::new(1, 1), 10);
        let view = AgentView {
            agent: &agent,
            board: &board,
            layout: &layout,
        };
        let mut walker = RandomWalker::new(7, vec![Direction::East, Direction::South]);
        for _ in 0..50 {
            let dir = walker.next_action(&view);
            assert!(matches!(dir, Direction::East | Direction::South));
        }
    }

    #[test]
    fn random_walker_is_reproducible() {
        let board = room();
        let layout = StaticLayout::unannotated(5, 5);
        let agent = AgentState::new(0, Position::new(1, 1), 10);
        let view = AgentView {
            agent: &agent,
            board: &board,
            layout: &layout,
        };
        let mut a = RandomWalker::new(11, Vec::new());
        let mut b = RandomWalker::new(11, Vec::new());
        let first: Vec<_> = (0..20).map(|_| a.next_action(&view)).collect();
        let second: Vec<_> = (0..20).map(|_| b.next_action(&view)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn a_star_routes_around_the_pillar() {
        let board = room();
        let path =
            ShortestPathAgent::a_star_path(&board, Position::new(1, 1), Position::new(3, 3))
                .unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.first(), Some(&Position::new(1, 1)));
        assert_eq!(path.last(), Some(&Position::new(3, 3)));
        assert!(!path.contains(&Position::new(2, 2)));
    }

    #[test]
    fn layout_hint_wins_over_planning() {
        let board = room();
        let layout = StaticLayout::from_text(
            5,
            5,
            "",
            "-- -- -- -- --\n-- W -- -- --\n-- -- -- -- --\n-- -- -- -- --\n-- -- -- -- --",
        )
        .unwrap();
        let agent = AgentState::new(0, Position::new(1, 1), 10);
        let view = AgentView {
            agent: &agent,
            board: &board,
            layout: &layout,
        };
        let mut planner = ShortestPathAgent::new();
        assert_eq!(planner.next_action(&view), Direction::West);
    }

    #[test]
    fn planner_heads_for_goal_without_hints() {
        let board = room();
        let layout = StaticLayout::unannotated(5, 5);
        let agent = AgentState::new(0, Position::new(3, 1), 10);
        let view = AgentView {
            agent: &agent,
            board: &board,
            layout: &layout,
        };
        let mut planner = ShortestPathAgent::new();
        assert_eq!(planner.next_action(&view), Direction::East);
    }

    #[test]
    fn route_follower_keeps_heading_off_route() {
        let board = room();
        let layout = StaticLayout::unannotated(5, 5);
        let table = DirectionTable::from_text(
            5,
            5,
            "-- -- -- -- --\n-- E -- -- --\n-- -- -- -- --\n-- -- -- -- --\n-- -- -- -- --",
        )
        .unwrap();
        let mut follower = RouteFollower::new(table);

        let on_route = AgentState::new(0, Position::new(1, 1), 10);
        let view = AgentView {
            agent: &on_route,
            board: &board,
            layout: &layout,
        };
        assert_eq!(follower.next_action(&view), Direction::East);

        let off_route = AgentState::new(0, Position::new(1, 2), 10);
        let view = AgentView {
            agent: &off_route,
            board: &board,
            layout: &layout,
        };
        assert_eq!(follower.next_action(&view), Direction::East);
    }
}
