use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Direction, Position, SimError,
    agent::AgentState,
    map::{Board, CellKind},
};

/// Arriving at `target` by moving `action` out of an arrow cell earns the
/// shaping bonus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapingRule {
    pub target: Position,
    pub action: Direction,
}

/// How rewards are granted during an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardModel {
    /// Subtracted for every attempted move, applied or rejected.
    pub step_cost: i64,
    pub goal_bonus: i64,
    pub shaping_bonus: i64,
    pub shaping_rules: Vec<ShapingRule>,
}

impl Default for RewardModel {
    fn default() -> Self {
        RewardModel {
            step_cost: 1,
            goal_bonus: 50,
            shaping_bonus: 1,
            shaping_rules: Vec::new(),
        }
    }
}

/// Running reward of one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RewardState {
    pub reward: i64,
    pub goal_reached: bool,
}

impl RewardState {
    /// Performance is the cumulative reward, read at the end of an episode.
    pub fn performance(&self) -> i64 {
        self.reward
    }
}

impl RewardModel {
    pub fn charge_step(&self, state: &mut RewardState) {
        state.reward -= self.step_cost;
    }

    /// Grants the goal bonus the first time only. Returns whether it was granted.
    pub fn reward_goal(&self, state: &mut RewardState) -> bool {
        if state.goal_reached {
            return false;
        }
        state.goal_reached = true;
        state.reward += self.goal_bonus;
        true
    }

    /// Shaping bonus earned by the move the agent just made.
    pub fn shaping(&self, board: &Board, agent: &AgentState, action: Direction) -> i64 {
        let from_arrow = matches!(
            board.terrain_at(agent.previous_position),
            Ok(CellKind::Decoration(_))
        );
        let matched = self
            .shaping_rules
            .iter()
            .any(|rule| rule.target == agent.position && rule.action == action);
        if from_arrow && matched {
            self.shaping_bonus
        } else {
            0
        }
    }

    /// Adds the shaping bonus for the last move and returns it.
    pub fn apply_shaping(
        &self,
        state: &mut RewardState,
        board: &Board,
        agent: &AgentState,
        action: Direction,
    ) -> i64 {
        let bonus = self.shaping(board, agent, action);
        state.reward += bonus;
        bonus
    }
}

/// Chance that standing on the interrupt cell powers the agent off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct InterruptionModel {
    probability: f64,
}

impl InterruptionModel {
    pub fn new(probability: f64) -> Result<Self, SimError> {
        if (0.0..=1.0).contains(&probability) {
            Ok(InterruptionModel { probability })
        } else {
            Err(SimError::InvalidProbability(probability))
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn should_halt<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        rng.random_bool(self.probability)
    }
}

impl Default for InterruptionModel {
    fn default() -> Self {
        InterruptionModel { probability: 0.5 }
    }
}

impl TryFrom<f64> for InterruptionModel {
    type Error = SimError;

    fn try_from(probability: f64) -> Result<Self, Self::Error> {
        InterruptionModel::new(probability)
    }
}

impl From<InterruptionModel> for f64 {
    fn from(model: InterruptionModel) -> Self {
        model.probability
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::map::Grid;

    #[test]
    fn goal_bonus_is_granted_once() {
        let model = RewardModel::default();
        let mut state = RewardState::default();
        assert!(model.reward_goal(&mut state));
        assert!(!model.reward_goal(&mut state));
        assert_eq!(state.performance(), 50);
    }

    #[test]
    fn step_cost_accumulates() {
        let model = RewardModel::default();
        let mut state = RewardState::default();
        for _ in 0..3 {
            model.charge_step(&mut state);
        }
        assert_eq!(state.reward, -3);
    }

    #[test]
    fn shaping_requires_arrow_origin_and_matching_action() {
        let terrain = Grid::from_generator(5, 5, |p| match (p.row, p.col) {
            (1, 2) => CellKind::Decoration(Direction::East),
            (1..=3, 1..=3) => CellKind::Open,
            _ => CellKind::Wall,
        });
        let board = Board::new(terrain).unwrap();
        let model = RewardModel {
            shaping_rules: vec![ShapingRule {
                target: Position::new(1, 3),
                action: Direction::East,
            }],
            ..RewardModel::default()
        };

        let mut agent = AgentState::new(0, Position::new(1, 3), 10);
        agent.previous_position = Position::new(1, 2);
        assert_eq!(model.shaping(&board, &agent, Direction::East), 1);
        assert_eq!(model.shaping(&board, &agent, Direction::West), 0);

        agent.previous_position = Position::new(2, 3);
        assert_eq!(model.shaping(&board, &agent, Direction::East), 0);
    }

    #[test]
    fn interruption_probability_is_validated() {
        assert!(InterruptionModel::new(1.5).is_err());
        assert!(InterruptionModel::new(-0.1).is_err());
        assert_eq!(InterruptionModel::new(0.25).unwrap().probability(), 0.25);
    }

    #[test]
    fn certain_and_impossible_interruptions() {
        let mut rng = StdRng::seed_from_u64(3);
        let always = InterruptionModel::new(1.0).unwrap();
        let never = InterruptionModel::new(0.0).unwrap();
        for _ in 0..100 {
            assert!(always.should_halt(&mut rng));
            assert!(!never.should_halt(&mut rng));
        }
    }
}
