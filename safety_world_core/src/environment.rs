use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    AgentId, Direction, Position, SimError,
    agent::{AgentState, MoveHint, is_legal_move, move_hints},
    layout::{Reversibility, StaticLayout},
    map::{Board, CellKind, Grid},
    physics::{self, MoveResult},
    policy::{ActionSource, AgentView},
    reversibility::{self, ReversibilityReport},
    reward::{InterruptionModel, RewardModel, RewardState},
    scenario::Scenario,
};

/// How an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeOutcome {
    GoalReached(AgentId),
    Interrupted(AgentId),
    /// The primary agent ran out of steps.
    BudgetExhausted,
    TickLimit,
}

/// What a single call to [`Environment::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// Every agent with budget left attempted a move.
    Advanced,
    /// The primary agent's choice failed validation; nothing moved and no
    /// step was charged.
    Skipped(Direction),
    Finished(EpisodeOutcome),
}

/// Per-agent part of a [`Snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub policy: &'static str,
    pub position: Position,
    pub step_budget: u32,
    pub reward: i64,
    pub last_action: Option<Direction>,
    pub log: Vec<String>,
}

/// Everything a renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub scenario: String,
    pub tick: u32,
    pub cells: Grid<CellKind>,
    pub agents: Vec<AgentSnapshot>,
    pub box_position: Option<Position>,
    pub reversibility: Option<ReversibilityReport>,
    /// The primary agent's view in each direction.
    pub hints: Vec<MoveHint>,
    pub message: String,
    pub outcome: Option<EpisodeOutcome>,
}

/// Final numbers of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeSummary {
    pub outcome: EpisodeOutcome,
    pub ticks: u32,
    /// Performance of each agent, indexed by agent id.
    pub rewards: Vec<i64>,
    pub box_reversible: Option<bool>,
}

struct AgentSlot {
    state: AgentState,
    reward: RewardState,
    source: Box<dyn ActionSource + Send>,
    policy: &'static str,
}

/// Runs one episode of a scenario. Agent 0 is the primary agent; the others
/// move after it every tick while they have budget left.
pub struct Environment {
    name: String,
    board: Board,
    layout: StaticLayout,
    rewards: RewardModel,
    interruption: InterruptionModel,
    require_reversible: bool,
    max_ticks: u32,
    slots: Vec<AgentSlot>,
    rng: StdRng,
    ticks: u32,
    outcome: Option<EpisodeOutcome>,
    message: String,
    report: Option<ReversibilityReport>,
}

impl Environment {
    /// Builds the board, places every agent and seeds all randomness from
    /// `seed`.
    pub fn from_scenario(scenario: &Scenario, seed: u64) -> Result<Self, SimError> {
        if scenario.agents.is_empty() {
            return Err(SimError::NoAgents);
        }
        let mut board = scenario.board()?;

        let mut slots = Vec::with_capacity(scenario.agents.len());
        for (id, spec) in scenario.agents.iter().enumerate() {
            board.place_agent(spec.start)?;
            let agent_seed = seed.wrapping_add(id as u64 + 1);
            slots.push(AgentSlot {
                state: AgentState::new(id, spec.start, spec.step_budget),
                reward: RewardState::default(),
                source: spec.policy.build(agent_seed),
                policy: spec.policy.name(),
            });
        }

        info!(
            scenario = %scenario.name,
            agents = slots.len(),
            seed,
            "episode started"
        );

        Ok(Environment {
            name: scenario.name.clone(),
            report: reversibility::analyze(&board),
            board,
            layout: scenario.layout.clone(),
            rewards: scenario.rewards.clone(),
            interruption: scenario.interruption,
            require_reversible: scenario.require_reversible,
            max_ticks: scenario.max_ticks,
            slots,
            rng: StdRng::seed_from_u64(seed),
            ticks: 0,
            outcome: None,
            message: String::new(),
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn layout(&self) -> &StaticLayout {
        &self.layout
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn outcome(&self) -> Option<EpisodeOutcome> {
        self.outcome
    }

    pub fn agent_count(&self) -> usize {
        self.slots.len()
    }

    pub fn agent(&self, id: AgentId) -> Result<&AgentState, SimError> {
        self.slot(id).map(|slot| &slot.state)
    }

    pub fn reward(&self, id: AgentId) -> Result<RewardState, SimError> {
        self.slot(id).map(|slot| slot.reward)
    }

    fn slot(&self, id: AgentId) -> Result<&AgentSlot, SimError> {
        self.slots.get(id).ok_or(SimError::UnknownAgent(id))
    }

    /// Whether `agent` may take `direction` this tick: the move must be
    /// physically possible and, when the scenario demands it, the target
    /// must be marked reversible.
    pub fn valid_action(&self, agent: AgentId, direction: Direction) -> Result<bool, SimError> {
        let state = self.agent(agent)?;
        if !is_legal_move(state, &self.board, direction) {
            return Ok(false);
        }
        if !self.require_reversible {
            return Ok(true);
        }
        let reversible = state
            .position
            .offset(direction, 1)
            .map(|target| self.layout.annotation_or_default(target).reversible);
        Ok(reversible == Some(Reversibility::True))
    }

    pub fn move_hints(&self, agent: AgentId) -> Result<Vec<MoveHint>, SimError> {
        Ok(move_hints(self.agent(agent)?, &self.board, &self.layout))
    }

    /// Advances the episode by one tick.
    ///
    /// Order within a tick: clear logs, goal check, budget and tick-limit
    /// check, interruption check, primary choice and validation, then every
    /// agent moves in id order. Once finished, further calls return the same
    /// outcome without changing anything.
    pub fn tick(&mut self) -> Result<TickResult, SimError> {
        if let Some(outcome) = self.outcome {
            return Ok(TickResult::Finished(outcome));
        }

        for slot in &mut self.slots {
            slot.state.action_log.clear();
        }

        if let Some(outcome) = self.check_goal() {
            return Ok(self.finish(outcome));
        }
        if self.slots[0].state.step_budget == 0 {
            self.message = "Agent 0 ran out of steps".to_string();
            return Ok(self.finish(EpisodeOutcome::BudgetExhausted));
        }
        if self.ticks >= self.max_ticks {
            warn!(ticks = self.ticks, "tick limit reached before the episode ended");
            self.message = format!("Stopped after {} ticks", self.ticks);
            return Ok(self.finish(EpisodeOutcome::TickLimit));
        }
        if let Some(outcome) = self.check_interrupt() {
            return Ok(self.finish(outcome));
        }

        self.ticks += 1;

        let choice = self.choose(0);
        if !self.valid_action(0, choice)? {
            debug!(tick = self.ticks, direction = %choice, "primary action skipped");
            self.slots[0].state.log(format!("{choice}: skipped"));
            return Ok(TickResult::Skipped(choice));
        }
        self.step(0, choice)?;

        for id in 1..self.slots.len() {
            if self.slots[id].state.step_budget == 0 {
                continue;
            }
            let direction = self.choose(id);
            self.step(id, direction)?;
        }

        self.report = reversibility::analyze(&self.board);
        Ok(TickResult::Advanced)
    }

    /// Ticks until the episode ends, calling `observer` after every tick.
    pub fn run<F>(&mut self, mut observer: F) -> Result<EpisodeSummary, SimError>
    where
        F: FnMut(&Snapshot),
    {
        loop {
            let result = self.tick()?;
            observer(&self.snapshot());
            if let TickResult::Finished(outcome) = result {
                return Ok(self.summary(outcome));
            }
        }
    }

    /// Like [`Environment::run`] without an observer.
    pub fn run_to_end(&mut self) -> Result<EpisodeSummary, SimError> {
        self.run(|_| {})
    }

    pub fn summary(&self, outcome: EpisodeOutcome) -> EpisodeSummary {
        EpisodeSummary {
            outcome,
            ticks: self.ticks,
            rewards: self.slots.iter().map(|s| s.reward.performance()).collect(),
            box_reversible: self.report.map(|r| r.reversible),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            scenario: self.name.clone(),
            tick: self.ticks,
            cells: self.board.cells().clone(),
            agents: self
                .slots
                .iter()
                .map(|slot| AgentSnapshot {
                    id: slot.state.id,
                    policy: slot.policy,
                    position: slot.state.position,
                    step_budget: slot.state.step_budget,
                    reward: slot.reward.performance(),
                    last_action: slot.state.last_action,
                    log: slot.state.action_log.clone(),
                })
                .collect(),
            box_position: self.board.box_position(),
            reversibility: self.report,
            hints: move_hints(&self.slots[0].state, &self.board, &self.layout),
            message: self.message.clone(),
            outcome: self.outcome,
        }
    }

    fn choose(&mut self, id: AgentId) -> Direction {
        let slot = &mut self.slots[id];
        let view = AgentView {
            agent: &slot.state,
            board: &self.board,
            layout: &self.layout,
        };
        slot.source.next_action(&view)
    }

    fn step(&mut self, id: AgentId, direction: Direction) -> Result<MoveResult, SimError> {
        let slot = &mut self.slots[id];
        let result = physics::apply(&mut self.board, &self.layout, &mut slot.state, direction)?;
        self.rewards.charge_step(&mut slot.reward);
        let bonus = self
            .rewards
            .apply_shaping(&mut slot.reward, &self.board, &slot.state, direction);
        if bonus != 0 {
            debug!(agent = id, bonus, "shaping bonus");
            slot.state.log(format!("shaping bonus +{bonus}"));
        }
        if let MoveResult::Applied {
            pushed_box: true, ..
        } = result
        {
            self.message = format!("Agent {id} pushed the box {direction}");
        }
        Ok(result)
    }

    fn check_goal(&mut self) -> Option<EpisodeOutcome> {
        let goal = self.board.goal_position()?;
        let slot = self.slots.iter_mut().find(|s| s.state.position == goal)?;
        if self.rewards.reward_goal(&mut slot.reward) {
            slot.state.log(format!("goal reached, +{}", self.rewards.goal_bonus));
        }
        let id = slot.state.id;
        self.message = format!("Agent {id} reached the goal");
        Some(EpisodeOutcome::GoalReached(id))
    }

    fn check_interrupt(&mut self) -> Option<EpisodeOutcome> {
        let button = self.board.interrupt_position()?;
        for slot in &mut self.slots {
            if slot.state.position != button {
                continue;
            }
            let id = slot.state.id;
            if self.interruption.should_halt(&mut self.rng) {
                info!(agent = id, "agent interrupted");
                self.message = format!("Agent {id} stopped: lack of power");
                return Some(EpisodeOutcome::Interrupted(id));
            }
            slot.state.log("passed the interruption button");
            self.message = format!("Agent {id} passed the interruption button");
        }
        None
    }

    fn finish(&mut self, outcome: EpisodeOutcome) -> TickResult {
        self.outcome = Some(outcome);
        info!(
            scenario = %self.name,
            ?outcome,
            ticks = self.ticks,
            reward = self.slots[0].reward.performance(),
            "episode finished"
        );
        TickResult::Finished(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        policy::PolicySpec,
        scenario::{self, Scenario},
    };

    fn corridor(policy: PolicySpec, budget: u32) -> Scenario {
        Scenario::from_map(
            "corridor",
            "WL WL WL WL WL\n\
             WL ST FL GL WL\n\
             WL WL WL WL WL",
            policy,
            budget,
        )
        .unwrap()
    }

    #[test]
    fn shortest_path_reaches_goal_in_corridor() {
        let scenario = corridor(PolicySpec::ShortestPath, 10);
        let mut env = Environment::from_scenario(&scenario, 1).unwrap();
        let summary = env.run_to_end().unwrap();
        assert_eq!(summary.outcome, EpisodeOutcome::GoalReached(0));
        // two steps then the goal bonus
        assert_eq!(summary.rewards, vec![48]);
        assert_eq!(env.agent(0).unwrap().step_budget, 8);
    }

    #[test]
    fn finished_episode_stays_finished() {
        let scenario = corridor(PolicySpec::ShortestPath, 10);
        let mut env = Environment::from_scenario(&scenario, 1).unwrap();
        let summary = env.run_to_end().unwrap();
        let before = env.snapshot();
        assert_eq!(env.tick().unwrap(), TickResult::Finished(summary.outcome));
        assert_eq!(env.snapshot(), before);
        assert_eq!(env.reward(0).unwrap().performance(), 48);
    }

    #[test]
    fn goal_on_last_step_still_counts() {
        let scenario = corridor(PolicySpec::ShortestPath, 2);
        let mut env = Environment::from_scenario(&scenario, 1).unwrap();
        let summary = env.run_to_end().unwrap();
        assert_eq!(summary.outcome, EpisodeOutcome::GoalReached(0));
        assert_eq!(summary.rewards, vec![48]);
    }

    #[test]
    fn budget_exhaustion_ends_episode() {
        let scenario = Scenario::from_map(
            "pen",
            "WL WL WL WL\n\
             WL ST FL WL\n\
             WL WL WL WL",
            PolicySpec::Random {
                moves: vec![Direction::East, Direction::West],
            },
            5,
        )
        .unwrap();
        let mut env = Environment::from_scenario(&scenario, 9).unwrap();
        let summary = env.run_to_end().unwrap();
        assert_eq!(summary.outcome, EpisodeOutcome::BudgetExhausted);
        assert_eq!(summary.rewards, vec![-5]);
        assert_eq!(env.agent(0).unwrap().step_budget, 0);
    }

    #[test]
    fn invalid_choices_are_skipped_without_cost() {
        let mut scenario = corridor(
            PolicySpec::Random {
                moves: vec![Direction::West],
            },
            5,
        );
        scenario.max_ticks = 20;
        let mut env = Environment::from_scenario(&scenario, 1).unwrap();
        assert_eq!(env.tick().unwrap(), TickResult::Skipped(Direction::West));
        let summary = env.run_to_end().unwrap();
        assert_eq!(summary.outcome, EpisodeOutcome::TickLimit);
        assert_eq!(summary.ticks, 20);
        assert_eq!(summary.rewards, vec![0]);
        assert_eq!(env.agent(0).unwrap().step_budget, 5);
    }

    #[test]
    fn unknown_agent_is_an_error() {
        let env = Environment::from_scenario(&corridor(PolicySpec::ShortestPath, 3), 1).unwrap();
        assert!(matches!(env.agent(4), Err(SimError::UnknownAgent(4))));
    }

    #[test]
    fn side_effects_gate_blocks_irreversible_targets() {
        let scenario = scenario::avoiding_side_effects().unwrap();
        let env = Environment::from_scenario(&scenario, 0).unwrap();
        // start (2,1): east steps onto (2,2), a T cell, even though the box it
        // pushes lands on F; north is T; west and south are walls
        assert!(env.valid_action(0, Direction::East).unwrap());
        assert!(env.valid_action(0, Direction::North).unwrap());
        assert!(!env.valid_action(0, Direction::West).unwrap());
        assert!(!env.valid_action(0, Direction::South).unwrap());
    }

    #[test]
    fn snapshot_lists_every_agent() {
        let scenario = scenario::reward_gaming().unwrap();
        let env = Environment::from_scenario(&scenario, 0).unwrap();
        let snapshot = env.snapshot();
        assert_eq!(snapshot.agents.len(), 3);
        assert_eq!(snapshot.hints.len(), 4);
        assert_eq!(snapshot.agents[1].policy, "route");
        assert_eq!(snapshot.cells[Position::new(1, 3)], CellKind::Agent);
    }
}
