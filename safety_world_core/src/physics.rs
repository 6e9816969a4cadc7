//! Movement rules.
//!
//! Every attempted move goes through [`classify`], a single table keyed by
//! what lies one and two cells ahead, and then [`apply`] commits the result.
//! A move is either fully applied or rejected; the step budget is charged in
//! both cases.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Direction, SimError,
    agent::{AgentState, Perception},
    layout::StaticLayout,
    map::{Board, CellKind},
};

/// Why a move was refused. These are expected outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    BlockedByWall,
    BoxPushBlocked,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::BlockedByWall => f.write_str("blocked by a wall"),
            RejectReason::BoxPushBlocked => f.write_str("box cannot be pushed into a wall"),
        }
    }
}

/// The kind of transition a move would make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Step,
    Push,
    Reject(RejectReason),
}

/// Outcome of [`apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveResult {
    Applied {
        perception: Perception,
        pushed_box: bool,
    },
    Rejected(RejectReason),
}

impl MoveResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, MoveResult::Applied { .. })
    }
}

/// Decides a move from the cell one step ahead and the cell behind it.
pub fn classify(target: CellKind, beyond: CellKind) -> Transition {
    match (target, beyond) {
        (CellKind::Wall, _) => Transition::Reject(RejectReason::BlockedByWall),
        (CellKind::Box, CellKind::Wall) => Transition::Reject(RejectReason::BoxPushBlocked),
        (CellKind::Box, _) => Transition::Push,
        _ => Transition::Step,
    }
}

/// Attempts to move `agent` one cell in `direction`.
///
/// Costs exactly one step whatever the outcome. Fails without touching any
/// state when the agent has no budget left.
pub fn apply(
    board: &mut Board,
    layout: &StaticLayout,
    agent: &mut AgentState,
    direction: Direction,
) -> Result<MoveResult, SimError> {
    if agent.step_budget == 0 {
        return Err(SimError::BudgetExhausted(agent.id));
    }

    agent.previous_position = agent.position;
    agent.last_action = Some(direction);
    agent.step_budget -= 1;

    let Some(raw_target) = agent.position.offset(direction, 1) else {
        return Ok(reject(agent, direction, RejectReason::BlockedByWall));
    };

    let pushed_box = match classify(
        agent.peek_adjacent(board, direction),
        agent.peek_beyond(board, direction),
    ) {
        Transition::Reject(reason) => return Ok(reject(agent, direction, reason)),
        Transition::Push => true,
        Transition::Step => false,
    };

    let target = board.clamp(raw_target);
    debug_assert_eq!(target, raw_target, "clamp moved an in-bounds target");

    if pushed_box {
        let box_to = board.clamp(target.offset(direction, 1).unwrap_or(target));
        board.move_box(target, box_to)?;
        debug!(agent = agent.id, %direction, from = %target, to = %box_to, "box pushed");
        agent.log(format!("{direction}: pushed box to {box_to}"));
    } else {
        agent.log(format!("{direction}: moved to {target}"));
    }

    board.vacate_agent(agent.position)?;
    board.place_agent(target)?;
    agent.position = target;
    debug!(agent = agent.id, %direction, to = %target, budget = agent.step_budget, "move applied");

    Ok(MoveResult::Applied {
        perception: agent.perceive(board, layout),
        pushed_box,
    })
}

fn reject(agent: &mut AgentState, direction: Direction, reason: RejectReason) -> MoveResult {
    debug!(agent = agent.id, %direction, %reason, "move rejected");
    agent.log(format!("{direction}: {reason}"));
    MoveResult::Rejected(reason)
}

/// Like [`apply`], for callers holding a textual direction. An unknown name
/// fails with [`SimError::InvalidDirection`] before any step is charged.
pub fn apply_named(
    board: &mut Board,
    layout: &StaticLayout,
    agent: &mut AgentState,
    direction: &str,
) -> Result<MoveResult, SimError> {
    let direction = direction.parse::<Direction>()?;
    apply(board, layout, agent, direction)
}
