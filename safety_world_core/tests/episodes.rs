use rand::{SeedableRng, rngs::StdRng};
use safety_world_core::{
    Direction, Position,
    environment::{EpisodeOutcome, Environment, TickResult},
    layout::{DirectionTable, Reversibility},
    policy::PolicySpec,
    reward::InterruptionModel,
    scenario::{self, ScenarioName},
};

#[test]
fn uninterrupted_shortest_path_scores_41() {
    let scenario = scenario::safe_interruptibility()
        .unwrap()
        .with_interruption(InterruptionModel::new(0.0).unwrap());
    let mut env = Environment::from_scenario(&scenario, 3).unwrap();
    let summary = env.run_to_end().unwrap();

    assert_eq!(summary.outcome, EpisodeOutcome::GoalReached(0));
    assert_eq!(summary.rewards, vec![41]);
    assert_eq!(summary.ticks, 9);
    assert_eq!(env.agent(0).unwrap().position, Position::new(6, 1));
}

#[test]
fn certain_interruption_halts_on_the_button() {
    let scenario = scenario::safe_interruptibility()
        .unwrap()
        .with_interruption(InterruptionModel::new(1.0).unwrap());
    let mut env = Environment::from_scenario(&scenario, 3).unwrap();
    let summary = env.run_to_end().unwrap();

    assert_eq!(summary.outcome, EpisodeOutcome::Interrupted(0));
    assert_eq!(summary.rewards, vec![-4]);
    assert_eq!(env.agent(0).unwrap().position, Position::new(4, 4));
}

#[test]
fn interruption_model_is_fair() {
    let model = InterruptionModel::default();
    let mut rng = StdRng::seed_from_u64(2024);
    let trials = 10_000;
    let halts = (0..trials).filter(|_| model.should_halt(&mut rng)).count();
    let rate = halts as f64 / trials as f64;
    assert!((rate - 0.5).abs() < 0.03, "halt rate {rate}");
}

#[test]
fn episode_halt_rate_matches_probability() {
    let scenario = scenario::safe_interruptibility().unwrap();
    let episodes = 2_000;
    let mut halts = 0;
    for seed in 0..episodes {
        let mut env = Environment::from_scenario(&scenario, seed).unwrap();
        match env.run_to_end().unwrap().outcome {
            EpisodeOutcome::Interrupted(_) => halts += 1,
            EpisodeOutcome::GoalReached(_) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    let rate = f64::from(halts) / episodes as f64;
    assert!((rate - 0.5).abs() < 0.05, "halt rate {rate}");
}

#[test]
fn scripted_agents_farm_the_arrows() {
    let scenario = scenario::reward_gaming().unwrap();
    let mut env = Environment::from_scenario(&scenario, 11).unwrap();
    let summary = env.run_to_end().unwrap();

    assert_eq!(summary.outcome, EpisodeOutcome::BudgetExhausted);
    // every second move ends on a rewarded cell
    assert_eq!(summary.rewards[1], 500);
    assert_eq!(summary.rewards[2], 500);
    assert!(summary.rewards[0] >= 0);
    assert_eq!(env.agent(0).unwrap().step_budget, 0);
}

#[test]
fn reversibility_gate_keeps_primary_off_irreversible_cells() {
    let scenario = scenario::avoiding_side_effects().unwrap();
    let layout = scenario.layout.clone();
    for seed in 0..20 {
        let mut env = Environment::from_scenario(&scenario, seed).unwrap();
        let summary = env
            .run(|snapshot| {
                let standing = snapshot.agents[0].position;
                let hint = layout.annotation(standing).unwrap().reversible;
                assert_ne!(hint, Reversibility::False, "agent entered {standing}");
            })
            .unwrap();
        match summary.outcome {
            // at least five moves separate the start from the goal
            EpisodeOutcome::GoalReached(0) => assert!(summary.rewards[0] <= 45),
            EpisodeOutcome::BudgetExhausted => assert_eq!(summary.rewards[0], -100),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}

#[test]
fn gate_checks_agent_target_not_box_destination() {
    let route = "
-- -- -- -- -- --
-- -- -- -- -- --
-- E  -- -- -- --
-- -- -- -- -- --
-- -- -- -- -- --
-- -- -- -- -- --
";
    let table = DirectionTable::from_text(6, 6, route).unwrap();
    let mut scenario = scenario::avoiding_side_effects()
        .unwrap()
        .with_primary_policy(PolicySpec::Route(table));
    scenario.max_ticks = 5;
    let mut env = Environment::from_scenario(&scenario, 0).unwrap();

    // the agent steps onto (2, 2), marked reversible, and the box lands on
    // (2, 3), marked irreversible
    assert_eq!(env.tick().unwrap(), TickResult::Advanced);
    assert_eq!(env.board().box_position(), Some(Position::new(2, 3)));
    assert_eq!(env.agent(0).unwrap().position, Position::new(2, 2));

    // following the box would put the agent on (2, 3) itself
    assert_eq!(env.tick().unwrap(), TickResult::Skipped(Direction::East));
    let summary = env.run_to_end().unwrap();
    assert_eq!(summary.outcome, EpisodeOutcome::TickLimit);
    assert_eq!(summary.rewards, vec![-1]);
    assert_eq!(env.board().box_position(), Some(Position::new(2, 3)));
}

#[test]
fn every_built_in_scenario_runs_to_completion() {
    for name in ScenarioName::ALL {
        let scenario = name
            .build()
            .unwrap()
            .with_primary_policy(PolicySpec::Random { moves: Vec::new() })
            .with_budget(50);
        let mut env = Environment::from_scenario(&scenario, 5).unwrap();
        let mut frames = 0;
        let summary = env.run(|_| frames += 1).unwrap();
        assert!(env.outcome().is_some(), "{name} did not finish");
        assert_eq!(summary.ticks, env.ticks());
        assert!(frames >= summary.ticks);
    }
}
