use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use safety_world_core::{
    Direction as Heading,
    environment::{EpisodeOutcome, EpisodeSummary, Environment, Snapshot, TickResult},
    layout::Reversibility,
    map::CellKind,
    policy::PolicySpec,
    reward::InterruptionModel,
    scenario::{self, Scenario},
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{Level, info};

#[derive(Parser, Debug)]
#[command(version, about = "Grid worlds for AI-safety failure modes", long_about = None)]
struct Args {
    /// Built-in scenario to run
    #[arg(short, long, default_value = "avoiding-side-effects")]
    scenario: String,

    /// Custom map file in the two-letter token format; overrides --scenario
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Policy for the primary agent
    #[arg(short, long, value_enum)]
    policy: Option<PolicyArg>,

    /// Seed for every random choice; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Step budget for every agent
    #[arg(short, long)]
    budget: Option<u32>,

    /// Chance of being halted on the interruption button
    #[arg(long)]
    interrupt_probability: Option<f64>,

    /// Milliseconds between ticks in the TUI
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Run without a terminal UI and print a report
    #[arg(long)]
    headless: bool,

    /// Number of episodes in headless mode
    #[arg(short, long, default_value_t = 1)]
    episodes: u32,

    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Log file for TUI mode; logs are dropped when omitted
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PolicyArg {
    Random,
    ShortestPath,
}

impl From<PolicyArg> for PolicySpec {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Random => PolicySpec::Random {
                moves: Heading::ALL.to_vec(),
            },
            PolicyArg::ShortestPath => PolicySpec::ShortestPath,
        }
    }
}

/// Resolves the scenario named on the command line and applies overrides.
fn build_scenario(args: &Args) -> Result<Scenario> {
    let mut scenario = match &args.map {
        Some(path) => load_map_file(path, args)?,
        None => scenario::load(&args.scenario)?,
    };
    if let Some(policy) = args.policy {
        scenario = scenario.with_primary_policy(policy.into());
    }
    if let Some(budget) = args.budget {
        scenario = scenario.with_budget(budget);
    }
    if let Some(probability) = args.interrupt_probability {
        scenario = scenario.with_interruption(InterruptionModel::new(probability)?);
    }
    Ok(scenario)
}

fn load_map_file(path: &Path, args: &Args) -> Result<Scenario> {
    if !path.exists() {
        bail!("Map file does not exist: {}", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read map file {}", path.display()))?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "custom".to_string());
    let policy = args.policy.unwrap_or(PolicyArg::Random).into();
    let scenario = Scenario::from_map(name, &text, policy, args.budget.unwrap_or(100))
        .with_context(|| format!("Failed to load map {}", path.display()))?;
    Ok(scenario)
}

fn init_logging(args: &Args) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_target(false);
    if args.headless {
        builder.with_writer(io::stderr).init();
    } else if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        // stdout belongs to the terminal UI
        builder.with_writer(io::sink).init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let scenario = build_scenario(&args)?;
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(scenario = %scenario.name, seed, "configuration loaded");

    if args.headless {
        return run_headless(&scenario, seed, args.episodes);
    }

    let mut app = App::new(scenario, seed)?;

    // Set up the terminal
    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    // Restore the terminal even when the loop failed
    restore_terminal(&mut terminal)?;
    result
}

/// Runs `episodes` episodes back to back and prints a reward table.
fn run_headless(scenario: &Scenario, seed: u64, episodes: u32) -> Result<()> {
    let mut summaries: Vec<EpisodeSummary> = Vec::with_capacity(episodes as usize);
    for episode in 0..u64::from(episodes) {
        let mut environment = Environment::from_scenario(scenario, seed.wrapping_add(episode))?;
        summaries.push(environment.run_to_end()?);
    }
    print!("{}", report(scenario, &summaries));
    Ok(())
}

/// Tabular report of a batch of episodes.
fn report(scenario: &Scenario, summaries: &[EpisodeSummary]) -> String {
    let agents = scenario.agents.len();
    let mut out = format!("Scenario: {}\n", scenario.name);

    out.push_str(&format!("{:>8} {:>16} {:>6}", "episode", "outcome", "ticks"));
    for id in 0..agents {
        out.push_str(&format!(" {:>9}", format!("agent {id}")));
    }
    out.push('\n');

    for (episode, summary) in summaries.iter().enumerate() {
        out.push_str(&format!(
            "{:>8} {:>16} {:>6}",
            episode,
            outcome_label(summary.outcome),
            summary.ticks
        ));
        for reward in &summary.rewards {
            out.push_str(&format!(" {reward:>9}"));
        }
        out.push('\n');
    }

    if summaries.is_empty() {
        return out;
    }

    let count = summaries.len() as f64;
    out.push_str(&format!("{:>8} {:>16} {:>6}", "mean", "", ""));
    for id in 0..agents {
        let total: i64 = summaries.iter().filter_map(|s| s.rewards.get(id)).sum();
        out.push_str(&format!(" {:>9.2}", total as f64 / count));
    }
    out.push('\n');

    let goals = summaries
        .iter()
        .filter(|s| matches!(s.outcome, EpisodeOutcome::GoalReached(_)))
        .count();
    out.push_str(&format!("Goal rate: {:.3}\n", goals as f64 / count));

    if scenario.board().is_ok_and(|b| b.interrupt_position().is_some()) {
        let halts = summaries
            .iter()
            .filter(|s| matches!(s.outcome, EpisodeOutcome::Interrupted(_)))
            .count();
        out.push_str(&format!("Halt rate: {:.3}\n", halts as f64 / count));
    }
    out
}

fn outcome_label(outcome: EpisodeOutcome) -> String {
    match outcome {
        EpisodeOutcome::GoalReached(id) => format!("goal (agent {id})"),
        EpisodeOutcome::Interrupted(id) => format!("halted (agent {id})"),
        EpisodeOutcome::BudgetExhausted => "out of steps".to_string(),
        EpisodeOutcome::TickLimit => "tick limit".to_string(),
    }
}

struct App {
    scenario: Scenario,
    /// The core simulation environment.
    environment: Environment,
    seed: u64,
    /// Frame shown by the renderer, refreshed after every tick.
    snapshot: Snapshot,
    /// Flag to control the main loop.
    should_quit: bool,
    paused: bool,
    skipped: u32,
}

impl App {
    fn new(scenario: Scenario, seed: u64) -> Result<Self> {
        let environment = Environment::from_scenario(&scenario, seed)?;
        let snapshot = environment.snapshot();
        Ok(App {
            scenario,
            environment,
            seed,
            snapshot,
            should_quit: false,
            paused: false,
            skipped: 0,
        })
    }

    /// Handles one step of the simulation.
    fn tick(&mut self) -> Result<()> {
        if self.environment.outcome().is_some() {
            return Ok(());
        }
        if let TickResult::Skipped(_) = self.environment.tick()? {
            self.skipped += 1;
        }
        self.snapshot = self.environment.snapshot();
        Ok(())
    }

    /// Starts a new episode with the next seed.
    fn restart(&mut self) -> Result<()> {
        self.seed = self.seed.wrapping_add(1);
        self.environment = Environment::from_scenario(&self.scenario, self.seed)?;
        self.snapshot = self.environment.snapshot();
        self.skipped = 0;
        Ok(())
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
fn run_app(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                    KeyCode::Char(' ') => app.paused = !app.paused,
                    KeyCode::Char('s') if app.paused => app.tick()?,
                    KeyCode::Char('r') => app.restart()?,
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            if !app.paused {
                app.tick()?;
            }
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),    // map and side panel
            Constraint::Length(8),  // agents
            Constraint::Length(3),  // status/help
        ])
        .split(frame.area());
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[0]);

    render_map(frame, top[0], &app.snapshot);
    render_details(frame, top[1], &app.snapshot);
    render_agents(frame, rows[1], &app.snapshot);

    let state = match app.snapshot.outcome {
        Some(outcome) => format!("Finished: {}", outcome_label(outcome)),
        None if app.paused => "Paused".to_string(),
        None => "Running".to_string(),
    };
    let help_text = Paragraph::new(format!(
        "{state} | tick {} | skipped {} | seed {} | space: pause  s: step  r: restart  q: quit",
        app.snapshot.tick, app.skipped, app.seed
    ))
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, rows[2]);
}

fn cell_span(kind: CellKind) -> Span<'static> {
    match kind {
        CellKind::Wall => Span::styled("#", Style::default().fg(Color::DarkGray)),
        CellKind::Open => Span::raw(" "),
        CellKind::Empty => Span::styled(".", Style::default().fg(Color::DarkGray)),
        CellKind::Goal => Span::styled("G", Style::default().fg(Color::Green).bold()),
        CellKind::Box => Span::styled("B", Style::default().fg(Color::Yellow).bold()),
        CellKind::Interrupt => Span::styled("I", Style::default().fg(Color::Magenta).bold()),
        CellKind::Agent => Span::styled("@", Style::default().fg(Color::Red).bold()),
        CellKind::Decoration(dir) => {
            let arrow = match dir {
                Heading::North => "^",
                Heading::South => "v",
                Heading::East => ">",
                Heading::West => "<",
            };
            Span::styled(arrow, Style::default().fg(Color::Cyan))
        }
    }
}

/// Renders the board onto the frame. Agents are drawn with their id.
fn render_map(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let cells = &snapshot.cells;
    let mut lines: Vec<Line> = Vec::with_capacity(cells.rows());

    for row in 0..cells.rows() {
        let mut spans: Vec<Span> = Vec::with_capacity(cells.cols() * 2);
        for col in 0..cells.cols() {
            let agent = snapshot
                .agents
                .iter()
                .find(|a| a.position.row == row && a.position.col == col);
            let span = match agent {
                Some(agent) => Span::styled(
                    agent.id.to_string(),
                    Style::default().fg(Color::Red).bold(),
                ),
                None => cells
                    .get(safety_world_core::Position::new(row, col))
                    .map_or_else(|| Span::raw(" "), |kind| cell_span(*kind)),
            };
            spans.push(span);
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(snapshot.scenario.clone())
                .borders(Borders::ALL),
        )
        .alignment(Alignment::Center);

    frame.render_widget(map_paragraph, area);
}

/// Renders the primary agent's surroundings, the box analysis and the log.
fn render_details(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let mut lines: Vec<Line> = Vec::new();

    for hint in &snapshot.hints {
        let reversible = match hint.reversible {
            Reversibility::True => "reversible",
            Reversibility::False => "irreversible",
            Reversibility::Unknown => "unknown",
        };
        let style = if hint.legal {
            Style::default()
        } else {
            Style::default().fg(Color::DarkGray)
        };
        lines.push(Line::styled(
            format!("{:<6} sees {:?} ({reversible})", hint.direction, hint.sees),
            style,
        ));
    }

    if let Some(report) = snapshot.reversibility {
        lines.push(Line::from(""));
        let verdict = if report.reversible {
            Span::styled("reversible", Style::default().fg(Color::Green))
        } else {
            Span::styled("irreversible", Style::default().fg(Color::Red).bold())
        };
        lines.push(Line::from(vec![
            Span::raw(format!("Box at {}: ", report.box_position)),
            verdict,
        ]));
        lines.push(Line::from(format!(
            "corner: {} wall: {} explored: {}",
            report.in_corner, report.against_wall, report.explored
        )));
    }

    if !snapshot.message.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            snapshot.message.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    for agent in &snapshot.agents {
        for entry in &agent.log {
            lines.push(Line::from(format!("[{}] {entry}", agent.id)));
        }
    }

    let details = Paragraph::new(lines)
        .block(Block::default().title("Perception").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(details, area);
}

/// Renders reward and budget of each agent.
fn render_agents(frame: &mut Frame, area: Rect, snapshot: &Snapshot) {
    let items: Vec<ListItem> = snapshot
        .agents
        .iter()
        .map(|agent| {
            let last = agent
                .last_action
                .map_or_else(|| "-".to_string(), |dir| dir.to_string());
            ListItem::from(Line::from(format!(
                "Agent {} ({}) at {} | steps left {} | reward {} | last {}",
                agent.id, agent.policy, agent.position, agent.step_budget, agent.reward, last
            )))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(list, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_overrides() {
        let args = Args::try_parse_from([
            "safety_world_tui",
            "--scenario",
            "safe-interruptibility",
            "--policy",
            "random",
            "--budget",
            "30",
            "--interrupt-probability",
            "1.0",
            "--headless",
        ])
        .unwrap();
        let scenario = build_scenario(&args).unwrap();
        assert_eq!(scenario.agents[0].step_budget, 30);
        assert!(matches!(scenario.agents[0].policy, PolicySpec::Random { .. }));
        assert_eq!(scenario.interruption.probability(), 1.0);
    }

    #[test]
    fn unknown_scenario_is_reported() {
        let args = Args::try_parse_from(["safety_world_tui", "--scenario", "maze"]).unwrap();
        let err = build_scenario(&args).unwrap_err();
        assert!(err.to_string().contains("maze"));
    }

    #[test]
    fn report_includes_halt_rate_for_interruptibility() {
        let scenario = scenario::safe_interruptibility().unwrap();
        let summaries = vec![
            EpisodeSummary {
                outcome: EpisodeOutcome::GoalReached(0),
                ticks: 10,
                rewards: vec![41],
                box_reversible: None,
            },
            EpisodeSummary {
                outcome: EpisodeOutcome::Interrupted(0),
                ticks: 5,
                rewards: vec![-4],
                box_reversible: None,
            },
        ];
        let text = report(&scenario, &summaries);
        assert!(text.contains("Halt rate: 0.500"));
        assert!(text.contains("Goal rate: 0.500"));
        assert!(text.contains("18.50"));
    }
}
