use gridworld_core::{
    AGENT, Direction, GOAL, Position, WALL,
    agent::{Agent, PlanningAgent, RandomWalker},
    environment::{GridWorld, GridWorldConfig, ResetMode, Transition, load_world_from_string},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ratatui::{
    crossterm::{
        self,
        event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Who chooses the moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AgentKind {
    /// Keyboard input.
    Manual,
    /// Uniformly random moves.
    Random,
    /// Shortest path to the goal.
    Planner,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Map file to load; overrides --rows, --cols, --start and --wall
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Number of rows
    #[arg(long, default_value_t = 10)]
    rows: i64,

    /// Number of columns
    #[arg(long, default_value_t = 10)]
    cols: i64,

    /// Start cell as ROW,COL
    #[arg(long, value_name = "ROW,COL", value_parser = parse_cell, default_value = "0,0")]
    start: Position,

    /// Wall cell as ROW,COL; repeat for more walls
    #[arg(short, long = "wall", value_name = "ROW,COL", value_parser = parse_cell)]
    walls: Vec<Position>,

    /// Reject walls outside the grid or on the start/goal cells
    #[arg(long)]
    strict_walls: bool,

    /// Move the agent back to the start cell on reset
    #[arg(long)]
    relocate_on_reset: bool,

    /// Who drives the agent
    #[arg(short, long, value_enum, default_value_t = AgentKind::Manual)]
    agent: AgentKind,

    /// Seed for the random agent
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Milliseconds between automatic moves
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,

    /// Write logs to this file (controlled by RUST_LOG)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn parse_cell(value: &str) -> Result<Position, String> {
    let (row, col) = value
        .split_once(',')
        .ok_or_else(|| format!("expected ROW,COL, got '{value}'"))?;
    let row = row.trim().parse::<i64>().map_err(|e| format!("bad row '{row}': {e}"))?;
    let col = col.trim().parse::<i64>().map_err(|e| format!("bad column '{col}': {e}"))?;
    Ok(Position::new(row, col))
}

impl Args {
    /// Builds the world configuration from the map file or the grid flags.
    fn world_config(&self) -> Result<GridWorldConfig> {
        let mut config = match &self.map {
            Some(path) => {
                let map_string = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read map file {}", path.display()))?;
                load_world_from_string(&map_string)
                    .with_context(|| format!("Failed to parse map file {}", path.display()))?
            }
            None => {
                let walls = if self.walls.is_empty() {
                    vec![Position::new(1, 1), Position::new(1, 3)]
                } else {
                    self.walls.clone()
                };
                GridWorldConfig {
                    rows: self.rows,
                    cols: self.cols,
                    start: self.start,
                    walls,
                    ..GridWorldConfig::default()
                }
            }
        };
        config.strict_walls = self.strict_walls;
        if self.relocate_on_reset {
            config.reset_mode = ResetMode::RelocateToStart;
        }
        Ok(config)
    }
}

struct App {
    /// The core grid environment.
    environment: GridWorld,
    /// Automatic driver, `None` in manual mode.
    agent: Option<Box<dyn Agent>>,
    /// Last message shown in the status pane.
    message: String,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(mut environment: GridWorld, kind: AgentKind, seed: u64) -> Self {
        let agent: Option<Box<dyn Agent>> = match kind {
            AgentKind::Manual => None,
            AgentKind::Random => Some(Box::new(RandomWalker::new(0, seed))),
            AgentKind::Planner => Some(Box::new(PlanningAgent::new(0))),
        };
        if let Some(agent) = &agent {
            info!(agent = agent.id(), ?kind, "automatic agent attached");
        }
        let start = environment.reset();

        App {
            environment,
            agent,
            message: format!("Episode started at {start}"),
            should_quit: false,
        }
    }

    /// Feeds one direction token to the environment and reports the outcome.
    fn step_token(&mut self, token: &str) {
        match self.environment.step_token(token) {
            Ok(transition) => self.report(transition),
            Err(err) => {
                warn!(%err, "rejected input");
                self.message = err.to_string();
            }
        }
    }

    fn step(&mut self, direction: Direction) {
        let transition = self.environment.step(direction);
        self.report(transition);
    }

    fn report(&mut self, transition: Transition) {
        self.message = format!(
            "({}, {}, {})",
            transition.state, transition.reward, transition.done
        );
        if transition.done {
            info!(
                episode = self.environment.episode(),
                steps = self.environment.steps_taken(),
                status = ?transition.status,
                "episode finished"
            );
            self.message.push_str("  episode over, press 'n' for a new one");
        }
    }

    /// Handles one timer tick of the automatic agent.
    fn tick(&mut self) {
        if self.environment.is_done() {
            return;
        }
        let Some(agent) = self.agent.as_mut() else {
            return;
        };
        let action = agent.get_action(&self.environment.view());
        match action {
            Some(direction) => self.step(direction),
            None => self.message = "Agent has no move: goal unreachable".to_string(),
        }
    }

    fn reset(&mut self) {
        let start = self.environment.reset();
        self.message = format!(
            "Episode {} started (start {start}, agent at {})",
            self.environment.episode(),
            self.environment.agent_pos()
        );
    }

    /// Maps a key press to an action. Moves are ignored while an automatic agent drives.
    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit(),
            KeyCode::Char('n') => self.reset(),
            _ if self.agent.is_some() => {}
            KeyCode::Left => self.step(Direction::Left),
            KeyCode::Right => self.step(Direction::Right),
            KeyCode::Up => self.step(Direction::Up),
            KeyCode::Down => self.step(Direction::Down),
            KeyCode::Char(c) => self.step_token(c.encode_utf8(&mut [0; 4])),
            _ => {}
        }
    }

    /// Sets the quit flag.
    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }

    let environment = GridWorld::from_config(args.world_config()?)?;
    let mut app = App::new(environment, args.agent, args.seed);

    // Set up the terminal
    let mut terminal = setup_terminal()?;

    // Run the main application loop, restoring the terminal even on error
    let result = run_app(&mut terminal, &mut app, Duration::from_millis(args.tick_ms));
    restore_terminal(&mut terminal)?;
    result
}

/// Sends `tracing` output to `path`; stderr would draw over the alternate screen.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let mut filter = EnvFilter::from_default_env();
    for directive in ["gridworld_core=info", "gridworld_tui=info"] {
        if let Ok(d) = directive.parse() {
            filter = filter.add_directive(d);
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?; // Put terminal in raw mode
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
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick();
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
    let main_layout = Layout::vertical([
        Constraint::Min(3),    // Area for the grid
        Constraint::Length(4), // Area for episode status
        Constraint::Length(2), // Area for help
    ])
    .split(frame.area());

    render_grid(frame, main_layout[0], &app.environment);
    render_status(frame, main_layout[1], app);

    let help_text = Paragraph::new(
        "Move: arrows or l/r/u/d   New episode: n   Quit: q or Esc",
    )
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders the environment snapshot as a bordered table.
fn render_grid(frame: &mut Frame, area: Rect, environment: &GridWorld) {
    let snapshot = environment.render();

    let rows: Vec<Row> = snapshot
        .rows_iter()
        .map(|row| {
            Row::new(row.iter().map(|glyph| {
                let style = match *glyph {
                    AGENT => Style::default().fg(Color::Red).bold(),
                    GOAL => Style::default().fg(Color::Green).bold(),
                    WALL => Style::default().fg(Color::DarkGray),
                    _ => Style::default(),
                };
                Cell::from(Line::from(Span::styled(glyph.to_string(), style)).centered())
            }))
        })
        .collect();
    let widths = vec![Constraint::Length(3); snapshot.cols()];

    let table = Table::new(rows, widths)
        .column_spacing(1)
        .block(Block::default().title("Grid World").borders(Borders::ALL));
    frame.render_widget(table, area);
}

/// Renders counters and the last `(state, reward, done)` observation.
fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let environment = &app.environment;
    let lines = vec![
        Line::from(format!(
            "Episode: {}  Steps: {}/{}  Status: {:?}  Agent: {}  Goal: {}",
            environment.episode(),
            environment.steps_taken(),
            environment.max_steps(),
            environment.status(),
            environment.agent_pos(),
            environment.goal_pos(),
        )),
        Line::from(app.message.as_str()),
    ];
    let status =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(status, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(kind: AgentKind) -> App {
        let args = Args::parse_from(["gridworld_tui", "--rows", "3", "--cols", "3"]);
        let environment = GridWorld::from_config(args.world_config().unwrap()).unwrap();
        App::new(environment, kind, 1)
    }

    #[test]
    fn parse_cell_accepts_row_col_pairs() {
        assert_eq!(parse_cell("2,3"), Ok(Position::new(2, 3)));
        assert_eq!(parse_cell(" 4 , -1 "), Ok(Position::new(4, -1)));
        assert!(parse_cell("2").is_err());
        assert!(parse_cell("a,1").is_err());
    }

    #[test]
    fn default_config_uses_demo_walls() {
        let args = Args::parse_from(["gridworld_tui"]);
        let config = args.world_config().unwrap();
        assert_eq!((config.rows, config.cols), (10, 10));
        assert_eq!(config.walls, vec![Position::new(1, 1), Position::new(1, 3)]);
        assert_eq!(config.reset_mode, ResetMode::KeepPosition);
    }

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "gridworld_tui",
            "--wall",
            "0,1",
            "-w",
            "2,2",
            "--strict-walls",
            "--relocate-on-reset",
        ]);
        let config = args.world_config().unwrap();
        assert_eq!(config.walls, vec![Position::new(0, 1), Position::new(2, 2)]);
        assert!(config.strict_walls);
        assert_eq!(config.reset_mode, ResetMode::RelocateToStart);
    }

    #[test]
    fn unknown_key_is_reported_not_fatal() {
        let mut app = app(AgentKind::Manual);
        app.step_token("x");
        assert!(app.message.contains("Unrecognized direction"));
        assert_eq!(app.environment.steps_taken(), 0);

        app.step_token("r");
        assert_eq!(app.message, "((0,1), -1, false)");
    }

    #[test]
    fn planner_ticks_reach_goal() {
        let mut app = app(AgentKind::Planner);
        for _ in 0..10 {
            app.tick();
        }
        assert!(app.environment.is_done());
        assert_eq!(app.environment.agent_pos(), app.environment.goal_pos());
        assert!(app.message.contains("episode over"));
    }

    #[test]
    fn planner_finishes_again_after_reset_on_goal() {
        let mut app = app(AgentKind::Planner);
        for _ in 0..10 {
            app.tick();
        }
        assert!(app.environment.is_done());

        app.reset();
        assert!(!app.environment.is_done());
        assert_eq!(app.environment.agent_pos(), app.environment.goal_pos());

        app.tick();
        assert!(app.environment.is_done());
        assert_eq!(app.environment.steps_taken(), 1);
        assert_eq!(app.environment.last_transition().map(|t| t.reward), Some(100));
        assert!(app.message.contains("episode over"));
    }

    #[test]
    fn automatic_mode_ignores_move_keys() {
        let mut app = app(AgentKind::Random);
        for code in [KeyCode::Right, KeyCode::Down, KeyCode::Char('r'), KeyCode::Char('x')] {
            app.handle_key(code);
        }
        assert_eq!(app.environment.steps_taken(), 0);
        assert_eq!(app.environment.agent_pos(), Position::new(0, 0));

        app.handle_key(KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn manual_mode_moves_on_arrows_and_tokens() {
        let mut app = app(AgentKind::Manual);
        app.handle_key(KeyCode::Right);
        app.handle_key(KeyCode::Right);
        app.handle_key(KeyCode::Char('d'));
        assert_eq!(app.environment.agent_pos(), Position::new(1, 2));
        assert_eq!(app.environment.steps_taken(), 3);

        app.handle_key(KeyCode::Char('n'));
        assert_eq!(app.environment.episode(), 2);
        assert_eq!(app.environment.steps_taken(), 0);
    }

    #[test]
    fn manual_mode_ignores_ticks() {
        let mut app = app(AgentKind::Manual);
        app.tick();
        assert_eq!(app.environment.steps_taken(), 0);
    }
}
