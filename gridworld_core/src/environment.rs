use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::{AGENT, Direction, EMPTY, GOAL, Position, WALL, map::Grid};

/// Errors raised by the grid environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridWorldError {
    #[error("Grid dimensions must be positive, got ({rows}, {cols})")]
    InvalidDimension { rows: i64, cols: i64 },
    #[error("Unrecognized direction '{0}', expected one of l, r, u, d")]
    InvalidDirection(String),
    #[error("Invalid wall at {position}: {reason}")]
    InvalidWallSpec {
        position: Position,
        reason: &'static str,
    },
    #[error("Start position {0} is outside the grid")]
    StartOutOfBounds(Position),
    #[error("Goal position {0} is outside the grid")]
    GoalOutOfBounds(Position),
}

/// Outcome of the most recent attempted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Normal,
    InFence,
    InWall,
    AtGoal,
}

/// Reward paid for each `Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTable {
    pub normal: i32,
    pub in_fence: i32,
    pub in_wall: i32,
    pub at_goal: i32,
}

impl Default for RewardTable {
    fn default() -> Self {
        RewardTable {
            normal: -1,
            in_fence: -5,
            in_wall: -5,
            at_goal: 100,
        }
    }
}

impl RewardTable {
    pub fn get(&self, status: Status) -> i32 {
        match status {
            Status::Normal => self.normal,
            Status::InFence => self.in_fence,
            Status::InWall => self.in_wall,
            Status::AtGoal => self.at_goal,
        }
    }
}

/// What `reset` does with the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetMode {
    /// Counters are cleared but the agent stays where the last episode left it.
    #[default]
    KeepPosition,
    /// The agent is also moved back to the start cell.
    RelocateToStart,
}

/// Everything needed to build a `GridWorld`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridWorldConfig {
    pub rows: i64,
    pub cols: i64,
    pub start: Position,
    /// Defaults to the bottom-right corner.
    pub goal: Option<Position>,
    pub walls: Vec<Position>,
    pub rewards: RewardTable,
    pub reset_mode: ResetMode,
    /// Reject walls off the grid or on the start/goal cells.
    pub strict_walls: bool,
}

impl Default for GridWorldConfig {
    fn default() -> Self {
        GridWorldConfig {
            rows: 5,
            cols: 5,
            start: Position::new(0, 0),
            goal: None,
            walls: Vec::new(),
            rewards: RewardTable::default(),
            reset_mode: ResetMode::default(),
            strict_walls: false,
        }
    }
}

/// The `(next_state, reward, done)` observation returned by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Position,
    pub reward: i32,
    pub done: bool,
    pub status: Status,
}

/// Provides a read-only view of the environment relevant to an agent.
#[derive(Debug)]
pub struct WorldView<'a> {
    pub location: Position,
    pub goal: Position,
    pub rows: usize,
    pub cols: usize,
    pub walls: &'a HashSet<Position>,
}

impl WorldView<'_> {
    /// True if `position` is on the grid and not a wall.
    pub fn is_open(&self, position: Position) -> bool {
        in_bounds(position, self.rows, self.cols) && !self.walls.contains(&position)
    }
}

fn in_bounds(position: Position, rows: usize, cols: usize) -> bool {
    let row_ok = usize::try_from(position.row).is_ok_and(|row| row < rows);
    let col_ok = usize::try_from(position.col).is_ok_and(|col| col < cols);
    row_ok && col_ok
}

/// A rectangular grid with one agent, static walls and a goal cell.
///
/// Every mutation goes through `&mut self`; the environment is meant to be
/// owned by a single driver running one episode at a time.
#[derive(Debug, Clone)]
pub struct GridWorld {
    rows: usize,
    cols: usize,
    walls: HashSet<Position>,
    start_pos: Position,
    goal_pos: Position,
    agent_pos: Position,
    status: Status,
    steps_taken: usize,
    max_steps: usize,
    done: bool,
    episode: usize,
    rewards: RewardTable,
    reset_mode: ResetMode,
    last_transition: Option<Transition>,
}

impl GridWorld {
    /// Creates an environment with no walls, the goal in the bottom-right corner
    /// and the default reward table.
    pub fn new(rows: i64, cols: i64, start: Position) -> Result<Self, GridWorldError> {
        Self::from_config(GridWorldConfig {
            rows,
            cols,
            start,
            ..GridWorldConfig::default()
        })
    }

    pub fn from_config(config: GridWorldConfig) -> Result<Self, GridWorldError> {
        let invalid = GridWorldError::InvalidDimension {
            rows: config.rows,
            cols: config.cols,
        };
        if config.rows <= 0 || config.cols <= 0 {
            return Err(invalid);
        }
        let rows = usize::try_from(config.rows).map_err(|_| invalid.clone())?;
        let cols = usize::try_from(config.cols).map_err(|_| invalid.clone())?;
        let max_steps = rows.checked_mul(cols).ok_or(invalid)?;

        if !in_bounds(config.start, rows, cols) {
            return Err(GridWorldError::StartOutOfBounds(config.start));
        }
        let goal_pos = config
            .goal
            .unwrap_or(Position::new(config.rows - 1, config.cols - 1));
        if !in_bounds(goal_pos, rows, cols) {
            return Err(GridWorldError::GoalOutOfBounds(goal_pos));
        }

        let mut world = GridWorld {
            rows,
            cols,
            walls: HashSet::new(),
            start_pos: config.start,
            goal_pos,
            agent_pos: config.start,
            status: Status::Normal,
            steps_taken: 0,
            max_steps,
            done: false,
            episode: 0,
            rewards: config.rewards,
            reset_mode: config.reset_mode,
            last_transition: None,
        };
        if config.strict_walls {
            world.set_walls_checked(config.walls)?;
        } else {
            world.set_walls(config.walls);
        }

        info!(
            rows,
            cols,
            start = %world.start_pos,
            goal = %world.goal_pos,
            walls = world.walls.len(),
            "grid world created"
        );
        Ok(world)
    }

    /// Replaces the wall set without validation.
    ///
    /// Cells off the grid or on the start/goal are accepted as given. Off-grid
    /// walls can never be hit; a wall on the goal makes it unreachable.
    pub fn set_walls<I, P>(&mut self, cells: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<Position>,
    {
        self.walls = cells.into_iter().map(Into::into).collect();
        for wall in &self.walls {
            if let Err(GridWorldError::InvalidWallSpec { position, reason }) =
                self.validate_wall(*wall)
            {
                warn!(%position, reason, "accepting questionable wall");
            }
        }
    }

    /// Replaces the wall set, rejecting the whole batch if any cell is off the
    /// grid or on the start/goal. On error the previous walls are kept.
    pub fn set_walls_checked<I, P>(&mut self, cells: I) -> Result<(), GridWorldError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Position>,
    {
        let walls: HashSet<Position> = cells.into_iter().map(Into::into).collect();
        for wall in &walls {
            self.validate_wall(*wall)?;
        }
        self.walls = walls;
        Ok(())
    }

    fn validate_wall(&self, position: Position) -> Result<(), GridWorldError> {
        let reason = if !self.contains(position) {
            "outside the grid"
        } else if position == self.start_pos {
            "on the start cell"
        } else if position == self.goal_pos {
            "on the goal cell"
        } else {
            return Ok(());
        };
        Err(GridWorldError::InvalidWallSpec { position, reason })
    }

    /// Starts a new episode and returns the start position.
    ///
    /// With `ResetMode::KeepPosition` the agent is *not* moved back to the start;
    /// it begins the new episode wherever the previous one ended.
    pub fn reset(&mut self) -> Position {
        self.steps_taken = 0;
        self.done = false;
        self.status = Status::Normal;
        self.last_transition = None;
        self.episode += 1;
        if self.reset_mode == ResetMode::RelocateToStart {
            self.agent_pos = self.start_pos;
        }
        info!(episode = self.episode, agent = %self.agent_pos, "episode reset");
        self.start_pos
    }

    /// Attempts one move and returns the resulting observation.
    ///
    /// Moves across the fence or into a wall are rejected and the agent stays put.
    /// Once the episode is done this is a no-op that repeats the last status and
    /// its reward until `reset` is called.
    pub fn step(&mut self, direction: Direction) -> Transition {
        if self.done {
            debug!(%direction, "step on finished episode ignored");
            let transition = self.observe();
            self.last_transition = Some(transition);
            return transition;
        }

        let candidate = self.agent_pos.shifted(direction);
        let next = if !self.contains(candidate) {
            self.status = Status::InFence;
            self.agent_pos
        } else if self.walls.contains(&candidate) {
            self.status = Status::InWall;
            self.agent_pos
        } else {
            self.status = Status::Normal;
            candidate
        };

        self.steps_taken += 1;
        if self.steps_taken == self.max_steps {
            self.done = true;
        }

        self.agent_pos = next;
        if self.agent_pos == self.goal_pos {
            self.status = Status::AtGoal;
            self.done = true;
        }

        let transition = self.observe();
        debug!(
            %direction,
            state = %transition.state,
            status = ?transition.status,
            reward = transition.reward,
            done = transition.done,
            steps = self.steps_taken,
            "step"
        );
        self.last_transition = Some(transition);
        transition
    }

    /// Parses a direction token and steps. Unknown tokens leave the episode untouched.
    pub fn step_token(&mut self, token: &str) -> Result<Transition, GridWorldError> {
        let direction: Direction = token.parse()?;
        Ok(self.step(direction))
    }

    fn observe(&self) -> Transition {
        Transition {
            state: self.agent_pos,
            reward: self.rewards.get(self.status),
            done: self.done,
            status: self.status,
        }
    }

    /// Produces a `rows x cols` glyph snapshot: walls, then goal, then the agent on top.
    pub fn render(&self) -> Grid<char> {
        let mut grid = Grid::filled(self.rows, self.cols, EMPTY);
        for wall in &self.walls {
            if let Some(cell) = grid.get_mut(*wall) {
                *cell = WALL;
            }
        }
        if let Some(cell) = grid.get_mut(self.goal_pos) {
            *cell = GOAL;
        }
        if let Some(cell) = grid.get_mut(self.agent_pos) {
            *cell = AGENT;
        }
        grid
    }

    pub fn view(&self) -> WorldView<'_> {
        WorldView {
            location: self.agent_pos,
            goal: self.goal_pos,
            rows: self.rows,
            cols: self.cols,
            walls: &self.walls,
        }
    }

    /// True if `position` is inside `[0, rows) x [0, cols)`.
    pub fn contains(&self, position: Position) -> bool {
        in_bounds(position, self.rows, self.cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
    pub fn cols(&self) -> usize {
        self.cols
    }
    pub fn walls(&self) -> &HashSet<Position> {
        &self.walls
    }
    pub fn start_pos(&self) -> Position {
        self.start_pos
    }
    pub fn goal_pos(&self) -> Position {
        self.goal_pos
    }
    pub fn agent_pos(&self) -> Position {
        self.agent_pos
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }
    pub fn is_done(&self) -> bool {
        self.done
    }
    pub fn episode(&self) -> usize {
        self.episode
    }
    pub fn rewards(&self) -> &RewardTable {
        &self.rewards
    }
    pub fn reset_mode(&self) -> ResetMode {
        self.reset_mode
    }
    pub fn last_transition(&self) -> Option<Transition> {
        self.last_transition
    }
}

/// Errors produced while parsing a text map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("Map string is empty.")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{token}' at position ({row}, {col}).")]
    UnknownToken {
        token: String,
        row: usize,
        col: usize,
    },
    #[error("Multiple start positions ('ST') found.")]
    MultipleStarts,
    #[error("No start position ('ST') found in map.")]
    MissingStart,
    #[error("Multiple goal positions ('GL') found.")]
    MultipleGoals,
}

/// Loads a world layout from a string representation of a map.
///
/// Each line is a row of whitespace-separated codes: `BL` blank, `WL`/`WA` wall,
/// `ST` start (exactly one) and `GL` goal (optional, defaults to the bottom-right).
pub fn load_world_from_string(map_string: &str) -> Result<GridWorldConfig, MapError> {
    let lines: Vec<&str> = map_string
        .trim()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return Err(MapError::Empty);
    }

    let mut width = 0;
    let mut config = GridWorldConfig::default();
    let mut start = None;

    for (row, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if row == 0 {
            width = tokens.len();
        } else if tokens.len() != width {
            return Err(MapError::InconsistentWidth {
                row,
                expected: width,
                found: tokens.len(),
            });
        }

        for (col, token) in tokens.iter().enumerate() {
            let pos = Position::new(row as i64, col as i64);
            match *token {
                "BL" => {}
                "WL" | "WA" => config.walls.push(pos),
                "ST" => {
                    if start.replace(pos).is_some() {
                        return Err(MapError::MultipleStarts);
                    }
                }
                "GL" => {
                    if config.goal.replace(pos).is_some() {
                        return Err(MapError::MultipleGoals);
                    }
                }
                unknown => {
                    return Err(MapError::UnknownToken {
                        token: unknown.to_string(),
                        row,
                        col,
                    });
                }
            }
        }
    }

    config.rows = lines.len() as i64;
    config.cols = width as i64;
    config.start = start.ok_or(MapError::MissingStart)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(rows: i64, cols: i64) -> GridWorld {
        GridWorld::new(rows, cols, Position::new(0, 0)).unwrap()
    }

    #[test]
    fn new_sets_defaults() {
        let w = world(3, 4);
        assert_eq!(w.goal_pos(), Position::new(2, 3));
        assert_eq!(w.agent_pos(), Position::new(0, 0));
        assert_eq!(w.max_steps(), 12);
        assert_eq!(w.status(), Status::Normal);
        assert!(!w.is_done());
        assert!(w.walls().is_empty());
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        assert_eq!(
            GridWorld::new(0, 3, Position::new(0, 0)).unwrap_err(),
            GridWorldError::InvalidDimension { rows: 0, cols: 3 }
        );
        assert!(matches!(
            GridWorld::new(2, -1, Position::new(0, 0)),
            Err(GridWorldError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn start_and_goal_must_be_on_grid() {
        assert_eq!(
            GridWorld::new(2, 2, Position::new(2, 0)).unwrap_err(),
            GridWorldError::StartOutOfBounds(Position::new(2, 0))
        );
        let config = GridWorldConfig {
            goal: Some(Position::new(-1, 0)),
            ..GridWorldConfig::default()
        };
        assert_eq!(
            GridWorld::from_config(config).unwrap_err(),
            GridWorldError::GoalOutOfBounds(Position::new(-1, 0))
        );
    }

    #[test]
    fn reward_table_covers_every_status() {
        let table = RewardTable::default();
        assert_eq!(table.get(Status::Normal), -1);
        assert_eq!(table.get(Status::InFence), -5);
        assert_eq!(table.get(Status::InWall), -5);
        assert_eq!(table.get(Status::AtGoal), 100);
    }

    #[test]
    fn normal_move_costs_one() {
        let mut w = world(3, 3);
        let t = w.step(Direction::Right);
        assert_eq!(t.state, Position::new(0, 1));
        assert_eq!(t.reward, -1);
        assert!(!t.done);
        assert_eq!(w.steps_taken(), 1);
    }

    #[test]
    fn rejected_moves_still_count_as_steps() {
        let mut w = world(3, 3);
        w.step(Direction::Left);
        w.step(Direction::Up);
        assert_eq!(w.steps_taken(), 2);
        assert_eq!(w.agent_pos(), Position::new(0, 0));
        assert_eq!(w.status(), Status::InFence);
    }

    #[test]
    fn unchecked_walls_accept_anything() {
        let mut w = world(3, 3);
        w.set_walls([(0, 0), (5, 5), (1, 1)]);
        assert_eq!(w.walls().len(), 3);
        assert!(w.walls().contains(&Position::new(5, 5)));
    }

    #[test]
    fn set_walls_replaces_previous_set() {
        let mut w = world(3, 3);
        w.set_walls([(1, 1)]);
        w.set_walls([(0, 1), (0, 1)]);
        assert_eq!(w.walls().len(), 1);
        assert!(w.walls().contains(&Position::new(0, 1)));
    }

    #[test]
    fn checked_walls_reject_bad_cells_and_keep_old_set() {
        let mut w = world(3, 3);
        w.set_walls_checked([(1, 1)]).unwrap();

        let err = w.set_walls_checked([(0, 2), (3, 0)]).unwrap_err();
        assert_eq!(
            err,
            GridWorldError::InvalidWallSpec {
                position: Position::new(3, 0),
                reason: "outside the grid"
            }
        );
        assert!(matches!(
            w.set_walls_checked([(0, 0)]),
            Err(GridWorldError::InvalidWallSpec { reason: "on the start cell", .. })
        ));
        assert!(matches!(
            w.set_walls_checked([(2, 2)]),
            Err(GridWorldError::InvalidWallSpec { reason: "on the goal cell", .. })
        ));
        assert_eq!(w.walls().len(), 1);
        assert!(w.walls().contains(&Position::new(1, 1)));
    }

    #[test]
    fn strict_config_validates_walls() {
        let config = GridWorldConfig {
            walls: vec![Position::new(4, 4)],
            strict_walls: true,
            ..GridWorldConfig::default()
        };
        assert!(matches!(
            GridWorld::from_config(config),
            Err(GridWorldError::InvalidWallSpec { .. })
        ));
    }

    #[test]
    fn step_token_rejects_unknown_tokens_without_side_effects() {
        let mut w = world(3, 3);
        w.step(Direction::Right);
        let before = (w.agent_pos(), w.steps_taken(), w.status());
        assert_eq!(
            w.step_token("q"),
            Err(GridWorldError::InvalidDirection("q".to_string()))
        );
        assert_eq!((w.agent_pos(), w.steps_taken(), w.status()), before);

        let t = w.step_token("d").unwrap();
        assert_eq!(t.state, Position::new(1, 1));
    }

    #[test]
    fn steps_after_done_are_no_ops() {
        let mut w = world(1, 2);
        let t = w.step(Direction::Right);
        assert!(t.done);
        assert_eq!(t.reward, 100);

        let again = w.step(Direction::Left);
        assert_eq!(again.state, Position::new(0, 1));
        assert_eq!(again.status, Status::AtGoal);
        assert_eq!(again.reward, 100);
        assert!(again.done);
        assert_eq!(w.steps_taken(), 1);
    }

    #[test]
    fn relocating_reset_moves_agent_home() {
        let config = GridWorldConfig {
            rows: 3,
            cols: 3,
            reset_mode: ResetMode::RelocateToStart,
            ..GridWorldConfig::default()
        };
        let mut w = GridWorld::from_config(config).unwrap();
        w.step(Direction::Down);
        w.step(Direction::Right);
        assert_eq!(w.reset(), Position::new(0, 0));
        assert_eq!(w.agent_pos(), Position::new(0, 0));
        assert_eq!(w.episode(), 1);
        assert!(w.last_transition().is_none());
    }

    #[test]
    fn render_paints_agent_last() {
        let mut w = world(2, 3);
        w.set_walls([(0, 1), (9, 9)]);
        let snapshot = w.render();
        assert_eq!(snapshot.to_string(), "C# \n  G");

        w.set_walls([(0, 0)]);
        assert_eq!(w.render()[(0, 0)], AGENT);
    }

    #[test]
    fn map_loader_reads_layout() {
        let map = "
            ST BL WL
            BL WA BL
            BL BL GL
        ";
        let config = load_world_from_string(map).unwrap();
        assert_eq!((config.rows, config.cols), (3, 3));
        assert_eq!(config.start, Position::new(0, 0));
        assert_eq!(config.goal, Some(Position::new(2, 2)));
        assert_eq!(config.walls, vec![Position::new(0, 2), Position::new(1, 1)]);

        let w = GridWorld::from_config(config).unwrap();
        assert_eq!(w.render().to_string(), "C #\n # \n  G");
    }

    #[test]
    fn loaded_maps_pass_strict_wall_validation() {
        let map = "
            WL ST WL
            BL WA BL
            WL GL WL
        ";
        let mut config = load_world_from_string(map).unwrap();
        config.strict_walls = true;
        let w = GridWorld::from_config(config).unwrap();
        assert_eq!(w.walls().len(), 5);
        assert_eq!(w.goal_pos(), Position::new(2, 1));
    }

    #[test]
    fn overrides_on_loaded_map_fail_in_from_config() {
        let mut config = load_world_from_string("ST BL\nBL BL").unwrap();
        config.walls.push(Position::new(1, 1));
        config.strict_walls = true;
        assert_eq!(
            GridWorld::from_config(config).unwrap_err(),
            GridWorldError::InvalidWallSpec {
                position: Position::new(1, 1),
                reason: "on the goal cell"
            }
        );
    }

    #[test]
    fn map_loader_defaults_goal_to_corner() {
        let config = load_world_from_string("BL ST\nBL BL").unwrap();
        assert_eq!(config.goal, None);
        let w = GridWorld::from_config(config).unwrap();
        assert_eq!(w.goal_pos(), Position::new(1, 1));
        assert_eq!(w.agent_pos(), Position::new(0, 1));
    }

    #[test]
    fn map_loader_reports_errors() {
        assert_eq!(load_world_from_string("  \n "), Err(MapError::Empty));
        assert_eq!(
            load_world_from_string("ST BL\nBL"),
            Err(MapError::InconsistentWidth {
                row: 1,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            load_world_from_string("ST XX"),
            Err(MapError::UnknownToken {
                token: "XX".to_string(),
                row: 0,
                col: 1
            })
        );
        assert_eq!(load_world_from_string("ST ST"), Err(MapError::MultipleStarts));
        assert_eq!(load_world_from_string("BL GL"), Err(MapError::MissingStart));
        assert_eq!(
            load_world_from_string("ST GL GL"),
            Err(MapError::MultipleGoals)
        );
    }
}
