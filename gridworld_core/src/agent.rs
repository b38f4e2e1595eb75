use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{Direction, EntityId, Position, environment::WorldView};

/// Trait defining the behavior of an agent.
/// Agents decide which direction to move based on the WorldView.
pub trait Agent {
    /// Returns the unique ID of this agent.
    fn id(&self) -> EntityId;

    /// Picks the next move, or `None` when the agent has nothing useful to do.
    /// `&mut self` allows the agent to keep internal state such as a cached plan.
    fn get_action(&mut self, view: &WorldView) -> Option<Direction>;
}

/// A simple agent that moves in a uniformly random direction.
#[derive(Debug)]
pub struct RandomWalker {
    id: EntityId,
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(id: EntityId, seed: u64) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomWalker {
    fn id(&self) -> EntityId {
        self.id
    }

    fn get_action(&mut self, _view: &WorldView) -> Option<Direction> {
        let index = self.rng.random_range(0..Direction::ALL.len());
        Some(Direction::ALL[index])
    }
}

/// A planning agent that walks the shortest path to the goal.
#[derive(Debug)]
pub struct PlanningAgent {
    id: EntityId,
    current_plan: VecDeque<Position>, // Queue of positions to visit
}

impl PlanningAgent {
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            current_plan: VecDeque::new(),
        }
    }

    /// Returns manhattan distance between two positions
    fn manhattan_distance(a: Position, b: Position) -> u64 {
        a.row.abs_diff(b.row) + a.col.abs_diff(b.col)
    }

    /// Converts a move between two adjacent positions into a Direction
    fn position_to_direction(src: Position, dst: Position) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|direction| src.shifted(*direction) == dst)
    }

    /// A* pathfinding implementation
    fn a_star_path(start: Position, goal: Position, view: &WorldView) -> Option<Vec<Position>> {
        // For priority queue
        #[derive(Clone, Eq, PartialEq)]
        struct PrioritizedItem {
            priority: u64,
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
        let mut cost_so_far: HashMap<Position, u64> = HashMap::new();

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

            let current_cost = cost_so_far.get(&current).copied().unwrap_or(u64::MAX);
            for neighbor in Direction::ALL.map(|direction| current.shifted(direction)) {
                if !view.is_open(neighbor) {
                    continue;
                }
                let new_cost = current_cost.saturating_add(1);
                let improved = cost_so_far
                    .get(&neighbor)
                    .is_none_or(|known| new_cost < *known);
                if improved {
                    cost_so_far.insert(neighbor, new_cost);
                    let priority = new_cost + Self::manhattan_distance(neighbor, goal);
                    frontier.push(PrioritizedItem {
                        priority,
                        position: neighbor,
                    });
                    came_from.insert(neighbor, current);
                }
            }
        }

        if !goal_reached {
            return None;
        }

        // Reconstruct path
        let mut path = vec![goal];
        let mut current = goal;
        while current != start {
            current = *came_from.get(&current)?;
            path.push(current);
        }

        path.reverse();
        Some(path)
    }
}

impl Agent for PlanningAgent {
    fn id(&self) -> EntityId {
        self.id
    }

    fn get_action(&mut self, view: &WorldView) -> Option<Direction> {
        let current_pos = view.location;

        // 0. Already on the goal: bump into a fence or wall so the step reports it
        if current_pos == view.goal {
            self.current_plan.clear();
            let blocked = Direction::ALL
                .into_iter()
                .find(|direction| !view.is_open(current_pos.shifted(*direction)));
            return blocked.or(Some(Direction::Up));
        }

        // 1. Follow existing plan while it still starts next to us
        if let Some(next_pos) = self.current_plan.pop_front() {
            if let Some(direction) = Self::position_to_direction(current_pos, next_pos) {
                return Some(direction);
            }
            self.current_plan.clear();
        }

        // 2. Plan afresh to the goal, skipping the current position
        let plan = Self::a_star_path(current_pos, view.goal, view)?;
        self.current_plan.extend(plan.into_iter().skip(1));
        let next_pos = self.current_plan.pop_front()?;
        Self::position_to_direction(current_pos, next_pos)
    }
}
