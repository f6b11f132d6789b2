//! Multi-commodity distance fields for pheromone-guided routing.
//!
//! A [`ScentField`] maintains, per marker channel, the hop-count distance from
//! every cell of a rectangular grid to the nearest goal cell of that channel.
//! Goals are cells carrying a non-[`Direction::None`] marker. Distances are
//! rebuilt eagerly by multi-source breadth-first propagation whenever markers
//! or traversability change; a suspend flag batches bulk edits into a single
//! rebuild pass.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Number of marker channels tracked per cell. Channel 0 is reserved and
/// never carries goals or distances.
pub const CHANNELS: usize = 10;

/// Distance sentinel for cells no goal can reach.
pub const UNREACHED: u32 = u32::MAX;

/// Errors emitted by field construction.
#[derive(Debug, Error)]
pub enum FieldError {
    /// Indicates configuration values that cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Cardinal direction of travel, or `None` for "no preference".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// The four travel directions, in query order.
    pub const CARDINAL: [Self; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    /// Direction pointing back at the origin of this one.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Whether this direction travels along the row axis.
    #[must_use]
    pub const fn is_vertical(self) -> bool {
        matches!(self, Self::Up | Self::Down)
    }

    /// Whether this direction travels along the column axis.
    #[must_use]
    pub const fn is_horizontal(self) -> bool {
        matches!(self, Self::Left | Self::Right)
    }

    const fn bit(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Up => 1,
            Self::Down => 1 << 1,
            Self::Left => 1 << 2,
            Self::Right => 1 << 3,
        }
    }
}

/// Compact set of candidate directions returned by a field query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectionSet(u8);

impl DirectionSet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Adds a direction to the set. `Direction::None` is ignored.
    pub const fn insert(&mut self, direction: Direction) {
        self.0 |= direction.bit();
    }

    /// Whether the set contains `direction`. Always false for `None`.
    #[must_use]
    pub const fn contains(self, direction: Direction) -> bool {
        direction.bit() & self.0 != 0
    }

    /// Whether no direction is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of directions in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the contained directions in `CARDINAL` order.
    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::CARDINAL
            .into_iter()
            .filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = Self::empty();
        for direction in iter {
            set.insert(direction);
        }
        set
    }
}

/// Goal markers and distances for one commodity channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Channel {
    goals: Vec<Direction>,
    distance: Vec<u32>,
}

impl Channel {
    fn new(len: usize) -> Self {
        Self {
            goals: vec![Direction::None; len],
            distance: vec![UNREACHED; len],
        }
    }
}

/// Per-commodity distance-from-nearest-goal maps over a rectangular grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScentField {
    rows: usize,
    columns: usize,
    traversable: Vec<bool>,
    channels: Vec<Channel>,
    suspended: bool,
}

impl ScentField {
    /// Construct a field with every cell traversable and no goals.
    pub fn new(rows: usize, columns: usize) -> Result<Self, FieldError> {
        if rows == 0 || columns == 0 {
            return Err(FieldError::InvalidConfig(
                "field dimensions must be non-zero",
            ));
        }
        let len = rows * columns;
        Ok(Self {
            rows,
            columns,
            traversable: vec![true; len],
            channels: (0..CHANNELS).map(|_| Channel::new(len)).collect(),
            suspended: false,
        })
    }

    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// Whether rebuilds are currently deferred.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Defer or resume rebuilds. While suspended, goal and traversability
    /// edits accumulate without recomputation; call [`ScentField::rebuild_all`]
    /// after resuming.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    #[inline]
    fn index(&self, row: usize, column: usize) -> usize {
        row * self.columns + column
    }

    fn assert_cell(&self, row: usize, column: usize) {
        assert!(
            row < self.rows && column < self.columns,
            "cell ({row},{column}) outside {}x{} field",
            self.rows,
            self.columns
        );
    }

    fn assert_channel(channel: usize) {
        assert!(
            (1..CHANNELS).contains(&channel),
            "channel {channel} outside 1..{CHANNELS}"
        );
    }

    /// Whether the cell can be entered by propagation and by agents.
    #[must_use]
    pub fn is_traversable(&self, row: usize, column: usize) -> bool {
        self.assert_cell(row, column);
        self.traversable[self.index(row, column)]
    }

    /// Update a cell's traversability, rebuilding every channel (a topology
    /// change can open or close many paths at once).
    pub fn set_traversable(&mut self, row: usize, column: usize, traversable: bool) {
        self.assert_cell(row, column);
        let idx = self.index(row, column);
        self.traversable[idx] = traversable;
        self.rebuild_all();
    }

    /// Current goal marker of a cell on a channel.
    #[must_use]
    pub fn goal(&self, row: usize, column: usize, channel: usize) -> Direction {
        self.assert_cell(row, column);
        Self::assert_channel(channel);
        self.channels[channel].goals[self.index(row, column)]
    }

    /// Place or clear a goal marker, rebuilding that channel.
    pub fn set_goal(&mut self, row: usize, column: usize, channel: usize, direction: Direction) {
        self.assert_cell(row, column);
        Self::assert_channel(channel);
        let idx = self.index(row, column);
        self.channels[channel].goals[idx] = direction;
        self.rebuild_channel(channel);
    }

    /// Hop-count distance from a cell to the nearest goal of a channel, or
    /// [`UNREACHED`].
    #[must_use]
    pub fn distance(&self, row: usize, column: usize, channel: usize) -> u32 {
        self.assert_cell(row, column);
        Self::assert_channel(channel);
        self.channels[channel].distance[self.index(row, column)]
    }

    /// Rebuild one channel from scratch. No-op while suspended.
    pub fn rebuild_channel(&mut self, channel: usize) {
        Self::assert_channel(channel);
        if self.suspended {
            return;
        }
        propagate(self.columns, &self.traversable, &mut self.channels[channel]);
    }

    /// Rebuild every channel from scratch. No-op while suspended. Channels
    /// are independent, so the passes run in parallel.
    pub fn rebuild_all(&mut self) {
        if self.suspended {
            return;
        }
        let columns = self.columns;
        let traversable = &self.traversable;
        self.channels
            .par_iter_mut()
            .skip(1)
            .for_each(|channel| propagate(columns, traversable, channel));
    }

    /// Candidate directions moving toward the nearest goal of a channel.
    ///
    /// A goal cell short-circuits to its own marker direction. Otherwise
    /// every neighbor whose distance equals the finite minimum is returned;
    /// ties are not broken. The set is empty when the cell is non-traversable
    /// or no neighbor has been reached.
    #[must_use]
    pub fn best_directions(&self, row: usize, column: usize, channel: usize) -> DirectionSet {
        self.assert_cell(row, column);
        Self::assert_channel(channel);
        let mut set = DirectionSet::empty();
        let idx = self.index(row, column);
        if !self.traversable[idx] {
            return set;
        }

        let own = self.channels[channel].goals[idx];
        if own != Direction::None {
            set.insert(own);
            return set;
        }

        let distance = &self.channels[channel].distance;
        let mut min = UNREACHED;
        for direction in Direction::CARDINAL {
            if let Some(neighbor) = self.neighbor(row, column, direction) {
                min = min.min(distance[neighbor]);
            }
        }
        if min == UNREACHED {
            return set;
        }
        for direction in Direction::CARDINAL {
            if let Some(neighbor) = self.neighbor(row, column, direction)
                && distance[neighbor] == min
            {
                set.insert(direction);
            }
        }
        set
    }

    fn neighbor(&self, row: usize, column: usize, direction: Direction) -> Option<usize> {
        let (row, column) = match direction {
            Direction::Up => (row.checked_sub(1)?, column),
            Direction::Down => (row + 1, column),
            Direction::Left => (row, column.checked_sub(1)?),
            Direction::Right => (row, column + 1),
            Direction::None => return None,
        };
        (row < self.rows && column < self.columns).then(|| self.index(row, column))
    }
}

/// Multi-source breadth-first pass over one channel. Goal cells seed at
/// distance zero regardless of their own traversability; propagation only
/// enters traversable neighbors.
fn propagate(columns: usize, traversable: &[bool], channel: &mut Channel) {
    let len = traversable.len();
    channel.distance.fill(UNREACHED);

    let mut queue = VecDeque::new();
    for idx in 0..len {
        if channel.goals[idx] != Direction::None {
            channel.distance[idx] = 0;
            queue.push_back(idx);
        }
    }

    let mut visited = vec![false; len];
    while let Some(idx) = queue.pop_front() {
        if visited[idx] {
            continue;
        }
        visited[idx] = true;

        let here = channel.distance[idx];
        let row = idx / columns;
        let column = idx % columns;
        let mut relax = |neighbor: usize| {
            if traversable[neighbor] && here + 1 < channel.distance[neighbor] {
                channel.distance[neighbor] = here + 1;
                queue.push_back(neighbor);
            }
        };
        if row > 0 {
            relax(idx - columns);
        }
        if idx + columns < len {
            relax(idx + columns);
        }
        if column > 0 {
            relax(idx - 1);
        }
        if column + 1 < columns {
            relax(idx + 1);
        }
    }
}
