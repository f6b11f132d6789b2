//! Core simulation state for the colony workspace.
//!
//! Three pieces live here: the [`Grid`] of terrain cells with its material
//! transition rules and pheromone markers, the per-ant decision process that
//! turns routing-field output into movement and pickup/drop attempts, and the
//! [`World`] tick pipeline that drives both. Distance propagation itself is
//! owned by the `colony-field` crate; the grid pushes marker and
//! traversability deltas into it and queries it for best directions.

use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub use colony_field::{CHANNELS, Direction, DirectionSet, FieldError, ScentField, UNREACHED};

new_key_type! {
    /// Stable handle for ants backed by a generational slot map.
    pub struct AntId;
}

/// Convenience alias for associating side data with ants.
pub type AntMap<T> = SecondaryMap<AntId, T>;

/// Footprint probe offsets relative to an ant's center, as fractions of its
/// width and height: center, then the four corners.
const FOOTPRINT: [(f32, f32); 5] = [
    (0.0, 0.0),
    (-0.5, -0.5),
    (0.5, -0.5),
    (-0.5, 0.5),
    (0.5, 0.5),
];

/// Errors emitted by world and grid construction.
#[derive(Debug, Error)]
pub enum ColonyError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Indicates generator output the grid cannot accept.
    #[error("invalid terrain: {0}")]
    InvalidTerrain(&'static str),
    /// Propagated routing-field failure.
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Pheromone commodity channels that ants follow or service.
///
/// The `Move*` values mark sources ("carry this away"), the `Drop*` values
/// mark destinations. `DeadAnt` is a transition trigger only and carries no
/// marker channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Pheromone {
    #[default]
    None,
    MoveDirt,
    MoveEgg,
    MoveFood,
    MoveDeadAnt,
    MoveQueen,
    DropDirt,
    DropEgg,
    DropFood,
    DropDeadAnt,
    DeadAnt,
}

impl Pheromone {
    /// Routing-field channel carrying this commodity's markers, when it has
    /// one.
    #[must_use]
    pub const fn channel(self) -> Option<usize> {
        match self {
            Self::None | Self::DeadAnt => None,
            Self::MoveDirt => Some(1),
            Self::MoveEgg => Some(2),
            Self::MoveFood => Some(3),
            Self::MoveDeadAnt => Some(4),
            Self::MoveQueen => Some(5),
            Self::DropDirt => Some(6),
            Self::DropEgg => Some(7),
            Self::DropFood => Some(8),
            Self::DropDeadAnt => Some(9),
        }
    }

    /// Drop-side counterpart consulted while an ant is carrying something.
    /// Queens eat what they carry, so `MoveQueen` has no counterpart.
    #[must_use]
    pub const fn drop_counterpart(self) -> Self {
        match self {
            Self::MoveDirt => Self::DropDirt,
            Self::MoveEgg => Self::DropEgg,
            Self::MoveFood => Self::DropFood,
            Self::MoveDeadAnt => Self::DropDeadAnt,
            _ => Self::None,
        }
    }
}

/// Content type of a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Material {
    #[default]
    None,
    Air,
    Dirt,
    Egg,
    Food,
    DeadAnt,
    WasteDirt,
    WasteDeadAnt,
}

impl Material {
    /// Only packed dirt blocks movement; everything else is passable.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Dirt)
    }
}

/// One block of terrain: material, stock counter, and one marker slot per
/// commodity channel. `stock` is meaningful for `Food` (portions remaining)
/// and `DeadAnt` (corpse pile depth).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub material: Material,
    pub stock: i32,
    pub markers: [Direction; CHANNELS],
}

impl Cell {
    /// Shorthand for a cell holding just a material.
    #[must_use]
    pub fn of(material: Material) -> Self {
        Self {
            material,
            ..Self::default()
        }
    }

    /// Marker direction for a commodity, `None` for channel-less commodities.
    #[must_use]
    pub fn marker(&self, pheromone: Pheromone) -> Direction {
        pheromone
            .channel()
            .map_or(Direction::None, |channel| self.markers[channel])
    }
}

/// Unit-scale displacement produced by the decision process. The grid scales
/// it by its `speed` when resolving destination cells.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Movement {
    pub dx: f32,
    pub dy: f32,
}

impl Movement {
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.dx.abs() + self.dy.abs() == 0.0
    }
}

/// Pending request to add a new egg at a world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnEgg {
    pub x: f32,
    pub y: f32,
}

/// Static configuration for a colony world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColonyConfig {
    /// Width of the terrain in world units.
    pub world_width: f32,
    /// Height of the terrain in world units.
    pub world_height: f32,
    /// Displacement multiplier applied when resolving movement targets.
    pub speed: f32,
    /// Optional RNG seed for reproducible colonies.
    pub rng_seed: Option<u64>,
    /// Food portions a single cell can hold.
    pub food_full: i32,
    /// Meals a queen must digest before she can lay.
    pub queen_full: u32,
    /// Ticks for a queen to digest one meal.
    pub queen_digest_ticks: u32,
    /// Ticks for an egg to hatch.
    pub egg_hatch_ticks: u32,
    /// Age at which an ant is fully grown.
    pub adult_age: u32,
    /// Age at which an ant dies.
    pub max_age: u32,
    /// Movement attempts per tick before giving up.
    pub max_move_tries: u32,
    /// Ticks a random wander direction persists before a redraw.
    pub random_streak_ticks: u32,
    /// Maximum number of tick summaries retained in-memory.
    pub history_capacity: usize,
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            world_width: 1_000.0,
            world_height: 1_000.0,
            speed: 1.0,
            rng_seed: None,
            food_full: 4,
            queen_full: 4,
            queen_digest_ticks: 200,
            egg_hatch_ticks: 400,
            adult_age: 4_000,
            max_age: 4_001,
            max_move_tries: 5,
            random_streak_ticks: 16,
            history_capacity: 256,
        }
    }
}

impl ColonyConfig {
    fn validate(&self) -> Result<(), ColonyError> {
        if self.world_width <= 0.0 || self.world_height <= 0.0 {
            return Err(ColonyError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        if self.speed <= 0.0 {
            return Err(ColonyError::InvalidConfig("speed must be positive"));
        }
        if self.food_full <= 0 {
            return Err(ColonyError::InvalidConfig("food_full must be positive"));
        }
        if self.queen_digest_ticks == 0 || self.egg_hatch_ticks == 0 {
            return Err(ColonyError::InvalidConfig(
                "digest and hatch timers must be non-zero",
            ));
        }
        if self.adult_age == 0 || self.max_age < self.adult_age {
            return Err(ColonyError::InvalidConfig(
                "max_age must be at least adult_age, both non-zero",
            ));
        }
        if self.max_move_tries == 0 {
            return Err(ColonyError::InvalidConfig(
                "max_move_tries must be non-zero",
            ));
        }
        if self.history_capacity == 0 {
            return Err(ColonyError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Rectangular terrain of cells plus the pheromone routing field.
///
/// All mutation flows through `&mut Grid`, so material and marker changes are
/// serialized by construction and a triggered field rebuild completes before
/// the borrow ends.
#[derive(Debug)]
pub struct Grid {
    rows: usize,
    columns: usize,
    width: f32,
    height: f32,
    cell_width: f32,
    cell_height: f32,
    speed: f32,
    food_full: i32,
    cells: Vec<Cell>,
    last_painted: Option<(usize, usize, Pheromone)>,
    field: ScentField,
    spawn_requests: Vec<SpawnEgg>,
}

impl Grid {
    /// Build a grid from generator output, seeding the routing field from any
    /// markers already present in one batched pass.
    pub fn new(config: &ColonyConfig, blocks: Vec<Vec<Cell>>) -> Result<Self, ColonyError> {
        config.validate()?;
        let rows = blocks.len();
        if rows == 0 || blocks[0].is_empty() {
            return Err(ColonyError::InvalidTerrain("terrain must be non-empty"));
        }
        let columns = blocks[0].len();
        if blocks.iter().any(|row| row.len() != columns) {
            return Err(ColonyError::InvalidTerrain(
                "terrain rows must all have the same length",
            ));
        }

        let mut field = ScentField::new(rows, columns)?;
        let cells: Vec<Cell> = blocks.into_iter().flatten().collect();

        field.set_suspended(true);
        for (idx, cell) in cells.iter().enumerate() {
            let (row, col) = (idx / columns, idx % columns);
            field.set_traversable(row, col, !cell.material.is_blocking());
            for channel in 1..CHANNELS {
                if cell.markers[channel] != Direction::None {
                    field.set_goal(row, col, channel, cell.markers[channel]);
                }
            }
        }
        field.set_suspended(false);
        field.rebuild_all();

        Ok(Self {
            rows,
            columns,
            width: config.world_width,
            height: config.world_height,
            cell_width: config.world_width / columns as f32,
            cell_height: config.world_height / rows as f32,
            speed: config.speed,
            food_full: config.food_full,
            cells,
            last_painted: None,
            field,
            spawn_requests: Vec::new(),
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

    #[must_use]
    pub const fn cell_width(&self) -> f32 {
        self.cell_width
    }

    #[must_use]
    pub const fn cell_height(&self) -> f32 {
        self.cell_height
    }

    #[must_use]
    pub const fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Read-only access to the routing field.
    #[must_use]
    pub fn field(&self) -> &ScentField {
        &self.field
    }

    #[inline]
    const fn index(&self, row: usize, col: usize) -> usize {
        row * self.columns + col
    }

    /// Resolve a world position to its (row, column) cell, if inside the
    /// terrain. The origin sits at the terrain center.
    #[must_use]
    pub fn cell_at(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let fr = (y + self.height / 2.0) / self.cell_height;
        let fc = (x + self.width / 2.0) / self.cell_width;
        if fr < 0.0 || fc < 0.0 {
            return None;
        }
        let (row, col) = (fr.floor() as usize, fc.floor() as usize);
        (row < self.rows && col < self.columns).then_some((row, col))
    }

    /// World position of a cell's center.
    #[must_use]
    pub fn cell_center(&self, row: usize, col: usize) -> (f32, f32) {
        (
            (col as f32 + 0.5) * self.cell_width - self.width / 2.0,
            (row as f32 + 0.5) * self.cell_height - self.height / 2.0,
        )
    }

    /// Snapshot of a cell's material, stock, and markers.
    #[must_use]
    pub fn cell_details(&self, row: usize, col: usize) -> Option<Cell> {
        (row < self.rows && col < self.columns).then(|| self.cells[self.index(row, col)])
    }

    /// Snapshot of the cell under a world position displaced by a movement.
    #[must_use]
    pub fn cell_details_at(&self, x: f32, y: f32, movement: Movement) -> Option<Cell> {
        let (row, col) = self.cell_at(x + movement.dx * self.speed, y + movement.dy * self.speed)?;
        self.cell_details(row, col)
    }

    /// Paint a marker at a world position, seeding `Up` and inheriting a
    /// trail direction when the previously painted cell is a neighbor that
    /// already carries the same commodity's marker: both cells are rewritten
    /// to point along the paint stroke. Repeat paints on the same cell are
    /// idempotent. Rebuilds the commodity's channel once at the end.
    pub fn apply_marker(&mut self, x: f32, y: f32, pheromone: Pheromone) -> bool {
        let Some(channel) = pheromone.channel() else {
            return false;
        };
        let Some((row, col)) = self.cell_at(x, y) else {
            return false;
        };
        if self.last_painted == Some((row, col, pheromone)) {
            return false;
        }

        self.field.set_suspended(true);
        self.set_marker(row, col, pheromone, Direction::Up);
        if let Some((prev_row, prev_col, _)) = self.last_painted {
            // the stroke direction is previous cell -> current cell
            let inherited = if prev_row + 1 == row && prev_col == col {
                Direction::Down
            } else if prev_row == row + 1 && prev_col == col {
                Direction::Up
            } else if prev_row == row && prev_col == col + 1 {
                Direction::Left
            } else if prev_row == row && prev_col + 1 == col {
                Direction::Right
            } else {
                Direction::None
            };
            if inherited != Direction::None
                && self.cells[self.index(prev_row, prev_col)].markers[channel] != Direction::None
            {
                self.set_marker(prev_row, prev_col, pheromone, inherited);
                self.set_marker(row, col, pheromone, inherited);
            }
        }
        self.field.set_suspended(false);
        self.field.rebuild_channel(channel);

        self.last_painted = Some((row, col, pheromone));
        true
    }

    /// Clear a marker at a world position without touching neighbors.
    /// Rebuilds the commodity's channel.
    pub fn clear_marker(&mut self, x: f32, y: f32, pheromone: Pheromone) -> bool {
        if pheromone.channel().is_none() {
            return false;
        }
        let Some((row, col)) = self.cell_at(x, y) else {
            return false;
        };
        self.set_marker(row, col, pheromone, Direction::None);
        true
    }

    fn set_marker(&mut self, row: usize, col: usize, pheromone: Pheromone, direction: Direction) {
        if let Some(channel) = pheromone.channel() {
            let idx = self.index(row, col);
            self.cells[idx].markers[channel] = direction;
            self.field.set_goal(row, col, channel, direction);
        }
    }

    /// Attempt the domain transition a commodity triggers on a cell. Returns
    /// whether anything changed; inapplicable combinations fail without
    /// mutation.
    pub fn try_change_material(&mut self, row: usize, col: usize, pheromone: Pheromone) -> bool {
        if row >= self.rows || col >= self.columns {
            return false;
        }
        let idx = self.index(row, col);
        match self.cells[idx].material {
            Material::Air => match pheromone {
                Pheromone::DropDirt
                    if self.cells[idx].marker(Pheromone::DropDirt) != Direction::None =>
                {
                    // waste piles stay passable
                    self.cells[idx].material = Material::WasteDirt;
                    self.set_marker(row, col, Pheromone::DropDirt, Direction::None);
                    true
                }
                Pheromone::DropFood
                    if self.cells[idx].marker(Pheromone::DropFood) != Direction::None =>
                {
                    self.cells[idx].material = Material::Food;
                    self.cells[idx].stock = 1;
                    true
                }
                Pheromone::DropEgg
                    if self.cells[idx].marker(Pheromone::DropEgg) != Direction::None =>
                {
                    // the cell stays air; the world hatches an egg ant here
                    self.spawn_requests.push(SpawnEgg {
                        x: col as f32 * self.cell_width - self.width / 2.0 + self.cell_width / 4.0,
                        y: row as f32 * self.cell_height - self.height / 2.0
                            + self.cell_height / 4.0,
                    });
                    self.set_marker(row, col, Pheromone::DropEgg, Direction::None);
                    true
                }
                Pheromone::MoveQueen => {
                    // the queen is laying
                    self.cells[idx].material = Material::Egg;
                    self.set_marker(row, col, Pheromone::MoveEgg, Direction::Up);
                    true
                }
                Pheromone::DropDeadAnt
                    if self.cells[idx].marker(Pheromone::DropDeadAnt) != Direction::None =>
                {
                    self.cells[idx].material = Material::DeadAnt;
                    self.cells[idx].stock = 1;
                    self.set_marker(row, col, Pheromone::DropDeadAnt, Direction::None);
                    true
                }
                Pheromone::DeadAnt => {
                    // an ant died here
                    self.cells[idx].material = Material::DeadAnt;
                    self.cells[idx].stock = 1;
                    true
                }
                _ => false,
            },
            Material::Dirt => {
                if pheromone == Pheromone::MoveDirt
                    && self.cells[idx].marker(Pheromone::MoveDirt) != Direction::None
                {
                    self.cells[idx].material = Material::Air;
                    // batch the marker clear with the traversability change,
                    // which rebuilds every channel anyway
                    self.field.set_suspended(true);
                    self.set_marker(row, col, Pheromone::MoveDirt, Direction::None);
                    self.field.set_suspended(false);
                    self.field.set_traversable(row, col, true);
                    true
                } else {
                    false
                }
            }
            Material::DeadAnt => match pheromone {
                Pheromone::MoveDeadAnt
                    if self.cells[idx].marker(Pheromone::MoveDeadAnt) != Direction::None =>
                {
                    self.cells[idx].material = Material::Air;
                    self.cells[idx].stock = 0;
                    self.set_marker(row, col, Pheromone::MoveDeadAnt, Direction::None);
                    true
                }
                Pheromone::DeadAnt => {
                    self.cells[idx].stock += 1;
                    true
                }
                _ => false,
            },
            Material::Food => {
                let pickup = (pheromone == Pheromone::MoveFood
                    && self.cells[idx].marker(Pheromone::MoveFood) != Direction::None)
                    || pheromone == Pheromone::MoveQueen;
                if pickup {
                    self.cells[idx].stock -= 1;
                    if self.cells[idx].stock <= 0 {
                        self.cells[idx].material = Material::Air;
                        self.set_marker(row, col, Pheromone::MoveFood, Direction::None);
                    }
                    true
                } else if pheromone == Pheromone::DropFood
                    && self.cells[idx].marker(Pheromone::DropFood) != Direction::None
                    && self.cells[idx].stock < self.food_full
                {
                    self.cells[idx].stock += 1;
                    true
                } else {
                    false
                }
            }
            Material::Egg => {
                if pheromone == Pheromone::MoveEgg
                    && self.cells[idx].marker(Pheromone::MoveEgg) != Direction::None
                {
                    self.cells[idx].material = Material::Air;
                    self.set_marker(row, col, Pheromone::MoveEgg, Direction::None);
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Attempt a transition on the cell under a displaced world position.
    pub fn try_change_material_at(
        &mut self,
        x: f32,
        y: f32,
        movement: Movement,
        pheromone: Pheromone,
    ) -> bool {
        let Some((row, col)) =
            self.cell_at(x + movement.dx * self.speed, y + movement.dy * self.speed)
        else {
            return false;
        };
        self.try_change_material(row, col, pheromone)
    }

    /// Candidate directions reducing distance to the nearest goal of a
    /// commodity from the cell under a world position. Empty when the
    /// commodity has no channel, the position is outside the terrain, or the
    /// field has no preference.
    #[must_use]
    pub fn best_directions(&self, x: f32, y: f32, pheromone: Pheromone) -> DirectionSet {
        let Some(channel) = pheromone.channel() else {
            return DirectionSet::empty();
        };
        let Some((row, col)) = self.cell_at(x, y) else {
            return DirectionSet::empty();
        };
        self.field.best_directions(row, col, channel)
    }

    /// Whether a footprint of the given size can occupy the displaced
    /// position: its center and corners must all land in bounds on
    /// non-blocking cells.
    #[must_use]
    pub fn can_move(&self, x: f32, y: f32, width: f32, height: f32, movement: Movement) -> bool {
        let x = x + movement.dx * self.speed;
        let y = y + movement.dy * self.speed;
        FOOTPRINT.iter().all(|&(fx, fy)| {
            self.cell_at(x + fx * width, y + fy * height)
                .is_some_and(|(row, col)| {
                    !self.cells[self.index(row, col)].material.is_blocking()
                })
        })
    }

    /// Drain pending spawn-egg requests raised by `DropEgg` transitions.
    pub fn take_spawn_requests(&mut self) -> Vec<SpawnEgg> {
        std::mem::take(&mut self.spawn_requests)
    }
}

/// Per-ant simulation state. Plain data; the decision process lives on
/// [`World`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ant {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub following: Pheromone,
    pub holding: bool,
    pub is_egg: bool,
    pub age: u32,
    pub food_counter: u32,
    /// Role timer in `[0, 1]`-ish: digestion for queens, hatching for eggs.
    pub timer: f32,
    pub health: f32,
    pub dead: bool,
    random_streak: u32,
    last_random: Movement,
    probe_order: [usize; 5],
    direction_order: [Direction; 5],
}

impl Ant {
    /// Construct an ant at a position. The footprint probe order and the
    /// direction preference order are shuffled per ant so tie-breaking varies
    /// between individuals but stays fixed for each one.
    pub fn new(
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        following: Pheromone,
        rng: &mut dyn RngCore,
    ) -> Self {
        let mut probe_order = [0, 1, 2, 3, 4];
        probe_order.shuffle(rng);
        let mut direction_order = [
            Direction::None,
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ];
        direction_order.shuffle(rng);
        Self {
            x,
            y,
            width,
            height,
            following,
            holding: false,
            is_egg: false,
            age: 0,
            food_counter: 0,
            timer: 0.0,
            health: 1.0,
            dead: false,
            random_streak: 0,
            last_random: Movement::default(),
            probe_order,
            direction_order,
        }
    }
}

/// Action requested by an ant for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AntAction {
    #[default]
    None,
    Move,
}

/// Outcome of one decision pass, applied by the host loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Decision {
    pub action: AntAction,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
    /// Heading in degrees, zero facing up, clockwise positive.
    pub angle: f32,
}

/// Placement of one starting ant supplied by the world generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntPlacement {
    pub x: f32,
    pub y: f32,
    pub following: Pheromone,
}

/// Monotonic tick counter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    /// Eggs spawned from `DropEgg` transitions this tick.
    pub births: usize,
    /// Eggs that finished hatching this tick.
    pub hatched: usize,
    /// Ants removed after dying this tick.
    pub deaths: usize,
}

/// Rolling census appended to world history each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub ant_count: usize,
    pub eggs: usize,
    pub carrying: usize,
    pub births: usize,
    pub deaths: usize,
}

/// Aggregate simulation state: terrain, routing field, and the ant arena.
pub struct World {
    config: ColonyConfig,
    tick: Tick,
    rng: SmallRng,
    grid: Grid,
    ants: SlotMap<AntId, Ant>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("ant_count", &self.ants.len())
            .finish()
    }
}

impl World {
    /// Instantiate a world from generator output: the starting cell array and
    /// initial ant placements.
    pub fn from_terrain(
        config: ColonyConfig,
        blocks: Vec<Vec<Cell>>,
        placements: &[AntPlacement],
    ) -> Result<Self, ColonyError> {
        let rng = config.seeded_rng();
        let grid = Grid::new(&config, blocks)?;
        let history_capacity = config.history_capacity;
        let mut world = Self {
            config,
            tick: Tick::zero(),
            rng,
            grid,
            ants: SlotMap::with_key(),
            history: VecDeque::with_capacity(history_capacity),
        };
        for placement in placements {
            world.spawn_adult(placement.x, placement.y, placement.following);
        }
        Ok(world)
    }

    /// Spawn a fully grown ant. Its age is randomized below adulthood so
    /// seeded populations do not reach old age in lockstep.
    pub fn spawn_adult(&mut self, x: f32, y: f32, following: Pheromone) -> AntId {
        let width = self.grid.cell_width() / 2.0;
        let height = self.grid.cell_height() / 2.0;
        let mut ant = Ant::new(x, y, width, height, following, &mut self.rng);
        ant.age = self.rng.random_range(0..self.config.adult_age);
        self.ants.insert(ant)
    }

    /// Spawn an unhatched egg. It chooses what to follow while incubating.
    pub fn spawn_egg(&mut self, x: f32, y: f32) -> AntId {
        let width = self.grid.cell_width() / 2.0;
        let height = self.grid.cell_height() / 2.0;
        let mut ant = Ant::new(x, y, width, height, Pheromone::None, &mut self.rng);
        ant.is_egg = true;
        self.ants.insert(ant)
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();

        let hatched = self.stage_lifecycle();
        self.stage_decisions();
        let births = self.stage_spawn_commit();
        let deaths = self.stage_death_cleanup();

        let events = TickEvents {
            tick: next_tick,
            births,
            hatched,
            deaths,
        };
        self.push_summary(&events);
        self.tick = next_tick;
        events
    }

    fn stage_lifecycle(&mut self) -> usize {
        let ids: Vec<AntId> = self.ants.keys().collect();
        let mut hatched = 0;
        for id in ids {
            if self.update_ant(id) {
                hatched += 1;
            }
        }
        hatched
    }

    fn stage_decisions(&mut self) {
        let ids: Vec<AntId> = self.ants.keys().collect();
        for id in ids {
            let decision = self.decide(id);
            self.apply_decision(id, decision);
        }
    }

    fn stage_spawn_commit(&mut self) -> usize {
        let requests = self.grid.take_spawn_requests();
        for request in &requests {
            self.spawn_egg(request.x, request.y);
        }
        requests.len()
    }

    fn stage_death_cleanup(&mut self) -> usize {
        let dead: Vec<AntId> = self
            .ants
            .iter()
            .filter(|(_, ant)| ant.dead)
            .map(|(id, _)| id)
            .collect();
        for id in &dead {
            self.ants.remove(*id);
        }
        dead.len()
    }

    fn push_summary(&mut self, events: &TickEvents) {
        let summary = TickSummary {
            tick: events.tick,
            ant_count: self.ants.len(),
            eggs: self.ants.values().filter(|ant| ant.is_egg).count(),
            carrying: self.ants.values().filter(|ant| ant.holding).count(),
            births: events.births,
            deaths: events.deaths,
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    /// Advance one ant's lifecycle: aging, queen digestion and laying, egg
    /// incubation, death. Returns whether the ant hatched this tick.
    fn update_ant(&mut self, id: AntId) -> bool {
        let Some(ant) = self.ants.get_mut(id) else {
            return false;
        };
        let mut hatched = false;

        if ant.age < self.config.max_age {
            ant.age += 1;
        }

        if ant.following == Pheromone::MoveQueen {
            // laying: requires a full belly, a finished digest cycle, and a
            // nest around the queen
            if ant.food_counter >= self.config.queen_full
                && ant.timer >= 1.0
                && in_nest(&self.grid, ant.x, ant.y)
                && let Some((row, col)) = self.grid.cell_at(ant.x, ant.y)
            {
                let laid = self.grid.try_change_material(row + 1, col, Pheromone::MoveQueen)
                    || (row > 0
                        && self
                            .grid
                            .try_change_material(row - 1, col, Pheromone::MoveQueen))
                    || self.grid.try_change_material(row, col + 1, Pheromone::MoveQueen)
                    || (col > 0
                        && self
                            .grid
                            .try_change_material(row, col - 1, Pheromone::MoveQueen));
                if laid {
                    ant.food_counter = 0;
                }
            }

            // eating and digesting
            if ant.food_counter == 0 {
                ant.timer = 1.1;
            }
            if ant.holding {
                ant.food_counter += 1;
                ant.holding = false;
                ant.timer = 0.0;
            }
            ant.timer += 1.0 / self.config.queen_digest_ticks as f32;
        }

        if ant.is_egg {
            ant.timer += 1.0 / self.config.egg_hatch_ticks as f32;

            // a fresh egg commits to a role once, drawn from fixed weights
            if ant.following == Pheromone::None {
                ant.following = match self.rng.random_range(0..10) {
                    0..=4 => Pheromone::MoveDirt,
                    5..=6 => Pheromone::MoveEgg,
                    7 => Pheromone::MoveQueen,
                    8 => Pheromone::MoveDeadAnt,
                    _ => Pheromone::MoveFood,
                };
            }

            // markers painted onto the egg's cell override the draw
            if let Some(cell) = self.grid.cell_details_at(ant.x, ant.y, Movement::default()) {
                let adopted = [
                    Pheromone::MoveDirt,
                    Pheromone::MoveEgg,
                    Pheromone::MoveFood,
                    Pheromone::MoveQueen,
                    Pheromone::MoveDeadAnt,
                ]
                .into_iter()
                .find(|&p| cell.marker(p) != Direction::None);
                if let Some(pheromone) = adopted {
                    ant.following = pheromone;
                    self.grid.clear_marker(ant.x, ant.y, pheromone);
                }
            }

            if ant.timer >= 1.0 {
                ant.is_egg = false;
                ant.timer = 0.0;
                ant.age = 0;
                hatched = true;
                // leave a marker so another egg can be laid here later
                self.grid.apply_marker(ant.x, ant.y, Pheromone::DropEgg);
            }
        }

        if ant.age >= self.config.max_age
            && let Some((row, col)) = self.grid.cell_at(ant.x, ant.y)
            && self.grid.try_change_material(row, col, Pheromone::DeadAnt)
        {
            ant.health = 0.0;
            ant.dead = true;
        }

        hatched
    }

    /// Run one decision pass for an ant: drop, pickup, then movement with a
    /// bounded retry ladder. The returned displacement is not yet applied;
    /// see [`World::apply_decision`].
    ///
    /// # Panics
    ///
    /// Panics if the ant follows a commodity ants cannot follow (`Drop*` or
    /// `DeadAnt`); that is a programming error, not an operational failure.
    pub fn decide(&mut self, id: AntId) -> Decision {
        let Some(ant) = self.ants.get_mut(id) else {
            return Decision::default();
        };
        if ant.dead {
            return Decision::default();
        }

        let seeking = match ant.following {
            Pheromone::MoveDirt => Some(Material::Dirt),
            Pheromone::MoveFood => Some(Material::Food),
            Pheromone::MoveEgg => Some(Material::Egg),
            Pheromone::MoveDeadAnt => Some(Material::DeadAnt),
            // a queen seeks food only between digest cycles
            Pheromone::MoveQueen
                if ant.timer >= 1.0 && ant.food_counter < self.config.queen_full =>
            {
                Some(Material::Food)
            }
            Pheromone::MoveQueen | Pheromone::None => None,
            other => panic!("ants cannot follow {other:?}"),
        };
        let drop_pheromone = ant.following.drop_counterpart();

        // drop what we carry when the current cell accepts it
        if ant.holding
            && self
                .grid
                .try_change_material_at(ant.x, ant.y, Movement::default(), drop_pheromone)
        {
            ant.holding = false;
        }

        let mut movement = Movement::default();
        let mut heading = Direction::None;

        // head for the nearest source, picking up anything we walk onto
        if !ant.holding {
            let candidates = self.grid.best_directions(ant.x, ant.y, ant.following);
            (movement, heading) = convert_directions(
                ant,
                &mut self.rng,
                candidates,
                self.config.random_streak_ticks,
            );
            if let Some(seeking) = seeking
                && let Some((px, py)) = find_block(&self.grid, ant, movement, seeking)
                && self.grid.try_change_material_at(px, py, movement, ant.following)
            {
                ant.holding = true;
            }
        }

        // carrying: retarget toward the drop trail instead
        if ant.holding {
            let candidates = self.grid.best_directions(ant.x, ant.y, drop_pheromone);
            (movement, heading) = convert_directions(
                ant,
                &mut self.rng,
                candidates,
                self.config.random_streak_ticks,
            );
        }

        // eggs do not move
        if ant.is_egg {
            return Decision::default();
        }

        let max_tries = self.config.max_move_tries;
        for attempt in 0..max_tries {
            if self.grid.can_move(ant.x, ant.y, ant.width, ant.height, movement) {
                return Decision {
                    action: AntAction::Move,
                    dx: movement.dx,
                    dy: movement.dy,
                    dz: 0.0,
                    angle: heading_angle(movement),
                };
            }
            // first rejection: slide sideways around whatever blocked us;
            // afterwards fall back to fresh random headings
            if attempt == 0
                && heading != Direction::None
                && let Some(slide) = maneuver_around(&self.grid, ant, heading)
            {
                movement = slide;
            } else {
                ant.random_streak = 0;
                movement = random_movement(ant, &mut self.rng, self.config.random_streak_ticks);
            }
        }

        debug!(tries = max_tries, "ant failed to move");
        Decision::default()
    }

    /// Apply a previously returned decision, displacing the ant by the grid
    /// speed. The embedded tick pipeline calls this itself; external hosts
    /// drive it after their own collision handling.
    pub fn apply_decision(&mut self, id: AntId, decision: Decision) {
        if decision.action != AntAction::Move {
            return;
        }
        let speed = self.grid.speed();
        if let Some(ant) = self.ants.get_mut(id) {
            ant.x += decision.dx * speed;
            ant.y += decision.dy * speed;
        }
    }

    /// Host-loop acknowledgement of an applied action. Diagnostic only: the
    /// outcome never alters subsequent decisions.
    pub fn feedback(&self, id: AntId, action: AntAction, succeeded: bool) {
        if action == AntAction::Move && !succeeded {
            debug!(?id, "host rejected move");
        }
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &ColonyConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Immutable access to the terrain grid.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Mutable access to the terrain grid (marker painting goes here).
    #[must_use]
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    /// Read-only access to the ant arena.
    #[must_use]
    pub fn ants(&self) -> &SlotMap<AntId, Ant> {
        &self.ants
    }

    /// Mutable access to the ant arena.
    #[must_use]
    pub fn ants_mut(&mut self) -> &mut SlotMap<AntId, Ant> {
        &mut self.ants
    }

    /// Borrow a single ant.
    #[must_use]
    pub fn ant(&self, id: AntId) -> Option<&Ant> {
        self.ants.get(id)
    }

    /// Number of live ants, eggs included.
    #[must_use]
    pub fn ant_count(&self) -> usize {
        self.ants.len()
    }

    /// Borrow the world RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

/// Convert a candidate-direction set into a concrete movement, honoring the
/// ant's shuffled preference order. A lone direction yields a straight move
/// with perpendicular skitter; two perpendicular candidates may blend into a
/// diagonal on a coin flip. An empty set falls back to the persistent random
/// walk. Returns the movement and the direction it commits to.
fn convert_directions(
    ant: &mut Ant,
    rng: &mut SmallRng,
    candidates: DirectionSet,
    streak_ticks: u32,
) -> (Movement, Direction) {
    for i in 0..ant.direction_order.len() {
        let first = ant.direction_order[i];
        if !candidates.contains(first) {
            continue;
        }
        if rng.random::<bool>() {
            for j in i + 1..ant.direction_order.len() {
                let second = ant.direction_order[j];
                if candidates.contains(second) && is_perpendicular(first, second) {
                    return (diagonal_movement(first, second, rng), second);
                }
            }
        }
        return (direction_movement(first, rng), first);
    }
    (random_movement(ant, rng, streak_ticks), Direction::None)
}

/// True only for one vertical and one horizontal direction.
const fn is_perpendicular(a: Direction, b: Direction) -> bool {
    (a.is_vertical() && b.is_horizontal()) || (a.is_horizontal() && b.is_vertical())
}

/// Unit move along one axis with a small random perpendicular skitter. The
/// major axis shrinks by the skitter magnitude so `|dx| + |dy|` stays within
/// the unit budget.
fn direction_movement(direction: Direction, rng: &mut SmallRng) -> Movement {
    let skitter = rng.random_range(-0.2..0.2_f32);
    let mut movement = Movement::default();
    match direction {
        Direction::Up => {
            movement.dx = skitter;
            movement.dy = -1.0 + skitter.abs();
        }
        Direction::Down => {
            movement.dx = skitter;
            movement.dy = 1.0 - skitter.abs();
        }
        Direction::Left => {
            movement.dy = skitter;
            movement.dx = -1.0 + skitter.abs();
        }
        Direction::Right => {
            movement.dy = skitter;
            movement.dx = 1.0 - skitter.abs();
        }
        Direction::None => {}
    }
    debug_assert!(movement.dx.abs() + movement.dy.abs() <= 1.0 + f32::EPSILON);
    movement
}

/// Blend two perpendicular directions into a diagonal, biasing the two
/// half-axes in opposite senses by a fresh skitter.
fn diagonal_movement(first: Direction, second: Direction, rng: &mut SmallRng) -> Movement {
    let skitter = rng.random_range(0.0..0.25_f32);
    let mut movement = Movement::default();
    match first {
        Direction::Up => movement.dy = -0.5 + skitter,
        Direction::Down => movement.dy = 0.5 - skitter,
        Direction::Left => movement.dx = -0.5 + skitter,
        Direction::Right => movement.dx = 0.5 - skitter,
        Direction::None => {}
    }
    match second {
        Direction::Up => movement.dy = -0.5 - skitter,
        Direction::Down => movement.dy = 0.5 + skitter,
        Direction::Left => movement.dx = -0.5 - skitter,
        Direction::Right => movement.dx = 0.5 + skitter,
        Direction::None => {}
    }
    debug_assert!(movement.dx.abs() + movement.dy.abs() <= 1.0 + f32::EPSILON);
    movement
}

/// Unguided wander. A drawn heading persists for `streak_ticks` calls before
/// a new one is rolled, producing smooth meandering rather than jitter.
fn random_movement(ant: &mut Ant, rng: &mut SmallRng, streak_ticks: u32) -> Movement {
    if ant.random_streak > 0 {
        ant.random_streak -= 1;
        return ant.last_random;
    }
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    // magnitude 0.7 keeps |dx| + |dy| within the unit budget at any angle
    let movement = Movement {
        dx: angle.cos() * 0.7,
        dy: angle.sin() * 0.7,
    };
    ant.random_streak = streak_ticks;
    ant.last_random = movement;
    movement
}

/// Search the ant's displaced footprint probes for a cell of the sought
/// material still carrying a live marker for what the ant follows. Returns
/// the undisplaced probe position to hand back to the grid.
fn find_block(grid: &Grid, ant: &Ant, movement: Movement, seeking: Material) -> Option<(f32, f32)> {
    for &probe in &ant.probe_order {
        let (fx, fy) = FOOTPRINT[probe];
        let px = ant.x + fx * ant.width;
        let py = ant.y + fy * ant.height;
        if let Some(cell) = grid.cell_details_at(px, py, movement)
            && cell.material == seeking
            && cell.marker(ant.following) != Direction::None
        {
            return Some((px, py));
        }
    }
    None
}

/// Work out which way to slide around an obstacle that rejected a move: of
/// the two cells flanking the intended destination, pick the lateral step
/// matching the side of the cell boundary the ant still occupies.
fn maneuver_around(grid: &Grid, ant: &Ant, heading: Direction) -> Option<Movement> {
    let (src_row, src_col) = grid.cell_at(ant.x, ant.y)?;
    let (corners, laterals) = if heading.is_vertical() {
        ([(-0.5, 0.0), (0.5, 0.0)], [Direction::Left, Direction::Right])
    } else {
        ([(0.0, -0.5), (0.0, 0.5)], [Direction::Up, Direction::Down])
    };
    for (&(cx, cy), &lateral) in corners.iter().zip(laterals.iter()) {
        let corner = grid.cell_at(ant.x + ant.width * cx, ant.y + ant.height * cy);
        if corner == Some((src_row, src_col)) {
            // this side still overlaps our own cell; step that way
            return Some(Movement {
                dx: match lateral {
                    Direction::Left => -1.0,
                    Direction::Right => 1.0,
                    _ => 0.0,
                },
                dy: match lateral {
                    Direction::Up => -1.0,
                    Direction::Down => 1.0,
                    _ => 0.0,
                },
            });
        }
    }
    None
}

/// Queen-only location predicate: standing on a `MoveQueen` trail whose
/// neighbors all point inward (or carry no marker), with dirt somewhere
/// directly above in the same column.
fn in_nest(grid: &Grid, x: f32, y: f32) -> bool {
    let Some((row, col)) = grid.cell_at(x, y) else {
        return false;
    };
    let Some(cell) = grid.cell_details(row, col) else {
        return false;
    };
    if cell.marker(Pheromone::MoveQueen) == Direction::None {
        return false;
    }

    for direction in Direction::CARDINAL {
        let neighbor = match direction {
            Direction::Up if row > 0 => (row - 1, col),
            Direction::Down => (row + 1, col),
            Direction::Left if col > 0 => (row, col - 1),
            Direction::Right => (row, col + 1),
            _ => continue,
        };
        if !nest_edge(grid, neighbor.0, neighbor.1, direction.opposite()) {
            return false;
        }
    }

    // underground check: scan up the column for a dirt ceiling
    (0..=row).any(|r| {
        grid.cell_details(r, col)
            .is_some_and(|c| c.material == Material::Dirt)
    })
}

/// A neighbor is a viable nest edge when it lacks a `MoveQueen` marker or
/// points back at the nest cell. Out-of-bounds neighbors count as viable.
fn nest_edge(grid: &Grid, row: usize, col: usize, inward: Direction) -> bool {
    match grid.cell_details(row, col) {
        Some(cell) => {
            let marker = cell.marker(Pheromone::MoveQueen);
            marker == Direction::None || marker == inward
        }
        None => true,
    }
}

/// Heading of a movement in degrees, zero facing up, clockwise positive.
fn heading_angle(movement: Movement) -> f32 {
    if movement.is_zero() {
        return 0.0;
    }
    movement.dx.atan2(-movement.dy).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn air_terrain(rows: usize, columns: usize) -> Vec<Vec<Cell>> {
        vec![vec![Cell::of(Material::Air); columns]; rows]
    }

    fn test_config() -> ColonyConfig {
        ColonyConfig {
            world_width: 300.0,
            world_height: 300.0,
            rng_seed: Some(7),
            ..ColonyConfig::default()
        }
    }

    fn test_grid(blocks: Vec<Vec<Cell>>) -> Grid {
        Grid::new(&test_config(), blocks).expect("grid")
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let mut config = ColonyConfig {
            world_width: 0.0,
            ..ColonyConfig::default()
        };
        assert!(Grid::new(&config, air_terrain(3, 3)).is_err());
        config.world_width = 100.0;
        config.food_full = 0;
        assert!(World::from_terrain(config, air_terrain(3, 3), &[]).is_err());
    }

    #[test]
    fn terrain_must_be_rectangular() {
        let mut blocks = air_terrain(3, 3);
        blocks[1].pop();
        assert!(Grid::new(&test_config(), blocks).is_err());
        assert!(Grid::new(&test_config(), Vec::new()).is_err());
    }

    #[test]
    fn cell_mapping_is_centered_and_bounded() {
        let grid = test_grid(air_terrain(3, 3));
        // 300x300 world, 100-unit cells, origin at the center
        assert_eq!(grid.cell_at(0.0, 0.0), Some((1, 1)));
        assert_eq!(grid.cell_at(-150.0, -150.0), Some((0, 0)));
        assert_eq!(grid.cell_at(149.0, 149.0), Some((2, 2)));
        assert_eq!(grid.cell_at(-151.0, 0.0), None);
        assert_eq!(grid.cell_at(0.0, 151.0), None);
        let (cx, cy) = grid.cell_center(0, 2);
        assert_eq!(grid.cell_at(cx, cy), Some((0, 2)));
    }

    #[test]
    fn digging_dirt_requires_its_marker() {
        let mut blocks = air_terrain(3, 3);
        blocks[1][1] = Cell::of(Material::Dirt);
        let mut grid = test_grid(blocks);

        // no marker: the transition must fail without mutation
        assert!(!grid.try_change_material(1, 1, Pheromone::MoveDirt));
        assert_eq!(grid.cell_details(1, 1).unwrap().material, Material::Dirt);
        assert!(!grid.field().is_traversable(1, 1));

        let (x, y) = grid.cell_center(1, 1);
        assert!(grid.apply_marker(x, y, Pheromone::MoveDirt));
        assert!(grid.try_change_material(1, 1, Pheromone::MoveDirt));
        let cell = grid.cell_details(1, 1).unwrap();
        assert_eq!(cell.material, Material::Air);
        assert_eq!(cell.marker(Pheromone::MoveDirt), Direction::None);
        assert!(grid.field().is_traversable(1, 1));
    }

    #[test]
    fn dropping_dirt_leaves_passable_waste() {
        let mut grid = test_grid(air_terrain(3, 3));
        let (x, y) = grid.cell_center(0, 0);
        assert!(grid.apply_marker(x, y, Pheromone::DropDirt));
        assert!(grid.try_change_material(0, 0, Pheromone::DropDirt));
        let cell = grid.cell_details(0, 0).unwrap();
        assert_eq!(cell.material, Material::WasteDirt);
        assert_eq!(cell.marker(Pheromone::DropDirt), Direction::None);
        assert!(grid.field().is_traversable(0, 0));
        assert!(!cell.material.is_blocking());
    }

    #[test]
    fn food_stock_counts_portions() {
        let mut grid = test_grid(air_terrain(3, 3));
        let (x, y) = grid.cell_center(2, 2);
        grid.apply_marker(x, y, Pheromone::DropFood);

        // first drop materializes food, further drops top it up
        assert!(grid.try_change_material(2, 2, Pheromone::DropFood));
        assert_eq!(grid.cell_details(2, 2).unwrap().material, Material::Food);
        assert_eq!(grid.cell_details(2, 2).unwrap().stock, 1);
        for expected in 2..=4 {
            assert!(grid.try_change_material(2, 2, Pheromone::DropFood));
            assert_eq!(grid.cell_details(2, 2).unwrap().stock, expected);
        }
        // full cell rejects more
        assert!(!grid.try_change_material(2, 2, Pheromone::DropFood));

        // picking up without the move marker fails
        assert!(!grid.try_change_material(2, 2, Pheromone::MoveFood));
        grid.apply_marker(x, y, Pheromone::MoveFood);
        for expected in (1..=3).rev() {
            assert!(grid.try_change_material(2, 2, Pheromone::MoveFood));
            assert_eq!(grid.cell_details(2, 2).unwrap().stock, expected);
            assert_eq!(grid.cell_details(2, 2).unwrap().material, Material::Food);
        }
        // the last portion clears the cell and its marker
        assert!(grid.try_change_material(2, 2, Pheromone::MoveFood));
        let cell = grid.cell_details(2, 2).unwrap();
        assert_eq!(cell.material, Material::Air);
        assert_eq!(cell.marker(Pheromone::MoveFood), Direction::None);
    }

    #[test]
    fn queen_trigger_eats_food_without_marker() {
        let mut blocks = air_terrain(3, 3);
        blocks[1][1] = Cell {
            material: Material::Food,
            stock: 1,
            ..Cell::default()
        };
        let mut grid = test_grid(blocks);
        assert!(grid.try_change_material(1, 1, Pheromone::MoveQueen));
        assert_eq!(grid.cell_details(1, 1).unwrap().material, Material::Air);
    }

    #[test]
    fn queen_lays_egg_on_air() {
        let mut grid = test_grid(air_terrain(3, 3));
        assert!(grid.try_change_material(0, 1, Pheromone::MoveQueen));
        let cell = grid.cell_details(0, 1).unwrap();
        assert_eq!(cell.material, Material::Egg);
        // the fresh egg is marked so egg-carriers can find it
        assert_eq!(cell.marker(Pheromone::MoveEgg), Direction::Up);

        // and an egg-carrier can then pick it up
        assert!(grid.try_change_material(0, 1, Pheromone::MoveEgg));
        let cell = grid.cell_details(0, 1).unwrap();
        assert_eq!(cell.material, Material::Air);
        assert_eq!(cell.marker(Pheromone::MoveEgg), Direction::None);
    }

    #[test]
    fn drop_egg_raises_a_spawn_request() {
        let mut grid = test_grid(air_terrain(3, 3));
        let (x, y) = grid.cell_center(1, 2);
        grid.apply_marker(x, y, Pheromone::DropEgg);
        assert!(grid.try_change_material(1, 2, Pheromone::DropEgg));

        // cell stays air, marker consumed, one request queued inside the cell
        let cell = grid.cell_details(1, 2).unwrap();
        assert_eq!(cell.material, Material::Air);
        assert_eq!(cell.marker(Pheromone::DropEgg), Direction::None);
        let requests = grid.take_spawn_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(grid.cell_at(requests[0].x, requests[0].y), Some((1, 2)));
        assert!(grid.take_spawn_requests().is_empty());
    }

    #[test]
    fn corpses_pile_up_and_get_carried_away() {
        let mut grid = test_grid(air_terrain(3, 3));
        assert!(grid.try_change_material(2, 0, Pheromone::DeadAnt));
        assert_eq!(grid.cell_details(2, 0).unwrap().material, Material::DeadAnt);
        assert_eq!(grid.cell_details(2, 0).unwrap().stock, 1);
        assert!(grid.try_change_material(2, 0, Pheromone::DeadAnt));
        assert_eq!(grid.cell_details(2, 0).unwrap().stock, 2);

        assert!(!grid.try_change_material(2, 0, Pheromone::MoveDeadAnt));
        let (x, y) = grid.cell_center(2, 0);
        grid.apply_marker(x, y, Pheromone::MoveDeadAnt);
        assert!(grid.try_change_material(2, 0, Pheromone::MoveDeadAnt));
        let cell = grid.cell_details(2, 0).unwrap();
        assert_eq!(cell.material, Material::Air);
        assert_eq!(cell.stock, 0);
    }

    #[test]
    fn inapplicable_transitions_leave_cells_untouched() {
        let mut blocks = air_terrain(2, 2);
        blocks[0][0] = Cell::of(Material::WasteDirt);
        let mut grid = test_grid(blocks);
        let before = grid.cell_details(0, 0).unwrap();
        for pheromone in [
            Pheromone::MoveDirt,
            Pheromone::DropDirt,
            Pheromone::MoveFood,
            Pheromone::DeadAnt,
        ] {
            assert!(!grid.try_change_material(0, 0, pheromone));
        }
        assert_eq!(grid.cell_details(0, 0).unwrap(), before);
        // out of bounds is an expected failure, not a panic
        assert!(!grid.try_change_material(9, 9, Pheromone::MoveDirt));
    }

    #[test]
    fn repeat_paints_on_a_cell_are_idempotent() {
        let mut grid = test_grid(air_terrain(3, 3));
        let (x, y) = grid.cell_center(1, 1);
        assert!(grid.apply_marker(x, y, Pheromone::MoveDirt));
        assert!(!grid.apply_marker(x + 1.0, y - 1.0, Pheromone::MoveDirt));
        // a different commodity on the same cell still paints
        assert!(grid.apply_marker(x, y, Pheromone::MoveFood));
    }

    #[test]
    fn painting_down_a_column_builds_a_trail() {
        let mut grid = test_grid(air_terrain(3, 3));
        for row in 0..3 {
            let (x, y) = grid.cell_center(row, 0);
            assert!(grid.apply_marker(x, y, Pheromone::MoveFood));
        }
        // the Up seed of the first cell is rewritten as the stroke continues
        for row in 0..3 {
            assert_eq!(
                grid.cell_details(row, 0).unwrap().marker(Pheromone::MoveFood),
                Direction::Down,
                "row {row}"
            );
        }
    }

    #[test]
    fn painting_rightward_builds_a_right_trail() {
        let mut grid = test_grid(air_terrain(3, 3));
        for col in 0..3 {
            let (x, y) = grid.cell_center(1, col);
            grid.apply_marker(x, y, Pheromone::MoveDirt);
        }
        for col in 0..3 {
            assert_eq!(
                grid.cell_details(1, col).unwrap().marker(Pheromone::MoveDirt),
                Direction::Right
            );
        }
    }

    #[test]
    fn marker_round_trip_restores_the_field() {
        let mut grid = test_grid(air_terrain(4, 4));
        let channel = Pheromone::MoveEgg.channel().unwrap();
        let (x, y) = grid.cell_center(2, 3);
        grid.apply_marker(x, y, Pheromone::MoveEgg);
        assert_eq!(grid.field().distance(2, 3, channel), 0);

        grid.clear_marker(x, y, Pheromone::MoveEgg);
        assert_eq!(
            grid.cell_details(2, 3).unwrap().marker(Pheromone::MoveEgg),
            Direction::None
        );
        for row in 0..4 {
            for col in 0..4 {
                assert_eq!(grid.field().distance(row, col, channel), UNREACHED);
            }
        }
    }

    #[test]
    fn footprints_cannot_enter_dirt() {
        let mut blocks = air_terrain(3, 3);
        blocks[1][2] = Cell::of(Material::Dirt);
        let mut grid = test_grid(blocks);
        let (x, y) = grid.cell_center(1, 1);
        let right = Movement { dx: 40.0, dy: 0.0 };
        // a corner of the 50x50 footprint would cross into the dirt cell
        assert!(!grid.can_move(x, y, 50.0, 50.0, right));
        assert!(grid.can_move(x, y, 50.0, 50.0, Movement { dx: -10.0, dy: 0.0 }));
        // leaving the terrain is rejected too
        let (edge_x, edge_y) = grid.cell_center(0, 0);
        assert!(!grid.can_move(
            edge_x,
            edge_y,
            50.0,
            50.0,
            Movement { dx: -80.0, dy: 0.0 }
        ));
        // a slower grid shrinks the attempted displacement below the boundary
        grid.set_speed(0.25);
        assert!(grid.can_move(x, y, 50.0, 50.0, right));
    }

    #[test]
    fn best_directions_requires_a_channel() {
        let grid = test_grid(air_terrain(3, 3));
        assert!(grid.best_directions(0.0, 0.0, Pheromone::None).is_empty());
        assert!(grid.best_directions(0.0, 0.0, Pheromone::DeadAnt).is_empty());
        assert!(grid.best_directions(9_999.0, 0.0, Pheromone::MoveDirt).is_empty());
    }

    #[test]
    fn movement_helpers_respect_the_unit_budget() {
        let mut rng = SmallRng::seed_from_u64(11);
        for direction in Direction::CARDINAL {
            for _ in 0..32 {
                let m = direction_movement(direction, &mut rng);
                assert!(m.dx.abs() + m.dy.abs() <= 1.0 + f32::EPSILON);
            }
        }
        for _ in 0..32 {
            let m = diagonal_movement(Direction::Up, Direction::Right, &mut rng);
            assert!(m.dx.abs() + m.dy.abs() <= 1.0 + f32::EPSILON);
            assert!(m.dy < 0.0 && m.dx > 0.0);
        }
    }

    #[test]
    fn random_walk_persists_for_a_streak() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut ant = Ant::new(0.0, 0.0, 10.0, 10.0, Pheromone::MoveDirt, &mut rng);
        let first = random_movement(&mut ant, &mut rng, 4);
        for _ in 0..4 {
            assert_eq!(random_movement(&mut ant, &mut rng, 4), first);
        }
        // streak exhausted: a new heading is drawn and kept again
        let second = random_movement(&mut ant, &mut rng, 4);
        assert_ne!(second, first);
        assert_eq!(random_movement(&mut ant, &mut rng, 4), second);
    }

    #[test]
    fn perpendicular_test_rejects_parallel_pairs() {
        assert!(is_perpendicular(Direction::Up, Direction::Left));
        assert!(is_perpendicular(Direction::Right, Direction::Down));
        assert!(!is_perpendicular(Direction::Up, Direction::Down));
        assert!(!is_perpendicular(Direction::Left, Direction::Right));
        assert!(!is_perpendicular(Direction::Up, Direction::None));
    }
}
