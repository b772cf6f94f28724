// All tunable constants in one place.

// Arena
pub const ARENA_WIDTH: f32 = 1200.0;
pub const ARENA_HEIGHT: f32 = 600.0;
/// Ground surface, in screen coordinates (y grows downward).
pub const GROUND_Y: f32 = ARENA_HEIGHT - 20.0;
pub const GRAVITY: f32 = 980.0;

// Simulation
pub const FIXED_DT: f32 = 1.0 / 60.0;
pub const EPISODE_TICKS: u32 = 600;
pub const CONSTRAINT_ITERATIONS: usize = 8;

// Controller
pub const BRAIN_INPUTS: usize = 10;
pub const BRAIN_HIDDEN: usize = 25;
pub const BRAIN_OUTPUTS: usize = 2;
pub const BRAIN_FORMAT_VERSION: u32 = 1;

// Mutation
pub const MUTATION_RATE: f32 = 0.1;
pub const MUTATION_SIGMA: f32 = 0.5;

// Muscles
pub const MUSCLE_STEP: f32 = 2.0;
pub const MUSCLE_MIN_LENGTH: f32 = 25.0;
pub const MUSCLE_MAX_LENGTH: f32 = 70.0;
/// Divisor applied to muscle lengths before they reach the controller.
pub const MUSCLE_NORMALIZER: f32 = 70.0;
pub const MOTOR_THRESHOLD: f32 = 0.5;

// Fitness
pub const BALANCE_ANGLE: f32 = 0.2;
pub const BALANCED_WEIGHT: f64 = 2.0;
pub const UNBALANCED_WEIGHT: f64 = 0.5;

// Runner body materials
pub const BODY_FRICTION: f32 = 1.0;
pub const BODY_RESTITUTION: f32 = 0.1;
pub const BODY_DENSITY: f32 = 0.05;
pub const GROUND_CATEGORY: u32 = 0x0001;
pub const BODY_CATEGORY: u32 = 0x0002;
pub const RIGHT_LEG_CATEGORY: u32 = 0x0004;
pub const LEFT_LEG_CATEGORY: u32 = 0x0006;
/// Negative group: parts of one runner never collide with each other.
pub const RUNNER_GROUP: i32 = -1;
/// Anchors sit this fraction of the half-length away from a part's center.
pub const ANCHOR_INSET: f32 = 0.8;

// Population
pub const POPULATION_SIZE: usize = 20;
pub const STATS_CAPACITY: usize = 500;

// Driver
pub const AUTOSAVE_INTERVAL_GENERATIONS: u32 = 10;
pub const DRIVER_GENERATIONS: u32 = 200;
pub const DRIVER_SEED: u64 = 42;
