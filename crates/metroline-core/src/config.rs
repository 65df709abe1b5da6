//! Configuration loading and typed config structures for the Metroline simulation.
//!
//! The canonical configuration lives in `metroline-config.yaml` next to the
//! binary. Every section and field is optional; anything missing falls back
//! to the defaults defined at the bottom of this module.
//!
//! The `METROLINE_SEED` environment variable overrides `world.seed`.

use std::path::Path;

use serde::Deserialize;

use metroline_ledger::ResourcePool;
use metroline_routing::{RouterParams, RoutingParams};
use metroline_types::{GameMode, ResourceKind};
use metroline_world::RiverBand;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but makes no sense.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `metroline-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Map, seed, and game mode.
    #[serde(default)]
    pub world: WorldConfig,

    /// Tick clamping and calendar.
    #[serde(default)]
    pub time: TimeConfig,

    /// Route evaluation and router timing.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Station capacity, overload timer, and station spawning.
    #[serde(default)]
    pub stations: StationConfig,

    /// Passenger spawning.
    #[serde(default)]
    pub passengers: PassengerConfig,

    /// Train capacity and speed.
    #[serde(default)]
    pub trains: TrainConfig,

    /// Starting resource totals.
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Audit cadence.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Undo/redo depth.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Background snapshot writer.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Headless driver loop.
    #[serde(default)]
    pub headless: HeadlessConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.world.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("time.seconds_per_day", self.time.seconds_per_day),
            ("stations.overload_growth_secs", self.stations.overload_growth_secs),
            ("stations.overload_decay_secs", self.stations.overload_decay_secs),
            ("stations.spawn_interval_secs", self.stations.spawn_interval_secs),
            ("passengers.spawn_interval_secs", self.passengers.spawn_interval_secs),
            ("trains.speed", self.trains.speed),
            ("audit.validator_interval_secs", self.audit.validator_interval_secs),
            ("audit.stranding_interval_secs", self.audit.stranding_interval_secs),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    reason: format!("{field} must be a positive number, got {value}"),
                });
            }
        }
        if self.time.days_per_week == 0 {
            return Err(ConfigError::Invalid {
                reason: "time.days_per_week must be at least 1".to_owned(),
            });
        }
        if self.stations.capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "stations.capacity must be at least 1".to_owned(),
            });
        }
        let bounds = [self.world.width, self.world.height];
        if bounds.iter().any(|b| !(b.is_finite() && *b > 0.0)) {
            return Err(ConfigError::Invalid {
                reason: "world bounds must be positive".to_owned(),
            });
        }
        Ok(())
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable city name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Random seed for spawning and reward draws.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Game mode.
    #[serde(default)]
    pub mode: GameMode,

    /// Map width in world units.
    #[serde(default = "default_width")]
    pub width: f64,

    /// Map height in world units.
    #[serde(default = "default_height")]
    pub height: f64,

    /// Vertical river bands on the map.
    #[serde(default)]
    pub rivers: Vec<RiverBand>,
}

impl WorldConfig {
    /// Apply `METROLINE_SEED` if it is set and parses as an integer.
    pub fn apply_env_overrides(&mut self) {
        if let Some(seed) = std::env::var("METROLINE_SEED")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            self.seed = seed;
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            seed: default_seed(),
            mode: GameMode::default(),
            width: default_width(),
            height: default_height(),
            rivers: Vec::new(),
        }
    }
}

/// Time configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeConfig {
    /// Longest real-time delta a single tick may consume, in milliseconds.
    #[serde(default = "default_max_tick_delta_ms")]
    pub max_tick_delta_ms: u64,

    /// Simulated seconds per game day.
    #[serde(default = "default_seconds_per_day")]
    pub seconds_per_day: f64,

    /// Days per week. A reward is offered at every week boundary.
    #[serde(default = "default_days_per_week")]
    pub days_per_week: u32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            max_tick_delta_ms: default_max_tick_delta_ms(),
            seconds_per_day: default_seconds_per_day(),
            days_per_week: default_days_per_week(),
        }
    }
}

/// Routing configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoutingConfig {
    /// Maximum line changes a reachability search may take.
    #[serde(default = "default_max_transfer_depth")]
    pub max_transfer_depth: u32,

    /// Cost per station index on a direct route.
    #[serde(default = "default_direct_route_weight")]
    pub direct_route_weight: f64,

    /// Flat cost of one transfer.
    #[serde(default = "default_transfer_penalty")]
    pub transfer_penalty: f64,

    /// Seconds a passenger holds out for a better line.
    #[serde(default = "default_preference_wait_secs")]
    pub preference_wait_secs: f64,

    /// Seconds before an unroutable passenger is evicted.
    #[serde(default = "default_stranded_timeout_secs")]
    pub stranded_timeout_secs: f64,
}

impl RoutingConfig {
    /// Parameters for the route evaluator.
    pub const fn evaluator_params(&self) -> RoutingParams {
        RoutingParams {
            max_transfer_depth: self.max_transfer_depth,
            direct_route_weight: self.direct_route_weight,
            transfer_penalty: self.transfer_penalty,
        }
    }

    /// Parameters for the router.
    pub const fn router_params(&self) -> RouterParams {
        RouterParams {
            preference_wait_secs: self.preference_wait_secs,
            stranded_timeout_secs: self.stranded_timeout_secs,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            max_transfer_depth: default_max_transfer_depth(),
            direct_route_weight: default_direct_route_weight(),
            transfer_penalty: default_transfer_penalty(),
            preference_wait_secs: default_preference_wait_secs(),
            stranded_timeout_secs: default_stranded_timeout_secs(),
        }
    }
}

/// Station configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationConfig {
    /// Queue length at which a station is full.
    #[serde(default = "default_station_capacity")]
    pub capacity: u32,

    /// Seconds of sustained crowding for the overload timer to go 0 to 1.
    #[serde(default = "default_overload_growth_secs")]
    pub overload_growth_secs: f64,

    /// Seconds for a full overload timer to drain once crowding ends.
    #[serde(default = "default_overload_decay_secs")]
    pub overload_decay_secs: f64,

    /// Base interval between new stations, divided by the difficulty level.
    #[serde(default = "default_station_spawn_interval_secs")]
    pub spawn_interval_secs: f64,

    /// Hard cap on stations on the map.
    #[serde(default = "default_max_stations")]
    pub max_stations: u32,

    /// Minimum distance between a new station and any existing one.
    #[serde(default = "default_min_spacing")]
    pub min_spacing: f64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            capacity: default_station_capacity(),
            overload_growth_secs: default_overload_growth_secs(),
            overload_decay_secs: default_overload_decay_secs(),
            spawn_interval_secs: default_station_spawn_interval_secs(),
            max_stations: default_max_stations(),
            min_spacing: default_min_spacing(),
        }
    }
}

/// Passenger configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PassengerConfig {
    /// Base interval between passengers, divided by the difficulty level.
    #[serde(default = "default_passenger_spawn_interval_secs")]
    pub spawn_interval_secs: f64,
}

impl Default for PassengerConfig {
    fn default() -> Self {
        Self {
            spawn_interval_secs: default_passenger_spawn_interval_secs(),
        }
    }
}

/// Train configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainConfig {
    /// Seats on a train with no wagons. Each wagon adds the same again.
    #[serde(default = "default_train_base_capacity")]
    pub base_capacity: u32,

    /// World units travelled per simulated second.
    #[serde(default = "default_train_speed")]
    pub speed: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            base_capacity: default_train_base_capacity(),
            speed: default_train_speed(),
        }
    }
}

/// Starting resource totals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceConfig {
    /// Line slots.
    #[serde(default = "default_lines")]
    pub lines: u32,
    /// Trains.
    #[serde(default = "default_trains")]
    pub trains: u32,
    /// Tunnels.
    #[serde(default = "default_tunnels")]
    pub tunnels: u32,
    /// Bridges.
    #[serde(default)]
    pub bridges: u32,
    /// Wagons.
    #[serde(default)]
    pub wagons: u32,
}

impl ResourceConfig {
    /// A fresh pool holding these totals, all available.
    pub fn starting_pool(&self) -> ResourcePool {
        ResourcePool::from_totals([
            (ResourceKind::Lines, self.lines),
            (ResourceKind::Trains, self.trains),
            (ResourceKind::Tunnels, self.tunnels),
            (ResourceKind::Bridges, self.bridges),
            (ResourceKind::Wagons, self.wagons),
        ])
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            lines: default_lines(),
            trains: default_trains(),
            tunnels: default_tunnels(),
            bridges: 0,
            wagons: 0,
        }
    }
}

/// Audit cadence, in simulated seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuditConfig {
    /// Resource validator interval.
    #[serde(default = "default_validator_interval_secs")]
    pub validator_interval_secs: f64,

    /// Stranded-passenger sweep interval.
    #[serde(default = "default_stranding_interval_secs")]
    pub stranding_interval_secs: f64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            validator_interval_secs: default_validator_interval_secs(),
            stranding_interval_secs: default_stranding_interval_secs(),
        }
    }
}

/// Undo/redo configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// Maximum entries on each of the undo and redo stacks.
    #[serde(default = "default_history_depth")]
    pub depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            depth: default_history_depth(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PersistenceConfig {
    /// Whether the background writer runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// File the latest snapshot is written to.
    #[serde(default = "default_snapshot_path")]
    pub path: String,

    /// Simulated seconds between snapshots.
    #[serde(default = "default_snapshot_interval_secs")]
    pub interval_secs: f64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_snapshot_path(),
            interval_secs: default_snapshot_interval_secs(),
        }
    }
}

/// Headless driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadlessConfig {
    /// Real milliseconds between frames.
    #[serde(default = "default_frame_ms")]
    pub frame_ms: u64,

    /// Stop after this many frames. Zero runs until the session halts.
    #[serde(default = "default_max_frames")]
    pub max_frames: u64,

    /// Sleep between frames. When false, frames are fed back to back with
    /// synthetic timestamps.
    #[serde(default)]
    pub realtime: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            frame_ms: default_frame_ms(),
            max_frames: default_max_frames(),
            realtime: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    "Metroline".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_width() -> f64 {
    1200.0
}

const fn default_height() -> f64 {
    800.0
}

const fn default_max_tick_delta_ms() -> u64 {
    100
}

const fn default_seconds_per_day() -> f64 {
    20.0
}

const fn default_days_per_week() -> u32 {
    7
}

const fn default_max_transfer_depth() -> u32 {
    2
}

const fn default_direct_route_weight() -> f64 {
    1.0
}

const fn default_transfer_penalty() -> f64 {
    5.0
}

const fn default_preference_wait_secs() -> f64 {
    3.0
}

const fn default_stranded_timeout_secs() -> f64 {
    60.0
}

const fn default_station_capacity() -> u32 {
    6
}

const fn default_overload_growth_secs() -> f64 {
    20.0
}

const fn default_overload_decay_secs() -> f64 {
    40.0
}

const fn default_station_spawn_interval_secs() -> f64 {
    40.0
}

const fn default_max_stations() -> u32 {
    40
}

const fn default_min_spacing() -> f64 {
    80.0
}

const fn default_passenger_spawn_interval_secs() -> f64 {
    2.5
}

const fn default_train_base_capacity() -> u32 {
    6
}

const fn default_train_speed() -> f64 {
    60.0
}

const fn default_lines() -> u32 {
    3
}

const fn default_trains() -> u32 {
    3
}

const fn default_tunnels() -> u32 {
    3
}

const fn default_validator_interval_secs() -> f64 {
    5.0
}

const fn default_stranding_interval_secs() -> f64 {
    10.0
}

const fn default_history_depth() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

fn default_snapshot_path() -> String {
    "metroline-snapshot.json".to_owned()
}

const fn default_snapshot_interval_secs() -> f64 {
    30.0
}

const fn default_frame_ms() -> u64 {
    16
}

const fn default_max_frames() -> u64 {
    0
}
