//! Run configuration, read from environment variables.
//!
//! | variable          | default        |
//! |-------------------|----------------|
//! | `GRID_INPUT`      | `grid.txt`     |
//! | `GRID_OUTPUT`     | `result.txt`   |
//! | `GRID_START`      | top-left cell  |
//! | `GRID_GOAL`       | bottom-right   |
//! | `GRID_TIMEOUT_MS` | no deadline    |

use std::{env, error::Error, path::PathBuf, time::Duration};

use derive_more::Display;

use crate::{Coordinate, Grid};

pub const INPUT_VAR: &str = "GRID_INPUT";
pub const OUTPUT_VAR: &str = "GRID_OUTPUT";
pub const START_VAR: &str = "GRID_START";
pub const GOAL_VAR: &str = "GRID_GOAL";
pub const TIMEOUT_VAR: &str = "GRID_TIMEOUT_MS";

pub const DEFAULT_INPUT: &str = "grid.txt";
pub const DEFAULT_OUTPUT: &str = "result.txt";

#[derive(Debug, Display, PartialEq, Eq)]
pub enum ConfigError {
    #[display(fmt = "{} must be `row,col`, got {:?}", name, value)]
    InvalidCoordinate { name: &'static str, value: String },
    #[display(fmt = "{} must be a whole number of milliseconds, got {:?}", name, value)]
    InvalidTimeout { name: &'static str, value: String },
}

impl Error for ConfigError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start: Option<Coordinate>,
    pub goal: Option<Coordinate>,
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            output: PathBuf::from(DEFAULT_OUTPUT),
            start: None,
            goal: None,
            timeout: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source. Unset variables keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(input) = lookup(INPUT_VAR) {
            config.input = PathBuf::from(input);
        }
        if let Some(output) = lookup(OUTPUT_VAR) {
            config.output = PathBuf::from(output);
        }
        if let Some(value) = lookup(START_VAR) {
            config.start = Some(coordinate_var(START_VAR, value)?);
        }
        if let Some(value) = lookup(GOAL_VAR) {
            config.goal = Some(coordinate_var(GOAL_VAR, value)?);
        }
        if let Some(value) = lookup(TIMEOUT_VAR) {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidTimeout {
                    name: TIMEOUT_VAR,
                    value: value.clone(),
                })?;
            config.timeout = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Configured endpoints, falling back to opposite corners of `grid`.
    pub fn endpoints(&self, grid: &Grid) -> (Coordinate, Coordinate) {
        let start = self.start.unwrap_or(Coordinate::new(0, 0));
        let goal = self
            .goal
            .unwrap_or(Coordinate::new(grid.height() - 1, grid.width() - 1));
        (start, goal)
    }
}

/// Parses `row,col`, surrounding whitespace allowed.
pub fn parse_coordinate(value: &str) -> Option<Coordinate> {
    let (row, col) = value.split_once(',')?;
    Some(Coordinate::new(
        row.trim().parse().ok()?,
        col.trim().parse().ok()?,
    ))
}

fn coordinate_var(name: &'static str, value: String) -> Result<Coordinate, ConfigError> {
    parse_coordinate(&value).ok_or(ConfigError::InvalidCoordinate { name, value })
}
