use std::{error::Error, fs, io, num::ParseIntError, path::Path};

use derive_more::Display;
use log::debug;

use crate::{Cell, Grid, GridError};

#[derive(Debug, Display)]
pub enum LoadError {
    #[display(fmt = "Cannot read grid file: {}", _0)]
    Io(io::Error),
    #[display(fmt = "Invalid cell {:?} on line {}: {}", token, line, source)]
    InvalidCell {
        line: usize,
        token: String,
        source: ParseIntError,
    },
    #[display(fmt = "Invalid grid: {}", _0)]
    Grid(GridError),
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::InvalidCell { source, .. } => Some(source),
            LoadError::Grid(e) => Some(e),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<GridError> for LoadError {
    fn from(e: GridError) -> Self {
        LoadError::Grid(e)
    }
}

pub fn load_grid(file_path: impl AsRef<Path>) -> Result<Grid, LoadError> {
    let file_path = file_path.as_ref();
    let text = fs::read_to_string(file_path)?;
    let grid = parse_grid(&text)?;

    debug!(
        "loaded {}x{} grid from {}",
        grid.height(),
        grid.width(),
        file_path.display()
    );
    Ok(grid)
}

/**
 * One row per line, cells separated by whitespace.
 * Lines holding only whitespace are skipped.
 */
pub fn parse_grid(text: &str) -> Result<Grid, LoadError> {
    let mut rows = Vec::new();

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let row = line
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<Cell>()
                    .map_err(|source| LoadError::InvalidCell {
                        line: number + 1,
                        token: token.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    Ok(Grid::new(rows)?)
}
