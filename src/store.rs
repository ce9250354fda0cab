use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use log::debug;

use crate::Grid;

/// Space separated cells, one row per line, each line newline terminated.
pub fn format_grid(grid: &Grid) -> String {
    let mut text = String::with_capacity(grid.height() * grid.width() * 2);
    for row in grid.rows() {
        let line = row
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        text.push_str(&line);
        text.push('\n');
    }
    text
}

pub fn write_grid<W: Write>(grid: &Grid, mut writer: W) -> io::Result<()> {
    writer.write_all(format_grid(grid).as_bytes())?;
    writer.flush()
}

pub fn store_grid(grid: &Grid, file_path: impl AsRef<Path>) -> io::Result<()> {
    let file_path = file_path.as_ref();
    let file = File::create(file_path)?;
    write_grid(grid, BufWriter::new(file))?;

    debug!("stored grid to {}", file_path.display());
    Ok(())
}
