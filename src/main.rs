use std::{error::Error, process::ExitCode};

use grid_astar::{
    config::Config, load_grid, store_grid, CancelFlag, Deadline, PathResult, Pathfinder,
    ProgressLogger, SearchObserver,
};
use log::{error, info, warn};

const PROGRESS_EVERY: usize = 10_000;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = Config::from_env()?;
    let mut grid = load_grid(&config.input)?;
    let (start, goal) = config.endpoints(&grid);

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || on_interrupt.cancel()) {
        warn!("Ctrl-C will not cancel the search: {e}");
    }

    let mut observer = cancel
        .chain(Deadline::from_timeout(config.timeout))
        .chain(ProgressLogger::new(PROGRESS_EVERY));

    info!(
        "searching {}x{} grid from {} to {}",
        grid.height(),
        grid.width(),
        start,
        goal
    );
    let result = Pathfinder::new(&grid).find_path_observed(&start, &goal, &mut observer)?;

    match &result {
        PathResult::Found(path) => info!("found path of {} steps", path.len() - 1),
        PathResult::NotFound => info!("no path from {} to {}", start, goal),
        PathResult::Cancelled => warn!("search cancelled, grid left unchanged"),
    }

    grid.annotate(&result);
    store_grid(&grid, &config.output)?;
    info!("grid saved to {}", config.output.display());

    Ok(())
}
