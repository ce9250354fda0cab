use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    error::Error,
    fmt::{Display, Formatter},
};

use derive_more::Display;
use derive_new::new;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod load;
pub mod observer;
pub mod store;

pub use load::{load_grid, parse_grid, LoadError};
pub use observer::{
    from_fn, CancelFlag, Chain, ChannelObserver, Deadline, NoopObserver, ProgressLogger,
    SearchObserver, SearchSnapshot, SearchStep, StepControl,
};
pub use store::{format_grid, store_grid, write_grid};

pub type Cell = u32;

pub const FREE: Cell = 0;
pub const PATH: Cell = 3;
pub const BLOCKED: Cell = 5;

const NO_PARENT: usize = usize::MAX;
const UNREACHED: u32 = u32::MAX;

#[derive(Debug, Display, PartialEq, Eq)]
pub enum GridError {
    #[display(fmt = "Grid is empty")]
    Empty,
    #[display(fmt = "Row {} has {} cells, expected {}", row, len, expected)]
    RaggedRow {
        row: usize,
        len: usize,
        expected: usize,
    },
}

impl Error for GridError {}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum FindPathError {
    #[display(fmt = "Start {} out of bounds", _0)]
    StartOutOfBounds(Coordinate),
    #[display(fmt = "Goal {} out of bounds", _0)]
    GoalOutOfBounds(Coordinate),
}

impl Error for FindPathError {}

/// Rectangular grid of cell codes, stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Cell>,
    width: usize,
    height: usize,
}

impl Grid {
    /// Builds a grid from rows. Every row must have the same, non-zero length.
    pub fn new(rows: Vec<Vec<Cell>>) -> Result<Self, GridError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(GridError::Empty);
        }

        let height = rows.len();
        let mut cells = Vec::with_capacity(width * height);
        for (row, cols) in rows.into_iter().enumerate() {
            if cols.len() != width {
                return Err(GridError::RaggedRow {
                    row,
                    len: cols.len(),
                    expected: width,
                });
            }
            cells.extend(cols);
        }

        Ok(Self {
            cells,
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, coord: &Coordinate) -> bool {
        coord.row < self.height && coord.col < self.width
    }

    pub fn get(&self, coord: &Coordinate) -> Option<Cell> {
        if !self.in_bounds(coord) {
            return None;
        }
        Some(self.cells[self.index(coord)])
    }

    /// Out of bounds cells are not reported as blocked; callers bounds-check first.
    pub fn is_blocked(&self, coord: &Coordinate) -> bool {
        self.get(coord) == Some(BLOCKED)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width)
    }

    /// Writes `PATH` onto every in-bounds cell of `path`.
    pub fn mark_path(&mut self, path: &[Coordinate]) {
        for coord in path {
            if self.in_bounds(coord) {
                let index = self.index(coord);
                self.cells[index] = PATH;
            }
        }
    }

    /// Marks the route of a `Found` result. Returns whether anything was written.
    pub fn annotate(&mut self, result: &PathResult) -> bool {
        match result {
            PathResult::Found(path) => {
                self.mark_path(path);
                true
            }
            PathResult::NotFound | PathResult::Cancelled => false,
        }
    }

    pub(crate) fn index(&self, coord: &Coordinate) -> usize {
        coord.row * self.width + coord.col
    }

    pub(crate) fn coordinate(&self, index: usize) -> Coordinate {
        Coordinate::new(index / self.width, index % self.width)
    }

    pub(crate) fn size(&self) -> usize {
        self.cells.len()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, new)]
pub struct Coordinate {
    pub row: usize,
    pub col: usize,
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// Outcome of a search. Only `Found` carries a route, ordered start to goal inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathResult {
    Found(Vec<Coordinate>),
    NotFound,
    Cancelled,
}

impl PathResult {
    pub fn path(&self) -> Option<&[Coordinate]> {
        match self {
            PathResult::Found(path) => Some(path),
            _ => None,
        }
    }

    /// Number of unit steps along a found path.
    pub fn cost(&self) -> Option<usize> {
        self.path().map(|path| path.len().saturating_sub(1))
    }

    pub fn is_found(&self) -> bool {
        matches!(self, PathResult::Found(_))
    }
}

#[derive(new)]
pub struct Pathfinder<'a> {
    grid: &'a Grid,
}

impl<'a> Pathfinder<'a> {
    pub fn grid(&self) -> &'a Grid {
        self.grid
    }

    /**
     * Returns a path inclusive of start and end.  Uses A*.
     * NotFound if the goal is unreachable or either endpoint is blocked.
     * Err if start or goal is out of bounds.
     */
    pub fn find_path(
        &self,
        start: &Coordinate,
        goal: &Coordinate,
    ) -> Result<PathResult, FindPathError> {
        self.find_path_observed(start, goal, &mut NoopObserver)
    }

    /**
     * Same as `find_path`, calling `observer` once per expanded cell.
     * The observer may cancel, in which case the result is `Cancelled`.
     */
    pub fn find_path_observed<O: SearchObserver + ?Sized>(
        &self,
        start: &Coordinate,
        goal: &Coordinate,
        observer: &mut O,
    ) -> Result<PathResult, FindPathError> {
        if !self.grid.in_bounds(start) {
            return Err(FindPathError::StartOutOfBounds(*start));
        }

        if !self.grid.in_bounds(goal) {
            return Err(FindPathError::GoalOutOfBounds(*goal));
        }

        if self.grid.is_blocked(start) || self.grid.is_blocked(goal) {
            debug!("start {} or goal {} is blocked", start, goal);
            return Ok(PathResult::NotFound);
        }

        Ok(self.astar(*start, *goal, observer))
    }

    fn astar<O: SearchObserver + ?Sized>(
        &self,
        start: Coordinate,
        goal: Coordinate,
        observer: &mut O,
    ) -> PathResult {
        let size = self.grid.size();
        let mut g_costs = vec![UNREACHED; size];
        let mut parents = vec![NO_PARENT; size];
        let mut open = vec![false; size];
        let mut closed = vec![false; size];

        let mut open_list = BinaryHeap::new();
        let mut seq = 0u64;
        let mut expanded = 0usize;

        let start_index = self.grid.index(&start);
        let start_h = manhattan(&start, &goal);
        g_costs[start_index] = 0;
        open[start_index] = true;
        open_list.push(AStarNode::new(start_index, start_h, start_h, 0, seq));

        while let Some(curr) = open_list.pop() {
            //There can be duplicate entries for a cell with an improved g_cost.
            if closed[curr.index] || curr.g_cost > g_costs[curr.index] {
                trace!("stale entry for {}", self.grid.coordinate(curr.index));
                continue;
            }

            open[curr.index] = false;
            expanded += 1;

            let point = self.grid.coordinate(curr.index);
            trace!(
                "curr:{} cost:{} h:{} g:{}",
                point,
                curr.f_cost,
                curr.h_cost,
                curr.g_cost
            );

            let step = SearchStep::new(self.grid, point, curr.g_cost, expanded, &open, &closed);
            if observer.on_expand(&step) == StepControl::Cancel {
                debug!("search cancelled after {} expansions", expanded);
                return PathResult::Cancelled;
            }

            if point == goal {
                debug!(
                    "found path of cost {} after {} expansions",
                    curr.g_cost, expanded
                );
                return PathResult::Found(self.reconstruct_path(&parents, curr.index));
            }

            closed[curr.index] = true;

            for dir in DIRECTIONS {
                let Some(adj) = dir.step(&point, self.grid) else {
                    continue;
                };

                let adj_index = self.grid.index(&adj);
                if closed[adj_index] || self.grid.is_blocked(&adj) {
                    continue;
                }

                let next_g_cost = curr.g_cost + 1;
                if open[adj_index] {
                    if next_g_cost >= g_costs[adj_index] {
                        continue;
                    }
                    trace!("relaxing {} to g:{}", adj, next_g_cost);
                }

                g_costs[adj_index] = next_g_cost;
                parents[adj_index] = curr.index;
                open[adj_index] = true;

                seq += 1;
                let h_cost = manhattan(&adj, &goal);
                open_list.push(AStarNode::new(
                    adj_index,
                    next_g_cost + h_cost,
                    h_cost,
                    next_g_cost,
                    seq,
                ));
            }
        }

        debug!("no path found after {} expansions", expanded);
        PathResult::NotFound
    }

    fn reconstruct_path(&self, parents: &[usize], goal_index: usize) -> Vec<Coordinate> {
        let mut path = Vec::new();
        let mut curr = goal_index;
        while curr != NO_PARENT {
            path.push(self.grid.coordinate(curr));
            curr = parents[curr];
        }

        path.reverse();
        path
    }
}

/// Heap entry. Ordered so the max-heap pops the lowest f, then lowest h,
/// then the earliest pushed entry.
#[derive(PartialEq, Eq, new)]
struct AStarNode {
    index: usize,
    f_cost: u32,
    h_cost: u32,
    g_cost: u32,
    seq: u64,
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost
            .cmp(&other.f_cost)
            .then(self.h_cost.cmp(&other.h_cost))
            .then(self.seq.cmp(&other.seq))
            .reverse()
    }
}

#[derive(Debug)]
struct Direction {
    d_row: isize,
    d_col: isize,
}

impl Direction {
    const fn new(d_row: isize, d_col: isize) -> Self {
        Self { d_row, d_col }
    }

    fn step(&self, from: &Coordinate, grid: &Grid) -> Option<Coordinate> {
        let row = from.row.checked_add_signed(self.d_row)?;
        let col = from.col.checked_add_signed(self.d_col)?;
        let adj = Coordinate::new(row, col);
        grid.in_bounds(&adj).then_some(adj)
    }
}

const UP: Direction = Direction::new(-1, 0);
const DOWN: Direction = Direction::new(1, 0);
const LEFT: Direction = Direction::new(0, -1);
const RIGHT: Direction = Direction::new(0, 1);
const DIRECTIONS: [Direction; 4] = [UP, DOWN, LEFT, RIGHT];

pub fn manhattan(a: &Coordinate, b: &Coordinate) -> u32 {
    (a.row.abs_diff(b.row) + a.col.abs_diff(b.col)) as u32
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn open_grid(height: usize, width: usize) -> Grid {
        Grid::new(vec![vec![FREE; width]; height]).unwrap()
    }

    fn find(grid: &Grid, start: (usize, usize), goal: (usize, usize)) -> PathResult {
        Pathfinder::new(grid)
            .find_path(
                &Coordinate::new(start.0, start.1),
                &Coordinate::new(goal.0, goal.1),
            )
            .unwrap()
    }

    //plain bfs used as the reference shortest distance
    fn bfs(grid: &Grid, start: &Coordinate, end: &Coordinate) -> Option<usize> {
        if grid.is_blocked(start) || grid.is_blocked(end) {
            return None;
        }

        let mut frontier = VecDeque::new();
        let mut seen = HashMap::new();

        frontier.push_back(*start);
        seen.insert(*start, 0);
        while let Some(curr) = frontier.pop_front() {
            let distance = seen[&curr];
            if curr == *end {
                return Some(distance);
            }

            for dir in DIRECTIONS {
                let Some(adj) = dir.step(&curr, grid) else {
                    continue;
                };

                if grid.is_blocked(&adj) || seen.contains_key(&adj) {
                    continue;
                }

                seen.insert(adj, distance + 1);
                frontier.push_back(adj);
            }
        }

        None
    }

    fn assert_valid_route(grid: &Grid, path: &[Coordinate]) {
        for pair in path.windows(2) {
            assert_eq!(manhattan(&pair[0], &pair[1]), 1, "{:?}", pair);
        }
        for coord in path {
            assert!(!grid.is_blocked(coord), "blocked cell {} in path", coord);
        }
    }

    #[test]
    fn test_find_path() {
        let grid = open_grid(10, 10);

        let result = find(&grid, (0, 0), (9, 9));

        let path = result.path().unwrap();
        assert_eq!(path.len(), 19);
        assert_eq!(path[0], Coordinate::new(0, 0));
        assert_eq!(path[18], Coordinate::new(9, 9));
        assert_eq!(result.cost(), Some(18));
        assert_valid_route(&grid, path);
    }

    #[test]
    fn test_three_by_three() {
        let grid = open_grid(3, 3);

        let result = find(&grid, (0, 0), (2, 2));

        assert_eq!(result.path().unwrap().len(), 5);
        assert_eq!(result.cost(), Some(4));
    }

    #[test]
    fn test_open_grid_is_manhattan_optimal() {
        let grid = open_grid(6, 9);

        for (start, goal) in [((0, 0), (5, 8)), ((5, 0), (0, 8)), ((3, 4), (3, 4)), ((2, 7), (4, 1))] {
            let result = find(&grid, start, goal);
            let expected = manhattan(
                &Coordinate::new(start.0, start.1),
                &Coordinate::new(goal.0, goal.1),
            );
            assert_eq!(result.cost(), Some(expected as usize));
        }
    }

    #[test]
    fn test_start_is_goal() {
        let grid = open_grid(4, 4);

        let result = find(&grid, (2, 1), (2, 1));

        assert_eq!(result, PathResult::Found(vec![Coordinate::new(2, 1)]));
        assert_eq!(result.cost(), Some(0));
    }

    #[test]
    fn test_blocked_endpoints() {
        let mut rows = vec![vec![FREE; 4]; 4];
        rows[0][0] = BLOCKED;
        let grid = Grid::new(rows).unwrap();
        assert_eq!(find(&grid, (0, 0), (3, 3)), PathResult::NotFound);
        assert_eq!(find(&grid, (3, 3), (0, 0)), PathResult::NotFound);
        assert_eq!(find(&grid, (0, 0), (0, 0)), PathResult::NotFound);
    }

    #[test]
    fn test_wall() {
        let mut rows = vec![vec![FREE; 5]; 5];
        for col in 0..4 {
            rows[2][col] = BLOCKED;
        }
        let grid = Grid::new(rows).unwrap();

        let result = find(&grid, (0, 0), (4, 0));

        // down through the gap at column 4 and back
        assert_eq!(result.cost(), Some(12));
        assert_valid_route(&grid, result.path().unwrap());
        assert!(result.path().unwrap().contains(&Coordinate::new(2, 4)));
    }

    #[test]
    fn test_no_path() {
        let mut rows = vec![vec![FREE; 5]; 5];
        rows[2] = vec![BLOCKED; 5];
        let grid = Grid::new(rows).unwrap();

        assert_eq!(find(&grid, (0, 0), (4, 4)), PathResult::NotFound);
    }

    #[test]
    fn test_enclosed_start() {
        let grid = Grid::new(vec![
            vec![FREE, BLOCKED, FREE],
            vec![BLOCKED, FREE, FREE],
            vec![FREE, FREE, FREE],
        ])
        .unwrap();

        assert_eq!(find(&grid, (0, 0), (2, 2)), PathResult::NotFound);
    }

    #[test]
    fn test_other_codes_are_traversable() {
        let grid = Grid::new(vec![vec![1, 7, 2], vec![BLOCKED, BLOCKED, 9]]).unwrap();

        let result = find(&grid, (0, 0), (1, 2));

        assert_eq!(result.cost(), Some(3));
    }

    #[test]
    fn test_out_of_bounds() {
        let grid = open_grid(3, 3);
        let pathfinder = Pathfinder::new(&grid);

        assert_eq!(
            pathfinder.find_path(&Coordinate::new(3, 0), &Coordinate::new(0, 0)),
            Err(FindPathError::StartOutOfBounds(Coordinate::new(3, 0)))
        );
        assert_eq!(
            pathfinder.find_path(&Coordinate::new(0, 0), &Coordinate::new(0, 3)),
            Err(FindPathError::GoalOutOfBounds(Coordinate::new(0, 3)))
        );
    }

    #[test]
    fn test_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let rows = (0..12)
            .map(|_| {
                (0..12)
                    .map(|_| if rng.random_bool(0.2) { BLOCKED } else { FREE })
                    .collect()
            })
            .collect();
        let grid = Grid::new(rows).unwrap();
        let start = Coordinate::new(0, 0);
        let goal = Coordinate::new(11, 11);
        let pathfinder = Pathfinder::new(&grid);

        let first = pathfinder.find_path_observed(&start, &goal, &mut NoopObserver);
        let second = pathfinder.find_path_observed(&start, &goal, &mut NoopObserver);

        assert_eq!(first, second);
    }

    #[test]
    fn test_matches_bfs() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..300 {
            let height = rng.random_range(1..9);
            let width = rng.random_range(1..9);
            let density = rng.random_range(0.0..0.45);
            let rows = (0..height)
                .map(|_| {
                    (0..width)
                        .map(|_| if rng.random_bool(density) { BLOCKED } else { FREE })
                        .collect()
                })
                .collect();
            let grid = Grid::new(rows).unwrap();

            let start = Coordinate::new(rng.random_range(0..height), rng.random_range(0..width));
            let goal = Coordinate::new(rng.random_range(0..height), rng.random_range(0..width));

            let result = Pathfinder::new(&grid).find_path(&start, &goal).unwrap();
            let expected = bfs(&grid, &start, &goal);

            assert_eq!(result.cost(), expected, "{:?} {} -> {}", grid, start, goal);
            if let Some(path) = result.path() {
                assert_eq!(path.first(), Some(&start));
                assert_eq!(path.last(), Some(&goal));
                assert_valid_route(&grid, path);
            }
        }
    }

    #[test]
    fn test_annotate() {
        let mut grid = Grid::new(vec![vec![FREE, 7, FREE], vec![BLOCKED, 7, FREE]]).unwrap();
        let result = find(&grid, (0, 0), (0, 2));

        assert!(grid.annotate(&result));

        let rows: Vec<Vec<Cell>> = grid.rows().map(<[Cell]>::to_vec).collect();
        assert_eq!(rows, vec![vec![PATH, PATH, PATH], vec![BLOCKED, 7, FREE]]);
    }

    #[test]
    fn test_annotate_ignores_failure() {
        let mut rows = vec![vec![FREE; 3]; 3];
        rows[1] = vec![BLOCKED; 3];
        let mut grid = Grid::new(rows).unwrap();
        let before = grid.clone();

        let result = find(&grid, (0, 0), (2, 2));

        assert!(!grid.annotate(&result));
        assert!(!grid.annotate(&PathResult::Cancelled));
        assert_eq!(grid, before);
    }

    #[test]
    fn test_grid_new() {
        assert_eq!(Grid::new(vec![]), Err(GridError::Empty));
        assert_eq!(Grid::new(vec![vec![]]), Err(GridError::Empty));
        assert_eq!(
            Grid::new(vec![vec![FREE, FREE], vec![FREE]]),
            Err(GridError::RaggedRow {
                row: 1,
                len: 1,
                expected: 2
            })
        );

        let grid = Grid::new(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.get(&Coordinate::new(1, 2)), Some(6));
        assert_eq!(grid.get(&Coordinate::new(2, 0)), None);
        assert!(grid.is_blocked(&Coordinate::new(1, 1)));
    }

    #[test]
    fn test_manhattan() {
        let a = manhattan(&Coordinate::new(0, 0), &Coordinate::new(3, 4));
        assert_eq!(a, 7);
        let b = manhattan(&Coordinate::new(3, 4), &Coordinate::new(0, 0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            FindPathError::StartOutOfBounds(Coordinate::new(1, 2)).to_string(),
            "Start (1,2) out of bounds"
        );
        assert_eq!(
            GridError::RaggedRow {
                row: 3,
                len: 2,
                expected: 4
            }
            .to_string(),
            "Row 3 has 2 cells, expected 4"
        );
    }
}
