//! Path search over the 4-connected city grid.
//!
//! Three interchangeable algorithms share one contract: given a start
//! and a goal, return the ordered cells from start to goal inclusive, or
//! no path. Closed cells are removed from the neighbour set entirely.
//! Building cells may be entered only as the goal (and left only as the
//! start), so a responder can drive out of its station and back in.
//!
//! - **A\***: edge cost from the weather table, Manhattan heuristic.
//!   Frontier order is lowest `f`, then highest `g` (closest to the goal
//!   by heuristic), then insertion order.
//! - **Dijkstra**: the same search with a zero heuristic.
//! - **BFS**: unit edge cost, weather ignored.
//!
//! Weighted costs are computed in integer tenths (see
//! [`weather::step_cost_tenths`]) so optimal costs from A* and Dijkstra
//! agree exactly.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use nexus_types::{CellKind, GridPos, RoutingStats};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::city::CityMap;
use crate::error::WorldError;
use crate::weather::{self, BASE_STEP_COST};

/// Search algorithm selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// A* with Manhattan heuristic.
    #[default]
    AStar,
    /// Uniform-cost search.
    Dijkstra,
    /// Breadth-first search on unit costs.
    Bfs,
}

impl Algorithm {
    /// All algorithms.
    pub const ALL: [Self; 3] = [Self::AStar, Self::Dijkstra, Self::Bfs];

    /// Wire name of the algorithm.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AStar => "a_star",
            Self::Dijkstra => "dijkstra",
            Self::Bfs => "bfs",
        }
    }
}

impl core::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchReport {
    /// Algorithm that produced this report.
    pub algorithm: Algorithm,
    /// Cells from start to goal inclusive, or `None` if unreachable.
    pub path: Option<Vec<GridPos>>,
    /// Total path cost in weather-scaled units (steps for BFS).
    pub cost: Option<f64>,
    /// Nodes taken off the frontier.
    pub nodes_expanded: u32,
    /// `f` value of each expanded node, in expansion order.
    pub expanded_f: Vec<f64>,
}

impl SearchReport {
    /// Whether a path was found.
    pub const fn found(&self) -> bool {
        self.path.is_some()
    }

    /// Number of cells in the path, endpoints included.
    pub fn path_len(&self) -> usize {
        self.path.as_ref().map_or(0, Vec::len)
    }
}

/// Whether a search may step onto `pos` on its way to `goal`.
fn enterable(city: &CityMap, pos: GridPos, goal: GridPos) -> bool {
    if city.is_blocked(pos) {
        return false;
    }
    pos == goal || city.cell(pos).is_some_and(CellKind::is_drivable)
}

fn tenths(value: u32) -> f64 {
    f64::from(value) / f64::from(BASE_STEP_COST)
}

/// Walk the predecessor map back from `goal`.
fn reconstruct(prev: &BTreeMap<GridPos, GridPos>, start: GridPos, goal: GridPos) -> Vec<GridPos> {
    let mut path = VecDeque::new();
    let mut current = goal;
    path.push_front(current);
    while current != start {
        let Some(&predecessor) = prev.get(&current) else {
            break;
        };
        path.push_front(predecessor);
        current = predecessor;
    }
    path.into_iter().collect()
}

/// Run one search. Errors only when an endpoint is outside the grid.
pub fn search(
    city: &CityMap,
    start: GridPos,
    goal: GridPos,
    algorithm: Algorithm,
) -> Result<SearchReport, WorldError> {
    city.check_bounds(start)?;
    city.check_bounds(goal)?;
    Ok(match algorithm {
        Algorithm::AStar => weighted(city, start, goal, algorithm, true),
        Algorithm::Dijkstra => weighted(city, start, goal, algorithm, false),
        Algorithm::Bfs => breadth_first(city, start, goal),
    })
}

/// Frontier key: `(f, Reverse(g), insertion sequence)`.
type FrontierKey = (u32, Reverse<u32>, u64);

fn weighted(
    city: &CityMap,
    start: GridPos,
    goal: GridPos,
    algorithm: Algorithm,
    use_heuristic: bool,
) -> SearchReport {
    let step = weather::step_cost_tenths(city.weather());
    let heuristic = |p: GridPos| {
        if use_heuristic {
            p.manhattan(goal).saturating_mul(BASE_STEP_COST)
        } else {
            0
        }
    };

    let mut g_score: BTreeMap<GridPos, u32> = BTreeMap::new();
    let mut prev: BTreeMap<GridPos, GridPos> = BTreeMap::new();
    let mut open: BTreeSet<(FrontierKey, GridPos)> = BTreeSet::new();
    let mut queued: BTreeMap<GridPos, FrontierKey> = BTreeMap::new();
    let mut closed: BTreeSet<GridPos> = BTreeSet::new();
    let mut seq: u64 = 0;
    let mut expanded_f = Vec::new();

    let start_key = (heuristic(start), Reverse(0), seq);
    g_score.insert(start, 0);
    open.insert((start_key, start));
    queued.insert(start, start_key);

    while let Some(((f, Reverse(g), _), current)) = open.pop_first() {
        queued.remove(&current);
        closed.insert(current);
        expanded_f.push(tenths(f));

        if current == goal {
            return SearchReport {
                algorithm,
                path: Some(reconstruct(&prev, start, goal)),
                cost: Some(tenths(g)),
                nodes_expanded: u32::try_from(expanded_f.len()).unwrap_or(u32::MAX),
                expanded_f,
            };
        }

        for neighbor in city.neighbors(current) {
            if closed.contains(&neighbor) || !enterable(city, neighbor, goal) {
                continue;
            }
            let Some(new_g) = g.checked_add(step) else {
                continue;
            };
            let improves = g_score
                .get(&neighbor)
                .is_none_or(|&existing| new_g < existing);
            if !improves {
                continue;
            }
            if let Some(old_key) = queued.remove(&neighbor) {
                open.remove(&(old_key, neighbor));
            }
            seq = seq.saturating_add(1);
            let key = (new_g.saturating_add(heuristic(neighbor)), Reverse(new_g), seq);
            g_score.insert(neighbor, new_g);
            prev.insert(neighbor, current);
            open.insert((key, neighbor));
            queued.insert(neighbor, key);
        }
    }

    SearchReport {
        algorithm,
        path: None,
        cost: None,
        nodes_expanded: u32::try_from(expanded_f.len()).unwrap_or(u32::MAX),
        expanded_f,
    }
}

fn breadth_first(city: &CityMap, start: GridPos, goal: GridPos) -> SearchReport {
    let mut queue: VecDeque<(GridPos, u32)> = VecDeque::new();
    let mut visited: BTreeSet<GridPos> = BTreeSet::new();
    let mut prev: BTreeMap<GridPos, GridPos> = BTreeMap::new();
    let mut expanded_f = Vec::new();

    queue.push_back((start, 0));
    visited.insert(start);

    while let Some((current, depth)) = queue.pop_front() {
        expanded_f.push(f64::from(depth));
        if current == goal {
            return SearchReport {
                algorithm: Algorithm::Bfs,
                path: Some(reconstruct(&prev, start, goal)),
                cost: Some(f64::from(depth)),
                nodes_expanded: u32::try_from(expanded_f.len()).unwrap_or(u32::MAX),
                expanded_f,
            };
        }
        for neighbor in city.neighbors(current) {
            if !enterable(city, neighbor, goal) || !visited.insert(neighbor) {
                continue;
            }
            prev.insert(neighbor, current);
            queue.push_back((neighbor, depth.saturating_add(1)));
        }
    }

    SearchReport {
        algorithm: Algorithm::Bfs,
        path: None,
        cost: None,
        nodes_expanded: u32::try_from(expanded_f.len()).unwrap_or(u32::MAX),
        expanded_f,
    }
}

/// Running totals for one algorithm.
#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    calls: u64,
    successes: u64,
    path_cells: u64,
    nodes_expanded: u64,
}

/// Stateful routing front end that keeps per-algorithm statistics.
#[derive(Debug, Clone, Default)]
pub struct Router {
    tallies: BTreeMap<Algorithm, Tally>,
}

impl Router {
    /// Create a router with empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Search and record the outcome in the statistics.
    pub fn route(
        &mut self,
        city: &CityMap,
        start: GridPos,
        goal: GridPos,
        algorithm: Algorithm,
    ) -> Result<SearchReport, WorldError> {
        let report = search(city, start, goal, algorithm)?;
        let tally = self.tallies.entry(algorithm).or_default();
        tally.calls = tally.calls.saturating_add(1);
        tally.nodes_expanded = tally
            .nodes_expanded
            .saturating_add(u64::from(report.nodes_expanded));
        if report.found() {
            tally.successes = tally.successes.saturating_add(1);
            tally.path_cells = tally
                .path_cells
                .saturating_add(u64::try_from(report.path_len()).unwrap_or(u64::MAX));
        }
        debug!(
            %algorithm,
            %start,
            %goal,
            found = report.found(),
            nodes_expanded = report.nodes_expanded,
            "route searched"
        );
        Ok(report)
    }

    /// Statistics keyed by algorithm name.
    pub fn stats(&self) -> BTreeMap<String, RoutingStats> {
        self.tallies
            .iter()
            .map(|(algorithm, t)| {
                let mean = if t.successes == 0 {
                    0.0
                } else {
                    lossy(t.path_cells) / lossy(t.successes)
                };
                (
                    algorithm.as_str().to_owned(),
                    RoutingStats {
                        calls: t.calls,
                        successes: t.successes,
                        mean_path_length: mean,
                        nodes_expanded: t.nodes_expanded,
                    },
                )
            })
            .collect()
    }

    /// Forget all statistics.
    pub fn reset(&mut self) {
        self.tallies.clear();
    }
}

#[allow(clippy::cast_precision_loss)]
const fn lossy(value: u64) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::indexing_slicing)]

    use nexus_types::{Building, BuildingId, BuildingType, Weather};

    use super::*;

    fn open_grid(size: u32) -> CityMap {
        CityMap::new(size).unwrap()
    }

    fn is_contiguous(path: &[GridPos]) -> bool {
        path.windows(2).all(|w| w[0].manhattan(w[1]) == 1)
    }

    #[test]
    fn five_by_five_corner_to_corner() {
        let city = open_grid(5);
        let report = search(&city, GridPos::new(0, 0), GridPos::new(4, 4), Algorithm::AStar).unwrap();
        let path = report.path.clone().unwrap();
        assert_eq!(path.len(), 9);
        assert_eq!(path[0], GridPos::new(0, 0));
        assert_eq!(path[8], GridPos::new(4, 4));
        assert!(is_contiguous(&path));
        assert!((report.cost.unwrap() - 8.0).abs() < f64::EPSILON);
        assert!(report.expanded_f.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn a_star_matches_dijkstra_cost() {
        let mut city = open_grid(8);
        for y in 0..6 {
            city.block(GridPos::new(3, y), "wall", 0, None).unwrap();
        }
        city.block(GridPos::new(5, 7), "wall", 0, None).unwrap();
        city.set_weather(Weather::Rain);
        for goal in [GridPos::new(7, 0), GridPos::new(6, 6), GridPos::new(4, 1)] {
            let a = search(&city, GridPos::new(0, 0), goal, Algorithm::AStar).unwrap();
            let d = search(&city, GridPos::new(0, 0), goal, Algorithm::Dijkstra).unwrap();
            assert!(a.found() && d.found());
            assert!((a.cost.unwrap() - d.cost.unwrap()).abs() < f64::EPSILON);
            assert!(a.nodes_expanded <= d.nodes_expanded);
        }
    }

    #[test]
    fn disconnected_goal_has_no_path() {
        let mut city = open_grid(5);
        for y in 0..5 {
            city.block(GridPos::new(2, y), "wall", 0, None).unwrap();
        }
        for algorithm in Algorithm::ALL {
            let report = search(&city, GridPos::new(0, 0), GridPos::new(4, 4), algorithm).unwrap();
            assert!(!report.found(), "{algorithm}");
            assert!(report.cost.is_none());
        }
    }

    #[test]
    fn weather_scales_weighted_cost_but_not_bfs() {
        let mut city = open_grid(5);
        city.set_weather(Weather::Snow);
        let a = search(&city, GridPos::new(0, 0), GridPos::new(4, 0), Algorithm::AStar).unwrap();
        let b = search(&city, GridPos::new(0, 0), GridPos::new(4, 0), Algorithm::Bfs).unwrap();
        assert!((a.cost.unwrap() - 8.0).abs() < f64::EPSILON);
        assert!((b.cost.unwrap() - 4.0).abs() < f64::EPSILON);
        assert_eq!(a.path_len(), b.path_len());
    }

    #[test]
    fn buildings_are_only_endpoints() {
        let mut city = open_grid(3);
        // Column of buildings at x = 1 except the bottom row.
        for (i, y) in (0..2).enumerate() {
            let id = BuildingId(u32::try_from(i).unwrap());
            city.add_building(Building::new(id, BuildingType::Residential, GridPos::new(1, y), 30))
                .unwrap();
        }
        let around = search(&city, GridPos::new(0, 0), GridPos::new(2, 0), Algorithm::AStar).unwrap();
        assert_eq!(around.path_len(), 7);
        let into = search(&city, GridPos::new(0, 0), GridPos::new(1, 0), Algorithm::AStar).unwrap();
        assert_eq!(into.path.unwrap(), vec![GridPos::new(0, 0), GridPos::new(1, 0)]);
        let out_of = search(&city, GridPos::new(1, 1), GridPos::new(0, 1), Algorithm::Bfs).unwrap();
        assert_eq!(out_of.path_len(), 2);
    }

    #[test]
    fn start_equals_goal() {
        let city = open_grid(4);
        let report = search(&city, GridPos::new(2, 2), GridPos::new(2, 2), Algorithm::Dijkstra).unwrap();
        assert_eq!(report.path.unwrap(), vec![GridPos::new(2, 2)]);
        assert!((report.cost.unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let city = open_grid(4);
        assert!(search(&city, GridPos::new(0, 0), GridPos::new(9, 0), Algorithm::AStar).is_err());
    }

    #[test]
    fn router_tracks_statistics() {
        let city = open_grid(5);
        let mut router = Router::new();
        router.route(&city, GridPos::new(0, 0), GridPos::new(4, 4), Algorithm::AStar).unwrap();
        router.route(&city, GridPos::new(0, 0), GridPos::new(0, 2), Algorithm::AStar).unwrap();
        let stats = router.stats();
        let a = stats.get("a_star").unwrap();
        assert_eq!(a.calls, 2);
        assert_eq!(a.successes, 2);
        assert!((a.mean_path_length - 6.0).abs() < f64::EPSILON);
        router.reset();
        assert!(router.stats().is_empty());
    }
}
