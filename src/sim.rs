use crate::config::Config;
use crate::grid::{Cell, GridState};
use crate::walker::{Fate, StepRules, StepScratch, Walker, WalkerPath};

/// Candidate start cells drawn per walker before the slot is skipped.
pub const SPAWN_ATTEMPTS: u32 = 10;
/// Hard ceiling on simulation rounds. Age normally ends the run first.
pub const MAX_ROUNDS: u32 = 1000;

/// Everything the playback side receives from one run.
#[derive(Debug, Clone)]
pub struct SimOutput {
    /// One path per spawned walker, in spawn order.
    pub paths: Vec<WalkerPath>,
    /// Walkers asked for. `paths.len()` may be lower when placement failed.
    pub requested: u32,
    pub rounds: u32,
    pub hit_round_limit: bool,
    pub fates: FateCounts,
}

/// How the walkers of one run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FateCounts {
    pub exhausted: usize,
    pub blocked: usize,
    pub merged: usize,
    /// Still walking when the round limit hit.
    pub alive: usize,
    /// Cells occupied by all trails together, merge targets counted twice.
    pub cells: usize,
}

impl FateCounts {
    pub fn tally(walkers: &[Walker]) -> Self {
        let mut counts = Self::default();
        for walker in walkers {
            match walker.fate() {
                Some(Fate::Exhausted) => counts.exhausted += 1,
                Some(Fate::Blocked) => counts.blocked += 1,
                Some(Fate::Merged) => counts.merged += 1,
                None => counts.alive += 1,
            }
            counts.cells += walker.trail().len();
        }
        counts
    }
}

/// Places walkers on a fresh grid and steps them until all are dead.
pub struct SimulationRunner {
    config: Config,
    rules: StepRules,
    grid: GridState,
    walkers: Vec<Walker>,
    scratch: StepScratch,
}

impl SimulationRunner {
    pub fn new(config: Config) -> Self {
        let grid = GridState::new(config.num_rows, config.num_columns);
        let rules = config.step_rules();
        Self {
            walkers: Vec::with_capacity(config.num_walkers as usize),
            config,
            rules,
            grid,
            scratch: StepScratch::new(),
        }
    }

    #[cfg(test)]
    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    /// Spawn and run to completion.
    pub fn run(mut self, rng: &mut fastrand::Rng) -> SimOutput {
        self.spawn_walkers(rng);
        let (rounds, hit_round_limit) = self.run_rounds(rng);

        let fates = FateCounts::tally(self.walkers());
        if hit_round_limit {
            log::warn!(
                "Simulation stopped at the {MAX_ROUNDS}-round limit with {} walkers still alive",
                fates.alive
            );
        }
        log::debug!(
            "Fates: {} exhausted, {} blocked, {} merged over {} cells",
            fates.exhausted,
            fates.blocked,
            fates.merged,
            fates.cells
        );

        SimOutput {
            paths: self.walkers.into_iter().map(Walker::into_path).collect(),
            requested: self.config.num_walkers,
            rounds,
            hit_round_limit,
            fates,
        }
    }

    /// Place up to `num_walkers` walkers, honouring both separation rules.
    pub fn spawn_walkers(&mut self, rng: &mut fastrand::Rng) {
        for slot in 0..self.config.num_walkers {
            let start = (0..SPAWN_ATTEMPTS)
                .map(|_| self.random_cell(rng))
                .find(|&cell| self.is_valid_start(cell));

            match start {
                Some(cell) => {
                    let walker = Walker::spawn(cell, self.config.walker_age, &mut self.grid);
                    self.walkers.push(walker);
                }
                None => log::debug!(
                    "No start cell for walker slot {slot} after {SPAWN_ATTEMPTS} attempts"
                ),
            }
        }
    }

    fn random_cell(&self, rng: &mut fastrand::Rng) -> Cell {
        Cell::new(
            rng.u32(0..self.grid.num_rows()),
            rng.u32(0..self.grid.num_columns()),
        )
    }

    fn is_valid_start(&self, cell: Cell) -> bool {
        // Distances to the centre are doubled, so double the threshold too.
        let far_from_center =
            self.grid.center_distance_x2(cell) > self.config.walker_center_separation.saturating_mul(2);
        far_from_center
            && !self.grid.is_occupied(cell)
            && self
                .walkers
                .iter()
                .all(|w| cell.taxicab(w.start()) >= self.config.walker_separation)
    }

    /// Step all living walkers once per round. Returns (rounds, hit_limit).
    pub fn run_rounds(&mut self, rng: &mut fastrand::Rng) -> (u32, bool) {
        let mut rounds = 0;
        while rounds < MAX_ROUNDS {
            if self.walkers.iter().all(Walker::is_dead) {
                return (rounds, false);
            }
            rounds += 1;
            for walker in self.walkers.iter_mut().filter(|w| !w.is_dead()) {
                walker.step(&mut self.grid, &self.rules, rng, &mut self.scratch);
            }
        }
        let done = self.walkers.iter().all(Walker::is_dead);
        (rounds, !done)
    }
}

/// Run one simulation with a freshly seeded RNG.
pub fn simulate(config: Config) -> SimOutput {
    let mut rng = fastrand::Rng::new();
    SimulationRunner::new(config).run(&mut rng)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::grid::Tag;

    fn small_config() -> Config {
        Config {
            num_rows: 20,
            num_columns: 30,
            num_walkers: 12,
            walker_age: 60,
            walker_separation: 2,
            walker_center_separation: 3,
            center_attraction: 0.4,
            ..Config::default()
        }
    }

    fn run_seeded(config: Config, seed: u64) -> SimOutput {
        let mut rng = fastrand::Rng::with_seed(seed);
        SimulationRunner::new(config).run(&mut rng)
    }

    fn flanks(a: Cell, b: Cell) -> Option<(Cell, Cell)> {
        if a.row == b.row || a.column == b.column {
            return None;
        }
        Some((Cell::new(b.row, a.column), Cell::new(a.row, b.column)))
    }

    #[test]
    fn centre_walker_takes_one_step_with_age_one() {
        let config = Config {
            num_rows: 3,
            num_columns: 3,
            walker_age: 1,
            center_attraction: 0.0,
            ..Config::default()
        };
        let mut runner = SimulationRunner::new(config);
        runner
            .walkers
            .push(Walker::spawn(Cell::new(1, 1), 1, &mut runner.grid));

        let mut rng = fastrand::Rng::with_seed(1);
        let (rounds, hit_limit) = runner.run_rounds(&mut rng);

        assert_eq!(rounds, 1);
        assert!(!hit_limit);
        let walker = &runner.walkers()[0];
        assert_eq!(walker.trail().len(), 2);
        assert!(walker.is_dead());
        assert_eq!(walker.fate(), Some(Fate::Exhausted));
    }

    #[test]
    fn unsatisfiable_separation_spawns_at_most_one() {
        let config = Config {
            num_rows: 5,
            num_columns: 5,
            num_walkers: 2,
            walker_separation: 10,
            walker_center_separation: 0,
            ..Config::default()
        };
        for seed in 0..50 {
            let output = run_seeded(config.clone(), seed);
            assert!(output.paths.len() <= 1, "seed {seed} spawned {}", output.paths.len());
            assert_eq!(output.requested, 2);
        }
    }

    #[test]
    fn centre_separation_keeps_starts_away_from_centre() {
        let config = small_config();
        let output = run_seeded(config.clone(), 3);
        let grid = GridState::new(config.num_rows, config.num_columns);
        for path in &output.paths {
            assert!(grid.center_distance_x2(path.cells[0]) > 2 * config.walker_center_separation);
        }
    }

    #[test]
    fn start_cells_respect_walker_separation() {
        let config = small_config();
        for seed in 0..10 {
            let output = run_seeded(config.clone(), seed);
            let starts: Vec<Cell> = output.paths.iter().map(|p| p.cells[0]).collect();
            for (i, a) in starts.iter().enumerate() {
                for b in &starts[i + 1..] {
                    assert!(a.taxicab(*b) >= config.walker_separation);
                }
            }
        }
    }

    #[test]
    fn impossible_centre_separation_spawns_nothing() {
        let config = Config {
            num_rows: 4,
            num_columns: 4,
            walker_center_separation: 100,
            ..Config::default()
        };
        let output = run_seeded(config, 8);
        assert!(output.paths.is_empty());
        assert_eq!(output.rounds, 0);
        assert!(!output.hit_round_limit);
    }

    #[test]
    fn trails_are_king_move_adjacent_and_age_bounded() {
        let config = small_config();
        for seed in 0..20 {
            let output = run_seeded(config.clone(), seed);
            assert!(!output.hit_round_limit);
            assert!(output.rounds <= config.walker_age);
            for path in &output.paths {
                assert!(path.cells.len() <= config.walker_age as usize + 1);
                assert!(path.fate.is_some());
                for pair in path.cells.windows(2) {
                    assert!(pair[0].is_adjacent(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
                }
            }
        }
    }

    #[test]
    fn cells_are_shared_only_by_merges() {
        let config = Config {
            num_walkers: 25,
            walker_separation: 0,
            ..small_config()
        };
        for seed in 0..20 {
            let output = run_seeded(config.clone(), seed);
            let mut owners: HashMap<Cell, usize> = HashMap::new();
            for path in &output.paths {
                for &cell in &path.cells {
                    *owners.entry(cell).or_default() += 1;
                }
            }
            for (cell, count) in owners {
                if count == 1 {
                    continue;
                }
                let merged_tips = output
                    .paths
                    .iter()
                    .filter(|p| p.fate == Some(Fate::Merged) && p.cells.last() == Some(&cell))
                    .count();
                assert_eq!(count, merged_tips + 1, "cell {cell:?} shared without a merge");
            }
        }
    }

    /// Number of diagonal segments whose two flank cells are joined by another segment.
    fn count_x_crossings(output: &SimOutput) -> usize {
        let mut diagonals = Vec::new();
        for path in &output.paths {
            for pair in path.cells.windows(2) {
                if let Some(f) = flanks(pair[0], pair[1]) {
                    diagonals.push(f);
                }
            }
        }
        let segments: Vec<(Cell, Cell)> = output
            .paths
            .iter()
            .flat_map(|p| p.cells.windows(2).map(|w| (w[0], w[1])))
            .collect();
        diagonals
            .iter()
            .filter(|&&(f1, f2)| {
                segments
                    .iter()
                    .any(|&(c, d)| (c == f1 && d == f2) || (c == f2 && d == f1))
            })
            .count()
    }

    #[test]
    fn no_x_crossings_when_crossing_is_disallowed() {
        let config = Config {
            num_walkers: 20,
            walker_separation: 0,
            allow_cross_paths: false,
            allow_path_ends_merge: false,
            ..small_config()
        };
        for seed in 0..20 {
            let output = run_seeded(config.clone(), seed);
            assert_eq!(count_x_crossings(&output), 0, "seed {seed}");
        }
    }

    #[test]
    fn no_x_crossings_with_merging_on() {
        // Dense grid so walkers get boxed in and fall back to merging.
        let config = Config {
            num_rows: 8,
            num_columns: 8,
            num_walkers: 30,
            walker_separation: 0,
            walker_center_separation: 0,
            walker_age: 40,
            center_attraction: 0.0,
            allow_cross_paths: false,
            allow_path_ends_merge: true,
            ..Config::default()
        };
        let mut merges = 0;
        for seed in 0..500 {
            let output = run_seeded(config.clone(), seed);
            assert_eq!(count_x_crossings(&output), 0, "seed {seed}");
            merges += output.fates.merged;
        }
        assert!(merges > 0, "no run exercised the merge fallback");
    }

    #[test]
    fn merging_walker_ends_on_a_tip() {
        // Dense grid with many walkers: merges should happen and always land
        // on a cell that belongs to another trail.
        let config = Config {
            num_rows: 8,
            num_columns: 8,
            num_walkers: 30,
            walker_separation: 0,
            walker_center_separation: 0,
            walker_age: 40,
            center_attraction: 0.0,
            ..Config::default()
        };
        for seed in 0..30 {
            let output = run_seeded(config.clone(), seed);
            for (i, path) in output.paths.iter().enumerate() {
                if path.fate != Some(Fate::Merged) {
                    continue;
                }
                let tip = *path.cells.last().unwrap();
                let elsewhere = output
                    .paths
                    .iter()
                    .enumerate()
                    .any(|(j, other)| j != i && other.cells.contains(&tip));
                assert!(elsewhere);
            }
        }
    }

    #[test]
    fn grid_marks_every_trail_cell() {
        let mut rng = fastrand::Rng::with_seed(12);
        let mut runner = SimulationRunner::new(small_config());
        runner.spawn_walkers(&mut rng);
        runner.run_rounds(&mut rng);
        for walker in runner.walkers() {
            for &cell in walker.trail() {
                assert!(runner.grid().is_occupied(cell));
            }
            if walker.trail().len() > 1 {
                assert_ne!(runner.grid().get(walker.start()), Some(Tag::Start));
            }
        }
    }

    #[test]
    fn round_limit_stops_a_walker_that_outlives_it() {
        // One row: full attraction walks towards the centre and then straight
        // on, with at least 1050 free cells ahead wherever it starts.
        let config = Config {
            num_rows: 1,
            num_columns: 2100,
            num_walkers: 1,
            walker_center_separation: 0,
            walker_age: 5000,
            center_attraction: 1.0,
            ..Config::default()
        };
        for seed in 0..5 {
            let output = run_seeded(config.clone(), seed);
            assert_eq!(output.paths.len(), 1);
            assert_eq!(output.rounds, MAX_ROUNDS);
            assert!(output.hit_round_limit);
            assert_eq!(output.paths[0].fate, None);
            assert_eq!(output.paths[0].cells.len(), MAX_ROUNDS as usize + 1);
            assert_eq!(output.fates.alive, 1);
        }
    }

    #[test]
    fn fate_counts_cover_every_walker() {
        for seed in 0..10 {
            let output = run_seeded(small_config(), seed);
            let f = output.fates;
            assert_eq!(f.exhausted + f.blocked + f.merged + f.alive, output.paths.len());
            assert_eq!(f.cells, output.paths.iter().map(|p| p.cells.len()).sum::<usize>());
            let merged = output
                .paths
                .iter()
                .filter(|p| p.fate == Some(Fate::Merged))
                .count();
            assert_eq!(f.merged, merged);
        }
    }

    #[test]
    fn huge_centre_separation_does_not_overflow() {
        let config = Config {
            num_rows: 4,
            num_columns: 4,
            walker_center_separation: u32::MAX,
            ..Config::default()
        };
        let output = run_seeded(config, 2);
        assert!(output.paths.is_empty());
    }

    #[test]
    fn simulate_uses_fresh_rng() {
        let output = simulate(small_config());
        assert_eq!(output.requested, 12);
        assert!(output.paths.len() <= 12);
    }
}
