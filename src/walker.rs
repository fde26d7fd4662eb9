use crate::grid::{Cell, GridState, Tag};

/// The part of the config the stepping rule needs.
#[derive(Debug, Clone, Copy)]
pub struct StepRules {
    pub allow_cross_paths: bool,
    pub allow_path_ends_merge: bool,
    /// Probability in [0, 1] of taking the candidate nearest the grid centre.
    pub center_attraction: f32,
}

/// Why a walker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    /// Age ran out.
    Exhausted,
    /// No free neighbour and nothing to merge into.
    Blocked,
    /// Final step joined another trail's tip.
    Merged,
}

/// Result of one call to [`Walker::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Moved(Cell),
    Merged(Cell),
    Blocked,
    /// Walker was already dead; nothing happened.
    Dead,
}

/// Reusable buffers so stepping does not allocate per call.
pub struct StepScratch {
    neighbours: Vec<Cell>,
    candidates: Vec<Cell>,
}

impl StepScratch {
    pub fn new() -> Self {
        Self {
            neighbours: Vec::with_capacity(8),
            candidates: Vec::with_capacity(8),
        }
    }
}

/// One random walker. Identity is its spawn index in the runner.
#[derive(Debug, Clone)]
pub struct Walker {
    start: Cell,
    current: Option<Cell>,
    age: u32,
    trail: Vec<Cell>,
    fate: Option<Fate>,
}

impl Walker {
    /// Place a walker on `start` and claim the cell.
    pub fn spawn(start: Cell, age: u32, grid: &mut GridState) -> Self {
        grid.set(start, Tag::Start);
        let mut trail = Vec::with_capacity(age.min(1024) as usize + 1);
        trail.push(start);
        Self {
            start,
            current: Some(start),
            age,
            trail,
            fate: None,
        }
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<Cell> {
        self.current
    }

    #[cfg(test)]
    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn trail(&self) -> &[Cell] {
        &self.trail
    }

    pub fn fate(&self) -> Option<Fate> {
        self.fate
    }

    pub fn is_dead(&self) -> bool {
        self.fate.is_some()
    }

    /// Advance one step under the occupancy, crossing and merge rules.
    pub fn step(
        &mut self,
        grid: &mut GridState,
        rules: &StepRules,
        rng: &mut fastrand::Rng,
        scratch: &mut StepScratch,
    ) -> StepOutcome {
        let Some(from) = self.current else {
            return StepOutcome::Dead;
        };

        grid.neighbours(from, &mut scratch.neighbours);

        scratch.candidates.clear();
        scratch.candidates.extend(scratch.neighbours.iter().copied().filter(|&cell| {
            !grid.is_occupied(cell) && (rules.allow_cross_paths || !grid.crosses(from, cell))
        }));

        let mut merged = false;
        let next = if !scratch.candidates.is_empty() {
            Some(choose_candidate(grid, &scratch.candidates, rules, rng))
        } else if rules.allow_path_ends_merge {
            merged = true;
            scratch
                .neighbours
                .iter()
                .copied()
                .find(|&cell| {
                    grid.get(cell) == Some(Tag::End)
                        && (rules.allow_cross_paths || !grid.crosses(from, cell))
                })
        } else {
            None
        };

        let Some(next) = next else {
            self.die(Fate::Blocked);
            return StepOutcome::Blocked;
        };

        debug_assert!(from.is_adjacent(next));
        grid.set(from, Tag::Path);
        grid.set(next, Tag::End);
        self.trail.push(next);
        self.current = Some(next);
        self.age = self.age.saturating_sub(1);

        if merged {
            // A merge is always the last step; the walker never continues from a foreign tip.
            self.die(Fate::Merged);
            return StepOutcome::Merged(next);
        }
        if self.age == 0 {
            self.die(Fate::Exhausted);
        }
        StepOutcome::Moved(next)
    }

    fn die(&mut self, fate: Fate) {
        self.fate = Some(fate);
        self.current = None;
    }

    /// Consume the walker into its read-only output form.
    pub fn into_path(self) -> WalkerPath {
        WalkerPath {
            cells: self.trail,
            fate: self.fate,
        }
    }
}

/// Pick the next cell from a non-empty candidate list.
fn choose_candidate(
    grid: &GridState,
    candidates: &[Cell],
    rules: &StepRules,
    rng: &mut fastrand::Rng,
) -> Cell {
    let roll = rng.f32();
    if roll < rules.center_attraction {
        // Strict less-than keeps the first of equally close candidates.
        let mut best = candidates[0];
        let mut best_dist = grid.center_distance_x2(best);
        for &cell in &candidates[1..] {
            let dist = grid.center_distance_x2(cell);
            if dist < best_dist {
                best = cell;
                best_dist = dist;
            }
        }
        best
    } else {
        candidates[rng.usize(0..candidates.len())]
    }
}

/// The finished trail of one walker, oldest cell first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerPath {
    pub cells: Vec<Cell>,
    /// `None` only if the run hit its round limit with the walker still alive.
    pub fate: Option<Fate>,
}
