use std::collections::VecDeque;
use std::time::Duration;

use glam::Vec2;
use instant::Instant;

use crate::config::Config;
use crate::grid::Cell;
use crate::sim::SimOutput;
use crate::walker::WalkerPath;

/// Drawing primitives the scheduler needs from whatever it paints on.
pub trait Surface {
    /// Clear everything to a solid colour.
    fn fill_background(&mut self, color: [u8; 3]);
    /// Outline every grid square.
    fn stroke_grid(&mut self, rows: u32, columns: u32, square: f32, color: [u8; 3]);
    fn set_fill_color(&mut self, color: [u8; 3]);
    fn set_stroke(&mut self, color: [u8; 3], width: f32);
    fn fill_circle(&mut self, center: Vec2, radius: f32);
    fn begin_path(&mut self);
    fn move_to(&mut self, point: Vec2);
    fn line_to(&mut self, point: Vec2);
    fn stroke(&mut self);
}

/// One atomic drawing step. Playback executes at most one per repaint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawOp {
    /// Filled start marker. Also opens a fresh path.
    Dot { center: Vec2, radius: f32 },
    MoveTo(Vec2),
    LineTo(Vec2),
    Stroke,
}

impl DrawOp {
    pub fn apply(self, surface: &mut dyn Surface) {
        match self {
            DrawOp::Dot { center, radius } => {
                surface.begin_path();
                surface.fill_circle(center, radius);
                surface.begin_path();
            }
            DrawOp::MoveTo(p) => surface.move_to(p),
            DrawOp::LineTo(p) => surface.line_to(p),
            DrawOp::Stroke => surface.stroke(),
        }
    }
}

/// Everything playback needs from the config snapshot of its run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStyle {
    pub square: f32,
    pub rows: u32,
    pub columns: u32,
    pub show_grid: bool,
    pub grid_color: [u8; 3],
    pub background_color: [u8; 3],
    pub dot_color: [u8; 3],
    pub line_color: [u8; 3],
    pub line_width: f32,
    /// Start marker radius in pixels.
    pub dot_radius: f32,
}

impl PlaybackStyle {
    pub fn from_config(config: &Config) -> Self {
        Self {
            square: config.grid_square_size,
            rows: config.num_rows,
            columns: config.num_columns,
            show_grid: config.show_grid,
            grid_color: config.grid_color,
            background_color: config.background_color,
            dot_color: config.walker_dot_color,
            line_color: config.walker_line_color,
            line_width: config.walker_line_width,
            dot_radius: config.grid_square_size / 2.0 * config.walker_start_size,
        }
    }

    /// Pixel centre of a grid cell.
    pub fn cell_center(&self, cell: Cell) -> Vec2 {
        Vec2::new(
            cell.column as f32 * self.square + self.square / 2.0,
            cell.row as f32 * self.square + self.square / 2.0,
        )
    }
}

/// Turn one walker's trail into its ordered draw queue.
///
/// Start marker, then a segment to each following cell with a stroke after
/// every segment so the line grows one cell at a time.
pub fn build_ops(path: &WalkerPath, style: &PlaybackStyle) -> VecDeque<DrawOp> {
    let mut ops = VecDeque::with_capacity(path.cells.len() * 2 + 2);
    let Some(&first) = path.cells.first() else {
        return ops;
    };

    let start = style.cell_center(first);
    ops.push_back(DrawOp::Dot {
        center: start,
        radius: style.dot_radius,
    });
    ops.push_back(DrawOp::MoveTo(start));
    for &cell in &path.cells[1..] {
        ops.push_back(DrawOp::LineTo(style.cell_center(cell)));
        ops.push_back(DrawOp::Stroke);
    }
    ops
}

/// What a call to [`PlaybackScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Nothing loaded.
    Idle,
    /// Interval not yet elapsed; nothing drawn this cycle.
    Waiting,
    /// One operation executed.
    Drew,
    /// The walker at this spawn index has been fully drawn.
    WalkerDone(usize),
    /// Last walker finished. Reported once.
    Finished,
}

/// Replays walker paths one operation per repaint cycle.
///
/// Walkers are drawn strictly in spawn order; the next walker's queue is only
/// built once the previous one has drained. Nothing here blocks: the host
/// calls [`tick`](Self::tick) from its redraw handler and gets control back
/// immediately.
pub struct PlaybackScheduler {
    interval: Duration,
    style: Option<PlaybackStyle>,
    pending: VecDeque<WalkerPath>,
    queue: VecDeque<DrawOp>,
    /// Spawn index of the walker whose queue is loaded.
    current: Option<usize>,
    walkers_done: usize,
    walkers_total: usize,
    last_op: Option<Instant>,
    ops_executed: u64,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackScheduler {
    /// An idle scheduler. Each run brings its own interval to [`start`](Self::start).
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            style: None,
            pending: VecDeque::new(),
            queue: VecDeque::new(),
            current: None,
            walkers_done: 0,
            walkers_total: 0,
            last_op: None,
            ops_executed: 0,
        }
    }

    /// Load a run for playback. Any playback in flight is discarded.
    pub fn start(&mut self, output: SimOutput, style: PlaybackStyle, interval: Duration) {
        if self.is_active() {
            log::info!(
                "Restarting playback ({}/{} walkers drawn)",
                self.walkers_done,
                self.walkers_total
            );
        }
        self.cancel();
        self.interval = interval;
        self.walkers_total = output.paths.len();
        self.pending = output.paths.into();
        self.style = Some(style);
        log::info!(
            "Playback started: {} walkers, {}ms interval",
            self.walkers_total,
            interval.as_millis()
        );
    }

    /// Drop everything pending. The surface keeps whatever was already drawn.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.queue.clear();
        self.current = None;
        self.style = None;
        self.walkers_done = 0;
        self.walkers_total = 0;
        self.last_op = None;
    }

    /// Paint the background, optional grid and set colours for the loaded run.
    pub fn prepare(&self, surface: &mut dyn Surface) {
        let Some(style) = &self.style else {
            return;
        };
        surface.fill_background(style.background_color);
        if style.show_grid {
            surface.stroke_grid(style.rows, style.columns, style.square, style.grid_color);
        }
        surface.set_fill_color(style.dot_color);
        surface.set_stroke(style.line_color, style.line_width);
    }

    pub fn is_active(&self) -> bool {
        self.style.is_some()
    }

    pub fn walkers_done(&self) -> usize {
        self.walkers_done
    }

    pub fn walkers_total(&self) -> usize {
        self.walkers_total
    }

    pub fn ops_executed(&self) -> u64 {
        self.ops_executed
    }

    /// Run one repaint cycle: execute at most one operation if the interval has passed.
    pub fn tick(&mut self, now: Instant, surface: &mut dyn Surface) -> PlaybackStatus {
        let Some(style) = &self.style else {
            return PlaybackStatus::Idle;
        };

        if self.current.is_none() {
            match self.pending.pop_front() {
                Some(path) => {
                    self.queue = build_ops(&path, style);
                    self.current = Some(self.walkers_done);
                }
                None => {
                    log::info!("Playback finished: {} walkers drawn", self.walkers_done);
                    self.style = None;
                    return PlaybackStatus::Finished;
                }
            }
        }

        if let Some(last) = self.last_op {
            if now.saturating_duration_since(last) < self.interval {
                return PlaybackStatus::Waiting;
            }
        }

        if let Some(op) = self.queue.pop_front() {
            op.apply(surface);
            self.ops_executed += 1;
            self.last_op = Some(now);
        }

        if self.queue.is_empty() {
            let index = self.current.take().unwrap_or(self.walkers_done);
            self.walkers_done += 1;
            log::debug!("Walker {index} drawn");
            return PlaybackStatus::WalkerDone(index);
        }
        PlaybackStatus::Drew
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::FateCounts;
    use crate::walker::Fate;

    /// Records every call as a string for easy assertions.
    #[derive(Default)]
    struct RecordingSurface {
        calls: Vec<String>,
    }

    impl Surface for RecordingSurface {
        fn fill_background(&mut self, color: [u8; 3]) {
            self.calls.push(format!("background {color:?}"));
        }
        fn stroke_grid(&mut self, rows: u32, columns: u32, _square: f32, _color: [u8; 3]) {
            self.calls.push(format!("grid {rows}x{columns}"));
        }
        fn set_fill_color(&mut self, _color: [u8; 3]) {
            self.calls.push("fill_color".into());
        }
        fn set_stroke(&mut self, _color: [u8; 3], width: f32) {
            self.calls.push(format!("stroke_style {width}"));
        }
        fn fill_circle(&mut self, center: Vec2, radius: f32) {
            self.calls.push(format!("circle {} {} r{}", center.x, center.y, radius));
        }
        fn begin_path(&mut self) {
            self.calls.push("begin".into());
        }
        fn move_to(&mut self, p: Vec2) {
            self.calls.push(format!("move {} {}", p.x, p.y));
        }
        fn line_to(&mut self, p: Vec2) {
            self.calls.push(format!("line {} {}", p.x, p.y));
        }
        fn stroke(&mut self) {
            self.calls.push("stroke".into());
        }
    }

    fn style() -> PlaybackStyle {
        PlaybackStyle::from_config(&Config {
            grid_square_size: 10.0,
            walker_start_size: 0.5,
            ..Config::default()
        })
    }

    fn path(cells: &[(u32, u32)]) -> WalkerPath {
        WalkerPath {
            cells: cells.iter().map(|&(r, c)| Cell::new(r, c)).collect(),
            fate: Some(Fate::Exhausted),
        }
    }

    fn output(paths: Vec<WalkerPath>) -> SimOutput {
        SimOutput {
            requested: paths.len() as u32,
            paths,
            rounds: 3,
            hit_round_limit: false,
            fates: FateCounts::default(),
        }
    }

    /// Tick until finished, advancing the clock by `step` each cycle.
    fn drain(
        scheduler: &mut PlaybackScheduler,
        surface: &mut RecordingSurface,
        step: Duration,
    ) -> Vec<PlaybackStatus> {
        let mut now = Instant::now();
        let mut statuses = Vec::new();
        for _ in 0..10_000 {
            let status = scheduler.tick(now, surface);
            statuses.push(status);
            if status == PlaybackStatus::Finished {
                return statuses;
            }
            now += step;
        }
        panic!("playback never finished");
    }

    #[test]
    fn ops_for_a_trail() {
        let ops = build_ops(&path(&[(0, 0), (0, 1), (1, 2)]), &style());
        assert_eq!(
            ops,
            VecDeque::from(vec![
                DrawOp::Dot {
                    center: Vec2::new(5.0, 5.0),
                    radius: 2.5
                },
                DrawOp::MoveTo(Vec2::new(5.0, 5.0)),
                DrawOp::LineTo(Vec2::new(15.0, 5.0)),
                DrawOp::Stroke,
                DrawOp::LineTo(Vec2::new(25.0, 15.0)),
                DrawOp::Stroke,
            ])
        );
    }

    #[test]
    fn empty_trail_has_no_ops() {
        assert!(build_ops(&path(&[]), &style()).is_empty());
    }

    #[test]
    fn idle_until_started() {
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        assert_eq!(scheduler.tick(Instant::now(), &mut surface), PlaybackStatus::Idle);
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn one_op_per_interval() {
        let interval = Duration::from_millis(20);
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.start(output(vec![path(&[(0, 0), (0, 1)])]), style(), interval);

        let t0 = Instant::now();
        assert_eq!(scheduler.tick(t0, &mut surface), PlaybackStatus::Drew);
        assert_eq!(scheduler.ops_executed(), 1);

        // Too early: nothing happens.
        let early = t0 + Duration::from_millis(5);
        assert_eq!(scheduler.tick(early, &mut surface), PlaybackStatus::Waiting);
        assert_eq!(scheduler.ops_executed(), 1);

        let t1 = t0 + interval;
        assert_eq!(scheduler.tick(t1, &mut surface), PlaybackStatus::Drew);
        assert_eq!(scheduler.ops_executed(), 2);
    }

    #[test]
    fn walkers_are_drawn_in_order_one_at_a_time() {
        let interval = Duration::from_millis(20);
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.start(
            output(vec![path(&[(0, 0), (0, 1)]), path(&[(2, 2)])]),
            style(),
            interval,
        );

        let statuses = drain(&mut scheduler, &mut surface, interval);
        let done: Vec<_> = statuses
            .iter()
            .filter_map(|s| match s {
                PlaybackStatus::WalkerDone(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(done, vec![0, 1]);
        assert_eq!(scheduler.walkers_done(), 2);
        assert!(!scheduler.is_active());

        // Second walker's marker comes after the first walker's last stroke.
        let first_stroke = surface.calls.iter().rposition(|c| c == "stroke").unwrap();
        let second_dot = surface.calls.iter().position(|c| c.starts_with("circle 25")).unwrap();
        assert!(second_dot > first_stroke);

        assert_eq!(scheduler.tick(Instant::now(), &mut surface), PlaybackStatus::Idle);
    }

    #[test]
    fn zero_interval_draws_every_cycle() {
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.start(output(vec![path(&[(0, 0), (1, 1), (2, 2)])]), style(), Duration::ZERO);

        let now = Instant::now();
        let mut drawn = 0;
        while scheduler.tick(now, &mut surface) != PlaybackStatus::Finished {
            drawn += 1;
        }
        // Dot, move, 2 x (line, stroke).
        assert_eq!(scheduler.ops_executed(), 6);
        assert_eq!(drawn, 6);
    }

    #[test]
    fn each_run_uses_its_own_interval() {
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        let slow = Duration::from_millis(50);
        scheduler.start(output(vec![path(&[(0, 0), (0, 1)])]), style(), slow);

        let t0 = Instant::now();
        assert_eq!(scheduler.tick(t0, &mut surface), PlaybackStatus::Drew);
        assert_eq!(
            scheduler.tick(t0 + Duration::from_millis(10), &mut surface),
            PlaybackStatus::Waiting
        );

        // Restarting with no interval draws on every cycle.
        scheduler.start(output(vec![path(&[(0, 0), (0, 1)])]), style(), Duration::ZERO);
        assert_eq!(scheduler.tick(t0, &mut surface), PlaybackStatus::Drew);
        assert_eq!(scheduler.tick(t0, &mut surface), PlaybackStatus::Drew);
    }

    #[test]
    fn cancel_discards_pending_work() {
        let interval = Duration::from_millis(20);
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.start(output(vec![path(&[(0, 0), (0, 1), (0, 2)])]), style(), interval);

        let now = Instant::now();
        scheduler.tick(now, &mut surface);
        scheduler.cancel();

        assert!(!scheduler.is_active());
        assert_eq!(scheduler.walkers_total(), 0);
        let calls = surface.calls.len();
        assert_eq!(
            scheduler.tick(now + interval * 10, &mut surface),
            PlaybackStatus::Idle
        );
        assert_eq!(surface.calls.len(), calls);
    }

    #[test]
    fn restart_replaces_the_run() {
        let interval = Duration::from_millis(1);
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.start(
            output(vec![path(&[(0, 0), (0, 1)]), path(&[(3, 3), (3, 4)])]),
            style(),
            interval,
        );
        scheduler.tick(Instant::now(), &mut surface);

        scheduler.start(output(vec![path(&[(5, 5)])]), style(), interval);
        assert_eq!(scheduler.walkers_total(), 1);
        assert_eq!(scheduler.walkers_done(), 0);

        let statuses = drain(&mut scheduler, &mut surface, interval);
        assert!(statuses.contains(&PlaybackStatus::WalkerDone(0)));
        assert!(!surface.calls.iter().any(|c| c.starts_with("circle 35")));
        assert!(surface.calls.iter().any(|c| c.starts_with("circle 55")));
    }

    #[test]
    fn prepare_paints_background_and_grid() {
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.prepare(&mut surface);
        assert!(surface.calls.is_empty());

        scheduler.start(output(vec![]), style(), Duration::ZERO);
        scheduler.prepare(&mut surface);
        assert_eq!(surface.calls[0], "background [17, 17, 17]");
        assert_eq!(surface.calls[1], "grid 12x25");
        assert_eq!(surface.calls[3], "stroke_style 1");

        let mut hidden = style();
        hidden.show_grid = false;
        let mut surface = RecordingSurface::default();
        scheduler.start(output(vec![]), hidden, Duration::ZERO);
        scheduler.prepare(&mut surface);
        assert!(!surface.calls.iter().any(|c| c.starts_with("grid")));
    }

    #[test]
    fn empty_run_finishes_immediately() {
        let mut scheduler = PlaybackScheduler::new();
        let mut surface = RecordingSurface::default();
        scheduler.start(output(vec![]), style(), Duration::ZERO);
        assert_eq!(scheduler.tick(Instant::now(), &mut surface), PlaybackStatus::Finished);
        assert_eq!(scheduler.tick(Instant::now(), &mut surface), PlaybackStatus::Idle);
    }
}
