use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use instant::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::config::Config;
use crate::export;
use crate::panel::{ControlPanel, PanelAction, PANEL_WIDTH};
use crate::playback::{PlaybackScheduler, PlaybackStatus, PlaybackStyle};
use crate::render::canvas::Canvas;
use crate::render::GpuState;
use crate::worker::{SimResult, SimWorker};

/// How often to log FPS (seconds).
const FPS_LOG_INTERVAL: f64 = 5.0;
/// The panel needs this much height to be usable.
const MIN_WINDOW_HEIGHT: f32 = 560.0;
/// Capture names carry a random session number up to this.
const MAX_CAPTURE_SESSION: u32 = 1000;
/// Captures are numbered from one within a session.
const FIRST_CAPTURE_INDEX: u32 = 1;

// ---------------------------------------------------------------------------
// Frame timing
// ---------------------------------------------------------------------------

struct FrameStats {
    frame_count: u64,
    last_log_time: Instant,
    frame_time_sum: f64,
    frame_time_min: f64,
    frame_time_max: f64,
    frames_since_log: u32,
    /// Smoothed, for display.
    fps: f64,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            frame_count: 0,
            last_log_time: Instant::now(),
            frame_time_sum: 0.0,
            frame_time_min: f64::MAX,
            frame_time_max: 0.0,
            frames_since_log: 0,
            fps: 0.0,
        }
    }

    fn record_frame(&mut self, dt: f64) {
        self.frame_count += 1;
        self.frames_since_log += 1;
        self.frame_time_sum += dt;
        self.frame_time_min = self.frame_time_min.min(dt);
        self.frame_time_max = self.frame_time_max.max(dt);
        if dt > 0.0 {
            self.fps = if self.fps == 0.0 {
                1.0 / dt
            } else {
                self.fps * 0.95 + (1.0 / dt) * 0.05
            };
        }

        let elapsed = self.last_log_time.elapsed().as_secs_f64();
        if elapsed >= FPS_LOG_INTERVAL {
            let avg_ms = (self.frame_time_sum / self.frames_since_log as f64) * 1000.0;
            let fps = self.frames_since_log as f64 / elapsed;
            log::debug!(
                "FPS: {:.0} | avg: {:.2}ms | min: {:.2}ms | max: {:.2}ms | total frames: {}",
                fps,
                avg_ms,
                self.frame_time_min * 1000.0,
                self.frame_time_max * 1000.0,
                self.frame_count,
            );
            self.last_log_time = Instant::now();
            self.frame_time_sum = 0.0;
            self.frame_time_min = f64::MAX;
            self.frame_time_max = 0.0;
            self.frames_since_log = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Window size for a canvas plus the side panel.
fn window_size_for(config: &Config) -> LogicalSize<f32> {
    let (w, h) = config.canvas_size();
    LogicalSize::new(w + PANEL_WIDTH, h.max(MIN_WINDOW_HEIGHT))
}

/// Top-level application state.
struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    panel: Option<ControlPanel>,

    /// Settings read at startup; the panel owns the live copy afterwards.
    initial_config: Option<Config>,
    settings_path: PathBuf,

    worker: SimWorker,
    playback: PlaybackScheduler,
    canvas: Canvas,

    // Capture naming
    capture_dir: PathBuf,
    session: u32,
    capture_index: u32,

    // Frame timing
    last_frame_time: Option<Instant>,
    frame_stats: FrameStats,
}

impl App {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let settings_path = Config::default_path();
        let config = Config::load_or_default(&settings_path);
        let (w, h) = config.canvas_size();

        Ok(Self {
            window: None,
            gpu: None,
            panel: None,
            initial_config: Some(config),
            settings_path,
            worker: SimWorker::spawn()?,
            playback: PlaybackScheduler::new(),
            canvas: Canvas::new(w, h),
            capture_dir: std::env::current_dir()?,
            session: fastrand::u32(0..=MAX_CAPTURE_SESSION),
            capture_index: FIRST_CAPTURE_INDEX,
            last_frame_time: None,
            frame_stats: FrameStats::new(),
        })
    }

    /// Validate the panel's parameters and start a new simulation.
    /// Playback in flight stops right away.
    fn request_update(&mut self) {
        let Some(panel) = &mut self.panel else {
            return;
        };
        let config = panel.config().clone();
        if let Err(e) = config.validate() {
            log::error!("Not starting simulation: {e}");
            panel.status.message = Some(e.to_string());
            return;
        }
        panel.status.message = None;
        panel.status.simulating = true;

        self.playback.cancel();
        let generation = self.worker.request(config.clone());
        log::info!(
            "Requested simulation {generation}: {}x{} grid, {} walkers",
            config.num_columns,
            config.num_rows,
            config.num_walkers
        );

        if let Some(window) = &self.window {
            let _ = window.request_inner_size(window_size_for(&config));
        }
    }

    /// Start playback for a finished run on a fresh canvas.
    fn on_sim_result(&mut self, result: SimResult) {
        debug_assert_eq!(result.generation, self.worker.latest_generation());
        let (w, h) = result.config.canvas_size();
        self.canvas.resize(w, h);

        if let Some(panel) = &mut self.panel {
            let status = &mut panel.status;
            status.simulating = false;
            status.spawned = result.output.paths.len();
            status.requested = result.output.requested;
            status.rounds = result.output.rounds;
            status.hit_round_limit = result.output.hit_round_limit;
            status.sim_ms = result.elapsed_ms;
            status.fates = result.output.fates;
        }

        let style = PlaybackStyle::from_config(&result.config);
        let interval = Duration::from_millis(result.config.step_interval_ms);
        self.playback.start(result.output, style, interval);
        self.playback.prepare(&mut self.canvas);
    }

    fn capture(&mut self) {
        let outcome = export::save_capture(
            &self.canvas,
            &self.capture_dir,
            self.session,
            self.capture_index,
        );
        let Some(panel) = &mut self.panel else {
            return;
        };
        match outcome {
            Ok(path) => {
                self.capture_index += 1;
                panel.status.last_capture = Some(path.display().to_string());
                panel.status.message = None;
            }
            Err(e) => {
                log::warn!("Capture failed: {e}");
                panel.status.message = Some(e.to_string());
            }
        }
    }

    fn handle_action(&mut self, action: PanelAction) {
        match action {
            PanelAction::Update => self.request_update(),
            PanelAction::Reset => {
                if let Some(panel) = &mut self.panel {
                    panel.reset();
                }
                self.request_update();
            }
            PanelAction::Capture => self.capture(),
        }
    }

    /// Advance playback, then draw the canvas and the panel.
    fn redraw(&mut self, now: Instant) {
        match self.playback.tick(now, &mut self.canvas) {
            PlaybackStatus::Finished => log::debug!("Playback idle"),
            PlaybackStatus::WalkerDone(index) => log::trace!("Walker {index} done"),
            _ => {}
        }

        let (Some(window), Some(gpu), Some(panel)) =
            (&self.window, &mut self.gpu, &mut self.panel)
        else {
            return;
        };

        panel.status.walkers_drawn = self.playback.walkers_done();
        panel.status.walkers_total = self.playback.walkers_total();
        panel.status.ops_drawn = self.playback.ops_executed();
        panel.status.fps = self.frame_stats.fps;

        gpu.update_canvas(&self.canvas);

        let Some(mut frame) = gpu.begin_frame() else {
            return;
        };

        gpu.draw_canvas(&mut frame.encoder, &frame.view, self.canvas.background());

        let (screen_w, screen_h) = (gpu.surface_config.width, gpu.surface_config.height);
        let (primitives, textures_delta, screen_descriptor) =
            panel.run_frame(window, screen_w, screen_h);
        let extra_cmd_bufs = panel.prepare_egui(
            &gpu.device,
            &gpu.queue,
            &mut frame.encoder,
            &primitives,
            &textures_delta,
            &screen_descriptor,
        );
        {
            let mut render_pass = GpuState::begin_egui_pass(&mut frame.encoder, &frame.view);
            panel.render_egui(&mut render_pass, &primitives, &screen_descriptor);
        }

        gpu.finish_frame(frame.encoder, frame.output, extra_cmd_bufs);
        panel.free_textures(&textures_delta);
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let Some(config) = self.initial_config.take() else {
            return;
        };

        let attrs = WindowAttributes::default()
            .with_title("gridwalk")
            .with_inner_size(window_size_for(&config))
            .with_min_inner_size(LogicalSize::new(PANEL_WIDTH * 2.0, MIN_WINDOW_HEIGHT));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let size = window.inner_size();
        log::info!(
            "Window created: {}x{} (scale {:.2})",
            size.width,
            size.height,
            window.scale_factor()
        );

        // Initialize wgpu + pipeline
        let gpu = GpuState::new(window.clone());
        log::info!("wgpu + canvas pipeline initialized");

        let panel = ControlPanel::new(&window, &gpu, config, self.settings_path.clone());
        self.gpu = Some(gpu);
        self.panel = Some(panel);
        self.window = Some(window);

        // Continuous loop so playback keeps its pace.
        event_loop.set_control_flow(ControlFlow::Poll);

        self.request_update();
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(result) = self.worker.poll() {
            self.on_sim_result(result);
        }
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let consumed = match (&self.window, &mut self.panel) {
            (Some(window), Some(panel)) => panel.on_window_event(window, &event),
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. }
                if !consumed
                    && event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                log::info!("ESC pressed, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.set_scale_factor(scale_factor as f32);
                }
            }
            WindowEvent::RedrawRequested => {
                // --- Timing ---
                let now = Instant::now();
                if let Some(last) = self.last_frame_time {
                    let dt = now.duration_since(last).as_secs_f64();
                    self.frame_stats.record_frame(dt);
                }
                self.last_frame_time = Some(now);

                self.redraw(now);

                let action = self.panel.as_mut().and_then(ControlPanel::take_action);
                if let Some(action) = action {
                    self.handle_action(action);
                }
            }
            _ => {}
        }
    }
}

/// Entry point: create event loop and run.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let event_loop = EventLoop::new()?;
    let mut app = App::new()?;
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_fits_canvas_and_panel() {
        let config = Config {
            grid_square_size: 20.0,
            num_columns: 40,
            num_rows: 40,
            ..Config::default()
        };
        let size = window_size_for(&config);
        assert_eq!(size.width, 800.0 + PANEL_WIDTH);
        assert_eq!(size.height, 800.0);
    }

    #[test]
    fn short_canvas_keeps_panel_height() {
        let size = window_size_for(&Config::default());
        assert_eq!(size.width, 500.0 + PANEL_WIDTH);
        assert_eq!(size.height, MIN_WINDOW_HEIGHT);
    }

    #[test]
    fn first_capture_is_numbered_one() {
        assert_eq!(
            export::capture_file_name(42, FIRST_CAPTURE_INDEX),
            "walker_42_1.png"
        );
    }

    #[test]
    fn frame_stats_smooth_fps() {
        let mut stats = FrameStats::new();
        stats.record_frame(1.0 / 60.0);
        assert!((stats.fps - 60.0).abs() < 1e-6);
        stats.record_frame(1.0 / 30.0);
        assert!(stats.fps < 60.0 && stats.fps > 30.0);
    }
}
