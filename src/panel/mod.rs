use std::path::PathBuf;

use winit::window::Window;

use crate::config::{
    Config, MAX_CENTER_SEPARATION, MAX_GRID_DIMENSION, MAX_GRID_SQUARE_SIZE, MAX_LINE_WIDTH,
    MAX_START_SIZE, MAX_STEP_INTERVAL_MS, MAX_WALKERS, MAX_WALKER_AGE, MAX_WALKER_SEPARATION,
};
use crate::render::GpuState;
use crate::sim::FateCounts;

/// Width of the control panel in logical pixels.
pub const PANEL_WIDTH: f32 = 280.0;

/// A button the user pressed this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAction {
    Update,
    Reset,
    Capture,
}

/// Read-only status shown under the controls. Filled in by the app.
#[derive(Debug, Clone, Default)]
pub struct PanelStatus {
    pub simulating: bool,
    pub spawned: usize,
    pub requested: u32,
    pub rounds: u32,
    pub hit_round_limit: bool,
    pub sim_ms: f64,
    pub fates: FateCounts,
    pub walkers_drawn: usize,
    pub walkers_total: usize,
    pub ops_drawn: u64,
    pub fps: f64,
    pub last_capture: Option<String>,
    /// Last error worth showing (invalid settings, failed capture).
    pub message: Option<String>,
}

impl PanelStatus {
    /// Status as display lines, top to bottom.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(6);
        if self.simulating {
            lines.push("Simulating...".to_string());
        }
        lines.push(format!(
            "Walkers: {}/{} spawned | {} rounds ({:.1}ms)",
            self.spawned, self.requested, self.rounds, self.sim_ms
        ));
        lines.push(format!(
            "Ended: {} aged | {} blocked | {} merged",
            self.fates.exhausted, self.fates.blocked, self.fates.merged
        ));
        if self.hit_round_limit {
            lines.push(format!("Round limit reached ({} alive)", self.fates.alive));
        }
        lines.push(format!(
            "Drawn: {}/{} ({} ops)",
            self.walkers_drawn, self.walkers_total, self.ops_drawn
        ));
        lines.push(format!("FPS: {:.0}", self.fps));
        if let Some(path) = &self.last_capture {
            lines.push(format!("Saved: {path}"));
        }
        lines
    }
}

/// Parameter editor powered by egui.
///
/// Owns the editable [`Config`]. Every edit is written to the settings file
/// so the next launch starts from the same parameters.
pub struct ControlPanel {
    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    pub egui_renderer: egui_wgpu::Renderer,

    config: Config,
    settings_path: PathBuf,
    pub status: PanelStatus,
    action: Option<PanelAction>,
}

impl ControlPanel {
    pub fn new(window: &Window, gpu: &GpuState, config: Config, settings_path: PathBuf) -> Self {
        let egui_ctx = egui::Context::default();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(gpu.device.limits().max_texture_dimension_2d as usize),
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            gpu.surface_config.format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: None,
                msaa_samples: 1,
                dithering: true,
                predictable_texture_filtering: false,
            },
        );

        Self {
            egui_ctx,
            egui_state,
            egui_renderer,
            config,
            settings_path,
            status: PanelStatus::default(),
            action: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Restore defaults and delete the settings file.
    pub fn reset(&mut self) {
        self.config = Config::default();
        if let Err(e) = Config::clear(&self.settings_path) {
            log::warn!("Could not remove {}: {e}", self.settings_path.display());
        }
        log::info!("Settings reset to defaults");
    }

    /// The button pressed during the last frame, if any.
    pub fn take_action(&mut self) -> Option<PanelAction> {
        self.action.take()
    }

    /// Forward a winit event to egui. Returns true if egui consumed it.
    pub fn on_window_event(
        &mut self,
        window: &Window,
        event: &winit::event::WindowEvent,
    ) -> bool {
        let response = self.egui_state.on_window_event(window, event);
        response.consumed
    }

    /// Run the egui frame and produce paint output.
    /// Returns (clipped_primitives, textures_delta, screen_descriptor).
    pub fn run_frame(
        &mut self,
        window: &Window,
        screen_w: u32,
        screen_h: u32,
    ) -> (
        Vec<egui::epaint::ClippedPrimitive>,
        egui::TexturesDelta,
        egui_wgpu::ScreenDescriptor,
    ) {
        let raw_input = self.egui_state.take_egui_input(window);

        // Edit a copy; the closure cannot borrow self while egui_ctx runs.
        let status_lines = self.status.lines();
        let message = self.status.message.clone();
        let mut config = self.config.clone();
        let mut action = None;

        let ctx = self.egui_ctx.clone();
        let full_output = ctx.run(raw_input, |ctx| {
            draw_ui(ctx, &mut config, &status_lines, message.as_deref(), &mut action);
        });

        if config != self.config {
            self.config = config;
            if let Err(e) = self.config.save(&self.settings_path) {
                log::warn!("Could not save settings: {e}");
            }
        }
        if action.is_some() {
            self.action = action;
        }

        self.egui_state
            .handle_platform_output(window, full_output.platform_output);

        let pixels_per_point = full_output.pixels_per_point;
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes, pixels_per_point);

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [screen_w, screen_h],
            pixels_per_point,
        };

        (clipped_primitives, full_output.textures_delta, screen_descriptor)
    }

    /// Upload egui textures and buffers. Call before the egui render pass.
    pub fn prepare_egui(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &[egui::epaint::ClippedPrimitive],
        textures_delta: &egui::TexturesDelta,
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(device, queue, *id, image_delta);
        }

        self.egui_renderer
            .update_buffers(device, queue, encoder, primitives, screen_descriptor)
    }

    /// Render egui into the given render pass.
    pub fn render_egui(
        &self,
        render_pass: &mut wgpu::RenderPass<'static>,
        primitives: &[egui::epaint::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        self.egui_renderer
            .render(render_pass, primitives, screen_descriptor);
    }

    /// Free textures after present.
    pub fn free_textures(&mut self, textures_delta: &egui::TexturesDelta) {
        for &id in &textures_delta.free {
            self.egui_renderer.free_texture(&id);
        }
    }
}

// ---------------------------------------------------------------------------
// UI drawing (free function, see run_frame)
// ---------------------------------------------------------------------------

fn draw_ui(
    ctx: &egui::Context,
    config: &mut Config,
    status_lines: &[String],
    message: Option<&str>,
    action: &mut Option<PanelAction>,
) {
    let panel_frame = egui::Frame::NONE
        .fill(egui::Color32::from_rgba_unmultiplied(20, 20, 20, 240))
        .corner_radius(6.0)
        .inner_margin(10.0);

    egui::SidePanel::right("controls")
        .exact_width(PANEL_WIDTH)
        .resizable(false)
        .frame(panel_frame)
        .show(ctx, |ui| {
            ui.style_mut().visuals.override_text_color = Some(egui::Color32::from_gray(220));

            egui::ScrollArea::vertical().show(ui, |ui| {
                // --- Grid ---
                ui.heading("Grid");
                ui.add(egui::Slider::new(&mut config.grid_square_size, 1.0..=MAX_GRID_SQUARE_SIZE).text("Square size"));
                ui.add(egui::Slider::new(&mut config.num_columns, 1..=MAX_GRID_DIMENSION).text("Columns"));
                ui.add(egui::Slider::new(&mut config.num_rows, 1..=MAX_GRID_DIMENSION).text("Rows"));
                ui.add_space(4.0);

                // --- Visual ---
                ui.heading("Visual");
                ui.checkbox(&mut config.show_grid, "Show grid");
                color_row(ui, "Grid", &mut config.grid_color);
                color_row(ui, "Background", &mut config.background_color);
                color_row(ui, "Dot", &mut config.walker_dot_color);
                color_row(ui, "Line", &mut config.walker_line_color);
                ui.add(egui::Slider::new(&mut config.walker_line_width, 0.1..=MAX_LINE_WIDTH).text("Line width"));
                ui.add_space(4.0);

                // --- Walkers ---
                ui.heading("Walkers");
                ui.add(egui::Slider::new(&mut config.num_walkers, 1..=MAX_WALKERS).text("Count"));
                ui.add(egui::Slider::new(&mut config.walker_start_size, 0.0..=MAX_START_SIZE).text("Start size"));
                ui.add(egui::Slider::new(&mut config.walker_separation, 0..=MAX_WALKER_SEPARATION).text("Separation"));
                ui.add(
                    egui::Slider::new(&mut config.walker_center_separation, 0..=MAX_CENTER_SEPARATION)
                        .text("Centre separation"),
                );
                ui.add(egui::Slider::new(&mut config.walker_age, 1..=MAX_WALKER_AGE).text("Age"));
                ui.checkbox(&mut config.allow_cross_paths, "Allow crossing paths");
                ui.checkbox(&mut config.allow_path_ends_merge, "Allow merging path ends");
                ui.add(
                    egui::Slider::new(&mut config.center_attraction, 0.0..=1.0)
                        .text("Centre attraction"),
                );
                ui.add_space(4.0);

                // --- Playback ---
                ui.heading("Playback");
                ui.add(
                    egui::Slider::new(&mut config.step_interval_ms, 0..=MAX_STEP_INTERVAL_MS)
                        .text("Step interval (ms)"),
                );
                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    if ui.button("Update").clicked() {
                        *action = Some(PanelAction::Update);
                    }
                    if ui.button("Reset").clicked() {
                        *action = Some(PanelAction::Reset);
                    }
                    if ui.button("Capture").clicked() {
                        *action = Some(PanelAction::Capture);
                    }
                });
                ui.add_space(8.0);

                // --- Status ---
                ui.heading("Status");
                for line in status_lines {
                    ui.label(egui::RichText::new(line).monospace());
                }
                if let Some(msg) = message {
                    ui.colored_label(egui::Color32::from_rgb(255, 110, 90), msg);
                }
                ui.add_space(4.0);
                ui.label("ESC: Quit");
            });
        });
}

fn color_row(ui: &mut egui::Ui, label: &str, color: &mut [u8; 3]) {
    ui.horizontal(|ui| {
        ui.color_edit_button_srgb(color);
        ui.label(label);
    });
}
