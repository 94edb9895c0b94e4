// Window for the expression booth

use std::time::Duration;

use crate::booth::{BoothHandle, BoothView, Command, Notice};
use crate::models::Frame;
use crate::render::{OutputContent, OutputPanel, ResultCard};

/// Main application UI
pub struct BoothApp {
    booth: BoothHandle,
    video_texture: Option<egui::TextureHandle>,
}

impl BoothApp {
    /// Creates a new BoothApp driving the given booth
    pub fn new(booth: BoothHandle) -> Self {
        Self {
            booth,
            video_texture: None,
        }
    }

    /// Swaps in the latest preview frame, or clears the video when the stream stopped
    fn update_video_texture(&mut self, ctx: &egui::Context) {
        match self.booth.take_frame() {
            Some(Some(frame)) => self.video_texture = Some(load_frame(ctx, &frame)),
            Some(None) => self.video_texture = None,
            None => {}
        }
    }

    /// Start/restart, capture and reset buttons
    fn render_controls(&self, ctx: &egui::Context, view: &BoothView) {
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let blocked = view.notice.is_some();

                if ui
                    .add_enabled(!blocked, egui::Button::new(view.controls.start_caption.text()))
                    .clicked()
                {
                    self.booth.send(Command::Start);
                }
                if ui
                    .add_enabled(
                        view.controls.capture_enabled && !blocked,
                        egui::Button::new("Capture & Analyze"),
                    )
                    .clicked()
                {
                    self.booth.send(Command::Capture);
                }
                if ui
                    .add_enabled(
                        view.controls.reset_enabled && !blocked,
                        egui::Button::new("Reset"),
                    )
                    .clicked()
                {
                    self.booth.send(Command::Reset);
                }
            });
        });
    }

    /// Result area on the right
    fn render_output(&self, ctx: &egui::Context, output: &OutputPanel) {
        egui::SidePanel::right("output")
            .min_width(320.0)
            .show(ctx, |ui| {
                if output.busy() {
                    ui.horizontal(|ui| {
                        ui.add(egui::Spinner::new());
                        ui.label("Analyzing…");
                    });
                }

                match output.content() {
                    OutputContent::Empty => {}
                    OutputContent::Message(text) => {
                        ui.label(egui::RichText::new(text).weak());
                    }
                    OutputContent::Failure(text) => {
                        ui.colored_label(ui.visuals().error_fg_color, text);
                    }
                    OutputContent::Card(card) => render_card(ui, card),
                }

                if !matches!(output.content(), OutputContent::Empty) {
                    ui.separator();
                    if ui.button("Copy as HTML").clicked() {
                        ui.ctx().copy_text(output.to_markup());
                    }
                }
            });
    }

    /// Camera video, scaled to fit while keeping its aspect ratio
    fn render_camera_view(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(texture) = &self.video_texture else {
                ui.centered_and_justified(|ui| {
                    ui.label("Camera is off");
                });
                return;
            };

            let available = ui.available_rect_before_wrap();
            let texture_size = texture.size_vec2();
            let aspect_ratio = texture_size.x / texture_size.y;

            let mut display_width = available.width();
            let mut display_height = display_width / aspect_ratio;
            if display_height > available.height() {
                display_height = available.height();
                display_width = display_height * aspect_ratio;
            }

            let rect = egui::Rect::from_center_size(
                available.center(),
                egui::vec2(display_width, display_height),
            );
            ui.put(
                rect,
                egui::Image::new(texture)
                    .fit_to_exact_size(egui::vec2(display_width, display_height)),
            );
        });
    }

    /// Blocking notice; everything else is disabled until it is acknowledged
    fn render_notice(&self, ctx: &egui::Context, notice: &Notice) {
        egui::Window::new("Notice")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(&notice.message);
                if ui.button("OK").clicked() {
                    self.booth.send(Command::DismissNotice);
                }
            });
    }
}

fn load_frame(ctx: &egui::Context, frame: &Frame) -> egui::TextureHandle {
    let image =
        egui::ColorImage::from_rgb([frame.width as usize, frame.height as usize], &frame.data);
    ctx.load_texture("camera", image, egui::TextureOptions::LINEAR)
}

fn render_card(ui: &mut egui::Ui, card: &ResultCard) {
    ui.heading("Detection Results");

    let dominant = &card.dominant;
    ui.horizontal(|ui| {
        ui.label("Dominant:");
        ui.label(egui::RichText::new(format!("{} {}", dominant.label, dominant.glyph)).strong());
        ui.label(format!("— {}%", dominant.percent));
    });
    ui.separator();

    egui::Grid::new("expressions")
        .num_columns(3)
        .spacing([12.0, 6.0])
        .show(ui, |ui| {
            for row in &card.rows {
                ui.label(format!("{} {}", row.glyph, row.label).trim());
                ui.label(format!("{}%", row.percent));
                ui.add(
                    egui::ProgressBar::new(f32::from(row.bar_width()) / 100.0)
                        .desired_width(140.0),
                );
                ui.end_row();
            }
        });
}

impl eframe::App for BoothApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(16));

        let view = self.booth.view();
        self.update_video_texture(ctx);

        self.render_controls(ctx, &view);
        self.render_output(ctx, &view.output);
        self.render_camera_view(ctx);
        if let Some(notice) = &view.notice {
            self.render_notice(ctx, notice);
        }
    }
}
