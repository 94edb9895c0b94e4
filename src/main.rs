use std::sync::Arc;

use expression_booth::booth::{spawn_booth, Booth};
use expression_booth::camera::NokhwaCapture;
use expression_booth::capture::StreamConstraints;
use expression_booth::config::AppConfig;
use expression_booth::emotion::OnnxExpressionDetector;
use expression_booth::error::Result;
use expression_booth::logging::init_logging;
use expression_booth::session::SessionController;
use expression_booth::ui::BoothApp;
use tracing::{error, info, warn};

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    match NokhwaCapture::list_devices() {
        Ok(devices) => info!(?devices, "cameras found"),
        Err(e) => warn!("Could not list cameras: {}", e),
    }

    let camera_config = config.camera.clone();
    let model_config = config.models.clone();
    let booth = spawn_booth(
        move || {
            let capture = NokhwaCapture::new(&camera_config);
            let controller = SessionController::new(
                Box::new(capture),
                StreamConstraints::from_config(&camera_config),
            );
            let detector = Arc::new(OnnxExpressionDetector::new(model_config));
            Ok(Booth::new(controller, detector))
        },
        config.preview.interval(),
    )?;

    let window = &config.window;
    let result = eframe::run_native(
        &window.title,
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([window.width, window.height])
                .with_title(&window.title),
            ..Default::default()
        },
        Box::new(move |_cc| Ok(Box::new(BoothApp::new(booth)))),
    );

    if let Err(e) = result {
        error!("Application error: {}", e);
    }

    info!("expression booth closed");
    Ok(())
}
