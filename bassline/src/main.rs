mod analyzer;
mod app;
mod audio;
mod repaint;
mod storage;
mod theme;
mod widgets;

use app::BasslineApp;
use eframe::NativeOptions;

fn main() -> eframe::Result<()> {
    env_logger::init();
    let initial_file = std::env::args().nth(1).map(std::path::PathBuf::from);

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 560.0])
            .with_title("bassline"),
        ..Default::default()
    };
    eframe::run_native(
        "bassline",
        options,
        Box::new(move |cc| {
            theme::apply(&cc.egui_ctx);
            let mut app = BasslineApp::new(cc);
            if let Some(path) = initial_file {
                if path.exists() {
                    app.load_path(path);
                }
            }
            Box::new(app)
        }),
    )
}
