mod app;
mod config;
mod export;
mod grid;
mod panel;
mod playback;
mod render;
mod sim;
mod walker;
mod worker;

fn main() {
    env_logger::init();
    log::info!("gridwalk starting up");

    if let Err(e) = app::run() {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
