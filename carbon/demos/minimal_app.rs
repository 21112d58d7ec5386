//! Minimal program: an event loop, the signal watcher, nothing else. Send
//! SIGTERM (or press Ctrl-C) to terminate.

use carbon::app::Application;
use carbon_core::LoopThread;

fn main() -> std::io::Result<()> {
    let _log_guard = carbon::logging::init_file_logging(std::env::temp_dir(), "minimal-app");

    let loop_thread = LoopThread::new("minimal-app");
    loop_thread.start().expect("failed to start event loop");

    let app = Application::start(loop_thread.event_loop().clone())?;

    tracing::info!("Send SIGTERM (or press Ctrl-C) to terminate...");
    while !loop_thread.event_loop().is_done() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    let code = app.exit_code();
    app.stop();
    loop_thread.stop();
    std::process::exit(code);
}
