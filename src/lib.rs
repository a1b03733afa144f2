pub mod cli;
pub mod config;
pub mod error;
pub mod governance;
pub mod hooks;
pub mod lockfile;
pub mod memory;
pub mod process;
pub mod quality;
pub mod reviewer;
pub mod tasks;
pub mod trust;

pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("GOVCORE_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_env_filter(filter)
        .try_init();
}
