use std::fs::{self, File};
use std::path::Path;
use std::sync::{Arc, Mutex};

use askql_adapters::http::HttpAssistantBackend;
use askql_core::connection_form::ConnectionConfig;
use askql_core::session::Session;
use askql_core::settings::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn build_session(settings: &Settings) -> Session {
    Session::new(ConnectionConfig::with_model(settings.default_model.clone()))
        .with_feedback_mode(settings.feedback_mode)
}

fn run_app(
    settings: &Settings,
    run_tui: impl FnOnce(Arc<HttpAssistantBackend>, Session) -> Result<(), askql_tui::TuiError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let backend = HttpAssistantBackend::from_settings(settings)?;
    info!(api_url = %backend.base_url(), "assistant backend configured");
    run_tui(Arc::new(backend), build_session(settings))?;
    Ok(())
}

/// Logs go to a file because the terminal belongs to the TUI.
fn init_tracing(log_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::options().create(true).append(true).open(log_path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load_default()?;
    init_tracing(&settings.log_path()?)?;
    run_app(&settings, askql_tui::run::<HttpAssistantBackend>)
}
