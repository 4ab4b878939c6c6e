use color_eyre::{eyre::eyre, Result};
use padmapper::config::{default_config_path, EngineConfig};
use padmapper::controller::ControllerState;
use padmapper::driver::{Driver, DriverHandle};
use padmapper::mapper::Mapper;
use padmapper::output::LogSink;
use padmapper::profile::Profile;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = EngineConfig::load_default()
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", default_config_path().display(), e))?;
    setup(&config)?;

    let profile_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.profile.resolve());
    let profile = load_profile(&profile_path).await;

    let mapper = Mapper::new(profile, Box::new(LogSink::default()));
    let (driver, handle) = Driver::create(mapper, &config.driver);

    info!("Reading controller snapshots from stdin");
    let (stopped, ()) = tokio::join!(driver.start().run(), feed_stdin(handle));
    let stopped = stopped.map_err(|e| eyre!("Driver failed: {}", e))?;
    info!("Processed {} messages", stopped.processed());
    stopped.into_mapper();
    Ok(())
}

fn setup(config: &EngineConfig) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    let level = match std::env::var("RUST_LOG") {
        Ok(level) => level.parse().unwrap_or(Level::INFO),
        Err(_) => config.logging.level(),
    };
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn load_profile(path: &Path) -> Profile {
    match Profile::load(path).await {
        Ok(profile) => {
            for diagnostic in &profile.diagnostics {
                warn!("{}", diagnostic);
            }
            profile
        }
        Err(e) => {
            warn!(
                "Could not load profile {}: {}, starting unbound",
                path.display(),
                e
            );
            Profile::empty()
        }
    }
}

/// One JSON object per line: a controller snapshot, or `{"profile": "path"}`
/// to switch profiles. Ends on EOF or Ctrl-C.
async fn feed_stdin(handle: DriverHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                handle.shutdown();
                return;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("End of input");
                return;
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                handle.shutdown();
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = forward_line(&handle, &line).await {
            warn!("Skipping input line: {}", e);
        }
    }
}

async fn forward_line(handle: &DriverHandle, line: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if let Some(path) = value.get("profile").and_then(|p| p.as_str()) {
        let profile = load_profile(Path::new(path)).await;
        handle.swap_profile(profile).await?;
        return Ok(());
    }
    let state: ControllerState = serde_json::from_value(value)?;
    handle.send_state(state).await?;
    Ok(())
}
