use anyhow::Context;
use ostinato::audio_engine::command::{dispatch, AudioCommand, ControlContext, HELP};
use ostinato::audio_engine::{AudioEngine, EngineHandle};
use ostinato::audio_io::CpalBackend;
use ostinato::settings;
use std::io::{self, BufRead, Write};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let app_settings = settings::load_settings();
    let engine_config = app_settings.engine_config();

    let handle = EngineHandle::new(&engine_config).context("Failed to build looper engine")?;
    let backend = CpalBackend::new(app_settings.cpal_config(), handle.xrun_counter());
    let mut engine =
        AudioEngine::with_handle(handle.clone(), backend, engine_config.ring_buffer_chunks);
    engine.start().context("Failed to start audio")?;

    let ctx = ControlContext {
        recordings_dir: app_settings.recordings_dir(),
        host_name: app_settings.host_name.clone(),
    };
    info!("Type 'help' for commands");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<AudioCommand>() {
            Ok(AudioCommand::Quit) => break,
            Ok(command) => command,
            Err(e) => {
                warn!("{}", e);
                writeln!(stdout, "{}\n{}", e, HELP)?;
                continue;
            }
        };
        match dispatch(&handle, command, &ctx) {
            Ok(reply) => writeln!(stdout, "{}", reply)?,
            Err(e) => {
                error!("{}", e);
                writeln!(stdout, "error: {}", e)?;
            }
        }
    }

    engine.stop();
    settings::save_settings(&app_settings);
    Ok(())
}
