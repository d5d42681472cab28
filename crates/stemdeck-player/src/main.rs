//! Stemdeck Player - synchronized stem loops with per-stem mute toggles
//!
//! Console front end for the stemdeck engine. It:
//! 1. Loads the stem list from the YAML config
//! 2. Starts the audio system (idle until the first activation)
//! 3. Reads stem selections from stdin and routes them through the
//!    session gate
//!
//! The first selected stem cold-starts synchronized playback of every
//! stem; subsequent selections mute/unmute without ever desyncing the
//! loops.
//!
//! ## Command line flags
//!
//! - `--config <path>`: use an alternative config file

mod config;

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use stemdeck_core::audio::{start_audio_system, AudioConfig, AudioSystem};
use stemdeck_core::engine::{AudibleMarkers, EngineCommand, SessionGate};
use stemdeck_core::types::StemId;

use config::PlayerConfig;

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("stemdeck-player starting up");

    let config_path = parse_config_arg().unwrap_or_else(config::default_config_path);
    let player_config: PlayerConfig = config::load_config(&config_path);

    if player_config.stems.is_empty() {
        bail!(
            "no stems configured; list stem asset paths under `stems:` in {:?}",
            config_path
        );
    }

    let stems: Vec<StemId> = player_config
        .stems
        .iter()
        .map(|p| StemId::new(p.to_string_lossy()))
        .collect();

    let audio_config = AudioConfig {
        device: player_config.device.clone(),
        ..AudioConfig::default()
    };

    let AudioSystem {
        handle,
        mut command_sender,
        markers,
        sample_rate,
    } = start_audio_system(&audio_config, player_config.fade, &stems)
        .context("failed to start the audio system")?;

    command_sender.send(EngineCommand::SetMasterGain {
        gain: player_config.master_gain,
    });

    let mut gate = SessionGate::new(stems.clone(), sample_rate, command_sender);

    // Decode the whole batch up front so the first activation starts
    // without a load hitch (cold start would otherwise load on demand)
    gate.preload();

    println!("stemdeck :: {} stems @ {}Hz", stems.len(), sample_rate);
    println!("select a stem number to start/toggle, r = resume, q = quit");
    print_status(&stems, &markers);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        match line.trim() {
            "" => continue,
            "q" => break,
            "r" => {
                // Focus-regain path: restart a suspended stream without
                // re-running cold start or touching the audible set
                if let Err(e) = handle.resume() {
                    log::warn!("resume failed: {}", e);
                }
            }
            other => match other.parse::<usize>() {
                Ok(n) if n >= 1 && n <= stems.len() => {
                    // An activation gesture also revives a suspended
                    // stream; harmless when it is already running
                    if let Err(e) = handle.resume() {
                        log::warn!("resume failed: {}", e);
                    }
                    gate.on_activate(&stems[n - 1]);
                    // Give the audio thread a frame boundary to apply it
                    std::thread::sleep(std::time::Duration::from_millis(30));
                    print_status(&stems, &markers);
                }
                _ => println!("? enter 1-{}, r, or q", stems.len()),
            },
        }
    }

    log::info!("shutting down");
    gate.shutdown();
    // Give the audio thread one last buffer to apply the teardown
    std::thread::sleep(std::time::Duration::from_millis(50));
    drop(gate); // release the command sender before the stream
    drop(handle);
    Ok(())
}

/// Pull `--config <path>` out of the command line, if present
fn parse_config_arg() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

/// Print each stem with its audible marker
fn print_status(stems: &[StemId], markers: &AudibleMarkers) {
    for (i, stem) in stems.iter().enumerate() {
        let marker = if markers.is_audible(stem) { "on " } else { "off" };
        println!("  [{}] {}  {}", i + 1, marker, stem);
    }
}
