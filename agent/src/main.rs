//! shipd - Entry Point
//!
//! Receives signed push webhooks and deploys the matching project.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use shipd::app::options::AppOptions;
use shipd::app::run::run;
use shipd::app::state::build_router;
use shipd::deploy::command::ShellRunner;
use shipd::filesys::file::File;
use shipd::logs::{init_logging, LogOptions};
use shipd::projects::registry::ProjectRegistry;
use shipd::storage::layout::StorageLayout;
use shipd::storage::settings::Settings;
use shipd::utils::version_info;

use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let (settings, settings_missing) = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => (settings, false),
            Err(e) => {
                eprintln!(
                    "Unable to read settings file {}: {}",
                    settings_file.path().display(),
                    e
                );
                std::process::exit(1);
            }
        }
    } else {
        (Settings::default(), true)
    };

    // Initialize logging; the guard flushes the file sink on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_dir.clone(),
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };
    if settings_missing {
        warn!(
            "No settings file at {}, using defaults",
            settings_file.path().display()
        );
    }

    let options = AppOptions::from_settings(&settings, layout);

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&options).await;
        return;
    }

    info!("Running shipd {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run shipd: {e}");
        std::process::exit(1);
    }
}

/// Print the resolved configuration without starting the server
async fn run_diagnostic(options: &AppOptions) {
    let projects_file = &options.storage.projects_file;
    println!("projects file: {}", projects_file.path().display());
    match ProjectRegistry::load(projects_file).await {
        Ok(registry) => {
            println!("projects ({}):", registry.len());
            for name in registry.list_available() {
                println!("  - {}", name);
            }
        }
        Err(e) => println!("projects: error: {}", e),
    }

    match build_router(&options.notifications, Arc::new(ShellRunner)) {
        Ok(router) => println!("channels: {}", router.channel_names().join(", ")),
        Err(e) => println!("channels: error: {}", e),
    }

    println!(
        "listening on: {}:{}",
        options.server.host, options.server.port
    );
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to listen for SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to listen for SIGINT");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
