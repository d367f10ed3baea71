mod api;
mod cli;
mod config;
mod database;
mod domains;
mod error;
mod reputation;
mod scheduler;
mod schema;
mod server;
mod settings;

use cli::Cli;
use config::{Config, CONFIG};
use directories::ProjectDirs;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};
use log::{debug, error, info};

const LOG_FILE_SIZE: u64 = 10_000_000;
const LOG_FILES_KEPT: usize = 7;

fn main() {
    let project_dirs = match ProjectDirs::from("", "", "domainwatch") {
        Some(dirs) => dirs,
        None => {
            eprintln!("Could not determine project directory");
            std::process::exit(1);
        }
    };

    let config = Config::load_config(&project_dirs);
    let log_spec = config.logging.log_spec();
    let _ = CONFIG.set(config);

    // Keep the handle alive for the lifetime of the process
    let _logger = setup_logging(&project_dirs, &log_spec);

    info!("domainwatch v{} starting", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line(&project_dirs) {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

fn setup_logging(project_dirs: &ProjectDirs, log_spec: &str) -> Option<LoggerHandle> {
    let log_dir = project_dirs.data_local_dir().join("logs");

    let result = Logger::try_with_str(log_spec).and_then(|logger| {
        logger
            .log_to_file(
                FileSpec::default()
                    .directory(&log_dir)
                    .basename("domainwatch"),
            )
            .duplicate_to_stderr(Duplicate::Warn)
            .format_for_files(flexi_logger::detailed_format)
            .rotate(
                Criterion::Size(LOG_FILE_SIZE),
                Naming::Timestamps,
                Cleanup::KeepLogFiles(LOG_FILES_KEPT),
            )
            .start()
    });

    match result {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logger ({}): continuing without file logging", e);
            None
        }
    }
}
