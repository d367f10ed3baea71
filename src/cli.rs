use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;
use std::sync::Arc;

use crate::api::AppState;
use crate::config::{Config, CONFIG};
use crate::database::Database;
use crate::error::DomainWatchError;
use crate::reputation::{ReputationChecker, VirusTotalSource};
use crate::scheduler::{CheckScheduler, SchedulerSettings};
use crate::server::WebServer;

#[derive(Parser)]
#[command(
    name = "domainwatch",
    version,
    about = "domainwatch: domain reputation monitoring service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Start the server (default if no command specified)
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
}

impl Cli {
    pub fn handle_command_line(project_dirs: &ProjectDirs) -> Result<(), DomainWatchError> {
        let args = Cli::parse();

        // Default to Serve if no command specified
        match args.command.unwrap_or(Command::Serve {
            host: None,
            port: None,
        }) {
            Command::Serve { host, port } => Self::start_server(project_dirs, host, port),
        }
    }

    fn start_server(
        project_dirs: &ProjectDirs,
        host: Option<String>,
        port: Option<u16>,
    ) -> Result<(), DomainWatchError> {
        let config = CONFIG
            .get()
            .ok_or_else(|| DomainWatchError::Error("Configuration not initialized".into()))?;

        let host = host.unwrap_or_else(Config::get_server_host);
        let port = port.unwrap_or_else(Config::get_server_port);

        info!("Starting server on {}:{}", host, port);

        let db = Database::open(&config.database_dir(project_dirs))?;
        info!(
            "Using database {} (schema version {})",
            db.db_path().display(),
            db.get_schema_version()?
        );

        if config.checker.api_key.is_empty() {
            log::warn!("checker.api_key is not set; reputation checks will be rejected");
        }
        let source = VirusTotalSource::from_config(&config.checker)?;
        let checker = ReputationChecker::new(Arc::new(source), config.checker.timeout());
        info!(
            "Reputation checks use {} with a {:?} timeout",
            config.checker.api_url,
            checker.timeout()
        );

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| DomainWatchError::Error(format!("Failed to create runtime: {}", e)))?;

        rt.block_on(async {
            let scheduler =
                CheckScheduler::new(db, checker, SchedulerSettings::from(&config.auto_check));
            scheduler.init_auto_mode()?;

            let web_server = WebServer::new(host, port, AppState::new(scheduler));
            web_server.start().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing_no_command_defaults_to_serve() {
        let result = Cli::try_parse_from(["domainwatch"]);
        assert!(result.is_ok(), "Should accept no command");

        let cli = result.unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parsing_explicit_serve_command() {
        let cli = Cli::try_parse_from(["domainwatch", "serve"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Serve {
                host: None,
                port: None
            })
        );
    }

    #[test]
    fn test_cli_parsing_serve_overrides() {
        let cli =
            Cli::try_parse_from(["domainwatch", "serve", "--host", "0.0.0.0", "--port", "8080"])
                .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Serve {
                host: Some("0.0.0.0".into()),
                port: Some(8080)
            })
        );
    }

    #[test]
    fn test_cli_parsing_invalid_arguments() {
        let result = Cli::try_parse_from(["domainwatch", "nonexistent-command"]);
        assert!(result.is_err(), "Should reject unknown commands");

        let result = Cli::try_parse_from(["domainwatch", "serve", "--invalid-flag"]);
        assert!(result.is_err(), "Should reject unknown flags on serve");

        let result = Cli::try_parse_from(["domainwatch", "serve", "--port", "not-a-port"]);
        assert!(result.is_err(), "Should reject a non-numeric port");
    }
}
