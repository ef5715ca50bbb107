use std::path::PathBuf;
use std::process::ExitCode;

use snafu::{ResultExt, Snafu};
use tern::app::{self, AppError};
use tern::settings::state::CONFIG_PATH_ENV;
use tern::settings::{SettingsError, SettingsStore};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "tern=info,tern_storage=info,tern_agent=info";

#[derive(Debug, Snafu)]
enum MainError {
    #[snafu(display("invalid arguments on `{stage}`: {details}"))]
    Arguments { stage: &'static str, details: String },
    #[snafu(display("failed to load settings on `{stage}`: {source}"))]
    LoadSettings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("chat session failed on `{stage}`: {source}"))]
    Session {
        stage: &'static str,
        source: AppError,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout stays the transcript.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", snafu::Report::from_error(error));
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), MainError> {
    let config_path = config_path(std::env::args().skip(1))?;
    let store = SettingsStore::open(config_path).context(LoadSettingsSnafu {
        stage: "open-settings",
    })?;
    tracing::info!("using settings from {:?}", store.config_path());

    app::run(store.settings())
        .await
        .context(SessionSnafu { stage: "run-chat" })
}

/// `--config <path>` wins over `TERN_CONFIG`, which wins over the platform default.
fn config_path(mut args: impl Iterator<Item = String>) -> Result<PathBuf, MainError> {
    let mut explicit = None;
    while let Some(argument) = args.next() {
        if let Some(value) = argument.strip_prefix("--config=") {
            explicit = Some(PathBuf::from(value));
            continue;
        }

        if argument != "--config" {
            return ArgumentsSnafu {
                stage: "parse-arguments",
                details: format!("unexpected argument `{argument}`"),
            }
            .fail();
        }

        let Some(value) = args.next() else {
            return ArgumentsSnafu {
                stage: "parse-arguments",
                details: "`--config` needs a path".to_string(),
            }
            .fail();
        };
        explicit = Some(PathBuf::from(value));
    }

    Ok(explicit
        .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(SettingsStore::default_config_path))
}
