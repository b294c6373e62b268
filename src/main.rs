use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mailhog::{Application, Config};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file; defaults are used when it does not exist
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// SMTP bind address (`host:port` or `:port`)
    #[arg(long)]
    smtp_bind_addr: Option<String>,

    /// HTTP bind address (`host:port` or `:port`)
    #[arg(long)]
    api_bind_addr: Option<String>,

    /// Hostname announced in the SMTP greeting
    #[arg(long)]
    hostname: Option<String>,

    /// Storage backend: `maildir` or `memory`
    #[arg(long)]
    storage: Option<String>,

    /// Directory for stored messages
    #[arg(long)]
    maildir_path: Option<String>,

    /// Allowed CORS origin
    #[arg(long)]
    cors_origin: Option<String>,

    /// JSON file of named release servers
    #[arg(long)]
    outgoing_smtp: Option<String>,

    /// Path prefix for the UI and API, e.g. `/mailhog`
    #[arg(long)]
    ui_web_path: Option<String>,

    /// Enable fault injection on the SMTP listener
    #[arg(long)]
    chaos: bool,

    /// File the fault injection settings are saved to
    #[arg(long)]
    chaos_state_file: Option<String>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// Flags as the environment variable names they override.
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        for (key, value) in [
            ("MH_SMTP_BIND_ADDR", &self.smtp_bind_addr),
            ("MH_API_BIND_ADDR", &self.api_bind_addr),
            ("MH_HOSTNAME", &self.hostname),
            ("MH_STORAGE", &self.storage),
            ("MH_MAILDIR_PATH", &self.maildir_path),
            ("MH_CORS_ORIGIN", &self.cors_origin),
            ("MH_OUTGOING_SMTP", &self.outgoing_smtp),
            ("MH_UI_WEB_PATH", &self.ui_web_path),
            ("MH_CHAOS_STATE_FILE", &self.chaos_state_file),
            ("MH_LOG_LEVEL", &self.log_level),
        ] {
            if let Some(value) = value {
                map.insert(key, value.clone());
            }
        }
        if self.chaos {
            map.insert("MH_CHAOS", "true".to_string());
        }
        map
    }
}

fn load_config(args: &Args) -> mailhog::Result<Config> {
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        Config::default()
    };
    config.apply_env_overrides()?;
    let overrides = args.overrides();
    config.apply_overrides_from(|key| overrides.get(key).cloned())?;
    config.validate()?;
    config.load_outgoing_file()?;
    Ok(config)
}

async fn run(config: Config) -> mailhog::Result<()> {
    let app = Application::new(config)?;
    app.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = mailhog::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        mailhog::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
