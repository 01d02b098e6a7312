//! vitalpoll - poll a vital-signs endpoint and show the readings in the terminal

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use vitalpoll::{DefaultingPolicy, Formatting, TerminalTarget, Widget, WidgetConfig};

#[derive(Parser, Debug)]
#[command(name = "vitalpoll", about = "Poll a vital-signs endpoint and render the latest reading")]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Starting point when no config file is given
    #[arg(long, value_enum, default_value_t = Preset::UnitSuffixed)]
    preset: Preset,

    /// Scheme and authority of the device web server
    #[arg(long)]
    base_url: Option<String>,

    /// Path of the reading endpoint
    #[arg(long)]
    path: Option<String>,

    #[arg(long)]
    interval_ms: Option<u64>,

    #[arg(long, value_enum)]
    formatting: Option<FormattingArg>,

    #[arg(long, value_enum)]
    defaulting: Option<DefaultingArg>,

    /// Show the Connected/Disconnected flag
    #[arg(long, overrides_with = "no_connection_status")]
    connection_status: bool,

    /// Hide the Connected/Disconnected flag
    #[arg(long, overrides_with = "connection_status")]
    no_connection_status: bool,

    /// Abort a fetch after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Preset {
    Raw,
    UnitSuffixed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormattingArg {
    Raw,
    UnitSuffixed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DefaultingArg {
    Nullish,
    Falsy,
}

impl Cli {
    fn widget_config(&self) -> Result<WidgetConfig> {
        let mut config = match &self.config {
            Some(path) => WidgetConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => match self.preset {
                Preset::Raw => WidgetConfig::raw(),
                Preset::UnitSuffixed => WidgetConfig::unit_suffixed(),
            },
        };

        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(ms) = self.interval_ms {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(formatting) = self.formatting {
            config.formatting = match formatting {
                FormattingArg::Raw => Formatting::Raw,
                FormattingArg::UnitSuffixed => Formatting::UnitSuffixed,
            };
        }
        if let Some(defaulting) = self.defaulting {
            config.defaulting = match defaulting {
                DefaultingArg::Nullish => DefaultingPolicy::Nullish,
                DefaultingArg::Falsy => DefaultingPolicy::Falsy,
            };
        }
        if self.connection_status {
            config.show_connection_status = true;
        }
        if self.no_connection_status {
            config.show_connection_status = false;
        }
        if let Some(ms) = self.timeout_ms {
            config.request_timeout = Some(Duration::from_millis(ms));
        }

        config.validate()?;
        Ok(config)
    }
}

fn terminal_for(config: &WidgetConfig) -> TerminalTarget {
    let ids = &config.elements;
    let target = TerminalTarget::stdout()
        .with_element(ids.heart_rate.as_str(), "Heart rate")
        .with_element(ids.spo2.as_str(), "SpO2")
        .with_element(ids.temperature.as_str(), "Temperature");
    if config.show_connection_status {
        target.with_element(ids.connection_status.as_str(), "Connection")
    } else {
        target
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.widget_config()?;
    let target = Arc::new(terminal_for(&config));
    let widget = Arc::new(Widget::http(config, target)?);

    if cli.once {
        if let Err(e) = widget.run_cycle().await {
            log::error!("Error fetching data: {}", e);
            bail!("Error fetching data: {}", e);
        }
        return Ok(());
    }

    let handle = widget.start();
    log::info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    log::info!("Ctrl-C received, stopping poller {}", handle.id());
    handle.stop();
    Ok(())
}
