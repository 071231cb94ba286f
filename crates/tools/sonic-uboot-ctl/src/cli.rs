//! Definition of the command line interface (CLI).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

use sonic_uboot::config::{load_config, Config, ConfigError, CONFIG_PATH};
use sonic_uboot::env::{EnvStore, FileEnv};
use sonic_uboot::install::InstallError;
use sonic_uboot::{RegistryError, SlotEntry, SlotRegistry, SlotTable};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error("unable to write JSON output")]
    Json(#[from] serde_json::Error),
    #[error("image removed, but {0} step(s) failed")]
    IncompleteRemoval(usize),
}

pub type CliResult<T> = Result<T, CliError>;

/// Output of `list --json`.
#[derive(Debug, Serialize)]
struct ListOutput {
    next: SlotEntry,
    slots: SlotTable,
}

pub fn main() -> CliResult<ExitCode> {
    crate::logging::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    let registry = || SlotRegistry::from_config(open_store(&args, &config), &config);
    match &args.command {
        Command::List { json } => {
            let registry = registry();
            let output = ListOutput {
                next: registry.next_image(),
                slots: registry.installed_images(),
            };
            if *json {
                serde_json::to_writer(std::io::stdout(), &output)?;
                println!();
            } else {
                println!("Next: {}", output.next);
                println!("Available:");
                for (_, image) in output.slots.images() {
                    println!("{image}");
                }
            }
        }
        Command::Next => {
            println!("{}", registry().next_image());
        }
        Command::SetDefault { image } => {
            registry().set_default_image(image)?;
        }
        Command::SetNext { image } => {
            if registry().set_next_image(image)?.is_none() {
                eprintln!("Image {image} does not match any slot, nothing changed.");
            }
        }
        Command::Remove { image } => {
            let removal = registry().remove_image(image)?;
            for failure in &removal.failures {
                error!("unable to {}: {}", failure.step, failure.error);
            }
            if !removal.is_complete() {
                return Err(CliError::IncompleteRemoval(removal.failures.len()));
            }
            info!("removed {image} from slot {}", removal.slot);
        }
        Command::Install { path } => {
            sonic_uboot::install_image(path)?;
        }
        Command::Detect => {
            let detected = sonic_uboot::detect();
            println!("{detected}");
            if !detected {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Open the environment store selected on the command line.
fn open_store(args: &Args, config: &Config) -> Box<dyn EnvStore> {
    match &args.env_file {
        Some(path) => Box::new(FileEnv::new(path, args.env_size)),
        None => Box::new(config.fw_env()),
    }
}

#[derive(Debug, Parser)]
#[clap(author, about)]
pub struct Args {
    /// Path of the configuration file.
    #[clap(long, default_value = CONFIG_PATH)]
    pub config: PathBuf,
    /// Use an environment image file instead of `fw_printenv` and `fw_setenv`.
    #[clap(long)]
    pub env_file: Option<PathBuf>,
    /// Size the environment image file is padded to.
    #[clap(long, requires = "env_file")]
    pub env_size: Option<usize>,
    /// The command.
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// List the installed images.
    List {
        /// Output the images as JSON.
        #[clap(long)]
        json: bool,
    },
    /// Print the image booted by default.
    Next,
    /// Boot the given image by default.
    SetDefault { image: String },
    /// Boot the given image once on the next boot.
    SetNext { image: String },
    /// Remove an installed image.
    Remove { image: String },
    /// Run an image installer.
    Install { path: PathBuf },
    /// Check whether the device boots through U-Boot.
    Detect,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_args() {
        Args::command().debug_assert();
        let args = Args::try_parse_from([
            "sonic-uboot-ctl",
            "--env-file",
            "/tmp/uboot.env",
            "--env-size",
            "65536",
            "set-next",
            "image-202405.0",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from(CONFIG_PATH));
        assert_eq!(args.env_size, Some(65536));
        assert!(matches!(args.command, Command::SetNext { image } if image == "image-202405.0"));
        assert!(Args::try_parse_from(["sonic-uboot-ctl", "--env-size", "1", "next"]).is_err());
    }
}
