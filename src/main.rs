use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use human_parts::{cli::Cli, config::RunConfig, training};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = RunConfig::try_from(cli).context("invalid command line")?;

    let series = training::run(&config)?;

    if let Some((train, test)) = series.last() {
        info!(
            "final train loss {:.6}, accuracy {:.6} | test loss {:.6}, accuracy {:.6}",
            train.loss, train.accuracy, test.loss, test.accuracy
        );
    }

    Ok(())
}
