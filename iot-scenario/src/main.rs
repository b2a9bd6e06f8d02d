use clap::Parser;
use iot_scenario::config::cli::CliOpt;
use iot_scenario::{RunConfig, report};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,iot_scenario=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = CliOpt::parse();
    let config = RunConfig::from_cli(&options)?;
    report::print_params(&config);

    let summary = iot_scenario::run(config)?;
    report::print_traffic_stats(&summary);
    report::print_metrics(&summary);

    Ok(())
}
