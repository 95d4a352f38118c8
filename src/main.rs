mod solari_controllers;
mod solari_gui;
mod solari_models;
mod solari_views;

use clap::Parser;
use solari_controllers::SolariControllers;
use solari_models::{BoardConfig, SolariModels};

/// Live departure board for a single MBTA commuter rail station.
#[derive(Parser)]
#[command(name = "solari", version, about)]
struct Args {
    /// Station to display departures for (an MBTA stop id)
    #[arg(long, default_value = SolariModels::DEFAULT_STOP)]
    station: String,

    /// Seconds between prediction refreshes
    #[arg(long, default_value_t = 60)]
    refresh_secs: u64,

    /// Clock tick granularity in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_millis: u64,

    /// Base URL of the MBTA V3 API
    #[arg(long, default_value = SolariModels::BASE_URL)]
    api_base: String,

    /// API key; falls back to the MBTA_API_KEY environment variable
    #[arg(long)]
    api_key: Option<String>,

    /// Open the board in a window instead of the terminal
    #[arg(long)]
    gui: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    // Set up panic hook for better error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n{}", "═".repeat(70));
        eprintln!("❌ APPLICATION PANIC");
        eprintln!("{}", "═".repeat(70));
        eprintln!("\nThe board encountered an unexpected error:");
        eprintln!("{}", panic_info);
        eprintln!("\n{}", "═".repeat(70));
    }));

    let args = Args::parse();
    anyhow::ensure!(
        args.refresh_secs > 0,
        "refresh interval must be at least one second"
    );
    anyhow::ensure!(
        args.tick_millis > 0,
        "clock tick must be at least one millisecond"
    );
    anyhow::ensure!(
        !args.station.trim().is_empty(),
        "station id must not be empty"
    );

    let config = BoardConfig {
        stop_id: args.station,
        base_url: args.api_base,
        api_key: args.api_key.or_else(|| std::env::var("MBTA_API_KEY").ok()),
        refresh_secs: args.refresh_secs,
        tick_millis: args.tick_millis,
    };

    if args.gui {
        solari_gui::run_gui(config)
            .map_err(|e| anyhow::anyhow!("failed to open the board window: {}", e))?;
    } else {
        SolariControllers::run(&config);
    }

    Ok(())
}
