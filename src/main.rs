use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridview::{app::App, config::Cli};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    cli.validate()?;

    // The terminal belongs to the UI, so logs only go to a file
    if let Some(path) = &cli.log_file {
        init_logging(path)?;
    }
    info!(
        user = cli.qstat_options().user_pattern(),
        full = cli.full,
        refresh = cli.refresh,
        "starting"
    );

    let mut app = App::new(&cli)?;

    let mut terminal = ratatui::try_init()?;
    let result = app.run(&mut terminal);
    ratatui::restore();

    result
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridview=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .init();
    Ok(())
}
