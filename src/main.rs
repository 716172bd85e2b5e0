use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use salesdash::error_display::user_message_from_report;
use salesdash::logging::init_logging;
use salesdash::report::render_text;
use salesdash::{
    AppConfig, Args, ConfigManager, DashboardReport, LoadOptions, OutputFormat, ReportSettings,
    Session, APP_NAME,
};
use tracing::warn;

fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.generate_config {
        let config_manager = ConfigManager::new(APP_NAME)?;
        match config_manager.write_default_config(args.force) {
            Ok(path) => {
                println!("Wrote default configuration to {}", path.display());
                return Ok(Some(()));
            }
            Err(e) => {
                eprintln!("Error writing configuration: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(None)
}

/// Point out filter flags that could not be honoured; none of these is fatal.
fn warn_ignored_filters(args: &Args, session: &Session, report: &DashboardReport) {
    if !args.categories.is_empty() {
        if !report.availability.category {
            warn!("no category column in this file; --category ignored");
        } else {
            let known = session.snapshot().categories();
            for c in args.categories.iter().filter(|c| !known.contains(c)) {
                warn!(category = %c, "category not present in this file");
            }
        }
    }
    if (args.from.is_some() || args.to.is_some()) && !report.availability.date {
        warn!("no date column in this file; --from/--to ignored");
    }
}

fn run(args: &Args, config: &AppConfig) -> Result<String> {
    let path = args
        .path
        .as_deref()
        .ok_or_else(|| eyre!("No data file given"))?;

    let mut session = Session::open(
        path,
        LoadOptions::from_args_and_config(args, config),
        config.candidate_table(),
        config.schema_policy(args.lenient),
    )?;
    if !args.categories.is_empty() {
        session.select_categories(args.categories.iter().cloned());
    }
    if args.from.is_some() || args.to.is_some() {
        session.select_date_bounds(args.from, args.to);
    }

    let report = session.report(&ReportSettings::from_args_and_config(args, config))?;
    warn_ignored_filters(args, &session, &report);

    let format = args
        .output
        .or_else(|| config.output_format())
        .unwrap_or(OutputFormat::Text);
    Ok(match format {
        OutputFormat::Text => render_text(&report),
        OutputFormat::Json => serde_json::to_string_pretty(&report)? + "\n",
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    color_eyre::install()?;

    let config = match AppConfig::load(APP_NAME) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let _ = init_logging(args.debug || config.debug.enabled);

    match run(&args, &config) {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", user_message_from_report(&e, args.path.as_deref()));
            std::process::exit(1);
        }
    }
}
