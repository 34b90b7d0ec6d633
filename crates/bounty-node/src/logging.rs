use crate::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the configured level.
const LOG_TARGETS: [&str; 2] = ["bounty_ledger", "bounty"];

/// Display the boot banner
pub fn display_boot_banner(version: &str) {
    println!("\n╔══════════════════════════════════════════╗");
    println!("║                                          ║");
    println!("║        💰  BOUNTY REWARD LEDGER  💰       ║");
    println!("║                                          ║");
    println!("║{:^42}║", format!("Version {version}"));
    println!("╚══════════════════════════════════════════╝\n");
}

/// `-v` wins over the configured level.
pub fn resolve_level(config: &LoggingConfig, cli_verbose: u8) -> String {
    match cli_verbose {
        0 => config.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Base directives for our crates, or `RUST_LOG` verbatim when set.
pub fn default_directives(level: &str) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| {
        LOG_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    })
}

pub fn build_filter(config: &LoggingConfig, level: &str) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::new(default_directives(level));
    for (module, level) in &config.module_filters {
        filter = filter.add_directive(format!("{module}={level}").parse()?);
    }
    Ok(filter)
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: &LoggingConfig, cli_verbose: u8) -> anyhow::Result<()> {
    let log_level = resolve_level(config, cli_verbose);
    let filter = build_filter(config, &log_level)?;
    let subscriber = tracing_subscriber::registry().with(filter);

    let file = match &config.file_output {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => None,
    };

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_names(true)
                .with_line_number(true)
                .with_file(true);

            match file {
                Some(file) => {
                    let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);
                    subscriber.with(json_layer).with(file_layer).try_init()?;
                }
                None => subscriber.with(json_layer).try_init()?,
            }
        }
        "compact" => {
            let compact_layer = fmt::layer().compact().with_target(false);

            match file {
                Some(file) => {
                    let file_layer = fmt::layer().compact().with_writer(file).with_ansi(false);
                    subscriber.with(compact_layer).with(file_layer).try_init()?;
                }
                None => subscriber.with(compact_layer).try_init()?,
            }
        }
        _ => {
            // Source locations only when debugging
            let show_location = matches!(log_level.as_str(), "debug" | "trace");
            let pretty_layer = fmt::layer()
                .with_target(show_location)
                .with_line_number(show_location)
                .with_file(show_location);

            match file {
                Some(file) => {
                    let file_layer = fmt::layer().with_writer(file).with_ansi(false);
                    subscriber.with(pretty_layer).with(file_layer).try_init()?;
                }
                None => subscriber.with(pretty_layer).try_init()?,
            }
        }
    }

    Ok(())
}
