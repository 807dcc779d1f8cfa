use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use flowline::config::{HttpConfig, app_name, version};
use flowline::pipeline::sink::{HttpSink, LogSink};
use flowline::pipeline::source::{CronSource, HttpSource};
use flowline::pipeline::{Pipeline, PipelineError};
use log::info;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn cli() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("duration-secs")
                .long("duration-secs")
                .value_name("SECONDS")
                .help("Stop the pipeline after this many seconds.")
                .global(true)
                .value_parser(value_parser!(u64))
                .default_value("30"),
        )
        .arg(
            Arg::new("buffer-size")
                .long("buffer-size")
                .value_name("N")
                .help("Capacity of every channel between stages.")
                .global(true)
                .value_parser(value_parser!(usize))
                .default_value("100"),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .help("Pretty-print logged envelopes.")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("cron")
                .about("Generate numbers on a timer, keep the even ones and double them.")
                .arg(
                    Arg::new("interval-ms")
                        .long("interval-ms")
                        .value_name("MILLIS")
                        .help("Tick period.")
                        .value_parser(value_parser!(u64))
                        .default_value("1000"),
                ),
        )
        .subcommand(
            Command::new("poll")
                .about("Poll a JSON endpoint and log or forward each response.")
                .arg(
                    Arg::new("url")
                        .long("url")
                        .value_name("URL")
                        .help("Endpoint to GET.")
                        .required(true),
                )
                .arg(
                    Arg::new("interval-secs")
                        .long("interval-secs")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(u64))
                        .default_value("5"),
                )
                .arg(
                    Arg::new("timeout-secs")
                        .long("timeout-secs")
                        .value_name("SECONDS")
                        .help("Per-request HTTP timeout.")
                        .value_parser(value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    Arg::new("forward-to")
                        .long("forward-to")
                        .value_name("URL")
                        .help("POST every polled value here instead of logging it."),
                )
                .arg(
                    Arg::new("header")
                        .long("header")
                        .value_name("NAME:VALUE")
                        .help("Extra request header, may be repeated.")
                        .action(ArgAction::Append),
                ),
        )
}

fn http_config(matches: &ArgMatches) -> Result<HttpConfig> {
    let timeout = *matches.get_one::<u64>("timeout-secs").unwrap_or(&30);
    let mut config = HttpConfig::default().with_timeout(Duration::from_secs(timeout));
    for header in matches.get_many::<String>("header").unwrap_or_default() {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header '{}' must be NAME:VALUE", header);
        };
        config = config.with_header(name.trim(), value.trim());
    }
    Ok(config)
}

async fn run_cron(
    matches: &ArgMatches,
    buffer_size: usize,
    pretty: bool,
    cancel: CancellationToken,
) -> Result<(), PipelineError> {
    let interval = *matches.get_one::<u64>("interval-ms").unwrap_or(&1000);
    let source = CronSource::new(Duration::from_millis(interval), || {
        chrono::Utc::now().timestamp() % 100
    });

    info!("Generating numbers every {}ms, filtering evens, and doubling them", interval);
    Pipeline::new("number-pipeline", source)
        .with_buffer_size(buffer_size)
        .filter(|n| n % 2 == 0)
        .map(|n| n * 2)
        .to(LogSink::new(pretty))
        .run(cancel)
        .await
}

async fn run_poll(
    matches: &ArgMatches,
    buffer_size: usize,
    pretty: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let url = matches
        .get_one::<String>("url")
        .context("--url is required")?;
    let interval = *matches.get_one::<u64>("interval-secs").unwrap_or(&5);
    let config = http_config(matches)?;

    let source =
        HttpSource::<serde_json::Value>::new(url.clone(), Duration::from_secs(interval))
            .with_config(config.clone());
    let pipeline = Pipeline::new("api-poller", source).with_buffer_size(buffer_size);

    let pipeline = match matches.get_one::<String>("forward-to") {
        Some(target) => {
            info!("Forwarding {} to {}", url, target);
            pipeline.to(HttpSink::new(target.clone()).with_config(config))
        }
        None => pipeline.to(LogSink::new(pretty)),
    };

    pipeline.run(cancel).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let matches = cli().get_matches();
    let duration = *matches.get_one::<u64>("duration-secs").unwrap_or(&30);
    let buffer_size = *matches.get_one::<usize>("buffer-size").unwrap_or(&100);
    let pretty = matches.get_flag("pretty");

    let cancel = CancellationToken::new();

    // Ctrl-C and the deadline both stop the pipeline through the same token
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || on_signal.cancel()).context("set Ctrl-C handler")?;

    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(duration)).await;
        deadline.cancel();
    });

    let result = match matches.subcommand() {
        Some(("cron", sub)) => run_cron(sub, buffer_size, pretty, cancel)
            .await
            .map_err(Into::into),
        Some(("poll", sub)) => run_poll(sub, buffer_size, pretty, cancel).await,
        _ => unreachable!("subcommand is required"),
    };

    match result {
        Ok(()) => info!("Pipeline completed"),
        Err(e) if e.downcast_ref::<PipelineError>().is_some_and(PipelineError::is_cancelled) => {
            info!("Pipeline stopped")
        }
        Err(e) => return Err(e),
    }
    Ok(())
}
