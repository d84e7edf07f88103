#![forbid(unsafe_code)]

use clap::{command, Arg, ArgAction};
use color_eyre::eyre::Result;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::{Command, CommandErrors};

mod commands;
mod render;

use libjobwatch::log::*;

fn config_arg() -> Arg {
    Arg::new("config")
        .help("Path to an aggregator config file (YAML). Defaults apply when omitted.")
        .short('c')
        .long("config")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .help("Print the final view as JSON instead of text.")
        .long("json")
        .action(ArgAction::SetTrue)
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre()?;

    // Command configuration
    let matches = command!()
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Turn debugging information on. Overrides -q. Can specify up to -vvvv.")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Silence all output. Overridden by -v.")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            command!("replay")
                .about("Replay a recorded event file and print the resulting view.")
                .arg(
                    Arg::new("file")
                        .help("Path to the event file: a JSON array, an API page, or one event per line.")
                        .short('f')
                        .long("file"),
                )
                .arg(config_arg())
                .arg(json_arg()),
        )
        .subcommand(
            command!("follow")
                .about("Follow a running job's events until it finishes.")
                .arg(
                    Arg::new("url")
                        .help("URL of the job's events endpoint, e.g. https://host/api/v1/jobs/7/job_events/")
                        .short('u')
                        .long("url"),
                )
                .arg(
                    Arg::new("token")
                        .help("Bearer token for the events endpoint.")
                        .short('t')
                        .long("token"),
                )
                .arg(
                    Arg::new("page-size")
                        .help("Events to request per page. Defaults to 200.")
                        .long("page-size"),
                )
                .arg(
                    Arg::new("poll-interval")
                        .help("Milliseconds to wait between polls. Defaults to 2000.")
                        .long("poll-interval"),
                )
                .arg(config_arg())
                .arg(json_arg()),
        )
        .subcommand_required(true)
        .get_matches();

    // Set up logging
    let logging_config = tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::new(
            time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        ))
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
        .with_writer(std::io::stderr)
        .compact();

    let quiet = matches.get_flag("quiet");
    let verbose = matches.get_count("verbose") as usize;
    let logging_config = if quiet && verbose == 0 {
        logging_config.with_max_level(LevelFilter::ERROR)
    } else if verbose > 0 {
        let level = match verbose {
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            3 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        logging_config.with_max_level(level)
    } else {
        logging_config.with_max_level(LevelFilter::ERROR)
    };

    let subscriber = logging_config.finish();
    subscriber.init();

    // Run the commands
    let Some((subcommand, matches)) = matches.subcommand() else {
        return Err(CommandErrors::NoSubcommandProvided.into());
    };
    let ctx = commands::CliContext::new(matches);
    debug!(
        "matched subcommand {} with matches: {:?}",
        &subcommand,
        &matches.ids().map(|id| id.as_str()).collect::<Vec<_>>()
    );
    match subcommand {
        "replay" => commands::replay::ReplayCommand::new().run(&ctx).await?,
        "follow" => commands::follow::FollowCommand::new().run(&ctx).await?,
        _ => return Err(CommandErrors::InvalidSubcommand(subcommand.to_string()).into()),
    }
    Ok(())
}
