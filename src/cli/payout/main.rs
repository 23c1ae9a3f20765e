use anyhow::Result;
use clap::{App, Arg, ArgMatches, SubCommand};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::PayoutCommands;
use config::Config;
use reward_distribution::models::payout::ResumePoint;

fn cycle_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("cycle")
        .short("c")
        .long("cycle")
        .value_name("CYCLE")
        .help("Cycle to pay (defaults to the head cycle minus the configured offset)")
        .takes_value(true)
}

fn json_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("json")
        .long("json")
        .help("Print the report as JSON")
}

fn parse_cycle(matches: &ArgMatches) -> Result<Option<u32>> {
    Ok(matches.value_of("cycle").map(|c| c.parse::<u32>()).transpose()?)
}

fn parse_resume(matches: &ArgMatches) -> Result<ResumePoint> {
    Ok(ResumePoint {
        batch: matches
            .value_of("from-batch")
            .map(|b| b.parse::<usize>())
            .transpose()?
            .unwrap_or_default(),
        pending_counter: matches
            .value_of("pending-counter")
            .map(|c| c.parse::<u64>())
            .transpose()?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = App::new("Baker payout CLI")
        .version("0.1")
        .about("Computes and pays delegator rewards for a baker")
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .help("Path to the config file")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("dryrun")
                .about("Compute a cycle's payout without submitting it")
                .arg(cycle_arg())
                .arg(json_arg()),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Compute and submit a cycle's payout")
                .arg(cycle_arg())
                .arg(json_arg())
                .arg(
                    Arg::with_name("from-batch")
                        .long("from-batch")
                        .value_name("INDEX")
                        .help("Resume a partly paid cycle, submitting only this batch and later ones")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("pending-counter")
                        .long("pending-counter")
                        .value_name("COUNTER")
                        .help("Last counter of an unconfirmed batch; it is not resent if the wallet reached it")
                        .takes_value(true)
                        .requires("from-batch"),
                ),
        )
        .subcommand(SubCommand::with_name("serve").about("Pay every new cycle as it completes"))
        .get_matches();

    let config_path = matches
        .subcommand()
        .1
        .and_then(|sub| sub.value_of("config"))
        .or_else(|| matches.value_of("config"));
    let config = Config::load(config_path.map(Path::new))?;
    let commands = PayoutCommands::new(config)?;

    match matches.subcommand() {
        ("dryrun", Some(sub_matches)) => {
            commands
                .dry_run(parse_cycle(sub_matches)?, sub_matches.is_present("json"))
                .await?;
        }
        ("run", Some(sub_matches)) => {
            commands
                .run(
                    parse_cycle(sub_matches)?,
                    parse_resume(sub_matches)?,
                    sub_matches.is_present("json"),
                )
                .await?;
        }
        ("serve", Some(_)) => commands.serve().await?,
        _ => {
            println!("No subcommand specified. Use --help for usage information.");
        }
    }

    Ok(())
}
