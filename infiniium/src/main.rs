use std::cmp::Ordering;
use std::path::PathBuf;
use std::process::exit;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{crate_authors, crate_version, App as ClapApp, Arg, ArgMatches};
use env_logger::Env;
use tokio::runtime::Runtime;
use tokio::time::sleep;

use infiniium::protocol::{Channel, Edge};
use infiniium::{measure, Infiniium, PollOptions, SessionConfig};

fn parse_arg<T>(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    matches
        .value_of(name)
        .map(|x| {
            x.parse::<T>()
                .map_err(|err| anyhow!("Cannot parse `{}` as --{}: {}", x, name, err))
        })
        .transpose()
}

fn build_config(matches: &ArgMatches) -> anyhow::Result<SessionConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(address) = matches.value_of("address") {
        config.address = address.to_string();
    }
    if let Some(timeout) = parse_arg(matches, "timeout")? {
        config.timeout_ms = timeout;
    }
    if let Some(library) = matches.value_of("visa-library") {
        config.visa_library = Some(PathBuf::from(library));
    }
    if let Some(baseline) = matches.value_of("firmware") {
        config.firmware_baseline = Some(baseline.to_string());
    }
    let measurement = &mut config.measurement;
    if let Some(timescale) = parse_arg(matches, "timescale")? {
        measurement.timescale_ns = timescale;
    }
    if let Some(vscale) = parse_arg(matches, "vscale")? {
        measurement.vertical_scale_mv = vscale;
    }
    if let Some(channel) = parse_arg::<Channel>(matches, "channel")? {
        measurement.channel = channel;
    }
    if let Some(edge) = parse_arg::<Edge>(matches, "edge")? {
        measurement.edge = edge;
    }
    if let Some(hold) = parse_arg(matches, "hold")? {
        measurement.hold_ms = hold;
    }
    Ok(config)
}

async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let mut scope = Infiniium::connect(&config)
        .await
        .with_context(|| format!("Cannot connect to `{}`", config.address))?;

    if let Some(baseline) = &config.firmware_baseline {
        match scope.compare_firmware(baseline) {
            Ok(Ordering::Greater) => log::warn!(
                "Instrument firmware {} is older than the baseline {}",
                scope.firmware(),
                baseline
            ),
            Ok(_) => {}
            Err(err) => log::warn!("Cannot compare firmware against baseline {}: {}", baseline, err),
        }
    }

    let measurement = &config.measurement;
    scope.default_setup().await?;
    scope
        .wait_for_operation_complete(&PollOptions::from_config(&config))
        .await?;
    scope.set_timescale(measurement.timescale_ns).await?;
    scope.set_vertical_scale(measurement.vertical_scale_mv).await?;
    let period = measure::period(&mut scope, measurement.channel, measurement.edge).await?;
    sleep(Duration::from_millis(measurement.hold_ms)).await;

    println!("Period is {}", period);
    scope.close();
    Ok(())
}

fn main() {
    let matches = ClapApp::new("Infiniium period measurement")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Set up an Infiniium oscilloscope and measure the period on a channel")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("TOML file with the session configuration."),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .takes_value(true)
                .help("VISA resource string, e.g. TCPIP0::192.168.1.20::hislip0::INSTR"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .short('t')
                .takes_value(true)
                .help("Command timeout in milliseconds."),
        )
        .arg(
            Arg::new("visa-library")
                .long("visa-library")
                .takes_value(true)
                .help("Path to the VISA library to load."),
        )
        .arg(
            Arg::new("firmware")
                .long("firmware")
                .takes_value(true)
                .help("Warn if the instrument runs a firmware older than this."),
        )
        .arg(
            Arg::new("timescale")
                .long("timescale")
                .takes_value(true)
                .help("Timebase scale in ns/div."),
        )
        .arg(
            Arg::new("vscale")
                .long("vscale")
                .takes_value(true)
                .help("Vertical scale in mV/div."),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .takes_value(true)
                .help("Channel to measure on, e.g. CHANnel1."),
        )
        .arg(
            Arg::new("edge")
                .long("edge")
                .takes_value(true)
                .help("Edge to measure on: RISing or FALLing."),
        )
        .arg(
            Arg::new("hold")
                .long("hold")
                .takes_value(true)
                .help("Milliseconds to wait before reporting the result."),
        )
        .arg(Arg::new("verbose").long("verbose").short('v').help("Log verbose output"))
        .get_matches();

    let verbose = matches.is_present("verbose");
    if verbose {
        env_logger::Builder::from_env(Env::default().default_filter_or("infiniium=debug")).init();
    } else {
        env_logger::Builder::from_env(Env::default().default_filter_or("infiniium=info")).init();
    }

    let config = match build_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            println!("{:#}", err);
            exit(1);
        }
    };

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            println!("Cannot start runtime: {}", err);
            exit(1);
        }
    };
    if let Err(err) = rt.block_on(run(config)) {
        log::error!("{:#}", err);
        exit(1);
    }
    log::debug!("Application quitting.");
}
