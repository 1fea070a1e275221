use std::io::stdin;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use glam::DVec3;
use log::{LevelFilter, info};
use simplelog::{Config as LogConfig, SimpleLogger};
use strum_macros::Display;

use spot_commander::color::Rgb;
use spot_commander::config::ShowConfig;
use spot_commander::dmx::UNIVERSE_SIZE;
use spot_commander::fixture::LogPublish;
use spot_commander::link::{DmxLink, LinkConfig, Mode, list_ports};
use spot_commander::patch::Patch;

/// Interval between scans of the inbound universe in monitor mode.
const MONITOR_POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(about)]
struct Cli {
    /// If true, provide verbose logging.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Display)]
#[strum(serialize_all = "lowercase")]
enum Command {
    /// List the serial devices that could be DMX interfaces.
    Ports,

    /// Check that the provided show file is valid, then quit.
    Check(CheckArgs),

    /// Aim and light the fixtures of a show.
    Run(RunArgs),

    /// Print changes to the DMX universe received by an interface.
    Monitor(MonitorArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Path to a YAML file containing the show.
    show_file: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    /// Path to a YAML file containing the show.
    show_file: PathBuf,

    /// Point every moving head at this position, as x,y,z.
    #[arg(long, value_parser = parse_triple, allow_hyphen_values = true)]
    look_at: Option<[f64; 3]>,

    /// Color for every moving head, as r,g,b in the unit range.
    #[arg(long, value_parser = parse_triple)]
    color: Option<[f64; 3]>,

    /// Dimmer level for every fixture.
    #[arg(long, default_value_t = 1.0)]
    dimmer: f64,

    /// Hold the look for this many seconds instead of waiting for Enter.
    #[arg(long)]
    seconds: Option<f64>,
}

#[derive(Args)]
struct MonitorArgs {
    /// Substring of the serial device name, product or manufacturer.
    port: String,

    /// Expected incoming frame rate.
    #[arg(long, default_value_t = 40.0)]
    frame_rate: f64,
}

fn main() -> Result<()> {
    let args = Cli::try_parse()?;

    let log_level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    SimpleLogger::init(log_level, LogConfig::default())?;

    match args.command {
        Command::Ports => list_serial_ports(),
        Command::Check(args) => check_show(args),
        Command::Run(args) => run_show(args),
        Command::Monitor(args) => monitor(args),
    }
}

fn list_serial_ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn check_show(args: CheckArgs) -> Result<()> {
    let show = ShowConfig::from_file(&args.show_file)?;
    let mut patch = Patch::new(Arc::new(DmxLink::disconnected(show.link.clone())));
    patch.patch_all(&show.fixtures)?;
    println!("Show is valid: {} fixtures patched.", patch.len());
    Ok(())
}

fn run_show(args: RunArgs) -> Result<()> {
    let show = ShowConfig::from_file(&args.show_file)?;
    let link = Arc::new(DmxLink::disconnected(show.link));
    if link.mode() != Mode::Sender {
        bail!("a show can only run on a link in sender mode");
    }
    if !link.reconnect() {
        bail!("no DMX interface matching \"{}\"", link.config().port);
    }
    let mut patch = Patch::new(link.clone()).with_publisher(Arc::new(LogPublish));
    patch.patch_all(&show.fixtures)?;
    link.start();

    patch.home_all();
    for head in patch.moving_heads_mut() {
        if let Some(target) = args.look_at {
            head.look_at(DVec3::from_array(target));
        }
        if let Some([r, g, b]) = args.color {
            head.set_color(Rgb::new(r, g, b));
        }
        head.set_dimmer(args.dimmer);
    }
    for dimmer in patch.dimmers_mut() {
        dimmer.set_dimmer(args.dimmer);
    }

    match args.seconds {
        Some(seconds) if seconds.is_finite() && seconds >= 0. => {
            info!("Holding for {seconds} seconds.");
            thread::sleep(Duration::from_secs_f64(seconds));
        }
        _ => {
            println!("Press Enter to stop.");
            stdin().read_line(&mut String::new())?;
        }
    }

    patch.home_all();
    link.shutdown(true);
    Ok(())
}

fn monitor(args: MonitorArgs) -> Result<()> {
    let link = DmxLink::connect(LinkConfig {
        port: args.port.clone(),
        mode: Mode::Receiver,
        frame_rate: args.frame_rate,
        blackout_on_shutdown: false,
    });
    if !link.is_connected() {
        bail!("no DMX interface matching \"{}\"", link.config().port);
    }
    link.start();

    let (send, recv) = mpsc::channel();
    thread::spawn(move || {
        let _ = stdin().read_line(&mut String::new());
        let _ = send.send(());
    });
    println!("Monitoring DMX input; press Enter to stop.");

    let mut last = [0u8; UNIVERSE_SIZE];
    loop {
        match recv.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => (),
        }
        for (i, previous) in last.iter_mut().enumerate() {
            let value = link.get_value(i + 1);
            if value != *previous {
                info!("channel {}: {} -> {}", i + 1, previous, value);
                *previous = value;
            }
        }
        thread::sleep(MONITOR_POLL);
    }
    link.shutdown(false);
    Ok(())
}

/// Parse three comma-separated numbers.
fn parse_triple(s: &str) -> Result<[f64; 3], String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[f64; 3]>::try_from(parts).map_err(|p| format!("expected 3 values, got {}", p.len()))
}
