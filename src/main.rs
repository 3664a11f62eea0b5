//! smfplay CLI: decode a MIDI file and play it through the software queue.
//!
//! Usage:
//!   smfplay path/to/song.mid
//!   smfplay path/to/song.rmi --start 30 --volume 100 -v
//!   smfplay path/to/song.mid --info

use clap::{ArgAction, Parser};
use log::LevelFilter;
use sp_master::{
    Controller, Destination, LogSink, PlayerConfig, SchedulerConfig, Status, VirtualQueue,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, process};

/// Standard MIDI File player
#[derive(Parser, Debug)]
#[command(name = "smfplay")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Play Standard MIDI Files (.mid, .rmi)", long_about = None)]
struct Args {
    /// MIDI file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Destination port as client:port
    #[arg(short, long, default_value = "128:0")]
    dest: Destination,

    /// Start position in seconds
    #[arg(short, long, default_value_t = 0.0)]
    start: f64,

    /// Master volume (0-127)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=127))]
    volume: Option<u8>,

    /// Restore programs and controllers when starting mid-song
    #[arg(long)]
    chase: bool,

    /// Print the song summary and exit
    #[arg(long)]
    info: bool,

    /// Log more (-v: transport and delivered messages, -vv: decoder detail)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    // RUST_LOG still overrides
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    let data = fs::read(&args.file).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", args.file.display(), e);
        process::exit(1);
    });

    let config = PlayerConfig {
        scheduler: SchedulerConfig {
            destination: args.dest,
            chase_controls: args.chase,
        },
        ..PlayerConfig::default()
    };
    let mut ctrl = Controller::with_sink(config, LogSink);
    ctrl.load_midi(&data).unwrap_or_else(|e| {
        eprintln!("Failed to load {}: {}", args.file.display(), e);
        process::exit(1);
    });

    print_info(&ctrl);
    if args.info {
        return;
    }

    if let Some(volume) = args.volume {
        if let Err(e) = ctrl.set_master_volume(volume) {
            eprintln!("Failed to set volume: {}", e);
        }
    }

    play(&mut ctrl, args.start);
}

fn print_info(ctrl: &Controller<VirtualQueue>) {
    let Some(song) = ctrl.song() else {
        return;
    };
    if !song.title.is_empty() {
        println!("Title:    {}", song.title);
    }
    println!("Format:   {} ({} tracks)", song.format.as_u16(), song.track_count);
    println!("Division: {} ticks/quarter", song.division);
    println!(
        "Length:   {} ticks, {}",
        song.total_ticks,
        sp_master::format_clock(song.duration_seconds)
    );
    println!("Events:   {}", song.events.len());
    println!();

    if let Some(summary) = ctrl.summary() {
        print!("{}", summary);
        println!();
    }
}

fn play(ctrl: &mut Controller<VirtualQueue>, start: f64) {
    if let Err(e) = ctrl.play_from_seconds(start) {
        eprintln!("Failed to start playback: {}", e);
        process::exit(1);
    }
    println!("Playing to {}...", ctrl.config().scheduler.destination);
    println!();

    loop {
        match ctrl.poll_finished() {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                eprintln!("\nPlayback failed: {}", e);
                process::exit(1);
            }
        }
        if ctrl.state() == Status::Stopped {
            break;
        }
        if let Some(pos) = ctrl.position() {
            print!("\r{}", pos);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    println!("\rDone.          ");
}
