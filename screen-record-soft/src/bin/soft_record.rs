//! Records a test pattern and a sine tone through the software backend.

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};

use screen_record_core::{read_container, CaptureError, RecordingConfig, RecordingController};
use screen_record_soft::{SoftBackend, TestPatternDisplay, ToneInput};

fn run() -> Result<(), CaptureError> {
    let matches = Command::new("soft-record")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("output")
                .value_name("PATH")
                .help("Container file or directory to record into"),
        )
        .arg(
            Arg::new("seconds")
                .short('s')
                .long("seconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("3")
                .help("Recording length"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("JSON recording configuration"),
        )
        .arg(
            Arg::new("tone")
                .long("tone")
                .value_parser(clap::value_parser!(f64))
                .default_value("440")
                .help("Tone frequency in Hz"),
        )
        .arg(
            Arg::new("pause")
                .long("pause")
                .action(ArgAction::SetTrue)
                .help("Pause for one second halfway through"),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => RecordingConfig::from_json_file(&PathBuf::from(path))?,
        None => RecordingConfig::default(),
    };
    let output = matches.get_one::<String>("output").map(PathBuf::from).unwrap_or_default();
    let seconds = matches.get_one::<u64>("seconds").copied().unwrap_or(3);
    let tone = matches.get_one::<f64>("tone").copied().unwrap_or(440.0);

    let display = TestPatternDisplay::new(config.frame_rate);
    let audio = ToneInput::new(tone, config.sample_rate, config.channels);
    let controller = RecordingController::new(SoftBackend::new(), config)?;
    let handle = controller.start(Box::new(display), Some(Box::new(audio)), &output)?;
    log::info!("recording {} to {}", handle.id, handle.output_path.display());

    let half = Duration::from_millis(seconds * 500);
    thread::sleep(half);
    if matches.get_flag("pause") {
        controller.pause()?;
        thread::sleep(Duration::from_secs(1));
        controller.resume()?;
    }
    thread::sleep(half);

    let Some(result) = controller.stop()? else {
        return Err(CaptureError::Timeout);
    };
    let contents = read_container(&result.file_path)?;
    println!("{}", result.file_path.display());
    println!("  duration  {:.2}s", result.duration_secs);
    println!("  checksum  {}", result.checksum);
    for (track, samples) in contents.tracks.iter().zip(&contents.samples_per_track) {
        println!("  {:?} {:?}: {} samples", track.track_type(), track.codec(), samples);
    }
    if let Some(video) = result.metadata.video {
        println!(
            "  frames    {} fresh, {} filler, {} submitted",
            video.fresh_frames, video.filler_frames, video.frames_submitted
        );
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        log::error!("recording failed: {}", e);
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
