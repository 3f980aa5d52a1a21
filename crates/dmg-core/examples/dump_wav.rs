use std::{
    error::Error,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::Parser;
use dmg_core::{
    apu::{AudioConfig, StereoSample},
    gameboy::GameBoy,
};

/// Run a ROM headless and write its audio output to a WAV file.
#[derive(Parser, Debug)]
struct Args {
    rom: PathBuf,
    output: PathBuf,

    #[arg(long, default_value_t = 3.0)]
    seconds: f64,

    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,

    /// Disable the output high-pass filter.
    #[arg(long)]
    raw: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();
    if args.seconds <= 0.0 {
        return Err("seconds must be positive".into());
    }

    let config = AudioConfig::default()
        .with_sample_rate(args.sample_rate)
        .with_high_pass_filter(!args.raw);
    let mut gb = GameBoy::with_audio_config(config)?;
    gb.load_rom(fs::read(&args.rom)?)?;

    let captured: Arc<Mutex<Vec<StereoSample>>> = Arc::default();
    let sink = Arc::clone(&captured);
    gb.set_playback(Box::new(move |buffer| {
        if let Ok(mut samples) = sink.lock() {
            samples.extend(buffer);
        }
    }));

    let wanted = (args.seconds * args.sample_rate as f64).ceil() as usize;
    loop {
        if captured.lock().map_err(|_| "sample sink poisoned")?.len() >= wanted {
            break;
        }
        if let Err(err) = gb.run_frame() {
            eprintln!("stopping early: {err}");
            break;
        }
    }

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: args.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)?;
    let samples = captured.lock().map_err(|_| "sample sink poisoned")?;
    for sample in samples.iter().take(wanted) {
        writer.write_sample(to_pcm(sample.left))?;
        writer.write_sample(to_pcm(sample.right))?;
    }
    writer.finalize()?;

    println!(
        "wrote {} stereo frames to {}",
        samples.len().min(wanted),
        args.output.display()
    );
    Ok(())
}

fn to_pcm(level: f32) -> i16 {
    (level.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
