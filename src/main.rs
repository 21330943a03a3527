use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use huddle::daemon::{build_collaborators, intent_router};
use huddle::intent::RouteContext;
use huddle::session::SessionMode;
use huddle::voice::{AudioOutput, Microphone, frame_energy};
use huddle::{Config, Daemon};

/// Huddle - a voice assistant for group voice chats
#[derive(Parser)]
#[command(name = "huddle", version, about)]
struct Cli {
    /// Mode of the local session: normal, silent, free or transcribe
    #[arg(short, long, env = "HUDDLE_MODE", default_value = "normal")]
    mode: SessionMode,

    /// Only serve text commands; do not open the local microphone
    #[arg(long, env = "HUDDLE_NO_LOCAL")]
    no_local: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Print the intent a transcript would be classified as
    Classify {
        /// Transcript to classify
        text: String,
        /// Classify as if the session were busy or speaking
        #[arg(long)]
        busy: bool,
        /// Classify as if trigger words were not required
        #[arg(long)]
        free: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,huddle=info",
        1 => "info,huddle=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::Classify { text, busy, free } => {
                classify(&text, busy, free);
                Ok(())
            }
        };
    }

    tracing::info!(mode = %cli.mode, "starting huddle");

    let config = Config::load();
    tracing::debug!(?config, "loaded configuration");

    let mut daemon = Daemon::new(config, cli.mode);
    if cli.no_local {
        daemon = daemon.without_local_session();
    }

    daemon.run().await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load();
    let (tx, mut frames) = tokio::sync::mpsc::unbounded_channel();
    let mic = Microphone::open(config.audio.sample_rate, move |frame| {
        let _ = tx.send(frame);
    })?;

    println!("Sample rate: {} Hz", mic.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut samples = Vec::new();
        while let Ok(frame) = frames.try_recv() {
            samples.extend(frame.samples);
        }
        let energy = frame_energy(&samples);
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        let marker = if energy > config.audio.energy_threshold {
            "speech"
        } else {
            "quiet"
        };
        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:5} | [{meter}] {marker}", i + 1);
    }

    drop(mic);

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!(
        "Frames above {:.4} RMS count as speech; adjust audio.energy_threshold if needed.",
        config.audio.energy_threshold
    );

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {sample_rate} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        AudioOutput::new(Arc::new(AtomicBool::new(false))).play_samples_blocking(
            samples,
            sample_rate,
            1.0,
        )
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Test the configured speech synthesizer
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load();
    let collaborators = build_collaborators(&config)?;

    println!("Synthesizing speech...");
    let mut audio = collaborators.synthesizer.synthesize(text).await?;
    println!("Received {} bytes of audio", audio.len());

    if let Some(converter) = &collaborators.converter {
        println!("Converting voice...");
        audio = converter.convert(audio, converter.default_query()).await?;
    }

    println!("Playing...");
    let volume = config.playback.volume;
    tokio::task::spawn_blocking(move || {
        AudioOutput::new(Arc::new(AtomicBool::new(false))).play_mp3_blocking(&audio, volume)
    })
    .await??;

    println!("\n---");
    println!("TTS test complete!");

    Ok(())
}

/// Print the classification of `text`
fn classify(text: &str, busy: bool, free: bool) {
    let config = Config::load();
    let router = intent_router(&config);
    let ctx = RouteContext {
        interruptible: busy,
        trigger_free: free,
    };

    println!("{}", router.classify(text, ctx));
}
