use anyhow::{Context, Result};
use clap::Parser;
use live_voice::config::Config;
use live_voice::session::{Command, Session, SessionConfig, SessionUpdate};
use live_voice::types::audio::{Modality, Voice};
use live_voice::{client, utils, CpalBackend, GeminiConnector};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Talk to a Gemini Live model through the local microphone and speakers")]
struct Cli {
    /// Print the available audio devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Input device name (defaults to INPUT_DEVICE, then the host default)
    #[arg(long)]
    input_device: Option<String>,
    /// Output device name (defaults to OUTPUT_DEVICE, then the host default)
    #[arg(long)]
    output_device: Option<String>,
    /// Prebuilt voice, e.g. Zephyr or Puck
    #[arg(long)]
    voice: Option<String>,
    /// Live model name
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    if args.list_devices {
        println!("Input devices:\n{}", utils::device::get_available_inputs()?);
        println!("Output devices:\n{}", utils::device::get_available_outputs()?);
        return Ok(());
    }

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;
    if let Some(voice) = args.voice {
        config.voice = voice.parse::<Voice>().unwrap_or_else(|never| match never {});
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if args.input_device.is_some() {
        config.input_device = args.input_device;
    }
    if args.output_device.is_some() {
        config.output_device = args.output_device;
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    tracing::info!(
        "Configuration loaded. model={}, voice={}",
        config.model,
        config.voice.as_str()
    );

    // --- 3. Build the session ---
    let setup = live_voice::types::Session::builder()
        .with_model(&config.model)
        .with_modalities(vec![Modality::Audio])
        .with_voice(config.voice.clone())
        .with_system_instruction(&config.system_instruction)
        .with_input_audio_transcription_enable()
        .with_output_audio_transcription_enable()
        .build();

    let client_config = client::Config::builder()
        .with_api_key(&config.gemini_api_key)
        .build();
    let backend = CpalBackend::new(config.input_device.clone(), config.output_device.clone());
    let mut session = Session::new(
        backend,
        GeminiConnector::new(client_config),
        SessionConfig::new(setup),
    );

    // --- 4. Print session updates ---
    let mut updates = session.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(SessionUpdate::State(state)) => println!("[{}]", state),
                Ok(SessionUpdate::Transcript(text)) => print!("{}", text),
                Ok(SessionUpdate::UserTranscript(text)) => println!("you: {}", text),
                Ok(SessionUpdate::Notification(note)) => {
                    println!("{:?}: {}", note.level, note.message)
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("update printer lagged by {} messages", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- 5. Keyboard control: Enter toggles, `q` quits ---
    let (command_tx, command_rx) = tokio::sync::mpsc::channel::<Command>(32);
    command_tx
        .send(Command::Start)
        .await
        .context("Failed to queue initial start")?;
    println!("Press Enter to start or stop the conversation, `q` then Enter to quit.");
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "q" | "quit" => break,
                "start" => Command::Start,
                "stop" => Command::Stop,
                _ => Command::Toggle,
            };
            if command_tx.send(command).await.is_err() {
                break;
            }
        }
    });

    // --- 6. Run until quit or Ctrl-C ---
    tokio::select! {
        _ = session.run(command_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down");
        }
    }
    session.stop();
    tracing::info!("Live voice session finished: {:?}", session.stats());
    Ok(())
}
