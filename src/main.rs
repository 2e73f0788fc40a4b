use anyhow::{Context, Result, bail};
use camden::camera::{
    CameraDevice, CaptureTarget, CommandCamera, DirectoryMediaLibrary, SimulatedCamera,
};
use camden::clock::TokioClock;
use camden::config::{AppConfig, ensure_sample_config};
use camden::controller::{
    CaptureSession, ControlCommand, SessionEvent, SessionOutcome, SessionSettings,
};
use camden::countdown::Countdown;
use camden::paths::{default_config_path, default_data_dir};
use camden::permissions::{
    HostPermissionGate, PermissionGate, StaticPermissionGate, permission_help_message,
};
use camden::photos::PhotoStore;
use camden::plan::{CapturePlan, ShotType};
use camden::presets::{PresetDraft, PresetStore};
use camden::sequencer::Phase;
use camden::share::{ShareOutcome, SystemShare, share_photo};
use camden::store::FileKeyValueStore;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "camden")]
#[command(about = "Hand the camera to your subject and let it shoot timed bursts in both orientations")]
struct Cli {
    /// Directory holding presets, the photo list and captures.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a capture session from a preset or ad-hoc counts.
    Shoot(ShootArgs),
    #[command(subcommand)]
    Presets(PresetCommand),
    #[command(subcommand)]
    Gallery(GalleryCommand),
    /// Write a commented sample config if none exists.
    InitConfig,
}

#[derive(Debug, Args, Clone)]
struct SessionArgs {
    /// Use a simulated camera that writes placeholder frames.
    #[arg(long, action = ArgAction::SetTrue)]
    simulate: bool,

    /// Press the shutter and return automatically instead of reading stdin.
    #[arg(long, action = ArgAction::SetTrue)]
    auto: bool,
}

#[derive(Debug, Args, Clone)]
struct ShootArgs {
    #[arg(long, conflicts_with_all = ["horizontal", "vertical", "interval", "shot_type"])]
    preset: Option<String>,

    #[arg(long, default_value_t = 0)]
    horizontal: u32,

    #[arg(long, default_value_t = 0)]
    vertical: u32,

    #[arg(long, default_value = "3s", value_parser = parse_duration)]
    interval: Duration,

    #[arg(long, default_value = "portrait")]
    shot_type: ShotType,

    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Subcommand)]
enum PresetCommand {
    List,
    /// Create a preset, or edit one when --id is given.
    Save(SavePresetArgs),
    Delete {
        id: String,
    },
}

#[derive(Debug, Args, Clone)]
struct SavePresetArgs {
    #[arg(long)]
    id: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    shot_type: Option<ShotType>,

    #[arg(long)]
    horizontal: Option<String>,

    #[arg(long)]
    vertical: Option<String>,

    /// Seconds between shots.
    #[arg(long)]
    frequency: Option<String>,

    /// Start a session with the saved preset.
    #[arg(long, action = ArgAction::SetTrue)]
    shoot: bool,

    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Subcommand)]
enum GalleryCommand {
    List,
    /// Remove a photo from the camera roll. The image file is left in place.
    Delete {
        id: String,
    },
    Share {
        id: String,
    },
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

struct AppContext {
    data_dir: PathBuf,
    config: AppConfig,
    store: Arc<FileKeyValueStore>,
}

impl AppContext {
    fn load(cli: &Cli) -> Result<Self> {
        let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
        let config_path = cli.config.clone().unwrap_or_else(default_config_path);
        let config = AppConfig::load(&config_path)?;
        Ok(Self {
            store: Arc::new(FileKeyValueStore::new(&data_dir)),
            data_dir,
            config,
        })
    }

    fn presets(&self) -> PresetStore {
        PresetStore::new(self.store.clone())
    }

    fn photos(&self) -> PhotoStore {
        PhotoStore::new(self.store.clone())
    }

    fn capture_session(&self, simulate: bool) -> Result<CaptureSession> {
        let capture_dir = self.config.capture_dir(&self.data_dir);
        let (camera, permissions, media_dir): (
            Arc<dyn CameraDevice>,
            Arc<dyn PermissionGate>,
            PathBuf,
        ) = if simulate {
            (
                Arc::new(SimulatedCamera::new(capture_dir)),
                Arc::new(StaticPermissionGate::granted()),
                self.data_dir.join("simulated-library"),
            )
        } else {
            let camera = CommandCamera::new(
                &self.config.camera.command,
                CaptureTarget {
                    output_dir: capture_dir,
                    filename_prefix: "camden".to_string(),
                    extension: "jpg".to_string(),
                    headroom: self.config.disk_headroom(),
                },
                self.config.capture_timeout(),
            )?;
            let media_dir = self.config.storage.media_library_dir.clone();
            let permissions = HostPermissionGate::new(camera.program(), &media_dir);
            (Arc::new(camera), Arc::new(permissions), media_dir)
        };

        Ok(CaptureSession::new(
            camera,
            Arc::new(DirectoryMediaLibrary::new(media_dir)),
            permissions,
            self.photos(),
            Arc::new(TokioClock),
            SessionSettings {
                countdown: Countdown::new(self.config.session.countdown_from),
                quality: self.config.camera.quality,
            },
        ))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=camden=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::InitConfig) {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if ensure_sample_config(&path)? {
            println!("wrote sample config to {}", path.display());
        } else {
            println!("config already exists at {}", path.display());
        }
        return Ok(());
    }

    let context = AppContext::load(&cli)?;

    match cli.command {
        Commands::Shoot(args) => {
            let plan = match &args.preset {
                Some(id) => context
                    .presets()
                    .find(id)
                    .with_context(|| format!("no preset with id {id}"))?
                    .to_plan(),
                None => CapturePlan {
                    shot_type: args.shot_type,
                    horizontal_count: args.horizontal,
                    vertical_count: args.vertical,
                    interval: args.interval,
                },
            };
            run_session(&context, plan, &args.session).await
        }
        Commands::Presets(command) => run_presets(&context, command).await,
        Commands::Gallery(command) => run_gallery(&context, command).await,
        Commands::InitConfig => Ok(()),
    }
}

async fn run_presets(context: &AppContext, command: PresetCommand) -> Result<()> {
    let presets = context.presets();
    match command {
        PresetCommand::List => {
            let all = presets.list();
            if all.is_empty() {
                println!("no presets yet. create one with `camden presets save`");
            }
            for preset in all {
                println!("{}  {}  {}", preset.id, preset.name, preset.summary_line());
            }
            Ok(())
        }
        PresetCommand::Save(args) => {
            let mut draft = match args.id.as_deref().and_then(|id| presets.find(id)) {
                Some(existing) => PresetDraft::from_preset(&existing),
                None => PresetDraft {
                    id: args.id.clone(),
                    ..PresetDraft::default()
                },
            };
            if let Some(name) = args.name {
                draft.name = name;
            }
            if let Some(shot_type) = args.shot_type {
                draft.shot_type = shot_type;
            }
            if let Some(horizontal) = args.horizontal {
                draft.horizontal_count = horizontal;
            }
            if let Some(vertical) = args.vertical {
                draft.vertical_count = vertical;
            }
            if let Some(frequency) = args.frequency {
                draft.frequency = frequency;
            }

            let preset = presets.upsert(draft)?;
            println!("saved preset {} ({})", preset.id, preset.name);
            if args.shoot {
                run_session(context, preset.to_plan(), &args.session).await?;
            }
            Ok(())
        }
        PresetCommand::Delete { id } => {
            if !presets.delete(&id)? {
                bail!("no preset with id {id}");
            }
            println!("deleted preset {id}");
            Ok(())
        }
    }
}

async fn run_gallery(context: &AppContext, command: GalleryCommand) -> Result<()> {
    let photos = context.photos();
    match command {
        GalleryCommand::List => {
            let gallery = photos.gallery();
            if gallery.is_empty() {
                println!("camera roll is empty");
            }
            for photo in gallery {
                let taken = photo
                    .taken_at()
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| photo.timestamp.to_string());
                println!("{}  {}  {}", photo.id, taken, photo.uri.display());
            }
            Ok(())
        }
        GalleryCommand::Delete { id } => {
            if !photos.delete(&id)? {
                bail!("no photo with id {id}");
            }
            println!("removed photo {id} from the camera roll");
            Ok(())
        }
        GalleryCommand::Share { id } => {
            let photo = photos
                .find(&id)
                .with_context(|| format!("no photo with id {id}"))?;
            match share_photo(&SystemShare, &photo.uri).await? {
                ShareOutcome::Shared => println!("opened {}", photo.uri.display()),
                ShareOutcome::Unavailable => eprintln!("sharing is not available on this system"),
                ShareOutcome::MissingFile => {
                    eprintln!("image file {} no longer exists", photo.uri.display())
                }
            }
            Ok(())
        }
    }
}

async fn run_session(context: &AppContext, plan: CapturePlan, args: &SessionArgs) -> Result<()> {
    let session = context.capture_session(args.simulate)?;
    println!(
        "{} shot: {} horizontal, {} vertical, {} between shots",
        plan.shot_type,
        plan.horizontal_count,
        plan.vertical_count,
        humantime::format_duration(plan.interval)
    );

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let complete = Arc::new(AtomicBool::new(false));
    let auto_tx = args.auto.then(|| command_tx.clone());

    let complete_flag = complete.clone();
    let event_handle = tokio::spawn(async move {
        let mut permission_prompts = 0;
        while let Some(event) = event_rx.recv().await {
            let reply = match event {
                SessionEvent::Started { status } => {
                    println!("{status}");
                    None
                }
                SessionEvent::PermissionRequired(snapshot) => {
                    permission_prompts += 1;
                    eprintln!("{}", permission_help_message(&snapshot));
                    eprintln!("type 'grant' to request access or 'back' to leave");
                    if permission_prompts == 1 {
                        Some(ControlCommand::RequestPermissions)
                    } else {
                        Some(ControlCommand::Return)
                    }
                }
                SessionEvent::PhaseChanged {
                    phase,
                    prompt,
                    status,
                } => {
                    if let Some(prompt) = prompt {
                        println!(">> {prompt}");
                    }
                    match phase {
                        Phase::Waiting(_) => {
                            println!("{status}");
                            println!("press Enter to fire the shutter ('back' to leave)");
                            Some(ControlCommand::Shutter)
                        }
                        Phase::Countdown(_) => None,
                        Phase::Capturing(orientation) => {
                            println!("capturing {orientation} shots...");
                            None
                        }
                        Phase::Complete => {
                            complete_flag.store(true, Ordering::SeqCst);
                            println!("press Enter to return");
                            Some(ControlCommand::Return)
                        }
                    }
                }
                SessionEvent::CountdownTick { remaining } => {
                    if remaining > 0 {
                        println!("{remaining}...");
                    }
                    None
                }
                SessionEvent::ShotCaptured {
                    orientation,
                    shot,
                    planned,
                    uri,
                    ..
                } => {
                    println!("{orientation} {shot}/{planned} saved: {}", uri.display());
                    None
                }
                SessionEvent::CaptureFailed {
                    orientation,
                    shot,
                    message,
                } => {
                    eprintln!("Error: failed to take photo ({orientation} shot {shot}): {message}");
                    None
                }
                SessionEvent::Ended(_) => None,
            };

            if let (Some(tx), Some(command)) = (auto_tx.as_ref(), reply) {
                let _ = tx.send(command);
            }
        }
    });

    if !args.auto {
        spawn_stdin_controls(command_tx.clone(), complete);
    }
    drop(command_tx);

    let summary = session.run(plan, command_rx, Some(event_tx)).await?;
    event_handle.await.context("event task failed")?;

    let outcome = match summary.outcome {
        SessionOutcome::Completed => "completed",
        SessionOutcome::Cancelled => "cancelled",
        SessionOutcome::PermissionDenied => "blocked by missing permissions",
    };
    println!(
        "session {outcome}: {} horizontal, {} vertical",
        summary.horizontal_taken, summary.vertical_taken
    );
    if summary.failures > 0 {
        eprintln!("{} batch(es) interrupted by camera errors", summary.failures);
    }
    Ok(())
}

/// Reads session controls from stdin on a detached thread so a blocked read
/// never holds the runtime open.
fn spawn_stdin_controls(tx: mpsc::UnboundedSender<ControlCommand>, complete: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let command = match line.trim().to_ascii_lowercase().as_str() {
                "" if complete.load(Ordering::SeqCst) => Some(ControlCommand::Return),
                "" | "shutter" | "s" => Some(ControlCommand::Shutter),
                "grant" => Some(ControlCommand::RequestPermissions),
                "back" | "cancel" | "return" | "quit" | "q" => Some(ControlCommand::Return),
                _ => {
                    eprintln!("unknown command. use: <Enter> | shutter | grant | back");
                    None
                }
            };

            if let Some(command) = command {
                if tx.send(command).is_err() {
                    break;
                }
            }
        }
    });
}
