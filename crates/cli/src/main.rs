use std::path::PathBuf;
use std::time::Duration;

use analysis::{AnalysisBoard, AnalysisMessage, AnalysisVisualizer, Feed};
use anyhow::{bail, Context, Result};
use clap::Parser;
use jobs::{FsLoader, JobsRuntime};
use scheduler::{spawn_player, PlayerEvent, PlayerHandle, PlayerRuntime, SchedulerConfig};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

mod controls;

use controls::Control;

/// Replays a recorded video-analysis stream through the step scheduler.
#[derive(Parser, Debug)]
#[command(name = "analysis-replay", version)]
struct Args {
    /// JSON-lines recording of analysis messages (stdin when omitted)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Directory holding `<video-id>/minividNNNN.png` frames
    #[arg(long)]
    frames_dir: Option<PathBuf>,
    #[arg(long, default_value = "video")]
    video_id: String,
    /// Playback delay in milliseconds (100 unless set here or in --config)
    #[arg(long)]
    delay_ms: Option<u64>,
    /// Wait between two recorded messages, in milliseconds
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,
    /// Preload worker threads
    #[arg(long, default_value_t = 4)]
    workers: usize,
    #[arg(long, default_value_t = analysis::board::DEFAULT_TAGS_LIMIT)]
    tags_limit: usize,
    /// JSON file with scheduler settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read transport commands from stdin (play, pause, step, back, faster, slower, reverse, goto <id>, reset, quit)
    #[arg(long)]
    controls: bool,
}

fn default_frames_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    base.join("media-analysis").join("minivids")
}

fn load_config(args: &Args) -> Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SchedulerConfig::with_delay(Duration::from_millis(100)),
    };
    if let Some(delay) = args.delay_ms {
        config.delay_ms = delay;
    }
    Ok(config)
}

/// Feeds every recorded message to the player. Returns the number of steps scheduled.
async fn replay<R: AsyncBufRead + Unpin>(reader: R, player: PlayerHandle, pace: Duration) -> Result<usize> {
    let mut feed = Feed::new();
    let mut lines = reader.lines();
    let mut scheduled = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let msg = match AnalysisMessage::parse(&line) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("[replay] skipping line: {e}");
                continue;
            }
        };
        // Server errors are logged by the feed and schedule nothing.
        if let Ok(steps) = feed.plan(msg) {
            scheduled += steps.len();
            steps.into_iter().for_each(|step| step.send_to(&player));
        }
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }
    if !feed.finished() {
        tracing::warn!("[replay] recording ended before the analysis finished");
    }
    Ok(scheduled)
}

/// Starts replaying the recording from its first message with a fresh feed.
async fn spawn_replay(args: &Args, player: PlayerHandle) -> Result<JoinHandle<Result<usize>>> {
    let pace = Duration::from_millis(args.pace_ms);
    Ok(match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.with_context(|| format!("opening {}", path.display()))?;
            tokio::spawn(replay(BufReader::new(file), player, pace))
        }
        None => tokio::spawn(replay(BufReader::new(tokio::io::stdin()), player, pace)),
    })
}

async fn read_controls(tx: UnboundedSender<Control>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.parse::<Control>() {
            Ok(Control::Quit) => break,
            Ok(control) => {
                let _ = tx.send(control);
            }
            Err(e) => eprintln!("{e}"),
        }
    }
    let _ = tx.send(Control::Quit);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();
    if args.controls && args.input.is_none() {
        bail!("--controls reads stdin, pass the recording with --input");
    }
    let config = load_config(&args)?;
    let frames_dir = args.frames_dir.clone().unwrap_or_else(default_frames_dir);
    tracing::info!("[replay] frames from {}, delay {}ms", frames_dir.display(), config.delay_ms);

    let jobs = JobsRuntime::start(FsLoader::new(frames_dir), args.workers);
    let visualizer = AnalysisVisualizer::new(args.video_id.clone(), jobs, AnalysisBoard::new(args.tags_limit));
    let PlayerRuntime { handle: player, mut rx_events, task } = spawn_player(visualizer, config);
    player.play();

    let mut reader = spawn_replay(&args, player.clone()).await?;
    let (tx_controls, mut rx_controls) = mpsc::unbounded_channel();
    if args.controls {
        tokio::spawn(async move {
            if let Err(e) = read_controls(tx_controls).await {
                tracing::error!("[replay] controls: {e:#}");
            }
        });
    }

    let mut scheduled = None;
    let mut executed = 0usize;
    let mut stopping = false;
    loop {
        tokio::select! {
            res = &mut reader, if scheduled.is_none() => {
                let count = res.context("replay task panicked")??;
                tracing::info!("[replay] recording drained, {count} steps scheduled");
                scheduled = Some(count);
            }
            Some(control) = rx_controls.recv(), if args.controls => match control {
                Control::Reset => {
                    // Stop feeding the old session before the scheduler drops its steps.
                    if scheduled.is_none() {
                        reader.abort();
                        let _ = (&mut reader).await;
                    }
                    player.reset();
                    reader = spawn_replay(&args, player.clone()).await?;
                    scheduled = None;
                    executed = 0;
                    tracing::info!("[replay] reset, feeding the recording again");
                }
                Control::Quit => {
                    stopping = true;
                    player.stop();
                }
                control => control.apply(&player),
            },
            event = rx_events.recv() => match event {
                Some(PlayerEvent::Executed(report)) => {
                    executed += 1;
                    tracing::info!(
                        "[replay] {} exec={:?} wait={:?} prep={:?}",
                        report.id, report.execution, report.execution_delay, report.preparation
                    );
                }
                Some(PlayerEvent::DelayChanged(delay)) => tracing::info!("[replay] delay {delay:?}"),
                Some(PlayerEvent::ReverseLock(locked)) => tracing::info!("[replay] reverse lock {locked}"),
                Some(PlayerEvent::Rejected(e)) => tracing::warn!("[replay] {e}"),
                Some(PlayerEvent::Stopped) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                stopping = true;
                player.stop();
            }
        }
        // Without controls the replay ends once every scheduled step played.
        if !args.controls && !stopping && scheduled.is_some_and(|n| executed >= n) {
            stopping = true;
            player.stop();
        }
    }

    let visualizer = task.await.context("player task failed")?;
    let summary = visualizer.into_board().summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
