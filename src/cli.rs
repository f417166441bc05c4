use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::ambient::AmbientScene;
use crate::api::{ApiBase, HttpAnalysisService};
use crate::capture::FileMeta;
use crate::config::ClientConfig;
use crate::countdown::CountdownDisplay;
use crate::engine::{SceneSupport, Viewport};
use crate::gpu::renderer::WgpuBackend;
use crate::media::NoCamera;
use crate::mesh_asset::MeshAsset;
use crate::session::{Command, Effect, Session, SharePlatform};
use crate::viewer::DetailViewer;
use crate::workflow::{NoticeKind, ShareRequest, Stage, WorkflowController};

/// Progress is printed at this interval while a request is in flight.
const TICK: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file overriding the default client settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service base URL (defaults to http://127.0.0.1:<service_port>)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Shorten the countdown and skip scene rendering, as with a reduced-motion preference
    #[arg(long, global = true)]
    reduced_motion: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a photo and print the playlist
    Analyze {
        /// Image file (jpg, png, ...)
        #[arg(long)]
        image: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Copy the share digest to stdout afterwards
        #[arg(long)]
        share: bool,
    },
    /// Describe a mood in words and print the playlist
    Mood {
        #[arg(long)]
        text: String,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        share: bool,
    },
    /// Render the ambient backdrop to PNG frames
    RenderAmbient {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 120)]
        frames: u32,

        #[arg(long, default_value_t = 60.0)]
        fps: f64,

        #[arg(long, default_value_t = 960)]
        width: u32,

        #[arg(long, default_value_t = 540)]
        height: u32,

        /// Placement seed (defaults to the config seed, then the clock)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Render an OBJ model in the detail viewer to PNG frames
    RenderModel {
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 90)]
        frames: u32,

        #[arg(long, default_value_t = 30.0)]
        fps: f64,

        #[arg(long, default_value_t = 720)]
        width: u32,

        #[arg(long, default_value_t = 540)]
        height: u32,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    let api_base = match cli.api_base {
        Some(base) => ApiBase::new(base),
        None => ApiBase::new(format!("http://127.0.0.1:{}", config.service_port)),
    };

    match cli.command {
        Commands::Analyze { image, json, share } => {
            let runtime = current_thread_runtime()?;
            runtime.block_on(analyze_image(config, api_base, cli.reduced_motion, &image, json, share))?;
        }
        Commands::Mood { text, json, share } => {
            let runtime = current_thread_runtime()?;
            runtime.block_on(analyze_mood(config, api_base, cli.reduced_motion, text, json, share))?;
        }
        Commands::RenderAmbient { out, frames, fps, width, height, seed } => {
            config.scene.seed = Some(seed.or(config.scene.seed).unwrap_or_else(clock_seed));
            let support = scene_support(cli.reduced_motion, width);
            pollster::block_on(render_ambient(&config, support, out, frames, fps, width, height))?;
        }
        Commands::RenderModel { model, out, frames, fps, width, height } => {
            let support = scene_support(cli.reduced_motion, width);
            pollster::block_on(render_model(&config, support, &model, out, frames, fps, width, height))?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::default());
    };
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
    ClientConfig::from_json(&contents).with_context(|| format!("parsing config {:?}", path))
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread().enable_all().build()?)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

fn scene_support(reduced_motion: bool, width: u32) -> SceneSupport {
    SceneSupport {
        has_graphics: true,
        reduced_motion,
        viewport_width: width as f64,
    }
}

/// "Clipboard" for the terminal: the digest goes to stdout.
struct StdoutShare;

impl SharePlatform for StdoutShare {
    fn can_share(&self) -> bool {
        false
    }

    async fn share(&self, _request: &ShareRequest) -> Result<(), String> {
        Err("no share sheet in a terminal".to_string())
    }

    async fn copy_text(&self, text: &str) -> Result<(), String> {
        println!("\n{}", text);
        Ok(())
    }
}

type CliSession = Session<HttpAnalysisService, NoCamera, StdoutShare>;

fn new_session(config: ClientConfig, api_base: ApiBase, reduced_motion: bool) -> CliSession {
    let page_url = api_base.as_str().to_string();
    let controller = WorkflowController::new(config, reduced_motion);
    let start = Instant::now();
    let mut session = Session::new(
        controller,
        HttpAnalysisService::new(api_base),
        NoCamera,
        StdoutShare,
        move || start.elapsed().as_secs_f64(),
    );
    session.set_page_url(page_url);
    session
}

/// Dispatch a command, ticking the countdown until it settles.
async fn drive(session: &CliSession, command: Command) -> Effect {
    let dispatch = session.dispatch(command);
    tokio::pin!(dispatch);
    let mut interval = tokio::time::interval(TICK);

    loop {
        tokio::select! {
            effect = &mut dispatch => return effect,
            _ = interval.tick() => {
                if let Some(display) = session.tick() {
                    print_progress(&display);
                }
            }
        }
    }
}

fn print_progress(display: &CountdownDisplay) {
    if !display.visible {
        return;
    }
    use std::io::Write;
    print!("\r{:>3.0}% {:>2}s {:<24}", display.progress_pct, display.remaining, display.caption);
    let _ = std::io::stdout().flush();
}

/// Print pending notices. Returns the last error, if any.
fn flush_notices(session: &CliSession) -> Option<String> {
    let notices = session.controller().borrow_mut().drain_notices();
    let mut last_error = None;
    for notice in notices {
        match notice.kind {
            NoticeKind::Error => {
                eprintln!("\n{}", notice.message);
                last_error = Some(notice.message);
            }
            NoticeKind::Success | NoticeKind::Info => println!("\n{}", notice.message),
        }
    }
    last_error
}

async fn analyze_image(
    config: ClientConfig,
    api_base: ApiBase,
    reduced_motion: bool,
    path: &Path,
    json: bool,
    share: bool,
) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {:?}", path))?;
    let mime = image::ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(&bytes))
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let meta = FileMeta::new(name, mime, bytes.len() as u64);

    let session = new_session(config, api_base, reduced_motion);

    let Effect::ReadFile(token) = session.dispatch(Command::SelectFile(meta.clone())).await else {
        let message = flush_notices(&session).unwrap_or_else(|| "file rejected".to_string());
        bail!(message);
    };
    session.dispatch(Command::FileLoaded { token, meta, bytes }).await;
    if let Some(message) = flush_notices(&session) {
        bail!(message);
    }

    drive(&session, Command::SubmitImage).await;
    finish(&session, json, share).await
}

async fn analyze_mood(
    config: ClientConfig,
    api_base: ApiBase,
    reduced_motion: bool,
    text: String,
    json: bool,
    share: bool,
) -> Result<()> {
    let session = new_session(config, api_base, reduced_motion);
    drive(&session, Command::SubmitMood(text)).await;
    finish(&session, json, share).await
}

async fn finish(session: &CliSession, json: bool, share: bool) -> Result<()> {
    let last_error = flush_notices(session);

    let view = {
        let controller = session.controller();
        let controller = controller.borrow();
        if controller.stage() != Stage::Results {
            return Err(anyhow!(last_error.unwrap_or_else(|| "analysis failed".to_string())));
        }
        controller.view(session.now())
    };
    let result = view.result.ok_or_else(|| anyhow!("no result to show"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} {}", result.icon, result.title);
        println!("{}", result.description);
        println!("{}", result.confidence_text);
        for chip in &result.breakdown {
            println!("  {}", chip);
        }
        println!();
        for (rank, track) in result.tracks.iter().enumerate() {
            println!("{}. {} – {}", rank + 1, track.title, track.artist);
            println!("   {}", track.reason);
            println!("   YouTube: {}", track.youtube);
            println!("   Spotify: {}", track.spotify);
        }
        if let Some(summary) = &result.curator_summary {
            println!("\n{}", summary);
        }
    }

    if share {
        session.dispatch(Command::Share).await;
        flush_notices(session);
    }
    Ok(())
}

fn save_frame(out_dir: &Path, index: u32, pixels: &[u8], width: u32, height: u32) -> Result<()> {
    let frame_path = out_dir.join(format!("frame_{:05}.png", index));
    image::save_buffer(&frame_path, pixels, width, height, image::ColorType::Rgba8)?;
    Ok(())
}

fn print_tick(index: u32) -> Result<()> {
    if index % 60 == 0 {
        use std::io::Write;
        print!(".");
        std::io::stdout().flush()?;
    }
    Ok(())
}

async fn render_ambient(
    config: &ClientConfig,
    support: SceneSupport,
    out_dir: PathBuf,
    frames: u32,
    fps: f64,
    width: u32,
    height: u32,
) -> Result<()> {
    if fps <= 0.0 {
        bail!("fps must be positive");
    }
    let scene_config = &config.scene;
    let viewport = Viewport::fit(
        width as f64,
        height as f64,
        scene_config.min_ambient_height,
        1.0,
        scene_config.ambient_max_pixel_ratio,
    );
    let (pw, ph) = viewport.physical_size();

    std::fs::create_dir_all(&out_dir)?;
    let backend = WgpuBackend::new_offscreen(pw, ph).await?;
    let mut scene = AmbientScene::new(&support, backend, viewport, scene_config)?;

    println!("Rendering {} frames to {:?}...", frames, out_dir);
    for i in 0..frames {
        scene.frame(i as f64 / fps)?;
        let pixels = scene.backend().ok_or_else(|| anyhow!("scene disposed"))?.read_frame()?;
        save_frame(&out_dir, i, &pixels, pw, ph)?;
        print_tick(i)?;
    }
    scene.dispose();
    println!("\nDone.");

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn render_model(
    config: &ClientConfig,
    support: SceneSupport,
    model_path: &Path,
    out_dir: PathBuf,
    frames: u32,
    fps: f64,
    width: u32,
    height: u32,
) -> Result<()> {
    if fps <= 0.0 {
        bail!("fps must be positive");
    }
    let contents = std::fs::read_to_string(model_path).with_context(|| format!("reading {:?}", model_path))?;
    let name = model_path.display().to_string();
    let asset = MeshAsset::from_obj(name, &contents)?;

    let viewport = Viewport::fit(width as f64, height as f64, 1.0, 1.0, config.scene.viewer_max_pixel_ratio);
    let (pw, ph) = viewport.physical_size();

    std::fs::create_dir_all(&out_dir)?;
    let backend = WgpuBackend::new_offscreen(pw, ph).await?;
    let mut viewer = DetailViewer::new(&support, backend, viewport)?;
    viewer.set_model(&asset)?;

    println!("Rendering {} frames of {:?} to {:?}...", frames, model_path, out_dir);
    for i in 0..frames {
        viewer.frame(i as f64 / fps)?;
        let pixels = viewer.backend().ok_or_else(|| anyhow!("viewer disposed"))?.read_frame()?;
        save_frame(&out_dir, i, &pixels, pw, ph)?;
        print_tick(i)?;
    }
    viewer.dispose();
    println!("\nDone.");

    Ok(())
}
