mod server;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use mien_core::time::now_unix_secs;
use mien_core::{
    Affect, Easing, ExpressionRequest, ExpressionTransitionEngine, ExpressionType, FocusEvent,
    GazeFocusTracker, PromptContext, build_prompt, parse_gaze_trace, parse_recommendation,
};
use mien_store::{LoadedConfig, ProfileStore, list_profiles, load_config};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rmcp::{ServiceExt, transport::stdio};

#[derive(Parser)]
#[command(name = "mien", about = "Character behavior engine CLI and MCP server")]
struct Cli {
    /// Character profile to use
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Outcome {
    Success,
    Failure,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Replay a recorded gaze trace and print focus events and expression changes
    Simulate {
        /// JSON array of gaze frames
        trace: PathBuf,

        /// Expression to show while a target is highlighted
        #[arg(long, default_value = "curious")]
        on_highlight: String,

        /// Print every frame's feature vector
        #[arg(long)]
        frames: bool,
    },

    /// Preview a blend from neutral into an expression, one line per tick
    Blend {
        /// Target expression
        expression: String,

        #[arg(long, default_value_t = 1.0)]
        intensity: f32,

        /// Blend duration in seconds (defaults to the configured transition time)
        #[arg(long)]
        duration: Option<f32>,

        /// Tick length in seconds
        #[arg(long, default_value_t = 0.1)]
        dt: f32,

        /// Easing curve (overrides the configured one)
        #[arg(long)]
        easing: Option<Easing>,
    },

    /// Record whether a response worked for an affect
    Record {
        affect: Affect,
        response: String,
        #[arg(value_enum)]
        outcome: Outcome,
    },

    /// Show the learned best response for an affect
    Best {
        affect: Affect,
    },

    /// Pick a response for an affect from a set of candidates
    Choose {
        affect: Affect,
        #[arg(required = true)]
        candidates: Vec<String>,
    },

    /// Parse generative-text output into an expression request
    Recommend {
        /// Free text, optionally containing a JSON object
        text: String,
    },

    /// Print a prompt asking a text generator for an expression
    Prompt {
        /// Current human affect
        affect: Option<Affect>,

        /// Extra context appended to the prompt
        #[arg(long)]
        focus: Option<String>,

        /// Mention that the user's gaze is being tracked
        #[arg(long)]
        gaze_active: bool,

        /// Leave the profile's interaction history out
        #[arg(long)]
        no_history: bool,
    },

    /// Show learner statistics
    Stats,

    /// List stored character profiles
    Profiles,

    /// Export the profile's learner to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Import a learner JSON file into the profile
    Import {
        /// Input file path
        path: PathBuf,
    },
}

fn data_dir() -> PathBuf {
    std::env::var("MIEN_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(mien_store::default_base_dir)
}

fn open_store(cli: &Cli) -> Result<ProfileStore> {
    let base_dir = data_dir();
    ProfileStore::open(cli.profile.as_deref(), Some(&base_dir))
        .context("failed to open profile store")
}

fn load_settings(cli: &Cli) -> Result<LoadedConfig> {
    let loaded = load_config(cli.config.as_deref(), &data_dir()).context("failed to load config")?;
    for warning in &loaded.warnings {
        eprintln!("config: {warning}");
    }
    Ok(loaded)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Simulate {
            trace,
            on_highlight,
            frames,
        } => cmd_simulate(&cli, trace, on_highlight, *frames),
        Commands::Blend {
            expression,
            intensity,
            duration,
            dt,
            easing,
        } => cmd_blend(&cli, expression, *intensity, *duration, *dt, *easing),
        Commands::Record {
            affect,
            response,
            outcome,
        } => cmd_record(&cli, *affect, response, *outcome),
        Commands::Best { affect } => cmd_best(&cli, *affect),
        Commands::Choose { affect, candidates } => cmd_choose(&cli, *affect, candidates),
        Commands::Recommend { text } => cmd_recommend(&cli, text),
        Commands::Prompt {
            affect,
            focus,
            gaze_active,
            no_history,
        } => cmd_prompt(&cli, *affect, focus.as_deref(), *gaze_active, *no_history),
        Commands::Stats => cmd_stats(&cli),
        Commands::Profiles => cmd_profiles(),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::Import { path } => cmd_import(&cli, path),
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    tracing::info!("starting MCP server for profile '{}'", store.profile_name());

    let server = server::MienServer::new(store, settings.behavior.learner)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;
    Ok(())
}

fn cmd_simulate(cli: &Cli, trace: &Path, on_highlight: &str, print_frames: bool) -> Result<()> {
    let settings = load_settings(cli)?;
    let json = std::fs::read_to_string(trace)
        .with_context(|| format!("failed to read {}", trace.display()))?;
    let frames = parse_gaze_trace(&json).context("invalid gaze trace")?;

    let highlight_kind = ExpressionType::parse(on_highlight);
    let mut tracker = GazeFocusTracker::new(settings.behavior.gaze.clone());
    let config = settings.behavior.expression.clone();
    let mut engine = ExpressionTransitionEngine::new(settings.expressions, config);

    let mut last_t = frames.first().map(|f| f.t).unwrap_or(0.0);
    let mut highlights = 0usize;
    for frame in &frames {
        let hit = frame.hit();
        for event in tracker.update(&frame.sample(), hit.as_ref(), frame.t).events() {
            println!("{:>8.3}  {:<13} {}", frame.t, event_name(&event), event.target());
            match event {
                FocusEvent::Highlighted(_) => {
                    highlights += 1;
                    engine.set_expression(highlight_kind.clone(), 1.0, None);
                }
                FocusEvent::FocusEnded(_) => {
                    engine.set_expression(ExpressionType::Neutral, 0.0, None);
                }
                FocusEvent::FocusStarted(_) => {}
            }
        }

        let dt = (frame.t - last_t).max(0.0) as f32;
        last_t = frame.t;
        let out = engine.tick(dt);
        if let Some(kind) = &out.changed {
            println!("{:>8.3}  {:<13} {kind}", frame.t, "expression");
        }
        if print_frames {
            let json = serde_json::to_string(&out.features).context("failed to serialize frame")?;
            println!("{:>8.3}  {:<13} {json}", frame.t, "frame");
        }
    }

    println!(
        "done. frames={}, highlights={}, expression={}",
        frames.len(),
        highlights,
        engine.current_type()
    );
    Ok(())
}

fn event_name(event: &FocusEvent) -> &'static str {
    match event {
        FocusEvent::FocusStarted(_) => "focus_started",
        FocusEvent::Highlighted(_) => "highlighted",
        FocusEvent::FocusEnded(_) => "focus_ended",
    }
}

fn cmd_blend(
    cli: &Cli,
    expression: &str,
    intensity: f32,
    duration: Option<f32>,
    dt: f32,
    easing: Option<Easing>,
) -> Result<()> {
    if !(dt.is_finite() && dt > 0.0) {
        bail!("--dt must be a positive number of seconds");
    }
    let settings = load_settings(cli)?;
    let kind = ExpressionType::parse(expression);
    if !settings.expressions.contains(&kind) {
        eprintln!("warning: '{kind}' has no definition, blending to baseline");
    }

    let mut config = settings.behavior.expression.clone();
    if let Some(easing) = easing {
        config.easing = easing;
    }
    let mut engine = ExpressionTransitionEngine::new(settings.expressions, config);
    let duration = duration.unwrap_or(engine.config().default_transition_secs);
    engine.request(ExpressionRequest::new(kind, intensity, duration));

    let mut t = 0.0f32;
    loop {
        let frame = engine.tick(dt);
        t += dt;
        let channels: Vec<String> = frame
            .features
            .iter()
            .filter(|(_, v)| *v > 0.0)
            .map(|(c, v)| format!("{c}={v:.1}"))
            .collect();
        println!(
            "t={t:.2} progress={:.2} {}",
            frame.progress.unwrap_or(1.0),
            channels.join(" ")
        );
        if frame.changed.is_some() || !engine.is_transitioning() {
            break;
        }
    }
    Ok(())
}

fn cmd_record(cli: &Cli, affect: Affect, response: &str, outcome: Outcome) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    let mut learner = store
        .load_learner(settings.behavior.learner)
        .context("failed to load learner")?;
    learner.tick(now_unix_secs());

    let success = matches!(outcome, Outcome::Success);
    let entry = store
        .record(&mut learner, affect, response, success)
        .context("failed to record interaction")?;

    println!(
        "recorded {affect}/{response}: {}/{} weight={:.3}",
        entry.success_count, entry.total_count, entry.weight
    );
    Ok(())
}

fn cmd_best(cli: &Cli, affect: Affect) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    let learner = store
        .load_learner(settings.behavior.learner)
        .context("failed to load learner")?;

    match learner.best_response(affect) {
        Some(best) => println!("{best}"),
        None => println!("(no data for {affect})"),
    }

    if cli.verbose {
        for entry in learner.entries_for(affect) {
            eprintln!(
                "--- {}: {}/{} weight={:.3} score={:.3} ---",
                entry.response_id,
                entry.success_count,
                entry.total_count,
                entry.weight,
                entry.score()
            );
        }
        if !learner.can_recommend() {
            eprintln!("--- not enough interactions to recommend yet ---");
        }
    }
    Ok(())
}

fn cmd_choose(cli: &Cli, affect: Affect, candidates: &[String]) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    let learner = store
        .load_learner(settings.behavior.learner)
        .context("failed to load learner")?;
    let mut rng = SmallRng::from_os_rng();

    match learner.choose_response(affect, candidates, &mut rng) {
        Some(choice) => println!("{choice}"),
        None => bail!("no candidate to choose from"),
    }
    Ok(())
}

fn cmd_recommend(cli: &Cli, text: &str) -> Result<()> {
    let settings = load_settings(cli)?;
    let rec = parse_recommendation(text);
    let request = rec.to_request(settings.behavior.expression.default_transition_secs);

    let json = serde_json::json!({
        "affect": rec.affect,
        "expression": request.kind,
        "intensity": request.intensity,
        "durationSecs": rec.duration_secs,
        "reasoning": rec.reasoning,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&json).context("failed to serialize recommendation")?
    );
    Ok(())
}

fn cmd_prompt(
    cli: &Cli,
    affect: Option<Affect>,
    focus: Option<&str>,
    gaze_active: bool,
    no_history: bool,
) -> Result<()> {
    let settings = load_settings(cli)?;
    let learner = if no_history {
        None
    } else {
        let store = open_store(cli)?;
        let mut learner = store
            .load_learner(settings.behavior.learner.clone())
            .context("failed to load learner")?;
        learner.tick(now_unix_secs());
        Some(learner)
    };

    let ctx = PromptContext {
        affect,
        history: learner.as_ref().map(|l| l.history()),
        gaze_active,
        focus,
    };
    println!("{}", build_prompt(&settings.behavior.prompt, &ctx));
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    let learner = store
        .load_learner(settings.behavior.learner.clone())
        .context("failed to load learner")?;
    let interactions = store
        .profile_store()
        .interaction_count()
        .context("failed to count interactions")?;
    let sessions = store
        .profile_store()
        .session_count()
        .context("failed to count sessions")?;
    let global = store
        .global_learner(settings.behavior.learner)
        .context("failed to load global learner")?;

    println!("profile:      {}", store.profile_name());
    println!("entries:      {}", learner.entry_count());
    println!("observations: {}", learner.total_interactions());
    println!("interactions: {interactions}");
    println!("sessions:     {sessions}");
    println!("recommending: {}", learner.can_recommend());
    println!(
        "dominant:     {}",
        learner
            .history()
            .dominant_affect()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "global:       entries={}, observations={}",
        global.entry_count(),
        global.total_interactions()
    );
    if let Some(source) = &settings.source {
        println!("config:       {}", source.display());
    }
    Ok(())
}

fn cmd_profiles() -> Result<()> {
    let names = list_profiles(&data_dir()).context("failed to list profiles")?;
    if names.is_empty() {
        println!("(no profiles)");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    store
        .export_json_file(path, settings.behavior.learner)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let settings = load_settings(cli)?;
    let store = open_store(cli)?;
    let n = store
        .import_json_file(path, settings.behavior.learner.clone())
        .context("failed to import JSON")?;

    let learner = store
        .load_learner(settings.behavior.learner)
        .context("failed to load learner after import")?;
    println!(
        "imported from {}. entries={}, observations={}",
        path.display(),
        n,
        learner.total_interactions()
    );
    Ok(())
}
