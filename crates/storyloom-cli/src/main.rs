//! Storyloom command line
//!
//! Drives reading sessions against a seeded simulated backend:
//! - `library`: list the built-in stories
//! - `read`: open a story, page through it, print per-scene asset state
//! - `audit`: same session, then dump the generation ledger (admin only)

mod simulated;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use simulated::{SimulatedBackend, SimulationConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storyloom_core::{
    builtin_library, AppPhase, Orchestrator, OrchestratorConfig, ReadingSceneState,
    ResolveOutcome, Step,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("story")
                .required(true)
                .help("Id of the story to open"),
        )
        .arg(
            Arg::new("pages")
                .long("pages")
                .value_parser(value_parser!(usize))
                .help("Number of pages to turn (default: read to the end)"),
        )
        .arg(
            Arg::new("page-delay-ms")
                .long("page-delay-ms")
                .default_value("2000")
                .value_parser(value_parser!(u64))
                .help("Time spent on each page before turning"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("42")
                .value_parser(value_parser!(u64))
                .help("Random seed for the simulated backend"),
        )
        .arg(
            Arg::new("rate-limit-rate")
                .long("rate-limit-rate")
                .default_value("0.1")
                .value_parser(value_parser!(f64))
                .help("Probability that a backend call is rate limited"),
        )
        .arg(
            Arg::new("failure-rate")
                .long("failure-rate")
                .default_value("0.02")
                .value_parser(value_parser!(f64))
                .help("Probability that a backend call fails terminally"),
        )
        .arg(
            Arg::new("latency-ms")
                .long("latency-ms")
                .default_value("250")
                .value_parser(value_parser!(u64))
                .help("Base latency of simulated backend calls"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML orchestrator configuration"),
        )
        .arg(
            Arg::new("asset-dir")
                .long("asset-dir")
                .value_parser(value_parser!(PathBuf))
                .help("Durable asset directory (overrides the config)"),
        )
}

fn cli() -> Command {
    Command::new("storyloom")
        .version(storyloom_core::VERSION)
        .about("Storyloom storybook asset orchestrator")
        .subcommand_required(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(Command::new("library").about("List the built-in stories"))
        .subcommand(session_args(
            Command::new("read").about("Read a story with the simulated backend"),
        ))
        .subcommand(
            session_args(Command::new("audit").about("Read a story, then print the audit ledger"))
                .arg(
                    Arg::new("admin")
                        .long("admin")
                        .action(ArgAction::SetTrue)
                        .help("Enable admin tooling for this run"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn probability(args: &ArgMatches, name: &str) -> Result<f64> {
    let value = args.get_one::<f64>(name).copied().unwrap_or_default();
    if !(0.0..=1.0).contains(&value) {
        bail!("--{name} must be between 0 and 1, got {value}");
    }
    Ok(value)
}

fn load_config(args: &ArgMatches) -> Result<OrchestratorConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    if let Some(dir) = args.get_one::<PathBuf>("asset-dir") {
        config = config.with_asset_dir(dir);
    }
    Ok(config)
}

async fn run_session(args: &ArgMatches, config: OrchestratorConfig) -> Result<Orchestrator> {
    let story_id = args
        .get_one::<String>("story")
        .context("story id is required")?;
    let simulation = SimulationConfig {
        seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
        rate_limit_rate: probability(args, "rate-limit-rate")?,
        failure_rate: probability(args, "failure-rate")?,
        latency: Duration::from_millis(args.get_one::<u64>("latency-ms").copied().unwrap_or(250)),
    };
    let page_delay = Duration::from_millis(args.get_one::<u64>("page-delay-ms").copied().unwrap_or(0));
    let pages = args.get_one::<usize>("pages").copied();

    info!(
        story = %story_id,
        seed = simulation.seed,
        rate_limit_rate = simulation.rate_limit_rate,
        failure_rate = simulation.failure_rate,
        "starting simulated session"
    );
    let backend = Arc::new(SimulatedBackend::new(simulation));
    let orchestrator = Orchestrator::open(config, backend).await?;
    orchestrator.open_story(story_id).await?;

    let scheduler = orchestrator.scheduler();
    scheduler.start_reading()?;
    let mut turned = 0;
    while pages.map_or(true, |limit| turned < limit) {
        tokio::time::sleep(page_delay).await;
        turned += 1;
        if scheduler.advance()? == Step::Finished {
            break;
        }
    }

    let outcomes = scheduler.settle().await;
    let failed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ResolveOutcome::Failed(_)))
        .count();
    info!(pages = turned, resolutions = outcomes.len(), failed, "session settled");
    Ok(orchestrator)
}

const PAYLOAD_PREVIEW: usize = 48;

fn describe(scene: &ReadingSceneState, kind: storyloom_assets::AssetKind) -> String {
    let slot = scene.slot(kind);
    match (&slot.url, slot.generating) {
        (Some(url), _) if url.len() > PAYLOAD_PREVIEW => {
            format!("ready ({}.. {} bytes)", url.preview(PAYLOAD_PREVIEW), url.len())
        }
        (Some(url), _) => format!("ready ({url})"),
        (None, true) => "generating".to_string(),
        (None, false) => "missing".to_string(),
    }
}

fn print_session(orchestrator: &Orchestrator) {
    let view = orchestrator.session().snapshot();
    if let Some(story) = &view.story {
        println!("{} by {}", story.title, story.author);
    }
    let current = view.cursor.as_ref().map(|c| c.current_index);
    let phase = match &view.phase {
        AppPhase::Error(message) => format!("error: {message}"),
        phase => phase.to_string(),
    };
    println!("Phase: {phase}");
    println!();
    for (index, scene) in view.scenes.iter().enumerate() {
        let marker = if Some(index) == current { ">" } else { " " };
        println!("{marker} Scene {index}");
        println!("    image: {}", describe(scene, storyloom_assets::AssetKind::Image));
        println!("    audio: {}", describe(scene, storyloom_assets::AssetKind::Audio));
    }
    let stats = orchestrator.scheduler().pipeline().cache().stats();
    println!();
    println!("Session cache: {} scenes", stats.entry_count);
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    match matches.subcommand() {
        Some(("library", _)) => {
            for story in builtin_library() {
                println!(
                    "{:<18} {:<32} {} scenes",
                    story.id,
                    story.title,
                    story.scene_count()
                );
            }
        }
        Some(("read", args)) => {
            let config = load_config(args)?;
            let orchestrator = run_session(args, config).await?;
            print_session(&orchestrator);
        }
        Some(("audit", args)) => {
            let config = load_config(args)?;
            if !(config.admin_mode || args.get_flag("admin")) {
                bail!("the audit ledger requires admin mode (set admin_mode or pass --admin)");
            }
            let orchestrator = run_session(args, config).await?;
            let entries = orchestrator.audit().entries();
            if matches.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in &entries {
                    println!(
                        "{}  {:<5}  {:>6} tokens  {}",
                        entry.timestamp.format("%H:%M:%S%.3f"),
                        entry.kind,
                        entry.usage.total_tokens,
                        entry.detail
                    );
                }
                let totals = orchestrator.audit().totals();
                println!();
                println!(
                    "{} generations, {} prompt / {} response / {} total tokens",
                    totals.entries, totals.prompt_tokens, totals.response_tokens, totals.total_tokens
                );
            }
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn parses_read_arguments() {
        let matches = cli()
            .try_get_matches_from(["storyloom", "read", "blue-jackal", "--pages", "2", "--seed", "9"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "read");
        assert_eq!(args.get_one::<usize>("pages"), Some(&2));
        assert_eq!(args.get_one::<u64>("seed"), Some(&9));
        assert!((probability(args, "rate-limit-rate").unwrap() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_probability() {
        let matches = cli()
            .try_get_matches_from(["storyloom", "read", "x", "--failure-rate", "1.5"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(probability(args, "failure-rate").is_err());
    }

    #[test]
    fn describe_abbreviates_large_payloads() {
        use storyloom_assets::AssetKind;

        let mut scene = ReadingSceneState::new("text", "prompt");
        scene.image.url = Some(format!("data:image/png;base64,{}", "A".repeat(1 << 20)).into());
        scene.audio.generating = true;

        let image = describe(&scene, AssetKind::Image);
        assert!(image.len() < 100);
        assert!(image.ends_with(&format!("{} bytes)", scene.image_url().unwrap().len())));
        assert_eq!(describe(&scene, AssetKind::Audio), "generating");

        scene.audio.generating = false;
        scene.audio.url = Some("blob:sim/audio/1".into());
        assert_eq!(describe(&scene, AssetKind::Audio), "ready (blob:sim/audio/1)");
    }

    #[tokio::test(start_paused = true)]
    async fn reads_story_to_the_end() {
        let matches = cli()
            .try_get_matches_from([
                "storyloom",
                "read",
                "blue-jackal",
                "--rate-limit-rate",
                "0",
                "--failure-rate",
                "0",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();

        let orchestrator = run_session(args, OrchestratorConfig::default()).await.unwrap();

        let view = orchestrator.session().snapshot();
        assert_eq!(view.phase, AppPhase::Finished);
        assert!(view
            .scenes
            .iter()
            .all(|scene| scene.image_url().is_some() && scene.audio_url().is_some()));
    }
}
