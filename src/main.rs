use anyhow::{anyhow, Result};
use clap::{arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;
use u_gls::evaluation::{EvaluatorConfig, InstanceEvaluator};
use u_gls::gls::{
    GlsConfig, GuideStrategy, IdentityGuide, PenaltyGuide, ProcessGuide, TargetSelection,
    UtilityGuide,
};
use u_gls::local_search::ImprovementStrategy;
use u_gls::models::load_instances;

fn cli() -> Command {
    Command::new("u-gls")
        .about("Guided local search for the symmetric TSP")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("evaluate")
                .about("Scores a guide strategy over a batch of instances and prints a JSON report")
                .arg(
                    arg!(--instances <PATH> "Instance batch json file")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--guide [GUIDE] "Guide strategy")
                        .value_parser(["identity", "penalty", "utility", "process"])
                        .default_value("penalty"),
                )
                .arg(
                    arg!(--"guide-cmd" [PROGRAM] "Worker program for the process guide")
                        .required_if_eq("guide", "process"),
                )
                .arg(
                    arg!(--"guide-arg" [ARG] "Argument passed to the worker program (repeatable)")
                        .action(ArgAction::Append)
                        .allow_hyphen_values(true),
                )
                .arg(
                    arg!(--"guide-timeout" [SECONDS] "Timeout of one worker call")
                        .default_value("10")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--lambda [LAMBDA] "Penalty weight of the penalty and utility guides")
                        .default_value("1.0")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--"time-limit" [SECONDS] "Search time limit per instance")
                        .default_value("10")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--"hard-time-limit" [SECONDS] "Hard budget per instance (default: time limit + 15)")
                        .value_parser(clap::value_parser!(f64)),
                )
                .arg(
                    arg!(--iterations [N] "Maximum outer iterations per instance")
                        .default_value("1000")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"perturbation-moves" [N] "Guide calls per outer iteration")
                        .default_value("1")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--threads [N] "Number of instances solved concurrently")
                        .default_value("1")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--seed [SEED] "Seed for construction tie-breaks")
                        .default_value("2024")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--candidates [K] "Candidate list length per node")
                        .default_value("100")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(arg!(--"first-improvement" "Apply the first improving move in full passes"))
                .arg(
                    arg!(--target [TARGET] "Which gap entries are perturbed first (default: the guide's preference)")
                        .value_parser(["favored", "penalized"]),
                ),
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();

    if let Err(e) = match matches.subcommand() {
        Some(("evaluate", sub_m)) => evaluate(sub_m),
        _ => Err(anyhow!("Invalid subcommand")),
    } {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn evaluate(matches: &ArgMatches) -> Result<()> {
    let path = get::<PathBuf>(matches, "instances")?;
    let instances: Vec<_> = load_instances(&path)
        .map_err(|e| anyhow!("Failed to load {}: {}", path.display(), e))?
        .into_iter()
        .map(Arc::new)
        .collect();
    tracing::info!("loaded {} instances from {}", instances.len(), path.display());

    let config = evaluator_config(matches)?;
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    let guide = build_guide(matches)?;

    let report = InstanceEvaluator::new(config).evaluate(&instances, guide);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn evaluator_config(matches: &ArgMatches) -> Result<EvaluatorConfig> {
    let strategy = if matches.get_flag("first-improvement") {
        ImprovementStrategy::FirstImprovement
    } else {
        ImprovementStrategy::BestImprovement
    };
    let mut gls = GlsConfig::default()
        .with_max_iterations(get(matches, "iterations")?)
        .with_time_limit(seconds(matches, "time-limit")?)
        .with_perturbation_moves(get(matches, "perturbation-moves")?)
        .with_strategy(strategy);
    gls.target_selection = matches
        .get_one::<String>("target")
        .map(|target| match target.as_str() {
            "penalized" => TargetSelection::MostPenalized,
            _ => TargetSelection::MostFavored,
        });

    let mut config = EvaluatorConfig::default()
        .with_gls(gls)
        .with_candidate_count(get(matches, "candidates")?)
        .with_seed(get(matches, "seed")?)
        .with_threads(get(matches, "threads")?);
    if matches.contains_id("hard-time-limit") {
        config = config.with_hard_time_limit(seconds(matches, "hard-time-limit")?);
    }
    Ok(config)
}

fn build_guide(matches: &ArgMatches) -> Result<Arc<dyn GuideStrategy>> {
    let lambda = get::<f64>(matches, "lambda")?;
    Ok(match get::<String>(matches, "guide")?.as_str() {
        "identity" => Arc::new(IdentityGuide),
        "penalty" => Arc::new(PenaltyGuide::new(lambda)),
        "utility" => Arc::new(UtilityGuide::new(lambda)),
        "process" => {
            let program = get::<String>(matches, "guide-cmd")?;
            let args: Vec<String> = matches
                .get_many::<String>("guide-arg")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();
            Arc::new(
                ProcessGuide::new(program)
                    .with_args(args)
                    .with_timeout(seconds(matches, "guide-timeout")?),
            )
        }
        other => return Err(anyhow!("Unknown guide {}", other)),
    })
}

fn get<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .cloned()
        .ok_or_else(|| anyhow!("Missing --{}", id))
}

fn seconds(matches: &ArgMatches, id: &str) -> Result<Duration> {
    let secs = get::<f64>(matches, id)?;
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("Invalid --{}: {}", id, e))
}
