use clap::{Parser, ValueEnum};

use inv_learn::config::{Config, Strategy};
use inv_learn::programs;
use inv_learn::verify::Verifier;

#[derive(Debug, Copy, Clone, ValueEnum)]
enum Program {
    Example1,
    Example2,
    Example3,
    Example4,
    All,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Loop to verify.
    #[arg(value_enum, default_value = "all")]
    program: Program,

    /// Seed for sampling and negative-point selection.
    #[clap(long, value_name = "INT", default_value = "42")]
    seed: u64,

    /// Number of random samples before the first round.
    #[clap(long, value_name = "INT", default_value = "200")]
    samples: usize,

    /// Maximal number of refinement rounds.
    #[clap(long, value_name = "INT", default_value = "500")]
    rounds: usize,

    /// Learn one conjunction per path partition.
    #[clap(long)]
    disjunctive: bool,

    /// Also split partitions by the loop condition (with --disjunctive).
    #[clap(long)]
    split_on_cond: bool,

    /// Wall-clock limit per loop, in seconds.
    #[clap(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Log level.
    #[clap(long, value_name = "LEVEL", default_value = "info")]
    log: simplelog::LevelFilter,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    let strategy = if args.disjunctive {
        Strategy::Disjunctive {
            split_on_cond: args.split_on_cond,
        }
    } else {
        Strategy::Conjunctive
    };
    let config = Config {
        seed: args.seed,
        initial_samples: args.samples,
        max_rounds: Some(args.rounds),
        timeout: args.timeout.map(std::time::Duration::from_secs),
        strategy,
        ..Config::default()
    };

    let selected = match args.program {
        Program::Example1 => vec![("example1", programs::example1())],
        Program::Example2 => vec![("example2", programs::example2())],
        Program::Example3 => vec![("example3", programs::example3())],
        Program::Example4 => vec![("example4", programs::example4())],
        Program::All => programs::all(),
    };

    for (name, spec) in selected {
        println!("Verifying {}...", name);
        let mut verifier = Verifier::with_defaults(config.clone());
        let report = verifier.verify(&spec)?;
        println!("{}: {}", name, report.verdict);
        println!("{}: {}", name, report.stats);
    }

    Ok(())
}
