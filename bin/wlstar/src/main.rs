use std::{
    io::{BufRead, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use wfa::{
    format::{self, FormatError},
    prelude::*,
    random::{generate_random_wfa, RandomWfaConfig},
};
use wfa_learning::active::{
    ClosednessStrategy, Deadline, EquivalenceOracle, EquivalenceStrategy, ExactSolver,
    LearningError, LearningOptions, MembershipCache, OracleError, RandomSampling, WeightedLStar,
};

use thiserror::Error;
use tracing::{debug, error, info, trace};
use tracing_subscriber::{filter, prelude::*};

use clap::{Arg, ArgAction, ArgMatches, Command};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Learning(#[from] LearningError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("could not write output: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    Argument(String),
}

fn cli() -> clap::Command {
    Command::new("wlstar")
        .about("Active learning of weighted automata over the integers")
        .subcommand_required(true)
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(["info", "debug", "trace"])
                .default_missing_value("info"),
        )
        .subcommand(
            Command::new("learn")
                .about("learns the automaton stored in FILE")
                .arg(Arg::new("file").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(
                    Arg::new("closedness")
                        .long("closedness")
                        .value_parser(["exact", "interactive"])
                        .default_value("exact"),
                )
                .arg(
                    Arg::new("equivalence")
                        .long("equivalence")
                        .value_parser(["hkc", "random", "interactive"])
                        .default_value("hkc"),
                )
                .arg(
                    Arg::new("fallback")
                        .long("fallback")
                        .value_parser(["random", "none"])
                        .default_value("random"),
                )
                .arg(
                    Arg::new("closedness-fallback")
                        .long("closedness-fallback")
                        .value_parser(["exact", "none"])
                        .default_value("exact")
                        .help("closedness oracle that answers when the chosen one fails"),
                )
                .arg(
                    Arg::new("plain")
                        .long("plain")
                        .action(ArgAction::SetTrue)
                        .help("do not factorize rows"),
                )
                .arg(
                    Arg::new("keep-redundant")
                        .long("keep-redundant")
                        .action(ArgAction::SetTrue)
                        .help("do not remove rows that are combinations of others"),
                )
                .arg(
                    Arg::new("collapse")
                        .long("collapse")
                        .action(ArgAction::SetTrue)
                        .help("build the result from a lattice basis of the rows"),
                )
                .arg(
                    Arg::new("timeout-ms")
                        .long("timeout-ms")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(Arg::new("seed").long("seed").value_parser(clap::value_parser!(u64)))
                .arg(
                    Arg::new("check-minimal")
                        .long("check-minimal")
                        .action(ArgAction::SetTrue)
                        .help("fail if the result has more states than the target"),
                )
                .arg(Arg::new("stats").long("stats").action(ArgAction::SetTrue))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("generate")
                .about("generates random automata and stores them in a directory")
                .arg(Arg::new("alphabet").long("alphabet").default_value("ab"))
                .arg(
                    Arg::new("min-states")
                        .long("min-states")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                )
                .arg(
                    Arg::new("max-states")
                        .long("max-states")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(Arg::new("seed").long("seed").value_parser(clap::value_parser!(u64)))
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("compare")
                .about("interactively compares the automaton in ORIGINAL with the learned one in RESULT")
                .arg(Arg::new("original").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(Arg::new("result").required(true).value_parser(clap::value_parser!(PathBuf)))
                .arg(
                    Arg::new("prover")
                        .long("prover")
                        .value_parser(["hkc", "random"])
                        .default_value("hkc"),
                )
                .arg(Arg::new("seed").long("seed").value_parser(clap::value_parser!(u64)))
                .arg(
                    Arg::new("save-dir")
                        .long("save-dir")
                        .value_parser(clap::value_parser!(PathBuf))
                        .default_value("."),
                ),
        )
}

fn setup_logging(matches: &ArgMatches) {
    let level = match matches
        .try_get_one::<String>("verbosity")
        .ok()
        .flatten()
        .map(|m| m.as_str())
    {
        Some("trace") => filter::LevelFilter::TRACE,
        Some("debug") => filter::LevelFilter::DEBUG,
        Some("info") => filter::LevelFilter::INFO,
        _ => filter::LevelFilter::WARN,
    };

    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

fn rng(seed: Option<u64>) -> fastrand::Rng {
    seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed)
}

fn learn(matches: &ArgMatches) -> Result<(), CliError> {
    let Some(path) = matches.get_one::<PathBuf>("file") else {
        return Err(CliError::Argument("missing automaton file".to_string()));
    };
    let target = format::load(path)?;
    debug!(
        "read target with {} states over {}",
        target.size(),
        target.alphabet()
    );

    let name = |arg: &str| {
        matches
            .get_one::<String>(arg)
            .map(String::as_str)
            .unwrap_or_default()
    };
    let closedness = ClosednessStrategy::by_name(name("closedness"))
        .ok_or_else(|| CliError::Argument(name("closedness").to_string()))?;
    let equivalence = EquivalenceStrategy::by_name(name("equivalence"))
        .ok_or_else(|| CliError::Argument(name("equivalence").to_string()))?;
    let seed = matches.get_one::<u64>("seed").copied();

    let mut options = LearningOptions::default()
        .with_factorize(!matches.get_flag("plain"))
        .with_redundant_row_removal(!matches.get_flag("keep-redundant"))
        .with_basis_collapse(matches.get_flag("collapse"));
    if let Some(ms) = matches.get_one::<u64>("timeout-ms") {
        options = options.with_oracle_timeout(Duration::from_millis(*ms));
    }
    if matches.get_flag("check-minimal") {
        options = options.with_state_bound(target.size());
    }
    info!("learning with {closedness} closedness and {equivalence} equivalence oracle");

    let mut lstar = WeightedLStar::new(&target, closedness.build(), equivalence.build(seed))
        .with_options(options);
    if name("fallback") == "random" {
        lstar = lstar.with_fallback(RandomSampling::new(rng(seed)));
    }
    if name("closedness-fallback") == "exact" {
        lstar = lstar.with_closedness_fallback(ExactSolver);
    }

    let start = std::time::Instant::now();
    let learned = lstar.infer()?;
    info!("learning took {}ms", start.elapsed().as_millis());

    println!("{learned}");
    if matches.get_flag("stats") {
        println!("{}", lstar.stats());
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        format::save(&learned, output)?;
        debug!("wrote learned automaton to {}", output.display());
    }
    Ok(())
}

fn generate(matches: &ArgMatches) -> Result<(), CliError> {
    let alphabet: CharAlphabet = matches
        .get_one::<String>("alphabet")
        .map(|symbols| symbols.chars().collect())
        .unwrap_or_else(|| CharAlphabet::of_size(2));
    let min_states = matches.get_one::<usize>("min-states").copied().unwrap_or(1);
    let max_states = matches.get_one::<usize>("max-states").copied().unwrap_or(5);
    if min_states == 0 || min_states > max_states {
        return Err(CliError::Argument(format!(
            "state bounds {min_states}..={max_states} are malformed"
        )));
    }
    let count = matches.get_one::<usize>("count").copied().unwrap_or(10);
    let Some(dir) = matches.get_one::<PathBuf>("out-dir") else {
        return Err(CliError::Argument("missing output directory".to_string()));
    };

    let config = RandomWfaConfig {
        min_states,
        max_states,
        ..Default::default()
    };
    let mut rng = rng(matches.get_one::<u64>("seed").copied());
    std::fs::create_dir_all(dir)?;
    for i in 0..count {
        let aut = generate_random_wfa(&alphabet, &config, &mut rng);
        let path = dir.join(format!("wfa_{i}.txt"));
        format::save(&aut, &path)?;
        debug!("wrote automaton with {} states to {}", aut.size(), path.display());
    }
    info!("generated {count} automata in {}", dir.display());
    Ok(())
}

fn compare(matches: &ArgMatches) -> Result<(), CliError> {
    let (Some(original), Some(result)) = (
        matches.get_one::<PathBuf>("original"),
        matches.get_one::<PathBuf>("result"),
    ) else {
        return Err(CliError::Argument("missing automaton files".to_string()));
    };
    let original = format::load(original)?;
    let result = format::load(result)?;
    let prover = matches
        .get_one::<String>("prover")
        .and_then(|name| EquivalenceStrategy::by_name(name))
        .unwrap_or_default();
    let Some(save_dir) = matches.get_one::<PathBuf>("save-dir") else {
        return Err(CliError::Argument("missing directory for saving".to_string()));
    };
    let mut prover = prover.build(matches.get_one::<u64>("seed").copied());
    let session = Comparison {
        original: &original,
        result: &result,
        save_dir,
    };
    session.run(prover.as_mut(), std::io::stdin().lock(), std::io::stdout())
}

/// An interactive session that lets the user query the original automaton and the learned one side
/// by side. Every input line is either a command or a word whose weights are printed.
struct Comparison<'a> {
    original: &'a WeightedAutomaton,
    result: &'a WeightedAutomaton,
    save_dir: &'a Path,
}

impl Comparison<'_> {
    fn run<R: BufRead, W: Write>(
        &self,
        prover: &mut dyn EquivalenceOracle,
        mut input: R,
        mut output: W,
    ) -> Result<(), CliError> {
        writeln!(
            output,
            "Number of states of the result: {}\nNumber of states of the original: {}",
            self.result.size(),
            self.original.size()
        )?;
        writeln!(output, "Enter Result or Original to see the result or original automaton.")?;
        writeln!(output, "Enter Save to save the original automaton and the result.")?;
        writeln!(output, "Enter Prove to check if there are any counterexamples.")?;

        loop {
            write!(output, "\nEnter some input string to try (or Stop to stop): ")?;
            output.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(());
            }
            match line.trim_end_matches(['\r', '\n']) {
                "Stop" => return Ok(()),
                "Original" => writeln!(output, "{}", self.original)?,
                "Result" => writeln!(output, "{}", self.result)?,
                "Save" => {
                    for (aut, file) in [(self.original, "original.txt"), (self.result, "result.txt")] {
                        let path = self.save_dir.join(file);
                        format::save(aut, &path)?;
                        writeln!(output, "saved to {}", path.display())?;
                    }
                }
                "Prove" => {
                    let mut cache = MembershipCache::new();
                    let answer = prover.find_counterexample(
                        self.original,
                        self.result,
                        &mut cache,
                        &Deadline::unbounded(),
                    )?;
                    match answer {
                        Some(word) => writeln!(output, "counterexample {}", word.show())?,
                        None => writeln!(output, "no counterexample")?,
                    }
                }
                word => {
                    let word: Word = word.chars().collect();
                    writeln!(output, "Original: {}", self.original.member(&word))?;
                    writeln!(output, "Model:    {}", self.result.member(&word))?;
                }
            }
        }
    }
}

pub fn main() {
    let matches = cli().get_matches();

    setup_logging(&matches);

    let result = match matches.subcommand() {
        Some(("learn", sub_matches)) => learn(sub_matches),
        Some(("generate", sub_matches)) => generate(sub_matches),
        Some(("compare", sub_matches)) => compare(sub_matches),
        _ => unreachable!(),
    };

    if let Err(e) = result {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
