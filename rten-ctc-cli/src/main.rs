use std::error::Error;
use std::fs;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rten_ctc::{merge_paths, render_labels, CtcDecoder, DecodeOptions, ProbScale};
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

mod table_size;

use table_size::TableSize;

/// Decoding method selected with `--method`.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Method {
    Greedy,
    Beam,
    Prefix,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(Method::Greedy),
            "beam" => Ok(Method::Beam),
            "prefix" => Ok(Method::Prefix),
            _ => Err(format!(
                "unknown method \"{}\". Expected one of greedy, beam, prefix",
                s
            )),
        }
    }
}

struct Args {
    /// JSON file containing the probability table.
    table: Option<String>,

    /// Size of a random table to decode instead of `table`.
    random: Option<TableSize>,

    /// Seed for the random table.
    seed: Option<u64>,

    /// JSON file containing decoder options.
    config: Option<String>,

    method: Method,
    beam_size: Option<usize>,
    n_best: Option<usize>,
    blank: Option<u32>,

    /// Table holds log probabilities.
    log: bool,

    /// Characters for non-blank labels, used to render hypotheses as text.
    alphabet: Option<String>,

    /// Show decoding time.
    timing: bool,

    /// Enable debug logging.
    verbose: bool,
}

fn parse_args(mut parser: lexopt::Parser) -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut table = None;
    let mut random = None;
    let mut seed = None;
    let mut config = None;
    let mut method = Method::Prefix;
    let mut beam_size = None;
    let mut n_best = None;
    let mut blank = None;
    let mut log = false;
    let mut alphabet = None;
    let mut timing = false;
    let mut verbose = false;

    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) if table.is_none() => table = Some(val.string()?),
            Short('m') | Long("method") => method = parser.value()?.parse()?,
            Short('b') | Long("beam-size") => beam_size = Some(parser.value()?.parse()?),
            Short('n') | Long("n-best") => n_best = Some(parser.value()?.parse()?),
            Long("blank") => blank = Some(parser.value()?.parse()?),
            Long("log") => log = true,
            Short('a') | Long("alphabet") => alphabet = Some(parser.value()?.string()?),
            Short('c') | Long("config") => config = Some(parser.value()?.string()?),
            Short('r') | Long("random") => random = Some(parser.value()?.parse()?),
            Short('s') | Long("seed") => seed = Some(parser.value()?.parse()?),
            Short('t') | Long("timing") => timing = true,
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                println!(
                    "Decode CTC model outputs.

Usage: {bin_name} [OPTIONS] [<table.json>]

The table file holds a [sequence, n_labels] matrix in the form
{{\"shape\": [seq, n_labels], \"data\": [...]}}.

  -m, --method <METHOD>    Decoding method: greedy, beam or prefix (default)
  -b, --beam-size <N>      Beam size for beam searches
  -n, --n-best <N>         Number of hypotheses to print
      --blank <N>          Index of the blank label
      --log                Table holds log probabilities
  -a, --alphabet <CHARS>   Characters of the non-blank labels, in order
  -c, --config <FILE>      Load decoder options from a JSON file
  -r, --random <SEQxN>     Decode a random table of the given size
  -s, --seed <N>           Seed for --random
  -t, --timing             Output timing info
  -v, --verbose            Enable verbose logging
  -h, --help               Print help
",
                    bin_name = parser.bin_name().unwrap_or("rten-ctc")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    if table.is_none() && random.is_none() {
        return Err("missing `<table.json>` arg or `--random` option".into());
    }
    if table.is_some() && random.is_some() {
        return Err("`<table.json>` arg and `--random` option cannot be used together".into());
    }

    Ok(Args {
        table,
        random,
        seed,
        config,
        method,
        beam_size,
        n_best,
        blank,
        log,
        alphabet,
        timing,
        verbose,
    })
}

fn init_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

/// Load decoder options from the config file, if any, and apply command-line
/// overrides.
fn decode_options(args: &Args) -> Result<DecodeOptions, Box<dyn Error>> {
    let mut options: DecodeOptions = match &args.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => DecodeOptions::default(),
    };

    if let Some(blank) = args.blank {
        options.blank = blank;
    }
    if args.log {
        options.scale = ProbScale::Log;
    }
    if args.beam_size.is_some() {
        options.beam_size = args.beam_size;
    }
    if args.n_best.is_some() {
        options.n_best = args.n_best;
    }

    Ok(options)
}

/// Generate a table of random probabilities, where each row sums to 1.
fn random_table(size: TableSize, seed: Option<u64>, scale: ProbScale) -> NdTensor<f32, 2> {
    let mut rng = match seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };

    let mut table = NdTensor::zeros([size.seq, size.n_labels]);
    for t in 0..size.seq {
        let row: Vec<f32> = (0..size.n_labels).map(|_| rng.f32()).collect();
        let total: f32 = row.iter().sum();
        for (label, p) in row.into_iter().enumerate() {
            let p = p / total;
            table[[t, label]] = match scale {
                ProbScale::Linear => p,
                ProbScale::Log => p.ln(),
            };
        }
    }
    table
}

fn format_labels(labels: &[u32], alphabet: Option<&str>, blank: u32) -> String {
    match alphabet {
        Some(alphabet) => format!("{:?} \"{}\"", labels, render_labels(labels, alphabet, blank)),
        None => format!("{:?}", labels),
    }
}

/// Tool for decoding the output of CTC models.
///
/// ```
/// cargo run -p rten-ctc-cli -- --method prefix --beam-size 16 output.json
/// ```
///
/// Set `RUST_LOG=rten_ctc=trace` to log each step of a beam search.
fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args(lexopt::Parser::from_env())?;
    init_logger(args.verbose);

    let options = decode_options(&args)?;
    let probs: NdTensor<f32, 2> = match (&args.table, args.random) {
        (None, Some(size)) => random_table(size, args.seed, options.scale),
        (Some(path), None) => serde_json::from_str(&fs::read_to_string(path)?)?,
        _ => return Err("expected one of `<table.json>` or `--random`".into()),
    };
    let [seq, n_labels] = probs.shape();
    log::info!("Decoding table with {} steps and {} labels", seq, n_labels);

    let blank = options.blank;
    let alphabet = args.alphabet.as_deref();
    let decoder = CtcDecoder::with_options(options);

    let elapsed: Duration = match args.method {
        Method::Greedy => {
            let start = Instant::now();
            let hyp = decoder.decode_greedy(probs.view())?;
            let elapsed = start.elapsed();

            println!("Path: {:?}", hyp.path());
            println!("Labels: {}", format_labels(&hyp.labels(), alphabet, blank));
            println!(
                "Score: {:.4} (log {:.4})",
                hyp.prob(),
                hyp.log_prob()
            );
            elapsed
        }
        Method::Beam => {
            let start = Instant::now();
            let hyps = decoder.decode_beam(probs.view())?;
            let elapsed = start.elapsed();

            for (i, hyp) in hyps.iter().enumerate() {
                println!(
                    "{}. path {:?} labels {} score {:.4}",
                    i + 1,
                    hyp.path(),
                    format_labels(&hyp.labels(blank), alphabet, blank),
                    hyp.log_prob().exp()
                );
            }

            println!("After merging paths with the same labels:");
            for (i, (labels, log_prob)) in merge_paths(&hyps, blank).iter().enumerate() {
                println!(
                    "{}. labels {} score {:.4}",
                    i + 1,
                    format_labels(labels, alphabet, blank),
                    log_prob.exp()
                );
            }
            elapsed
        }
        Method::Prefix => {
            let start = Instant::now();
            let hyps = decoder.decode_prefix_beam(probs.view())?;
            let elapsed = start.elapsed();

            for (i, hyp) in hyps.iter().enumerate() {
                println!(
                    "{}. labels {} score {:.4} (blank {:.4}, no blank {:.4})",
                    i + 1,
                    format_labels(hyp.labels(), alphabet, blank),
                    hyp.log_prob().exp(),
                    hyp.log_prob_blank().exp(),
                    hyp.log_prob_no_blank().exp()
                );
            }
            elapsed
        }
    };

    if args.timing {
        println!("Decoded in {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    }

    Ok(())
}
