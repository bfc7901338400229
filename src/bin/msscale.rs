//! msscale - rescale the samples of miniseed3 files.
//!
//! Usage:
//!   msscale -B 2.5 -A 100 input.ms3 > scaled.ms3
//!   msscale --beta 10 --orient T -o scaled.ms3 a.ms3 b.ms3
//!   cat input.ms3 | msscale -v > scaled.ms3

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use mseedscale::pipeline::process_input;
use mseedscale::scale::{IneligiblePolicy, ScaleConfig};
use mseedscale::sink::{DirectSink, RecordSink};
use mseedscale::trace::{PackConfig, DEFAULT_RECORD_LENGTH};
use mseedscale::{logging, DataEncoding};

const PROGRAM: &str = "msscale";

#[derive(Parser, Debug)]
#[command(name = "msscale")]
#[command(about = "miniseed sample scaling")]
#[command(version)]
struct Args {
    /// Verbose output, repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Offset added to the scaled samples
    #[arg(short = 'A', long, default_value = "0", allow_negative_numbers = true)]
    alpha: f64,

    /// Scale factor for the raw samples
    #[arg(short = 'B', long, default_value = "1", allow_negative_numbers = true)]
    beta: f64,

    /// Replacement orientation code
    #[arg(short = 'O', long, default_value = "T")]
    orient: char,

    /// Keep the original orientation code
    #[arg(long, conflicts_with = "orient")]
    no_orient: bool,

    /// What to do with records that cannot be scaled: pass or drop
    #[arg(long, default_value = "pass")]
    ineligible: IneligiblePolicy,

    /// Maximum output record length in bytes
    #[arg(long, default_value_t = DEFAULT_RECORD_LENGTH)]
    record_length: usize,

    /// Write records to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Input files, stdin when none or `-`
    files: Vec<PathBuf>,
}

impl Args {
    fn scale_config(&self) -> ScaleConfig {
        ScaleConfig {
            alpha: self.alpha,
            beta: self.beta,
            orientation: if self.no_orient { None } else { Some(self.orient) },
            ineligible: self.ineligible,
        }
    }

    fn pack_config(&self) -> PackConfig {
        PackConfig {
            max_record_length: self.record_length,
            encoding: DataEncoding::STEIM2,
        }
    }
}

/// Processes every input in turn. Returns `false` if any input failed.
fn run(args: &Args) -> anyhow::Result<bool> {
    let scale = args.scale_config();
    let pack = args.pack_config();
    info!("{} ({})", PROGRAM, env!("CARGO_PKG_VERSION"));
    info!("scale [{}]", scale);

    let mut sink: Box<dyn RecordSink> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create output {}", path.display()))?;
            Box::new(DirectSink::new(BufWriter::new(file)))
        }
        None => Box::new(DirectSink::new(BufWriter::new(io::stdout().lock()))),
    };

    let stdin = PathBuf::from("-");
    let inputs: Vec<&PathBuf> = if args.files.is_empty() {
        vec![&stdin]
    } else {
        args.files.iter().collect()
    };

    let mut ok = true;
    for path in inputs {
        let name = if *path == stdin {
            String::from("<stdin>")
        } else {
            path.display().to_string()
        };
        info!("process miniseed data from {}", name);
        let result = if *path == stdin {
            process_input(io::stdin().lock(), &scale, &pack, sink.as_mut())
        } else {
            match File::open(path) {
                Ok(file) => process_input(BufReader::new(file), &scale, &pack, sink.as_mut()),
                Err(e) => Err(e.into()),
            }
        };
        match result {
            Ok(summary) => info!("{}: {}", name, summary),
            Err(e) => {
                error!("error reading {}: {}", name, e);
                ok = false;
            }
        }
    }
    sink.flush().context("cannot flush output")?;
    info!("terminated");
    Ok(ok)
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(PROGRAM, args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
