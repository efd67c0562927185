// The orchestrator for local use of the readmission pipeline. The hosting
// runtime drives the hooks in `readmit::hooks` directly; this binary wires the
// same hooks to a command line so a model can be trained and scored without a
// runtime. It owns path resolution and output writing, nothing else.

use clap::{Parser, Subcommand};
use readmit::{data, hooks};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(
    name = "readmit",
    version,
    about = "A scoring engine for hospital readmission risk."
)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a labeled CSV and persist both artifacts.
    Fit {
        /// Path to the training CSV, including the label column.
        #[clap(long)]
        input: PathBuf,
        /// Name of the label column.
        #[clap(long, default_value = "readmitted")]
        target: String,
        /// Directory the fitted artifacts are written into.
        #[clap(long)]
        output_dir: PathBuf,
    },
    /// Score a raw CSV against a fitted artifact directory.
    Score {
        /// Path to the CSV batch to score.
        #[clap(long)]
        input: PathBuf,
        /// Directory holding the fitted artifacts.
        #[clap(long)]
        model_dir: PathBuf,
        /// Output CSV path; stdout when omitted.
        #[clap(long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let start_time = Instant::now();
    let args = Args::parse();

    let result = match args.command {
        Command::Fit {
            input,
            target,
            output_dir,
        } => run_fit(&input, &target, &output_dir),
        Command::Score {
            input,
            model_dir,
            output,
        } => run_score(&input, &model_dir, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    eprintln!("> Done in {:.2?}", start_time.elapsed());
}

fn run_fit(
    input: &std::path::Path,
    target: &str,
    output_dir: &std::path::Path,
) -> Result<(), Box<dyn Error>> {
    eprintln!("> Reading training data from {}", input.display());
    let batch = hooks::read_input(input)?;
    let mut frame = batch.frame;
    let labels = data::split_target(&mut frame, target)?;
    eprintln!(
        "> Training on {} rows, {} feature columns",
        frame.height(),
        frame.width()
    );
    hooks::fit(frame, &labels, output_dir, None, None)?;
    eprintln!("> Artifacts written to {}", output_dir.display());
    Ok(())
}

fn run_score(
    input: &std::path::Path,
    model_dir: &std::path::Path,
    output: Option<&std::path::Path>,
) -> Result<(), Box<dyn Error>> {
    let context = hooks::ModelContext::init(model_dir);
    let batch = hooks::read_input(input)?;
    eprintln!(
        "> Scoring {} rows against artifacts in {}",
        batch.frame.height(),
        context.code_dir().display()
    );
    let predictions = context.score(&batch)?;

    match output {
        Some(path) => {
            predictions.write_csv(BufWriter::new(File::create(path)?))?;
            eprintln!("> Predictions written to {}", path.display());
        }
        None => predictions.write_csv(io::stdout().lock())?,
    }
    Ok(())
}
