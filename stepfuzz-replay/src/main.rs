use anyhow::{format_err, Error};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use stepfuzz_runtime::vm::{Completion, EnvConfig};
use stepfuzz_runtime::{Harness, Limits, RunReport, RunStatus};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "stepfuzz-replay",
    about = "Run fuzzer inputs through the harness one at a time, the way the fuzz target does"
)]
struct Options {
    /// Step budget per input (default: $STEPFUZZ_MAX_STEPS or 1000)
    #[structopt(long = "max-steps")]
    max_steps: Option<u32>,
    /// Size ceiling in bytes (default: $STEPFUZZ_MAX_SIZE or 8192)
    #[structopt(long = "max-size")]
    max_size: Option<usize>,
    /// Print what each input wrote
    #[structopt(long = "show-output")]
    show_output: bool,
    /// Exit with a failure status if any input was aborted
    #[structopt(long = "fail-on-abort")]
    fail_on_abort: bool,
    /// Input files, or directories of input files
    #[structopt(parse(from_os_str), required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Tally {
    skipped: usize,
    completed: usize,
    aborted: usize,
}

impl Tally {
    fn record(&mut self, status: RunStatus) {
        match status {
            RunStatus::Skipped => self.skipped += 1,
            RunStatus::Completed => self.completed += 1,
            RunStatus::Aborted => self.aborted += 1,
        }
    }
}

fn main() {
    env_logger::init();
    let opts = Options::from_args();
    match run(&opts) {
        Ok(tally) => {
            println!(
                "{} completed, {} aborted, {} skipped",
                tally.completed, tally.aborted, tally.skipped
            );
            if opts.fail_on_abort && tally.aborted > 0 {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn run(opts: &Options) -> Result<Tally, Error> {
    let mut limits = Limits::from_env()?;
    if let Some(max_steps) = opts.max_steps {
        limits = limits.with_max_steps(max_steps);
    }
    if let Some(max_size) = opts.max_size {
        limits = limits.with_max_size(max_size);
    }
    let mut harness = Harness::builder()
        .limits(limits)
        .env_config(EnvConfig::from_env()?)
        .build()?;

    let inputs = collect_inputs(&opts.inputs)?;
    info!("replaying {} inputs", inputs.len());

    let mut tally = Tally::default();
    for path in inputs {
        let input = fs::read(&path)
            .map_err(|e| format_err!("reading {}: {}", path.display(), e))?;
        let status = harness.run_one(&input);
        tally.record(status);
        if let Some(report) = harness.last_run() {
            println!("{}: {}", path.display(), describe(report));
            if opts.show_output && !report.output.is_empty() {
                println!("{}", String::from_utf8_lossy(&report.output));
            }
        }
    }
    Ok(tally)
}

/// Expand directories one level deep, in name order. Files are taken as given.
fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = read_dir_files(path)?;
            debug!("{}: {} inputs", path.display(), entries.len());
            entries.sort();
            inputs.extend(entries);
        } else if path.exists() {
            inputs.push(path.clone());
        } else {
            return Err(format_err!("no such input: {}", path.display()));
        }
    }
    Ok(inputs)
}

fn read_dir_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).map_err(|e| format_err!("reading {}: {}", dir.display(), e))?
    {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn describe(report: &RunReport) -> String {
    let mut line = match report.status {
        RunStatus::Skipped => format!("skipped ({} bytes)", report.input_len),
        RunStatus::Completed => match &report.completion {
            Some(Completion::UncaughtException(e)) => {
                format!("completed (uncaught exception: {})", e)
            }
            Some(Completion::FatalError(e)) => format!("completed (fatal error: {})", e),
            _ => "completed".to_owned(),
        },
        RunStatus::Aborted => match &report.termination {
            Some(details) => format!("aborted ({})", details),
            None => "aborted".to_owned(),
        },
    };
    if report.status != RunStatus::Skipped {
        line.push_str(&format!(", {} steps", report.steps_consumed));
    }
    if let Some(details) = report.shutdown_termination() {
        line.push_str(&format!(", shutdown cut short ({})", details));
    }
    line
}
