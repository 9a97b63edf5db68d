//! The deltamake driver: argument parsing and the load → plan → schedule →
//! link → persist sequence behind the `deltamake` binary.

use std::num::NonZeroUsize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};

use deltamake_core::{
    load_solution, register_defaults, PlanContext, Scheduler, SolutionRegistry, TaskList, Terminal,
    DIFF_FILENAME, SOLUTION_FILENAME,
};
use deltamake_types::RunOutcome;

/// Parsed command line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Options {
    pub verbose: bool,
    pub no_build: bool,
    pub force: bool,
    pub dont_save_diff: bool,
    /// `--workers`; `None` means "use the core count".
    pub workers: Option<usize>,
    /// Positional build names; empty means `default`.
    pub builds: Vec<String>,
    /// Set by `--help` and by anything unrecognized.
    pub show_help: bool,
}

/// Hand-rolled flag parsing. Unknown flags (and a missing `--workers`
/// argument) fall back to the help text, which the caller prints before
/// exiting successfully.
pub fn parse_args(args: impl Iterator<Item = String>) -> Options {
    let mut options = Options::default();
    let mut args = args;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verbose" | "-v" => options.verbose = true,
            "--no-build" | "-n" => options.no_build = true,
            "--force" | "-f" => options.force = true,
            "--dont-save-diff" | "-d" => options.dont_save_diff = true,
            "--workers" | "-w" => match args.next().and_then(|count| count.parse().ok()) {
                // A zero count still means one worker.
                Some(count) => options.workers = Some(std::cmp::max(count, 1)),
                None => {
                    options.show_help = true;
                    return options;
                }
            },
            "--help" | "-h" => {
                options.show_help = true;
                return options;
            }
            flag if flag.starts_with('-') => {
                options.show_help = true;
                return options;
            }
            build => options.builds.push(build.to_string()),
        }
    }

    options
}

pub fn print_help() {
    println!(
        r#"Usage:
    deltamake [flags] [build1 build2 ...]
Note:
    If build names are not specified, the "default" build name will be used.
Flags:
    -d --dont-save-diff
        Don't save the differential file
    -f --force
        Force rebuild of all solutions (ignore all differential records)
    -h --help
        Show this help text
    -n --no-build
        Load and validate the solution, build nothing
    -v --verbose
        Enable verbose logging
    -w <count> --workers <count>
        Max number of workers (0 means 1; defaults to the core count)"#
    );
}

/// The driver sequence. Fatal configuration problems are reported through
/// the terminal and mapped to a failing exit code.
pub fn run(options: Options) -> Result<ExitCode> {
    let terminal = Arc::new(Terminal::new(options.verbose));
    terminal.info(&format!("DeltaMake v{}", env!("CARGO_PKG_VERSION")));
    terminal.detail(&format!(
        "Terminal: {}x{}",
        terminal.columns(),
        terminal.rows()
    ));

    let cores = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let workers = options.workers.unwrap_or(cores).max(1);
    terminal.detail(&format!("CPU cores:   {cores}"));
    terminal.detail(&format!("CPU workers: {workers}"));

    let mut registry = SolutionRegistry::new();
    register_defaults(&mut registry);

    let mut scheduler = Scheduler::new(Arc::clone(&terminal));
    scheduler.init(workers);

    let mut root = match load_solution(Path::new(SOLUTION_FILENAME), &registry, &terminal) {
        Ok(root) => root,
        Err(err) => {
            terminal.error(&err.to_string());
            return Ok(ExitCode::FAILURE);
        }
    };

    if options.no_build {
        return Ok(ExitCode::SUCCESS);
    }

    if !options.force {
        root.load_diff(Path::new(DIFF_FILENAME), &terminal);
    }

    let mut builds = options.builds.clone();
    if builds.is_empty() {
        terminal.detail("No builds set. Default value is used.");
        builds.push("default".to_string());
    }

    let ctx = PlanContext {
        registry: &registry,
        terminal: terminal.as_ref(),
        force: options.force,
    };

    terminal.detail("Selected builds:");
    let mut jobs = Vec::with_capacity(builds.len());
    for name in &builds {
        terminal.detail(&format!("\t\"{name}\""));
        match root.gen_build(name, &ctx) {
            Ok(job) => jobs.push(job),
            Err(err) => {
                terminal.error(&err.to_string());
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    for job in &mut jobs {
        if let Err(err) = job.pre_build(&root, &ctx) {
            terminal.error(&err.to_string());
            return Ok(ExitCode::FAILURE);
        }
        job.build(&mut root, &mut scheduler, &ctx);
    }

    if scheduler.task_count() == 0 {
        terminal.info("Nothing to do.");
        if !options.dont_save_diff {
            root.save_diff(Path::new(DIFF_FILENAME), &terminal)
                .context("cannot save the differential record")?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    match scheduler.start() {
        RunOutcome::Completed => {}
        RunOutcome::Failed => {
            terminal.error("Build failed.");
            return Ok(ExitCode::FAILURE);
        }
        RunOutcome::Interrupted => {
            terminal.error("Interrupted.");
            return Ok(ExitCode::FAILURE);
        }
    }

    for job in &mut jobs {
        if let Err(err) = job.post_build(&mut root, &ctx) {
            terminal.error(&err.to_string());
            return Ok(ExitCode::FAILURE);
        }
    }

    if !options.dont_save_diff {
        root.save_diff(Path::new(DIFF_FILENAME), &terminal)
            .context("cannot save the differential record")?;
    }

    terminal.info("Done.");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Options {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn long_and_short_flags() {
        let options = parse(&["--verbose", "-n", "--force", "-d"]);
        assert!(options.verbose);
        assert!(options.no_build);
        assert!(options.force);
        assert!(options.dont_save_diff);
        assert!(!options.show_help);
    }

    #[test]
    fn positionals_are_build_names() {
        let options = parse(&["-v", "release", "tools"]);
        assert_eq!(options.builds, vec!["release", "tools"]);
    }

    #[test]
    fn workers_zero_is_rewritten_to_one() {
        assert_eq!(parse(&["-w", "0"]).workers, Some(1));
        assert_eq!(parse(&["--workers", "6"]).workers, Some(6));
        assert_eq!(parse(&[]).workers, None);
    }

    #[test]
    fn missing_workers_argument_falls_back_to_help() {
        assert!(parse(&["-w"]).show_help);
        assert!(parse(&["-w", "many"]).show_help);
    }

    #[test]
    fn unknown_flags_fall_back_to_help() {
        assert!(parse(&["--frobnicate"]).show_help);
        assert!(parse(&["-x"]).show_help);
        assert!(parse(&["--help"]).show_help);
    }
}
