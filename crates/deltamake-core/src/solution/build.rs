//! The incremental build planner.
//!
//! A `BuildJob` expands one named build of one solution in three passes:
//! `pre_build` (directories, sub-builds, pre hook), `build` (emit compile
//! commands for sources whose mtime moved past the differential record),
//! and `post_build` (sub-build persistence, the single link or archive
//! step, post hook). The link and archive steps never go through the worker
//! pool; they run synchronously on the driver thread after the scheduler
//! returns.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use deltamake_types::{BuildSpec, DiffError, OutputKind};

use crate::scheduler::{TaskList, MIN_TITLE_WIDTH};
use crate::terminal::Terminal;

use super::{load_solution, ConfigError, Solution, SolutionRegistry, DIFF_FILENAME, SOLUTION_FILENAME};

/// Everything the planner needs besides the solution itself.
pub struct PlanContext<'a> {
    pub registry: &'a SolutionRegistry,
    pub terminal: &'a Terminal,
    /// `--force`: ignore and do not persist per-sub differential records.
    pub force: bool,
}

/// Errors from the planning passes and the synchronous shell steps.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot run command: {source}\n\t{command}")]
    Exec {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("command failed with status {status}:\n\t{command}")]
    CommandFailed { command: String, status: i32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// A sub-solution pulled in by a build: its directory, its own loaded
/// solution (output directories overridden by the parent), and the job for
/// the referenced build name.
struct SubBuild {
    dir: PathBuf,
    solution: Solution,
    job: BuildJob,
}

/// Planner state for one named build.
pub struct BuildJob {
    spec: BuildSpec,
    subs: Vec<SubBuild>,
    /// Intended object path for every source, emitted or not: the link
    /// line references objects produced by earlier runs too.
    objects: Vec<PathBuf>,
    needs_link: bool,
}

impl BuildJob {
    /// Look up the build in the solution and load every sub-solution it
    /// references: `<dir>/<sub>/solution.json`, output directories
    /// inherited from the parent, build name from the sub-entry (default
    /// `default`), differential file loaded unless force is active.
    pub fn new(solution: &Solution, name: &str, ctx: &PlanContext) -> Result<Self, ConfigError> {
        let params = solution
            .builds
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownBuild(name.to_string()))?;
        let spec = BuildSpec::new(name, params);

        let mut subs = Vec::new();
        for (codename, sub_build) in spec.sub_builds() {
            let rel = solution
                .sub_solutions
                .get(&codename)
                .ok_or_else(|| ConfigError::UnknownCodename(codename.clone()))?;
            let dir = solution.dir.join(rel);

            let mut sub_solution =
                load_solution(&dir.join(SOLUTION_FILENAME), ctx.registry, ctx.terminal)?;
            sub_solution.build_dir = solution.build_dir.clone();
            sub_solution.tmp_dir = solution.tmp_dir.clone();

            let job = BuildJob::new(&sub_solution, &sub_build, ctx)?;

            if !ctx.force {
                sub_solution.load_diff(&dir.join(DIFF_FILENAME), ctx.terminal);
            }

            subs.push(SubBuild {
                dir,
                solution: sub_solution,
                job,
            });
        }

        Ok(Self {
            spec,
            subs,
            objects: Vec::new(),
            needs_link: false,
        })
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Whether `build` decided a link/archive step is due.
    pub fn needs_link(&self) -> bool {
        self.needs_link
    }

    /// Object paths collected by `build`, in source order.
    pub fn objects(&self) -> &[PathBuf] {
        &self.objects
    }

    /// Pass 1: ensure output directories exist, recurse into sub-builds,
    /// run the `pre` hook.
    pub fn pre_build(&mut self, solution: &Solution, ctx: &PlanContext) -> Result<(), BuildError> {
        for dir in [&solution.build_dir, &solution.tmp_dir] {
            if !dir.exists() {
                ctx.terminal
                    .detail(&format!("Creating directory \"{}\"...", dir.display()));
                fs::create_dir_all(dir).map_err(|source| BuildError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
            }
        }

        for sub in &mut self.subs {
            sub.job.pre_build(&sub.solution, ctx)?;
        }

        if let Some(hook) = self.spec.pre() {
            ctx.terminal
                .detail(&format!("Pre build command: \"{hook}\""));
            run_step(ctx.terminal, hook)?;
        }

        Ok(())
    }

    /// Pass 2: emit compile tasks for out-of-date sources; returns how many
    /// were emitted, sub-builds included. Every emission overwrites the
    /// differential slot with the observed mtime, success or not.
    pub fn build(
        &mut self,
        solution: &mut Solution,
        list: &mut dyn TaskList,
        ctx: &PlanContext,
    ) -> usize {
        let mut emitted = 0;

        for sub in &mut self.subs {
            let from_sub = sub.job.build(&mut sub.solution, list, ctx);
            if from_sub != 0 {
                self.needs_link = true;
            }
            emitted += from_sub;
        }

        let mut prefix = String::new();
        prefix.push_str(self.spec.compiler());
        prefix.push(' ');
        if let Some(flags) = self.spec.compiler_flags() {
            prefix.push_str(flags);
            prefix.push(' ');
        }
        for path in self.spec.include_paths() {
            prefix.push_str(&format!("-I\"{path}\" "));
        }
        for path in self.spec.lib_paths() {
            prefix.push_str(&format!("-L\"{path}\" "));
        }
        for define in self.spec.defines() {
            prefix.push_str(&format!("-D\"{define}\" "));
        }
        prefix.push_str("-c ");

        let build_name = self.spec.name();
        let Solution {
            sources,
            diff,
            tmp_dir,
            ..
        } = solution;

        ctx.terminal.detail("Commands:");
        for (rel, entry) in sources.iter() {
            let stem = entry.stem();
            let object = tmp_dir.join(format!("{build_name}_{stem}"));
            self.objects.push(object.clone());

            if let Some(recorded) = diff.timestamp(build_name, rel) {
                if recorded >= entry.mtime {
                    continue;
                }
            }

            self.needs_link = true;
            emitted += 1;
            diff.record(build_name, rel, entry.mtime);

            let command = format!(
                "{prefix}\"{}\" -o \"{}\"",
                entry.path.display(),
                object.display()
            );
            ctx.terminal.detail(&format!("\t{command}"));

            let title: String = stem.chars().take(MIN_TITLE_WIDTH).collect();
            list.add_command(&title, &command, true);
        }

        emitted
    }

    /// Pass 3: recurse into sub-builds (persisting their differential files
    /// unless force is active), link or archive if anything was emitted,
    /// then run the `post` hook.
    pub fn post_build(
        &mut self,
        solution: &mut Solution,
        ctx: &PlanContext,
    ) -> Result<(), BuildError> {
        for sub in &mut self.subs {
            sub.job.post_build(&mut sub.solution, ctx)?;
            if !ctx.force {
                sub.solution
                    .save_diff(&sub.dir.join(DIFF_FILENAME), ctx.terminal)?;
            }
        }

        if !self.needs_link {
            ctx.terminal.detail("Nothing to link.");
            return Ok(());
        }

        let workdir = solution
            .dir
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let out = solution.build_dir.join(self.spec.outname());

        let mut command = String::new();
        match self.spec.output_kind() {
            OutputKind::Exec => {
                ctx.terminal.info(&format!("Linking \"{workdir}\"..."));

                command.push_str(self.spec.linker());
                command.push(' ');
                if let Some(flags) = self.spec.linker_flags() {
                    command.push_str(flags);
                    command.push(' ');
                }
                for object in &self.objects {
                    command.push_str(&format!("\"{}\" ", object.display()));
                }
                for lib in self.spec.static_libs() {
                    command.push_str(&format!("\"{lib}\" "));
                }
                command.push_str(&format!("-o \"{}\"", out.display()));
            }
            OutputKind::Lib => {
                ctx.terminal.info(&format!("Archiving \"{workdir}\"..."));

                command.push_str(&format!("{} rcs \"{}\" ", self.spec.archiver(), out.display()));
                for object in &self.objects {
                    command.push_str(&format!("\"{}\" ", object.display()));
                }
            }
        }

        run_step(ctx.terminal, command.trim_end())?;

        if let Some(hook) = self.spec.post() {
            ctx.terminal
                .detail(&format!("Post build command: \"{hook}\""));
            run_step(ctx.terminal, hook)?;
        }

        Ok(())
    }
}

/// Run one synchronous shell step; non-zero status is an error that
/// ultimately fails the driver.
fn run_step(terminal: &Terminal, command: &str) -> Result<(), BuildError> {
    terminal.detail(&format!("Command:\n\t{command}"));

    let status = terminal
        .exec_system(command)
        .map_err(|source| BuildError::Exec {
            command: command.to_string(),
            source,
        })?;

    if status != 0 {
        return Err(BuildError::CommandFailed {
            command: command.to_string(),
            status,
        });
    }

    Ok(())
}
