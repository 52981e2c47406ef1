use std::fmt;
use std::fs;
use std::io::{self, BufWriter, Write};

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use genedoc_diff::DiffEngine;
use genedoc_merge::{ExecutionMode, GeneDocBuilder};
use genedoc_registry::{FileRegistry, Registry};
use genedoc_resolve::DirIdCatalog;
use genedoc_store::{Backend, JsonlSourceStore, Storage};
use genedoc_sync::{
    change_history, dump_timestamps, sync_generation, timestamp_stats, ApplyReport, SyncApplier,
    SyncVerifier, TimestampRange, VerificationReport,
};
use genedoc_types::{
    current_collection, list_generations, BuildRunRecord, ChangeSet, GenerationId, RunStatus,
};
use serde::Serialize;

use crate::cli::*;
use crate::config::{PipelineConfig, RegisterFile};

/// Configuration and registry shared by every command.
struct Pipeline {
    config: PipelineConfig,
    registry: FileRegistry,
    format: OutputFormat,
}

impl Pipeline {
    fn storage(&self) -> anyhow::Result<Storage> {
        Storage::open(&self.config.backend).context("opening storage")
    }

    fn collection(storage: &Storage, name: &str) -> anyhow::Result<Backend> {
        storage
            .collection(name)
            .with_context(|| format!("opening collection {name}"))
    }

    /// Generation of the latest successful run of `build`.
    fn latest_generation(&self, build: &str) -> anyhow::Result<GenerationId> {
        let record = self
            .registry
            .latest_successful(build)?
            .ok_or_else(|| anyhow!("no successful build of {build}"))?;
        Ok(GenerationId::parse(&record.target)?)
    }

    /// Progress line that never mixes into JSON output.
    fn status(&self, line: fmt::Arguments<'_>) {
        if self.format.status_to_stderr() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(),
        }
        Ok(())
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = PipelineConfig::load(&cli.config)?;
    let registry = FileRegistry::open_with_history_limit(&config.registry, config.history_limit)
        .with_context(|| format!("opening registry {}", config.registry.display()))?;
    let pipeline = Pipeline {
        config,
        registry,
        format: cli.format,
    };

    match cli.command {
        Command::Register(args) => cmd_register(&pipeline, args),
        Command::Build(args) => cmd_build(&pipeline, args),
        Command::Diff(args) => cmd_diff(&pipeline, args),
        Command::Apply(args) => cmd_apply(&pipeline, args),
        Command::Sync(args) => cmd_sync(&pipeline, args),
        Command::Runs(args) => cmd_runs(&pipeline, args),
        Command::Generations(args) => cmd_generations(&pipeline, args),
        Command::Timestamps(args) => cmd_timestamps(&pipeline, args),
        Command::History(args) => cmd_history(&pipeline, args),
        Command::DumpTimestamps(args) => cmd_dump_timestamps(&pipeline, args),
    }
}

fn cmd_register(p: &Pipeline, args: RegisterArgs) -> anyhow::Result<()> {
    let file = RegisterFile::load(&args.file)?;
    for source in &file.sources {
        p.registry.put_source(source)?;
        p.status(format_args!("  {} {}", "source:".green(), source.name.bold()));
    }
    for build in &file.builds {
        p.registry.put_build_config(build)?;
        p.status(format_args!("  {} {}", "build:".green(), build.name.bold()));
    }
    p.status(format_args!(
        "{} Registered {} sources, {} builds",
        "✓".green().bold(),
        file.sources.len(),
        file.builds.len()
    ));
    Ok(())
}

fn cmd_build(p: &Pipeline, args: BuildArgs) -> anyhow::Result<()> {
    let mut merge = p.config.merge.clone();
    if let Some(n) = args.batch_size {
        merge = merge.with_batch_size(n);
    }
    match (args.workers, args.tasks) {
        (Some(workers), true) => {
            let window = merge.batch_size;
            merge = merge.with_mode(ExecutionMode::Tasks { workers, window });
        }
        (Some(workers), false) => merge = merge.with_mode(ExecutionMode::Pool { workers }),
        (None, true) => bail!("--tasks needs --workers"),
        (None, false) => {}
    }

    let target = match args.restart_at {
        Some(index) => {
            merge = merge.restart_at(index);
            p.registry
                .latest_run(&args.build)?
                .ok_or_else(|| anyhow!("no previous run of {} to resume", args.build))?
                .target
        }
        None => GenerationId::today(&args.build)?.name(),
    };

    let storage = p.storage()?;
    let backend = Pipeline::collection(&storage, &target)?;
    let sources = JsonlSourceStore::open(p.config.sources.clone())
        .with_context(|| format!("opening sources {}", p.config.sources.display()))?;
    let catalog = DirIdCatalog::open(p.config.catalog.clone())
        .with_context(|| format!("opening catalog {}", p.config.catalog.display()))?;

    p.status(format_args!("Building {} into {}", args.build.bold(), target.cyan()));
    let record = GeneDocBuilder::new(&p.registry, &sources, &catalog)
        .with_config(merge)
        .build(&args.build, &backend)?;
    p.emit(&record, || print_run(&record))
}

fn cmd_diff(p: &Pipeline, args: DiffArgs) -> anyhow::Result<()> {
    let generation = match &args.new {
        Some(name) => GenerationId::parse(name)?,
        None => p.latest_generation(&args.build)?,
    };
    if generation.build() != args.build {
        bail!("{generation} is not a generation of {}", args.build);
    }

    let storage = p.storage()?;
    let current = Pipeline::collection(&storage, &current_collection(&args.build))?;
    let new = Pipeline::collection(&storage, &generation.name())?;
    let changes = DiffEngine::new(p.config.diff.clone()).diff(&current, &new, &generation)?;

    if let Some(out) = &args.out {
        fs::write(out, serde_json::to_vec_pretty(&changes)?)
            .with_context(|| format!("writing {}", out.display()))?;
        p.status(format_args!(
            "{} Change set written to {}",
            "✓".green().bold(),
            out.display()
        ));
    }
    let summary = changes.summary();
    p.emit(&summary, || print!("{summary}"))
}

#[derive(Serialize)]
struct ApplyOutput<'a> {
    applied: &'a ApplyReport,
    verification: Option<&'a VerificationReport>,
}

fn cmd_apply(p: &Pipeline, args: ApplyArgs) -> anyhow::Result<()> {
    let bytes =
        fs::read(&args.changes).with_context(|| format!("reading {}", args.changes.display()))?;
    let changes: ChangeSet = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing change set {}", args.changes.display()))?;
    let generation = GenerationId::parse(&changes.source)?;

    let storage = p.storage()?;
    let current = Pipeline::collection(&storage, &current_collection(generation.build()))?;
    let new = Pipeline::collection(&storage, &changes.source)?;
    let applied = SyncApplier::new(p.config.sync.clone()).apply(&changes, &new, &current)?;
    let verification = if args.no_verify {
        None
    } else {
        Some(SyncVerifier::new(p.config.sync.clone()).verify(&changes, &current, &applied)?)
    };

    let output = ApplyOutput {
        applied: &applied,
        verification: verification.as_ref(),
    };
    p.emit(&output, || {
        print_apply(&applied);
        if let Some(report) = &verification {
            print_verification(report);
        }
    })?;
    match verification {
        Some(report) if !report.is_valid() => bail!("verification failed for {}", changes.source),
        _ => Ok(()),
    }
}

fn cmd_sync(p: &Pipeline, args: BuildNameArgs) -> anyhow::Result<()> {
    let generation = p.latest_generation(&args.build)?;
    let storage = p.storage()?;
    let current = Pipeline::collection(&storage, &current_collection(&args.build))?;
    let new = Pipeline::collection(&storage, &generation.name())?;

    p.status(format_args!(
        "Syncing {} from {}",
        current_collection(&args.build).bold(),
        generation.to_string().cyan()
    ));
    let outcome = sync_generation(
        &DiffEngine::new(p.config.diff.clone()),
        &p.config.sync,
        &current,
        &new,
        &generation,
    )?;
    p.emit(&outcome, || {
        print!("{}", outcome.changes.summary());
        match (&outcome.applied, &outcome.verification) {
            (Some(applied), Some(report)) => {
                print_apply(applied);
                print_verification(report);
            }
            _ => println!("{} Already up to date", "✓".green().bold()),
        }
    })?;
    if !outcome.is_valid() {
        bail!("verification failed for {generation}");
    }
    Ok(())
}

fn cmd_runs(p: &Pipeline, args: BuildNameArgs) -> anyhow::Result<()> {
    let runs = p.registry.runs(&args.build)?;
    p.emit(&runs, || {
        if runs.is_empty() {
            println!("No runs of {}.", args.build.bold());
        }
        for record in runs.iter().rev() {
            print_run(record);
        }
    })
}

#[derive(Serialize)]
struct GenerationRow {
    name: String,
    date: String,
    latest_successful: bool,
}

fn cmd_generations(p: &Pipeline, args: BuildNameArgs) -> anyhow::Result<()> {
    let storage = p.storage()?;
    let collections = storage.collections()?;
    let has_current = collections.contains(&current_collection(&args.build));
    let latest = p.registry.latest_successful(&args.build)?.map(|r| r.target);

    let rows: Vec<GenerationRow> = list_generations(&collections, &args.build)
        .into_iter()
        .map(|g| GenerationRow {
            latest_successful: latest.as_deref() == Some(g.name().as_str()),
            date: g.date().to_string(),
            name: g.name(),
        })
        .collect();
    p.emit(&rows, || {
        for row in &rows {
            let marker = if row.latest_successful {
                " (latest successful)".green().to_string()
            } else {
                String::new()
            };
            println!("{}  {}{}", row.date.dimmed(), row.name.yellow(), marker);
        }
        let published = if has_current { "published".green() } else { "not published".red() };
        println!("{}: {}", current_collection(&args.build).bold(), published);
    })
}

fn cmd_timestamps(p: &Pipeline, args: BuildNameArgs) -> anyhow::Result<()> {
    let storage = p.storage()?;
    let current = Pipeline::collection(&storage, &current_collection(&args.build))?;
    let stats = timestamp_stats(&current, &p.config.sync.timestamp_field)?;
    p.emit(&stats, || {
        for (ts, count) in &stats.by_timestamp {
            println!("{}\t{}", ts.cyan(), count);
        }
        if stats.unstamped > 0 {
            println!("{}\t{}", "(none)".dimmed(), stats.unstamped);
        }
        println!("total\t{}", stats.total().to_string().bold());
    })
}

fn cmd_history(p: &Pipeline, args: HistoryArgs) -> anyhow::Result<()> {
    let storage = p.storage()?;
    let current = Pipeline::collection(&storage, &current_collection(&args.build))?;
    let range = TimestampRange {
        after: args.after,
        before: args.before,
    };
    let docs = change_history(&current, &p.config.sync.timestamp_field, &range)?;
    p.emit(&docs, || {
        for doc in &docs {
            println!("{}\t{}", doc.id.to_string().yellow(), doc.timestamp.cyan());
        }
        println!("{} documents", docs.len().to_string().bold());
    })
}

fn cmd_dump_timestamps(p: &Pipeline, args: DumpArgs) -> anyhow::Result<()> {
    let storage = p.storage()?;
    let current = Pipeline::collection(&storage, &current_collection(&args.build))?;
    let field = &p.config.sync.timestamp_field;
    match &args.out {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let lines = dump_timestamps(&current, field, &mut BufWriter::new(file))?;
            p.status(format_args!(
                "{} {} timestamps written to {}",
                "✓".green().bold(),
                lines,
                path.display()
            ));
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            dump_timestamps(&current, field, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn print_run(record: &BuildRunRecord) {
    let status = match record.status {
        RunStatus::Success => record.status.to_string().green().bold(),
        RunStatus::Failed => record.status.to_string().red().bold(),
        RunStatus::Building => record.status.to_string().yellow().bold(),
    };
    println!("{} {}  run {}", status, record.target.yellow(), record.run_id.to_string().dimmed());
    println!("  started: {}", record.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(elapsed) = record.elapsed() {
        println!("  elapsed: {}s", elapsed.num_seconds());
    }
    if record.restart_at > 0 {
        println!("  restart_at: {}", record.restart_at);
    }
    if let Some(failure) = &record.failure {
        println!("  failure: {}", failure.red());
    }
    for (key, value) in &record.stats {
        println!("  {key}: {value}");
    }
}

fn print_apply(applied: &ApplyReport) {
    println!("{} Applied {}", "✓".green().bold(), applied.source.yellow());
    println!("  inserted: {}", applied.inserted);
    println!("  overwritten: {}", applied.overwritten);
    println!("  deleted: {}", applied.deleted);
    println!(
        "  updated: {} (unchanged {}, missing {})",
        applied.updates.modified, applied.updates.unchanged, applied.updates.missing
    );
    if applied.unset_skipped > 0 {
        println!("  {} {} removed fields not unset", "!".yellow(), applied.unset_skipped);
    }
}

fn print_verification(report: &VerificationReport) {
    for check in &report.checks {
        let line = check.to_string();
        if check.passed() {
            println!("  {}", line.green());
        } else {
            println!("  {}", line.red().bold());
        }
    }
    for violation in &report.violations {
        println!("    {}", violation.red());
    }
}
