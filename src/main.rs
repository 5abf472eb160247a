//! hoard - incremental tweet archiver CLI
//!
//! Main entry point for the hoard command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use hoard::cli::{self, Cli, Commands, OutputFormat};
use hoard::logging::init_cli_logging;
use hoard::{
    Account, ArchiveStore, Author, CONTENT_DIVIDER_WIDTH, Config, CsvImportReport,
    DownloadReport, HttpMediaSource, IngestionPipeline, ItemKind, MediaResolver,
    PipelineSettings, Record, RunStats, SnapshotWriter, Storage, SystemClock, TwitterClient,
    format_count, format_error, format_number, format_optional_date,
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_logging(cli.quiet, cli.verbose);

    match &cli.command {
        Commands::Sync(args) => cmd_sync(&cli, args),
        Commands::ImportCsv(args) => cmd_import_csv(&cli, args),
        Commands::DownloadMedia => cmd_download_media(&cli),
        Commands::Stats => cmd_stats(&cli),
        Commands::Tags(args) => cmd_tags(&cli, args),
        Commands::Tagged(args) => cmd_tagged(&cli, args),
        Commands::Show(args) => cmd_show(&cli, args),
        Commands::Config(args) => cmd_config(&cli, args),
        Commands::Completions(args) => cmd_completions(args),
    }
}

/// Effective configuration: file and environment, then CLI flags.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }
    if let Some(media) = &cli.media {
        config.paths.media = Some(media.clone());
    }
    if let Some(snapshots) = &cli.snapshots {
        config.paths.snapshots = Some(snapshots.clone());
    }
    Ok(config)
}

fn open_storage(config: &Config) -> Result<Storage> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Storage::open(&db_path).with_context(|| format!("Failed to open {}", db_path.display()))
}

/// Print a validation failure and exit with status 1.
fn exit_invalid(title: &str, explanation: &str, suggestions: &[&str]) -> ! {
    eprintln!("{}", format_error(title, explanation, suggestions));
    std::process::exit(1);
}

fn is_json(cli: &Cli) -> bool {
    matches!(cli.format, OutputFormat::Json | OutputFormat::JsonPretty)
}

fn print_json<T: Serialize>(cli: &Cli, value: &T) -> Result<()> {
    let json = if matches!(cli.format, OutputFormat::JsonPretty) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn spinner(cli: &Cli, message: &str) -> ProgressBar {
    if cli.quiet || is_json(cli) {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn media_pass(config: &Config, storage: &mut Storage) -> Result<DownloadReport> {
    let source = HttpMediaSource::new(&config.api)?;
    let resolver = MediaResolver::new(&source, config.media_path())
        .with_batch_size(config.sync.download_batch);
    Ok(resolver.download_pending(storage)?)
}

fn print_media_report(report: &DownloadReport) {
    println!(
        "  {} media: {} items complete, {} files fetched, {} already on disk",
        "✓".green(),
        format_count(report.items_completed),
        format_count(report.files_fetched),
        format_count(report.files_skipped)
    );
    if report.items_failed > 0 {
        println!(
            "  {} {} items still pending (will retry next run)",
            "!".yellow(),
            format_count(report.items_failed)
        );
    }
}

#[derive(Serialize)]
struct AccountSync {
    handle: String,
    inserted: usize,
    stats: RunStats,
}

#[derive(Serialize)]
struct SyncOutput {
    accounts: Vec<AccountSync>,
    media: Option<DownloadReport>,
}

fn cmd_sync(cli: &Cli, args: &cli::SyncArgs) -> Result<()> {
    let config = load_config(cli)?;
    let accounts: Vec<&Account> = match &args.account {
        Some(handle) => match config.account(handle) {
            Ok(account) => vec![account],
            Err(e) => exit_invalid(&e.to_string(), "", &e.suggestion().into_iter().collect::<Vec<_>>()),
        },
        None => config.accounts.iter().collect(),
    };
    if accounts.is_empty() {
        exit_invalid(
            "No accounts configured",
            "sync needs at least one [[accounts]] entry.",
            &["Run 'hoard config --init' and add an account with a bearer_token."],
        );
    }

    let mut storage = open_storage(&config)?;
    let media_source = HttpMediaSource::new(&config.api)?;
    let clock = SystemClock;
    let settings = PipelineSettings::from(&config);
    let mut known = storage.all_identities_of_kind(ItemKind::Record)?;

    let pb = spinner(cli, "Syncing...");
    let mut output = SyncOutput {
        accounts: Vec::new(),
        media: None,
    };

    for account in accounts {
        pb.set_message(format!("Syncing @{}...", account.name()));
        let mut client = TwitterClient::new(&config.api, account)?;
        let snapshots = SnapshotWriter::new(config.snapshots_path())?;
        let mut pipeline =
            IngestionPipeline::new(&mut storage, &mut client, &clock, snapshots, account.name())
                .with_settings(settings);
        if !args.no_media {
            pipeline = pipeline.with_media(
                MediaResolver::new(&media_source, config.media_path())
                    .with_batch_size(config.sync.download_batch),
            );
        }

        let inserted = match args.only {
            Some(feed) => pipeline.run(feed.into(), &mut known)?,
            None => pipeline.archive_account(&mut known)?,
        };
        output.accounts.push(AccountSync {
            handle: account.name().to_string(),
            inserted: inserted.len(),
            stats: pipeline.last_run_stats(),
        });
    }

    if !args.no_media {
        pb.set_message("Downloading media...");
        output.media = Some(media_pass(&config, &mut storage)?);
    }
    pb.finish_and_clear();

    if is_json(cli) {
        return print_json(cli, &output);
    }
    println!("{}", "Sync complete".bold().cyan());
    for account in &output.accounts {
        println!(
            "  {} @{}: {} new, {} upgraded, {} pages, {} forced waits",
            "✓".green(),
            account.handle,
            format_count(account.inserted),
            account.stats.upgraded,
            account.stats.pages,
            account.stats.forced_waits
        );
    }
    if let Some(report) = &output.media {
        print_media_report(report);
    }
    Ok(())
}

#[derive(Serialize)]
struct CsvOutput {
    handle: String,
    files: Vec<(PathBuf, CsvImportReport)>,
    media: Option<DownloadReport>,
}

fn cmd_import_csv(cli: &Cli, args: &cli::ImportCsvArgs) -> Result<()> {
    let Some(handle) = args.handle.as_deref() else {
        exit_invalid(
            "Missing --handle",
            "CSV import needs the handle the export belongs to.",
            &["hoard import-csv tweets.csv --handle your_handle"],
        );
    };
    let config = load_config(cli)?;
    let account = match config.account(handle) {
        Ok(account) => account,
        Err(e) => exit_invalid(
            &e.to_string(),
            "The bulk lookup runs with that account's credentials.",
            &e.suggestion().into_iter().collect::<Vec<_>>(),
        ),
    };

    let mut storage = open_storage(&config)?;
    let mut known = storage.all_identities_of_kind(ItemKind::Record)?;
    let media_source = HttpMediaSource::new(&config.api)?;
    let clock = SystemClock;
    let mut client = TwitterClient::new(&config.api, account)?;
    let mut output = CsvOutput {
        handle: account.name().to_string(),
        files: Vec::new(),
        media: None,
    };

    let pb = spinner(cli, "Reconciling export...");
    {
        let snapshots = SnapshotWriter::new(config.snapshots_path())?;
        let mut pipeline =
            IngestionPipeline::new(&mut storage, &mut client, &clock, snapshots, account.name())
                .with_settings(PipelineSettings::from(&config));
        if !args.no_media {
            pipeline = pipeline.with_media(
                MediaResolver::new(&media_source, config.media_path())
                    .with_batch_size(config.sync.download_batch),
            );
        }
        for path in &args.paths {
            pb.set_message(format!("Reconciling {}...", path.display()));
            let report = pipeline.import_csv(path, &mut known)?;
            output.files.push((path.clone(), report));
        }
    }

    if !args.no_media {
        pb.set_message("Downloading media...");
        output.media = Some(media_pass(&config, &mut storage)?);
    }
    pb.finish_and_clear();

    if is_json(cli) {
        return print_json(cli, &output);
    }
    println!("{}", format!("CSV import for @{}", output.handle).bold().cyan());
    for (path, report) in &output.files {
        println!(
            "  {} {}: {} new rows, {} confirmed by the API, {} stored from CSV only",
            "✓".green(),
            path.display(),
            format_count(report.pending),
            format_count(report.confirmed),
            format_count(report.stubs)
        );
    }
    if let Some(report) = &output.media {
        print_media_report(report);
    }
    Ok(())
}

fn cmd_download_media(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let mut storage = open_storage(&config)?;
    let pb = spinner(cli, "Downloading media...");
    let report = media_pass(&config, &mut storage)?;
    pb.finish_and_clear();

    if is_json(cli) {
        return print_json(cli, &report);
    }
    print_media_report(&report);
    Ok(())
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let storage = open_storage(&config)?;
    let stats = storage.get_stats()?;

    if is_json(cli) {
        return print_json(cli, &stats);
    }

    let row = |label: &str, value: i64| println!("  {label:<22} {:>10}", format_number(value));
    println!("{}", "Archive Statistics".bold().cyan());
    println!("{}", "─".repeat(40));
    row("Records:", stats.records_count);
    row("  from API:", stats.api_records);
    row("  from CSV only:", stats.csv_records);
    row("  merged:", stats.merged_records);
    row("Authors:", stats.authors_count);
    row("Tags:", stats.tags_count);
    row("Favorites:", stats.favorites_count);
    row("Pending record media:", stats.pending_record_downloads);
    row("Pending author media:", stats.pending_author_downloads);
    println!("{}", "─".repeat(40));

    if let (Some(first), Some(last)) = (stats.first_record_date, stats.last_record_date) {
        println!("  First record: {}", first.format("%Y-%m-%d").to_string().green());
        println!("  Last record:  {}", last.format("%Y-%m-%d").to_string().green());
    }
    Ok(())
}

fn cmd_tags(cli: &Cli, args: &cli::TagsArgs) -> Result<()> {
    let config = load_config(cli)?;
    let storage = open_storage(&config)?;
    let tags = storage.tag_counts(args.limit)?;

    if is_json(cli) {
        return print_json(cli, &tags);
    }
    if tags.is_empty() {
        println!("{}", "No tags archived yet.".yellow());
        return Ok(());
    }
    for tag in &tags {
        println!("  {:>8}  #{}", format_number(tag.records), tag.name.blue());
    }
    Ok(())
}

fn print_record(record: &Record) {
    let date = record
        .created_at
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!(
        "{}  {}  {}",
        record.id.to_string().dimmed(),
        date.dimmed(),
        record.provenance.to_string().dimmed()
    );
    for line in textwrap::wrap(&record.text, 78) {
        println!("   {line}");
    }
    println!();
}

fn cmd_tagged(cli: &Cli, args: &cli::TaggedArgs) -> Result<()> {
    let config = load_config(cli)?;
    let storage = open_storage(&config)?;
    let records = storage.records_with_tag(&args.tag, args.limit)?;

    if is_json(cli) {
        return print_json(cli, &records);
    }
    if records.is_empty() {
        println!("{}", format!("No records tagged '{}'.", args.tag).yellow());
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

#[derive(Serialize)]
struct RecordView {
    record: Record,
    author: Option<Author>,
    tags: Vec<String>,
    favorited_by: Vec<String>,
}

fn cmd_show(cli: &Cli, args: &cli::ShowArgs) -> Result<()> {
    let config = load_config(cli)?;
    let storage = open_storage(&config)?;
    let Some(record) = storage.get_record(args.id)? else {
        anyhow::bail!("Record {} is not archived", args.id);
    };
    let author = match record.author_id {
        Some(id) => storage.find_author_by_identity(id)?,
        None => None,
    };
    let view = RecordView {
        tags: storage.tags_for_record(record.id)?,
        favorited_by: storage.favorites_for_record(record.id)?,
        author,
        record,
    };

    if is_json(cli) {
        return print_json(cli, &view);
    }
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    if let Some(author) = &view.author {
        println!("@{}", author.handle.green());
    }
    for line in textwrap::wrap(&view.record.text, CONTENT_DIVIDER_WIDTH) {
        println!("{line}");
    }
    println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
    println!(
        "  ID: {}  Date: {}  Source: {}",
        view.record.id.to_string().dimmed(),
        format_optional_date(view.record.created_at).dimmed(),
        view.record.provenance
    );
    if let Some(reply_to) = view.record.in_reply_to_status_id {
        println!("  Reply to: {reply_to}");
    }
    if !view.tags.is_empty() {
        println!("  Tags: {}", view.tags.join(", ").blue());
    }
    if !view.favorited_by.is_empty() {
        println!("  Favorited by: @{}", view.favorited_by.join(", @"));
    }
    if !view.record.media_urls.is_empty() {
        let state = if view.record.files_downloaded { "downloaded" } else { "pending" };
        println!("  Media ({state}):");
        for url in &view.record.media_urls {
            println!("    {url}");
        }
    }
    Ok(())
}

fn cmd_config(cli: &Cli, args: &cli::ConfigArgs) -> Result<()> {
    let target = cli
        .config
        .clone()
        .or_else(Config::user_config_path)
        .context("Could not determine config directory; pass --config")?;

    if args.init {
        Config::write_default(&target, args.force)?;
        println!("{} Wrote {}", "✓".green(), target.display());
        return Ok(());
    }

    let config = load_config(cli)?.redacted();
    if is_json(cli) {
        return print_json(cli, &config);
    }
    if args.show {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    println!("{}", "Configuration".bold().cyan());
    println!("  File:      {}", target.display());
    println!("  Database:  {}", config.db_path().display());
    println!("  Media:     {}", config.media_path().display());
    println!("  Snapshots: {}", config.snapshots_path().display());
    println!("  Accounts:  {}", config.accounts.len());
    Ok(())
}

fn cmd_completions(args: &cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "hoard", &mut io::stdout());
    Ok(())
}
