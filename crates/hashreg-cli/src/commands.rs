use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;

use hashreg_core::{EventBody, HashRecord, RegistryEvent};
use hashreg_journal::{JournalConfig, JournaledRegistry};
use hashreg_server::{HashregServer, ServerConfig, TokenConfig};
use hashreg_types::{ActorId, Fingerprint, TemporalAnchor};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let journal = cli.journal.as_path();
    let format = cli.format;
    match cli.command {
        Command::Init(args) => cmd_init(journal, format, args),
        Command::Fingerprint(args) => cmd_fingerprint(format, args),
        Command::Store(args) => cmd_store(journal, format, args),
        Command::StoreFile(args) => cmd_store_file(journal, format, args),
        Command::BatchStore(args) => cmd_batch_store(journal, format, args),
        Command::Verify(args) => cmd_verify(journal, format, args),
        Command::BatchVerify(args) => cmd_batch_verify(journal, format, args),
        Command::Check(args) => cmd_check(journal, format, args),
        Command::Info(args) => cmd_info(journal, format, args),
        Command::Stats => cmd_stats(journal, format),
        Command::Transfer(args) => cmd_transfer(journal, format, args),
        Command::Audit(args) => cmd_audit(journal, format, args),
        Command::Serve(args) => cmd_serve(journal, args),
        Command::Token(args) => cmd_token(format, args),
    }
}

fn open(journal: &Path) -> anyhow::Result<JournaledRegistry> {
    if !journal.exists() {
        bail!(
            "no registry at {}; run `hashreg init --admin <id>` first",
            journal.display()
        );
    }
    JournaledRegistry::open(journal, &JournalConfig::default(), None)
        .with_context(|| format!("opening registry journal {}", journal.display()))
}

fn print_json(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn format_time(anchor: &TemporalAnchor) -> String {
    i64::try_from(anchor.physical_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| anchor.to_string())
}

fn print_record(fingerprint: &Fingerprint, record: &HashRecord) {
    if record.exists {
        println!("{} {}", "●".green(), fingerprint.to_hex().bold());
        println!("  Storer:  {}", record.storer.to_hex().cyan());
        println!("  Stored:  {}", format_time(&record.timestamp));
    } else {
        println!("{} {} {}", "○".dimmed(), fingerprint.to_hex(), "not registered".yellow());
    }
}

fn cmd_init(journal: &Path, format: OutputFormat, args: InitArgs) -> anyhow::Result<()> {
    if journal.metadata().map(|m| m.len() > 0).unwrap_or(false) {
        bail!("journal {} is already initialized", journal.display());
    }
    let registry = JournaledRegistry::open(journal, &JournalConfig::default(), Some(args.admin))?;
    let stats = registry.stats()?;
    match format {
        OutputFormat::Json => print_json(json!({
            "journal": journal.display().to_string(),
            "administrator": stats.administrator,
        })),
        OutputFormat::Text => {
            println!(
                "{} Deployed registry in {}",
                "✓".green().bold(),
                journal.display().to_string().bold()
            );
            println!("  Administrator: {}", stats.administrator.to_hex().cyan());
            Ok(())
        }
    }
}

fn cmd_fingerprint(format: OutputFormat, args: FingerprintArgs) -> anyhow::Result<()> {
    let mut rows = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let fp = Fingerprint::digest_file(file)
            .with_context(|| format!("reading {}", file.display()))?;
        rows.push((file, fp));
    }
    match format {
        OutputFormat::Json => print_json(json!(rows
            .iter()
            .map(|(file, fp)| json!({ "file": file.display().to_string(), "fingerprint": fp }))
            .collect::<Vec<_>>())),
        OutputFormat::Text => {
            for (file, fp) in rows {
                println!("{}  {}", fp.to_hex(), file.display());
            }
            Ok(())
        }
    }
}

fn store_one(
    journal: &Path,
    format: OutputFormat,
    fingerprint: Fingerprint,
    caller: ActorId,
) -> anyhow::Result<()> {
    let registry = open(journal)?;
    let record = registry.store_hash(fingerprint, caller)?;
    match format {
        OutputFormat::Json => print_json(json!({ "fingerprint": fingerprint, "record": record })),
        OutputFormat::Text => {
            println!("{} Stored {}", "✓".green().bold(), fingerprint.short_hex().yellow());
            print_record(&fingerprint, &record);
            Ok(())
        }
    }
}

fn cmd_store(journal: &Path, format: OutputFormat, args: StoreArgs) -> anyhow::Result<()> {
    store_one(journal, format, args.fingerprint, args.caller)
}

fn cmd_store_file(journal: &Path, format: OutputFormat, args: StoreFileArgs) -> anyhow::Result<()> {
    let fingerprint = Fingerprint::digest_file(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    store_one(journal, format, fingerprint, args.caller)
}

fn cmd_batch_store(
    journal: &Path,
    format: OutputFormat,
    args: BatchStoreArgs,
) -> anyhow::Result<()> {
    let registry = open(journal)?;
    let records = registry.batch_store_hashes(&args.fingerprints, args.caller)?;
    match format {
        OutputFormat::Json => print_json(json!(args
            .fingerprints
            .iter()
            .zip(&records)
            .map(|(fp, record)| json!({ "fingerprint": fp, "record": record }))
            .collect::<Vec<_>>())),
        OutputFormat::Text => {
            println!(
                "{} Stored {} fingerprints",
                "✓".green().bold(),
                records.len().to_string().bold()
            );
            for fp in &args.fingerprints {
                println!("  {}", fp.to_hex());
            }
            Ok(())
        }
    }
}

fn cmd_verify(journal: &Path, format: OutputFormat, args: VerifyArgs) -> anyhow::Result<()> {
    let registry = open(journal)?;
    let exists = registry.verify_hash(args.fingerprint, args.caller)?;
    match format {
        OutputFormat::Json => print_json(json!({
            "fingerprint": args.fingerprint,
            "exists": exists,
        })),
        OutputFormat::Text => {
            if exists {
                println!("{} {} is registered", "✓".green().bold(), args.fingerprint.to_hex());
            } else {
                println!("{} {} is not registered", "✗".red().bold(), args.fingerprint.to_hex());
            }
            Ok(())
        }
    }
}

fn cmd_batch_verify(
    journal: &Path,
    format: OutputFormat,
    args: BatchVerifyArgs,
) -> anyhow::Result<()> {
    let registry = open(journal)?;
    let results = registry.batch_verify_hashes(&args.fingerprints)?;
    match format {
        OutputFormat::Json => print_json(json!(results)),
        OutputFormat::Text => {
            for (fp, exists) in args.fingerprints.iter().zip(results) {
                let mark = if exists { "✓".green() } else { "✗".red() };
                println!("{mark} {}", fp.to_hex());
            }
            Ok(())
        }
    }
}

/// Fingerprint an artifact, compare it with what the caller expects and
/// report whether the registry knows it. Does not write to the audit log.
fn cmd_check(journal: &Path, format: OutputFormat, args: CheckArgs) -> anyhow::Result<()> {
    let actual = Fingerprint::digest_file(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let matches = actual == args.expected;
    let registered = if journal.exists() {
        Some(open(journal)?.contains(&actual)?)
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_json(json!({
            "file": args.file.display().to_string(),
            "expected": args.expected,
            "actual": actual,
            "matches": matches,
            "registered": registered,
        }))?,
        OutputFormat::Text => {
            if matches {
                println!("{} {} matches", "✓".green().bold(), args.file.display());
            } else {
                println!("{} {} does not match", "✗".red().bold(), args.file.display());
                println!("  Expected: {}", args.expected.to_hex());
                println!("  Actual:   {}", actual.to_hex().yellow());
            }
            match registered {
                Some(true) => println!("  Registry: {}", "registered".green()),
                Some(false) => println!("  Registry: {}", "not registered".yellow()),
                None => {}
            }
        }
    }

    if !matches {
        bail!("integrity check failed for {}", args.file.display());
    }
    Ok(())
}

fn cmd_info(journal: &Path, format: OutputFormat, args: InfoArgs) -> anyhow::Result<()> {
    let record = open(journal)?.hash_info(&args.fingerprint)?;
    match format {
        OutputFormat::Json => print_json(json!({
            "fingerprint": args.fingerprint,
            "record": record,
        })),
        OutputFormat::Text => {
            print_record(&args.fingerprint, &record);
            Ok(())
        }
    }
}

fn cmd_stats(journal: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let registry = open(journal)?;
    let stats = registry.stats()?;
    match format {
        OutputFormat::Json => print_json(json!(stats)),
        OutputFormat::Text => {
            println!("Registry {}", journal.display().to_string().bold());
            println!("  Hashes:        {}", stats.total.to_string().bold());
            println!("  Administrator: {}", stats.administrator.to_hex().cyan());
            Ok(())
        }
    }
}

fn cmd_transfer(journal: &Path, format: OutputFormat, args: TransferArgs) -> anyhow::Result<()> {
    let registry = open(journal)?;
    registry.transfer_ownership(args.new_administrator, args.caller)?;
    match format {
        OutputFormat::Json => print_json(json!(registry.stats()?)),
        OutputFormat::Text => {
            println!(
                "{} Administration transferred to {}",
                "✓".green().bold(),
                args.new_administrator.to_hex().cyan()
            );
            Ok(())
        }
    }
}

fn describe(event: &RegistryEvent) -> String {
    match &event.body {
        EventBody::Genesis { administrator } => {
            format!("administrator {}", administrator.short_id().cyan())
        }
        EventBody::HashStored {
            fingerprint,
            storer,
        } => format!("{} by {}", fingerprint.short_hex().yellow(), storer.short_id()),
        EventBody::HashVerified {
            fingerprint,
            verifier,
            present,
        } => {
            let answer = if *present { "present".green() } else { "absent".red() };
            format!("{} by {} ({answer})", fingerprint.short_hex().yellow(), verifier.short_id())
        }
        EventBody::OwnershipTransferred { previous, new } => {
            format!("{} → {}", previous.short_id(), new.short_id().cyan())
        }
    }
}

fn cmd_audit(journal: &Path, format: OutputFormat, args: AuditArgs) -> anyhow::Result<()> {
    let registry = open(journal)?;
    let events = registry.events_since(args.since, args.limit.unwrap_or(usize::MAX))?;
    match format {
        OutputFormat::Json => print_json(json!(events)),
        OutputFormat::Text => {
            if events.is_empty() {
                println!("No events after #{}.", args.since);
            }
            for event in &events {
                println!(
                    "{} {} {:<20} {}",
                    format!("#{}", event.seq).yellow(),
                    format_time(&event.timestamp).dimmed(),
                    event.kind().to_string().bold(),
                    describe(event)
                );
            }
            Ok(())
        }
    }
}

fn cmd_serve(journal: &Path, args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig {
            journal_path: journal.to_path_buf(),
            ..ServerConfig::default()
        },
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if args.admin.is_some() {
        config.administrator = args.admin;
    }

    let server = HashregServer::open(config)?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}

fn cmd_token(format: OutputFormat, args: TokenArgs) -> anyhow::Result<()> {
    let actor = args.actor.unwrap_or_else(ActorId::ephemeral);
    let entry = TokenConfig::generate(actor);
    match format {
        OutputFormat::Json => print_json(json!({ "token": entry.token, "actor": entry.actor })),
        OutputFormat::Text => {
            eprintln!(
                "{} Add this to the server config; the token acts as {}",
                "✓".green().bold(),
                actor.short_id().cyan()
            );
            print!("{}", entry.to_toml()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run(journal: &Path, args: &[&str]) -> anyhow::Result<()> {
        let journal = journal.to_string_lossy().into_owned();
        let mut argv = vec!["hashreg", "--journal", journal.as_str()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn init_store_and_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("cli.journal");
        let fp = Fingerprint::digest(b"artifact").to_hex();
        let fp = fp.as_str();

        run(&journal, &["init", "--admin", "@ops"]).unwrap();
        assert!(run(&journal, &["init", "--admin", "@ops"]).is_err());

        run(&journal, &["store", fp, "--as", "@ci"]).unwrap();
        assert!(run(&journal, &["store", fp, "--as", "@other"]).is_err());
        run(&journal, &["transfer", "@next", "--as", "@ops"]).unwrap();
        assert!(run(&journal, &["transfer", "@ops", "--as", "@ops"]).is_err());

        let registry = open(&journal).unwrap();
        let stats = registry.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.administrator, ActorId::derive("next"));
    }

    #[test]
    fn commands_require_an_initialized_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("missing.journal");
        assert!(run(&journal, &["stats"]).is_err());
    }

    #[test]
    fn store_file_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("cli.journal");
        let artifact = dir.path().join("app.bin");
        std::fs::write(&artifact, b"\x7fELF binary").unwrap();
        let artifact_arg = artifact.to_string_lossy().into_owned();
        let artifact_arg = artifact_arg.as_str();
        let expected = Fingerprint::digest(b"\x7fELF binary").to_hex();

        run(&journal, &["init", "--admin", "@ops"]).unwrap();
        run(&journal, &["store-file", artifact_arg, "--as", "@ci"]).unwrap();
        run(&journal, &["check", artifact_arg, expected.as_str()]).unwrap();

        let wrong = Fingerprint::digest(b"other").to_hex();
        assert!(run(&journal, &["check", artifact_arg, wrong.as_str()]).is_err());

        // check reads without auditing.
        let registry = open(&journal).unwrap();
        assert_eq!(registry.audit_log().unwrap().len(), 2);
    }

    #[test]
    fn json_output_paths_run() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("cli.journal");
        let (a, b) = (Fingerprint::digest(b"a").to_hex(), Fingerprint::digest(b"b").to_hex());
        let (a, b) = (a.as_str(), b.as_str());

        run(&journal, &["--format", "json", "init", "--admin", "@ops"]).unwrap();
        run(&journal, &["--format", "json", "batch-store", a, b, "--as", "@ci"]).unwrap();
        run(&journal, &["--format", "json", "verify", a, "--as", "@ci"]).unwrap();
        run(&journal, &["--format", "json", "batch-verify", a, b]).unwrap();
        run(&journal, &["--format", "json", "info", a]).unwrap();
        run(&journal, &["--format", "json", "audit", "--since", "1"]).unwrap();
        run(&journal, &["audit", "--limit", "2"]).unwrap();

        let events = open(&journal).unwrap().audit_log().unwrap();
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn token_runs_without_a_journal() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("unused.journal");
        run(&journal, &["token", "--actor", "@ci"]).unwrap();
        run(&journal, &["--format", "json", "token"]).unwrap();
        assert!(!journal.exists());
    }
}
