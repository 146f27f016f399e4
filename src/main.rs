//! charterguard - Constitutional compliance engine
//!
//! Main entry point for the charterguard CLI.

mod cli;

use anyhow::Context;
use charterguard::archive::RuleArchive;
use charterguard::config::CharterConfig;
use charterguard::engine::{ComplianceEngine, ComplianceRequest};
use charterguard::llm::{client_from_config, ConstitutionalJudge, RevisionEngine};
use charterguard::server::{ArchiveSources, CharterServer};
use clap::Parser;
use cli::{Cli, Commands, DraftInput, PromptInput};
use serde::Serialize;
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) => CharterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CharterConfig::load_default().context("failed to load default config")?,
    };

    if let Err(e) = charterguard::logging::init(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let sources = ArchiveSources {
        rules_dir: cli.rules.clone().or_else(|| config.rules_dir.clone()),
        include_defaults: config.include_defaults && !cli.no_defaults,
    };

    match cli.command {
        Commands::Validate { dir } => handle_validate(&dir),

        Commands::Guard { input } => {
            let prompt = read_prompt(&input)?;
            let archive = load_archive(&sources)?;
            let report = match archive.snapshot().guard.check(&prompt, None) {
                Ok(()) => GuardReport {
                    status: "APPROVED",
                    rule_id: None,
                    reason: None,
                },
                Err(violation) => GuardReport {
                    status: "BLOCKED",
                    reason: Some(violation.to_string()),
                    rule_id: Some(violation.rule_id),
                },
            };
            print_json(&report)
        }

        Commands::Rules { category, context } => {
            let archive = load_archive(&sources)?;
            let categories = (!category.is_empty()).then_some(category.as_slice());
            let context = (!context.is_empty()).then_some(context.as_slice());
            print_json(&archive.get_rules(categories, context))
        }

        Commands::Cycle {
            input,
            draft,
            context,
            max_retries,
        } => {
            let prompt = read_prompt(&input)?;
            let draft = read_draft(&draft)?;
            let archive = load_archive(&sources)?;
            let engine = build_engine(&config, archive)?;

            let mut request = ComplianceRequest::new(prompt, draft)
                .with_max_retries(max_retries.unwrap_or(config.max_retries));
            if !context.is_empty() {
                request = request.with_context_tags(context);
            }

            let trace = runtime()?
                .block_on(engine.run_compliance_cycle(&request))
                .context("compliance cycle failed")?;
            print_json(&trace)
        }

        Commands::Serve { addr } => {
            let addr = match addr {
                Some(addr) => addr,
                None => config.server_addr()?.to_string(),
            };
            let archive = load_archive(&sources)?;
            let engine = build_engine(&config, archive.clone())?;
            let server = CharterServer::new(archive, engine, sources)
                .with_max_body_bytes(config.server.max_body_bytes);

            println!("charterguard listening on http://{}", addr);
            runtime()?
                .block_on(server.run(&addr))
                .context("server failed")?;
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct GuardReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

fn load_archive(sources: &ArchiveSources) -> anyhow::Result<Arc<RuleArchive>> {
    let archive = Arc::new(RuleArchive::new());
    sources
        .load_into(&archive)
        .context("failed to load rule archive")?;
    Ok(archive)
}

fn handle_validate(dir: &Path) -> anyhow::Result<()> {
    let archive = RuleArchive::new();
    let stats = archive
        .load(dir)
        .with_context(|| format!("{} is not a valid rules directory", dir.display()))?;

    print_json(&serde_json::json!({
        "status": "valid",
        "version": archive.version(),
        "rules": stats.rules,
        "guard_rules": stats.guard_rules,
        "references": stats.references,
    }))
}

fn build_engine(config: &CharterConfig, archive: Arc<RuleArchive>) -> anyhow::Result<ComplianceEngine> {
    let client = client_from_config(&config.llm).context("failed to create LLM client")?;
    let model = config.llm.model.clone();

    Ok(ComplianceEngine::new(
        archive,
        Arc::new(ConstitutionalJudge::new(client.clone(), model.clone())),
        Arc::new(RevisionEngine::new(client, model)),
    ))
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}

fn read_prompt(input: &PromptInput) -> anyhow::Result<String> {
    read_text(input.prompt.as_deref(), input.prompt_file.as_deref())
}

fn read_draft(input: &DraftInput) -> anyhow::Result<String> {
    read_text(input.draft.as_deref(), input.draft_file.as_deref())
}

fn read_text(inline: Option<&str>, file: Option<&Path>) -> anyhow::Result<String> {
    match (inline, file) {
        (Some(text), _) => Ok(text.to_string()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, None) => anyhow::bail!("no input given"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
