//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use charterguard::model::RuleCategory;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// charterguard - Constitutional compliance engine for LLM output
#[derive(Parser, Debug)]
#[command(name = "charterguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/charterguard/config.yaml)
    #[arg(short, long, env = "CHARTERGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of rule files (overrides rules_dir from the config)
    #[arg(short, long, env = "CHARTERGUARD_RULES")]
    pub rules: Option<PathBuf>,

    /// Do not load the built-in rule set
    #[arg(long)]
    pub no_defaults: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Text given inline or read from a file
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct PromptInput {
    /// Prompt text
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long, value_name = "PATH")]
    pub prompt_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct DraftInput {
    /// Draft response text
    #[arg(short, long)]
    pub draft: Option<String>,

    /// Read the draft response from a file
    #[arg(long, value_name = "PATH")]
    pub draft_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check a prompt against the guard rules only
    Guard {
        #[command(flatten)]
        input: PromptInput,
    },

    /// Run a full compliance cycle and print the trace
    Cycle {
        #[command(flatten)]
        input: PromptInput,

        #[command(flatten)]
        draft: DraftInput,

        /// Context tag to apply (repeatable; omit to apply every rule)
        #[arg(short = 'C', long = "context", value_name = "TAG")]
        context: Vec<String>,

        /// Revision attempts (default: max_retries from the config)
        #[arg(short = 'n', long)]
        max_retries: Option<u32>,
    },

    /// List rules of the loaded archive
    Rules {
        /// Restrict to a category (repeatable: universal, domain, tenant)
        #[arg(long = "category", value_name = "CATEGORY")]
        category: Vec<RuleCategory>,

        /// Context tag to apply (repeatable)
        #[arg(short = 'C', long = "context", value_name = "TAG")]
        context: Vec<String>,
    },

    /// Load a rules directory and report what it contains
    Validate {
        /// Directory to validate
        dir: PathBuf,
    },

    /// Run the HTTP API
    Serve {
        /// Listen address (default: server.addr from the config)
        #[arg(short, long)]
        addr: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cycle() {
        let cli = Cli::try_parse_from([
            "charterguard",
            "--no-defaults",
            "--rules",
            "/tmp/rules",
            "cycle",
            "--prompt",
            "dose?",
            "--draft",
            "I have a hunch",
            "-C",
            "GxP",
            "--context",
            "Clinical",
            "--max-retries",
            "5",
        ])
        .unwrap();

        assert!(cli.no_defaults);
        assert_eq!(cli.rules, Some(PathBuf::from("/tmp/rules")));
        match cli.command {
            Commands::Cycle {
                input,
                draft,
                context,
                max_retries,
            } => {
                assert_eq!(input.prompt.as_deref(), Some("dose?"));
                assert_eq!(draft.draft.as_deref(), Some("I have a hunch"));
                assert_eq!(context, vec!["GxP", "Clinical"]);
                assert_eq!(max_retries, Some(5));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_prompt_sources_are_exclusive() {
        let result = Cli::try_parse_from([
            "charterguard",
            "guard",
            "--prompt",
            "x",
            "--prompt-file",
            "p.txt",
        ]);
        assert!(result.is_err());
        assert!(Cli::try_parse_from(["charterguard", "guard"]).is_err());
    }

    #[test]
    fn test_parse_categories() {
        let cli = Cli::try_parse_from([
            "charterguard",
            "rules",
            "--category",
            "domain",
            "--category",
            "Tenant",
        ])
        .unwrap();
        match cli.command {
            Commands::Rules { category, context } => {
                assert_eq!(category, vec![RuleCategory::Domain, RuleCategory::Tenant]);
                assert!(context.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
