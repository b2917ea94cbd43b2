use crate::commands::{self, RunCommand, TableArgs};
use crate::logging;
use crate::store::{Credentials, FormDefinition};
use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "formsync", version)]
#[command(
    about = "Incremental form-submission sync into a CRM intake endpoint",
    long_about = "formsync pulls new form submissions page by page, forwards them oldest-first to the intake endpoint, and keeps a per-form watermark so interrupted runs resume without re-sending delivered records."
)]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "Examples:
  formsync set-credentials --table state.db --source-api-key KEY --destination-auth-key AUTH \\
      --destination-url https://intake.example/submit --source-url-base https://api.example/submissions/
  formsync add-form --table state.db --form-id 1a2b --description \"Contact us\" --topic-id 42
  formsync run --table state.db
  TABLE_NAME=state.db formsync run --workers 4 --log sync.ndjson
  formsync inspect --table state.db")]
struct Cli {
    #[arg(long, global = true, help = "Force debug logging (overrides LOG_LEVEL)")]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct TableOpts {
    #[arg(
        long,
        value_name = "PATH",
        help = "Checkpoint table (SQLite file); falls back to $TABLE_NAME"
    )]
    table: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "Optional TOML config file")]
    config: Option<PathBuf>,
}

impl From<TableOpts> for TableArgs {
    fn from(opts: TableOpts) -> Self {
        TableArgs {
            table: opts.table,
            config: opts.config,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Sync new submissions for all forms, one form, or a scheduler event",
        long_about = "Sync new submissions. Without --form or --event every form in the table is processed. A run summary is recorded even when nothing was sent."
    )]
    #[command(after_long_help = "Examples:
  formsync run --table state.db
  formsync run --table state.db --form 1a2b
  formsync run --table state.db --event event.json")]
    Run {
        #[command(flatten)]
        table: TableOpts,
        #[arg(long, value_name = "FORM_ID", help = "Only sync this stored form")]
        form: Option<String>,
        #[arg(
            long,
            value_name = "PATH",
            conflicts_with = "form",
            help = "Scheduler event JSON carrying one form and its credentials"
        )]
        event: Option<PathBuf>,
        #[arg(long, value_name = "N", help = "Forms synced concurrently (1-40)")]
        workers: Option<usize>,
        #[arg(long, value_name = "PATH", help = "Append NDJSON run outcomes to file")]
        log: Option<PathBuf>,
    },
    #[command(about = "Store or replace a form definition")]
    #[command(arg_required_else_help = true)]
    AddForm {
        #[command(flatten)]
        table: TableOpts,
        #[arg(long, value_name = "FORM_ID", help = "Source form identifier")]
        form_id: String,
        #[arg(long, value_name = "TEXT", help = "Display description")]
        description: String,
        #[arg(long, value_name = "TOPIC_ID", help = "Campaign topic passed to the intake")]
        topic_id: String,
    },
    #[command(about = "Store the credentials record used by every run")]
    #[command(arg_required_else_help = true)]
    SetCredentials {
        #[command(flatten)]
        table: TableOpts,
        #[arg(long, value_name = "KEY", help = "Bearer token for the forms API")]
        source_api_key: String,
        #[arg(long, value_name = "KEY", help = "Auth key injected into intake payloads")]
        destination_auth_key: String,
        #[arg(long, value_name = "URL", help = "Intake endpoint URL")]
        destination_url: String,
        #[arg(long, value_name = "URL", help = "Forms API submissions base URL")]
        source_url_base: String,
    },
    #[command(about = "Show forms, their checkpoints, and recent runs")]
    Inspect {
        #[command(flatten)]
        table: TableOpts,
        #[arg(long, default_value_t = 5, value_name = "N", help = "Recent run summaries to show")]
        runs: usize,
    },
    #[command(about = "Delete items whose expiry has passed")]
    Prune {
        #[command(flatten)]
        table: TableOpts,
    },
    #[command(
        about = "Generate shell completion script",
        long_about = "Generate shell completion script for your shell. Redirect output to your shell completion directory."
    )]
    #[command(arg_required_else_help = true)]
    Completion {
        #[arg(value_enum, value_name = "SHELL", help = "Target shell")]
        shell: Shell,
    },
    #[command(about = "Generate a man page")]
    Man {
        #[arg(
            long,
            value_name = "PATH",
            help = "Write man page to file (stdout when omitted)"
        )]
        output: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match cli.command {
        Commands::Run {
            table,
            form,
            event,
            workers,
            log,
        } => {
            commands::execute_run(RunCommand {
                table: table.into(),
                form,
                event,
                workers,
                log,
            })?;
            Ok(())
        }
        Commands::AddForm {
            table,
            form_id,
            description,
            topic_id,
        } => commands::add_form(
            &table.into(),
            FormDefinition {
                form_id,
                description,
                topic_id,
            },
        ),
        Commands::SetCredentials {
            table,
            source_api_key,
            destination_auth_key,
            destination_url,
            source_url_base,
        } => commands::set_credentials(
            &table.into(),
            Credentials {
                source_api_key,
                destination_auth_key,
                destination_url,
                source_url_base,
            },
        ),
        Commands::Inspect { table, runs } => commands::inspect(&table.into(), runs),
        Commands::Prune { table } => commands::prune(&table.into()).map(|_| ()),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Man { output } => {
            let man = clap_mangen::Man::new(Cli::command());
            match output {
                Some(path) => {
                    let mut bytes = Vec::new();
                    man.render(&mut bytes)?;
                    fs::write(path, bytes)?;
                }
                None => {
                    man.render(&mut io::stdout())?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_rejects_form_with_event() {
        let err = Cli::try_parse_from([
            "formsync", "run", "--table", "s.db", "--form", "a", "--event", "e.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_add_form() {
        let cli = Cli::try_parse_from([
            "formsync",
            "add-form",
            "--table",
            "s.db",
            "--form-id",
            "f1",
            "--description",
            "Contact",
            "--topic-id",
            "42",
        ])
        .unwrap();
        match cli.command {
            Commands::AddForm {
                table, form_id, ..
            } => {
                assert_eq!(table.table, Some(PathBuf::from("s.db")));
                assert_eq!(form_id, "f1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
