use crate::jobs;
use crate::server;
use clap::{Args, Parser, Subcommand};
use pass_culture::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "pass-culture-api",
    about = "Run the cultural pass API and its maintenance jobs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Anonymize inactive accounts, former beneficiaries and expired deposits
    Anonymize,
    /// Generate at most one pending GDPR data archive
    GdprExtract,
    /// Delete expired GDPR archives and archives without a request
    CleanGdprExtracts,
    /// Import custom reimbursement rules from a CSV file
    ImportReimbursementRules(ImportArgs),
    /// Copy the identity document pictures of a validated check to the object storage
    ArchiveIdPictures(ArchiveArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV file with one rule per line
    #[arg(long)]
    pub(crate) csv: PathBuf,
    /// Report what would be created without writing anything
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ArchiveArgs {
    /// Identification id given by the identity provider
    #[arg(long)]
    pub(crate) identification_id: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Anonymize => jobs::run(jobs::Job::Anonymize).await,
        Command::GdprExtract => jobs::run(jobs::Job::GdprExtract).await,
        Command::CleanGdprExtracts => jobs::run(jobs::Job::CleanGdprExtracts).await,
        Command::ImportReimbursementRules(args) => {
            jobs::run(jobs::Job::ImportReimbursementRules {
                csv: args.csv,
                dry_run: args.dry_run,
            })
            .await
        }
        Command::ArchiveIdPictures(args) => {
            jobs::run(jobs::Job::ArchiveIdPictures {
                identification_id: args.identification_id,
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["pass-culture-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn import_reads_the_csv_path_and_dry_run_flag() {
        let cli = Cli::try_parse_from([
            "pass-culture-api",
            "import-reimbursement-rules",
            "--csv",
            "rules.csv",
            "--dry-run",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::ImportReimbursementRules(args)) => {
                assert_eq!(args.csv, PathBuf::from("rules.csv"));
                assert!(args.dry_run);
            }
            other => panic!("expected ImportReimbursementRules, got {other:?}"),
        }
    }

    #[test]
    fn archive_requires_an_identification_id() {
        assert!(Cli::try_parse_from(["pass-culture-api", "archive-id-pictures"]).is_err());
        let cli = Cli::try_parse_from([
            "pass-culture-api",
            "archive-id-pictures",
            "--identification-id",
            "abcd",
        ])
        .expect("parses");
        assert!(matches!(
            cli.command,
            Some(Command::ArchiveIdPictures(ArchiveArgs { ref identification_id })) if identification_id == "abcd"
        ));
    }
}
