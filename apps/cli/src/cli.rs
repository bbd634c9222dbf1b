//! Command line definitions for the curation engine.

use std::path::PathBuf;

use ayusync_curation::models::TmSystem;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ayusync",
    version,
    about = "NAMASTE to ICD-11 mapping curation and ConceptMap releases",
    long_about = "Curate AI-suggested NAMASTE to ICD-11 mappings, commit them to the \
                  master map and publish versioned ConceptMap releases.\n\n\
                  Configuration is read from ayusync.toml and AYUSYNC__* environment variables."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Dump Prometheus metrics of this run to stderr on exit.
    #[arg(long = "print-metrics", global = true)]
    pub print_metrics: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a JSON file of curation decisions (one object per ICD entry).
    Submit {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, default_value = "curator")]
        actor: String,
    },

    /// Promote every staged mapping to verified.
    Commit,

    /// Move verified mappings of an ICD entry back to staged.
    Undo {
        #[arg(value_name = "ICD_NAME")]
        icd: String,
    },

    /// Send staged and verified mappings of an ICD entry back to review.
    Revert {
        #[arg(value_name = "ICD_NAME")]
        icd: String,
    },

    /// Move a rejected_correction mapping onto another ICD entry.
    Remap(RemapArgs),

    /// Attach a JSON file of ingestion candidates as suggestions.
    Attach {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Mark each candidate primary even if its system already has one.
        #[arg(long = "force-primary")]
        force_primary: bool,

        /// Ask the AI verifier for candidates without an assessment.
        #[arg(long)]
        enrich: bool,

        #[arg(long, default_value = "system")]
        actor: String,
    },

    /// Store a JSON file of raw ingestion rows for enrichment.
    Stage {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Attach a staging row as a suggestion.
    Promote {
        #[arg(value_name = "ROW_ID")]
        row_id: i64,

        #[arg(long = "force-primary")]
        force_primary: bool,

        #[arg(long, default_value = "system")]
        actor: String,
    },

    /// Run AI enrichment for staging rows and wait for the results.
    EnrichRows {
        #[arg(value_name = "ROW_ID", required = true)]
        row_ids: Vec<i64>,
    },

    /// Snapshot verified mappings into a release.
    Refresh {
        #[arg(value_name = "VERSION")]
        version: String,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Compare a release with an earlier one.
    Diff {
        #[arg(value_name = "VERSION")]
        version: String,

        /// Baseline version (default: the release created just before VERSION).
        #[arg(long)]
        from: Option<String>,
    },

    /// List releases with their element counts.
    Releases,

    /// List the elements of a release.
    Elements {
        #[arg(value_name = "VERSION")]
        version: String,

        #[arg(long)]
        icd: Option<String>,

        #[arg(long, value_parser = parse_system)]
        system: Option<TmSystem>,
    },

    /// Stamp a release as published.
    Publish {
        #[arg(value_name = "VERSION")]
        version: String,
    },

    /// Look up the ICD target of a NAMASTE code or term.
    Translate {
        #[arg(value_parser = parse_system)]
        system: TmSystem,

        #[arg(value_name = "CODE_OR_TERM")]
        code_or_term: String,

        /// Release version (default: latest).
        #[arg(long)]
        release: Option<String>,
    },

    /// Look up the NAMASTE terms of an ICD name or code.
    Reverse {
        #[arg(value_name = "ICD")]
        icd: String,

        #[arg(long)]
        release: Option<String>,
    },

    /// Curation dashboard counts.
    Stats,

    /// ICD entries by number of systems with suggestions.
    Completeness,

    /// Suggestions awaiting review, grouped per ICD entry.
    Review,

    /// Staged and verified mappings, grouped per ICD entry.
    MasterMap,

    /// Rejected mappings split by reason.
    Rejected,

    /// Audit trail of one mapping.
    History {
        #[arg(value_name = "MAPPING_ID")]
        mapping_id: i64,
    },

    /// Add a curated ICD entry.
    AddIcd {
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Pull WHO code and description for an ICD entry.
    EnrichIcd {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Delete all mappings, terms and ICD entries.
    Reset {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Parser, Debug)]
pub struct RemapArgs {
    #[arg(value_parser = parse_system)]
    pub system: TmSystem,

    #[arg(value_name = "TERM")]
    pub term: String,

    /// NAMASTE code of the term, when it has one.
    #[arg(long)]
    pub code: Option<String>,

    /// ICD entry the rejected mapping points at; needed when there are several.
    #[arg(long = "from")]
    pub from_icd: Option<String>,

    /// Destination ICD entry.
    #[arg(long = "to", value_name = "ICD_NAME")]
    pub destination: String,

    /// Create the destination ICD entry if it does not exist.
    #[arg(long = "new-icd")]
    pub new_icd: bool,

    #[arg(long, default_value = "curator")]
    pub actor: String,
}

fn parse_system(value: &str) -> Result<TmSystem, String> {
    value.parse().map_err(|e: ayusync_curation::Error| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_remap() {
        let cli = Cli::try_parse_from([
            "ayusync", "remap", "Unani", "Humma", "--to", "Cough", "--new-icd",
        ])
        .unwrap();
        match cli.command {
            Command::Remap(args) => {
                assert_eq!(args.system, TmSystem::Unani);
                assert_eq!(args.destination, "Cough");
                assert!(args.new_icd);
                assert_eq!(args.actor, "curator");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_system() {
        assert!(Cli::try_parse_from(["ayusync", "translate", "homeopathy", "X"]).is_err());
    }
}
