//! Command-line interface definitions.
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Top-level CLI entry point for the config-patch merge engine.
#[derive(Parser, Debug)]
#[command(
    name = "cfgpatch",
    about = "Parse, order and merge configuration patch fragments",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands. Flags override the config file.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Engine configuration file (default: ./cfgpatch.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable parallel parsing and registration (parallel is enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,

    /// Reject fragments that carry no registration class
    #[arg(long, global = true)]
    pub require_registration: bool,

    /// Skip fragments that fail to parse or register instead of failing the run
    #[arg(long, global = true)]
    pub skip_invalid: bool,

    /// Host version checked against every module's requiredVersion
    #[arg(long, global = true)]
    pub host_version: Option<String>,
}

/// Output format for the merged tree.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Fragment syntax
    #[default]
    Text,
    /// JSON document
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Merge fragments and print the resulting tree
    Merge(MergeOpts),
    /// Validate fragments and report the status of each one
    Check(InputOpts),
    /// Print the resolved module merge order
    Order(InputOpts),
    /// Merge fragments and print the value or class at a dotted path
    Query(QueryOpts),
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Merge(_) => "merge",
            Self::Check(_) => "check",
            Self::Order(_) => "order",
            Self::Query(_) => "query",
            Self::Version => "version",
        }
    }
}

/// Fragment files or directories to load.
#[derive(Parser, Debug, Clone)]
pub struct InputOpts {
    /// Fragment files, or directories searched recursively
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

/// Options for the `merge` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct MergeOpts {
    /// Fragments to merge.
    #[command(flatten)]
    pub input: InputOpts,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: Format,
}

/// Options for the `query` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct QueryOpts {
    /// Fragments to merge before querying.
    #[command(flatten)]
    pub input: InputOpts,

    /// Dotted path to look up, e.g. CfgMods.Core.files
    #[arg(long)]
    pub path: String,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: Format,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_merge_with_paths() {
        let cli = Cli::parse_from(["cfgpatch", "merge", "a.cpp", "mods/"]);
        assert!(
            matches!(&cli.command, Command::Merge(_)),
            "Expected Merge command"
        );
        if let Command::Merge(opts) = cli.command {
            assert_eq!(
                opts.input.paths,
                [PathBuf::from("a.cpp"), PathBuf::from("mods/")]
            );
            assert_eq!(opts.format, Format::Text);
        }
    }

    #[test]
    fn parse_merge_json() {
        let cli = Cli::parse_from(["cfgpatch", "merge", "--format", "json", "a.cpp"]);
        if let Command::Merge(opts) = cli.command {
            assert_eq!(opts.format, Format::Json);
        }
    }

    #[test]
    fn merge_requires_a_path() {
        assert!(Cli::try_parse_from(["cfgpatch", "merge"]).is_err());
    }

    #[test]
    fn parse_query() {
        let cli = Cli::parse_from(["cfgpatch", "query", "mods", "--path", "CfgMods.Core.files"]);
        assert!(
            matches!(&cli.command, Command::Query(_)),
            "Expected Query command"
        );
        if let Command::Query(opts) = cli.command {
            assert_eq!(opts.path, "CfgMods.Core.files");
        }
    }

    #[test]
    fn query_requires_path_flag() {
        assert!(Cli::try_parse_from(["cfgpatch", "query", "mods"]).is_err());
    }

    #[test]
    fn parse_check_and_order() {
        let cli = Cli::parse_from(["cfgpatch", "check", "mods"]);
        assert!(matches!(cli.command, Command::Check(_)));
        let cli = Cli::parse_from(["cfgpatch", "order", "mods"]);
        assert!(matches!(cli.command, Command::Order(_)));
        assert_eq!(cli.command.name(), "order");
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["cfgpatch", "version"]);
        assert!(matches!(cli.command, Command::Version));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::parse_from(["cfgpatch", "-v", "check", "mods"]);
        assert!(cli.verbose);
    }

    #[test]
    fn parse_config_override() {
        let cli = Cli::parse_from(["cfgpatch", "--config", "/tmp/cfg.toml", "check", "mods"]);
        assert_eq!(cli.global.config, Some(PathBuf::from("/tmp/cfg.toml")));
    }

    #[test]
    fn parse_policy_flags() {
        let cli = Cli::parse_from([
            "cfgpatch",
            "check",
            "mods",
            "--require-registration",
            "--skip-invalid",
            "--host-version",
            "1.24",
        ]);
        assert!(cli.global.require_registration);
        assert!(cli.global.skip_invalid);
        assert_eq!(cli.global.host_version.as_deref(), Some("1.24"));
    }

    #[test]
    fn parallel_is_enabled_by_default() {
        let cli = Cli::parse_from(["cfgpatch", "check", "mods"]);
        assert!(cli.global.parallel, "parallel should be true by default");
    }

    #[test]
    fn no_parallel_disables_parallel() {
        let cli = Cli::parse_from(["cfgpatch", "--no-parallel", "check", "mods"]);
        assert!(
            !cli.global.parallel,
            "--no-parallel should set parallel to false"
        );
    }
}
