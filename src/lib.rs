//! Spark on EMR-on-EKS as one assembled resource graph
//!
//! [`RootAssembly`] composes the network, compute, studio and endpoint
//! declarations; [`Cli`] exposes it as the `ember` binary.

pub mod assembly;
pub mod commands;
pub mod config;
pub mod error;

pub use assembly::{Assembly, RootAssembly};
pub use config::{AssemblyConfig, Naming};
pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Ember - declare Spark on EMR-on-EKS infrastructure
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the template as JSON or YAML
    Synth(commands::synth::SynthArgs),
    /// Print the apply order with each resource's dependencies
    Plan(commands::plan::PlanArgs),
    /// Build and validate the assembly, then print a summary
    Validate(commands::validate::ValidateArgs),
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Synth(args) => commands::synth::run(args),
            Commands::Plan(args) => commands::plan::run(args),
            Commands::Validate(args) => commands::validate::run(args),
        }
    }
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
    fn test_parse_synth_flags() {
        let cli = Cli::try_parse_from([
            "ember",
            "synth",
            "-c",
            "eks_admin=alice",
            "--parameter",
            "/Main/Domain=example.com",
            "--format",
            "yaml",
        ])
        .expect("parses");
        let Commands::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.assembly.context, vec!["eks_admin=alice"]);
        assert_eq!(args.assembly.parameters, vec!["/Main/Domain=example.com"]);
        assert_eq!(args.format, ember_common::template::OutputFormat::Yaml);
    }

    #[test]
    fn test_help_describes_every_command() {
        let help = Cli::command().render_long_help().to_string();
        assert!(help.contains("Render the template as JSON or YAML"));
        assert!(help.contains("Print the apply order"));
        assert!(help.contains("Build and validate the assembly"));
    }

    #[test]
    fn test_invalid_argument_names_the_flag() {
        let err = Error::invalid_argument("--output", "cannot write /x");
        assert_eq!(err.to_string(), "invalid argument --output: cannot write /x");
        assert!(err.declaration().is_none());
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["ember", "synth", "--format", "toml"]).is_err());
    }
}
