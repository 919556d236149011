//! CLI commands
//!
//! Every command builds the same assembly from `AssemblyArgs`; they differ
//! only in what they print.

use std::path::PathBuf;

use clap::Args;
use tracing::debug;

use ember_common::context::{parse_override, ContextFile, ContextProvider, StaticContext};
use ember_common::parameters::{
    parse_parameter, ParameterStore, ParameterValue, SsmParameterStore, StaticParameterStore,
};

use crate::assembly::{Assembly, RootAssembly};
use crate::config::AssemblyConfig;
use crate::{Error, Result};

pub mod plan;
pub mod synth;
pub mod validate;

/// Inputs shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct AssemblyArgs {
    /// Assembly configuration file (JSON, or YAML by extension)
    #[arg(long, env = "EMBER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Context file of the form {"context": {...}}
    #[arg(long)]
    pub context_file: Option<PathBuf>,

    /// Context override, key=value; repeatable, wins over the context file
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Parameter store value known now, /path=value; other paths resolve at deploy time
    #[arg(long = "parameter", value_name = "PATH=VALUE")]
    pub parameters: Vec<String>,
}

impl AssemblyArgs {
    /// Configuration file contents, or the defaults
    pub fn load_config(&self) -> Result<AssemblyConfig> {
        match &self.config {
            Some(path) => AssemblyConfig::load(path),
            None => Ok(AssemblyConfig::default()),
        }
    }

    /// Context file values with the command-line overrides on top
    pub fn load_context(&self) -> Result<StaticContext> {
        let mut context = match &self.context_file {
            Some(path) => ContextFile::load(path)?,
            None => StaticContext::new(),
        };
        let mut overrides = StaticContext::new();
        for raw in &self.context {
            let (key, value) = parse_override(raw)?;
            overrides.insert(&key, value);
        }
        context.merge(overrides);
        Ok(context)
    }

    /// Literal parameters from the command line
    pub fn load_parameters(&self) -> Result<LiteralOverrides> {
        let mut literals = StaticParameterStore::new();
        for raw in &self.parameters {
            let (path, value) = parse_parameter(raw)?;
            literals.insert(&path, &value);
        }
        Ok(LiteralOverrides { literals })
    }

    /// Load every input and build the assembly
    pub fn assemble(&self) -> Result<Assembly> {
        let config = self.load_config()?;
        let context = self.load_context()?;
        let parameters = self.load_parameters()?;
        debug!(
            keys = ?context.keys().collect::<Vec<_>>(),
            literal_parameters = !parameters.literals.is_empty(),
            "inputs loaded"
        );
        let context: &dyn ContextProvider = &context;
        Ok(RootAssembly::new(&config, context, &parameters).build()?)
    }
}

/// Literal values for some paths, deploy-time parameters for the rest
#[derive(Clone, Debug, Default)]
pub struct LiteralOverrides {
    literals: StaticParameterStore,
}

impl ParameterStore for LiteralOverrides {
    fn lookup(&self, path: &str) -> ember_common::Result<ParameterValue> {
        match self.literals.lookup(path) {
            Err(ember_common::Error::MissingParameter { .. }) => SsmParameterStore.lookup(path),
            found => found,
        }
    }
}

fn write_output(output: Option<&PathBuf>, contents: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, contents).map_err(|e| {
            Error::invalid_argument("--output", format!("cannot write {}: {e}", path.display()))
        }),
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(contents.as_bytes())?;
            if !contents.ends_with('\n') {
                stdout.write_all(b"\n")?;
            }
            Ok(())
        }
    }
}
