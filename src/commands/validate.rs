//! Validate command - build the assembly and summarize it

use clap::Args;
use tracing::info;

use super::{write_output, AssemblyArgs};
use crate::assembly::Assembly;
use crate::Result;

/// Build and validate the assembly without rendering it
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub assembly: AssemblyArgs,
}

/// Resource count per group, plus parameter and output totals
pub fn summary(assembly: &Assembly) -> String {
    let graph = &assembly.graph;
    let groups: Vec<String> = graph
        .groups()
        .into_iter()
        .map(|group| format!("{group}: {}", graph.resources_in(group).count()))
        .collect();
    format!(
        "valid: {} resources ({}), {} parameters, {} outputs",
        graph.len(),
        groups.join(", "),
        graph.parameters().count(),
        graph.outputs().count()
    )
}

/// Print the validation summary to stdout
pub fn run(args: ValidateArgs) -> Result<()> {
    let assembly = args.assembly.assemble()?;
    info!(resources = assembly.graph.len(), "assembly is valid");
    write_output(None, &summary(&assembly))
}
