//! Plan command - print the apply order

use std::fmt::Write as _;

use clap::Args;

use ember_common::ResourceGraph;

use super::{write_output, AssemblyArgs};
use crate::Result;

/// Print the order the provisioning engine applies resources in
#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub assembly: AssemblyArgs,

    /// Only list resources of this group
    #[arg(long)]
    pub group: Option<String>,
}

/// One line per resource: position, logical id, type, then what it follows
pub fn describe(graph: &ResourceGraph, group: Option<&str>) -> Result<String> {
    let order = graph.apply_order()?;
    let mut text = String::new();
    for (position, id) in order.iter().enumerate() {
        let Some(resource) = graph.get(id) else {
            continue;
        };
        if group.is_some_and(|g| g != resource.group) {
            continue;
        }
        let after: Vec<String> = graph
            .dependencies_of(id)
            .into_iter()
            .map(|d| d.to_string())
            .collect();
        let _ = write!(text, "{:>3}. {} ({})", position + 1, id, resource.resource_type);
        if !after.is_empty() {
            let _ = write!(text, " after {}", after.join(", "));
        }
        text.push('\n');
    }
    Ok(text)
}

/// Print the apply order to stdout
pub fn run(args: PlanArgs) -> Result<()> {
    let assembly = args.assembly.assemble()?;
    write_output(None, &describe(&assembly.graph, args.group.as_deref())?)
}
