//! Synth command - render the template

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use ember_common::template::{OutputFormat, Template};

use super::{write_output, AssemblyArgs};
use crate::Result;

/// Render the assembled template
#[derive(Args, Debug)]
pub struct SynthArgs {
    #[command(flatten)]
    pub assembly: AssemblyArgs,

    /// Output format (json or yaml)
    #[arg(short, long, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Rendered template text for `args`
pub fn render(args: &SynthArgs) -> Result<String> {
    let assembly = args.assembly.assemble()?;
    let template = Template::from_graph(&assembly.graph)?;
    Ok(template.render(args.format)?)
}

/// Render the template and write it out
pub fn run(args: SynthArgs) -> Result<()> {
    let rendered = render(&args)?;
    write_output(args.output.as_ref(), &rendered)?;
    if let Some(path) = &args.output {
        info!(path = %path.display(), format = %args.format, "template written");
    }
    Ok(())
}
