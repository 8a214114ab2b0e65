use bevy_taws_cli::prelude::*;
use clap::Parser;

fn main() -> CliResult<()> {
    init_logging();

    let args = Cli::parse();
    let context = RenderContext::from_cli(args)?;

    render(context)
}
