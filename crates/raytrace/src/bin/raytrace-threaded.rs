use anyhow::{Context, Result};
use clap::Parser;
use raytrace::cli::ThreadedArguments;

fn main() -> Result<()> {
    raytrace::init_logging();
    let config = ThreadedArguments::parse()
        .into_config()
        .context("invalid arguments")?;
    let tracer = raytrace::tracer_for(&config);

    let summary = raytrace::run_threaded(&config, &tracer).context("render failed")?;
    let line = raytrace::format_summary(&summary, config.format).context("format summary")?;
    println!("{line}");
    Ok(())
}
