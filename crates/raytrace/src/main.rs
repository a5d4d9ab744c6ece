use anyhow::{Context, Result};
use clap::Parser;
use raytrace::cli::HybridArguments;

fn main() -> Result<()> {
    raytrace::init_logging();
    let config = HybridArguments::parse()
        .into_config()
        .context("invalid arguments")?;
    let tracer = raytrace::tracer_for(&config);

    let summary = raytrace::run_hybrid(&config, &tracer).context("render failed")?;
    let line = raytrace::format_summary(&summary, config.format).context("format summary")?;
    println!("{line}");
    Ok(())
}
