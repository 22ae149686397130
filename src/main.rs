//! kiln's command-line entry point.
//! Renders one template file, resolving includes from a directory.

use anyhow::Context;
use kiln::{
    cli::{build_context, get_args, include_root, Args},
    config::{load_config, EngineConfig},
    error::default_error_handler,
    loader::DirectoryResolver,
    Engine,
};

/// Main application entry point.
fn main() {
    let args = get_args();

    // Logger configuration
    env_logger::Builder::new()
        .filter_level(if args.verbose { log::LevelFilter::Trace } else { log::LevelFilter::Off })
        .init();

    if let Err(err) = run(args) {
        default_error_handler(format!("{err:#}"));
    }
}

/// Main application logic execution.
///
/// # Flow
/// 1. Loads engine configuration
/// 2. Builds the render context from the context file and overrides
/// 3. Renders the template with includes resolved under the root directory
/// 4. Writes the output to stdout or the requested file
fn run(args: Args) -> anyhow::Result<()> {
    let root = include_root(&args);
    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => load_config(&root)?,
    };
    log::debug!("Using engine configuration {config:?}");

    let context = build_context(&args)?;
    let source = std::fs::read_to_string(&args.template)
        .with_context(|| format!("cannot read template {}", args.template.display()))?;

    let engine = Engine::new(config).with_resolver(DirectoryResolver::new(&root));
    let output = engine
        .render_json(source, &context)
        .with_context(|| format!("failed to render {}", args.template.display()))?;

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, output).with_context(|| format!("cannot write {}", path.display()))?;
            log::debug!("Wrote '{}'", path.display());
        }
        None => print!("{output}"),
    }
    Ok(())
}
