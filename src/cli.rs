//! Command-line interface implementation for kiln.
//! Provides argument parsing and the helpers that assemble a render context
//! from files and `--set` overrides.

use anyhow::{bail, Context};
use clap::{error::ErrorKind, CommandFactory, Parser};
use std::path::{Path, PathBuf};

/// Command-line arguments structure for kiln.
#[derive(Parser, Debug)]
#[command(author, version, about = "kiln: render Mako-style templates from the command line", long_about = None)]
pub struct Args {
    /// Path to the template file to render
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// JSON or YAML file with the render context
    #[arg(short, long, value_name = "FILE")]
    pub context: Option<PathBuf>,

    /// Sets a context variable; the value is parsed as JSON, falling back to a string
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, serde_json::Value)>,

    /// Directory includes are resolved against (defaults to the template's directory)
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Engine configuration file (defaults to kiln.json/kiln.yml/kiln.yaml in the root)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parses command line arguments and returns the Args structure.
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let _ = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}

/// Parses a `KEY=VALUE` pair. The value is read as JSON when possible,
/// so `--set debug=true` yields a boolean and `--set name=demo` a string.
pub fn parse_assignment(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{s}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Reads a context file, trying JSON first and YAML second.
pub fn load_context<P: AsRef<Path>>(path: P) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read context file {}", path.display()))?;
    let value: serde_json::Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(_) => serde_yaml::from_str(&content)
            .with_context(|| format!("invalid context file {}", path.display()))?,
    };
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        _ => bail!("context file {} must contain a mapping", path.display()),
    }
}

/// Builds the render context: the context file, if any, overridden by
/// `--set` assignments in order.
pub fn build_context(args: &Args) -> anyhow::Result<serde_json::Value> {
    let mut context = match &args.context {
        Some(path) => load_context(path)?,
        None => serde_json::Map::new(),
    };
    for (key, value) in &args.set {
        context.insert(key.clone(), value.clone());
    }
    Ok(serde_json::Value::Object(context))
}

/// Directory includes are resolved against.
pub fn include_root(args: &Args) -> PathBuf {
    args.root.clone().unwrap_or_else(|| {
        args.template
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}
