//! Command-line driver for the `liquid` crate: renders or statically
//! analyzes a template file, grounded on this workspace's own `main.rs`
//! argument-parsing style (`pico-args`, a `thiserror` `ArgsError`, a
//! hand-rolled `usage()`).

use liquid::loader::FileSystemLoader;
use liquid::{Environment, Tolerance};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
enum ArgsError {
    #[error("missing command (expected 'render' or 'analyze')")]
    MissingCommand,
    #[error("unknown command '{0}' (expected 'render' or 'analyze')")]
    UnknownCommand(String),
    #[error("missing template path argument")]
    MissingTemplate,
    #[error("unknown tolerance '{0}' (should be 'strict', 'warn', or 'lax')")]
    Tolerance(String),
    #[error(transparent)]
    Pico(#[from] pico_args::Error),
}

enum Command {
    Render,
    Analyze,
}

struct Args {
    command: Command,
    template_path: PathBuf,
    context_path: Option<PathBuf>,
    tolerance: Tolerance,
    autoescape: bool,
    json: bool,
}

fn parse_tolerance(value: &str) -> Result<Tolerance, ArgsError> {
    if value.eq_ignore_ascii_case("strict") {
        Ok(Tolerance::Strict)
    } else if value.eq_ignore_ascii_case("warn") {
        Ok(Tolerance::Warn)
    } else if value.eq_ignore_ascii_case("lax") {
        Ok(Tolerance::Lax)
    } else {
        Err(ArgsError::Tolerance(value.to_string()))
    }
}

impl Args {
    fn new() -> Result<Args, ArgsError> {
        let mut args = pico_args::Arguments::from_env();
        let command = match args.subcommand()?.ok_or(ArgsError::MissingCommand)?.as_str() {
            "render" => Command::Render,
            "analyze" => Command::Analyze,
            other => return Err(ArgsError::UnknownCommand(other.to_string())),
        };
        let context_path = args.opt_value_from_str("--context")?;
        let tolerance = args
            .opt_value_from_fn("--tolerance", parse_tolerance)?
            .unwrap_or_default();
        let autoescape = args.contains("--autoescape");
        let json = args.contains("--json");
        let template_path = args
            .opt_free_from_str::<PathBuf>()?
            .ok_or(ArgsError::MissingTemplate)?;
        args.finish();
        Ok(Self { command, template_path, context_path, tolerance, autoescape, json })
    }
}

fn usage() {
    let exe = std::env::args().next().unwrap_or_default();
    eprintln!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    eprintln!("Usage: {exe} <render|analyze> <template> [options]\n");
    eprintln!("Options:");
    eprintln!("  --context <path>    JSON file supplying render/analysis globals");
    eprintln!("  --tolerance <mode>  One of 'strict' (default), 'warn', 'lax'");
    eprintln!("  --autoescape        Enable HTML autoescaping of output");
    eprintln!("  --json              Print 'analyze' output as JSON instead of text");
}

fn load_globals(path: Option<&Path>) -> Result<indexmap::IndexMap<String, liquid::Value>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(indexmap::IndexMap::new());
    };
    let raw = std::fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    match liquid::value::from_json(&json) {
        liquid::Value::Map(m) => Ok(m),
        _ => Err("--context must be a JSON object".into()),
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("warn"));

    let args = match Args::new() {
        Ok(args) => args,
        Err(err) => {
            usage();
            return Err(err)?;
        }
    };

    let directory = args
        .template_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = args
        .template_path
        .file_name()
        .ok_or("template path has no file name")?
        .to_string_lossy()
        .into_owned();

    let env = Environment::builder()
        .loader(Arc::new(FileSystemLoader::new(vec![directory.to_path_buf()])))
        .tolerance(args.tolerance)
        .autoescape(args.autoescape)
        .build();

    let template = env.get_template(&name)?;
    let globals = load_globals(args.context_path.as_deref())?;

    match args.command {
        Command::Render => {
            let output = template.render(globals)?;
            print!("{output}");
        }
        Command::Analyze => {
            let structural = template.analyze()?;
            let contextual =
                if globals.is_empty() { None } else { Some(template.analyze_with_context(globals)?) };
            if args.json {
                let report = serde_json::json!({ "structural": structural, "contextual": contextual });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("tags: {:?}", structural.tags);
                println!("filters: {:?}", structural.filters);
                println!("variables: {:?}", structural.variables);
                println!("locals: {:?}", structural.locals);
                println!("globals: {:?}", structural.globals);
                println!("partials: {:?}", structural.partials);
                if let Some(contextual) = contextual {
                    println!("accessed (contextual): {:?}", contextual.accessed);
                }
            }
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    run()
}
