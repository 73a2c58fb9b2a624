//! llm-transcode：在 OpenAI / Gemini / Claude 载荷之间互相转换的命令行工具
//!
//! Usage:
//!   llm-transcode transform <kind> <source> <target> [--file <path>]
//!   llm-transcode validate <provider> [--file <path>]
//!   llm-transcode stream <source> <target> [--file <path>]
//!   llm-transcode providers | pairs

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use llm_transcode::{Provider, TransformKind, TransformationRegistry, TranscodeConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }
    init_logging();

    let result = match args[1].as_str() {
        "transform" => cmd_transform(&args[2..]),
        "validate" => cmd_validate(&args[2..]),
        "stream" => cmd_stream(&args[2..]),
        "providers" => cmd_providers(&args[2..]),
        "pairs" => cmd_pairs(&args[2..]),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"llm-transcode: 大模型对话补全载荷转码工具

USAGE:
    llm-transcode <COMMAND> [OPTIONS]

COMMANDS:
    transform <kind> <source> <target>   Convert one request, response or stream-chunk
    validate <provider>                  Validate a native request
    stream <source> <target>             Convert NDJSON stream chunks line by line
    providers                            List registered providers
    pairs                                List supported (source, target) pairs
    version                              Show version information
    help                                 Show this help message

OPTIONS:
    --file <path>      Read input from a file instead of stdin
    --config <path>    Engine configuration (YAML or JSON)

KINDS:
    request | response | stream-chunk

PROVIDERS:
    openai | gemini | claude (alias: anthropic)

ENVIRONMENT:
    LLM_TRANSCODE_CONFIG    Configuration file path
    RUST_LOG                Log filter (default: warn)"#
    );
}

fn cmd_version() {
    println!("llm-transcode {}", env!("CARGO_PKG_VERSION"));
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Positional arguments with `--flag value` pairs removed.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn load_registry(args: &[String]) -> anyhow::Result<TransformationRegistry> {
    let config = match flag_value(args, "--config") {
        Some(path) => TranscodeConfig::from_path(path)?,
        None => TranscodeConfig::from_env()?,
    };
    Ok(TransformationRegistry::with_defaults(config))
}

fn open_input(args: &[String]) -> anyhow::Result<Box<dyn Read>> {
    match flag_value(args, "--file") {
        Some(path) => {
            let path = PathBuf::from(path);
            let file = std::fs::File::open(&path)
                .with_context(|| format!("cannot open {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdin())),
    }
}

fn read_document(args: &[String]) -> anyhow::Result<serde_json::Value> {
    let mut raw = String::new();
    open_input(args)?
        .read_to_string(&mut raw)
        .context("failed to read input")?;
    serde_json::from_str(&raw).context("input is not valid JSON")
}

fn parse_provider(raw: Option<&&str>, what: &str) -> anyhow::Result<Provider> {
    match raw {
        Some(raw) => Ok(raw.parse()?),
        None => bail!("missing <{what}> provider"),
    }
}

fn cmd_transform(args: &[String]) -> anyhow::Result<()> {
    let pos = positionals(args);
    let kind: TransformKind = match pos.first() {
        Some(raw) => raw.parse()?,
        None => bail!("missing <kind>"),
    };
    let source = parse_provider(pos.get(1), "source")?;
    let target = parse_provider(pos.get(2), "target")?;

    let registry = load_registry(args)?;
    let payload = read_document(args)?;
    let out = registry.transform(source, target, kind, &payload)?;
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let pos = positionals(args);
    let provider = parse_provider(pos.first(), "provider")?;
    let registry = load_registry(args)?;
    let payload = read_document(args)?;
    registry.validate(provider, &payload)?;
    println!("valid");
    Ok(())
}

/// One source chunk per input line; target chunks are written one per line.
fn cmd_stream(args: &[String]) -> anyhow::Result<()> {
    let pos = positionals(args);
    let source = parse_provider(pos.first(), "source")?;
    let target = parse_provider(pos.get(1), "target")?;
    let registry = load_registry(args)?;
    let mut transcoder = registry.stream(source, target)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let reader = BufReader::new(open_input(args)?);
    for (n, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        let line = line.trim();
        let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        // Raw `[DONE]` sentinels arrive unquoted on the wire.
        let chunk = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(chunk) => chunk,
            Err(_) if line == "[DONE]" => serde_json::Value::String(line.to_string()),
            Err(e) => return Err(e).with_context(|| format!("line {} is not valid JSON", n + 1)),
        };
        for produced in transcoder.push(&chunk)? {
            writeln!(out, "{}", serde_json::to_string(&produced)?)?;
        }
    }
    for produced in transcoder.finish()? {
        writeln!(out, "{}", serde_json::to_string(&produced)?)?;
    }
    Ok(())
}

fn cmd_providers(args: &[String]) -> anyhow::Result<()> {
    let registry = load_registry(args)?;
    for provider in registry.providers() {
        println!("{provider}");
    }
    Ok(())
}

fn cmd_pairs(args: &[String]) -> anyhow::Result<()> {
    let registry = load_registry(args)?;
    for pair in registry.pairs() {
        println!("{pair}");
    }
    Ok(())
}
