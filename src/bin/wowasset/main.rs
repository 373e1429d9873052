//! wowasset CLI - inspect encoded containers and run batch exports.

use std::env;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use wowasset::config::ExportConfig;
use wowasset::containers::adt::MCNK_HEADER_SIZE;
use wowasset::containers::m2::{BLEND_MODE_OVERRIDES, BLEND_OVERRIDES_FIELD, HEADER_ARRAYS, M2_MAGIC};
use wowasset::containers::skin::SKIN_MAGIC;
use wowasset::containers::wmo_group::MOGP_HEADER_SIZE;
use wowasset::export::Exporter;
use wowasset::format::reader::{read_array_header, read_chunks, read_subchunks, read_u32_at, ChunkRef};
use wowasset::format::strings::read_cstr;
use wowasset::format::{tags, ContainerFile, Tag, TagOrder};
use wowasset::model::load_assets;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BUILD_DATE: &str = env!("WOWASSET_BUILD_DATE");

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            "-V" | "--version" => {
                println!("wowasset-cli {} (built {})", VERSION, BUILD_DATE);
                return ExitCode::SUCCESS;
            }
            _ => filtered_args.push(arg),
        }
    }
    init_logging(level);

    if filtered_args.is_empty() {
        print_help();
        return ExitCode::SUCCESS;
    }

    let result = match filtered_args[0] {
        "chunks" | "c" => match filtered_args.get(1) {
            Some(path) => cmd_chunks(path),
            None => usage("wowasset-cli chunks <file>"),
        },
        "m2" | "m" => match filtered_args.get(1) {
            Some(path) => cmd_m2(path),
            None => usage("wowasset-cli m2 <file.m2>"),
        },
        "export" | "e" => {
            if filtered_args.len() < 3 {
                usage("wowasset-cli export <config.json> <assets.json>... [--strict]")
            } else {
                cmd_export(filtered_args[1], &filtered_args[2..])
            }
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(true)
        }
        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!();
            print_help();
            Ok(false)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the command-line level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn usage(text: &str) -> Result<bool> {
    eprintln!("Error: missing argument");
    eprintln!("Usage: {}", text);
    Ok(false)
}

fn print_help() {
    println!("wowasset-cli - chunked asset container toolkit");
    println!();
    println!("USAGE:");
    println!("    wowasset-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    c, chunks <file>                  List the chunks of a container");
    println!("    m, m2     <file.m2>               Show the model header arrays");
    println!("    e, export <config> <assets>...    Encode and write assets from JSON");
    println!("    h, help                           Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Debug logging");
    println!("    -vv, --trace     Trace logging");
    println!("    -q, --quiet      Errors only");
    println!("    -V, --version    Show version and build date");
    println!("    --strict         (export) Fail containers on malformed data");
    println!();
    println!("RUST_LOG overrides the logging level.");
}

/// Tag byte order used by files with this extension.
fn order_for(path: &Path) -> TagOrder {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("m2") => TagOrder::Literal,
        _ => TagOrder::Reversed,
    }
}

/// Size of the fixed header that precedes nested chunks, if `tag` has any.
fn nested_header(tag: Tag) -> Option<usize> {
    if tag == tags::MOGP {
        Some(MOGP_HEADER_SIZE)
    } else if tag == tags::MCNK {
        Some(MCNK_HEADER_SIZE)
    } else {
        None
    }
}

fn print_chunk(chunk: &ChunkRef<'_>, indent: &str) {
    println!(
        "{}{:>10}  {}  {:>10} bytes",
        indent,
        format!("{:#x}", chunk.offset),
        chunk.tag,
        chunk.payload.len()
    );
}

fn cmd_chunks(path: &str) -> Result<bool> {
    let file = ContainerFile::open(path).with_context(|| format!("opening {}", path))?;
    let bytes = file.bytes();
    for magic in [M2_MAGIC, SKIN_MAGIC] {
        if bytes.starts_with(magic) {
            println!("{}: unchunked {} blob, {} bytes", path, String::from_utf8_lossy(magic), bytes.len());
            return Ok(true);
        }
    }

    let order = order_for(Path::new(path));
    let chunks = file.chunks(order).with_context(|| format!("parsing {}", path))?;
    println!("{}: {} chunks, {} bytes", path, chunks.len(), bytes.len());
    for chunk in &chunks {
        print_chunk(chunk, "  ");
        let Some(header) = nested_header(chunk.tag) else {
            continue;
        };
        let Some(rest) = chunk.payload.get(header..) else {
            continue;
        };
        for sub in read_subchunks(rest, chunk.payload_offset() + header, order)? {
            print_chunk(&sub, "      ");
        }
    }
    Ok(true)
}

fn cmd_m2(path: &str) -> Result<bool> {
    let file = ContainerFile::open(path).with_context(|| format!("opening {}", path))?;
    let mut bytes = file.bytes();
    if bytes.starts_with(b"MD21") {
        let chunks = read_chunks(bytes, TagOrder::Literal)?;
        match chunks.iter().find(|c| c.tag == tags::MD21) {
            Some(c) => bytes = c.payload,
            None => bail!("{}: no MD21 chunk", path),
        }
    }
    if !bytes.starts_with(M2_MAGIC) {
        bail!("{}: not a model file", path);
    }

    let version = read_u32_at(bytes, 4)?;
    let flags = read_u32_at(bytes, 0x10)?;
    let (_, name_offset) = read_array_header(bytes, 0x08)?;
    println!("{}: version {}, flags {:#x}", path, version, flags);
    println!("  name: {}", read_cstr(bytes, name_offset as usize).unwrap_or("<invalid>"));
    let mut fields: Vec<(&str, usize)> = HEADER_ARRAYS.to_vec();
    if flags & BLEND_MODE_OVERRIDES != 0 {
        fields.push(("blend_overrides", BLEND_OVERRIDES_FIELD));
    }
    for (name, field) in fields {
        let (count, offset) = read_array_header(bytes, field)?;
        println!("  {:<26} {:>6}  @ {:#x}", name, count, offset);
    }
    Ok(true)
}

fn cmd_export(config_path: &str, rest: &[&str]) -> Result<bool> {
    let strict = rest.iter().any(|&a| a == "--strict");
    let mut config = ExportConfig::load(config_path).with_context(|| format!("loading {}", config_path))?;
    if strict {
        config = config.with_strict(true);
    }

    let mut assets = Vec::new();
    for path in rest.iter().filter(|&&a| a != "--strict") {
        assets.extend(load_assets(path).with_context(|| format!("loading {}", path))?);
    }
    if assets.is_empty() {
        bail!("no assets to export");
    }

    let exporter = Exporter::from_config(config)?;
    let report = exporter.export(&assets);
    report.log_summary();
    println!(
        "{} files written, {} failed assets, {} diagnostics",
        report.written.len(),
        report.failures.len(),
        report.diagnostics.len()
    );
    Ok(report.failures.is_empty())
}
