//! DAS CLI - Tool for inspecting, validating and copying DAS files.

use std::env;
use std::path::Path;

use das::graph::*;
use das::{ParseOutput, ReaderConfig};
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Verbosity selected by the global flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    Quiet,
    Normal,
    Debug,
    Trace,
}

struct Options {
    verbosity: Verbosity,
    config: ReaderConfig,
    json: bool,
    version: bool,
}

/// Split global flags from the command and its operands. `args[0]` is the
/// program name and may be missing.
fn parse_args(args: &[String]) -> Result<(Options, Vec<&str>), String> {
    let mut opts = Options {
        verbosity: Verbosity::Normal,
        config: ReaderConfig::default(),
        json: false,
        version: false,
    };
    let mut filtered_args: Vec<&str> = Vec::new();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => opts.verbosity = Verbosity::Debug,
            "-vv" | "--trace" => opts.verbosity = Verbosity::Trace,
            "-q" | "--quiet" => opts.verbosity = Verbosity::Quiet,
            "--lenient" => opts.config.lenient = true,
            "-j" | "--json" => opts.json = true,
            "--chunk-size" => {
                let Some(size) = iter.next().and_then(|s| s.parse::<usize>().ok()) else {
                    return Err("--chunk-size expects a byte count".to_string());
                };
                opts.config.chunk_capacity = size;
            }
            "-V" | "--version" => opts.version = true,
            _ => filtered_args.push(arg),
        }
    }
    Ok((opts, filtered_args))
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let (opts, filtered_args) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
    };
    if opts.version {
        print_version();
        return;
    }

    init_logging(opts.verbosity);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    match filtered_args[0] {
        // Info command - file summary
        "info" | "i" => {
            let path = require_arg(&filtered_args, 1, "das info <file.das>");
            cmd_info(path, &opts);
        }

        // Validate command - reference and hierarchy checks
        "validate" | "check" => {
            let path = require_arg(&filtered_args, 1, "das validate <file.das>");
            cmd_validate(path, &opts);
        }

        // Dump command - every entity
        "dump" | "d" => {
            let path = require_arg(&filtered_args, 1, "das dump <file.das> [--json]");
            cmd_dump(path, &opts);
        }

        // Copy command - read then re-write
        "copy" | "c" => {
            let input = require_arg(&filtered_args, 1, "das copy <in.das> <out.das>");
            let output = require_arg(&filtered_args, 2, "das copy <in.das> <out.das>");
            cmd_copy(input, output, &opts);
        }

        "help" | "h" | "-h" | "--help" => print_help(),

        // A bare file path is a shortcut for info
        other if other.ends_with(".das") => cmd_info(other, &opts),

        other => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Run 'das help' for usage");
            std::process::exit(1);
        }
    }
}

fn init_logging(verbosity: Verbosity) {
    let default = match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "info",
        Verbosity::Debug => "debug",
        Verbosity::Trace => "trace",
    };
    // RUST_LOG overrides the flags.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn require_arg<'a>(args: &[&'a str], index: usize, usage: &str) -> &'a str {
    match args.get(index) {
        Some(&arg) => arg,
        None => {
            eprintln!("Error: missing file argument");
            eprintln!("Usage: {}", usage);
            std::process::exit(1);
        }
    }
}

fn print_version() {
    println!(
        "das {} (built {} {})",
        env!("CARGO_PKG_VERSION"),
        env!("DAS_BUILD_DATE"),
        env!("DAS_BUILD_TIME")
    );
}

fn print_help() {
    println!("das - DAS asset file toolkit");
    println!();
    println!("USAGE:");
    println!("    das [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    i, info     <file>            Show properties and entity counts");
    println!("    validate    <file>            Check references and hierarchies");
    println!("    d, dump     <file> [--json]   Print every entity");
    println!("    c, copy     <in> <out>        Read a file and write it back out");
    println!("    h, help                       Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose        Show debug output");
    println!("    -vv, --trace         Show trace output (very verbose)");
    println!("    -q, --quiet          Only show errors");
    println!("    --lenient            Recover from unbalanced scopes");
    println!("    --chunk-size <N>     Read in chunks of N bytes (default 4096)");
    println!("    -V, --version        Show version and build date");
    println!();
    println!("EXAMPLES:");
    println!("    das info crate.das");
    println!("    das validate --lenient broken.das");
    println!("    das dump crate.das --json > crate.json");
    println!("    das copy input.das output.das     # Test round-trip");
    println!();
    println!("NOTES:");
    println!("    - Passing a .das file directly is equivalent to 'info'");
    println!("    - RUST_LOG overrides -v / -q");
}

fn load(path: &str, opts: &Options) -> ParseOutput {
    info!("Opening file: {}", path);
    match das::read_file_with(path, opts.config.clone()) {
        Ok(parsed) => {
            debug!(
                "Parsed {} buffers, {} models, {} scenes",
                parsed.graph.buffers.len(),
                parsed.graph.models.len(),
                parsed.graph.scenes.len()
            );
            parsed
        }
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_info(path: &str, opts: &Options) {
    let parsed = load(path, opts);
    let g = &parsed.graph;
    let p = &g.properties;

    println!("File: {}", path);
    println!();
    println!("Properties:");
    println!("  Model:       {}", or_dash(&p.model));
    println!("  Author:      {}", or_dash(&p.author));
    println!("  Copyright:   {}", or_dash(&p.copyright));
    println!("  Modified:    {}", p.moddate);
    println!("  Compression: {}", p.compression);
    println!();
    println!("Entities:");
    println!("  Buffers:       {} ({} bytes)", g.buffers.len(), g.buffer_bytes());
    println!("  Primitives:    {}", g.primitives.len());
    println!("  Morph targets: {}", g.morph_targets.len());
    println!("  Models:        {}", g.models.len());
    println!("  Animations:    {}", g.animations.len());
    println!("  Skeletons:     {}", g.skeletons.len());
    println!("  Scenes:        {}", g.scenes.len());
    if let Some(scene) = g.default_scene().and_then(|i| g.scenes.get(i)) {
        let origin = if scene.synthesized { " (synthesized)" } else { "" };
        println!("  Default scene: {}{}", scene.name, origin);
    }
    if !parsed.diagnostics.is_empty() {
        println!();
        println!("Recovered from {} problem(s):", parsed.diagnostics.len());
        for d in &parsed.diagnostics {
            println!("  {}", d);
        }
    }
}

fn cmd_validate(path: &str, opts: &Options) {
    let parsed = load(path, opts);
    let report = parsed.graph.validate();

    for d in &parsed.diagnostics {
        println!("warning: {}", d);
    }
    print!("{}", report);

    let errors = report.errors().count();
    let warnings = report.warnings().count() + parsed.diagnostics.len();
    println!("{}: {} error(s), {} warning(s)", path, errors, warnings);
    if report.has_errors() {
        std::process::exit(1);
    }
}

fn cmd_dump(path: &str, opts: &Options) {
    let parsed = load(path, opts);
    let g = &parsed.graph;

    if opts.json {
        let doc = graph_json(path, &parsed);
        println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
        return;
    }

    println!("File: {}", path);
    for (i, b) in g.buffers.iter().enumerate() {
        println!("[BUFFER {}] type={:?} len={}", i, b.kind, b.len());
    }
    for (i, t) in g.morph_targets.iter().enumerate() {
        println!("[MORPHTARGET {}] vertices={:?} normals={:?} uvs={:?}", i, t.vertices, t.normals, t.uvs);
    }
    for (i, p) in g.primitives.iter().enumerate() {
        println!(
            "[PRIMITIVE {}] indices={:?} count={} vertices={:?}",
            i, p.indices, p.index_count, p.vertices
        );
        if p.normals.is_some() || p.uvs.is_some() || p.texture.is_some() {
            println!("  normals={:?} uvs={:?} texture={:?}", p.normals, p.uvs, p.texture);
        }
        if !p.morph_targets.is_empty() {
            println!("  morph targets: {:?}", p.morph_targets);
        }
    }
    for (i, m) in g.models.iter().enumerate() {
        println!("[MODEL {}] {} primitives={:?}", i, m.name, m.primitives);
        print_matrix(&m.transform, "  ");
    }
    for (i, a) in g.animations.iter().enumerate() {
        println!(
            "[ANIMATION {}] {} model={:?} {:?} keyframes={} duration={}s",
            i,
            a.name,
            a.model,
            a.interpolation,
            a.keyframes.len(),
            a.duration()
        );
    }
    for (i, s) in g.skeletons.iter().enumerate() {
        println!("[SKELETON {}] {} joints={}", i, s.name, s.joints.len());
        for (j, joint) in s.joints.iter().enumerate() {
            println!("  [JOINT {}] {} children={:?}", j, joint.name, joint.children);
        }
    }
    for (i, s) in g.scenes.iter().enumerate() {
        let flags = match (s.is_default, s.synthesized) {
            (_, true) => " (default, synthesized)",
            (true, false) => " (default)",
            _ => "",
        };
        println!("[SCENE {}] {}{} roots={:?}", i, s.name, flags, s.effective_roots());
        for (n, node) in s.nodes.iter().enumerate() {
            println!(
                "  [NODE {}] {} model={:?} skeleton={:?} children={:?}",
                n, node.name, node.model, node.skeleton, node.children
            );
        }
    }
}

fn cmd_copy(input: &str, output: &str, opts: &Options) {
    let parsed = load(input, opts);
    if Path::new(input) == Path::new(output) {
        eprintln!("Error: input and output are the same file");
        std::process::exit(1);
    }
    if let Err(e) = das::write_file(output, &parsed.graph) {
        eprintln!("Failed to write {}: {}", output, e);
        std::process::exit(1);
    }
    info!("Copied {} -> {}", input, output);
}

// ============================================================================
// Helpers
// ============================================================================

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

fn print_matrix(m: &das::util::Mat4, indent: &str) {
    for row in 0..4 {
        let r = m.row(row);
        println!("{}[{:10.4} {:10.4} {:10.4} {:10.4}]", indent, r.x, r.y, r.z, r.w);
    }
}

fn attr_json(a: AttributeRef) -> Value {
    json!({ "buffer": a.buffer, "offset": a.offset })
}

fn graph_json(path: &str, parsed: &ParseOutput) -> Value {
    let g = &parsed.graph;
    let p = &g.properties;
    json!({
        "file": path,
        "properties": {
            "model": p.model,
            "author": p.author,
            "copyright": p.copyright,
            "moddate": p.moddate,
            "compression": p.compression,
        },
        "buffers": g.buffers.iter().map(|b| json!({
            "type": b.kind.bits(),
            "len": b.len(),
        })).collect::<Vec<_>>(),
        "morph_targets": g.morph_targets.iter().map(|t| json!({
            "vertices": attr_json(t.vertices),
            "normals": t.normals.map(attr_json),
            "uvs": t.uvs.map(attr_json),
        })).collect::<Vec<_>>(),
        "primitives": g.primitives.iter().map(|p| json!({
            "indices": attr_json(p.indices),
            "index_count": p.index_count,
            "vertices": attr_json(p.vertices),
            "normals": p.normals.map(attr_json),
            "uvs": p.uvs.map(attr_json),
            "texture": p.texture,
            "morph_targets": p.morph_targets,
        })).collect::<Vec<_>>(),
        "models": g.models.iter().map(|m| json!({
            "name": m.name,
            "primitives": m.primitives,
            "transform": m.transform.to_cols_array(),
        })).collect::<Vec<_>>(),
        "animations": g.animations.iter().map(|a| json!({
            "name": a.name,
            "model": a.model,
            "interpolation": a.interpolation.as_u32(),
            "keyframes": a.keyframes.iter().map(|k| json!({
                "timestamp": k.timestamp,
                "translation": k.translation.map(|v| v.to_array()),
                "rotation": k.rotation.map(|q| q.to_array()),
                "scale": k.scale.map(|v| v.to_array()),
                "weights": k.weights,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "skeletons": g.skeletons.iter().map(|s| json!({
            "name": s.name,
            "joints": s.joints.iter().map(|j| json!({
                "name": j.name,
                "inverse_bind": j.inverse_bind.to_cols_array(),
                "transform": j.transform.to_cols_array(),
                "children": j.children,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "scenes": g.scenes.iter().map(|s| json!({
            "name": s.name,
            "default": s.is_default,
            "synthesized": s.synthesized,
            "roots": s.effective_roots(),
            "nodes": s.nodes.iter().map(|n| json!({
                "name": n.name,
                "model": n.model,
                "skeleton": n.skeleton,
                "transform": n.transform.to_cols_array(),
                "children": n.children,
            })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "diagnostics": parsed.diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_argv() {
        let args = argv(&[]);
        let (opts, rest) = parse_args(&args).unwrap();
        assert!(rest.is_empty());
        assert!(!opts.version);
        assert_eq!(opts.verbosity, Verbosity::Normal);
    }

    #[test]
    fn test_global_flags_split_from_command() {
        let args = argv(&["das", "-v", "dump", "--lenient", "a.das", "--chunk-size", "64", "--json"]);
        let (opts, rest) = parse_args(&args).unwrap();
        assert_eq!(rest, vec!["dump", "a.das"]);
        assert_eq!(opts.verbosity, Verbosity::Debug);
        assert!(opts.config.lenient);
        assert!(opts.json);
        assert_eq!(opts.config.chunk_capacity, 64);
    }

    #[test]
    fn test_chunk_size_needs_number() {
        assert!(parse_args(&argv(&["das", "--chunk-size"])).is_err());
        assert!(parse_args(&argv(&["das", "--chunk-size", "big"])).is_err());
    }
}
