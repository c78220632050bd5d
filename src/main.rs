//! rbxscene CLI - inspect and re-encode binary scene files.

use std::env;
use std::process::exit;
use std::sync::atomic::{AtomicU8, Ordering};

use rbxscene::bform;
use rbxscene::prelude::*;

/// Verbosity level (thread-safe)
const LOG_QUIET: u8 = 0;
const LOG_INFO: u8 = 1;
const LOG_DEBUG: u8 = 2;

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LOG_INFO);

#[inline]
fn log_level() -> u8 {
    LOG_LEVEL.load(Ordering::Relaxed)
}

#[inline]
fn set_log_level(level: u8) {
    LOG_LEVEL.store(level, Ordering::Relaxed);
}

macro_rules! info {
    ($($arg:tt)*) => {
        if log_level() >= LOG_INFO {
            println!("[INFO] {}", format!($($arg)*));
        }
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        if log_level() >= LOG_DEBUG {
            println!("[DEBUG] {}", format!($($arg)*));
        }
    };
}

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut filtered_args: Vec<&str> = Vec::new();
    let mut api_path: Option<String> = None;
    let mut uncompressed = false;
    let mut iter = args[1..].iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-v" | "--verbose" => set_log_level(LOG_DEBUG),
            "-q" | "--quiet" => set_log_level(LOG_QUIET),
            "--uncompressed" => uncompressed = true,
            "--api" => match iter.next() {
                Some(path) => api_path = Some(path.clone()),
                None => {
                    eprintln!("--api requires a schema file path");
                    exit(1);
                }
            },
            _ => filtered_args.push(arg.as_str()),
        }
    }

    let schema = api_path.map(|path| match Schema::load(&path) {
        Ok(schema) => {
            debug!("loaded schema from {}", path);
            schema
        }
        Err(e) => {
            eprintln!("Failed to load schema {}: {}", path, e);
            exit(1);
        }
    });

    if filtered_args.is_empty() {
        print_usage(&args[0]);
        return;
    }

    match filtered_args[0] {
        "info" | "i" => {
            if filtered_args.len() < 2 {
                eprintln!("Usage: {} info <file.rbxl>", args[0]);
                exit(1);
            }
            cmd_info(filtered_args[1], schema.as_ref());
        }
        "recode" | "r" => {
            if filtered_args.len() < 3 {
                eprintln!("Usage: {} recode <in.rbxl> <out.rbxl>", args[0]);
                exit(1);
            }
            cmd_recode(filtered_args[1], filtered_args[2], schema.as_ref(), uncompressed);
        }
        "help" | "h" | "-h" | "--help" => print_usage(&args[0]),
        _ => {
            eprintln!("Unknown command: {}", filtered_args[0]);
            print_usage(&args[0]);
            exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    println!("rbxscene - inspect and re-encode binary scene files");
    println!();
    println!("Usage: {} [options] <command> <file.rbxl>", prog);
    println!();
    println!("Commands:");
    println!("  i, info     Decode a file and show its instance tree");
    println!("  r, recode   Decode a file and encode it again");
    println!("  h, help     Show this help");
    println!();
    println!("Options:");
    println!("  --api <file>    JSON schema for declared-type checking");
    println!("  --uncompressed  Write chunks without compression (recode)");
    println!("  -v, --verbose   Debug output");
    println!("  -q, --quiet     No output");
}

fn cmd_info(path: &str, schema: Option<&Schema>) {
    let out = match bform::decode_file(path, schema) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Failed to decode {}: {}", path, e);
            exit(1);
        }
    };

    report_warnings(&out.warnings);
    info!(
        "{}: {} instances, {} roots",
        path,
        out.scene.len(),
        out.scene.instances.len()
    );
    for root in &out.scene.instances {
        print_tree(root, 0);
    }
}

fn print_tree(inst: &InstanceRef, depth: usize) {
    let inst = inst.borrow();
    if log_level() >= LOG_INFO {
        println!(
            "{}{} ({} properties)",
            "  ".repeat(depth),
            inst.class_name,
            inst.properties.len()
        );
    }
    if log_level() >= LOG_DEBUG {
        for (name, value) in &inst.properties {
            println!("{}  .{} : {}", "  ".repeat(depth), name, value.value_type());
        }
    }
    for child in inst.children() {
        print_tree(child, depth + 1);
    }
}

fn cmd_recode(input: &str, output: &str, schema: Option<&Schema>, uncompressed: bool) {
    let decoded = match bform::decode_file(input, schema) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Failed to decode {}: {}", input, e);
            exit(1);
        }
    };
    report_warnings(&decoded.warnings);
    debug!("decoded {} instances", decoded.scene.len());

    let opts = EncodeOptions {
        compress: !uncompressed,
        ..EncodeOptions::default()
    };
    match bform::encode_file(output, &decoded.scene, schema, &opts) {
        Ok(warnings) => {
            report_warnings(&warnings);
            info!("wrote {}", output);
        }
        Err(e) => {
            eprintln!("Failed to encode {}: {}", output, e);
            exit(1);
        }
    }
}

fn report_warnings(warnings: &[Warning]) {
    if log_level() >= LOG_INFO {
        for warning in warnings {
            eprintln!("[WARN] {}", warning);
        }
    }
}
