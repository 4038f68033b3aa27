//! Line-oriented command dispatcher for an [`ordinalkv::engine::Engine`].
//!
//! Reads one command per line from stdin (or from a `--script` file),
//! translating each into a single [`KvEngine`] call and printing one line
//! of output per command:
//!
//! ```text
//! PUT <key> <value...>   -> OK
//! GET <key>              -> <value> | (nil)
//! DELETE <key>           -> true | false
//! RESET                  -> OK
//! ```
//!
//! A malformed line prints an error to stderr and moves on to the next line
//! rather than aborting the session.

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader};

use ordinalkv::config::StoreSettings;
use ordinalkv::engine::{Engine, KvEngine};
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let mut settings_path: Option<String> = None;
    let mut script_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => settings_path = args.next(),
            "--script" => script_path = args.next(),
            other => eprintln!("unrecognized argument: {other}"),
        }
    }

    let settings = match settings_path {
        Some(path) => StoreSettings::load(&path).unwrap_or_else(|e| {
            eprintln!("failed to load {path}: {e}, using defaults");
            StoreSettings::default()
        }),
        None => StoreSettings::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(settings.log_filter.clone()))
        .init();

    let mut engine = Engine::open(settings.engine_config()).expect("failed to open engine");

    let lines: Box<dyn Iterator<Item = io::Result<String>>> = match script_path {
        Some(path) => Box::new(BufReader::new(File::open(path)?).lines()),
        None => Box::new(BufReader::new(io::stdin()).lines()),
    };

    for line in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        dispatch(&mut engine, line);
    }

    Ok(())
}

fn dispatch(engine: &mut Engine, line: &str) {
    let mut parts = line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_ascii_uppercase();
    let rest = parts.next().unwrap_or_default().trim();

    let result = match command.as_str() {
        "PUT" => run_put(engine, rest),
        "GET" => run_get(engine, rest),
        "DELETE" => run_delete(engine, rest),
        "RESET" => engine.reset().map(|()| "OK".to_string()).map_err(|e| e.to_string()),
        other => Err(format!("unknown command: {other}")),
    };

    match result {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("error: {e} (line: {line:?})"),
    }
}

fn run_put(engine: &mut Engine, rest: &str) -> Result<String, String> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let key = parts
        .next()
        .ok_or("PUT requires a key")?
        .parse::<u64>()
        .map_err(|e| e.to_string())?;
    let value = parts.next().unwrap_or_default();
    engine
        .put(key, value.as_bytes().to_vec())
        .map(|()| "OK".to_string())
        .map_err(|e| e.to_string())
}

fn run_get(engine: &Engine, rest: &str) -> Result<String, String> {
    let key = rest.parse::<u64>().map_err(|e| e.to_string())?;
    match engine.get(key).map_err(|e| e.to_string())? {
        Some(value) => Ok(String::from_utf8_lossy(&value).into_owned()),
        None => Ok("(nil)".to_string()),
    }
}

fn run_delete(engine: &mut Engine, rest: &str) -> Result<String, String> {
    let key = rest.parse::<u64>().map_err(|e| e.to_string())?;
    engine
        .delete(key)
        .map(|existed| existed.to_string())
        .map_err(|e| e.to_string())
}
