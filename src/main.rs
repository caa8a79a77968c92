use std::{env, process};

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use exopick::{app::App, catalog};

fn main() {
    // Frames own the terminal, so diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let mut args = env::args().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        println!("Usage: exopick <launchbox_xml_file>");
        println!("File format: LaunchBox XML with Game and AlternateName elements");
        return Ok(1);
    };

    let records = catalog::load(path.as_ref())?;
    println!("Loaded {} game entries.", records.len());

    App::new(records).run()
}
