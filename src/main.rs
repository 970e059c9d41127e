//! ptxinfo
//!
//! Prints the header of a per-face texture file and, on request, its face
//! table, level table, metadata, texel data and reader cache statistics.

mod config;
mod dump;
mod error;

use crate::config::Config;
use crate::error::{ErrorKind, Result};
use clap::{ArgAction, Parser};
use exn::ResultExt;
use ptex_io::FileInputHandler;
use ptex_reader::{Reader, ReaderOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ptxinfo", version, about = "Inspect per-face texture files")]
struct Cli {
    /// Texture file to inspect
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Print metadata keys and values
    #[arg(short, long)]
    meta: bool,

    /// Print the face table
    #[arg(short, long)]
    faces: bool,

    /// Print the level table
    #[arg(short, long)]
    levels: bool,

    /// Print texels of each face (implies --faces)
    #[arg(short, long)]
    data: bool,

    /// Restrict --faces and --data to one face
    #[arg(long, value_name = "ID")]
    face: Option<usize>,

    /// Print reader cache statistics last
    #[arg(short, long)]
    cache: bool,

    /// Decode with colour channels multiplied by alpha
    #[arg(short, long)]
    premultiply: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ptxinfo: {err:?}");
            return ExitCode::FAILURE;
        },
    };
    init_tracing(cli.verbose, &config.log);
    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ptxinfo: {err:?}");
            ExitCode::FAILURE
        },
    }
}

fn init_tracing(verbose: u8, default: &str) {
    let directive = match verbose {
        0 => default,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    let handler = FileInputHandler::default().with_buffer_size(config.buffer_size);
    let options = ReaderOptions::default()
        .with_handler(Arc::new(handler))
        .with_premultiply(cli.premultiply || config.premultiply);
    let reader = Reader::open_with(&cli.file, options).or_raise(|| ErrorKind::Open(cli.file.clone()))?;

    let mut out = std::io::stdout().lock();
    dump::header(&reader, &mut out)?;
    if cli.meta {
        dump::metadata(&reader, &mut out)?;
    }
    if cli.levels {
        dump::levels(&reader, &mut out)?;
    }
    if cli.faces || cli.data {
        let faces = match cli.face {
            Some(face) => face..face + 1,
            None => 0..reader.num_faces(),
        };
        for face in faces {
            dump::face(&reader, face, &mut out)?;
            if cli.data {
                dump::texels(&reader, face, config.max_texels, &mut out)?;
            }
        }
    }
    if cli.cache {
        dump::cache(&reader, &mut out)?;
    }
    out.flush().or_raise(|| ErrorKind::Output)
}
