/// stlpin - annotate STL models from the terminal
///
/// Controls:
///   - Left click: pin a note to the surface under the pointer
///   - Left drag / WASD / Arrow Keys: Orbit the model
///   - Mouse wheel / +/-: Zoom
///   - O: Open another URL or path, R: Reload
///   - Tab / E / X: Select, edit and delete notes
///   - Q/ESC: Quit
use anyhow::Context;
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use stlpin_terminal::{AppConfig, TerminalApp};

#[derive(Parser, Debug)]
#[command(name = "stlpin", version, about = "View STL models in the terminal and pin notes to them")]
struct Args {
    /// URL or path of the STL model to open
    #[arg(env = "STLPIN_SOURCE")]
    source: Option<String>,

    /// Write the annotations as JSON to this file on exit
    #[arg(long)]
    export: Option<PathBuf>,

    /// Log file (the terminal itself is taken over by the viewer)
    #[arg(long, default_value = "stlpin.log")]
    log_file: PathBuf,

    /// Use an orthographic instead of a perspective projection
    #[arg(long)]
    orthographic: bool,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,
}

fn init_logging(path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let mut app = TerminalApp::new(AppConfig {
        source: args.source,
        orthographic: args.orthographic,
        fps: args.fps,
    })?;
    app.run()?;

    if let Some(path) = &args.export {
        let count = app.export(path)?;
        println!("Wrote {} annotations to {}", count, path.display());
    }
    app.shutdown();

    Ok(())
}
