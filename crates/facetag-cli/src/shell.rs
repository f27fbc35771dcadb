//! Line-oriented interactive session over one loaded engine and store.

use crate::app::{App, RecognizeOutcome};
use crate::report;
use facetag_core::VisionEngine;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

const HELP: &str = "\
commands:
  recognize <image> [preview.png]   label every face in an image
  register <image> [name]           add the most confident face to the store
  list                              show registered names
  threshold [value]                 show or set the match threshold
  help                              show this text
  quit                              leave the shell
quote paths or names that contain spaces: register \"my photos/eve.png\" 'Eve S'";

/// Read commands from `input` until EOF or `quit`.
///
/// Action failures are reported on `out` and the session continues; only
/// I/O errors on `input` or `out` end it early.
pub fn run<E: VisionEngine, R: BufRead, W: Write>(
    app: &mut App<E>,
    input: R,
    out: &mut W,
) -> io::Result<()> {
    writeln!(
        out,
        "{} faces loaded from {} store, threshold {:.2}. Type `help` for commands.",
        app.store().features().len(),
        app.store().backend(),
        app.threshold()
    )?;
    prompt(out)?;

    for line in input.lines() {
        let line = line?;
        let Some(words) = shlex::split(&line) else {
            writeln!(out, "unbalanced quotes")?;
            prompt(out)?;
            continue;
        };
        let Some((command, rest)) = words.split_first() else {
            prompt(out)?;
            continue;
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        match command.as_str() {
            "quit" | "exit" => return Ok(()),
            "help" => writeln!(out, "{HELP}")?,
            "list" => {
                let lines = report::list_lines(app.store());
                if lines.is_empty() {
                    writeln!(out, "no faces registered")?;
                }
                for l in lines {
                    writeln!(out, "{l}")?;
                }
            }
            "threshold" => threshold(app, &args, out)?,
            "recognize" => match args.as_slice() {
                [image] => recognize(app, Path::new(image), None, out)?,
                [image, preview] => {
                    recognize(app, Path::new(image), Some(PathBuf::from(*preview)), out)?
                }
                _ => writeln!(out, "usage: recognize <image> [preview.png]")?,
            },
            "register" => match args.as_slice() {
                [image] => register(app, Path::new(image), None, out)?,
                [image, name] => register(app, Path::new(image), Some(*name), out)?,
                _ => writeln!(out, "usage: register <image> [name]")?,
            },
            other => writeln!(out, "unknown command `{other}`, try `help`")?,
        }
        prompt(out)?;
    }
    Ok(())
}

fn prompt<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "facetag> ")?;
    out.flush()
}

fn threshold<E: VisionEngine, W: Write>(app: &mut App<E>, args: &[&str], out: &mut W) -> io::Result<()> {
    match args {
        [] => writeln!(out, "threshold {:.2}", app.threshold()),
        [value] => match value.parse::<f32>() {
            Ok(v) if (0.0..=1.0).contains(&v) => {
                app.set_threshold(v);
                tracing::info!(threshold = v, "threshold changed");
                writeln!(out, "threshold {v:.2}")
            }
            _ => writeln!(out, "threshold must be a number within [0, 1]"),
        },
        _ => writeln!(out, "usage: threshold [value]"),
    }
}

fn recognize<E: VisionEngine, W: Write>(
    app: &mut App<E>,
    image: &Path,
    preview_path: Option<PathBuf>,
    out: &mut W,
) -> io::Result<()> {
    let mut lines = Vec::new();
    let outcome = app.recognize(image, |a| lines.push(report::face_line(a)));
    for l in &lines {
        writeln!(out, "{l}")?;
    }

    match outcome {
        Ok(RecognizeOutcome::Skipped(reason)) => writeln!(out, "{reason}"),
        Ok(RecognizeOutcome::Annotated { preview, .. }) => match preview_path {
            Some(path) => match preview.save(&path) {
                Ok(()) => writeln!(out, "preview written to {}", path.display()),
                Err(e) => writeln!(out, "cannot write preview {}: {e}", path.display()),
            },
            None => Ok(()),
        },
        Err(e) => writeln!(out, "error: {e}"),
    }
}

fn register<E: VisionEngine, W: Write>(
    app: &mut App<E>,
    image: &Path,
    name: Option<&str>,
    out: &mut W,
) -> io::Result<()> {
    match app.register(image, name) {
        Ok(outcome) => writeln!(out, "{}", report::register_line(&outcome)),
        Err(e) => writeln!(out, "error: {e}"),
    }
}
