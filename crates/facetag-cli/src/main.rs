use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facetag_core::{OnnxEngine, VisionEngine, DEFAULT_FEATURE_LEN};
use facetag_store::{FeatureStore, SqliteStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod annotate;
mod app;
mod config;
mod report;
mod shell;
#[cfg(test)]
mod testing;

use app::{App, RecognizeOutcome};
use config::{Backend, Settings};

#[derive(Parser)]
#[command(name = "facetag", about = "Register faces by name and recognize them in images")]
struct Cli {
    /// Settings file
    #[arg(long, global = true, env = "FACETAG_CONFIG", default_value = "facetag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label every face in an image
    Recognize {
        image: PathBuf,
        /// Minimum similarity for a match (overrides the settings file)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Write the annotated preview to this PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add the most confident face in an image to the store
    Register {
        image: PathBuf,
        /// Name to register under (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List registered names (read-only; never creates the database)
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show settings and store status (read-only; never creates the database)
    Status,
    /// Interactive session reading commands from stdin
    Shell,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;

    match cli.command {
        Commands::Recognize {
            image,
            threshold,
            output,
            json,
        } => {
            let mut app = build_app(&settings)?;
            if let Some(t) = threshold {
                if !(0.0..=1.0).contains(&t) {
                    bail!("--threshold must be within [0, 1], got {t}");
                }
                app.set_threshold(t);
            }

            let outcome = app.recognize(&image, |a| {
                if !json {
                    println!("{}", report::face_line(a));
                }
            })?;
            match outcome {
                RecognizeOutcome::Skipped(reason) => {
                    if json {
                        println!("{}", serde_json::json!({ "skipped": reason.to_string() }));
                    } else {
                        println!("{reason}");
                    }
                }
                RecognizeOutcome::Annotated {
                    annotations,
                    preview,
                } => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&annotations)?);
                    }
                    if let Some(path) = output {
                        preview
                            .save(&path)
                            .with_context(|| format!("writing preview {}", path.display()))?;
                        tracing::info!(path = %path.display(), "preview written");
                    }
                }
            }
        }
        Commands::Register { image, name } => {
            let mut app = build_app(&settings)?;
            let outcome = app.register(&image, name.as_deref())?;
            println!("{}", report::register_line(&outcome));
        }
        Commands::List { json } => {
            let store = open_catalog(&settings)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report::list_json(store.as_ref()))?);
            } else {
                for line in report::list_lines(store.as_ref()) {
                    println!("{line}");
                }
            }
        }
        Commands::Status => {
            let store = open_catalog(&settings)?;
            let status = serde_json::json!({
                "backend": store.backend(),
                "faces": store.features().len(),
                "feature_len": store.feature_len(),
                "threshold": settings.matching.threshold,
                "detector_model": settings.engine.detector_model,
                "detector_model_present": settings.engine.detector_model.is_file(),
                "recognizer_model": settings.engine.recognizer_model,
                "recognizer_model_present": settings.engine.recognizer_model.is_file(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Shell => {
            let mut app = build_app(&settings)?;
            let stdin = std::io::stdin();
            shell::run(&mut app, stdin.lock(), &mut std::io::stdout())?;
        }
    }

    Ok(())
}

fn build_app(settings: &Settings) -> Result<App<OnnxEngine>> {
    let engine = OnnxEngine::load(&settings.engine_config()).context("loading vision engine")?;
    let store = open_store(settings, engine.feature_len())?;
    Ok(App::new(
        engine,
        store,
        settings.matching.threshold,
        settings.display,
    ))
}

/// Open the configured backend and load every stored feature.
fn open_store(settings: &Settings, engine_len: usize) -> Result<Box<dyn FeatureStore>> {
    let feature_len = settings.store.feature_len.unwrap_or(engine_len);
    if feature_len != engine_len {
        tracing::warn!(
            feature_len,
            engine_len,
            "store.feature_len differs from the engine's; new registrations will be rejected"
        );
    }

    match settings.store.backend {
        Backend::Sqlite => {
            let path = &settings.store.path;
            let store = SqliteStore::open(path, feature_len)
                .with_context(|| format!("opening feature database {}", path.display()))?;
            Ok(Box::new(store))
        }
        Backend::Mysql => open_mysql(settings, feature_len),
    }
}

/// Open the configured backend for `list` and `status`.
///
/// SQLite is opened read-only, and a database file that does not exist yet
/// reads as empty without being created.
fn open_catalog(settings: &Settings) -> Result<Box<dyn FeatureStore>> {
    let feature_len = settings.store.feature_len.unwrap_or(DEFAULT_FEATURE_LEN);
    match settings.store.backend {
        Backend::Sqlite => {
            let path = &settings.store.path;
            if !path.exists() {
                tracing::info!(path = %path.display(), "feature database not created yet");
                return Ok(Box::new(SqliteStore::open_in_memory(feature_len)?));
            }
            let store = SqliteStore::open_read_only(path, feature_len)
                .with_context(|| format!("opening feature database {}", path.display()))?;
            Ok(Box::new(store))
        }
        Backend::Mysql => open_mysql(settings, feature_len),
    }
}

#[cfg(feature = "mysql")]
fn open_mysql(settings: &Settings, feature_len: usize) -> Result<Box<dyn FeatureStore>> {
    let Some(url) = settings.store.url.as_deref() else {
        bail!("store.url is required for the mysql backend");
    };
    let store = facetag_store::MySqlStore::connect(url, feature_len)
        .context("connecting to the feature database")?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "mysql"))]
fn open_mysql(_settings: &Settings, _feature_len: usize) -> Result<Box<dyn FeatureStore>> {
    bail!("this build has no mysql backend; rebuild with `--features mysql`")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    const LEN: usize = 4;

    fn settings_for(db: &Path) -> Settings {
        let text = format!(
            "[engine]\ndetector_model = \"det.onnx\"\nrecognizer_model = \"rec.onnx\"\n\
             [store]\npath = {:?}\nfeature_len = {LEN}\n",
            db.display().to_string()
        );
        Settings::from_toml(&text).unwrap()
    }

    #[test]
    fn test_catalog_of_missing_database_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("state").join("faces.db");

        let store = open_catalog(&settings_for(&db)).unwrap();
        assert!(store.features().is_empty());
        assert_eq!(store.feature_len(), LEN);
        assert!(!db.exists());
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn test_catalog_reads_existing_database() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("faces.db");
        SqliteStore::open(&db, LEN)
            .unwrap()
            .add("alice", vec![1; LEN])
            .unwrap();

        let mut store = open_catalog(&settings_for(&db)).unwrap();
        assert_eq!(store.features()[0].name, "alice");
        assert!(store.add("bob", vec![2; LEN]).is_err());
        assert_eq!(store.features().len(), 1);
    }

    #[test]
    fn test_open_store_creates_database() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("state").join("faces.db");

        let store = open_store(&settings_for(&db), LEN).unwrap();
        assert_eq!(store.backend(), "sqlite");
        assert!(db.exists());
    }
}
