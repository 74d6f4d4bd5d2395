mod app;
mod classifier;
mod collector;
mod command;
mod composer;
mod config;
mod detector;
mod normalize;
mod preview;
mod source;
mod speech;
mod state;
mod stats;
mod suggest;
mod ui;
mod worker;

use anyhow::{Context, Result};
use app::{App, Classification, LoopSettings};
use clap::{Parser, Subcommand};
use classifier::GestureClassifier;
use collector::{FrameCollector, JpegFolderStore};
use command::Keymap;
use composer::TextComposer;
use config::{ClassifierBackend, Config};
use detector::ContrastDetector;
use normalize::FrameNormalizer;
use source::ImageSequence;
use speech::{CommandSpeaker, Speech};
use state::{AppMode, RuntimeState};
use std::path::PathBuf;
use std::sync::Arc;
use suggest::{Dictionary, SuggestionEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ui::{RawMode, StatusLine};
use worker::ClassifierWorker;

#[derive(Parser)]
#[command(name = "signify", about = "Sign-language finger spelling to text")]
struct Cli {
    /// Config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Classify gestures and compose text (default)
    Run,
    /// Save normalized canvases as training data
    Collect {
        /// Overrides `storage_folder`
        #[arg(long)]
        folder: Option<PathBuf>,
    },
}

#[hotpath::main]
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?
        .block_on(async_main(cli))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "signify=debug" } else { "signify=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)?;
    let mode = match &cli.mode {
        Some(Mode::Collect { folder }) => {
            if let Some(folder) = folder {
                config.storage_folder = folder.clone();
            }
            AppMode::Collect
        }
        Some(Mode::Run) | None => AppMode::Interactive,
    };

    let state = RuntimeState::new();
    let stats = stats::new_shared();
    let keymap = Keymap::with_overrides(config.max_suggestions, &config.keys)
        .context("invalid [keys] table")?;

    let source = ImageSequence::open(&config.capture.frames_dir, config.capture.loop_frames)
        .with_context(|| format!("cannot open frames in {}", config.capture.frames_dir.display()))?;
    info!("{} frames from {}", source.len(), config.capture.frames_dir.display());

    let detector = ContrastDetector::new(config.detector.threshold, config.detector.min_area);
    let normalizer = FrameNormalizer::new(config.margin, config.canvas_size);
    info!(
        "canvas {}px, margin {}px",
        normalizer.canvas_size(),
        normalizer.margin()
    );

    let mut app = App::new(
        mode,
        LoopSettings::from_config(&config, mode),
        normalizer,
        Box::new(source),
        Box::new(detector),
        Arc::clone(&state),
    )
    .with_stats(Arc::clone(&stats));

    match mode {
        AppMode::Interactive => {
            let dictionary = Dictionary::load(&config.dictionary)?;
            if dictionary.is_empty() {
                warn!("{} has no words, suggestions disabled", config.dictionary.display());
            }
            let engine = SuggestionEngine::new(config.max_suggestions);
            info!(
                "{} dictionary words, up to {} suggestions",
                dictionary.len(),
                engine.max()
            );
            let composer = TextComposer::new(Arc::new(dictionary), engine);

            let classifier = build_classifier(&config)?;
            let classification = if config.classifier.background {
                Classification::Background(ClassifierWorker::spawn(
                    classifier,
                    Some(Arc::clone(&stats)),
                ))
            } else {
                Classification::Inline(classifier)
            };

            let speaker = CommandSpeaker::new(&config.speech.program, config.speech.args.clone());
            app = app
                .with_composer(composer)
                .with_classification(classification)
                .with_speech(Speech::with_stats(Box::new(speaker), Arc::clone(&stats)));
        }
        AppMode::Collect => {
            let store = JpegFolderStore::new(&config.storage_folder);
            info!("saving canvases to {}", store.folder().display());
            app = app.with_collector(FrameCollector::new(Box::new(store)));
        }
    }

    let ctrlc_state = Arc::clone(&state);
    ctrlc::set_handler(move || ctrlc_state.request_stop())
        .context("failed to install Ctrl-C handler")?;

    ui::print_help(mode, &keymap);

    let raw_mode = match RawMode::enable() {
        Ok(guard) => Some(guard),
        Err(e) => {
            warn!("no interactive terminal ({}), keys disabled", e);
            None
        }
    };

    let (tx, rx) = flume::unbounded();
    let input = raw_mode
        .as_ref()
        .map(|_| ui::spawn_input(keymap, tx, Arc::clone(&state)));

    let mut status = StatusLine::new();
    app.run(rx, &mut status).await;

    if let Some(handle) = input {
        let _ = handle.join();
    }
    drop(raw_mode);

    if let Ok(stats) = stats.lock() {
        eprint!("{}", stats.summary());
    }
    Ok(())
}

fn build_classifier(config: &Config) -> Result<Box<dyn GestureClassifier>> {
    let settings = &config.classifier;
    let labels = match &settings.labels {
        Some(path) => classifier::load_labels(path)?,
        None => classifier::default_labels(),
    };

    let classifier: Box<dyn GestureClassifier> = match settings.backend {
        ClassifierBackend::Template => {
            let templates = classifier::TemplateClassifier::load(&settings.templates_dir)
                .with_context(|| {
                    format!("cannot load templates from {}", settings.templates_dir.display())
                })?;
            info!("template classifier: {} samples", templates.len());
            Box::new(templates)
        }
        #[cfg(feature = "onnx")]
        ClassifierBackend::Onnx => {
            let model = classifier::OnnxClassifier::new(
                &settings.model,
                labels.clone(),
                settings.input_size,
            )
            .with_context(|| format!("cannot load model {}", settings.model.display()))?;
            Box::new(model)
        }
        #[cfg(not(feature = "onnx"))]
        ClassifierBackend::Onnx => {
            anyhow::bail!(
                "cannot load model {} ({}px input): onnx backend not enabled. \
                 Build with --features onnx",
                settings.model.display(),
                settings.input_size
            );
        }
    };

    for label in classifier.labels() {
        if !labels.contains(label) {
            warn!("label '{}' is not in the label set", label);
        }
    }
    Ok(classifier)
}

#[cfg(all(test, not(feature = "onnx")))]
mod tests {
    use super::*;

    #[test]
    fn test_onnx_backend_requires_feature() {
        let config = Config::parse(
            r#"
            [classifier]
            backend = "onnx"
            model = "Model/hands.onnx"
            input_size = 192
            "#,
        )
        .unwrap();
        let err = build_classifier(&config).err().unwrap().to_string();
        assert!(err.contains("Model/hands.onnx"));
        assert!(err.contains("192px"));
        assert!(err.contains("--features onnx"));
    }
}
