//! The tick loop
//!
//! Each tick pulls one frame and runs detect -> normalize -> classify to
//! completion before the next tick can start. Commands are handled on the
//! same task between ticks, so the composer has a single writer.

use crate::classifier::{GestureClassifier, Prediction};
use crate::collector::{CollectError, FrameCollector};
use crate::command::Command;
use crate::composer::TextComposer;
use crate::config::{Config, FrameErrorPolicy};
use crate::detector::HandDetector;
use crate::normalize::FrameNormalizer;
use crate::preview;
use crate::source::FrameSource;
use crate::speech::Speech;
use crate::state::{AppMode, SharedState, TickState};
use crate::stats::{SharedStats, StatKind, Timer};
use crate::ui::{self, StatusLine};
use crate::worker::ClassifierWorker;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Stop,
}

/// Where classification happens
pub enum Classification {
    /// Inside the tick, blocking it
    Inline(Box<dyn GestureClassifier>),
    /// On a worker thread behind a single-slot queue
    Background(ClassifierWorker),
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick: Duration,
    pub on_frame_error: FrameErrorPolicy,
    pub min_confidence: f32,
    pub preview: Option<(PathBuf, u32)>,
    pub display_size: (u32, u32),
}

impl LoopSettings {
    pub fn from_config(config: &Config, mode: AppMode) -> Self {
        Self {
            tick: Duration::from_millis(config.capture.tick_ms.max(1)),
            on_frame_error: config.capture.frame_error_policy(mode),
            min_confidence: config.classifier.min_confidence,
            preview: config
                .preview
                .path
                .clone()
                .map(|p| (p, config.preview.every_ticks.max(1))),
            display_size: config.display_size(),
        }
    }
}

pub struct App {
    mode: AppMode,
    settings: LoopSettings,
    normalizer: FrameNormalizer,
    source: Box<dyn FrameSource>,
    detector: Box<dyn HandDetector>,
    classification: Option<Classification>,
    composer: Option<TextComposer>,
    collector: Option<FrameCollector>,
    speech: Option<Speech>,
    tick: TickState,
    /// Background results from ticks before this one are stale
    label_floor: u64,
    state: SharedState,
    stats: Option<SharedStats>,
}

impl App {
    pub fn new(
        mode: AppMode,
        settings: LoopSettings,
        normalizer: FrameNormalizer,
        source: Box<dyn FrameSource>,
        detector: Box<dyn HandDetector>,
        state: SharedState,
    ) -> Self {
        Self {
            mode,
            settings,
            normalizer,
            source,
            detector,
            classification: None,
            composer: None,
            collector: None,
            speech: None,
            tick: TickState::default(),
            label_floor: 0,
            state,
            stats: None,
        }
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = Some(classification);
        self
    }

    pub fn with_composer(mut self, composer: TextComposer) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn with_collector(mut self, collector: FrameCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_speech(mut self, speech: Speech) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn tick_state(&self) -> &TickState {
        &self.tick
    }

    pub fn composer(&self) -> Option<&TextComposer> {
        self.composer.as_ref()
    }

    pub fn collected(&self) -> u64 {
        self.collector.as_ref().map_or(0, FrameCollector::count)
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Acquire one frame and run it through the pipeline
    pub fn tick(&mut self) -> TickOutcome {
        self.poll_classifier();
        self.tick.frame_index = self.state.record_tick();

        let frame = match self.source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.tick.reset();
                self.set_label(None);
                self.label_floor = self.tick.frame_index;
                return match self.settings.on_frame_error {
                    FrameErrorPolicy::Retry => {
                        warn!("frame acquisition failed, retrying: {}", e);
                        TickOutcome::Continue
                    }
                    FrameErrorPolicy::Stop => {
                        warn!("frame acquisition failed, stopping: {}", e);
                        TickOutcome::Stop
                    }
                };
            }
        };

        self.tick.bbox = self.detector.detect(&frame);
        let canvas = self.tick.bbox.and_then(|bbox| {
            let timer = self
                .stats
                .as_ref()
                .map(|s| Timer::new(s, StatKind::Normalize, bbox.area() as usize));
            let result = self.normalizer.normalize(&frame, bbox);
            if let Some(t) = timer {
                t.finish();
            }
            result
                .inspect(|c| trace!(?bbox, content = ?c.content(), "normalized"))
                .inspect_err(|e| debug!("skipping frame {}: {}", self.tick.frame_index, e))
                .ok()
        });

        match &canvas {
            None => {
                self.tick.prediction = None;
                self.set_label(None);
                self.label_floor = self.tick.frame_index;
            }
            Some(canvas) => match &mut self.classification {
                Some(Classification::Inline(classifier)) => {
                    let pixels = (canvas.size() * canvas.size()) as usize;
                    let timer = self
                        .stats
                        .as_ref()
                        .map(|s| Timer::new(s, StatKind::Classify, pixels));
                    let result = classifier.predict(canvas);
                    if let Some(t) = timer {
                        t.finish();
                    }
                    let prediction = result
                        .inspect_err(|e| warn!("classification failed: {}", e))
                        .ok();
                    self.apply_prediction(prediction);
                }
                Some(Classification::Background(worker)) => {
                    worker.submit(self.tick.frame_index, canvas.clone());
                }
                None => {}
            },
        }

        if let Some((path, every)) = &self.settings.preview {
            if self.tick.frame_index % *every as u64 == 0 {
                let board = preview::compose(
                    &frame,
                    canvas.as_ref(),
                    self.settings.display_size,
                    self.normalizer.canvas_size(),
                );
                if let Err(e) = preview::write(&board, path) {
                    warn!("failed to write preview {}: {}", path.display(), e);
                }
            }
        }

        self.tick.canvas = canvas;
        TickOutcome::Continue
    }

    /// Apply finished background classifications that are still current
    pub fn poll_classifier(&mut self) {
        let mut latest = None;
        if let Some(Classification::Background(worker)) = &self.classification {
            while let Some((tick, result)) = worker.try_recv() {
                if tick <= self.label_floor {
                    continue;
                }
                latest = Some(
                    result
                        .inspect_err(|e| warn!("classification failed: {}", e))
                        .ok(),
                );
            }
        }
        if let Some(prediction) = latest {
            self.apply_prediction(prediction);
        }
    }

    fn apply_prediction(&mut self, prediction: Option<Prediction>) {
        let prediction =
            prediction.filter(|p| p.confidence >= self.settings.min_confidence);
        self.set_label(prediction.as_ref().map(|p| p.label.clone()));
        self.tick.prediction = prediction;
    }

    fn set_label(&mut self, label: Option<String>) {
        if let Some(composer) = &mut self.composer {
            composer.set_label(label);
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub fn dispatch(&mut self, command: Command) -> TickOutcome {
        debug!("command: {}", command);
        match (self.mode, command) {
            (_, Command::Terminate) => return TickOutcome::Stop,
            (AppMode::Collect, Command::SaveCanvas) => {
                // outcome is logged by save_canvas
                self.save_canvas().ok();
            }
            (AppMode::Interactive, Command::Speak) => self.speak(),
            (AppMode::Interactive, edit) => {
                if let Some(composer) = &mut self.composer {
                    match edit {
                        Command::Commit => composer.commit(),
                        Command::Space => composer.space(),
                        Command::Backspace => composer.backspace(),
                        Command::Clear => composer.clear(),
                        Command::SelectSuggestion(i) => composer.select_suggestion(i),
                        _ => false,
                    };
                }
            }
            (mode, other) => debug!("{} ignored in {} mode", other, mode),
        }
        TickOutcome::Continue
    }

    /// Save the canvas from the most recent tick
    pub fn save_canvas(&mut self) -> Result<String, CollectError> {
        let Some(collector) = &mut self.collector else {
            return Err(CollectError::NoCanvasAvailable);
        };
        let result = collector.save(self.tick.canvas.as_ref());
        match &result {
            Ok(id) => info!("Image saved: {} ({})", id, collector.count()),
            Err(CollectError::NoCanvasAvailable) => info!("no hand in view, nothing saved"),
            Err(e) => warn!("save failed: {}", e),
        }
        result
    }

    fn speak(&mut self) {
        let (Some(speech), Some(composer)) = (&mut self.speech, &self.composer) else {
            return;
        };
        if let Err(e) = speech.speak(composer.sentence()) {
            warn!("speech failed: {}", e);
        }
    }

    // ========================================================================
    // Loop
    // ========================================================================

    pub fn status(&self) -> String {
        let tick = self.tick_state();
        match self.mode {
            AppMode::Interactive => {
                let prediction = tick
                    .prediction
                    .as_ref()
                    .map(|p| (p.label.as_str(), p.confidence));
                let (sentence, suggestions) = self
                    .composer()
                    .map_or(("", &[][..]), |c| (c.sentence(), c.suggestions()));
                ui::format_interactive(prediction, sentence, suggestions)
            }
            AppMode::Collect => {
                ui::format_collect(tick.frame_index, tick.canvas.is_some(), self.collected())
            }
        }
    }

    /// Tick on a fixed interval and handle commands in between until
    /// terminated
    pub async fn run(mut self, commands: flume::Receiver<Command>, status: &mut StatusLine) {
        let mut interval = tokio::time::interval(self.settings.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.state.is_running() {
            let outcome = tokio::select! {
                biased;

                Ok(command) = commands.recv_async() => self.dispatch(command),

                _ = interval.tick() => self.tick(),
            };
            if outcome == TickOutcome::Stop {
                break;
            }
            status.render(&self.status());
        }

        status.finish();
        self.shutdown();
    }

    fn shutdown(mut self) {
        self.state.request_stop();
        if let Some(Classification::Background(worker)) = self.classification.take() {
            let dropped = worker.dropped();
            worker.shutdown();
            debug!(dropped, "classifier worker joined");
        }
        if let Some(composer) = self.composer() {
            info!("sentence: {}", composer.sentence());
        }
        info!(
            "stopped after {} ticks, {} images collected",
            self.tick.frame_index,
            self.collected()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifyError;
    use crate::collector::{PersistError, PersistencePort};
    use crate::normalize::{BoundingBox, NormalizedCanvas};
    use crate::source::SourceError;
    use crate::speech::{SpeechError, Speaker};
    use crate::state::RuntimeState;
    use crate::suggest::{Dictionary, SuggestionEngine};
    use image::{Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct Frames(VecDeque<Result<RgbImage, SourceError>>);

    impl Frames {
        fn ok(count: usize) -> Self {
            Self(
                (0..count)
                    .map(|_| Ok(RgbImage::from_pixel(320, 240, Rgb([80, 80, 80]))))
                    .collect(),
            )
        }
    }

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> Result<RgbImage, SourceError> {
            self.0.pop_front().unwrap_or(Err(SourceError::Exhausted))
        }
    }

    /// Reports the scripted regions in order, then nothing
    struct Scripted(VecDeque<Option<BoundingBox>>);

    impl HandDetector for Scripted {
        fn detect(&mut self, _frame: &RgbImage) -> Option<BoundingBox> {
            self.0.pop_front().flatten()
        }
    }

    struct Fixed {
        label: &'static str,
        confidence: f32,
        labels: Vec<String>,
    }

    impl GestureClassifier for Fixed {
        fn predict(&mut self, _canvas: &NormalizedCanvas) -> Result<Prediction, ClassifyError> {
            Ok(Prediction {
                label: self.label.to_string(),
                confidence: self.confidence,
            })
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    #[derive(Default, Clone)]
    struct Memory(Arc<Mutex<Vec<String>>>);

    impl PersistencePort for Memory {
        fn write(&mut self, _canvas: &NormalizedCanvas, id: &str) -> Result<(), PersistError> {
            self.0.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    impl Speaker for Memory {
        fn speak(&mut self, text: &str) -> Result<(), SpeechError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn hand() -> Option<BoundingBox> {
        Some(BoundingBox::new(100, 60, 60, 100))
    }

    fn settings(policy: FrameErrorPolicy) -> LoopSettings {
        LoopSettings {
            tick: Duration::from_millis(1),
            on_frame_error: policy,
            min_confidence: 0.5,
            preview: None,
            display_size: (64, 48),
        }
    }

    fn interactive(frames: Frames, regions: Vec<Option<BoundingBox>>, label: &'static str, confidence: f32) -> App {
        let dict = Arc::new(Dictionary::new(["HELLO", "HELP", "HE"]));
        App::new(
            AppMode::Interactive,
            settings(FrameErrorPolicy::Retry),
            FrameNormalizer::new(20, 100),
            Box::new(frames),
            Box::new(Scripted(regions.into())),
            RuntimeState::new(),
        )
        .with_classification(Classification::Inline(Box::new(Fixed {
            label,
            confidence,
            labels: Vec::new(),
        })))
        .with_composer(TextComposer::new(dict, SuggestionEngine::new(5)))
    }

    fn collecting(frames: Frames, regions: Vec<Option<BoundingBox>>, store: Memory) -> App {
        App::new(
            AppMode::Collect,
            settings(FrameErrorPolicy::Stop),
            FrameNormalizer::new(20, 100),
            Box::new(frames),
            Box::new(Scripted(regions.into())),
            RuntimeState::new(),
        )
        .with_collector(FrameCollector::new(Box::new(store)))
    }

    fn sentence(app: &App) -> &str {
        app.composer().map(TextComposer::sentence).unwrap_or_default()
    }

    #[test]
    fn test_tick_classifies_region() {
        let mut app = interactive(Frames::ok(1), vec![hand()], "H", 0.9);
        assert_eq!(app.tick(), TickOutcome::Continue);

        let tick = app.tick_state();
        assert_eq!(tick.frame_index, 1);
        assert!(tick.canvas.is_some());
        assert_eq!(tick.prediction.as_ref().map(|p| p.label.as_str()), Some("H"));
        assert_eq!(app.composer().and_then(TextComposer::last_label), Some("H"));
    }

    #[test]
    fn test_commands_drive_composer() {
        let mut app = interactive(Frames::ok(2), vec![hand(), hand()], "H", 0.9);
        app.tick();
        app.dispatch(Command::Commit);
        app.tick();
        app.dispatch(Command::Commit);
        assert_eq!(sentence(&app), "HH");

        app.dispatch(Command::Backspace);
        assert_eq!(app.composer().unwrap().suggestions(), ["HE", "HELLO", "HELP"]);
        app.dispatch(Command::SelectSuggestion(2));
        assert_eq!(sentence(&app), "HELP ");

        app.dispatch(Command::Clear);
        assert_eq!(sentence(&app), "");
        assert!(app.composer().unwrap().suggestions().is_empty());
    }

    #[test]
    fn test_no_region_clears_label() {
        let mut app = interactive(Frames::ok(2), vec![hand(), None], "H", 0.9);
        app.tick();
        app.tick();
        assert!(app.tick_state().canvas.is_none());
        assert!(app.tick_state().prediction.is_none());

        app.dispatch(Command::Commit);
        assert_eq!(sentence(&app), "");
    }

    #[test]
    fn test_invalid_crop_is_skipped() {
        let outside = Some(BoundingBox::new(2000, 2000, 50, 50));
        let mut app = interactive(Frames::ok(1), vec![outside], "H", 0.9);
        assert_eq!(app.tick(), TickOutcome::Continue);
        assert!(app.tick_state().bbox.is_some());
        assert!(app.tick_state().canvas.is_none());
        assert!(app.composer().unwrap().last_label().is_none());
    }

    #[test]
    fn test_low_confidence_leaves_label_unset() {
        let mut app = interactive(Frames::ok(1), vec![hand()], "H", 0.2);
        app.tick();
        assert!(app.tick_state().canvas.is_some());
        assert!(app.composer().unwrap().last_label().is_none());
    }

    #[test]
    fn test_frame_error_retry() {
        let mut app = interactive(Frames::ok(0), Vec::new(), "H", 0.9);
        assert_eq!(app.tick(), TickOutcome::Continue);
        assert_eq!(app.tick(), TickOutcome::Continue);
        assert!(app.tick_state().canvas.is_none());
    }

    #[test]
    fn test_frame_error_stop() {
        let mut app = collecting(Frames::ok(0), Vec::new(), Memory::default());
        assert_eq!(app.tick(), TickOutcome::Stop);
    }

    #[test]
    fn test_collect_saves_canvas() {
        let store = Memory::default();
        let saved = Arc::clone(&store.0);
        let mut app = collecting(Frames::ok(2), vec![hand(), None], store);

        app.tick();
        assert!(app.save_canvas().is_ok());
        assert_eq!(app.collected(), 1);

        app.tick();
        assert!(matches!(
            app.save_canvas(),
            Err(CollectError::NoCanvasAvailable)
        ));
        app.dispatch(Command::SaveCanvas);
        assert_eq!(app.collected(), 1);
        assert_eq!(saved.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_mode_specific_commands_are_ignored() {
        let store = Memory::default();
        let saved = Arc::clone(&store.0);
        let mut app = collecting(Frames::ok(1), vec![hand()], store);
        app.tick();
        app.dispatch(Command::Commit);
        assert!(app.composer().is_none());

        let mut interactive = interactive(Frames::ok(1), vec![hand()], "A", 0.9);
        interactive.tick();
        interactive.dispatch(Command::SaveCanvas);
        assert_eq!(interactive.collected(), 0);
        assert!(saved.lock().unwrap().is_empty());
    }

    #[test]
    fn test_terminate() {
        let mut app = interactive(Frames::ok(1), Vec::new(), "H", 0.9);
        assert_eq!(app.dispatch(Command::Terminate), TickOutcome::Stop);
    }

    #[test]
    fn test_speak_sentence() {
        let spoken = Memory::default();
        let log = Arc::clone(&spoken.0);
        let mut app = interactive(Frames::ok(1), vec![hand()], "A", 0.9)
            .with_speech(Speech::new(Box::new(spoken)));

        app.dispatch(Command::Speak);
        assert!(log.lock().unwrap().is_empty());

        app.tick();
        app.dispatch(Command::Commit);
        app.dispatch(Command::Speak);
        assert_eq!(*log.lock().unwrap(), vec!["A"]);
    }

    #[test]
    fn test_background_classification() {
        let worker = ClassifierWorker::spawn(
            Box::new(Fixed {
                label: "B",
                confidence: 0.9,
                labels: Vec::new(),
            }),
            None,
        );
        let mut app = interactive(Frames::ok(200), vec![hand(); 200], "H", 0.9)
            .with_classification(Classification::Background(worker));

        let mut label = None;
        for _ in 0..200 {
            app.tick();
            label = app.composer().and_then(|c| c.last_label()).map(String::from);
            if label.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(label.as_deref(), Some("B"));
    }

    /// Blocks in `predict` until released
    struct Gated {
        started: flume::Sender<()>,
        gate: flume::Receiver<()>,
        labels: Vec<String>,
    }

    impl GestureClassifier for Gated {
        fn predict(&mut self, _canvas: &NormalizedCanvas) -> Result<Prediction, ClassifyError> {
            let _ = self.started.send(());
            let _ = self.gate.recv();
            Ok(Prediction {
                label: "L".to_string(),
                confidence: 0.9,
            })
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }
    }

    fn poll_label(app: &mut App, wait: Duration) -> Option<String> {
        let deadline = std::time::Instant::now() + wait;
        loop {
            app.poll_classifier();
            let label = app.composer().and_then(|c| c.last_label()).map(String::from);
            if label.is_some() || std::time::Instant::now() >= deadline {
                return label;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_late_result_after_hand_left_is_dropped() {
        let (started_tx, started) = flume::unbounded();
        let (release, gate) = flume::unbounded();
        let worker = ClassifierWorker::spawn(
            Box::new(Gated {
                started: started_tx,
                gate,
                labels: Vec::new(),
            }),
            None,
        );
        let mut app = interactive(Frames::ok(3), vec![hand(), None, hand()], "H", 0.9)
            .with_classification(Classification::Background(worker));

        // tick 1 submits, the worker holds the result
        app.tick();
        started.recv_timeout(Duration::from_secs(5)).unwrap();

        // tick 2 loses the hand, then the tick 1 result arrives
        app.tick();
        assert!(app.tick_state().canvas.is_none());
        release.send(()).unwrap();
        assert_eq!(poll_label(&mut app, Duration::from_millis(300)), None);

        // a result from a tick after the gap is applied
        app.tick();
        release.send(()).unwrap();
        assert_eq!(
            poll_label(&mut app, Duration::from_secs(5)).as_deref(),
            Some("L")
        );
    }

    #[test]
    fn test_status_line() {
        let mut app = interactive(Frames::ok(1), vec![hand()], "H", 0.9);
        app.tick();
        app.dispatch(Command::Commit);
        let status = app.status();
        assert!(status.contains("[H 0.90]"));
        assert!(status.contains("1:HE"));

        let mut collect = collecting(Frames::ok(1), vec![hand()], Memory::default());
        collect.tick();
        assert!(collect.status().contains("Images collected: 0"));
    }

    #[tokio::test]
    async fn test_run_until_terminate() {
        let app = interactive(Frames::ok(1000), vec![hand(); 1000], "H", 0.9);
        let state = Arc::clone(&app.state);
        let (tx, rx) = flume::unbounded();
        tx.send(Command::Commit).unwrap();
        tx.send(Command::Terminate).unwrap();

        let mut status = StatusLine::new();
        app.run(rx, &mut status).await;
        assert!(!state.is_running());
    }
}
