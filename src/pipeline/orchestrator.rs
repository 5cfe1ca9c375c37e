//! The render chain: resolve plugins, normalize the input, run each enabled
//! stage over the previous stage's file, deliver the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempPath;
use tracing::{debug, info, warn};

use super::error::{ErrorReporter, LogReporter, StageError};
use super::monitor::{Clock, Monitor, SystemClock, elapsed_fraction};
use super::progress::{ProgressReporter, ProgressTracker};
use super::stage::StageKind;
use super::temp::TempFiles;
use super::types::{CancellationToken, PipelineConfig, RenderSummary, ReverbEngine, SkippedStage};
use crate::audio::{AudioBuffer, wav};
use crate::defaults::{self, INTERPOLATION_CAP, plugin_names};
use crate::dsp::{self, GateParams, ReverbPreset, ToneSettings};
use crate::error::{RenderError, Result};
use crate::plugin::{
    InvocationError, PluginHandle, PluginHost, PluginInvoker, PluginRegistry, resolve_existing,
    resolve_main,
};

/// Knobs that belong to the installation rather than to one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Block size passed to the plugin host.
    pub block_size: u32,
    /// Refuse the fallback main chain.
    pub require_primary: bool,
    /// How often a running plugin stage reports interpolated progress.
    pub poll_interval: Duration,
    pub main_expected: Duration,
    pub reverb_expected: Duration,
    pub plugin_expected: Duration,
    /// Where intermediate files go; the system temp directory when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            block_size: defaults::BLOCK_SIZE,
            require_primary: false,
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            main_expected: Duration::from_secs_f64(defaults::MAIN_EXPECTED_SECS),
            reverb_expected: Duration::from_secs_f64(defaults::REVERB_EXPECTED_SECS),
            plugin_expected: Duration::from_secs_f64(defaults::PLUGIN_EXPECTED_SECS),
            temp_dir: None,
        }
    }
}

impl RenderSettings {
    /// Expected host run time used to interpolate `stage`'s progress.
    pub fn expected(&self, stage: StageKind) -> Duration {
        match stage {
            StageKind::Main | StageKind::Master => self.main_expected,
            StageKind::Reverb => self.reverb_expected,
            _ => self.plugin_expected,
        }
    }
}

type StageResult = std::result::Result<TempPath, StageError>;

/// Part of a stage's progress slice covered by one plugin run.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: f64,
    end: f64,
}

impl Span {
    const FULL: Span = Span { start: 0.0, end: 1.0 };

    fn nth_of(index: usize, count: usize) -> Span {
        let count = count.max(1) as f64;
        Span {
            start: index as f64 / count,
            end: (index + 1) as f64 / count,
        }
    }

    fn at(self, fraction: f64) -> f64 {
        self.start + (self.end - self.start) * fraction.clamp(0.0, INTERPOLATION_CAP)
    }
}

/// Runs render chains against one plugin installation.
///
/// A renderer is reusable and holds no per-render state; every call gets
/// its own temp files and progress tracker.
pub struct Renderer<R: PluginRegistry, H: PluginHost> {
    registry: R,
    invoker: PluginInvoker<H>,
    settings: RenderSettings,
    clock: Box<dyn Clock>,
    errors: Box<dyn ErrorReporter>,
    cancel: CancellationToken,
}

impl<R: PluginRegistry, H: PluginHost> Renderer<R, H> {
    pub fn new(registry: R, host: H, settings: RenderSettings) -> Self {
        let invoker = PluginInvoker::new(host, settings.block_size);
        Self {
            registry,
            invoker,
            settings,
            clock: Box::new(SystemClock),
            errors: Box::new(LogReporter),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_error_reporter(mut self, reporter: impl ErrorReporter + 'static) -> Self {
        self.errors = Box::new(reporter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the render at the next stage boundary.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Renders `input` to `output` through the stages `config` enables.
    ///
    /// Plugin resolution and the input check happen before anything is
    /// written, so a misconfigured installation leaves no files behind.
    pub fn render(
        &self,
        input: &Path,
        output: &Path,
        config: &PipelineConfig,
        progress: &mut dyn ProgressReporter,
    ) -> Result<RenderSummary> {
        let main = self.resolve_main_chain()?;
        check_input(input)?;

        let plan = StageKind::plan(config);
        info!(
            input = %input.display(),
            output = %output.display(),
            main = %main.plugin.display(),
            stages = ?plan,
            "starting render"
        );
        let mut tracker = ProgressTracker::new(&plan, progress);
        self.run_plan(&plan, input, output, config, &main, &mut tracker)
    }

    /// [`Renderer::render`] flattened to `(ok, error message)`.
    pub fn render_status(
        &self,
        input: &Path,
        output: &Path,
        config: &PipelineConfig,
        progress: &mut dyn ProgressReporter,
    ) -> (bool, Option<String>) {
        match self.render(input, output, config, progress) {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    }

    /// Runs only the mastering plugin over `input`.
    pub fn master(
        &self,
        input: &Path,
        output: &Path,
        progress: &mut dyn ProgressReporter,
    ) -> Result<RenderSummary> {
        self.check_host()?;
        let handle = resolve_existing(&self.registry, &[plugin_names::MASTER]).ok_or_else(|| {
            RenderError::Configuration {
                message: format!("plugin '{}' not found", plugin_names::MASTER),
            }
        })?;
        check_input(input)?;

        info!(input = %input.display(), output = %output.display(), "starting master");
        let plan = [StageKind::Master];
        let mut tracker = ProgressTracker::new(&plan, progress);
        self.run_plan(&plan, input, output, &PipelineConfig::default(), &handle, &mut tracker)
    }

    fn run_plan(
        &self,
        plan: &[StageKind],
        input: &Path,
        output: &Path,
        config: &PipelineConfig,
        primary: &PluginHandle,
        tracker: &mut ProgressTracker<'_>,
    ) -> Result<RenderSummary> {
        tracker.note("Preparing");
        let temps = TempFiles::new(self.settings.temp_dir.as_deref())?;
        let mut current = temps.create("input")?;
        let source = wav::normalize(input, &current)?;
        debug!(
            sample_rate = source.sample_rate(),
            channels = source.channel_count(),
            seconds = source.duration_secs(),
            "normalized input"
        );

        let mut summary = RenderSummary {
            output: output.to_path_buf(),
            completed: Vec::new(),
            skipped: Vec::new(),
        };
        for &stage in plan {
            if self.cancel.is_cancelled() {
                info!(stage = stage.label(), "render cancelled");
                return Err(RenderError::Cancelled {
                    stage: stage.label().to_string(),
                });
            }
            tracker.begin(stage);
            match self.run_stage(stage, &current, config, primary, &temps, tracker) {
                Ok(next) => {
                    debug!(stage = stage.label(), "stage complete");
                    current = next;
                    tracker.complete(stage);
                    summary.completed.push(stage);
                }
                Err(error) => {
                    self.errors.report(stage, &error);
                    if stage.is_mandatory() {
                        return Err(RenderError::MandatoryStage {
                            stage: stage.label().to_string(),
                            message: error.to_string(),
                        });
                    }
                    tracker.skip(stage);
                    summary.skipped.push(SkippedStage {
                        stage,
                        reason: error.to_string(),
                    });
                }
            }
        }

        deliver(&current, output)?;
        tracker.finish();
        info!(
            output = %output.display(),
            completed = summary.completed.len(),
            skipped = summary.skipped.len(),
            "render finished"
        );
        Ok(summary)
    }

    fn run_stage(
        &self,
        stage: StageKind,
        current: &Path,
        config: &PipelineConfig,
        primary: &PluginHandle,
        temps: &TempFiles,
        tracker: &mut ProgressTracker<'_>,
    ) -> StageResult {
        match stage {
            StageKind::Tone => self.tone(current, config.tone_settings(), temps, tracker),
            StageKind::NoiseGate => process(stage, current, temps, |b| {
                dsp::noise_gate(b, &GateParams::pipeline())
            }),
            StageKind::Phone => process(stage, current, temps, dsp::phone),
            StageKind::Main | StageKind::Master => {
                self.run_plugin(stage, primary, current, temps, tracker, Span::FULL)
            }
            StageKind::DeEsser => {
                let mode = config.deesser_mode();
                process(stage, current, temps, |b| dsp::deess(b, mode))
            }
            StageKind::Air => process(stage, current, temps, |b| {
                dsp::tone(b, ToneSettings::air_only())
            }),
            StageKind::Delay => process(stage, current, temps, |b| {
                let bpm = match config.bpm.filter(|bpm| bpm.is_finite() && *bpm > 0.0) {
                    Some(bpm) => bpm,
                    None => {
                        let detected = dsp::detect_bpm(b);
                        info!(bpm = detected, "detected tempo");
                        detected
                    }
                };
                dsp::ping_pong_delay(b, bpm, config.division)
            }),
            StageKind::Reverb => self.reverb(current, config, temps, tracker),
            StageKind::Doubler => {
                let style = config.doubler_style;
                process(stage, current, temps, |b| dsp::double(b, style))
            }
            StageKind::Robot => {
                let handle = self.lookup(&[plugin_names::ROBOT])?;
                self.run_plugin(stage, &handle, current, temps, tracker, Span::FULL)
            }
        }
    }

    /// EQ bank plugins when all three are installed, built-in shaping otherwise.
    fn tone(
        &self,
        current: &Path,
        settings: ToneSettings,
        temps: &TempFiles,
        tracker: &mut ProgressTracker<'_>,
    ) -> StageResult {
        if let Some(bank) = self.eq_bank(settings) {
            match self.run_eq_bank(&bank, current, temps, tracker) {
                Ok(path) => return Ok(path),
                Err(error) => {
                    warn!(%error, "EQ bank failed, using built-in tone shaping");
                }
            }
        }
        process(StageKind::Tone, current, temps, |b| dsp::tone(b, settings))
    }

    fn eq_bank(&self, settings: ToneSettings) -> Option<Vec<PluginHandle>> {
        let indices = [settings.low, 3 + settings.mid, 6 + settings.high];
        indices
            .into_iter()
            .map(|index| resolve_existing(&self.registry, &[&plugin_names::eq(index)]))
            .collect()
    }

    /// Runs each EQ over the same input and averages their outputs.
    fn run_eq_bank(
        &self,
        bank: &[PluginHandle],
        current: &Path,
        temps: &TempFiles,
        tracker: &mut ProgressTracker<'_>,
    ) -> StageResult {
        let mut outputs = Vec::with_capacity(bank.len());
        for (i, handle) in bank.iter().enumerate() {
            let span = Span::nth_of(i, bank.len());
            outputs.push(self.run_plugin(StageKind::Tone, handle, current, temps, tracker, span)?);
        }
        let buffers = outputs
            .iter()
            .map(|path| wav::decode(path))
            .collect::<Result<Vec<_>>>()?;
        let mixed = average(&buffers)
            .ok_or_else(|| StageError::Failed("EQ outputs disagree on sample rate".to_string()))?;
        let path = temps.create(StageKind::Tone.label())?;
        wav::encode(&mixed, &path)?;
        Ok(path)
    }

    fn reverb(
        &self,
        current: &Path,
        config: &PipelineConfig,
        temps: &TempFiles,
        tracker: &mut ProgressTracker<'_>,
    ) -> StageResult {
        let mode = config.reverb_mode();
        let send = |b: &AudioBuffer| dsp::gain(b, defaults::REVERB_SEND_GAIN_DB);
        match config.reverb_engine {
            ReverbEngine::Plugin => {
                let handle = match mode {
                    1 => self.lookup(&[plugin_names::REVERBS[0]])?,
                    2 => self.lookup(&[plugin_names::REVERBS[1]])?,
                    _ => self.lookup(&[plugin_names::REVERBS[2], plugin_names::REVERB_LARGE_ALIAS])?,
                };
                // The send lift is only applied once the plugin is known to exist.
                let lifted = if mode >= 2 {
                    Some(process(StageKind::Reverb, current, temps, send)?)
                } else {
                    None
                };
                let source = lifted.as_deref().unwrap_or(current);
                self.run_plugin(StageKind::Reverb, &handle, source, temps, tracker, Span::FULL)
            }
            ReverbEngine::Convolution => {
                let preset = ReverbPreset::for_mode(mode);
                process(StageKind::Reverb, current, temps, |b| {
                    if mode >= 2 {
                        dsp::convolution_reverb(&send(b), &preset)
                    } else {
                        dsp::convolution_reverb(b, &preset)
                    }
                })
            }
        }
    }

    fn lookup(&self, names: &[&str]) -> std::result::Result<PluginHandle, StageError> {
        resolve_existing(&self.registry, names).ok_or_else(|| {
            StageError::Unavailable(format!("plugin '{}' not found", names.join("' or '")))
        })
    }

    /// Invokes one plugin on a worker thread, interpolating progress
    /// across `span` of the stage's slice while it runs.
    fn run_plugin(
        &self,
        stage: StageKind,
        handle: &PluginHandle,
        input: &Path,
        temps: &TempFiles,
        tracker: &mut ProgressTracker<'_>,
        span: Span,
    ) -> StageResult {
        let output = temps.reserve(stage.label());
        let expected = self.settings.expected(stage);
        let monitor = Monitor::new(self.clock.as_ref(), self.settings.poll_interval);
        let invoker = &self.invoker;
        let target: &Path = &output;

        debug!(stage = stage.label(), plugin = %handle.plugin.display(), "running plugin");
        let result = monitor.run(
            || invoker.invoke(handle, input, target),
            |elapsed| tracker.interpolate(stage, span.at(elapsed_fraction(elapsed, expected))),
        );
        match result {
            Some(Ok(())) => Ok(output),
            Some(Err(e)) => Err(e.into()),
            None => Err(InvocationError::WorkerLost.into()),
        }
    }

    fn resolve_main_chain(&self) -> Result<PluginHandle> {
        self.check_host()?;
        let require_primary = self.settings.require_primary;
        let (handle, variant) = resolve_main(&self.registry, require_primary).ok_or_else(|| {
            let message = if require_primary {
                format!("main chain plugin '{}' not found", plugin_names::MAIN)
            } else {
                format!(
                    "main chain plugin not found (tried '{}' and '{}')",
                    plugin_names::MAIN,
                    plugin_names::MAIN_FALLBACK
                )
            };
            RenderError::Configuration { message }
        })?;
        debug!(variant = variant.plugin_name(), "resolved main chain");
        Ok(handle)
    }

    fn check_host(&self) -> Result<()> {
        let host = self.registry.host();
        if host.exists() {
            Ok(())
        } else {
            Err(RenderError::Configuration {
                message: format!("plugin host not found at {}", host.display()),
            })
        }
    }
}

fn check_input(input: &Path) -> Result<()> {
    if input.is_file() {
        Ok(())
    } else {
        Err(RenderError::InputNotFound {
            path: input.display().to_string(),
        })
    }
}

/// Decodes `current`, applies `f`, and writes the result to a fresh temp file.
fn process<F>(stage: StageKind, current: &Path, temps: &TempFiles, f: F) -> StageResult
where
    F: FnOnce(&AudioBuffer) -> AudioBuffer,
{
    let input = wav::decode(current)?;
    let output = f(&input);
    let path = temps.create(stage.label())?;
    wav::encode(&output, &path)?;
    Ok(path)
}

/// Sample-wise mean over the common channels and frames, clamped.
fn average(buffers: &[AudioBuffer]) -> Option<AudioBuffer> {
    let first = buffers.first()?;
    let sample_rate = first.sample_rate();
    if buffers.iter().any(|b| b.sample_rate() != sample_rate) {
        return None;
    }
    let channels = buffers.iter().map(AudioBuffer::channel_count).min()?;
    let frames = buffers.iter().map(AudioBuffer::frames).min()?;
    let scale = 1.0 / buffers.len() as f32;
    let mixed = (0..channels)
        .map(|c| {
            (0..frames)
                .map(|i| {
                    let sum: f32 = buffers.iter().map(|b| b.channel(c)[i]).sum();
                    (sum * scale).clamp(-1.0, 1.0)
                })
                .collect()
        })
        .collect();
    Some(AudioBuffer::new(mixed, sample_rate))
}

fn deliver(current: &Path, output: &Path) -> Result<()> {
    std::fs::copy(current, output)
        .map(|_| ())
        .map_err(|e| RenderError::Encode {
            path: output.display().to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::progress::{CollectorProgress, NoProgress};
    use crate::plugin::{HostOutput, Invocation, StaticRegistry};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behavior {
        Copy,
        Gain(f32),
        Fail,
    }

    /// In-process host keyed by bundle stem.
    #[derive(Clone, Default)]
    struct FakeHost {
        calls: Arc<Mutex<Vec<Invocation>>>,
        behaviors: HashMap<String, Behavior>,
        delay: Duration,
    }

    impl FakeHost {
        fn with(mut self, plugin: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(plugin.to_string(), behavior);
            self
        }

        fn called(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| stem(&c.handle.plugin))
                .collect()
        }
    }

    fn stem(path: &Path) -> String {
        path.file_stem().unwrap().to_string_lossy().into_owned()
    }

    impl PluginHost for FakeHost {
        fn run(&self, invocation: &Invocation) -> std::io::Result<HostOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            std::thread::sleep(self.delay);
            let name = stem(&invocation.handle.plugin);
            match self.behaviors.get(&name).copied().unwrap_or(Behavior::Copy) {
                Behavior::Copy => {
                    std::fs::copy(&invocation.input, &invocation.output)?;
                }
                Behavior::Gain(db) => {
                    let buffer = wav::decode(&invocation.input).unwrap();
                    wav::encode(&dsp::gain(&buffer, db), &invocation.output).unwrap();
                }
                Behavior::Fail => {
                    return Ok(HostOutput {
                        status: Some(2),
                        stdout: String::new(),
                        stderr: "plugin crashed".to_string(),
                    });
                }
            }
            Ok(HostOutput {
                status: Some(0),
                ..HostOutput::default()
            })
        }
    }

    /// Moves forward by `step` every time it is read.
    struct SteppingClock {
        current: Mutex<Instant>,
        step: Duration,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Instant {
            let mut current = self.current.lock().unwrap();
            *current += self.step;
            *current
        }
    }

    #[derive(Clone, Default)]
    struct CollectingReporter {
        seen: Arc<Mutex<Vec<(StageKind, StageError)>>>,
    }

    impl ErrorReporter for CollectingReporter {
        fn report(&self, stage: StageKind, error: &StageError) {
            self.seen.lock().unwrap().push((stage, error.clone()));
        }
    }

    struct Fixture {
        files: TempDir,
        scratch: TempDir,
        plugins: TempDir,
        host_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let plugins = TempDir::new().unwrap();
            let host_path = plugins.path().join("host");
            std::fs::write(&host_path, b"").unwrap();
            let fx = Self {
                files: TempDir::new().unwrap(),
                scratch: TempDir::new().unwrap(),
                plugins,
                host_path,
            };
            let samples: Vec<f32> = (0..11025)
                .map(|i| 0.25 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22050.0).sin())
                .collect();
            wav::encode(&AudioBuffer::mono(samples, 22050), &fx.input()).unwrap();
            fx
        }

        fn input(&self) -> PathBuf {
            self.files.path().join("vocal.wav")
        }

        fn output(&self) -> PathBuf {
            self.files.path().join("render.wav")
        }

        fn registry(&self, names: &[&str]) -> StaticRegistry {
            let mut registry = StaticRegistry::new(&self.host_path);
            for name in names {
                let bundle = self.plugins.path().join(format!("{name}.vst3"));
                std::fs::write(&bundle, b"").unwrap();
                registry.insert(name, bundle);
            }
            registry
        }

        fn settings(&self) -> RenderSettings {
            RenderSettings {
                poll_interval: Duration::from_millis(5),
                temp_dir: Some(self.scratch.path().to_path_buf()),
                ..RenderSettings::default()
            }
        }

        fn renderer(&self, names: &[&str], host: FakeHost) -> Renderer<StaticRegistry, FakeHost> {
            Renderer::new(self.registry(names), host, self.settings())
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().count() == 0
        }
    }

    #[test]
    fn main_only_render_writes_output() {
        let fx = Fixture::new();
        let host = FakeHost::default().with("globalmix", Behavior::Gain(-6.0));
        let renderer = fx.renderer(&["globalmix"], host.clone());
        let mut progress = CollectorProgress::new();
        let summary = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut progress)
            .unwrap();

        assert_eq!(summary.completed, vec![StageKind::Main]);
        assert!(summary.skipped.is_empty());
        assert_eq!(host.called(), vec!["globalmix"]);
        let input = wav::decode(&fx.input()).unwrap();
        let output = wav::decode(&fx.output()).unwrap();
        assert!((output.peak() - input.peak() * 0.501).abs() < 2e-3);
        assert_eq!(progress.last().unwrap().percent, 100);
        assert_eq!(progress.last().unwrap().step, "Done");
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn block_size_reaches_host() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let settings = RenderSettings {
            block_size: 512,
            ..fx.settings()
        };
        let renderer = Renderer::new(fx.registry(&["globalmix"]), host.clone(), settings);
        renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut NoProgress)
            .unwrap();
        assert_eq!(host.calls.lock().unwrap()[0].block_size, 512);
    }

    #[test]
    fn missing_main_fails_before_any_io() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["reverb2"], host.clone());
        let mut progress = CollectorProgress::new();
        let err = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::default(), &mut progress)
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration { .. }));
        assert!(host.called().is_empty());
        assert!(progress.events().is_empty());
        assert!(fx.scratch_is_empty());
        assert!(!fx.output().exists());
    }

    #[test]
    fn fallback_main_chain() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["project1"], host.clone());
        renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut NoProgress)
            .unwrap();
        assert_eq!(host.called(), vec!["project1"]);
    }

    #[test]
    fn require_primary_rejects_fallback() {
        let fx = Fixture::new();
        let settings = RenderSettings {
            require_primary: true,
            ..fx.settings()
        };
        let renderer = Renderer::new(fx.registry(&["project1"]), FakeHost::default(), settings);
        let err = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut NoProgress)
            .unwrap_err();
        assert!(err.to_string().contains("globalmix"));
    }

    #[test]
    fn missing_host_is_configuration_error() {
        let fx = Fixture::new();
        let registry = StaticRegistry::new(fx.plugins.path().join("absent-host"));
        let renderer = Renderer::new(registry, FakeHost::default(), fx.settings());
        let err = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration { .. }));
        assert!(err.to_string().contains("absent-host"));
    }

    #[test]
    fn missing_input() {
        let fx = Fixture::new();
        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        let err = renderer
            .render(
                &fx.files.path().join("nope.wav"),
                &fx.output(),
                &PipelineConfig::main_only(),
                &mut NoProgress,
            )
            .unwrap_err();
        assert!(matches!(err, RenderError::InputNotFound { .. }));
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn undecodable_input() {
        let fx = Fixture::new();
        std::fs::write(fx.input(), b"not audio").unwrap();
        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        let err = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, RenderError::Decode { .. }));
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn main_failure_aborts_with_diagnostic() {
        let fx = Fixture::new();
        let host = FakeHost::default().with("globalmix", Behavior::Fail);
        let reporter = CollectingReporter::default();
        let renderer = fx
            .renderer(&["globalmix"], host.clone())
            .with_error_reporter(reporter.clone());
        let err = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::default(), &mut NoProgress)
            .unwrap_err();
        match err {
            RenderError::MandatoryStage { stage, message } => {
                assert_eq!(stage, "Main chain");
                assert_eq!(message, "plugin crashed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The de-esser after the main chain never ran.
        assert_eq!(reporter.seen.lock().unwrap().len(), 1);
        assert!(!fx.output().exists());
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn missing_reverb_is_skipped_and_audio_unchanged() {
        let fx = Fixture::new();
        let baseline = fx.files.path().join("baseline.wav");
        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        renderer
            .render(&fx.input(), &baseline, &PipelineConfig::main_only(), &mut NoProgress)
            .unwrap();

        let config = PipelineConfig {
            reverb: true,
            ..PipelineConfig::main_only()
        };
        let mut progress = CollectorProgress::new();
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut progress)
            .unwrap();
        assert!(summary.was_skipped(StageKind::Reverb));
        assert!(summary.skipped[0].reason.contains("reverb2"));
        assert!(progress.steps().contains(&"Reverb skip"));
        assert_eq!(
            std::fs::read(&baseline).unwrap(),
            std::fs::read(fx.output()).unwrap()
        );
    }

    #[test]
    fn failing_reverb_is_skipped() {
        let fx = Fixture::new();
        let host = FakeHost::default().with("reverb1", Behavior::Fail);
        let renderer = fx.renderer(&["globalmix", "reverb1"], host.clone());
        let config = PipelineConfig {
            reverb: true,
            reverb_mode: 1,
            ..PipelineConfig::main_only()
        };
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();
        assert_eq!(summary.skipped[0].reason, "plugin crashed");
        assert_eq!(host.called(), vec!["globalmix", "reverb1"]);
        assert_eq!(
            std::fs::read(fx.input()).unwrap(),
            std::fs::read(fx.output()).unwrap()
        );
    }

    #[test]
    fn medium_reverb_gets_send_lift() {
        let fx = Fixture::new();
        let renderer = fx.renderer(&["globalmix", "reverb1", "reverb2"], FakeHost::default());
        let input_peak = wav::decode(&fx.input()).unwrap().peak();

        for (mode, lift) in [(1u8, 1.0f32), (2, 10f32.powf(4.5 / 20.0))] {
            let config = PipelineConfig {
                reverb: true,
                reverb_mode: mode,
                ..PipelineConfig::main_only()
            };
            renderer
                .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
                .unwrap();
            let peak = wav::decode(&fx.output()).unwrap().peak();
            assert!((peak - input_peak * lift).abs() < 2e-3, "mode {mode}: {peak}");
        }
    }

    #[test]
    fn large_reverb_accepts_alias() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["globalmix", "reverb3"], host.clone());
        let config = PipelineConfig {
            reverb: true,
            reverb_mode: 3,
            ..PipelineConfig::main_only()
        };
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();
        assert!(summary.completed.contains(&StageKind::Reverb));
        assert_eq!(host.called(), vec!["globalmix", "reverb3"]);
    }

    #[test]
    fn convolution_reverb_needs_no_plugin() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["globalmix"], host.clone());
        let config = PipelineConfig {
            reverb: true,
            reverb_engine: ReverbEngine::Convolution,
            ..PipelineConfig::main_only()
        };
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();
        assert!(summary.completed.contains(&StageKind::Reverb));
        assert_eq!(host.called(), vec!["globalmix"]);
        assert_ne!(
            std::fs::read(fx.input()).unwrap(),
            std::fs::read(fx.output()).unwrap()
        );
    }

    #[test]
    fn eq_bank_selects_one_plugin_per_band() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let names = ["globalmix", "eq1", "eq2", "eq3", "eq4", "eq5", "eq6", "eq7", "eq8", "eq9"];
        let renderer = fx.renderer(&names, host.clone());
        let config = PipelineConfig {
            tone_low: 1,
            tone_mid: 2,
            tone_high: 3,
            ..PipelineConfig::main_only()
        };
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();
        assert_eq!(summary.completed, vec![StageKind::Tone, StageKind::Main]);
        assert_eq!(host.called(), vec!["eq1", "eq5", "eq9", "globalmix"]);
        // Three copies averaged give the input back.
        let input = wav::decode(&fx.input()).unwrap();
        let output = wav::decode(&fx.output()).unwrap();
        assert!((input.peak() - output.peak()).abs() < 1e-3);
    }

    #[test]
    fn tone_without_bank_uses_builtin_shaping() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["globalmix", "eq1"], host.clone());
        let config = PipelineConfig {
            tone_low: 1,
            ..PipelineConfig::main_only()
        };
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();
        assert!(summary.completed.contains(&StageKind::Tone));
        assert_eq!(host.called(), vec!["globalmix"]);
    }

    #[test]
    fn failing_eq_bank_falls_back() {
        let fx = Fixture::new();
        let host = FakeHost::default().with("eq4", Behavior::Fail);
        let names = ["globalmix", "eq1", "eq4", "eq7"];
        let renderer = fx.renderer(&names, host.clone());
        let config = PipelineConfig {
            tone_low: 1,
            tone_mid: 1,
            tone_high: 1,
            ..PipelineConfig::main_only()
        };
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();
        assert!(summary.completed.contains(&StageKind::Tone));
        assert!(summary.skipped.is_empty());
    }

    #[test]
    fn robot_missing_is_skipped() {
        let fx = Fixture::new();
        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        let config = PipelineConfig {
            robot: true,
            ..PipelineConfig::main_only()
        };
        let mut progress = CollectorProgress::new();
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut progress)
            .unwrap();
        assert!(summary.was_skipped(StageKind::Robot));
        assert!(progress.steps().contains(&"Robot FX skip"));
    }

    #[test]
    fn full_chain_progress_is_monotonic() {
        let fx = Fixture::new();
        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        let config = PipelineConfig {
            tone_low: 3,
            air: true,
            delay: true,
            bpm: Some(100.0),
            reverb: true,
            reverb_engine: ReverbEngine::Convolution,
            doubler: true,
            phone_fx: true,
            robot: true,
            ..PipelineConfig::default()
        };
        let mut progress = CollectorProgress::new();
        let summary = renderer
            .render(&fx.input(), &fx.output(), &config, &mut progress)
            .unwrap();

        assert_eq!(summary.completed.len(), 9);
        assert_eq!(summary.skipped.len(), 1);
        let events = progress.events();
        for pair in events.windows(2) {
            assert!(pair[0].percent <= pair[1].percent);
        }
        assert!(events[..events.len() - 1].iter().all(|e| e.percent < 100));
        assert_eq!(progress.last().unwrap().percent, 100);
        // Delay and doubler widen to stereo.
        assert_eq!(wav::decode(&fx.output()).unwrap().channel_count(), 2);
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn slow_plugin_reports_interpolated_progress() {
        let fx = Fixture::new();
        let host = FakeHost {
            delay: Duration::from_millis(80),
            ..FakeHost::default()
        };
        let clock = SteppingClock {
            current: Mutex::new(Instant::now()),
            step: Duration::from_secs(5),
        };
        let renderer = fx.renderer(&["globalmix"], host).with_clock(clock);
        let mut progress = CollectorProgress::new();
        renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::main_only(), &mut progress)
            .unwrap();

        let during: Vec<u8> = progress
            .events()
            .iter()
            .filter(|e| e.step == "Main chain")
            .map(|e| e.percent)
            .collect();
        assert!(during.iter().any(|&p| p > 0 && p < 99), "{during:?}");
        assert!(during.iter().all(|&p| p <= 99));
    }

    #[test]
    fn cancelled_render_stops_at_stage_boundary() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["globalmix"], host.clone());
        renderer.cancellation().cancel();
        let err = renderer
            .render(&fx.input(), &fx.output(), &PipelineConfig::default(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, RenderError::Cancelled { .. }));
        assert!(host.called().is_empty());
        assert!(fx.scratch_is_empty());
    }

    #[test]
    fn master_runs_only_the_master_plugin() {
        let fx = Fixture::new();
        let host = FakeHost::default();
        let renderer = fx.renderer(&["master"], host.clone());
        let summary = renderer.master(&fx.input(), &fx.output(), &mut NoProgress).unwrap();
        assert_eq!(summary.completed, vec![StageKind::Master]);
        assert_eq!(host.called(), vec!["master"]);
        assert!(fx.output().exists());
    }

    #[test]
    fn master_missing_plugin() {
        let fx = Fixture::new();
        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        let err = renderer.master(&fx.input(), &fx.output(), &mut NoProgress).unwrap_err();
        assert!(matches!(err, RenderError::Configuration { .. }));
    }

    #[test]
    fn status_flattens_errors() {
        let fx = Fixture::new();
        let renderer = fx.renderer(&[], FakeHost::default());
        let (ok, message) = renderer.render_status(
            &fx.input(),
            &fx.output(),
            &PipelineConfig::default(),
            &mut NoProgress,
        );
        assert!(!ok);
        assert!(message.unwrap().contains("main chain"));

        let renderer = fx.renderer(&["globalmix"], FakeHost::default());
        let status = renderer.render_status(
            &fx.input(),
            &fx.output(),
            &PipelineConfig::main_only(),
            &mut NoProgress,
        );
        assert_eq!(status, (true, None));
    }

    #[test]
    fn averaging_requires_matching_rates() {
        let a = AudioBuffer::mono(vec![0.2, 0.4], 44100);
        let b = AudioBuffer::stereo(vec![0.4, 0.0, 0.9], vec![0.0; 3], 44100);
        let mixed = average(&[a.clone(), b]).unwrap();
        assert_eq!(mixed.channel_count(), 1);
        assert_eq!(mixed.frames(), 2);
        assert!((mixed.channel(0)[0] - 0.3).abs() < 1e-6);

        let c = AudioBuffer::mono(vec![0.2, 0.4], 48000);
        assert!(average(&[a, c]).is_none());
        assert!(average(&[]).is_none());
    }

    #[test]
    fn span_interpolation() {
        assert_eq!(Span::FULL.at(0.5), 0.5);
        assert_eq!(Span::FULL.at(3.0), INTERPOLATION_CAP);
        let second = Span::nth_of(1, 4);
        assert_eq!(second.at(0.0), 0.25);
    }

    /// Records what the output path looked like when the host started.
    #[derive(Clone, Default)]
    struct OutputWatchHost {
        seen: Arc<Mutex<Vec<(bool, PathBuf)>>>,
    }

    impl PluginHost for OutputWatchHost {
        fn run(&self, invocation: &Invocation) -> std::io::Result<HostOutput> {
            self.seen
                .lock()
                .unwrap()
                .push((invocation.output.exists(), invocation.output.clone()));
            std::fs::copy(&invocation.input, &invocation.output)?;
            Ok(HostOutput {
                status: Some(0),
                ..HostOutput::default()
            })
        }
    }

    #[test]
    fn plugin_output_paths_are_reserved_not_created() {
        let fx = Fixture::new();
        let host = OutputWatchHost::default();
        let renderer = Renderer::new(fx.registry(&["globalmix", "robot"]), host.clone(), fx.settings());
        let config = PipelineConfig {
            robot: true,
            ..PipelineConfig::main_only()
        };
        renderer
            .render(&fx.input(), &fx.output(), &config, &mut NoProgress)
            .unwrap();

        let seen = host.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        for (existed, path) in &seen {
            assert!(!existed, "{} existed before the host ran", path.display());
            let render_dir = path.parent().unwrap();
            assert_eq!(render_dir.parent(), Some(fx.scratch.path()));
            assert!(!render_dir.exists());
        }
        assert_ne!(seen[0].1, seen[1].1);
        assert!(fx.scratch_is_empty());
    }
}
