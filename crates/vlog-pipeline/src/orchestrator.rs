//! Session orchestration.
//!
//! A session assembles the master recording, plans windows, slices every clip
//! up front, then walks the windows in order. Each window's refined text is
//! the context of the next one, so the walk is a strict fold and any window
//! failure aborts the session. Title and memory extraction run afterwards and
//! only degrade the report when they fail.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{stream, StreamExt, TryStreamExt};
use metrics::{counter, histogram};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn, Instrument};

use vlog_llm::{
    complete_with_retry, stream_text, AnalysisBackend, LlmError, LlmResult, MediaRef, RetryConfig,
    TextStream,
};
use vlog_media::{wait_for_cancel, Clipper, MediaError, SessionWorkspace};
use vlog_models::{
    plan_full, plan_windows, AnalysisMode, PromptMode, SessionId, SessionReport, Title,
    UserMemory, Window, WindowOutcome, WindowPlan, WindowState,
};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::events::{EventSink, PipelineEvent};
use crate::logging::SessionLogger;
use crate::prompts::{DefaultPromptBuilder, PromptBuilder};
use crate::publish::{LocalPublisher, MediaPublisher};
use crate::recording::build_master;
use crate::stages::{memory_or_empty, refined_or_raw};

/// One recording to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub session_id: SessionId,
    /// Recorded chunks in order; several chunks are concatenated first
    pub chunks: Vec<PathBuf>,
    /// Caller-owned profile used as prompt context
    pub user_memory: UserMemory,
    /// Extra facts passed to refinement (device, source, ...)
    pub metadata: BTreeMap<String, String>,
    /// Overrides the configured analysis mode
    pub mode: Option<AnalysisMode>,
}

impl AnalysisRequest {
    pub fn new(chunks: Vec<PathBuf>) -> Self {
        Self {
            session_id: SessionId::new(),
            chunks,
            user_memory: UserMemory::empty(),
            metadata: BTreeMap::new(),
            mode: None,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_memory(mut self, user_memory: UserMemory) -> Self {
        self.user_memory = user_memory;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// Accumulator of the window fold.
#[derive(Debug, Default)]
struct ChainState {
    /// Refined text of the last completed window
    prior_refined: Option<String>,
    outcomes: Vec<WindowOutcome>,
}

/// Per-session values shared by every window step.
struct SessionContext {
    session_id: SessionId,
    mode: AnalysisMode,
    duration: f64,
    user_memory: UserMemory,
    metadata: BTreeMap<String, String>,
    cancel: watch::Receiver<bool>,
    events: EventSink,
    logger: SessionLogger,
}

impl SessionContext {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn until_cancelled<F: Future>(
        &self,
        window: Option<usize>,
        fut: F,
    ) -> PipelineResult<F::Output> {
        until_cancelled(&self.cancel, &self.session_id, window, fut).await
    }
}

/// Race `fut` against the cancel flag. Dropping `fut` on cancel kills any
/// FFmpeg child it owns and closes any HTTP body it is reading.
async fn until_cancelled<F: Future>(
    cancel: &watch::Receiver<bool>,
    session_id: &SessionId,
    window: Option<usize>,
    fut: F,
) -> PipelineResult<F::Output> {
    tokio::select! {
        biased;
        _ = wait_for_cancel(Some(cancel.clone())) => Err(PipelineError::cancelled(session_id, window)),
        output = fut => Ok(output),
    }
}

/// Tracks a window through its states.
struct WindowProgress<'a> {
    window: Window,
    state: WindowState,
    logger: &'a SessionLogger,
}

impl<'a> WindowProgress<'a> {
    fn new(window: Window, logger: &'a SessionLogger) -> Self {
        Self {
            window,
            state: WindowState::Planned,
            logger,
        }
    }

    fn advance(&mut self, next: WindowState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal window transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        self.logger.log_window(&self.window, next);
    }
}

/// Drives analysis sessions against one backend.
pub struct AnalysisOrchestrator {
    backend: Arc<dyn AnalysisBackend>,
    clipper: Arc<dyn Clipper>,
    publisher: Arc<dyn MediaPublisher>,
    prompts: Arc<dyn PromptBuilder>,
    config: PipelineConfig,
    retry: RetryConfig,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator handing clips to the backend as local files.
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        clipper: Arc<dyn Clipper>,
        config: PipelineConfig,
    ) -> Self {
        let prompts = DefaultPromptBuilder::new(config.language, config.scenario)
            .with_scenario_hint(config.include_scenario_hint);
        Self {
            backend,
            clipper,
            publisher: Arc::new(LocalPublisher),
            prompts: Arc::new(prompts),
            config,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn MediaPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn retry_for(&self, operation: &str) -> RetryConfig {
        RetryConfig {
            operation_name: operation.to_string(),
            ..self.retry.clone()
        }
    }

    /// Start streaming analysis of one window's clip.
    ///
    /// The prompt is chosen by `mode`; `prior_context` only matters for
    /// `SubsequentWindow`.
    pub async fn analyze_window(
        &self,
        clip: &MediaRef,
        window: &Window,
        prior_context: Option<&str>,
        mode: PromptMode,
        user_memory: &UserMemory,
    ) -> LlmResult<TextStream> {
        let overlap = match mode {
            PromptMode::SubsequentWindow => self.config.overlap(),
            _ => 0.0,
        };
        let prompt =
            self.prompts
                .analysis(mode, window.duration(), overlap, prior_context, user_memory);
        debug!(window = window.index, mode = %mode, "Starting analysis stream for {}", clip);
        stream_text(self.backend.as_ref(), &prompt, clip).await
    }

    /// Editing pass over a window's raw analysis.
    pub async fn refine(
        &self,
        raw_text: &str,
        video_duration: f64,
        metadata: &BTreeMap<String, String>,
        user_memory: &UserMemory,
    ) -> LlmResult<String> {
        let prompt = self
            .prompts
            .refinement(raw_text, video_duration, metadata, user_memory);
        let completion =
            complete_with_retry(self.backend.as_ref(), &prompt, &self.retry_for("refine")).await?;
        Ok(refined_or_raw(&completion, raw_text))
    }

    /// Short title over all refined window texts.
    pub async fn generate_title(
        &self,
        refined_texts: &[String],
        user_memory: &UserMemory,
    ) -> LlmResult<Title> {
        let prompt = self.prompts.title(refined_texts, user_memory);
        let completion = complete_with_retry(
            self.backend.as_ref(),
            &prompt,
            &self.retry_for("generate_title"),
        )
        .await?;

        let title = Title::from_completion(&completion, self.config.title_max_chars);
        if title.is_empty() {
            return Err(LlmError::invalid_response(self.backend.name(), "empty title"));
        }
        Ok(title)
    }

    /// Updated user memory: `current` merged with what the session revealed.
    ///
    /// Backend failures are errors. A completion that is not a memory profile
    /// counts as "nothing new" and leaves `current` unchanged.
    pub async fn extract_memory(
        &self,
        refined_texts: &[String],
        current_memory: &UserMemory,
    ) -> LlmResult<UserMemory> {
        let prompt = self.prompts.memory_extraction(refined_texts, current_memory);
        let completion = complete_with_retry(
            self.backend.as_ref(),
            &prompt,
            &self.retry_for("extract_memory"),
        )
        .await?;

        let (extracted, parse_error) = memory_or_empty(&completion);
        if let Some(err) = parse_error {
            warn!("Memory response was not valid JSON, using empty memory: {}", err);
        }
        Ok(current_memory.merge(&extracted))
    }

    /// Analyze a recording end to end.
    ///
    /// Stops with [`PipelineError::Cancelled`] once `cancel` flips to `true`;
    /// the session workspace and its clips are removed on every exit path.
    pub async fn run_session(
        &self,
        request: AnalysisRequest,
        cancel: watch::Receiver<bool>,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> PipelineResult<SessionReport> {
        let mode = request.mode.unwrap_or(self.config.mode);
        let logger = SessionLogger::new(&request.session_id, mode.as_str());
        let span = logger.create_span();

        let result = self
            .execute(request, mode, cancel, EventSink::new(events), logger.clone())
            .instrument(span)
            .await;

        match &result {
            Ok(report) => {
                counter!("vlog_sessions_completed_total").increment(1);
                logger.log_completion(&format!(
                    "{} window(s), title {:?}",
                    report.windows.len(),
                    report.title.as_str()
                ));
            }
            Err(e) => {
                counter!("vlog_sessions_failed_total", "kind" => e.kind()).increment(1);
                if e.is_cancelled() {
                    logger.log_warning(&e.to_string());
                } else {
                    logger.log_error(&e.to_string());
                }
            }
        }
        result
    }

    async fn execute(
        &self,
        request: AnalysisRequest,
        mode: AnalysisMode,
        cancel: watch::Receiver<bool>,
        events: EventSink,
        logger: SessionLogger,
    ) -> PipelineResult<SessionReport> {
        let started_at = Utc::now();
        let AnalysisRequest {
            session_id,
            chunks,
            user_memory,
            metadata,
            ..
        } = request;

        if *cancel.borrow() {
            return Err(PipelineError::cancelled(&session_id, None));
        }
        logger.log_start(&format!(
            "{} chunk(s), backend {}",
            chunks.len(),
            self.backend.name()
        ));

        let workspace = SessionWorkspace::create(&self.config.temp_dir, session_id.as_str())
            .map_err(|e| PipelineError::media(&session_id, None, e))?;

        let master = until_cancelled(
            &cancel,
            &session_id,
            None,
            build_master(self.clipper.as_ref(), &chunks, &workspace),
        )
        .await?
        .map_err(|e| PipelineError::media(&session_id, None, e))?;

        let plan = match mode {
            AnalysisMode::Full => plan_full(master.duration),
            AnalysisMode::SlidingWindow => plan_windows(
                master.duration,
                self.config.window_size,
                self.config.window_step,
            ),
        }
        .map_err(|source| PipelineError::Planning {
            session_id: session_id.clone(),
            source,
        })?;
        for warning in &plan.warnings {
            logger.log_warning(&warning.to_string());
        }
        logger.log_progress(&format!(
            "planned {} window(s) over {:.2}s",
            plan.len(),
            master.duration
        ));

        let clips: Vec<(Window, PathBuf)> = match mode {
            AnalysisMode::Full => plan
                .windows
                .iter()
                .map(|window| (*window, master.path.clone()))
                .collect(),
            AnalysisMode::SlidingWindow => {
                until_cancelled(
                    &cancel,
                    &session_id,
                    None,
                    self.slice_all(&master.path, &plan, &workspace),
                )
                .await?
                .map_err(|(index, e)| PipelineError::media(&session_id, Some(index), e))?
            }
        };

        let ctx = SessionContext {
            session_id,
            mode,
            duration: master.duration,
            user_memory,
            metadata,
            cancel,
            events,
            logger,
        };

        let mut chain = ChainState::default();
        for (window, clip) in clips {
            if ctx.is_cancelled() {
                return Err(PipelineError::cancelled(&ctx.session_id, Some(window.index)));
            }
            chain = match self.process_window(&ctx, chain, window, clip).await {
                Ok(chain) => chain,
                Err(e) => {
                    ctx.logger.log_window(&window, WindowState::Failed);
                    return Err(e);
                }
            };
        }
        let outcomes = chain.outcomes;
        let refined_texts: Vec<String> = outcomes.iter().map(|o| o.refined.clone()).collect();

        let mut warnings = Vec::new();

        let title = match ctx
            .until_cancelled(None, self.generate_title(&refined_texts, &ctx.user_memory))
            .await?
        {
            Ok(title) => title,
            Err(e) => {
                let message = format!("title generation failed, using default title: {}", e);
                ctx.logger.log_warning(&message);
                warnings.push(message);
                Title::fallback(self.config.language)
            }
        };
        ctx.events
            .emit(PipelineEvent::Title {
                title: title.clone(),
            })
            .await;

        let memory = match ctx
            .until_cancelled(None, self.extract_memory(&refined_texts, &ctx.user_memory))
            .await?
        {
            Ok(memory) => memory,
            Err(e) => {
                let message = format!("memory extraction failed, keeping current memory: {}", e);
                ctx.logger.log_warning(&message);
                warnings.push(message);
                ctx.user_memory.clone()
            }
        };

        if let Err(e) = workspace.close() {
            ctx.logger
                .log_warning(&format!("failed to remove session workspace: {}", e));
        }

        ctx.events
            .emit(PipelineEvent::Completed {
                session_id: ctx.session_id.clone(),
            })
            .await;

        Ok(SessionReport {
            session_id: ctx.session_id,
            duration: master.duration,
            windows: outcomes,
            title,
            memory,
            warnings,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Slice every planned window, at most `slice_parallelism` at a time,
    /// returning clips in window order.
    async fn slice_all(
        &self,
        source: &Path,
        plan: &WindowPlan,
        workspace: &SessionWorkspace,
    ) -> Result<Vec<(Window, PathBuf)>, (usize, MediaError)> {
        let extension = self.clipper.extension().to_string();
        let mut clips: Vec<(Window, PathBuf)> = stream::iter(plan.windows.iter().copied())
            .map(|window| {
                let output = workspace.clip_path(&window, &extension);
                async move {
                    self.clipper
                        .slice(source, window.start, window.duration(), &output)
                        .await
                        .map(|()| (window, output))
                        .map_err(|e| (window.index, e))
                }
            })
            .buffer_unordered(self.config.slice_parallelism.max(1))
            .try_collect()
            .await?;

        clips.sort_by_key(|(window, _)| window.index);
        Ok(clips)
    }

    /// One step of the fold: analyze `window` with the chain's prior context.
    async fn process_window(
        &self,
        ctx: &SessionContext,
        mut chain: ChainState,
        window: Window,
        clip: PathBuf,
    ) -> PipelineResult<ChainState> {
        let mut progress = WindowProgress::new(window, &ctx.logger);
        progress.advance(WindowState::Sliced);

        let published = ctx
            .until_cancelled(
                Some(window.index),
                self.publisher.publish(&ctx.session_id, &window, &clip),
            )
            .await?
            .map_err(|source| PipelineError::Publish {
                session_id: ctx.session_id.clone(),
                window: window.index,
                source,
            })?;

        let mode = match ctx.mode {
            AnalysisMode::Full => PromptMode::Full,
            AnalysisMode::SlidingWindow => {
                PromptMode::for_window(&window, chain.prior_refined.is_some())
            }
        };
        let result = self
            .analyze_and_refine(
                ctx,
                &mut progress,
                &published.media,
                mode,
                chain.prior_refined.as_deref(),
            )
            .await;

        if let Err(e) = self.publisher.retract(&published).await {
            ctx.logger
                .log_warning(&format!("failed to retract clip of window {}: {}", window.index, e));
        }
        let (raw, refined) = result?;

        progress.advance(WindowState::Done);
        counter!("vlog_windows_analyzed_total").increment(1);

        chain.outcomes.push(WindowOutcome {
            window,
            mode,
            raw,
            refined: refined.clone(),
            state: WindowState::Done,
        });
        chain.prior_refined = Some(refined);
        Ok(chain)
    }

    async fn analyze_and_refine(
        &self,
        ctx: &SessionContext,
        progress: &mut WindowProgress<'_>,
        media: &MediaRef,
        mode: PromptMode,
        prior_context: Option<&str>,
    ) -> PipelineResult<(String, String)> {
        let window = progress.window;
        ctx.events
            .emit(PipelineEvent::WindowStarted { window, mode })
            .await;

        progress.advance(WindowState::Streaming);
        let started = Instant::now();
        let raw = self
            .stream_window(ctx, media, &window, prior_context, mode)
            .await?;
        progress.advance(WindowState::Accumulated);
        histogram!("vlog_window_analysis_seconds").record(started.elapsed().as_secs_f64());

        let refined = ctx
            .until_cancelled(
                Some(window.index),
                self.refine(&raw, ctx.duration, &ctx.metadata, &ctx.user_memory),
            )
            .await?
            .map_err(|source| PipelineError::Refinement {
                session_id: ctx.session_id.clone(),
                window: window.index,
                source,
            })?;
        progress.advance(WindowState::Refined);
        ctx.events
            .emit(PipelineEvent::WindowRefined {
                window: window.index,
                text: refined.clone(),
            })
            .await;

        Ok((raw, refined))
    }

    /// Consume a window's analysis stream into its raw text, forwarding
    /// tokens as they arrive.
    async fn stream_window(
        &self,
        ctx: &SessionContext,
        media: &MediaRef,
        window: &Window,
        prior_context: Option<&str>,
        mode: PromptMode,
    ) -> PipelineResult<String> {
        let index = window.index;
        let fail = |source: LlmError| {
            PipelineError::analysis(&ctx.session_id, index, WindowState::Streaming, source)
        };

        let mut stream = ctx
            .until_cancelled(
                Some(index),
                self.analyze_window(media, window, prior_context, mode, &ctx.user_memory),
            )
            .await?
            .map_err(fail)?;

        let cancelled = wait_for_cancel(Some(ctx.cancel.clone()));
        tokio::pin!(cancelled);

        let mut raw = String::new();
        loop {
            tokio::select! {
                biased;
                _ = &mut cancelled => {
                    return Err(PipelineError::cancelled(&ctx.session_id, Some(index)));
                }
                item = stream.next() => match item {
                    Some(Ok(text)) => {
                        raw.push_str(&text);
                        ctx.events
                            .emit(PipelineEvent::Token { window: index, text })
                            .await;
                    }
                    Some(Err(source)) => return Err(fail(source)),
                    None => break,
                },
            }
        }

        if raw.trim().is_empty() {
            return Err(fail(LlmError::invalid_response(
                self.backend.name(),
                "analysis stream produced no text",
            )));
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use vlog_llm::{RawChunk, RawChunkStream, StreamShape};
    use vlog_media::MediaResult;

    /// Backend that records prompts and answers by prompt kind.
    struct FakeBackend {
        shape: StreamShape,
        memory_response: String,
        title_response: String,
        fail_memory: bool,
        stall_after_first_chunk: bool,
        stream_prompts: Mutex<Vec<String>>,
        refinements: Mutex<usize>,
    }

    impl FakeBackend {
        fn new(shape: StreamShape) -> Self {
            Self {
                shape,
                memory_response: "not json at all".to_string(),
                title_response: "Title: \"Terminal work\"".to_string(),
                fail_memory: false,
                stall_after_first_chunk: false,
                stream_prompts: Mutex::new(Vec::new()),
                refinements: Mutex::new(0),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.stream_prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalysisBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn shape(&self) -> StreamShape {
            self.shape
        }

        async fn stream_analysis(
            &self,
            prompt: &str,
            _media: &MediaRef,
        ) -> LlmResult<RawChunkStream> {
            let call = {
                let mut prompts = self.stream_prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len() - 1
            };

            let chunks: Vec<LlmResult<RawChunk>> = match self.shape {
                StreamShape::Incremental => vec![
                    Ok(RawChunk::Delta(format!("window {} ", call))),
                    Ok(RawChunk::Delta("seen".to_string())),
                ],
                StreamShape::Cumulative => vec![
                    Ok(RawChunk::Snapshot(json!(format!("window {} ", call)))),
                    Ok(RawChunk::Snapshot(json!([{ "text": format!("window {} seen", call) }]))),
                ],
            };

            if self.stall_after_first_chunk {
                let first: Vec<_> = chunks.into_iter().take(1).collect();
                return Ok(stream::iter(first).chain(stream::pending()).boxed());
            }
            Ok(stream::iter(chunks).boxed())
        }

        async fn complete(&self, prompt: &str) -> LlmResult<String> {
            if prompt.contains("**Raw record**") {
                let mut count = self.refinements.lock().unwrap();
                let reply = format!("refined-{}", *count);
                *count += 1;
                Ok(reply)
            } else if prompt.contains("Generate a title") {
                Ok(self.title_response.clone())
            } else if prompt.contains("Extract a user profile") {
                if self.fail_memory {
                    return Err(LlmError::backend("fake", Some(400), "bad request"));
                }
                Ok(self.memory_response.clone())
            } else {
                Err(LlmError::invalid_response("fake", "unexpected prompt"))
            }
        }
    }

    /// Clipper that writes placeholder files instead of running FFmpeg.
    struct FakeClipper {
        duration: f64,
        fail_window_at: Option<f64>,
        /// Earlier windows take longer to slice
        stagger: bool,
        slices: Mutex<Vec<(f64, f64)>>,
        concats: Mutex<Vec<usize>>,
    }

    impl FakeClipper {
        fn new(duration: f64) -> Self {
            Self {
                duration,
                fail_window_at: None,
                stagger: false,
                slices: Mutex::new(Vec::new()),
                concats: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Clipper for FakeClipper {
        async fn probe_duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(self.duration)
        }

        async fn slice(
            &self,
            _input: &Path,
            start: f64,
            duration: f64,
            output: &Path,
        ) -> MediaResult<()> {
            if self.fail_window_at == Some(start) {
                return Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with status 1",
                    Some("moov atom not found".to_string()),
                    Some(1),
                ));
            }
            if self.stagger {
                let delay = (30.0 - start).max(0.0) as u64 * 2;
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }
            self.slices.lock().unwrap().push((start, duration));
            tokio::fs::write(output, b"clip").await?;
            Ok(())
        }

        async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
            self.concats.lock().unwrap().push(inputs.len());
            tokio::fs::write(output, b"master").await?;
            Ok(())
        }

        fn extension(&self) -> &str {
            "mp4"
        }
    }

    struct Fixture {
        _source_dir: tempfile::TempDir,
        temp_root: tempfile::TempDir,
        chunks: Vec<PathBuf>,
    }

    fn fixture(chunk_count: usize) -> Fixture {
        let source_dir = tempfile::tempdir().unwrap();
        let chunks = (0..chunk_count)
            .map(|i| {
                let path = source_dir.path().join(format!("chunk{}.webm", i));
                std::fs::write(&path, b"recording").unwrap();
                path
            })
            .collect();
        Fixture {
            _source_dir: source_dir,
            temp_root: tempfile::tempdir().unwrap(),
            chunks,
        }
    }

    fn test_config(temp_root: &Path) -> PipelineConfig {
        PipelineConfig {
            temp_dir: temp_root.to_path_buf(),
            language: vlog_models::Language::En,
            ..Default::default()
        }
    }

    fn orchestrator(
        backend: Arc<FakeBackend>,
        clipper: Arc<FakeClipper>,
        temp_root: &Path,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(backend, clipper, test_config(temp_root))
    }

    fn workspace_count(root: &Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_sliding_session_chains_refined_context() {
        let fx = fixture(1);
        let backend = Arc::new(FakeBackend::new(StreamShape::Incremental));
        let clipper = Arc::new(FakeClipper::new(32.0));
        let orchestrator = orchestrator(backend.clone(), clipper.clone(), fx.temp_root.path());

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let request = AnalysisRequest::new(fx.chunks.clone())
            .with_session_id(SessionId::from_string("s-32"));
        let report = orchestrator
            .run_session(request, cancel_rx, None)
            .await
            .unwrap();

        let ranges: Vec<(f64, f64)> = report
            .windows
            .iter()
            .map(|o| (o.window.start, o.window.end))
            .collect();
        assert_eq!(ranges, vec![(0.0, 15.0), (10.0, 25.0), (20.0, 32.0)]);

        let mut slices = clipper.slices.lock().unwrap().clone();
        slices.sort_by(|a, b| a.0.total_cmp(&b.0));
        assert_eq!(slices, vec![(0.0, 15.0), (10.0, 15.0), (20.0, 12.0)]);

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(!prompts[0].contains("Previously recorded"));
        assert!(prompts[1].contains("Previously recorded**:\nrefined-0"));
        assert!(prompts[2].contains("Previously recorded**:\nrefined-1"));
        assert!(prompts[2].contains("about 12 seconds"));

        let modes: Vec<PromptMode> = report.windows.iter().map(|o| o.mode).collect();
        assert_eq!(
            modes,
            vec![
                PromptMode::FirstWindow,
                PromptMode::SubsequentWindow,
                PromptMode::SubsequentWindow
            ]
        );
        assert_eq!(report.windows[1].raw, "window 1 seen");
        assert_eq!(report.refined_texts(), vec!["refined-0", "refined-1", "refined-2"]);
        assert!(report.windows.iter().all(|o| o.state == WindowState::Done));
        assert_eq!(report.title.as_str(), "Terminal work");
        assert_eq!(report.session_id.as_str(), "s-32");
        assert_eq!(workspace_count(fx.temp_root.path()), 0);
    }

    #[tokio::test]
    async fn test_malformed_memory_yields_empty_profile() {
        let fx = fixture(1);
        let backend = Arc::new(FakeBackend::new(StreamShape::Incremental));
        let clipper = Arc::new(FakeClipper::new(32.0));
        let orchestrator = orchestrator(backend, clipper, fx.temp_root.path());

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(AnalysisRequest::new(fx.chunks.clone()), cancel_rx, None)
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&report.memory).unwrap(),
            json!({"habits": {}, "knowledge": {}, "behavior_patterns": {}})
        );
    }

    #[tokio::test]
    async fn test_extracted_memory_is_merged() {
        let fx = fixture(1);
        let mut backend = FakeBackend::new(StreamShape::Incremental);
        backend.memory_response =
            "```json\n{\"habits\": {\"tools\": [\"tmux\", \"Neovim\"]}}\n```".to_string();
        let backend = Arc::new(backend);
        let orchestrator = orchestrator(
            backend,
            Arc::new(FakeClipper::new(8.0)),
            fx.temp_root.path(),
        );

        let current: UserMemory =
            serde_json::from_value(json!({"habits": {"tools": ["tmux"]}})).unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(
                AnalysisRequest::new(fx.chunks.clone()).with_memory(current),
                cancel_rx,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.memory.habits["tools"], vec!["tmux", "Neovim"]);
    }

    #[tokio::test]
    async fn test_cumulative_backend_is_normalized() {
        let fx = fixture(1);
        let backend = Arc::new(FakeBackend::new(StreamShape::Cumulative));
        let orchestrator = orchestrator(
            backend,
            Arc::new(FakeClipper::new(20.0)),
            fx.temp_root.path(),
        );

        let (events_tx, mut events_rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(
                AnalysisRequest::new(fx.chunks.clone()),
                cancel_rx,
                Some(events_tx),
            )
            .await
            .unwrap();

        assert_eq!(report.windows[0].raw, "window 0 seen");

        let mut tokens = Vec::new();
        let mut completed = false;
        while let Some(event) = events_rx.recv().await {
            match event {
                PipelineEvent::Token { window: 0, text } => tokens.push(text),
                PipelineEvent::Completed { .. } => completed = true,
                _ => {}
            }
        }
        assert_eq!(tokens, vec!["window 0 ", "seen"]);
        assert!(completed);
    }

    #[tokio::test]
    async fn test_full_mode_single_call_on_master() {
        let fx = fixture(3);
        let backend = Arc::new(FakeBackend::new(StreamShape::Incremental));
        let clipper = Arc::new(FakeClipper::new(95.0));
        let orchestrator = orchestrator(backend.clone(), clipper.clone(), fx.temp_root.path());

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(
                AnalysisRequest::new(fx.chunks.clone()).with_mode(AnalysisMode::Full),
                cancel_rx,
                None,
            )
            .await
            .unwrap();

        assert_eq!(*clipper.concats.lock().unwrap(), vec![3]);
        assert!(clipper.slices.lock().unwrap().is_empty());
        assert_eq!(report.windows.len(), 1);
        assert_eq!(report.windows[0].mode, PromptMode::Full);
        assert_eq!(report.duration, 95.0);

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("complete video of about 95 seconds"));
    }

    #[tokio::test]
    async fn test_slice_failure_aborts_before_analysis() {
        let fx = fixture(1);
        let backend = Arc::new(FakeBackend::new(StreamShape::Incremental));
        let mut clipper = FakeClipper::new(32.0);
        clipper.fail_window_at = Some(10.0);
        let orchestrator = orchestrator(backend.clone(), Arc::new(clipper), fx.temp_root.path());

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let err = orchestrator
            .run_session(AnalysisRequest::new(fx.chunks.clone()), cancel_rx, None)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Media { window: Some(1), .. }));
        assert!(err.to_string().contains("moov atom not found"));
        assert!(backend.prompts().is_empty());
        assert_eq!(workspace_count(fx.temp_root.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_recording_is_a_planning_error() {
        let fx = fixture(1);
        let orchestrator = orchestrator(
            Arc::new(FakeBackend::new(StreamShape::Incremental)),
            Arc::new(FakeClipper::new(0.0)),
            fx.temp_root.path(),
        );

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let err = orchestrator
            .run_session(AnalysisRequest::new(fx.chunks.clone()), cancel_rx, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Planning { .. }));
    }

    #[tokio::test]
    async fn test_cancel_while_streaming() {
        let fx = fixture(1);
        let mut backend = FakeBackend::new(StreamShape::Incremental);
        backend.stall_after_first_chunk = true;
        let orchestrator = orchestrator(
            Arc::new(backend),
            Arc::new(FakeClipper::new(32.0)),
            fx.temp_root.path(),
        );

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (events_tx, mut events_rx) = mpsc::channel(16);

        let run = orchestrator.run_session(
            AnalysisRequest::new(fx.chunks.clone()),
            cancel_rx,
            Some(events_tx),
        );
        let canceller = async {
            while let Some(event) = events_rx.recv().await {
                if matches!(event, PipelineEvent::Token { .. }) {
                    cancel_tx.send(true).unwrap();
                }
            }
        };

        let (result, ()) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(run, canceller)
        })
        .await
        .expect("session did not stop after cancel");

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.window(), Some(0));
        assert_eq!(workspace_count(fx.temp_root.path()), 0);
    }

    #[tokio::test]
    async fn test_memory_failure_keeps_session_and_current_memory() {
        let fx = fixture(1);
        let mut backend = FakeBackend::new(StreamShape::Incremental);
        backend.fail_memory = true;
        let orchestrator = orchestrator(
            Arc::new(backend),
            Arc::new(FakeClipper::new(8.0)),
            fx.temp_root.path(),
        );

        let current: UserMemory =
            serde_json::from_value(json!({"habits": {"tools": ["tmux"]}})).unwrap();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(
                AnalysisRequest::new(fx.chunks.clone()).with_memory(current.clone()),
                cancel_rx,
                None,
            )
            .await
            .unwrap();

        assert_eq!(report.refined_texts(), vec!["refined-0"]);
        assert_eq!(report.title.as_str(), "Terminal work");
        assert_eq!(report.memory, current);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("memory extraction failed"));
        assert!(report.warnings[0].contains("400"));
        assert_eq!(workspace_count(fx.temp_root.path()), 0);
    }

    #[tokio::test]
    async fn test_empty_title_falls_back_to_default() {
        let fx = fixture(1);
        let mut backend = FakeBackend::new(StreamShape::Incremental);
        backend.title_response = "  \"\"  ".to_string();
        let orchestrator = orchestrator(
            Arc::new(backend),
            Arc::new(FakeClipper::new(8.0)),
            fx.temp_root.path(),
        );

        let (events_tx, mut events_rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(
                AnalysisRequest::new(fx.chunks.clone()),
                cancel_rx,
                Some(events_tx),
            )
            .await
            .unwrap();

        assert_eq!(report.title, Title::fallback(vlog_models::Language::En));
        assert_eq!(report.refined_texts(), vec!["refined-0"]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("title generation failed"));

        let mut titles = Vec::new();
        while let Some(event) = events_rx.recv().await {
            if let PipelineEvent::Title { title } = event {
                titles.push(title);
            }
        }
        assert_eq!(titles, vec![Title::fallback(vlog_models::Language::En)]);
    }

    #[tokio::test]
    async fn test_out_of_order_slicing_keeps_window_order() {
        let fx = fixture(1);
        let backend = Arc::new(FakeBackend::new(StreamShape::Incremental));
        let mut clipper = FakeClipper::new(32.0);
        clipper.stagger = true;
        let clipper = Arc::new(clipper);
        let config = PipelineConfig {
            slice_parallelism: 3,
            ..test_config(fx.temp_root.path())
        };
        let orchestrator = AnalysisOrchestrator::new(backend.clone(), clipper.clone(), config);

        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let report = orchestrator
            .run_session(AnalysisRequest::new(fx.chunks.clone()), cancel_rx, None)
            .await
            .unwrap();

        // Slices finished last window first.
        let finished: Vec<f64> = clipper.slices.lock().unwrap().iter().map(|s| s.0).collect();
        assert_eq!(finished, vec![20.0, 10.0, 0.0]);

        let indices: Vec<usize> = report.windows.iter().map(|o| o.window.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let starts: Vec<f64> = report.windows.iter().map(|o| o.window.start).collect();
        assert_eq!(starts, vec![0.0, 10.0, 20.0]);
        assert_eq!(report.refined_texts(), vec!["refined-0", "refined-1", "refined-2"]);

        let prompts = backend.prompts();
        assert!(!prompts[0].contains("Previously recorded"));
        assert!(prompts[1].contains("Previously recorded**:\nrefined-0"));
        assert!(prompts[2].contains("Previously recorded**:\nrefined-1"));
        assert!(prompts[2].contains("about 12 seconds"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = fixture(1);
        let backend = Arc::new(FakeBackend::new(StreamShape::Incremental));
        let orchestrator = orchestrator(
            backend.clone(),
            Arc::new(FakeClipper::new(32.0)),
            fx.temp_root.path(),
        );

        let (_cancel_tx, cancel_rx) = watch::channel(true);
        let err = orchestrator
            .run_session(AnalysisRequest::new(fx.chunks.clone()), cancel_rx, None)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(backend.prompts().is_empty());
    }
}
