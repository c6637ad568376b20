// 上传编排器
//
// 流程：
// 1. Planning: 读取文件信息，计算分片计划，查找断点
// 2. SingleShot: 小文件整文件一次 PUT，不写断点
// 3. Sequential: 从断点处逐个分片 PUT，每个分片被服务器确认后才写断点
// 4. 全部完成后清除断点，返回最后一个分片的响应
//
// 失败或取消时断点保持不变，重新调用 run 即可续传

use crate::common::format_file_size;
use crate::config::UploadConfig;
use crate::persistence::{Checkpoint, ResumeStore};
use crate::uploader::chunk::{ChunkMode, ChunkPlan};
use crate::uploader::error::UploadError;
use crate::uploader::file::{FileIdentity, LocalFile};
use crate::uploader::progress::{ProgressEstimator, ProgressReport, ProgressSink};
use crate::uploader::task::{StatusTag, TransferPhase, UploadState};
use crate::uploader::transport::{
    ByteProgressFn, ChunkRequest, ChunkTransport, Destination, UploadResponse,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 状态消息回调（消息文本, 标签）
pub type StatusCallback = Arc<dyn Fn(&str, StatusTag) + Send + Sync>;

/// 上传编排器
///
/// 一个实例同一时间只驱动一个文件；多个文件并发上传时各用各的实例，
/// 取消句柄和断点互不影响
pub struct TransferOrchestrator {
    config: UploadConfig,
    transport: Arc<dyn ChunkTransport>,
    store: Arc<ResumeStore>,
    state: Arc<Mutex<UploadState>>,
    /// 当前这次 run 的取消令牌
    abort: Mutex<CancellationToken>,
    on_progress: Option<ProgressSink>,
    on_status: Option<StatusCallback>,
}

impl TransferOrchestrator {
    pub fn new(
        config: UploadConfig,
        transport: Arc<dyn ChunkTransport>,
        store: Arc<ResumeStore>,
    ) -> Self {
        Self {
            config,
            transport,
            store,
            state: Arc::new(Mutex::new(UploadState::default())),
            abort: Mutex::new(CancellationToken::new()),
            on_progress: None,
            on_status: None,
        }
    }

    /// 注册进度回调；不注册时进度写入 [`state`](Self::state)
    pub fn with_progress_callback(mut self, callback: ProgressSink) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn with_status_callback(mut self, callback: StatusCallback) -> Self {
        self.on_status = Some(callback);
        self
    }

    /// 当前状态快照
    pub fn state(&self) -> UploadState {
        self.state.lock().clone()
    }

    /// 取消正在进行的上传
    ///
    /// 进行中的分片请求立即以 Aborted 结束，断点保持在最后确认的分片。
    /// 没有进行中的上传时无效果
    pub fn cancel(&self) {
        info!("请求取消上传");
        self.abort.lock().cancel();
    }

    /// 查找文件是否有未完成的上传（不校验上传地址）
    ///
    /// 用于在获取新的上传地址之前提示用户；真正续传时 run 仍会做严格校验
    pub async fn prior_attempt(&self, path: &Path) -> Result<Option<Checkpoint>, UploadError> {
        let file = LocalFile::open(path).await?;
        let prior = self.store.has_prior_attempt(file.identity());

        if let Some(checkpoint) = &prior {
            info!(
                "发现未完成的上传: file={}, 已确认分片={}/{}",
                file.identity(),
                checkpoint.next_chunk(),
                checkpoint.total_chunks
            );
        }

        let mut state = self.state.lock();
        state.can_resume = prior.is_some();
        if prior.is_some() {
            state.last_file = Some(path.to_path_buf());
        }
        Ok(prior)
    }

    /// 清除文件的断点
    pub async fn clear_progress(&self, path: &Path) -> Result<(), UploadError> {
        let file = LocalFile::open(path).await?;
        self.store.clear(file.identity());
        self.state.lock().can_resume = false;
        info!("已清除上传断点: file={}", file.identity());
        Ok(())
    }

    /// 上传文件
    ///
    /// 返回最后一个分片（或整文件上传）的服务器响应
    pub async fn run(
        &self,
        path: &Path,
        destination: &Destination,
    ) -> Result<UploadResponse, UploadError> {
        let abort = self.arm();
        self.state.lock().begin(path);
        self.emit_status("正在准备上传...", StatusTag::Uploading);

        let result = self.drive(path, destination, &abort).await;

        match &result {
            Ok(_) => {
                self.state.lock().mark_completed();
                info!("上传完成: {:?}", path);
                self.emit_status("上传成功！", StatusTag::Success);
            }
            Err(e) => {
                let phase = self.state.lock().phase;
                // 只有分片上传阶段会留下断点
                let resumable = phase == TransferPhase::Sequential && e.kind().is_resumable();

                if matches!(e, UploadError::Aborted) {
                    warn!("上传已取消: {:?}, 可续传={}", path, resumable);
                    self.state.lock().mark_cancelled(resumable);
                } else {
                    error!("上传失败: {:?}, 错误: {}, 可续传={}", path, e, resumable);
                    self.state.lock().mark_failed(e, resumable);
                }
                self.emit_status(&format!("上传出错: {}", e), StatusTag::Error);
            }
        }

        result
    }

    async fn drive(
        &self,
        path: &Path,
        destination: &Destination,
        abort: &CancellationToken,
    ) -> Result<UploadResponse, UploadError> {
        let file = LocalFile::open(path).await?;
        let plan = ChunkPlan::new(
            file.size(),
            self.config.chunk_size,
            self.config.min_chunk_threshold,
        )?;
        self.store.sweep_legacy();

        match plan.mode() {
            ChunkMode::Single => {
                info!(
                    "使用完整上传模式: file={}, 大小={}",
                    file.identity(),
                    format_file_size(plan.total_bytes() as f64)
                );
                self.single_shot(&file, &plan, destination, abort).await
            }
            ChunkMode::Chunked => {
                info!(
                    "使用分片上传模式: 文件大小 {}, 分片数 {}, 每片 {}",
                    format_file_size(plan.total_bytes() as f64),
                    plan.chunk_count(),
                    format_file_size(plan.chunk_size() as f64)
                );
                self.sequential(&file, &plan, destination, abort).await
            }
        }
    }

    async fn single_shot(
        &self,
        file: &LocalFile,
        plan: &ChunkPlan,
        destination: &Destination,
        abort: &CancellationToken,
    ) -> Result<UploadResponse, UploadError> {
        self.enter(TransferPhase::SingleShot);

        let range = *plan
            .range(0)
            .ok_or_else(|| UploadError::Validation("分片计划为空".to_string()))?;
        let estimator = Arc::new(Mutex::new(self.estimator(plan.total_bytes(), 0)));

        let payload = file.read_range(&range).await?;
        let request = ChunkRequest {
            range,
            total_bytes: plan.total_bytes(),
            payload,
            destination,
        };
        let raw = self
            .transport
            .send(request, self.forward_progress(&estimator, 0), abort)
            .await?;

        estimator.lock().finish(Instant::now());
        // 之前可能以分片模式传过同一个文件
        self.store.clear(file.identity());

        Ok(UploadResponse::parse(&raw.body))
    }

    async fn sequential(
        &self,
        file: &LocalFile,
        plan: &ChunkPlan,
        destination: &Destination,
        abort: &CancellationToken,
    ) -> Result<UploadResponse, UploadError> {
        let identity = file.identity();
        let total_chunks = plan.chunk_count();
        let resume_from = self.resolve_resume_point(identity, plan, destination);

        self.enter(TransferPhase::Sequential);
        if resume_from == total_chunks {
            // 最后一个分片已确认，只是断点没来得及清除
            info!("断点显示所有分片都已确认，不再发送: file={}", identity);
            self.estimator(plan.total_bytes(), plan.total_bytes())
                .finish(Instant::now());
            self.store.clear(identity);
            return Ok(UploadResponse::AlreadyComplete);
        }
        if resume_from > 0 {
            info!(
                "从第 {} 个分片继续上传（断点续传）: file={}",
                resume_from + 1,
                identity
            );
            self.emit_status(
                &format!("检测到上传记录，从第 {} 个分片继续...", resume_from + 1),
                StatusTag::Uploading,
            );
        }

        let estimator = Arc::new(Mutex::new(
            self.estimator(plan.total_bytes(), plan.bytes_before(resume_from)),
        ));
        let mut last_response = None;

        for range in &plan.ranges()[resume_from..] {
            let index = range.index;
            debug!(
                "上传分片 {}/{}: {}",
                index + 1,
                total_chunks,
                range.content_range(plan.total_bytes())
            );
            self.emit_status(
                &format!("正在上传分片 {}/{}...", index + 1, total_chunks),
                StatusTag::Uploading,
            );

            let payload = file.read_range(range).await?;
            let request = ChunkRequest {
                range: *range,
                total_bytes: plan.total_bytes(),
                payload,
                destination,
            };
            let raw = self
                .transport
                .send(request, self.forward_progress(&estimator, range.start), abort)
                .await?;

            // 服务器确认之后才推进断点
            self.store
                .save(&Checkpoint::new(identity, index, total_chunks, destination));
            debug!("分片 {} 上传成功", index + 1);

            last_response = Some(raw);
        }

        let raw = last_response
            .ok_or_else(|| UploadError::Validation("没有需要上传的分片".to_string()))?;

        estimator.lock().finish(Instant::now());
        self.store.clear(identity);
        info!("所有分片上传完成: file={}", identity);

        Ok(UploadResponse::parse(&raw.body))
    }

    /// 确定续传起始分片
    ///
    /// 返回值等于分片总数时表示全部分片都已确认。
    /// 断点与当前分片计划对不上（分片大小变化、索引越界）时作废，从头开始
    fn resolve_resume_point(
        &self,
        identity: &FileIdentity,
        plan: &ChunkPlan,
        destination: &Destination,
    ) -> usize {
        let checkpoint = match self.store.lookup(identity, destination) {
            Some(c) => c,
            None => return 0,
        };

        if checkpoint.total_chunks != plan.chunk_count()
            || checkpoint.next_chunk() > plan.chunk_count()
        {
            warn!(
                "断点与分片计划不一致 (断点: {}/{}, 当前分片数: {})，从头上传",
                checkpoint.next_chunk(),
                checkpoint.total_chunks,
                plan.chunk_count()
            );
            self.store.clear(identity);
            return 0;
        }

        checkpoint.next_chunk()
    }

    /// 为本次 run 生成新的取消令牌
    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.abort.lock() = token.clone();
        token
    }

    fn enter(&self, phase: TransferPhase) {
        self.state.lock().enter(phase);
    }

    fn estimator(&self, total_bytes: u64, session_base: u64) -> ProgressEstimator {
        let sink: ProgressSink = match &self.on_progress {
            Some(callback) => callback.clone(),
            None => {
                let state = self.state.clone();
                Arc::new(move |report: &ProgressReport| state.lock().apply_progress(report))
            }
        };

        ProgressEstimator::new(&self.config.progress, total_bytes, session_base, Instant::now())
            .with_sink(sink)
    }

    /// 把分片内字节进度换算成文件累计进度
    fn forward_progress(
        &self,
        estimator: &Arc<Mutex<ProgressEstimator>>,
        bytes_before: u64,
    ) -> ByteProgressFn {
        let estimator = estimator.clone();
        Arc::new(move |sent| {
            estimator.lock().ingest(bytes_before + sent, Instant::now());
        })
    }

    fn emit_status(&self, message: &str, tag: StatusTag) {
        debug!("状态: [{:?}] {}", tag, message);
        if let Some(callback) = &self.on_status {
            callback(message, tag);
        }
    }
}
