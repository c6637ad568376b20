// 分片传输
//
// 单次字节范围 PUT：
// - 请求头 Content-Type: application/octet-stream
// - 请求头 Content-Range: bytes {start}-{end}/{total}
// - 请求体按 progress_step 切片流式发送，每交给底层连接一片就回调一次已发送字节数
// - 取消令牌触发时立即以 Aborted 结束，不等待服务器响应

use crate::uploader::chunk::ByteRange;
use crate::uploader::error::UploadError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 默认流式发送粒度: 64KB
pub const DEFAULT_PROGRESS_STEP: usize = 64 * 1024;

/// 分片内字节进度回调（参数为本分片已发送字节数）
pub type ByteProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// 上传目标
///
/// 由外部令牌服务签发，引擎只比较 `upload_url` 是否一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// 上传地址（一次上传会话）
    pub upload_url: String,
    /// 服务器侧文件 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_file_id: Option<String>,
}

impl Destination {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            upload_url: upload_url.into(),
            server_file_id: None,
        }
    }

    pub fn with_server_file_id(mut self, server_file_id: impl Into<String>) -> Self {
        self.server_file_id = Some(server_file_id.into());
        self
    }
}

/// 单次分片请求
#[derive(Debug, Clone)]
pub struct ChunkRequest<'a> {
    /// 本次发送的字节范围
    pub range: ByteRange,
    /// 文件总大小
    pub total_bytes: u64,
    /// 分片数据
    pub payload: Bytes,
    /// 上传目标
    pub destination: &'a Destination,
}

/// 原始响应（仅 2xx）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// 解析后的上传响应
///
/// 优先按 JSON 解析，失败时保留原始文本
#[derive(Debug, Clone, PartialEq)]
pub enum UploadResponse {
    Json(serde_json::Value),
    Text(String),
    /// 断点显示所有分片此前都已确认，本次没有发送任何请求
    AlreadyComplete,
}

impl UploadResponse {
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str(body) {
            Ok(value) => UploadResponse::Json(value),
            Err(_) => UploadResponse::Text(body.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            UploadResponse::Json(value) => Some(value),
            UploadResponse::Text(_) | UploadResponse::AlreadyComplete => None,
        }
    }
}

/// 分片传输接口
///
/// 每次调用恰好以四种结果之一结束：成功、HttpStatus、Network、Aborted
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn send(
        &self,
        request: ChunkRequest<'_>,
        on_progress: ByteProgressFn,
        abort: &CancellationToken,
    ) -> Result<RawResponse, UploadError>;
}

/// 基于 reqwest 的 HTTP 传输
#[derive(Debug, Clone)]
pub struct HttpChunkTransport {
    client: Client,
    progress_step: usize,
}

impl HttpChunkTransport {
    /// 创建传输层
    ///
    /// 只设置连接超时；单次请求不设整体超时，大分片在慢速网络上可能需要很久
    pub fn new(connect_timeout: Duration) -> Result<Self, UploadError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            progress_step: DEFAULT_PROGRESS_STEP,
        }
    }

    pub fn with_progress_step(mut self, progress_step: usize) -> Self {
        self.progress_step = progress_step.max(1);
        self
    }
}

#[async_trait]
impl ChunkTransport for HttpChunkTransport {
    async fn send(
        &self,
        request: ChunkRequest<'_>,
        on_progress: ByteProgressFn,
        abort: &CancellationToken,
    ) -> Result<RawResponse, UploadError> {
        let ChunkRequest {
            range,
            total_bytes,
            payload,
            destination,
        } = request;

        let content_range = range.content_range(total_bytes);
        let content_length = payload.len() as u64;

        debug!(
            "PUT 分片 #{}: {}, 大小={} bytes",
            range.index, content_range, content_length
        );

        let body = Body::wrap_stream(progress_stream(payload, self.progress_step, on_progress));
        let pending = self
            .client
            .put(&destination.upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_RANGE, content_range)
            .header(CONTENT_LENGTH, content_length)
            .body(body);

        let exchange = async move {
            let response = pending.send().await?;
            let status = response.status();
            let body = response.text().await?;

            if !status.is_success() {
                warn!(
                    "分片 #{} 被服务器拒绝: status={}, body={}",
                    range.index, status, body
                );
                return Err(UploadError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(RawResponse {
                status: status.as_u16(),
                body,
            })
        };

        tokio::select! {
            biased;
            _ = abort.cancelled() => {
                debug!("分片 #{} 请求已中止", range.index);
                Err(UploadError::Aborted)
            }
            result = exchange => result,
        }
    }
}

/// 把分片数据切成小片流式发送，每交出一片回调一次累计字节数
fn progress_stream(
    payload: Bytes,
    step: usize,
    on_progress: ByteProgressFn,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static {
    let step = step.max(1);
    let len = payload.len();
    let pieces: Vec<Bytes> = (0..len)
        .step_by(step)
        .map(|start| payload.slice(start..(start + step).min(len)))
        .collect();

    let mut sent = 0u64;
    stream::iter(pieces).map(move |piece| {
        sent += piece.len() as u64;
        on_progress(sent);
        Ok(piece)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::put;
    use axum::Router;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Received {
        content_ranges: Vec<String>,
        content_types: Vec<String>,
        body_lengths: Vec<usize>,
    }

    type Shared = Arc<Mutex<Received>>;

    fn header(headers: &HeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn accept(
        State(state): State<Shared>,
        headers: HeaderMap,
        body: axum::body::Bytes,
    ) -> (StatusCode, String) {
        let mut received = state.lock();
        received.content_ranges.push(header(&headers, "content-range"));
        received.content_types.push(header(&headers, "content-type"));
        received.body_lengths.push(body.len());
        (
            StatusCode::CREATED,
            r#"{"id":"remote-1","name":"movie.mkv"}"#.to_string(),
        )
    }

    async fn accept_text() -> (StatusCode, String) {
        (StatusCode::ACCEPTED, "chunk accepted".to_string())
    }

    async fn reject() -> (StatusCode, String) {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
    }

    async fn stall() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(30)).await;
        StatusCode::OK
    }

    async fn spawn_server() -> (String, Shared) {
        let state: Shared = Arc::new(Mutex::new(Received::default()));
        let app = Router::new()
            .route("/upload", put(accept))
            .route("/text", put(accept_text))
            .route("/fail", put(reject))
            .route("/stall", put(stall))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), state)
    }

    fn noop_progress() -> ByteProgressFn {
        Arc::new(|_| {})
    }

    fn request<'a>(destination: &'a Destination, range: ByteRange, total: u64) -> ChunkRequest<'a> {
        ChunkRequest {
            range,
            total_bytes: total,
            payload: Bytes::from(vec![7u8; range.len() as usize]),
            destination,
        }
    }

    #[tokio::test]
    async fn test_put_sends_range_headers() {
        let (base, state) = spawn_server().await;
        let transport = HttpChunkTransport::new(Duration::from_secs(5)).unwrap();
        let destination = Destination::new(format!("{}/upload", base));

        let response = transport
            .send(
                request(&destination, ByteRange::new(1, 1000, 1999), 2500),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        let parsed = UploadResponse::parse(&response.body);
        assert_eq!(parsed.as_json().unwrap()["id"], "remote-1");

        let received = state.lock();
        assert_eq!(received.content_ranges, vec!["bytes 1000-1999/2500"]);
        assert_eq!(received.content_types, vec!["application/octet-stream"]);
        assert_eq!(received.body_lengths, vec![1000]);
    }

    #[tokio::test]
    async fn test_byte_progress_reaches_payload_size() {
        let (base, _state) = spawn_server().await;
        let transport = HttpChunkTransport::new(Duration::from_secs(5))
            .unwrap()
            .with_progress_step(1024);
        let destination = Destination::new(format!("{}/upload", base));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let on_progress: ByteProgressFn = Arc::new(move |bytes| sink.lock().push(bytes));

        transport
            .send(
                request(&destination, ByteRange::new(0, 0, 9_999), 10_000),
                on_progress,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 10);
        assert_eq!(*seen.last().unwrap(), 10_000);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_text_body_is_kept() {
        let (base, _state) = spawn_server().await;
        let transport = HttpChunkTransport::new(Duration::from_secs(5)).unwrap();
        let destination = Destination::new(format!("{}/text", base));

        let response = transport
            .send(
                request(&destination, ByteRange::new(0, 0, 99), 300),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            UploadResponse::parse(&response.body),
            UploadResponse::Text("chunk accepted".to_string())
        );
    }

    #[tokio::test]
    async fn test_non_2xx_is_http_status_error() {
        let (base, _state) = spawn_server().await;
        let transport = HttpChunkTransport::new(Duration::from_secs(5)).unwrap();
        let destination = Destination::new(format!("{}/fail", base));

        let err = transport
            .send(
                request(&destination, ByteRange::new(0, 0, 99), 100),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            UploadError::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpChunkTransport::new(Duration::from_secs(5)).unwrap();
        let destination = Destination::new(format!("http://{}/upload", addr));

        let err = transport
            .send(
                request(&destination, ByteRange::new(0, 0, 99), 100),
                noop_progress(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Network(_)));
    }

    #[tokio::test]
    async fn test_abort_settles_in_flight_request() {
        let (base, _state) = spawn_server().await;
        let transport = HttpChunkTransport::new(Duration::from_secs(5)).unwrap();
        let destination = Destination::new(format!("{}/stall", base));

        let abort = CancellationToken::new();
        let trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = transport
            .send(
                request(&destination, ByteRange::new(0, 0, 99), 100),
                noop_progress(),
                &abort,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::Aborted));
    }

    #[test]
    fn test_response_parse_fallback() {
        assert_eq!(
            UploadResponse::parse("not json"),
            UploadResponse::Text("not json".to_string())
        );
        assert!(UploadResponse::parse(r#"{"size":10}"#).as_json().is_some());
    }
}
