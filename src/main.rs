use anyhow::Context;
use clap::{Parser, Subcommand};
use resumable_upload::{
    logging, AppConfig, Destination, HttpChunkTransport, ProgressReport, ResumeStore, StatusTag,
    TransferOrchestrator, UploadResponse,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 大文件分片上传（支持断点续传）
#[derive(Parser, Debug)]
#[command(name = "resumable-upload", version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = "config/app.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 上传文件；中断后重新执行同一命令即可从断点继续
    Upload {
        file: PathBuf,
        /// 上传地址（一次上传会话）
        #[arg(long)]
        url: String,
        /// 服务器侧文件 ID
        #[arg(long)]
        file_id: Option<String>,
    },
    /// 查看文件是否有未完成的上传
    Status { file: PathBuf },
    /// 清除文件的上传断点
    Clear { file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config).await;

    // 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    info!("Resumable Upload v{} 启动", env!("CARGO_PKG_VERSION"));

    let transport = HttpChunkTransport::new(config.upload.connect_timeout())
        .context("创建 HTTP 客户端失败")?;
    let store = Arc::new(ResumeStore::from_config(&config.persistence));

    let orchestrator = TransferOrchestrator::new(config.upload.clone(), Arc::new(transport), store)
        .with_status_callback(Arc::new(|message: &str, tag: StatusTag| match tag {
            StatusTag::Error => error!("{}", message),
            _ => info!("{}", message),
        }))
        .with_progress_callback(Arc::new(print_progress));
    let orchestrator = Arc::new(orchestrator);

    match cli.command {
        Command::Upload { file, url, file_id } => {
            let mut destination = Destination::new(url);
            if let Some(file_id) = file_id {
                destination = destination.with_server_file_id(file_id);
            }

            // Ctrl+C 取消上传，断点保留
            let canceller = orchestrator.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("收到 Ctrl+C，正在取消上传...");
                    canceller.cancel();
                }
            });

            let result = orchestrator.run(&file, &destination).await;
            watcher.abort();
            eprintln!();

            match result {
                Ok(response) => {
                    print_response(&response)?;
                    Ok(())
                }
                Err(e) => {
                    if orchestrator.state().can_resume {
                        warn!("已保存上传进度，重新执行同一命令即可继续上传");
                    }
                    Err(e).with_context(|| format!("上传失败: {:?}", file))
                }
            }
        }
        Command::Status { file } => {
            match orchestrator.prior_attempt(&file).await? {
                Some(checkpoint) => {
                    let written_at = checkpoint
                        .written_at()
                        .map(|t| t.with_timezone(&chrono::Local).to_rfc3339())
                        .unwrap_or_default();
                    println!(
                        "未完成的上传: 已确认 {}/{} 个分片, 上传地址 {}, 记录时间 {}",
                        checkpoint.next_chunk(),
                        checkpoint.total_chunks,
                        checkpoint.upload_url,
                        written_at
                    );
                }
                None => println!("没有未完成的上传"),
            }
            Ok(())
        }
        Command::Clear { file } => {
            orchestrator.clear_progress(&file).await?;
            println!("已清除上传进度");
            Ok(())
        }
    }
}

fn print_progress(report: &ProgressReport) {
    let mut stderr = std::io::stderr().lock();
    let _ = write!(
        stderr,
        "\r{:>3}%  {:>12}  剩余 {:<12}",
        report.percent, report.speed_text, report.eta_text
    );
    let _ = stderr.flush();
}

fn print_response(response: &UploadResponse) -> anyhow::Result<()> {
    match response {
        UploadResponse::Json(value) => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        UploadResponse::Text(text) => println!("{}", text),
        UploadResponse::AlreadyComplete => println!("所有分片此前均已上传完成"),
    }
    Ok(())
}
