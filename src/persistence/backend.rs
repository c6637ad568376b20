//! 断点存储后端
//!
//! 只提供按键的 get / put / delete，校验规则（标识、过期、上传地址）都在
//! [`ResumeStore`](super::ResumeStore) 中实现
//!
//! ## 文件后端
//!
//! 每个键对应一个 JSON 文件：
//! ```text
//! checkpoints/
//! └── upload_progress_{fileIdentity}.json
//! ```
//! 键经过 URL 编码后作为文件名，写入时先写临时文件再原子重命名

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

/// 存储文件扩展名
const CHECKPOINT_EXTENSION: &str = "json";

/// 键值存储接口
pub trait CheckpointBackend: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;

    /// 覆盖写入（后写者胜）
    fn put(&self, key: &str, value: &str) -> io::Result<()>;

    /// 删除键，返回是否存在
    fn delete(&self, key: &str) -> io::Result<bool>;
}

// ============================================================================
// FileBackend
// ============================================================================

/// 目录文件后端
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 键对应的文件路径：`{dir}/{urlencode(key)}.json`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", urlencoding::encode(key), CHECKPOINT_EXTENSION))
    }

    fn ensure_dir(&self) -> io::Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            debug!("已创建断点目录: {:?}", self.dir);
        }
        Ok(())
    }
}

impl CheckpointBackend for FileBackend {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn put(&self, key: &str, value: &str) -> io::Result<()> {
        self.ensure_dir()?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");

        let mut file = File::create(&temp_path)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        debug!("已写入断点: {:?}", path);
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<bool> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("已删除断点: {:?}", path);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// MemoryBackend
// ============================================================================

/// 内存后端（进程退出即丢失）
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CheckpointBackend for MemoryBackend {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> io::Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}
