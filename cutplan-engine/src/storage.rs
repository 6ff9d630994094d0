use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("drawing {name} not found in {scope}")]
    NotFound { name: String, scope: String },
    #[error("invalid drawing name {0:?}")]
    InvalidName(String),
    #[error("storage access failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 按文件名存取图纸的外部存储：读取源图纸、列出已有文件、上传生成物。
pub trait DrawingStore: Send + Sync {
    fn fetch(&self, name: &str, subfolder: Option<&str>) -> Result<Vec<u8>, StoreError>;

    fn list_names(&self, subfolder: Option<&str>) -> Result<BTreeSet<String>, StoreError>;

    /// 上传本地文件并返回可访问的 URL。
    fn upload(&self, local_path: &Path, name: &str) -> Result<String, StoreError>;
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..");
    if invalid {
        Err(StoreError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

fn scope_label(subfolder: Option<&str>) -> String {
    match subfolder {
        Some(folder) => format!("subfolder {folder:?}"),
        None => "root".to_string(),
    }
}

/// 以目录树模拟云盘：子目录即子文件夹，上传文件落在根目录。
#[derive(Debug, Clone)]
pub struct FsDrawingStore {
    root: PathBuf,
}

impl FsDrawingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scope_dir(&self, subfolder: Option<&str>) -> Result<PathBuf, StoreError> {
        match subfolder {
            Some(folder) => {
                validate_name(folder)?;
                Ok(self.root.join(folder))
            }
            None => Ok(self.root.clone()),
        }
    }
}

impl DrawingStore for FsDrawingStore {
    fn fetch(&self, name: &str, subfolder: Option<&str>) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        let path = self.scope_dir(subfolder)?.join(name);
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(path = %path.display(), size = bytes.len(), "已读取源图纸");
                Ok(bytes)
            }
            Err(source) if source.kind() == ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_string(),
                scope: scope_label(subfolder),
            }),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn list_names(&self, subfolder: Option<&str>) -> Result<BTreeSet<String>, StoreError> {
        let dir = self.scope_dir(subfolder)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(source) => return Err(StoreError::Io { path: dir, source }),
        };

        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
            let is_file = entry
                .file_type()
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if is_file {
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn upload(&self, local_path: &Path, name: &str) -> Result<String, StoreError> {
        validate_name(name)?;
        fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })?;
        let target = self.root.join(name);
        fs::copy(local_path, &target).map_err(|source| StoreError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        let absolute = fs::canonicalize(&target).unwrap_or(target);
        Ok(format!("file://{}", absolute.display()))
    }
}

/// 进程内存储，供嵌入调用方与测试使用；会记录每个名称被读取的次数。
#[derive(Debug, Default)]
pub struct MemoryDrawingStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<(Option<String>, String), Vec<u8>>,
    fetches: HashMap<String, usize>,
    uploads: Vec<String>,
}

impl MemoryDrawingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, subfolder: Option<&str>, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.state().objects.insert(
            (subfolder.map(str::to_string), name.into()),
            bytes.into(),
        );
    }

    pub fn get(&self, subfolder: Option<&str>, name: &str) -> Option<Vec<u8>> {
        self.state()
            .objects
            .get(&(subfolder.map(str::to_string), name.to_string()))
            .cloned()
    }

    /// 指定名称被 `fetch` 成功读取的次数。
    pub fn fetch_count(&self, name: &str) -> usize {
        self.state().fetches.get(name).copied().unwrap_or(0)
    }

    /// 按上传顺序返回上传过的名称。
    pub fn uploaded_names(&self) -> Vec<String> {
        self.state().uploads.clone()
    }
}

impl DrawingStore for MemoryDrawingStore {
    fn fetch(&self, name: &str, subfolder: Option<&str>) -> Result<Vec<u8>, StoreError> {
        validate_name(name)?;
        let mut state = self.state();
        let key = (subfolder.map(str::to_string), name.to_string());
        let bytes = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                name: name.to_string(),
                scope: scope_label(subfolder),
            })?;
        *state.fetches.entry(name.to_string()).or_insert(0) += 1;
        Ok(bytes)
    }

    fn list_names(&self, subfolder: Option<&str>) -> Result<BTreeSet<String>, StoreError> {
        let state = self.state();
        Ok(state
            .objects
            .keys()
            .filter(|(folder, _)| folder.as_deref() == subfolder)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn upload(&self, local_path: &Path, name: &str) -> Result<String, StoreError> {
        validate_name(name)?;
        let bytes = fs::read(local_path).map_err(|source| StoreError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        let mut state = self.state();
        state.objects.insert((None, name.to_string()), bytes);
        state.uploads.push(name.to_string());
        Ok(format!("memory://{name}"))
    }
}
