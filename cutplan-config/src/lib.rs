use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub naming: NamingConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `CUTPLAN_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("CUTPLAN_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 图纸存储：源图纸位于 `root/source_subfolder`，成品上传到 `root`。
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_root")]
    pub root: PathBuf,
    #[serde(default = "StorageConfig::default_source_subfolder")]
    pub source_subfolder: String,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl StorageConfig {
    fn default_root() -> PathBuf {
        PathBuf::from("drive")
    }

    fn default_source_subfolder() -> String {
        "arquivos padronizados".to_string()
    }

    /// 上传前生成文件的目录，未配置时使用系统临时目录下的 `cutplan`。
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("cutplan"))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            source_subfolder: Self::default_source_subfolder(),
            work_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamingConfig {
    #[serde(default = "NamingConfig::default_prefix")]
    pub prefix: String,
    /// chrono 格式串。
    #[serde(default = "NamingConfig::default_date_format")]
    pub date_format: String,
}

impl NamingConfig {
    fn default_prefix() -> String {
        "Plano de corte".to_string()
    }

    fn default_date_format() -> String {
        "%d-%m-%Y".to_string()
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
            date_format: Self::default_date_format(),
        }
    }
}

/// 机台规格，对应每张板的标签位数量。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum GridSize {
    #[default]
    #[serde(rename = "18")]
    Slots18,
    #[serde(rename = "32")]
    Slots32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposerConfig {
    #[serde(default)]
    pub default_grid: GridSize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "PreviewConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "PreviewConfig::default_width_px")]
    pub width_px: u32,
    #[serde(default = "PreviewConfig::default_margin_px")]
    pub margin_px: u32,
    #[serde(default = "PreviewConfig::default_font_paths")]
    pub font_paths: Vec<PathBuf>,
}

impl PreviewConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_width_px() -> u32 {
        1200
    }

    fn default_margin_px() -> u32 {
        100
    }

    fn default_font_paths() -> Vec<PathBuf> {
        [
            "./DejaVuSans.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/freefont/FreeSans.ttf",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect()
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            width_px: Self::default_width_px(),
            margin_px: Self::default_margin_px(),
            font_paths: Self::default_font_paths(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_returned_when_file_missing() {
        let cfg = AppConfig::discover().expect("discover should succeed");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.storage.root, PathBuf::from("drive"));
        assert_eq!(cfg.storage.source_subfolder, "arquivos padronizados");
        assert!(cfg.storage.work_dir.is_none());
        assert_eq!(cfg.naming.prefix, "Plano de corte");
        assert_eq!(cfg.naming.date_format, "%d-%m-%Y");
        assert_eq!(cfg.composer.default_grid, GridSize::Slots18);
        assert!(cfg.preview.enabled);
        assert_eq!(cfg.preview.width_px, 1200);
        assert_eq!(cfg.preview.margin_px, 100);
        assert_eq!(cfg.preview.font_paths.len(), 4);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [storage]
            root = "/srv/drive"
            work_dir = "/tmp/planos"

            [naming]
            prefix = "Plano"

            [composer]
            default_grid = "32"

            [preview]
            enabled = false
            font_paths = ["fonts/Custom.ttf"]
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.storage.root, PathBuf::from("/srv/drive"));
        // 未给出的字段保留默认值
        assert_eq!(cfg.storage.source_subfolder, "arquivos padronizados");
        assert_eq!(cfg.storage.resolved_work_dir(), PathBuf::from("/tmp/planos"));
        assert_eq!(cfg.naming.prefix, "Plano");
        assert_eq!(cfg.naming.date_format, "%d-%m-%Y");
        assert_eq!(cfg.composer.default_grid, GridSize::Slots32);
        assert!(!cfg.preview.enabled);
        assert_eq!(cfg.preview.width_px, 1200);
        assert_eq!(cfg.preview.font_paths, vec![PathBuf::from("fonts/Custom.ttf")]);
    }

    #[test]
    fn unknown_grid_size_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "[composer]\ndefault_grid = \"24\"").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn work_dir_falls_back_to_temp_dir() {
        let storage = StorageConfig::default();
        assert_eq!(storage.resolved_work_dir(), env::temp_dir().join("cutplan"));
    }
}
