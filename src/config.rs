//! 配置模块，负责加载JSON配置文件

use crate::event_clause::EventSource;
use crate::operator::{FieldType, OperatorVocabulary, SqlDialect};
use crate::sql_compiler::{CompilerConfig, SqlCompiler};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "segment_config.json";

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 表结构：字段名到字段类型的映射
pub type TableSchema = BTreeMap<String, FieldType>;

/// 预览/计数语句的默认设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub limit: u64,
    pub dialect: SqlDialect,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            dialect: SqlDialect::default(),
        }
    }
}

/// 分段SQL配置，所有部分都是可选的
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// 表名到表结构的映射，用于校验
    pub datasets: BTreeMap<String, TableSchema>,
    /// 事件表及其时间戳列
    pub events: EventSource,
    pub preview: PreviewConfig,
    /// 按字段类型覆盖内置的运算符列表
    pub operators: OperatorVocabulary,
}

impl SegmentConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    /// 获取表结构；未配置的表返回 `None`
    pub fn schema_for(&self, table: &str) -> Option<&TableSchema> {
        self.datasets.get(table)
    }

    pub fn field_type(&self, table: &str, field: &str) -> Option<FieldType> {
        self.schema_for(table)?.get(field).copied()
    }

    /// 按配置创建SQL编译器
    pub fn compiler(&self) -> SqlCompiler {
        SqlCompiler::from_config(CompilerConfig {
            event_source: self.events.clone(),
            dialect: self.preview.dialect,
        })
    }
}
