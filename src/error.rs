//! 错误类型
//!
//! 所有错误都在会话控制器边界被消化，转成用户可见的提示，不会让进程退出。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// KeyTape 的统一错误
#[derive(Debug, Error)]
pub enum Error {
    /// 用户输入不合法（例如重复次数不是数字）
    #[error("{0}")]
    InvalidInput(String),

    /// 请求回放，但没有录制任何动作
    #[error("No recorded actions found!")]
    EmptyLog,

    /// 打开/保存文件失败
    #[error("cannot access {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 文件内容无法解析（包括未知的事件标签）
    #[error("malformed file {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 录制与回放互斥
    #[error("{0}")]
    ConcurrentModeConflict(&'static str),

    /// 模拟输入或读取光标失败
    #[error("input device error: {0}")]
    Device(String),
}

impl Error {
    /// 提示框标题
    pub fn title(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "Invalid",
            Error::EmptyLog => "No actions",
            Error::FileIo { .. } | Error::Format { .. } => "File error",
            Error::ConcurrentModeConflict(_) => "Busy",
            Error::Device(_) => "Device error",
        }
    }

    pub(crate) fn file_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::FileIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Format {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
