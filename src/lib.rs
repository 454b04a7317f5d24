//! KeyTape - 录下鼠标和键盘，再原样回放
//!
//! 系统级输入录制/回放工具。
//!
//! # 核心功能
//! - 录制：周期采样光标位置，异步记录按键和左键点击，每个动作带上距前一个动作的间隔
//! - 回放：按录制顺序重现动作，光标移动按速度缩放，支持重复、循环、暂停和停止
//! - 保存：动作日志以 JSON 保存为 `.rec` 文件，录制结束时自动保存
//! - 热键：默认 F8 开始/停止录制，F9 开始回放，可以重新绑定
//!
//! # 模块说明
//! - `action`: 动作和动作日志
//! - `recorder`: 录制器
//! - `player`: 回放器
//! - `persist`: `.rec` 文件读写
//! - `session`: 会话控制器（核心模块）
//! - `device`: 输入设备（enigo）
//! - `hook`: 全局输入监听（rdev）
//! - `keys`: 按键名称
//! - `config`: 配置项和用户设置
//! - `error`: 错误类型
//! - `tray`: 系统托盘
//! - `gui`: 主窗口

pub mod action;
pub mod config;
pub mod device;
pub mod error;
pub mod gui;
pub mod hook;
pub mod keys;
pub mod persist;
pub mod player;
pub mod recorder;
pub mod session;
pub mod tray;

// 重新导出常用类型
pub use action::{ActionLog, Event};
pub use config::Settings;
pub use error::{Error, Result};
pub use session::{SessionController, SessionOptions, SessionUpdate, Status};
pub use tray::{SystemTray, TrayEvent};
