//! 配置模块
//!
//! 定义 KeyTape 的常量、节拍参数，以及跨次启动保留的用户设置。

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys;

/// 应用名称
pub const APP_NAME: &str = "KeyTape";

/// 应用版本
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 自动保存的文件（工作目录下），录制结束时写入，启动时读取
pub const AUTOSAVE_FILE: &str = "last_macro.rec";

/// 录制文件扩展名
pub const RECORDING_EXTENSION: &str = "rec";

/// 默认热键：开始/停止录制
pub const DEFAULT_RECORD_HOTKEY: &str = "f8";

/// 默认热键：开始回放
pub const DEFAULT_PLAY_HOTKEY: &str = "f9";

/// 菜单提供的回放速度
pub const SPEED_PRESETS: [f64; 5] = [0.5, 1.0, 2.0, 8.0, 100.0];

/// 键盘事件通道容量
pub const KEY_CHANNEL_CAPACITY: usize = 1024;

/// 录制与回放的节拍参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// 录制时采样光标位置的周期
    pub sample_period: Duration,
    /// 暂停时复查状态的间隔（条件变量会提前唤醒）
    pub pause_poll: Duration,
    /// 光标移动时长的下限
    pub min_motion: Duration,
    /// 每个事件回放后的固定间隔
    pub event_pacing: Duration,
    /// 平滑移动时每一步的时长
    pub motion_step: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sample_period: Duration::from_millis(10),
            pause_poll: Duration::from_millis(100),
            min_motion: Duration::from_millis(10),
            event_pacing: Duration::from_millis(10),
            motion_step: Duration::from_millis(16),
        }
    }
}

/// 获取设置文件路径
///
/// Windows: %APPDATA%\KeyTape\settings.json
pub fn get_settings_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_NAME).join("settings.json")
}

/// 用户设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub speed: f64,
    pub repeat_count: u32,
    pub loop_forever: bool,
    pub record_hotkey: String,
    pub play_hotkey: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            repeat_count: 1,
            loop_forever: false,
            record_hotkey: DEFAULT_RECORD_HOTKEY.to_string(),
            play_hotkey: DEFAULT_PLAY_HOTKEY.to_string(),
        }
    }
}

impl Settings {
    /// 从默认位置加载；文件缺失或损坏时使用默认值
    pub fn load() -> Self {
        Self::load_from(&get_settings_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("设置文件不存在，使用默认设置: {:?}", path);
            return Self::default();
        }

        let parsed = File::open(path)
            .map_err(|e| Error::file_io(path, e))
            .and_then(|file| {
                serde_json::from_reader::<_, Settings>(BufReader::new(file))
                    .map_err(|e| Error::format(path, e))
            });

        match parsed {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("设置文件无法读取，使用默认设置: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&get_settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file_io(parent, e))?;
        }
        let file = File::create(path).map_err(|e| Error::file_io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| Error::format(path, e))?;
        writer.flush().map_err(|e| Error::file_io(path, e))?;
        Ok(())
    }

    /// 把越界的值换回默认值
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.speed.is_finite() && self.speed > 0.0) {
            warn!("设置中的速度无效: {}", self.speed);
            self.speed = defaults.speed;
        }
        if self.repeat_count == 0 {
            self.repeat_count = defaults.repeat_count;
        }
        self.record_hotkey = keys::normalize(&self.record_hotkey);
        self.play_hotkey = keys::normalize(&self.play_hotkey);
        if !keys::is_known(&self.record_hotkey)
            || !keys::is_known(&self.play_hotkey)
            || self.record_hotkey == self.play_hotkey
        {
            warn!("设置中的热键无效，恢复为 F8/F9");
            self.record_hotkey = defaults.record_hotkey;
            self.play_hotkey = defaults.play_hotkey;
        }
        self
    }
}
