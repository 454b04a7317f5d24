//! 输入设备
//!
//! 读取光标位置、模拟光标移动、点击和按键。
//! 设备句柄不跨线程共享：每次录制/回放在自己的线程里通过 [`DeviceFactory`] 打开一个。

use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings as EnigoSettings};
use log::trace;

use crate::error::{Error, Result};
use crate::keys;

/// 设备操作
pub trait InputDevice {
    /// 当前光标位置
    fn pointer_position(&mut self) -> Result<(i32, i32)>;
    /// 把光标移动到 (x, y)
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<()>;
    /// 在 (x, y) 左键单击
    fn click_at(&mut self, x: i32, y: i32) -> Result<()>;
    fn key_down(&mut self, key: &str) -> Result<()>;
    fn key_up(&mut self, key: &str) -> Result<()>;
}

/// 为后台线程打开设备
pub trait DeviceFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn InputDevice>>;
}

/// 基于 enigo 的系统设备
pub struct EnigoDevice {
    enigo: Enigo,
}

impl EnigoDevice {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&EnigoSettings::default())
            .map_err(|e| Error::Device(format!("无法连接输入设备: {e}")))?;
        Ok(Self { enigo })
    }

    fn key(&mut self, name: &str, direction: Direction) -> Result<()> {
        let key = keys::to_enigo(name)
            .ok_or_else(|| Error::Device(format!("unknown key \"{name}\"")))?;
        trace!("key {:?} {:?}", key, direction);
        self.enigo
            .key(key, direction)
            .map_err(|e| Error::Device(format!("key \"{name}\": {e}")))
    }
}

impl InputDevice for EnigoDevice {
    fn pointer_position(&mut self) -> Result<(i32, i32)> {
        self.enigo
            .location()
            .map_err(|e| Error::Device(format!("pointer position: {e}")))
    }

    fn move_cursor(&mut self, x: i32, y: i32) -> Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| Error::Device(format!("move to ({x}, {y}): {e}")))
    }

    fn click_at(&mut self, x: i32, y: i32) -> Result<()> {
        self.move_cursor(x, y)?;
        self.enigo
            .button(Button::Left, Direction::Click)
            .map_err(|e| Error::Device(format!("click at ({x}, {y}): {e}")))
    }

    fn key_down(&mut self, key: &str) -> Result<()> {
        self.key(key, Direction::Press)
    }

    fn key_up(&mut self, key: &str) -> Result<()> {
        self.key(key, Direction::Release)
    }
}

/// 打开 [`EnigoDevice`] 的工厂
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoFactory;

impl DeviceFactory for EnigoFactory {
    fn connect(&self) -> Result<Box<dyn InputDevice>> {
        Ok(Box::new(EnigoDevice::new()?))
    }
}
