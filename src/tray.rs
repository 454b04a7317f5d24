//! 系统托盘模块
//!
//! 在系统托盘显示图标，菜单只有一个「Quit」。
//! 菜单事件由界面每帧轮询。

use crossbeam_channel::Receiver;
use tray_icon::{
    menu::{Menu, MenuEvent, MenuItem},
    Icon, TrayIcon, TrayIconBuilder,
};

use crate::config;

/// 托盘菜单事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayEvent {
    /// 停止一切并退出
    Quit,
}

/// 系统托盘
pub struct SystemTray {
    _tray_icon: TrayIcon,
    quit: MenuItem,
}

impl SystemTray {
    /// 创建系统托盘
    pub fn new() -> Result<Self, String> {
        let menu = Menu::new();
        let quit = MenuItem::new("Quit", true, None);
        menu.append(&quit).map_err(|e| format!("菜单错误: {}", e))?;

        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(config::APP_NAME)
            .with_icon(create_icon()?)
            .build()
            .map_err(|e| format!("无法创建托盘图标: {}", e))?;

        Ok(Self {
            _tray_icon: tray_icon,
            quit,
        })
    }

    /// 把菜单事件翻译成 [`TrayEvent`]
    pub fn handle_menu_event(&self, event: &MenuEvent) -> Option<TrayEvent> {
        if event.id == self.quit.id() {
            Some(TrayEvent::Quit)
        } else {
            None
        }
    }
}

/// 16x16 的蓝色圆形图标
fn create_icon() -> Result<Icon, String> {
    let size = 16;
    let mut rgba = Vec::with_capacity(size * size * 4);

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - 7.5;
            let dy = y as f32 - 7.5;
            if (dx * dx + dy * dy).sqrt() < 7.0 {
                rgba.extend_from_slice(&[0, 102, 204, 255]);
            } else {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
            }
        }
    }

    Icon::from_rgba(rgba, size as u32, size as u32).map_err(|e| format!("无法创建图标: {}", e))
}

/// 获取菜单事件接收器
pub fn menu_event_receiver() -> Receiver<MenuEvent> {
    MenuEvent::receiver().clone()
}
