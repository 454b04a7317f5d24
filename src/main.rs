//! KeyTape - 录下鼠标和键盘，再原样回放
//!
//! 主程序入口，负责：
//! 1. 初始化日志和设置
//! 2. 启动全局输入监听和热键线程
//! 3. 读取上次自动保存的录制
//! 4. 创建托盘并运行主窗口

// Windows: 隐藏控制台窗口
#![cfg_attr(
    all(target_os = "windows", not(debug_assertions)),
    windows_subsystem = "windows"
)]

use std::process;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use log::{error, info, warn};

use keytape::device::EnigoFactory;
use keytape::hook::RdevHook;
use keytape::{config, gui, SessionController, SessionOptions, Settings, SystemTray};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("{} {} 正在启动...", config::APP_NAME, config::APP_VERSION);

    let settings = Settings::load();

    // 全局监听（进程内只有一个），热键动作交给热键线程
    let (hotkey_tx, hotkey_rx) = unbounded();
    let hook = RdevHook::start(hotkey_tx);

    let controller = SessionController::new(
        &settings,
        Arc::new(EnigoFactory),
        Arc::new(hook),
        SessionOptions::default(),
    );

    let hotkeys = controller.clone();
    if let Err(e) = thread::Builder::new()
        .name("keytape-hotkeys".into())
        .spawn(move || hotkeys.serve_hotkeys(hotkey_rx))
    {
        error!("无法启动热键线程: {}", e);
        process::exit(1);
    }

    match controller.load_last() {
        Ok(0) => {}
        Ok(count) => info!("已读取上次的录制（{} 个动作）", count),
        Err(e) => warn!("无法读取上次的录制: {}", e),
    }

    // 托盘不是必需的
    let tray = match SystemTray::new() {
        Ok(t) => Some(t),
        Err(e) => {
            warn!("无法创建系统托盘: {}", e);
            None
        }
    };

    if let Err(e) = gui::run_gui(controller.clone(), tray) {
        error!("界面错误: {}", e);
        controller.shutdown();
        process::exit(1);
    }

    info!("{} 已退出", config::APP_NAME);
}
