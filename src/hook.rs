//! 全局输入监听
//!
//! 使用 rdev 监听系统级键盘和鼠标事件，并分发到两个地方：
//! - 热键（录制/回放开关）发送到热键通道
//! - 其余按键和左键点击发送给当前正在录制的录制器
//!
//! `rdev::listen` 会永久阻塞且无法取消，所以监听线程只启动一次，
//! 之后每次录制只替换接收端。

use std::collections::HashSet;
use std::sync::Once;
use std::thread;

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rdev::{Button, EventType};

use crate::keys;

/// 录制器关心的输入事件
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    KeyDown(String),
    KeyUp(String),
    /// 左键按下（位置由录制器采样）
    Click,
}

/// 热键触发的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleRecording,
    StartPlayback,
}

/// 当前生效的两个热键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBindings {
    pub record: String,
    pub play: String,
}

impl HotkeyBindings {
    pub fn new(record: &str, play: &str) -> Self {
        Self {
            record: keys::normalize(record),
            play: keys::normalize(play),
        }
    }

    pub fn action_for(&self, key: &str) -> Option<HotkeyAction> {
        if key == self.record {
            Some(HotkeyAction::ToggleRecording)
        } else if key == self.play {
            Some(HotkeyAction::StartPlayback)
        } else {
            None
        }
    }
}

/// 系统钩子的抽象
pub trait InputHook: Send + Sync {
    /// 开始把按键/点击转发到 `sink`（替换之前的订阅）
    fn subscribe_keys(&self, sink: Sender<HookEvent>);
    fn unsubscribe_keys(&self);
    /// 注册热键（替换之前的热键）
    fn bind_hotkeys(&self, bindings: &HotkeyBindings);
    fn unbind_hotkeys(&self);
}

/// 当前录制器的接收端
static KEY_SINK: Lazy<Mutex<Option<Sender<HookEvent>>>> = Lazy::new(|| Mutex::new(None));

/// 当前热键
static HOTKEYS: Lazy<Mutex<Option<HotkeyBindings>>> = Lazy::new(|| Mutex::new(None));

/// 热键动作的接收端
static HOTKEY_SINK: Lazy<Mutex<Option<Sender<HotkeyAction>>>> = Lazy::new(|| Mutex::new(None));

static LISTENER: Once = Once::new();

/// 一次 rdev 事件的去向
#[derive(Debug, PartialEq)]
enum Route {
    Hotkey(HotkeyAction),
    Forward(HookEvent),
    Ignore,
}

/// 事件路由
///
/// 热键本身的按下/松开不转发给录制器；按住热键时的自动重复只触发一次。
#[derive(Default)]
struct Router {
    held_hotkeys: HashSet<String>,
}

impl Router {
    fn route(&mut self, event_type: &EventType, bindings: Option<&HotkeyBindings>) -> Route {
        match event_type {
            EventType::KeyPress(key) => {
                let Some(name) = keys::name_of(*key) else {
                    debug!("忽略无法回放的按键: {:?}", key);
                    return Route::Ignore;
                };
                match bindings.and_then(|b| b.action_for(&name)) {
                    Some(action) => {
                        if self.held_hotkeys.insert(name) {
                            Route::Hotkey(action)
                        } else {
                            Route::Ignore
                        }
                    }
                    None => Route::Forward(HookEvent::KeyDown(name)),
                }
            }
            EventType::KeyRelease(key) => {
                let Some(name) = keys::name_of(*key) else {
                    return Route::Ignore;
                };
                let was_hotkey = self.held_hotkeys.remove(&name);
                if was_hotkey || bindings.and_then(|b| b.action_for(&name)).is_some() {
                    Route::Ignore
                } else {
                    Route::Forward(HookEvent::KeyUp(name))
                }
            }
            EventType::ButtonPress(Button::Left) => Route::Forward(HookEvent::Click),
            _ => Route::Ignore,
        }
    }

    fn dispatch(&mut self, event: rdev::Event) {
        let route = {
            let bindings = HOTKEYS.lock();
            self.route(&event.event_type, bindings.as_ref())
        };

        match route {
            Route::Hotkey(action) => {
                debug!("热键触发: {:?}", action);
                if let Some(sink) = HOTKEY_SINK.lock().as_ref() {
                    let _ = sink.send(action);
                }
            }
            Route::Forward(hook_event) => {
                if let Some(sink) = KEY_SINK.lock().as_ref() {
                    if let Err(TrySendError::Full(dropped)) = sink.try_send(hook_event) {
                        warn!("录制通道已满，丢弃事件: {:?}", dropped);
                    }
                }
            }
            Route::Ignore => {}
        }
    }
}

/// 基于 rdev 的全局钩子
pub struct RdevHook;

impl RdevHook {
    /// 启动监听线程（进程内只启动一次），热键动作发送到 `hotkeys`
    pub fn start(hotkeys: Sender<HotkeyAction>) -> Self {
        *HOTKEY_SINK.lock() = Some(hotkeys);

        LISTENER.call_once(|| {
            let spawned = thread::Builder::new()
                .name("keytape-hook".into())
                .spawn(|| {
                    let mut router = Router::default();
                    if let Err(e) = rdev::listen(move |event| router.dispatch(event)) {
                        error!("全局监听失败: {:?}", e);
                    }
                });
            match spawned {
                Ok(_) => info!("全局监听线程已启动"),
                Err(e) => error!("无法启动全局监听线程: {}", e),
            }
        });

        Self
    }
}

impl InputHook for RdevHook {
    fn subscribe_keys(&self, sink: Sender<HookEvent>) {
        *KEY_SINK.lock() = Some(sink);
    }

    fn unsubscribe_keys(&self) {
        *KEY_SINK.lock() = None;
    }

    fn bind_hotkeys(&self, bindings: &HotkeyBindings) {
        info!("热键: 录制 = {}, 回放 = {}", bindings.record, bindings.play);
        *HOTKEYS.lock() = Some(bindings.clone());
    }

    fn unbind_hotkeys(&self) {
        *HOTKEYS.lock() = None;
    }
}
