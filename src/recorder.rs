//! 录制器
//!
//! 状态机：Idle -> Armed -> Idle。
//!
//! 进入 Armed：清空动作日志，记下起始时间，订阅按键事件，然后每个采样周期
//! 读取一次光标位置并无条件追加一个 `Move`（位置没变也追加，保证回放节奏）。
//! 按键和点击异步到达，只要仍处于 Armed 就追加。
//! 退出时取消订阅，并把日志自动保存到 `last_macro.rec`。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, never, select, tick, Receiver};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::action::{ActionLog, Event};
use crate::config;
use crate::device::InputDevice;
use crate::error::{Error, Result};
use crate::hook::{HookEvent, InputHook};
use crate::persist;

/// 录制开关
///
/// 追加事件时在日志锁内检查；解除也在日志锁内进行，
/// 所以 `disarm` 返回后不会再有事件写入。
#[derive(Clone, Debug)]
pub(crate) struct ArmToken(Arc<AtomicBool>);

impl ArmToken {
    pub fn armed() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn disarm(&self, log: &Mutex<ActionLog>) {
        let _log = log.lock();
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 一次录制的结果
#[derive(Debug, Default)]
pub struct RecordingReport {
    /// 录到的事件数
    pub captured: usize,
    /// 采样失败、自动保存失败等
    pub errors: Vec<Error>,
}

enum Step {
    Stop,
    Sample,
    Hook(HookEvent),
    HookClosed,
}

/// 录制器（一次录制对应一个实例，在后台线程中运行）
pub(crate) struct Recorder {
    log: Arc<Mutex<ActionLog>>,
    armed: ArmToken,
    device: Box<dyn InputDevice>,
    hook: Arc<dyn InputHook>,
    sample_period: Duration,
    autosave: Option<PathBuf>,
    last_event: Instant,
}

impl Recorder {
    pub fn new(
        log: Arc<Mutex<ActionLog>>,
        armed: ArmToken,
        device: Box<dyn InputDevice>,
        hook: Arc<dyn InputHook>,
        sample_period: Duration,
        autosave: Option<PathBuf>,
    ) -> Self {
        Self {
            log,
            armed,
            device,
            hook,
            sample_period,
            autosave,
            last_event: Instant::now(),
        }
    }

    /// 录制直到 `stop` 断开（或收到消息）
    pub fn run(mut self, stop: Receiver<()>) -> RecordingReport {
        let (sink, events) = bounded(config::KEY_CHANNEL_CAPACITY);

        self.log.lock().clear();
        self.last_event = Instant::now();
        self.hook.subscribe_keys(sink);
        info!("开始录制");

        let mut report = RecordingReport::default();
        if let Err(e) = self.capture(events, stop) {
            warn!("录制中断: {}", e);
            self.armed.disarm(&self.log);
            report.errors.push(e);
        }

        self.hook.unsubscribe_keys();

        let snapshot = self.log.lock().clone();
        report.captured = snapshot.len();
        info!("录制结束，共 {} 个动作", report.captured);

        if let Some(path) = &self.autosave {
            if let Err(e) = persist::save(&snapshot, path) {
                warn!("自动保存失败: {}", e);
                report.errors.push(e);
            }
        }

        report
    }

    fn capture(&mut self, mut events: Receiver<HookEvent>, stop: Receiver<()>) -> Result<()> {
        let ticker = tick(self.sample_period);

        loop {
            let step = select! {
                recv(stop) -> _ => Step::Stop,
                recv(ticker) -> _ => Step::Sample,
                recv(events) -> msg => msg.map_or(Step::HookClosed, Step::Hook),
            };

            let appended = match step {
                Step::Stop => break,
                Step::Sample => {
                    let (x, y) = self.device.pointer_position()?;
                    self.push(|delay_ms| Event::Move { x, y, delay_ms })
                }
                Step::Hook(HookEvent::KeyDown(key)) => {
                    trace!("keydown {}", key);
                    self.push(|delay_ms| Event::KeyDown { key, delay_ms })
                }
                Step::Hook(HookEvent::KeyUp(key)) => {
                    trace!("keyup {}", key);
                    self.push(|delay_ms| Event::KeyUp { key, delay_ms })
                }
                Step::Hook(HookEvent::Click) => {
                    let (x, y) = self.device.pointer_position()?;
                    self.push(|delay_ms| Event::Click { x, y, delay_ms })
                }
                Step::HookClosed => {
                    debug!("按键通道已关闭");
                    events = never();
                    true
                }
            };

            if !appended {
                break;
            }
        }

        Ok(())
    }

    /// 追加一个事件，间隔从上一个事件算起；已解除时返回 false
    fn push(&mut self, make: impl FnOnce(f64) -> Event) -> bool {
        let mut log = self.log.lock();
        if !self.armed.is_armed() {
            return false;
        }

        let now = Instant::now();
        let delay_ms = now.duration_since(self.last_event).as_secs_f64() * 1000.0;
        self.last_event = now;
        log.append(make(delay_ms));
        true
    }
}
