//! 会话控制器
//!
//! 独占会话状态（录制/回放/暂停、速度、重复次数、循环、热键、进度），
//! 界面和热键的所有请求都经过这里：
//! - 录制和回放互斥，冲突的请求被拒绝且不改变状态
//! - 录制器和回放器各自在按需启动的后台线程中运行
//! - 每次状态变化都通过通道发布给界面
//!
//! 暂停和停止通过同一个条件变量唤醒回放线程，停止会立即生效。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::action::ActionLog;
use crate::config::{self, Settings, Timing};
use crate::device::DeviceFactory;
use crate::error::{Error, Result};
use crate::hook::{HotkeyAction, HotkeyBindings, InputHook};
use crate::keys;
use crate::persist;
use crate::player::{Halted, PlaybackHost, PlaybackOutcome, Player};
use crate::recorder::{ArmToken, Recorder, RecordingReport};

/// 给界面显示的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Recording,
    Playing,
    Paused,
    Stopped,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Idle => "Idle",
            Status::Recording => "Recording",
            Status::Playing => "Playing",
            Status::Paused => "Paused",
            Status::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 内部运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Recording,
    Playing,
    Paused,
}

impl Phase {
    fn is_playing(self) -> bool {
        matches!(self, Phase::Playing | Phase::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
}

/// 用户可见的提示
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    fn info(title: &str, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.to_string(),
            message: message.into(),
        }
    }
}

impl From<&Error> for Notice {
    fn from(e: &Error) -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: e.title().to_string(),
            message: e.to_string(),
        }
    }
}

/// 发布给界面的更新
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Status { status: Status, progress: u8 },
    Notice(Notice),
}

/// 会话状态的只读快照
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub armed: bool,
    pub playing: bool,
    pub paused: bool,
    pub speed: f64,
    pub repeat_count: u32,
    pub loop_forever: bool,
    pub hotkeys: HotkeyBindings,
    pub progress: u8,
    pub status: Status,
    pub actions: usize,
    /// 录制总时长（毫秒）
    pub recorded_ms: f64,
}

/// 控制器选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timing: Timing,
    /// 录制结束时自动保存的位置，`None` 表示不保存
    pub autosave_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timing: Timing::default(),
            autosave_path: Some(PathBuf::from(config::AUTOSAVE_FILE)),
        }
    }
}

/// 进行中的录制
struct ActiveRecording {
    armed: ArmToken,
    /// 丢弃即通知录制线程退出
    _stop: Sender<()>,
}

struct SessionState {
    phase: Phase,
    status: Status,
    speed: f64,
    repeat_count: u32,
    loop_forever: bool,
    hotkeys: HotkeyBindings,
    progress: u8,
    /// 每次启动录制/回放加一，旧线程据此判断自己是否已过期
    generation: u64,
    recording: Option<ActiveRecording>,
    recorder_thread: Option<JoinHandle<()>>,
    player_thread: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<SessionState>,
    wake: Condvar,
    log: Arc<Mutex<ActionLog>>,
    devices: Arc<dyn DeviceFactory>,
    hook: Arc<dyn InputHook>,
    options: SessionOptions,
    updates_tx: Sender<SessionUpdate>,
    updates_rx: Receiver<SessionUpdate>,
}

impl Inner {
    fn publish(&self, update: SessionUpdate) {
        let _ = self.updates_tx.send(update);
    }

    fn publish_status(&self, state: &SessionState) {
        self.publish(SessionUpdate::Status {
            status: state.status,
            progress: state.progress,
        });
    }

    fn notify(&self, notice: Notice) {
        self.publish(SessionUpdate::Notice(notice));
    }

    fn notify_error(&self, e: &Error) {
        warn!("{}: {}", e.title(), e);
        self.notify(Notice::from(e));
    }

    fn enter(&self, state: &mut SessionState, phase: Phase, status: Status) {
        debug!("{:?} -> {:?}", state.phase, phase);
        state.phase = phase;
        state.status = status;
        self.publish_status(state);
        self.wake.notify_all();
    }

    fn recording_finished(&self, generation: u64, report: RecordingReport) {
        for e in &report.errors {
            self.notify_error(e);
        }

        let mut state = self.state.lock();
        if state.generation == generation && state.phase == Phase::Recording {
            // 录制器自己退出（设备错误）
            state.recording = None;
            self.enter(&mut state, Phase::Idle, Status::Idle);
        }
    }

    fn playback_finished(&self, generation: u64, result: Result<PlaybackOutcome>) {
        let mut state = self.state.lock();
        let current = state.generation == generation && state.phase.is_playing();

        match result {
            Ok(PlaybackOutcome::Completed { dispatched }) => {
                info!("回放完成，共 {} 个动作", dispatched);
                if current {
                    state.progress = 100;
                    self.enter(&mut state, Phase::Idle, Status::Idle);
                }
            }
            Ok(PlaybackOutcome::Stopped { dispatched }) => {
                info!("回放已停止，已执行 {} 个动作", dispatched);
            }
            Err(e) => {
                if current {
                    self.enter(&mut state, Phase::Idle, Status::Idle);
                }
                drop(state);
                self.notify_error(&e);
            }
        }
    }
}

/// 回放线程看到的控制器
struct RunLink {
    inner: Arc<Inner>,
    generation: u64,
}

impl RunLink {
    fn halted(&self, state: &SessionState) -> bool {
        state.generation != self.generation || !state.phase.is_playing()
    }
}

impl PlaybackHost for RunLink {
    fn wait_while_paused(&self) -> std::result::Result<(), Halted> {
        let mut state = self.inner.state.lock();
        loop {
            if self.halted(&state) {
                return Err(Halted);
            }
            if state.phase != Phase::Paused {
                return Ok(());
            }
            self.inner
                .wake
                .wait_for(&mut state, self.inner.options.timing.pause_poll);
        }
    }

    fn sleep(&self, duration: Duration) -> std::result::Result<(), Halted> {
        let deadline = Instant::now() + duration;
        let mut state = self.inner.state.lock();
        loop {
            if self.halted(&state) {
                return Err(Halted);
            }
            if Instant::now() >= deadline {
                return Ok(());
            }
            self.inner.wake.wait_until(&mut state, deadline);
        }
    }

    fn speed(&self) -> f64 {
        self.inner.state.lock().speed
    }

    fn loop_forever(&self) -> bool {
        self.inner.state.lock().loop_forever
    }

    fn report_progress(&self, percent: u8) {
        let mut state = self.inner.state.lock();
        if !self.halted(&state) && state.progress != percent {
            state.progress = percent;
            self.inner.publish_status(&state);
        }
    }
}

/// 会话控制器（可廉价克隆，界面和热键线程各持一份）
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        settings: &Settings,
        devices: Arc<dyn DeviceFactory>,
        hook: Arc<dyn InputHook>,
        options: SessionOptions,
    ) -> Self {
        let hotkeys = HotkeyBindings::new(&settings.record_hotkey, &settings.play_hotkey);
        hook.bind_hotkeys(&hotkeys);

        let (updates_tx, updates_rx) = unbounded();
        let state = SessionState {
            phase: Phase::Idle,
            status: Status::Idle,
            speed: settings.speed,
            repeat_count: settings.repeat_count.max(1),
            loop_forever: settings.loop_forever,
            hotkeys,
            progress: 0,
            generation: 0,
            recording: None,
            recorder_thread: None,
            player_thread: None,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                wake: Condvar::new(),
                log: Arc::new(Mutex::new(ActionLog::new())),
                devices,
                hook,
                options,
                updates_tx,
                updates_rx,
            }),
        }
    }

    /// 状态更新通道（只应有一个消费者：界面）
    pub fn updates(&self) -> Receiver<SessionUpdate> {
        self.inner.updates_rx.clone()
    }

    /// 出错时发布提示，再把结果原样返回
    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.inner.notify_error(e);
        }
        result
    }

    // ---------------------------------------------------------------
    // 录制
    // ---------------------------------------------------------------

    /// 开始或停止录制；返回之后是否处于录制中
    pub fn toggle_recording(&self) -> Result<bool> {
        let result = {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::Recording => {
                    self.stop_recording_locked(&mut state);
                    Ok(false)
                }
                Phase::Playing | Phase::Paused => Err(Error::ConcurrentModeConflict(
                    "Cannot start recording while playback is running.",
                )),
                Phase::Idle => self.start_recording_locked(&mut state).map(|()| true),
            }
        };
        self.report(result)
    }

    fn start_recording_locked(&self, state: &mut SessionState) -> Result<()> {
        state.generation += 1;
        let generation = state.generation;
        let armed = ArmToken::armed();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let previous = state.recorder_thread.take();

        let inner = Arc::clone(&self.inner);
        let token = armed.clone();
        let handle = thread::Builder::new()
            .name("keytape-recorder".into())
            .spawn(move || {
                // 上一次录制可能还在自动保存
                if let Some(previous) = previous {
                    let _ = previous.join();
                }
                let report = match inner.devices.connect() {
                    Ok(device) => Recorder::new(
                        Arc::clone(&inner.log),
                        token,
                        device,
                        Arc::clone(&inner.hook),
                        inner.options.timing.sample_period,
                        inner.options.autosave_path.clone(),
                    )
                    .run(stop_rx),
                    Err(e) => RecordingReport {
                        captured: 0,
                        errors: vec![e],
                    },
                };
                inner.recording_finished(generation, report);
            })
            .map_err(|e| Error::Device(format!("cannot start recorder thread: {e}")))?;

        state.recorder_thread = Some(handle);
        state.recording = Some(ActiveRecording {
            armed,
            _stop: stop_tx,
        });
        state.progress = 0;
        info!("录制开始");
        self.inner.enter(state, Phase::Recording, Status::Recording);
        self.inner.notify(Notice::info(
            "Recording",
            format!(
                "Recording started. Press {} again to stop.",
                state.hotkeys.record.to_uppercase()
            ),
        ));
        Ok(())
    }

    fn stop_recording_locked(&self, state: &mut SessionState) {
        if let Some(recording) = state.recording.take() {
            recording.armed.disarm(&self.inner.log);
        }
        info!("录制停止");
        self.inner.enter(state, Phase::Idle, Status::Idle);
    }

    // ---------------------------------------------------------------
    // 回放
    // ---------------------------------------------------------------

    pub fn start_playback(&self) -> Result<()> {
        let result = self.try_start_playback();
        self.report(result)
    }

    fn try_start_playback(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match state.phase {
            Phase::Recording => {
                return Err(Error::ConcurrentModeConflict(
                    "Cannot start playback while recording.",
                ))
            }
            Phase::Playing | Phase::Paused => {
                return Err(Error::ConcurrentModeConflict("Playback is already running."))
            }
            Phase::Idle => {}
        }

        let events = self.inner.log.lock().snapshot();
        if events.is_empty() {
            return Err(Error::EmptyLog);
        }

        state.generation += 1;
        let generation = state.generation;
        let repeat_count = state.repeat_count;
        let timing = self.inner.options.timing;
        let previous = state.player_thread.take();

        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("keytape-player".into())
            .spawn(move || {
                // 上一次回放已被停止，最多再等一个节拍
                if let Some(previous) = previous {
                    let _ = previous.join();
                }
                let link = RunLink {
                    inner: Arc::clone(&inner),
                    generation,
                };
                let result = inner
                    .devices
                    .connect()
                    .and_then(|device| Player::new(events, repeat_count, device, timing).run(&link));
                inner.playback_finished(generation, result);
            })
            .map_err(|e| Error::Device(format!("cannot start player thread: {e}")))?;

        state.player_thread = Some(handle);
        state.progress = 0;
        self.inner.enter(&mut state, Phase::Playing, Status::Playing);
        Ok(())
    }

    /// 停止回放；没有回放时返回 false
    pub fn stop_playback(&self) -> bool {
        let mut state = self.inner.state.lock();
        if !state.phase.is_playing() {
            debug!("没有正在进行的回放");
            return false;
        }
        info!("回放停止");
        self.inner.enter(&mut state, Phase::Idle, Status::Stopped);
        true
    }

    /// 暂停回放（在下一个事件边界生效）
    pub fn pause_playback(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Playing {
            debug!("没有可暂停的回放");
            return false;
        }
        self.inner.enter(&mut state, Phase::Paused, Status::Paused);
        true
    }

    pub fn resume_playback(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Paused {
            debug!("没有可恢复的回放");
            return false;
        }
        self.inner.enter(&mut state, Phase::Playing, Status::Playing);
        true
    }

    // ---------------------------------------------------------------
    // 设置
    // ---------------------------------------------------------------

    pub fn set_speed(&self, multiplier: f64) -> Result<()> {
        let result = if multiplier.is_finite() && multiplier > 0.0 {
            self.inner.state.lock().speed = multiplier;
            info!("回放速度: x{}", multiplier);
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "Speed must be a positive number, got {multiplier}."
            )))
        };
        self.report(result)
    }

    pub fn set_repeat_count(&self, count: u32) -> Result<()> {
        let result = if count >= 1 {
            self.inner.state.lock().repeat_count = count;
            info!("重复次数: {}", count);
            Ok(())
        } else {
            Err(Error::InvalidInput(
                "Repeat count must be at least 1.".to_string(),
            ))
        };
        self.report(result)
    }

    /// 解析界面输入的重复次数；非数字输入被拒绝且不改变状态
    pub fn set_repeat_count_from_input(&self, input: &str) -> Result<u32> {
        let trimmed = input.trim();
        let parsed = if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            trimmed.parse::<u32>().ok().filter(|n| *n >= 1)
        } else {
            None
        };

        match parsed {
            Some(count) => self.set_repeat_count(count).map(|()| count),
            None => self.report(Err(Error::InvalidInput(
                "Please enter a valid number.".to_string(),
            ))),
        }
    }

    /// 切换循环模式，返回切换后的值
    pub fn toggle_loop(&self) -> bool {
        let enabled = {
            let mut state = self.inner.state.lock();
            state.loop_forever = !state.loop_forever;
            state.loop_forever
        };
        info!("循环: {}", enabled);
        self.inner.notify(Notice::info(
            "Loop",
            format!("Loop is now {}", if enabled { "ON" } else { "OFF" }),
        ));
        enabled
    }

    /// 重新绑定两个热键；空字符串表示保留原热键
    ///
    /// 先注销旧热键再注册新热键，任何时刻都不会同时存在两套。
    pub fn rebind_hotkeys(&self, record: &str, play: &str) -> Result<HotkeyBindings> {
        let result = {
            let mut state = self.inner.state.lock();
            let pick = |input: &str, current: &str| {
                if input.trim().is_empty() {
                    current.to_string()
                } else {
                    keys::normalize(input)
                }
            };
            let bindings = HotkeyBindings {
                record: pick(record, &state.hotkeys.record),
                play: pick(play, &state.hotkeys.play),
            };

            let unknown = [&bindings.record, &bindings.play]
                .into_iter()
                .find(|k| !keys::is_known(k))
                .cloned();
            if let Some(unknown) = unknown {
                Err(Error::InvalidInput(format!("Unknown key \"{unknown}\".")))
            } else if bindings.record == bindings.play {
                Err(Error::InvalidInput(
                    "Record and play hotkeys must be different.".to_string(),
                ))
            } else {
                self.inner.hook.unbind_hotkeys();
                self.inner.hook.bind_hotkeys(&bindings);
                state.hotkeys = bindings.clone();
                Ok(bindings)
            }
        };

        if let Ok(bindings) = &result {
            self.inner.notify(Notice::info(
                "Hotkeys",
                format!(
                    "New Hotkeys Set:\nRecord = {}\nPlay = {}",
                    bindings.record.to_uppercase(),
                    bindings.play.to_uppercase()
                ),
            ));
        }
        self.report(result)
    }

    // ---------------------------------------------------------------
    // 文件
    // ---------------------------------------------------------------

    /// 打开录制文件，整体替换当前日志；失败时保留原日志
    pub fn open(&self, path: &Path) -> Result<usize> {
        let result = {
            let state = self.inner.state.lock();
            if state.phase == Phase::Recording {
                Err(Error::ConcurrentModeConflict(
                    "Cannot open a file while recording.",
                ))
            } else {
                persist::load(path).map(|loaded| {
                    let count = loaded.len();
                    self.inner.log.lock().replace(loaded);
                    count
                })
            }
        };
        self.report(result)
    }

    /// 把当前日志保存到文件
    pub fn save(&self, path: &Path) -> Result<usize> {
        let snapshot = self.inner.log.lock().clone();
        let result = persist::save(&snapshot, path).map(|()| snapshot.len());
        self.report(result)
    }

    /// 启动时读取自动保存的文件（不存在时什么也不做）
    pub fn load_last(&self) -> Result<usize> {
        let Some(path) = self.inner.options.autosave_path.clone() else {
            return Ok(0);
        };
        let result = persist::load_if_exists(&path).map(|loaded| match loaded {
            Some(log) => {
                let count = log.len();
                self.inner.log.lock().replace(log);
                count
            }
            None => 0,
        });
        self.report(result)
    }

    // ---------------------------------------------------------------
    // 查询与退出
    // ---------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.lock();
        let log = self.inner.log.lock();
        SessionSnapshot {
            armed: state.phase == Phase::Recording,
            playing: state.phase.is_playing(),
            paused: state.phase == Phase::Paused,
            speed: state.speed,
            repeat_count: state.repeat_count,
            loop_forever: state.loop_forever,
            hotkeys: state.hotkeys.clone(),
            progress: state.progress,
            status: state.status,
            actions: log.len(),
            recorded_ms: log.duration_ms(),
        }
    }

    /// 当前设置（用于退出时保存）
    pub fn settings(&self) -> Settings {
        let state = self.inner.state.lock();
        Settings {
            speed: state.speed,
            repeat_count: state.repeat_count,
            loop_forever: state.loop_forever,
            record_hotkey: state.hotkeys.record.clone(),
            play_hotkey: state.hotkeys.play.clone(),
        }
    }

    /// 热键监听上下文：逐个执行热键动作，直到通道关闭
    pub fn serve_hotkeys(&self, actions: Receiver<HotkeyAction>) {
        for action in actions.iter() {
            debug!("执行热键动作: {:?}", action);
            // 错误已经通过 report 发布给界面
            let _ = match action {
                HotkeyAction::ToggleRecording => self.toggle_recording().map(|_| ()),
                HotkeyAction::StartPlayback => self.start_playback(),
            };
        }
        debug!("热键通道已关闭");
    }

    /// 停止一切并等待后台线程退出（录制会在退出前自动保存）
    pub fn shutdown(&self) {
        let threads = {
            let mut state = self.inner.state.lock();
            match state.phase {
                Phase::Recording => self.stop_recording_locked(&mut state),
                Phase::Playing | Phase::Paused => {
                    self.inner.enter(&mut state, Phase::Idle, Status::Stopped)
                }
                Phase::Idle => {}
            }
            [state.recorder_thread.take(), state.player_thread.take()]
        };

        for handle in threads.into_iter().flatten() {
            let _ = handle.join();
        }
        self.inner.hook.unbind_hotkeys();
        info!("会话已关闭");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::action::Event;
    use crate::device::fake::{Call, FakeDevice};
    use crate::hook::manual::ManualHook;
    use crate::hook::HookEvent;

    struct Fixture {
        controller: SessionController,
        device: FakeDevice,
        hook: ManualHook,
        updates: Receiver<SessionUpdate>,
        dir: tempfile::TempDir,
    }

    fn fixture_with(timing: Timing) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let device = FakeDevice::new();
        let hook = ManualHook::new();
        let options = SessionOptions {
            timing,
            autosave_path: Some(dir.path().join(config::AUTOSAVE_FILE)),
        };
        let controller = SessionController::new(
            &Settings::default(),
            Arc::new(device.clone()),
            Arc::new(hook.clone()),
            options,
        );
        let updates = controller.updates();
        Fixture {
            controller,
            device,
            hook,
            updates,
            dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Timing {
            sample_period: Duration::from_millis(5),
            event_pacing: Duration::from_millis(1),
            ..Timing::default()
        })
    }

    impl Fixture {
        fn load(&self, events: Vec<Event>) {
            self.controller.inner.log.lock().replace(ActionLog::from(events));
        }

        fn drain(&self) -> Vec<SessionUpdate> {
            self.updates.try_iter().collect()
        }

        fn notices(&self) -> Vec<Notice> {
            self.drain()
                .into_iter()
                .filter_map(|u| match u {
                    SessionUpdate::Notice(n) => Some(n),
                    _ => None,
                })
                .collect()
        }

        fn wait_until(&self, what: &str, mut done: impl FnMut(&Self) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !done(self) {
                assert!(Instant::now() < deadline, "timed out waiting for {what}");
                thread::sleep(Duration::from_millis(2));
            }
        }

        fn wait_not_playing(&self) {
            self.wait_until("playback to finish", |f| !f.controller.snapshot().playing);
        }
    }

    fn keys(n: usize) -> Vec<Event> {
        (0..n)
            .map(|i| Event::KeyDown {
                key: format!("k{i}"),
                delay_ms: 1.0,
            })
            .collect()
    }

    fn key_calls(n: usize) -> Vec<Call> {
        (0..n).map(|i| Call::KeyDown(format!("k{i}"))).collect()
    }

    #[test]
    fn test_scenario_speed_two_repeat_two() {
        let f = fixture();
        f.load(vec![
            Event::Move { x: 10, y: 10, delay_ms: 0.0 },
            Event::KeyDown { key: "a".into(), delay_ms: 50.0 },
            Event::KeyUp { key: "a".into(), delay_ms: 30.0 },
        ]);
        f.controller.set_speed(2.0).unwrap();
        f.controller.set_repeat_count(2).unwrap();

        f.controller.start_playback().unwrap();
        f.wait_not_playing();

        let once = vec![
            Call::Move(10, 10),
            Call::KeyDown("a".into()),
            Call::KeyUp("a".into()),
        ];
        assert_eq!(f.device.calls(), [once.clone(), once].concat());

        let snapshot = f.controller.snapshot();
        assert_eq!(snapshot.status, Status::Idle);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(
            f.drain().last(),
            Some(&SessionUpdate::Status {
                status: Status::Idle,
                progress: 100
            })
        );
    }

    #[test]
    fn test_total_dispatches_is_length_times_repeat() {
        let f = fixture();
        f.load(keys(7));
        f.controller.set_repeat_count(3).unwrap();

        f.controller.start_playback().unwrap();
        f.wait_not_playing();

        assert_eq!(f.device.calls().len(), 21);
    }

    #[test]
    fn test_empty_log_is_reported() {
        let f = fixture();

        let err = f.controller.start_playback().unwrap_err();
        assert!(matches!(err, Error::EmptyLog));

        let snapshot = f.controller.snapshot();
        assert!(!snapshot.playing);
        assert_eq!(snapshot.status, Status::Idle);
        let notices = f.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].title, "No actions");
        assert_eq!(notices[0].level, NoticeLevel::Warning);
    }

    #[test]
    fn test_non_numeric_repeat_is_rejected() {
        let f = fixture();
        assert_eq!(f.controller.set_repeat_count_from_input(" 4 ").unwrap(), 4);
        f.drain();

        for bad in ["abc", "", "0", "-1", "+3", "2.5"] {
            let err = f.controller.set_repeat_count_from_input(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{bad:?}");
        }

        assert_eq!(f.controller.snapshot().repeat_count, 4);
        let notices = f.notices();
        assert_eq!(notices.len(), 6);
        assert!(notices.iter().all(|n| n.message == "Please enter a valid number."));
    }

    #[test]
    fn test_pause_holds_progress_and_resume_continues_exactly() {
        let f = fixture_with(Timing {
            event_pacing: Duration::from_millis(15),
            ..Timing::default()
        });
        f.load(keys(20));

        f.controller.start_playback().unwrap();
        f.wait_until("a few events", |f| f.device.calls().len() >= 3);
        assert!(f.controller.pause_playback());
        assert_eq!(f.controller.snapshot().status, Status::Paused);

        // 暂停在下一个事件边界生效
        thread::sleep(Duration::from_millis(60));
        let held_calls = f.device.calls().len();
        let held_progress = f.controller.snapshot().progress;
        thread::sleep(Duration::from_millis(150));
        assert_eq!(f.device.calls().len(), held_calls);
        assert_eq!(f.controller.snapshot().progress, held_progress);
        assert!(held_calls < 20);

        assert!(f.controller.resume_playback());
        f.wait_not_playing();

        assert_eq!(f.device.calls(), key_calls(20));
        assert_eq!(f.controller.snapshot().progress, 100);
    }

    #[test]
    fn test_stop_halts_dispatch_immediately() {
        let f = fixture_with(Timing {
            event_pacing: Duration::from_millis(10),
            ..Timing::default()
        });
        f.load(keys(50));
        f.controller.toggle_loop();

        f.controller.start_playback().unwrap();
        f.wait_until("a few events", |f| f.device.calls().len() >= 3);
        assert!(f.controller.stop_playback());

        let snapshot = f.controller.snapshot();
        assert!(!snapshot.playing);
        assert_eq!(snapshot.status, Status::Stopped);

        thread::sleep(Duration::from_millis(30));
        let frozen = f.device.calls().len();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(f.device.calls().len(), frozen);
        assert!(f.controller.snapshot().progress < 100);
        assert_eq!(f.controller.snapshot().status, Status::Stopped);

        // 停止后可以重新开始
        assert!(!f.controller.stop_playback());
        f.controller.start_playback().unwrap();
        assert!(f.controller.stop_playback());
    }

    #[test]
    fn test_stop_wakes_a_sleeping_player() {
        let f = fixture_with(Timing {
            event_pacing: Duration::from_secs(5),
            ..Timing::default()
        });
        f.load(keys(3));

        f.controller.start_playback().unwrap();
        f.wait_until("first event", |f| !f.device.calls().is_empty());

        let started = Instant::now();
        f.controller.shutdown();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(f.device.calls().len(), 1);
    }

    #[test]
    fn test_pause_wakes_on_stop() {
        let f = fixture_with(Timing {
            event_pacing: Duration::from_millis(5),
            pause_poll: Duration::from_secs(5),
            ..Timing::default()
        });
        f.load(keys(30));

        f.controller.start_playback().unwrap();
        f.wait_until("first event", |f| !f.device.calls().is_empty());
        f.controller.pause_playback();
        thread::sleep(Duration::from_millis(30));

        let started = Instant::now();
        f.controller.shutdown();
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_recording_and_playback_are_mutually_exclusive() {
        let f = fixture();

        assert!(f.controller.toggle_recording().unwrap());
        f.wait_until("subscription", |f| f.hook.is_subscribed());
        let err = f.controller.start_playback().unwrap_err();
        assert!(matches!(err, Error::ConcurrentModeConflict(_)));
        assert!(f.controller.snapshot().armed);
        assert!(!f.controller.snapshot().playing);
        assert!(!f.controller.toggle_recording().unwrap());

        f.load(keys(50));
        f.controller.toggle_loop();
        f.controller.start_playback().unwrap();
        let err = f.controller.toggle_recording().unwrap_err();
        assert!(matches!(err, Error::ConcurrentModeConflict(_)));
        let err = f.controller.start_playback().unwrap_err();
        assert!(matches!(err, Error::ConcurrentModeConflict(_)));

        let snapshot = f.controller.snapshot();
        assert!(snapshot.playing && !snapshot.armed);
        f.wait_until("playback keeps going", |f| f.device.calls().len() >= 5);

        let err = f.controller.open(&f.dir.path().join("x.rec"));
        assert!(matches!(err, Err(Error::FileIo { .. })));
        f.controller.shutdown();
    }

    #[test]
    fn test_recording_session_captures_and_autosaves() {
        let f = fixture();
        f.device.set_position(3, 4);

        assert!(f.controller.toggle_recording().unwrap());
        assert_eq!(f.controller.snapshot().status, Status::Recording);
        f.wait_until("subscription", |f| f.hook.is_subscribed());
        assert!(f.hook.emit(HookEvent::KeyDown("a".into())));
        assert!(f.hook.emit(HookEvent::KeyUp("a".into())));
        thread::sleep(Duration::from_millis(30));
        assert!(!f.controller.toggle_recording().unwrap());
        assert_eq!(f.controller.snapshot().status, Status::Idle);

        let autosave = f.dir.path().join(config::AUTOSAVE_FILE);
        f.wait_until("autosave", |f| !f.hook.is_subscribed() && autosave.exists());
        f.controller.shutdown();

        let saved = persist::load(&autosave).unwrap();
        assert_eq!(saved, *f.controller.inner.log.lock());
        let keyed: Vec<_> = saved
            .iter()
            .filter(|e| !matches!(e, Event::Move { .. }))
            .map(Event::tag)
            .collect();
        assert_eq!(keyed, ["keydown", "keyup"]);
        assert!(saved.iter().any(|e| matches!(e, Event::Move { x: 3, y: 4, .. })));

        // 下次启动读取自动保存
        let g = fixture();
        fs::copy(&autosave, g.dir.path().join(config::AUTOSAVE_FILE)).unwrap();
        assert_eq!(g.controller.load_last().unwrap(), saved.len());
        assert_eq!(g.controller.snapshot().actions, saved.len());
    }

    #[test]
    fn test_new_recording_clears_previous_log() {
        let f = fixture();
        f.load(keys(5));

        f.controller.toggle_recording().unwrap();
        f.wait_until("subscription", |f| f.hook.is_subscribed());
        f.controller.toggle_recording().unwrap();
        f.controller.shutdown();

        let log = f.controller.inner.log.lock().clone();
        assert!(log.iter().all(|e| matches!(e, Event::Move { .. })));
    }

    #[test]
    fn test_rebind_replaces_both_hotkeys() {
        let f = fixture();
        assert_eq!(f.hook.history(), ["bind f8 f9"]);

        let bindings = f.controller.rebind_hotkeys("F6", " f7 ").unwrap();
        assert_eq!(bindings, HotkeyBindings::new("f6", "f7"));
        assert_eq!(f.hook.history(), ["bind f8 f9", "unbind", "bind f6 f7"]);

        // 空输入保留原热键
        f.controller.rebind_hotkeys("", "f10").unwrap();
        assert_eq!(f.hook.bindings(), Some(HotkeyBindings::new("f6", "f10")));

        let before = f.hook.history().len();
        assert!(matches!(
            f.controller.rebind_hotkeys("f6", "F6"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            f.controller.rebind_hotkeys("nonsense", "f1"),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(f.hook.history().len(), before);
        assert_eq!(f.controller.snapshot().hotkeys, HotkeyBindings::new("f6", "f10"));
        assert_eq!(f.controller.settings().play_hotkey, "f10");
    }

    #[test]
    fn test_speed_and_loop_settings() {
        let f = fixture();

        assert!(matches!(f.controller.set_speed(0.0), Err(Error::InvalidInput(_))));
        assert!(matches!(f.controller.set_speed(f64::NAN), Err(Error::InvalidInput(_))));
        assert!(matches!(f.controller.set_repeat_count(0), Err(Error::InvalidInput(_))));
        f.controller.set_speed(8.0).unwrap();
        assert_eq!(f.controller.snapshot().speed, 8.0);
        f.drain();

        assert!(f.controller.toggle_loop());
        assert!(!f.controller.toggle_loop());
        let messages: Vec<_> = f.notices().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, ["Loop is now ON", "Loop is now OFF"]);
    }

    #[test]
    fn test_looping_repeats_until_stopped() {
        let f = fixture();
        f.load(vec![
            Event::KeyDown { key: "x".into(), delay_ms: 1.0 },
            Event::KeyUp { key: "x".into(), delay_ms: 1.0 },
        ]);
        f.controller.toggle_loop();

        f.controller.start_playback().unwrap();
        f.wait_until("three passes", |f| f.device.calls().len() >= 6);
        f.controller.stop_playback();
        f.controller.shutdown();

        let calls = f.device.calls();
        for (i, call) in calls.iter().enumerate() {
            let expected = if i % 2 == 0 {
                Call::KeyDown("x".into())
            } else {
                Call::KeyUp("x".into())
            };
            assert_eq!(call, &expected);
        }
    }

    #[test]
    fn test_device_failure_stops_the_run() {
        let f = fixture();
        f.device.fail_at(2);
        f.load(keys(10));

        f.controller.start_playback().unwrap();
        f.wait_not_playing();

        assert_eq!(f.device.calls(), key_calls(2));
        assert_eq!(f.controller.snapshot().status, Status::Idle);
        assert!(f.notices().iter().any(|n| n.title == "Device error"));
    }

    #[test]
    fn test_open_and_save() {
        let f = fixture();
        let path = f.dir.path().join("macro.rec");
        f.load(keys(4));

        assert_eq!(f.controller.save(&path).unwrap(), 4);
        f.load(Vec::new());
        assert_eq!(f.controller.open(&path).unwrap(), 4);
        assert_eq!(f.controller.snapshot().actions, 4);
        assert_eq!(f.controller.snapshot().recorded_ms, 4.0);

        // 失败时保留原日志
        fs::write(f.dir.path().join("bad.rec"), r#"[["wheel", 1]]"#).unwrap();
        let err = f.controller.open(&f.dir.path().join("bad.rec")).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
        assert_eq!(f.controller.snapshot().actions, 4);
        assert!(f.notices().iter().any(|n| n.title == "File error"));

        assert_eq!(f.controller.load_last().unwrap(), 0);
        assert_eq!(f.controller.snapshot().actions, 4);
    }

    #[test]
    fn test_open_is_refused_while_recording() {
        let f = fixture();
        let path = f.dir.path().join("macro.rec");
        persist::save(&ActionLog::from(keys(2)), &path).unwrap();

        f.controller.toggle_recording().unwrap();
        assert!(matches!(
            f.controller.open(&path),
            Err(Error::ConcurrentModeConflict(_))
        ));
        f.controller.shutdown();
    }

    #[test]
    fn test_hotkey_actions_are_served() {
        let f = fixture();
        f.load(keys(2));
        let (tx, rx) = unbounded();
        let controller = f.controller.clone();
        let listener = thread::spawn(move || controller.serve_hotkeys(rx));

        tx.send(HotkeyAction::StartPlayback).unwrap();
        f.wait_until("playback via hotkey", |f| f.device.calls().len() == 2);
        f.wait_not_playing();

        tx.send(HotkeyAction::ToggleRecording).unwrap();
        f.wait_until("recording via hotkey", |f| f.controller.snapshot().armed);
        tx.send(HotkeyAction::ToggleRecording).unwrap();
        drop(tx);
        listener.join().unwrap();

        assert!(!f.controller.snapshot().armed);
        f.controller.shutdown();
    }
}
