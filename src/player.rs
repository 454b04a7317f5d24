//! 回放器
//!
//! 状态机：Idle -> Playing -> {Paused <-> Playing} -> Idle，停止可以在任何时刻发生。
//!
//! 总工作量 = 事件数 × 重复次数。每个事件之前检查暂停；暂停只在事件边界生效。
//! - `Move`：按 `delay / speed` 平滑移动（不少于 10ms）
//! - `Click`：立即在记录的位置单击
//! - `KeyDown` / `KeyUp`：立即按下/松开，不按间隔等待
//!
//! 按键事件的间隔只体现在每个事件后的固定节拍里，比录制时更快；
//! 这是已知的保真度差距，保持原样。

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};

use crate::action::Event;
use crate::config::Timing;
use crate::device::InputDevice;
use crate::error::{Error, Result};

/// 回放被停止
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Halted;

/// 回放线程与会话控制器之间的接口
pub(crate) trait PlaybackHost {
    /// 暂停时阻塞，直到恢复或停止
    fn wait_while_paused(&self) -> std::result::Result<(), Halted>;
    /// 等待一段时间；停止时立即返回 `Halted`
    fn sleep(&self, duration: Duration) -> std::result::Result<(), Halted>;
    /// 当前速度倍率（每个事件重新读取）
    fn speed(&self) -> f64;
    /// 是否循环（每一轮结束时重新读取）
    fn loop_forever(&self) -> bool;
    fn report_progress(&self, percent: u8);
}

/// 一次回放的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// 正常结束
    Completed { dispatched: u64 },
    /// 被停止
    Stopped { dispatched: u64 },
}

enum Interrupt {
    Halted,
    Failed(Error),
}

impl From<Halted> for Interrupt {
    fn from(_: Halted) -> Self {
        Interrupt::Halted
    }
}

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        Interrupt::Failed(e)
    }
}

/// 移动时长：`delay / speed`，不低于 `floor`
pub fn motion_duration(delay_ms: f64, speed: f64, floor: Duration) -> Duration {
    Duration::try_from_secs_f64(delay_ms / speed / 1000.0)
        .unwrap_or(floor)
        .max(floor)
}

/// `from` 到 `to` 之间比例为 `t` 的点；坐标来自文件，可能是任意 i32
fn interpolate(from: i32, to: i32, t: f64) -> i32 {
    let from = f64::from(from);
    let point = from + (f64::from(to) - from) * t;
    point.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// 回放器（一次回放对应一个实例，在后台线程中运行）
pub(crate) struct Player {
    events: Arc<[Event]>,
    repeat_count: u32,
    device: Box<dyn InputDevice>,
    timing: Timing,
    dispatched: u64,
}

impl Player {
    pub fn new(events: Arc<[Event]>, repeat_count: u32, device: Box<dyn InputDevice>, timing: Timing) -> Self {
        Self {
            events,
            repeat_count: repeat_count.max(1),
            device,
            timing,
            dispatched: 0,
        }
    }

    /// 回放到结束或被停止；模拟输入失败时中止并返回错误
    pub fn run(mut self, host: &dyn PlaybackHost) -> Result<PlaybackOutcome> {
        info!(
            "开始回放: {} 个动作 × {} 遍",
            self.events.len(),
            self.repeat_count
        );

        match self.play(host) {
            Ok(()) => Ok(PlaybackOutcome::Completed {
                dispatched: self.dispatched,
            }),
            Err(Interrupt::Halted) => Ok(PlaybackOutcome::Stopped {
                dispatched: self.dispatched,
            }),
            Err(Interrupt::Failed(e)) => Err(e),
        }
    }

    fn play(&mut self, host: &dyn PlaybackHost) -> std::result::Result<(), Interrupt> {
        if self.events.is_empty() {
            return Ok(());
        }

        let events = Arc::clone(&self.events);
        let total = events.len() as u64 * u64::from(self.repeat_count);

        loop {
            let mut completed = 0u64;
            for repetition in 1..=self.repeat_count {
                debug!("第 {}/{} 遍", repetition, self.repeat_count);
                for event in events.iter() {
                    host.wait_while_paused()?;
                    self.dispatch(host, event)?;

                    self.dispatched += 1;
                    completed += 1;
                    host.report_progress((completed * 100 / total) as u8);
                    host.sleep(self.timing.event_pacing)?;
                }
            }

            if !host.loop_forever() {
                return Ok(());
            }
            debug!("循环模式，重新开始");
        }
    }

    fn dispatch(&mut self, host: &dyn PlaybackHost, event: &Event) -> std::result::Result<(), Interrupt> {
        trace!("dispatch {:?}", event);
        match event {
            Event::Move { x, y, delay_ms } => {
                let duration = motion_duration(*delay_ms, host.speed(), self.timing.min_motion);
                self.glide(host, *x, *y, duration)?;
            }
            Event::Click { x, y, .. } => self.device.click_at(*x, *y)?,
            Event::KeyDown { key, .. } => self.device.key_down(key)?,
            Event::KeyUp { key, .. } => self.device.key_up(key)?,
        }
        Ok(())
    }

    /// 在 `duration` 内把光标平滑移动到 (x, y)
    ///
    /// 先等待再移动：在等待中被停止时，这个事件不算已回放。
    fn glide(&mut self, host: &dyn PlaybackHost, x: i32, y: i32, duration: Duration) -> std::result::Result<(), Interrupt> {
        let step = self.timing.motion_step.as_nanos().max(1);
        let steps = (duration.as_nanos() / step).clamp(1, 10_000) as u32;

        let (from_x, from_y) = if steps > 1 {
            self.device.pointer_position()?
        } else {
            (x, y)
        };
        let pause = duration / steps;

        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let px = interpolate(from_x, x, t);
            let py = interpolate(from_y, y, t);
            host.sleep(pause)?;
            self.device.move_cursor(px, py)?;
        }
        Ok(())
    }
}
