//! 动作日志
//!
//! 按录制顺序保存事件，插入顺序即回放顺序。
//! 每个事件携带距上一个事件的间隔（毫秒），第一个事件的间隔从开始录制算起。

use std::sync::Arc;

/// 录制下来的一个输入事件
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// 光标移动到 (x, y)
    Move { x: i32, y: i32, delay_ms: f64 },
    /// 在 (x, y) 左键单击
    Click { x: i32, y: i32, delay_ms: f64 },
    /// 按下某个键
    KeyDown { key: String, delay_ms: f64 },
    /// 松开某个键
    KeyUp { key: String, delay_ms: f64 },
}

impl Event {
    /// 距上一个事件的间隔（毫秒）
    pub fn delay_ms(&self) -> f64 {
        match self {
            Event::Move { delay_ms, .. }
            | Event::Click { delay_ms, .. }
            | Event::KeyDown { delay_ms, .. }
            | Event::KeyUp { delay_ms, .. } => *delay_ms,
        }
    }

    /// 录制文件中使用的标签
    pub fn tag(&self) -> &'static str {
        match self {
            Event::Move { .. } => "move",
            Event::Click { .. } => "click",
            Event::KeyDown { .. } => "keydown",
            Event::KeyUp { .. } => "keyup",
        }
    }
}

/// 动作日志
///
/// 不做额外校验：录制器是唯一的生产者。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionLog {
    events: Vec<Event>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 只读快照，交给回放线程使用
    pub fn snapshot(&self) -> Arc<[Event]> {
        Arc::from(self.events.as_slice())
    }

    /// 整体替换（加载文件时使用）
    pub fn replace(&mut self, other: ActionLog) {
        self.events = other.events;
    }

    /// 录制总时长（毫秒），即所有间隔之和
    pub fn duration_ms(&self) -> f64 {
        self.events.iter().map(Event::delay_ms).sum()
    }
}

impl From<Vec<Event>> for ActionLog {
    fn from(events: Vec<Event>) -> Self {
        Self { events }
    }
}

impl<'a> IntoIterator for &'a ActionLog {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str, delay_ms: f64) -> Event {
        Event::KeyDown {
            key: name.to_string(),
            delay_ms,
        }
    }

    #[test]
    fn test_append_keeps_order() {
        let mut log = ActionLog::new();
        log.append(Event::Move { x: 1, y: 2, delay_ms: 0.0 });
        log.append(key("a", 5.0));
        log.append(Event::KeyUp { key: "a".into(), delay_ms: 7.5 });

        let tags: Vec<_> = log.iter().map(Event::tag).collect();
        assert_eq!(tags, ["move", "keydown", "keyup"]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.duration_ms(), 12.5);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut log = ActionLog::from(vec![key("a", 1.0)]);
        let snapshot = log.snapshot();
        log.clear();

        assert!(log.is_empty());
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0], key("a", 1.0));
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut log = ActionLog::from(vec![key("a", 1.0), key("b", 2.0)]);
        log.replace(ActionLog::from(vec![Event::Click { x: 3, y: 4, delay_ms: 0.0 }]));

        assert_eq!(log.len(), 1);
        assert_eq!(log.iter().next().map(Event::tag), Some("click"));
    }

    #[test]
    fn test_empty_log_is_valid() {
        let log = ActionLog::new();
        assert!(log.is_empty());
        assert!(log.snapshot().is_empty());
        assert_eq!(log.duration_ms(), 0.0);
    }
}
