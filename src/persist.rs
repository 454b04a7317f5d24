//! 录制文件读写
//!
//! `.rec` 文件是 JSON 数组，每个事件是一个带标签的元组：
//!
//! ```text
//! [["move", 10, 20, 0.0], ["click", 10, 20, 12.5], ["keydown", "a", 50.0], ["keyup", "a", 30.0]]
//! ```
//!
//! 读写都是同步、整文件进行。未知标签在加载时报错，而不是静默忽略。

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, info};
use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::action::{ActionLog, Event};
use crate::error::{Error, Result};

const TAGS: &[&str] = &["move", "click", "keydown", "keyup"];

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Event::Move { x, y, delay_ms } | Event::Click { x, y, delay_ms } => {
                let mut tuple = serializer.serialize_tuple(4)?;
                tuple.serialize_element(self.tag())?;
                tuple.serialize_element(x)?;
                tuple.serialize_element(y)?;
                tuple.serialize_element(delay_ms)?;
                tuple.end()
            }
            Event::KeyDown { key, delay_ms } | Event::KeyUp { key, delay_ms } => {
                let mut tuple = serializer.serialize_tuple(3)?;
                tuple.serialize_element(self.tag())?;
                tuple.serialize_element(key)?;
                tuple.serialize_element(delay_ms)?;
                tuple.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_seq(EventVisitor)
    }
}

struct EventVisitor;

impl<'de> Visitor<'de> for EventVisitor {
    type Value = Event;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an event tuple such as [\"move\", x, y, delay]")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Event, A::Error> {
        let tag: String = element(&mut seq, 0, &self)?;

        let event = match tag.as_str() {
            "move" | "click" => {
                let x = element(&mut seq, 1, &self)?;
                let y = element(&mut seq, 2, &self)?;
                let delay_ms = element(&mut seq, 3, &self)?;
                if tag == "move" {
                    Event::Move { x, y, delay_ms }
                } else {
                    Event::Click { x, y, delay_ms }
                }
            }
            "keydown" | "keyup" => {
                let key = element(&mut seq, 1, &self)?;
                let delay_ms = element(&mut seq, 2, &self)?;
                if tag == "keydown" {
                    Event::KeyDown { key, delay_ms }
                } else {
                    Event::KeyUp { key, delay_ms }
                }
            }
            other => return Err(de::Error::unknown_variant(other, TAGS)),
        };

        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(format!(
                "too many fields in \"{}\" event",
                event.tag()
            )));
        }

        Ok(event)
    }
}

fn element<'de, A, T>(seq: &mut A, index: usize, exp: &dyn de::Expected) -> std::result::Result<T, A::Error>
where
    A: SeqAccess<'de>,
    T: Deserialize<'de>,
{
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, exp))
}

impl Serialize for ActionLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ActionLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<Event>::deserialize(deserializer).map(ActionLog::from)
    }
}

/// 保存动作日志到文件（覆盖写入）
pub fn save(log: &ActionLog, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::file_io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| Error::file_io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, log).map_err(|e| Error::format(path, e))?;
    writer.flush().map_err(|e| Error::file_io(path, e))?;

    info!("已保存 {} 个动作到 {:?}", log.len(), path);
    Ok(())
}

/// 从文件加载动作日志
pub fn load(path: &Path) -> Result<ActionLog> {
    let file = File::open(path).map_err(|e| Error::file_io(path, e))?;
    let log: ActionLog = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        if e.is_io() {
            Error::file_io(path, e.into())
        } else {
            Error::format(path, e)
        }
    })?;

    info!("已从 {:?} 加载 {} 个动作", path, log.len());
    Ok(log)
}

/// 文件存在时加载，不存在时返回 `None`
pub fn load_if_exists(path: &Path) -> Result<Option<ActionLog>> {
    if !path.exists() {
        debug!("{:?} 不存在，跳过加载", path);
        return Ok(None);
    }
    load(path).map(Some)
}
