//! 按键名称
//!
//! 录制文件、热键设置和模拟输入共用一套小写键名，例如
//! `"a"`、`"7"`、`"f8"`、`"space"`、`"enter"`、`"ctrl"`、`"page up"`。

use enigo::Key as OutKey;
use rdev::Key as InKey;

/// 规范化用户输入的键名（大小写、空白、常见别名）
pub fn normalize(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "return" => "enter",
        "escape" => "esc",
        "control" | "ctl" => "ctrl",
        "del" => "delete",
        "pgup" | "pageup" => "page up",
        "pgdn" | "pagedown" => "page down",
        "capslock" => "caps lock",
        "cmd" | "command" | "win" | "windows" | "super" => "meta",
        "option" => "alt",
        "up arrow" => "up",
        "down arrow" => "down",
        "left arrow" => "left",
        "right arrow" => "right",
        other => other,
    };
    canonical.to_string()
}

/// 是否为可以回放的键名
pub fn is_known(name: &str) -> bool {
    to_enigo(name).is_some()
}

/// 监听到的物理键 -> 键名
///
/// 无法回放的键（Insert、NumLock、PrintScreen 等）返回 `None`，录制时直接丢弃。
pub fn name_of(key: InKey) -> Option<String> {
    let name = match key {
        InKey::KeyA => "a",
        InKey::KeyB => "b",
        InKey::KeyC => "c",
        InKey::KeyD => "d",
        InKey::KeyE => "e",
        InKey::KeyF => "f",
        InKey::KeyG => "g",
        InKey::KeyH => "h",
        InKey::KeyI => "i",
        InKey::KeyJ => "j",
        InKey::KeyK => "k",
        InKey::KeyL => "l",
        InKey::KeyM => "m",
        InKey::KeyN => "n",
        InKey::KeyO => "o",
        InKey::KeyP => "p",
        InKey::KeyQ => "q",
        InKey::KeyR => "r",
        InKey::KeyS => "s",
        InKey::KeyT => "t",
        InKey::KeyU => "u",
        InKey::KeyV => "v",
        InKey::KeyW => "w",
        InKey::KeyX => "x",
        InKey::KeyY => "y",
        InKey::KeyZ => "z",

        InKey::Num0 | InKey::Kp0 => "0",
        InKey::Num1 | InKey::Kp1 => "1",
        InKey::Num2 | InKey::Kp2 => "2",
        InKey::Num3 | InKey::Kp3 => "3",
        InKey::Num4 | InKey::Kp4 => "4",
        InKey::Num5 | InKey::Kp5 => "5",
        InKey::Num6 | InKey::Kp6 => "6",
        InKey::Num7 | InKey::Kp7 => "7",
        InKey::Num8 | InKey::Kp8 => "8",
        InKey::Num9 | InKey::Kp9 => "9",

        InKey::F1 => "f1",
        InKey::F2 => "f2",
        InKey::F3 => "f3",
        InKey::F4 => "f4",
        InKey::F5 => "f5",
        InKey::F6 => "f6",
        InKey::F7 => "f7",
        InKey::F8 => "f8",
        InKey::F9 => "f9",
        InKey::F10 => "f10",
        InKey::F11 => "f11",
        InKey::F12 => "f12",

        InKey::Alt | InKey::AltGr => "alt",
        InKey::ControlLeft | InKey::ControlRight => "ctrl",
        InKey::ShiftLeft | InKey::ShiftRight => "shift",
        InKey::MetaLeft | InKey::MetaRight => "meta",
        InKey::CapsLock => "caps lock",
        InKey::Backspace => "backspace",
        InKey::Delete | InKey::KpDelete => "delete",
        InKey::Return | InKey::KpReturn => "enter",
        InKey::Escape => "esc",
        InKey::Tab => "tab",
        InKey::Space => "space",
        InKey::Home => "home",
        InKey::End => "end",
        InKey::PageUp => "page up",
        InKey::PageDown => "page down",
        InKey::UpArrow => "up",
        InKey::DownArrow => "down",
        InKey::LeftArrow => "left",
        InKey::RightArrow => "right",

        InKey::Comma => ",",
        InKey::Dot => ".",
        InKey::SemiColon => ";",
        InKey::Quote => "'",
        InKey::BackQuote => "`",
        InKey::Slash | InKey::KpDivide => "/",
        InKey::BackSlash | InKey::IntlBackslash => "\\",
        InKey::LeftBracket => "[",
        InKey::RightBracket => "]",
        InKey::Minus | InKey::KpMinus => "-",
        InKey::Equal => "=",
        InKey::KpPlus => "+",
        InKey::KpMultiply => "*",

        _ => return None,
    };
    Some(name.to_string())
}

/// 键名 -> 模拟输入用的键
pub fn to_enigo(name: &str) -> Option<OutKey> {
    let name = normalize(name);
    let key = match name.as_str() {
        "enter" => OutKey::Return,
        "tab" => OutKey::Tab,
        "esc" => OutKey::Escape,
        "backspace" => OutKey::Backspace,
        "delete" => OutKey::Delete,
        "space" => OutKey::Space,
        "home" => OutKey::Home,
        "end" => OutKey::End,
        "page up" => OutKey::PageUp,
        "page down" => OutKey::PageDown,
        "up" => OutKey::UpArrow,
        "down" => OutKey::DownArrow,
        "left" => OutKey::LeftArrow,
        "right" => OutKey::RightArrow,
        "shift" => OutKey::Shift,
        "ctrl" => OutKey::Control,
        "alt" => OutKey::Alt,
        "meta" => OutKey::Meta,
        "caps lock" => OutKey::CapsLock,
        "f1" => OutKey::F1,
        "f2" => OutKey::F2,
        "f3" => OutKey::F3,
        "f4" => OutKey::F4,
        "f5" => OutKey::F5,
        "f6" => OutKey::F6,
        "f7" => OutKey::F7,
        "f8" => OutKey::F8,
        "f9" => OutKey::F9,
        "f10" => OutKey::F10,
        "f11" => OutKey::F11,
        "f12" => OutKey::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if !c.is_control() => OutKey::Unicode(c),
                _ => return None,
            }
        }
    };
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_aliases() {
        assert_eq!(normalize("  F8 "), "f8");
        assert_eq!(normalize("Return"), "enter");
        assert_eq!(normalize("Escape"), "esc");
        assert_eq!(normalize("Control"), "ctrl");
        assert_eq!(normalize("PageUp"), "page up");
        assert_eq!(normalize("a"), "a");
    }

    #[test]
    fn test_listened_names_are_replayable() {
        let keys = [
            InKey::KeyA,
            InKey::Num7,
            InKey::Kp3,
            InKey::F9,
            InKey::Return,
            InKey::ShiftLeft,
            InKey::ControlRight,
            InKey::PageDown,
            InKey::Space,
            InKey::BackSlash,
            InKey::Minus,
            InKey::Insert,
            InKey::NumLock,
            InKey::PrintScreen,
            InKey::ScrollLock,
            InKey::Pause,
            InKey::Function,
            InKey::Unknown(173),
        ];
        for key in keys {
            if let Some(name) = name_of(key) {
                assert!(is_known(&name), "{name} should map back to an injectable key");
            }
        }
    }

    #[test]
    fn test_specific_names() {
        assert_eq!(name_of(InKey::KeyA).as_deref(), Some("a"));
        assert_eq!(name_of(InKey::F8).as_deref(), Some("f8"));
        assert_eq!(name_of(InKey::KpReturn).as_deref(), Some("enter"));
        assert_eq!(name_of(InKey::AltGr).as_deref(), Some("alt"));
        assert_eq!(to_enigo("A"), Some(OutKey::Unicode('a')));
        assert_eq!(to_enigo("F12"), Some(OutKey::F12));
        assert_eq!(to_enigo("return"), Some(OutKey::Return));
    }

    #[test]
    fn test_unreplayable_keys_have_no_name() {
        assert_eq!(name_of(InKey::Insert), None);
        assert_eq!(name_of(InKey::NumLock), None);
        assert_eq!(name_of(InKey::PrintScreen), None);
        assert_eq!(name_of(InKey::Unknown(173)), None);
    }

    #[test]
    fn test_unknown_names() {
        assert!(!is_known(""));
        assert!(!is_known("f13x"));
        assert!(!is_known("printscreen"));
        assert!(!is_known("unknown(173)"));
    }
}
