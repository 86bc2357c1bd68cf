//! # Save 模块
//!
//! 会话状态的持久化：扁平的 `name=value` 行存储。
//!
//! ## 格式
//!
//! - `Version=` 头行做主版本兼容检查
//! - 前缀键区分存储类别：`flag.<名>`、`counter.<名>`、`string.<名>`、
//!   `time.<名>`、`list.<名>`、`assignment.<id>`、`timer.<名>`
//! - 每行在**第一个** `=` 处切分，值中的后续 `=` 原样保留
//! - 标志值为 `set|expiry|groups|text` 四段，text 在最后，
//!   因此 text 中的 `|` 也能原样保留
//! - 任务实例整体以 serde_json 存储（结构最复杂，逐字段编码不值得）

use std::collections::BTreeMap;

use crate::error::SaveError;
use crate::script::expr::{format_timestamp, parse_timestamp};
use crate::state::{AssignmentInstance, FlagEntry, SessionState, VarSlot};

/// 存档格式版本；主版本号不同的存档拒绝恢复
pub const SAVE_VERSION: &str = "1.0";

fn major_of(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// 把会话状态序列化为存档文本
pub fn serialize_state(state: &SessionState) -> String {
    let mut out = String::new();
    out.push_str(&format!("Version={SAVE_VERSION}\n"));
    out.push_str(&format!("merits={}\n", state.merits));
    out.push_str(&format!("status={}\n", state.status));
    out.push_str(&format!(
        "status_history={}\n",
        state.status_history.join(",")
    ));
    out.push_str(&format!(
        "next_assignment_id={}\n",
        state.next_assignment_id
    ));
    for (name, enabled) in &state.timer_overrides {
        out.push_str(&format!("timer_override.{name}={enabled}\n"));
    }

    for entry in state.flags.values() {
        let expiry = entry.expiry.map(format_timestamp).unwrap_or_default();
        out.push_str(&format!(
            "flag.{}={}|{}|{}|{}\n",
            entry.display_name,
            format_timestamp(entry.set_time),
            expiry,
            entry.groups.join(","),
            entry.text,
        ));
    }
    for slot in state.counters.values() {
        out.push_str(&format!("counter.{}={}\n", slot.display_name, slot.value));
    }
    for slot in state.strings.values() {
        out.push_str(&format!("string.{}={}\n", slot.display_name, slot.value));
    }
    for slot in state.times.values() {
        out.push_str(&format!(
            "time.{}={}\n",
            slot.display_name,
            format_timestamp(slot.value)
        ));
    }
    for slot in state.lists.values() {
        out.push_str(&format!(
            "list.{}={}\n",
            slot.display_name,
            slot.value.join(",")
        ));
    }
    for (name, next) in &state.timer_next {
        out.push_str(&format!("timer.{}={}\n", name, format_timestamp(*next)));
    }
    for (id, inst) in &state.assignments {
        // 实例结构复杂，整体走 serde_json
        if let Ok(json) = serde_json::to_string(inst) {
            out.push_str(&format!("assignment.{id}={json}\n"));
        }
    }
    out
}

/// 从存档文本恢复会话状态
///
/// 无法解析的行跳过（向前兼容），主版本不匹配一律拒绝。
pub fn restore_state(text: &str) -> Result<SessionState, SaveError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or(SaveError::MissingVersion)?;
    let version = header
        .strip_prefix("Version=")
        .ok_or(SaveError::MissingVersion)?
        .trim();
    if major_of(version) != major_of(SAVE_VERSION) {
        return Err(SaveError::IncompatibleVersion {
            found: version.to_string(),
            current: SAVE_VERSION.to_string(),
        });
    }

    let mut state = SessionState::new();
    for line in lines {
        // 第一个 = 处切分，值里的 = 原样保留
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.split_once('.') {
            None => match key {
                "merits" => state.merits = value.parse().unwrap_or(0),
                "status" => state.status = value.to_lowercase(),
                "status_history" => {
                    state.status_history = split_list(value);
                }
                "next_assignment_id" => {
                    state.next_assignment_id = value.parse().unwrap_or(1);
                }
                _ => {}
            },
            Some(("flag", name)) => {
                if let Some(entry) = parse_flag(name, value) {
                    state.flags.insert(name.to_lowercase(), entry);
                }
            }
            Some(("counter", name)) => {
                if let Ok(v) = value.parse::<i64>() {
                    state.counters.insert(
                        name.to_lowercase(),
                        VarSlot {
                            display_name: name.to_string(),
                            value: v,
                        },
                    );
                }
            }
            Some(("string", name)) => {
                state.strings.insert(
                    name.to_lowercase(),
                    VarSlot {
                        display_name: name.to_string(),
                        value: value.to_string(),
                    },
                );
            }
            Some(("time", name)) => {
                if let Some(t) = parse_timestamp(value) {
                    state.times.insert(
                        name.to_lowercase(),
                        VarSlot {
                            display_name: name.to_string(),
                            value: t,
                        },
                    );
                }
            }
            Some(("list", name)) => {
                let items: Vec<String> = if value.is_empty() {
                    Vec::new()
                } else {
                    value.split(',').map(|s| s.to_string()).collect()
                };
                state.lists.insert(
                    name.to_lowercase(),
                    VarSlot {
                        display_name: name.to_string(),
                        value: items,
                    },
                );
            }
            Some(("timer", name)) => {
                if let Some(t) = parse_timestamp(value) {
                    state.timer_next.insert(name.to_lowercase(), t);
                }
            }
            Some(("timer_override", name)) => {
                if let Ok(v) = value.parse::<bool>() {
                    state.timer_overrides.insert(name.to_lowercase(), v);
                }
            }
            Some(("assignment", _)) => {
                if let Ok(inst) = serde_json::from_str::<AssignmentInstance>(value) {
                    state.assignments.insert(inst.id, inst);
                }
            }
            Some(_) => {}
        }
    }
    Ok(state)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(name: &str, value: &str) -> Option<FlagEntry> {
    let mut parts = value.splitn(4, '|');
    let set_time = parse_timestamp(parts.next()?)?;
    let expiry_raw = parts.next()?;
    let expiry = if expiry_raw.is_empty() {
        None
    } else {
        Some(parse_timestamp(expiry_raw)?)
    };
    let groups = split_list(parts.next()?);
    let text = parts.next().unwrap_or("").to_string();
    Some(FlagEntry {
        display_name: name.to_string(),
        set_time,
        expiry,
        groups,
        text,
    })
}

/// 字符串变量转储（`.cds` 风格）：每个变量一行 `名=值`
pub fn dump_variables(state: &SessionState) -> String {
    let mut out = String::new();
    for slot in state.strings.values() {
        out.push_str(&format!("{}={}\n", slot.display_name, slot.value));
    }
    out
}

/// 读回字符串变量转储；每行在第一个 `=` 处切分
pub fn parse_variable_dump(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        if let Some((name, value)) = line.split_once('=') {
            out.insert(name.to_string(), value.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::expr::parse_timestamp;
    use crate::state::{AssignmentKind, AssignmentPhase};

    fn ts(s: &str) -> crate::script::Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn sample_state() -> SessionState {
        let mut state = SessionState::new();
        state.merits = 42;
        state.push_status("new");
        state.push_status("Trusted");
        state.set_counter("Score", 7);
        state.set_string("Note", "a=b=c");
        state.set_time("LastCheck", ts("2025-06-01 08:00:00"));
        state.list_mut("Chores").extend(["sweep".to_string(), "wash".to_string()]);
        state.set_flag(
            "Grounded",
            ts("2025-06-01 10:00:00"),
            Some(ts("2025-06-01 12:00:00")),
        );
        state.flag_mut("grounded").unwrap().groups.push("mood".to_string());
        state.flag_mut("grounded").unwrap().text = "带|竖线的文本".to_string();
        state.timer_overrides.insert("nag".to_string(), false);
        state.timer_next.insert("nag".to_string(), ts("2025-06-01 11:00:00"));

        let id = state.allocate_assignment_id();
        state.assignments.insert(
            id,
            AssignmentInstance {
                id,
                kind: AssignmentKind::Punishment,
                name: "lines".to_string(),
                phase: AssignmentPhase::Started,
                assigned_at: ts("2025-06-01 09:00:00"),
                deadline: ts("2025-06-01 23:59:59"),
                next_remind: Some(ts("2025-06-01 10:00:00")),
                amount: 20,
                resources: vec!["hands".to_string()],
                prev_status: Some("new".to_string()),
            },
        );
        state
    }

    #[test]
    fn test_save_round_trip() {
        let state = sample_state();
        let text = serialize_state(&state);
        let restored = restore_state(&text).unwrap();
        assert_eq!(state, restored);
    }

    #[test]
    fn test_value_equals_signs_preserved() {
        let state = sample_state();
        let restored = restore_state(&serialize_state(&state)).unwrap();
        assert_eq!(restored.string_var("note"), "a=b=c");
        // 标志文本中的竖线在第四段里原样保留
        assert_eq!(restored.flags["grounded"].text, "带|竖线的文本");
    }

    #[test]
    fn test_restore_rejects_incompatible_major() {
        let text = "Version=2.0\nmerits=5\n";
        assert!(matches!(
            restore_state(text),
            Err(SaveError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn test_restore_requires_version_header() {
        assert_eq!(restore_state("merits=5\n"), Err(SaveError::MissingVersion));
        assert_eq!(restore_state(""), Err(SaveError::MissingVersion));
    }

    #[test]
    fn test_restore_skips_unknown_lines() {
        let text = "Version=1.0\nmerits=9\n???\nfuture.key=x\n";
        let state = restore_state(text).unwrap();
        assert_eq!(state.merits, 9);
    }

    #[test]
    fn test_variable_dump_round_trip() {
        let mut state = SessionState::new();
        state.set_string("Greeting", "你好=世界");
        state.set_string("Empty", "");
        let dump = dump_variables(&state);
        let parsed = parse_variable_dump(&dump);
        assert_eq!(parsed["Greeting"], "你好=世界");
        assert_eq!(parsed["Empty"], "");
    }
}
