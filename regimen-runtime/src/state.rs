//! # State 模块
//!
//! 会话的唯一可变状态。
//!
//! ## 设计原则
//!
//! - 所有状态必须**显式建模**，不允许隐式全局状态
//! - 所有状态必须**可序列化**（跨会话持久化）
//! - 名字比较大小写不敏感，但保留原始写法用于显示
//! - 未设置的计数器 / 字符串 / 时间读取回退 0 / "" / None，从不报错

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::script::Timestamp;

/// 一个标志：带元数据的命名布尔
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagEntry {
    /// 原始写法（保留大小写，用于显示）
    pub display_name: String,
    /// 设置时刻
    pub set_time: Timestamp,
    /// 过期时刻（None 表示永不过期）
    pub expiry: Option<Timestamp>,
    /// 所属组（小写）
    pub groups: Vec<String>,
    /// 显示文本
    pub text: String,
}

/// 保留显示写法的变量槽
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSlot<T> {
    /// 原始写法（保留大小写，用于显示）
    pub display_name: String,
    pub value: T,
}

/// 任务种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentKind {
    Job,
    Punishment,
}

impl AssignmentKind {
    /// 脚本中的种类名（`Start=job,name` 等动作的第一个操作数）
    pub fn label(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Punishment => "punishment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "job" => Some(Self::Job),
            "punishment" => Some(Self::Punishment),
            _ => None,
        }
    }
}

/// 任务实例的生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentPhase {
    /// 已分派，尚未开始
    Assigned,
    /// 执行中
    Started,
    /// 已完成
    Done,
    /// 已中止
    Aborted,
    /// 已删除
    Deleted,
    /// 截止后隐式进入的终态
    Expired,
}

impl AssignmentPhase {
    /// 实例是否仍然活动（占用资源、参与冲突检查）
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::Started)
    }
}

/// 一个任务实例（作业 / 惩罚的具体一次发生）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentInstance {
    pub id: u64,
    pub kind: AssignmentKind,
    /// 定义名（小写）
    pub name: String,
    pub phase: AssignmentPhase,
    pub assigned_at: Timestamp,
    /// 截止时刻（缺省为分派当天 23:59:59）
    pub deadline: Timestamp,
    /// 下次提醒时刻
    pub next_remind: Option<Timestamp>,
    /// 具体数量（惩罚由严重度换算而来；作业为 0）
    pub amount: i64,
    /// 占用的资源令牌（小写）
    pub resources: Vec<String>,
    /// 开始时记录的先前状态（中止时恢复）
    pub prev_status: Option<String>,
}

impl AssignmentInstance {
    /// started 标志名：`<kind>_<name>_started`
    pub fn started_flag(&self) -> String {
        format!("{}_{}_started", self.kind.label(), self.name)
    }
}

/// 会话状态
///
/// 这是运行时的**唯一可变状态**。定义（程序）只读，与此严格分离。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// 标志表（键小写）
    pub flags: BTreeMap<String, FlagEntry>,
    /// 计数器表
    pub counters: BTreeMap<String, VarSlot<i64>>,
    /// 字符串变量表
    pub strings: BTreeMap<String, VarSlot<String>>,
    /// 时间变量表
    pub times: BTreeMap<String, VarSlot<Timestamp>>,
    /// 列表变量表
    pub lists: BTreeMap<String, VarSlot<Vec<String>>>,
    /// 积分
    pub merits: i64,
    /// 当前状态名（小写；空串表示未设置）
    pub status: String,
    /// 状态历史栈（`PreviousStatus` 弹出）
    pub status_history: Vec<String>,
    /// 任务实例表
    pub assignments: BTreeMap<u64, AssignmentInstance>,
    /// 下一个任务实例 id
    pub next_assignment_id: u64,
    /// 定时器启用状态覆盖（小写名；未覆盖时用定义上的默认值）
    pub timer_overrides: BTreeMap<String, bool>,
    /// 各定时器的下次触发时刻
    pub timer_next: BTreeMap<String, Timestamp>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            next_assignment_id: 1,
            ..Self::default()
        }
    }

    // ── 标志 ──

    /// 设置 / 刷新标志
    pub fn set_flag(&mut self, name: &str, now: Timestamp, expiry: Option<Timestamp>) {
        let key = name.to_lowercase();
        match self.flags.get_mut(&key) {
            Some(entry) => {
                entry.set_time = now;
                entry.expiry = expiry;
            }
            None => {
                self.flags.insert(
                    key,
                    FlagEntry {
                        display_name: name.to_string(),
                        set_time: now,
                        expiry,
                        groups: Vec::new(),
                        text: String::new(),
                    },
                );
            }
        }
    }

    pub fn remove_flag(&mut self, name: &str) {
        self.flags.remove(&name.to_lowercase());
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(&name.to_lowercase())
    }

    pub fn flag_mut(&mut self, name: &str) -> Option<&mut FlagEntry> {
        self.flags.get_mut(&name.to_lowercase())
    }

    /// 移除组内的全部标志
    pub fn remove_flag_group(&mut self, group: &str) {
        let group = group.to_lowercase();
        self.flags.retain(|_, entry| !entry.groups.contains(&group));
    }

    /// 清除到期的标志；返回被清除的数量
    pub fn sweep_flags(&mut self, now: Timestamp) -> usize {
        let before = self.flags.len();
        self.flags
            .retain(|_, entry| entry.expiry.is_none_or(|e| e > now));
        before - self.flags.len()
    }

    // ── 计数器 ──

    pub fn counter(&self, name: &str) -> i64 {
        self.counters
            .get(&name.to_lowercase())
            .map(|slot| slot.value)
            .unwrap_or(0)
    }

    pub fn set_counter(&mut self, name: &str, value: i64) {
        match self.counters.get_mut(&name.to_lowercase()) {
            Some(slot) => slot.value = value,
            None => {
                self.counters.insert(
                    name.to_lowercase(),
                    VarSlot {
                        display_name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    // ── 字符串 ──

    pub fn string_var(&self, name: &str) -> String {
        self.strings
            .get(&name.to_lowercase())
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.strings.get_mut(&name.to_lowercase()) {
            Some(slot) => slot.value = value,
            None => {
                self.strings.insert(
                    name.to_lowercase(),
                    VarSlot {
                        display_name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    // ── 时间 ──

    pub fn time_var(&self, name: &str) -> Option<Timestamp> {
        self.times
            .get(&name.to_lowercase())
            .map(|slot| slot.value)
    }

    pub fn set_time(&mut self, name: &str, value: Timestamp) {
        match self.times.get_mut(&name.to_lowercase()) {
            Some(slot) => slot.value = value,
            None => {
                self.times.insert(
                    name.to_lowercase(),
                    VarSlot {
                        display_name: name.to_string(),
                        value,
                    },
                );
            }
        }
    }

    // ── 列表 ──

    pub fn list(&self, name: &str) -> Vec<String> {
        self.lists
            .get(&name.to_lowercase())
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    pub fn list_mut(&mut self, name: &str) -> &mut Vec<String> {
        let key = name.to_lowercase();
        &mut self
            .lists
            .entry(key)
            .or_insert_with(|| VarSlot {
                display_name: name.to_string(),
                value: Vec::new(),
            })
            .value
    }

    // ── 状态 ──

    /// 进入新状态，旧状态压栈
    pub fn push_status(&mut self, name: &str) {
        if !self.status.is_empty() {
            self.status_history.push(self.status.clone());
        }
        self.status = name.to_lowercase();
    }

    /// 回到上一个状态；栈空时无操作
    pub fn pop_status(&mut self) -> bool {
        match self.status_history.pop() {
            Some(prev) => {
                self.status = prev;
                true
            }
            None => false,
        }
    }

    // ── 任务实例 ──

    pub fn allocate_assignment_id(&mut self) -> u64 {
        let id = self.next_assignment_id;
        self.next_assignment_id += 1;
        id
    }

    /// 活动实例（Assigned / Started）
    pub fn active_assignments(&self) -> impl Iterator<Item = &AssignmentInstance> {
        self.assignments.values().filter(|a| a.phase.is_active())
    }

    /// 按种类与定义名找最新的活动实例
    pub fn find_active(&self, kind: AssignmentKind, name: &str) -> Option<&AssignmentInstance> {
        let name = name.to_lowercase();
        self.assignments
            .values()
            .rev()
            .find(|a| a.phase.is_active() && a.kind == kind && a.name == name)
    }

    /// 定时器的启用覆盖；None 表示沿用定义默认值
    pub fn timer_override(&self, name: &str) -> Option<bool> {
        self.timer_overrides.get(&name.to_lowercase()).copied()
    }
}
