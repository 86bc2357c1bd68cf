//! # Section 模块
//!
//! 行式脚本文本的第一层结构：把文本切分为段（section），
//! 每段是一个**保留文件顺序**、键大小写不敏感、键可重复的多值映射。
//!
//! ## 文法
//!
//! ```text
//! [section-name]      段头；段名小写化
//! key=value           条目；键值两侧去空白；同键可多次出现，值按文件顺序累积
//! %include=path       包含指令；绝对路径原样使用，否则相对于当前文件所在目录
//! # 注释 / ; 注释      跳过
//! ```
//!
//! 段外的裸行被丢弃。被包含文件中的同名段并入包含方的段，条目追加在后。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;

/// 段内的一个条目
///
/// 扁平条目列表同时承担两种视角：
/// - 按键聚合的多值查找（[`Section::values`]）
/// - 跨键交错的文件顺序流（`Case=` 块提取依赖这一顺序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// 键（小写）
    pub key: String,
    /// 键的原始写法（保留大小写，用于诊断显示）
    pub display_key: String,
    /// 值（两侧去空白后的原文）
    pub value: String,
}

/// 一个段：有序、键大小写不敏感的多值映射
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// 段名（小写）
    pub name: String,
    /// 条目，保留文件顺序（含被包含文件带来的追加）
    pub entries: Vec<Entry>,
}

impl Section {
    /// 创建空段
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            entries: Vec::new(),
        }
    }

    /// 追加一个条目
    pub fn push(&mut self, key: &str, value: &str) {
        self.entries.push(Entry {
            key: key.to_lowercase(),
            display_key: key.to_string(),
            value: value.to_string(),
        });
    }

    /// 按键查找所有值（文件顺序）
    pub fn values(&self, key: &str) -> Vec<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .filter(|e| e.key == key)
            .map(|e| e.value.as_str())
            .collect()
    }

    /// 按键查找第一个值
    pub fn first(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// 按键查找最后一个值
    ///
    /// 部分声明式字段允许被后续同键条目覆盖，取最后一个。
    pub fn last(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .rev()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// 是否包含某个键
    pub fn contains(&self, key: &str) -> bool {
        self.first(key).is_some()
    }
}

/// 段读取结果
#[derive(Debug, Clone, Default)]
pub struct SectionMap {
    /// 段，按段名索引；段名在文件中首次出现的顺序由 `order` 记录
    pub sections: BTreeMap<String, Section>,
    /// 段名的出现顺序
    pub order: Vec<String>,
    /// 读取过程中产生的诊断（不可读的包含目标等）
    pub diagnostics: Vec<Diagnostic>,
}

impl SectionMap {
    /// 按名取段（段名大小写不敏感）
    pub fn get(&self, name: &str) -> Option<&Section> {
        self.sections.get(&name.to_lowercase())
    }

    /// 按出现顺序遍历段
    pub fn iter_ordered(&self) -> impl Iterator<Item = &Section> {
        self.order.iter().filter_map(|name| self.sections.get(name))
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let name = name.to_lowercase();
        if !self.sections.contains_key(&name) {
            self.order.push(name.clone());
            self.sections.insert(name.clone(), Section::new(&name));
        }
        self.sections.get_mut(&name).unwrap()
    }
}

/// 从文件读取段
///
/// 根文件不可读时返回 `Err`；包含目标不可读只产生诊断，读取继续。
pub fn read_file(path: &Path) -> Result<SectionMap, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut map = SectionMap::default();
    let mut current: Option<String> = None;
    read_into(&mut map, &mut current, &text, path.parent());
    Ok(map)
}

/// 从字符串读取段（无包含上下文，`%include` 相对当前目录解析）
pub fn read_str(text: &str) -> SectionMap {
    let mut map = SectionMap::default();
    let mut current: Option<String> = None;
    read_into(&mut map, &mut current, text, None);
    map
}

fn read_into(map: &mut SectionMap, current: &mut Option<String>, text: &str, dir: Option<&Path>) {
    for raw_line in text.lines() {
        let line = raw_line.trim();

        // 空行与注释
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        // 包含指令：在当前段上下文中展开
        if let Some(target) = strip_prefix_ignore_case(line, "%include=") {
            include_file(map, current, target.trim(), dir);
            continue;
        }

        // 段头
        if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
            let name = line[1..line.len() - 1].trim().to_lowercase();
            map.section_mut(&name);
            *current = Some(name);
            continue;
        }

        // key=value 条目
        if let Some((key, value)) = line.split_once('=') {
            match current {
                Some(name) => {
                    let name = name.clone();
                    map.section_mut(&name).push(key.trim(), value.trim());
                }
                // 段外的行被丢弃
                None => {}
            }
            continue;
        }

        // 既不是段头也不是条目的行被丢弃
    }
}

fn include_file(map: &mut SectionMap, current: &mut Option<String>, target: &str, dir: Option<&Path>) {
    let path = resolve_include(target, dir);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            // 被包含文件共享当前段上下文，同名段条目追加合并
            read_into(map, current, &text, path.parent());
        }
        Err(e) => {
            map.diagnostics.push(Diagnostic::warn(format!(
                "包含目标 '{}' 不可读: {}",
                target, e
            )));
        }
    }
}

/// 解析包含路径：绝对路径原样使用，否则相对于包含文件所在目录
fn resolve_include(target: &str, dir: Option<&Path>) -> PathBuf {
    let raw = PathBuf::from(target);
    if raw.is_absolute() {
        return raw;
    }
    match dir {
        Some(dir) => dir.join(raw),
        None => raw,
    }
}

/// 检查字符串是否以指定前缀开头（大小写不敏感）
pub fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.chars()
            .zip(prefix.chars())
            .take(prefix.chars().count())
            .all(|(a, b)| a.eq_ignore_ascii_case(&b))
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
