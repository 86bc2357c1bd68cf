//! # 表达式模块
//!
//! 条件表达式的解析与求值。
//!
//! ## 文法
//!
//! 一条表达式至多包含一个比较运算符，按固定优先顺序扫描：
//!
//! ```text
//! ==  <=  >=  <>  <  >  =  [[  [
//! ```
//!
//! 取**最先在该顺序中找到**的运算符切分左右操作数。
//! 顺序是硬性要求：`<=` 必须先于 `<` 匹配，`==` 先于 `=`，`[[` 先于 `[`，
//! 否则短运算符会匹配到长运算符的前缀。
//!
//! ## 操作数
//!
//! 操作数按印记（sigil）解析：`#name` 计数器、`$name` 字符串、`!name` 时间戳；
//! 无印记的操作数是字面量，两侧都可数值化时按数值比较，否则按字符串比较。
//! 没有运算符的表达式按**标志存在性**测试处理。
//!
//! ## 比较策略（已定约定）
//!
//! - `=` / `<>`：字符串比较大小写不敏感
//! - `==`：大小写敏感
//! - `[`：子串包含，大小写不敏感；`[[`：大小写敏感
//! - 数值相等使用容差比较（|a−b| < 1e-9）
//!
//! 未定义的变量回退为 0 / "" / 无效时间戳，从不报错。

use chrono::NaiveDateTime;

/// 时间戳类型
pub type Timestamp = NaiveDateTime;

/// 固定的运算符扫描顺序
pub const OPERATORS: [&str; 9] = ["==", "<=", ">=", "<>", "<", ">", "=", "[[", "["];

/// 数值相等容差
const EPSILON: f64 = 1e-9;

/// 求值上下文
///
/// 提供变量查找能力。`zz` 前缀的伪变量（`#zzMerits`、`!zzDate` 等）
/// 由实现方解析，不从普通变量表读取。
pub trait EvalContext {
    /// 计数器取值（未定义回退 0）
    fn counter(&self, name: &str) -> f64;

    /// 字符串变量取值（未定义回退 ""）
    fn string_var(&self, name: &str) -> String;

    /// 时间变量取值（未定义回退 None）
    fn time_var(&self, name: &str) -> Option<Timestamp>;

    /// 标志是否存在
    fn has_flag(&self, name: &str) -> bool;
}

/// 已解析的操作数
#[derive(Debug, Clone)]
struct Operand {
    /// 文本形态（印记变量取变量值的文本形态）
    text: String,
    /// 数值形态（可数值化时）
    number: Option<f64>,
    /// 时间形态（`!` 印记或可解析为日期时间的字面量）
    time: Option<Option<Timestamp>>,
}

/// 解析单个操作数
fn resolve_operand(raw: &str, ctx: &dyn EvalContext) -> Operand {
    let raw = raw.trim();

    if let Some(name) = raw.strip_prefix('#') {
        let value = ctx.counter(name);
        return Operand {
            text: format_number(value),
            number: Some(value),
            time: None,
        };
    }

    if let Some(name) = raw.strip_prefix('$') {
        let text = ctx.string_var(name);
        let number = text.trim().parse::<f64>().ok();
        return Operand {
            text,
            number,
            time: None,
        };
    }

    if let Some(name) = raw.strip_prefix('!') {
        let value = ctx.time_var(name);
        return Operand {
            text: value.map(format_timestamp).unwrap_or_default(),
            number: None,
            time: Some(value),
        };
    }

    // 字面量
    Operand {
        text: raw.to_string(),
        number: raw.parse::<f64>().ok(),
        time: parse_timestamp(raw).map(|t| Some(t)),
    }
}

/// 求值一条表达式
///
/// 没有可识别运算符的表达式按标志存在性测试处理。
pub fn evaluate(expr: &str, ctx: &dyn EvalContext) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return false;
    }

    // 按优先顺序扫描运算符，取第一个找到的
    for op in OPERATORS {
        if let Some(pos) = expr.find(op) {
            let lhs = resolve_operand(&expr[..pos], ctx);
            let rhs = resolve_operand(&expr[pos + op.len()..], ctx);
            return compare(op, &lhs, &rhs);
        }
    }

    // 裸标志测试
    ctx.has_flag(expr)
}

fn compare(op: &str, lhs: &Operand, rhs: &Operand) -> bool {
    // 子串测试永远按字符串处理
    match op {
        "[" => {
            return lhs
                .text
                .to_lowercase()
                .contains(&rhs.text.to_lowercase());
        }
        "[[" => return lhs.text.contains(&rhs.text),
        _ => {}
    }

    // 两侧都有时间形态：按时间比较
    if let (Some(a), Some(b)) = (coerce_time(lhs), coerce_time(rhs)) {
        return compare_times(op, a, b);
    }

    // 两侧都可数值化：按数值比较
    if let (Some(a), Some(b)) = (lhs.number, rhs.number) {
        return compare_numbers(op, a, b);
    }

    compare_strings(op, &lhs.text, &rhs.text)
}

/// 当另一侧是时间时，字面量也尝试转为时间
fn coerce_time(operand: &Operand) -> Option<Option<Timestamp>> {
    operand.time
}

fn compare_times(op: &str, a: Option<Timestamp>, b: Option<Timestamp>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match op {
            "=" | "==" => a == b,
            "<>" => a != b,
            "<" => a < b,
            ">" => a > b,
            "<=" => a <= b,
            ">=" => a >= b,
            _ => false,
        },
        // 无效时间戳只在相等测试中与另一个无效时间戳相等
        (None, None) => matches!(op, "=" | "==" | "<=" | ">="),
        _ => matches!(op, "<>"),
    }
}

fn compare_numbers(op: &str, a: f64, b: f64) -> bool {
    match op {
        "=" | "==" => (a - b).abs() < EPSILON,
        "<>" => (a - b).abs() >= EPSILON,
        "<" => a < b,
        ">" => a > b,
        "<=" => a <= b + EPSILON,
        ">=" => a + EPSILON >= b,
        _ => false,
    }
}

fn compare_strings(op: &str, a: &str, b: &str) -> bool {
    match op {
        // `=` 大小写不敏感，`==` 大小写敏感
        "=" => a.eq_ignore_ascii_case(b),
        "==" => a == b,
        "<>" => !a.eq_ignore_ascii_case(b),
        "<" => a.to_lowercase() < b.to_lowercase(),
        ">" => a.to_lowercase() > b.to_lowercase(),
        "<=" => a.to_lowercase() <= b.to_lowercase(),
        ">=" => a.to_lowercase() >= b.to_lowercase(),
        _ => false,
    }
}

/// 数值的文本形态（整数值不带小数点）
pub fn format_number(value: f64) -> String {
    if (value - value.round()).abs() < EPSILON {
        format!("{}", value.round() as i64)
    } else {
        format!("{}", value)
    }
}

/// 时间戳的文本形态
pub fn format_timestamp(t: Timestamp) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// 解析日期时间字面量（`YYYY-MM-DD HH:MM:SS` 或 `YYYY-MM-DD HH:MM`）
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .ok()
}
