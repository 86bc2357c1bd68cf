//! # 编译辅助函数
//!
//! 声明式键值的手写解析函数，无正则依赖。
//! 解析失败一律回退默认值并由调用方记录诊断，从不中断编译。

use chrono::NaiveTime;

use crate::script::defs::{Range, TimeWindow};

/// 解析整数；失败返回 None
pub fn parse_i64(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    // 允许写成小数的整数（"3.0"）
    s.parse::<f64>().ok().map(|v| v.round() as i64)
}

/// 解析布尔值（yes/no、true/false、on/off、1/0）
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// 解析 `Min,Max` 范围；单值时 min=max
pub fn parse_range(s: &str) -> Option<Range> {
    let mut parts = s.splitn(2, ',');
    let first = parse_i64(parts.next()?)?;
    match parts.next() {
        Some(second) => {
            let second = parse_i64(second)?;
            Some(Range::new(first.min(second), first.max(second)))
        }
        None => Some(Range::single(first)),
    }
}

/// 解析 `HH:MM` 时刻
pub fn parse_time_of_day(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.trim().split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    NaiveTime::from_hms_opt(h, m, 0)
}

/// 解析 `Start,End` 时间窗
pub fn parse_time_window(s: &str) -> Option<TimeWindow> {
    let (start, end) = s.split_once(',')?;
    Some(TimeWindow {
        start: parse_time_of_day(start)?,
        end: parse_time_of_day(end)?,
    })
}

/// 逗号分隔的名字列表（小写化、去空白、丢弃空项）
pub fn parse_name_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// 在第一个逗号处切分，保留其余部分中的逗号
pub fn split_first(s: &str) -> (&str, Option<&str>) {
    match s.split_once(',') {
        Some((head, rest)) => (head.trim(), Some(rest.trim())),
        None => (s.trim(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_i64() {
        assert_eq!(parse_i64("42"), Some(42));
        assert_eq!(parse_i64(" -3 "), Some(-3));
        assert_eq!(parse_i64("3.7"), Some(4));
        assert_eq!(parse_i64("abc"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_parse_range() {
        let r = parse_range("1,20").unwrap();
        assert_eq!((r.min, r.max), (1, 20));

        // 单值范围复制为 min=max
        let r = parse_range("5").unwrap();
        assert_eq!((r.min, r.max), (5, 5));

        // 颠倒的端点被归一化
        let r = parse_range("9,2").unwrap();
        assert_eq!((r.min, r.max), (2, 9));

        assert!(parse_range("x,y").is_none());
    }

    #[test]
    fn test_parse_time_window() {
        let w = parse_time_window("07:30,22:00").unwrap();
        assert_eq!(w.start, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(w.end, NaiveTime::from_hms_opt(22, 0, 0).unwrap());
        assert!(parse_time_window("0730").is_none());
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(
            parse_name_list("Hands, Mouth ,"),
            vec!["hands".to_string(), "mouth".to_string()]
        );
        assert!(parse_name_list(" ").is_empty());
    }

    #[test]
    fn test_split_first_preserves_commas() {
        let (head, rest) = split_first("name,a,b,c");
        assert_eq!(head, "name");
        assert_eq!(rest, Some("a,b,c"));

        let (head, rest) = split_first("alone");
        assert_eq!(head, "alone");
        assert_eq!(rest, None);
    }
}
