//! # Select 模块
//!
//! 共享的选择工具：均匀随机、加权随机、居中随机、
//! 以及消息组 / 弹窗组 / 指令集共用的选择策略分发。

use crate::runtime::env::RandomSource;
use crate::script::SelectMode;

/// 均匀随机取一个下标；空切片返回 None
pub fn uniform_index(rng: &mut dyn RandomSource, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(rng.uniform(0, len as i64 - 1) as usize)
}

/// 加权随机取一个下标
///
/// 权重非正的条目不参与抽取；全部权重非正时退化为均匀随机。
pub fn weighted_index(rng: &mut dyn RandomSource, weights: &[i64]) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: i64 = weights.iter().filter(|&&w| w > 0).sum();
    if total <= 0 {
        return uniform_index(rng, weights.len());
    }

    let mut roll = rng.uniform(1, total);
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0 {
            continue;
        }
        roll -= w;
        if roll <= 0 {
            return Some(i);
        }
    }
    // roll 在 [1, total] 内必然已命中；随机源越界时落到末尾条目
    Some(weights.len() - 1)
}

/// 居中随机：两次均匀抽取的平均值
///
/// 结果向范围中部聚集，用于定时器间隔等"大致居中"的抽取。
pub fn centered(rng: &mut dyn RandomSource, min: i64, max: i64) -> i64 {
    if min >= max {
        return min;
    }
    let a = rng.uniform(min, max);
    let b = rng.uniform(min, max);
    (a + b) / 2
}

/// 按选择策略从候选集取出要执行的下标
///
/// `All` 返回全部下标、`First` 返回第一个、`Random` 均匀取一个。
pub fn dispatch(mode: SelectMode, rng: &mut dyn RandomSource, len: usize) -> Vec<usize> {
    match mode {
        SelectMode::All => (0..len).collect(),
        SelectMode::First => {
            if len == 0 {
                Vec::new()
            } else {
                vec![0]
            }
        }
        SelectMode::Random => uniform_index(rng, len).into_iter().collect(),
    }
}
