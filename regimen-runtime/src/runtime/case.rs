//! # Case 模块
//!
//! Case 块的分支求值：先算出符合条件的分支子集，
//! 再按块的选择策略（All / First / Random）决定执行哪些分支。

use crate::runtime::env::RandomSource;
use crate::runtime::select;
use crate::script::defs::{Branch, BranchTag, CaseBlock};
use crate::script::expr::{EvalContext, evaluate};

/// 分支是否符合条件
pub fn branch_eligible(branch: &Branch, ctx: &dyn EvalContext) -> bool {
    let conds = &branch.conditions;
    match branch.tag {
        BranchTag::When => conds.first().is_some_and(|c| evaluate(c, ctx)),
        BranchTag::WhenNot => conds.first().is_some_and(|c| !evaluate(c, ctx)),
        BranchTag::WhenAll => !conds.is_empty() && conds.iter().all(|c| evaluate(c, ctx)),
        BranchTag::WhenNotAll => conds.is_empty() || !conds.iter().all(|c| evaluate(c, ctx)),
        BranchTag::WhenAny => conds.iter().any(|c| evaluate(c, ctx)),
        BranchTag::WhenNone => !conds.iter().any(|c| evaluate(c, ctx)),
        BranchTag::WhenRandom => true,
    }
}

/// 求值一个 Case 块，返回要执行的分支（按声明顺序）
///
/// 没有符合条件的分支时返回空——块整体无操作。
/// 条件子集每次求值只计算一次，选择策略作用在该子集上。
pub fn eligible_branches<'a>(
    block: &'a CaseBlock,
    ctx: &dyn EvalContext,
    rng: &mut dyn RandomSource,
) -> Vec<&'a Branch> {
    let eligible: Vec<&Branch> = block
        .branches
        .iter()
        .filter(|b| branch_eligible(b, ctx))
        .collect();

    select::dispatch(block.mode, rng, eligible.len())
        .into_iter()
        .map(|i| eligible[i])
        .collect()
}
