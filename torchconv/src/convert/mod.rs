//! Passes that rewrite the IR.
//!
//! Two styles of rewriting live here. [apply_rewrites] repeatedly applies
//! small local [Rewrite]s until nothing changes (this drives canonicalization
//! and [MaximizeValueSemantics]).
//! The [dialect_conversion] engine instead converts types across function
//! boundaries in one planned sweep.

use crate::ir::walk;
use crate::ir::Op;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use tracing::debug;
use tracing::warn;

mod adjust_calling_conventions;
pub mod dialect_conversion;
mod maximize_value_semantics;

pub use adjust_calling_conventions::adjust_calling_conventions;
pub use adjust_calling_conventions::collect_type_bounds;
pub use adjust_calling_conventions::AdjustCallingConventions;
pub use adjust_calling_conventions::TypeBoundMap;
pub use adjust_calling_conventions::TYPE_BOUND;
pub use maximize_value_semantics::AbstractlyInterpretCopyUsers;
pub use maximize_value_semantics::MaximizeValueSemantics;
pub use maximize_value_semantics::RewriteViewLikeSubgraph;

/// Outcome of a rewrite or a pass.
///
/// `Changed` carries the op that holds the rewritten IR. That is the op the
/// rewrite was applied to, except for passes that replace the top-level op.
pub enum RewriteResult {
    Changed(Shared<dyn Op>),
    Unchanged,
}

impl RewriteResult {
    pub fn changed(op: Shared<dyn Op>) -> Self {
        RewriteResult::Changed(op)
    }
    pub fn is_changed(&self) -> bool {
        matches!(self, RewriteResult::Changed(_))
    }
}

/// A local rewrite that [apply_rewrites] tries on every op.
pub trait Rewrite: Send + Sync {
    /// Used in the debug logs.
    fn name(&self) -> &'static str;
    /// Whether `rewrite` should be called for `op`. Must not mutate the IR.
    fn is_match(&self, op: &dyn Op) -> Result<bool>;
    fn rewrite(&self, op: Shared<dyn Op>) -> Result<RewriteResult>;
}

const MAX_SWEEPS: usize = 10240;

/// Run `rewrite` on the ops of `root` in pre-order and stop at the first op
/// that it changes.
///
/// Ops can be removed by a rewrite, so the sweep is restarted from `root`
/// after every change instead of continuing with a stale op list.
fn sweep(root: &Shared<dyn Op>, rewrite: &dyn Rewrite) -> Result<bool> {
    for op in walk(root) {
        let matched = rewrite.is_match(&*op.rd())?;
        if !matched {
            continue;
        }
        if rewrite.rewrite(op.clone())?.is_changed() {
            debug!("{} changed {}", rewrite.name(), op.rd().name());
            return Ok(true);
        }
    }
    Ok(false)
}

/// Apply `rewrites` to `root` until none of them changes the IR.
///
/// Earlier rewrites in the list take precedence over later ones.
pub fn apply_rewrites(root: Shared<dyn Op>, rewrites: &[&dyn Rewrite]) -> Result<RewriteResult> {
    let mut changes = 0;
    while changes < MAX_SWEEPS {
        let mut changed = false;
        for rewrite in rewrites {
            if sweep(&root, *rewrite)? {
                changed = true;
                break;
            }
        }
        if !changed {
            break;
        }
        changes += 1;
    }
    if changes == MAX_SWEEPS {
        warn!("Stopped rewriting after {MAX_SWEEPS} changes");
    }
    if changes == 0 {
        Ok(RewriteResult::Unchanged)
    } else {
        debug!("Applied {changes} rewrites");
        Ok(RewriteResult::changed(root))
    }
}

/// A named transformation that runs on the top-level op (usually a module).
pub trait Pass {
    const NAME: &'static str;
    fn convert(op: Shared<dyn Op>) -> Result<RewriteResult>;
}
