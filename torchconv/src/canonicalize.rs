use crate::convert::apply_rewrites;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::ir::Op;
use crate::ir::Uses;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;

/// Calls the op-specific folds (see [Op::canonicalize]).
pub struct CanonicalizeOp;

impl Rewrite for CanonicalizeOp {
    fn name(&self) -> &'static str {
        "canonicalize::CanonicalizeOp"
    }
    fn is_match(&self, _op: &dyn Op) -> Result<bool> {
        Ok(true)
    }
    fn rewrite(&self, op: Shared<dyn Op>) -> Result<RewriteResult> {
        let changed = op.rd().canonicalize()?;
        if changed {
            Ok(RewriteResult::changed(op))
        } else {
            Ok(RewriteResult::Unchanged)
        }
    }
}

/// Removes pure ops whose results are not used.
pub struct DeadCodeElimination;

impl Rewrite for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "canonicalize::DeadCodeElimination"
    }
    fn is_match(&self, op: &dyn Op) -> Result<bool> {
        if !op.is_pure() {
            return Ok(false);
        }
        let results = op.operation().rd().results().to_vec();
        Ok(!results.is_empty() && results.iter().all(|result| !result.has_uses()))
    }
    fn rewrite(&self, op: Shared<dyn Op>) -> Result<RewriteResult> {
        op.rd().remove()?;
        Ok(RewriteResult::changed(op))
    }
}

pub struct Canonicalize;

impl Pass for Canonicalize {
    const NAME: &'static str = "canonicalize";
    fn convert(op: Shared<dyn Op>) -> Result<RewriteResult> {
        let rewrites: Vec<&dyn Rewrite> = vec![&CanonicalizeOp, &DeadCodeElimination];
        apply_rewrites(op, &rewrites)
    }
}
