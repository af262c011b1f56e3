//! Replace non-value tensors by value tensors where the aliasing is local.
//!
//! A `torch.copy.to_tensor` starts a region in which a tensor can be aliased
//! and mutated. When every user of that region is understood, the copies are
//! dropped, views take value semantics, overwrites become plain value
//! replacements, and returns get a copy back to the type they promised.

use crate::convert::apply_rewrites;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::dialect::func::ReturnOp;
use crate::dialect::torch::as_tensor;
use crate::dialect::torch::copy_tensor_to_type;
use crate::dialect::torch::is_non_value_tensor;
use crate::dialect::torch::CopyToNonValueTensorOp;
use crate::dialect::torch::CopyToValueTensorOp;
use crate::dialect::torch::OverwriteTensorContentsOp;
use crate::dialect::torch::TensorStaticInfoCastOp;
use crate::dialect::torch::ValueTensorType;
use crate::ir::Block;
use crate::ir::Op;
use crate::ir::OpBuilder;
use crate::ir::Type;
use crate::ir::Uses;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Ops that only change the static information of a tensor.
fn is_cast_like(op: &dyn Op) -> bool {
    op.as_any().is::<TensorStaticInfoCastOp>()
}

/// Ops whose result aliases their first operand.
fn is_view_like(op: &dyn Op) -> bool {
    is_cast_like(op)
}

fn same_op(a: &Shared<dyn Op>, b: &Shared<dyn Op>) -> bool {
    Arc::ptr_eq(a.rd().operation(), b.rd().operation())
}

fn first_operand(op: &Shared<dyn Op>) -> Option<Shared<Value>> {
    op.rd().operation().rd().operand_values().first().cloned()
}

/// The ops in the block of `value` that use it, with the operand index.
///
/// Returns `None` when some use is nested in a region of another op.
fn users(value: &Shared<Value>) -> Option<Vec<(Shared<dyn Op>, usize)>> {
    let block = value.rd().parent_block()?;
    let mut users = vec![];
    for op in block.rd().ops().rd().iter() {
        let operands = op.rd().operation().rd().operand_values();
        for (index, operand) in operands.iter().enumerate() {
            if Arc::ptr_eq(operand, value) {
                users.push((op.clone(), index));
            }
        }
    }
    if users.len() == value.uses().len() {
        Some(users)
    } else {
        None
    }
}

fn position(block: &Shared<Block>, op: &Shared<dyn Op>) -> Result<usize> {
    let index = block.rd().index_of(op.rd().operation());
    match index {
        Some(index) => Ok(index),
        None => Err(anyhow::anyhow!("{} not found in its parent block", op.rd().name())),
    }
}

/// The values that `value` was cast from by a chain of cast-like ops.
fn cast_like_aliases_of(value: &Shared<Value>) -> Vec<Shared<Value>> {
    let mut aliases = vec![];
    let mut current = value.rd().defining_op();
    while let Some(op) = current.take() {
        if !is_cast_like(&*op.rd()) {
            break;
        }
        if let Some(operand) = first_operand(&op) {
            current = operand.rd().defining_op();
            aliases.push(operand);
        }
    }
    aliases
}

fn contains(values: &[Shared<Value>], value: &Shared<Value>) -> bool {
    values.iter().any(|v| Arc::ptr_eq(v, value))
}

/// Give the result of a view the value-semantic variant of its type.
fn set_value_semantics(view: &Shared<dyn Op>) {
    let result = match view.rd().result(0) {
        Some(result) => result,
        None => return,
    };
    let typ = result.rd().typ();
    let new_type: Option<Arc<dyn Type>> = match as_tensor(&typ) {
        Some(tensor) if !tensor.has_value_semantics() => {
            Some(Arc::new(ValueTensorType::new(tensor.info().clone())))
        }
        _ => None,
    };
    if let Some(new_type) = new_type {
        result.wr().set_type(new_type);
    }
}

/// Replace the result of `op` by its first operand and remove `op`.
fn replace_by_operand(op: &Shared<dyn Op>) -> Result<()> {
    let result = op.rd().result(0);
    if let (Some(result), Some(operand)) = (result, first_operand(op)) {
        result.replace_all_uses_with(&operand);
    }
    op.rd().remove()
}

/// Copy the operands of `ret` at `indexes` back to their recorded types.
fn restore_return_types(ret: &Shared<dyn Op>, types: &[(usize, Arc<dyn Type>)]) -> Result<()> {
    let mut builder = OpBuilder::before(ret)?;
    for (index, typ) in types {
        let operand = ret.rd().operation().rd().operands().get(*index);
        if let Some(operand) = operand {
            let value = operand.rd().value();
            let value = copy_tensor_to_type(&mut builder, typ, value)?;
            operand.wr().set_value(value);
        }
    }
    Ok(())
}

fn non_value_return_types(ret: &Shared<dyn Op>) -> Vec<(usize, Arc<dyn Type>)> {
    let types = ret.rd().operation().rd().operand_types();
    types
        .into_iter()
        .enumerate()
        .filter(|(_, typ)| is_non_value_tensor(typ))
        .collect()
}

/// The users of a `torch.copy.to_tensor` and its aliases, in block order.
#[derive(Default)]
struct Slice {
    copy_like_ops: Vec<Shared<dyn Op>>,
    view_like_ops: Vec<Shared<dyn Op>>,
    overwrite_ops: Vec<Shared<dyn Op>>,
    return_op: Option<Shared<dyn Op>>,
}

/// Collect the ops that use `root` or a view of it, with the aliases they
/// use. Returns `None` when a use is outside the block of `root`.
fn alias_users(root: &Shared<Value>) -> Option<Vec<(Shared<dyn Op>, Vec<Shared<Value>>)>> {
    let mut used_by: Vec<(Shared<dyn Op>, Vec<Shared<Value>>)> = vec![];
    let mut work_list = vec![root.clone()];
    while let Some(value) = work_list.pop() {
        for (user, _) in users(&value)? {
            if is_view_like(&*user.rd()) {
                // A view that already produces a value tensor does not alias.
                if let Some(result) = user.rd().result(0) {
                    if is_non_value_tensor(&result.rd().typ()) {
                        work_list.push(result);
                    }
                }
            }
            match used_by.iter_mut().find(|(op, _)| same_op(op, &user)) {
                Some((_, aliases)) => aliases.push(value.clone()),
                None => used_by.push((user, vec![value.clone()])),
            }
        }
    }
    Some(used_by)
}

/// Walk the users of `copy` in block order while tracking which aliases of
/// the copied tensor are valid at each point.
///
/// Returns `None` when the users cannot be rewritten to value semantics.
fn interpret_slice(copy: &Shared<dyn Op>) -> Result<Option<Slice>> {
    let root = match copy.rd().result(0) {
        Some(root) => root,
        None => return Ok(None),
    };
    let used_by = match alias_users(&root) {
        Some(used_by) => used_by,
        None => {
            debug!("can only analyze within a single basic block");
            return Ok(None);
        }
    };
    // Returns have to keep their type so there is nothing to gain.
    if let [(user, _)] = used_by.as_slice() {
        if user.rd().as_any().is::<ReturnOp>() {
            return Ok(None);
        }
    }
    let block = copy.rd().parent_block()?;
    let mut sorted = vec![];
    for (user, aliases) in used_by {
        sorted.push((position(&block, &user)?, user, aliases));
    }
    sorted.sort_by_key(|(position, _, _)| *position);

    let mut slice = Slice::default();
    let mut available = vec![root];
    for (_, user, aliases) in sorted {
        if aliases.iter().any(|alias| !contains(&available, alias)) {
            debug!("operand of {} is not a valid tensor alias", user.rd().name());
            return Ok(None);
        }
        let op = user.rd();
        if is_view_like(&*op) {
            if let Some(result) = op.result(0) {
                if is_non_value_tensor(&result.rd().typ()) {
                    available.push(result);
                }
            }
            slice.view_like_ops.push(user.clone());
        } else if op.as_any().is::<CopyToValueTensorOp>() {
            slice.copy_like_ops.push(user.clone());
        } else if let Some(overwrite) = op.as_any().downcast_ref::<OverwriteTensorContentsOp>() {
            let overwritten = match overwrite.overwritten() {
                Some(overwritten) => overwritten,
                None => return Ok(None),
            };
            available = cast_like_aliases_of(&overwritten);
            available.push(overwritten);
            slice.overwrite_ops.push(user.clone());
        } else if op.as_any().is::<ReturnOp>() {
            slice.return_op = Some(user.clone());
        } else {
            debug!("unsupported op `{}` during abstract analysis", op.name());
            return Ok(None);
        }
    }
    Ok(Some(slice))
}

/// Rewrite the users of a `torch.copy.to_tensor` to value semantics when all
/// of them sit in the same block and every alias they use is still valid.
pub struct AbstractlyInterpretCopyUsers;

impl AbstractlyInterpretCopyUsers {
    fn rewrite_slice(copy: &Shared<dyn Op>, slice: Slice) -> Result<()> {
        let return_types = match &slice.return_op {
            Some(ret) => non_value_return_types(ret),
            None => vec![],
        };
        // Overwrites go first since the other rewrites change which operands
        // are non-value tensors.
        for overwrite in slice.overwrite_ops.iter().rev() {
            let (value, overwritten) = {
                let op = overwrite.rd();
                let operands = op.operation().rd().operand_values();
                match operands.as_slice() {
                    [value, overwritten] => (value.clone(), overwritten.clone()),
                    _ => return Err(anyhow::anyhow!("{} expects two operands", op.name())),
                }
            };
            let block = overwrite.rd().parent_block()?;
            let start = position(&block, overwrite)?;
            let mut aliases = cast_like_aliases_of(&overwritten);
            aliases.push(overwritten);
            for alias in aliases {
                for (user, index) in users(&alias).unwrap_or_default() {
                    if position(&block, &user)? < start {
                        continue;
                    }
                    let operand = user.rd().operation().rd().operands().get(index);
                    if let Some(operand) = operand {
                        operand.wr().set_value(value.clone());
                    }
                }
            }
            overwrite.rd().remove()?;
        }
        replace_by_operand(copy)?;
        for op in slice.copy_like_ops.iter() {
            replace_by_operand(op)?;
        }
        for view in slice.view_like_ops.iter() {
            set_value_semantics(view);
        }
        if let Some(ret) = &slice.return_op {
            restore_return_types(ret, &return_types)?;
        }
        Ok(())
    }
}

impl Rewrite for AbstractlyInterpretCopyUsers {
    fn name(&self) -> &'static str {
        "maximize_value_semantics::AbstractlyInterpretCopyUsers"
    }
    fn is_match(&self, op: &dyn Op) -> Result<bool> {
        Ok(op.as_any().is::<CopyToNonValueTensorOp>())
    }
    fn rewrite(&self, op: Shared<dyn Op>) -> Result<RewriteResult> {
        match interpret_slice(&op)? {
            Some(slice) => {
                Self::rewrite_slice(&op, slice)?;
                Ok(RewriteResult::changed(op))
            }
            None => Ok(RewriteResult::Unchanged),
        }
    }
}

/// The tree of views that hangs off a `torch.copy.to_tensor`.
#[derive(Default)]
struct Subgraph {
    copies_to_value: Vec<Shared<dyn Op>>,
    views: Vec<Shared<dyn Op>>,
    returns: Vec<Shared<dyn Op>>,
}

fn view_like_subgraph(copy: &Shared<dyn Op>) -> Option<Subgraph> {
    let root = copy.rd().result(0)?;
    let mut subgraph = Subgraph::default();
    let mut work_list = users(&root)?;
    while let Some((op, _)) = work_list.pop() {
        let guard = op.rd();
        if guard.as_any().is::<CopyToValueTensorOp>() {
            subgraph.copies_to_value.push(op.clone());
        } else if guard.as_any().is::<ReturnOp>() {
            if !subgraph.returns.iter().any(|ret| same_op(ret, &op)) {
                subgraph.returns.push(op.clone());
            }
        } else if is_view_like(&*guard) {
            subgraph.views.push(op.clone());
            let result = guard.result(0)?;
            work_list.extend(users(&result)?);
        } else {
            debug!("{} is not a view or a copy", guard.name());
            return None;
        }
    }
    if subgraph.copies_to_value.is_empty() && subgraph.views.is_empty() {
        return None;
    }
    Some(subgraph)
}

/// Rewrite a `torch.copy.to_tensor` whose transitive users are only views,
/// `torch.copy.to_vtensor`, and returns.
pub struct RewriteViewLikeSubgraph;

impl Rewrite for RewriteViewLikeSubgraph {
    fn name(&self) -> &'static str {
        "maximize_value_semantics::RewriteViewLikeSubgraph"
    }
    fn is_match(&self, op: &dyn Op) -> Result<bool> {
        Ok(op.as_any().is::<CopyToNonValueTensorOp>())
    }
    fn rewrite(&self, op: Shared<dyn Op>) -> Result<RewriteResult> {
        let subgraph = match view_like_subgraph(&op) {
            Some(subgraph) => subgraph,
            None => return Ok(RewriteResult::Unchanged),
        };
        let mut aliases = vec![];
        aliases.extend(op.rd().result(0));
        for view in subgraph.views.iter() {
            aliases.extend(view.rd().result(0));
        }
        let mut return_types = vec![];
        for ret in subgraph.returns.iter() {
            let operands = ret.rd().operation().rd().operand_values();
            let types = operands
                .iter()
                .enumerate()
                .filter(|(_, operand)| contains(&aliases, operand))
                .map(|(index, operand)| (index, operand.rd().typ()))
                .collect::<Vec<_>>();
            return_types.push(types);
        }

        for copy in subgraph.copies_to_value.iter() {
            replace_by_operand(copy)?;
        }
        replace_by_operand(&op)?;
        for view in subgraph.views.iter() {
            set_value_semantics(view);
        }
        for (ret, types) in subgraph.returns.iter().zip(return_types.iter()) {
            restore_return_types(ret, types)?;
        }
        Ok(RewriteResult::changed(op))
    }
}

pub struct MaximizeValueSemantics;

impl Pass for MaximizeValueSemantics {
    const NAME: &'static str = "torch-maximize-value-semantics";
    fn convert(op: Shared<dyn Op>) -> Result<RewriteResult> {
        let rewrites: Vec<&dyn Rewrite> =
            vec![&AbstractlyInterpretCopyUsers, &RewriteViewLikeSubgraph];
        apply_rewrites(op, &rewrites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DefaultParserDispatch;
    use crate::parser::Parser;

    fn func_body(src: &str) -> String {
        let module = Parser::<DefaultParserDispatch>::parse(src).unwrap();
        let rewrites: Vec<&dyn Rewrite> = vec![&RewriteViewLikeSubgraph];
        apply_rewrites(module.clone(), &rewrites).unwrap();
        let text = module.rd().to_string();
        text
    }

    #[test]
    fn test_view_like_subgraph() {
        let src = "func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.tensor {\n\
                   %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>\n\
                   %1 = torch.tensor_static_info_cast %0 : !torch.tensor<[2],f32> to !torch.tensor\n\
                   %2 = torch.copy.to_vtensor %1 : !torch.vtensor\n\
                   \"test.use\"(%2) : (!torch.vtensor) -> ()\n\
                   return %1 : !torch.tensor\n\
                   }";
        let actual = func_body(src);
        let lines = actual.lines().map(|line| line.trim()).collect::<Vec<_>>();
        assert_eq!(
            lines[2..6],
            [
                "%1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor",
                "\"test.use\"(%1) : (!torch.vtensor) -> ()",
                "%2 = torch.copy.to_tensor %1 : !torch.tensor",
                "return %2 : !torch.tensor",
            ]
        );
    }

    #[test]
    fn test_view_like_subgraph_rejects_other_users() {
        let src = "func.func @f(%arg0: !torch.vtensor) {\n\
                   %0 = torch.copy.to_tensor %arg0 : !torch.tensor\n\
                   %1 = torch.copy.to_vtensor %0 : !torch.vtensor\n\
                   \"test.use\"(%0) : (!torch.tensor) -> ()\n\
                   return\n\
                   }";
        let actual = func_body(src);
        assert!(actual.contains("%0 = torch.copy.to_tensor %arg0 : !torch.tensor"));
        assert!(actual.contains("%1 = torch.copy.to_vtensor %0 : !torch.vtensor"));
    }
}
