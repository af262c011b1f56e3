use crate::ir::Block;
use crate::ir::Operation;
use crate::ir::OperationName;
use crate::ir::Region;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use parking_lot::RwLock;
use std::fmt::Display;
use std::fmt::Formatter;

/// This is the trait that is implemented by all operations.
///
/// Note that the parser will parse the tokens into an `Operation` and the
/// dialect then wraps the `Operation` into a specific `Op` such as `FuncOp`.
pub trait Op {
    fn operation_name() -> OperationName
    where
        Self: Sized;
    /// Create an new [Op] from an [Operation].
    ///
    /// Do not call this method directly, but rather use
    /// [Self::from_operation].
    fn new(operation: Shared<Operation>) -> Self
    where
        Self: Sized;
    /// Create an [Op] from an [Operation].
    ///
    /// The default implementation for this method automatically sets the name
    /// of the operation to the name of the op. This duplication of the name is
    /// unfortunate, but necessary because it allows showing the operation name
    /// even when the [Operation] is not wrapped inside an [Op].
    fn from_operation(operation: Shared<Operation>) -> Self
    where
        Self: Sized,
    {
        operation.wr().set_name(Self::operation_name());
        Self::new(operation)
    }
    fn as_any(&self) -> &dyn std::any::Any;
    fn operation(&self) -> &Shared<Operation>;
    /// Returns the name of the operation.
    ///
    /// Unlike `Self::operation_name()`, this method is available on a `dyn Op`.
    fn name(&self) -> OperationName {
        self.operation().rd().name()
    }
    fn region(&self) -> Option<Shared<Region>> {
        self.operation().rd().region()
    }
    fn is_func(&self) -> bool {
        false
    }
    /// Whether the op has no side effects (and can be removed when unused).
    fn is_pure(&self) -> bool {
        false
    }
    /// Fold the op into something simpler.
    ///
    /// Returns whether the IR was changed.
    fn canonicalize(&self) -> Result<bool> {
        Ok(false)
    }
    /// Insert `earlier` before `self` inside `self`'s parent block.
    fn insert_before(&self, earlier: Shared<dyn Op>) -> Result<()> {
        let block = self.parent_block()?;
        let result = block.rd().insert_before(earlier, self.operation());
        result
    }
    /// Remove the operation from its parent block.
    fn remove(&self) -> Result<()> {
        let block = self.parent_block()?;
        block.rd().remove(self.operation())?;
        self.operation().wr().set_parent(None);
        Ok(())
    }
    fn parent_block(&self) -> Result<Shared<Block>> {
        match self.operation().rd().parent() {
            Some(block) => Ok(block),
            None => Err(anyhow::anyhow!("{} has no parent block", self.name())),
        }
    }
    /// Return ops that are children of this op (inside blocks that are inside
    /// the region).
    fn ops(&self) -> Vec<Shared<dyn Op>> {
        match self.region() {
            Some(region) => region.rd().ops(),
            None => vec![],
        }
    }
    /// Return the result at the given index.
    fn result(&self, index: usize) -> Option<Shared<Value>> {
        self.operation().rd().result(index)
    }
    /// Display the operation with the given indentation.
    ///
    /// This method is usually called on a top-level op via `Display::fmt`,
    /// which then calls `display` with `indent` 0.  Next, this method calls
    /// `display` recursively while continuously increasing the indentation
    /// level. The caller is responsible for writing the indentation of the
    /// first line.
    fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        self.operation().rd().display(f, indent)
    }
}

impl Display for dyn Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f, 0)
    }
}

/// Wrap an op into a [Shared] and point the results to it.
pub fn into_shared<O: Op + 'static>(op: O) -> Shared<dyn Op> {
    let results = op.operation().rd().results();
    let op: Shared<dyn Op> = Shared::new(RwLock::new(op));
    results.set_defining_op(op.clone());
    op
}

/// Return `op` followed by all its nested ops in pre-order.
pub fn walk(op: &Shared<dyn Op>) -> Vec<Shared<dyn Op>> {
    let mut result = vec![op.clone()];
    let children = op.rd().ops();
    for child in children.iter() {
        result.extend(walk(child));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::func::ReturnOp;
    use crate::dialect::torch::ConstantNoneOp;
    use crate::parser::DefaultParserDispatch;
    use crate::parser::Parser;

    #[test]
    fn test_insert_before() {
        let src = "func.func @f() {\nreturn\n}";
        let module = Parser::<DefaultParserDispatch>::parse(src).unwrap();
        let ret = walk(&module)
            .into_iter()
            .find(|op| op.rd().as_any().is::<ReturnOp>())
            .unwrap();
        let none = into_shared(ConstantNoneOp::build());
        none.rd().result(0).unwrap().wr().set_name("%0");
        ret.rd().insert_before(none.clone()).unwrap();

        assert!(none.rd().parent_block().is_ok());
        let actual = module.rd().to_string();
        let lines = actual.lines().map(|line| line.trim()).collect::<Vec<_>>();
        assert_eq!(lines[2..4], ["%0 = torch.constant.none", "return"]);
    }
}
