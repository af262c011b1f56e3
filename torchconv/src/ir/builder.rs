use crate::ir::into_shared;
use crate::ir::Block;
use crate::ir::Op;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;

/// Insertion point for new ops.
///
/// Every inserted op is placed after the previously inserted one, so a
/// sequence of `insert` calls keeps the order in which the ops were created.
pub struct OpBuilder {
    block: Shared<Block>,
    index: usize,
}

impl OpBuilder {
    pub fn at_block_start(block: Shared<Block>) -> Self {
        OpBuilder { block, index: 0 }
    }
    /// Insert new ops directly before `op`.
    pub fn before(op: &Shared<dyn Op>) -> Result<Self> {
        let block = op.rd().parent_block()?;
        let index = block.rd().index_of(op.rd().operation());
        match index {
            Some(index) => Ok(OpBuilder { block, index }),
            None => Err(anyhow::anyhow!(
                "{} not found in its parent block",
                op.rd().name()
            )),
        }
    }
    pub fn block(&self) -> Shared<Block> {
        self.block.clone()
    }
    /// Insert `op` and give its results fresh names.
    pub fn insert<O: Op + 'static>(&mut self, op: O) -> Shared<dyn Op> {
        let operation = op.operation().clone();
        let op = into_shared(op);
        operation.wr().set_parent(Some(self.block.clone()));
        let index = self.index.min(self.block.rd().ops().rd().len());
        self.block.rd().insert(index, op.clone());
        self.index = index + 1;
        let results = operation.rd().results();
        for result in results.to_vec() {
            if result.rd().name().is_none() {
                let name = self.block.rd().unique_value_name();
                result.wr().set_name(&name);
            }
        }
        op
    }
    /// Insert `op` and return its first result.
    pub fn insert_value<O: Op + 'static>(&mut self, op: O) -> Result<Shared<Value>> {
        let op = self.insert(op);
        let result = op.rd().result(0);
        match result {
            Some(result) => Ok(result),
            None => Err(anyhow::anyhow!("{} has no results", op.rd().name())),
        }
    }
}
