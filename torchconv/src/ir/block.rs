use crate::ir::spaces;
use crate::ir::Op;
use crate::ir::OpOperand;
use crate::ir::Operation;
use crate::ir::Region;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::fmt::Formatter;
use std::sync::Arc;

/// A list of operations.
///
/// Function bodies consist of a single block. The arguments of the function
/// are stored in the function operation and are visible inside its block.
pub struct Block {
    ops: Shared<Vec<Shared<dyn Op>>>,
    /// This field does not have to be an `Shared<..>` because the `Block` is
    /// shared via `Shared<..>`.
    parent: Option<Shared<Region>>,
}

impl Block {
    pub fn new(ops: Shared<Vec<Shared<dyn Op>>>, parent: Option<Shared<Region>>) -> Self {
        Self { ops, parent }
    }
    pub fn ops(&self) -> Shared<Vec<Shared<dyn Op>>> {
        self.ops.clone()
    }
    pub fn parent(&self) -> Option<Shared<Region>> {
        self.parent.clone()
    }
    pub fn set_parent(&mut self, parent: Option<Shared<Region>>) {
        self.parent = parent;
    }
    /// The op that owns the region of this block (for example a `func.func`).
    pub fn parent_op(&self) -> Option<Shared<dyn Op>> {
        let region = self.parent()?;
        let op = region.rd().parent();
        op
    }
    pub fn index_of(&self, operation: &Shared<Operation>) -> Option<usize> {
        self.ops
            .rd()
            .iter()
            .position(|op| Arc::ptr_eq(op.rd().operation(), operation))
    }
    fn index_of_or_err(&self, operation: &Shared<Operation>) -> Result<usize> {
        match self.index_of(operation) {
            Some(index) => Ok(index),
            None => Err(anyhow::anyhow!(
                "{} not found in its parent block",
                operation.rd().name()
            )),
        }
    }
    /// Insert `op` at `index`.
    ///
    /// The caller is responsible for setting the parent of `op`.
    pub fn insert(&self, index: usize, op: Shared<dyn Op>) {
        self.ops.wr().insert(index, op);
    }
    pub fn insert_before(&self, earlier: Shared<dyn Op>, later: &Shared<Operation>) -> Result<()> {
        let index = self.index_of_or_err(later)?;
        let parent = later.rd().parent();
        earlier.rd().operation().wr().set_parent(parent);
        self.ops.wr().insert(index, earlier);
        Ok(())
    }
    pub fn remove(&self, operation: &Shared<Operation>) -> Result<Shared<dyn Op>> {
        let index = self.index_of_or_err(operation)?;
        let op = self.ops.wr().remove(index);
        Ok(op)
    }
    /// Find the value that is assigned to `name` (either an op result in this
    /// block or an argument of the parent function).
    pub fn assignment(&self, name: &str) -> Option<Shared<Value>> {
        for op in self.ops.rd().iter().rev() {
            let results = op.rd().operation().rd().results();
            for result in results.to_vec() {
                if result.rd().name().as_deref() == Some(name) {
                    return Some(result);
                }
            }
        }
        let parent = self.parent_op()?;
        let arguments = parent.rd().operation().rd().arguments();
        let found = arguments
            .to_vec()
            .into_iter()
            .find(|argument| argument.rd().name().as_deref() == Some(name));
        found
    }
    /// Return all operands in this block (and nested blocks) that use `value`.
    pub fn uses_of(&self, value: &Shared<Value>) -> Vec<Shared<OpOperand>> {
        let mut uses = vec![];
        for op in self.ops.rd().iter() {
            let op = op.rd();
            let operands = op.operation().rd().operands();
            for operand in operands.vec().rd().iter() {
                if Arc::ptr_eq(&operand.rd().value(), value) {
                    uses.push(operand.clone());
                }
            }
            if let Some(region) = op.region() {
                for block in region.rd().blocks() {
                    uses.extend(block.rd().uses_of(value));
                }
            }
        }
        uses
    }
    /// Collect the names of all values that are defined in this block or in
    /// nested blocks.
    fn defined_names(&self, names: &mut Vec<String>) {
        for op in self.ops.rd().iter() {
            let op = op.rd();
            let operation = op.operation().rd();
            names.extend(operation.results().names().into_iter().flatten());
            names.extend(operation.arguments().names().into_iter().flatten());
            if let Some(region) = operation.region() {
                for block in region.rd().blocks() {
                    block.rd().defined_names(names);
                }
            }
        }
    }
    /// Return a name such as `%3` that is not yet used in the parent function.
    pub fn unique_value_name(&self) -> String {
        let mut names = vec![];
        if let Some(parent) = self.parent_op() {
            let arguments = parent.rd().operation().rd().arguments();
            names.extend(arguments.names().into_iter().flatten());
        }
        self.defined_names(&mut names);
        let next = names
            .iter()
            .filter_map(|name| name.strip_prefix('%')?.parse::<usize>().ok())
            .map(|number| number + 1)
            .max()
            .unwrap_or(0);
        format!("%{next}")
    }
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        for op in self.ops.rd().iter() {
            write!(f, "{}", spaces(indent))?;
            op.rd().display(f, indent)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
