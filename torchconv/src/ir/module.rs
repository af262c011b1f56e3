use crate::ir::Block;
use crate::ir::Op;
use crate::ir::Operation;
use crate::ir::OperationName;
use crate::parser::Parse;
use crate::parser::Parser;
use crate::parser::ParserDispatch;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::fmt::Formatter;

/// The top-level op that holds all functions.
pub struct ModuleOp {
    operation: Shared<Operation>,
}

impl Op for ModuleOp {
    fn operation_name() -> OperationName {
        OperationName::new("module")
    }
    fn new(operation: Shared<Operation>) -> Self {
        Self { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        write!(f, "module ")?;
        match self.region() {
            Some(region) => region.rd().display(f, indent),
            None => write!(f, "{{\n}}"),
        }
    }
}

impl ModuleOp {
    pub fn body(&self) -> Result<Shared<Block>> {
        let region = self
            .region()
            .ok_or_else(|| anyhow::anyhow!("Expected 1 region in module, got 0"))?;
        let block = region.rd().block();
        block.ok_or_else(|| anyhow::anyhow!("Expected 1 block in module, got 0"))
    }
    /// Return the first op inside the module.
    pub fn first_op(&self) -> Result<Shared<dyn Op>> {
        let block = self.body()?;
        let op = block.rd().ops().rd().first().cloned();
        op.ok_or_else(|| anyhow::anyhow!("Expected 1 op, got 0"))
    }
}

impl Parse for ModuleOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parser.parse_operation_name(&["module", "builtin.module"])?;
        let mut operation = Operation::default();
        operation.set_parent(parent);
        let operation: Shared<Operation> = Shared::new(operation.into());
        let op = crate::ir::into_shared(ModuleOp::from_operation(operation.clone()));
        let region = parser.parse_region(op.clone())?;
        operation.wr().set_region(Some(region));
        Ok(op)
    }
}
