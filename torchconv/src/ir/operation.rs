use crate::ir::display_result_types;
use crate::ir::display_types;
use crate::ir::Attributes;
use crate::ir::Block;
use crate::ir::Op;
use crate::ir::OpOperands;
use crate::ir::OpResult;
use crate::ir::Region;
use crate::ir::Type;
use crate::ir::Value;
use crate::ir::Values;
use crate::shared::Shared;
use crate::shared::SharedExt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OperationName {
    name: String,
}

impl OperationName {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
    pub fn name(&self) -> String {
        self.name.clone()
    }
}

impl Display for OperationName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Note that MLIR distinguishes between Operation and Op.
/// Operation generically models all operations.
/// Op is an interface for more specific operations.
/// For example, `ConstantNoneOp` does not take inputs and gives one output.
/// `ConstantNoneOp` does also not specify fields apart from `operation` since
/// they are accessed via a pointer to the `Operation`.
/// The operation also represents functions and modules.
#[derive(Clone)]
pub struct Operation {
    name: OperationName,
    /// Used by functions to store their arguments.
    arguments: Values,
    operands: OpOperands,
    attributes: Attributes,
    /// Results are [Value]s, either [OpResult]s or, for functions, anonymous
    /// results that only carry the result types.
    results: Values,
    region: Option<Shared<Region>>,
    /// This is set after parsing because not all parents are known during
    /// parsing (for example, the parent of a top-level function will be a
    /// `ModuleOp` that is created after parsing of the `FuncOp`).
    parent: Option<Shared<Block>>,
}

impl Operation {
    /// Create an operation with operands and fresh (unnamed) results.
    ///
    /// The results receive their names and defining op once the op is
    /// inserted into a block.
    pub fn with_results(
        name: OperationName,
        operands: Vec<Shared<Value>>,
        result_types: Vec<Arc<dyn Type>>,
    ) -> Self {
        let results = result_types
            .into_iter()
            .map(|typ| Shared::new(Value::OpResult(OpResult::new(None, typ)).into()))
            .collect::<Vec<Shared<Value>>>();
        let mut operation = Operation::default();
        operation.set_name(name);
        operation.set_operands(OpOperands::from_values(operands));
        operation.set_results(Values::from_vec(results));
        operation
    }
    pub fn name(&self) -> OperationName {
        self.name.clone()
    }
    pub fn arguments(&self) -> Values {
        self.arguments.clone()
    }
    pub fn operands(&self) -> OpOperands {
        self.operands.clone()
    }
    /// The values that are currently used by this operation.
    pub fn operand_values(&self) -> Vec<Shared<Value>> {
        self.operands.values()
    }
    pub fn operand_types(&self) -> Vec<Arc<dyn Type>> {
        self.operands.types()
    }
    pub fn attributes(&self) -> Attributes {
        self.attributes.clone()
    }
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
    pub fn results(&self) -> Values {
        self.results.clone()
    }
    pub fn result(&self, index: usize) -> Option<Shared<Value>> {
        self.results.get(index)
    }
    pub fn result_types(&self) -> Vec<Arc<dyn Type>> {
        self.results.types()
    }
    pub fn region(&self) -> Option<Shared<Region>> {
        self.region.clone()
    }
    /// Return the parent block (this is called `getBlock` in MLIR).
    pub fn parent(&self) -> Option<Shared<Block>> {
        self.parent.clone()
    }
    pub fn parent_op(&self) -> Option<Shared<dyn Op>> {
        let block = self.parent()?;
        let region = block.rd().parent()?;
        let op = region.rd().parent();
        op
    }
    pub fn set_name(&mut self, name: OperationName) {
        self.name = name;
    }
    pub fn set_arguments(&mut self, arguments: Values) {
        self.arguments = arguments;
    }
    pub fn set_operands(&mut self, operands: OpOperands) {
        self.operands = operands;
    }
    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }
    pub fn set_results(&mut self, results: Values) {
        self.results = results;
    }
    pub fn set_region(&mut self, region: Option<Shared<Region>>) {
        self.region = region;
    }
    pub fn set_parent(&mut self, parent: Option<Shared<Block>>) {
        self.parent = parent;
    }
    /// Display the results of the operation (e.g., `%0 = `).
    pub fn display_results(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.results.is_empty() {
            write!(f, "{} = ", self.results)?;
        }
        Ok(())
    }
    /// Display the operation in the MLIR generic form, for example
    /// `%0 = "test.use"(%arg0) : (!torch.tensor) -> !torch.int`.
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        self.display_results(f)?;
        write!(f, "\"{}\"({})", self.name, self.operands)?;
        if !self.attributes.is_empty() {
            write!(f, " {}", self.attributes)?;
        }
        if let Some(region) = self.region() {
            write!(f, " (")?;
            region.rd().display(f, indent)?;
            write!(f, ")")?;
        }
        write!(f, " : (")?;
        display_types(f, &self.operand_types())?;
        write!(f, ") -> ")?;
        display_result_types(f, &self.result_types())
    }
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            name: OperationName::new(""),
            arguments: Values::default(),
            operands: OpOperands::default(),
            attributes: Attributes::new(),
            results: Values::default(),
            region: None,
            parent: None,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f, 0)
    }
}
