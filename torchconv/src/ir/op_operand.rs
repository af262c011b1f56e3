use crate::ir::Op;
use crate::ir::Type;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// A use of a value by an operation.
pub struct OpOperand {
    value: Shared<Value>,
}

impl OpOperand {
    pub fn new(value: Shared<Value>) -> Self {
        OpOperand { value }
    }
    pub fn value(&self) -> Shared<Value> {
        self.value.clone()
    }
    pub fn set_value(&mut self, value: Shared<Value>) {
        self.value = value;
    }
    pub fn typ(&self) -> Arc<dyn Type> {
        self.value.rd().typ()
    }
    /// If this `OpOperand` is the result of an operation, return the operation
    /// that defines it.
    pub fn defining_op(&self) -> Option<Shared<dyn Op>> {
        self.value.rd().defining_op()
    }
}

impl Display for OpOperand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.value.rd().name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "<unnamed>"),
        }
    }
}

#[derive(Clone, Default)]
pub struct OpOperands {
    operands: Shared<Vec<Shared<OpOperand>>>,
}

impl OpOperands {
    pub fn from_vec(operands: Vec<Shared<OpOperand>>) -> Self {
        OpOperands {
            operands: Shared::new(operands.into()),
        }
    }
    pub fn from_values(values: Vec<Shared<Value>>) -> Self {
        let operands: Vec<Shared<OpOperand>> = values
            .into_iter()
            .map(|value| Shared::new(OpOperand::new(value).into()))
            .collect();
        OpOperands::from_vec(operands)
    }
    pub fn vec(&self) -> Shared<Vec<Shared<OpOperand>>> {
        self.operands.clone()
    }
    pub fn len(&self) -> usize {
        self.operands.rd().len()
    }
    pub fn is_empty(&self) -> bool {
        self.operands.rd().is_empty()
    }
    pub fn get(&self, index: usize) -> Option<Shared<OpOperand>> {
        self.operands.rd().get(index).cloned()
    }
    /// The values that the operands point to.
    pub fn values(&self) -> Vec<Shared<Value>> {
        self.operands.rd().iter().map(|o| o.rd().value()).collect()
    }
    pub fn types(&self) -> Vec<Arc<dyn Type>> {
        self.operands.rd().iter().map(|o| o.rd().typ()).collect()
    }
}

impl Display for OpOperands {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let texts = self
            .operands
            .rd()
            .iter()
            .map(|o| o.rd().to_string())
            .collect::<Vec<_>>();
        write!(f, "{}", texts.join(", "))
    }
}
