use crate::ir::Attributes;
use crate::ir::Block;
use crate::ir::Op;
use crate::ir::OpOperand;
use crate::ir::Type;
use crate::shared::Shared;
use crate::shared::SharedExt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// An argument of a function.
///
/// Every argument carries its own attribute dictionary (for example
/// `{torch.type_bound = !torch.vtensor<[2],f32>}`).
pub struct BlockArgument {
    /// The name of the argument (`None` for declarations without a body).
    name: Option<String>,
    typ: Arc<dyn Type>,
    attributes: Attributes,
    /// The entry block of the function that owns this argument.
    ///
    /// This is used to find the users of the argument.
    parent: Option<Shared<Block>>,
}

impl BlockArgument {
    pub fn new(name: Option<String>, typ: Arc<dyn Type>) -> Self {
        BlockArgument {
            name,
            typ,
            attributes: Attributes::new(),
            parent: None,
        }
    }
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }
    pub fn parent(&self) -> Option<Shared<Block>> {
        self.parent.clone()
    }
    pub fn set_parent(&mut self, parent: Option<Shared<Block>>) {
        self.parent = parent;
    }
}

impl Display for BlockArgument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.typ)?,
            None => write!(f, "{}", self.typ)?,
        }
        if !self.attributes.is_empty() {
            write!(f, " {}", self.attributes)?;
        }
        Ok(())
    }
}

/// An unnamed result of an operation, such as the result of a function.
///
/// This provides a way to store the result types of a function in the
/// `results` field of the operation.
pub struct AnonymousResult {
    typ: Arc<dyn Type>,
}

impl AnonymousResult {
    pub fn new(typ: Arc<dyn Type>) -> Self {
        AnonymousResult { typ }
    }
}

/// A named result of an operation.
///
/// For example, in the following code:
/// ```mlir
/// %0 = torch.copy.to_vtensor %arg0 : !torch.vtensor
/// ```
/// `%0` is the result of the operation and has the name `%0`. The
/// `defining_op` is `torch.copy.to_vtensor` and the `typ` is `!torch.vtensor`.
pub struct OpResult {
    name: Option<String>,
    typ: Arc<dyn Type>,
    defining_op: Option<Shared<dyn Op>>,
}

impl OpResult {
    pub fn new(name: Option<String>, typ: Arc<dyn Type>) -> Self {
        OpResult {
            name,
            typ,
            defining_op: None,
        }
    }
    pub fn defining_op(&self) -> Option<Shared<dyn Op>> {
        self.defining_op.clone()
    }
    pub fn set_defining_op(&mut self, op: Option<Shared<dyn Op>>) {
        self.defining_op = op;
    }
}

pub enum Value {
    BlockArgument(BlockArgument),
    FuncResult(AnonymousResult),
    OpResult(OpResult),
}

impl Value {
    pub fn name(&self) -> Option<String> {
        match self {
            Value::BlockArgument(arg) => arg.name.clone(),
            Value::FuncResult(_) => None,
            Value::OpResult(res) => res.name.clone(),
        }
    }
    pub fn set_name(&mut self, name: &str) {
        match self {
            Value::BlockArgument(arg) => arg.name = Some(name.to_string()),
            Value::FuncResult(_) => (),
            Value::OpResult(res) => res.name = Some(name.to_string()),
        }
    }
    pub fn typ(&self) -> Arc<dyn Type> {
        match self {
            Value::BlockArgument(arg) => arg.typ.clone(),
            Value::FuncResult(res) => res.typ.clone(),
            Value::OpResult(res) => res.typ.clone(),
        }
    }
    pub fn set_type(&mut self, typ: Arc<dyn Type>) {
        match self {
            Value::BlockArgument(arg) => arg.typ = typ,
            Value::FuncResult(res) => res.typ = typ,
            Value::OpResult(res) => res.typ = typ,
        }
    }
    pub fn defining_op(&self) -> Option<Shared<dyn Op>> {
        match self {
            Value::OpResult(res) => res.defining_op(),
            _ => None,
        }
    }
    /// The block in which the value is defined.
    pub fn parent_block(&self) -> Option<Shared<Block>> {
        match self {
            Value::BlockArgument(arg) => arg.parent(),
            Value::FuncResult(_) => None,
            Value::OpResult(res) => {
                let op = res.defining_op()?;
                let op = op.rd();
                let operation = op.operation().rd();
                operation.parent()
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::BlockArgument(arg) => write!(f, "{arg}"),
            Value::FuncResult(res) => write!(f, "{}", res.typ),
            Value::OpResult(res) => match &res.name {
                Some(name) => write!(f, "{name}"),
                None => write!(f, "<unnamed>"),
            },
        }
    }
}

/// Use tracking on shared values.
///
/// Uses are found by walking the block that defines the value, which is
/// enough since values never escape the body of their function.
pub trait Uses {
    /// Return all operands that point to this value.
    fn uses(&self) -> Vec<Shared<OpOperand>>;
    fn has_uses(&self) -> bool {
        !self.uses().is_empty()
    }
    /// Let all operands that point to this value point to `new` instead.
    fn replace_all_uses_with(&self, new: &Shared<Value>);
}

impl Uses for Shared<Value> {
    fn uses(&self) -> Vec<Shared<OpOperand>> {
        let block = self.rd().parent_block();
        match block {
            Some(block) => block.rd().uses_of(self),
            None => vec![],
        }
    }
    fn replace_all_uses_with(&self, new: &Shared<Value>) {
        if Arc::ptr_eq(self, new) {
            return;
        }
        for operand in self.uses() {
            operand.wr().set_value(new.clone());
        }
    }
}

#[derive(Clone, Default)]
pub struct Values {
    values: Shared<Vec<Shared<Value>>>,
}

impl Values {
    pub fn from_vec(values: Vec<Shared<Value>>) -> Self {
        Values {
            values: Shared::new(values.into()),
        }
    }
    pub fn vec(&self) -> Shared<Vec<Shared<Value>>> {
        self.values.clone()
    }
    /// A copy of the list of values (the values themselves are shared).
    pub fn to_vec(&self) -> Vec<Shared<Value>> {
        self.values.rd().clone()
    }
    pub fn len(&self) -> usize {
        self.values.rd().len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.rd().is_empty()
    }
    pub fn get(&self, index: usize) -> Option<Shared<Value>> {
        self.values.rd().get(index).cloned()
    }
    pub fn types(&self) -> Vec<Arc<dyn Type>> {
        self.values.rd().iter().map(|v| v.rd().typ()).collect()
    }
    pub fn names(&self) -> Vec<Option<String>> {
        self.values.rd().iter().map(|v| v.rd().name()).collect()
    }
    /// Set `op` as the defining op of all [OpResult]s in this list.
    pub fn set_defining_op(&self, op: Shared<dyn Op>) {
        for value in self.values.rd().iter() {
            if let Value::OpResult(res) = &mut *value.wr() {
                res.set_defining_op(Some(op.clone()));
            }
        }
    }
}

impl Display for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let texts = self
            .values
            .rd()
            .iter()
            .map(|v| v.rd().to_string())
            .collect::<Vec<_>>();
        write!(f, "{}", texts.join(", "))
    }
}
