use crate::ir::display_types;
use crate::ir::into_shared;
use crate::ir::Block;
use crate::ir::Op;
use crate::ir::Operation;
use crate::ir::OperationName;
use crate::ir::Type;
use crate::ir::Value;
use crate::parser::parsed_op;
use crate::parser::Parse;
use crate::parser::Parser;
use crate::parser::ParserDispatch;
use crate::parser::TokenKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::fmt::Formatter;
use std::sync::Arc;

/// `builtin.unrealized_conversion_cast`
///
/// Placeholder that converts a set of values into another set of values
/// without any semantics. The conversion engine inserts it when a value is
/// needed at a type for which no materialization is known.
///
/// ```mlir
/// %1, %2 = builtin.unrealized_conversion_cast %0 : !torch.tuple<tensor, tensor> to !torch.tensor, !torch.tensor
/// ```
pub struct UnrealizedConversionCastOp {
    operation: Shared<Operation>,
}

impl UnrealizedConversionCastOp {
    pub fn build(inputs: Vec<Shared<Value>>, result_types: Vec<Arc<dyn Type>>) -> Self {
        let name = Self::operation_name();
        let operation = Operation::with_results(name, inputs, result_types);
        Self::from_operation(Shared::new(operation.into()))
    }
}

impl Op for UnrealizedConversionCastOp {
    fn operation_name() -> OperationName {
        OperationName::new("builtin.unrealized_conversion_cast")
    }
    fn new(operation: Shared<Operation>) -> Self {
        UnrealizedConversionCastOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn is_pure(&self) -> bool {
        true
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        operation.display_results(f)?;
        write!(f, "{}", operation.name())?;
        if !operation.operands().is_empty() {
            write!(f, " {} : ", operation.operands())?;
            display_types(f, &operation.operand_types())?;
        }
        write!(f, " to ")?;
        display_types(f, &operation.result_types())
    }
}

impl Parse for UnrealizedConversionCastOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&[
            "builtin.unrealized_conversion_cast",
            "unrealized_conversion_cast",
        ])?;
        let operands = parser.parse_op_operands(&parent)?;
        if !operands.is_empty() {
            parser.expect(TokenKind::Colon)?;
            parser.parse_types()?;
        }
        parser.parse_keyword("to")?;
        let result_types = parser.parse_types()?;
        let results = parser.op_results(&names, result_types)?;
        let op = parsed_op::<UnrealizedConversionCastOp>(operands, results, parent);
        Ok(into_shared(op))
    }
}
