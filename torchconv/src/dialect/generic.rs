use crate::ir::into_shared;
use crate::ir::Block;
use crate::ir::Op;
use crate::ir::Operation;
use crate::ir::OperationName;
use crate::parser::Parse;
use crate::parser::Parser;
use crate::parser::ParserDispatch;
use crate::parser::TokenKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::fmt::Formatter;

/// An op from a dialect that is not known to this crate.
///
/// The op is written in the MLIR generic form and is kept as is, for example:
/// ```mlir
/// %0 = "test.use"(%arg0) : (!torch.tensor) -> !torch.int
/// ```
pub struct GenericOp {
    operation: Shared<Operation>,
}

impl Op for GenericOp {
    fn operation_name() -> OperationName {
        OperationName::new("generic")
    }
    fn new(operation: Shared<Operation>) -> Self {
        GenericOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        self.operation.rd().display(f, indent)
    }
}

impl Parse for GenericOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        let name = parser.expect(TokenKind::String)?;
        let name = name.lexeme.trim_matches('"').to_string();
        parser.expect(TokenKind::LParen)?;
        let operands = parser.parse_op_operands(&parent)?;
        parser.expect(TokenKind::RParen)?;
        let attributes = if parser.check(TokenKind::LBrace) {
            Some(parser.parse_attributes()?)
        } else {
            None
        };
        let colon = parser.expect(TokenKind::Colon)?;
        let (argument_types, result_types) = parser.parse_function_type()?;
        if argument_types.len() != operands.len() {
            let msg = format!(
                "Expected {} operand types, got {}",
                operands.len(),
                argument_types.len()
            );
            return Err(anyhow::anyhow!(parser.error(&colon, &msg)));
        }
        let results = parser.op_results(&names, result_types)?;
        let mut operation = Operation::default();
        operation.set_name(OperationName::new(&name));
        operation.set_operands(crate::ir::OpOperands::from_values(operands));
        operation.set_results(results);
        operation.set_parent(parent);
        if let Some(attributes) = attributes {
            operation.set_attributes(attributes);
        }
        let op = GenericOp::new(Shared::new(operation.into()));
        Ok(into_shared(op))
    }
}
