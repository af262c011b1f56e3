use crate::ir::display_result_types;
use crate::ir::display_types;
use crate::ir::into_shared;
use crate::ir::AnonymousResult;
use crate::ir::Block;
use crate::ir::FunctionType;
use crate::ir::Op;
use crate::ir::OpOperands;
use crate::ir::Operation;
use crate::ir::OperationName;
use crate::ir::Type;
use crate::ir::Value;
use crate::ir::Values;
use crate::parser::parsed_op;
use crate::parser::Parse;
use crate::parser::Parser;
use crate::parser::ParserDispatch;
use crate::parser::TokenKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use parking_lot::RwLock;
use std::fmt::Formatter;
use std::sync::Arc;

pub trait Func: Op {
    fn identifier(&self) -> Option<String>;
    fn set_identifier(&mut self, identifier: String);
    fn sym_visibility(&self) -> Option<String>;
    /// Set the symbol visibility.
    ///
    /// It is legal to not have set visibility.
    fn set_sym_visibility(&mut self, visibility: Option<String>);
    fn arguments(&self) -> Values {
        self.operation().rd().arguments()
    }
    fn argument_types(&self) -> Vec<Arc<dyn Type>> {
        self.arguments().types()
    }
    fn result_types(&self) -> Vec<Arc<dyn Type>> {
        self.operation().rd().result_types()
    }
    /// Replace the function type by new argument values and result types.
    fn set_signature(&self, arguments: Vec<Shared<Value>>, result_types: Vec<Arc<dyn Type>>) {
        let results = result_types
            .into_iter()
            .map(|typ| Shared::new(RwLock::new(Value::FuncResult(AnonymousResult::new(typ)))))
            .collect::<Vec<_>>();
        let mut operation = self.operation().wr();
        operation.set_arguments(Values::from_vec(arguments));
        operation.set_results(Values::from_vec(results));
    }
    /// The single block of the body or `None` for declarations.
    fn body(&self) -> Option<Shared<Block>> {
        let region = self.region()?;
        let block = region.rd().block();
        block
    }
}

/// `func.func`
///
/// Note that the arguments of the function are internally represented by
/// `BlockArgument`s, but the textual form is inline.
///
/// ```mlir
/// func.func @f(%arg0: !torch.tensor {torch.type_bound = !torch.vtensor<[2],f32>}) -> !torch.tensor {
///   return %arg0 : !torch.tensor
/// }
/// ```
pub struct FuncOp {
    identifier: Option<String>,
    sym_visibility: Option<String>,
    operation: Shared<Operation>,
}

impl Func for FuncOp {
    fn identifier(&self) -> Option<String> {
        self.identifier.clone()
    }
    fn set_identifier(&mut self, identifier: String) {
        self.identifier = Some(identifier);
    }
    fn sym_visibility(&self) -> Option<String> {
        self.sym_visibility.clone()
    }
    fn set_sym_visibility(&mut self, visibility: Option<String>) {
        self.sym_visibility = visibility;
    }
}

impl FuncOp {
    pub fn display_func(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        write!(f, "{} ", operation.name())?;
        if let Some(visibility) = &self.sym_visibility {
            write!(f, "{visibility} ")?;
        }
        let identifier = self.identifier.clone().unwrap_or_default();
        write!(f, "{identifier}({})", operation.arguments())?;
        let result_types = operation.result_types();
        if !result_types.is_empty() {
            write!(f, " -> ")?;
            display_result_types(f, &result_types)?;
        }
        let attributes = operation.attributes();
        if !attributes.is_empty() {
            write!(f, " attributes {attributes}")?;
        }
        if let Some(region) = operation.region() {
            write!(f, " ")?;
            region.rd().display(f, indent)?;
        }
        Ok(())
    }
}

impl Op for FuncOp {
    fn operation_name() -> OperationName {
        OperationName::new("func.func")
    }
    fn new(operation: Shared<Operation>) -> Self {
        FuncOp {
            identifier: None,
            sym_visibility: None,
            operation,
        }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn is_func(&self) -> bool {
        true
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        self.display_func(f, indent)
    }
}

impl Parse for FuncOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parser.parse_operation_name(&["func.func"])?;
        let visibility = if parser.check(TokenKind::BareIdentifier) {
            Some(parser.advance().lexeme.clone())
        } else {
            None
        };
        let identifier = parser.expect(TokenKind::AtIdentifier)?;
        let arguments = parser.parse_function_arguments()?;
        let result_types = if parser.check(TokenKind::Arrow) {
            parser.advance();
            parser.parse_result_types()?
        } else {
            vec![]
        };
        let mut operation = Operation::default();
        operation.set_parent(parent);
        if parser.peek().lexeme == "attributes" {
            parser.advance();
            operation.set_attributes(parser.parse_attributes()?);
        }
        let operation: Shared<Operation> = Shared::new(operation.into());
        let mut op = FuncOp::from_operation(operation.clone());
        op.set_identifier(identifier.lexeme);
        op.set_sym_visibility(visibility);
        op.set_signature(arguments.to_vec(), result_types);
        let op = into_shared(op);
        if parser.check(TokenKind::LBrace) {
            let region = parser.parse_region(op.clone())?;
            let block = region.rd().block();
            for argument in arguments.to_vec() {
                if let Value::BlockArgument(argument) = &mut *argument.wr() {
                    argument.set_parent(block.clone());
                }
            }
            operation.wr().set_region(Some(region));
        }
        Ok(op)
    }
}

pub trait Call: Op {
    fn identifier(&self) -> Option<String>;
    fn set_identifier(&mut self, identifier: String);
}

/// `func.call`
///
/// ```mlir
/// %0 = func.call @f(%arg0) : (!torch.tensor) -> !torch.tensor
/// ```
pub struct CallOp {
    operation: Shared<Operation>,
    identifier: Option<String>,
}

impl CallOp {
    pub fn build(
        identifier: &str,
        operands: Vec<Shared<Value>>,
        result_types: Vec<Arc<dyn Type>>,
    ) -> Self {
        let name = Self::operation_name();
        let operation = Operation::with_results(name, operands, result_types);
        let mut op = Self::from_operation(Shared::new(operation.into()));
        op.set_identifier(identifier.to_string());
        op
    }
}

impl Call for CallOp {
    fn identifier(&self) -> Option<String> {
        self.identifier.clone()
    }
    fn set_identifier(&mut self, identifier: String) {
        self.identifier = Some(identifier);
    }
}

impl Op for CallOp {
    fn operation_name() -> OperationName {
        OperationName::new("func.call")
    }
    fn new(operation: Shared<Operation>) -> Self {
        CallOp {
            operation,
            identifier: None,
        }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        operation.display_results(f)?;
        let identifier = self.identifier.clone().unwrap_or_default();
        write!(f, "{} {identifier}({}) : (", operation.name(), operation.operands())?;
        display_types(f, &operation.operand_types())?;
        write!(f, ") -> ")?;
        display_result_types(f, &operation.result_types())
    }
}

/// Parse the part after the operands of a call (e.g., `: (i64) -> i64`).
fn parse_call_type<T: ParserDispatch>(
    parser: &mut Parser<T>,
    num_operands: usize,
) -> Result<Vec<Arc<dyn Type>>> {
    let colon = parser.expect(TokenKind::Colon)?;
    let (arguments, results) = parser.parse_function_type()?;
    if arguments.len() != num_operands {
        let msg = format!(
            "Expected {} argument types, got {}",
            num_operands,
            arguments.len()
        );
        return Err(anyhow::anyhow!(parser.error(&colon, &msg)));
    }
    Ok(results)
}

impl Parse for CallOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["call", "func.call"])?;
        let identifier = parser.expect(TokenKind::AtIdentifier)?;
        parser.expect(TokenKind::LParen)?;
        let operands = parser.parse_op_operands(&parent)?;
        parser.expect(TokenKind::RParen)?;
        let result_types = parse_call_type(parser, operands.len())?;
        let results = parser.op_results(&names, result_types)?;
        let mut op = parsed_op::<CallOp>(operands, results, parent);
        op.set_identifier(identifier.lexeme);
        Ok(into_shared(op))
    }
}

/// `func.call_indirect`
///
/// The first operand is the callee.
///
/// ```mlir
/// %1 = func.call_indirect %0(%arg0) : (!torch.tensor) -> !torch.tensor
/// ```
pub struct CallIndirectOp {
    operation: Shared<Operation>,
}

impl Op for CallIndirectOp {
    fn operation_name() -> OperationName {
        OperationName::new("func.call_indirect")
    }
    fn new(operation: Shared<Operation>) -> Self {
        CallIndirectOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        operation.display_results(f)?;
        let operands = operation.operand_values();
        let (callee, arguments) = match operands.split_first() {
            Some((callee, arguments)) => (callee.rd().name(), arguments.to_vec()),
            None => (None, vec![]),
        };
        let callee = callee.unwrap_or_default();
        let arguments = OpOperands::from_values(arguments);
        write!(f, "{} {callee}({arguments}) : (", operation.name())?;
        display_types(f, &arguments.types())?;
        write!(f, ") -> ")?;
        display_result_types(f, &operation.result_types())
    }
}

impl Parse for CallIndirectOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["call_indirect", "func.call_indirect"])?;
        let callee = parser.parse_op_operand(&parent)?;
        parser.expect(TokenKind::LParen)?;
        let arguments = parser.parse_op_operands(&parent)?;
        parser.expect(TokenKind::RParen)?;
        let result_types = parse_call_type(parser, arguments.len())?;
        let results = parser.op_results(&names, result_types)?;
        let mut operands = vec![callee];
        operands.extend(arguments);
        let op = parsed_op::<CallIndirectOp>(operands, results, parent);
        Ok(into_shared(op))
    }
}

/// `func.constant`
///
/// Turns a function symbol into a value that can be called indirectly.
///
/// ```mlir
/// %0 = func.constant @f : (!torch.tensor) -> !torch.tensor
/// ```
pub struct ConstantOp {
    operation: Shared<Operation>,
    symbol: Option<String>,
}

impl ConstantOp {
    pub fn symbol(&self) -> Option<String> {
        self.symbol.clone()
    }
}

impl Op for ConstantOp {
    fn operation_name() -> OperationName {
        OperationName::new("func.constant")
    }
    fn new(operation: Shared<Operation>) -> Self {
        ConstantOp {
            operation,
            symbol: None,
        }
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
        let symbol = self.symbol.clone().unwrap_or_default();
        write!(f, "{} {symbol} : ", operation.name())?;
        display_types(f, &operation.result_types())
    }
}

impl Parse for ConstantOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["constant", "func.constant"])?;
        let symbol = parser.expect(TokenKind::AtIdentifier)?;
        parser.expect(TokenKind::Colon)?;
        let (arguments, results) = parser.parse_function_type()?;
        let typ: Arc<dyn Type> = Arc::new(FunctionType::new(arguments, results));
        let results = parser.op_results(&names, vec![typ])?;
        let mut op = parsed_op::<ConstantOp>(vec![], results, parent);
        op.symbol = Some(symbol.lexeme);
        Ok(into_shared(op))
    }
}

/// `func.return`
///
/// ```mlir
/// return %0, %1 : !torch.tensor, !torch.tensor
/// ```
pub struct ReturnOp {
    operation: Shared<Operation>,
}

impl ReturnOp {
    pub fn build(operands: Vec<Shared<Value>>) -> Self {
        let name = Self::operation_name();
        let operation = Operation::with_results(name, operands, vec![]);
        Self::from_operation(Shared::new(operation.into()))
    }
}

impl Op for ReturnOp {
    fn operation_name() -> OperationName {
        OperationName::new("func.return")
    }
    fn new(operation: Shared<Operation>) -> Self {
        ReturnOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        write!(f, "return")?;
        if !operation.operands().is_empty() {
            write!(f, " {} : ", operation.operands())?;
            display_types(f, &operation.operand_types())?;
        }
        Ok(())
    }
}

impl Parse for ReturnOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parser.parse_operation_name(&["return", "func.return"])?;
        let operands = parser.parse_op_operands(&parent)?;
        if !operands.is_empty() {
            let colon = parser.expect(TokenKind::Colon)?;
            let types = parser.parse_types()?;
            if types.len() != operands.len() {
                let msg = format!("Expected {} types, got {}", operands.len(), types.len());
                return Err(anyhow::anyhow!(parser.error(&colon, &msg)));
            }
        }
        let op = parsed_op::<ReturnOp>(operands, Values::default(), parent);
        Ok(into_shared(op))
    }
}
