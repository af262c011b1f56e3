use crate::dialect::builtin;
use crate::dialect::func;
use crate::dialect::torch;
use crate::dialect::GenericOp;
use crate::ir::AnyAttr;
use crate::ir::AnyType;
use crate::ir::Attribute;
use crate::ir::Attributes;
use crate::ir::Block;
use crate::ir::BlockArgument;
use crate::ir::FunctionType;
use crate::ir::IntegerAttr;
use crate::ir::IntegerType;
use crate::ir::ModuleOp;
use crate::ir::Op;
use crate::ir::OpOperands;
use crate::ir::OpResult;
use crate::ir::Operation;
use crate::ir::Region;
use crate::ir::StrAttr;
use crate::ir::Type;
use crate::ir::TypeAttr;
use crate::ir::Value;
use crate::ir::Values;
use crate::parser::scanner::Scanner;
use crate::parser::token::Token;
use crate::parser::token::TokenKind;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// Interface to add custom operations to the parser.
///
/// Downstream crates can implement this trait to support custom parsing.  The
/// default implementation can only know about operations defined in this crate.
/// This gives the Rust compiler more insight into the dispatches compared to to
/// using a hashmap registry.
pub trait ParserDispatch {
    fn parse_op(parser: &mut Parser<Self>, parent: Option<Shared<Block>>) -> Result<Shared<dyn Op>>
    where
        Self: Sized;
    fn parse_type(parser: &mut Parser<Self>) -> Result<Arc<dyn Type>>
    where
        Self: Sized,
    {
        default_parse_type(parser)
    }
}

/// Return the name of the op that starts at the current token.
///
/// Skips the results (e.g., `%0, %1 = <op name>`).
pub fn default_parse_name<T: ParserDispatch>(parser: &Parser<T>) -> Token {
    let mut n = 0;
    while parser.peek_n(n).kind == TokenKind::PercentIdentifier
        || parser.peek_n(n).kind == TokenKind::Comma
    {
        n += 1;
    }
    if n > 0 && parser.peek_n(n).kind == TokenKind::Equal {
        parser.peek_n(n + 1).clone()
    } else {
        parser.peek().clone()
    }
}

/// Parse the types that are known to this crate.
pub fn default_parse_type<T: ParserDispatch>(parser: &mut Parser<T>) -> Result<Arc<dyn Type>> {
    if parser.check(TokenKind::Exclamation) && parser.peek_n(1).lexeme.starts_with("torch.") {
        return torch::parse_torch_type(parser);
    }
    if parser.check(TokenKind::IntType) {
        let token = parser.advance().clone();
        return match IntegerType::from_name(&token.lexeme) {
            Some(typ) => Ok(Arc::new(typ)),
            None => Err(anyhow::anyhow!(parser.error(&token, "Expected integer type"))),
        };
    }
    if parser.check(TokenKind::LParen) {
        let (arguments, results) = parser.parse_function_type()?;
        return Ok(Arc::new(FunctionType::new(arguments, results)));
    }
    if parser.check(TokenKind::Exclamation) {
        let text = parser.parse_type_text()?;
        return Ok(Arc::new(AnyType::new(&text)));
    }
    let token = parser.peek().clone();
    let msg = parser.error(&token, "Expected a type");
    Err(anyhow::anyhow!(msg))
}

/// Create an op of type `O` from parsed operands and results.
///
/// The op still has to be wrapped via [crate::ir::into_shared] so that the
/// results point to it.
pub fn parsed_op<O: Op>(
    operands: Vec<Shared<Value>>,
    results: Values,
    parent: Option<Shared<Block>>,
) -> O {
    let mut operation = Operation::default();
    operation.set_operands(OpOperands::from_values(operands));
    operation.set_results(results);
    operation.set_parent(parent);
    O::from_operation(Shared::new(operation.into()))
}

/// Default operation parser.
///
/// This parser knows about all operations defined in this crate.
pub struct DefaultParserDispatch;

impl ParserDispatch for DefaultParserDispatch {
    fn parse_op(parser: &mut Parser<Self>, parent: Option<Shared<Block>>) -> Result<Shared<dyn Op>> {
        let name = default_parse_name(parser);
        if name.kind == TokenKind::String {
            return <GenericOp as Parse>::op(parser, parent);
        }
        match name.lexeme.as_str() {
            "builtin.unrealized_conversion_cast" | "unrealized_conversion_cast" => {
                <builtin::UnrealizedConversionCastOp as Parse>::op(parser, parent)
            }
            "call" | "func.call" => <func::CallOp as Parse>::op(parser, parent),
            "call_indirect" | "func.call_indirect" => {
                <func::CallIndirectOp as Parse>::op(parser, parent)
            }
            "constant" | "func.constant" => <func::ConstantOp as Parse>::op(parser, parent),
            "func.func" => <func::FuncOp as Parse>::op(parser, parent),
            "module" | "builtin.module" => <ModuleOp as Parse>::op(parser, parent),
            "return" | "func.return" => <func::ReturnOp as Parse>::op(parser, parent),
            "torch.constant.int" => <torch::ConstantIntOp as Parse>::op(parser, parent),
            "torch.constant.none" => <torch::ConstantNoneOp as Parse>::op(parser, parent),
            "torch.copy.to_tensor" => <torch::CopyToNonValueTensorOp as Parse>::op(parser, parent),
            "torch.copy.to_vtensor" => <torch::CopyToValueTensorOp as Parse>::op(parser, parent),
            "torch.overwrite.tensor.contents" => {
                <torch::OverwriteTensorContentsOp as Parse>::op(parser, parent)
            }
            "torch.prim.TupleConstruct" => {
                <torch::PrimTupleConstructOp as Parse>::op(parser, parent)
            }
            "torch.prim.TupleIndex" => <torch::PrimTupleIndexOp as Parse>::op(parser, parent),
            "torch.tensor_static_info_cast" => {
                <torch::TensorStaticInfoCastOp as Parse>::op(parser, parent)
            }
            _ => {
                let msg = format!("Unknown operation: {}", name.lexeme);
                Err(anyhow::anyhow!(parser.error(&name, &msg)))
            }
        }
    }
}

/// Interface to define parsing of operations.
///
/// Downstream crates can implement this trait to support parsing of custom
/// operations.
pub trait Parse {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>>
    where
        Self: Sized;
}

pub struct Parser<T: ParserDispatch> {
    src: String,
    tokens: Vec<Token>,
    current: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: ParserDispatch> Parser<T> {
    pub fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
    pub fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }
    /// Return the token `n` positions ahead (or the final `Eof` token).
    pub fn peek_n(&self, n: usize) -> &Token {
        let index = (self.current + n).min(self.tokens.len() - 1);
        &self.tokens[index]
    }
    pub fn peek(&self) -> &Token {
        self.peek_n(0)
    }
    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
    pub fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }
    pub fn error(&self, token: &Token, msg: &str) -> String {
        let msg = Scanner::error(&self.src, &token.location, msg);
        format!("\n\n{msg}\n")
    }
    pub fn report_token_error(&self, token: &Token, expected: TokenKind) -> Result<Token> {
        let msg = format!(
            "Expected {:?}, but got \"{}\" of kind {:?}",
            expected, token.lexeme, token.kind
        );
        Err(anyhow::anyhow!(self.error(token, &msg)))
    }
    pub fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(kind) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            self.report_token_error(self.peek(), kind)
        }
    }
    pub fn parse_keyword(&mut self, keyword: &str) -> Result<()> {
        let token = self.expect(TokenKind::BareIdentifier)?;
        if token.lexeme != keyword {
            let msg = self.error(&token, &format!("Expected keyword: {}", keyword));
            return Err(anyhow::anyhow!(msg));
        }
        Ok(())
    }
    /// Parse the operation name and verify that it is one of `names`.
    pub fn parse_operation_name(&mut self, names: &[&str]) -> Result<()> {
        let token = self.expect(TokenKind::BareIdentifier)?;
        if !names.contains(&token.lexeme.as_str()) {
            let msg = format!("Expected one of {names:?}");
            return Err(anyhow::anyhow!(self.error(&token, &msg)));
        }
        Ok(())
    }
    /// Parse the result names of an op (e.g., `%0, %1 =`).
    ///
    /// Returns an empty list if the op has no results.
    pub fn parse_op_result_names(&mut self) -> Result<Vec<Token>> {
        let mut names = vec![];
        if self.check(TokenKind::PercentIdentifier) {
            loop {
                names.push(self.expect(TokenKind::PercentIdentifier)?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.expect(TokenKind::Equal)?;
        }
        Ok(names)
    }
    /// Create the results of an op from the parsed names and types.
    pub fn op_results(&self, names: &[Token], types: Vec<Arc<dyn Type>>) -> Result<Values> {
        if names.len() != types.len() {
            let token = names.first().unwrap_or(self.previous());
            let msg = format!(
                "Expected {} result names, but the op has {} results",
                types.len(),
                names.len()
            );
            return Err(anyhow::anyhow!(self.error(token, &msg)));
        }
        let results = names
            .iter()
            .zip(types)
            .map(|(name, typ)| {
                let result = OpResult::new(Some(name.lexeme.clone()), typ);
                Shared::new(RwLock::new(Value::OpResult(result)))
            })
            .collect::<Vec<Shared<Value>>>();
        Ok(Values::from_vec(results))
    }
    /// Parse a reference to an earlier defined value (e.g., `%arg0`).
    pub fn parse_op_operand(&mut self, parent: &Option<Shared<Block>>) -> Result<Shared<Value>> {
        let token = self.expect(TokenKind::PercentIdentifier)?;
        let value = parent
            .as_ref()
            .and_then(|block| block.rd().assignment(&token.lexeme));
        match value {
            Some(value) => Ok(value),
            None => {
                let msg = format!("Could not find assignment for {}", token.lexeme);
                Err(anyhow::anyhow!(self.error(&token, &msg)))
            }
        }
    }
    /// Parse a possibly empty comma-separated list of operands.
    pub fn parse_op_operands(
        &mut self,
        parent: &Option<Shared<Block>>,
    ) -> Result<Vec<Shared<Value>>> {
        let mut operands = vec![];
        while self.check(TokenKind::PercentIdentifier) {
            operands.push(self.parse_op_operand(parent)?);
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        Ok(operands)
    }
    pub fn parse_type(&mut self) -> Result<Arc<dyn Type>> {
        T::parse_type(self)
    }
    /// Parse a non-empty comma-separated list of types.
    pub fn parse_types(&mut self) -> Result<Vec<Arc<dyn Type>>> {
        let mut types = vec![self.parse_type()?];
        while self.check(TokenKind::Comma) {
            self.advance();
            types.push(self.parse_type()?);
        }
        Ok(types)
    }
    /// Parse a parenthesized, possibly empty, list of types.
    pub fn parse_type_list(&mut self) -> Result<Vec<Arc<dyn Type>>> {
        self.expect(TokenKind::LParen)?;
        if self.check(TokenKind::RParen) {
            self.advance();
            return Ok(vec![]);
        }
        let types = self.parse_types()?;
        self.expect(TokenKind::RParen)?;
        Ok(types)
    }
    /// Parse result types after an arrow (e.g., `!torch.int` or `(i1, i64)`).
    pub fn parse_result_types(&mut self) -> Result<Vec<Arc<dyn Type>>> {
        if self.check(TokenKind::LParen) {
            self.parse_type_list()
        } else {
            Ok(vec![self.parse_type()?])
        }
    }
    /// Parse a function type such as `(i1, i64) -> i64`.
    pub fn parse_function_type(&mut self) -> Result<(Vec<Arc<dyn Type>>, Vec<Arc<dyn Type>>)> {
        let arguments = self.parse_type_list()?;
        self.expect(TokenKind::Arrow)?;
        let results = self.parse_result_types()?;
        Ok((arguments, results))
    }
    /// Parse a type to a string.
    ///
    /// This is used for types of dialects that are unknown to this crate. The
    /// text is kept so that the type can be printed back unchanged.
    pub fn parse_type_text(&mut self) -> Result<String> {
        let mut typ = String::new();
        self.expect(TokenKind::Exclamation)?;
        typ.push('!');
        let name = self.expect(TokenKind::BareIdentifier)?;
        typ.push_str(&name.lexeme);
        if self.check(TokenKind::Less) {
            let mut depth = 0;
            loop {
                let token = self.advance().clone();
                match token.kind {
                    TokenKind::Less => depth += 1,
                    TokenKind::Greater => depth -= 1,
                    TokenKind::Eof => {
                        let msg = self.error(&token, "Unterminated type");
                        return Err(anyhow::anyhow!(msg));
                    }
                    _ => (),
                }
                typ.push_str(&token.lexeme);
                if token.kind == TokenKind::Comma {
                    typ.push(' ');
                }
                if depth == 0 {
                    break;
                }
            }
        }
        Ok(typ)
    }
    fn parse_attribute_value(&mut self) -> Result<Arc<dyn Attribute>> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Exclamation | TokenKind::IntType | TokenKind::LParen => {
                Ok(Arc::new(TypeAttr::new(self.parse_type()?)))
            }
            TokenKind::Integer | TokenKind::Minus => {
                let value = self.parse_integer()?;
                let typ: Arc<dyn Type> = if self.check(TokenKind::Colon) {
                    self.advance();
                    self.parse_type()?
                } else {
                    Arc::new(IntegerType::new(64))
                };
                Ok(Arc::new(IntegerAttr::new(value, typ)))
            }
            TokenKind::String => {
                self.advance();
                let text = token.lexeme.trim_matches('"');
                Ok(Arc::new(StrAttr::new(text)))
            }
            TokenKind::BareIdentifier => {
                self.advance();
                Ok(Arc::new(AnyAttr::new(&token.lexeme)))
            }
            _ => {
                let msg = self.error(&token, "Expected an attribute value");
                Err(anyhow::anyhow!(msg))
            }
        }
    }
    /// Parse an attribute dictionary such as `{torch.type_bound = !torch.vtensor}`.
    pub fn parse_attributes(&mut self) -> Result<Attributes> {
        let mut attributes = Attributes::new();
        self.expect(TokenKind::LBrace)?;
        while !self.check(TokenKind::RBrace) {
            let key = self.advance().clone();
            let key = match key.kind {
                TokenKind::BareIdentifier => key.lexeme,
                TokenKind::String => key.lexeme.trim_matches('"').to_string(),
                _ => {
                    let msg = self.error(&key, "Expected an attribute name");
                    return Err(anyhow::anyhow!(msg));
                }
            };
            self.expect(TokenKind::Equal)?;
            let value = self.parse_attribute_value()?;
            attributes.insert(&key, value);
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RBrace)?;
        Ok(attributes)
    }
    /// Parse a possibly negative integer literal.
    pub fn parse_integer(&mut self) -> Result<i64> {
        let negative = self.check(TokenKind::Minus);
        if negative {
            self.advance();
        }
        let token = self.expect(TokenKind::Integer)?;
        match token.lexeme.parse::<i64>() {
            Ok(value) if negative => Ok(-value),
            Ok(value) => Ok(value),
            Err(_) => Err(anyhow::anyhow!(self.error(&token, "Invalid integer"))),
        }
    }
    /// Parse the arguments of a function.
    ///
    /// Arguments are either named (`%arg0: !torch.tensor {attrs}`) or, for
    /// declarations without a body, anonymous (`!torch.tensor {attrs}`).
    pub fn parse_function_arguments(&mut self) -> Result<Values> {
        let mut arguments = vec![];
        self.expect(TokenKind::LParen)?;
        while !self.check(TokenKind::RParen) {
            let name = if self.check(TokenKind::PercentIdentifier) {
                let name = self.advance().lexeme.clone();
                self.expect(TokenKind::Colon)?;
                Some(name)
            } else {
                None
            };
            let typ = self.parse_type()?;
            let mut argument = BlockArgument::new(name, typ);
            if self.check(TokenKind::LBrace) {
                argument.set_attributes(self.parse_attributes()?);
            }
            let argument = Value::BlockArgument(argument);
            arguments.push(Shared::new(RwLock::new(argument)));
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(Values::from_vec(arguments))
    }
    fn is_region_end(&self) -> bool {
        self.check(TokenKind::RBrace) || self.is_at_end()
    }
    pub fn parse_block(&mut self, parent: Shared<Region>) -> Result<Shared<Block>> {
        let ops = Shared::new(vec![].into());
        let block = Block::new(ops, Some(parent));
        let block: Shared<Block> = Shared::new(block.into());
        while !self.is_region_end() {
            let op = T::parse_op(self, Some(block.clone()))?;
            op.rd().operation().wr().set_parent(Some(block.clone()));
            block.rd().ops().wr().push(op);
        }
        if block.rd().ops().rd().is_empty() {
            let token = self.peek().clone();
            let msg = self.error(&token, "Could not find operations in block");
            return Err(anyhow::anyhow!(msg));
        }
        Ok(block)
    }
    /// Parse a single-block region (e.g., a function body).
    pub fn parse_region(&mut self, parent: Shared<dyn Op>) -> Result<Shared<Region>> {
        let mut region = Region::default();
        region.set_parent(Some(parent));
        let region: Shared<Region> = Shared::new(region.into());
        self.expect(TokenKind::LBrace)?;
        let block = self.parse_block(region.clone())?;
        region.wr().add_block(block);
        self.expect(TokenKind::RBrace)?;
        Ok(region)
    }
    /// Parse the source into a module.
    ///
    /// When the source does not start with a module, the top-level ops are
    /// wrapped in one.
    pub fn parse(src: &str) -> Result<Shared<dyn Op>> {
        let mut parser = Parser::<T> {
            src: src.to_string(),
            tokens: Scanner::scan(src)?,
            current: 0,
            _marker: std::marker::PhantomData,
        };
        let is_module = matches!(parser.peek().lexeme.as_str(), "module" | "builtin.module");
        let op = if is_module {
            T::parse_op(&mut parser, None)?
        } else {
            let mut operation = Operation::default();
            operation.set_name(ModuleOp::operation_name());
            let operation: Shared<Operation> = Shared::new(operation.into());
            let module = crate::ir::into_shared(ModuleOp::from_operation(operation.clone()));
            let mut region = Region::default();
            region.set_parent(Some(module.clone()));
            let region: Shared<Region> = Shared::new(region.into());
            let block = parser.parse_block(region.clone())?;
            region.wr().add_block(block);
            operation.wr().set_region(Some(region));
            module
        };
        if !parser.is_at_end() {
            let token = parser.peek().clone();
            let msg = parser.error(&token, "Expected end of input");
            return Err(anyhow::anyhow!(msg));
        }
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parse_name() {
        let src = "%0, %1 = builtin.unrealized_conversion_cast %arg0";
        let parser = Parser::<DefaultParserDispatch> {
            src: src.to_string(),
            tokens: Scanner::scan(src).unwrap(),
            current: 0,
            _marker: std::marker::PhantomData,
        };
        let name = default_parse_name(&parser);
        assert_eq!(name.lexeme, "builtin.unrealized_conversion_cast");
    }

    #[test]
    fn test_parse_unknown_type() {
        let src = "!foo.bar<[1, 2], {a}>";
        let mut parser = Parser::<DefaultParserDispatch> {
            src: src.to_string(),
            tokens: Scanner::scan(src).unwrap(),
            current: 0,
            _marker: std::marker::PhantomData,
        };
        let typ = parser.parse_type().unwrap();
        assert_eq!(typ.to_string(), "!foo.bar<[1, 2], {a}>");
    }

    #[test]
    fn test_parse_unknown_op() {
        let src = "func.func @f() {\n  foo.bar\n}";
        let err = Parser::<DefaultParserDispatch>::parse(src).err().unwrap();
        assert!(err.to_string().contains("Unknown operation: foo.bar"));
    }
}
