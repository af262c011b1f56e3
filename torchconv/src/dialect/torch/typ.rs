use crate::ir::Type;
use crate::parser::Parser;
use crate::parser::ParserDispatch;
use crate::parser::TokenKind;
use anyhow::Result;
use std::fmt::Formatter;
use std::sync::Arc;

/// Static information about a tensor.
///
/// `sizes` is `None` for unranked tensors and a dimension is `None` when its
/// size is unknown. `dtype` is `None` when the element type is unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TensorInfo {
    pub sizes: Option<Vec<Option<i64>>>,
    pub dtype: Option<String>,
}

impl TensorInfo {
    pub fn new(sizes: Option<Vec<Option<i64>>>, dtype: Option<&str>) -> Self {
        TensorInfo {
            sizes,
            dtype: dtype.map(|dtype| dtype.to_string()),
        }
    }
    /// Whether nothing is known about the tensor.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_none() && self.dtype.is_none()
    }
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "<")?;
        match &self.sizes {
            Some(sizes) => {
                let sizes = sizes
                    .iter()
                    .map(|size| match size {
                        Some(size) => size.to_string(),
                        None => "?".to_string(),
                    })
                    .collect::<Vec<_>>();
                write!(f, "[{}]", sizes.join(","))?;
            }
            None => write!(f, "*")?,
        }
        match &self.dtype {
            Some(dtype) => write!(f, ",{dtype}>"),
            None => write!(f, ",unk>"),
        }
    }
}

/// Interface shared by `!torch.tensor` and `!torch.vtensor`.
pub trait BaseTensorType: Type {
    fn info(&self) -> &TensorInfo;
    fn has_value_semantics(&self) -> bool;
    /// Return a tensor type of the same kind but with the given info.
    fn with_info(&self, info: TensorInfo) -> Arc<dyn Type>;
    fn has_same_sizes_and_dtype(&self, other: &dyn BaseTensorType) -> bool {
        self.info() == other.info()
    }
}

/// `!torch.tensor`: a tensor with reference (aliasing) semantics.
pub struct NonValueTensorType {
    info: TensorInfo,
}

impl NonValueTensorType {
    pub fn new(info: TensorInfo) -> Self {
        NonValueTensorType { info }
    }
}

impl BaseTensorType for NonValueTensorType {
    fn info(&self) -> &TensorInfo {
        &self.info
    }
    fn has_value_semantics(&self) -> bool {
        false
    }
    fn with_info(&self, info: TensorInfo) -> Arc<dyn Type> {
        Arc::new(NonValueTensorType::new(info))
    }
}

impl Type for NonValueTensorType {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "!torch.tensor")?;
        self.info.display(f)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// `!torch.vtensor`: a tensor with value (copy) semantics.
pub struct ValueTensorType {
    info: TensorInfo,
}

impl ValueTensorType {
    pub fn new(info: TensorInfo) -> Self {
        ValueTensorType { info }
    }
}

impl BaseTensorType for ValueTensorType {
    fn info(&self) -> &TensorInfo {
        &self.info
    }
    fn has_value_semantics(&self) -> bool {
        true
    }
    fn with_info(&self, info: TensorInfo) -> Arc<dyn Type> {
        Arc::new(ValueTensorType::new(info))
    }
}

impl Type for ValueTensorType {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "!torch.vtensor")?;
        self.info.display(f)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Return the type as a tensor type if it is one.
pub fn as_tensor(typ: &Arc<dyn Type>) -> Option<&dyn BaseTensorType> {
    let any = typ.as_any();
    if let Some(typ) = any.downcast_ref::<NonValueTensorType>() {
        return Some(typ as &dyn BaseTensorType);
    }
    if let Some(typ) = any.downcast_ref::<ValueTensorType>() {
        return Some(typ as &dyn BaseTensorType);
    }
    None
}

pub fn is_value_tensor(typ: &Arc<dyn Type>) -> bool {
    typ.as_any().is::<ValueTensorType>()
}

pub fn is_non_value_tensor(typ: &Arc<dyn Type>) -> bool {
    typ.as_any().is::<NonValueTensorType>()
}

macro_rules! simple_type {
    ($name:ident, $text:literal) => {
        #[doc = concat!("`", $text, "`")]
        pub struct $name;

        impl Type for $name {
            fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, $text)
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
    };
}

simple_type!(NoneType, "!torch.none");
simple_type!(IntType, "!torch.int");
simple_type!(BoolType, "!torch.bool");
simple_type!(FloatType, "!torch.float");

pub fn is_none(typ: &Arc<dyn Type>) -> bool {
    typ.as_any().is::<NoneType>()
}

/// `!torch.tuple<T1, T2, ...>`.
pub struct TupleType {
    contained_types: Vec<Arc<dyn Type>>,
}

impl TupleType {
    pub fn new(contained_types: Vec<Arc<dyn Type>>) -> Self {
        TupleType { contained_types }
    }
    pub fn contained_types(&self) -> &[Arc<dyn Type>] {
        &self.contained_types
    }
}

impl Type for TupleType {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let types = self
            .contained_types
            .iter()
            .map(|typ| {
                let text = typ.to_string();
                match text.strip_prefix("!torch.") {
                    Some(stripped) => stripped.to_string(),
                    None => text,
                }
            })
            .collect::<Vec<_>>();
        write!(f, "!torch.tuple<{}>", types.join(", "))
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub fn as_tuple(typ: &Arc<dyn Type>) -> Option<&TupleType> {
    typ.as_any().downcast_ref::<TupleType>()
}

fn parse_dimension<T: ParserDispatch>(parser: &mut Parser<T>) -> Result<Option<i64>> {
    if parser.check(TokenKind::Question) {
        parser.advance();
        Ok(None)
    } else {
        Ok(Some(parser.parse_integer()?))
    }
}

/// Parse the part after the tensor name (e.g., `<[2,?],f32>`).
fn parse_tensor_info<T: ParserDispatch>(parser: &mut Parser<T>) -> Result<TensorInfo> {
    if !parser.check(TokenKind::Less) {
        return Ok(TensorInfo::default());
    }
    parser.advance();
    let sizes = if parser.check(TokenKind::Star) {
        parser.advance();
        None
    } else {
        parser.expect(TokenKind::LBracket)?;
        let mut sizes = vec![];
        while !parser.check(TokenKind::RBracket) {
            sizes.push(parse_dimension(parser)?);
            if !parser.check(TokenKind::Comma) {
                break;
            }
            parser.advance();
        }
        parser.expect(TokenKind::RBracket)?;
        Some(sizes)
    };
    parser.expect(TokenKind::Comma)?;
    let dtype = parser.advance().clone();
    let dtype = match dtype.kind {
        TokenKind::BareIdentifier if dtype.lexeme == "unk" => None,
        TokenKind::BareIdentifier | TokenKind::IntType => Some(dtype.lexeme),
        _ => {
            let msg = parser.error(&dtype, "Expected a dtype");
            return Err(anyhow::anyhow!(msg));
        }
    };
    parser.expect(TokenKind::Greater)?;
    Ok(TensorInfo { sizes, dtype })
}

fn parse_tuple_element<T: ParserDispatch>(parser: &mut Parser<T>) -> Result<Arc<dyn Type>> {
    if parser.check(TokenKind::BareIdentifier) {
        let name = parser.advance().clone();
        parse_torch_type_body(parser, &name.lexeme, &name)
    } else {
        parser.parse_type()
    }
}

fn parse_torch_type_body<T: ParserDispatch>(
    parser: &mut Parser<T>,
    name: &str,
    token: &crate::parser::Token,
) -> Result<Arc<dyn Type>> {
    let typ: Arc<dyn Type> = match name {
        "none" => Arc::new(NoneType),
        "int" => Arc::new(IntType),
        "bool" => Arc::new(BoolType),
        "float" => Arc::new(FloatType),
        "tensor" => Arc::new(NonValueTensorType::new(parse_tensor_info(parser)?)),
        "vtensor" => Arc::new(ValueTensorType::new(parse_tensor_info(parser)?)),
        "tuple" => {
            parser.expect(TokenKind::Less)?;
            let mut types = vec![];
            while !parser.check(TokenKind::Greater) {
                types.push(parse_tuple_element(parser)?);
                if !parser.check(TokenKind::Comma) {
                    break;
                }
                parser.advance();
            }
            parser.expect(TokenKind::Greater)?;
            Arc::new(TupleType::new(types))
        }
        _ => {
            let msg = format!("Unknown torch type: {name}");
            return Err(anyhow::anyhow!(parser.error(token, &msg)));
        }
    };
    Ok(typ)
}

/// Parse a type such as `!torch.vtensor<[2,3],f32>` or `!torch.tuple<tensor, int>`.
pub fn parse_torch_type<T: ParserDispatch>(parser: &mut Parser<T>) -> Result<Arc<dyn Type>> {
    parser.expect(TokenKind::Exclamation)?;
    let token = parser.expect(TokenKind::BareIdentifier)?;
    match token.lexeme.strip_prefix("torch.") {
        Some(name) => parse_torch_type_body(parser, name, &token),
        None => {
            let msg = parser.error(&token, "Expected a torch type");
            Err(anyhow::anyhow!(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_display() {
        let info = TensorInfo::new(Some(vec![Some(2), Some(3), None]), Some("f32"));
        let typ: Arc<dyn Type> = Arc::new(ValueTensorType::new(info));
        assert_eq!(typ.to_string(), "!torch.vtensor<[2,3,?],f32>");
        assert!(as_tensor(&typ).is_some_and(|t| t.has_value_semantics()));
        let typ: Arc<dyn Type> = Arc::new(NonValueTensorType::new(TensorInfo::default()));
        assert_eq!(typ.to_string(), "!torch.tensor");
        let typ: Arc<dyn Type> = Arc::new(NonValueTensorType::new(TensorInfo::new(None, None)));
        assert!(is_non_value_tensor(&typ));
        let unranked = TensorInfo::new(None, Some("si64"));
        let typ: Arc<dyn Type> = Arc::new(ValueTensorType::new(unranked));
        assert_eq!(typ.to_string(), "!torch.vtensor<*,si64>");
    }

    #[test]
    fn test_tuple_display() {
        let tensor: Arc<dyn Type> = Arc::new(NonValueTensorType::new(TensorInfo::default()));
        let int: Arc<dyn Type> = Arc::new(IntType);
        let tuple: Arc<dyn Type> = Arc::new(TupleType::new(vec![tensor, int]));
        assert_eq!(tuple.to_string(), "!torch.tuple<tensor, int>");
        assert_eq!(as_tuple(&tuple).map(|t| t.contained_types().len()), Some(2));
        assert!(as_tensor(&tuple).is_none());
    }
}
