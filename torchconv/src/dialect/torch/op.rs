use crate::dialect::torch::as_tensor;
use crate::dialect::torch::as_tuple;
use crate::dialect::torch::IntType;
use crate::dialect::torch::NoneType;
use crate::dialect::torch::NonValueTensorType;
use crate::dialect::torch::ValueTensorType;
use crate::ir::display_types;
use crate::ir::into_shared;
use crate::ir::same_type;
use crate::ir::Block;
use crate::ir::IntegerAttr;
use crate::ir::IntegerType;
use crate::ir::Op;
use crate::ir::Operation;
use crate::ir::OperationName;
use crate::ir::Type;
use crate::ir::Uses;
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
use std::fmt::Formatter;
use std::sync::Arc;

fn build<O: Op>(operands: Vec<Shared<Value>>, result_types: Vec<Arc<dyn Type>>) -> O {
    let operation = Operation::with_results(O::operation_name(), operands, result_types);
    O::from_operation(Shared::new(operation.into()))
}

/// Replace the uses of the single result of `op` by `value` and remove `op`.
fn fold_into(op: &dyn Op, value: Shared<Value>) -> Result<bool> {
    let result = match op.result(0) {
        Some(result) => result,
        None => return Ok(false),
    };
    result.replace_all_uses_with(&value);
    op.remove()?;
    Ok(true)
}

/// Display ops of the form `%r = <name> %a : <A> to <B>`.
fn display_cast(op: &dyn Op, f: &mut Formatter<'_>) -> std::fmt::Result {
    let operation = op.operation().rd();
    operation.display_results(f)?;
    write!(f, "{} {} : ", operation.name(), operation.operands())?;
    display_types(f, &operation.operand_types())?;
    write!(f, " to ")?;
    display_types(f, &operation.result_types())
}

/// `torch.constant.none`
///
/// ```mlir
/// %none = torch.constant.none
/// ```
pub struct ConstantNoneOp {
    operation: Shared<Operation>,
}

impl ConstantNoneOp {
    pub fn build() -> Self {
        build(vec![], vec![Arc::new(NoneType)])
    }
}

impl Op for ConstantNoneOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.constant.none")
    }
    fn new(operation: Shared<Operation>) -> Self {
        ConstantNoneOp { operation }
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
        write!(f, "{}", operation.name())
    }
}

impl Parse for ConstantNoneOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["torch.constant.none"])?;
        let results = parser.op_results(&names, vec![Arc::new(NoneType)])?;
        let op = parsed_op::<ConstantNoneOp>(vec![], results, parent);
        Ok(into_shared(op))
    }
}

/// `torch.constant.int`
///
/// ```mlir
/// %int0 = torch.constant.int 0
/// ```
pub struct ConstantIntOp {
    operation: Shared<Operation>,
}

impl ConstantIntOp {
    pub fn build(value: i64) -> Self {
        let op: ConstantIntOp = build(vec![], vec![Arc::new(IntType)]);
        op.set_value(value);
        op
    }
    fn set_value(&self, value: i64) {
        let attribute = IntegerAttr::new(value, Arc::new(IntegerType::new(64)));
        let mut operation = self.operation.wr();
        operation.attributes_mut().insert("value", Arc::new(attribute));
    }
    pub fn value(&self) -> Option<i64> {
        let attribute = self.operation.rd().attributes().get("value")?;
        let value = attribute
            .as_any()
            .downcast_ref::<IntegerAttr>()
            .map(|attribute| attribute.value());
        value
    }
}

impl Op for ConstantIntOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.constant.int")
    }
    fn new(operation: Shared<Operation>) -> Self {
        ConstantIntOp { operation }
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
        let value = self.value().unwrap_or_default();
        let operation = self.operation.rd();
        operation.display_results(f)?;
        write!(f, "{} {value}", operation.name())
    }
}

impl Parse for ConstantIntOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["torch.constant.int"])?;
        let value = parser.parse_integer()?;
        let results = parser.op_results(&names, vec![Arc::new(IntType)])?;
        let op = parsed_op::<ConstantIntOp>(vec![], results, parent);
        op.set_value(value);
        Ok(into_shared(op))
    }
}

/// `torch.prim.TupleConstruct`
///
/// ```mlir
/// %0 = torch.prim.TupleConstruct %arg0, %arg1 : !torch.tensor, !torch.tensor -> !torch.tuple<tensor, tensor>
/// ```
pub struct PrimTupleConstructOp {
    operation: Shared<Operation>,
}

impl PrimTupleConstructOp {
    pub fn build(result_type: Arc<dyn Type>, elements: Vec<Shared<Value>>) -> Self {
        build(elements, vec![result_type])
    }
}

impl Op for PrimTupleConstructOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.prim.TupleConstruct")
    }
    fn new(operation: Shared<Operation>) -> Self {
        PrimTupleConstructOp { operation }
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
        } else {
            write!(f, " :")?;
        }
        write!(f, " -> ")?;
        display_types(f, &operation.result_types())
    }
}

impl Parse for PrimTupleConstructOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["torch.prim.TupleConstruct"])?;
        let operands = parser.parse_op_operands(&parent)?;
        parser.expect(TokenKind::Colon)?;
        if !operands.is_empty() {
            parser.parse_types()?;
        }
        parser.expect(TokenKind::Arrow)?;
        let result_type = parser.parse_type()?;
        let results = parser.op_results(&names, vec![result_type])?;
        let op = parsed_op::<PrimTupleConstructOp>(operands, results, parent);
        Ok(into_shared(op))
    }
}

/// `torch.prim.TupleIndex`
///
/// ```mlir
/// %1 = torch.prim.TupleIndex %0, %int0 : !torch.tuple<tensor, tensor>, !torch.int -> !torch.tensor
/// ```
pub struct PrimTupleIndexOp {
    operation: Shared<Operation>,
}

impl PrimTupleIndexOp {
    pub fn build(result_type: Arc<dyn Type>, tuple: Shared<Value>, index: Shared<Value>) -> Self {
        build(vec![tuple, index], vec![result_type])
    }
    /// The element that this op extracts when the tuple and the index are
    /// known.
    fn folded_element(&self) -> Option<Shared<Value>> {
        let operands = self.operation.rd().operand_values();
        let [tuple, index] = operands.as_slice() else {
            return None;
        };
        let construct = tuple.rd().defining_op()?;
        let construct = construct.rd();
        if !construct.as_any().is::<PrimTupleConstructOp>() {
            return None;
        }
        let index = index.rd().defining_op()?;
        let index = index.rd().as_any().downcast_ref::<ConstantIntOp>()?.value()?;
        let elements = construct.operation().rd().operand_values();
        let len = elements.len() as i64;
        let index = if index < 0 { index + len } else { index };
        if index < 0 || len <= index {
            return None;
        }
        let element = elements[index as usize].clone();
        let result_type = self.operation.rd().result(0)?.rd().typ();
        if same_type(&element.rd().typ(), &result_type) {
            Some(element)
        } else {
            None
        }
    }
}

impl Op for PrimTupleIndexOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.prim.TupleIndex")
    }
    fn new(operation: Shared<Operation>) -> Self {
        PrimTupleIndexOp { operation }
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
    fn canonicalize(&self) -> Result<bool> {
        match self.folded_element() {
            Some(element) => fold_into(self, element),
            None => Ok(false),
        }
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        operation.display_results(f)?;
        write!(f, "{} {} : ", operation.name(), operation.operands())?;
        display_types(f, &operation.operand_types())?;
        write!(f, " -> ")?;
        display_types(f, &operation.result_types())
    }
}

impl Parse for PrimTupleIndexOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        let names = parser.parse_op_result_names()?;
        parser.parse_operation_name(&["torch.prim.TupleIndex"])?;
        let tuple = parser.parse_op_operand(&parent)?;
        parser.expect(TokenKind::Comma)?;
        let index = parser.parse_op_operand(&parent)?;
        parser.expect(TokenKind::Colon)?;
        parser.parse_types()?;
        parser.expect(TokenKind::Arrow)?;
        let result_type = parser.parse_type()?;
        let results = parser.op_results(&names, vec![result_type])?;
        let op = parsed_op::<PrimTupleIndexOp>(vec![tuple, index], results, parent);
        Ok(into_shared(op))
    }
}

/// Parse ops of the form `%r = <name> %a : <A> to <B>`.
fn parse_cast<T: ParserDispatch, O: Op + 'static>(
    parser: &mut Parser<T>,
    parent: Option<Shared<Block>>,
) -> Result<Shared<dyn Op>> {
    let names = parser.parse_op_result_names()?;
    let name = O::operation_name().name();
    parser.parse_operation_name(&[name.as_str()])?;
    let operand = parser.parse_op_operand(&parent)?;
    parser.expect(TokenKind::Colon)?;
    parser.parse_type()?;
    parser.parse_keyword("to")?;
    let result_type = parser.parse_type()?;
    let results = parser.op_results(&names, vec![result_type])?;
    let op = parsed_op::<O>(vec![operand], results, parent);
    Ok(into_shared(op))
}

/// `torch.tensor_static_info_cast`
///
/// Changes the static information (sizes and dtype) of a tensor type without
/// changing its value semantics.
///
/// ```mlir
/// %0 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor
/// ```
pub struct TensorStaticInfoCastOp {
    operation: Shared<Operation>,
}

impl TensorStaticInfoCastOp {
    pub fn build(result_type: Arc<dyn Type>, operand: Shared<Value>) -> Self {
        build(vec![operand], vec![result_type])
    }
}

/// The operand of the `torch.tensor_static_info_cast` that defines `value`,
/// if that operand has type `typ`.
fn reverted_cast(value: &Shared<Value>, typ: &Arc<dyn Type>) -> Option<Shared<Value>> {
    let defining_op = value.rd().defining_op()?;
    let defining_op = defining_op.rd();
    if !defining_op.as_any().is::<TensorStaticInfoCastOp>() {
        return None;
    }
    let original = defining_op.operation().rd().operand_values().first().cloned()?;
    let original_type = original.rd().typ();
    if same_type(&original_type, typ) {
        Some(original)
    } else {
        None
    }
}

impl Op for TensorStaticInfoCastOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.tensor_static_info_cast")
    }
    fn new(operation: Shared<Operation>) -> Self {
        TensorStaticInfoCastOp { operation }
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
    fn canonicalize(&self) -> Result<bool> {
        let operand = self.operation.rd().operand_values().first().cloned();
        let result_type = self.operation.rd().result_types().first().cloned();
        let (operand, result_type) = match (operand, result_type) {
            (Some(operand), Some(result_type)) => (operand, result_type),
            _ => return Ok(false),
        };
        if same_type(&operand.rd().typ(), &result_type) {
            return fold_into(self, operand);
        }
        // A cast that undoes the cast which defines its operand.
        match reverted_cast(&operand, &result_type) {
            Some(original) => fold_into(self, original),
            None => Ok(false),
        }
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        display_cast(self, f)
    }
}

impl Parse for TensorStaticInfoCastOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parse_cast::<T, TensorStaticInfoCastOp>(parser, parent)
    }
}

/// Parse ops of the form `%r = <name> %a : <R>`.
fn parse_copy<T: ParserDispatch, O: Op + 'static>(
    parser: &mut Parser<T>,
    parent: Option<Shared<Block>>,
) -> Result<Shared<dyn Op>> {
    let names = parser.parse_op_result_names()?;
    let name = O::operation_name().name();
    parser.parse_operation_name(&[name.as_str()])?;
    let operand = parser.parse_op_operand(&parent)?;
    parser.expect(TokenKind::Colon)?;
    let result_type = parser.parse_type()?;
    let results = parser.op_results(&names, vec![result_type])?;
    let op = parsed_op::<O>(vec![operand], results, parent);
    Ok(into_shared(op))
}

fn display_copy(op: &dyn Op, f: &mut Formatter<'_>) -> std::fmt::Result {
    let operation = op.operation().rd();
    operation.display_results(f)?;
    write!(f, "{} {} : ", operation.name(), operation.operands())?;
    display_types(f, &operation.result_types())
}

/// Return the tensor info of `value` or an error if it is not a tensor.
fn tensor_info(value: &Shared<Value>, op: &str) -> Result<crate::dialect::torch::TensorInfo> {
    let typ = value.rd().typ();
    match as_tensor(&typ) {
        Some(tensor) => Ok(tensor.info().clone()),
        None => Err(anyhow::anyhow!("{op} expects a tensor operand, got {typ}")),
    }
}

/// `torch.copy.to_vtensor`
///
/// ```mlir
/// %0 = torch.copy.to_vtensor %arg0 : !torch.vtensor<[2],f32>
/// ```
pub struct CopyToValueTensorOp {
    operation: Shared<Operation>,
}

impl CopyToValueTensorOp {
    pub fn build(operand: Shared<Value>) -> Result<Self> {
        let info = tensor_info(&operand, "torch.copy.to_vtensor")?;
        Ok(build(vec![operand], vec![Arc::new(ValueTensorType::new(info))]))
    }
}

impl Op for CopyToValueTensorOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.copy.to_vtensor")
    }
    fn new(operation: Shared<Operation>) -> Self {
        CopyToValueTensorOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        display_copy(self, f)
    }
}

impl Parse for CopyToValueTensorOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parse_copy::<T, CopyToValueTensorOp>(parser, parent)
    }
}

/// `torch.copy.to_tensor`
///
/// ```mlir
/// %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
/// ```
pub struct CopyToNonValueTensorOp {
    operation: Shared<Operation>,
}

impl CopyToNonValueTensorOp {
    pub fn build(operand: Shared<Value>) -> Result<Self> {
        let info = tensor_info(&operand, "torch.copy.to_tensor")?;
        Ok(build(vec![operand], vec![Arc::new(NonValueTensorType::new(info))]))
    }
}

impl Op for CopyToNonValueTensorOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.copy.to_tensor")
    }
    fn new(operation: Shared<Operation>) -> Self {
        CopyToNonValueTensorOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        display_copy(self, f)
    }
}

impl Parse for CopyToNonValueTensorOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parse_copy::<T, CopyToNonValueTensorOp>(parser, parent)
    }
}

/// `torch.overwrite.tensor.contents`
///
/// Replaces the contents of the non-value tensor `overwritten` with `value`.
///
/// ```mlir
/// torch.overwrite.tensor.contents %0 overwrites %arg0 : !torch.vtensor<[2],f32>, !torch.tensor<[2],f32>
/// ```
pub struct OverwriteTensorContentsOp {
    operation: Shared<Operation>,
}

impl OverwriteTensorContentsOp {
    pub fn build(value: Shared<Value>, overwritten: Shared<Value>) -> Self {
        build(vec![value, overwritten], vec![])
    }
    pub fn value(&self) -> Option<Shared<Value>> {
        self.operation.rd().operand_values().first().cloned()
    }
    pub fn overwritten(&self) -> Option<Shared<Value>> {
        self.operation.rd().operand_values().get(1).cloned()
    }
}

impl Op for OverwriteTensorContentsOp {
    fn operation_name() -> OperationName {
        OperationName::new("torch.overwrite.tensor.contents")
    }
    fn new(operation: Shared<Operation>) -> Self {
        OverwriteTensorContentsOp { operation }
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
    fn operation(&self) -> &Shared<Operation> {
        &self.operation
    }
    fn display(&self, f: &mut Formatter<'_>, _indent: i32) -> std::fmt::Result {
        let operation = self.operation.rd();
        let operands = operation.operands();
        let operand = |index: usize| match operands.get(index) {
            Some(operand) => operand.rd().to_string(),
            None => "<missing>".to_string(),
        };
        write!(f, "{} {} overwrites {} : ", operation.name(), operand(0), operand(1))?;
        display_types(f, &operation.operand_types())
    }
}

impl Parse for OverwriteTensorContentsOp {
    fn op<T: ParserDispatch>(
        parser: &mut Parser<T>,
        parent: Option<Shared<Block>>,
    ) -> Result<Shared<dyn Op>> {
        parser.parse_operation_name(&["torch.overwrite.tensor.contents"])?;
        let value = parser.parse_op_operand(&parent)?;
        parser.parse_keyword("overwrites")?;
        let overwritten = parser.parse_op_operand(&parent)?;
        parser.expect(TokenKind::Colon)?;
        parser.parse_types()?;
        let operands = vec![value, overwritten];
        let op = parsed_op::<OverwriteTensorContentsOp>(operands, Values::default(), parent);
        Ok(into_shared(op))
    }
}

/// Return the contained types if `typ` is a tuple.
pub fn tuple_contained_types(typ: &Arc<dyn Type>) -> Option<Vec<Arc<dyn Type>>> {
    as_tuple(typ).map(|tuple| tuple.contained_types().to_vec())
}
