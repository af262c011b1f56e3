use crate::convert::dialect_conversion::prepare_partial_conversion;
use crate::convert::dialect_conversion::ConversionPattern;
use crate::convert::dialect_conversion::ConversionRewriter;
use crate::convert::dialect_conversion::ConversionTarget;
use crate::convert::dialect_conversion::PatternMatch;
use crate::convert::dialect_conversion::SignatureConversion;
use crate::convert::dialect_conversion::TypeConverter;
use crate::convert::dialect_conversion::ValueGroup;
use crate::convert::Pass;
use crate::convert::RewriteResult;
use crate::dialect::builtin::UnrealizedConversionCastOp;
use crate::dialect::func::Call;
use crate::dialect::func::CallIndirectOp;
use crate::dialect::func::CallOp;
use crate::dialect::func::ConstantOp;
use crate::dialect::func::Func;
use crate::dialect::func::FuncOp;
use crate::dialect::func::ReturnOp;
use crate::dialect::torch::as_tensor;
use crate::dialect::torch::as_tuple;
use crate::dialect::torch::copy_tensor_to_type;
use crate::dialect::torch::is_non_value_tensor;
use crate::dialect::torch::is_none;
use crate::dialect::torch::is_value_tensor;
use crate::dialect::torch::ConstantIntOp;
use crate::dialect::torch::ConstantNoneOp;
use crate::dialect::torch::CopyToNonValueTensorOp;
use crate::dialect::torch::CopyToValueTensorOp;
use crate::dialect::torch::PrimTupleConstructOp;
use crate::dialect::torch::PrimTupleIndexOp;
use crate::dialect::torch::TensorStaticInfoCastOp;
use crate::ir::walk;
use crate::ir::Op;
use crate::ir::OpBuilder;
use crate::ir::Operation;
use crate::ir::Type;
use crate::ir::TypeAttr;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Context;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tracing::info;

/// Name of the argument attribute that refines the type of a tensor argument.
pub const TYPE_BOUND: &str = "torch.type_bound";

const UNIMPLEMENTED_BOUND: &str =
    "unimplemented: preserving aliasing for non-value-semantic type bounds";

/// Refined argument types keyed by (function symbol, argument index).
///
/// The symbol includes the `@`, so that it can be compared directly with the
/// callee of a `func.call`.
pub type TypeBoundMap = HashMap<(String, usize), Arc<dyn Type>>;

/// Collect the `torch.type_bound` annotations of all functions in `module`.
pub fn collect_type_bounds(module: &Shared<dyn Op>) -> TypeBoundMap {
    let mut type_bounds = TypeBoundMap::new();
    for op in module.rd().ops() {
        let op = op.rd();
        let func = match op.as_any().downcast_ref::<FuncOp>() {
            Some(func) => func,
            None => continue,
        };
        let identifier = func.identifier().unwrap_or_default();
        for (index, argument) in func.arguments().to_vec().iter().enumerate() {
            if let Value::BlockArgument(argument) = &*argument.rd() {
                let bound = argument.attributes().get(TYPE_BOUND);
                let bound = bound
                    .as_ref()
                    .and_then(|attr| attr.as_any().downcast_ref::<TypeAttr>());
                if let Some(bound) = bound {
                    type_bounds.insert((identifier.clone(), index), bound.typ());
                }
            }
        }
    }
    type_bounds
}

fn type_bound(argument: &Value) -> Option<Option<Arc<dyn Type>>> {
    match argument {
        Value::BlockArgument(argument) => {
            let attr = argument.attributes().get(TYPE_BOUND)?;
            let bound = attr.as_any().downcast_ref::<TypeAttr>().map(|a| a.typ());
            Some(bound)
        }
        _ => None,
    }
}

/// Return the new types of every argument of `func`.
///
/// The error is a match failure message.
fn convert_arguments(func: &FuncOp) -> std::result::Result<Vec<Vec<Arc<dyn Type>>>, String> {
    let mut inputs = vec![];
    for argument in func.arguments().to_vec() {
        let argument = argument.rd();
        let typ = argument.typ();
        let bound = type_bound(&argument);
        let types = if is_none(&typ) {
            vec![]
        } else if as_tensor(&typ).is_some() {
            match bound {
                Some(Some(bound)) if is_value_tensor(&bound) => vec![bound],
                Some(_) => return Err(UNIMPLEMENTED_BOUND.to_string()),
                None if is_non_value_tensor(&typ) => return Err(UNIMPLEMENTED_BOUND.to_string()),
                None => vec![typ],
            }
        } else if bound.is_some() {
            return Err(format!("unimplemented: type bound on argument of type {typ}"));
        } else {
            // Tuple-typed arguments are not flattened (yet).
            vec![typ]
        };
        inputs.push(types);
    }
    Ok(inputs)
}

fn convert_results(result_types: &[Arc<dyn Type>]) -> Vec<Arc<dyn Type>> {
    let mut results = vec![];
    for typ in result_types {
        if is_none(typ) {
            continue;
        }
        match as_tuple(typ) {
            Some(tuple) => results.extend(tuple.contained_types().iter().cloned()),
            None => results.push(typ.clone()),
        }
    }
    results
}

/// Rewrites the signature of a `func.func`.
struct AdjustFuncSignature;

impl ConversionPattern for AdjustFuncSignature {
    fn name(&self) -> &'static str {
        "adjust_calling_conventions::AdjustFuncSignature"
    }
    fn is_match(&self, op: &dyn Op) -> Result<PatternMatch> {
        let func = match op.as_any().downcast_ref::<FuncOp>() {
            Some(func) => func,
            None => return Ok(PatternMatch::NotApplicable),
        };
        match convert_arguments(func) {
            Ok(_) => Ok(PatternMatch::Matched),
            Err(msg) => Ok(PatternMatch::Failure(msg)),
        }
    }
    fn rewrite(&self, op: Shared<dyn Op>, rewriter: &mut ConversionRewriter) -> Result<()> {
        let (inputs, result_types) = {
            let op = op.rd();
            let func = match op.as_any().downcast_ref::<FuncOp>() {
                Some(func) => func,
                None => return Err(anyhow::anyhow!("expected a func.func")),
            };
            let inputs = convert_arguments(func).map_err(|msg| anyhow::anyhow!(msg))?;
            (inputs, convert_results(&func.result_types()))
        };
        let mut conversion = SignatureConversion::new(inputs.len());
        for (index, types) in inputs.into_iter().enumerate() {
            conversion.add_inputs(index, types);
        }
        rewriter.apply_signature_conversion(&op, &conversion)?;

        let op = op.rd();
        if let Some(func) = op.as_any().downcast_ref::<FuncOp>() {
            let arguments = func.arguments().to_vec();
            for argument in arguments.iter() {
                if let Value::BlockArgument(argument) = &mut *argument.wr() {
                    argument.attributes_mut().remove(TYPE_BOUND);
                }
            }
            func.set_signature(arguments, result_types);
        }
        Ok(())
    }
}

/// Rewrites a `func.call` to match the adjusted signature of the callee.
struct AdjustCallSite<'a> {
    type_bounds: &'a TypeBoundMap,
}

impl AdjustCallSite<'_> {
    fn bound(&self, callee: &str, index: usize) -> Option<&Arc<dyn Type>> {
        self.type_bounds.get(&(callee.to_string(), index))
    }
}

impl ConversionPattern for AdjustCallSite<'_> {
    fn name(&self) -> &'static str {
        "adjust_calling_conventions::AdjustCallSite"
    }
    fn is_match(&self, op: &dyn Op) -> Result<PatternMatch> {
        let call = match op.as_any().downcast_ref::<CallOp>() {
            Some(call) => call,
            None => return Ok(PatternMatch::NotApplicable),
        };
        let callee = call.identifier().unwrap_or_default();
        let operand_types = call.operation().rd().operand_types();
        for (index, typ) in operand_types.iter().enumerate() {
            if is_none(typ) {
                continue;
            }
            if let Some(bound) = self.bound(&callee, index) {
                if !is_value_tensor(bound) {
                    return Ok(PatternMatch::Failure(UNIMPLEMENTED_BOUND.to_string()));
                }
            }
        }
        Ok(PatternMatch::Matched)
    }
    fn rewrite(&self, op: Shared<dyn Op>, rewriter: &mut ConversionRewriter) -> Result<()> {
        let (callee, operands, result_types) = {
            let op = op.rd();
            let call = match op.as_any().downcast_ref::<CallOp>() {
                Some(call) => call,
                None => return Err(anyhow::anyhow!("expected a func.call")),
            };
            let operation = call.operation().rd();
            (
                call.identifier().unwrap_or_default(),
                operation.operand_values(),
                operation.result_types(),
            )
        };
        let converted_results = rewriter.type_converter().convert_types(&result_types)?;

        let mut builder = OpBuilder::before(&op)?;
        let mut new_operands = vec![];
        for (index, operand) in operands.into_iter().enumerate() {
            let typ = operand.rd().typ();
            if is_none(&typ) {
                continue;
            }
            match self.bound(&callee, index) {
                Some(bound) if is_value_tensor(bound) => {
                    new_operands.push(copy_tensor_to_type(&mut builder, bound, operand)?);
                }
                Some(_) => return Err(anyhow::anyhow!(UNIMPLEMENTED_BOUND)),
                None => new_operands.push(operand),
            }
        }
        let new_call = CallOp::build(&callee, new_operands, converted_results);
        let new_call = builder.insert(new_call);
        let new_results = new_call.rd().operation().rd().results().to_vec();

        let mut next = new_results.into_iter();
        let mut replacements = vec![];
        for typ in result_types.iter() {
            if is_none(typ) {
                replacements.push(builder.insert_value(ConstantNoneOp::build())?);
                continue;
            }
            if let Some(tuple) = as_tuple(typ) {
                let len = tuple.contained_types().len();
                let elements = next.by_ref().take(len).collect::<Vec<_>>();
                if elements.len() != len {
                    return Err(anyhow::anyhow!("{callee} returned too few results"));
                }
                let construct = PrimTupleConstructOp::build(typ.clone(), elements.clone());
                let construct = builder.insert_value(construct)?;
                rewriter.map_values(construct.clone(), elements);
                replacements.push(construct);
                continue;
            }
            match next.next() {
                Some(result) => replacements.push(result),
                None => return Err(anyhow::anyhow!("{callee} returned too few results")),
            }
        }
        rewriter.replace_op(&op, replacements)
    }
}

/// Return the tuple that `cast` decomposes, if it decomposes one.
fn decomposed_tuple(cast: &Shared<dyn Op>) -> Option<(Shared<Value>, Vec<Arc<dyn Type>>)> {
    let operand = cast.rd().operation().rd().operand_values().into_iter().next()?;
    let typ = operand.rd().typ();
    let types = as_tuple(&typ)?.contained_types().to_vec();
    Some((operand, types))
}

/// Rewrites a return to match the adjusted results of the function.
struct AdjustReturn;

impl ConversionPattern for AdjustReturn {
    fn name(&self) -> &'static str {
        "adjust_calling_conventions::AdjustReturn"
    }
    fn is_match(&self, op: &dyn Op) -> Result<PatternMatch> {
        if op.as_any().is::<ReturnOp>() {
            Ok(PatternMatch::Matched)
        } else {
            Ok(PatternMatch::NotApplicable)
        }
    }
    fn rewrite(&self, op: Shared<dyn Op>, rewriter: &mut ConversionRewriter) -> Result<()> {
        let groups = rewriter.remap_operands(&op)?;
        let mut builder = OpBuilder::before(&op)?;
        let mut new_operands = vec![];
        for group in groups {
            match group {
                ValueGroup::Direct(values) => {
                    if values.len() == 1 && is_none(&values[0].rd().typ()) {
                        continue;
                    }
                    new_operands.extend(values);
                }
                ValueGroup::Placeholder { cast, values } => match decomposed_tuple(&cast) {
                    Some((tuple, types)) => {
                        for (index, typ) in types.into_iter().enumerate() {
                            let index = ConstantIntOp::build(index as i64);
                            let index = builder.insert_value(index)?;
                            let element = PrimTupleIndexOp::build(typ, tuple.clone(), index);
                            new_operands.push(builder.insert_value(element)?);
                        }
                    }
                    None => new_operands.extend(values),
                },
            }
        }
        builder.insert(ReturnOp::build(new_operands));
        rewriter.replace_op(&op, vec![])
    }
}

fn materialize(
    builder: &mut OpBuilder,
    typ: &Arc<dyn Type>,
    inputs: &[Shared<Value>],
) -> Result<Option<Shared<Value>>> {
    if is_none(typ) && inputs.is_empty() {
        return builder.insert_value(ConstantNoneOp::build()).map(Some);
    }
    if inputs.len() == 1 && as_tensor(typ).is_some() {
        let input_type = inputs[0].rd().typ();
        if as_tensor(&input_type).is_some() {
            return copy_tensor_to_type(builder, typ, inputs[0].clone()).map(Some);
        }
    }
    Ok(None)
}

fn type_converter() -> TypeConverter {
    let mut converter = TypeConverter::new();
    converter.add_conversion(|typ| Some(vec![typ.clone()]));
    converter.add_conversion(|typ| {
        as_tuple(typ).map(|tuple| tuple.contained_types().to_vec())
    });
    converter.add_conversion(|typ| if is_none(typ) { Some(vec![]) } else { None });
    converter.add_source_materialization(materialize);
    converter.add_target_materialization(materialize);
    converter
}

fn is_legal_func(op: &dyn Op) -> bool {
    let func = match op.as_any().downcast_ref::<FuncOp>() {
        Some(func) => func,
        None => return true,
    };
    for argument in func.arguments().to_vec() {
        let argument = argument.rd();
        if is_none(&argument.typ()) || type_bound(&argument).is_some() {
            return false;
        }
    }
    !func
        .result_types()
        .iter()
        .any(|typ| is_none(typ) || as_tuple(typ).is_some())
}

/// The calls and returns that were present before a run, keyed by address.
///
/// The map owns the ops so that their addresses are not reused by new ops.
#[derive(Default)]
struct OriginalOps {
    ops: HashMap<usize, Shared<Operation>>,
}

impl OriginalOps {
    fn collect(module: &Shared<dyn Op>) -> Self {
        let mut originals = OriginalOps::default();
        for op in walk(module) {
            let op = op.rd();
            if op.as_any().is::<CallOp>() || op.as_any().is::<ReturnOp>() {
                originals.insert(op.operation().clone());
            }
        }
        originals
    }
    fn key(operation: &Shared<Operation>) -> usize {
        Arc::as_ptr(operation) as usize
    }
    fn insert(&mut self, operation: Shared<Operation>) {
        self.ops.insert(Self::key(&operation), operation);
    }
    fn contains(&self, op: &dyn Op) -> bool {
        self.ops.contains_key(&Self::key(op.operation()))
    }
}

fn call_needs_rewrite(type_bounds: &TypeBoundMap, op: &dyn Op) -> bool {
    let call = match op.as_any().downcast_ref::<CallOp>() {
        Some(call) => call,
        None => return false,
    };
    let callee = call.identifier().unwrap_or_default();
    let operation = call.operation().rd();
    let operand_types = operation.operand_types();
    let has_bound = (0..operand_types.len())
        .any(|index| type_bounds.contains_key(&(callee.clone(), index)));
    has_bound
        || operand_types.iter().any(is_none)
        || operation
            .result_types()
            .iter()
            .any(|typ| is_none(typ) || as_tuple(typ).is_some())
}

fn return_needs_rewrite(op: &dyn Op) -> bool {
    op.operation()
        .rd()
        .operand_types()
        .iter()
        .any(|typ| is_none(typ) || as_tuple(typ).is_some())
}

/// Legality for one run of the pass.
///
/// Calls and returns are only illegal when they were present before the run,
/// so that the ops created by the rewrites are never rewritten again.
fn conversion_target(module: &Shared<dyn Op>, type_bounds: &TypeBoundMap) -> ConversionTarget {
    let originals = Arc::new(OriginalOps::collect(module));

    let mut target = ConversionTarget::new();
    target.add_dynamically_legal_op::<FuncOp, _>(is_legal_func);
    let calls = originals.clone();
    let type_bounds = type_bounds.clone();
    target.add_dynamically_legal_op::<CallOp, _>(move |op| {
        !(calls.contains(op) && call_needs_rewrite(&type_bounds, op))
    });
    target.add_dynamically_legal_op::<ReturnOp, _>(move |op| {
        !(originals.contains(op) && return_needs_rewrite(op))
    });
    target.add_illegal_op::<CallIndirectOp>();
    target.add_legal_op::<ConstantOp>();
    target.add_legal_op::<ConstantNoneOp>();
    target.add_legal_op::<ConstantIntOp>();
    target.add_legal_op::<PrimTupleConstructOp>();
    target.add_legal_op::<PrimTupleIndexOp>();
    target.add_legal_op::<TensorStaticInfoCastOp>();
    target.add_legal_op::<CopyToValueTensorOp>();
    target.add_legal_op::<CopyToNonValueTensorOp>();
    target.add_legal_op::<UnrealizedConversionCastOp>();
    target
}

/// Remove `!torch.none` and tuple values from function boundaries and
/// resolve `torch.type_bound` annotations.
///
/// Either all functions are rewritten or, when some function cannot be
/// rewritten, none are. Returns whether the IR was changed.
pub fn adjust_calling_conventions(module: &Shared<dyn Op>) -> Result<bool> {
    let type_bounds = collect_type_bounds(module);
    debug!("Collected {} type bounds", type_bounds.len());
    let converter = type_converter();
    let target = conversion_target(module, &type_bounds);

    let func_pattern = AdjustFuncSignature;
    let call_pattern = AdjustCallSite {
        type_bounds: &type_bounds,
    };
    let return_pattern = AdjustReturn;
    let patterns: [&dyn ConversionPattern; 3] = [&func_pattern, &call_pattern, &return_pattern];

    let funcs = module
        .rd()
        .ops()
        .into_iter()
        .filter(|op| op.rd().as_any().is::<FuncOp>())
        .collect::<Vec<_>>();
    let mut plans = vec![];
    for func in funcs.iter() {
        let name = match func.rd().as_any().downcast_ref::<FuncOp>() {
            Some(func) => func.identifier().unwrap_or_default(),
            None => continue,
        };
        let plan = prepare_partial_conversion(func, &target, &patterns)
            .with_context(|| format!("while adjusting calling conventions of {name}"))?;
        plans.push((name, plan));
    }

    let mut changed = false;
    for (name, plan) in plans {
        if plan.is_empty() {
            continue;
        }
        let rewrites = plan.len();
        plan.apply(&converter)
            .with_context(|| format!("while adjusting calling conventions of {name}"))?;
        info!("Adjusted calling conventions of {name} ({rewrites} rewrites)");
        changed = true;
    }
    Ok(changed)
}

pub struct AdjustCallingConventions;

impl Pass for AdjustCallingConventions {
    const NAME: &'static str = "torch-adjust-calling-conventions";
    fn convert(op: Shared<dyn Op>) -> Result<RewriteResult> {
        if adjust_calling_conventions(&op)? {
            Ok(RewriteResult::changed(op))
        } else {
            Ok(RewriteResult::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::torch::NonValueTensorType;
    use crate::dialect::torch::NoneType;
    use crate::dialect::torch::TensorInfo;
    use crate::dialect::torch::TupleType;
    use crate::dialect::torch::ValueTensorType;
    use crate::parser::DefaultParserDispatch;
    use crate::parser::Parser;

    #[test]
    fn test_convert_results() {
        let none: Arc<dyn Type> = Arc::new(NoneType);
        let tensor: Arc<dyn Type> = Arc::new(NonValueTensorType::new(TensorInfo::default()));
        let vtensor: Arc<dyn Type> = Arc::new(ValueTensorType::new(TensorInfo::default()));
        let tuple: Arc<dyn Type> = Arc::new(TupleType::new(vec![tensor.clone(), vtensor]));
        let results = convert_results(&[none, tuple, tensor]);
        let results = results.iter().map(|t| t.to_string()).collect::<Vec<_>>();
        assert_eq!(results, vec!["!torch.tensor", "!torch.vtensor", "!torch.tensor"]);
    }

    #[test]
    fn test_original_ops() {
        let src = "func.func @f(%arg0: !torch.int) -> !torch.int {\n\
                   %0 = func.call @f(%arg0) : (!torch.int) -> !torch.int\n\
                   return %0 : !torch.int\n\
                   }";
        let module = Parser::<DefaultParserDispatch>::parse(src).unwrap();
        let originals = OriginalOps::collect(&module);
        assert_eq!(originals.ops.len(), 2);
        for op in walk(&module) {
            let op = op.rd();
            let expected = op.as_any().is::<CallOp>() || op.as_any().is::<ReturnOp>();
            assert_eq!(originals.contains(&*op), expected, "{}", op.name());
        }
        let new_return = ReturnOp::build(vec![]);
        assert!(!originals.contains(&new_return));
    }

    #[test]
    fn test_type_converter() {
        let converter = type_converter();
        let none: Arc<dyn Type> = Arc::new(NoneType);
        let tensor: Arc<dyn Type> = Arc::new(NonValueTensorType::new(TensorInfo::default()));
        let tuple: Arc<dyn Type> = Arc::new(TupleType::new(vec![tensor.clone(), tensor.clone()]));
        assert!(converter.convert_type(&none).unwrap().is_empty());
        assert_eq!(converter.convert_type(&tuple).unwrap().len(), 2);
        assert!(converter.is_legal(&tensor));
        assert!(!converter.is_legal(&tuple));
    }
}
