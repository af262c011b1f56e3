//! Type-converting rewrites in the style of MLIR's dialect conversion.
//!
//! A conversion is described by a [TypeConverter] (how types change), a
//! [ConversionTarget] (which ops are legal afterwards), and a set of
//! [ConversionPattern]s (how illegal ops are rewritten). Application happens in
//! two phases. [prepare_partial_conversion] only inspects the IR and fails if
//! some illegal op cannot be rewritten. [ConversionPlan::apply] then performs
//! the rewrites.

use crate::dialect::builtin::UnrealizedConversionCastOp;
use crate::ir::same_type;
use crate::ir::walk;
use crate::ir::BlockArgument;
use crate::ir::Op;
use crate::ir::OpBuilder;
use crate::ir::Type;
use crate::ir::Uses;
use crate::ir::Value;
use crate::ir::Values;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tracing::warn;

type ConversionRule = Box<dyn Fn(&Arc<dyn Type>) -> Option<Vec<Arc<dyn Type>>>>;

type Materialization =
    Box<dyn Fn(&mut OpBuilder, &Arc<dyn Type>, &[Shared<Value>]) -> Result<Option<Shared<Value>>>>;

/// Converts types into zero, one, or multiple new types.
#[derive(Default)]
pub struct TypeConverter {
    conversions: Vec<ConversionRule>,
    source_materializations: Vec<Materialization>,
    target_materializations: Vec<Materialization>,
}

impl TypeConverter {
    pub fn new() -> Self {
        Self::default()
    }
    /// Register a conversion rule.
    ///
    /// Rules are tried in reverse order of registration; the first rule that
    /// returns `Some` decides the converted types.
    pub fn add_conversion<F>(&mut self, conversion: F)
    where
        F: Fn(&Arc<dyn Type>) -> Option<Vec<Arc<dyn Type>>> + 'static,
    {
        self.conversions.push(Box::new(conversion));
    }
    /// Register a hook that rebuilds a value of an original type from the
    /// converted values.
    pub fn add_source_materialization<F>(&mut self, materialization: F)
    where
        F: Fn(&mut OpBuilder, &Arc<dyn Type>, &[Shared<Value>]) -> Result<Option<Shared<Value>>>
            + 'static,
    {
        self.source_materializations.push(Box::new(materialization));
    }
    /// Register a hook that turns a value into a value of a converted type.
    pub fn add_target_materialization<F>(&mut self, materialization: F)
    where
        F: Fn(&mut OpBuilder, &Arc<dyn Type>, &[Shared<Value>]) -> Result<Option<Shared<Value>>>
            + 'static,
    {
        self.target_materializations.push(Box::new(materialization));
    }
    pub fn convert_type(&self, typ: &Arc<dyn Type>) -> Result<Vec<Arc<dyn Type>>> {
        for conversion in self.conversions.iter().rev() {
            if let Some(types) = conversion(typ) {
                return Ok(types);
            }
        }
        Err(anyhow::anyhow!("failed to convert type {typ}"))
    }
    pub fn convert_types(&self, types: &[Arc<dyn Type>]) -> Result<Vec<Arc<dyn Type>>> {
        let mut result = vec![];
        for typ in types {
            result.extend(self.convert_type(typ)?);
        }
        Ok(result)
    }
    /// Whether `typ` converts to itself.
    pub fn is_legal(&self, typ: &Arc<dyn Type>) -> bool {
        match self.convert_type(typ) {
            Ok(types) => types.len() == 1 && same_type(&types[0], typ),
            Err(_) => false,
        }
    }
    fn materialize(
        materializations: &[Materialization],
        builder: &mut OpBuilder,
        typ: &Arc<dyn Type>,
        inputs: &[Shared<Value>],
    ) -> Result<Option<Shared<Value>>> {
        for materialization in materializations.iter().rev() {
            if let Some(value) = materialization(builder, typ, inputs)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
    pub fn materialize_source_conversion(
        &self,
        builder: &mut OpBuilder,
        typ: &Arc<dyn Type>,
        inputs: &[Shared<Value>],
    ) -> Result<Option<Shared<Value>>> {
        Self::materialize(&self.source_materializations, builder, typ, inputs)
    }
    pub fn materialize_target_conversion(
        &self,
        builder: &mut OpBuilder,
        typ: &Arc<dyn Type>,
        inputs: &[Shared<Value>],
    ) -> Result<Option<Shared<Value>>> {
        Self::materialize(&self.target_materializations, builder, typ, inputs)
    }
}

/// The new argument types of a function, per original argument.
///
/// An argument without registered inputs keeps its type. An argument with
/// zero inputs is dropped.
pub struct SignatureConversion {
    inputs: Vec<Option<Vec<Arc<dyn Type>>>>,
}

impl SignatureConversion {
    pub fn new(num_arguments: usize) -> Self {
        SignatureConversion {
            inputs: (0..num_arguments).map(|_| None).collect(),
        }
    }
    pub fn add_inputs(&mut self, index: usize, types: Vec<Arc<dyn Type>>) {
        if let Some(inputs) = self.inputs.get_mut(index) {
            *inputs = Some(types);
        }
    }
    pub fn inputs(&self, index: usize) -> Option<&[Arc<dyn Type>]> {
        self.inputs.get(index)?.as_deref()
    }
}

pub enum Legality {
    Legal,
    Illegal,
    Dynamic(Box<dyn Fn(&dyn Op) -> bool>),
}

/// Decides which ops have to be rewritten.
///
/// Ops without a registered legality are legal.
#[derive(Default)]
pub struct ConversionTarget {
    legality: HashMap<String, Legality>,
}

impl ConversionTarget {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add_legal_op<O: Op>(&mut self) {
        self.legality
            .insert(O::operation_name().name(), Legality::Legal);
    }
    pub fn add_illegal_op<O: Op>(&mut self) {
        self.legality
            .insert(O::operation_name().name(), Legality::Illegal);
    }
    pub fn add_dynamically_legal_op<O: Op, F>(&mut self, is_legal: F)
    where
        F: Fn(&dyn Op) -> bool + 'static,
    {
        let legality = Legality::Dynamic(Box::new(is_legal));
        self.legality.insert(O::operation_name().name(), legality);
    }
    pub fn is_legal(&self, op: &dyn Op) -> bool {
        match self.legality.get(&op.name().name()) {
            Some(Legality::Legal) | None => true,
            Some(Legality::Illegal) => false,
            Some(Legality::Dynamic(is_legal)) => is_legal(op),
        }
    }
}

/// Outcome of [ConversionPattern::is_match].
#[derive(Debug, PartialEq, Eq)]
pub enum PatternMatch {
    Matched,
    /// The pattern is not meant for this op.
    NotApplicable,
    /// The pattern is meant for this op but cannot rewrite it.
    Failure(String),
}

pub trait ConversionPattern {
    /// The name of the pattern; is used for logging.
    fn name(&self) -> &'static str;
    /// Decide whether the pattern can rewrite `op`.
    ///
    /// This method is not allowed to mutate the IR.
    fn is_match(&self, op: &dyn Op) -> Result<PatternMatch>;
    /// Rewrite `op`.
    ///
    /// Only called when `is_match` returned [PatternMatch::Matched].
    fn rewrite(&self, op: Shared<dyn Op>, rewriter: &mut ConversionRewriter) -> Result<()>;
}

/// The values that replace one original operand.
///
/// `Placeholder` values are results of an `unrealized_conversion_cast` that
/// the engine inserted because no materialization was available. Such casts
/// have to be consumed by the rewrite, otherwise the conversion fails.
pub enum ValueGroup {
    Direct(Vec<Shared<Value>>),
    Placeholder {
        cast: Shared<dyn Op>,
        values: Vec<Shared<Value>>,
    },
}

impl ValueGroup {
    pub fn values(&self) -> &[Shared<Value>] {
        match self {
            ValueGroup::Direct(values) => values,
            ValueGroup::Placeholder { values, .. } => values,
        }
    }
}

/// Mutates the IR on behalf of the patterns.
pub struct ConversionRewriter<'a> {
    converter: &'a TypeConverter,
    mapping: Vec<(Shared<Value>, Vec<Shared<Value>>)>,
    placeholders: Vec<Shared<dyn Op>>,
}

impl<'a> ConversionRewriter<'a> {
    pub fn new(converter: &'a TypeConverter) -> Self {
        ConversionRewriter {
            converter,
            mapping: vec![],
            placeholders: vec![],
        }
    }
    pub fn type_converter(&self) -> &TypeConverter {
        self.converter
    }
    /// Record that `from` is represented by `to` from now on.
    pub fn map_values(&mut self, from: Shared<Value>, to: Vec<Shared<Value>>) {
        self.mapping.push((from, to));
    }
    pub fn lookup(&self, value: &Shared<Value>) -> Option<Vec<Shared<Value>>> {
        self.mapping
            .iter()
            .rev()
            .find(|(from, _)| Arc::ptr_eq(from, value))
            .map(|(_, to)| to.clone())
    }
    /// Replace the arguments of `func` according to `conversion`.
    ///
    /// Arguments that still have uses are rebuilt at the start of the body
    /// via the source materializations. New arguments keep the name of the
    /// argument they replace.
    pub fn apply_signature_conversion(
        &mut self,
        func: &Shared<dyn Op>,
        conversion: &SignatureConversion,
    ) -> Result<()> {
        let operation = func.rd().operation().clone();
        let arguments = operation.rd().arguments().to_vec();
        let block = func.rd().region().and_then(|region| region.rd().block());
        let mut builder = block.clone().map(OpBuilder::at_block_start);
        let mut new_arguments = vec![];
        for (index, old) in arguments.iter().enumerate() {
            let (name, old_type, attributes) = {
                let value = old.rd();
                match &*value {
                    Value::BlockArgument(argument) => {
                        (value.name(), value.typ(), argument.attributes().clone())
                    }
                    _ => return Err(anyhow::anyhow!("expected a block argument")),
                }
            };
            let types = match conversion.inputs(index) {
                Some(types) => types.to_vec(),
                None => vec![old_type.clone()],
            };
            let group = types
                .iter()
                .enumerate()
                .map(|(i, typ)| {
                    let name = match &name {
                        Some(name) if types.len() > 1 => Some(format!("{name}_{i}")),
                        name => name.clone(),
                    };
                    let mut argument = BlockArgument::new(name, typ.clone());
                    argument.set_attributes(attributes.clone());
                    argument.set_parent(block.clone());
                    Shared::new(RwLock::new(Value::BlockArgument(argument)))
                })
                .collect::<Vec<_>>();
            new_arguments.extend(group.iter().cloned());
            if let Some(builder) = builder.as_mut() {
                if old.has_uses() {
                    let unchanged = group.len() == 1 && same_type(&types[0], &old_type);
                    let replacement = if unchanged {
                        Some(group[0].clone())
                    } else {
                        self.converter
                            .materialize_source_conversion(builder, &old_type, &group)?
                    };
                    match replacement {
                        Some(replacement) => old.replace_all_uses_with(&replacement),
                        None => {
                            return Err(anyhow::anyhow!(
                                "failed to materialize conversion for block argument #{index} \
                                 that remained live after conversion, type was {old_type}"
                            ))
                        }
                    }
                }
            }
            self.map_values(old.clone(), group);
        }
        operation.wr().set_arguments(Values::from_vec(new_arguments));
        Ok(())
    }
    /// Return the converted values for each operand of `op`.
    ///
    /// Materializations and placeholder casts are inserted before `op`.
    pub fn remap_operands(&mut self, op: &Shared<dyn Op>) -> Result<Vec<ValueGroup>> {
        let operands = op.rd().operation().rd().operand_values();
        let mut builder = OpBuilder::before(op)?;
        let mut groups = vec![];
        for value in operands {
            if let Some(values) = self.lookup(&value) {
                groups.push(ValueGroup::Direct(values));
                continue;
            }
            let typ = value.rd().typ();
            let types = self.converter.convert_type(&typ)?;
            if types.is_empty() {
                groups.push(ValueGroup::Direct(vec![]));
                continue;
            }
            if types.len() == 1 && same_type(&types[0], &typ) {
                groups.push(ValueGroup::Direct(vec![value]));
                continue;
            }
            if types.len() == 1 {
                let inputs = [value.clone()];
                let materialized =
                    self.converter
                        .materialize_target_conversion(&mut builder, &types[0], &inputs)?;
                if let Some(materialized) = materialized {
                    groups.push(ValueGroup::Direct(vec![materialized]));
                    continue;
                }
            }
            let cast = UnrealizedConversionCastOp::build(vec![value], types);
            let cast = builder.insert(cast);
            let values = cast.rd().operation().rd().results().to_vec();
            self.placeholders.push(cast.clone());
            groups.push(ValueGroup::Placeholder { cast, values });
        }
        Ok(groups)
    }
    /// Replace the results of `op` by `values` and remove `op`.
    pub fn replace_op(&mut self, op: &Shared<dyn Op>, values: Vec<Shared<Value>>) -> Result<()> {
        let results = op.rd().operation().rd().results().to_vec();
        if results.len() != values.len() {
            return Err(anyhow::anyhow!(
                "{} has {} results, but got {} replacement values",
                op.rd().name(),
                results.len(),
                values.len()
            ));
        }
        for (result, value) in results.iter().zip(values.iter()) {
            result.replace_all_uses_with(value);
        }
        op.rd().remove()
    }
    /// Remove placeholder casts that are no longer used.
    fn finalize(&mut self) -> Result<()> {
        for cast in self.placeholders.drain(..) {
            let results = cast.rd().operation().rd().results().to_vec();
            if results.iter().any(|result| result.has_uses()) {
                let operation = cast.rd().operation().clone();
                let operation = operation.rd();
                let types = |types: Vec<Arc<dyn Type>>| {
                    types
                        .iter()
                        .map(|typ| typ.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                return Err(anyhow::anyhow!(
                    "failed to legalize unresolved materialization from ({}) to ({}) that \
                     remained live after conversion",
                    types(operation.operand_types()),
                    types(operation.result_types())
                ));
            }
            cast.rd().remove()?;
        }
        Ok(())
    }
}

/// The rewrites that make an op tree legal.
pub struct ConversionPlan<'a> {
    root: Shared<dyn Op>,
    target: &'a ConversionTarget,
    rewrites: Vec<(Shared<dyn Op>, &'a dyn ConversionPattern)>,
}

impl<'a> ConversionPlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }
    pub fn len(&self) -> usize {
        self.rewrites.len()
    }
    /// Run the rewrites and verify that the result is legal.
    pub fn apply(self, converter: &TypeConverter) -> Result<()> {
        let mut rewriter = ConversionRewriter::new(converter);
        for (op, pattern) in self.rewrites.iter() {
            debug!("Rewriting {} with {}", op.rd().name(), pattern.name());
            pattern.rewrite(op.clone(), &mut rewriter)?;
        }
        rewriter.finalize()?;
        for op in walk(&self.root) {
            let op = op.rd();
            if !self.target.is_legal(&*op) {
                return Err(anyhow::anyhow!(
                    "failed to legalize operation '{}' that was explicitly marked illegal",
                    op.name()
                ));
            }
        }
        Ok(())
    }
}

/// Find a matching pattern for every illegal op in `root` (including `root`).
///
/// The IR is not modified.
pub fn prepare_partial_conversion<'a>(
    root: &Shared<dyn Op>,
    target: &'a ConversionTarget,
    patterns: &[&'a dyn ConversionPattern],
) -> Result<ConversionPlan<'a>> {
    let mut rewrites = vec![];
    for op in walk(root) {
        let guard = op.rd();
        if target.is_legal(&*guard) {
            continue;
        }
        let mut failures = vec![];
        let mut matched = None;
        for pattern in patterns {
            debug!("Matching {} with {}", guard.name(), pattern.name());
            match pattern.is_match(&*guard)? {
                PatternMatch::Matched => {
                    matched = Some(*pattern);
                    break;
                }
                PatternMatch::NotApplicable => (),
                PatternMatch::Failure(msg) => {
                    debug!("--> {} failed: {msg}", pattern.name());
                    failures.push(msg);
                }
            }
        }
        match matched {
            Some(pattern) => rewrites.push((op.clone(), pattern)),
            None => {
                let name = guard.name();
                warn!("Failed to legalize {name}");
                let mut msg = format!("failed to legalize operation '{name}'");
                for failure in failures {
                    msg.push_str(&format!(": {failure}"));
                }
                return Err(anyhow::anyhow!(msg));
            }
        }
    }
    Ok(ConversionPlan {
        root: root.clone(),
        target,
        rewrites,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IntegerType;

    #[test]
    fn test_type_converter_order() {
        let mut converter = TypeConverter::new();
        converter.add_conversion(|typ| Some(vec![typ.clone()]));
        converter.add_conversion(|typ| {
            if typ.to_string() == "i1" {
                Some(vec![])
            } else {
                None
            }
        });
        let i1: Arc<dyn Type> = Arc::new(IntegerType::new(1));
        let i64: Arc<dyn Type> = Arc::new(IntegerType::new(64));
        assert!(converter.convert_type(&i1).unwrap().is_empty());
        assert_eq!(converter.convert_type(&i64).unwrap().len(), 1);
        assert!(converter.is_legal(&i64));
        assert!(!converter.is_legal(&i1));
        let types = converter.convert_types(&[i1, i64.clone(), i64]).unwrap();
        assert_eq!(types.len(), 2);
    }

    #[test]
    fn test_signature_conversion() {
        let mut conversion = SignatureConversion::new(2);
        conversion.add_inputs(1, vec![]);
        assert!(conversion.inputs(0).is_none());
        assert_eq!(conversion.inputs(1).map(|types| types.len()), Some(0));
        assert!(conversion.inputs(2).is_none());
    }

    #[test]
    fn test_missing_conversion() {
        let converter = TypeConverter::new();
        let i1: Arc<dyn Type> = Arc::new(IntegerType::new(1));
        let err = converter.convert_type(&i1).err().unwrap();
        assert_eq!(err.to_string(), "failed to convert type i1");
    }
}
