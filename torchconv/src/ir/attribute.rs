use crate::ir::Type;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// Attributes are known-constant values of operations (a variable is not
/// allowed to be an attribute).
pub trait Attribute {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result;
    fn as_any(&self) -> &dyn std::any::Any;
}

impl Display for dyn Attribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

/// An attribute holding a type, for example the value of
/// `{torch.type_bound = !torch.vtensor<[2],f32>}`.
pub struct TypeAttr {
    typ: Arc<dyn Type>,
}

impl TypeAttr {
    pub fn new(typ: Arc<dyn Type>) -> Self {
        Self { typ }
    }
    pub fn typ(&self) -> Arc<dyn Type> {
        self.typ.clone()
    }
}

impl Attribute for TypeAttr {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.typ)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// An integer attribute such as `3 : i64`.
pub struct IntegerAttr {
    value: i64,
    typ: Arc<dyn Type>,
}

impl IntegerAttr {
    pub fn new(value: i64, typ: Arc<dyn Type>) -> Self {
        Self { value, typ }
    }
    pub fn value(&self) -> i64 {
        self.value
    }
}

impl Attribute for IntegerAttr {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} : {}", self.value, self.typ)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

pub struct StrAttr {
    value: String,
}

impl StrAttr {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Attribute for StrAttr {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.value)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// An attribute that is kept as raw text (for example `true` or `unit`).
pub struct AnyAttr {
    value: String,
}

impl AnyAttr {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

impl Attribute for AnyAttr {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// An ordered attribute dictionary.
///
/// The insertion order is kept so that printing is deterministic and matches
/// the order in the source text.
#[derive(Clone, Default)]
pub struct Attributes {
    entries: Vec<(String, Arc<dyn Attribute>)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, key: &str) -> Option<Arc<dyn Attribute>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }
    /// Insert an attribute, overwriting an earlier value for the same key.
    pub fn insert(&mut self, key: &str, value: Arc<dyn Attribute>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
    pub fn remove(&mut self, key: &str) -> Option<Arc<dyn Attribute>> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Display for Attributes {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let entries = self
            .entries
            .iter()
            .map(|(k, v)| format!("{k} = {v}"))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", entries.join(", "))
    }
}
