use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

pub trait Type {
    /// Display the type.
    ///
    /// This has to be implemented by each type so that calls to `Display::fmt`
    /// on a `dyn Type` can be delegated to the type's `display` method.
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result;
    fn as_any(&self) -> &dyn std::any::Any;
}

impl Display for dyn Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f)
    }
}

/// Whether two types are the same.
///
/// Types are immutable and fully described by their textual form, so
/// comparing the printed form is enough.
pub fn same_type(a: &Arc<dyn Type>, b: &Arc<dyn Type>) -> bool {
    Arc::ptr_eq(a, b) || a.to_string() == b.to_string()
}

pub fn same_types(a: &[Arc<dyn Type>], b: &[Arc<dyn Type>]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| same_type(a, b))
}

/// A type that is not known to any dialect in this crate.
///
/// The type is kept as text so that it can be printed back unchanged.
pub struct AnyType {
    typ: String,
}

impl AnyType {
    pub fn new(typ: &str) -> Self {
        Self {
            typ: typ.to_string(),
        }
    }
}

impl Type for AnyType {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.typ)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Represent an integer type such as i1 or i64.
pub struct IntegerType {
    num_bits: u64,
}

impl IntegerType {
    pub fn new(num_bits: u64) -> Self {
        Self { num_bits }
    }
    pub fn from_name(s: &str) -> Option<Self> {
        let num_bits = s.strip_prefix('i')?.parse::<u64>().ok()?;
        Some(Self { num_bits })
    }
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }
}

impl Type for IntegerType {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.num_bits)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Write a list of types separated by commas.
pub fn display_types(f: &mut Formatter<'_>, types: &[Arc<dyn Type>]) -> std::fmt::Result {
    let texts = types.iter().map(|t| t.to_string()).collect::<Vec<_>>();
    write!(f, "{}", texts.join(", "))
}

/// Write result types the way MLIR does: a single type is written as is,
/// anything else is wrapped in parentheses.
pub fn display_result_types(f: &mut Formatter<'_>, types: &[Arc<dyn Type>]) -> std::fmt::Result {
    if types.len() == 1 {
        write!(f, "{}", types[0])
    } else {
        write!(f, "(")?;
        display_types(f, types)?;
        write!(f, ")")
    }
}

/// A function type such as `(!torch.tensor, !torch.int) -> !torch.none`.
pub struct FunctionType {
    arguments: Vec<Arc<dyn Type>>,
    results: Vec<Arc<dyn Type>>,
}

impl FunctionType {
    pub fn new(arguments: Vec<Arc<dyn Type>>, results: Vec<Arc<dyn Type>>) -> Self {
        Self { arguments, results }
    }
    pub fn arguments(&self) -> &[Arc<dyn Type>] {
        &self.arguments
    }
    pub fn results(&self) -> &[Arc<dyn Type>] {
        &self.results
    }
}

impl Type for FunctionType {
    fn display(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        display_types(f, &self.arguments)?;
        write!(f, ") -> ")?;
        display_result_types(f, &self.results)
    }
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_type_display() {
        let i64: Arc<dyn Type> = Arc::new(IntegerType::new(64));
        let i1: Arc<dyn Type> = Arc::new(IntegerType::new(1));
        let typ = FunctionType::new(vec![i64.clone(), i1.clone()], vec![i64.clone()]);
        let typ: Arc<dyn Type> = Arc::new(typ);
        assert_eq!(typ.to_string(), "(i64, i1) -> i64");

        let typ = FunctionType::new(vec![], vec![]);
        let typ: Arc<dyn Type> = Arc::new(typ);
        assert_eq!(typ.to_string(), "() -> ()");

        let typ = FunctionType::new(vec![i1.clone()], vec![i64.clone(), i1.clone()]);
        let typ: Arc<dyn Type> = Arc::new(typ);
        assert_eq!(typ.to_string(), "(i1) -> (i64, i1)");
    }

    #[test]
    fn test_same_type() {
        let a: Arc<dyn Type> = Arc::new(IntegerType::new(64));
        let b: Arc<dyn Type> = Arc::new(IntegerType::from_name("i64").unwrap());
        let c: Arc<dyn Type> = Arc::new(AnyType::new("!foo.bar"));
        assert!(same_type(&a, &b));
        assert!(!same_type(&a, &c));
        assert!(same_types(&[a.clone(), c.clone()], &[b, c]));
        assert!(!same_types(&[a.clone()], &[]));
    }
}
