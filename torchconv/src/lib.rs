//! Calling convention adjustment for torch-style tensor IR.
//!
//! Programs that come out of a tracing frontend pass optional values
//! (`!torch.none`) and tuples (`!torch.tuple<..>`) across function boundaries,
//! and refine the types of tensor arguments with `torch.type_bound`
//! annotations. Both are convenient in source form but awkward for further
//! lowering. The `--torch-adjust-calling-conventions` pass rewrites function
//! signatures, call sites, and returns so that:
//!
//! - `!torch.none` arguments and results disappear,
//! - tuple results are flattened into their elements,
//! - annotated tensor arguments take the refined value-semantic type.
//!
//! Callers keep working because the pass rebuilds the original shape at every
//! call site (`torch.constant.none` and `torch.prim.TupleConstruct`).
//!
//! The tensor copies that this leaves behind are cleaned up by
//! `--torch-maximize-value-semantics`, which turns local uses of a
//! `torch.copy.to_tensor` (casts, `torch.overwrite.tensor.contents`, and
//! copies back) into plain value tensors.
//!
//! The crate contains a small MLIR-like IR with a textual parser and printer
//! ([ir], [parser]), the dialects that take part ([dialect]), a generic
//! type-converting rewrite engine ([convert::dialect_conversion]), and the
//! driver that runs passes selected on the command line ([transform]).
//!
//! ```
//! use torchconv::parser::DefaultParserDispatch;
//! use torchconv::parser::Parser;
//! use torchconv::shared::SharedExt;
//! use torchconv::transform;
//! use torchconv::DefaultTransformDispatch;
//! use torchconv::Passes;
//!
//! let src = r#"
//! func.func @f(%arg0: !torch.none) -> !torch.none {
//!   return %arg0 : !torch.none
//! }
//! "#;
//! let module = Parser::<DefaultParserDispatch>::parse(src).unwrap();
//! let passes = Passes::from_vec(vec!["--torch-adjust-calling-conventions"]);
//! transform::<DefaultTransformDispatch>(module.clone(), &passes).unwrap();
//! let actual = module.rd().to_string();
//! assert!(actual.contains("func.func @f() {"));
//! ```

mod canonicalize;
pub mod convert;
pub mod dialect;
pub mod ir;
pub mod parser;
pub mod shared;
#[cfg(feature = "test-utils")]
pub mod tester;
mod transform;

pub use canonicalize::Canonicalize;
pub use transform::default_arguments;
pub use transform::init_subscriber;
pub use transform::transform;
pub use transform::DefaultTransformDispatch;
pub use transform::Passes;
pub use transform::SinglePass;
pub use transform::TransformDispatch;
