//! Subset of the Torch dialect.
//!
//! Only the types and ops that take part in calling conventions are defined
//! here: tensors with and without value semantics, `none`, tuples, and the ops
//! that construct, index, cast, copy, and overwrite them.

mod op;
mod typ;
mod utils;

pub use op::tuple_contained_types;
pub use op::ConstantIntOp;
pub use op::ConstantNoneOp;
pub use op::CopyToNonValueTensorOp;
pub use op::CopyToValueTensorOp;
pub use op::OverwriteTensorContentsOp;
pub use op::PrimTupleConstructOp;
pub use op::PrimTupleIndexOp;
pub use op::TensorStaticInfoCastOp;
pub use typ::as_tensor;
pub use typ::as_tuple;
pub use typ::is_non_value_tensor;
pub use typ::is_none;
pub use typ::is_value_tensor;
pub use typ::parse_torch_type;
pub use typ::BaseTensorType;
pub use typ::BoolType;
pub use typ::FloatType;
pub use typ::IntType;
pub use typ::NoneType;
pub use typ::NonValueTensorType;
pub use typ::TensorInfo;
pub use typ::TupleType;
pub use typ::ValueTensorType;
pub use utils::copy_tensor_to_type;
