//! Intermediate representation (IR) for the passes.
//!
//! These data structures are used as the basis for all rewrites.
//! For example, this module defines core types such as [Operation] and [Op].

mod attribute;
mod block;
mod builder;
mod module;
mod op;
mod op_operand;
mod operation;
mod region;
mod typ;
mod value;

pub use attribute::AnyAttr;
pub use attribute::Attribute;
pub use attribute::Attributes;
pub use attribute::IntegerAttr;
pub use attribute::StrAttr;
pub use attribute::TypeAttr;
pub use block::Block;
pub use builder::OpBuilder;
pub use module::ModuleOp;
pub use op::into_shared;
pub use op::walk;
pub use op::Op;
pub use op_operand::OpOperand;
pub use op_operand::OpOperands;
pub use operation::Operation;
pub use operation::OperationName;
pub use region::Region;
pub use typ::display_result_types;
pub use typ::display_types;
pub use typ::same_type;
pub use typ::same_types;
pub use typ::AnyType;
pub use typ::FunctionType;
pub use typ::IntegerType;
pub use typ::Type;
pub use value::AnonymousResult;
pub use value::BlockArgument;
pub use value::OpResult;
pub use value::Uses;
pub use value::Value;
pub use value::Values;

pub fn spaces(indent: i32) -> String {
    "  ".repeat(indent.max(0) as usize)
}
