use crate::dialect::torch::as_tensor;
use crate::dialect::torch::CopyToNonValueTensorOp;
use crate::dialect::torch::CopyToValueTensorOp;
use crate::dialect::torch::TensorStaticInfoCastOp;
use crate::ir::OpBuilder;
use crate::ir::Type;
use crate::ir::Value;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use std::sync::Arc;

/// Insert the ops that turn `tensor` into a tensor of type `new_type`.
///
/// The static information (sizes and dtype) is adjusted first, then the value
/// semantics. Returns `tensor` itself if the types already agree.
pub fn copy_tensor_to_type(
    builder: &mut OpBuilder,
    new_type: &Arc<dyn Type>,
    tensor: Shared<Value>,
) -> Result<Shared<Value>> {
    let original_type = tensor.rd().typ();
    let (original, new) = match (as_tensor(&original_type), as_tensor(new_type)) {
        (Some(original), Some(new)) => (original, new),
        _ => {
            return Err(anyhow::anyhow!(
                "cannot copy a value of type {original_type} to type {new_type}"
            ))
        }
    };
    let mut tensor = tensor;
    if !original.has_same_sizes_and_dtype(new) {
        let cast_type = original.with_info(new.info().clone());
        let cast = TensorStaticInfoCastOp::build(cast_type, tensor);
        tensor = builder.insert_value(cast)?;
    }
    match (original.has_value_semantics(), new.has_value_semantics()) {
        (false, true) => builder.insert_value(CopyToValueTensorOp::build(tensor)?),
        (true, false) => builder.insert_value(CopyToNonValueTensorOp::build(tensor)?),
        _ => Ok(tensor),
    }
}
