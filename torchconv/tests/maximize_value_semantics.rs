extern crate torchconv;

use indoc::indoc;
use std::panic::Location;
use torchconv::tester::Tester;

fn flags() -> Vec<&'static str> {
    vec!["--torch-maximize-value-semantics"]
}

#[test]
fn test_copy_round_trip() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.vtensor {
      %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
      %1 = torch.tensor_static_info_cast %0 : !torch.tensor<[2],f32> to !torch.tensor
      %2 = torch.copy.to_vtensor %1 : !torch.vtensor
      return %2 : !torch.vtensor
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.vtensor {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor
        return %1 : !torch.vtensor
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_overwrite() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
      %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
      %1 = torch.tensor_static_info_cast %0 : !torch.tensor<[2],f32> to !torch.tensor
      torch.overwrite.tensor.contents %arg1 overwrites %0 : !torch.vtensor<[2],f32>, !torch.tensor<[2],f32>
      %2 = torch.copy.to_vtensor %0 : !torch.vtensor<[2],f32>
      return %2 : !torch.vtensor<[2],f32>
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor
        return %arg1 : !torch.vtensor<[2],f32>
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_overwrite_through_cast() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
      %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
      %1 = torch.tensor_static_info_cast %0 : !torch.tensor<[2],f32> to !torch.tensor
      torch.overwrite.tensor.contents %arg1 overwrites %1 : !torch.vtensor<[2],f32>, !torch.tensor
      %2 = torch.copy.to_vtensor %0 : !torch.vtensor<[2],f32>
      return %2 : !torch.vtensor<[2],f32>
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor
        return %arg1 : !torch.vtensor<[2],f32>
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_stale_alias_after_overwrite() {
    Tester::init_tracing();
    // After the overwrite of %0, the cast %1 no longer aliases the contents.
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.vtensor<[2],f32>) -> !torch.vtensor {
      %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
      %1 = torch.tensor_static_info_cast %0 : !torch.tensor<[2],f32> to !torch.tensor
      torch.overwrite.tensor.contents %arg1 overwrites %0 : !torch.vtensor<[2],f32>, !torch.tensor<[2],f32>
      %2 = torch.copy.to_vtensor %1 : !torch.vtensor
      return %2 : !torch.vtensor
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    let (_, expected) = Tester::parse(src);
    Tester::check_lines_exact(&actual, &expected, Location::caller());
}

#[test]
fn test_unknown_user() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
      %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
      "test.mutate"(%0) : (!torch.tensor<[2],f32>) -> ()
      %1 = torch.copy.to_vtensor %0 : !torch.vtensor<[2],f32>
      return %1 : !torch.vtensor<[2],f32>
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    let (_, expected) = Tester::parse(src);
    Tester::check_lines_exact(&actual, &expected, Location::caller());
}

#[test]
fn test_return_keeps_type() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>) -> (!torch.tensor, !torch.vtensor) {
      %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
      %1 = torch.tensor_static_info_cast %0 : !torch.tensor<[2],f32> to !torch.tensor
      %2 = torch.copy.to_vtensor %1 : !torch.vtensor
      return %1, %2 : !torch.tensor, !torch.vtensor
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.vtensor<[2],f32>) -> (!torch.tensor, !torch.vtensor) {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor
        %2 = torch.copy.to_tensor %1 : !torch.tensor
        return %2, %1 : !torch.tensor, !torch.vtensor
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

const TUPLE_RETURN: &str = indoc! {r#"
func.func @tuple_return(%arg0: !torch.tensor {torch.type_bound = !torch.vtensor<[?],f32>}, %arg1: !torch.tensor {torch.type_bound = !torch.vtensor<[?],f32>}) -> !torch.tuple<tensor, tensor> {
  %0 = torch.prim.TupleConstruct %arg0, %arg1 : !torch.tensor, !torch.tensor -> !torch.tuple<tensor, tensor>
  return %0 : !torch.tuple<tensor, tensor>
}
func.func @call_tuple_return(%arg0: !torch.tensor {torch.type_bound = !torch.vtensor<[?],f32>}, %arg1: !torch.tensor {torch.type_bound = !torch.vtensor<[?],f32>}) -> !torch.tuple<tensor, tensor> {
  %0 = call @tuple_return(%arg0, %arg1) : (!torch.tensor, !torch.tensor) -> !torch.tuple<tensor, tensor>
  return %0 : !torch.tuple<tensor, tensor>
}
"#};

#[test]
fn test_after_adjust_calling_conventions() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    module {
      func.func @tuple_return(%arg0: !torch.vtensor<[?],f32>, %arg1: !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor) {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[?],f32> to !torch.vtensor
        %2 = torch.copy.to_tensor %1 : !torch.tensor
        %3 = torch.tensor_static_info_cast %arg1 : !torch.vtensor<[?],f32> to !torch.vtensor
        %4 = torch.copy.to_tensor %3 : !torch.tensor
        return %2, %4 : !torch.tensor, !torch.tensor
      }
      func.func @call_tuple_return(%arg0: !torch.vtensor<[?],f32>, %arg1: !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor) {
        %9, %10 = func.call @tuple_return(%arg0, %arg1) : (!torch.vtensor<[?],f32>, !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor)
        return %9, %10 : !torch.tensor, !torch.tensor
      }
    }
    "#};
    let flags = vec![
        "--torch-adjust-calling-conventions",
        "--torch-maximize-value-semantics",
        "--canonicalize",
    ];
    let (module, actual) = Tester::transform(flags, TUPLE_RETURN);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}
