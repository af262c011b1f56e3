extern crate torchconv;

use indoc::indoc;
use std::panic::Location;
use torchconv::convert::adjust_calling_conventions;
use torchconv::convert::collect_type_bounds;
use torchconv::shared::SharedExt;
use torchconv::tester::Tester;

fn flags() -> Vec<&'static str> {
    vec!["--torch-adjust-calling-conventions"]
}

#[test]
fn test_type_bound() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @basic(%arg0: !torch.tensor {torch.type_bound = !torch.vtensor<[2,3,?],f32>}) -> !torch.tensor {
      return %arg0 : !torch.tensor
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @basic(%arg0: !torch.vtensor<[2,3,?],f32>) -> !torch.tensor {
        %0 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2,3,?],f32> to !torch.vtensor
        %1 = torch.copy.to_tensor %0 : !torch.tensor
        return %1 : !torch.tensor
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_none_return() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @none_return() -> !torch.none {
      %1 = torch.constant.none
      return %1 : !torch.none
    }
    func.func @none_call_return() {
      %0 = call @none_return() : () -> !torch.none
      "test.use"(%0) : (!torch.none) -> ()
      return
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @none_return() {
        %1 = torch.constant.none
        return
      }
      func.func @none_call_return() {
        func.call @none_return() : () -> ()
        %1 = torch.constant.none
        "test.use"(%1) : (!torch.none) -> ()
        return
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_none_arguments() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @none_arg(%arg0: !torch.none, %arg1: !torch.int) -> !torch.int {
      return %arg1 : !torch.int
    }
    func.func @used_none_arg(%arg0: !torch.none) {
      "test.use"(%arg0) : (!torch.none) -> ()
      return
    }
    func.func @caller(%arg0: !torch.int) -> !torch.int {
      %none = torch.constant.none
      %0 = call @none_arg(%none, %arg0) : (!torch.none, !torch.int) -> !torch.int
      return %0 : !torch.int
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @none_arg(%arg1: !torch.int) -> !torch.int {
        return %arg1 : !torch.int
      }
      func.func @used_none_arg() {
        %0 = torch.constant.none
        "test.use"(%0) : (!torch.none) -> ()
        return
      }
      func.func @caller(%arg0: !torch.int) -> !torch.int {
        %none = torch.constant.none
        %1 = func.call @none_arg(%arg0) : (!torch.int) -> !torch.int
        return %1 : !torch.int
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
fn test_tuple_return() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    module {
      func.func @tuple_return(%arg0: !torch.vtensor<[?],f32>, %arg1: !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor) {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[?],f32> to !torch.vtensor
        %2 = torch.copy.to_tensor %1 : !torch.tensor
        %3 = torch.tensor_static_info_cast %arg1 : !torch.vtensor<[?],f32> to !torch.vtensor
        %4 = torch.copy.to_tensor %3 : !torch.tensor
        %0 = torch.prim.TupleConstruct %2, %4 : !torch.tensor, !torch.tensor -> !torch.tuple<tensor, tensor>
        %7 = torch.constant.int 0
        %8 = torch.prim.TupleIndex %0, %7 : !torch.tuple<tensor, tensor>, !torch.int -> !torch.tensor
        %9 = torch.constant.int 1
        %10 = torch.prim.TupleIndex %0, %9 : !torch.tuple<tensor, tensor>, !torch.int -> !torch.tensor
        return %8, %10 : !torch.tensor, !torch.tensor
      }
      func.func @call_tuple_return(%arg0: !torch.vtensor<[?],f32>, %arg1: !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor) {
        %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[?],f32> to !torch.vtensor
        %2 = torch.copy.to_tensor %1 : !torch.tensor
        %3 = torch.tensor_static_info_cast %arg1 : !torch.vtensor<[?],f32> to !torch.vtensor
        %4 = torch.copy.to_tensor %3 : !torch.tensor
        %5 = torch.tensor_static_info_cast %2 : !torch.tensor to !torch.tensor<[?],f32>
        %6 = torch.copy.to_vtensor %5 : !torch.vtensor<[?],f32>
        %7 = torch.tensor_static_info_cast %4 : !torch.tensor to !torch.tensor<[?],f32>
        %8 = torch.copy.to_vtensor %7 : !torch.vtensor<[?],f32>
        %9, %10 = func.call @tuple_return(%6, %8) : (!torch.vtensor<[?],f32>, !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor)
        %11 = torch.prim.TupleConstruct %9, %10 : !torch.tensor, !torch.tensor -> !torch.tuple<tensor, tensor>
        return %9, %10 : !torch.tensor, !torch.tensor
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), TUPLE_RETURN);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_tuple_return_canonicalize() {
    Tester::init_tracing();
    let expected = indoc! {r#"
    func.func @tuple_return(%arg0: !torch.vtensor<[?],f32>, %arg1: !torch.vtensor<[?],f32>) -> (!torch.tensor, !torch.tensor) {
      %1 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[?],f32> to !torch.vtensor
      %2 = torch.copy.to_tensor %1 : !torch.tensor
      %3 = torch.tensor_static_info_cast %arg1 : !torch.vtensor<[?],f32> to !torch.vtensor
      %4 = torch.copy.to_tensor %3 : !torch.tensor
      return %2, %4 : !torch.tensor, !torch.tensor
    }
    "#};
    let flags = vec!["--torch-adjust-calling-conventions", "--canonicalize"];
    let (module, actual) = Tester::transform(flags, TUPLE_RETURN);
    Tester::verify(module);
    Tester::check_lines_contain(&actual, expected, Location::caller());
    assert!(!actual.contains("torch.prim.TupleConstruct"));
    assert!(!actual.contains("torch.prim.TupleIndex"));
}

#[test]
fn test_pass_through() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.tuple<int, int>, %arg2: !torch.int) -> !torch.vtensor<[2],f32> {
      "test.use"(%arg1, %arg2) : (!torch.tuple<int, int>, !torch.int) -> ()
      return %arg0 : !torch.vtensor<[2],f32>
    }
    func.func @g(%arg0: !torch.tensor) -> !torch.tensor {
      return %arg0 : !torch.tensor
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    let (_, expected) = Tester::parse(src);
    Tester::check_lines_exact(&actual, &expected, Location::caller());
}

#[test]
fn test_idempotent() {
    Tester::init_tracing();
    let (_, once) = Tester::transform(flags(), TUPLE_RETURN);
    let twice = vec![
        "--torch-adjust-calling-conventions",
        "--torch-adjust-calling-conventions",
    ];
    let (module, actual) = Tester::transform(twice, TUPLE_RETURN);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, &once, Location::caller());
}

#[test]
fn test_collect_type_bounds() {
    Tester::init_tracing();
    let (module, _) = Tester::parse(TUPLE_RETURN);
    let type_bounds = collect_type_bounds(&module);
    assert_eq!(type_bounds.len(), 4);
    let bound = type_bounds.get(&("@call_tuple_return".to_string(), 1));
    assert_eq!(
        bound.map(|typ| typ.to_string()),
        Some("!torch.vtensor<[?],f32>".to_string())
    );
    assert!(type_bounds.get(&("@tuple_return".to_string(), 2)).is_none());
}

#[test]
fn test_non_value_semantic_bound() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.tensor {torch.type_bound = !torch.tensor<[2],f32>}) -> !torch.tensor {
      return %arg0 : !torch.tensor
    }
    "#};
    let err = Tester::try_transform(flags(), src).err().unwrap();
    let msg = format!("{err:#}");
    assert!(msg.contains("while adjusting calling conventions of @f"), "{msg}");
    assert!(
        msg.contains("unimplemented: preserving aliasing for non-value-semantic type bounds"),
        "{msg}"
    );
}

#[test]
fn test_call_indirect() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @g(%arg0: !torch.int) -> !torch.int {
      return %arg0 : !torch.int
    }
    func.func @f(%arg0: !torch.int) -> !torch.int {
      %0 = func.constant @g : (!torch.int) -> !torch.int
      %1 = func.call_indirect %0(%arg0) : (!torch.int) -> !torch.int
      return %1 : !torch.int
    }
    "#};
    let err = Tester::try_transform(flags(), src).err().unwrap();
    let msg = format!("{err:#}");
    assert!(msg.contains("failed to legalize operation 'func.call_indirect'"), "{msg}");
}

#[test]
fn test_failure_leaves_module_unchanged() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @good(%arg0: !torch.none) {
      return
    }
    func.func @bad(%arg0: !torch.tensor {torch.type_bound = !torch.int}) {
      return
    }
    "#};
    let (module, before) = Tester::parse(src);
    let result = adjust_calling_conventions(&module);
    assert!(result.is_err());
    let after = module.rd().to_string();
    Tester::check_lines_exact(&after, &before, Location::caller());
}

#[test]
fn test_mixed_results() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @mixed(%arg0: !torch.int) -> (!torch.none, !torch.tuple<int, int>, !torch.int) {
      %none = torch.constant.none
      %0 = torch.prim.TupleConstruct %arg0, %arg0 : !torch.int, !torch.int -> !torch.tuple<int, int>
      return %none, %0, %arg0 : !torch.none, !torch.tuple<int, int>, !torch.int
    }
    func.func @caller(%arg0: !torch.int) -> !torch.int {
      %0, %1, %2 = call @mixed(%arg0) : (!torch.int) -> (!torch.none, !torch.tuple<int, int>, !torch.int)
      "test.use"(%0, %1) : (!torch.none, !torch.tuple<int, int>) -> ()
      return %2 : !torch.int
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @mixed(%arg0: !torch.int) -> (!torch.int, !torch.int, !torch.int) {
        %none = torch.constant.none
        %0 = torch.prim.TupleConstruct %arg0, %arg0 : !torch.int, !torch.int -> !torch.tuple<int, int>
        %3 = torch.constant.int 0
        %4 = torch.prim.TupleIndex %0, %3 : !torch.tuple<int, int>, !torch.int -> !torch.int
        %5 = torch.constant.int 1
        %6 = torch.prim.TupleIndex %0, %5 : !torch.tuple<int, int>, !torch.int -> !torch.int
        return %4, %6, %arg0 : !torch.int, !torch.int, !torch.int
      }
      func.func @caller(%arg0: !torch.int) -> !torch.int {
        %3, %4, %5 = func.call @mixed(%arg0) : (!torch.int) -> (!torch.int, !torch.int, !torch.int)
        %6 = torch.constant.none
        %7 = torch.prim.TupleConstruct %3, %4 : !torch.int, !torch.int -> !torch.tuple<int, int>
        "test.use"(%6, %7) : (!torch.none, !torch.tuple<int, int>) -> ()
        return %5 : !torch.int
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());

    let twice = vec![
        "--torch-adjust-calling-conventions",
        "--torch-adjust-calling-conventions",
    ];
    let (_, actual) = Tester::transform(twice, src);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_tuple_argument_returned() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @tuple_arg(%arg0: !torch.tuple<int, int>) -> !torch.tuple<int, int> {
      return %arg0 : !torch.tuple<int, int>
    }
    func.func @caller(%arg0: !torch.tuple<int, int>) -> !torch.int {
      %0 = call @tuple_arg(%arg0) : (!torch.tuple<int, int>) -> !torch.tuple<int, int>
      %1 = torch.constant.int 0
      %2 = torch.prim.TupleIndex %0, %1 : !torch.tuple<int, int>, !torch.int -> !torch.int
      return %2 : !torch.int
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @tuple_arg(%arg0: !torch.tuple<int, int>) -> (!torch.int, !torch.int) {
        %2 = torch.constant.int 0
        %3 = torch.prim.TupleIndex %arg0, %2 : !torch.tuple<int, int>, !torch.int -> !torch.int
        %4 = torch.constant.int 1
        %5 = torch.prim.TupleIndex %arg0, %4 : !torch.tuple<int, int>, !torch.int -> !torch.int
        return %3, %5 : !torch.int, !torch.int
      }
      func.func @caller(%arg0: !torch.tuple<int, int>) -> !torch.int {
        %3, %4 = func.call @tuple_arg(%arg0) : (!torch.tuple<int, int>) -> (!torch.int, !torch.int)
        %5 = torch.prim.TupleConstruct %3, %4 : !torch.int, !torch.int -> !torch.tuple<int, int>
        %1 = torch.constant.int 0
        %2 = torch.prim.TupleIndex %5, %1 : !torch.tuple<int, int>, !torch.int -> !torch.int
        return %2 : !torch.int
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_operand_matches_bound() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @bounded(%arg0: !torch.tensor {torch.type_bound = !torch.vtensor<[2],f32>}) -> !torch.int {
      %0 = torch.constant.int 1
      return %0 : !torch.int
    }
    func.func @caller(%arg0: !torch.vtensor<[2],f32>) -> !torch.int {
      %0 = call @bounded(%arg0) : (!torch.vtensor<[2],f32>) -> !torch.int
      return %0 : !torch.int
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @bounded(%arg0: !torch.vtensor<[2],f32>) -> !torch.int {
        %0 = torch.constant.int 1
        return %0 : !torch.int
      }
      func.func @caller(%arg0: !torch.vtensor<[2],f32>) -> !torch.int {
        %1 = func.call @bounded(%arg0) : (!torch.vtensor<[2],f32>) -> !torch.int
        return %1 : !torch.int
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
    assert!(!actual.contains("torch.copy"));
}
