extern crate torchconv;

use indoc::indoc;
use std::panic::Location;
use torchconv::tester::Tester;

fn flags() -> Vec<&'static str> {
    vec!["--canonicalize"]
}

#[test]
fn test_tuple_index_fold() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.int, %arg1: !torch.vtensor) -> !torch.vtensor {
      %0 = torch.prim.TupleConstruct %arg0, %arg1 : !torch.int, !torch.vtensor -> !torch.tuple<int, vtensor>
      %1 = torch.constant.int -1
      %2 = torch.prim.TupleIndex %0, %1 : !torch.tuple<int, vtensor>, !torch.int -> !torch.vtensor
      return %2 : !torch.vtensor
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.int, %arg1: !torch.vtensor) -> !torch.vtensor {
        return %arg1 : !torch.vtensor
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_no_fold_out_of_range() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.int) -> !torch.int {
      %0 = torch.prim.TupleConstruct %arg0 : !torch.int -> !torch.tuple<int>
      %1 = torch.constant.int 1
      %2 = torch.prim.TupleIndex %0, %1 : !torch.tuple<int>, !torch.int -> !torch.int
      return %2 : !torch.int
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    let (_, expected) = Tester::parse(src);
    Tester::check_lines_exact(&actual, &expected, Location::caller());
}

#[test]
fn test_static_info_cast_fold() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.vtensor {
      %0 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor<[2],f32>
      %1 = torch.tensor_static_info_cast %0 : !torch.vtensor<[2],f32> to !torch.vtensor
      return %1 : !torch.vtensor
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
fn test_dead_code_elimination() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.tensor) {
      %none = torch.constant.none
      %0 = torch.constant.int 3
      %1 = torch.copy.to_vtensor %arg0 : !torch.vtensor
      "test.use"(%0) : (!torch.int) -> ()
      return
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.tensor) {
        %0 = torch.constant.int 3
        %1 = torch.copy.to_vtensor %arg0 : !torch.vtensor
        "test.use"(%0) : (!torch.int) -> ()
        return
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_after_calling_conventions() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @none_arg(%arg0: !torch.none, %arg1: !torch.int) -> !torch.int {
      return %arg1 : !torch.int
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
      func.func @caller(%arg0: !torch.int) -> !torch.int {
        %1 = func.call @none_arg(%arg0) : (!torch.int) -> !torch.int
        return %1 : !torch.int
      }
    }
    "#};
    let flags = vec!["--torch-adjust-calling-conventions", "--canonicalize"];
    let (module, actual) = Tester::transform(flags, src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_reverted_cast_fold() {
    Tester::init_tracing();
    let src = indoc! {r#"
    func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
      %0 = torch.tensor_static_info_cast %arg0 : !torch.vtensor<[2],f32> to !torch.vtensor
      %1 = torch.tensor_static_info_cast %0 : !torch.vtensor to !torch.vtensor<[2],f32>
      return %1 : !torch.vtensor<[2],f32>
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.vtensor<[2],f32>) -> !torch.vtensor<[2],f32> {
        return %arg0 : !torch.vtensor<[2],f32>
      }
    }
    "#};
    let (module, actual) = Tester::transform(flags(), src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}
