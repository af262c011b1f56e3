extern crate torchconv;

use indoc::indoc;
use std::panic::Location;
use torchconv::parser::DefaultParserDispatch;
use torchconv::parser::Parser;
use torchconv::shared::SharedExt;
use torchconv::tester::Tester;

#[test]
fn test_roundtrip() {
    Tester::init_tracing();
    let src = indoc! {r#"
    module {
      func.func private @decl(!torch.tensor, !torch.none) -> (!torch.int, !torch.bool)
      func.func @f(%arg0: !torch.tensor {torch.type_bound = !torch.vtensor<[2,?],si64>}, %arg1: !torch.tuple<tensor, int>) -> !torch.tuple<tensor, float> {
        %none = torch.constant.none
        %int2 = torch.constant.int 2
        %0 = torch.copy.to_vtensor %arg0 : !torch.vtensor
        %1 = torch.tensor_static_info_cast %0 : !torch.vtensor to !torch.vtensor<*,f32>
        %2 = torch.copy.to_tensor %1 : !torch.tensor<*,f32>
        %3 = torch.prim.TupleIndex %arg1, %int2 : !torch.tuple<tensor, int>, !torch.int -> !torch.tensor
        %4, %5 = builtin.unrealized_conversion_cast %arg1 : !torch.tuple<tensor, int> to !torch.tensor, !torch.int
        %6 = "test.op"(%4, %5) {flag = true} : (!torch.tensor, !torch.int) -> !torch.float
        %7 = torch.prim.TupleConstruct %3, %6 : !torch.tensor, !torch.float -> !torch.tuple<tensor, float>
        return %7 : !torch.tuple<tensor, float>
      }
    }
    "#};
    let (module, actual) = Tester::parse(src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, src, Location::caller());
}

#[test]
fn test_without_module() {
    Tester::init_tracing();
    let src = indoc! {r#"
    // Comments are skipped.
    func.func @f() {
      return
    }
    "#};
    let expected = indoc! {r#"
    module {
      func.func @f() {
        return
      }
    }
    "#};
    let (module, actual) = Tester::parse(src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, expected, Location::caller());
}

#[test]
fn test_calls() {
    Tester::init_tracing();
    let src = indoc! {r#"
    module {
      func.func @g(%arg0: !torch.int) -> !torch.int {
        return %arg0 : !torch.int
      }
      func.func @f(%arg0: !torch.int) -> !torch.int {
        %0 = func.call @g(%arg0) : (!torch.int) -> !torch.int
        %1 = func.constant @g : (!torch.int) -> !torch.int
        %2 = func.call_indirect %1(%0) : (!torch.int) -> !torch.int
        return %2 : !torch.int
      }
    }
    "#};
    let (module, actual) = Tester::parse(src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, src, Location::caller());
}

#[test]
fn test_unknown_value() {
    let src = indoc! {r#"
    func.func @f() {
      "test.use"(%0) : (!torch.int) -> ()
      return
    }
    "#};
    let result = Parser::<DefaultParserDispatch>::parse(src);
    let err = match result {
        Ok(module) => panic!("Expected an error, got:\n{}", module.rd()),
        Err(err) => err.to_string(),
    };
    assert!(err.contains("%0"), "{err}");
}

#[test]
fn test_overwrite_roundtrip() {
    Tester::init_tracing();
    let src = indoc! {r#"
    module {
      func.func @f(%arg0: !torch.vtensor<[2],f32>, %arg1: !torch.vtensor<[2],f32>) {
        %0 = torch.copy.to_tensor %arg0 : !torch.tensor<[2],f32>
        torch.overwrite.tensor.contents %arg1 overwrites %0 : !torch.vtensor<[2],f32>, !torch.tensor<[2],f32>
        return
      }
    }
    "#};
    let (module, actual) = Tester::parse(src);
    Tester::verify(module);
    Tester::check_lines_exact(&actual, src, Location::caller());
}
