use crate::convert::RewriteResult;
use crate::init_subscriber;
use crate::ir::Op;
use crate::ir::Value;
use crate::parser::DefaultParserDispatch;
use crate::parser::Parser;
use crate::shared::Shared;
use crate::shared::SharedExt;
use crate::transform;
use crate::DefaultTransformDispatch;
use crate::Passes;
use anyhow::Result;
use std::cmp::max;
use std::panic::Location;
use std::sync::Arc;
use tracing::info;

pub struct Tester;

impl Tester {
    /// Initialize the subscriber for the tests.
    ///
    /// Cannot pass options, since the tests run concurrently.
    pub fn init_tracing() {
        let level = tracing::Level::INFO;
        match init_subscriber(level) {
            Ok(_) => (),
            Err(_e) => (),
        }
    }
    fn point_to_missing_line(expected: &str, index: usize) -> String {
        let mut result = String::new();
        result.push_str("A line is missing from the output:\n");
        result.push_str("```");
        for (i, line) in expected.lines().enumerate() {
            if i == index {
                let msg = format!("{line}   <== missing");
                result.push_str(&format!("\n{msg}"));
            } else {
                result.push_str(&format!("\n{line}"));
            }
        }
        result.push_str("\n```");
        result
    }
    pub fn check_lines_exact(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let l = max(actual.lines().count(), expected.lines().count());
        for i in 0..l {
            let actual_line = match actual.lines().nth(i) {
                Some(line) => line,
                None => panic!("Line {i} not found in output: called from {caller}"),
            };
            let expected_line = match expected.lines().nth(i) {
                Some(line) => line,
                None => panic!("Output has more lines than expected: called from {caller}"),
            };
            assert_eq!(actual_line, expected_line, "called from {}", caller);
        }
    }
    /// Check whether the expected lines are present in the actual output.
    ///
    /// The actual output may contain additional lines that are not in the expected output.
    pub fn check_lines_contain(actual: &str, expected: &str, caller: &Location<'_>) {
        let actual = actual.trim();
        let expected = expected.trim();
        let mut actual_index = 0;
        'outer: for (i, expected_line) in expected.lines().enumerate() {
            let expected_line = expected_line.trim();
            // An empty line would match any line.
            if expected_line.is_empty() {
                continue;
            }
            for (j, actual_line) in actual.lines().enumerate().skip(actual_index) {
                if actual_line.contains(expected_line) {
                    actual_index = j + 1;
                    continue 'outer;
                }
            }
            let msg = Self::point_to_missing_line(expected, i);
            panic!("{msg}\nwhen called from {caller}");
        }
    }
    fn print_heading(msg: &str, src: &str) {
        info!("{msg}:\n```\n{src}\n```\n");
    }
    pub fn parse(src: &str) -> (Shared<dyn Op>, String) {
        let src = src.trim();
        Self::print_heading("Before parse", src);
        let module = Parser::<DefaultParserDispatch>::parse(src).unwrap();
        let actual = module.rd().to_string();
        Self::print_heading("After parse", &actual);
        (module, actual)
    }
    /// Parse `src`, run the passes in `arguments`, and print the result.
    pub fn try_transform(arguments: Vec<&str>, src: &str) -> Result<(Shared<dyn Op>, String)> {
        let src = src.trim();
        let module = Parser::<DefaultParserDispatch>::parse(src)?;
        let msg = format!("Before (transform {arguments:?})");
        Self::print_heading(&msg, src);

        for arg in arguments.iter() {
            if !arg.starts_with("--") {
                panic!("passes should be prefixed with `--`");
            }
        }
        let passes = Passes::from_args_vec(arguments.clone());
        let result = transform::<DefaultTransformDispatch>(module.clone(), &passes)?;
        let root = match result {
            RewriteResult::Changed(op) => op,
            RewriteResult::Unchanged => module,
        };
        let actual = root.rd().to_string();
        let msg = format!("After (transform {arguments:?})");
        Self::print_heading(&msg, &actual);
        Ok((root, actual))
    }
    pub fn transform(arguments: Vec<&str>, src: &str) -> (Shared<dyn Op>, String) {
        Self::try_transform(arguments, src).unwrap()
    }
    fn verify_core(op: &Shared<dyn Op>) {
        let op = op.rd();
        let operation = op.operation().rd();
        if !op.name().to_string().contains("module") {
            assert!(operation.parent().is_some(), "op without parent:\n{}", &*op);
        }
        for result in operation.results().to_vec() {
            if let Value::OpResult(res) = &*result.rd() {
                let defining_op = res.defining_op();
                let points_back = defining_op
                    .is_some_and(|defining| Arc::ptr_eq(defining.rd().operation(), op.operation()));
                assert!(points_back, "result without defining op:\n{}", &*op);
            }
        }
        let body = op.region().and_then(|region| region.rd().block());
        for argument in operation.arguments().to_vec() {
            if let (Value::BlockArgument(arg), Some(body)) = (&*argument.rd(), &body) {
                let in_body = arg.parent().is_some_and(|parent| Arc::ptr_eq(&parent, body));
                assert!(in_body, "argument without parent block:\n{}", &*op);
            }
        }
    }
    /// Run some extra verification on the IR (usually on a module).
    ///
    /// This catches problems that are not visible in the textual
    /// representation. For example, whether an op is added to its parent is
    /// visible or the op wouldn't be printed, but whether the op also has a
    /// pointer to the parent is not visible.
    pub fn verify(op: Shared<dyn Op>) {
        Self::verify_core(&op);
        let ops = op.rd().ops();
        for op in ops {
            Self::verify(op);
        }
    }
}
