use crate::canonicalize::Canonicalize;
use crate::convert::AdjustCallingConventions;
use crate::convert::MaximizeValueSemantics;
use crate::convert::Pass;
use crate::convert::RewriteResult;
use crate::ir::Op;
use crate::shared::Shared;
use crate::shared::SharedExt;
use anyhow::Result;
use clap::Arg;
use clap::ArgAction;
use std::env::ArgsOs;
use std::fmt;
use std::fmt::Display;
use tracing::info;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;

/// A transformation pass (e.g., `--torch-adjust-calling-conventions`).
pub struct SinglePass {
    pass: String,
}

impl Display for SinglePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pass)
    }
}

impl SinglePass {
    pub fn new(pass: &str) -> SinglePass {
        let pass = pass.strip_prefix("--").unwrap_or(pass);
        SinglePass {
            pass: pass.to_string(),
        }
    }
}

/// Whether the command line argument selects a pass.
fn is_pass(arg: &str) -> bool {
    arg.starts_with("--torch-") || arg.starts_with("--canonicalize")
}

/// A collection of [SinglePass]es in the order in which they should run.
#[derive(Default)]
pub struct Passes {
    passes: Vec<SinglePass>,
    print_ir_before_all: bool,
}

impl Display for Passes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passes = self
            .passes
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<String>>();
        write!(f, "{}", passes.join(" "))
    }
}

impl Passes {
    pub fn from_vec(passes: Vec<&str>) -> Passes {
        Passes {
            passes: passes.iter().map(|p| SinglePass::new(p)).collect(),
            print_ir_before_all: false,
        }
    }
    /// Extract the passes (and `--print-ir-before-all`) from the given args.
    ///
    /// Arguments that do not select a pass are ignored.
    pub fn from_args_vec(args: Vec<&str>) -> Passes {
        let mut passes = Passes::default();
        for arg in args {
            if is_pass(arg) {
                passes.passes.push(SinglePass::new(arg));
            } else if arg == "--print-ir-before-all" {
                passes.print_ir_before_all = true;
            }
        }
        passes
    }
    /// Same as [Passes::from_args_vec] but for the arguments of the process.
    pub fn from_args(args: ArgsOs) -> Passes {
        let args = args
            .map(|arg| arg.to_string_lossy().to_string())
            .collect::<Vec<_>>();
        Passes::from_args_vec(args.iter().map(|arg| arg.as_str()).collect())
    }
    pub fn vec(&self) -> &Vec<SinglePass> {
        &self.passes
    }
    pub fn print_ir_before_all(&self) -> bool {
        self.print_ir_before_all
    }
    pub fn set_print_ir_before_all(&mut self, print: bool) {
        self.print_ir_before_all = print;
    }
}

/// Interface to add custom passes.
pub trait TransformDispatch {
    fn dispatch(op: Shared<dyn Op>, pass: &SinglePass) -> Result<RewriteResult>;
}

/// Default implementation of [TransformDispatch].
///
/// Knows the passes that are implemented in this crate.
pub struct DefaultTransformDispatch;

/// Initialize logging with the given level.
pub fn init_subscriber(level: Level) -> Result<(), SetGlobalDefaultError> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}

impl TransformDispatch for DefaultTransformDispatch {
    fn dispatch(op: Shared<dyn Op>, pass: &SinglePass) -> Result<RewriteResult> {
        let pass = pass.to_string();
        match pass.as_str() {
            AdjustCallingConventions::NAME => AdjustCallingConventions::convert(op),
            Canonicalize::NAME => Canonicalize::convert(op),
            MaximizeValueSemantics::NAME => MaximizeValueSemantics::convert(op),
            _ => Err(anyhow::anyhow!("Unknown pass: {}", pass)),
        }
    }
}

/// Default arguments: one flag per pass plus `--print-ir-before-all`.
///
/// `--debug` is not included to allow downstream tools to handle the logging
/// differently.
pub fn default_arguments() -> Vec<Arg> {
    vec![
        Arg::new("torch-adjust-calling-conventions")
            .long("torch-adjust-calling-conventions")
            .help("Remove none and tuple values from function boundaries and resolve type bounds")
            .action(ArgAction::SetTrue),
        Arg::new("torch-maximize-value-semantics")
            .long("torch-maximize-value-semantics")
            .help("Use value tensors where the aliasing of a tensor copy is local")
            .action(ArgAction::SetTrue),
        Arg::new("canonicalize")
            .long("canonicalize")
            .help("Fold trivial ops and remove unused pure ops")
            .action(ArgAction::SetTrue),
        Arg::new("print-ir-before-all")
            .long("print-ir-before-all")
            .help("Print the IR before each pass")
            .action(ArgAction::SetTrue),
    ]
}

/// Run `passes` on `op` in order.
///
/// Returns [RewriteResult::Changed] when at least one pass changed the IR.
pub fn transform<T: TransformDispatch>(
    op: Shared<dyn Op>,
    passes: &Passes,
) -> Result<RewriteResult> {
    let mut result = RewriteResult::Unchanged;
    let mut op = op;
    for pass in passes.vec() {
        if passes.print_ir_before_all() {
            eprintln!("// ----- // IR Dump Before {pass} // ----- //\n{}", op.rd());
        }
        info!("Running {pass}");
        let new_result = T::dispatch(op.clone(), pass)?;
        if let RewriteResult::Changed(changed) = new_result {
            op = changed;
            result = RewriteResult::changed(op.clone());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_from_args() {
        let args = vec![
            "torchconv",
            "input.mlir",
            "--canonicalize",
            "--print-ir-before-all",
            "--torch-adjust-calling-conventions",
        ];
        let passes = Passes::from_args_vec(args);
        assert_eq!(
            passes.to_string(),
            "canonicalize torch-adjust-calling-conventions"
        );
        assert!(passes.print_ir_before_all());
    }

    #[test]
    fn test_unknown_pass() {
        let passes = Passes::from_vec(vec!["--foo"]);
        assert_eq!(passes.vec()[0].to_string(), "foo");
    }
}
