use anyhow::Result;
use clap::arg;
use clap::ArgMatches;
use clap::Args;
use clap::Command;
use std::io::Read;
use torchconv::convert::RewriteResult;
use torchconv::init_subscriber;
use torchconv::parser::DefaultParserDispatch;
use torchconv::parser::Parser;
use torchconv::shared::SharedExt;
use torchconv::transform;
use torchconv::DefaultTransformDispatch;
use torchconv::Passes;

/// Adjusts the calling conventions of torch-style tensor IR
#[derive(Args, Debug)]
#[command(version, about)]
struct TorchconvArgs {
    /// The input file (- is interpreted as stdin)
    #[arg(default_value = "-")]
    input: String,
    /// Print debug logs to stderr
    #[arg(long)]
    debug: bool,
}

fn cli() -> Command {
    let cli = Command::new("torchconv").args(torchconv::default_arguments());
    TorchconvArgs::augment_args(cli)
}

fn parse_and_transform(src: &str, passes: &Passes) -> Result<String> {
    let module = Parser::<DefaultParserDispatch>::parse(src)?;
    let result = transform::<DefaultTransformDispatch>(module.clone(), passes)?;
    let result = match result {
        RewriteResult::Changed(op) => op.rd().to_string(),
        RewriteResult::Unchanged => module.rd().to_string(),
    };
    Ok(result)
}

fn read_input(matches: &ArgMatches) -> Result<String> {
    let input = match matches.get_one::<String>("input") {
        Some(input) => input.as_str(),
        None => "-",
    };
    if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(std::fs::read_to_string(input)?)
    }
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let level = if matches.get_flag("debug") {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    init_subscriber(level)?;
    let passes = Passes::from_args(std::env::args_os());
    let input_text = read_input(&matches)?;
    let result = parse_and_transform(&input_text, &passes)?;
    println!("{result}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn run_app(args: Vec<&str>, input_text: &str) -> Result<String> {
        let cli = cli();
        let args_owned: Vec<String> = args.iter().map(|&s| s.to_string()).collect();
        let _matches = cli.try_get_matches_from(args_owned)?;
        let passes = Passes::from_args_vec(args);
        parse_and_transform(input_text, &passes)
    }

    #[test]
    fn test_help() {
        let args = vec!["torchconv", "--help"];
        let result = run_app(args, "");
        let err = match result {
            Ok(_) => panic!("Expected an error"),
            Err(e) => e,
        };
        let err = err.to_string();
        assert!(err.contains("Usage: torchconv"));
        assert!(err.contains("--torch-adjust-calling-conventions"));
        assert!(err.contains("--torch-maximize-value-semantics"));
        assert!(err.contains("--canonicalize"));
        assert!(err.contains("--print-ir-before-all"));
    }

    #[test]
    fn test_invalid_args() {
        let result = run_app(vec!["torchconv", "--invalid-flag"], "");
        assert!(result.is_err());
    }

    #[test]
    fn test_pass_order() {
        let src = indoc! {r#"
        func.func @f(%arg0: !torch.vtensor) -> !torch.none {
          %0 = torch.constant.none
          return %0 : !torch.none
        }
        "#};
        let args = vec![
            "torchconv",
            "--torch-adjust-calling-conventions",
            "--canonicalize",
        ];
        let actual = run_app(args, src).unwrap();
        let expected = indoc! {r#"
        module {
          func.func @f(%arg0: !torch.vtensor) {
            return
          }
        }
        "#};
        assert_eq!(actual.trim(), expected.trim());
    }
}
