//! Command-line argument parsing (spec.md §6). The teacher's own CLI crate
//! hand-rolls `std::env::args()` matching; this crate uses `clap`'s derive
//! API instead, per SPEC_FULL.md's ambient-stack decision to parse with
//! whichever crate the rest of the pack reaches for.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "vsh",
    about = "vsh command interpreter",
    disable_version_flag = true
)]
pub struct Cli {
    /// Execute STRING as a command line and exit.
    #[arg(short = 'c', value_name = "STRING")]
    pub command_string: Option<String>,

    /// Print the version and exit.
    #[arg(short = 'v', long = "version")]
    pub version: bool,

    /// `SCRIPT [args...]`, or (with `-c`) `NAME [args...]` supplying `$0`
    /// and the positional parameters.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub operands: Vec<String>,
}

/// Where the driver loop reads command source text from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Stdin,
    String(String),
    File(String),
}

/// A fully resolved invocation: what to run, and the `$0`/positional
/// parameters a script or `-c` string sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub source: Source,
    pub shell_name: String,
    pub positional_params: Vec<String>,
}

/// Either a normal run, or a request to print something and exit immediately
/// (handled by `main` before any shell state is set up).
pub enum Parse {
    Run(Run),
    Version,
}

/// Parses `args` (normally `std::env::args()`) into a [`Parse`].
pub fn parse(args: impl Iterator<Item = String>) -> Result<Parse, clap::Error> {
    let cli = Cli::try_parse_from(args)?;
    if cli.version {
        return Ok(Parse::Version);
    }
    Ok(Parse::Run(resolve(cli)))
}

fn resolve(cli: Cli) -> Run {
    if let Some(command_string) = cli.command_string {
        let shell_name = cli
            .operands
            .first()
            .cloned()
            .unwrap_or_else(|| "vsh".to_string());
        let positional_params = cli.operands.into_iter().skip(1).collect();
        return Run {
            source: Source::String(command_string),
            shell_name,
            positional_params,
        };
    }

    let mut operands = cli.operands.into_iter();
    match operands.next() {
        Some(script) => Run {
            positional_params: operands.collect(),
            source: Source::File(script.clone()),
            shell_name: script,
        },
        None => Run {
            source: Source::Stdin,
            shell_name: "vsh".to_string(),
            positional_params: Vec::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(s: &'a [&str]) -> impl Iterator<Item = String> + 'a {
        std::iter::once("vsh".to_string()).chain(s.iter().map(|s| s.to_string()))
    }

    #[test]
    fn no_arguments_reads_from_stdin() {
        let Parse::Run(run) = parse(args(&[])).unwrap() else {
            panic!("expected Run");
        };
        assert_eq!(run.source, Source::Stdin);
    }

    #[test]
    fn dash_c_executes_a_string() {
        let Parse::Run(run) = parse(args(&["-c", "echo hi"])).unwrap() else {
            panic!("expected Run");
        };
        assert_eq!(run.source, Source::String("echo hi".to_string()));
    }

    #[test]
    fn dash_c_with_name_and_args_sets_positional_params() {
        let Parse::Run(run) = parse(args(&["-c", "echo $1", "myname", "a", "b"])).unwrap() else {
            panic!("expected Run");
        };
        assert_eq!(run.shell_name, "myname");
        assert_eq!(run.positional_params, vec!["a", "b"]);
    }

    #[test]
    fn script_path_with_args() {
        let Parse::Run(run) = parse(args(&["script.sh", "x", "y"])).unwrap() else {
            panic!("expected Run");
        };
        assert_eq!(run.source, Source::File("script.sh".to_string()));
        assert_eq!(run.positional_params, vec!["x", "y"]);
    }

    #[test]
    fn version_flag_short_circuits() {
        assert!(matches!(parse(args(&["-v"])).unwrap(), Parse::Version));
    }
}
