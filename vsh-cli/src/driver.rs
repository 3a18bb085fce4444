//! The read-eval loop. Grounded on the teacher's `yash-cli::parse_and_print`
//! (lex a chunk, react to `is_incomplete` by reading more, execute, repeat)
//! but built around this crate's synchronous executor instead of the
//! teacher's `futures_executor::LocalPool`.

use std::fs::File;
use std::io::{self, BufRead, Write as _};

use vsh_arena::Arena;
use vsh_env::{Env, ExitStatus, JobState};
use vsh_semantics::Flow;

use crate::cli::{Run, Source};
use crate::preprocess;

/// A source of input lines, one prompt style per variant: interactive stdin
/// prompts to stderr, a script file reads silently.
trait Lines {
    /// Returns `Ok(None)` at end of input.
    fn next_line(&mut self, continuation: bool) -> io::Result<Option<String>>;
}

struct StdinLines {
    stdin: io::StdinLock<'static>,
    prompt: bool,
}

impl Lines for StdinLines {
    fn next_line(&mut self, continuation: bool) -> io::Result<Option<String>> {
        if self.prompt {
            eprint!("{}", if continuation { "> " } else { "$ " });
            io::stderr().flush().ok();
        }
        let mut line = String::new();
        if self.stdin.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

struct FileLines {
    reader: io::BufReader<File>,
}

impl Lines for FileLines {
    fn next_line(&mut self, _continuation: bool) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Runs `run` to completion against `env`, returning the shell's final exit
/// status.
pub fn run(env: &mut Env, run: &Run) -> ExitStatus {
    env.variables.shell_name = run.shell_name.clone();
    env.variables.positional = run.positional_params.clone();

    let status = match &run.source {
        Source::String(command_string) => run_one_shot(env, command_string),
        Source::Stdin => {
            let mut lines = StdinLines {
                stdin: io::stdin().lock(),
                prompt: env.is_interactive,
            };
            run_lines(env, &mut lines)
        }
        Source::File(path) => match File::open(path) {
            Ok(file) => {
                let mut lines = FileLines {
                    reader: io::BufReader::new(file),
                };
                run_lines(env, &mut lines)
            }
            Err(e) => {
                eprintln!("vsh: {path}: {e}");
                ExitStatus(127)
            }
        },
    };
    vsh_semantics::shutdown_jobs(env);
    status
}

fn run_one_shot(env: &mut Env, command_string: &str) -> ExitStatus {
    let arena = Arena::new();
    match vsh_syntax::lex_and_parse(command_string, &arena) {
        Ok(Some(node)) => match vsh_semantics::execute(node, env) {
            Ok((_, status)) => status,
            Err(e) => {
                eprintln!("vsh: {e}");
                ExitStatus(1)
            }
        },
        Ok(None) => ExitStatus::SUCCESS,
        Err(e) => {
            eprintln!("vsh: {e}");
            ExitStatus(2)
        }
    }
}

/// True once the top-level `exit` builtin has fired, telling `run_lines` to
/// stop reading further input instead of treating the status as one more
/// command's result.
fn exited(flow: &Flow) -> bool {
    matches!(flow, Flow::Exit(_))
}

fn run_lines(env: &mut Env, lines: &mut dyn Lines) -> ExitStatus {
    let mut arena = Arena::new();
    let mut buffer = String::new();
    let mut last_status = ExitStatus::SUCCESS;

    loop {
        for (id, name, state) in vsh_semantics::reap_finished_jobs(env) {
            let label = match state {
                JobState::Done(status) => format!("Done{}", done_suffix(status)),
                JobState::Killed(status) => format!("Killed{}", done_suffix(status)),
                _ => "Done".to_string(),
            };
            println!("[{id}]+ {label}\t{name}");
        }

        let line = match lines.next_line(!buffer.is_empty()) {
            Ok(Some(line)) => line,
            Ok(None) => {
                if !buffer.trim().is_empty() {
                    eprintln!("vsh: unexpected end of input");
                    last_status = ExitStatus(2);
                }
                break;
            }
            Err(e) => {
                eprintln!("vsh: {e}");
                last_status = ExitStatus(1);
                break;
            }
        };

        let prepared = if buffer.is_empty() {
            match preprocess::expand_history_refs(line.trim_end_matches('\n'), &env.history) {
                Ok(expanded) => expanded,
                Err(message) => {
                    eprintln!("vsh: {message}");
                    continue;
                }
            }
        } else {
            line.trim_end_matches('\n').to_string()
        };

        if buffer.is_empty() {
            env.history.push(prepared.clone());
        }

        let candidate = if buffer.is_empty() {
            preprocess::expand_leading_alias(&prepared, &env.aliases)
        } else {
            format!("{buffer}\n{prepared}")
        };

        arena.reset();
        match vsh_syntax::lex_and_parse(&candidate, &arena) {
            Ok(Some(node)) => {
                buffer.clear();
                match vsh_semantics::execute(node, env) {
                    Ok((flow, status)) => {
                        last_status = status;
                        if exited(&flow) {
                            break;
                        }
                    }
                    Err(e) => {
                        eprintln!("vsh: {e}");
                        last_status = ExitStatus(1);
                    }
                }
            }
            Ok(None) => buffer.clear(),
            Err(e) if e.is_incomplete() => buffer = candidate,
            Err(e) => {
                eprintln!("vsh: {e}");
                last_status = ExitStatus(2);
                buffer.clear();
            }
        }
    }

    last_status
}

fn done_suffix(status: ExitStatus) -> String {
    if status.is_success() {
        String::new()
    } else {
        format!("({})", status.0)
    }
}
