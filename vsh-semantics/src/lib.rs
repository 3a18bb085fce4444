//! Word expansion, the executor/dispatcher, pipeline wiring, and the
//! redirection applier — spec.md §4.4 through §4.7. Everything here runs
//! against a [`vsh_env::Env`]; none of it knows how a command line was read
//! or how its source text was lexed and parsed (that is `vsh-syntax` and
//! `vsh-cli`'s job).

pub mod builtin;
pub mod command;
pub mod expansion;
pub mod pipeline;
pub mod redir;

pub use builtin::install as install_builtins;
pub use command::{execute, Flow};
pub use expansion::{expand_argv, expand_single, expand_word, ExpandError};
pub use pipeline::{reap_finished_jobs, run_pipeline, shutdown_jobs};
pub use redir::RedirGuard;
