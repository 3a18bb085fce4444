//! The one builtin that needs more than [`vsh_env::Env`] to be meaningful:
//! `history` prints the entries the driver loop has recorded. Registered
//! separately from `vsh_semantics::install_builtins` because that crate has
//! no reason to know the history store exists — grounded on the same
//! `Builtin`/`BuiltinRegistry`-on-`Env` design as every other builtin.

use vsh_env::{Builtin, Env, ExitStatus};

pub fn install(env: &mut Env) {
    env.builtins.insert("history", Builtin { run: history });
}

fn history(_argv: &[String], env: &mut Env) -> ExitStatus {
    for (index, line) in env.history.iter() {
        println!("{index:5}  {line}");
    }
    ExitStatus::SUCCESS
}
