//! Entry point: parses argv, builds an [`Env`] wired to the real kernel, and
//! runs the read-eval loop. Grounded on the teacher's `yash-cli::main`
//! (`RealSystem`, signal reset, `auto_interactive`) minus its async executor.

use nix::sys::signal::Signal;
use vsh_env::{Env, RealSystem};

fn main() {
    env_logger::init();

    let args = std::env::args();
    let run = match vsh_cli::parse(args) {
        Ok(vsh_cli::Parse::Run(run)) => run,
        Ok(vsh_cli::Parse::Version) => {
            println!("vsh (vsh-cli) {}", env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }
        Err(e) => {
            eprint!("{e}");
            std::process::exit(2);
        }
    };

    let mut env = Env::new(Box::new(RealSystem));

    vsh_semantics::install_builtins(&mut env);
    vsh_cli::builtin::install(&mut env);

    for (name, value) in std::env::vars() {
        if env.variables.assign(&name, value).is_ok() {
            env.variables.export(&name);
        }
    }

    env.is_interactive = matches!(run.source, vsh_cli::Source::Stdin)
        && run.positional_params.is_empty()
        && env.system.isatty(0)
        && env.system.isatty(2);
    log::debug!("is_interactive = {}", env.is_interactive);

    if env.is_interactive {
        env.shell_pgid = env.system.getpid();
        let _ = env.system.setpgid(env.shell_pgid, env.shell_pgid);
        env.terminal_fd = 2;
        let _ = env.system.tcsetpgrp(env.terminal_fd, env.shell_pgid);
        for signal in [
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGTSTP,
            Signal::SIGTTIN,
            Signal::SIGTTOU,
            Signal::SIGPIPE,
        ] {
            let _ = env.system.ignore_signal(signal);
        }
    }

    let status = vsh_cli::run(&mut env, &run);
    std::process::exit(status.0);
}
