//! Abstract syntax tree produced by the parser.
//!
//! Every node and every string reachable from a node is owned by the arena
//! that was active during parsing; the tree's lifetime ends at the next
//! arena reset, which the driver performs at the start of the next command
//! line. There is no subtyping here — `Node` is a closed tagged union.

use vsh_arena::Arena;

/// A redirection kind, plus the information needed to apply it (§4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedirKind {
    Input,
    Output,
    Append,
    Heredoc,
    DupOut,
    DupIn,
}

impl RedirKind {
    /// The fd a redirection of this kind targets when no explicit digit
    /// prefix was lexed.
    pub fn default_fd(self) -> i32 {
        match self {
            RedirKind::Input | RedirKind::Heredoc | RedirKind::DupIn => 0,
            RedirKind::Output | RedirKind::Append | RedirKind::DupOut => 1,
        }
    }
}

/// One redirection attached to a simple command. `target` is the redirection
/// operand word (a filename, or a small integer for `Dup*`); `heredoc_body`
/// is populated only for `Heredoc` and holds the collected, already
/// tab-stripped (if `<<-`) body text, expanded or not per `heredoc_expand`.
#[derive(Clone, Copy, Debug)]
pub struct Redir<'a> {
    pub kind: RedirKind,
    pub fd: i32,
    pub target: &'a str,
    pub heredoc_body: Option<&'a str>,
    pub heredoc_expand: bool,
}

/// A `name=value` assignment attached to a simple command, or applied bare
/// when a command has no argv.
#[derive(Clone, Copy, Debug)]
pub struct Assignment<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// The abstract syntax tree. One `Node` variant per grammar production in
/// §4.3; every child is an arena-borrowed reference so the whole tree is a
/// single contiguous allocation lifetime.
#[derive(Clone, Copy, Debug)]
pub enum Node<'a> {
    Command {
        argv: &'a [&'a str],
        redirs: &'a [Redir<'a>],
        assignments: &'a [Assignment<'a>],
    },
    Pipeline {
        commands: &'a [&'a Node<'a>],
        negated: bool,
    },
    And {
        left: &'a Node<'a>,
        right: &'a Node<'a>,
    },
    Or {
        left: &'a Node<'a>,
        right: &'a Node<'a>,
    },
    Sequence {
        left: &'a Node<'a>,
        right: &'a Node<'a>,
    },
    Background {
        child: &'a Node<'a>,
    },
    Negate {
        child: &'a Node<'a>,
    },
    Subshell {
        child: &'a Node<'a>,
    },
    If {
        condition: &'a Node<'a>,
        then_branch: &'a Node<'a>,
        else_branch: Option<&'a Node<'a>>,
    },
    While {
        condition: &'a Node<'a>,
        body: &'a Node<'a>,
    },
    For {
        varname: &'a str,
        words: &'a [&'a str],
        /// `for x; do ... done` (the `in WORD*` clause omitted): iterate the
        /// shell's positional parameters instead of `words`, which is empty
        /// in this case. Supplemented beyond spec.md's grammar, which marks
        /// the `in` clause optional but does not say what an omitted clause
        /// means; see DESIGN.md.
        uses_positional: bool,
        body: &'a Node<'a>,
    },
    Function {
        name: &'a str,
        body: &'a Node<'a>,
    },
    Block {
        child: &'a Node<'a>,
    },
    /// Supplemented beyond spec.md (see SPEC_FULL.md §2): `return [status]`.
    Return {
        status: Option<&'a str>,
    },
    /// Supplemented: `break [n]` / `continue [n]`, valid only inside a loop
    /// body; `n` defaults to 1 when absent.
    Break {
        levels: u32,
    },
    Continue {
        levels: u32,
    },
}

/// Recursively copies `node` (and every string and child it reaches) into
/// `dst`, so the result outlives whatever arena `node` originally lived in.
/// Used when a `function name () { ... }` definition executes: the function
/// body, parsed out of the current command line's transient arena, must
/// survive that arena's reset at the start of the next line, so the
/// definition is re-homed into the shell's long-lived function arena (see
/// `vsh-env::function`).
pub fn deep_copy<'dst>(node: &Node<'_>, dst: &'dst Arena) -> &'dst Node<'dst> {
    let copied = match *node {
        Node::Command {
            argv,
            redirs,
            assignments,
        } => Node::Command {
            argv: &*dst.alloc_slice_fill_iter(argv.iter().map(|s| dst.alloc_str(s))),
            redirs: &*dst.alloc_slice_fill_iter(redirs.iter().map(|r| copy_redir(r, dst))),
            assignments: &*dst.alloc_slice_fill_iter(
                assignments.iter().map(|a| Assignment {
                    name: dst.alloc_str(a.name),
                    value: dst.alloc_str(a.value),
                }),
            ),
        },
        Node::Pipeline { commands, negated } => Node::Pipeline {
            commands: &*dst.alloc_slice_fill_iter(
                commands.iter().map(|c| &*deep_copy(c, dst)),
            ),
            negated,
        },
        Node::And { left, right } => Node::And {
            left: deep_copy(left, dst),
            right: deep_copy(right, dst),
        },
        Node::Or { left, right } => Node::Or {
            left: deep_copy(left, dst),
            right: deep_copy(right, dst),
        },
        Node::Sequence { left, right } => Node::Sequence {
            left: deep_copy(left, dst),
            right: deep_copy(right, dst),
        },
        Node::Background { child } => Node::Background {
            child: deep_copy(child, dst),
        },
        Node::Negate { child } => Node::Negate {
            child: deep_copy(child, dst),
        },
        Node::Subshell { child } => Node::Subshell {
            child: deep_copy(child, dst),
        },
        Node::If {
            condition,
            then_branch,
            else_branch,
        } => Node::If {
            condition: deep_copy(condition, dst),
            then_branch: deep_copy(then_branch, dst),
            else_branch: else_branch.map(|n| deep_copy(n, dst)),
        },
        Node::While { condition, body } => Node::While {
            condition: deep_copy(condition, dst),
            body: deep_copy(body, dst),
        },
        Node::For {
            varname,
            words,
            uses_positional,
            body,
        } => Node::For {
            varname: dst.alloc_str(varname),
            words: &*dst.alloc_slice_fill_iter(words.iter().map(|w| dst.alloc_str(w))),
            uses_positional,
            body: deep_copy(body, dst),
        },
        Node::Function { name, body } => Node::Function {
            name: dst.alloc_str(name),
            body: deep_copy(body, dst),
        },
        Node::Block { child } => Node::Block {
            child: deep_copy(child, dst),
        },
        Node::Return { status } => Node::Return {
            status: status.map(|s| dst.alloc_str(s)),
        },
        Node::Break { levels } => Node::Break { levels },
        Node::Continue { levels } => Node::Continue { levels },
    };
    dst.alloc(copied)
}

/// Renders `node` back to shell-like source text. Not a faithful
/// round-trip printer (quoting, heredoc bodies, and comments are lost) —
/// good enough for a job's `jobs`/`wait` display name and for diagnostics,
/// which is the only place anything reads this.
pub fn render(node: &Node<'_>) -> String {
    match *node {
        Node::Command {
            argv,
            redirs,
            assignments,
        } => {
            let mut parts: Vec<String> = assignments
                .iter()
                .map(|a| format!("{}={}", a.name, a.value))
                .collect();
            parts.extend(argv.iter().map(|w| w.to_string()));
            parts.extend(redirs.iter().map(render_redir));
            parts.join(" ")
        }
        Node::Pipeline { commands, negated } => {
            let body = commands.iter().map(|c| render(c)).collect::<Vec<_>>().join(" | ");
            if negated {
                format!("! {body}")
            } else {
                body
            }
        }
        Node::And { left, right } => format!("{} && {}", render(left), render(right)),
        Node::Or { left, right } => format!("{} || {}", render(left), render(right)),
        Node::Sequence { left, right } => format!("{}; {}", render(left), render(right)),
        Node::Background { child } => format!("{} &", render(child)),
        Node::Negate { child } => format!("! {}", render(child)),
        Node::Subshell { child } => format!("({})", render(child)),
        Node::If {
            condition,
            then_branch,
            else_branch,
        } => {
            let mut s = format!("if {}; then {}; ", render(condition), render(then_branch));
            if let Some(else_branch) = else_branch {
                s.push_str(&format!("else {}; ", render(else_branch)));
            }
            s.push_str("fi");
            s
        }
        Node::While { condition, body } => {
            format!("while {}; do {}; done", render(condition), render(body))
        }
        Node::For {
            varname,
            words,
            uses_positional,
            body,
        } => {
            if uses_positional {
                format!("for {varname}; do {}; done", render(body))
            } else {
                format!("for {varname} in {}; do {}; done", words.join(" "), render(body))
            }
        }
        Node::Function { name, body } => format!("{name} () {{ {}; }}", render(body)),
        Node::Block { child } => format!("{{ {}; }}", render(child)),
        Node::Return { status } => match status {
            Some(s) => format!("return {s}"),
            None => "return".to_string(),
        },
        Node::Break { levels } => format!("break {levels}"),
        Node::Continue { levels } => format!("continue {levels}"),
    }
}

fn render_redir(redir: &Redir<'_>) -> String {
    let op = match redir.kind {
        RedirKind::Input => "<",
        RedirKind::Output => ">",
        RedirKind::Append => ">>",
        RedirKind::Heredoc => "<<",
        RedirKind::DupOut => ">&",
        RedirKind::DupIn => "<&",
    };
    format!("{}{op}{}", redir.fd, redir.target)
}

fn copy_redir<'dst>(redir: &Redir<'_>, dst: &'dst Arena) -> Redir<'dst> {
    Redir {
        kind: redir.kind,
        fd: redir.fd,
        target: dst.alloc_str(redir.target),
        heredoc_body: redir.heredoc_body.map(|b| dst.alloc_str(b)),
        heredoc_expand: redir.heredoc_expand,
    }
}
