//! Command-line frontend: argument parsing, line preprocessing (history and
//! alias expansion), the `history` builtin, and the read-eval loop that ties
//! them to `vsh-syntax`/`vsh-semantics`/`vsh-env`.

pub mod builtin;
pub mod cli;
pub mod driver;
pub mod preprocess;

pub use cli::{parse, Parse, Run, Source};
pub use driver::run;
