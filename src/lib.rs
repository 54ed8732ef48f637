#![deny(unused_must_use)]

mod debug_log;

pub mod fmt_ctx;
pub mod diagnostics;
pub mod source_files;
pub mod types;
pub mod ast;
pub mod context;
pub mod session;
pub mod prelude;
pub mod tycheck;

use std::fmt;

use thiserror::Error;

use crate::{
    ast::Stmt,
    diagnostics::Diagnostics,
    session::Session,
    tycheck::TypeChecker,
};

#[derive(Debug, Error)]
pub struct ErrorsEmitted {
    /// The number of errors that were emitted
    emitted_errors: usize,
}

impl ErrorsEmitted {
    pub fn emitted_errors(&self) -> usize {
        self.emitted_errors
    }
}

impl fmt::Display for ErrorsEmitted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.emitted_errors {
            1 => write!(f, "aborting due to 1 previous error"),
            errors => write!(f, "aborting due to {} previous errors", errors),
        }
    }
}

macro_rules! check_errors {
    ($diag:expr) => {
        let diag = $diag;
        match diag.emitted_errors() {
            0 => {},
            emitted_errors => return Err(ErrorsEmitted {emitted_errors}),
        }
    };
}

/// Type-checks the statements of a pre-resolved module and returns the fully typed tree
///
/// Every realization produced along the way is available from `sess.realizations()`.
pub fn check_module(
    sess: &mut Session,
    stmts: Vec<Stmt>,
    diag: &Diagnostics,
) -> Result<Stmt, ErrorsEmitted> {
    let module = TypeChecker::new(sess, diag).check_module(stmts);
    check_errors!(diag);

    Ok(module)
}
