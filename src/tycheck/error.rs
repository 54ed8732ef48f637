use thiserror::Error;

use crate::source_files::Span;

/// A user-facing semantic error, tagged by what went wrong
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("name '{0}' is not defined")]
    IdNotFound(String),
    #[error("'{0}' object has no attribute '{1}'")]
    DotNoAttr(String, String),
    #[error("cannot unify '{0}' and '{1}'")]
    TypeUnify(String, String),
    #[error("unsupported operand type(s) for {0}: '{1}' and '{2}'")]
    OpNoMagic(String, String, String),
    #[error("static division by zero")]
    StaticDivZero,
    #[error("tuple index {1} out of range for a tuple of size {0}")]
    TupleRangeBounds(usize, i64),
    #[error("slice step cannot be zero")]
    SliceStepZero,
    #[error("'{0}' expected {1} generics but got {2}")]
    GenericsMismatch(String, usize, usize),
    #[error("expected a type, found '{0}'")]
    ExpectedType(String),
    #[error("expected a static expression")]
    ExpectedStatic,
    #[error("'{0}' is not a valid static type (expected int, str or bool)")]
    BadStaticType(String),
    #[error("cannot unpack '{0}' as positional arguments")]
    CallBadUnpack(String),
    #[error("cannot unpack '{0}' as keyword arguments")]
    CallBadKwUnpack(String),
    #[error("argument '{0}' was given more than once")]
    CallRepeatedName(String),
    #[error("'{0}' takes {1} positional arguments but {2} were given")]
    CallArgsMany(String, usize, usize),
    #[error("'{0}' is missing the argument '{1}'")]
    CallArgsMissing(String, String),
    #[error("'{0}' got an unexpected argument '{1}'")]
    CallArgsInvalid(String, String),
    #[error("default argument of '{0}' refers to itself")]
    CallRecursiveDefault(String),
    #[error("no overload of '{0}' matches the arguments ({1})")]
    CallNoMatch(String, String),
    #[error("cannot make a partial call to '{0}'")]
    CallPartial(String),
    #[error("namedtuple expects a static name and a list of static field names")]
    CallNamedTuple,
    #[error("no earlier overload of '{0}' for superf to call")]
    CallSuperF(String),
    #[error("'{0}' has no parent class for super to refer to")]
    CallSuperParent(String),
    #[error("__ptr__ expects a variable")]
    CallPtrVar,
    #[error("__realized__ expects a function")]
    CallRealizedFn,
    #[error("cannot infer the generic '{1}' of '{0}'")]
    CallNoType(String, String),
    #[error("invalid assignment target")]
    AssignInvalid,
    #[error("cannot assign to '{0}' from a nested function")]
    AssignLocalReference(String),
    #[error("cannot modify the field '{1}' of the record '{0}'")]
    AssignUnexpectedFrozen(String, String),
    #[error("cannot delete '{0}' from this scope")]
    DelNotAllowed(String),
    #[error("invalid del target")]
    DelInvalid,
    #[error("'{0}' outside of a loop")]
    ExpectedLoop(String),
    #[error("'{0}' is not iterable")]
    ExpectedGenerator(String),
    #[error("expected a tuple, found '{0}'")]
    ExpectedTuple(String),
    #[error("unexpected type expression")]
    UnexpectedType,
    #[error("{0}")]
    Custom(String),
    #[error("cannot typecheck the program")]
    CannotTypecheck,
    #[error("cannot realize '{0}'")]
    CannotRealize(String),
    #[error("union '{0}' has too many members")]
    UnionTooLarge(String),
    #[error("'return' outside of a function")]
    ReturnOutsideFunction,
    #[error("no module named '{0}'")]
    ImportNotFound(String),
}

/// A semantic error and the location of the node that raised it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct TypeError {
    pub kind: ErrorKind,
    pub span: Span,
}

impl TypeError {
    pub fn new(kind: ErrorKind, span: Span) -> Self {
        Self {kind, span}
    }

    /// Attaches a location to an error raised without one
    pub fn or_span(mut self, span: Span) -> Self {
        if self.span == Span::default() {
            self.span = span;
        }
        self
    }
}

pub type TyResult<T> = Result<T, TypeError>;
