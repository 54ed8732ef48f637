//! The compilation session: everything the type checker mutates lives here

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    ast::{ClassStmt, FunctionStmt, Stmt},
    context::{Base, Context},
    types::{TypeId, TypeStore},
};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Floor division and modulo in static arithmetic round toward negative infinity
    pub python_compat: bool,
    /// Upper bound on fixpoint passes for one driver invocation
    pub max_passes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            python_compat: true,
            max_passes: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: Arc<str>,
    /// Expressed in terms of the class's generics
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct ClassRealization {
    pub name: String,
    pub ty: TypeId,
    pub fields: Vec<(Arc<str>, TypeId)>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: Arc<str>,
    /// Synthesized records get a generated definition
    pub ast: Arc<ClassStmt>,
    /// The generalized class type
    pub ty: TypeId,
    pub fields: Vec<Field>,
    /// Method name to overload root name
    pub methods: HashMap<Arc<str>, Arc<str>>,
    /// Class variable name to the canonical name of its global binding
    pub class_vars: HashMap<Arc<str>, Arc<str>>,
    /// This class followed by its statically inherited parents
    pub mro: Vec<Arc<str>>,
    pub is_record: bool,
    /// Set for classes marked with runtime type information and for their subclasses
    pub rtti: bool,
    pub realizations: HashMap<String, ClassRealization>,
}

impl ClassInfo {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| &*field.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionRealization {
    pub name: String,
    pub ty: TypeId,
    /// The specialized, fully typed definition. `None` for builtins.
    pub ast: Option<Arc<FunctionStmt>>,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub ast: Arc<FunctionStmt>,
    /// The generalized function type
    pub ty: TypeId,
    pub realizations: HashMap<String, FunctionRealization>,
}

/// What a synthesized `Partial.<mask>.<function>` record stands for
#[derive(Debug, Clone)]
pub struct PartialInfo {
    /// Canonical name of the partially applied function
    pub func: Arc<str>,
    /// One entry per parameter: true when the argument is already supplied
    pub mask: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealizationKind {
    Class,
    Function,
}

/// A realization handed to code generation
#[derive(Debug, Clone, PartialEq)]
pub struct Realization {
    pub name: String,
    pub kind: RealizationKind,
    pub ty: TypeId,
}

#[derive(Debug, Clone)]
pub struct Module {
    /// The pre-parsed statements, taken when the module is first imported
    pub stmts: Option<Vec<Stmt>>,
    /// The typed tree once the module was checked
    pub checked: Option<Stmt>,
}

/// Owns the type graph, the symbol table and every cache of one compilation
#[derive(Debug)]
pub struct Session {
    pub types: TypeStore,
    pub ctx: Context,
    pub options: SessionOptions,
    pub classes: HashMap<Arc<str>, ClassInfo>,
    pub functions: HashMap<Arc<str>, FunctionInfo>,
    /// Overload root name to canonical names, in declaration order
    pub overloads: HashMap<Arc<str>, Vec<Arc<str>>>,
    /// Partial record name to what it applies
    pub partials: HashMap<Arc<str>, PartialInfo>,
    pub modules: HashMap<Arc<str>, Module>,
    queue: Vec<Realization>,
    temp_counter: usize,
    pub(crate) prelude_loaded: bool,
}

static_assertions::assert_impl_all!(Session: Send);

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    /// Creates an empty session. The prelude is loaded by the first module checked with it.
    pub fn new(options: SessionOptions) -> Self {
        let mut ctx = Context::default();
        ctx.enter_base(Base::module());

        Self {
            types: TypeStore::default(),
            ctx,
            options,
            classes: HashMap::new(),
            functions: HashMap::new(),
            overloads: HashMap::new(),
            partials: HashMap::new(),
            modules: HashMap::new(),
            queue: Vec::new(),
            temp_counter: 0,
            prelude_loaded: false,
        }
    }

    /// Registers a pre-parsed module so that `import` statements can type-check it
    pub fn add_module(&mut self, name: &str, stmts: Vec<Stmt>) {
        self.modules.insert(name.into(), Module {stmts: Some(stmts), checked: None});
    }

    /// Returns a name no program can bind
    pub fn temp_name(&mut self, prefix: &str) -> Arc<str> {
        self.temp_counter += 1;
        format!("%{}_{}", prefix, self.temp_counter).into()
    }

    /// Returns a fresh canonical name for a rebinding of `name`
    pub fn canonical_name(&mut self, name: &str) -> Arc<str> {
        self.temp_counter += 1;
        format!("{}.{}", name, self.temp_counter).into()
    }

    /// Every realization produced so far, in the order it was produced
    pub fn realizations(&self) -> &[Realization] {
        &self.queue
    }

    pub(crate) fn queue_realization(&mut self, realization: Realization) {
        crate::tycheck_debug!("queued realization {}", realization.name);
        self.queue.push(realization);
    }

    /// Finds a function realization by realized name
    pub fn function_realization(&self, name: &str) -> Option<&FunctionRealization> {
        self.functions.values().find_map(|info| info.realizations.get(name))
    }

    pub fn class_realization(&self, name: &str) -> Option<&ClassRealization> {
        self.classes.values().find_map(|info| info.realizations.get(name))
    }

    /// The method overload root for a member of a class or any of its parents
    pub fn find_method(&self, class: &str, member: &str) -> Option<Arc<str>> {
        let info = self.classes.get(class)?;
        info.mro.iter()
            .filter_map(|name| self.classes.get(name))
            .find_map(|cls| cls.methods.get(member).cloned())
    }

    /// The canonical names of every overload of a method, in declaration order
    pub fn method_overloads(&self, class: &str, member: &str) -> Vec<Arc<str>> {
        self.find_method(class, member)
            .and_then(|root| self.overloads.get(&root).cloned())
            .unwrap_or_default()
    }
}
