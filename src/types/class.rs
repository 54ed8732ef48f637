use std::sync::Arc;

use super::TypeId;

/// A generic parameter of a class or function, together with the type currently filling it
#[derive(Debug, Clone, PartialEq)]
pub struct Generic {
    /// Canonical name
    pub name: Arc<str>,
    /// Name as written by the user
    pub nice_name: Arc<str>,
    /// Id of the type variable this generic was declared with
    pub id: usize,
    pub ty: TypeId,
    pub is_static: bool,
}

/// A nominal type
#[derive(Debug, Clone, PartialEq)]
pub struct ClassType {
    pub name: Arc<str>,
    pub nice_name: Arc<str>,
    pub generics: Vec<Generic>,
    /// Generics that are not part of the user-visible signature
    pub hidden_generics: Vec<Generic>,
    /// Records have value semantics. Every other class is a reference type.
    pub is_record: bool,
}

impl ClassType {
    /// A reference class without generics
    pub fn simple(name: &str) -> Self {
        Self {
            name: name.into(),
            nice_name: name.into(),
            generics: Vec::new(),
            hidden_generics: Vec::new(),
            is_record: false,
        }
    }

    pub fn all_generics(&self) -> impl Iterator<Item=&Generic> {
        self.generics.iter().chain(&self.hidden_generics)
    }

    pub fn generic(&self, name: &str) -> Option<&Generic> {
        self.all_generics().find(|g| &*g.name == name || &*g.nice_name == name)
    }
}
