//! Capability registry: the named API surface snippets are resolved against
//!
//! A capability is either a static-only grouping (`Game`, `Debug`) or a type
//! that live objects can be cast to (`Form`, `ObjectReference`). Class names
//! resolve case-insensitively, member names are matched exactly.

use crate::error::{DispatchError, DispatchResult};
use crate::host::{FormRef, Instance, Value};
use futures::future::{FutureExt, LocalBoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

pub type CallResult = DispatchResult<Value>;
pub type StaticFn = Rc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, CallResult>>;
pub type MethodFn = Rc<dyn Fn(Instance, Vec<Value>) -> LocalBoxFuture<'static, CallResult>>;
pub type CastFn = Rc<dyn Fn(&FormRef) -> bool>;

/// Declared shape of a single member parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Any,
    Number,
    String,
    Bool,
    Form,
}

impl Param {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Param::Any => true,
            Param::Number => matches!(value, Value::Number(_)),
            Param::String => matches!(value, Value::String(_)),
            Param::Bool => matches!(value, Value::Bool(_)),
            // Papyrus lets None stand in for any object parameter
            Param::Form => matches!(value, Value::Form(_) | Value::Null),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Param::Any => "any",
            Param::Number => "number",
            Param::String => "string",
            Param::Bool => "boolean",
            Param::Form => "form",
        }
    }
}

/// A callable member together with its declared parameters.
pub struct Member<F> {
    params: Vec<Param>,
    call: F,
}

impl<F> Member<F> {
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Validates translated arguments against the declared parameters.
    pub fn check_arguments(&self, function: &str, args: &[Value]) -> DispatchResult<()> {
        if args.len() != self.params.len() {
            return Err(DispatchError::invalid_argument(
                function,
                args.len().min(self.params.len()),
                format!(
                    "expected {} arguments, got {}",
                    self.params.len(),
                    args.len()
                ),
            ));
        }

        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if !param.accepts(arg) {
                return Err(DispatchError::invalid_argument(
                    function,
                    index,
                    format!("expected {}, got {}", param.describe(), arg.type_name()),
                ));
            }
        }

        Ok(())
    }
}

impl Member<StaticFn> {
    pub fn invoke(&self, args: Vec<Value>) -> LocalBoxFuture<'static, CallResult> {
        (self.call)(args)
    }
}

impl Member<MethodFn> {
    pub fn invoke(&self, this: Instance, args: Vec<Value>) -> LocalBoxFuture<'static, CallResult> {
        (self.call)(this, args)
    }
}

pub enum CapabilityKind {
    StaticOnly,
    Instantiable(CastFn),
}

pub struct Capability {
    name: String,
    kind: CapabilityKind,
    functions: HashMap<String, Member<StaticFn>>,
    methods: HashMap<String, Member<MethodFn>>,
}

impl Capability {
    pub fn static_only(name: &str) -> Self {
        Self::with_kind(name, CapabilityKind::StaticOnly)
    }

    /// A capability live objects can be cast to when `cast` accepts them.
    pub fn instantiable<C>(name: &str, cast: C) -> Self
    where
        C: Fn(&FormRef) -> bool + 'static,
    {
        Self::with_kind(name, CapabilityKind::Instantiable(Rc::new(cast)))
    }

    fn with_kind(name: &str, kind: CapabilityKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            functions: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    /// Adds a static function.
    pub fn function<F, Fut>(mut self, name: &str, params: &[Param], f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = CallResult> + 'static,
    {
        let call: StaticFn = Rc::new(
            move |args: Vec<Value>| -> LocalBoxFuture<'static, CallResult> { f(args).boxed_local() },
        );
        self.functions.insert(
            name.to_string(),
            Member {
                params: params.to_vec(),
                call,
            },
        );
        self
    }

    /// Adds a method invoked on a cast instance.
    pub fn method<F, Fut>(mut self, name: &str, params: &[Param], f: F) -> Self
    where
        F: Fn(Instance, Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = CallResult> + 'static,
    {
        let call: MethodFn = Rc::new(
            move |this: Instance, args: Vec<Value>| -> LocalBoxFuture<'static, CallResult> {
                f(this, args).boxed_local()
            },
        );
        self.methods.insert(
            name.to_string(),
            Member {
                params: params.to_vec(),
                call,
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_instantiable(&self) -> bool {
        matches!(self.kind, CapabilityKind::Instantiable(_))
    }

    /// Casts `form` to this capability; static-only capabilities never accept a cast.
    pub fn cast(&self, form: &FormRef) -> Option<Instance> {
        match &self.kind {
            CapabilityKind::Instantiable(accepts) if accepts(form) => {
                Some(Instance::new(&self.name, form.clone()))
            }
            _ => None,
        }
    }

    pub fn find_function(&self, name: &str) -> Option<&Member<StaticFn>> {
        self.functions.get(name)
    }

    pub fn find_method(&self, name: &str) -> Option<&Member<MethodFn>> {
        self.methods.get(name)
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        let mut methods: Vec<&String> = self.methods.keys().collect();
        functions.sort();
        methods.sort();

        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("instantiable", &self.is_instantiable())
            .field("functions", &functions)
            .field("methods", &methods)
            .finish()
    }
}

/// Immutable, startup-built mapping from class name to capability.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Capability>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability, replacing any previous one whose name differs only in case.
    pub fn register(&mut self, capability: Capability) {
        self.capabilities
            .insert(capability.name.to_lowercase(), capability);
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.register(capability);
        self
    }

    pub fn resolve(&self, class: &str) -> Option<&Capability> {
        self.capabilities.get(&class.to_lowercase())
    }

    pub fn require(&self, class: &str) -> DispatchResult<&Capability> {
        self.resolve(class)
            .ok_or_else(|| DispatchError::ClassNotFound {
                class: class.to_string(),
            })
    }

    /// Casts `form` to `class`, reporting the form's actual type on failure.
    pub fn cast(&self, class: &str, form: &FormRef) -> DispatchResult<Instance> {
        self.require(class)?
            .cast(form)
            .ok_or_else(|| DispatchError::TypeMismatch {
                form_id: form.form_id().0,
                class: class.to_string(),
                actual: form.form_type().to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
