//! Values and collaborator interfaces exposed by the local game runtime
//!
//! The dispatcher never talks to the game directly. Everything it needs from
//! the runtime (object lookup, id translation, world view, timers, audio and
//! notifications) comes through the traits in this module, bundled into a
//! [`HostEnvironment`] that is handed over at construction time.

use futures::future::LocalBoxFuture;
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Object handle assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteId(pub u32);

/// Object handle valid in the local runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// A live object owned by the game runtime.
pub trait GameObject: fmt::Debug {
    fn form_id(&self) -> LocalId;

    /// Runtime type name, used for casts and diagnostics.
    fn form_type(&self) -> &str;

    fn name(&self) -> String;

    /// The base form this object was instantiated from, if any.
    fn base_object(&self) -> Option<FormRef>;

    fn as_any(&self) -> &dyn Any;
}

pub type FormRef = Rc<dyn GameObject>;

/// A live object bound to the capability it was successfully cast to.
#[derive(Debug, Clone)]
pub struct Instance {
    capability: String,
    form: FormRef,
}

impl Instance {
    pub fn new(capability: &str, form: FormRef) -> Self {
        Self {
            capability: capability.to_string(),
            form,
        }
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn form(&self) -> &FormRef {
        &self.form
    }

    pub fn form_id(&self) -> LocalId {
        self.form.form_id()
    }

    /// Borrows the concrete object behind the handle.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.form.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.capability == other.capability && self.form.form_id() == other.form.form_id()
    }
}

/// A value that can be handed to, or returned from, a host member.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Number(f64),
    String(String),
    Bool(bool),
    Form(Instance),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Form(_) => "form",
            Value::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Form(instance) => Some(instance),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Value::Form(value)
    }
}

pub trait IdentityTranslator {
    fn remote_to_local(&self, remote: RemoteId) -> Option<LocalId>;
}

pub trait ObjectIndex {
    fn lookup(&self, id: LocalId) -> Option<FormRef>;
}

/// The view layer that mirrors server state onto local forms.
pub trait Presentation {
    fn set_form_view_update_allowed(&self, allowed: bool);

    /// Re-enables form view updates once `game_time` has passed on the game clock.
    fn allow_form_view_update_after(&self, game_time: Duration);
}

/// Frame-driven scheduling primitives.
pub trait Scheduler {
    /// Queues `task` to start at the next frame boundary, never synchronously.
    fn once_next_tick(&self, task: LocalBoxFuture<'static, ()>);

    /// Resolves after `duration` of real time.
    fn wait(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}

/// Audio and on-screen feedback shown to the local player.
pub trait Feedback {
    fn play_sound(&self, sound: &Instance);

    fn notification(&self, text: &str);
}

/// Every runtime collaborator the dispatcher depends on.
#[derive(Clone)]
pub struct HostEnvironment {
    pub identity: Rc<dyn IdentityTranslator>,
    pub objects: Rc<dyn ObjectIndex>,
    pub presentation: Rc<dyn Presentation>,
    pub scheduler: Rc<dyn Scheduler>,
    pub feedback: Rc<dyn Feedback>,
}
