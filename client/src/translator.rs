//! Wire argument translation
//!
//! Turns wire values into values host members can consume. Object references
//! are resolved against the live world and cast to their declared class;
//! every step fails closed.

use crate::error::{DispatchError, DispatchResult};
use crate::host::{FormRef, IdentityTranslator, Instance, ObjectIndex, RemoteId, Value};
use crate::registry::CapabilityRegistry;
use shared::{ObjectReferenceDescriptor, WireValue};
use std::rc::Rc;

pub struct ArgumentTranslator {
    registry: Rc<CapabilityRegistry>,
    identity: Rc<dyn IdentityTranslator>,
    objects: Rc<dyn ObjectIndex>,
}

impl ArgumentTranslator {
    pub fn new(
        registry: Rc<CapabilityRegistry>,
        identity: Rc<dyn IdentityTranslator>,
        objects: Rc<dyn ObjectIndex>,
    ) -> Self {
        Self {
            registry,
            identity,
            objects,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn translate(&self, value: &WireValue) -> DispatchResult<Value> {
        match value {
            WireValue::Null => Ok(Value::Null),
            WireValue::Number(n) => Ok(Value::Number(*n)),
            WireValue::String(s) => Ok(Value::String(s.clone())),
            WireValue::Bool(b) => Ok(Value::Bool(*b)),
            WireValue::Object(descriptor) => self.translate_object(descriptor).map(Value::Form),
        }
    }

    /// Translates every argument in order, stopping at the first failure.
    pub fn translate_all(&self, values: &[WireValue]) -> DispatchResult<Vec<Value>> {
        values.iter().map(|value| self.translate(value)).collect()
    }

    pub fn translate_object(
        &self,
        descriptor: &ObjectReferenceDescriptor,
    ) -> DispatchResult<Instance> {
        let form = self.resolve_form(RemoteId(descriptor.form_id))?;
        self.registry.cast(&descriptor.type_name, &form)
    }

    /// Maps a server handle to the live local object behind it.
    pub fn resolve_form(&self, remote: RemoteId) -> DispatchResult<FormRef> {
        let local = self
            .identity
            .remote_to_local(remote)
            .ok_or(DispatchError::UnmappedHandle {
                remote_id: remote.0,
            })?;

        self.objects
            .lookup(local)
            .ok_or(DispatchError::FormNotFound { form_id: local.0 })
    }
}
