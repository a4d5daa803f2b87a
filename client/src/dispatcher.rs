//! Generic snippet dispatch against the capability registry

use crate::error::{DispatchError, DispatchResult};
use crate::host::{RemoteId, Value};
use crate::registry::{CallResult, CapabilityRegistry};
use crate::translator::ArgumentTranslator;
use shared::SpSnippet;
use std::rc::Rc;

/// Resolves a snippet to a registry member and awaits the call.
///
/// Snippets carrying a `self_id` are dispatched as instance methods on the
/// referenced object, everything else as a static function of `class`.
pub struct CallDispatcher {
    registry: Rc<CapabilityRegistry>,
    translator: ArgumentTranslator,
}

impl CallDispatcher {
    pub fn new(registry: Rc<CapabilityRegistry>, translator: ArgumentTranslator) -> Self {
        Self {
            registry,
            translator,
        }
    }

    pub fn translator(&self) -> &ArgumentTranslator {
        &self.translator
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, snippet: &SpSnippet) -> CallResult {
        match snippet.self_id {
            Some(self_id) => self.run_method(snippet, RemoteId(self_id)).await,
            None => self.run_static(snippet).await,
        }
    }

    pub async fn run_static(&self, snippet: &SpSnippet) -> CallResult {
        let capability = self.registry.require(&snippet.class)?;
        let function = capability.find_function(&snippet.function).ok_or_else(|| {
            DispatchError::MemberNotFound {
                class: capability.name().to_string(),
                function: snippet.function.clone(),
            }
        })?;

        let args = self.translate_arguments(snippet)?;
        function.check_arguments(&snippet.function, &args)?;

        function.invoke(args).await
    }

    pub async fn run_method(&self, snippet: &SpSnippet, self_id: RemoteId) -> CallResult {
        // The target must exist before any argument is looked at
        let this = self.translator.resolve_form(self_id)?;
        let this = self.registry.cast(&snippet.class, &this)?;

        let capability = self.registry.require(this.capability())?;
        let method = capability.find_method(&snippet.function).ok_or_else(|| {
            DispatchError::MemberNotFound {
                class: capability.name().to_string(),
                function: snippet.function.clone(),
            }
        })?;

        let args = self.translate_arguments(snippet)?;
        method.check_arguments(&snippet.function, &args)?;

        method.invoke(this, args).await
    }

    fn translate_arguments(&self, snippet: &SpSnippet) -> DispatchResult<Vec<Value>> {
        self.translator.translate_all(&snippet.arguments)
    }
}
