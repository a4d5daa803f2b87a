//! Hand-written overrides consulted before generic dispatch
//!
//! Some server calls need side effects a plain registry call cannot express:
//! name templating, world view suspension around the race menu, and item
//! pickup feedback. The table is closed; anything it does not claim goes
//! through [`CallDispatcher`] unchanged.

use crate::dispatcher::CallDispatcher;
use crate::error::{DispatchError, DispatchResult};
use crate::host::{HostEnvironment, Instance, LocalId, RemoteId, Value};
use crate::service::LOG_TARGET;
use crate::world::{GOLD_FORM_ID, GOLD_SOUND_ID, PICKUP_SOUND_ID};
use log::{error, trace};
use shared::{SpSnippet, WireValue};
use std::rc::Rc;
use std::time::Duration;

pub const ORIGINAL_NAME_PLACEHOLDER: &str = "%original_name%";

/// Real time to wait before opening the race menu.
const RACE_MENU_DELAY: Duration = Duration::from_secs(1);

/// Game time to wait after opening the race menu before the world view resumes.
const RACE_MENU_RESUME_GAME_TIME: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HackKind {
    AddItem,
    RemoveItem,
}

impl HackKind {
    pub fn sign(&self) -> &'static str {
        match self {
            HackKind::AddItem => "+",
            HackKind::RemoveItem => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    SetDisplayName,
    ShowRaceMenu,
    SkympHack(HackKind),
}

#[derive(Debug, Clone, Copy)]
struct OverrideEntry {
    class: &'static str,
    function: &'static str,
    builtin: Builtin,
}

/// Case-insensitive `(class, function)` → override mapping.
#[derive(Debug, Clone)]
pub struct OverrideTable {
    entries: Vec<OverrideEntry>,
    /// Pseudo-classes with no registry entry; unknown functions under them are errors.
    closed_classes: Vec<&'static str>,
}

impl OverrideTable {
    pub fn standard() -> Self {
        let entry = |class, function, builtin| OverrideEntry {
            class,
            function,
            builtin,
        };

        Self {
            entries: vec![
                entry("ObjectReference", "SetDisplayName", Builtin::SetDisplayName),
                entry("Game", "ShowRaceMenu", Builtin::ShowRaceMenu),
                entry("Game", "ShowLimitedRaceMenu", Builtin::ShowRaceMenu),
                entry("SkympHacks", "AddItem", Builtin::SkympHack(HackKind::AddItem)),
                entry("SkympHacks", "RemoveItem", Builtin::SkympHack(HackKind::RemoveItem)),
            ],
            closed_classes: vec!["SkympHacks"],
        }
    }

    /// A table that claims nothing; every snippet goes to generic dispatch.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            closed_classes: Vec::new(),
        }
    }

    pub fn lookup(&self, class: &str, function: &str) -> DispatchResult<Option<Builtin>> {
        let found = self
            .entries
            .iter()
            .find(|entry| {
                entry.class.eq_ignore_ascii_case(class)
                    && entry.function.eq_ignore_ascii_case(function)
            })
            .map(|entry| entry.builtin);

        if found.is_none()
            && self
                .closed_classes
                .iter()
                .any(|closed| closed.eq_ignore_ascii_case(class))
        {
            return Err(DispatchError::UnknownBuiltin {
                function: function.to_string(),
            });
        }

        Ok(found)
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// What the front door should do after the override table has seen a snippet.
#[derive(Debug)]
pub enum Interception {
    /// Continue with generic dispatch, possibly with rewritten arguments.
    Continue(SpSnippet),
    /// The override produced the result itself.
    Finished(Value),
}

pub struct Overrides {
    table: OverrideTable,
    dispatcher: Rc<CallDispatcher>,
    host: HostEnvironment,
}

impl Overrides {
    pub fn new(table: OverrideTable, dispatcher: Rc<CallDispatcher>, host: HostEnvironment) -> Self {
        Self {
            table,
            dispatcher,
            host,
        }
    }

    pub fn dispatcher(&self) -> &Rc<CallDispatcher> {
        &self.dispatcher
    }

    pub fn intercept(&self, snippet: SpSnippet) -> DispatchResult<Interception> {
        match self.table.lookup(&snippet.class, &snippet.function)? {
            None => Ok(Interception::Continue(snippet)),
            Some(Builtin::SetDisplayName) => {
                Ok(Interception::Continue(self.set_display_name(snippet)))
            }
            Some(Builtin::ShowRaceMenu) => {
                self.show_race_menu(snippet);
                Ok(Interception::Finished(Value::Undefined))
            }
            Some(Builtin::SkympHack(kind)) => {
                self.run_hack(kind, &snippet)?;
                Ok(Interception::Finished(Value::Undefined))
            }
        }
    }

    /// Substitutes the base object's name into the new display name.
    fn set_display_name(&self, mut snippet: SpSnippet) -> SpSnippet {
        let new_name = match snippet.arguments.first() {
            Some(WireValue::String(name)) => name.clone(),
            other => {
                error!(
                    target: LOG_TARGET,
                    "Encountered SetDisplayName with non-string argument {:?}", other
                );
                return snippet;
            }
        };

        match self.original_name(snippet.self_id) {
            Some(original) => {
                snippet.arguments[0] =
                    WireValue::String(new_name.replace(ORIGINAL_NAME_PLACEHOLDER, &original));
            }
            None => {
                let self_id = snippet
                    .self_id
                    .map(|id| format!("{:x}", id))
                    .unwrap_or_else(|| "missing".to_string());
                error!(
                    target: LOG_TARGET,
                    "Couldn't get a replaceValue for SetDisplayName, snippet.selfId was {}",
                    self_id
                );
            }
        }

        snippet
    }

    fn original_name(&self, self_id: Option<u32>) -> Option<String> {
        let form = self
            .dispatcher
            .translator()
            .resolve_form(RemoteId(self_id?))
            .ok()?;
        let reference = self
            .dispatcher
            .registry()
            .resolve("ObjectReference")?
            .cast(&form)?;

        reference.form().base_object().map(|base| base.name())
    }

    /// Suspends the world view and opens the race menu from a detached task.
    ///
    /// Two overlapping calls may interleave their suspend and resume; the
    /// second resume wins.
    fn show_race_menu(&self, snippet: SpSnippet) {
        trace!(target: LOG_TARGET, "showracemenu called");
        self.host.presentation.set_form_view_update_allowed(false);

        let dispatcher = Rc::clone(&self.dispatcher);
        let host = self.host.clone();

        trace!(target: LOG_TARGET, "Waiting {:?} before calling showracemenu", RACE_MENU_DELAY);
        tokio::task::spawn_local(async move {
            host.scheduler.wait(RACE_MENU_DELAY).await;

            if let Err(e) = dispatcher.run_static(&snippet).await {
                error!(
                    target: LOG_TARGET,
                    "SpSnippet {} {} failed {}", snippet.class, snippet.function, e
                );
            }

            host.presentation
                .allow_form_view_update_after(RACE_MENU_RESUME_GAME_TIME);
        });
    }

    fn run_hack(&self, kind: HackKind, snippet: &SpSnippet) -> DispatchResult<()> {
        let item = match snippet.arguments.first() {
            Some(WireValue::Object(descriptor)) => {
                self.dispatcher.translator().translate_object(descriptor)?
            }
            Some(other) => {
                return Err(DispatchError::invalid_argument(
                    &snippet.function,
                    0,
                    format!("expected object reference, got {:?}", other),
                ))
            }
            None => {
                return Err(DispatchError::invalid_argument(
                    &snippet.function,
                    0,
                    "missing item",
                ))
            }
        };

        let name = item.form().name();
        let has_name = !name.trim().is_empty();

        let sound_id = if item.form_id() == LocalId(GOLD_FORM_ID) {
            GOLD_SOUND_ID
        } else {
            PICKUP_SOUND_ID
        };

        match self.find_sound(sound_id) {
            Some(_) if !has_name => {
                trace!(target: LOG_TARGET, "Sound will not be played because item has no name");
            }
            Some(sound) => self.host.feedback.play_sound(&sound),
            None => {
                error!(target: LOG_TARGET, "Unable to find sound with id {:x}", sound_id);
            }
        }

        match snippet.arguments.get(1) {
            Some(WireValue::Number(count)) if *count > 0.0 => {
                let text = format!("{} {} ({})", kind.sign(), name, count);
                if has_name {
                    self.host.feedback.notification(&text);
                } else {
                    trace!(
                        target: LOG_TARGET,
                        "Notification will not be shown because item has no name"
                    );
                }
                trace!(target: LOG_TARGET, "{}", text);
            }
            Some(WireValue::Number(count)) => {
                error!(target: LOG_TARGET, "Positive count expected, got {}", count);
            }
            other => {
                error!(target: LOG_TARGET, "Positive count expected, got {:?}", other);
            }
        }

        Ok(())
    }

    fn find_sound(&self, sound_id: u32) -> Option<Instance> {
        let form = self.host.objects.lookup(LocalId(sound_id))?;
        self.dispatcher.registry().resolve("Sound")?.cast(&form)
    }
}
