//! In-memory game world hosting the snippet dispatcher
//!
//! This module provides the local side of everything the dispatcher treats as
//! an external collaborator:
//! - Form storage and the remote → local id mapping for server-created objects
//! - The world view whose form updates can be suspended and resumed on the game clock
//! - Audio and notification feedback shown to the player
//! - The standard capability surface (`Game`, `Debug`, `Utility`, `Form`,
//!   `ObjectReference`, `Actor`, `Sound`) snippets are resolved against

use crate::error::DispatchError;
use crate::host::{
    Feedback, FormRef, GameObject, IdentityTranslator, Instance, LocalId, ObjectIndex,
    Presentation, RemoteId, Value,
};
use crate::registry::{Capability, CapabilityRegistry, Param};
use futures::future::ready;
use log::{debug, info};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

pub const PLAYER_FORM_ID: u32 = 0x14;
pub const GOLD_FORM_ID: u32 = 0xf;
pub const GOLD_SOUND_ID: u32 = 0x334ab;
pub const PICKUP_SOUND_ID: u32 = 0x14115;

/// Ids at or above this value are created by the server and need translation.
pub const SERVER_ID_BASE: u32 = 0xff00_0000;

/// Local ids handed to references spawned on behalf of the server.
const LOCAL_DYNAMIC_ID_BASE: u32 = 0xff00_0800;

/// Game seconds per real second.
pub const DEFAULT_TIMESCALE: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Actor,
    Reference,
    Weapon,
    Misc,
    Sound,
}

impl FormKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Actor => "Actor",
            FormKind::Reference => "ObjectReference",
            FormKind::Weapon => "Weapon",
            FormKind::Misc => "MiscObject",
            FormKind::Sound => "Sound",
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FormKind::Actor | FormKind::Reference)
    }
}

/// A base form or placed reference living in the local world.
#[derive(Debug)]
pub struct WorldForm {
    id: LocalId,
    kind: FormKind,
    name: String,
    display_name: RefCell<Option<String>>,
    base: Option<Rc<WorldForm>>,
}

impl WorldForm {
    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn base(&self) -> Option<&Rc<WorldForm>> {
        self.base.as_ref()
    }

    /// Name shown for a reference: its own display name, falling back to the base name.
    pub fn display_name(&self) -> String {
        self.display_name
            .borrow()
            .clone()
            .unwrap_or_else(|| self.name())
    }

    pub fn set_display_name(&self, name: &str) {
        *self.display_name.borrow_mut() = Some(name.to_string());
    }
}

impl GameObject for WorldForm {
    fn form_id(&self) -> LocalId {
        self.id
    }

    fn form_type(&self) -> &str {
        self.kind.as_str()
    }

    fn name(&self) -> String {
        match &self.base {
            Some(base) if self.name.is_empty() => base.name(),
            _ => self.name.clone(),
        }
    }

    fn base_object(&self) -> Option<FormRef> {
        self.base.clone().map(|base| base as FormRef)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Mirrors server state onto local forms unless updates are suspended.
pub struct WorldView {
    update_allowed: Rc<Cell<bool>>,
    timescale: f32,
}

impl WorldView {
    pub fn new(timescale: f32) -> Self {
        let timescale = if timescale > 0.0 {
            timescale
        } else {
            DEFAULT_TIMESCALE
        };

        Self {
            update_allowed: Rc::new(Cell::new(true)),
            timescale,
        }
    }

    pub fn is_form_view_update_allowed(&self) -> bool {
        self.update_allowed.get()
    }

    pub fn timescale(&self) -> f32 {
        self.timescale
    }

    /// Converts a span of game time into the real time it takes to pass.
    pub fn game_to_real(&self, game_time: Duration) -> Duration {
        game_time.div_f32(self.timescale)
    }
}

impl Presentation for WorldView {
    fn set_form_view_update_allowed(&self, allowed: bool) {
        debug!("Form view updates allowed: {}", allowed);
        self.update_allowed.set(allowed);
    }

    fn allow_form_view_update_after(&self, game_time: Duration) {
        let allowed = Rc::clone(&self.update_allowed);
        let delay = self.game_to_real(game_time);

        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            debug!("Form view updates allowed: true");
            allowed.set(true);
        });
    }
}

pub struct LocalWorld {
    forms: RefCell<HashMap<LocalId, Rc<WorldForm>>>,
    remote_ids: RefCell<HashMap<RemoteId, LocalId>>,
    next_local_id: Cell<u32>,
    view: WorldView,
    notifications: RefCell<Vec<String>>,
    sounds_played: RefCell<Vec<LocalId>>,
    race_menus_shown: Cell<u32>,
}

impl LocalWorld {
    /// Creates a world seeded with the player, gold and the item pickup sounds.
    pub fn new(timescale: f32) -> Self {
        let world = Self {
            forms: RefCell::new(HashMap::new()),
            remote_ids: RefCell::new(HashMap::new()),
            next_local_id: Cell::new(LOCAL_DYNAMIC_ID_BASE),
            view: WorldView::new(timescale),
            notifications: RefCell::new(Vec::new()),
            sounds_played: RefCell::new(Vec::new()),
            race_menus_shown: Cell::new(0),
        };

        world.add_form(LocalId(PLAYER_FORM_ID), FormKind::Actor, "Prisoner");
        world.add_form(LocalId(GOLD_FORM_ID), FormKind::Misc, "Gold");
        world.add_form(LocalId(GOLD_SOUND_ID), FormKind::Sound, "");
        world.add_form(LocalId(PICKUP_SOUND_ID), FormKind::Sound, "");
        world
    }

    /// Adds a form whose id is identical on the server and the client.
    pub fn add_form(&self, id: LocalId, kind: FormKind, name: &str) -> Rc<WorldForm> {
        let form = Rc::new(WorldForm {
            id,
            kind,
            name: name.to_string(),
            display_name: RefCell::new(None),
            base: None,
        });
        self.forms.borrow_mut().insert(id, Rc::clone(&form));
        form
    }

    /// Places a reference for a server-created object and maps its remote id.
    pub fn spawn_reference(
        &self,
        remote: RemoteId,
        kind: FormKind,
        base: Option<&Rc<WorldForm>>,
    ) -> Rc<WorldForm> {
        let id = LocalId(self.next_local_id.get());
        self.next_local_id.set(id.0 + 1);

        let form = Rc::new(WorldForm {
            id,
            kind,
            name: String::new(),
            display_name: RefCell::new(None),
            base: base.cloned(),
        });

        self.forms.borrow_mut().insert(id, Rc::clone(&form));
        self.remote_ids.borrow_mut().insert(remote, id);
        debug!("Spawned reference {} for remote {}", id, remote);
        form
    }

    pub fn despawn(&self, remote: RemoteId) -> bool {
        match self.remote_ids.borrow_mut().remove(&remote) {
            Some(id) => self.forms.borrow_mut().remove(&id).is_some(),
            None => false,
        }
    }

    /// Maps the server's actor for this user onto the local player.
    pub fn set_player_remote_id(&self, remote: RemoteId) {
        self.remote_ids
            .borrow_mut()
            .insert(remote, LocalId(PLAYER_FORM_ID));
    }

    pub fn form(&self, id: LocalId) -> Option<Rc<WorldForm>> {
        self.forms.borrow().get(&id).cloned()
    }

    pub fn player(&self) -> Option<Rc<WorldForm>> {
        self.form(LocalId(PLAYER_FORM_ID))
    }

    pub fn view(&self) -> &WorldView {
        &self.view
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.borrow().clone()
    }

    pub fn sounds_played(&self) -> Vec<LocalId> {
        self.sounds_played.borrow().clone()
    }

    pub fn race_menus_shown(&self) -> u32 {
        self.race_menus_shown.get()
    }

    fn show_race_menu(&self) {
        self.race_menus_shown.set(self.race_menus_shown.get() + 1);
        info!("Race menu opened");
    }
}

impl IdentityTranslator for LocalWorld {
    fn remote_to_local(&self, remote: RemoteId) -> Option<LocalId> {
        if remote.0 < SERVER_ID_BASE {
            return Some(LocalId(remote.0));
        }
        self.remote_ids.borrow().get(&remote).copied()
    }
}

impl ObjectIndex for LocalWorld {
    fn lookup(&self, id: LocalId) -> Option<FormRef> {
        self.form(id).map(|form| form as FormRef)
    }
}

impl Presentation for LocalWorld {
    fn set_form_view_update_allowed(&self, allowed: bool) {
        self.view.set_form_view_update_allowed(allowed);
    }

    fn allow_form_view_update_after(&self, game_time: Duration) {
        self.view.allow_form_view_update_after(game_time);
    }
}

impl Feedback for LocalWorld {
    fn play_sound(&self, sound: &Instance) {
        debug!("Playing sound {}", sound.form_id());
        self.sounds_played.borrow_mut().push(sound.form_id());
    }

    fn notification(&self, text: &str) {
        info!("Notification: {}", text);
        self.notifications.borrow_mut().push(text.to_string());
    }
}

fn world_form(this: &Instance) -> Option<&WorldForm> {
    this.downcast_ref::<WorldForm>()
}

fn form_value(capability: &str, form: Option<FormRef>) -> Value {
    match form {
        Some(form) => Value::Form(Instance::new(capability, form)),
        None => Value::Null,
    }
}

/// ObjectReference members, shared by every capability that casts to a reference.
fn with_reference_methods(capability: Capability) -> Capability {
    capability
        .method("GetDisplayName", &[], |this, _| {
            let name = world_form(&this).map(|form| form.display_name());
            ready(Ok(name.map(Value::String).unwrap_or(Value::Null)))
        })
        .method("SetDisplayName", &[Param::String], |this, args| {
            let renamed = match (world_form(&this), args[0].as_str()) {
                (Some(form), Some(name)) => {
                    form.set_display_name(name);
                    true
                }
                _ => false,
            };
            ready(Ok(Value::Bool(renamed)))
        })
        .method("GetBaseObject", &[], |this, _| {
            ready(Ok(form_value("Form", this.form().base_object())))
        })
}

/// Builds the capability surface exposed to the server.
pub fn standard_registry(world: &Rc<LocalWorld>) -> CapabilityRegistry {
    let game = {
        let player_world = Rc::clone(world);
        let lookup_world = Rc::clone(world);
        let menu_world = Rc::clone(world);
        let limited_menu_world = Rc::clone(world);

        Capability::static_only("Game")
            .function("GetPlayer", &[], move |_| {
                ready(Ok(form_value("Actor", player_world.lookup(LocalId(PLAYER_FORM_ID)))))
            })
            .function("GetFormEx", &[Param::Number], move |args| {
                let id = args[0].as_number().unwrap_or(0.0) as u32;
                ready(Ok(form_value("Form", lookup_world.lookup(LocalId(id)))))
            })
            .function("ShowRaceMenu", &[], move |_| {
                menu_world.show_race_menu();
                ready(Ok(Value::Undefined))
            })
            .function("ShowLimitedRaceMenu", &[], move |_| {
                limited_menu_world.show_race_menu();
                ready(Ok(Value::Undefined))
            })
    };

    let debug = {
        let notify_world = Rc::clone(world);

        Capability::static_only("Debug")
            .function("Notification", &[Param::String], move |args| {
                notify_world.notification(args[0].as_str().unwrap_or_default());
                ready(Ok(Value::Undefined))
            })
            .function("Trace", &[Param::String], |args| {
                info!("Papyrus trace: {}", args[0].as_str().unwrap_or_default());
                ready(Ok(Value::Undefined))
            })
    };

    let utility = Capability::static_only("Utility").function(
        "Wait",
        &[Param::Number],
        |args| async move {
            let seconds = args[0].as_number().unwrap_or(0.0).max(0.0);
            let duration = match Duration::try_from_secs_f64(seconds) {
                Ok(duration) => duration,
                Err(e) => return Err(DispatchError::invalid_argument("Wait", 0, e.to_string())),
            };
            tokio::time::sleep(duration).await;
            Ok(Value::Undefined)
        },
    );

    let form = Capability::instantiable("Form", |_| true)
        .method("GetFormID", &[], |this, _| {
            ready(Ok(Value::Number(this.form_id().0 as f64)))
        })
        .method("GetName", &[], |this, _| ready(Ok(Value::String(this.form().name()))))
        .method("GetType", &[], |this, _| {
            ready(Ok(Value::String(this.form().form_type().to_string())))
        });

    let object_reference = with_reference_methods(Capability::instantiable(
        "ObjectReference",
        |form| is_kind(form, FormKind::is_reference),
    ));

    let actor = with_reference_methods(Capability::instantiable("Actor", |form| {
        is_kind(form, |kind| *kind == FormKind::Actor)
    }))
    .method("IsPlayer", &[], |this, _| {
        ready(Ok(Value::Bool(this.form_id() == LocalId(PLAYER_FORM_ID))))
    });

    let sound = {
        let sound_world = Rc::clone(world);

        Capability::instantiable("Sound", |form| {
            is_kind(form, |kind| *kind == FormKind::Sound)
        })
        .method("Play", &[Param::Form], move |this, _| {
            sound_world.play_sound(&this);
            let played = sound_world.sounds_played.borrow().len();
            ready(Ok(Value::Number(played as f64)))
        })
    };

    CapabilityRegistry::new()
        .with(game)
        .with(debug)
        .with(utility)
        .with(form)
        .with(object_reference)
        .with(actor)
        .with(sound)
}

fn is_kind(form: &FormRef, accepts: impl Fn(&FormKind) -> bool) -> bool {
    form.as_any()
        .downcast_ref::<WorldForm>()
        .map(|form| accepts(&form.kind))
        .unwrap_or(false)
}
