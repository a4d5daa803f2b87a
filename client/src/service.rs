//! Front door for snippets received from the server
//!
//! Every snippet is deferred to the next frame tick so that object lookups see
//! a settled world, then runs through the override table, generic dispatch
//! and the response encoder. This is the only place failures are handled:
//! they are logged and the snippet ends without a response.

use crate::builtins::{Interception, OverrideTable, Overrides};
use crate::dispatcher::CallDispatcher;
use crate::error::DispatchError;
use crate::host::HostEnvironment;
use crate::registry::{CallResult, CapabilityRegistry};
use crate::response::{encode_result, Outgoing, ResponseEncoder};
use crate::translator::ArgumentTranslator;
use futures::future::FutureExt;
use log::{debug, error};
use shared::{FinishSpSnippet, SpSnippet};
use std::rc::Rc;
use tokio::sync::mpsc;

pub const LOG_TARGET: &str = "SpSnippetService";

/// How the front door finished a snippet.
#[derive(Debug, Clone, PartialEq)]
pub enum SnippetOutcome {
    Sent(FinishSpSnippet),
    /// Fire-and-forget snippet; whatever it produced was discarded.
    Suppressed,
    /// The call succeeded but its result has no wire representation.
    Unsupported(&'static str),
    Failed(DispatchError),
}

struct ServiceInner {
    overrides: Overrides,
    encoder: ResponseEncoder,
    host: HostEnvironment,
}

#[derive(Clone)]
pub struct SnippetService {
    inner: Rc<ServiceInner>,
}

impl SnippetService {
    pub fn new(
        registry: Rc<CapabilityRegistry>,
        table: OverrideTable,
        host: HostEnvironment,
        outgoing: mpsc::UnboundedSender<Outgoing>,
    ) -> Self {
        let translator = ArgumentTranslator::new(
            Rc::clone(&registry),
            Rc::clone(&host.identity),
            Rc::clone(&host.objects),
        );
        let dispatcher = Rc::new(CallDispatcher::new(registry, translator));

        Self {
            inner: Rc::new(ServiceInner {
                overrides: Overrides::new(table, dispatcher, host.clone()),
                encoder: ResponseEncoder::new(outgoing),
                host,
            }),
        }
    }

    /// Queues `snippet` to run at the next frame tick.
    pub fn on_sp_snippet(&self, snippet: SpSnippet) {
        debug!(
            target: LOG_TARGET,
            "Received SpSnippet {} {} (idx {})", snippet.class, snippet.function, snippet.snippet_idx
        );

        let inner = Rc::clone(&self.inner);
        let task = async move {
            inner.handle(snippet).await;
        };
        self.inner.host.scheduler.once_next_tick(task.boxed_local());
    }

    /// Runs `snippet` right away and reports what was sent.
    ///
    /// Must be awaited inside a `tokio::task::LocalSet`: the race menu
    /// override spawns its delayed tail with `spawn_local`.
    pub async fn handle(&self, snippet: SpSnippet) -> SnippetOutcome {
        self.inner.handle(snippet).await
    }
}

impl ServiceInner {
    async fn handle(&self, snippet: SpSnippet) -> SnippetOutcome {
        let class = snippet.class.clone();
        let function = snippet.function.clone();
        let snippet_idx = snippet.snippet_idx;

        let result = match self.run(snippet).await {
            Ok(result) => result,
            Err(e) => {
                error!(target: LOG_TARGET, "SpSnippet {} {} failed {}", class, function, e);
                return SnippetOutcome::Failed(e);
            }
        };

        match encode_result(snippet_idx, result) {
            Ok(Some(finish)) => {
                self.encoder.send(finish.clone());
                SnippetOutcome::Sent(finish)
            }
            Ok(None) => SnippetOutcome::Suppressed,
            Err(e) => {
                error!(target: LOG_TARGET, "{}", e);
                match e {
                    DispatchError::UnsupportedResult { type_name } => {
                        SnippetOutcome::Unsupported(type_name)
                    }
                    other => SnippetOutcome::Failed(other),
                }
            }
        }
    }

    async fn run(&self, snippet: SpSnippet) -> CallResult {
        match self.overrides.intercept(snippet)? {
            Interception::Continue(snippet) => self.overrides.dispatcher().dispatch(&snippet).await,
            Interception::Finished(result) => Ok(result),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::host::{IdentityTranslator, LocalId, RemoteId};
    use crate::scheduler::FrameScheduler;
    use crate::world::{standard_registry, FormKind, LocalWorld, DEFAULT_TIMESCALE};
    use log::{LevelFilter, Log, Metadata, Record};
    use shared::{ObjectReferenceDescriptor, Packet, ReturnValue, WireValue, NO_RESPONSE_SNIPPET_IDX};
    use std::cell::RefCell;
    use tokio::task::LocalSet;

    thread_local! {
        static CAPTURED: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    /// Records front door log lines per test thread.
    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.target() == LOG_TARGET
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let line = format!("{} {}", record.level(), record.args());
                CAPTURED.with(|captured| captured.borrow_mut().push(line));
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;

    fn capture_logs() {
        // another test thread may have installed it already
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);
        CAPTURED.with(|captured| captured.borrow_mut().clear());
    }

    fn error_logs() -> Vec<String> {
        CAPTURED.with(|captured| {
            captured
                .borrow()
                .iter()
                .filter(|line| line.starts_with("ERROR "))
                .cloned()
                .collect()
        })
    }

    struct Fixture {
        world: Rc<LocalWorld>,
        scheduler: Rc<FrameScheduler>,
        service: SnippetService,
        outgoing: mpsc::UnboundedReceiver<Outgoing>,
    }

    fn fixture() -> Fixture {
        let world = Rc::new(LocalWorld::new(DEFAULT_TIMESCALE));
        let sword = world.add_form(LocalId(0x12eb7), FormKind::Weapon, "Sword");
        world.spawn_reference(RemoteId(0xff000001), FormKind::Reference, Some(&sword));

        let scheduler = Rc::new(FrameScheduler::new());
        let host = HostEnvironment {
            identity: world.clone(),
            objects: world.clone(),
            presentation: world.clone(),
            scheduler: scheduler.clone(),
            feedback: world.clone(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let service = SnippetService::new(
            Rc::new(standard_registry(&world)),
            OverrideTable::standard(),
            host,
            tx,
        );

        Fixture {
            world,
            scheduler,
            service,
            outgoing: rx,
        }
    }

    fn finish_of(outgoing: Outgoing) -> FinishSpSnippet {
        match outgoing.packet {
            Packet::FinishSpSnippet(finish) => finish,
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn test_scalar_result_is_sent() {
        let mut fx = fixture();
        let snippet = SpSnippet::new("Form", "GetName", vec![], 5).with_self_id(0xff000001);

        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        let expected = FinishSpSnippet {
            snippet_idx: 5,
            return_value: Some(ReturnValue::String("Sword".to_string())),
        };
        assert_eq!(outcome, SnippetOutcome::Sent(expected.clone()));
        assert_eq!(finish_of(fx.outgoing.try_recv().unwrap()), expected);
    }

    #[test]
    fn test_sentinel_snippet_sends_nothing() {
        let mut fx = fixture();
        let snippet = SpSnippet::new("Debug", "Notification", vec!["hi".into()], NO_RESPONSE_SNIPPET_IDX);

        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        assert_eq!(outcome, SnippetOutcome::Suppressed);
        assert_eq!(fx.world.notifications(), vec!["hi".to_string()]);
        assert!(fx.outgoing.try_recv().is_err());

        // not even a failure produces a message
        let snippet = SpSnippet::new("Nope", "Nothing", vec![], NO_RESPONSE_SNIPPET_IDX);
        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        assert!(matches!(outcome, SnippetOutcome::Failed(_)));
        assert!(fx.outgoing.try_recv().is_err());
    }

    #[test]
    fn test_void_and_null_results_look_the_same_on_the_wire() {
        let mut fx = fixture();

        let void = SpSnippet::new("Debug", "Notification", vec!["hi".into()], 1);
        let null = SpSnippet::new("Game", "GetFormEx", vec![WireValue::Number(0xbad as f64)], 2);

        tokio_test::block_on(fx.service.handle(void));
        tokio_test::block_on(fx.service.handle(null));

        let void = finish_of(fx.outgoing.try_recv().unwrap());
        let null = finish_of(fx.outgoing.try_recv().unwrap());
        assert_eq!((void.snippet_idx, void.return_value), (1, None));
        assert_eq!((null.snippet_idx, null.return_value), (2, None));
    }

    #[test]
    fn test_unsupported_result_is_withheld() {
        capture_logs();
        let mut fx = fixture();
        let snippet = SpSnippet::new("Game", "GetPlayer", vec![], 3);

        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        assert_eq!(outcome, SnippetOutcome::Unsupported("form"));
        assert!(fx.outgoing.try_recv().is_err());
        assert_eq!(
            error_logs(),
            vec!["ERROR Unsupported SpSnippet result type 'form'".to_string()]
        );
    }

    #[test]
    fn test_unknown_hack_is_logged() {
        capture_logs();
        let fx = fixture();
        let snippet = SpSnippet::new("SkympHacks", "DoSomethingElse", vec![], 4);

        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        match outcome {
            SnippetOutcome::Failed(e) => assert_eq!(e.kind(), ErrorKind::UnknownBuiltin),
            other => panic!("Unexpected outcome {:?}", other),
        }
        assert_eq!(
            error_logs(),
            vec!["ERROR SpSnippet SkympHacks DoSomethingElse failed Unknown SkympHack - DoSomethingElse"
                .to_string()]
        );
    }

    #[tokio::test]
    async fn test_wait_beyond_duration_range_fails_cleanly() {
        capture_logs();
        let mut fx = fixture();
        let local = LocalSet::new();
        local
            .run_until(async {
                for seconds in [1e20, f64::INFINITY] {
                    let snippet =
                        SpSnippet::new("Utility", "Wait", vec![WireValue::Number(seconds)], 1);
                    match fx.service.handle(snippet).await {
                        SnippetOutcome::Failed(e) => assert_eq!(e.kind(), ErrorKind::InvalidArgument),
                        other => panic!("Unexpected outcome {:?}", other),
                    }
                }

                // the deferred path must not panic the tick task either
                fx.service.on_sp_snippet(SpSnippet::new(
                    "Utility",
                    "Wait",
                    vec![WireValue::Number(1e20)],
                    2,
                ));
                for handle in fx.scheduler.tick() {
                    handle.await.unwrap();
                }
            })
            .await;

        assert!(fx.outgoing.try_recv().is_err());
        let errors = error_logs();
        assert_eq!(errors.len(), 3);
        assert!(errors
            .iter()
            .all(|line| line.starts_with("ERROR SpSnippet Utility Wait failed Invalid argument 0 for Wait")));
    }

    #[test]
    fn test_failures_send_nothing() {
        let mut fx = fixture();
        let snippets = vec![
            SpSnippet::new("SkympHacks", "DoSomethingElse", vec![], 1),
            SpSnippet::new("Game", "NoSuchFunction", vec![], 2),
            SpSnippet::new("ObjectReference", "GetDisplayName", vec![], 3).with_self_id(0xff0000ff),
        ];

        for snippet in snippets {
            let outcome = tokio_test::block_on(fx.service.handle(snippet));
            assert!(matches!(outcome, SnippetOutcome::Failed(_)));
        }
        assert!(fx.outgoing.try_recv().is_err());
    }

    #[test]
    fn test_set_display_name_reaches_generic_dispatch() {
        let fx = fixture();
        let snippet = SpSnippet::new(
            "ObjectReference",
            "SetDisplayName",
            vec!["item %original_name% found".into()],
            NO_RESPONSE_SNIPPET_IDX,
        )
        .with_self_id(0xff000001);

        tokio_test::block_on(fx.service.handle(snippet));

        let local = fx.world.remote_to_local(RemoteId(0xff000001)).unwrap();
        assert_eq!(fx.world.form(local).unwrap().display_name(), "item Sword found");
    }

    #[test]
    fn test_class_names_ignore_case() {
        let mut fx = fixture();
        let snippet = SpSnippet::new("OBJECTREFERENCE", "GetDisplayName", vec![], 6)
            .with_self_id(0xff000001);

        tokio_test::block_on(fx.service.handle(snippet));
        let finish = finish_of(fx.outgoing.try_recv().unwrap());
        assert_eq!(finish.return_value, Some(ReturnValue::String("Sword".to_string())));
    }

    #[test]
    fn test_method_without_self_fails() {
        let mut fx = fixture();
        let snippet = SpSnippet::new("ObjectReference", "GetDisplayName", vec![], 7);

        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        assert!(matches!(outcome, SnippetOutcome::Failed(_)));
        assert!(fx.outgoing.try_recv().is_err());
    }

    #[test]
    fn test_add_item_through_front_door() {
        let mut fx = fixture();
        let snippet = SpSnippet::new(
            "skymphacks",
            "AddItem",
            vec![
                WireValue::Object(ObjectReferenceDescriptor::new(0xff000001, "ObjectReference")),
                WireValue::Number(3.0),
            ],
            8,
        );

        let outcome = tokio_test::block_on(fx.service.handle(snippet));
        assert_eq!(
            outcome,
            SnippetOutcome::Sent(FinishSpSnippet {
                snippet_idx: 8,
                return_value: None,
            })
        );
        assert_eq!(fx.world.notifications(), vec!["+ Sword (3)".to_string()]);
        assert!(fx.outgoing.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_snippets_wait_for_next_tick() {
        let mut fx = fixture();
        let local = LocalSet::new();
        local
            .run_until(async {
                fx.service
                    .on_sp_snippet(SpSnippet::new("Debug", "Notification", vec!["first".into()], 1));
                fx.service
                    .on_sp_snippet(SpSnippet::new("Debug", "Notification", vec!["second".into()], 2));

                tokio::task::yield_now().await;
                assert!(fx.world.notifications().is_empty());
                assert_eq!(fx.scheduler.pending(), 2);

                for handle in fx.scheduler.tick() {
                    handle.await.unwrap();
                }

                assert_eq!(
                    fx.world.notifications(),
                    vec!["first".to_string(), "second".to_string()]
                );
                assert_eq!(finish_of(fx.outgoing.try_recv().unwrap()).snippet_idx, 1);
                assert_eq!(finish_of(fx.outgoing.try_recv().unwrap()).snippet_idx, 2);
            })
            .await;
    }
}
