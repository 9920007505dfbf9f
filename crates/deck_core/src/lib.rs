use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use shared::{
    domain::{ActionKind, InstanceId},
    protocol::{Feedback, InboundEvent, RawSettings},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod dispatcher;
pub mod error;
mod gesture;
pub mod path_query;
pub mod polling;
pub mod settings;
pub mod template;

use dispatcher::{CommandDispatcher, CommandTransport, HttpCommandTransport};
use gesture::GestureRun;
use polling::{DisplayOrder, HttpStatusSource, PollRun, PollStatus, StatusSource};
use settings::ActionSettings;

pub const DEFAULT_FEEDBACK_CAPACITY: usize = 1024;

/// What caused a command to be sent; used for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandTrigger {
    Press,
    Hold,
    Invoke,
}

impl CommandTrigger {
    fn as_str(self) -> &'static str {
        match self {
            CommandTrigger::Press => "press",
            CommandTrigger::Hold => "hold",
            CommandTrigger::Invoke => "invoke",
        }
    }
}

/// One registration of an instance. A re-registration under the same id gets
/// a new epoch, so work started for the old one cannot touch the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InstanceTarget {
    pub(crate) id: InstanceId,
    pub(crate) epoch: u64,
}

pub(crate) struct Instance {
    pub(crate) settings: ActionSettings,
    pub(crate) epoch: u64,
    pub(crate) gesture: Option<GestureRun>,
    pub(crate) poll: Option<PollRun>,
    pub(crate) display: DisplayOrder,
}

pub(crate) struct RouterShared {
    pub(crate) instances: Mutex<HashMap<InstanceId, Instance>>,
    pub(crate) source: Arc<dyn StatusSource>,
    pub(crate) feedback: broadcast::Sender<Feedback>,
    dispatcher: CommandDispatcher,
    tokens: AtomicU64,
}

impl RouterShared {
    pub(crate) fn next_token(&self) -> u64 {
        self.tokens.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Sends `command` in the background and reports the outcome on the
    /// instance, unless the instance has gone away in the meantime.
    pub(crate) fn spawn_dispatch(
        self: &Arc<Self>,
        target: InstanceTarget,
        endpoint_base_url: String,
        command: String,
        trigger: CommandTrigger,
    ) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let result = shared.dispatcher.send(&endpoint_base_url, &command).await;
            let feedback = match result {
                Ok(()) => {
                    info!(
                        instance_id = %target.id,
                        trigger = trigger.as_str(),
                        command = %command,
                        "command sent"
                    );
                    Feedback::IndicateSuccess {
                        instance_id: target.id.clone(),
                    }
                }
                Err(err) => {
                    warn!(
                        instance_id = %target.id,
                        trigger = trigger.as_str(),
                        error = %err,
                        "command failed"
                    );
                    Feedback::IndicateFailure {
                        instance_id: target.id.clone(),
                    }
                }
            };
            shared.emit_if_live(&target, feedback).await;
        });
    }

    async fn emit_if_live(&self, target: &InstanceTarget, feedback: Feedback) {
        let live = self
            .instances
            .lock()
            .await
            .get(&target.id)
            .is_some_and(|instance| instance.epoch == target.epoch);
        if !live {
            debug!(instance_id = %target.id, "instance gone; dropping feedback");
            return;
        }
        let _ = self.feedback.send(feedback);
    }
}

/// Entry point for device events. Owns the table of visible instances and
/// routes each event to the gesture machine or the polling engine.
#[derive(Clone)]
pub struct ActionRouter {
    shared: Arc<RouterShared>,
}

impl Default for ActionRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRouter {
    pub fn new() -> Self {
        Self::new_with_dependencies(
            Arc::new(HttpCommandTransport::default()),
            Arc::new(HttpStatusSource::default()),
            DEFAULT_FEEDBACK_CAPACITY,
        )
    }

    pub fn new_with_dependencies(
        transport: Arc<dyn CommandTransport>,
        source: Arc<dyn StatusSource>,
        feedback_capacity: usize,
    ) -> Self {
        let (feedback, _) = broadcast::channel(feedback_capacity.max(1));
        Self {
            shared: Arc::new(RouterShared {
                instances: Mutex::new(HashMap::new()),
                source,
                feedback,
                dispatcher: CommandDispatcher::new(transport),
                tokens: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe_feedback(&self) -> broadcast::Receiver<Feedback> {
        self.shared.feedback.subscribe()
    }

    pub async fn handle(&self, event: InboundEvent) {
        debug!(instance_id = %event.instance_id(), event = event.name(), "inbound event");
        match event {
            InboundEvent::Appeared {
                instance_id,
                action_kind,
                settings,
            } => self.on_appear(instance_id, action_kind, &settings).await,
            InboundEvent::Disappeared { instance_id } => self.on_disappear(&instance_id).await,
            InboundEvent::SettingsChanged {
                instance_id,
                settings,
            } => self.on_settings_changed(&instance_id, &settings).await,
            InboundEvent::PressDown { instance_id } => self.on_press_down(&instance_id).await,
            InboundEvent::PressUp { instance_id } => self.on_press_up(&instance_id).await,
            InboundEvent::Invoke { instance_id } => self.on_invoke(&instance_id).await,
        }
    }

    pub async fn on_appear(&self, id: InstanceId, kind: ActionKind, raw: &RawSettings) {
        let settings = ActionSettings::adopt(kind, raw);
        let mut instances = self.shared.instances.lock().await;
        if instances.remove(&id).is_some() {
            warn!(instance_id = %id, "instance appeared twice; replacing previous registration");
        }

        let mut instance = Instance {
            settings,
            epoch: self.shared.next_token(),
            gesture: None,
            poll: None,
            display: DisplayOrder::default(),
        };
        if kind == ActionKind::Poll {
            self.shared.restart_polling(&id, &mut instance);
        }
        info!(instance_id = %id, kind = kind.as_str(), "instance registered");
        instances.insert(id, instance);
    }

    /// Removes the instance, cancelling its hold timer and poll schedule.
    /// Unknown ids are ignored.
    pub async fn on_disappear(&self, id: &InstanceId) {
        let mut instances = self.shared.instances.lock().await;
        match instances.remove(id) {
            Some(instance) => {
                info!(
                    instance_id = %id,
                    kind = instance.settings.kind().as_str(),
                    "instance removed"
                );
                drop(instance);
            }
            None => debug!(instance_id = %id, "disappear for unknown instance"),
        }
    }

    pub async fn on_settings_changed(&self, id: &InstanceId, raw: &RawSettings) {
        let mut instances = self.shared.instances.lock().await;
        let Some(instance) = instances.get_mut(id) else {
            debug!(instance_id = %id, "settings for unknown instance");
            return;
        };

        let kind = instance.settings.kind();
        instance.settings = ActionSettings::adopt(kind, raw);
        info!(instance_id = %id, kind = kind.as_str(), "settings updated");
        if kind == ActionKind::Poll {
            self.shared.restart_polling(id, instance);
        }
    }

    pub async fn on_press_down(&self, id: &InstanceId) {
        self.shared.press_down(id).await;
    }

    pub async fn on_press_up(&self, id: &InstanceId) {
        self.shared.press_up(id).await;
    }

    pub async fn on_invoke(&self, id: &InstanceId) {
        let instances = self.shared.instances.lock().await;
        let Some(instance) = instances.get(id) else {
            debug!(instance_id = %id, "invoke for unknown instance");
            return;
        };
        let ActionSettings::Passive(settings) = &instance.settings else {
            debug!(instance_id = %id, "invoke ignored for non-passive instance");
            return;
        };

        let target = InstanceTarget {
            id: id.clone(),
            epoch: instance.epoch,
        };
        self.shared.spawn_dispatch(
            target,
            settings.endpoint_base_url.clone(),
            settings.command.clone(),
            CommandTrigger::Invoke,
        );
    }

    /// Removes every instance, cancelling all timers.
    pub async fn shutdown(&self) {
        let mut instances = self.shared.instances.lock().await;
        let count = instances.len();
        instances.clear();
        info!(count, "removed all instances");
    }

    pub async fn instance_count(&self) -> usize {
        self.shared.instances.lock().await.len()
    }

    pub async fn action_kind(&self, id: &InstanceId) -> Option<ActionKind> {
        self.shared
            .instances
            .lock()
            .await
            .get(id)
            .map(|instance| instance.settings.kind())
    }

    /// True while a hold timer is pending for the instance.
    pub async fn is_armed(&self, id: &InstanceId) -> bool {
        self.shared
            .instances
            .lock()
            .await
            .get(id)
            .and_then(|instance| instance.gesture.as_ref())
            .is_some_and(GestureRun::is_armed)
    }

    pub async fn poll_status(&self, id: &InstanceId) -> Option<PollStatus> {
        self.shared
            .instances
            .lock()
            .await
            .get(id)
            .and_then(|instance| instance.poll.as_ref())
            .map(PollRun::status)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
