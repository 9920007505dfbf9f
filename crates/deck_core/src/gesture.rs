//! Press/hold disambiguation for gesture buttons.
//!
//! A press arms a one-shot hold timer. Whichever of the timer and the release
//! takes the instance table lock first decides the gesture: the timer sends the
//! hold command and marks the run fired, or the release removes the run and
//! sends the press command. A run removed from the table aborts its timer.

use std::sync::{Arc, Weak};

use shared::domain::InstanceId;
use tokio::{task::JoinHandle, time};
use tracing::{debug, info, warn};

use crate::{
    settings::{ActionSettings, GestureSettings},
    CommandTrigger, InstanceTarget, RouterShared,
};

pub(crate) struct GestureRun {
    gesture_id: u64,
    fired: bool,
    timer: Option<JoinHandle<()>>,
}

impl GestureRun {
    pub(crate) fn is_armed(&self) -> bool {
        self.timer.is_some() && !self.fired
    }
}

impl Drop for GestureRun {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl RouterShared {
    pub(crate) async fn press_down(self: &Arc<Self>, id: &InstanceId) {
        let mut instances = self.instances.lock().await;
        let Some(instance) = instances.get_mut(id) else {
            debug!(instance_id = %id, "press-down for unknown instance");
            return;
        };
        let ActionSettings::Gesture(settings) = &instance.settings else {
            return;
        };
        let settings = settings.clone();

        if instance.gesture.take().is_some() {
            warn!(instance_id = %id, "press-down while a gesture was in progress; restarting it");
        }

        let gesture_id = self.next_token();
        let timer = if settings.hold_command.is_empty() {
            None
        } else {
            let target = InstanceTarget {
                id: id.clone(),
                epoch: instance.epoch,
            };
            Some(tokio::spawn(hold_timer(
                Arc::downgrade(self),
                target,
                gesture_id,
                settings,
            )))
        };

        instance.gesture = Some(GestureRun {
            gesture_id,
            fired: false,
            timer,
        });
    }

    pub(crate) async fn press_up(self: &Arc<Self>, id: &InstanceId) {
        let (target, settings, run) = {
            let mut instances = self.instances.lock().await;
            let Some(instance) = instances.get_mut(id) else {
                debug!(instance_id = %id, "press-up for unknown instance");
                return;
            };
            let ActionSettings::Gesture(settings) = &instance.settings else {
                return;
            };
            let target = InstanceTarget {
                id: id.clone(),
                epoch: instance.epoch,
            };
            (target, settings.clone(), instance.gesture.take())
        };

        let fired = run.as_ref().is_some_and(|run| run.fired);
        drop(run);

        if fired {
            debug!(instance_id = %id, "hold already handled this gesture");
            return;
        }
        if settings.press_command.is_empty() {
            debug!(instance_id = %id, "no press command configured");
            return;
        }
        self.spawn_dispatch(
            target,
            settings.endpoint_base_url,
            settings.press_command,
            CommandTrigger::Press,
        );
    }

    async fn fire_hold(
        self: &Arc<Self>,
        target: InstanceTarget,
        gesture_id: u64,
        settings: GestureSettings,
    ) {
        {
            let mut instances = self.instances.lock().await;
            let run = instances
                .get_mut(&target.id)
                .filter(|instance| instance.epoch == target.epoch)
                .and_then(|instance| instance.gesture.as_mut())
                .filter(|run| run.gesture_id == gesture_id && !run.fired);
            let Some(run) = run else {
                debug!(instance_id = %target.id, "hold timer fired after gesture resolved");
                return;
            };
            run.fired = true;
        }

        info!(
            instance_id = %target.id,
            threshold_ms = settings.hold_threshold.as_millis() as u64,
            "hold threshold reached"
        );
        self.spawn_dispatch(
            target,
            settings.endpoint_base_url,
            settings.hold_command,
            CommandTrigger::Hold,
        );
    }
}

async fn hold_timer(
    shared: Weak<RouterShared>,
    target: InstanceTarget,
    gesture_id: u64,
    settings: GestureSettings,
) {
    time::sleep(settings.hold_threshold).await;
    if let Some(shared) = shared.upgrade() {
        shared.fire_hold(target, gesture_id, settings).await;
    }
}
