//! Per-instance poll loops: fetch a JSON document, extract a value, render it
//! onto the button.
//!
//! Ticks are scheduled on the wall clock and never wait for the previous fetch.
//! Results are applied under the instance table lock, and only if the instance
//! and its poll run are still the ones that issued the tick and no newer result
//! has been shown. A restart therefore drops every fetch of the previous run.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::{domain::InstanceId, protocol::Feedback};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    error::DeckError,
    path_query,
    settings::{ActionSettings, PollSettings},
    template, Instance, InstanceTarget, RouterShared,
};

/// Shown instead of a rendered value when a tick fails.
pub const POLL_ERROR_TEXT: &str = "Error";

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_json(&self, url: &str) -> Result<Value, DeckError>;
}

pub struct HttpStatusSource {
    http: Client,
}

impl HttpStatusSource {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl Default for HttpStatusSource {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch_json(&self, url: &str) -> Result<Value, DeckError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeckError::transport(format!(
                "status request failed with status {status}"
            )));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| DeckError::MalformedResponse(err.to_string()))
    }
}

/// Renders one successful fetch the way a tick displays it.
pub fn render_document(settings: &PollSettings, document: &Value) -> String {
    let value = path_query::extract(&settings.path_query, document);
    template::render(&settings.display_template, &value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStatus {
    pub interval: Duration,
    pub in_flight: bool,
}

pub(crate) struct PollRun {
    run_id: u64,
    interval: Duration,
    in_flight: usize,
    schedule: JoinHandle<()>,
}

impl PollRun {
    pub(crate) fn status(&self) -> PollStatus {
        PollStatus {
            interval: self.interval,
            in_flight: self.in_flight > 0,
        }
    }
}

impl Drop for PollRun {
    fn drop(&mut self) {
        self.schedule.abort();
    }
}

/// Sequence numbers for display updates of one instance.
#[derive(Debug, Default)]
pub(crate) struct DisplayOrder {
    issued: u64,
    shown: u64,
}

impl DisplayOrder {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    fn accept(&mut self, seq: u64) -> bool {
        if seq <= self.shown {
            return false;
        }
        self.shown = seq;
        true
    }
}

impl RouterShared {
    /// Replaces any running loop for `instance` with one built from its
    /// current settings. Must be called with the instance table locked.
    pub(crate) fn restart_polling(self: &Arc<Self>, id: &InstanceId, instance: &mut Instance) {
        if let Some(previous) = instance.poll.take() {
            debug!(instance_id = %id, run_id = previous.run_id, "stopping poll loop");
        }

        let ActionSettings::Poll(settings) = &instance.settings else {
            return;
        };
        if !settings.is_enabled() {
            debug!(instance_id = %id, "polling disabled: no source url configured");
            return;
        }

        let run_id = self.next_token();
        let target = InstanceTarget {
            id: id.clone(),
            epoch: instance.epoch,
        };
        let schedule = tokio::spawn(run_schedule(
            Arc::downgrade(self),
            target,
            run_id,
            settings.clone(),
        ));
        info!(
            instance_id = %id,
            run_id,
            url = %settings.source_url,
            interval_ms = settings.interval.as_millis() as u64,
            "started polling"
        );
        instance.poll = Some(PollRun {
            run_id,
            interval: settings.interval,
            in_flight: 0,
            schedule,
        });
    }

    async fn run_tick(
        self: Arc<Self>,
        target: InstanceTarget,
        run_id: u64,
        settings: PollSettings,
    ) {
        let seq = {
            let mut instances = self.instances.lock().await;
            let Some(instance) = live_instance(&mut instances, &target) else {
                return;
            };
            let Some(run) = instance.poll.as_mut().filter(|run| run.run_id == run_id) else {
                return;
            };
            run.in_flight += 1;
            if run.in_flight > 1 {
                debug!(
                    instance_id = %target.id,
                    in_flight = run.in_flight,
                    "previous fetch still outstanding"
                );
            }
            instance.display.issue()
        };

        let text = match self.source.fetch_json(&settings.source_url).await {
            Ok(document) => render_document(&settings, &document),
            Err(err) => {
                warn!(
                    instance_id = %target.id,
                    url = %settings.source_url,
                    error = %err,
                    "poll tick failed"
                );
                POLL_ERROR_TEXT.to_string()
            }
        };

        let mut instances = self.instances.lock().await;
        let Some(instance) = live_instance(&mut instances, &target) else {
            debug!(instance_id = %target.id, "instance gone; discarding poll result");
            return;
        };
        let Some(run) = instance.poll.as_mut().filter(|run| run.run_id == run_id) else {
            debug!(
                instance_id = %target.id,
                run_id,
                "poll run replaced or stopped; discarding result"
            );
            return;
        };
        run.in_flight = run.in_flight.saturating_sub(1);
        if !instance.display.accept(seq) {
            debug!(instance_id = %target.id, seq, "poll result superseded by a newer tick");
            return;
        }

        debug!(instance_id = %target.id, %text, "display updated");
        let _ = self.feedback.send(Feedback::SetDisplayText {
            instance_id: target.id,
            text,
        });
    }
}

fn live_instance<'a>(
    instances: &'a mut HashMap<InstanceId, Instance>,
    target: &InstanceTarget,
) -> Option<&'a mut Instance> {
    instances
        .get_mut(&target.id)
        .filter(|instance| instance.epoch == target.epoch)
}

async fn run_schedule(
    shared: Weak<RouterShared>,
    target: InstanceTarget,
    run_id: u64,
    settings: PollSettings,
) {
    let mut ticker = time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        tokio::spawn(shared.run_tick(target.clone(), run_id, settings.clone()));
    }
}
