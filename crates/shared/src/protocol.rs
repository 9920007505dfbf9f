use serde::{Deserialize, Serialize};

use crate::{
    domain::{ActionKind, InstanceId},
    error::ProtocolError,
};

/// Loosely typed per-instance settings as delivered by the device host.
pub type RawSettings = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundEvent {
    Appeared {
        instance_id: InstanceId,
        action_kind: ActionKind,
        #[serde(default)]
        settings: RawSettings,
    },
    Disappeared {
        instance_id: InstanceId,
    },
    SettingsChanged {
        instance_id: InstanceId,
        #[serde(default)]
        settings: RawSettings,
    },
    PressDown {
        instance_id: InstanceId,
    },
    PressUp {
        instance_id: InstanceId,
    },
    Invoke {
        instance_id: InstanceId,
    },
}

impl InboundEvent {
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            InboundEvent::Appeared { instance_id, .. }
            | InboundEvent::Disappeared { instance_id }
            | InboundEvent::SettingsChanged { instance_id, .. }
            | InboundEvent::PressDown { instance_id }
            | InboundEvent::PressUp { instance_id }
            | InboundEvent::Invoke { instance_id } => instance_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Appeared { .. } => "appeared",
            InboundEvent::Disappeared { .. } => "disappeared",
            InboundEvent::SettingsChanged { .. } => "settings_changed",
            InboundEvent::PressDown { .. } => "press_down",
            InboundEvent::PressUp { .. } => "press_up",
            InboundEvent::Invoke { .. } => "invoke",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Feedback {
    SetDisplayText { instance_id: InstanceId, text: String },
    IndicateSuccess { instance_id: InstanceId },
    IndicateFailure { instance_id: InstanceId },
}

impl Feedback {
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            Feedback::SetDisplayText { instance_id, .. }
            | Feedback::IndicateSuccess { instance_id }
            | Feedback::IndicateFailure { instance_id } => instance_id,
        }
    }
}

pub fn decode_event(line: &str) -> Result<InboundEvent, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

pub fn encode_feedback(feedback: &Feedback) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(feedback)?)
}
