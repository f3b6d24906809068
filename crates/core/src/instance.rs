use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Provider instance identifier (e.g. `i-0abc123`).
pub type InstanceId = String;

/// Tag the provider stamps on every member of an autoscaling group.
pub const AUTOSCALING_GROUP_TAG: &str = "aws:autoscaling:groupName";

/// Longest tag key the provider accepts.
pub const MAX_TAG_KEY_LEN: usize = 128;
/// Longest tag value the provider accepts.
pub const MAX_TAG_VALUE_LEN: usize = 256;

// ── Instance state ────────────────────────────────────────────

/// Lifecycle state of a compute instance, with the provider's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceState {
    pub fn code(self) -> u16 {
        match self {
            InstanceState::Pending => 0,
            InstanceState::Running => 16,
            InstanceState::ShuttingDown => 32,
            InstanceState::Terminated => 48,
            InstanceState::Stopping => 64,
            InstanceState::Stopped => 80,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
        }
    }

    /// Parse a provider state name. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pending" => Some(InstanceState::Pending),
            "running" => Some(InstanceState::Running),
            "shutting-down" => Some(InstanceState::ShuttingDown),
            "terminated" => Some(InstanceState::Terminated),
            "stopping" => Some(InstanceState::Stopping),
            "stopped" => Some(InstanceState::Stopped),
            _ => None,
        }
    }

    /// Parse a provider state code. Only the low byte is significant.
    pub fn from_code(code: u16) -> Option<Self> {
        match code & 0xff {
            0 => Some(InstanceState::Pending),
            16 => Some(InstanceState::Running),
            32 => Some(InstanceState::ShuttingDown),
            48 => Some(InstanceState::Terminated),
            64 => Some(InstanceState::Stopping),
            80 => Some(InstanceState::Stopped),
            _ => None,
        }
    }

    /// Whether the provider accepts `action` for an instance in this state.
    ///
    /// Repeating an action on an instance already heading that way is
    /// accepted. Anything else (mid-transition the other way, terminated or
    /// terminating) is rejected with `IncorrectInstanceState`, and the
    /// provider rejects the whole batch along with it.
    pub fn accepts(self, action: PowerAction) -> bool {
        match action {
            PowerAction::Stop => matches!(
                self,
                InstanceState::Running | InstanceState::Stopping | InstanceState::Stopped
            ),
            PowerAction::Start => matches!(
                self,
                InstanceState::Stopped | InstanceState::Pending | InstanceState::Running
            ),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wire shape used by the provider: `{"Code": 80, "Name": "stopped"}`.
#[derive(Serialize, Deserialize)]
struct StateRepr {
    #[serde(rename = "Code")]
    code: u16,
    #[serde(rename = "Name")]
    name: String,
}

impl Serialize for InstanceState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StateRepr {
            code: self.code(),
            name: self.name().to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InstanceState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = StateRepr::deserialize(deserializer)?;
        InstanceState::from_name(&repr.name)
            .or_else(|| InstanceState::from_code(repr.code))
            .ok_or_else(|| {
                serde::de::Error::custom(format!(
                    "unknown instance state {} ({})",
                    repr.name, repr.code
                ))
            })
    }
}

// ── Tag filter ────────────────────────────────────────────────

/// Exact key/value tag match used to select managed instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TagFilter {
    key: String,
    value: String,
}

impl TagFilter {
    /// Build a validated filter. Blank keys or values and keys/values longer
    /// than the provider limits are rejected.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        let value = value.into();

        if key.trim().is_empty() {
            return Err(ValidationError::EmptyTagKey);
        }
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyTagValue { key });
        }
        if key.chars().count() > MAX_TAG_KEY_LEN {
            return Err(ValidationError::TagKeyTooLong {
                len: key.chars().count(),
                max: MAX_TAG_KEY_LEN,
            });
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            return Err(ValidationError::TagValueTooLong {
                len: value.chars().count(),
                max: MAX_TAG_VALUE_LEN,
            });
        }

        Ok(Self { key, value })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// True when `tags` carries exactly this key with exactly this value.
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(&self.key).is_some_and(|v| *v == self.value)
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

// ── Inventory snapshot types ──────────────────────────────────

/// A compute instance as seen by one inventory query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: InstanceId,
    pub tags: BTreeMap<String, String>,
    /// Autoscaling group that owns this instance, when the inventory reports one.
    pub autoscaling_group: Option<String>,
    pub state: InstanceState,
}

impl InstanceRef {
    pub fn new(id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            id: id.into(),
            tags: BTreeMap::new(),
            autoscaling_group: None,
            state,
        }
    }

    /// Attach a tag. The autoscaling group tag also sets group membership.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        if key == AUTOSCALING_GROUP_TAG {
            self.autoscaling_group = Some(value.clone());
        }
        self.tags.insert(key, value);
        self
    }

    pub fn in_autoscaling_group(mut self, group: impl Into<String>) -> Self {
        self.autoscaling_group = Some(group.into());
        self
    }

    /// Tag lookup. A missing key is `None`, never an error.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_autoscaling_managed(&self) -> bool {
        self.autoscaling_group.is_some()
    }
}

/// Membership record returned by the autoscaling API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalingMember {
    pub instance_id: InstanceId,
    pub group_name: String,
}

/// A monitoring alarm whose dimensions reference an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedAlarm {
    pub name: String,
    pub actions_enabled: bool,
}

/// The alarms discovered for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRef {
    pub instance_id: InstanceId,
    pub alarm_names: BTreeSet<String>,
}

impl AlarmRef {
    pub fn new(instance_id: impl Into<String>, alarms: &[WatchedAlarm]) -> Self {
        Self {
            instance_id: instance_id.into(),
            alarm_names: alarms.iter().map(|a| a.name.clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.alarm_names.is_empty()
    }
}

// ── Power action ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    Stop,
}

impl PowerAction {
    /// State an instance converges to once the action completes.
    pub fn target_state(self) -> InstanceState {
        match self {
            PowerAction::Start => InstanceState::Running,
            PowerAction::Stop => InstanceState::Stopped,
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerAction::Start => write!(f, "start"),
            PowerAction::Stop => write!(f, "stop"),
        }
    }
}
