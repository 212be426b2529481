//! Transient-error classification
//!
//! Decides, per failed remote call, whether the engine should keep going,
//! treat the failure as the absence it was waiting for, or give up.

use crate::client::TransportError;
use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};

const NOT_FOUND: u16 = 404;
const BAD_REQUEST: u16 = 400;
/// Returned for services that are already terminated or expired
const TERMINATED: u16 = 460;

/// Where in the lifecycle the failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The initial mutating call
    Mutate,
    /// A status refresh
    Poll,
}

/// What the engine does with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Keep polling; counts as a pending tick
    Retryable,
    /// The resource is gone, which is what a delete wanted
    AbsentOk,
    /// Stop and surface the error as is
    Fatal,
}

/// Status-code rule evaluated before the fallback to `Fatal`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransientRule {
    pub status: u16,

    /// Phases the rule applies to; empty means all
    #[serde(default)]
    pub phases: Vec<Phase>,

    /// Operation kinds the rule applies to; empty means all
    #[serde(default)]
    pub kinds: Vec<OperationKind>,

    /// Only match when the remote message contains this text
    #[serde(default)]
    pub message_contains: Option<String>,

    #[serde(default = "default_classification")]
    pub classification: Classification,
}

fn default_classification() -> Classification {
    Classification::Retryable
}

impl TransientRule {
    pub fn retryable(status: u16) -> Self {
        Self {
            status,
            phases: Vec::new(),
            kinds: Vec::new(),
            message_contains: None,
            classification: Classification::Retryable,
        }
    }

    pub fn during(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn for_kind(mut self, kind: OperationKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn containing(mut self, text: impl Into<String>) -> Self {
        self.message_contains = Some(text.into());
        self
    }

    /// Attach/detach race: a 400 while an update is still settling
    pub fn attach_detach_race() -> Self {
        Self::retryable(BAD_REQUEST)
            .during(Phase::Poll)
            .for_kind(OperationKind::Update)
    }

    fn matches(&self, err: &TransportError, phase: Phase, kind: OperationKind) -> bool {
        if err.status != Some(self.status) {
            return false;
        }
        if !self.phases.is_empty() && !self.phases.contains(&phase) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        match &self.message_contains {
            Some(text) => err.message.contains(text.as_str()),
            None => true,
        }
    }
}

/// Classifier with a rule table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    rules: Vec<TransientRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            rules: vec![TransientRule::attach_detach_race()],
        }
    }
}

impl Classifier {
    /// Classifier with only the built-in delete rules
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: TransientRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_rules(mut self, rules: impl IntoIterator<Item = TransientRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn rules(&self) -> &[TransientRule] {
        &self.rules
    }

    pub fn classify(&self, err: &TransportError, phase: Phase, kind: OperationKind) -> Classification {
        let class = self.decide(err, phase, kind);
        tracing::debug!(
            endpoint = %err.endpoint(),
            status = ?err.status,
            ?phase,
            %kind,
            ?class,
            "Classified remote error"
        );
        class
    }

    fn decide(&self, err: &TransportError, phase: Phase, kind: OperationKind) -> Classification {
        if kind == OperationKind::Delete {
            match (phase, err.status) {
                (Phase::Poll, Some(NOT_FOUND)) => return Classification::AbsentOk,
                (Phase::Mutate, Some(NOT_FOUND | TERMINATED)) => return Classification::AbsentOk,
                _ => {}
            }
        }

        self.rules
            .iter()
            .filter(|rule| {
                rule.classification != Classification::AbsentOk || kind == OperationKind::Delete
            })
            .find(|rule| rule.matches(err, phase, kind))
            .map(|rule| rule.classification)
            .unwrap_or(Classification::Fatal)
    }
}
