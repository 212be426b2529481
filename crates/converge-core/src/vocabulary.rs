//! Status vocabularies of the remote resource families
//!
//! Each family reports progress with its own status labels and exposes its
//! status at its own path. The table here is the single place that knows
//! them; the tracker derives pending/target sets from it.

use crate::error::{EngineError, Result};
use crate::operation::{OperationKind, ResourceScope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource family whose status endpoint the tracker polls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vocabulary {
    /// Cloud project private network (polled on the network itself)
    PrivateNetwork,
    /// Cloud project user
    CloudUser,
    /// Managed Kubernetes cluster
    KubeCluster,
    /// Managed Kubernetes node pool
    KubeNodePool,
    /// Generic cloud project operation
    ProjectOperation,
    /// Log-service (dbaas logs) operation
    LogsOperation,
    /// Load balancer task
    IpLoadbalancingTask,
    /// vRack task; the record is removed once the task completes
    VrackTask,
}

/// Status labels of one vocabulary for one operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTable {
    /// JSON field carrying the status
    pub field: &'static str,
    pub pending: &'static [&'static str],
    pub target: &'static [&'static str],
    /// Statuses meaning the remote gave up
    pub failed: &'static [&'static str],
}

impl StatusTable {
    /// Extract the status label from a snapshot
    pub fn status_of(&self, snapshot: &Value) -> Option<String> {
        match snapshot.get(self.field)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_failure(&self, status: &str) -> bool {
        self.failed.contains(&status)
    }
}

const KUBE_PENDING: &[&str] = &[
    "INSTALLING",
    "UPDATING",
    "REDEPLOYING",
    "RESETTING",
    "REOPENING",
];
const NODE_POOL_PENDING: &[&str] = &["INSTALLING", "UPDATING", "REDEPLOYING", "RESIZING"];
const KUBE_FAILED: &[&str] = &["ERROR"];

const PROJECT_OPERATION: StatusTable = StatusTable {
    field: "status",
    pending: &["created", "in-progress"],
    target: &["completed"],
    failed: &["in-error", "unknown"],
};

const LOGS_OPERATION: StatusTable = StatusTable {
    field: "state",
    pending: &["PENDING", "RECEIVED", "STARTED", "RETRY", "RUNNING"],
    target: &["SUCCESS"],
    failed: &["FAILURE", "REVOKED"],
};

const IPLB_TASK: StatusTable = StatusTable {
    field: "status",
    pending: &["todo", "doing"],
    target: &["done"],
    failed: &["error", "cancelled", "blocked"],
};

const VRACK_TASK: StatusTable = StatusTable {
    field: "status",
    pending: &["init", "todo", "doing"],
    target: &["done"],
    failed: &["error", "cancelled"],
};

impl Vocabulary {
    /// Status table for `kind`
    pub fn table(self, kind: OperationKind) -> StatusTable {
        use OperationKind::*;
        match (self, kind) {
            (Vocabulary::PrivateNetwork, Create | Update) => StatusTable {
                field: "status",
                pending: &["BUILDING"],
                target: &["ACTIVE"],
                failed: &["ERROR"],
            },
            (Vocabulary::PrivateNetwork, Delete) => StatusTable {
                field: "status",
                pending: &["DELETING", "ACTIVE", "BUILDING"],
                target: &["DELETED"],
                failed: &["ERROR"],
            },
            (Vocabulary::CloudUser, Create | Update) => StatusTable {
                field: "status",
                pending: &["creating"],
                target: &["ok"],
                failed: &[],
            },
            (Vocabulary::CloudUser, Delete) => StatusTable {
                field: "status",
                pending: &["deleting", "ok"],
                target: &["deleted"],
                failed: &[],
            },
            (Vocabulary::KubeCluster, Create | Update) => StatusTable {
                field: "status",
                pending: KUBE_PENDING,
                target: &["READY"],
                failed: KUBE_FAILED,
            },
            (Vocabulary::KubeNodePool, Create | Update) => StatusTable {
                field: "status",
                pending: NODE_POOL_PENDING,
                target: &["READY"],
                failed: KUBE_FAILED,
            },
            (Vocabulary::KubeCluster | Vocabulary::KubeNodePool, Delete) => StatusTable {
                field: "status",
                pending: &["DELETING", "READY"],
                target: &["DELETED"],
                failed: KUBE_FAILED,
            },
            (Vocabulary::ProjectOperation, _) => PROJECT_OPERATION,
            (Vocabulary::LogsOperation, _) => LOGS_OPERATION,
            (Vocabulary::IpLoadbalancingTask, _) => IPLB_TASK,
            (Vocabulary::VrackTask, _) => VRACK_TASK,
        }
    }

    /// Whether the status endpoint is the resource itself rather than a
    /// separate operation record
    pub fn tracks_resource(self) -> bool {
        matches!(
            self,
            Vocabulary::PrivateNetwork
                | Vocabulary::CloudUser
                | Vocabulary::KubeCluster
                | Vocabulary::KubeNodePool
        )
    }

    /// Whether a completed task disappears from its endpoint
    pub fn vanishes_on_completion(self) -> bool {
        matches!(self, Vocabulary::VrackTask)
    }

    /// Field of the mutating response carrying the handle id
    pub fn id_field(self) -> &'static str {
        match self {
            Vocabulary::LogsOperation => "operationId",
            _ => "id",
        }
    }

    /// Handle id from a mutating response, if it carries one
    pub fn handle_id(self, response: &Value) -> Option<String> {
        match response.get(self.id_field())? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Path polled for the status of operation `id`
    pub fn status_path(self, scope: &ResourceScope, id: &str) -> Result<String> {
        if scope.service.is_empty() {
            return Err(EngineError::InvalidHandle(format!(
                "{:?} handle {} has no service name",
                self, id
            )));
        }
        if id.is_empty() {
            return Err(EngineError::InvalidHandle(format!(
                "{:?} handle for {} has an empty id",
                self, scope.service
            )));
        }

        let service = &scope.service;
        let path = match self {
            Vocabulary::PrivateNetwork => {
                format!("/cloud/project/{}/network/private/{}", service, id)
            }
            Vocabulary::CloudUser => format!("/cloud/project/{}/user/{}", service, id),
            Vocabulary::KubeCluster => format!("/cloud/project/{}/kube/{}", service, id),
            Vocabulary::KubeNodePool => {
                let cluster = scope.cluster.as_deref().ok_or_else(|| {
                    EngineError::InvalidHandle(format!(
                        "node pool {} in {} has no cluster id",
                        id, service
                    ))
                })?;
                format!(
                    "/cloud/project/{}/kube/{}/nodepool/{}",
                    service, cluster, id
                )
            }
            Vocabulary::ProjectOperation => {
                format!("/cloud/project/{}/operation/{}", service, id)
            }
            Vocabulary::LogsOperation => format!("/dbaas/logs/{}/operation/{}", service, id),
            Vocabulary::IpLoadbalancingTask => {
                format!("/ipLoadbalancing/{}/task/{}", service, id)
            }
            Vocabulary::VrackTask => format!("/vrack/{}/task/{}", service, id),
        };
        Ok(path)
    }
}

impl std::fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Vocabulary::PrivateNetwork => "private-network",
            Vocabulary::CloudUser => "cloud-user",
            Vocabulary::KubeCluster => "kube-cluster",
            Vocabulary::KubeNodePool => "kube-node-pool",
            Vocabulary::ProjectOperation => "project-operation",
            Vocabulary::LogsOperation => "logs-operation",
            Vocabulary::IpLoadbalancingTask => "ip-loadbalancing-task",
            Vocabulary::VrackTask => "vrack-task",
        };
        f.write_str(name)
    }
}
