//! Server-side group membership
//!
//! The hub scopes push events with groups: a client that joined `table-7`
//! receives the dish updates of table 7, a client in `area-2` receives the
//! table updates of area 2. [`GroupMembership`] tracks the one group of a
//! kind the client is in and moves it when the scope changes.

use crate::connection_state::HubConnectionState;
use crate::invoke::Invoker;
use crate::manager::ManagerHandle;
use serde_json::Value;
use std::fmt;
use tablehub_core::Result;

/// The kinds of group the hub offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// Dish updates of one table
    Table,
    /// Table updates of one area
    Area,
}

impl GroupKind {
    pub fn join_method(&self) -> &'static str {
        match self {
            GroupKind::Table => "JoinTable",
            GroupKind::Area => "JoinArea",
        }
    }

    pub fn leave_method(&self) -> &'static str {
        match self {
            GroupKind::Table => "LeaveTable",
            GroupKind::Area => "LeaveArea",
        }
    }

    /// Server-side group name, e.g. `table-7`
    pub fn group_name(&self, id: i64) -> String {
        format!("{}-{}", self.prefix(), id)
    }

    fn prefix(&self) -> &'static str {
        match self {
            GroupKind::Table => "table",
            GroupKind::Area => "area",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Membership in at most one group of a kind
///
/// Dropping the membership leaves its group in the background if the
/// connection is still up.
pub struct GroupMembership {
    kind: GroupKind,
    invoker: Invoker,
    current: Option<i64>,
}

impl GroupMembership {
    pub fn new(manager: &ManagerHandle, kind: GroupKind) -> Self {
        Self::with_invoker(Invoker::new(manager), kind)
    }

    pub fn with_invoker(invoker: Invoker, kind: GroupKind) -> Self {
        Self {
            kind,
            invoker,
            current: None,
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Id of the group joined last
    pub fn current(&self) -> Option<i64> {
        self.current
    }

    /// Move into the group `id`
    ///
    /// Returns `Ok(false)` without touching the network unless the
    /// connection is `Connected`. The previous group is left first when it
    /// differs; a failure to leave is logged and does not stop the join.
    ///
    /// # Errors
    ///
    /// The join invocation failed; the previous group is then no longer
    /// recorded.
    pub async fn switch_to(&mut self, id: i64) -> Result<bool> {
        if !self.connection_ready() {
            tracing::debug!(group = %self.kind.group_name(id), "Connection not ready, skipping join");
            return Ok(false);
        }

        if let Some(previous) = self.current.take() {
            if previous != id {
                if let Err(error) = self
                    .invoker
                    .invoke(self.kind.leave_method(), vec![Value::from(previous)])
                    .await
                {
                    tracing::warn!(group = %self.kind.group_name(previous), error = %error, "Failed to leave group");
                }
            }
        }

        self.invoker
            .invoke(self.kind.join_method(), vec![Value::from(id)])
            .await?;
        self.current = Some(id);
        tracing::info!(group = %self.kind.group_name(id), "Joined group");
        Ok(true)
    }

    /// Leave the current group; returns whether a leave was sent
    pub async fn leave(&mut self) -> Result<bool> {
        let Some(id) = self.current else {
            return Ok(false);
        };
        if !self.connection_ready() {
            self.current = None;
            return Ok(false);
        }

        self.current = None;
        self.invoker
            .invoke(self.kind.leave_method(), vec![Value::from(id)])
            .await?;
        tracing::info!(group = %self.kind.group_name(id), "Left group");
        Ok(true)
    }

    fn connection_ready(&self) -> bool {
        self.invoker
            .connection()
            .is_some_and(|connection| connection.state() == HubConnectionState::Connected)
    }
}

impl Drop for GroupMembership {
    fn drop(&mut self) {
        let Some(id) = self.current.take() else {
            return;
        };
        let Some(connection) = self
            .invoker
            .connection()
            .filter(|connection| connection.state() == HubConnectionState::Connected)
        else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(group = %self.kind.group_name(id), "No runtime, not leaving group");
            return;
        };

        let method = self.kind.leave_method();
        let group = self.kind.group_name(id);
        runtime.spawn(async move {
            if let Err(error) = connection.invoke(method, vec![Value::from(id)]).await {
                tracing::warn!(group = %group, error = %error, "Failed to leave group on drop");
            }
        });
    }
}
