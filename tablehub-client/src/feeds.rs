//! Typed hub events and live feeds
//!
//! This module names the events the hub pushes and the methods it accepts,
//! defines their payloads, and offers two ready-made feeds:
//!
//! - [`TableDishFeed`]: the dishes ordered on one table (`DishesUpdated`,
//!   scoped by the `table-{id}` group)
//! - [`AreaTableFeed`]: the tables of one area (`TableUpdated`, scoped by
//!   the `area-{id}` group)
//!
//! A feed keeps its handler registered and its group joined across
//! reconnects and connection replacements. Dropping it removes the handler
//! and leaves the group.
//!
//! # Examples
//!
//! ```rust,no_run
//! use tablehub_client::feeds::{DishUpdate, TableDishFeed};
//! use tablehub_client::ManagerHandle;
//!
//! # fn example(manager: ManagerHandle) -> tablehub_core::Result<()> {
//! let feed = TableDishFeed::open(&manager, 7, |dishes: Vec<DishUpdate>| {
//!     for dish in dishes {
//!         println!("{} x{}", dish.dish_name, dish.quantity);
//!     }
//! })?;
//!
//! // The waiter opened another table
//! feed.switch_to(8);
//! # Ok(())
//! # }
//! ```

use crate::groups::{GroupKind, GroupMembership};
use crate::hub::EventHandler;
use crate::manager::{read_context, ConnectionContext, ManagerHandle};
use crate::subscription::EventSubscription;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tablehub_core::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Server push event names
pub mod events {
    pub const DISHES_UPDATED: &str = "DishesUpdated";
    pub const TABLE_UPDATED: &str = "TableUpdated";
    pub const RECEIVE_NOTIFICATION: &str = "ReceiveNotification";
    pub const JOINED_BACKUP_GROUP: &str = "JoinedBackupGroup";
    pub const SUBSCRIBED_TO_SESSION: &str = "SubscribedToSession";
    pub const SUBSCRIBED_TO_THUMBNAILS: &str = "SubscribedToThumbnails";
}

/// Remote method names
pub mod methods {
    pub const JOIN_TABLE: &str = "JoinTable";
    pub const LEAVE_TABLE: &str = "LeaveTable";
    pub const JOIN_AREA: &str = "JoinArea";
    pub const LEAVE_AREA: &str = "LeaveArea";
    pub const JOIN_BACKUP_GROUP: &str = "JoinBackupGroup";
    pub const LEAVE_BACKUP_GROUP: &str = "LeaveBackupGroup";
    pub const SUBSCRIBE_TO_BACKUP_SESSION: &str = "SubscribeToBackupSession";
    pub const UNSUBSCRIBE_FROM_BACKUP_SESSION: &str = "UnsubscribeFromBackupSession";
    pub const SUBSCRIBE_TO_TOPIC: &str = "SubscribeToTopic";
    pub const UNSUBSCRIBE_FROM_TOPIC: &str = "UnsubscribeFromTopic";
    pub const SUBSCRIBE_TO_THUMBNAIL_PROGRESS: &str = "SubscribeToThumbnailProgress";
    pub const SUBSCRIBE_TO_FILE_PROCESSING: &str = "SubscribeToFileProcessing";
    pub const UNSUBSCRIBE_FROM_FILE_PROCESSING: &str = "UnsubscribeFromFileProcessing";
}

/// A dish ordered on a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DishUpdate {
    pub id: i64,
    #[serde(rename = "dish_Name")]
    pub dish_name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "selling_Price")]
    pub selling_price: f64,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A table of an area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableUpdate {
    pub id: i64,
    pub name_table: String,
    pub area_name: String,
    pub is_active: bool,
    pub is_booking: bool,
    #[serde(default)]
    pub has_hourly_rate: Option<bool>,
    /// Price per minute for tables billed by time
    #[serde(default, rename = "priceOfMunite")]
    pub price_of_minute: Option<f64>,
    #[serde(default)]
    pub time_start: Option<String>,
    #[serde(default)]
    pub time_end: Option<String>,
}

/// Envelope of `ReceiveNotification`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Payload of `JoinedBackupGroup`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedBackupGroup {
    pub backup_id: String,
    pub timestamp: String,
}

/// Payload of `SubscribedToSession`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedToSession {
    pub session_id: String,
    pub timestamp: String,
}

/// Payload of `SubscribedToThumbnails`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribedToThumbnails {
    pub timestamp: String,
}

/// Decode the first argument of an event
pub fn first_argument<T: DeserializeOwned>(args: &[Value]) -> Result<T> {
    let value = args.first().cloned().unwrap_or(Value::Null);
    Ok(serde_json::from_value(value)?)
}

/// Handler that decodes the first argument as a list of `T`
fn list_handler<T, F>(event: &'static str, on_update: F) -> EventHandler
where
    T: DeserializeOwned,
    F: Fn(Vec<T>) + Send + Sync + 'static,
{
    Arc::new(move |args: &[Value]| match first_argument::<Vec<T>>(args) {
        Ok(items) => {
            tracing::debug!(event, count = items.len(), "Feed update received");
            on_update(items);
        }
        Err(error) => tracing::warn!(event, error = %error, "Malformed feed update"),
    })
}

/// An event subscription plus membership in the group that scopes it
struct GroupFeed {
    subscription: EventSubscription,
    target: watch::Sender<i64>,
    task: JoinHandle<()>,
}

impl GroupFeed {
    fn open(
        manager: &ManagerHandle,
        kind: GroupKind,
        event: &'static str,
        id: i64,
        handler: EventHandler,
    ) -> Result<Self> {
        let subscription = EventSubscription::with_handler(manager, event, handler)?;
        let context = manager.subscribe();
        read_context(&context)?;

        let (target, target_rx) = watch::channel(id);
        let membership = GroupMembership::new(manager, kind);
        let task = tokio::spawn(follow_group(context, target_rx, membership));

        Ok(Self {
            subscription,
            target,
            task,
        })
    }

    fn switch_to(&self, id: i64) {
        self.target.send_if_modified(|current| {
            let modified = *current != id;
            *current = id;
            modified
        });
    }
}

impl Drop for GroupFeed {
    fn drop(&mut self) {
        // Dropping the task drops its membership, which leaves the group
        self.task.abort();
    }
}

/// Keep `membership` in the target group of the connected transport
async fn follow_group(
    mut context: watch::Receiver<ConnectionContext>,
    mut target: watch::Receiver<i64>,
    mut membership: GroupMembership,
) {
    let mut joined: Option<(u64, i64)> = None;

    loop {
        // A reconnect in progress records an error; the server forgets
        // group memberships of the lost transport, so join again afterwards
        let (ready, generation) = {
            let current = context.borrow_and_update();
            (current.is_connected() && current.error().is_none(), current.generation)
        };
        let id = *target.borrow_and_update();

        if !ready {
            joined = None;
        } else if joined != Some((generation, id)) {
            match membership.switch_to(id).await {
                Ok(true) => joined = Some((generation, id)),
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(group = %membership.kind().group_name(id), error = %error, "Failed to join group");
                }
            }
        }

        tokio::select! {
            changed = context.changed() => if changed.is_err() { break },
            changed = target.changed() => if changed.is_err() { break },
        }
    }
}

/// Live dishes of one table
pub struct TableDishFeed {
    inner: GroupFeed,
}

impl TableDishFeed {
    /// Follow the dishes of `table_id`, calling `on_update` with every list
    ///
    /// # Errors
    ///
    /// `Error::OutsideScope` if the manager has shut down.
    pub fn open<F>(manager: &ManagerHandle, table_id: i64, on_update: F) -> Result<Self>
    where
        F: Fn(Vec<DishUpdate>) + Send + Sync + 'static,
    {
        let handler = list_handler(events::DISHES_UPDATED, on_update);
        let inner = GroupFeed::open(manager, GroupKind::Table, events::DISHES_UPDATED, table_id, handler)?;
        Ok(Self { inner })
    }

    /// Follow another table
    pub fn switch_to(&self, table_id: i64) {
        self.inner.switch_to(table_id);
    }

    pub fn table_id(&self) -> i64 {
        *self.inner.target.borrow()
    }

    /// The latest dish list, if one arrived
    pub fn latest(&self) -> Result<Option<Vec<DishUpdate>>> {
        self.inner.subscription.argument(0)
    }
}

/// Live tables of one area
pub struct AreaTableFeed {
    inner: GroupFeed,
}

impl AreaTableFeed {
    /// Follow the tables of `area_id`, calling `on_update` with every list
    pub fn open<F>(manager: &ManagerHandle, area_id: i64, on_update: F) -> Result<Self>
    where
        F: Fn(Vec<TableUpdate>) + Send + Sync + 'static,
    {
        let handler = list_handler(events::TABLE_UPDATED, on_update);
        let inner = GroupFeed::open(manager, GroupKind::Area, events::TABLE_UPDATED, area_id, handler)?;
        Ok(Self { inner })
    }

    pub fn switch_to(&self, area_id: i64) {
        self.inner.switch_to(area_id);
    }

    pub fn area_id(&self) -> i64 {
        *self.inner.target.borrow()
    }

    pub fn latest(&self) -> Result<Option<Vec<TableUpdate>>> {
        self.inner.subscription.argument(0)
    }
}
