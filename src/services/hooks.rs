//! Typed hook bus.
//!
//! Observers register for one [`HookKind`] and are called synchronously, in
//! registration order, with the matching [`HookEvent`]. Vetoable events
//! carry a `do_expire` flag and the succession candidate event carries an
//! override slot; observers communicate only through those fields.
//!
//! Observers get the whole [`Matrix`] and may mutate it, including deleting
//! unrelated records. Callers that iterate while firing hooks snapshot their
//! work list first.

use crate::state::{EntityId, Matrix};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    AccountDelete,
    AccountRename,
    ChannelPickSuccessor,
    ChannelSuccession,
    AccountCheckExpire,
    NickCheckExpire,
    ChannelCheckExpire,
    ChannelDrop,
    ChannelRegister,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    /// An account is about to be deleted; it is still fully present.
    AccountDelete { account: EntityId, name: String },

    /// An account was renamed.
    AccountRename { account: EntityId, old_name: String },

    /// A channel lost its last founder. Setting `successor` overrides the
    /// built-in election.
    ChannelPickSuccessor {
        channel: String,
        successor: Option<EntityId>,
    },

    /// `successor` became founder of `channel`.
    ChannelSuccession { channel: String, successor: EntityId },

    /// Clear `do_expire` to keep the account.
    AccountCheckExpire { account: EntityId, do_expire: bool },

    /// Clear `do_expire` to keep the nickname.
    NickCheckExpire { nick: String, do_expire: bool },

    /// Clear `do_expire` to keep the registration.
    ChannelCheckExpire { channel: String, do_expire: bool },

    /// A registration is about to be dropped.
    ChannelDrop { channel: String },

    /// A channel was registered.
    ChannelRegister { channel: String },
}

impl HookEvent {
    pub fn kind(&self) -> HookKind {
        match self {
            Self::AccountDelete { .. } => HookKind::AccountDelete,
            Self::AccountRename { .. } => HookKind::AccountRename,
            Self::ChannelPickSuccessor { .. } => HookKind::ChannelPickSuccessor,
            Self::ChannelSuccession { .. } => HookKind::ChannelSuccession,
            Self::AccountCheckExpire { .. } => HookKind::AccountCheckExpire,
            Self::NickCheckExpire { .. } => HookKind::NickCheckExpire,
            Self::ChannelCheckExpire { .. } => HookKind::ChannelCheckExpire,
            Self::ChannelDrop { .. } => HookKind::ChannelDrop,
            Self::ChannelRegister { .. } => HookKind::ChannelRegister,
        }
    }
}

/// A registered observer.
pub type HookFn = Arc<dyn Fn(&mut Matrix, &mut HookEvent) + Send + Sync>;

/// Observers per event kind.
#[derive(Default, Clone)]
pub struct HookBus {
    observers: HashMap<HookKind, Vec<HookFn>>,
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.observers.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookBus").field("observers", &counts).finish()
    }
}

impl HookBus {
    fn observers(&self, kind: HookKind) -> Vec<HookFn> {
        self.observers.get(&kind).cloned().unwrap_or_default()
    }
}

impl Matrix {
    /// Register an observer for one kind of event.
    pub fn hook_add<F>(&mut self, kind: HookKind, f: F)
    where
        F: Fn(&mut Matrix, &mut HookEvent) + Send + Sync + 'static,
    {
        self.hooks.observers.entry(kind).or_default().push(Arc::new(f));
    }

    /// Drop every observer of one kind.
    pub fn hook_clear(&mut self, kind: HookKind) {
        self.hooks.observers.remove(&kind);
    }

    /// Fire an event at its observers.
    ///
    /// The observer list is taken before the first call, so observers added
    /// during dispatch see only later events.
    pub(crate) fn hook_call(&mut self, event: &mut HookEvent) {
        let observers = self.hooks.observers(event.kind());
        if observers.is_empty() {
            return;
        }
        trace!(kind = ?event.kind(), count = observers.len(), "Dispatching hook");
        for observer in observers {
            observer(self, event);
        }
    }
}
