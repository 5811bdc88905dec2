//! Services policy: hooks, effects, succession and expiration.
//!
//! - [`hooks`]: typed observer bus
//! - [`effect`]: effects queued for the protocol layer
//! - [`succession`]: founder election when the last founder goes
//! - [`expire`]: the periodic expiration sweep

pub mod effect;
pub mod expire;
pub mod hooks;
pub mod succession;

pub use effect::ServiceEffect;
pub use expire::ExpireReport;
pub use hooks::{HookBus, HookEvent, HookFn, HookKind};
