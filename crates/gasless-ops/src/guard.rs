//! One in-flight invocation per user action.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use gasless_types::{GaslessError, Result};

/// User actions that must not overlap with themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Login and logout share one flag.
    Auth,
    CreateWallet,
    Send,
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Auth => "login/logout",
            ActionKind::CreateWallet => "create wallet",
            ActionKind::Send => "send",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// In-flight flags, one per [`ActionKind`].
#[derive(Debug, Default)]
pub struct ActionGuards {
    auth: AtomicBool,
    create_wallet: AtomicBool,
    send: AtomicBool,
}

impl ActionGuards {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, kind: ActionKind) -> &AtomicBool {
        match kind {
            ActionKind::Auth => &self.auth,
            ActionKind::CreateWallet => &self.create_wallet,
            ActionKind::Send => &self.send,
        }
    }

    /// Claim the flag for `kind`. Fails if an invocation is already pending.
    pub fn try_begin(&self, kind: ActionKind) -> Result<InFlight<'_>> {
        let flag = self.flag(kind);
        if flag.swap(true, Ordering::SeqCst) {
            return Err(GaslessError::Precondition(format!("{kind} already in progress")));
        }
        Ok(InFlight { flag, kind })
    }

    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.flag(kind).load(Ordering::SeqCst)
    }
}

/// Releases its flag when dropped, on every exit path.
#[derive(Debug)]
pub struct InFlight<'a> {
    flag: &'a AtomicBool,
    kind: ActionKind,
}

impl InFlight<'_> {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
