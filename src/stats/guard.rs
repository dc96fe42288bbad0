use std::cell::Cell;

use crate::catalog::UserId;

/// Session-scoped flag that keeps an analysis pass from starting another one.
///
/// States are `Idle` and `Analyzing`. [`AnalysisGuard::try_enter`] moves to
/// `Analyzing` and hands back a [`GuardToken`]; dropping the token (on any
/// path, including `?` and unwinding) moves back to `Idle`.
#[derive(Debug, Default)]
pub struct AnalysisGuard {
    analyzing: Cell<bool>,
}

impl AnalysisGuard {
    /// A guard in the `Idle` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `Analyzing`, or return `None` when a pass is already active.
    pub fn try_enter(&self) -> Option<GuardToken<'_>> {
        if self.analyzing.replace(true) {
            return None;
        }
        Some(GuardToken { guard: self })
    }

    /// Returns `true` while a pass holds the guard.
    pub fn is_active(&self) -> bool {
        self.analyzing.get()
    }
}

/// Proof that the holder owns the current analysis pass.
#[derive(Debug)]
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardToken<'g> {
    guard: &'g AnalysisGuard,
}

impl GuardToken<'_> {
    /// Release the guard explicitly.
    pub fn exit(self) {}
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.analyzing.set(false);
    }
}

/// The user a session runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    /// Role name.
    pub name: UserId,
    /// Superuser (or equivalently privileged) role.
    pub superuser: bool,
}

impl SessionUser {
    /// An unprivileged user.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: UserId::new(name),
            superuser: false,
        }
    }

    /// A superuser.
    pub fn superuser(name: impl Into<String>) -> Self {
        Self {
            name: UserId::new(name),
            superuser: true,
        }
    }

    /// May this user collect statistics on a relation owned by `owner`?
    pub fn may_maintain(&self, owner: &UserId) -> bool {
        self.superuser || &self.name == owner
    }
}

/// State owned by one session and threaded through every interception call.
#[derive(Debug)]
pub struct SessionContext {
    user: SessionUser,
    guard: AnalysisGuard,
    passes_started: Cell<u64>,
}

impl SessionContext {
    /// A fresh session for `user`.
    pub fn new(user: SessionUser) -> Self {
        Self {
            user,
            guard: AnalysisGuard::new(),
            passes_started: Cell::new(0),
        }
    }

    /// The session user.
    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    /// The session's re-entrancy guard.
    pub fn guard(&self) -> &AnalysisGuard {
        &self.guard
    }

    /// Number of analysis passes that got past the guard in this session.
    pub fn passes_started(&self) -> u64 {
        self.passes_started.get()
    }

    pub(crate) fn record_pass(&self) {
        self.passes_started.set(self.passes_started.get() + 1);
    }
}
