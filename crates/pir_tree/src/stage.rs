//! Compilation stages and the per-session stage controller.
//!
//! A [`Stage`] marks a point in the lowering pipeline: stage 0 is the IR as
//! produced by the frontend (or loaded from a library), and each lowering pass
//! runs at its own stage number. Carriers are ordered by stage.
//!
//! The [`StageController`] owns the current stage of one session. It is passed
//! explicitly through every carrier operation; there is no global controller,
//! so independent sessions never observe each other's stage.

use crate::ids::DeclId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonic compilation-stage number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
pub struct Stage(u32);

impl Stage {
    /// The stage of freshly produced or freshly loaded IR.
    pub const INITIAL: Stage = Stage(0);

    /// Creates a stage from its number.
    pub const fn new(n: u32) -> Self {
        Self(n)
    }

    /// Returns the stage number.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the following stage.
    pub const fn next(self) -> Stage {
        Stage(self.0 + 1)
    }

    /// Returns the preceding stage, saturating at [`Stage::INITIAL`].
    pub const fn prev(self) -> Stage {
        Stage(self.0.saturating_sub(1))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {}", self.0)
    }
}

/// Callback the lowering pipeline installs to be told that a declaration is
/// about to be read or written at a stage it has not been lowered to yet.
///
/// The IC layer never runs lowerings itself; it only reports the lag.
pub trait LoweringHook: Send {
    /// Called with the declaration, the stage it is lowered up to, and the
    /// stage it must be lowered up to before the access proceeds.
    fn lazy_lower(&mut self, decl: DeclId, lowered_up_to: Stage, target: Stage);
}

/// Owner of a session's current stage, cache baseline, and lowering hooks.
pub struct StageController {
    current: Stage,
    baseline: Stage,
    bodies_enabled: bool,
    hooks: Vec<Box<dyn LoweringHook>>,
}

impl StageController {
    /// Creates a controller at [`Stage::INITIAL`] whose cache baseline is also
    /// the initial stage.
    pub fn new() -> Self {
        Self {
            current: Stage::INITIAL,
            baseline: Stage::INITIAL,
            bodies_enabled: true,
            hooks: Vec::new(),
        }
    }

    /// The stage lowerings are currently running at.
    pub fn current(&self) -> Stage {
        self.current
    }

    /// Sets the current stage. Used by the pipeline when a new pass starts and
    /// by scoped overrides; moving backwards is allowed for reads of older
    /// snapshots.
    pub fn set_current(&mut self, stage: Stage) {
        self.current = stage;
    }

    /// Advances to the next stage and returns it.
    pub fn advance(&mut self) -> Stage {
        self.current = self.current.next();
        self.current
    }

    /// The stage that IR loaded from a cache or library is considered to be at.
    /// Declarations created after it are "new".
    pub fn baseline(&self) -> Stage {
        self.baseline
    }

    /// Sets the cache baseline.
    pub fn set_baseline(&mut self, stage: Stage) {
        self.baseline = stage;
    }

    /// Whether declaration bodies may currently be read or written.
    pub fn bodies_enabled(&self) -> bool {
        self.bodies_enabled
    }

    /// Enables or disables body access (declaration-only lowerings run with
    /// bodies disabled).
    pub fn set_bodies_enabled(&mut self, enabled: bool) {
        self.bodies_enabled = enabled;
    }

    /// Installs a lowering hook.
    pub fn add_hook(&mut self, hook: Box<dyn LoweringHook>) {
        self.hooks.push(hook);
    }

    /// Returns the stage a declaration must be lowered up to before it may be
    /// accessed at the current stage, or `None` if `lowered_up_to` already
    /// satisfies it. Hooks are notified before returning `Some`.
    pub(crate) fn require_lowered(&mut self, decl: DeclId, lowered_up_to: Stage) -> Option<Stage> {
        let target = self.current.prev();
        if lowered_up_to >= target {
            return None;
        }
        for hook in &mut self.hooks {
            hook.lazy_lower(decl, lowered_up_to, target);
        }
        Some(target)
    }
}

impl Default for StageController {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StageController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageController")
            .field("current", &self.current)
            .field("baseline", &self.baseline)
            .field("bodies_enabled", &self.bodies_enabled)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<(DeclId, Stage, Stage)>>>);

    impl LoweringHook for Recorder {
        fn lazy_lower(&mut self, decl: DeclId, lowered_up_to: Stage, target: Stage) {
            self.0.lock().unwrap().push((decl, lowered_up_to, target));
        }
    }

    #[test]
    fn stage_arithmetic() {
        assert_eq!(Stage::INITIAL.next(), Stage::new(1));
        assert_eq!(Stage::INITIAL.prev(), Stage::INITIAL);
        assert_eq!(Stage::new(4).prev(), Stage::new(3));
        assert_eq!(Stage::new(2).to_string(), "stage 2");
    }

    #[test]
    fn advance_moves_forward() {
        let mut ctl = StageController::new();
        assert_eq!(ctl.current(), Stage::INITIAL);
        assert_eq!(ctl.advance(), Stage::new(1));
        assert_eq!(ctl.advance(), Stage::new(2));
    }

    #[test]
    fn require_lowered_notifies_hooks_only_when_lagging() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctl = StageController::new();
        ctl.add_hook(Box::new(Recorder(log.clone())));
        ctl.set_current(Stage::new(3));

        let d = DeclId::from_raw(0);
        assert_eq!(ctl.require_lowered(d, Stage::new(2)), None);
        assert_eq!(ctl.require_lowered(d, Stage::new(0)), Some(Stage::new(2)));

        let calls = log.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(d, Stage::new(0), Stage::new(2))]);
    }
}
