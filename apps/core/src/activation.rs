use crate::model::SessionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTrigger {
    Hotkey,
    TrayShow,
    SecondInstance,
    Launched,
    Close,
    FocusLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationAction {
    Show,
    FocusExisting,
    Hide,
    NotifyIndexing,
    NotifyFailure,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationPolicy {
    pub hide_on_focus_loss: bool,
}

impl Default for ActivationPolicy {
    fn default() -> Self {
        Self {
            hide_on_focus_loss: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivationController {
    visible: bool,
    policy: ActivationPolicy,
}

impl ActivationController {
    pub fn new(policy: ActivationPolicy) -> Self {
        Self {
            visible: false,
            policy,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn on_trigger(
        &mut self,
        trigger: ActivationTrigger,
        phase: SessionPhase,
        backend_failed: bool,
    ) -> ActivationAction {
        match trigger {
            ActivationTrigger::Hotkey if self.visible => self.hide(),
            ActivationTrigger::Hotkey
            | ActivationTrigger::TrayShow
            | ActivationTrigger::SecondInstance => self.reveal(phase, backend_failed),
            ActivationTrigger::Launched | ActivationTrigger::Close => self.hide(),
            ActivationTrigger::FocusLost if self.policy.hide_on_focus_loss => self.hide(),
            ActivationTrigger::FocusLost => ActivationAction::Ignore,
        }
    }

    fn reveal(&mut self, phase: SessionPhase, backend_failed: bool) -> ActivationAction {
        if backend_failed {
            return ActivationAction::NotifyFailure;
        }
        if phase != SessionPhase::Ready {
            return ActivationAction::NotifyIndexing;
        }
        if self.visible {
            return ActivationAction::FocusExisting;
        }
        self.visible = true;
        ActivationAction::Show
    }

    fn hide(&mut self) -> ActivationAction {
        if !self.visible {
            return ActivationAction::Ignore;
        }
        self.visible = false;
        ActivationAction::Hide
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivationAction, ActivationController, ActivationPolicy, ActivationTrigger};
    use crate::model::SessionPhase;

    const READY: SessionPhase = SessionPhase::Ready;

    #[test]
    fn hotkey_toggles_visibility() {
        let mut state = ActivationController::default();
        assert_eq!(
            state.on_trigger(ActivationTrigger::Hotkey, READY, false),
            ActivationAction::Show
        );
        assert!(state.is_visible());
        assert_eq!(
            state.on_trigger(ActivationTrigger::Hotkey, READY, false),
            ActivationAction::Hide
        );
        assert!(!state.is_visible());
    }

    #[test]
    fn triggers_while_indexing_only_notify() {
        let mut state = ActivationController::default();
        for trigger in [
            ActivationTrigger::Hotkey,
            ActivationTrigger::TrayShow,
            ActivationTrigger::SecondInstance,
        ] {
            assert_eq!(
                state.on_trigger(trigger, SessionPhase::Indexing, false),
                ActivationAction::NotifyIndexing
            );
            assert_eq!(
                state.on_trigger(trigger, SessionPhase::Uninitialized, false),
                ActivationAction::NotifyIndexing
            );
        }
        assert!(!state.is_visible());
    }

    #[test]
    fn failed_backend_reports_instead_of_showing() {
        let mut state = ActivationController::default();
        assert_eq!(
            state.on_trigger(ActivationTrigger::Hotkey, READY, true),
            ActivationAction::NotifyFailure
        );
        assert!(!state.is_visible());
    }

    #[test]
    fn second_instance_raises_visible_window() {
        let mut state = ActivationController::default();
        state.on_trigger(ActivationTrigger::TrayShow, READY, false);
        assert_eq!(
            state.on_trigger(ActivationTrigger::SecondInstance, READY, false),
            ActivationAction::FocusExisting
        );
        assert!(state.is_visible());
    }

    #[test]
    fn launch_and_close_hide_only_when_visible() {
        let mut state = ActivationController::default();
        assert_eq!(
            state.on_trigger(ActivationTrigger::Close, READY, false),
            ActivationAction::Ignore
        );
        state.on_trigger(ActivationTrigger::Hotkey, READY, false);
        assert_eq!(
            state.on_trigger(ActivationTrigger::Launched, READY, false),
            ActivationAction::Hide
        );
    }

    #[test]
    fn focus_loss_follows_policy() {
        let mut hides = ActivationController::default();
        hides.on_trigger(ActivationTrigger::Hotkey, READY, false);
        assert_eq!(
            hides.on_trigger(ActivationTrigger::FocusLost, READY, false),
            ActivationAction::Hide
        );

        let mut keeps = ActivationController::new(ActivationPolicy {
            hide_on_focus_loss: false,
        });
        keeps.on_trigger(ActivationTrigger::Hotkey, READY, false);
        assert_eq!(
            keeps.on_trigger(ActivationTrigger::FocusLost, READY, false),
            ActivationAction::Ignore
        );
        assert!(keeps.is_visible());
    }
}
