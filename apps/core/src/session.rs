use std::fmt::{Display, Formatter};

use crate::activation::{ActivationAction, ActivationController, ActivationPolicy, ActivationTrigger};
use crate::backend::{BackendError, BackendSignal, QueryChannel};
use crate::launcher::LaunchError;
use crate::logging;
use crate::model::{ResultEntry, Session, SessionPhase};
use crate::protocol::{self, ProtocolEvent};
use crate::surface::Surface;

pub const INDEXING_STARTED_MESSAGE: &str = "Fuzzy Finder is indexing your directories.";
pub const STILL_INDEXING_MESSAGE: &str =
    "Your directories are currently being indexed. Please wait.";

#[derive(Debug)]
pub enum SessionError {
    NoSuchResult(usize),
    Launch(LaunchError),
    Backend(BackendError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSuchResult(index) => write!(f, "no result at index {index}"),
            Self::Launch(error) => write!(f, "launch error: {error}"),
            Self::Backend(error) => write!(f, "backend error: {error}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<LaunchError> for SessionError {
    fn from(value: LaunchError) -> Self {
        Self::Launch(value)
    }
}

impl From<BackendError> for SessionError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    BackendStarted,
    Backend(BackendSignal),
    InputChanged(String),
    Activation(ActivationTrigger),
    Launch(usize),
    Submit,
    RestartBackend,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct SessionCoordinator<C: QueryChannel, S: Surface> {
    session: Session,
    results: Vec<ResultEntry>,
    no_results: bool,
    activation: ActivationController,
    channel: C,
    surface: S,
    hotkey_hint: String,
}

impl<C: QueryChannel, S: Surface> SessionCoordinator<C, S> {
    pub fn new(channel: C, surface: S, policy: ActivationPolicy, hotkey_hint: &str) -> Self {
        Self {
            session: Session::default(),
            results: Vec::new(),
            no_results: false,
            activation: ActivationController::new(policy),
            channel,
            surface,
            hotkey_hint: hotkey_hint.to_string(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn results(&self) -> &[ResultEntry] {
        &self.results
    }

    pub fn shows_no_results(&self) -> bool {
        self.no_results
    }

    pub fn is_visible(&self) -> bool {
        self.activation.is_visible()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn handle(&mut self, event: SessionEvent) -> Flow {
        match event {
            SessionEvent::BackendStarted => self.begin_indexing(),
            SessionEvent::Backend(BackendSignal::Line(line)) => self.on_backend_line(&line),
            SessionEvent::Backend(BackendSignal::Exited(code)) => self.on_backend_exited(code),
            SessionEvent::InputChanged(text) => self.on_input_changed(&text),
            SessionEvent::Activation(trigger) => self.on_activation(trigger),
            SessionEvent::Launch(index) => {
                let _ = self.launch(index);
            }
            SessionEvent::Submit => self.submit(),
            SessionEvent::RestartBackend => {
                let _ = self.restart_backend();
            }
            SessionEvent::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    pub fn begin_indexing(&mut self) {
        if self.session.phase != SessionPhase::Uninitialized {
            return;
        }
        self.session.phase = SessionPhase::Indexing;
        self.surface.notify(INDEXING_STARTED_MESSAGE);
    }

    pub fn on_input_changed(&mut self, raw: &str) {
        if self.session.is_failed() {
            logging::warn("query ignored: backend is not running");
            return;
        }

        let query = protocol::sanitize_query(raw);
        if query.is_empty() {
            self.reset_search();
            return;
        }

        if query != raw {
            self.surface.set_query_text(&query);
        }
        self.session.accepting_results = false;
        self.session.current_query = query;

        if let Err(error) = self.channel.write_line(&self.session.current_query) {
            self.fail_backend(&format!("Search backend unavailable: {error}"));
        }
    }

    pub fn on_backend_line(&mut self, line: &str) {
        match protocol::decode_line(line) {
            Ok(event) => self.apply(event),
            Err(error) => {
                self.session.protocol_violations += 1;
                logging::warn(&format!("protocol violation dropped: {error}"));
            }
        }
    }

    pub fn apply(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::IndexedMarker => self.on_indexed(),
            ProtocolEvent::QueryEcho { text } => self.on_echo(&text),
            ProtocolEvent::ResultRecord { name, path } => {
                self.on_record(ResultEntry { name, path });
            }
        }
    }

    pub fn on_backend_exited(&mut self, code: Option<i32>) {
        let detail = code
            .map(|code| format!("exit code {code}"))
            .unwrap_or_else(|| "terminated".to_string());
        self.fail_backend(&format!(
            "The search backend stopped ({detail}). Restart it from the tray menu."
        ));
    }

    pub fn on_activation(&mut self, trigger: ActivationTrigger) {
        let phase = self.session.phase;
        let failed = self.session.is_failed();
        match self.activation.on_trigger(trigger, phase, failed) {
            ActivationAction::Show => {
                self.reset_search();
                self.surface.show_window();
            }
            ActivationAction::FocusExisting => self.surface.focus_window(),
            ActivationAction::Hide => self.surface.hide_window(),
            ActivationAction::NotifyIndexing => self.surface.notify(STILL_INDEXING_MESSAGE),
            ActivationAction::NotifyFailure => {
                let message = self
                    .session
                    .backend_failure
                    .clone()
                    .unwrap_or_else(|| "The search backend is not running.".to_string());
                self.surface.notify(&message);
            }
            ActivationAction::Ignore => {}
        }
    }

    pub fn launch(&mut self, index: usize) -> Result<(), SessionError> {
        let path = match self.results.get(index) {
            Some(entry) => entry.path.clone(),
            None => {
                logging::warn(&format!(
                    "launch ignored: index={index} results={}",
                    self.results.len()
                ));
                self.surface.notify(&format!("There is no result {index} to open."));
                return Err(SessionError::NoSuchResult(index));
            }
        };

        self.on_activation(ActivationTrigger::Launched);
        if let Err(error) = self.surface.open_path(&path) {
            logging::warn(&format!("launch failed path={}: {error}", path.display()));
            self.surface.notify(&format!("Could not open {}: {error}", path.display()));
            return Err(error.into());
        }
        logging::info(&format!("launched path={}", path.display()));
        Ok(())
    }

    pub fn submit(&mut self) {
        if self.session.result_count > 0 {
            let _ = self.launch(0);
        }
    }

    pub fn restart_backend(&mut self) -> Result<(), SessionError> {
        if let Err(error) = self.channel.restart() {
            self.fail_backend(&format!("Search backend restart failed: {error}"));
            return Err(error.into());
        }
        self.session.backend_failure = None;
        self.reset_search();
        logging::info("backend restarted");
        self.surface.notify("Search backend restarted.");
        Ok(())
    }

    fn on_indexed(&mut self) {
        if self.session.phase == SessionPhase::Ready {
            return;
        }
        self.session.phase = SessionPhase::Ready;
        logging::info("backend reported initial index complete");
        self.surface.notify(&format!(
            "Indexing complete. Press {} to open the finder window.",
            self.hotkey_hint
        ));
    }

    fn on_echo(&mut self, text: &str) {
        self.clear_results();
        let current = !self.session.current_query.is_empty() && text == self.session.current_query;
        self.session.accepting_results = current;
        self.set_no_results(current);
    }

    fn on_record(&mut self, entry: ResultEntry) {
        if !self.session.accepting_results || self.session.phase != SessionPhase::Ready {
            self.session.discarded_results += 1;
            return;
        }

        if self.no_results {
            self.set_no_results(false);
        }
        let index = self.results.len();
        self.surface.append_result(index, &entry);
        self.results.push(entry);
        self.session.result_count += 1;
    }

    fn reset_search(&mut self) {
        self.session.accepting_results = false;
        self.session.current_query.clear();
        self.clear_results();
        self.set_no_results(false);
        self.surface.set_query_text("");
    }

    fn clear_results(&mut self) {
        self.results.clear();
        self.session.result_count = 0;
        self.surface.clear_results();
    }

    fn set_no_results(&mut self, visible: bool) {
        if self.no_results != visible {
            self.no_results = visible;
            self.surface.set_no_results(visible);
        }
    }

    fn fail_backend(&mut self, message: &str) {
        self.session.accepting_results = false;
        if self.session.is_failed() {
            return;
        }
        logging::error(message);
        self.session.backend_failure = Some(message.to_string());
        self.surface.notify(message);
    }
}

#[cfg(test)]
mod tests {
    use super::{Flow, SessionCoordinator, SessionEvent};
    use crate::activation::{ActivationPolicy, ActivationTrigger};
    use crate::backend::{BackendSignal, RecordingChannel};
    use crate::model::SessionPhase;
    use crate::surface::{MockSurface, SurfaceCall};

    fn coordinator() -> SessionCoordinator<RecordingChannel, MockSurface> {
        SessionCoordinator::new(
            RecordingChannel::default(),
            MockSurface::default(),
            ActivationPolicy::default(),
            "Ctrl+Space",
        )
    }

    #[test]
    fn backend_started_moves_to_indexing_once() {
        let mut coordinator = coordinator();
        assert_eq!(coordinator.session().phase, SessionPhase::Uninitialized);
        coordinator.handle(SessionEvent::BackendStarted);
        coordinator.handle(SessionEvent::BackendStarted);
        assert_eq!(coordinator.session().phase, SessionPhase::Indexing);
        assert_eq!(coordinator.surface().notifications().len(), 1);
    }

    #[test]
    fn quit_event_stops_the_loop() {
        let mut coordinator = coordinator();
        assert_eq!(coordinator.handle(SessionEvent::Quit), Flow::Quit);
        assert_eq!(
            coordinator.handle(SessionEvent::InputChanged("x".into())),
            Flow::Continue
        );
    }

    #[test]
    fn placeholder_appears_after_matching_echo_and_clears_on_first_record() {
        let mut coordinator = coordinator();
        coordinator.handle(SessionEvent::Backend(BackendSignal::Line(":indexed".into())));
        coordinator.handle(SessionEvent::InputChanged("foo".into()));
        assert!(!coordinator.shows_no_results());

        coordinator.on_backend_line(":foo");
        assert!(coordinator.shows_no_results());
        assert!(coordinator.surface().shows_no_results());

        coordinator.on_backend_line("a|/a");
        assert!(!coordinator.shows_no_results());
        let calls = coordinator.surface().calls();
        let hide_at = calls
            .iter()
            .rposition(|call| *call == SurfaceCall::NoResults(false))
            .unwrap();
        assert!(matches!(calls[hide_at + 1], SurfaceCall::Append(0, _)));
    }

    #[test]
    fn stale_echo_shows_no_placeholder() {
        let mut coordinator = coordinator();
        coordinator.on_backend_line(":indexed");
        coordinator.on_input_changed("fo");
        coordinator.on_input_changed("foo");
        coordinator.on_backend_line(":fo");
        assert!(!coordinator.shows_no_results());
        assert!(!coordinator.session().accepting_results);
    }

    #[test]
    fn sanitized_text_is_pushed_back_to_the_search_box() {
        let mut coordinator = coordinator();
        coordinator.on_input_changed("foo(bar)");
        assert_eq!(coordinator.session().current_query, "foobar");
        assert!(coordinator
            .surface()
            .calls()
            .contains(&SurfaceCall::QueryText("foobar".into())));
        assert_eq!(coordinator.channel().lines(), ["foobar"]);
    }

    #[test]
    fn hotkey_before_ready_notifies_without_showing() {
        let mut coordinator = coordinator();
        coordinator.handle(SessionEvent::BackendStarted);
        coordinator.handle(SessionEvent::Activation(ActivationTrigger::Hotkey));
        assert!(!coordinator.is_visible());
        assert_eq!(
            coordinator.surface().notifications().last(),
            Some(&super::STILL_INDEXING_MESSAGE)
        );
    }
}
