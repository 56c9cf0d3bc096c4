//! Monitor session: selection state and controller replacement

use std::sync::Arc;

use agent_monitor_core::{
    transition_marker, LogLevel, MonitorParams, PreconditionError, StreamMode, Target,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::fetch::AuthorizedFetch;
use crate::streaming::LogStreamController;

/// Notifications emitted by a session, never awaited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The level changed; the new controller is already running
    LevelChanged(LogLevel),
    /// The mode for the next controller changed
    ModeToggled(StreamMode),
}

/// Owns what the user selected and the one live controller
///
/// Replacing the controller always goes stop, harvest, construct: the old
/// controller is sealed and dropped before the new one starts, so at most
/// one transfer runs per session.
pub struct MonitorSession {
    fetch: Arc<dyn AuthorizedFetch>,
    config: MonitorConfig,
    target: Option<Target>,
    level: LogLevel,
    mode: StreamMode,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    controller: Option<LogStreamController>,
}

impl MonitorSession {
    pub fn new(fetch: Arc<dyn AuthorizedFetch>, config: MonitorConfig) -> Self {
        Self {
            fetch,
            config,
            target: None,
            level: LogLevel::default(),
            mode: StreamMode::default(),
            events: None,
            controller: None,
        }
    }

    /// Send [`SessionEvent`]s to `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Store a selection and return the request parameters it derives
    ///
    /// Nothing is connected or restarted here.
    pub fn configure(
        &mut self,
        target: Target,
        level: LogLevel,
        mode: StreamMode,
    ) -> Result<MonitorParams> {
        if target.id().is_empty() {
            return Err(PreconditionError::EmptyTargetId.into());
        }
        self.target = Some(target);
        self.level = level;
        self.mode = mode;
        self.params()
    }

    /// Request parameters for the current selection
    pub fn params(&self) -> Result<MonitorParams> {
        let target = self.target.clone().ok_or(PreconditionError::NotConfigured)?;
        Ok(MonitorParams::new(target, self.level))
    }

    /// Start the first controller, with an empty buffer
    #[instrument(skip(self))]
    pub fn attach(&mut self) -> Result<&LogStreamController> {
        if self.controller.is_some() {
            return Err(PreconditionError::AlreadyAttached.into());
        }
        let params = self.params()?;
        info!("Attaching monitor to {} at level {}", params.target, params.log_level);
        Ok(self.replace_controller(params, String::new()))
    }

    /// Restart at a new level, keeping prior output with a transition marker
    #[instrument(skip(self))]
    pub fn change_level(&mut self, level: LogLevel) -> Result<&LogStreamController> {
        let previous = self.controller.as_ref().ok_or(PreconditionError::NotAttached)?;
        previous.stop();

        self.level = level;
        self.emit(SessionEvent::LevelChanged(level));

        let mut seed = previous.current_buffer();
        seed.push_str(&transition_marker(&seed, level));

        let params = self.params()?;
        Ok(self.replace_controller(params, seed))
    }

    /// Flip streaming/paged for the next controller only
    ///
    /// The running controller is left as it is; call [`reconnect`] to apply.
    ///
    /// [`reconnect`]: MonitorSession::reconnect
    pub fn toggle_mode(&mut self) -> StreamMode {
        self.mode = self.mode.toggled();
        debug!("Next controller will use {:?} mode", self.mode);
        self.emit(SessionEvent::ModeToggled(self.mode));
        self.mode
    }

    /// Replace the controller with the same selection, keeping prior output
    #[instrument(skip(self))]
    pub fn reconnect(&mut self) -> Result<&LogStreamController> {
        let previous = self.controller.as_ref().ok_or(PreconditionError::NotAttached)?;
        previous.stop();
        let seed = previous.current_buffer();

        let params = self.params()?;
        Ok(self.replace_controller(params, seed))
    }

    /// Stop the current controller; its buffer stays readable
    pub fn stop(&self) {
        if let Some(controller) = &self.controller {
            controller.stop();
        }
    }

    pub fn controller(&self) -> Option<&LogStreamController> {
        self.controller.as_ref()
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Drop the old controller (already stopped and harvested), then start the new one
    fn replace_controller(&mut self, params: MonitorParams, seed: String) -> &LogStreamController {
        drop(self.controller.take());
        let options = self.config.controller_options(self.mode);
        self.controller.insert(LogStreamController::start(
            Arc::clone(&self.fetch),
            self.config.endpoint.clone(),
            params,
            seed,
            options,
        ))
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            // Receiver may already be gone
            let _ = events.send(event);
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agent_monitor_core::PayloadFormat;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::MonitorError;
    use crate::streaming::ControllerStatus;
    use crate::testing::{wait_for, ScriptedFetch, Step};

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> MonitorConfig {
        MonitorConfig {
            format: PayloadFormat::Plain,
            reconnect: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 100,
            },
            ..MonitorConfig::default()
        }
    }

    fn session(fetch: &Arc<ScriptedFetch>) -> MonitorSession {
        MonitorSession::new(fetch.clone(), config())
    }

    #[test]
    fn test_configure_derives_params() {
        let fetch = Arc::new(ScriptedFetch::new());
        let mut session = session(&fetch);

        let params = session
            .configure(Target::Client("c-1".into()), LogLevel::Warn, StreamMode::Streaming)
            .unwrap();

        assert_eq!(
            params.to_query(),
            vec![
                ("client_id".to_string(), "c-1".to_string()),
                ("log_level".to_string(), "warn".to_string()),
            ]
        );
        assert_eq!(fetch.request_count(), 0);
    }

    #[test]
    fn test_invalid_selection_fails_before_network() {
        let fetch = Arc::new(ScriptedFetch::new());
        let mut session = session(&fetch);

        assert_eq!(
            session.attach().err(),
            Some(MonitorError::Precondition(PreconditionError::NotConfigured))
        );
        assert_eq!(
            session
                .configure(Target::Server(String::new()), LogLevel::Info, StreamMode::Streaming)
                .err(),
            Some(MonitorError::Precondition(PreconditionError::EmptyTargetId))
        );
        assert_eq!(
            session.change_level(LogLevel::Debug).err(),
            Some(MonitorError::Precondition(PreconditionError::NotAttached))
        );
        assert_eq!(fetch.request_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_streams_with_server_key() {
        let fetch = Arc::new(ScriptedFetch::new());
        fetch.respond(vec![Step::text("hello\n"), Step::Hold]);

        let mut session = session(&fetch);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        let controller = session.attach().unwrap();

        assert!(wait_for(|| controller.current_buffer() == "hello\n", WAIT).await);
        let request = &fetch.requests()[0];
        assert_eq!(request.param("server_id"), Some("s-1"));
        assert_eq!(request.param("log_level"), Some("info"));
    }

    #[tokio::test]
    async fn test_attach_twice_is_rejected() {
        let fetch = Arc::new(ScriptedFetch::new());
        fetch.respond(vec![Step::Hold]);

        let mut session = session(&fetch);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        session.attach().unwrap();

        assert_eq!(
            session.attach().err(),
            Some(MonitorError::Precondition(PreconditionError::AlreadyAttached))
        );
    }

    #[tokio::test]
    async fn test_change_level_keeps_output_and_marks_transition() {
        let fetch = Arc::new(ScriptedFetch::new());
        let old_conn = fetch.live();
        fetch.respond(vec![Step::text("B\n"), Step::Hold]);

        let (tx, mut events) = mpsc::unbounded_channel();
        let mut session = session(&fetch).with_events(tx);
        session
            .configure(Target::Client("c-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        let first = session.attach().unwrap();

        assert!(old_conn.send("A\n"));
        assert!(wait_for(|| first.current_buffer() == "A\n", WAIT).await);

        let controller = session.change_level(LogLevel::Debug).unwrap();
        assert!(
            wait_for(
                || controller.current_buffer() == "A\n...changing log level to debug...\n\nB\n",
                WAIT
            )
            .await
        );

        // The old connection is gone and its late chunk lands nowhere
        assert!(wait_for(|| old_conn.is_closed(), WAIT).await);
        old_conn.send("late\n");
        assert!(!session.controller().unwrap().current_buffer().contains("late"));

        assert_eq!(events.try_recv().unwrap(), SessionEvent::LevelChanged(LogLevel::Debug));
        assert_eq!(session.level(), LogLevel::Debug);
        assert_eq!(fetch.requests()[1].param("log_level"), Some("debug"));
        assert_eq!(fetch.request_count(), 2);
    }

    #[tokio::test]
    async fn test_change_level_with_empty_buffer_adds_no_marker() {
        let fetch = Arc::new(ScriptedFetch::new());
        fetch.respond(vec![Step::Hold]);
        fetch.respond(vec![Step::text("x"), Step::Hold]);

        let mut session = session(&fetch);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        session.attach().unwrap();

        let controller = session.change_level(LogLevel::Trace).unwrap();
        assert!(wait_for(|| controller.current_buffer() == "x", WAIT).await);
    }

    #[tokio::test]
    async fn test_level_change_with_closed_listener() {
        let fetch = Arc::new(ScriptedFetch::new());
        fetch.respond(vec![Step::Hold]);
        fetch.respond(vec![Step::Hold]);

        let (tx, events) = mpsc::unbounded_channel();
        drop(events);
        let mut session = session(&fetch).with_events(tx);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        session.attach().unwrap();

        assert!(session.change_level(LogLevel::Error).is_ok());
    }

    #[tokio::test]
    async fn test_toggle_mode_leaves_current_controller_running() {
        let fetch = Arc::new(ScriptedFetch::new());
        let conn = fetch.live();

        let (tx, mut events) = mpsc::unbounded_channel();
        let mut session = session(&fetch).with_events(tx);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        session.attach().unwrap();

        assert_eq!(session.toggle_mode(), StreamMode::Paged);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::ModeToggled(StreamMode::Paged));

        assert!(conn.send("still "));
        assert!(conn.send("growing"));
        let controller = session.controller().unwrap();
        assert!(wait_for(|| controller.current_buffer() == "still growing", WAIT).await);
        assert!(!conn.is_closed());
        assert_eq!(controller.mode(), StreamMode::Streaming);
        assert_eq!(controller.status(), ControllerStatus::Active);
        assert_eq!(fetch.request_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_applies_toggled_mode() {
        let fetch = Arc::new(ScriptedFetch::new());
        fetch.respond(vec![Step::text("streamed\n"), Step::Hold]);

        let mut session = session(&fetch);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        let first = session.attach().unwrap();
        assert!(wait_for(|| first.current_buffer() == "streamed\n", WAIT).await);

        session.toggle_mode();
        let controller = session.reconnect().unwrap();

        assert_eq!(controller.mode(), StreamMode::Paged);
        assert_eq!(controller.status(), ControllerStatus::Idle);
        assert_eq!(controller.current_buffer(), "streamed\n");
        assert_eq!(fetch.request_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_stops_controller() {
        let fetch = Arc::new(ScriptedFetch::new());
        let conn = fetch.live();

        let mut session = session(&fetch);
        session
            .configure(Target::Server("s-1".into()), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        session.attach().unwrap();
        assert!(wait_for(|| fetch.request_count() == 1, WAIT).await);

        drop(session);
        assert!(wait_for(|| conn.is_closed(), WAIT).await);
    }
}
