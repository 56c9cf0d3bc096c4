//! Monitor command - tail an agent's log

use agent_monitor_client::{
    AuthorizedFetch, BufferUpdate, ControllerStatus, LogStreamController, MonitorConfig,
    MonitorSession,
};
use agent_monitor_core::{LogLevel, PageRequest, StreamMode, Target};
use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::output::OutputContext;

/// Bytes loaded by a paged fetch when neither `--head` nor `--tail` is given
pub const DEFAULT_PAGE_SIZE: u64 = 16 * 1024;

/// What to monitor and how
#[derive(Debug, Clone)]
pub struct MonitorArgs {
    pub target: Target,
    pub level: LogLevel,
    pub mode: StreamMode,
    pub head: Option<u64>,
    pub tail: Option<u64>,
}

impl MonitorArgs {
    fn page_request(&self) -> PageRequest {
        match (self.head, self.tail) {
            (Some(limit), _) => PageRequest::head(limit),
            (None, Some(limit)) => PageRequest::tail(limit),
            (None, None) => PageRequest::tail(DEFAULT_PAGE_SIZE),
        }
    }
}

/// A line typed while following
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Level(LogLevel),
    ToggleMode,
    Reconnect,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim() {
        "mode" => Some(Command::ToggleMode),
        "reconnect" => Some(Command::Reconnect),
        "quit" | "q" | "exit" => Some(Command::Quit),
        other => other.parse().ok().map(Command::Level),
    }
}

fn mode_name(mode: StreamMode) -> &'static str {
    match mode {
        StreamMode::Streaming => "streaming",
        StreamMode::Paged => "paged",
    }
}

/// Monitor an agent's log
pub async fn monitor(
    fetch: Arc<dyn AuthorizedFetch>,
    config: MonitorConfig,
    args: MonitorArgs,
    ctx: &OutputContext,
) -> Result<()> {
    let mut session = MonitorSession::new(fetch, config);
    session
        .configure(args.target.clone(), args.level, args.mode)
        .context("Invalid monitor target")?;

    let result = match args.mode {
        StreamMode::Paged => print_page(&mut session, args.page_request(), ctx).await,
        StreamMode::Streaming => follow(&mut session, ctx).await,
    };
    session.stop();
    result
}

/// Fetch one range and print it
async fn print_page(
    session: &mut MonitorSession,
    page: PageRequest,
    ctx: &OutputContext,
) -> Result<()> {
    let controller = session.attach()?;
    let added = controller
        .fetch_page(page)
        .await
        .context("Failed to fetch log range")?;
    ctx.log(&controller.current_buffer());
    debug!("Loaded {} byte(s)", added);
    Ok(())
}

/// Printing position in the active controller's buffer
struct View {
    updates: broadcast::Receiver<BufferUpdate>,
    status: watch::Receiver<ControllerStatus>,
    printed: usize,
}

impl View {
    fn new(controller: &LogStreamController) -> Self {
        Self {
            updates: controller.buffer().subscribe(),
            status: controller.watch_status(),
            printed: 0,
        }
    }

    /// Follow a replacement controller, whose seed repeats what was printed
    fn rebind(&mut self, controller: &LogStreamController) {
        self.updates = controller.buffer().subscribe();
        self.status = controller.watch_status();
    }

    /// Print whatever the buffer gained since the last call
    fn sync(&mut self, controller: &LogStreamController, ctx: &OutputContext) {
        let text = controller.current_buffer();
        if let Some(fresh) = text.get(self.printed..) {
            ctx.log(fresh);
        }
        self.printed = text.len();
    }
}

enum Input {
    Interrupt,
    Line(Option<String>),
    Update(std::result::Result<BufferUpdate, broadcast::error::RecvError>),
    Status(bool),
}

/// Stream until quit, applying commands typed on stdin
async fn follow(session: &mut MonitorSession, ctx: &OutputContext) -> Result<()> {
    let (interrupt_tx, mut interrupt) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    let controller = session.attach()?;
    ctx.info(&format!(
        "Monitoring {} at level {}. Type a level name, 'mode', 'reconnect' or 'quit'.",
        controller.params().target,
        controller.params().log_level
    ));
    let mut view = View::new(controller);
    view.sync(controller, ctx);

    loop {
        let input = tokio::select! {
            biased;
            _ = interrupt.recv() => Input::Interrupt,
            line = lines.recv(), if stdin_open => Input::Line(line),
            changed = view.status.changed() => Input::Status(changed.is_ok()),
            update = view.updates.recv() => Input::Update(update),
        };

        match input {
            Input::Interrupt => break,

            Input::Line(None) => {
                debug!("stdin closed, following until interrupted");
                stdin_open = false;
            }

            Input::Line(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let Some(command) = parse_command(&line) else {
                    ctx.warn(&format!("Unknown command: {}", line.trim()));
                    continue;
                };
                if !apply(session, command, &mut view, ctx).await? {
                    break;
                }
            }

            Input::Update(Ok(_)) | Input::Update(Err(broadcast::error::RecvError::Lagged(_))) => {
                if let Some(controller) = session.controller() {
                    view.sync(controller, ctx);
                }
            }

            Input::Update(Err(broadcast::error::RecvError::Closed)) | Input::Status(false) => {
                break
            }

            Input::Status(true) => {
                let status = view.status.borrow_and_update().clone();
                match status {
                    ControllerStatus::Reconnecting { attempt } => {
                        ctx.warn(&format!("Connection lost, reconnecting (attempt {})", attempt));
                    }
                    ControllerStatus::Stopped { error: Some(error) } => {
                        if let Some(controller) = session.controller() {
                            view.sync(controller, ctx);
                        }
                        return Err(error).context("Log stream stopped");
                    }
                    ControllerStatus::Stopped { error: None } => break,
                    ControllerStatus::Connecting
                    | ControllerStatus::Active
                    | ControllerStatus::Idle => {}
                }
            }
        }
    }

    ctx.success("Stopped");
    Ok(())
}

/// Apply one typed command. Returns false when following should end.
async fn apply(
    session: &mut MonitorSession,
    command: Command,
    view: &mut View,
    ctx: &OutputContext,
) -> Result<bool> {
    let controller = match command {
        Command::Quit => return Ok(false),

        Command::ToggleMode => {
            let mode = session.toggle_mode();
            ctx.info(&format!(
                "Mode set to {}; type 'reconnect' to apply",
                mode_name(mode)
            ));
            return Ok(true);
        }

        Command::Level(level) => session.change_level(level)?,
        Command::Reconnect => session.reconnect()?,
    };

    view.rebind(controller);
    load_tail_if_paged(controller).await?;
    view.sync(controller, ctx);
    Ok(true)
}

/// A paged controller fetches nothing by itself; give it the latest page
async fn load_tail_if_paged(controller: &LogStreamController) -> Result<()> {
    if controller.mode() == StreamMode::Paged {
        controller
            .fetch_page(PageRequest::tail(DEFAULT_PAGE_SIZE))
            .await
            .context("Failed to fetch log range")?;
    }
    Ok(())
}

/// Read stdin lines on a detached thread
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_monitor_client::testing::{wait_for, ScriptedFetch, Step};
    use agent_monitor_core::PayloadFormat;
    use std::time::Duration;

    fn plain_session(fetch: &Arc<ScriptedFetch>) -> MonitorSession {
        let config = MonitorConfig {
            format: PayloadFormat::Plain,
            ..MonitorConfig::default()
        };
        MonitorSession::new(fetch.clone(), config)
    }

    fn args(head: Option<u64>, tail: Option<u64>) -> MonitorArgs {
        MonitorArgs {
            target: Target::server("s-1").unwrap(),
            level: LogLevel::Info,
            mode: StreamMode::Paged,
            head,
            tail,
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("debug"), Some(Command::Level(LogLevel::Debug)));
        assert_eq!(parse_command(" WARN \n"), Some(Command::Level(LogLevel::Warn)));
        assert_eq!(parse_command("mode"), Some(Command::ToggleMode));
        assert_eq!(parse_command("reconnect"), Some(Command::Reconnect));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("verbose"), None);
    }

    #[test]
    fn test_page_request_selection() {
        assert_eq!(args(Some(10), None).page_request(), PageRequest::head(10));
        assert_eq!(args(None, Some(10)).page_request(), PageRequest::tail(10));
        assert_eq!(
            args(None, None).page_request(),
            PageRequest::tail(DEFAULT_PAGE_SIZE)
        );
    }

    #[tokio::test]
    async fn test_paged_commands_load_tail() {
        let fetch = Arc::new(ScriptedFetch::new());
        fetch.respond(vec![Step::text("live\n"), Step::Hold]);
        fetch.respond(vec![Step::text("tail\n")]);
        fetch.respond(vec![Step::text("debug tail\n")]);

        let ctx = OutputContext::new(true, true);
        let mut session = plain_session(&fetch);
        session
            .configure(Target::server("s-1").unwrap(), LogLevel::Info, StreamMode::Streaming)
            .unwrap();
        let controller = session.attach().unwrap();
        assert!(wait_for(|| controller.current_buffer() == "live\n", Duration::from_secs(2)).await);
        let mut view = View::new(controller);
        view.sync(controller, &ctx);

        // Switch to paged, then reconnect
        assert!(apply(&mut session, Command::ToggleMode, &mut view, &ctx).await.unwrap());
        assert!(apply(&mut session, Command::Reconnect, &mut view, &ctx).await.unwrap());
        assert_eq!(session.controller().unwrap().current_buffer(), "live\ntail\n");

        // A level change while paged also loads the latest page
        assert!(apply(&mut session, Command::Level(LogLevel::Debug), &mut view, &ctx)
            .await
            .unwrap());
        let controller = session.controller().unwrap();
        assert_eq!(
            controller.current_buffer(),
            "live\ntail\n...changing log level to debug...\n\ndebug tail\n"
        );
        assert_eq!(view.printed, controller.current_buffer().len());

        let requests = fetch.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].param("log_level"), Some("debug"));
        assert_eq!(requests[2].param("origin"), Some("end"));
    }

    #[tokio::test]
    async fn test_quit_ends_following() {
        let fetch = Arc::new(ScriptedFetch::new());
        let ctx = OutputContext::new(true, true);
        let mut session = plain_session(&fetch);
        session
            .configure(Target::client("c-1").unwrap(), LogLevel::Info, StreamMode::Paged)
            .unwrap();
        let mut view = View::new(session.attach().unwrap());

        assert!(!apply(&mut session, Command::Quit, &mut view, &ctx).await.unwrap());
        assert_eq!(fetch.request_count(), 0);
    }
}
