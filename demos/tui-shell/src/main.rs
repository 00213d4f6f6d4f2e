//! Terminal front-end for the toplevel shell.
//!
//! Run with: cargo run -p tui-shell
//!
//! History and program files are kept in the platform data directory and
//! restored on the next start. Logs go to `shell.log` in the same place.

use std::{fs::File, io, path::Path, sync::Mutex, time::Duration};

use anyhow::Context;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use demo_engine::DemoEngine;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toplevel_core::{Mode, ShellConfig};
use toplevel_session::{Workspace, storage::FsStorage};
use toplevel_transport::{
    ShellHandler,
    tui::{TuiBridge, TuiState},
};

fn init_logging(dir: &Path) -> anyhow::Result<()> {
    let path = dir.join("shell.log");
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    Ok(())
}

fn load_config() -> anyhow::Result<ShellConfig> {
    match std::env::var_os("TOPLEVEL_CONFIG") {
        Some(path) => ShellConfig::from_json_file(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy())),
        None => Ok(ShellConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let storage = FsStorage::open_default().await?;
    init_logging(storage.root())?;

    let config = load_config()?;
    let (workspace, history) = Workspace::restore(&config, &storage).await?;
    let mut handler = ShellHandler::new(DemoEngine::new(), config).with_workspace(workspace);
    handler.session_mut().set_history(history);

    let (bridge, session) = TuiBridge::new();
    let shell = tokio::spawn(session.serve(handler));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, bridge);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {e}");
    }

    let mut handler = shell.await??;
    handler.persist(&storage).await?;
    tracing::info!(root = %storage.root().display(), "workspace saved");
    Ok(())
}

struct App {
    state: TuiState,
    /// Lines scrolled up from the bottom.
    scroll_back: u16,
}

impl App {
    fn new() -> Self {
        Self {
            state: TuiState::new(),
            scroll_back: 0,
        }
    }

    fn scroll_up(&mut self, lines: u16) {
        let max = u16::try_from(self.state.line_count()).unwrap_or(u16::MAX);
        self.scroll_back = self.scroll_back.saturating_add(lines).min(max);
    }

    fn scroll_down(&mut self, lines: u16) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char('d' | 'q'))
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut bridge: TuiBridge,
) -> io::Result<()> {
    let mut app = App::new();

    loop {
        let mut updated = false;
        while let Some(msg) = bridge.try_recv() {
            app.state.apply(msg);
            updated = true;
        }
        if updated {
            app.scroll_back = 0;
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            let event = event::read()?;
            if let Event::Key(key) = &event {
                if is_quit(key) {
                    return Ok(());
                }
                match key.code {
                    KeyCode::PageUp => app.scroll_up(10),
                    KeyCode::PageDown => app.scroll_down(10),
                    _ => {}
                }
            }
            bridge.handle_event(&event);
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Output
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status
        ])
        .split(f.area());

    // Output area, pinned to the bottom unless scrolled back
    let visible = chunks[0].height.saturating_sub(2);
    let total = u16::try_from(app.state.line_count()).unwrap_or(u16::MAX);
    let scroll = total
        .saturating_sub(visible)
        .saturating_sub(app.scroll_back);
    let output = Paragraph::new(app.state.output_lines())
        .block(Block::default().borders(Borders::ALL).title("Toplevel"))
        .scroll((scroll, 0));
    f.render_widget(output, chunks[0]);

    // Input area
    let mode = app.state.mode();
    let title = match mode {
        Some(Mode::AwaitingCommand) => "?-",
        Some(Mode::AwaitingMore) => "; next  . stop",
        Some(Mode::Tracing) => "c creep  s skip  l leap  r retry  n nodebug  a abort  ? help",
        Some(Mode::Running | Mode::HostDelegated) => "running, Ctrl+C aborts",
        Some(Mode::Idle) | None => "starting",
    };
    let input = Paragraph::new(app.state.input())
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(input, chunks[1]);

    if mode == Some(Mode::AwaitingCommand) {
        let width = u16::try_from(app.state.input().chars().count()).unwrap_or(u16::MAX);
        f.set_cursor_position((chunks[1].x + width.saturating_add(1), chunks[1].y + 1));
    }

    // Status bar
    let (status, status_style) = match (app.state.last_error(), mode) {
        (Some(error), _) => (error.to_string(), Style::default().fg(Color::Red)),
        (None, Some(mode)) => (mode.label().to_string(), Style::default().fg(Color::Green)),
        (None, None) => ("starting".to_string(), Style::default().fg(Color::Yellow)),
    };
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(status, status_style),
        Span::raw(" | "),
        Span::styled("Ctrl+C", Style::default().fg(Color::Yellow)),
        Span::raw(" abort | "),
        Span::styled("Ctrl+D", Style::default().fg(Color::Yellow)),
        Span::raw(" quit | "),
        Span::styled("Up/Down", Style::default().fg(Color::Yellow)),
        Span::raw(" history | "),
        Span::styled("PgUp/PgDn", Style::default().fg(Color::Yellow)),
        Span::raw(" scroll "),
    ]));
    f.render_widget(status, chunks[2]);
}
