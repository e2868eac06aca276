//! A terminal dashboard built on `ratatui`/`crossterm`, demonstrating a
//! richer `DisplaySink` than the bundled `NullDisplaySink`/`LoggingDisplaySink`.
//!
//! Not part of the shipped binary; run with `cargo run --example monitor`
//! once wired into `Cargo.toml`'s `[[example]]` table.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::ExecutableCommand;
use parking_lot::RwLock;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Terminal;

use pitctl::config::Config;
use pitctl::display::DisplaySink;
use pitctl::error::Result;
use pitctl::motor::NullMotorDriver;
use pitctl::orchestrator::Orchestrator;
use pitctl::pit::PitController;
use pitctl::probe_manager::ProbeManager;
use pitctl::types::StatusSnapshot;

/// A `DisplaySink` that stashes the latest snapshot for the render loop to
/// pick up.
struct TerminalDisplaySink {
    latest: RwLock<Option<StatusSnapshot>>,
}

impl TerminalDisplaySink {
    fn new() -> Self {
        Self {
            latest: RwLock::new(None),
        }
    }

    fn latest(&self) -> Option<StatusSnapshot> {
        self.latest.read().clone()
    }
}

#[async_trait]
impl DisplaySink for TerminalDisplaySink {
    async fn update(&self, status: &StatusSnapshot) {
        *self.latest.write() = Some(status.clone());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::default();
    let probe_manager = Arc::new(ProbeManager::new(config.units).await?);
    let controller = PitController::from_config(&config);
    let motor = Arc::new(NullMotorDriver);
    let display = Arc::new(TerminalDisplaySink::new());

    let orchestrator = Orchestrator::new(probe_manager, controller, motor, display.clone());

    let render_display = display.clone();
    let render_task = tokio::spawn(async move {
        let _ = render_loop(render_display).await;
    });

    orchestrator
        .run(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    render_task.abort();
    Ok(())
}

async fn render_loop(display: Arc<TerminalDisplaySink>) -> io::Result<()> {
    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    loop {
        if event::poll(std::time::Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.code == KeyCode::Char('q') {
                    break;
                }
            }
        }

        let snapshot = display.latest();
        terminal.draw(|f| draw(f, snapshot.as_ref()))?;
    }

    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn draw(f: &mut ratatui::Frame, status: Option<&StatusSnapshot>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(1)])
        .split(f.area());

    let Some(status) = status else {
        f.render_widget(
            Paragraph::new("waiting for first status snapshot...")
                .block(Block::default().borders(Borders::ALL).title("pitctl")),
            chunks[0],
        );
        return;
    };

    let title = format!(
        "pitctl | mode {} | {} probes",
        status.mode, status.num_probes
    );
    let temp_line = match status.pit_temp {
        Some(t) => format!("pit {:.1}°{}  set {:.1}°{}", t, status.unit, status.set_point, status.unit),
        None => format!("pit -- °{}  set {:.1}°{}", status.unit, status.set_point, status.unit),
    };
    f.render_widget(
        Paragraph::new(Line::from(temp_line)).block(Block::default().borders(Borders::ALL).title(title)),
        chunks[0],
    );

    f.render_widget(
        Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("fan"))
            .gauge_style(Style::default().fg(Color::Cyan))
            .percent(status.fan_pct as u16),
        chunks[1],
    );

    f.render_widget(
        Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("servo"))
            .gauge_style(Style::default().fg(Color::Yellow))
            .percent(status.servo_pct_0_100 as u16),
        chunks[2],
    );
}
