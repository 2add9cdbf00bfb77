use crate::client::{
    AppSnapshot,
    RoundRecord,
    RoundResult,
};
use base_lottery::{
    Slots,
    session::Phase,
};
use color_eyre::eyre::Result;
use crossterm::event::{
    self,
    Event,
    KeyCode,
    KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use itertools::Itertools;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Play,
    Quit,
    Redraw,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

#[derive(Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(term) = state.terminal.as_mut() {
        term.draw(|f| ui(f, snap))?;
    }
    Ok(())
}

/// Reads terminal events on a dedicated thread so the runtime never blocks
/// on `event::read`. The thread exits once the receiver is dropped.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let ev = event::read();
            let failed = ev.is_err();
            if tx.send(ev).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(input: &mut InputEventReceiver) -> Result<Event> {
    match input.recv().await {
        Some(ev) => Ok(ev?),
        None => Err(color_eyre::eyre::eyre!("terminal input closed")),
    }
}

pub fn interpret_event(ev: Event) -> Option<UserEvent> {
    match ev {
        Event::Key(k) if k.kind == KeyEventKind::Press => match k.code {
            // raw mode swallows SIGINT, so Ctrl-C arrives as a key
            KeyCode::Char('c') if k.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(UserEvent::Quit)
            }
            KeyCode::Char(' ') | KeyCode::Enter => Some(UserEvent::Play),
            KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
            _ => None,
        },
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn ui(f: &mut Frame, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(7), // slots
            Constraint::Length(3), // play button
            Constraint::Length(4), // result + error
            Constraint::Min(6),    // recent rounds
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_slots(f, chunks[1], &snap.state.visible_slots, snap.state.is_rolling());
    draw_button(f, chunks[2], snap);
    draw_result(f, chunks[3], snap);
    draw_recent_rounds(f, chunks[4], &snap.recent_rounds);
    draw_help(f, chunks[5]);
    if let Some(results) = &snap.celebration {
        // over the history panel so the result banner stays visible
        draw_celebration(f, chunks[4], results);
    }
}

fn draw_header(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let header = Paragraph::new(format!(
        "Account: {} | Network: {} | Ticket: {}",
        short_address(&snap.account.to_checksum(None)),
        snap.network,
        snap.ticket_price
    ))
    .block(Block::default().borders(Borders::ALL).title("ETH Lottery on Base"));
    f.render_widget(header, area);
}

fn short_address(addr: &str) -> String {
    if addr.len() <= 12 {
        return addr.to_owned();
    }
    format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
}

fn draw_slots(f: &mut Frame, area: Rect, slots: &Slots, rolling: bool) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(slots.iter().map(|_| Constraint::Ratio(1, slots.len() as u32)))
        .split(area);
    let style = if rolling {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    for (rect, digit) in cols.iter().zip(slots) {
        let block = Block::default().borders(Borders::ALL);
        let inner = block.inner(*rect);
        f.render_widget(block, *rect);
        // vertically center the digit
        let pad = inner.height.saturating_sub(1) / 2;
        let mut lines = vec![Line::from(""); pad as usize];
        lines.push(Line::styled(digit.to_string(), style));
        f.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
    }
}

fn draw_button(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let (label, style) = if snap.state.is_rolling() {
        (String::from("Rolling..."), Style::default().fg(Color::DarkGray))
    } else {
        (
            format!("Play ({})", snap.ticket_price),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )
    };
    let button = Paragraph::new(Line::styled(label, style))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(button, centered_rect(40, 100, area));
}

fn result_banner(phase: Phase, outcome: Option<bool>) -> Option<Line<'static>> {
    if !matches!(phase, Phase::Resolved | Phase::Failed) {
        return None;
    }
    match outcome {
        Some(true) => Some(Line::styled(
            "You won! Congratulations!",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Some(false) => Some(Line::styled(
            "Sorry, you lost. Try again!",
            Style::default().fg(Color::Red),
        )),
        None => None,
    }
}

fn draw_result(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines = Vec::new();
    if let Some(banner) = result_banner(snap.state.phase, snap.state.outcome) {
        lines.push(banner);
    }
    if let Some(err) = &snap.state.error_message {
        lines.push(Line::styled(err.clone(), Style::default().fg(Color::LightRed)));
    }
    let result = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Result"));
    f.render_widget(result, area);
}

fn render_round(record: &RoundRecord) -> Line<'static> {
    let time = record.finished_at.format("%H:%M:%S");
    match &record.result {
        RoundResult::Won(results) => Line::styled(
            format!("{time}  #{:<3} won   {}", record.round, results.iter().join(" ")),
            Style::default().fg(Color::Green),
        ),
        RoundResult::Lost(results) => Line::from(format!(
            "{time}  #{:<3} lost  {}",
            record.round,
            results.iter().join(" ")
        )),
        RoundResult::Failed(reason) => Line::styled(
            format!("{time}  #{:<3} failed {reason}", record.round),
            Style::default().fg(Color::DarkGray),
        ),
    }
}

fn draw_recent_rounds(f: &mut Frame, area: Rect, rounds: &[RoundRecord]) {
    let lines: Vec<Line> = if rounds.is_empty() {
        vec![Line::styled("None", Style::default().fg(Color::DarkGray))]
    } else {
        rounds.iter().rev().map(render_round).collect()
    };
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Recent Rounds"));
    f.render_widget(panel, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new("space/enter play | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_celebration(f: &mut Frame, area: Rect, results: &Slots) {
    let area = centered_rect(50, 80, area);
    let text = vec![
        Line::styled(
            "*** JACKPOT ***",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Line::from(results.iter().join("  ")),
    ];
    f.render_widget(Clear, area);
    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Winner"));
    f.render_widget(popup, area);
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use alloy_primitives::U256;
    use base_lottery::{
        local_ledger::LOCAL_ACCOUNT,
        provider::TicketPrice,
        session::SessionState,
    };
    use crossterm::event::KeyEvent;
    use ratatui::backend::TestBackend;

    fn snapshot(state: SessionState) -> AppSnapshot {
        AppSnapshot {
            account: LOCAL_ACCOUNT,
            network: String::from("local ledger"),
            ticket_price: TicketPrice::from_wei(U256::from(100_000_000_000_000u64)),
            state,
            recent_rounds: Vec::new(),
            celebration: None,
        }
    }

    fn render(snap: &AppSnapshot) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 30)).unwrap();
        terminal.draw(|f| ui(f, snap)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn interpret_event__maps_keys() {
        let none = KeyModifiers::NONE;
        assert_eq!(
            interpret_event(key(KeyCode::Char(' '), none)),
            Some(UserEvent::Play)
        );
        assert_eq!(interpret_event(key(KeyCode::Enter, none)), Some(UserEvent::Play));
        assert_eq!(
            interpret_event(key(KeyCode::Char('q'), none)),
            Some(UserEvent::Quit)
        );
        assert_eq!(interpret_event(key(KeyCode::Esc, none)), Some(UserEvent::Quit));
        assert_eq!(
            interpret_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(UserEvent::Quit)
        );
        assert_eq!(interpret_event(key(KeyCode::Char('x'), none)), None);
        assert_eq!(interpret_event(Event::Resize(10, 10)), Some(UserEvent::Redraw));
    }

    #[test]
    fn draw__idle_shows_play_button_with_price() {
        let screen = render(&snapshot(SessionState::default()));
        assert!(screen.contains("Play (0.0001 ETH)"));
        assert!(!screen.contains("You won!"));
        assert!(!screen.contains("Sorry, you lost."));
    }

    #[test]
    fn draw__rolling_disables_button() {
        // given
        let state = SessionState {
            phase: Phase::AwaitingConfirmation,
            visible_slots: [4, 2, 9],
            ..SessionState::default()
        };

        // when
        let screen = render(&snapshot(state));

        // then
        assert!(screen.contains("Rolling..."));
        assert!(!screen.contains("Play ("));
    }

    #[test]
    fn draw__failed_round_shows_loss_banner_and_error() {
        // given
        let state = SessionState {
            phase: Phase::Failed,
            outcome: Some(false),
            error_message: Some(String::from("Round could not be completed: boom")),
            ..SessionState::default()
        };

        // when
        let screen = render(&snapshot(state));

        // then
        assert!(screen.contains("Sorry, you lost. Try again!"));
        assert!(screen.contains("Round could not be completed: boom"));
    }

    #[test]
    fn draw__win_shows_banner_and_celebration() {
        // given
        let mut snap = snapshot(SessionState {
            phase: Phase::Resolved,
            visible_slots: [7, 7, 7],
            outcome: Some(true),
            ..SessionState::default()
        });
        snap.celebration = Some([7, 7, 7]);

        // when
        let screen = render(&snap);

        // then
        assert!(screen.contains("You won! Congratulations!"));
        assert!(screen.contains("JACKPOT"));
    }
}
