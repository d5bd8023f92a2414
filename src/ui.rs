// 🖥️ Terminal day viewer - one branch, one day, ←/→ to move between days

use anyhow::Result;
use cajas_diarias::access::DISPLAY_DATE;
use cajas_diarias::summary::{daily_summary, DailySummary};
use cajas_diarias::{domain_error, MovementKind, User};
use chrono::{Days, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;

pub struct App {
    pub user: User,
    pub branch_id: i64,
    pub date: NaiveDate,
    pub today: NaiveDate,
    pub summary: Option<DailySummary>,
    pub message: Option<String>,
    pub state: TableState,
}

impl App {
    pub fn new(user: User, branch_id: i64, date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            user,
            branch_id,
            date,
            today,
            summary: None,
            message: None,
            state: TableState::default(),
        }
    }

    /// Reload the summary for the current date; access errors go to the status bar
    pub fn load(&mut self, conn: &Connection) -> Result<()> {
        match daily_summary(conn, &self.user, self.branch_id, self.date, self.today) {
            Ok(summary) => {
                self.state.select(if summary.rows.is_empty() { None } else { Some(0) });
                self.summary = Some(summary);
                self.message = None;
            }
            Err(err) => match domain_error(&err) {
                Some(domain) => {
                    self.summary = None;
                    self.state.select(None);
                    self.message = Some(domain.to_string());
                }
                None => return Err(err),
            },
        }
        Ok(())
    }

    pub fn previous_day(&mut self) {
        if let Some(d) = self.date.checked_sub_days(Days::new(1)) {
            self.date = d;
        }
    }

    pub fn next_day(&mut self) {
        if let Some(d) = self.date.checked_add_days(Days::new(1)) {
            self.date = d;
        }
    }

    fn row_count(&self) -> usize {
        self.summary.as_ref().map(|s| s.rows.len()).unwrap_or(0)
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui(conn: &Connection, app: &mut App) -> Result<()> {
    app.load(conn)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, conn, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    conn: &Connection,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Left | KeyCode::Char('h') => {
                    app.previous_day();
                    app.load(conn)?;
                }
                KeyCode::Right | KeyCode::Char('l') => {
                    app.next_day();
                    app.load(conn)?;
                }
                KeyCode::Char('t') => {
                    app.date = app.today;
                    app.load(conn)?;
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Header with totals
            Constraint::Min(0),    // Movements
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_table(f, chunks[1], app);
    render_status_bar(f, chunks[2], app);
}

fn money(amount: f64) -> String {
    format!("${:.2}", amount)
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let title = match &app.summary {
        Some(s) => format!(" {} · {} ", s.branch_name, app.date.format(DISPLAY_DATE)),
        None => format!(" Branch {} · {} ", app.branch_id, app.date.format(DISPLAY_DATE)),
    };

    let lines = match &app.summary {
        Some(s) => vec![
            Line::from(vec![
                Span::styled(format!("Sales {}", money(s.sales_total)), Style::default().fg(Color::Green)),
                Span::raw("  |  "),
                Span::styled(format!("Expenses {}", money(s.expenses_total)), Style::default().fg(Color::Red)),
                Span::raw("  |  "),
                Span::raw(format!("Net {}", money(s.net))),
            ]),
            Line::from(vec![
                Span::raw(format!("Cash sales {}  -  cash out {}  =  ", money(s.cash_sales), money(s.cash_outflows))),
                Span::styled(
                    format!("A Rendir {}", money(s.cash_to_deliver)),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
            ]),
        ],
        None => vec![Line::from("")],
    };

    let header = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(title),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Kind", "Category", "Detail", "Amount", "Method", "Recorded by"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .summary
        .iter()
        .flat_map(|s| s.rows.iter())
        .map(|row| {
            let color = match row.kind {
                MovementKind::Sale => Color::Green,
                MovementKind::Expense => Color::Red,
                MovementKind::Payroll => Color::Magenta,
            };
            Row::new(vec![
                Cell::from(row.kind.as_str()).style(Style::default().fg(color)),
                Cell::from(truncate(&row.category, 20)),
                Cell::from(truncate(&row.detail, 30)),
                Cell::from(money(row.amount)).style(Style::default().fg(color)),
                Cell::from(truncate(&row.payment_method, 16)),
                Cell::from(truncate(&row.recorded_by, 20)),
            ])
            .height(1)
        })
        .collect();

    let title = if rows.is_empty() {
        " No movements "
    } else {
        " Movements "
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(22),
            Constraint::Length(32),
            Constraint::Length(14),
            Constraint::Length(18),
            Constraint::Length(22),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(message) = &app.message {
        status_spans.push(Span::styled(format!(" {message} "), Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("←/→", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Day | "));
    status_spans.push(Span::styled("t", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Today | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
