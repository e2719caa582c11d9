use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use mkf_bonds::{save_file, BondRegistry, MkfId};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState,
    },
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;

const PAGE_JUMP: usize = 10;

/// What the keyboard is currently driving
pub enum Mode {
    /// Table navigation
    Browse,
    /// Typing a new surname before picking its first bond
    SurnameInput { input: String },
    /// Picking an available identifier to bind
    BondPicker {
        surname: String,
        choices: Vec<MkfId>,
        state: ListState,
    },
    /// Typing an identifier to look up
    FindInput { input: String },
    /// Picking one of the surname's bonds to release
    UnbindPicker {
        surname: String,
        choices: Vec<MkfId>,
        state: ListState,
    },
    /// "Do you want to save changes?" on quit
    ConfirmQuit,
}

pub struct App {
    pub registry: BondRegistry,
    pub file_path: PathBuf,
    pub state: TableState,
    pub mode: Mode,
    pub status: String,
    pub dirty: bool,
    pub warning_count: usize,
}

impl App {
    pub fn new(registry: BondRegistry, file_path: PathBuf, warning_count: usize) -> Self {
        let mut state = TableState::default();
        if !registry.records().is_empty() {
            state.select(Some(0));
        }

        let status = if warning_count > 0 {
            format!(
                "{} parse warnings on load (see terminal output)",
                warning_count
            )
        } else {
            String::new()
        };

        Self {
            registry,
            file_path,
            state,
            mode: Mode::Browse,
            status,
            dirty: false,
            warning_count,
        }
    }

    pub fn selected_surname(&self) -> Option<&str> {
        self.state
            .selected()
            .and_then(|i| self.registry.records().get(i))
            .map(|record| record.surname.as_str())
    }

    /// Move the table selection to a surname's row
    pub fn select_surname(&mut self, surname: &str) {
        let position = self
            .registry
            .records()
            .iter()
            .position(|record| record.surname == surname);
        if position.is_some() {
            self.state.select(position);
        }
    }

    pub fn next(&mut self) {
        let len = self.registry.records().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.registry.records().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_down(&mut self) {
        let len = self.registry.records().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) => (i + PAGE_JUMP).min(len - 1),
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn page_up(&mut self) {
        let i = match self.state.selected() {
            Some(i) => i.saturating_sub(PAGE_JUMP),
            None => 0,
        };
        self.state.select(Some(i));
    }

    /// Open the available-pool picker for a surname
    pub fn open_bond_picker(&mut self, surname: String) {
        let choices: Vec<MkfId> = self.registry.available().collect();
        if choices.is_empty() {
            self.status = "No MKFs left in the pool".to_string();
            return;
        }

        let mut state = ListState::default();
        state.select(Some(0));
        self.mode = Mode::BondPicker {
            surname,
            choices,
            state,
        };
    }

    pub fn start_bind(&mut self) {
        match self.selected_surname() {
            Some(surname) => {
                let surname = surname.to_string();
                self.open_bond_picker(surname);
            }
            None => {
                self.status =
                    "Select a surname row to bind, or press n for a new surname".to_string();
            }
        }
    }

    pub fn start_unbind(&mut self) {
        let record = match self
            .state
            .selected()
            .and_then(|i| self.registry.records().get(i))
        {
            Some(record) => record,
            None => {
                self.status = "Select a surname row to delete from".to_string();
                return;
            }
        };

        if record.bonds.is_empty() {
            self.status = format!("{} has no MKF bindings to delete", record.surname);
            return;
        }

        let mut state = ListState::default();
        state.select(Some(0));
        self.mode = Mode::UnbindPicker {
            surname: record.surname.clone(),
            choices: record.bonds.clone(),
            state,
        };
    }

    /// Write the registry to the configured file. Returns false on failure.
    pub fn save(&mut self) -> bool {
        match save_file(&self.file_path, &self.registry) {
            Ok(()) => {
                self.dirty = false;
                self.status = format!("Saved to {}", self.file_path.display());
                true
            }
            Err(err) => {
                self.status = format!("Save failed: {}", err);
                false
            }
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if handle_key(app, key.code) {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// KEY HANDLING
// ============================================================================

/// Dispatch one key press. Returns true when the app should quit.
fn handle_key(app: &mut App, code: KeyCode) -> bool {
    let mode = std::mem::replace(&mut app.mode, Mode::Browse);
    match mode {
        Mode::Browse => handle_browse(app, code),
        Mode::SurnameInput { input } => {
            handle_surname_input(app, code, input);
            false
        }
        Mode::BondPicker {
            surname,
            choices,
            state,
        } => {
            handle_bond_picker(app, code, surname, choices, state);
            false
        }
        Mode::FindInput { input } => {
            handle_find_input(app, code, input);
            false
        }
        Mode::UnbindPicker {
            surname,
            choices,
            state,
        } => {
            handle_unbind_picker(app, code, surname, choices, state);
            false
        }
        Mode::ConfirmQuit => handle_confirm_quit(app, code),
    }
}

fn handle_browse(app: &mut App, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => {
            if app.dirty {
                app.mode = Mode::ConfirmQuit;
                false
            } else {
                true
            }
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.next();
            false
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.previous();
            false
        }
        KeyCode::PageDown => {
            app.page_down();
            false
        }
        KeyCode::PageUp => {
            app.page_up();
            false
        }
        KeyCode::Home => {
            if !app.registry.records().is_empty() {
                app.state.select(Some(0));
            }
            false
        }
        KeyCode::End => {
            let len = app.registry.records().len();
            if len > 0 {
                app.state.select(Some(len - 1));
            }
            false
        }
        KeyCode::Char('b') => {
            app.start_bind();
            false
        }
        KeyCode::Char('n') => {
            app.mode = Mode::SurnameInput {
                input: String::new(),
            };
            false
        }
        KeyCode::Char('f') => {
            app.mode = Mode::FindInput {
                input: String::new(),
            };
            false
        }
        KeyCode::Char('d') => {
            app.start_unbind();
            false
        }
        KeyCode::Char('s') => {
            app.save();
            false
        }
        _ => false,
    }
}

fn handle_surname_input(app: &mut App, code: KeyCode, mut input: String) {
    match code {
        KeyCode::Esc => {} // back to Browse
        KeyCode::Enter => {
            let surname = input.trim().to_string();
            if surname.is_empty() {
                app.status = "Surname cannot be empty".to_string();
                app.mode = Mode::SurnameInput { input };
            } else {
                app.open_bond_picker(surname);
            }
        }
        KeyCode::Backspace => {
            input.pop();
            app.mode = Mode::SurnameInput { input };
        }
        KeyCode::Char(c) => {
            input.push(c);
            app.mode = Mode::SurnameInput { input };
        }
        _ => {
            app.mode = Mode::SurnameInput { input };
        }
    }
}

fn handle_bond_picker(
    app: &mut App,
    code: KeyCode,
    surname: String,
    choices: Vec<MkfId>,
    mut state: ListState,
) {
    match code {
        KeyCode::Esc => {} // back to Browse
        KeyCode::Enter => {
            if let Some(&id) = state.selected().and_then(|i| choices.get(i)) {
                match app.registry.bind(&surname, id) {
                    Ok(()) => {
                        app.dirty = true;
                        app.status = format!("Bound {} to {}", id, surname);
                        app.select_surname(&surname);
                    }
                    Err(err) => app.status = err.to_string(),
                }
            }
        }
        _ => {
            step_list(&mut state, choices.len(), code);
            app.mode = Mode::BondPicker {
                surname,
                choices,
                state,
            };
        }
    }
}

fn handle_find_input(app: &mut App, code: KeyCode, mut input: String) {
    match code {
        KeyCode::Esc => {}
        KeyCode::Enter => match input.trim().parse::<MkfId>() {
            Ok(id) => {
                let holder = app.registry.find(id).map(|s| s.to_string());
                match holder {
                    Some(surname) => {
                        app.select_surname(&surname);
                        app.status = format!("{} is bound to {}", id, surname);
                    }
                    None => {
                        app.status = format!("{} is not bound to any surname", id);
                    }
                }
            }
            Err(err) => app.status = err.to_string(),
        },
        KeyCode::Backspace => {
            input.pop();
            app.mode = Mode::FindInput { input };
        }
        KeyCode::Char(c) => {
            input.push(c);
            app.mode = Mode::FindInput { input };
        }
        _ => {
            app.mode = Mode::FindInput { input };
        }
    }
}

fn handle_unbind_picker(
    app: &mut App,
    code: KeyCode,
    surname: String,
    choices: Vec<MkfId>,
    mut state: ListState,
) {
    match code {
        KeyCode::Esc => {}
        KeyCode::Enter => {
            if let Some(&id) = state.selected().and_then(|i| choices.get(i)) {
                match app.registry.unbind(&surname, id) {
                    Ok(()) => {
                        app.dirty = true;
                        app.status = format!("Unbound {} from {}", id, surname);
                    }
                    Err(err) => app.status = err.to_string(),
                }
            }
        }
        _ => {
            step_list(&mut state, choices.len(), code);
            app.mode = Mode::UnbindPicker {
                surname,
                choices,
                state,
            };
        }
    }
}

fn handle_confirm_quit(app: &mut App, code: KeyCode) -> bool {
    match code {
        // Stay open on a failed save so the error is visible
        KeyCode::Char('y') | KeyCode::Char('Y') => app.save(),
        KeyCode::Char('n') | KeyCode::Char('N') => true,
        _ => false, // back to Browse
    }
}

fn step_list(state: &mut ListState, len: usize, code: KeyCode) {
    if len == 0 {
        return;
    }
    let current = state.selected().unwrap_or(0);
    let next = match code {
        KeyCode::Down | KeyCode::Char('j') => {
            if current >= len - 1 {
                0
            } else {
                current + 1
            }
        }
        KeyCode::Up | KeyCode::Char('k') => {
            if current == 0 {
                len - 1
            } else {
                current - 1
            }
        }
        KeyCode::PageDown => (current + PAGE_JUMP).min(len - 1),
        KeyCode::PageUp => current.saturating_sub(PAGE_JUMP),
        KeyCode::Home => 0,
        KeyCode::End => len - 1,
        _ => current,
    };
    state.select(Some(next));
}

// ============================================================================
// RENDERING
// ============================================================================

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with counts
            Constraint::Min(0),    // Surname table
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    render_table(f, chunks[1], app);
    render_status_bar(f, chunks[2], app);

    match &mut app.mode {
        Mode::Browse => {}
        Mode::SurnameInput { input } => render_input_popup(f, " New Surname ", input),
        Mode::FindInput { input } => render_input_popup(f, " Find MKF ", input),
        Mode::BondPicker {
            surname,
            choices,
            state,
        } => {
            let title = format!(" Bind MKF to {} ", surname);
            render_picker(f, &title, choices, state);
        }
        Mode::UnbindPicker {
            surname,
            choices,
            state,
        } => {
            let title = format!(" Unbind MKF from {} ", surname);
            render_picker(f, &title, choices, state);
        }
        Mode::ConfirmQuit => render_confirm_quit(f),
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![
        Span::styled(
            "Surname MKF Binding",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("{}", app.file_path.display()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Surnames: {}", app.registry.surname_count()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  "),
        Span::styled(
            format!("Bound: {}", app.registry.bound_count()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  "),
        Span::styled(
            format!("Available: {}", app.registry.available_count()),
            Style::default().fg(Color::Cyan),
        ),
    ];

    if app.warning_count > 0 {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("⚠ {} warnings", app.warning_count),
            Style::default().fg(Color::Yellow),
        ));
    }

    if app.dirty {
        spans.push(Span::raw("  "));
        spans.push(Span::styled("* unsaved", Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Surname", "Bonds"].iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows = app.registry.records().iter().map(|record| {
        let bond_style = if record.bonds.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::White)
        };

        let cells = vec![
            Cell::from(truncate(&record.surname, 28)),
            Cell::from(record.bond_display()).style(bond_style),
        ];

        Row::new(cells).height(1)
    });

    let table = Table::new(rows, [Constraint::Length(30), Constraint::Min(10)])
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Surnames "),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();

    if app.status.is_empty() {
        let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);
        spans.push(Span::styled(
            format!(" Row: {}/{} ", selected, app.registry.surname_count()),
            Style::default().fg(Color::Cyan),
        ));
    } else {
        spans.push(Span::styled(
            format!(" {} ", app.status),
            Style::default().fg(Color::Cyan),
        ));
    }

    spans.push(Span::raw(" | "));
    spans.push(Span::styled("b", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Bind | "));
    spans.push(Span::styled("n", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" New | "));
    spans.push(Span::styled("f", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Find | "));
    spans.push(Span::styled("d", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Delete | "));
    spans.push(Span::styled("s", Style::default().fg(Color::Yellow)));
    spans.push(Span::raw(" Save | "));
    spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_input_popup(f: &mut Frame, title: &str, input: &str) {
    let area = centered_rect(50, 20, f.size());

    let text = vec![Line::from(vec![
        Span::raw(input.to_string()),
        Span::styled("█", Style::default().fg(Color::Yellow)),
    ])];

    let popup = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(title.to_string()),
    );

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn render_picker(f: &mut Frame, title: &str, choices: &[MkfId], state: &mut ListState) {
    let area = centered_rect(30, 60, f.size());

    let items: Vec<ListItem> = choices
        .iter()
        .map(|id| ListItem::new(id.to_string()))
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(title.to_string()),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("→ ");

    f.render_widget(Clear, area);
    f.render_stateful_widget(list, area, state);
}

fn render_confirm_quit(f: &mut Frame) {
    let area = centered_rect(44, 20, f.size());

    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "  Do you want to save changes?",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("y", Style::default().fg(Color::Green)),
            Span::raw(" save and quit   "),
            Span::styled("n", Style::default().fg(Color::Red)),
            Span::raw(" discard   "),
            Span::styled("Esc", Style::default().fg(Color::Yellow)),
            Span::raw(" cancel"),
        ]),
    ];

    let popup = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(" Save Changes "),
    );

    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}
