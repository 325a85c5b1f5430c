use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap};

use crate::app::{App, PaneFocus, format_rate, format_ton, short_address};
use crate::config::PaymentMode;
use crate::feed::NoticeKind;
use crate::miner::MinerState;

pub fn draw(f: &mut Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(8)])
        .split(f.size());

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[0]);

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[0]);

    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(main_chunks[1]);

    draw_mining(f, left_chunks[0], app);
    draw_tasks(f, left_chunks[1], app);
    draw_upgrades(f, right_chunks[0], app);
    draw_wallet(f, right_chunks[1], app);
    draw_footer(f, chunks[1], app);
}

fn draw_mining(f: &mut Frame<'_>, area: Rect, app: &App) {
    let block = pane_block("Mining", app.focus == PaneFocus::Mining);
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);
    let segments = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(inner);

    let profile = app.miner.profile();
    let minimum = app.config.economy.claim_minimum;
    let ratio = if minimum > 0.0 {
        (profile.pending_earnings / minimum).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let accruing = app.miner.state() == MinerState::Accruing;
    let gauge = Gauge::default()
        .block(Block::default().title(if accruing { "Mining…" } else { "Stopped" }))
        .ratio(ratio)
        .gauge_style(
            Style::default()
                .fg(if accruing { Color::Green } else { Color::DarkGray })
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(format!(
            "{:.6} / {:.2} TON to claim",
            profile.pending_earnings, minimum
        ));
    f.render_widget(gauge, segments[0]);

    let lines = vec![
        stat_line(
            "Balance  ",
            format_ton(profile.spendable_balance),
            Color::LightCyan,
        ),
        stat_line(
            "Pending  ",
            format_ton(profile.pending_earnings),
            Color::LightGreen,
        ),
        stat_line(
            "Mined    ",
            format_ton(profile.cumulative_mined),
            Color::White,
        ),
        stat_line(
            "Speed    ",
            format!(
                "{:.2}x  ({})",
                profile.accrual_rate,
                format_rate(app.miner.rate_per_sec())
            ),
            Color::Yellow,
        ),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Enter/C claim  |  S start/stop mining",
            Style::default().fg(Color::Gray),
        )]),
    ];
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });
    f.render_widget(paragraph, segments[1]);
}

fn stat_line(label: &'static str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Gray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn draw_upgrades(f: &mut Frame<'_>, area: Rect, app: &App) {
    let block = pane_block("Upgrade Mining Speed", app.focus == PaneFocus::Upgrades);
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    let economy = &app.config.economy;
    let paying = match economy.payment_mode {
        PaymentMode::Balance => "paid from balance",
        PaymentMode::Wallet => "paid by wallet",
    };
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            format!("-{:.0}% ", economy.discount_percent),
            Style::default().fg(Color::LightMagenta),
        ),
        Span::styled(paying, Style::default().fg(Color::Gray)),
    ]));
    let segments = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(0)])
        .split(inner);
    f.render_widget(header, segments[0]);

    let current = app.miner.profile().accrual_rate;
    let items: Vec<ListItem> = economy
        .tiers
        .iter()
        .map(|tier| {
            let active = (tier.multiplier - current).abs() < 1e-9;
            let content = Line::from(vec![
                Span::styled(
                    format!("{:<12}", tier.label),
                    Style::default().fg(if active {
                        Color::LightGreen
                    } else {
                        Color::White
                    }),
                ),
                Span::raw(format!(" {:>5.1}x ", tier.multiplier)),
                Span::styled(
                    format!("{:.4}", tier.price),
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::CROSSED_OUT),
                ),
                Span::styled(
                    format!(" {:.4} TON", tier.discounted_price(economy.discount_percent)),
                    Style::default().fg(Color::LightCyan),
                ),
            ]);
            ListItem::new(vec![content])
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::NONE))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );
    let mut state = ListState::default();
    state.select(Some(app.selected_tier));
    f.render_stateful_widget(list, segments[1], &mut state);
}

fn draw_tasks(f: &mut Frame<'_>, area: Rect, app: &App) {
    let block = pane_block("Tasks", app.focus == PaneFocus::Tasks);
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    if app.board.tasks.is_empty() {
        let paragraph = Paragraph::new("No tasks right now. Press R to refresh.")
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, inner);
        return;
    }

    let items: Vec<ListItem> = app
        .board
        .tasks
        .iter()
        .map(|task| {
            let done = app.board.is_completed(task);
            let mut spans = vec![
                Span::styled(
                    if done { "✓ " } else { "· " },
                    Style::default().fg(if done { Color::LightGreen } else { Color::Gray }),
                ),
                Span::styled(task.title.clone(), Style::default().fg(Color::White)),
                Span::raw(format!("  +{:.3} TON", task.reward)),
                Span::styled(
                    format!("  ~{}m", task.time_required),
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            if let Some(link) = &task.link {
                spans.push(Span::styled(
                    format!("  {link}"),
                    Style::default().fg(Color::Blue),
                ));
            }
            ListItem::new(vec![Line::from(spans)])
        })
        .collect();

    let list = List::new(items).highlight_style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    let mut state = ListState::default();
    state.select(Some(app.board.selected));
    f.render_stateful_widget(list, inner, &mut state);
}

fn draw_wallet(f: &mut Frame<'_>, area: Rect, app: &App) {
    let block = pane_block("Wallet & Friends", app.focus == PaneFocus::Wallet);
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    let profile = app.miner.profile();
    let economy = &app.config.economy;
    let wallet = app.wallet();
    let connection = match wallet.address() {
        Some(address) => Span::styled(
            format!("● {}", short_address(address)),
            Style::default().fg(Color::LightGreen),
        ),
        None => Span::styled("● Not Connected", Style::default().fg(Color::Red)),
    };

    let withdraw = match app.miner.withdraw_status(economy) {
        Ok(()) => Span::styled("Withdraw TON ready", Style::default().fg(Color::LightGreen)),
        Err(blocked) => Span::styled(
            format!("Withdraw: {blocked}"),
            Style::default().fg(Color::Gray),
        ),
    };

    let lines = vec![
        Line::from(connection),
        Line::from(vec![
            Span::styled("Friends  ", Style::default().fg(Color::Gray)),
            Span::raw(format!(
                "{}/{}",
                profile.referral_count, economy.withdraw_min_referrals
            )),
            Span::raw(format!("  (+{:.2} TON each)", economy.referral_reward)),
        ]),
        Line::from(vec![
            Span::styled("Deposit  ", Style::default().fg(Color::Gray)),
            if profile.deposit_satisfied {
                Span::styled("received", Style::default().fg(Color::LightGreen))
            } else {
                Span::raw(format!("{:.1} TON required", economy.deposit_amount))
            },
        ]),
        Line::from(withdraw),
        Line::from(""),
        Line::from(vec![
            Span::styled("Invite   ", Style::default().fg(Color::Gray)),
            Span::styled(app.referral_code.clone(), Style::default().fg(Color::Yellow)),
        ]),
        Line::from(Span::styled(
            app.invite_link.clone(),
            Style::default().fg(Color::Blue),
        )),
        Line::from(""),
        Line::from("C connect/disconnect  D deposit  W withdraw"),
    ];

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
    f.render_widget(paragraph, inner);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, app: &App) {
    let alert = matches!(app.feed.latest(), Some(n) if n.kind == NoticeKind::Error);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Controls & Feed")
        .border_style(Style::default().fg(if alert { Color::LightRed } else { Color::Gray }));
    f.render_widget(block.clone(), area);
    let inner = block.inner(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(inner);

    let instruction_lines = vec![
        Line::from("Tab cycle focus | Q quit"),
        Line::from("Mining: Enter claim  S start/stop"),
        Line::from("Upgrades: ↑↓ select  Enter purchase"),
        Line::from("Tasks: ↑↓ select  Enter complete  R refresh"),
        Line::from("Wallet: C connect  D deposit  W withdraw"),
    ];
    let instruction = Paragraph::new(instruction_lines).wrap(Wrap { trim: true });
    f.render_widget(instruction, columns[0]);

    let mut message_lines: Vec<Line> = Vec::new();
    if app.feed.is_empty() {
        message_lines.push(Line::from(Span::styled(
            "Awaiting signal...",
            Style::default().fg(Color::DarkGray),
        )));
    }
    for notice in app.feed.iter() {
        let color = match notice.kind {
            NoticeKind::Info => Color::White,
            NoticeKind::Success => Color::LightGreen,
            NoticeKind::Error => Color::LightRed,
        };
        let mut spans = vec![Span::styled(
            notice.title.clone(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )];
        if !notice.body.is_empty() {
            spans.push(Span::raw(format!("  {}", notice.body)));
        }
        message_lines.push(Line::from(spans));
    }
    let feed = Paragraph::new(message_lines).wrap(Wrap { trim: true });
    f.render_widget(feed, columns[1]);
}

fn pane_block<'a>(title: &'a str, focused: bool) -> Block<'a> {
    let border_style = if focused {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    Block::default()
        .title(Span::styled(title, Style::default().fg(Color::White)))
        .borders(Borders::ALL)
        .border_style(border_style)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use crate::tasks::MemoryTaskRepository;
    use crate::wallet::SimulatedWallet;
    use chrono::Utc;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use std::rc::Rc;

    #[test]
    fn renders_every_pane() {
        let app = App::new(
            Config::default(),
            Rc::new(MemoryStore::new()),
            Box::new(MemoryTaskRepository::with_defaults(Utc::now())),
            Box::new(SimulatedWallet::new(0.0)),
        )
        .unwrap();
        let mut terminal = Terminal::new(TestBackend::new(140, 40)).unwrap();
        terminal.draw(|f| draw(f, &app)).unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        for title in ["Mining", "Upgrade Mining Speed", "Tasks", "Wallet & Friends"] {
            assert!(text.contains(title), "missing pane {title}");
        }
        assert!(text.contains("Welcome Bonus!"));
    }
}
