use std::collections::HashSet;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};

use crate::config::Config;
use crate::feed::{Feed, NoticeKind, Notifier};
use crate::miner::{Boot, Miner, MinerState};
use crate::profile::ProfileStore;
use crate::referral;
use crate::store::KeyValueStore;
use crate::tasks::{Task, TaskRepository};
use crate::wallet::Wallet;

pub const INVITE_BOT: &str = "Spacelbot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneFocus {
    Mining,
    Upgrades,
    Tasks,
    Wallet,
}

impl PaneFocus {
    fn next(self) -> Self {
        match self {
            PaneFocus::Mining => PaneFocus::Upgrades,
            PaneFocus::Upgrades => PaneFocus::Tasks,
            PaneFocus::Tasks => PaneFocus::Wallet,
            PaneFocus::Wallet => PaneFocus::Mining,
        }
    }

    fn prev(self) -> Self {
        match self {
            PaneFocus::Mining => PaneFocus::Wallet,
            PaneFocus::Upgrades => PaneFocus::Mining,
            PaneFocus::Tasks => PaneFocus::Upgrades,
            PaneFocus::Wallet => PaneFocus::Tasks,
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskBoard {
    pub tasks: Vec<Task>,
    pub completed: HashSet<String>,
    pub selected: usize,
}

impl TaskBoard {
    pub fn is_completed(&self, task: &Task) -> bool {
        self.completed.contains(&task.id)
    }

    fn selected_task(&self) -> Option<&Task> {
        self.tasks.get(self.selected)
    }

    fn select_next(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.selected = (self.selected + 1) % self.tasks.len();
    }

    fn select_previous(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        if self.selected == 0 {
            self.selected = self.tasks.len() - 1;
        } else {
            self.selected -= 1;
        }
    }
}

/// The running game: one instance per process, created at startup and torn
/// down with [`App::shutdown`].
pub struct App {
    pub focus: PaneFocus,
    pub should_quit: bool,
    pub config: Config,
    pub miner: Miner,
    pub board: TaskBoard,
    pub selected_tier: usize,
    pub feed: Feed,
    pub referral_code: String,
    pub invite_link: String,
    profiles: ProfileStore<Rc<dyn KeyValueStore>>,
    tasks: Box<dyn TaskRepository>,
    wallet: Box<dyn Wallet>,
    wallet_events: mpsc::Receiver<bool>,
    last_save: Instant,
}

impl App {
    pub fn new(
        config: Config,
        store: Rc<dyn KeyValueStore>,
        tasks: Box<dyn TaskRepository>,
        mut wallet: Box<dyn Wallet>,
    ) -> Result<Self> {
        let profiles = ProfileStore::new(store);
        let (miner, boot) = Miner::boot(profiles.load(), &config, Utc::now());

        let (tx, wallet_events) = mpsc::channel();
        wallet.on_connection_change(Box::new(move |connected| {
            let _ = tx.send(connected);
        }));

        let user_id = config.user_id().to_string();
        let mut app = Self {
            focus: PaneFocus::Mining,
            should_quit: false,
            referral_code: referral::referral_code(&user_id),
            invite_link: referral::invite_link(INVITE_BOT, &user_id),
            config,
            miner,
            board: TaskBoard::default(),
            selected_tier: 0,
            feed: Feed::default(),
            profiles,
            tasks,
            wallet,
            wallet_events,
            last_save: Instant::now(),
        };

        match boot {
            Boot::FirstRun => app.feed.notify(
                "Welcome Bonus!",
                &format!(
                    "Free mining package: {:.2}x speed",
                    app.miner.profile().accrual_rate
                ),
                NoticeKind::Success,
            ),
            Boot::Resumed(caught) if caught.earned > 0.0 => app.feed.notify(
                "Welcome back",
                &format!(
                    "Mined {} while away ({})",
                    format_ton(caught.earned),
                    format_duration(Duration::from_secs_f64(caught.elapsed_secs))
                ),
                NoticeKind::Info,
            ),
            Boot::Resumed(_) => {}
        }
        if app.config.wallet.start_connected {
            app.wallet.open_connect_modal();
        }
        app.refresh_tasks();
        app.save_now();
        Ok(app)
    }

    pub fn wallet(&self) -> &dyn Wallet {
        self.wallet.as_ref()
    }

    pub fn on_tick(&mut self, dt: Duration) {
        while let Ok(connected) = self.wallet_events.try_recv() {
            if connected {
                let address = self.wallet.address().unwrap_or_default().to_string();
                self.feed
                    .notify("Wallet connected", &short_address(&address), NoticeKind::Success);
            } else {
                self.feed
                    .notify("Wallet disconnected", "Connect again to pay", NoticeKind::Info);
            }
        }

        self.miner.advance(dt);

        if self.miner.is_dirty() && self.last_save.elapsed() >= self.config.mining.autosave_interval()
        {
            self.save_now();
        }
    }

    /// Final save on the way out.
    pub fn shutdown(&mut self) {
        if !self.miner.persist(&self.profiles) {
            tracing::warn!("final profile save did not complete");
        }
    }

    fn save_now(&mut self) {
        self.miner.persist(&self.profiles);
        self.last_save = Instant::now();
    }

    pub fn refresh_tasks(&mut self) {
        let user_id = self.config.user_id().to_string();
        match (self.tasks.list(), self.tasks.completed(&user_id)) {
            (Ok(tasks), Ok(done)) => {
                self.board.tasks = tasks;
                self.board.completed = done.into_iter().collect();
                if self.board.selected >= self.board.tasks.len() {
                    self.board.selected = 0;
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("could not load tasks: {e}");
                self.feed
                    .notify("Tasks unavailable", &e.to_string(), NoticeKind::Error);
            }
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if matches!(key.code, KeyCode::Char('q' | 'Q')) {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Tab => {
                self.focus = self.focus.next();
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
            }
            _ => match self.focus {
                PaneFocus::Mining => self.handle_mining_input(key),
                PaneFocus::Upgrades => self.handle_upgrade_input(key),
                PaneFocus::Tasks => self.handle_task_input(key),
                PaneFocus::Wallet => self.handle_wallet_input(key),
            },
        }
    }

    fn handle_mining_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter | KeyCode::Char('c') => self.claim(),
            KeyCode::Char('s') => {
                let state = self.miner.toggle();
                let title = match state {
                    MinerState::Accruing => "Mining started",
                    MinerState::Idle => "Mining stopped",
                };
                self.feed.notify(title, "", NoticeKind::Info);
            }
            _ => {}
        }
    }

    fn claim(&mut self) {
        match self.miner.claim(self.config.economy.claim_minimum) {
            Ok(amount) => {
                self.feed.notify(
                    "TON Claimed!",
                    &format!("You've claimed {}", format_ton(amount)),
                    NoticeKind::Success,
                );
                self.save_now();
            }
            Err(rejected) => {
                self.feed
                    .notify("Not enough to claim", &rejected.to_string(), NoticeKind::Error);
            }
        }
    }

    fn handle_upgrade_input(&mut self, key: KeyEvent) {
        let count = self.config.economy.tiers.len();
        match key.code {
            KeyCode::Up if count > 0 => {
                self.selected_tier = (self.selected_tier + count - 1) % count;
            }
            KeyCode::Down if count > 0 => {
                self.selected_tier = (self.selected_tier + 1) % count;
            }
            KeyCode::Enter => self.purchase_selected(),
            _ => {}
        }
    }

    fn purchase_selected(&mut self) {
        let result = self.miner.upgrade(
            &self.config.economy,
            self.selected_tier,
            self.wallet.as_mut(),
        );
        match result {
            Ok(receipt) => {
                self.feed.notify(
                    "Upgrade Successful!",
                    &format!(
                        "{} for {}: mining speed {:.2}x",
                        receipt.tier.label,
                        format_ton(receipt.price),
                        receipt.tier.multiplier
                    ),
                    NoticeKind::Success,
                );
                self.save_now();
            }
            Err(blocked) => {
                self.feed
                    .notify("Upgrade unavailable", &blocked.to_string(), NoticeKind::Error);
            }
        }
    }

    fn handle_task_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => self.board.select_previous(),
            KeyCode::Down => self.board.select_next(),
            KeyCode::Enter => self.complete_selected_task(),
            KeyCode::Char('r') => self.refresh_tasks(),
            _ => {}
        }
    }

    fn complete_selected_task(&mut self) {
        let Some(task) = self.board.selected_task().cloned() else {
            return;
        };
        let user_id = self.config.user_id().to_string();
        match self.tasks.complete(&user_id, &task.id) {
            Ok(true) => {
                let credited = self.miner.reward(task.reward);
                self.board.completed.insert(task.id.clone());
                tracing::info!(task = %task.id, credited, "task completed");
                self.feed.notify(
                    "Task completed",
                    &format!("{}: +{}", task.title, format_ton(credited)),
                    NoticeKind::Success,
                );
                self.save_now();
            }
            Ok(false) => {
                self.feed
                    .notify("Already done", &task.title, NoticeKind::Info);
            }
            Err(e) => {
                tracing::warn!(task = %task.id, "task completion failed: {e}");
                self.feed
                    .notify("Task failed", &e.to_string(), NoticeKind::Error);
            }
        }
    }

    fn handle_wallet_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('c') => {
                if self.wallet.is_connected() {
                    self.wallet.disconnect();
                } else {
                    self.wallet.open_connect_modal();
                }
            }
            KeyCode::Char('d') => self.deposit(),
            KeyCode::Char('w') => self.withdraw(),
            _ => {}
        }
    }

    fn deposit(&mut self) {
        if self.miner.profile().deposit_satisfied {
            self.feed
                .notify("Deposit", "Deposit already received", NoticeKind::Info);
            return;
        }
        match self.miner.deposit(&self.config.economy, self.wallet.as_mut()) {
            Ok(tx) => {
                self.feed.notify(
                    "Deposit received",
                    &format!("{} sent (tx {})", format_ton(tx.amount), tx.id),
                    NoticeKind::Success,
                );
                self.save_now();
            }
            Err(e) => {
                self.feed
                    .notify("Deposit failed", &e.to_string(), NoticeKind::Error);
            }
        }
    }

    fn withdraw(&mut self) {
        let destination = match self.wallet.address() {
            Some(address) => address.to_string(),
            None => {
                self.feed.notify(
                    "Withdraw",
                    "Connect a wallet to receive funds",
                    NoticeKind::Error,
                );
                return;
            }
        };
        match self.miner.withdraw(&self.config.economy, &destination) {
            Ok(receipt) => {
                self.feed.notify(
                    "Withdrawal Initiated",
                    &format!(
                        "{} to {}",
                        format_ton(receipt.amount),
                        short_address(&receipt.destination)
                    ),
                    NoticeKind::Success,
                );
                self.save_now();
            }
            Err(blocked) => {
                self.feed
                    .notify("Withdrawal blocked", &blocked.to_string(), NoticeKind::Error);
            }
        }
    }
}

pub fn format_ton(amount: f64) -> String {
    format!("{:.6} TON", amount)
}

pub fn short_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}…{}", &address[..6], &address[address.len() - 4..])
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 86_400 {
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        format!("{}d{:02}h", days, hours)
    } else if secs >= 3600 {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        format!("{:02}h{:02}m", hours, minutes)
    } else if secs >= 60 {
        let minutes = secs / 60;
        let seconds = secs % 60;
        format!("{:02}m{:02}s", minutes, seconds)
    } else {
        format!("{:02}s", secs)
    }
}

pub fn format_rate(per_sec: f64) -> String {
    const UNITS: [(&str, f64); 4] = [
        ("TON/s", 1.0),
        ("mTON/s", 1e-3),
        ("µTON/s", 1e-6),
        ("nTON/s", 1e-9),
    ];
    let mut idx = 0usize;
    while idx + 1 < UNITS.len() && per_sec.abs() < UNITS[idx].1 && per_sec != 0.0 {
        idx += 1;
    }
    format!("{:.2} {}", per_sec / UNITS[idx].1, UNITS[idx].0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PROFILE_KEY;
    use crate::store::MemoryStore;
    use crate::tasks::MemoryTaskRepository;
    use crate::wallet::SimulatedWallet;
    use crossterm::event::KeyModifiers;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app_with(config: Config, store: MemoryStore, rejection_rate: f64) -> App {
        let wallet = SimulatedWallet::with_rng(rejection_rate, StdRng::seed_from_u64(3));
        App::new(
            config,
            Rc::new(store),
            Box::new(MemoryTaskRepository::with_defaults(Utc::now())),
            Box::new(wallet),
        )
        .unwrap()
    }

    #[test]
    fn startup_saves_and_welcomes() {
        let store = MemoryStore::new();
        let app = app_with(Config::default(), store.clone(), 0.0);
        assert!(store.get(PROFILE_KEY).unwrap().is_some());
        assert_eq!(app.feed.latest().unwrap().title, "Welcome Bonus!");
        assert_eq!(app.board.tasks.len(), 3);
    }

    #[test]
    fn second_launch_resumes_stored_profile() {
        let store = MemoryStore::new();
        let mut config = Config::default();
        config.economy.claim_minimum = 0.0;
        config.mining.base_rate = 0.5;
        {
            let mut app = app_with(config.clone(), store.clone(), 0.0);
            app.on_tick(Duration::from_secs(4));
            app.on_key(key(KeyCode::Char('c')));
            app.shutdown();
        }
        let app = app_with(config, store, 0.0);
        let profile = app.miner.profile();
        assert!(profile.has_received_welcome_bonus);
        assert!((profile.spendable_balance - 4.0 * 0.5 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn claim_key_respects_minimum() {
        let mut app = app_with(Config::default(), MemoryStore::new(), 0.0);
        let before = app.miner.profile().clone();
        app.on_key(key(KeyCode::Enter));
        assert_eq!(app.feed.latest().unwrap().kind, NoticeKind::Error);
        assert_eq!(app.miner.profile().spendable_balance, before.spendable_balance);
    }

    #[test]
    fn stop_key_halts_accrual() {
        let mut app = app_with(Config::default(), MemoryStore::new(), 0.0);
        app.on_key(key(KeyCode::Char('s')));
        assert_eq!(app.miner.state(), MinerState::Idle);
        let pending = app.miner.profile().pending_earnings;
        app.on_tick(Duration::from_secs(30));
        assert_eq!(app.miner.profile().pending_earnings, pending);
    }

    #[test]
    fn completing_a_task_pays_once() {
        let mut app = app_with(Config::default(), MemoryStore::new(), 0.0);
        app.focus = PaneFocus::Tasks;
        let reward = app.board.tasks[0].reward;

        app.on_key(key(KeyCode::Enter));
        app.on_key(key(KeyCode::Enter));

        assert!((app.miner.profile().spendable_balance - reward).abs() < 1e-12);
        assert!(app.board.is_completed(&app.board.tasks[0].clone()));
        assert_eq!(app.feed.latest().unwrap().title, "Already done");
    }

    #[test]
    fn wallet_pane_connects_deposits_and_withdraws() {
        let config = Config::default();
        let store = MemoryStore::new();
        let mut seeded = crate::profile::Profile::new(&config, Utc::now());
        seeded.spendable_balance = 2.0;
        seeded.referral_count = 3;
        seeded.has_received_welcome_bonus = true;
        ProfileStore::new(store.clone()).save(&mut seeded).unwrap();

        let mut app = app_with(config, store, 0.0);
        app.focus = PaneFocus::Wallet;

        app.on_key(key(KeyCode::Char('w')));
        assert_eq!(app.feed.latest().unwrap().title, "Withdraw");

        app.on_key(key(KeyCode::Char('c')));
        app.on_tick(Duration::ZERO);
        assert_eq!(app.feed.latest().unwrap().title, "Wallet connected");

        app.on_key(key(KeyCode::Char('w')));
        assert_eq!(app.feed.latest().unwrap().title, "Withdrawal blocked");

        // Friends only arrive through redeemed invite codes.
        app.on_key(key(KeyCode::Char('f')));
        assert_eq!(app.miner.profile().referral_count, 3);
        assert_eq!(app.miner.profile().spendable_balance, 2.0);

        app.on_key(key(KeyCode::Char('d')));
        assert!(app.miner.profile().deposit_satisfied);

        app.on_key(key(KeyCode::Char('w')));
        assert_eq!(app.feed.latest().unwrap().title, "Withdrawal Initiated");
        assert_eq!(app.miner.profile().spendable_balance, 0.0);
    }

    #[test]
    fn rejected_wallet_upgrade_changes_nothing() {
        let mut config = Config::default();
        config.economy.payment_mode = crate::config::PaymentMode::Wallet;
        config.wallet.start_connected = true;
        let mut app = app_with(config, MemoryStore::new(), 1.0);
        app.focus = PaneFocus::Upgrades;
        let before = app.miner.profile().clone();

        app.on_key(key(KeyCode::Enter));

        assert_eq!(app.miner.profile().accrual_rate, before.accrual_rate);
        assert_eq!(app.miner.profile().spendable_balance, before.spendable_balance);
        assert_eq!(app.feed.latest().unwrap().title, "Upgrade unavailable");
    }

    #[test]
    fn focus_cycles_both_ways() {
        let mut app = app_with(Config::default(), MemoryStore::new(), 0.0);
        app.on_key(key(KeyCode::Tab));
        assert_eq!(app.focus, PaneFocus::Upgrades);
        app.on_key(key(KeyCode::BackTab));
        app.on_key(key(KeyCode::BackTab));
        assert_eq!(app.focus, PaneFocus::Wallet);
        app.on_key(key(KeyCode::Char('q')));
        assert!(app.should_quit);
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(format_duration(Duration::from_secs(3725)), "01h02m");
        assert_eq!(format_duration(Duration::from_secs(90_000)), "1d01h");
        assert_eq!(format_rate(0.000_000_1), "100.00 nTON/s");
        assert_eq!(format_rate(0.002), "2.00 mTON/s");
        assert_eq!(format_rate(0.0), "0.00 TON/s");
        assert_eq!(short_address("UQabcdefghijklmnop"), "UQabcd…mnop");
    }
}
