mod accrual;
mod app;
mod config;
mod economy;
mod error;
mod feed;
mod miner;
mod profile;
mod referral;
mod store;
mod tasks;
mod ui;
mod wallet;

use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use app::{App, format_rate, format_ton};
use chrono::Utc;
use clap::{Parser, Subcommand};
use crossterm::event::{self, Event as CEvent};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, TaskBackend};
use crate::feed::{ConsoleNotifier, NoticeKind, Notifier};
use crate::miner::Miner;
use crate::profile::ProfileStore;
use crate::store::{FileStore, KeyValueStore};
use crate::tasks::{TaskDraft, TaskPatch, TaskRepository, open_repository};
use crate::ui::draw;
use crate::wallet::SimulatedWallet;

const LOG_FILE: &str = "tonrig.log";
const FRAME_RATE: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "tonrig", version, about = "Idle TON mining rig for the terminal")]
struct Cli {
    /// Config file (defaults to ~/.tonrig/config.json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where the profile and task records live.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. `info` or `tonrig=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log: String,

    /// Task storage backend.
    #[arg(long, value_enum)]
    tasks: Option<TaskBackend>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the mining dashboard (default).
    Play,
    /// Write a config file with the default settings.
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the stored profile, crediting any offline mining.
    Status,
    /// Delete the stored profile.
    Reset {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Show the invite code, or redeem a friend's code.
    Refer {
        #[arg(long)]
        redeem: Option<String>,
    },
    /// Manage the task catalogue.
    #[command(subcommand)]
    Tasks(TaskCommand),
}

#[derive(Subcommand, Debug)]
enum TaskCommand {
    List,
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        reward: f64,
        #[arg(long)]
        link: Option<String>,
        /// Expected minutes to finish.
        #[arg(long, default_value_t = 1)]
        minutes: u32,
        #[arg(long)]
        order: Option<i64>,
    },
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        reward: Option<f64>,
        #[arg(long, conflicts_with = "clear_link")]
        link: Option<String>,
        #[arg(long, default_value_t = false)]
        clear_link: bool,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        order: Option<i64>,
    },
    Remove {
        id: String,
    },
    /// Mark a task done for the configured user and pay its reward.
    Complete {
        id: String,
    },
    Uncomplete {
        id: String,
    },
}

enum Event<I> {
    Input(I),
    Tick,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Command::Init { force }) = cli.command {
        return init_config(cli.config.as_deref(), force);
    }
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(backend) = cli.tasks {
        config.tasks.backend = backend;
    }
    config.validate()?;

    let data_dir = config.data_dir()?;
    let store: Rc<dyn KeyValueStore> = Rc::new(FileStore::new(&data_dir)?);
    let command = cli.command.unwrap_or(Command::Play);
    let log_file = matches!(command, Command::Play).then(|| data_dir.join(LOG_FILE));
    init_tracing(&cli.log, log_file.as_deref())?;
    tracing::debug!(data_dir = %data_dir.display(), "store opened");

    match command {
        Command::Play => play(config, store),
        Command::Init { .. } => Ok(()),
        Command::Status => status(&config, store),
        Command::Reset { yes } => reset(store, yes),
        Command::Refer { redeem } => refer(&config, store, redeem),
        Command::Tasks(cmd) => run_tasks(&config, store, cmd),
    }
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let dir = Config::default_dir()?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            dir.join(config::CONFIG_FILE)
        }
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// The dashboard owns the terminal, so its logs go to a file.
fn init_tracing(filter: &str, file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

fn play(config: Config, store: Rc<dyn KeyValueStore>) -> Result<()> {
    let tasks = open_repository(&config.tasks, store.clone())?;
    let wallet = Box::new(SimulatedWallet::new(config.wallet.rejection_rate));
    let mut app = App::new(config, store, tasks, wallet)?;

    let mut terminal = setup_terminal()?;
    let res = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    app.shutdown();
    res
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let (tx, rx) = mpsc::channel();

    let input_tx = tx.clone();
    thread::spawn(move || {
        loop {
            if !event::poll(Duration::from_millis(250)).unwrap_or(false) {
                continue;
            }
            match event::read() {
                Ok(CEvent::Key(key)) => {
                    if input_tx.send(Event::Input(key)).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("terminal read failed: {e}"),
            }
        }
    });

    thread::spawn(move || {
        loop {
            if tx.send(Event::Tick).is_err() {
                break;
            }
            thread::sleep(FRAME_RATE);
        }
    });

    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| draw(f, app))?;

        match rx.recv()? {
            Event::Input(key) => {
                app.on_key(key);
            }
            Event::Tick => {
                app.on_tick(last_tick.elapsed());
                last_tick = Instant::now();
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn status(config: &Config, store: Rc<dyn KeyValueStore>) -> Result<()> {
    let profiles = ProfileStore::new(store);
    let Some(stored) = profiles.load() else {
        println!("No profile yet. Run `tonrig play` to start mining.");
        return Ok(());
    };
    let (mut miner, _) = Miner::boot(Some(stored), config, Utc::now());
    miner.persist(&profiles);

    let profile = miner.profile();
    println!("{}", serde_json::to_string_pretty(profile)?);
    println!(
        "pending {}, mining at {}",
        format_ton(profile.pending_earnings),
        format_rate(miner.rate_per_sec())
    );
    match miner.withdraw_status(&config.economy) {
        Ok(()) => println!("withdraw: ready"),
        Err(blocked) => println!("withdraw: {blocked}"),
    }
    Ok(())
}

fn reset(store: Rc<dyn KeyValueStore>, yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to delete the profile without --yes");
    }
    ProfileStore::new(store).clear()?;
    ConsoleNotifier.notify("Reset", "profile deleted", NoticeKind::Info);
    Ok(())
}

fn refer(config: &Config, store: Rc<dyn KeyValueStore>, redeem: Option<String>) -> Result<()> {
    let user_id = config.user_id();
    let own = referral::referral_code(user_id);
    let Some(code) = redeem else {
        println!("Code: {own}");
        println!("Link: {}", referral::invite_link(app::INVITE_BOT, user_id));
        return Ok(());
    };

    let mut notifier = ConsoleNotifier;
    let code = code.trim().to_uppercase();
    if !referral::is_valid_code(&code) || code == own {
        notifier.notify("Referral", &format!("{code} is not a valid invite"), NoticeKind::Error);
        return Ok(());
    }
    let profiles = ProfileStore::new(store);
    let (mut miner, _) = Miner::boot(profiles.load(), config, Utc::now());
    let credited = miner.record_referral(config.economy.referral_reward);
    miner.persist(&profiles);
    notifier.notify(
        "Friend joined",
        &format!(
            "+{} ({} friends)",
            format_ton(credited),
            miner.profile().referral_count
        ),
        NoticeKind::Success,
    );
    Ok(())
}

fn run_tasks(config: &Config, store: Rc<dyn KeyValueStore>, cmd: TaskCommand) -> Result<()> {
    let mut repo = open_repository(&config.tasks, store.clone())?;
    let mut notifier = ConsoleNotifier;
    let user_id = config.user_id();

    match cmd {
        TaskCommand::List => {
            let done = repo.completed(user_id)?;
            for task in repo.list()? {
                let mark = if done.contains(&task.id) { "✓" } else { " " };
                println!(
                    "[{mark}] {:<18} {:<28} +{:.3} TON  ~{}m",
                    task.id, task.title, task.reward, task.time_required
                );
            }
        }
        TaskCommand::Add {
            title,
            description,
            reward,
            link,
            minutes,
            order,
        } => {
            let task = repo.create(TaskDraft {
                title,
                description,
                reward,
                link,
                time_required: minutes,
                sort_order: order,
            })?;
            notifier.notify("Task created", &task.id, NoticeKind::Success);
        }
        TaskCommand::Edit {
            id,
            title,
            description,
            reward,
            link,
            clear_link,
            minutes,
            order,
        } => {
            let link = if clear_link { Some(None) } else { link.map(Some) };
            let task = repo.update(
                &id,
                TaskPatch {
                    title,
                    description,
                    reward,
                    link,
                    time_required: minutes,
                    completed: None,
                    sort_order: order,
                },
            )?;
            notifier.notify("Task updated", &task.title, NoticeKind::Success);
        }
        TaskCommand::Remove { id } => {
            repo.delete(&id)?;
            notifier.notify("Task removed", &id, NoticeKind::Info);
        }
        TaskCommand::Complete { id } => complete_task(config, store, repo.as_mut(), &id)?,
        TaskCommand::Uncomplete { id } => {
            repo.uncomplete(user_id, &id)?;
            notifier.notify("Task reopened", &id, NoticeKind::Info);
        }
    }
    Ok(())
}

fn complete_task(
    config: &Config,
    store: Rc<dyn KeyValueStore>,
    repo: &mut dyn TaskRepository,
    id: &str,
) -> Result<()> {
    let mut notifier = ConsoleNotifier;
    if !repo.complete(config.user_id(), id)? {
        notifier.notify("Already done", id, NoticeKind::Info);
        return Ok(());
    }
    let reward = repo
        .list()?
        .into_iter()
        .find(|t| t.id == id)
        .map(|t| t.reward)
        .unwrap_or(0.0);

    let profiles = ProfileStore::new(store);
    let (mut miner, _) = Miner::boot(profiles.load(), config, Utc::now());
    let credited = miner.reward(reward);
    if !miner.persist(&profiles) {
        // Reopen the task so a retry can pay the reward.
        repo.uncomplete(config.user_id(), id)?;
        bail!("the reward for {id} could not be saved; the task is still open");
    }
    notifier.notify(
        "Task completed",
        &format!("+{}", format_ton(credited)),
        NoticeKind::Success,
    );
    Ok(())
}
