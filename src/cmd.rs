//! Command implementations for the CLI interface.
//!
//! Every command works on a loaded [`Cache`]: reads go straight to its
//! queries and mutations go through the optimistic engine, so a rejected
//! write leaves the data file untouched and reports why.

use clap::{Args, Subcommand};
use clap_complete::{generate, Shell};

use chrono::{DateTime, Duration, Local, Utc};
use serde_json::Value;

use taskboard::db::{format_due_relative, truncate};
use taskboard::normalize::parse_date_str;
use taskboard::{
    BoardPatch, Cache, DateInput, EntityConfig, LabelInput, NewBoard, NewProject, NewTask, ProjectPatch, Result,
    Task, TaskPatch,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Load the dataset and print row counts.
    Load,

    /// List projects with their board and task counts.
    Projects,

    /// Create, update or remove a project.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// List boards, optionally of one project.
    Boards {
        #[arg(long)]
        project: Option<String>,
    },

    /// Create, update or remove a board.
    Board {
        #[command(subcommand)]
        action: BoardAction,
    },

    /// List tasks. Filters combine.
    Tasks {
        #[arg(long)]
        board: Option<String>,
        #[arg(long)]
        project: Option<String>,
        /// Tasks the user is assigned to or created.
        #[arg(long)]
        user: Option<String>,
        /// Only this status column (case-insensitive), in manual order.
        #[arg(long)]
        status: Option<String>,
    },

    /// Create, update or remove a task.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Fields shared by project and board updates.
#[derive(Args)]
pub struct ContainerEdit {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub desc: Option<String>,
    /// Remove the description.
    #[arg(long, conflicts_with = "desc")]
    pub clear_desc: bool,
    #[arg(long)]
    pub icon: Option<String>,
    #[arg(long)]
    pub color: Option<String>,
    /// Config entry as key=value; the value is read as JSON when it parses.
    #[arg(long = "set")]
    pub settings: Vec<String>,
}

impl ContainerEdit {
    fn description(&self) -> Option<Option<String>> {
        if self.clear_desc {
            Some(None)
        } else {
            self.desc.clone().map(Some)
        }
    }

    fn config(&self) -> Option<EntityConfig> {
        parse_settings(&self.settings)
    }
}

#[derive(Subcommand)]
pub enum ProjectAction {
    Add {
        name: String,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
        /// Owning user.
        #[arg(long)]
        user: Option<String>,
    },
    Update {
        id: String,
        #[command(flatten)]
        edit: ContainerEdit,
    },
    /// Remove a project with all its boards and tasks.
    Rm { id: String },
}

#[derive(Subcommand)]
pub enum BoardAction {
    Add {
        name: String,
        /// Owning project ID.
        #[arg(long)]
        project: String,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Update {
        id: String,
        #[command(flatten)]
        edit: ContainerEdit,
    },
    /// Remove a board with all its tasks.
    Rm { id: String },
}

#[derive(Subcommand)]
pub enum TaskAction {
    Add {
        name: String,
        /// Board ID; the project is taken from the board.
        #[arg(long)]
        board: String,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Comma-separated labels. May be repeated.
        #[arg(long = "label")]
        labels: Vec<String>,
        /// Due date: YYYY-MM-DD, RFC 3339, "today", "tomorrow", or "in Nd" / "in Nw".
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        created_by: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Replace the labels. Comma-separated, may be repeated.
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long, conflicts_with = "due")]
        clear_due: bool,
        /// Position within the status column.
        #[arg(long)]
        order: Option<f64>,
    },
    Rm { id: String },
}

/// Run one command against a loaded cache.
pub async fn run(cache: &Cache, command: Commands) -> Result<()> {
    match command {
        Commands::Load => cmd_load(cache),
        Commands::Projects => cmd_projects(cache),
        Commands::Project { action } => cmd_project(cache, action).await,
        Commands::Boards { project } => cmd_boards(cache, project),
        Commands::Board { action } => cmd_board(cache, action).await,
        Commands::Tasks { board, project, user, status } => cmd_tasks(cache, board, project, user, status),
        Commands::Task { action } => cmd_task(cache, action).await,
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Print row counts of the loaded dataset.
pub fn cmd_load(cache: &Cache) -> Result<()> {
    let counts = cache.counts();
    println!("{} projects, {} boards, {} tasks", counts.projects, counts.boards, counts.tasks);
    Ok(())
}

/// List all projects.
pub fn cmd_projects(cache: &Cache) -> Result<()> {
    println!("{:<24} {:<20} {:>6} {:>6}", "ID", "Name", "Boards", "Tasks");
    for p in cache.projects() {
        println!(
            "{:<24} {:<20} {:>6} {:>6}",
            truncate(&p.id, 24),
            truncate(&p.name, 20),
            cache.boards_for_project(&p.id).len(),
            cache.tasks_for_project(&p.id).len()
        );
    }
    Ok(())
}

pub async fn cmd_project(cache: &Cache, action: ProjectAction) -> Result<()> {
    match action {
        ProjectAction::Add { name, desc, icon, color, user } => {
            let draft = NewProject { description: desc, icon, icon_color: color, user_id: user, ..NewProject::new(name) };
            let id = cache.add_project(draft).await?;
            println!("Added project {id}");
        }
        ProjectAction::Update { id, edit } => {
            let patch = ProjectPatch {
                name: edit.name.clone(),
                description: edit.description(),
                icon: edit.icon.clone(),
                icon_color: edit.color.clone(),
                config: edit.config(),
            };
            let id = cache.update_project(&id, patch).await?;
            println!("Updated project {id}");
        }
        ProjectAction::Rm { id } => {
            let boards = cache.boards_for_project(&id).len();
            let tasks = cache.tasks_for_project(&id).len();
            cache.delete_project(&id).await?;
            println!("Deleted project {id} ({boards} boards, {tasks} tasks)");
        }
    }
    Ok(())
}

/// List boards.
pub fn cmd_boards(cache: &Cache, project: Option<String>) -> Result<()> {
    let boards = match &project {
        Some(p) => cache.boards_for_project(p),
        None => cache.boards(),
    };
    println!("{:<24} {:<20} {:<24} {:>6}", "ID", "Name", "Project", "Tasks");
    for b in boards {
        println!(
            "{:<24} {:<20} {:<24} {:>6}",
            truncate(&b.id, 24),
            truncate(&b.name, 20),
            truncate(&b.project_id, 24),
            cache.tasks_for_board(&b.id).len()
        );
    }
    Ok(())
}

pub async fn cmd_board(cache: &Cache, action: BoardAction) -> Result<()> {
    match action {
        BoardAction::Add { name, project, desc, icon, color } => {
            let draft = NewBoard { description: desc, icon, icon_color: color, ..NewBoard::new(name, project) };
            let id = cache.add_board(draft).await?;
            println!("Added board {id}");
        }
        BoardAction::Update { id, edit } => {
            let patch = BoardPatch {
                name: edit.name.clone(),
                description: edit.description(),
                icon: edit.icon.clone(),
                icon_color: edit.color.clone(),
                config: edit.config(),
            };
            let id = cache.update_board(&id, patch).await?;
            println!("Updated board {id}");
        }
        BoardAction::Rm { id } => {
            let tasks = cache.tasks_for_board(&id).len();
            cache.delete_board(&id).await?;
            println!("Deleted board {id} ({tasks} tasks)");
        }
    }
    Ok(())
}

/// List tasks with optional filters.
pub fn cmd_tasks(
    cache: &Cache,
    board: Option<String>,
    project: Option<String>,
    user: Option<String>,
    status: Option<String>,
) -> Result<()> {
    let mut tasks = match (&board, &status) {
        (Some(b), Some(s)) => cache.tasks_in_column(b, s),
        (Some(b), None) => cache.tasks_for_board(b),
        (None, _) => match &project {
            Some(p) => cache.tasks_for_project(p),
            None => cache.tasks(),
        },
    };
    tasks.retain(|t| {
        project.as_ref().map_or(true, |p| &t.project_id == p)
            && user.as_ref().map_or(true, |u| t.touches_user(u))
            && status.as_ref().map_or(true, |s| t.status.eq_ignore_ascii_case(s))
    });
    print_table(&tasks);
    Ok(())
}

pub async fn cmd_task(cache: &Cache, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Add { name, board, desc, status, priority, labels, due, created_by } => {
            let project_id = cache.board(&board).map(|b| b.project_id).unwrap_or_default();
            let draft = NewTask {
                description: desc.unwrap_or_default(),
                status,
                priority,
                labels: split_labels(&labels),
                due_date: due.as_deref().map(due_input),
                created_by,
                ..NewTask::new(name, board, project_id)
            };
            let id = cache.add_task(draft).await?;
            println!("Added task {id}");
        }
        TaskAction::Update { id, name, desc, status, priority, labels, due, clear_due, order } => {
            let due_date = if clear_due {
                Some(None)
            } else {
                due.as_deref().map(due_input).map(Some)
            };
            let patch = TaskPatch {
                name,
                description: desc,
                status,
                priority,
                labels: (!labels.is_empty()).then(|| split_labels(&labels)),
                due_date,
                order,
                ..Default::default()
            };
            let id = cache.update_task(&id, patch).await?;
            println!("Updated task {id}");
        }
        TaskAction::Rm { id } => {
            cache.delete_task(&id).await?;
            println!("Deleted task {id}");
        }
    }
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

/// Print tasks in a simple table.
pub fn print_table(tasks: &[Task]) {
    println!("{:<24} {:<10} {:<12} {:<8} {:<10} {}", "ID", "Code", "Status", "Pri", "Due", "Name [labels]");
    let now = Utc::now();
    for t in tasks {
        let labels = if t.labels.is_empty() {
            String::new()
        } else {
            let names: Vec<&str> = t.labels.iter().map(|l| l.name.as_str()).collect();
            format!(" [{}]", names.join(","))
        };
        println!(
            "{:<24} {:<10} {:<12} {:<8} {:<10} {}{}",
            truncate(&t.id, 24),
            truncate(&t.task_id, 10),
            truncate(&t.status, 12),
            truncate(&t.priority, 8),
            format_due_relative(t.due_date, now),
            t.name,
            labels
        );
    }
}

fn split_labels(inputs: &[String]) -> Vec<LabelInput> {
    inputs
        .iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(LabelInput::from)
        .collect()
}

/// `key=value` pairs into a config; values that parse as JSON keep their type.
fn parse_settings(pairs: &[String]) -> Option<EntityConfig> {
    if pairs.is_empty() {
        return None;
    }
    let mut config = EntityConfig::default();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        config.settings.insert(key.trim().to_string(), value);
    }
    Some(config)
}

fn due_input(s: &str) -> DateInput {
    let today = Local::now().date_naive().and_hms_opt(0, 0, 0).map(|d| d.and_utc()).unwrap_or_else(Utc::now);
    match parse_due_input(s, today) {
        Some(due) => due.into(),
        None => {
            eprintln!("Unrecognised due date. Use YYYY-MM-DD, 'today', 'tomorrow', 'in Nd' or 'in Nw'.");
            std::process::exit(1);
        }
    }
}

/// Parse human-readable due date input relative to `today` (midnight UTC).
///
/// Supports "today", "tomorrow", "in 3d", "in 2w", and anything
/// [`parse_date_str`] accepts.
pub fn parse_due_input(input: &str, today: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = input.trim().to_lowercase();
    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }
    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(nd) = rest.strip_suffix('d') {
            return nd.trim().parse::<i64>().ok().map(|days| today + Duration::days(days));
        }
        if let Some(nw) = rest.strip_suffix('w') {
            return nw.trim().parse::<i64>().ok().map(|weeks| today + Duration::weeks(weeks));
        }
    }
    parse_date_str(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn due_input_accepts_relative_and_absolute_forms() {
        let today = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        assert_eq!(parse_due_input("Tomorrow", today), Some(today + Duration::days(1)));
        assert_eq!(parse_due_input("in 2w", today), Some(today + Duration::days(14)));
        assert_eq!(
            parse_due_input("2026-12-01", today),
            Some(Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_due_input("someday", today), None);
    }

    #[test]
    fn settings_keep_json_types() {
        let config = parse_settings(&["wip=3".into(), "theme=dark".into()]).unwrap();
        assert_eq!(config.settings["wip"], serde_json::json!(3));
        assert_eq!(config.settings["theme"], serde_json::json!("dark"));
        assert!(parse_settings(&[]).is_none());
    }

    #[test]
    fn labels_split_on_commas() {
        let labels = split_labels(&["bug, ui".into(), "docs".into()]);
        let names: Vec<&str> = labels.iter().map(LabelInput::name).collect();
        assert_eq!(names, vec!["bug", "ui", "docs"]);
    }
}
