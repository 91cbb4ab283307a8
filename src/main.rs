use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use ideatrium::ai::{AiService, Assessment, GeminiClient, SuggestionContent};
use ideatrium::config::{self, Config, StorageBackend};
use ideatrium::filter::{
    DateRange, IdeaFilter, IdeaSortKey, IdeaStats, Preset, SortOrder, TaskFilter, TaskSortKey,
    TaskStats, partition_by_status,
};
use ideatrium::offline::{CacheStorage, CurlFetcher, Request, Router};
use ideatrium::quadrant::{Quadrant, Score};
use ideatrium::records::{BulkOutcome, LOCAL_OWNER, RecordManager};
use ideatrium::store::{
    Backend, IdeaDraft, IdeaPatch, IdeaStatus, LocalStore, Priority, Store, SubtaskPatch, TagSet,
    Task, TaskDraft, TaskPatch, TaskStatus,
};

#[derive(Parser)]
#[command(
    name = "ideatrium",
    about = "Capture ideas, score them on impact and effort, and turn them into tasks",
    version = env!("IDEATRIUM_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the ~/.ideatrium directory
    Init,
    /// Show the signed-in profile
    Whoami,
    /// Manage ideas
    Idea {
        #[command(subcommand)]
        action: IdeaAction,
    },
    /// Update or delete many records at once
    Bulk {
        #[command(subcommand)]
        action: BulkAction,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Manage a task's checklist
    Subtask {
        #[command(subcommand)]
        action: SubtaskAction,
    },
    /// Manage tags
    Tag {
        #[command(subcommand)]
        action: Option<TagAction>,
    },
    /// Show idea and task statistics
    Stats,
    /// AI suggestions for one idea
    Suggest {
        /// Idea ID
        id: String,
    },
    /// AI insights across all ideas
    Insights,
    /// Export all ideas, tasks and tags as JSON
    Export {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how the offline router would serve a URL
    Route {
        /// Absolute URL or path relative to the configured origin
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Treat as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Actually fetch through the router
        #[arg(long)]
        fetch: bool,
    },
}

#[derive(Subcommand)]
enum IdeaAction {
    /// Capture a new idea
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Tag ID (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// 1-5, default 3
        #[arg(long)]
        impact: Option<u8>,
        /// 1-5, default 3
        #[arg(long)]
        effort: Option<u8>,
    },
    /// List ideas
    List {
        #[command(flatten)]
        filter: IdeaFilterArgs,
        /// Also list archived ideas
        #[arg(long)]
        archived: bool,
    },
    /// Show one idea and its tasks
    Show { id: String },
    /// Edit an idea
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_description")]
        description: Option<String>,
        #[arg(long)]
        clear_description: bool,
        /// Replace tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
        #[arg(long)]
        impact: Option<u8>,
        #[arg(long)]
        effort: Option<u8>,
    },
    Archive { id: String },
    Restore { id: String },
    /// Delete an idea together with its tasks
    Delete { id: String },
    /// Move an idea to a quadrant (q1-q4)
    Move { id: String, quadrant: Quadrant },
}

#[derive(Subcommand)]
enum BulkAction {
    /// Apply the same change to several ideas
    UpdateIdeas {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        impact: Option<u8>,
        #[arg(long)]
        effort: Option<u8>,
        #[arg(long)]
        status: Option<IdeaStatus>,
        /// Replace tags (repeatable)
        #[arg(short, long = "tag")]
        tags: Option<Vec<String>>,
    },
    DeleteIdeas {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Apply the same change to several tasks
    UpdateTasks {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<Priority>,
    },
    DeleteTasks {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Convert an idea into a task
    Convert {
        idea_id: String,
        /// Defaults to the idea's title
        #[arg(long)]
        title: Option<String>,
        /// Defaults to the idea's description
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        estimate: Option<f64>,
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Checklist item (repeatable)
        #[arg(short, long = "subtask")]
        subtasks: Vec<String>,
    },
    /// List tasks
    List {
        #[command(flatten)]
        filter: TaskFilterArgs,
        /// Only tasks created from this idea
        #[arg(long)]
        idea: Option<String>,
    },
    Show { id: String },
    /// Edit a task
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        estimate: Option<f64>,
        #[arg(long)]
        actual: Option<f64>,
    },
    /// Delete a task and its checklist
    Delete { id: String },
}

#[derive(Subcommand)]
enum SubtaskAction {
    Add {
        task_id: String,
        title: String,
    },
    Update {
        task_id: String,
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        completed: Option<bool>,
    },
    Delete {
        task_id: String,
        id: String,
    },
}

#[derive(Subcommand)]
enum TagAction {
    List,
    /// Create a custom tag
    Add {
        name: String,
        #[arg(long, default_value = "#6B7280")]
        color: String,
    },
    /// Delete a custom tag and remove it from every record
    Delete { id: String },
}

#[derive(Args)]
struct IdeaFilterArgs {
    #[arg(short, long, default_value = "")]
    search: String,
    /// Match any of these tags (repeatable)
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    /// q1-q4 (repeatable)
    #[arg(short, long = "quadrant")]
    quadrants: Vec<Quadrant>,
    /// Created on or after, YYYY-MM-DD
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Created on or before, YYYY-MM-DD
    #[arg(long)]
    to: Option<NaiveDate>,
    /// date, title, impact or effort
    #[arg(long)]
    sort: Option<IdeaSortKey>,
    /// asc or desc
    #[arg(long)]
    order: Option<SortOrder>,
    /// high-impact, quick-wins, recent or needs-planning
    #[arg(long)]
    preset: Option<Preset>,
}

impl IdeaFilterArgs {
    fn build(self) -> Result<IdeaFilter> {
        let mut filter = IdeaFilter::default();
        if let Some(preset) = self.preset {
            filter.apply_preset(preset);
        }
        ideatrium::validation::search_query(&self.search)?;
        filter.search = self.search;
        filter.tags = self.tags.into_iter().collect();
        if !self.quadrants.is_empty() {
            filter.quadrants = self.quadrants.into_iter().collect();
        }
        if self.from.is_some() || self.to.is_some() {
            filter.date_range = Some(DateRange {
                from: self.from,
                to: self.to,
            });
        }
        if let Some(sort) = self.sort {
            filter.sort_by = sort;
        }
        if let Some(order) = self.order {
            filter.sort_order = order;
        }
        Ok(filter)
    }
}

#[derive(Args)]
struct TaskFilterArgs {
    #[arg(short, long, default_value = "")]
    search: String,
    #[arg(short, long = "tag")]
    tags: Vec<String>,
    /// not_started, in_progress or completed (repeatable)
    #[arg(long = "status")]
    statuses: Vec<TaskStatus>,
    /// low, medium, high or urgent (repeatable)
    #[arg(short, long = "priority")]
    priorities: Vec<Priority>,
    /// due_date, priority, created or title
    #[arg(long)]
    sort: Option<TaskSortKey>,
    #[arg(long)]
    order: Option<SortOrder>,
}

impl TaskFilterArgs {
    fn build(self) -> Result<TaskFilter> {
        ideatrium::validation::search_query(&self.search)?;
        let mut filter = TaskFilter {
            search: self.search,
            tags: self.tags.into_iter().collect(),
            statuses: self.statuses.into_iter().collect(),
            priorities: self.priorities.into_iter().collect(),
            ..TaskFilter::default()
        };
        if let Some(sort) = self.sort {
            filter.sort_by = sort;
        }
        if let Some(order) = self.order {
            filter.sort_order = order;
        }
        Ok(filter)
    }
}

fn score(raw: Option<u8>) -> Result<Option<Score>> {
    Ok(raw.map(Score::new).transpose()?)
}

fn tag_set(tags: Vec<String>) -> TagSet {
    tags.into_iter().collect()
}

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load()?;
    init_tracing(&config.log_level);

    match cli.command {
        Commands::Init => {
            config::ensure_dirs()?;
            println!("ideatrium initialized at ~/.ideatrium/");
            Ok(())
        }
        Commands::Route {
            url,
            method,
            navigate,
            fetch,
        } => route(&config, Request { method, url, navigate }, fetch),
        command => {
            config::ensure_dirs()?;
            let path = config.storage_path()?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            match config.storage.backend {
                StorageBackend::Sqlite => {
                    let store = Store::open(&path)?;
                    store.migrate()?;
                    let mut records = RecordManager::new(store, None);
                    if let Some(ref user_id) = config.account.user_id {
                        records.sign_in(user_id, config.account.display_name.as_deref())?;
                    }
                    run(&records, &config, command)
                }
                StorageBackend::Local => {
                    let mut records = RecordManager::new(LocalStore::open(&path)?, None);
                    records.sign_in(LOCAL_OWNER, None)?;
                    run(&records, &config, command)
                }
            }
        }
    }
}

fn ai_service(config: &Config) -> AiService {
    match config.ai.api_key() {
        Some(key) => AiService::new(Box::new(GeminiClient::new(
            key,
            config.ai.endpoint.clone(),
            config.ai.model.clone(),
            config.ai.generation(),
        ))),
        None => AiService::offline(),
    }
}

fn run<B: Backend>(records: &RecordManager<B>, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Init | Commands::Route { .. } => bail!("command does not use record storage"),
        Commands::Whoami => {
            match records.profile()? {
                Some(profile) => println!(
                    "{} ({})",
                    profile.user_id,
                    profile.display_name.as_deref().unwrap_or("no display name")
                ),
                None => println!("Signed in, but no profile exists."),
            }
            Ok(())
        }
        Commands::Idea { action } => run_idea(records, action),
        Commands::Bulk { action } => run_bulk(records, action),
        Commands::Task { action } => run_task(records, action),
        Commands::Subtask { action } => run_subtask(records, action),
        Commands::Tag { action } => run_tag(records, action.unwrap_or(TagAction::List)),
        Commands::Stats => {
            let now = Utc::now();
            let ideas = IdeaStats::compute(&records.list_ideas()?, now);
            let tasks = TaskStats::compute(&records.list_tasks()?, now.date_naive());
            println!("Ideas:");
            println!("  Total:           {}", ideas.total);
            println!("  Active:          {}", ideas.active);
            println!("  Archived:        {}", ideas.archived);
            for (quadrant, count) in &ideas.per_quadrant {
                println!("  {:<16} {count}", format!("{quadrant}:"));
            }
            println!("  Avg impact:      {:.1}", ideas.avg_impact);
            println!("  Avg effort:      {:.1}", ideas.avg_effort);
            println!("  Last 7 days:     {}", ideas.recent);
            println!("  Unique tags:     {}", ideas.unique_tags);
            println!("Tasks:");
            println!("  Total:           {}", tasks.total);
            println!("  Completed:       {}", tasks.completed);
            println!("  In progress:     {}", tasks.in_progress);
            println!("  Not started:     {}", tasks.not_started);
            println!("  Overdue:         {}", tasks.overdue);
            println!("  Completion rate: {}%", tasks.completion_rate);
            Ok(())
        }
        Commands::Suggest { id } => {
            let idea = records.get_idea(&id)?;
            let assessment = ai_service(config).suggestions(&idea);
            print_warning(&assessment);
            for s in &assessment.items {
                println!("{} ({:.0}% confident)", s.title, s.confidence * 100.0);
                match &s.content {
                    SuggestionContent::Text(text) => println!("  {text}"),
                    SuggestionContent::Steps(steps) => {
                        for (i, step) in steps.iter().enumerate() {
                            println!("  {}. {step}", i + 1);
                        }
                    }
                    SuggestionContent::ProsCons { pros, cons } => {
                        for p in pros {
                            println!("  + {p}");
                        }
                        for c in cons {
                            println!("  - {c}");
                        }
                    }
                }
                if let Some(ref reasoning) = s.reasoning {
                    println!("  Why: {reasoning}");
                }
            }
            Ok(())
        }
        Commands::Insights => {
            let ideas = records.list_ideas()?;
            if ideas.is_empty() {
                println!("No ideas yet. Use `ideatrium idea add <title>` to capture one.");
                return Ok(());
            }
            let assessment = ai_service(config).insights(&ideas);
            print_warning(&assessment);
            for insight in &assessment.items {
                let marker = if insight.actionable { "→" } else { " " };
                println!(
                    "{marker} {} ({:.0}% confident)\n    {}",
                    insight.title,
                    insight.confidence * 100.0,
                    insight.description
                );
            }
            Ok(())
        }
        Commands::Export { output } => {
            let export = records.export()?;
            let json = serde_json::to_string_pretty(&export)?;
            if let Some(path) = output {
                fs::write(&path, &json)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!(
                    "Exported {} ideas, {} tasks and {} tags to {}",
                    export.ideas.len(),
                    export.tasks.len(),
                    export.tags.len(),
                    path.display()
                );
            } else {
                println!("{json}");
            }
            Ok(())
        }
    }
}

fn print_warning<T>(assessment: &Assessment<T>) {
    if let Some(ref warning) = assessment.warning {
        eprintln!("warning: {warning}");
    }
}

fn run_idea<B: Backend>(records: &RecordManager<B>, action: IdeaAction) -> Result<()> {
    match action {
        IdeaAction::Add {
            title,
            description,
            tags,
            impact,
            effort,
        } => {
            let draft = IdeaDraft {
                title,
                description,
                tags: tag_set(tags),
                impact: score(impact)?,
                effort: score(effort)?,
            };
            let idea = records.create_idea(&draft)?;
            println!("Captured {} ({})", idea, idea.id);
        }
        IdeaAction::List { filter, archived } => {
            let filter = filter.build()?;
            let ideas = records.list_ideas()?;
            let shown = filter.apply(&ideas);
            let (active, archived_ideas) = partition_by_status(&shown);
            if active.is_empty() && (!archived || archived_ideas.is_empty()) {
                if filter.is_active() {
                    println!("No ideas match the current filters.");
                } else {
                    println!("No ideas. Use `ideatrium idea add <title>` to capture one.");
                }
                return Ok(());
            }
            for quadrant in Quadrant::ALL {
                let members: Vec<_> = active.iter().filter(|i| i.quadrant() == quadrant).collect();
                if members.is_empty() {
                    continue;
                }
                println!("{} ({})", quadrant.title(), quadrant.subtitle());
                for idea in members {
                    println!(
                        "  {}  {}  [impact {} / effort {}]",
                        idea.id,
                        idea.title,
                        idea.impact(),
                        idea.effort()
                    );
                }
            }
            if archived && !archived_ideas.is_empty() {
                println!("Archived");
                for idea in &archived_ideas {
                    println!("  {}  {}", idea.id, idea.title);
                }
            }
        }
        IdeaAction::Show { id } => {
            let idea = records.get_idea(&id)?;
            println!("{idea}");
            println!("  id:       {}", idea.id);
            println!("  status:   {}", idea.status.as_str());
            if let Some(ref description) = idea.description {
                println!("  details:  {description}");
            }
            if !idea.tags.is_empty() {
                let tags: Vec<&str> = idea.tags.iter().map(String::as_str).collect();
                println!("  tags:     {}", tags.join(", "));
            }
            println!("  created:  {}", idea.created_at.format("%Y-%m-%d %H:%M"));
            for task in records.tasks_for_idea(&idea.id)? {
                print_task_line(&task);
            }
        }
        IdeaAction::Update {
            id,
            title,
            description,
            clear_description,
            tags,
            impact,
            effort,
        } => {
            let patch = IdeaPatch {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                tags: tags.map(tag_set),
                impact: score(impact)?,
                effort: score(effort)?,
                status: None,
            };
            if patch.is_empty() {
                bail!("nothing to update");
            }
            let idea = records.update_idea(&id, &patch)?;
            println!("Updated {idea}");
        }
        IdeaAction::Archive { id } => {
            let idea = records.archive_idea(&id)?;
            println!("Archived '{}'", idea.title);
        }
        IdeaAction::Restore { id } => {
            let idea = records.restore_idea(&id)?;
            println!("Restored '{}'", idea.title);
        }
        IdeaAction::Delete { id } => {
            if records.delete_idea(&id)? {
                println!("Deleted idea {id}");
            } else {
                println!("No idea {id}");
            }
        }
        IdeaAction::Move { id, quadrant } => {
            let idea = records.move_idea(&id, quadrant)?;
            println!("Moved {idea}");
        }
    }
    Ok(())
}

fn print_bulk(verb: &str, kind: &str, outcome: &BulkOutcome) {
    println!("{verb} {} {kind}", outcome.affected.len());
    if !outcome.missing.is_empty() {
        println!("  not found: {}", outcome.missing.join(", "));
    }
    for (id, error) in &outcome.failed {
        println!("  failed {id}: {error}");
    }
}

fn run_bulk<B: Backend>(records: &RecordManager<B>, action: BulkAction) -> Result<()> {
    match action {
        BulkAction::UpdateIdeas {
            ids,
            impact,
            effort,
            status,
            tags,
        } => {
            let patch = IdeaPatch {
                tags: tags.map(tag_set),
                impact: score(impact)?,
                effort: score(effort)?,
                status,
                ..IdeaPatch::default()
            };
            print_bulk("Updated", "ideas", &records.bulk_update_ideas(&ids, &patch)?);
        }
        BulkAction::DeleteIdeas { ids } => {
            print_bulk("Deleted", "ideas", &records.bulk_delete_ideas(&ids)?);
        }
        BulkAction::UpdateTasks {
            ids,
            status,
            priority,
        } => {
            let patch = TaskPatch {
                status,
                priority,
                ..TaskPatch::default()
            };
            print_bulk("Updated", "tasks", &records.bulk_update_tasks(&ids, &patch)?);
        }
        BulkAction::DeleteTasks { ids } => {
            print_bulk("Deleted", "tasks", &records.bulk_delete_tasks(&ids)?);
        }
    }
    Ok(())
}

fn print_task_line(task: &Task) {
    let due = task
        .due_date
        .map(|d| format!(" due {d}"))
        .unwrap_or_default();
    let overdue = if task.is_overdue(Utc::now().date_naive()) {
        " OVERDUE"
    } else {
        ""
    };
    let done = task.subtasks.iter().filter(|s| s.completed).count();
    let checklist = if task.subtasks.is_empty() {
        String::new()
    } else {
        format!(" ({done}/{})", task.subtasks.len())
    };
    println!(
        "  {} {}  {} [{}]{due}{overdue}{checklist}",
        task.status().symbol(),
        task.id,
        task.title,
        task.priority.as_str(),
    );
}

fn run_task<B: Backend>(records: &RecordManager<B>, action: TaskAction) -> Result<()> {
    match action {
        TaskAction::Convert {
            idea_id,
            title,
            description,
            priority,
            due,
            estimate,
            tags,
            subtasks,
        } => {
            let idea = records.get_idea(&idea_id)?;
            let draft = TaskDraft {
                title: title.unwrap_or_else(|| idea.title.clone()),
                description: description.or_else(|| idea.description.clone()),
                priority,
                due_date: due,
                estimated_hours: estimate,
                tags: if tags.is_empty() {
                    idea.tags.clone()
                } else {
                    tag_set(tags)
                },
                subtasks,
            };
            let task = records.convert_idea_to_task(&idea.id, &draft)?;
            println!("Created task '{}' ({}) from '{}'", task.title, task.id, idea.title);
        }
        TaskAction::List { filter, idea } => {
            let filter = filter.build()?;
            let tasks = match idea {
                Some(ref idea_id) => records.tasks_for_idea(idea_id)?,
                None => records.list_tasks()?,
            };
            let shown = filter.apply(&tasks);
            if shown.is_empty() {
                println!("No tasks.");
            }
            for task in shown {
                print_task_line(task);
            }
        }
        TaskAction::Show { id } => {
            let task = records.get_task(&id)?;
            print_task_line(&task);
            if let Some(ref description) = task.description {
                println!("    {description}");
            }
            if let Some(hours) = task.estimated_hours {
                println!("    estimate: {hours}h");
            }
            if let Some(hours) = task.actual_hours {
                println!("    actual:   {hours}h");
            }
            if let Some(at) = task.completed_at() {
                println!("    completed {}", at.format("%Y-%m-%d %H:%M"));
            }
            for subtask in &task.subtasks {
                let mark = if subtask.completed { "x" } else { " " };
                println!("    [{mark}] {}  {}", subtask.id, subtask.title);
            }
        }
        TaskAction::Update {
            id,
            title,
            description,
            status,
            priority,
            due,
            clear_due,
            estimate,
            actual,
        } => {
            let patch = TaskPatch {
                title,
                description: description.map(Some),
                status,
                priority,
                due_date: if clear_due { Some(None) } else { due.map(Some) },
                estimated_hours: estimate.map(Some),
                actual_hours: actual.map(Some),
                tags: None,
            };
            if patch.is_empty() {
                bail!("nothing to update");
            }
            let task = records.update_task(&id, &patch)?;
            println!("Updated task '{}' [{}]", task.title, task.status().as_str());
        }
        TaskAction::Delete { id } => {
            if records.delete_task(&id)? {
                println!("Deleted task {id}");
            } else {
                println!("No task {id}");
            }
        }
    }
    Ok(())
}

fn run_subtask<B: Backend>(records: &RecordManager<B>, action: SubtaskAction) -> Result<()> {
    match action {
        SubtaskAction::Add { task_id, title } => {
            let subtask = records.add_subtask(&task_id, &title)?;
            println!("Added '{}' ({})", subtask.title, subtask.id);
        }
        SubtaskAction::Update {
            task_id,
            id,
            title,
            completed,
        } => {
            let patch = SubtaskPatch { title, completed };
            if patch == SubtaskPatch::default() {
                bail!("nothing to update");
            }
            if !records.update_subtask(&task_id, &id, &patch)? {
                bail!("no subtask {id} on task {task_id}");
            }
            println!("Updated subtask {id}");
        }
        SubtaskAction::Delete { task_id, id } => {
            if records.delete_subtask(&task_id, &id)? {
                println!("Deleted subtask {id}");
            } else {
                println!("No subtask {id} on task {task_id}");
            }
        }
    }
    Ok(())
}

fn run_tag<B: Backend>(records: &RecordManager<B>, action: TagAction) -> Result<()> {
    match action {
        TagAction::List => {
            for tag in records.list_tags()? {
                println!(
                    "  {:<12} {:<16} {} ({})",
                    tag.id,
                    tag.name,
                    tag.color,
                    tag.category.as_str()
                );
            }
        }
        TagAction::Add { name, color } => {
            let tag = records.create_tag(&name, &color)?;
            println!("Created tag '{}' ({})", tag.name, tag.id);
        }
        TagAction::Delete { id } => {
            if records.delete_tag(&id)? {
                println!("Deleted tag {id}");
            } else {
                println!("Tag {id} is a preset or does not exist");
            }
        }
    }
    Ok(())
}

fn route(config: &Config, request: Request, fetch: bool) -> Result<()> {
    let router = Router::new(
        config.offline.router.clone(),
        config.offline.origin.clone(),
        CacheStorage::new(),
        Arc::new(CurlFetcher),
    );
    let Some(strategy) = router.strategy_for(&request) else {
        println!("passthrough (not intercepted)");
        return Ok(());
    };
    println!("{}", strategy.as_str());
    if !fetch {
        return Ok(());
    }
    if let Some(served) = router.handle(&request) {
        println!(
            "{:?}: {} {} ({} bytes)",
            served.source,
            served.response.status,
            served.response.content_type,
            served.response.body.len()
        );
        if let Some(handle) = served.revalidation
            && handle.join().is_err()
        {
            tracing::warn!("revalidation thread panicked");
        }
    }
    Ok(())
}
