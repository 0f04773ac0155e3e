use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;

mod api;
mod auth;
mod bugs;
mod error;
mod models;
mod session;
mod users;
mod workflow;

use api::{ApiClient, AttachmentUpload, NewBugReport};
use bugs::{BugDetailView, BugListView, SEARCH_DEBOUNCE, SortField};
use error::{ApiError, Result};
use models::{Bug, BugPriority, BugStatus, UserRole};
use session::{SessionManager, TokenStore};
use users::TeamTable;

#[derive(Parser)]
#[command(name = "bgtrack", about = "Terminal client for the bug tracker backend")]
struct Cli {
    /// Base URL of the bug tracker API, e.g. https://bugs.example.com/api
    #[arg(long, env = "BGTRACK_API_URL")]
    api_url: String,

    /// Where the access/refresh token pair is kept between runs
    #[arg(long, env = "BGTRACK_SESSION_FILE", default_value = ".bgtrack-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session tokens
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Revoke the refresh token and clear the stored session
    Logout,
    /// Create a new account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
        #[arg(long)]
        role_id: u32,
    },
    /// Show the signed-in identity
    Whoami,
    /// List bugs with client-side filter/sort/pagination
    Bugs {
        /// Only bugs assigned to me
        #[arg(long)]
        mine: bool,
        /// Status code filter (1=Open 2=InProgress 3=Resolved 4=Closed)
        #[arg(long)]
        status: Option<u8>,
        /// Priority filter (Low|Medium|High|Critical)
        #[arg(long)]
        priority: Option<String>,
        /// Case-insensitive match against title and id
        #[arg(long)]
        search: Option<String>,
        /// Sort field (created|updated|priority)
        #[arg(long, default_value = "created")]
        sort: String,
        /// Sort ascending instead of the default descending
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Operate on a single bug
    Bug {
        #[command(subcommand)]
        command: BugCommand,
    },
    /// Submit a bug report
    Report {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Low|Medium|High|Critical
        #[arg(long, default_value = "Medium")]
        priority: String,
        /// Severity level id; defaults to the first one the server offers
        #[arg(long)]
        severity_id: Option<u32>,
        #[arg(long, default_value = "")]
        steps: String,
        /// Developer id to assign immediately
        #[arg(long)]
        assign_to: Option<String>,
        /// File to attach; repeatable
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },
    /// Show the server reference lists
    Lists,
    /// Manage the local team table
    Users,
    /// Interactive bug dashboard
    Dashboard,
}

#[derive(Subcommand)]
enum BugCommand {
    /// Show one bug in full
    Show { id: String },
    /// Move a bug to a new status code
    Status { id: String, code: u8 },
    /// Assign a bug to yourself
    Assign { id: String },
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let store = TokenStore::new(cli.session_file.clone());
    let api = ApiClient::new(&cli.api_url, store);
    let mut session = SessionManager::restore(api.clone());

    if let Err(e) = run(cli.command, &api, &mut session).await {
        match e {
            ApiError::Unauthenticated(msg) => {
                eprintln!("{msg} - run `bgtrack login` to sign in");
            }
            other => eprintln!("error: {other}"),
        }
        std::process::exit(1);
    }
}

async fn run(command: Command, api: &ApiClient, session: &mut SessionManager) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let user = session.sign_in(&email, &password).await?;
            println!("Signed in as {} ({})", user.name, user.role);
            Ok(())
        }
        Command::Logout => {
            session.sign_out().await;
            println!("Signed out.");
            Ok(())
        }
        Command::Register {
            name,
            email,
            password,
            confirm_password,
            role_id,
        } => {
            let created = session
                .sign_up(&name, &email, &password, &confirm_password, role_id)
                .await?;
            println!("User account created successfully (id {})", created.user_id);
            Ok(())
        }
        Command::Whoami => {
            match session.current_user() {
                Some(user) => {
                    println!("{} <{}>", user.name, user.email);
                    println!("role: {}", user.role);
                    println!("can report bugs: {}", user.can_report_bugs);
                }
                None => println!("Not signed in."),
            }
            Ok(())
        }
        Command::Bugs {
            mine,
            status,
            priority,
            search,
            sort,
            asc,
            page,
        } => {
            let mut view = BugListView::new();
            view.refresh(api, mine).await?;
            if let Some(code) = status {
                let status = BugStatus::try_from(code).map_err(ApiError::Invalid)?;
                view.set_status_filter(Some(status));
            }
            if let Some(p) = priority {
                view.set_priority_filter(Some(p.parse().map_err(ApiError::Invalid)?));
            }
            if let Some(q) = search {
                view.set_search(&q);
            }
            view.set_sort_field(sort.parse().map_err(ApiError::Invalid)?);
            if asc {
                view.toggle_direction();
            }
            view.set_page(page);
            render_bug_page(&view);
            Ok(())
        }
        Command::Bug { command } => run_bug(command, api, session).await,
        Command::Report {
            title,
            description,
            priority,
            severity_id,
            steps,
            assign_to,
            attachments,
        } => {
            let user = session
                .current_user()
                .ok_or_else(|| ApiError::Unauthenticated("no stored session".into()))?;
            if !user.can_report_bugs {
                return Err(ApiError::Invalid(
                    "your account is not allowed to report bugs".into(),
                ));
            }
            let priority: BugPriority = priority.parse().map_err(ApiError::Invalid)?;
            let severity_id = match severity_id {
                Some(id) => id,
                None => {
                    // the form preselects the first severity the server offers
                    let levels = api.severity_levels().await?;
                    levels
                        .first()
                        .map(|l| l.id)
                        .ok_or_else(|| ApiError::Invalid("no severity levels available".into()))?
                }
            };
            let mut uploads = Vec::with_capacity(attachments.len());
            for path in &attachments {
                uploads.push(AttachmentUpload::from_path(path).await?);
            }
            let created = api
                .create_bug(&NewBugReport {
                    title,
                    description,
                    priority,
                    severity_id,
                    reproduction_steps: steps,
                    assigned_to_id: assign_to,
                    attachments: uploads,
                })
                .await?;
            println!("Bug reported successfully (id {})", created.bug_id);
            Ok(())
        }
        Command::Lists => {
            let lists = api.fetch_all_lists().await?;
            println!("Roles:");
            for role in &lists.roles {
                println!("  {:>3}  {}", role.id, role.name);
            }
            println!("Severity levels:");
            for level in &lists.severity_levels {
                println!("  {:>3}  {}", level.id, level.name);
            }
            println!("Developers:");
            for dev in &lists.developers {
                println!("  {}  {}", dev.id, dev.name);
            }
            println!("Statuses:");
            for status in &lists.statuses {
                println!("  {:>3}  {}", status.id, status.name);
            }
            Ok(())
        }
        Command::Users => {
            run_users();
            Ok(())
        }
        Command::Dashboard => run_dashboard(api, session).await,
    }
}

async fn run_bug(command: BugCommand, api: &ApiClient, session: &SessionManager) -> Result<()> {
    match command {
        BugCommand::Show { id } => {
            let mut view = BugDetailView::new(&id);
            view.load(api).await?;
            if let Some(bug) = view.bug() {
                print_bug_detail(bug);
                let transitions = view.available_transitions(session.current_user());
                if !transitions.is_empty() {
                    let names: Vec<_> = transitions
                        .iter()
                        .map(|s| format!("{} ({})", s.name(), s.code()))
                        .collect();
                    println!("next steps: {}", names.join(", "));
                }
            }
            Ok(())
        }
        BugCommand::Status { id, code } => {
            let status = BugStatus::try_from(code).map_err(ApiError::Invalid)?;
            let mut view = BugDetailView::new(&id);
            view.update_status(api, status).await?;
            println!("Status updated to {}", status.name());
            Ok(())
        }
        BugCommand::Assign { id } => {
            let mut view = BugDetailView::new(&id);
            view.assign_to_self(api).await?;
            println!("Bug assigned to you");
            Ok(())
        }
    }
}

// === interactive dashboard ===

async fn run_dashboard(api: &ApiClient, session: &SessionManager) -> Result<()> {
    let mut view = BugListView::new();
    view.refresh(api, false).await?;

    println!("bgtrack dashboard - 'h' for help, 'q' to quit");
    render_bug_page(&view);

    let stdin = std::io::stdin();
    loop {
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            return Ok(());
        }
        // typing has stopped by the time a command arrives
        if view.apply_pending_search(Instant::now()) {
            render_bug_page(&view);
        }

        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };
        let rest: Vec<&str> = parts.collect();

        match cmd {
            "q" => return Ok(()),
            "h" => {
                println!("s <text>      search title/id ('s' alone clears)");
                println!("st <code>     filter by status code, 'st all' clears");
                println!("pr <name>     filter by priority, 'pr all' clears");
                println!("sort <field>  created|updated|priority");
                println!("dir           toggle sort direction");
                println!("n / p         next / previous page");
                println!("page <n>      jump to page");
                println!("open <id>     show one bug");
                println!("mv <id> <c>   move bug to status code (developers)");
                println!("assign <id>   assign bug to yourself");
                println!("r             refetch from the server");
                continue;
            }
            "s" => {
                view.type_search(&rest.join(" "), Instant::now());
                // emulate the quiet period, then apply
                tokio::time::sleep(SEARCH_DEBOUNCE).await;
                view.apply_pending_search(Instant::now());
            }
            "st" => match rest.first() {
                Some(&"all") => view.set_status_filter(None),
                Some(code) => match code.parse::<u8>().ok().and_then(|c| BugStatus::try_from(c).ok()) {
                    Some(status) => view.set_status_filter(Some(status)),
                    None => {
                        println!("unknown status code");
                        continue;
                    }
                },
                None => {
                    println!("usage: st <code>|all");
                    continue;
                }
            },
            "pr" => match rest.first() {
                Some(&"all") => view.set_priority_filter(None),
                Some(name) => match name.parse::<BugPriority>() {
                    Ok(priority) => view.set_priority_filter(Some(priority)),
                    Err(e) => {
                        println!("{e}");
                        continue;
                    }
                },
                None => {
                    println!("usage: pr <priority>|all");
                    continue;
                }
            },
            "sort" => match rest.first().map(|s| s.parse::<SortField>()) {
                Some(Ok(field)) => view.set_sort_field(field),
                _ => {
                    println!("usage: sort created|updated|priority");
                    continue;
                }
            },
            "dir" => view.toggle_direction(),
            "n" => view.next_page(),
            "p" => view.prev_page(),
            "page" => match rest.first().and_then(|s| s.parse::<usize>().ok()) {
                Some(n) => view.set_page(n),
                None => {
                    println!("usage: page <n>");
                    continue;
                }
            },
            "open" => {
                match rest.first() {
                    Some(id) => {
                        let mut detail = BugDetailView::new(id);
                        match detail.load(api).await {
                            Ok(()) => {
                                if let Some(bug) = detail.bug() {
                                    print_bug_detail(bug);
                                    let steps =
                                        detail.available_transitions(session.current_user());
                                    if !steps.is_empty() {
                                        let names: Vec<_> = steps
                                            .iter()
                                            .map(|s| format!("{} ({})", s.name(), s.code()))
                                            .collect();
                                        println!("next steps: {}", names.join(", "));
                                    }
                                }
                            }
                            Err(e) => println!("{e}"),
                        }
                    }
                    None => println!("usage: open <id>"),
                }
                continue;
            }
            "mv" => {
                match (rest.first(), rest.get(1).and_then(|s| s.parse::<u8>().ok())) {
                    (Some(id), Some(code)) => match BugStatus::try_from(code) {
                        Ok(status) => {
                            let mut detail = BugDetailView::new(id);
                            match detail.update_status(api, status).await {
                                Ok(()) => {
                                    println!("Status updated to {}", status.name());
                                    if let Err(e) = view.refresh(api, false).await {
                                        println!("{e}");
                                    }
                                }
                                Err(e) => println!("Failed to update status: {e}"),
                            }
                        }
                        Err(e) => println!("{e}"),
                    },
                    _ => println!("usage: mv <id> <status code>"),
                }
            }
            "assign" => {
                match rest.first() {
                    Some(id) => {
                        let mut detail = BugDetailView::new(id);
                        match detail.assign_to_self(api).await {
                            Ok(()) => {
                                println!("Bug assigned to you");
                                if let Err(e) = view.refresh(api, false).await {
                                    println!("{e}");
                                }
                            }
                            Err(e) => println!("Failed to assign bug: {e}"),
                        }
                    }
                    None => println!("usage: assign <id>"),
                }
            }
            "r" => {
                if let Err(e) = view.refresh(api, false).await {
                    println!("Failed to fetch bugs: {e}");
                    continue;
                }
            }
            other => {
                println!("unknown command {other:?}, 'h' for help");
                continue;
            }
        }
        render_bug_page(&view);
    }
}

fn run_users() {
    let mut table = TeamTable::seeded();
    render_team(&table);
    println!("commands: add <name> <email> <role> | edit <id> <name> <email> <role> | rm <id> | toggle <id> | q");

    let stdin = std::io::stdin();
    loop {
        let mut line = String::new();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["q"] => return,
            ["add", name, email, role] => match role.parse::<UserRole>() {
                Ok(role) => {
                    if table.add(name, email, role).is_none() {
                        println!("name and email are required");
                    }
                }
                Err(e) => println!("{e}"),
            },
            ["edit", id, name, email, role] => {
                match (id.parse::<u32>(), role.parse::<UserRole>()) {
                    (Ok(id), Ok(role)) => {
                        if !table.edit(id, name, email, role) {
                            println!("no member with id {id}");
                        }
                    }
                    _ => println!("usage: edit <id> <name> <email> <role>"),
                }
            }
            ["rm", id] => {
                if let Ok(id) = id.parse::<u32>() {
                    if !table.remove(id) {
                        println!("no member with id {id}");
                    }
                }
            }
            ["toggle", id] => {
                if let Ok(id) = id.parse::<u32>() {
                    if table.toggle_status(id).is_none() {
                        println!("no member with id {id}");
                    }
                }
            }
            [] => continue,
            _ => {
                println!("unknown command");
                continue;
            }
        }
        render_team(&table);
    }
}

// === rendering ===

fn render_bug_page(view: &BugListView) {
    let items = view.page_items();
    let total = view.total_matches();
    if total == 0 {
        println!("No bugs found. Try adjusting your filters.");
        return;
    }
    if items.is_empty() {
        println!(
            "Page {} is empty ({} bugs, {} pages).",
            view.page(),
            total,
            view.total_pages()
        );
        return;
    }

    println!(
        "{:<10} {:<40} {:<12} {:<9} {:<18} {:<18} {:<11}",
        "ID", "TITLE", "STATUS", "PRIORITY", "REPORTED BY", "ASSIGNED TO", "CREATED"
    );
    for bug in &items {
        println!(
            "{:<10} {:<40} {:<12} {:<9} {:<18} {:<18} {:<11}",
            truncate(&bug.id, 8),
            truncate(&bug.title, 38),
            bug.status.name(),
            bug.priority.name(),
            truncate(bug.reporter_name.as_deref().unwrap_or("Unknown"), 16),
            truncate(bug.assigned_to_name.as_deref().unwrap_or("Unassigned"), 16),
            bug.created_date.format("%Y-%m-%d"),
        );
    }

    let start = (view.page() - 1) * bugs::PAGE_SIZE + 1;
    let end = start + items.len() - 1;
    println!(
        "Showing {start} to {end} of {total} bugs (page {}/{})",
        view.page(),
        view.total_pages()
    );
}

fn print_bug_detail(bug: &Bug) {
    println!("{}  [{}]", bug.title, bug.id);
    println!("status:   {}", bug.status.name());
    println!("priority: {}", bug.priority.name());
    println!(
        "reported: {} by {}",
        bug.created_date.format("%Y-%m-%d %H:%M"),
        bug.reporter_name.as_deref().unwrap_or("Unknown")
    );
    println!(
        "assigned: {}",
        bug.assigned_to_name.as_deref().unwrap_or("Unassigned")
    );
    println!();
    println!(
        "{}",
        bug.description.as_deref().unwrap_or("No description provided.")
    );
    if let Some(steps) = &bug.reproduction_steps {
        println!();
        println!("Reproduction steps:");
        println!("{steps}");
    }
    if let Some(attachments) = &bug.attachments {
        if !attachments.is_empty() {
            println!();
            println!("Attachments:");
            for attachment in attachments {
                println!(
                    "  {}  {}  {:.2} MB",
                    attachment.file_name,
                    attachment.content_type,
                    attachment.length as f64 / 1024.0 / 1024.0
                );
            }
        }
    }
}

fn render_team(table: &TeamTable) {
    println!(
        "{:<4} {:<18} {:<22} {:<10} {:>8} {:>7} {:<9} {:<11}",
        "ID", "NAME", "EMAIL", "ROLE", "ASSIGNED", "CLOSED", "STATUS", "JOINED"
    );
    for member in table.members() {
        println!(
            "{:<4} {:<18} {:<22} {:<10} {:>8} {:>7} {:<9} {:<11}",
            member.id,
            truncate(&member.name, 16),
            truncate(&member.email, 20),
            member.role,
            member.bugs_assigned,
            member.bugs_closed,
            member.status,
            member.join_date,
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}..")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 8), "short");
        assert_eq!(truncate("a longer title here", 8), "a longer..");
        assert_eq!(truncate("héllo wörld", 5), "héllo..");
    }
}
