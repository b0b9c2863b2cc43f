use anyhow::Result;
use colored::*;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use spoton::chat::{RejectReason, SubmitOutcome};
use spoton::detail::{DescriptionView, Segment};
use spoton::map_view::HeadlessSurface;
use spoton::models::Role;
use spoton::search::SelectOutcome;
use spoton::{Config, LocalityPage, PageSnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the console view on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spoton=info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let surface = Arc::new(HeadlessSurface::new());
    let page = LocalityPage::from_config(&config, surface)?;
    tracing::info!("main: page ready, reading commands from stdin");

    print_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        let (command, arg) = match line.split_once(' ') {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => break,
            "/help" => print_help(),
            "/blur" => page.search().on_blur(),
            "/search" => report_selection(page.submit_search().await),
            "/select" => report_selection(page.select(arg).await),
            "/ask" => report_chat(page.ask(arg).await),
            "/chat" => match arg {
                "open" => page.chat().open(),
                "close" => page.chat().close(),
                other => println!("{}", format!("unknown chat action '{other}'").red()),
            },
            "/years" => match arg.parse::<u32>() {
                Ok(years) => page.set_time_range(years),
                Err(_) => println!("{}", "years must be a whole number".red()),
            },
            _ if command.starts_with('/') => {
                println!("{}", format!("unknown command '{command}'").red())
            }
            _ => page.search().on_input_change(line),
        }
        render(&page.snapshot());
    }

    page.unmount();
    tracing::info!("main: console closed");
    Ok(())
}

fn print_help() {
    println!("{}", "SpotOn".bold());
    println!("  <text>           type into the search box");
    println!("  /select <name>   pick a locality");
    println!("  /search          look up what is typed");
    println!("  /blur            leave the search box");
    println!("  /ask <question>  ask the assistant");
    println!("  /chat open|close toggle the chat panel");
    println!("  /years <n>       set the appreciation horizon");
    println!("  /quit");
}

fn report_selection(outcome: SelectOutcome) {
    match outcome {
        SelectOutcome::Selected(record) => {
            println!("{} {}", "selected".green(), record.name.bold())
        }
        SelectOutcome::Failed(message) | SelectOutcome::Rejected(message) => {
            println!("{}", message.red())
        }
        SelectOutcome::Superseded => println!("{}", "superseded by a newer search".dimmed()),
    }
}

fn report_chat(outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Rejected(RejectReason::Empty) => println!("{}", "nothing to send".yellow()),
        SubmitOutcome::Rejected(RejectReason::Busy) => {
            println!("{}", "still waiting for the last answer".yellow())
        }
        SubmitOutcome::Discarded => println!("{}", "answer dropped".dimmed()),
        SubmitOutcome::Answered | SubmitOutcome::Failed => {}
    }
}

fn render(snap: &PageSnapshot) {
    println!("{}", "─".repeat(48).dimmed());
    let busy = if snap.search.pending { " …" } else { "" };
    println!("search: [{}]{}", snap.search.query, busy);
    if snap.search.suggestions_visible {
        for s in &snap.search.suggestions {
            println!("  {} {}", "•".dimmed(), s);
        }
    }
    if let Some(error) = &snap.search.error {
        println!("{}", error.red());
    }

    match &snap.detail {
        None => println!("{}", "No locality selected".dimmed()),
        Some(detail) => {
            println!(
                "{}  {}  {}",
                detail.name.bold(),
                detail.gauge.label().cyan().bold(),
                detail.time_range.label().dimmed()
            );
            match &detail.description {
                DescriptionView::Facts(rows) => {
                    for row in rows {
                        println!("  [{:?}] {}", row.icon, row.text);
                    }
                }
                DescriptionView::Narrative {
                    segments,
                    highlights,
                } => {
                    let text: String = segments
                        .iter()
                        .map(|seg| match seg {
                            Segment::Text(t) => t.normal().to_string(),
                            Segment::Figure(f) => f.blue().bold().to_string(),
                        })
                        .collect();
                    println!("  {text}");
                    for h in highlights {
                        println!("  - {h}");
                    }
                }
            }
            match &snap.map {
                Some(scene) => println!(
                    "  map: {} at ({:.4}, {:.4}) r={}m [{:?}]",
                    scene.markers[0].popup,
                    scene.center.lat,
                    scene.center.lng,
                    scene.highlight.radius_m,
                    scene.source
                ),
                None => println!("  {}", "map: resolving…".dimmed()),
            }
        }
    }

    if snap.chat.open {
        println!("{}", "chat".bold());
        for entry in &snap.chat.transcript {
            match entry.role {
                Role::User => println!("  {} {}", "you:".bold(), entry.text),
                Role::Assistant => println!("  {} {}", "ai:".cyan(), entry.text),
            }
        }
        if snap.chat.pending {
            println!("  {}", "…".dimmed());
        }
    }
}
