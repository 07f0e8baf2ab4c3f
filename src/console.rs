//! Line-oriented operator console for a running coordinator

use tabled::{Table, Tabled, settings::Style};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc
};
use tracing::{Level, event};

use crate::{
    actor::message::WorkflowStatus,
    domain::{constant::console, error::CoordinatorError, report::WorkflowReport, worker::WorkerInfo},
    server::Coordinator
};

const HELP: &str = "\
Commands:
  list               show connected workers
  start              run the workflow over all connected workers
  status             show the running workflow and the last report
  disconnect <name>  release one worker
  disconnect-all     release every worker
  reset              reload the initial dataset
  backup             copy the current dataset to the backup directory
  help               show this text
  quit               shut down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    List,
    Start,
    Status,
    Disconnect(String),
    DisconnectAll,
    Reset,
    Backup,
    Help,
    Quit,
    Empty,
    Unknown(String)
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, "")
        };

        match verb.to_ascii_lowercase().as_str() {
            "" => ConsoleCommand::Empty,
            "list" | "ls" => ConsoleCommand::List,
            "start" | "run" => ConsoleCommand::Start,
            "status" => ConsoleCommand::Status,
            "disconnect" if rest.is_empty() => ConsoleCommand::Unknown("disconnect needs a worker name".to_string()),
            "disconnect" => ConsoleCommand::Disconnect(rest.to_string()),
            "disconnect-all" => ConsoleCommand::DisconnectAll,
            "reset" => ConsoleCommand::Reset,
            "backup" => ConsoleCommand::Backup,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            _ => ConsoleCommand::Unknown(format!("unknown command '{}'", line))
        }
    }
}

#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Name")]
    name:       String,
    #[tabled(rename = "Level")]
    level:      u32,
    #[tabled(rename = "Mode")]
    mode:       String,
    #[tabled(rename = "Address")]
    address:    String,
    #[tabled(rename = "Registered")]
    registered: String
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Phase")]
    phase:  String,
    #[tabled(rename = "Worker")]
    worker: String,
    #[tabled(rename = "Level")]
    level:  u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Result")]
    result: String
}

pub fn render_workers(workers: &[WorkerInfo]) -> String {
    if workers.is_empty() {
        return "No workers connected".to_string();
    }
    let rows = workers.iter().map(|w| WorkerRow {
        name:       w.name.clone(),
        level:      w.level,
        mode:       w.mode.to_string(),
        address:    w.address.to_string(),
        registered: w.registered_at.format("%H:%M:%S").to_string()
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_report(report: &WorkflowReport) -> String {
    let rows = report.outcomes.iter().map(|o| OutcomeRow {
        phase:  o.phase.to_string(),
        worker: o.worker.clone(),
        level:  o.level,
        status: o.status.clone().unwrap_or_default(),
        result: o.kind.to_string()
    });

    let mut out = format!("Run {}\n{}", report.run_id, Table::new(rows).with(Style::rounded()));
    if let Some(name) = &report.last_updated_by {
        out.push_str(&format!("\nLast update by: {}", name));
    }
    match &report.final_path {
        Some(path) => out.push_str(&format!("\nFinal result: {}", path.display())),
        None => out.push_str("\nFinal result was not saved")
    }
    out
}

pub fn render_status(status: &WorkflowStatus) -> String {
    let mut out = match &status.running {
        Some(run_id) => format!("Workflow {} is running", run_id),
        None => "No workflow running".to_string()
    };
    out.push_str(&format!(
        "\nDataset: {} ({} bytes, {} lines)\nCompleted runs: {}, failed runs: {}",
        status.dataset.path.display(),
        status.dataset.bytes,
        status.dataset.lines,
        status.completed_runs,
        status.failed_runs
    ));
    if let Some(report) = &status.last_report {
        out.push('\n');
        out.push_str(&render_report(report));
    }
    out
}

/// Run one command; `Ok(None)` means quit
pub async fn execute(coordinator: &Coordinator, command: ConsoleCommand) -> Result<Option<String>, CoordinatorError> {
    let output = match command {
        ConsoleCommand::List => render_workers(&coordinator.list_workers().await?),
        ConsoleCommand::Start => format!("Workflow {} started", coordinator.start_workflow().await?),
        ConsoleCommand::Status => render_status(&coordinator.status().await?),
        ConsoleCommand::Disconnect(name) => {
            if coordinator.disconnect(&name).await? {
                format!("{} disconnected", name)
            } else {
                format!("No worker named {}", name)
            }
        }
        ConsoleCommand::DisconnectAll => format!("{} worker(s) disconnected", coordinator.disconnect_all().await?),
        ConsoleCommand::Reset => {
            let summary = coordinator.reset_dataset().await?;
            format!("Dataset reset: {} bytes, {} lines", summary.bytes, summary.lines)
        }
        ConsoleCommand::Backup => format!("Backup saved to {}", coordinator.backup_dataset().await?.display()),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => return Ok(None),
        ConsoleCommand::Empty => String::new(),
        ConsoleCommand::Unknown(reason) => format!("{}. Type 'help' for commands.", reason)
    };
    Ok(Some(output))
}

/// Read commands from stdin until `quit`, end of input or Ctrl-C
pub async fn run(coordinator: &Coordinator, mut results: mpsc::UnboundedReceiver<()>) {
    event!(Level::DEBUG, event = console::CONSOLE_STARTED);
    println!("Coordinator listening on {}. Type 'help' for commands.", coordinator.local_addr());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };
                let command = ConsoleCommand::parse(&line);
                event!(Level::DEBUG, event = console::COMMAND_RECEIVED, command = ?command);
                match execute(coordinator, command).await {
                    Ok(Some(output)) if !output.is_empty() => println!("{}", output),
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        event!(Level::DEBUG, event = console::COMMAND_FAILED, error = %e);
                        println!("Error: {}", e);
                    }
                }
            }
            Some(()) = results.recv() => {
                event!(Level::INFO, event = console::RESULTS_READY);
                match coordinator.status().await {
                    Ok(status) => match &status.last_report {
                        Some(report) => println!("Results ready\n{}", render_report(report)),
                        None => println!("Results ready")
                    },
                    Err(e) => println!("Results ready (status unavailable: {})", e)
                }
            }
            _ = tokio::signal::ctrl_c() => break
        }
    }
}
