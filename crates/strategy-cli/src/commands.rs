use std::sync::Arc;

use anyhow::{Context, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use strategy_core::cancel::CancelToken;
use strategy_graph::NewStep;
use strategy_platform::PlatformClient;
use strategy_runtime::RuntimeConfig;
use strategy_sdk::Client;
use strategy_testing::{InMemoryConversationStore, RecordingEventSink, ScriptedPlatformClient, ScriptedSubAgent};
use strategy_types::{DelegationPlan, Operator, PlanNode};

use crate::args::{Cli, Commands, OutputFormat};

pub fn run(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    let color = std::io::stdout().is_terminal();

    match command {
        Commands::Run { goal, record_type, strategy_id } => {
            let runtime = tokio::runtime::Runtime::new().context("building tokio runtime")?;
            runtime.block_on(run_goal(goal, record_type, strategy_id, cli.format, color))
        }
    }
}

async fn run_goal(
    goal: String,
    record_type: String,
    strategy_id: String,
    format: OutputFormat,
    color: bool,
) -> Result<()> {
    let platform: Arc<dyn PlatformClient> = Arc::new(ScriptedPlatformClient::with_gene_record_type());
    let store = Arc::new(InMemoryConversationStore::new());
    let client = Client::new(platform, store, RuntimeConfig::default());
    let handle = client.open_turn(strategy_id, "demo-token");

    {
        let mut graph = handle.graph().lock().await;
        graph
            .add_step(NewStep::leaf(format!("initial {record_type} search")))
            .context("seeding the turn's root step")?;
    }

    let plan = DelegationPlan {
        nodes: vec![
            PlanNode::Task {
                id: "left".to_string(),
                depends_on: vec![],
                task: format!("find {record_type} records matching the left half of: {goal}"),
                hint: None,
                context: None,
            },
            PlanNode::Task {
                id: "right".to_string(),
                depends_on: vec![],
                task: format!("find {record_type} records matching the right half of: {goal}"),
                hint: None,
                context: None,
            },
            PlanNode::Combine {
                id: "combined".to_string(),
                depends_on: vec![],
                inputs: vec!["left".to_string(), "right".to_string()],
                operator: Operator::Intersect,
                display_name: Some("combined result".to_string()),
                upstream: None,
                downstream: None,
            },
        ],
    };

    let sub_agent = Arc::new(ScriptedSubAgent::new(vec![
        Box::new(|graph| {
            let id = graph.add_step(NewStep::leaf("left_search")).expect("leaf step should not fail");
            strategy_runtime::RoundOutput::created([id])
        }),
        Box::new(|graph| {
            let id = graph.add_step(NewStep::leaf("right_search")).expect("leaf step should not fail");
            strategy_runtime::RoundOutput::created([id])
        }),
    ]));
    let sink = Arc::new(RecordingEventSink::new());

    let output = handle
        .run_plan(plan, sub_agent, &goal, sink.clone(), CancelToken::never())
        .await
        .context("running the delegation plan")?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            for result in &output.results {
                print_task_result(result, color);
            }
            for rejected in &output.rejected {
                print_task_result(rejected, color);
            }
            for combine in output.combine_results.iter().chain(output.combine_errors.iter()) {
                print_task_result(combine, color);
            }
        }
    }

    Ok(())
}

fn print_task_result(result: &strategy_types::TaskResult, color: bool) {
    let label = format!("{} [{:?}]", result.id, result.notes);
    if color {
        println!("{}", label.green());
    } else {
        println!("{label}");
    }
    for error in &result.errors {
        if color {
            println!("  {}", error.red());
        } else {
            println!("  {error}");
        }
    }
}
