//! StackQL client - run StackQL queries locally or against a StackQL server.

mod cli;

use anyhow::Context;
use cli::{Cli, Command};
use stackql_client::config::Config;
use stackql_client::error::ClientError;
use stackql_client::logging;
use stackql_client::query::{QueryResult, Session};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_stderr_logging(logging::default_level(cli.verbose));

    if let Err(e) = run(cli).await {
        error!("{}: {:#}", error_category(&e), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_overrides(&mut config)?;

    let session = Session::new(config)
        .await
        .context("failed to start session")?;

    let outcome = execute(&session, &cli.command).await;
    session.close().await?;
    let output = outcome?;

    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

async fn execute(session: &Session, command: &Command) -> anyhow::Result<String> {
    let output = match command {
        Command::Exec { query } => render(session.execute(query).await?)?,
        Command::Stmt { statement } => session.execute_statement(statement).await?,
        Command::Batch { queries } => {
            render(session.execute_batch(queries.iter().cloned()).await?)?
        }
        Command::Properties => serde_json::to_string_pretty(&session.properties())?,
    };
    Ok(output)
}

fn render(result: QueryResult) -> anyhow::Result<String> {
    match result {
        QueryResult::Records(records) => {
            serde_json::to_string_pretty(&records).context("failed to render records")
        }
        QueryResult::Text(text) => Ok(text),
    }
}

/// Category of the underlying client error, for the one-line failure report.
fn error_category(e: &anyhow::Error) -> &'static str {
    e.downcast_ref::<ClientError>()
        .map(ClientError::category)
        .unwrap_or("Error")
}
