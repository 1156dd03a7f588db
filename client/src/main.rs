use clap::Parser;
use distributed_array::client::command::HELP;
use distributed_array::client::{ArrayClient, Command};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "darray-client",
    version,
    about = "Interactive client for the distributed array cluster"
)]
struct Cli {
    /// Coordinator address as host:port
    #[arg(long, env = "DARRAY_COORDINATOR", default_value = "127.0.0.1:5000")]
    coordinator: String,

    #[arg(long, env = "DARRAY_LOG", default_value = "warn")]
    log_level: tracing::Level,

    /// Run a single command (e.g. `get a1`) instead of the prompt
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    let client = ArrayClient::new(cli.coordinator);

    if !cli.command.is_empty() {
        let command: Command = cli.command.join(" ").parse()?;
        run(&client, &command).await?;
        return Ok(());
    }

    println!("Connected to coordinator at {}", client.coordinator());
    println!("Enter commands (type 'help' for usage, 'exit' to quit):");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Exit => {
                println!("Goodbye!");
                break;
            }
            Command::Help => println!("{}", HELP),
            command => {
                if let Err(e) = run(&client, &command).await {
                    eprintln!("Error: {}", e);
                }
            }
        }
    }

    Ok(())
}

/// Sends one command and prints the single response line.
async fn run(client: &ArrayClient, command: &Command) -> anyhow::Result<()> {
    match client.execute(command).await? {
        Some(response) => println!("{}", serde_json::to_string(&response)?),
        None if *command == Command::Help => println!("{}", HELP),
        None => {}
    }
    Ok(())
}
