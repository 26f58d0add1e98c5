use clap::Parser;
use colored::*;
use std::process;

use docsearch::cli::Args;
use docsearch::events::EventLog;
use docsearch::normalize::normalize;
use docsearch::search::{search_docs, MCP_ENDPOINT};
use docsearch::server;
use docsearch::ui::{display_events, display_results};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.serve {
        eprintln!(
            "{}",
            format!("Search proxy listening on http://127.0.0.1:{}/", args.port).green()
        );
        server::serve(args.port).await?;
        return Ok(());
    }

    if args.query.is_empty() {
        print_usage();
        process::exit(1);
    }
    let query = args.query.join(" ");

    let mut events = EventLog::new();
    let outcome = search_docs(MCP_ENDPOINT, &query, &mut events).await;

    if args.verbose {
        display_events(events.entries());
    }

    match outcome {
        Ok(reply) => {
            let records = normalize(&reply);
            if records.is_empty() {
                eprintln!("{}", "No structured content found in response".yellow());
            }
            display_results(&records, args.all);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            if !args.verbose {
                // The log usually names which transport or step gave out.
                eprintln!("{}", "Run with --verbose to see the progress log".dimmed());
            }
            process::exit(1);
        }
    }
}

fn print_usage() {
    eprintln!("{}", "Usage: docsearch [OPTIONS] <query>".red());
    eprintln!("{}", "       docsearch --serve [--port N]".red());
    eprintln!("{}", "  -a, --all        Show every result".dimmed());
    eprintln!("{}", "  -v, --verbose    Print the progress log".dimmed());
    eprintln!("{}", "  -p, --port       Proxy port (default 3000)".dimmed());
}
