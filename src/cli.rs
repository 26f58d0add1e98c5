use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "docsearch")]
#[command(about = "Search Microsoft Learn documentation through its MCP server", long_about = None)]
pub struct Args {
    #[arg(long = "serve", help = "Run the local search proxy instead of a one-shot query")]
    pub serve: bool,

    #[arg(
        short = 'p',
        long = "port",
        default_value_t = 3000,
        help = "Port for the local proxy (with --serve)"
    )]
    pub port: u16,

    #[arg(short = 'a', long = "all", help = "Show every result instead of only the top one")]
    pub all: bool,

    #[arg(short = 'v', long = "verbose", help = "Print the progress log")]
    pub verbose: bool,

    #[arg(help = "Search query")]
    pub query: Vec<String>,
}
