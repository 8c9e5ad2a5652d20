use querydeck_server::QueryDeckServer;

#[derive(clap::Parser)]
#[command(name = "querydeck-server", about = "QueryDeck HTTP API", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "QUERYDECK_CONFIG", default_value = "config/querydeck.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = <Args as clap::Parser>::parse();

    QueryDeckServer::new().with_config(&args.config).run().await
}
