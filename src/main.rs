use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    web_push_enable::logging::init_logger();

    web_push_enable::server::start_server().await?;

    Ok(())
}
