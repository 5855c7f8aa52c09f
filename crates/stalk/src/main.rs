#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stalk::bootstrap::run().await
}
