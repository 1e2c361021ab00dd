#[tokio::main]
async fn main() -> anyhow::Result<()> {
    callroom_lib::run().await
}
