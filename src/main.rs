#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rlpx_prober::node::run_cli().await
}
