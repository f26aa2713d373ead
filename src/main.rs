#[tokio::main]
async fn main() {
    waitroom::start_server().await;
}
