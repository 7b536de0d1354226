#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    school_calendar::run().await
}
