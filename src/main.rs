#[tokio::main]
async fn main() {
    if let Err(e) = clinic_desk::run().await {
        eprintln!("clinic-desk: {e}");
        std::process::exit(1);
    }
}
