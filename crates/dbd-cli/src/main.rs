#[tokio::main(flavor = "current_thread")]
async fn main() {
    dbd_cli::logging::init();
    if let Err(e) = dbd_cli::run(std::env::args().collect()).await {
        eprintln!("dbd: {e:#}");
        std::process::exit(dbd_cli::exit_code(&e));
    }
}
