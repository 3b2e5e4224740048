use kord_registry::Registry;
use kord_sample::SampleApp;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let registry = Registry::new();
    if let Err(e) = registry.register(SampleApp::new("default", "simple-app", "a great app", "beeps-boops", 17)) {
        kordctl::init_tracing();
        tracing::error!(error = %e, "app registration failed");
        eprintln!("registration error: {}", e);
        std::process::exit(1);
    }
    std::process::exit(kordctl::run(&registry).await);
}
