use codeverse_server::Config;

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match Config::load_with_dotenv() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = codeverse_server::run(config).await {
        log::error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
